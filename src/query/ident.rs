//! Identifier quoting and field-name case conversion.

use super::error::QueryError;

/// Quote a schema, table or column name as a PostgreSQL identifier.
pub fn quote_identifier(name: &str) -> Result<String, QueryError> {
    if name.is_empty() || name.contains('\0') {
        return Err(QueryError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a `schema.table` pair.
pub fn quote_table(schema: &str, table: &str) -> Result<String, QueryError> {
    Ok(format!("{}.{}", quote_identifier(schema)?, quote_identifier(table)?))
}

/// `beginGeldigheid` -> `begin_geldigheid`. Already snake-cased input is returned unchanged.
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower_or_digit = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower_or_digit {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower_or_digit = false;
        } else {
            out.push(c);
            prev_lower_or_digit = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

/// `begin_geldigheid` -> `beginGeldigheid`.
pub fn to_lower_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' {
            upper_next = !out.is_empty();
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_and_escapes_identifiers() {
        assert_eq!(quote_identifier("geometrie").unwrap(), "\"geometrie\"");
        assert_eq!(quote_identifier("we\"ird").unwrap(), "\"we\"\"ird\"");
        assert_eq!(
            quote_table("public", "geo_bag_pand_mat").unwrap(),
            "\"public\".\"geo_bag_pand_mat\""
        );
        assert!(quote_identifier("").is_err());
    }

    #[test]
    fn converts_camel_case_display_fields() {
        assert_eq!(
            to_snake_case("testDisplayFieldInCamelCase"),
            "test_display_field_in_camel_case"
        );
        assert_eq!(to_snake_case("beginGeldigheid"), "begin_geldigheid");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
        assert_eq!(to_snake_case("id"), "id");
    }

    #[test]
    fn converts_snake_case_to_lower_camel() {
        assert_eq!(to_lower_camel_case("biz_type"), "bizType");
        assert_eq!(to_lower_camel_case("eind_geldigheid"), "eindGeldigheid");
        assert_eq!(to_lower_camel_case("display"), "display");
        assert_eq!(to_lower_camel_case("_private"), "private");
    }
}
