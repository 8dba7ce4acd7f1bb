use super::error::QueryError;
use super::ident::quote_identifier;
use super::params::{ParamBinder, SqlParam};

/// Additional boolean predicate ANDed onto a spatial query.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtraFilter {
    /// `[lower](column) [NOT] IN ($n, ...)` with every value bound.
    ColumnIn {
        column: String,
        values: Vec<String>,
        case_insensitive: bool,
        negated: bool,
    },
}

const MONUMENT_TYPES: &[&str] = &["pand", "bouwwerk", "parkterrein", "beeldhouwkunst", "bouwblok"];

impl ExtraFilter {
    pub fn column_in(column: impl Into<String>, values: Vec<String>) -> Self {
        ExtraFilter::ColumnIn {
            column: column.into(),
            values,
            case_insensitive: false,
            negated: false,
        }
    }

    /// Parse the monumenten `monumenttype` parameter: `is_pand_bouwwerk` or
    /// `isnot_parkterrein`. Returns `None` for anything else.
    pub fn monument_type(value: &str) -> Option<Self> {
        let mut parts = value.split('_');
        let negated = match parts.next()? {
            "is" => false,
            "isnot" => true,
            _ => return None,
        };
        let values: Vec<String> = parts.map(str::to_string).collect();
        if values.is_empty() || !values.iter().all(|v| MONUMENT_TYPES.contains(&v.as_str())) {
            return None;
        }
        Some(ExtraFilter::ColumnIn {
            column: "monumenttype".to_string(),
            values,
            case_insensitive: true,
            negated,
        })
    }

    pub(crate) fn render(&self, binder: &mut ParamBinder) -> Result<String, QueryError> {
        match self {
            ExtraFilter::ColumnIn { column, values, case_insensitive, negated } => {
                if values.is_empty() {
                    return Err(QueryError::EmptyFilter(column.clone()));
                }
                let quoted = quote_identifier(column)?;
                let target = if *case_insensitive { format!("lower({})", quoted) } else { quoted };
                let placeholders = values
                    .iter()
                    .map(|v| {
                        let v = if *case_insensitive { v.to_lowercase() } else { v.clone() };
                        binder.push(SqlParam::Text(v))
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                let op = if *negated { "NOT IN" } else { "IN" };
                Ok(format!("{} {} ({})", target, op, placeholders))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_monument_type_filters() {
        let filter = ExtraFilter::monument_type("isnot_pand_bouwwerk").unwrap();
        assert_eq!(
            filter,
            ExtraFilter::ColumnIn {
                column: "monumenttype".into(),
                values: vec!["pand".into(), "bouwwerk".into()],
                case_insensitive: true,
                negated: true,
            }
        );
        assert!(ExtraFilter::monument_type("is").is_none());
        assert!(ExtraFilter::monument_type("is_kasteel").is_none());
        assert!(ExtraFilter::monument_type("was_pand").is_none());
    }

    #[test]
    fn renders_bound_in_list() {
        let mut binder = ParamBinder::new();
        let sql = ExtraFilter::monument_type("is_pand_bouwblok")
            .unwrap()
            .render(&mut binder)
            .unwrap();
        assert_eq!(sql, "lower(\"monumenttype\") IN ($1::text, $2::text)");
        assert_eq!(
            binder.into_params(),
            vec![SqlParam::Text("pand".into()), SqlParam::Text("bouwblok".into())]
        );
    }

    #[test]
    fn rejects_empty_value_list() {
        let mut binder = ParamBinder::new();
        let err = ExtraFilter::column_in("planstatus", vec![]).render(&mut binder).unwrap_err();
        assert_eq!(err, QueryError::EmptyFilter("planstatus".into()));
    }
}
