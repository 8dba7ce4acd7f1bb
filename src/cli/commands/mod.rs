pub mod datasets;
pub mod refresh;
pub mod search;

use std::collections::BTreeSet;

/// Parse `--scopes A,B` into a grant; `None` acts as an anonymous caller.
pub fn parse_scopes(scopes: Option<&str>) -> Option<BTreeSet<String>> {
    scopes.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}
