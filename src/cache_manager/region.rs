use std::fmt;

use serde::{Deserialize, Serialize};

/// A named Smart Cache instance within the Cache Manager (§3 "Cache Region").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    Schema,
    TableExists,
    Index,
    QueryResult,
}

impl Region {
    /// Fixed lock order (§5): SCHEMA → TABLE_EXISTS → INDEX → QUERY_RESULT.
    pub const LOCK_ORDER: [Region; 4] = [
        Region::Schema,
        Region::TableExists,
        Region::Index,
        Region::QueryResult,
    ];

    pub const ALL: [Region; 4] = Self::LOCK_ORDER;
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Region::Schema => "SCHEMA",
            Region::TableExists => "TABLE_EXISTS",
            Region::Index => "INDEX",
            Region::QueryResult => "QUERY_RESULT",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_order_is_fixed() {
        assert_eq!(
            Region::LOCK_ORDER,
            [
                Region::Schema,
                Region::TableExists,
                Region::Index,
                Region::QueryResult
            ]
        );
    }

    #[test]
    fn display_matches_spec_names() {
        assert_eq!(Region::Schema.to_string(), "SCHEMA");
        assert_eq!(Region::QueryResult.to_string(), "QUERY_RESULT");
    }
}
