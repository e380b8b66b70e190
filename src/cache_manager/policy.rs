use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// The leading keyword of a SQL statement, used to choose a TTL and decide
/// cacheability (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryKind {
    Select,
    Show,
    Describe,
    Explain,
    Insert,
    Update,
    Delete,
    Create,
    Drop,
    Alter,
    Other,
}

impl QueryKind {
    pub fn infer(sql: &str) -> Self {
        let trimmed = sql.trim_start();
        let first_word: String = trimmed
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_uppercase();
        match first_word.as_str() {
            "SELECT" => QueryKind::Select,
            "SHOW" => QueryKind::Show,
            "DESCRIBE" | "DESC" => QueryKind::Describe,
            "EXPLAIN" => QueryKind::Explain,
            "INSERT" => QueryKind::Insert,
            "UPDATE" => QueryKind::Update,
            "DELETE" => QueryKind::Delete,
            "CREATE" => QueryKind::Create,
            "DROP" => QueryKind::Drop,
            "ALTER" => QueryKind::Alter,
            _ => QueryKind::Other,
        }
    }

    pub fn is_mutation_or_ddl(&self) -> bool {
        matches!(
            self,
            QueryKind::Insert
                | QueryKind::Update
                | QueryKind::Delete
                | QueryKind::Create
                | QueryKind::Drop
                | QueryKind::Alter
        )
    }
}

/// Per-query-kind TTL map plus the cacheable/non-cacheable pattern lists
/// that gate whether a query is cached at all (§4.2 "Cacheability policy").
#[derive(Debug, Clone)]
pub struct CacheabilityPolicy {
    pub ttl_by_kind: HashMap<QueryKindKey, u64>,
    cacheable_patterns: Vec<Regex>,
    non_cacheable_patterns: Vec<Regex>,
}

/// `QueryKind` isn't `Hash`-derivable-friendly for a public map key because
/// `Other` carries no data but we still want a stable map type; this
/// newtype just documents intent and forwards to the enum's own derive.
pub type QueryKindKey = QueryKind;

static NON_CACHEABLE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bNOW\s*\(",
        r"(?i)\bCURRENT_TIMESTAMP\b",
        r"(?i)\bRAND\s*\(",
        r"(?i)\bUUID\s*\(",
        r"(?i)\bCONNECTION_ID\s*\(",
        r"(?i)\bFOR\s+UPDATE\b",
        r"(?i)\bLOCK\s+IN\s+SHARE\s+MODE\b",
        r"(?i)\bSESSION_USER\s*\(",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("non-cacheable pattern is valid"))
    .collect()
});

fn default_non_cacheable_patterns() -> &'static [Regex] {
    &NON_CACHEABLE_PATTERNS
}

impl Default for CacheabilityPolicy {
    fn default() -> Self {
        let mut ttl_by_kind = HashMap::new();
        ttl_by_kind.insert(QueryKind::Select, 300);
        ttl_by_kind.insert(QueryKind::Show, 600);
        ttl_by_kind.insert(QueryKind::Describe, 1800);
        ttl_by_kind.insert(QueryKind::Explain, 900);
        ttl_by_kind.insert(QueryKind::Insert, 0);
        ttl_by_kind.insert(QueryKind::Update, 0);
        ttl_by_kind.insert(QueryKind::Delete, 0);
        ttl_by_kind.insert(QueryKind::Create, 0);
        ttl_by_kind.insert(QueryKind::Drop, 0);
        ttl_by_kind.insert(QueryKind::Alter, 0);
        ttl_by_kind.insert(QueryKind::Other, 0);
        Self {
            ttl_by_kind,
            cacheable_patterns: Vec::new(),
            non_cacheable_patterns: default_non_cacheable_patterns().to_vec(),
        }
    }
}

impl CacheabilityPolicy {
    pub fn ttl_seconds_for(&self, kind: QueryKind) -> u64 {
        self.ttl_by_kind.get(&kind).copied().unwrap_or(0)
    }

    pub fn add_cacheable_pattern(&mut self, pattern: &str) -> Result<(), regex::Error> {
        self.cacheable_patterns.push(Regex::new(pattern)?);
        Ok(())
    }

    pub fn add_non_cacheable_pattern(&mut self, pattern: &str) -> Result<(), regex::Error> {
        self.non_cacheable_patterns.push(Regex::new(pattern)?);
        Ok(())
    }

    /// (i) TTL > 0, (ii) no non-cacheable pattern matches, (iii) a
    /// cacheable pattern matches or the kind is SELECT.
    pub fn is_cacheable(&self, kind: QueryKind, sql: &str) -> bool {
        if self.ttl_seconds_for(kind) == 0 {
            return false;
        }
        if self.non_cacheable_patterns.iter().any(|p| p.is_match(sql)) {
            return false;
        }
        if kind == QueryKind::Select {
            return true;
        }
        self.cacheable_patterns.iter().any(|p| p.is_match(sql))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_select_kind() {
        assert_eq!(QueryKind::infer("  select * from t"), QueryKind::Select);
    }

    #[test]
    fn infers_ddl_kinds() {
        assert_eq!(QueryKind::infer("CREATE TABLE t (id INT)"), QueryKind::Create);
        assert_eq!(QueryKind::infer("DROP TABLE t"), QueryKind::Drop);
        assert_eq!(QueryKind::infer("ALTER TABLE t ADD c INT"), QueryKind::Alter);
    }

    #[test]
    fn select_is_cacheable_by_default() {
        let policy = CacheabilityPolicy::default();
        assert!(policy.is_cacheable(QueryKind::Select, "SELECT * FROM users"));
    }

    #[test]
    fn mutation_kinds_are_never_cacheable() {
        let policy = CacheabilityPolicy::default();
        assert!(!policy.is_cacheable(QueryKind::Insert, "INSERT INTO t VALUES (1)"));
    }

    #[test]
    fn time_dependent_select_is_rejected() {
        let policy = CacheabilityPolicy::default();
        assert!(!policy.is_cacheable(QueryKind::Select, "SELECT NOW()"));
    }

    #[test]
    fn locking_clause_is_rejected() {
        let policy = CacheabilityPolicy::default();
        assert!(!policy.is_cacheable(QueryKind::Select, "SELECT * FROM t FOR UPDATE"));
    }

    #[test]
    fn show_requires_custom_cacheable_pattern() {
        let mut policy = CacheabilityPolicy::default();
        assert!(!policy.is_cacheable(QueryKind::Show, "SHOW TABLES"));
        policy.add_cacheable_pattern(r"(?i)^SHOW").unwrap();
        assert!(policy.is_cacheable(QueryKind::Show, "SHOW TABLES"));
    }
}
