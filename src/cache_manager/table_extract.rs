use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Conservative, regex-based table-name extraction (§4.2 "Table extraction",
/// §9 "Regex-based table extraction"). False positives over-invalidate and
/// are acceptable; false negatives are acceptable up to the TTL window. This
/// is not a SQL parser — it never will be, by design (§1 Non-goals).
struct ExtractionPatterns {
    patterns: Vec<Regex>,
}

static PATTERNS: Lazy<ExtractionPatterns> = Lazy::new(|| {
    const IDENT: &str = r"(?:`[^`]+`|\"[^\"]+\"|[A-Za-z_][A-Za-z0-9_]*)";
    let qualified = format!(r"({IDENT}(?:\.{IDENT})?)");
    let specs = [
        format!(r"(?i)\bFROM\s+{qualified}"),
        format!(r"(?i)\bJOIN\s+{qualified}"),
        format!(r"(?i)\bINSERT\s+INTO\s+{qualified}"),
        format!(r"(?i)\bUPDATE\s+{qualified}"),
        format!(r"(?i)\bDELETE\s+FROM\s+{qualified}"),
        format!(r"(?i)\bDROP\s+TABLE\s+(?:IF\s+EXISTS\s+)?{qualified}"),
        format!(r"(?i)\bCREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?{qualified}"),
        format!(r"(?i)\bALTER\s+TABLE\s+{qualified}"),
    ];
    let patterns = specs
        .iter()
        .map(|p| Regex::new(p).expect("table extraction pattern is valid"))
        .collect();
    ExtractionPatterns { patterns }
});

fn patterns() -> &'static ExtractionPatterns {
    &PATTERNS
}

fn strip_quotes(ident: &str) -> &str {
    let trimmed = ident.trim();
    trimmed
        .strip_prefix('`')
        .and_then(|s| s.strip_suffix('`'))
        .or_else(|| trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
        .unwrap_or(trimmed)
}

/// Qualified names (`schema.table`) are accepted but only the final
/// identifier is kept, per §4.2.
fn last_segment(qualified: &str) -> String {
    let segment = qualified.rsplit('.').next().unwrap_or(qualified);
    strip_quotes(segment).to_lowercase()
}

pub fn extract_tables(sql: &str) -> Vec<String> {
    let mut found = HashSet::new();
    let mut ordered = Vec::new();
    for pattern in &patterns().patterns {
        for caps in pattern.captures_iter(sql) {
            if let Some(m) = caps.get(1) {
                let name = last_segment(m.as_str());
                if !name.is_empty() && found.insert(name.clone()) {
                    ordered.push(name);
                }
            }
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_simple_select() {
        assert_eq!(extract_tables("SELECT * FROM users"), vec!["users"]);
    }

    #[test]
    fn extracts_join_tables() {
        let tables = extract_tables("SELECT * FROM orders o JOIN users u ON o.user_id = u.id");
        assert_eq!(tables, vec!["orders", "users"]);
    }

    #[test]
    fn extracts_insert_into() {
        assert_eq!(
            extract_tables("INSERT INTO accounts (id) VALUES (1)"),
            vec!["accounts"]
        );
    }

    #[test]
    fn extracts_update_and_delete() {
        assert_eq!(extract_tables("UPDATE users SET x=1"), vec!["users"]);
        assert_eq!(
            extract_tables("DELETE FROM sessions WHERE id=1"),
            vec!["sessions"]
        );
    }

    #[test]
    fn extracts_ddl_with_if_exists() {
        assert_eq!(
            extract_tables("DROP TABLE IF EXISTS logs"),
            vec!["logs"]
        );
        assert_eq!(
            extract_tables("CREATE TABLE IF NOT EXISTS logs (id INT)"),
            vec!["logs"]
        );
        assert_eq!(
            extract_tables("ALTER TABLE logs ADD COLUMN ts TIMESTAMP"),
            vec!["logs"]
        );
    }

    #[test]
    fn qualified_names_keep_only_table() {
        assert_eq!(
            extract_tables("SELECT * FROM analytics.events"),
            vec!["events"]
        );
    }

    #[test]
    fn quoted_identifiers_are_stripped() {
        assert_eq!(extract_tables("SELECT * FROM `my table`"), vec!["my table"]);
    }

    #[test]
    fn is_case_insensitive_and_lowercases_output() {
        assert_eq!(extract_tables("select * from USERS"), vec!["users"]);
    }

    #[test]
    fn deduplicates_repeated_tables() {
        let tables = extract_tables("SELECT * FROM users WHERE id IN (SELECT user_id FROM users)");
        assert_eq!(tables, vec!["users"]);
    }

    #[test]
    fn no_match_returns_empty() {
        assert!(extract_tables("SHOW TABLES").is_empty());
    }
}
