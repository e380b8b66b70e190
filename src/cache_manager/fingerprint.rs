use sha2::{Digest, Sha256};

pub const DEFAULT_MAX_KEY_LENGTH: usize = 512;

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Lower-cases and collapses whitespace; whitespace/case-only differences
/// in otherwise-identical SQL must fingerprint identically (§8 property 9).
pub fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// The canonical query-result cache key: normalized SQL joined with a hash
/// of the stably-serialized parameters. `serde_json::Value`'s default
/// (non-`preserve_order`) map representation is a `BTreeMap`, so two
/// parameter sets that are structurally equal serialize identically
/// regardless of insertion order.
pub fn fingerprint(sql: &str, params: Option<&serde_json::Value>, max_key_length: usize) -> String {
    let normalized = normalize_sql(sql);
    let params_repr = params
        .map(|p| serde_json::to_string(p).unwrap_or_default())
        .unwrap_or_default();
    let params_hash = hex_encode(&Sha256::digest(params_repr.as_bytes()));
    let joined = format!("{normalized}|{params_hash}");
    if joined.len() <= max_key_length {
        joined
    } else {
        let sql_hash = hex_encode(&Sha256::digest(normalized.as_bytes()));
        format!("{sql_hash}:{params_hash}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn whitespace_and_case_insensitive() {
        let a = fingerprint("SELECT * FROM users", None, DEFAULT_MAX_KEY_LENGTH);
        let b = fingerprint("select   *   from   USERS", None, DEFAULT_MAX_KEY_LENGTH);
        assert_eq!(a, b);
    }

    #[test]
    fn different_params_produce_different_fingerprints() {
        let a = fingerprint("SELECT * FROM t WHERE id=?", Some(&json!([1])), DEFAULT_MAX_KEY_LENGTH);
        let b = fingerprint("SELECT * FROM t WHERE id=?", Some(&json!([2])), DEFAULT_MAX_KEY_LENGTH);
        assert_ne!(a, b);
    }

    #[test]
    fn structurally_equal_param_objects_match_regardless_of_key_order() {
        let a = fingerprint("SELECT 1", Some(&json!({"a": 1, "b": 2})), DEFAULT_MAX_KEY_LENGTH);
        let b = fingerprint("SELECT 1", Some(&json!({"b": 2, "a": 1})), DEFAULT_MAX_KEY_LENGTH);
        assert_eq!(a, b);
    }

    #[test]
    fn overlong_key_collapses_to_two_hash_digest() {
        let long_sql = format!("SELECT * FROM t WHERE {}", "x = 1 AND ".repeat(100));
        let fp = fingerprint(&long_sql, None, 32);
        assert!(fp.contains(':'));
        assert!(fp.len() < long_sql.len());
    }
}
