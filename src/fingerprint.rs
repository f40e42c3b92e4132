//! Content fingerprinting for declared task entries.
//!
//! A task's fingerprint is the SHA-256 digest of its canonical JSON form
//! (object keys sorted recursively, no insignificant whitespace), rendered
//! as 64 lowercase hex characters. Fingerprint equality is the sole
//! "unchanged" signal during a sync pass: any edit to a declared entry
//! changes the digest and forces a full rewrite of the stored row.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Compute the content fingerprint of a serializable value.
///
/// The digest is independent of map key order in the source: keys are
/// sorted before hashing, so semantically identical documents always
/// produce the same fingerprint.
pub fn fingerprint<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let json = serde_json::to_value(value)?;
    let mut canonical = String::new();
    write_canonical(&json, &mut canonical)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    Ok(format!("{digest:x}"))
}

/// Render a JSON value in canonical form: sorted object keys, `,` and `:`
/// separators without whitespace, standard JSON string escaping.
fn write_canonical(value: &Value, out: &mut String) -> serde_json::Result<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Value::String(s) => out.push_str(&serde_json::to_string(s)?),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_canonical(v, out)?;
                }
            }
            out.push('}');
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn digest_is_64_lowercase_hex_chars() {
        let value: Value = serde_json::json!({"command": "cache:flush"});
        let digest = fingerprint(&value).expect("fingerprint");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn key_order_does_not_affect_digest() {
        let a: Value = serde_json::from_str(r#"{"interval": 300, "command": "a:b"}"#)
            .expect("parse a");
        let b: Value = serde_json::from_str(r#"{"command": "a:b", "interval": 300}"#)
            .expect("parse b");
        assert_eq!(
            fingerprint(&a).expect("fingerprint a"),
            fingerprint(&b).expect("fingerprint b")
        );
    }

    #[test]
    fn any_value_change_alters_digest() {
        let a: Value = serde_json::json!({"command": "a:b", "interval": 300});
        let b: Value = serde_json::json!({"command": "a:b", "interval": 301});
        assert_ne!(
            fingerprint(&a).expect("fingerprint a"),
            fingerprint(&b).expect("fingerprint b")
        );
    }

    #[test]
    fn canonical_form_sorts_nested_objects() {
        let value: Value = serde_json::from_str(
            r#"{"b": 1, "a": {"z": [true, null], "y": "text"}}"#,
        )
        .expect("parse");
        let mut canonical = String::new();
        write_canonical(&value, &mut canonical).expect("canonicalize");
        assert_eq!(canonical, r#"{"a":{"y":"text","z":[true,null]},"b":1}"#);

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let expected = format!("{:x}", hasher.finalize());
        assert_eq!(fingerprint(&value).expect("fingerprint"), expected);
    }

    #[test]
    fn strings_are_escaped_not_embedded_raw() {
        let value: Value = serde_json::json!({"description": "say \"hi\"\n"});
        let mut canonical = String::new();
        write_canonical(&value, &mut canonical).expect("canonicalize");
        assert_eq!(canonical, r#"{"description":"say \"hi\"\n"}"#);
    }
}
