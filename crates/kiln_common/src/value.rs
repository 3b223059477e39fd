//! Canonical encoding of JSON argument values.
//!
//! Operation arguments and subbuild return values are JSON values. Cache
//! identity requires a deterministic byte encoding: the same logical value
//! must always digest to the same fingerprint, regardless of how the caller
//! constructed it. The canonical form sorts object keys and uses compact
//! separators, matching what `serde_json` produces for a `BTreeMap`-backed
//! object.

use serde_json::Value;

use crate::Fingerprint;

/// Returns the canonical byte encoding of a JSON value.
///
/// Object keys are emitted in sorted order and arrays in element order, so
/// two structurally equal values always encode identically.
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

/// Digests an argument list into a single fingerprint.
///
/// The arguments are framed with their count and each element's length, so
/// `["ab"]` and `["a", "b"]` cannot collide.
pub fn digest_args(args: &[Value]) -> Fingerprint {
    let mut out = Vec::new();
    out.extend_from_slice(&(args.len() as u64).to_le_bytes());
    for arg in args {
        let bytes = canonical_bytes(arg);
        out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
        out.extend_from_slice(&bytes);
    }
    Fingerprint::from_bytes(&out)
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => {
            // serde_json's string escaping is deterministic.
            let encoded = serde_json::to_string(s).expect("string serialization cannot fail");
            out.extend_from_slice(encoded.as_bytes());
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                let encoded =
                    serde_json::to_string(key).expect("string serialization cannot fail");
                out.extend_from_slice(encoded.as_bytes());
                out.push(b':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push(b'}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_encode_as_json() {
        assert_eq!(canonical_bytes(&json!(null)), b"null");
        assert_eq!(canonical_bytes(&json!(true)), b"true");
        assert_eq!(canonical_bytes(&json!(42)), b"42");
        assert_eq!(canonical_bytes(&json!("hi")), b"\"hi\"");
    }

    #[test]
    fn object_keys_sorted() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonical_bytes(&a), canonical_bytes(&b));
        assert_eq!(canonical_bytes(&a), b"{\"a\":2,\"b\":1}");
    }

    #[test]
    fn nested_values_canonical() {
        let v = json!({"outer": {"z": [1, 2], "a": "x"}});
        assert_eq!(
            canonical_bytes(&v),
            b"{\"outer\":{\"a\":\"x\",\"z\":[1,2]}}"
        );
    }

    #[test]
    fn digest_distinguishes_framing() {
        let one = digest_args(&[json!("ab")]);
        let two = digest_args(&[json!("a"), json!("b")]);
        assert_ne!(one, two);
    }

    #[test]
    fn digest_stable_across_key_order() {
        let a = digest_args(&[json!({"x": 1, "y": 2})]);
        let b = digest_args(&[json!({"y": 2, "x": 1})]);
        assert_eq!(a, b);
    }

    #[test]
    fn digest_empty_args() {
        assert_eq!(digest_args(&[]), digest_args(&[]));
        assert_ne!(digest_args(&[]), digest_args(&[json!(null)]));
    }
}
