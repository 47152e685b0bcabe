//! Field encodings: detection, decoding and re-encoding.
//!
//! A bundle travels as JSON, but the values inside it are whatever the
//! metadata store held. Three shapes show up:
//!
//! | Encoding | Raw value | Example |
//! |---|---|---|
//! | [`Encoding::Legacy`] | string in legacy serialized text | `"a:1:{i:0;s:1:\"x\";}"` |
//! | [`Encoding::JsonText`] | string containing JSON | `"{\"url\":\"...\"}"` |
//! | [`Encoding::Native`] | any other value, used as is | `"plain"`, `12`, `{"a": 1}` |
//!
//! Detection tries legacy syntax first, then JSON, and falls back to native.
//! The detected encoding is kept next to the decoded tree so the field is
//! written back in the same format the store expects.

pub mod legacy;

use crate::tree::{Tree, TreeError};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),
}

/// How a field value was stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Legacy,
    JsonText,
    Native,
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Encoding::Legacy => "serialized",
            Encoding::JsonText => "json",
            Encoding::Native => "plain",
        })
    }
}

/// A decoded field value together with the encoding it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub encoding: Encoding,
    pub tree: Tree,
}

/// Detect a value's encoding.
pub fn detect(value: &Value) -> Encoding {
    decode(value).encoding
}

/// Decode a raw field value. Never fails: anything that is neither valid
/// legacy text nor valid JSON text is a native value.
pub fn decode(value: &Value) -> Decoded {
    let Value::String(text) = value else {
        return Decoded {
            encoding: Encoding::Native,
            tree: Tree::from_json(value.clone()),
        };
    };

    if legacy::looks_serialized(text)
        && let Ok(tree) = legacy::decode(text)
    {
        return Decoded {
            encoding: Encoding::Legacy,
            tree,
        };
    }

    match decode_json_text(text) {
        Ok(tree) => Decoded {
            encoding: Encoding::JsonText,
            tree,
        },
        Err(_) => Decoded {
            encoding: Encoding::Native,
            tree: Tree::Str(text.clone()),
        },
    }
}

/// Encode a tree back into a raw field value using `encoding`.
pub fn encode(tree: Tree, encoding: Encoding) -> Result<Value, CodecError> {
    Ok(match encoding {
        Encoding::Legacy => Value::String(legacy::encode(&tree)),
        Encoding::JsonText => Value::String(encode_json_text(tree)?),
        Encoding::Native => tree.into_json()?,
    })
}

/// Parse a string holding a JSON document.
pub fn decode_json_text(text: &str) -> Result<Tree, serde_json::Error> {
    serde_json::from_str::<Value>(text).map(Tree::from_json)
}

/// Serialize a tree as compact JSON text.
pub fn encode_json_text(tree: Tree) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&tree.into_json()?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_each_encoding() {
        assert_eq!(detect(&json!("a:1:{i:0;s:1:\"x\";}")), Encoding::Legacy);
        assert_eq!(detect(&json!("{\"a\": [1, 2]}")), Encoding::JsonText);
        assert_eq!(detect(&json!("42")), Encoding::JsonText);
        assert_eq!(detect(&json!("default")), Encoding::Native);
        assert_eq!(detect(&json!("")), Encoding::Native);
        assert_eq!(detect(&json!(7)), Encoding::Native);
        assert_eq!(detect(&json!({"a": "b"})), Encoding::Native);
        assert_eq!(detect(&Value::Null), Encoding::Native);
    }

    #[test]
    fn broken_legacy_text_falls_back_to_native() {
        // Looks serialized but the declared length is wrong.
        let raw = json!("s:99:\"short\";");
        let decoded = decode(&raw);
        assert_eq!(decoded.encoding, Encoding::Native);
        assert_eq!(decoded.tree, Tree::Str("s:99:\"short\";".into()));
    }

    #[test]
    fn each_encoding_reencodes_to_its_own_format() {
        for raw in [
            json!("a:2:{i:0;s:1:\"x\";i:1;b:1;}"),
            json!("{\"a\":[1,2],\"b\":null}"),
            json!("plain text"),
            json!({"nested": {"k": [true, 1.5]}}),
            json!(12),
        ] {
            let decoded = decode(&raw);
            let encoded = encode(decoded.tree, decoded.encoding).unwrap();
            assert_eq!(encoded, raw);
        }
    }

    #[test]
    fn json_text_is_reencoded_compactly() {
        let raw = json!("{ \"a\" : 1 }");
        let decoded = decode(&raw);
        assert_eq!(
            encode(decoded.tree, Encoding::JsonText).unwrap(),
            json!("{\"a\":1}")
        );
    }
}
