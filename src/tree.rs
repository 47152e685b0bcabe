//! The decoded document tree.
//!
//! Every field encoding (JSON text, legacy serialized text, values that were
//! already structured in the bundle) decodes into the same [`Tree`], so the
//! rewriter only has to understand one shape.
//!
//! Legacy serialized arrays carry integer keys and objects carry a class name,
//! neither of which JSON can represent. [`Key`] and [`Tree::Object`] keep them
//! so a legacy field re-encodes to the same text it was decoded from.

use indexmap::IndexMap;
use serde_json::{Map, Number, Value};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum TreeError {
    #[error("float {0} has no JSON representation")]
    NonFiniteFloat(f64),
}

/// A map key: legacy arrays mix integer and string keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{}", i),
            Key::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

/// A node of a decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Tree {
    Null,
    Bool(bool),
    Int(i64),
    /// JSON integers above `i64::MAX`, kept exact.
    UInt(u64),
    Float(f64),
    Str(String),
    Seq(Vec<Tree>),
    Map(IndexMap<Key, Tree>),
    /// A legacy serialized object: class name plus its properties.
    Object {
        class: String,
        fields: IndexMap<Key, Tree>,
    },
}

impl Tree {
    /// Convert a JSON value, keeping object key order.
    pub fn from_json(value: Value) -> Tree {
        match value {
            Value::Null => Tree::Null,
            Value::Bool(b) => Tree::Bool(b),
            Value::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => Tree::Int(i),
                (None, Some(u)) => Tree::UInt(u),
                (None, None) => Tree::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Tree::Str(s),
            Value::Array(items) => Tree::Seq(items.into_iter().map(Tree::from_json).collect()),
            Value::Object(map) => Tree::Map(
                map.into_iter()
                    .map(|(k, v)| (Key::Str(k), Tree::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert back to JSON. Integer keys become strings and objects lose
    /// their class name, the same way the host's JSON encoder treats them.
    pub fn into_json(self) -> Result<Value, TreeError> {
        Ok(match self {
            Tree::Null => Value::Null,
            Tree::Bool(b) => Value::Bool(b),
            Tree::Int(i) => Value::Number(i.into()),
            Tree::UInt(u) => Value::Number(u.into()),
            Tree::Float(f) => Value::Number(Number::from_f64(f).ok_or(TreeError::NonFiniteFloat(f))?),
            Tree::Str(s) => Value::String(s),
            Tree::Seq(items) => Value::Array(
                items
                    .into_iter()
                    .map(Tree::into_json)
                    .collect::<Result<_, _>>()?,
            ),
            Tree::Map(fields) | Tree::Object { fields, .. } => {
                let mut map = Map::with_capacity(fields.len());
                for (k, v) in fields {
                    map.insert(k.to_string(), v.into_json()?);
                }
                Value::Object(map)
            }
        })
    }

    /// Every string leaf, depth first, in document order.
    pub fn strings(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_strings(self, &mut out);
        out
    }
}

fn collect_strings<'a>(node: &'a Tree, out: &mut Vec<&'a str>) {
    match node {
        Tree::Str(s) => out.push(s),
        Tree::Seq(items) => items.iter().for_each(|n| collect_strings(n, out)),
        Tree::Map(fields) | Tree::Object { fields, .. } => {
            fields.values().for_each(|n| collect_strings(n, out))
        }
        Tree::Null | Tree::Bool(_) | Tree::Int(_) | Tree::UInt(_) | Tree::Float(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_conversion_keeps_key_order() {
        let value = json!({"zeta": 1, "alpha": [true, null, "x"], "mid": {"b": 2.5, "a": -3}});
        let tree = Tree::from_json(value.clone());

        let Tree::Map(fields) = &tree else {
            panic!("expected map, got {:?}", tree);
        };
        let keys: Vec<String> = fields.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);

        assert_eq!(tree.into_json().unwrap(), value);
    }

    #[test]
    fn large_unsigned_stays_exact() {
        let tree = Tree::from_json(json!(u64::MAX));
        assert_eq!(tree, Tree::UInt(u64::MAX));
        assert_eq!(tree.into_json().unwrap().to_string(), "18446744073709551615");
    }

    #[test]
    fn integer_keys_stringify_in_json() {
        let mut fields = IndexMap::new();
        fields.insert(Key::Int(3), Tree::Str("three".into()));
        fields.insert(Key::from("name"), Tree::Bool(false));
        let value = Tree::Map(fields).into_json().unwrap();
        assert_eq!(value, json!({"3": "three", "name": false}));
    }

    #[test]
    fn object_drops_class_in_json() {
        let mut fields = IndexMap::new();
        fields.insert(Key::from("url"), Tree::Str("u".into()));
        let tree = Tree::Object {
            class: "stdClass".into(),
            fields,
        };
        assert_eq!(tree.into_json().unwrap(), json!({"url": "u"}));
    }

    #[test]
    fn nan_has_no_json_form() {
        assert!(matches!(
            Tree::Float(f64::NAN).into_json(),
            Err(TreeError::NonFiniteFloat(_))
        ));
    }

    #[test]
    fn strings_walks_depth_first() {
        let tree = Tree::from_json(json!([{"a": "one", "b": ["two", 3]}, "four"]));
        assert_eq!(tree.strings(), vec!["one", "two", "four"]);
    }
}
