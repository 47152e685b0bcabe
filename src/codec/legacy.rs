//! Legacy serialized-object text, the host's native storage format.
//!
//! ```text
//! N;                      null
//! b:1;                    bool
//! i:42;                   integer
//! d:0.5;                  float (also INF, -INF, NAN)
//! s:5:"hello";            string, length in bytes
//! a:2:{i:0;s:1:"a";i:1;N;}            array, integer or string keys
//! O:8:"stdClass":1:{s:3:"url";N;}     object: class name + properties
//! ```
//!
//! Arrays whose keys are exactly `0..n` in order decode to [`Tree::Seq`];
//! everything else keeps its keys in a [`Tree::Map`]. Both re-encode to the
//! same text. References (`r:`/`R:`), custom-serialized classes (`C:`) and
//! enums (`E:`) are rejected, so fields using them are treated as opaque
//! strings instead.

use crate::tree::{Key, Tree};
use indexmap::IndexMap;
use thiserror::Error;

/// Deeper input is rejected rather than risking the stack. Matches serde_json's
/// recursion limit, since the decoded tree is walked and dropped recursively too.
const MAX_DEPTH: usize = 128;

#[derive(Error, Debug, PartialEq)]
pub enum LegacyError {
    #[error("unexpected end of input at byte {0}")]
    UnexpectedEnd(usize),
    #[error("expected '{expected}' at byte {pos}")]
    Expected { expected: char, pos: usize },
    #[error("invalid number at byte {0}")]
    InvalidNumber(usize),
    #[error("unsupported type tag '{tag}' at byte {pos}")]
    UnsupportedTag { tag: char, pos: usize },
    #[error("invalid array key at byte {0}")]
    InvalidKey(usize),
    #[error("string at byte {0} is not valid UTF-8")]
    InvalidUtf8(usize),
    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),
    #[error("trailing data at byte {0}")]
    TrailingData(usize),
}

/// Cheap syntactic check mirroring the host's own sniffing: a type tag, a
/// colon, and a `;` or `}` terminator. A `true` here does not guarantee
/// [`decode`] succeeds.
pub fn looks_serialized(text: &str) -> bool {
    let text = text.trim();
    if text == "N;" {
        return true;
    }
    let bytes = text.as_bytes();
    if bytes.len() < 4 || bytes[1] != b':' {
        return false;
    }
    let last = bytes[bytes.len() - 1];
    match bytes[0] {
        b's' | b'a' | b'O' => last == b';' || last == b'}',
        b'b' | b'i' | b'd' => last == b';',
        _ => false,
    }
}

/// Decode serialized text into a tree.
pub fn decode(text: &str) -> Result<Tree, LegacyError> {
    let trimmed = text.trim();
    let mut parser = Parser {
        input: trimmed.as_bytes(),
        pos: 0,
    };
    let tree = parser.value(0)?;
    if parser.pos != parser.input.len() {
        return Err(LegacyError::TrailingData(parser.pos));
    }
    Ok(tree)
}

/// Encode a tree as serialized text.
pub fn encode(tree: &Tree) -> String {
    let mut out = String::new();
    write_value(tree, &mut out);
    out
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn value(&mut self, depth: usize) -> Result<Tree, LegacyError> {
        if depth > MAX_DEPTH {
            return Err(LegacyError::TooDeep(MAX_DEPTH));
        }
        let start = self.pos;
        let tag = self.next()?;
        if tag == b'N' {
            self.expect(b';')?;
            return Ok(Tree::Null);
        }
        self.expect(b':')?;
        match tag {
            b'b' => match self.int_until(b';')? {
                0 => Ok(Tree::Bool(false)),
                1 => Ok(Tree::Bool(true)),
                _ => Err(LegacyError::InvalidNumber(start)),
            },
            b'i' => Ok(Tree::Int(self.int_until(b';')?)),
            b'd' => {
                let raw = self.token_until(b';')?;
                let value = match raw {
                    "INF" => f64::INFINITY,
                    "-INF" => f64::NEG_INFINITY,
                    "NAN" => f64::NAN,
                    _ => raw
                        .parse::<f64>()
                        .map_err(|_| LegacyError::InvalidNumber(start))?,
                };
                Ok(Tree::Float(value))
            }
            b's' => {
                let s = self.quoted()?;
                self.expect(b';')?;
                Ok(Tree::Str(s))
            }
            b'a' => {
                let fields = self.fields(depth)?;
                Ok(into_seq_or_map(fields))
            }
            b'O' => {
                let class = self.quoted()?;
                self.expect(b':')?;
                let fields = self.fields(depth)?;
                Ok(Tree::Object { class, fields })
            }
            other => Err(LegacyError::UnsupportedTag {
                tag: other as char,
                pos: start,
            }),
        }
    }

    /// `count:{key value ...}`
    fn fields(&mut self, depth: usize) -> Result<IndexMap<Key, Tree>, LegacyError> {
        let count = usize::try_from(self.int_until(b':')?)
            .map_err(|_| LegacyError::InvalidNumber(self.pos))?;
        self.expect(b'{')?;
        let mut fields = IndexMap::with_capacity(count.min(1024));
        for _ in 0..count {
            let key_pos = self.pos;
            let key = match self.value(depth + 1)? {
                Tree::Int(i) => Key::Int(i),
                Tree::Str(s) => Key::Str(s),
                _ => return Err(LegacyError::InvalidKey(key_pos)),
            };
            let value = self.value(depth + 1)?;
            fields.insert(key, value);
        }
        self.expect(b'}')?;
        Ok(fields)
    }

    /// `len:"bytes"`
    fn quoted(&mut self) -> Result<String, LegacyError> {
        let len = usize::try_from(self.int_until(b':')?)
            .map_err(|_| LegacyError::InvalidNumber(self.pos))?;
        self.expect(b'"')?;
        let start = self.pos;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.input.len())
            .ok_or(LegacyError::UnexpectedEnd(self.input.len()))?;
        let s = std::str::from_utf8(&self.input[start..end])
            .map_err(|_| LegacyError::InvalidUtf8(start))?
            .to_string();
        self.pos = end;
        self.expect(b'"')?;
        Ok(s)
    }

    fn int_until(&mut self, terminator: u8) -> Result<i64, LegacyError> {
        let start = self.pos;
        self.token_until(terminator)?
            .parse::<i64>()
            .map_err(|_| LegacyError::InvalidNumber(start))
    }

    /// Consume up to and including `terminator`, returning what came before.
    fn token_until(&mut self, terminator: u8) -> Result<&str, LegacyError> {
        let start = self.pos;
        let offset = self.input[start..]
            .iter()
            .position(|&b| b == terminator)
            .ok_or(LegacyError::UnexpectedEnd(self.input.len()))?;
        self.pos = start + offset + 1;
        std::str::from_utf8(&self.input[start..start + offset])
            .map_err(|_| LegacyError::InvalidNumber(start))
    }

    fn next(&mut self) -> Result<u8, LegacyError> {
        let b = *self
            .input
            .get(self.pos)
            .ok_or(LegacyError::UnexpectedEnd(self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn expect(&mut self, expected: u8) -> Result<(), LegacyError> {
        let pos = self.pos;
        if self.next()? != expected {
            return Err(LegacyError::Expected {
                expected: expected as char,
                pos,
            });
        }
        Ok(())
    }
}

fn into_seq_or_map(fields: IndexMap<Key, Tree>) -> Tree {
    let sequential = fields
        .keys()
        .enumerate()
        .all(|(i, k)| *k == Key::Int(i as i64));
    if sequential {
        Tree::Seq(fields.into_values().collect())
    } else {
        Tree::Map(fields)
    }
}

/// Shortest round-trip digits, written the way the host does: positional while
/// the decimal exponent stays within `-4..=16`, `1.0E+20` style outside it.
fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "NAN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "INF" } else { "-INF" }.to_string();
    }
    let sci = format!("{:e}", f);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return format!("{}", f);
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    if (-4..=16).contains(&exp) {
        return format!("{}", f);
    }
    let point = if mantissa.contains('.') { "" } else { ".0" };
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{}{}E{}{}", mantissa, point, sign, exp.abs())
}

fn write_value(tree: &Tree, out: &mut String) {
    match tree {
        Tree::Null => out.push_str("N;"),
        Tree::Bool(b) => out.push_str(if *b { "b:1;" } else { "b:0;" }),
        Tree::Int(i) => out.push_str(&format!("i:{};", i)),
        Tree::UInt(u) => out.push_str(&format!("i:{};", u)),
        Tree::Float(f) => out.push_str(&format!("d:{};", float_repr(*f))),
        Tree::Str(s) => write_str(s, out),
        Tree::Seq(items) => {
            out.push_str(&format!("a:{}:{{", items.len()));
            for (i, item) in items.iter().enumerate() {
                out.push_str(&format!("i:{};", i));
                write_value(item, out);
            }
            out.push('}');
        }
        Tree::Map(fields) => {
            out.push_str(&format!("a:{}:", fields.len()));
            write_fields(fields, out);
        }
        Tree::Object { class, fields } => {
            out.push_str(&format!("O:{}:\"{}\":{}:", class.len(), class, fields.len()));
            write_fields(fields, out);
        }
    }
}

fn write_fields(fields: &IndexMap<Key, Tree>, out: &mut String) {
    out.push('{');
    for (key, value) in fields {
        match key {
            Key::Int(i) => out.push_str(&format!("i:{};", i)),
            Key::Str(s) => write_str(s, out),
        }
        write_value(value, out);
    }
    out.push('}');
}

fn write_str(s: &str, out: &mut String) {
    out.push_str(&format!("s:{}:\"{}\";", s.len(), s));
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Decoding
    // =========================================================================

    #[test]
    fn decodes_scalars() {
        assert_eq!(decode("N;").unwrap(), Tree::Null);
        assert_eq!(decode("b:1;").unwrap(), Tree::Bool(true));
        assert_eq!(decode("b:0;").unwrap(), Tree::Bool(false));
        assert_eq!(decode("i:-42;").unwrap(), Tree::Int(-42));
        assert_eq!(decode("d:0.5;").unwrap(), Tree::Float(0.5));
        assert_eq!(decode("d:INF;").unwrap(), Tree::Float(f64::INFINITY));
        assert_eq!(decode("s:5:\"hello\";").unwrap(), Tree::Str("hello".into()));
    }

    #[test]
    fn string_length_counts_bytes() {
        // "café" is five bytes
        assert_eq!(decode("s:5:\"café\";").unwrap(), Tree::Str("café".into()));
        assert!(decode("s:4:\"café\";").is_err());
    }

    #[test]
    fn string_may_contain_quotes_and_semicolons() {
        let text = "s:7:\"a\";b:\"c\";";
        assert_eq!(decode(text).unwrap(), Tree::Str("a\";b:\"c".into()));
    }

    #[test]
    fn sequential_array_becomes_seq() {
        let tree = decode("a:2:{i:0;s:1:\"a\";i:1;i:7;}").unwrap();
        assert_eq!(tree, Tree::Seq(vec![Tree::Str("a".into()), Tree::Int(7)]));
    }

    #[test]
    fn keyed_array_becomes_map() {
        let tree = decode("a:2:{s:3:\"url\";s:1:\"u\";i:5;b:1;}").unwrap();
        let Tree::Map(fields) = tree else {
            panic!("expected map");
        };
        assert_eq!(fields[&Key::from("url")], Tree::Str("u".into()));
        assert_eq!(fields[&Key::Int(5)], Tree::Bool(true));
    }

    #[test]
    fn out_of_order_integer_keys_stay_a_map() {
        let tree = decode("a:2:{i:1;N;i:0;N;}").unwrap();
        assert!(matches!(tree, Tree::Map(_)));
    }

    #[test]
    fn decodes_objects() {
        let tree = decode("O:8:\"stdClass\":1:{s:3:\"url\";s:1:\"x\";}").unwrap();
        let Tree::Object { class, fields } = tree else {
            panic!("expected object");
        };
        assert_eq!(class, "stdClass");
        assert_eq!(fields[&Key::from("url")], Tree::Str("x".into()));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(decode("").is_err());
        assert!(decode("hello").is_err());
        assert!(decode("i:abc;").is_err());
        assert!(decode("a:2:{i:0;N;}").is_err());
        assert!(decode("s:10:\"short\";").is_err());
        assert_eq!(decode("i:1;i:2;"), Err(LegacyError::TrailingData(4)));
    }

    #[test]
    fn rejects_references() {
        assert!(matches!(
            decode("a:2:{i:0;s:1:\"a\";i:1;R:2;}"),
            Err(LegacyError::UnsupportedTag { tag: 'R', .. })
        ));
    }

    #[test]
    fn rejects_non_scalar_keys() {
        assert!(matches!(
            decode("a:1:{a:0:{}N;}"),
            Err(LegacyError::InvalidKey(_))
        ));
    }

    #[test]
    fn rejects_runaway_nesting() {
        let levels = MAX_DEPTH + 2;
        let text = "a:1:{i:0;".repeat(levels) + "N;" + &"}".repeat(levels);
        assert_eq!(decode(&text), Err(LegacyError::TooDeep(MAX_DEPTH)));
    }

    #[test]
    fn accepts_nesting_up_to_the_limit() {
        let text = "a:1:{i:0;".repeat(MAX_DEPTH) + "N;" + &"}".repeat(MAX_DEPTH);
        let tree = decode(&text).unwrap();
        assert_eq!(encode(&tree), text);
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    #[test]
    fn unmodified_input_reencodes_identically() {
        let samples = [
            "N;",
            "b:0;",
            "i:12;",
            "d:0.25;",
            "s:0:\"\";",
            "a:0:{}",
            "a:3:{i:0;s:1:\"a\";i:1;a:1:{s:1:\"k\";N;}i:2;d:-1.5;}",
            "a:2:{s:5:\"image\";a:2:{s:3:\"url\";s:22:\"https://x.test/a/b.png\";s:2:\"id\";i:9;}i:4;b:1;}",
            "O:8:\"stdClass\":2:{s:1:\"a\";i:1;s:1:\"b\";a:0:{}}",
        ];
        for text in samples {
            assert_eq!(encode(&decode(text).unwrap()), text, "round-trip of {}", text);
        }
    }

    #[test]
    fn encodes_extreme_magnitudes_in_exponent_form() {
        assert_eq!(encode(&Tree::Float(1e20)), "d:1.0E+20;");
        assert_eq!(encode(&Tree::Float(-2.5e25)), "d:-2.5E+25;");
        assert_eq!(encode(&Tree::Float(1.5e-7)), "d:1.5E-7;");
        assert_eq!(encode(&Tree::Float(1e16)), "d:10000000000000000;");
        assert_eq!(encode(&Tree::Float(0.0001)), "d:0.0001;");
        assert_eq!(encode(&Tree::Float(3.0)), "d:3;");
        assert_eq!(encode(&decode("d:1.0E+20;").unwrap()), "d:1.0E+20;");
    }

    #[test]
    fn encodes_non_finite_floats() {
        assert_eq!(encode(&Tree::Float(f64::NEG_INFINITY)), "d:-INF;");
        assert_eq!(encode(&Tree::Float(f64::NAN)), "d:NAN;");
    }

    // =========================================================================
    // Sniffing
    // =========================================================================

    #[test]
    fn looks_serialized_matches_host_rules() {
        assert!(looks_serialized("N;"));
        assert!(looks_serialized("a:0:{}"));
        assert!(looks_serialized("  s:1:\"x\";  "));
        assert!(looks_serialized("i:5;"));
        assert!(!looks_serialized("i:5"));
        assert!(!looks_serialized("[1,2]"));
        assert!(!looks_serialized("x:1;"));
        assert!(!looks_serialized("a:"));
    }
}
