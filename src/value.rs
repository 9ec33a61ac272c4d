//! Dynamically-typed JSON value and its codec.
//!
//! Language servers speak JSON-RPC, and the envelope shapes vary enough
//! between servers that the client works on a dynamic [`Value`] rather than
//! fixed structs. Arrays and objects own their children; `Clone` is a deep
//! copy, so two values never alias the same container.

use std::fmt;

/// A JSON value.
///
/// Numbers keep their written form: anything without a fraction or exponent
/// parses as `Int`, everything else as `Float`. Serializing preserves that
/// tag, so `parse(serialize(v))` is structurally equal to `v`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    Object(Object),
}

/// A JSON object with unique keys and stable insertion order.
///
/// Serialization emits entries in stored order and never reorders them.
/// Equality is order-insensitive.
#[derive(Debug, Clone, Default)]
pub struct Object {
    entries: Vec<(String, Value)>,
}

impl Object {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key, replacing the value in place if the key already exists.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl Value {
    /// Build an object value from key/value pairs.
    pub fn object<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut object = Object::new();
        for (key, value) in entries {
            object.insert(key, value);
        }
        Value::Object(object)
    }

    /// Build an array value.
    pub fn array<V, I>(items: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Object member lookup; `None` for non-objects and missing keys.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object()?.get(key)
    }

    /// Parse a JSON document. Trailing non-whitespace is an error.
    pub fn parse(text: &str) -> Result<Value, ParseError> {
        let mut parser = Parser { text, pos: 0 };
        let value = parser.parse_value()?;
        parser.skip_whitespace();
        if parser.pos < parser.text.len() {
            return Err(ParseError::UnexpectedChar {
                ch: parser.peek_char(),
                at: parser.pos,
            });
        }
        Ok(value)
    }

    /// Serialize to compact JSON.
    ///
    /// Escapes the named control characters, `\u00XX` for the rest below
    /// 0x20. Object keys are written in stored order. Floats always carry a
    /// fraction or exponent so the `Int`/`Float` tag survives a round-trip;
    /// non-finite floats become `null`.
    #[must_use]
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        write_value(&mut out, self);
        out
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

/// Why a JSON document failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unexpected character `{ch}` at byte {at}")]
    UnexpectedChar { ch: char, at: usize },
    #[error("expected `{expected}` at byte {at}")]
    Expected { expected: char, at: usize },
    #[error("invalid escape sequence at byte {at}")]
    InvalidEscape { at: usize },
    #[error("invalid number at byte {at}")]
    InvalidNumber { at: usize },
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes().get(self.pos).copied()
    }

    /// The char at the cursor, for error reporting. Caller checks bounds.
    fn peek_char(&self) -> char {
        self.text[self.pos..].chars().next().unwrap_or('\0')
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: u8) -> Result<(), ParseError> {
        match self.peek() {
            None => Err(ParseError::UnexpectedEnd),
            Some(b) if b == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(_) => Err(ParseError::Expected {
                expected: expected as char,
                at: self.pos,
            }),
        }
    }

    fn parse_value(&mut self) -> Result<Value, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            None => Err(ParseError::UnexpectedEnd),
            Some(b'"') => Ok(Value::Str(self.parse_string()?)),
            Some(b'{') => self.parse_object(),
            Some(b'[') => self.parse_array(),
            Some(b't') => self.parse_keyword("true", Value::Bool(true)),
            Some(b'f') => self.parse_keyword("false", Value::Bool(false)),
            Some(b'n') => self.parse_keyword("null", Value::Null),
            Some(b) if b == b'-' || b.is_ascii_digit() => self.parse_number(),
            Some(_) => Err(ParseError::UnexpectedChar {
                ch: self.peek_char(),
                at: self.pos,
            }),
        }
    }

    fn parse_keyword(&mut self, keyword: &str, value: Value) -> Result<Value, ParseError> {
        let end = self.pos + keyword.len();
        if end > self.text.len() {
            return Err(ParseError::UnexpectedEnd);
        }
        // Checked slice: `end` may fall inside a multi-byte char.
        if self.text.get(self.pos..end) == Some(keyword) {
            self.pos = end;
            Ok(value)
        } else {
            Err(ParseError::UnexpectedChar {
                ch: self.peek_char(),
                at: self.pos,
            })
        }
    }

    fn parse_string(&mut self) -> Result<String, ParseError> {
        self.expect(b'"')?;
        let mut out = String::new();
        let mut run_start = self.pos;
        loop {
            match self.peek() {
                None => return Err(ParseError::UnexpectedEnd),
                Some(b'"') => {
                    out.push_str(&self.text[run_start..self.pos]);
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'\\') => {
                    out.push_str(&self.text[run_start..self.pos]);
                    self.pos += 1;
                    out.push(self.parse_escape()?);
                    run_start = self.pos;
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn parse_escape(&mut self) -> Result<char, ParseError> {
        let at = self.pos - 1;
        let Some(escape) = self.peek() else {
            return Err(ParseError::UnexpectedEnd);
        };
        self.pos += 1;
        match escape {
            b'"' => Ok('"'),
            b'\\' => Ok('\\'),
            b'/' => Ok('/'),
            b'b' => Ok('\u{8}'),
            b'f' => Ok('\u{c}'),
            b'n' => Ok('\n'),
            b'r' => Ok('\r'),
            b't' => Ok('\t'),
            b'u' => {
                let end = self.pos + 4;
                if end > self.text.len() {
                    return Err(ParseError::UnexpectedEnd);
                }
                let Some(hex) = self.text.get(self.pos..end) else {
                    return Err(ParseError::InvalidEscape { at });
                };
                let code_point = u32::from_str_radix(hex, 16)
                    .map_err(|_| ParseError::InvalidEscape { at })?;
                self.pos = end;
                // Each \uXXXX decodes independently; code points a Rust
                // char cannot hold (unpaired surrogates) become U+FFFD.
                Ok(char::from_u32(code_point).unwrap_or(char::REPLACEMENT_CHARACTER))
            }
            _ => Err(ParseError::InvalidEscape { at }),
        }
    }

    fn parse_number(&mut self) -> Result<Value, ParseError> {
        let start = self.pos;
        let mut is_float = false;

        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        if self.digit_run() == 0 {
            return self.number_error(start);
        }
        if self.peek() == Some(b'.') {
            is_float = true;
            self.pos += 1;
            if self.digit_run() == 0 {
                return self.number_error(start);
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            is_float = true;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if self.digit_run() == 0 {
                return self.number_error(start);
            }
        }

        let literal = &self.text[start..self.pos];
        if is_float {
            literal
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| ParseError::InvalidNumber { at: start })
        } else if let Ok(int) = literal.parse::<i64>() {
            Ok(Value::Int(int))
        } else {
            // Integer literal too large for i64; keep the value as a float.
            literal
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| ParseError::InvalidNumber { at: start })
        }
    }

    fn digit_run(&mut self) -> usize {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        self.pos - start
    }

    fn number_error(&self, start: usize) -> Result<Value, ParseError> {
        if self.pos >= self.text.len() {
            Err(ParseError::UnexpectedEnd)
        } else {
            Err(ParseError::InvalidNumber { at: start })
        }
    }

    fn parse_object(&mut self) -> Result<Value, ParseError> {
        self.expect(b'{')?;
        let mut object = Object::new();
        self.skip_whitespace();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(Value::Object(object));
        }
        loop {
            self.skip_whitespace();
            let key = self.parse_string()?;
            self.skip_whitespace();
            self.expect(b':')?;
            let value = self.parse_value()?;
            object.insert(key, value);
            self.skip_whitespace();
            match self.peek() {
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Value::Object(object));
                }
                Some(b',') => self.pos += 1,
                None => return Err(ParseError::UnexpectedEnd),
                Some(_) => {
                    return Err(ParseError::Expected {
                        expected: ',',
                        at: self.pos,
                    });
                }
            }
        }
    }

    fn parse_array(&mut self) -> Result<Value, ParseError> {
        self.expect(b'[')?;
        let mut items = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(Value::Array(items));
        }
        loop {
            items.push(self.parse_value()?);
            self.skip_whitespace();
            match self.peek() {
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Value::Array(items));
                }
                Some(b',') => self.pos += 1,
                None => return Err(ParseError::UnexpectedEnd),
                Some(_) => {
                    return Err(ParseError::Expected {
                        expected: ',',
                        at: self.pos,
                    });
                }
            }
        }
    }
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Float(f) => write_float(out, *f),
        Value::Str(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(object) => {
            out.push('{');
            for (i, (key, item)) in object.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

fn write_float(out: &mut String, f: f64) {
    if f.is_finite() {
        let text = f.to_string();
        let tagged = text.contains(['.', 'e', 'E']);
        out.push_str(&text);
        if !tagged {
            out.push_str(".0");
        }
    } else {
        // JSON has no NaN/Infinity literal.
        out.push_str("null");
    }
}

fn write_string(out: &mut String, s: &str) {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ch if (ch as u32) < 0x20 => {
                let n = ch as u32;
                out.push_str("\\u00");
                out.push(HEX[(n >> 4) as usize] as char);
                out.push(HEX[(n & 0xf) as usize] as char);
            }
            ch => out.push(ch),
        }
    }
    out.push('"');
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scalars() {
        assert_eq!(Value::parse("null").unwrap(), Value::Null);
        assert_eq!(Value::parse("true").unwrap(), Value::Bool(true));
        assert_eq!(Value::parse("false").unwrap(), Value::Bool(false));
        assert_eq!(Value::parse("42").unwrap(), Value::Int(42));
        assert_eq!(Value::parse("-7").unwrap(), Value::Int(-7));
        assert_eq!(Value::parse("\"hi\"").unwrap(), Value::Str("hi".into()));
    }

    #[test]
    fn numbers_without_fraction_are_int() {
        assert_eq!(Value::parse("123").unwrap(), Value::Int(123));
        assert_eq!(Value::parse("1.5").unwrap(), Value::Float(1.5));
        assert_eq!(Value::parse("1e3").unwrap(), Value::Float(1000.0));
        assert_eq!(Value::parse("-2.5e-1").unwrap(), Value::Float(-0.25));
    }

    #[test]
    fn huge_integer_falls_back_to_float() {
        let v = Value::parse("99999999999999999999999").unwrap();
        assert!(matches!(v, Value::Float(_)));
    }

    #[test]
    fn parse_nested_structures() {
        let v = Value::parse(r#"{"a":[1,2,{"b":null}],"c":{"d":true}}"#).unwrap();
        assert_eq!(v.get("a").unwrap().as_array().unwrap().len(), 3);
        assert_eq!(
            v.get("c").unwrap().get("d").unwrap(),
            &Value::Bool(true)
        );
    }

    #[test]
    fn parse_string_escapes() {
        let v = Value::parse(r#""a\"b\\c\/d\b\f\n\r\t""#).unwrap();
        assert_eq!(v.as_str().unwrap(), "a\"b\\c/d\u{8}\u{c}\n\r\t");
    }

    #[test]
    fn parse_unicode_escapes() {
        assert_eq!(Value::parse(r#""A""#).unwrap().as_str().unwrap(), "A");
        assert_eq!(
            Value::parse(r#""é""#).unwrap().as_str().unwrap(),
            "é"
        );
        assert_eq!(
            Value::parse(r#""€""#).unwrap().as_str().unwrap(),
            "€"
        );
    }

    #[test]
    fn lone_surrogate_escape_is_replacement() {
        let v = Value::parse(r#""\ud800""#).unwrap();
        assert_eq!(v.as_str().unwrap(), "\u{fffd}");
    }

    #[test]
    fn parse_whitespace_tolerant() {
        let v = Value::parse(" { \"a\" : [ 1 , 2 ] } ").unwrap();
        assert_eq!(v.get("a").unwrap().as_array().unwrap().len(), 2);
    }

    #[test]
    fn unexpected_end_inside_string() {
        assert_eq!(
            Value::parse("\"abc").unwrap_err(),
            ParseError::UnexpectedEnd
        );
    }

    #[test]
    fn unexpected_end_inside_number() {
        assert_eq!(Value::parse("1.").unwrap_err(), ParseError::UnexpectedEnd);
        assert_eq!(Value::parse("-").unwrap_err(), ParseError::UnexpectedEnd);
        assert_eq!(Value::parse("1e").unwrap_err(), ParseError::UnexpectedEnd);
    }

    #[test]
    fn unexpected_end_inside_containers() {
        assert_eq!(
            Value::parse(r#"{"a":1"#).unwrap_err(),
            ParseError::UnexpectedEnd
        );
        assert_eq!(Value::parse("[1,2").unwrap_err(), ParseError::UnexpectedEnd);
    }

    #[test]
    fn missing_delimiters() {
        assert!(matches!(
            Value::parse(r#"{"a" 1}"#).unwrap_err(),
            ParseError::Expected { expected: ':', .. }
        ));
        assert!(matches!(
            Value::parse("[1 2]").unwrap_err(),
            ParseError::Expected { expected: ',', .. }
        ));
    }

    #[test]
    fn invalid_escape_is_error() {
        assert!(matches!(
            Value::parse(r#""\q""#).unwrap_err(),
            ParseError::InvalidEscape { .. }
        ));
    }

    #[test]
    fn trailing_garbage_is_error() {
        assert!(matches!(
            Value::parse("{} x").unwrap_err(),
            ParseError::UnexpectedChar { ch: 'x', .. }
        ));
    }

    #[test]
    fn serialize_escapes_control_characters() {
        let v = Value::Str("a\u{1}b\nc\"d".into());
        assert_eq!(v.serialize(), r#""a\u0001b\nc\"d""#);
    }

    #[test]
    fn serialize_preserves_key_order() {
        let v = Value::object([
            ("zebra", Value::Int(1)),
            ("alpha", Value::Int(2)),
            ("mid", Value::Int(3)),
        ]);
        assert_eq!(v.serialize(), r#"{"zebra":1,"alpha":2,"mid":3}"#);
    }

    #[test]
    fn serialize_float_keeps_tag() {
        assert_eq!(Value::Float(1.0).serialize(), "1.0");
        assert_eq!(Value::parse("1.0").unwrap(), Value::Float(1.0));
        assert_eq!(
            Value::parse(&Value::Float(1.0).serialize()).unwrap(),
            Value::Float(1.0)
        );
    }

    #[test]
    fn object_insert_replaces_existing_key() {
        let mut object = Object::new();
        object.insert("a", Value::Int(1));
        object.insert("b", Value::Int(2));
        object.insert("a", Value::Int(3));
        assert_eq!(object.len(), 2);
        assert_eq!(object.get("a"), Some(&Value::Int(3)));
        // Replacement keeps the original slot.
        assert_eq!(
            Value::Object(object).serialize(),
            r#"{"a":3,"b":2}"#
        );
    }

    #[test]
    fn object_equality_ignores_order() {
        let a = Value::object([("x", Value::Int(1)), ("y", Value::Int(2))]);
        let b = Value::object([("y", Value::Int(2)), ("x", Value::Int(1))]);
        assert_eq!(a, b);
    }

    #[test]
    fn round_trip_structural_equality() {
        let v = Value::object([
            ("null", Value::Null),
            ("flag", Value::Bool(true)),
            ("int", Value::Int(-42)),
            ("float", Value::Float(2.75)),
            ("text", Value::Str("héllo\t\"wörld\"\u{1}".into())),
            (
                "nested",
                Value::array([
                    Value::Int(1),
                    Value::object([("inner", Value::Str("日本語".into()))]),
                    Value::Array(vec![]),
                    Value::Object(Object::new()),
                ]),
            ),
        ]);
        assert_eq!(Value::parse(&v.serialize()).unwrap(), v);
    }

    #[test]
    fn clone_is_deep() {
        let mut original = Object::new();
        original.insert("items", Value::array([Value::Int(1)]));
        let copy = original.clone();
        original.insert("items", Value::array([Value::Int(1), Value::Int(2)]));
        assert_eq!(copy.get("items").unwrap().as_array().unwrap().len(), 1);
    }

    #[test]
    fn serializer_output_is_valid_json() {
        let v = Value::object([
            ("text", Value::Str("line\nbreak \u{1f600} \u{2} ok".into())),
            ("n", Value::Float(0.5)),
            ("list", Value::array([Value::Bool(false), Value::Null])),
        ]);
        let parsed: serde_json::Value = serde_json::from_str(&v.serialize()).unwrap();
        assert_eq!(parsed["text"], "line\nbreak \u{1f600} \u{2} ok");
        assert_eq!(parsed["n"], 0.5);
        assert_eq!(parsed["list"][0], false);
    }
}
