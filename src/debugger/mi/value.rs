//! MI value grammar.
//!
//! ```text
//! results := result ( "," result )*
//! result  := key "=" value
//! value   := const | tuple | list
//! const   := c-string
//! tuple   := "{}" | "{" results "}"
//! list    := "[]" | "[" value ( "," value )* "]" | "[" result ( "," result )* "]"
//! ```
//!
//! Keys of list elements are dropped, anonymous tuples are allowed inside lists.
//! Quoted decimal literals without leading zeroes become [`Value::Int`], hex literals become
//! [`Value::Addr`].

use crate::debugger::error::Error;
use indexmap::IndexMap;
use std::fmt::{Display, Formatter, Write};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(u64),
    Addr(u64),
    Str(String),
    Tuple(Tuple),
    List(Vec<Value>),
}

impl Value {
    /// Coerce the content of a quoted MI string.
    pub fn from_bare(s: &str) -> Value {
        let bytes = s.as_bytes();
        let is_dec = !bytes.is_empty()
            && bytes.iter().all(u8::is_ascii_digit)
            && (bytes.len() == 1 || bytes[0] != b'0');
        if is_dec {
            if let Ok(v) = s.parse::<u64>() {
                return Value::Int(v);
            }
        }
        if let Some(hex) = s.strip_prefix("0x") {
            if !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                if let Ok(v) = u64::from_str_radix(hex, 16) {
                    return Value::Addr(v);
                }
            }
        }
        Value::Str(s.to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of a scalar, strings are parsed as decimals.
    pub fn as_int(&self) -> Option<u64> {
        match self {
            Value::Int(v) | Value::Addr(v) => Some(*v),
            Value::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&Tuple> {
        match self {
            Value::Tuple(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Text of a scalar as gdb sent it (modulo leading zeroes of hex values).
    pub fn to_text(&self) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Addr(v) => format!("{v:#x}"),
            Value::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "\"{v}\""),
            Value::Addr(v) => write!(f, "\"{v:#x}\""),
            Value::Str(s) => {
                f.write_char('"')?;
                f.write_str(&escape(s))?;
                f.write_char('"')
            }
            Value::Tuple(t) => write!(f, "{{{t}}}"),
            Value::List(l) => {
                f.write_char('[')?;
                for (i, v) in l.iter().enumerate() {
                    if i > 0 {
                        f.write_char(',')?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_char(']')
            }
        }
    }
}

/// Ordered set of `key=value` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tuple(IndexMap<String, Value>);

impl Tuple {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn str(&self, key: &'static str) -> Result<&str, Error> {
        self.get(key)
            .and_then(Value::as_str)
            .ok_or(Error::MissingField(key))
    }

    /// Any scalar as text.
    pub fn text(&self, key: &'static str) -> Result<String, Error> {
        match self.get(key) {
            Some(v @ (Value::Int(_) | Value::Addr(_) | Value::Str(_))) => Ok(v.to_text()),
            _ => Err(Error::MissingField(key)),
        }
    }

    pub fn int(&self, key: &'static str) -> Result<u64, Error> {
        self.get(key)
            .and_then(Value::as_int)
            .ok_or(Error::MissingField(key))
    }

    pub fn tuple(&self, key: &'static str) -> Result<&Tuple, Error> {
        self.get(key)
            .and_then(Value::as_tuple)
            .ok_or(Error::MissingField(key))
    }

    pub fn list(&self, key: &'static str) -> Result<&[Value], Error> {
        self.get(key)
            .and_then(Value::as_list)
            .ok_or(Error::MissingField(key))
    }
}

impl Display for Tuple {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_char(',')?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// Decode a C string body (without the surrounding quotes).
pub fn unescape(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b != b'\\' || i + 1 == bytes.len() {
            out.push(b);
            i += 1;
            continue;
        }
        let next = bytes[i + 1];
        i += 2;
        match next {
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'r' => out.push(b'\r'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'v' => out.push(0x0b),
            b'e' => out.push(0x1b),
            b'0'..=b'7' => {
                // at most three digits and never above one byte, `\777` is `\77` then `7`
                let mut code = next - b'0';
                let mut digits = 1;
                while digits < 3 && i < bytes.len() && (b'0'..=b'7').contains(&bytes[i]) {
                    let Some(wider) = code
                        .checked_mul(8)
                        .and_then(|c| c.checked_add(bytes[i] - b'0'))
                    else {
                        break;
                    };
                    code = wider;
                    i += 1;
                    digits += 1;
                }
                out.push(code);
            }
            other => out.push(other),
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, msg: &'static str) -> Error {
        Error::Parse {
            text: self.text.to_string(),
            pos: self.pos,
            msg,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn expect(&mut self, b: u8, msg: &'static str) -> Result<(), Error> {
        if self.peek() == Some(b) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(msg))
        }
    }

    fn results(&mut self, terminator: Option<u8>) -> Result<Tuple, Error> {
        let mut tuple = Tuple::default();
        if self.peek() == terminator {
            return Ok(tuple);
        }
        loop {
            let (key, value) = self.result()?;
            tuple.insert(key, value);
            match self.peek() {
                Some(b',') => self.pos += 1,
                p if p == terminator => return Ok(tuple),
                None => return Err(self.error("unbalanced braces")),
                Some(_) => return Err(self.error("expect `,`")),
            }
        }
    }

    fn result(&mut self) -> Result<(String, Value), Error> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            match b {
                b'=' => break,
                b',' | b'{' | b'}' | b'[' | b']' | b'"' => return Err(self.error("missing `=`")),
                _ => self.pos += 1,
            }
        }
        if self.peek().is_none() {
            return Err(self.error("missing `=`"));
        }
        if self.pos == start {
            return Err(self.error("empty key"));
        }
        let key = self.text[start..self.pos].to_string();
        self.pos += 1;
        Ok((key, self.value()?))
    }

    fn value(&mut self) -> Result<Value, Error> {
        match self.peek() {
            Some(b'"') => self.c_string().map(|s| Value::from_bare(&s)),
            Some(b'{') => {
                self.pos += 1;
                let t = self.results(Some(b'}'))?;
                self.expect(b'}', "unbalanced braces")?;
                Ok(Value::Tuple(t))
            }
            Some(b'[') => {
                self.pos += 1;
                let l = self.list()?;
                self.expect(b']', "unbalanced brackets")?;
                Ok(Value::List(l))
            }
            _ => Err(self.error("expect value")),
        }
    }

    fn list(&mut self) -> Result<Vec<Value>, Error> {
        let mut list = vec![];
        if self.peek() == Some(b']') {
            return Ok(list);
        }
        loop {
            let item = match self.peek() {
                Some(b'"' | b'{' | b'[') => self.value()?,
                Some(_) => self.result()?.1,
                None => return Err(self.error("unbalanced brackets")),
            };
            list.push(item);
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => return Ok(list),
                None => return Err(self.error("unbalanced brackets")),
                Some(_) => return Err(self.error("expect `,`")),
            }
        }
    }

    /// Read a quoted string, return its unescaped body.
    fn c_string(&mut self) -> Result<String, Error> {
        self.expect(b'"', "expect `\"`")?;
        let start = self.pos;
        let bytes = self.text.as_bytes();
        while self.pos < bytes.len() {
            match bytes[self.pos] {
                b'\\' => self.pos += 2,
                b'"' => {
                    let body = &self.text[start..self.pos];
                    self.pos += 1;
                    return Ok(unescape(body));
                }
                _ => self.pos += 1,
            }
        }
        Err(self.error("unterminated string"))
    }
}

/// Parse a comma separated list of `key=value` pairs.
pub fn parse_tuple(payload: &str) -> Result<Tuple, Error> {
    let mut parser = Parser {
        text: payload,
        pos: 0,
    };
    let tuple = parser.results(None)?;
    if parser.pos != payload.len() {
        return Err(parser.error("trailing characters"));
    }
    Ok(tuple)
}

/// Parse a C string including its quotes, used for console stream records.
pub fn parse_c_string(text: &str) -> Result<String, Error> {
    let mut parser = Parser { text, pos: 0 };
    let s = parser.c_string()?;
    if parser.pos != text.len() {
        return Err(parser.error("trailing characters"));
    }
    Ok(s)
}
