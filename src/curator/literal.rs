//! Python-literal reader
//!
//! Agents sometimes answer with a Python `repr` instead of JSON: single-quoted
//! strings, `True`/`False`/`None`, tuples, trailing commas. This module reads
//! that dialect into a `serde_json::Value` so the rest of the parser only
//! deals with one representation.

use crate::error::{Error, Result};
use serde_json::{Map, Number, Value};

/// Deepest container nesting accepted, same as serde_json's recursion limit
const MAX_DEPTH: usize = 128;

/// Parse a complete Python literal expression
pub fn parse_python_literal(input: &str) -> Result<Value> {
    let mut reader = Reader {
        chars: input.chars().collect(),
        pos: 0,
        depth: 0,
    };
    let value = reader.value()?;
    reader.skip_ws();
    if reader.pos != reader.chars.len() {
        return Err(reader.error("trailing characters"));
    }
    Ok(value)
}

struct Reader {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Reader {
    fn error(&self, msg: &str) -> Error {
        Error::MalformedAgentResponse(format!("python literal: {} at offset {}", msg, self.pos))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", expected)))
        }
    }

    fn value(&mut self) -> Result<Value> {
        self.skip_ws();
        match self.peek() {
            Some('{') => self.nested(|r| r.dict()),
            Some('[') => self.nested(|r| r.sequence('[', ']')),
            Some('(') => self.nested(|r| r.sequence('(', ')')),
            Some('\'') | Some('"') => self.strings().map(Value::String),
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_alphabetic() => self.keyword(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn nested<F>(&mut self, read: F) -> Result<Value>
    where
        F: FnOnce(&mut Self) -> Result<Value>,
    {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        self.depth += 1;
        let value = read(self);
        self.depth -= 1;
        value
    }

    fn dict(&mut self) -> Result<Value> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(Value::Object(map));
            }
            let key = match self.value()? {
                Value::String(s) => s,
                other => other.to_string(),
            };
            self.expect(':')?;
            let value = self.value()?;
            map.insert(key, value);

            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {}
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn sequence(&mut self, open: char, close: char) -> Result<Value> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(Value::Array(items));
            }
            items.push(self.value()?);

            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(c) if c == close => {}
                _ => return Err(self.error(&format!("expected ',' or '{}'", close))),
            }
        }
    }

    /// One or more adjacent string literals, concatenated
    fn strings(&mut self) -> Result<String> {
        let mut out = self.string()?;
        loop {
            let save = self.pos;
            self.skip_ws();
            match self.peek() {
                Some('\'') | Some('"') => out.push_str(&self.string()?),
                _ => {
                    self.pos = save;
                    return Ok(out);
                }
            }
        }
    }

    fn string(&mut self) -> Result<String> {
        let quote = self.peek().ok_or_else(|| self.error("expected string"))?;
        self.pos += 1;
        let mut out = String::new();
        loop {
            let c = self
                .peek()
                .ok_or_else(|| self.error("unterminated string"))?;
            self.pos += 1;
            if c == quote {
                return Ok(out);
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            let escaped = self
                .peek()
                .ok_or_else(|| self.error("unterminated escape"))?;
            self.pos += 1;
            match escaped {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                '\\' | '\'' | '"' => out.push(escaped),
                '\n' => {}
                'x' => out.push(self.hex_escape(2)?),
                'u' => out.push(self.hex_escape(4)?),
                'U' => out.push(self.hex_escape(8)?),
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
        }
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char> {
        let end = self.pos + digits;
        if end > self.chars.len() {
            return Err(self.error("truncated escape"));
        }
        let hex: String = self.chars[self.pos..end].iter().collect();
        self.pos = end;
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error("invalid escape"))
    }

    fn number(&mut self) -> Result<Value> {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E' | '_')
        ) {
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();

        if let Ok(i) = raw.parse::<i64>() {
            return Ok(Value::Number(i.into()));
        }
        raw.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| self.error("invalid number"))
    }

    fn keyword(&mut self) -> Result<Value> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            "None" | "null" => Ok(Value::Null),
            _ => {
                self.pos = start;
                Err(self.error(&format!("unknown identifier '{}'", word)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_quoted_dict() {
        let value = parse_python_literal(
            "{'session_summary': 'Fixed the bug', 'memories': [{'content': 'x', 'importance_weight': 0.9, 'action_required': False}]}",
        )
        .unwrap();
        assert_eq!(value["session_summary"], "Fixed the bug");
        assert_eq!(value["memories"][0]["importance_weight"], 0.9);
        assert_eq!(value["memories"][0]["action_required"], false);
    }

    #[test]
    fn test_python_constants_and_tuples() {
        let value = parse_python_literal("{'a': None, 'b': True, 'c': (1, 2,), 'd': -3.5e1}").unwrap();
        assert_eq!(value, json!({"a": null, "b": true, "c": [1, 2], "d": -35.0}));
    }

    #[test]
    fn test_escapes_and_mixed_quotes() {
        let value = parse_python_literal(r#"["it's", 'say \'hi\'', 'tab\there', 'é']"#).unwrap();
        assert_eq!(value, json!(["it's", "say 'hi'", "tab\there", "é"]));
    }

    #[test]
    fn test_adjacent_strings_concatenate() {
        let value = parse_python_literal("{'k': 'one ' 'two'}").unwrap();
        assert_eq!(value["k"], "one two");
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let deep = format!("{}{}", "[".repeat(200_000), "]".repeat(200_000));
        assert!(matches!(
            parse_python_literal(&deep),
            Err(Error::MalformedAgentResponse(_))
        ));

        let shallow = format!("{}{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert!(parse_python_literal(&shallow).is_ok());
    }

    #[test]
    fn test_trailing_commas() {
        let value = parse_python_literal("{'tags': ['a', 'b',],}").unwrap();
        assert_eq!(value, json!({"tags": ["a", "b"]}));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_python_literal("{'a': undefined}").is_err());
        assert!(parse_python_literal("{'a': 'unterminated}").is_err());
        assert!(parse_python_literal("[1, 2] extra").is_err());
        assert!(parse_python_literal("").is_err());
    }
}
