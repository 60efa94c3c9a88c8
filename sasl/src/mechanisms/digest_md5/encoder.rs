//! The DIGEST-MD5 directive list codec.
//!
//! Messages are `key=value` directives separated by commas, without whitespace. Each
//! directive name has its own value grammar. The `qop` and `cipher` directives are quoted
//! lists when sent by the server and bare tokens when sent by the client.

use std::str;

use crate::common::{Message, Role, Value};
use crate::error::EncodingError;

/// Directives which may appear at most once in a message.
pub const ONCE_ONLY: [&str; 11] = [
    "stale",
    "maxbuf",
    "charset",
    "algorithm",
    "nonce",
    "cnonce",
    "nc",
    "qop",
    "digest-uri",
    "response",
    "cipher",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grammar {
    Quoted,
    Choice,
    Literal(&'static str),
    Digits,
    Hex(usize),
}

fn grammar(name: &str) -> Option<Grammar> {
    Some(match name {
        "realm" | "nonce" | "username" | "cnonce" | "authzid" | "digest-uri" => Grammar::Quoted,
        "qop" | "cipher" => Grammar::Choice,
        "stale" => Grammar::Literal("true"),
        "algorithm" => Grammar::Literal("md5-sess"),
        "charset" => Grammar::Literal("utf-8"),
        "maxbuf" => Grammar::Digits,
        "nc" => Grammar::Hex(8),
        "response" | "rspauth" => Grammar::Hex(32),
        _ => return None,
    })
}

/// Decodes a message received by `role`. Empty input has no directives.
pub fn decode(data: &[u8], role: Role) -> Result<Message, EncodingError> {
    let text = str::from_utf8(data).map_err(|_| EncodingError::InvalidUtf8)?;
    let mut message = Message::new();
    if text.is_empty() {
        return Ok(message);
    }
    let mut cursor = Cursor::new(text);
    // A client receives what the server sent.
    let lists = !role.is_server();

    loop {
        let name = cursor.key()?;
        let value = match grammar(name) {
            Some(Grammar::Quoted) => Value::Text(cursor.quoted()?),
            Some(Grammar::Choice) if lists => Value::List(split_list(&cursor.quoted()?)),
            Some(Grammar::Choice) => Value::Text(cursor.token()?.to_owned()),
            Some(Grammar::Literal(literal)) => Value::Text(cursor.literal(literal)?.to_owned()),
            Some(Grammar::Digits) => Value::Number(cursor.digits()?),
            Some(Grammar::Hex(length)) => {
                let hex = cursor.hex(length)?;
                if name == "nc" {
                    Value::Number(
                        u32::from_str_radix(hex, 16).map_err(|_| EncodingError::ExpectedHex)?,
                    )
                } else {
                    Value::Text(hex.to_owned())
                }
            }
            None => return Err(EncodingError::UnsupportedDirective(name.to_owned())),
        };

        let done = cursor.at_end();
        if !done && !cursor.eat(b',') {
            return Err(EncodingError::ExpectedComma(name.to_owned()));
        }
        if ONCE_ONLY.contains(&name) && message.has(name) {
            return Err(EncodingError::DuplicateDirective(name.to_owned()));
        }
        insert(&mut message, name, value);

        if done {
            return Ok(message);
        }
    }
}

/// Encodes a message sent by `role`, in insertion order.
pub fn encode(message: &Message, role: Role) -> Result<Vec<u8>, EncodingError> {
    let lists = role.is_server();
    let mut directives = Vec::with_capacity(message.len());

    for (name, value) in message.iter() {
        let grammar =
            grammar(name).ok_or_else(|| EncodingError::UnsupportedDirective(name.to_owned()))?;
        let wrong_type = || EncodingError::WrongValueType(name.to_owned());
        match grammar {
            Grammar::Quoted => match value {
                Value::Text(text) => directives.push(format!("{}=\"{}\"", name, escape(text))),
                Value::List(list) if name == "realm" => {
                    for realm in list {
                        directives.push(format!("{}=\"{}\"", name, escape(realm)));
                    }
                }
                _ => return Err(wrong_type()),
            },
            Grammar::Choice if lists => match value {
                Value::Number(_) => return Err(wrong_type()),
                _ => directives.push(format!("{}=\"{}\"", name, escape(&value.as_list().join(",")))),
            },
            Grammar::Choice => {
                let token = value.as_str().ok_or_else(wrong_type)?;
                if token.is_empty() || !token.bytes().all(is_token_byte) {
                    return Err(EncodingError::MalformedToken);
                }
                directives.push(format!("{}={}", name, token));
            }
            Grammar::Literal(literal) => {
                if value.as_str() != Some(literal) {
                    return Err(EncodingError::ExpectedLiteral(literal));
                }
                directives.push(format!("{}={}", name, literal));
            }
            Grammar::Digits => match value {
                Value::Number(number) => directives.push(format!("{}={}", name, number)),
                Value::Text(text)
                    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) =>
                {
                    directives.push(format!("{}={}", name, text))
                }
                Value::Text(_) => return Err(EncodingError::ExpectedDigits),
                Value::List(_) => return Err(wrong_type()),
            },
            Grammar::Hex(length) => match value {
                Value::Number(number) if length == 8 => {
                    directives.push(format!("{}={:08x}", name, number))
                }
                Value::Text(text) => {
                    if text.len() != length || !text.bytes().all(is_lower_hex_byte) {
                        return Err(EncodingError::EncodedHexLength(length));
                    }
                    directives.push(format!("{}={}", name, text));
                }
                _ => return Err(wrong_type()),
            },
        }
    }

    Ok(directives.join(",").into_bytes())
}

fn insert(message: &mut Message, name: &str, value: Value) {
    if name == "realm" {
        if let (Some(existing), Value::Text(realm)) = (message.get(name), &value) {
            let mut realms: Vec<String> =
                existing.as_list().into_iter().map(str::to_owned).collect();
            realms.push(realm.clone());
            message.set(name, realms);
            return;
        }
    }
    message.set(name, value);
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .filter(|entry| !entry.is_empty())
        .map(str::to_owned)
        .collect()
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\\' || c == '"' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn is_token_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'-'
}

fn is_lower_hex_byte(byte: u8) -> bool {
    byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte)
}

/// Position within the message being decoded.
struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Cursor<'a> {
        Cursor { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.rest().as_bytes().first() == Some(&byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consumes the longest run of bytes matching `accept`.
    fn span(&mut self, accept: impl Fn(u8) -> bool) -> &'a str {
        let rest = self.rest();
        let length = rest.bytes().take_while(|&b| accept(b)).count();
        self.pos += length;
        &rest[..length]
    }

    fn key(&mut self) -> Result<&'a str, EncodingError> {
        let name = self.span(|b| b.is_ascii_alphabetic() || b == b'-');
        if name.is_empty() || !self.eat(b'=') {
            return Err(EncodingError::ExpectedKey);
        }
        if self.at_end() {
            return Err(EncodingError::ExpectedValue);
        }
        Ok(name)
    }

    fn quoted(&mut self) -> Result<String, EncodingError> {
        if !self.eat(b'"') {
            return Err(EncodingError::ExpectedQuotedString);
        }
        let mut value = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((offset, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += offset + 1;
                    return Ok(value);
                }
                '\\' => match chars.next() {
                    Some((_, escaped)) => value.push(escaped),
                    None => break,
                },
                _ => value.push(c),
            }
        }
        Err(EncodingError::ExpectedQuotedString)
    }

    fn token(&mut self) -> Result<&'a str, EncodingError> {
        let token = self.span(is_token_byte);
        if token.is_empty() {
            return Err(EncodingError::MalformedToken);
        }
        Ok(token)
    }

    fn literal(&mut self, literal: &'static str) -> Result<&'static str, EncodingError> {
        if !self.rest().starts_with(literal) {
            return Err(EncodingError::ExpectedLiteral(literal));
        }
        self.pos += literal.len();
        Ok(literal)
    }

    fn digits(&mut self) -> Result<u32, EncodingError> {
        self.span(|b| b.is_ascii_digit())
            .parse()
            .map_err(|_| EncodingError::ExpectedDigits)
    }

    fn hex(&mut self, length: usize) -> Result<&'a str, EncodingError> {
        let hex = self.span(is_lower_hex_byte);
        if hex.is_empty() {
            return Err(EncodingError::ExpectedHex);
        }
        if hex.len() != length {
            return Err(EncodingError::HexLength(length));
        }
        Ok(hex)
    }
}
