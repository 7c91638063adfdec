//! Purpose: Tokenize the db721 metadata footer without a general-purpose JSON library.
//! Exports: `tokenize`, `Document`, `Token`, `TokenId`, `TokenKind`, `Scalar`, `ParseOptions`.
//! Role: Span-based token stream plus key lookup used by the schema resolver.
//! Invariants: Grammar is objects, strings, and bare scalars; arrays are rejected.
//! Invariants: Token count is bounded by `ParseOptions::max_tokens`; overflow is an error.
//! Invariants: Lookups only see first-level entries; the first matching key wins.
//! Notes: Error offsets are relative to the metadata text; callers rebase them.

use std::borrow::Cow;

use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_MAX_TOKENS: usize = 8192;
const MAX_DEPTH: usize = 32;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParseOptions {
    pub max_tokens: usize,
}

impl ParseOptions {
    pub fn new() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TokenKind {
    Object,
    String,
    Primitive,
}

/// A span into the metadata text. String spans exclude the quotes; object
/// spans run from `{` through `}` inclusive.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TokenId(usize);

#[derive(Clone, Debug, PartialEq)]
pub enum Scalar<'a> {
    Str(Cow<'a, str>),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

#[derive(Debug)]
pub struct Document<'a> {
    text: &'a str,
    tokens: Vec<Token>,
}

pub fn tokenize<'a>(text: &'a str, options: &ParseOptions) -> Result<Document<'a>, Error> {
    let mut tokenizer = Tokenizer {
        bytes: text.as_bytes(),
        pos: 0,
        tokens: Vec::new(),
        max_tokens: options.max_tokens,
    };
    tokenizer.skip_ws();
    match tokenizer.peek() {
        Some(b'{') => {}
        Some(_) => return Err(tokenizer.error("metadata must be an object")),
        None => return Err(tokenizer.error("metadata is empty")),
    }
    tokenizer.parse_object(0)?;
    tokenizer.skip_ws();
    if tokenizer.pos < tokenizer.bytes.len() {
        return Err(tokenizer.error("trailing content after metadata object"));
    }
    Ok(Document {
        text,
        tokens: tokenizer.tokens,
    })
}

struct Tokenizer<'a> {
    bytes: &'a [u8],
    pos: usize,
    tokens: Vec<Token>,
    max_tokens: usize,
}

impl Tokenizer<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while let Some(b' ' | b'\t' | b'\n' | b'\r') = self.peek() {
            self.pos += 1;
        }
    }

    fn error(&self, message: &str) -> Error {
        Error::new(ErrorKind::Parse)
            .with_message(format!("{message} at metadata byte {}", self.pos))
            .with_offset(self.pos as u64)
    }

    fn push(&mut self, kind: TokenKind, start: usize) -> Result<TokenId, Error> {
        if self.tokens.len() >= self.max_tokens {
            return Err(self
                .error(&format!("token limit exceeded (max {})", self.max_tokens))
                .with_hint("Raise --max-tokens for files with many columns or blocks."));
        }
        self.tokens.push(Token {
            kind,
            start,
            end: start,
        });
        Ok(TokenId(self.tokens.len() - 1))
    }

    fn parse_value(&mut self, depth: usize) -> Result<(), Error> {
        self.skip_ws();
        match self.peek() {
            Some(b'{') => self.parse_object(depth + 1),
            Some(b'"') => self.parse_string().map(|_| ()),
            Some(b'[') => Err(self.error("arrays are not supported in metadata")),
            Some(b'}' | b']' | b':' | b',') => Err(self.error("expected a value")),
            Some(_) => self.parse_primitive(),
            None => Err(self.error("unexpected end of metadata")),
        }
    }

    fn parse_object(&mut self, depth: usize) -> Result<(), Error> {
        if depth >= MAX_DEPTH {
            return Err(self.error("metadata nesting is too deep"));
        }
        let id = self.push(TokenKind::Object, self.pos)?;
        self.pos += 1;
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            self.tokens[id.0].end = self.pos;
            return Ok(());
        }

        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'"') => {}
                None => return Err(self.error("unterminated object")),
                Some(_) => return Err(self.error("object keys must be strings")),
            }
            self.parse_string()?;
            self.skip_ws();
            if self.peek() != Some(b':') {
                return Err(self.error("expected ':' after object key"));
            }
            self.pos += 1;
            self.parse_value(depth)?;
            self.skip_ws();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                }
                Some(b'}') => {
                    self.pos += 1;
                    break;
                }
                None => return Err(self.error("unterminated object")),
                Some(_) => return Err(self.error("expected ',' or '}' in object")),
            }
        }

        self.tokens[id.0].end = self.pos;
        Ok(())
    }

    fn parse_string(&mut self) -> Result<TokenId, Error> {
        let opening = self.pos;
        self.pos += 1;
        let start = self.pos;
        loop {
            match self.peek() {
                None => {
                    self.pos = opening;
                    return Err(self.error("unterminated string"));
                }
                Some(b'"') => break,
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(b'"' | b'\\' | b'/' | b'b' | b'f' | b'n' | b'r' | b't') => {
                            self.pos += 1;
                        }
                        Some(b'u') => {
                            self.pos += 1;
                            for _ in 0..4 {
                                match self.peek() {
                                    Some(byte) if byte.is_ascii_hexdigit() => self.pos += 1,
                                    _ => return Err(self.error("invalid unicode escape")),
                                }
                            }
                        }
                        _ => return Err(self.error("invalid escape sequence")),
                    }
                }
                Some(byte) if byte < 0x20 => {
                    return Err(self.error("control character in string"));
                }
                Some(_) => self.pos += 1,
            }
        }
        let id = self.push(TokenKind::String, start)?;
        self.tokens[id.0].end = self.pos;
        self.pos += 1;
        Ok(id)
    }

    fn parse_primitive(&mut self) -> Result<(), Error> {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | b',' | b'}' | b']' | b':') {
                break;
            }
            self.pos += 1;
        }
        let raw = &self.bytes[start..self.pos];
        if !is_literal(raw) && !is_number(raw) {
            self.pos = start;
            return Err(self.error("invalid scalar value"));
        }
        let id = self.push(TokenKind::Primitive, start)?;
        self.tokens[id.0].end = self.pos;
        Ok(())
    }
}

fn is_literal(raw: &[u8]) -> bool {
    matches!(raw, b"true" | b"false" | b"null")
}

fn is_number(raw: &[u8]) -> bool {
    let mut idx = 0;
    if raw.get(idx) == Some(&b'-') {
        idx += 1;
    }
    let int_start = idx;
    while raw.get(idx).is_some_and(u8::is_ascii_digit) {
        idx += 1;
    }
    if idx == int_start || (raw[int_start] == b'0' && idx - int_start > 1) {
        return false;
    }
    if raw.get(idx) == Some(&b'.') {
        idx += 1;
        let frac_start = idx;
        while raw.get(idx).is_some_and(u8::is_ascii_digit) {
            idx += 1;
        }
        if idx == frac_start {
            return false;
        }
    }
    if matches!(raw.get(idx), Some(b'e' | b'E')) {
        idx += 1;
        if matches!(raw.get(idx), Some(b'+' | b'-')) {
            idx += 1;
        }
        let exp_start = idx;
        while raw.get(idx).is_some_and(u8::is_ascii_digit) {
            idx += 1;
        }
        if idx == exp_start {
            return false;
        }
    }
    idx == raw.len()
}

impl<'a> Document<'a> {
    pub fn root(&self) -> TokenId {
        TokenId(0)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn token(&self, id: TokenId) -> &Token {
        &self.tokens[id.0]
    }

    pub fn kind(&self, id: TokenId) -> TokenKind {
        self.tokens[id.0].kind
    }

    /// Raw text of the token span, escapes left as written.
    pub fn raw(&self, id: TokenId) -> &'a str {
        let token = &self.tokens[id.0];
        &self.text[token.start..token.end]
    }

    /// First-level `(key, value)` pairs of `container` in appearance order.
    pub fn entries(&self, container: TokenId) -> Entries<'_, 'a> {
        let token = self.tokens[container.0];
        let next = if token.kind == TokenKind::Object {
            container.0 + 1
        } else {
            self.tokens.len()
        };
        Entries {
            doc: self,
            container_end: token.end,
            next,
            consumed_end: token.start,
        }
    }

    pub fn get_value(&self, container: TokenId, key: &str) -> Option<TokenId> {
        self.entries(container)
            .find(|(key_id, _)| self.key_matches(*key_id, key))
            .map(|(_, value_id)| value_id)
    }

    pub fn get_keys(&self, container: TokenId) -> Vec<Cow<'a, str>> {
        self.entries(container)
            .map(|(key_id, _)| unescape(self.raw(key_id)))
            .collect()
    }

    pub fn str_value(&self, id: TokenId) -> Result<Cow<'a, str>, Error> {
        match self.kind(id) {
            TokenKind::String => Ok(unescape(self.raw(id))),
            _ => Err(self.type_error(id, "string")),
        }
    }

    pub fn u64_value(&self, id: TokenId) -> Result<u64, Error> {
        if self.kind(id) != TokenKind::Primitive {
            return Err(self.type_error(id, "non-negative integer"));
        }
        self.raw(id)
            .parse::<u64>()
            .map_err(|_| self.type_error(id, "non-negative integer"))
    }

    pub fn u32_value(&self, id: TokenId) -> Result<u32, Error> {
        let value = self.u64_value(id)?;
        u32::try_from(value).map_err(|_| self.type_error(id, "32-bit unsigned integer"))
    }

    pub fn scalar(&self, id: TokenId) -> Result<Scalar<'a>, Error> {
        match self.kind(id) {
            TokenKind::String => Ok(Scalar::Str(unescape(self.raw(id)))),
            TokenKind::Object => Err(self.type_error(id, "scalar")),
            TokenKind::Primitive => {
                let raw = self.raw(id);
                match raw {
                    "true" => Ok(Scalar::Bool(true)),
                    "false" => Ok(Scalar::Bool(false)),
                    "null" => Ok(Scalar::Null),
                    _ => {
                        if let Ok(value) = raw.parse::<i64>() {
                            return Ok(Scalar::Int(value));
                        }
                        raw.parse::<f64>()
                            .map(Scalar::Float)
                            .map_err(|_| self.type_error(id, "number"))
                    }
                }
            }
        }
    }

    fn key_matches(&self, key_id: TokenId, key: &str) -> bool {
        let raw = self.raw(key_id);
        if raw.contains('\\') {
            unescape(raw) == key
        } else {
            raw == key
        }
    }

    fn type_error(&self, id: TokenId, expected: &str) -> Error {
        let token = &self.tokens[id.0];
        Error::new(ErrorKind::Parse)
            .with_message(format!(
                "expected {expected}, found {:?} at metadata byte {}",
                self.raw(id),
                token.start
            ))
            .with_offset(token.start as u64)
    }
}

pub struct Entries<'d, 'a> {
    doc: &'d Document<'a>,
    container_end: usize,
    next: usize,
    consumed_end: usize,
}

impl Iterator for Entries<'_, '_> {
    type Item = (TokenId, TokenId);

    fn next(&mut self) -> Option<Self::Item> {
        let tokens = &self.doc.tokens;
        while self.next + 1 < tokens.len() {
            let candidate = &tokens[self.next];
            if candidate.start >= self.container_end {
                return None;
            }
            // Tokens inside an already consumed value are nested, not siblings.
            if candidate.start <= self.consumed_end {
                self.next += 1;
                continue;
            }
            let key = TokenId(self.next);
            let value = TokenId(self.next + 1);
            self.consumed_end = tokens[value.0].end;
            self.next += 2;
            return Some((key, value));
        }
        self.next = tokens.len();
        None
    }
}

/// Decodes JSON escapes. Borrows when the span has none.
pub fn unescape(raw: &str) -> Cow<'_, str> {
    if !raw.contains('\\') {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('u') => {
                let high = read_hex4(&mut chars);
                let code = if (0xD800..0xDC00).contains(&high) {
                    let mut lookahead = chars.clone();
                    if lookahead.next() == Some('\\') && lookahead.next() == Some('u') {
                        let low = read_hex4(&mut lookahead);
                        if (0xDC00..0xE000).contains(&low) {
                            chars = lookahead;
                            0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
                        } else {
                            high
                        }
                    } else {
                        high
                    }
                } else {
                    high
                };
                out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Cow::Owned(out)
}

fn read_hex4(chars: &mut std::str::Chars<'_>) -> u32 {
    let mut value = 0u32;
    for _ in 0..4 {
        let digit = chars.next().and_then(|ch| ch.to_digit(16)).unwrap_or(0);
        value = value * 16 + digit;
    }
    value
}
