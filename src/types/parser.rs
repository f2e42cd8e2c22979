//! Recursive-descent parser for ClickHouse type spec strings.
//!
//! Type specs are recursively parenthesised: an identifier optionally
//! followed by a comma-separated argument list, where each argument is a
//! nested type, a number, or a quoted string. Parsed trees are cached
//! thread-locally keyed on the spec text, since the same handful of specs
//! repeats for every block of a result set.

use super::Type;
use crate::{
    Error,
    Result,
};
use std::{
    cell::RefCell,
    collections::HashMap,
};

#[derive(Debug, Clone, PartialEq)]
enum Token<'a> {
    Ident(&'a str),
    Number(i64),
    Quoted(&'a str),
    LParen,
    RParen,
    Comma,
    Equals,
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    peeked: Option<Option<Token<'a>>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0, peeked: None }
    }

    fn peek(&mut self) -> Result<Option<Token<'a>>> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lex()?);
        }
        Ok(self.peeked.clone().unwrap())
    }

    fn next(&mut self) -> Result<Option<Token<'a>>> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.lex(),
        }
    }

    fn expect(&mut self, expected: Token<'_>) -> Result<()> {
        match self.next()? {
            Some(token) if token == expected => Ok(()),
            other => Err(Error::Protocol(format!(
                "Type spec: expected {:?}, got {:?} in '{}'",
                expected, other, self.input
            ))),
        }
    }

    fn lex(&mut self) -> Result<Option<Token<'a>>> {
        let bytes = self.input.as_bytes();

        while self.pos < bytes.len()
            && (bytes[self.pos] as char).is_whitespace()
        {
            self.pos += 1;
        }
        if self.pos >= bytes.len() {
            return Ok(None);
        }

        let start = self.pos;
        match bytes[self.pos] {
            b'(' => {
                self.pos += 1;
                Ok(Some(Token::LParen))
            }
            b')' => {
                self.pos += 1;
                Ok(Some(Token::RParen))
            }
            b',' => {
                self.pos += 1;
                Ok(Some(Token::Comma))
            }
            b'=' => {
                self.pos += 1;
                Ok(Some(Token::Equals))
            }
            b'\'' => {
                self.pos += 1;
                while self.pos < bytes.len() && bytes[self.pos] != b'\'' {
                    self.pos += 1;
                }
                if self.pos >= bytes.len() {
                    return Err(Error::Protocol(format!(
                        "Type spec: unterminated quote in '{}'",
                        self.input
                    )));
                }
                let value = &self.input[start + 1..self.pos];
                self.pos += 1;
                Ok(Some(Token::Quoted(value)))
            }
            c if c.is_ascii_digit() || c == b'-' => {
                self.pos += 1;
                while self.pos < bytes.len()
                    && bytes[self.pos].is_ascii_digit()
                {
                    self.pos += 1;
                }
                let text = &self.input[start..self.pos];
                let value = text.parse::<i64>().map_err(|_| {
                    Error::Protocol(format!(
                        "Type spec: bad number '{}' in '{}'",
                        text, self.input
                    ))
                })?;
                Ok(Some(Token::Number(value)))
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while self.pos < bytes.len()
                    && (bytes[self.pos].is_ascii_alphanumeric()
                        || bytes[self.pos] == b'_')
                {
                    self.pos += 1;
                }
                Ok(Some(Token::Ident(&self.input[start..self.pos])))
            }
            c => Err(Error::Protocol(format!(
                "Type spec: unexpected character '{}' in '{}'",
                c as char, self.input
            ))),
        }
    }
}

fn parse_type(lexer: &mut Lexer<'_>) -> Result<Type> {
    let name = match lexer.next()? {
        Some(Token::Ident(name)) => name,
        other => {
            return Err(Error::Protocol(format!(
                "Type spec: expected type name, got {:?}",
                other
            )))
        }
    };

    match name {
        "Int8" => Ok(Type::Int8),
        "Int16" => Ok(Type::Int16),
        "Int32" => Ok(Type::Int32),
        "Int64" => Ok(Type::Int64),
        "Int128" => Ok(Type::Int128),
        "Int256" => Ok(Type::Int256),
        "UInt8" => Ok(Type::UInt8),
        "UInt16" => Ok(Type::UInt16),
        "UInt32" => Ok(Type::UInt32),
        "UInt64" => Ok(Type::UInt64),
        "UInt128" => Ok(Type::UInt128),
        "UInt256" => Ok(Type::UInt256),
        "Float32" => Ok(Type::Float32),
        "Float64" => Ok(Type::Float64),
        "Bool" => Ok(Type::Bool),
        "String" => Ok(Type::String),
        "JSON" | "Json" => Ok(Type::Json),
        "Date" => Ok(Type::Date),
        "Date32" => Ok(Type::Date32),
        "UUID" => Ok(Type::Uuid),
        "IPv4" => Ok(Type::Ipv4),
        "IPv6" => Ok(Type::Ipv6),
        "Nothing" => Ok(Type::Nothing),
        "FixedString" => {
            lexer.expect(Token::LParen)?;
            let size = parse_number(lexer)?;
            lexer.expect(Token::RParen)?;
            if size <= 0 {
                return Err(Error::Protocol(format!(
                    "FixedString size must be positive, got {}",
                    size
                )));
            }
            Ok(Type::FixedString(size as usize))
        }
        "DateTime" => {
            if matches!(lexer.peek()?, Some(Token::LParen)) {
                lexer.expect(Token::LParen)?;
                let tz = parse_quoted(lexer)?;
                lexer.expect(Token::RParen)?;
                Ok(Type::DateTime { timezone: Some(tz) })
            } else {
                Ok(Type::DateTime { timezone: None })
            }
        }
        "DateTime64" => {
            lexer.expect(Token::LParen)?;
            let precision = parse_number(lexer)?;
            if !(0..=9).contains(&precision) {
                return Err(Error::Protocol(format!(
                    "DateTime64 precision must be 0..=9, got {}",
                    precision
                )));
            }
            let timezone = if matches!(lexer.peek()?, Some(Token::Comma)) {
                lexer.expect(Token::Comma)?;
                Some(parse_quoted(lexer)?)
            } else {
                None
            };
            lexer.expect(Token::RParen)?;
            Ok(Type::DateTime64 { precision: precision as u32, timezone })
        }
        "Enum8" => {
            let items = parse_enum_items(lexer)?;
            let narrowed = items
                .into_iter()
                .map(|(name, value)| {
                    i8::try_from(value).map(|v| (name, v)).map_err(|_| {
                        Error::Protocol(format!(
                            "Enum8 value {} out of range",
                            value
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Type::Enum8(narrowed))
        }
        "Enum16" => {
            let items = parse_enum_items(lexer)?;
            let narrowed = items
                .into_iter()
                .map(|(name, value)| {
                    i16::try_from(value).map(|v| (name, v)).map_err(|_| {
                        Error::Protocol(format!(
                            "Enum16 value {} out of range",
                            value
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Type::Enum16(narrowed))
        }
        "Decimal" => {
            lexer.expect(Token::LParen)?;
            let precision = parse_number(lexer)? as u32;
            lexer.expect(Token::Comma)?;
            let scale = parse_number(lexer)? as u32;
            lexer.expect(Token::RParen)?;
            make_decimal(precision, scale)
        }
        "Decimal32" => parse_sized_decimal(lexer, 9),
        "Decimal64" => parse_sized_decimal(lexer, 18),
        "Decimal128" => parse_sized_decimal(lexer, 38),
        "Decimal256" => parse_sized_decimal(lexer, 76),
        "Nullable" => {
            lexer.expect(Token::LParen)?;
            let inner = parse_type(lexer)?;
            lexer.expect(Token::RParen)?;
            Ok(Type::Nullable(Box::new(inner)))
        }
        "Array" => {
            lexer.expect(Token::LParen)?;
            let inner = parse_type(lexer)?;
            lexer.expect(Token::RParen)?;
            Ok(Type::Array(Box::new(inner)))
        }
        "LowCardinality" => {
            lexer.expect(Token::LParen)?;
            let inner = parse_type(lexer)?;
            lexer.expect(Token::RParen)?;
            Ok(Type::LowCardinality(Box::new(inner)))
        }
        "Map" => {
            lexer.expect(Token::LParen)?;
            let key = parse_type(lexer)?;
            lexer.expect(Token::Comma)?;
            let value = parse_type(lexer)?;
            lexer.expect(Token::RParen)?;
            Ok(Type::Map(Box::new(key), Box::new(value)))
        }
        "Tuple" => {
            lexer.expect(Token::LParen)?;
            let mut items = Vec::new();
            loop {
                // Named tuples carry `name Type` pairs; skip the name
                if let (Some(Token::Ident(_)), true) = (
                    lexer.peek()?,
                    peek_second_is_ident(lexer)?,
                ) {
                    lexer.next()?;
                }
                items.push(parse_type(lexer)?);
                match lexer.next()? {
                    Some(Token::Comma) => continue,
                    Some(Token::RParen) => break,
                    other => {
                        return Err(Error::Protocol(format!(
                            "Type spec: expected ',' or ')' in Tuple, got {:?}",
                            other
                        )))
                    }
                }
            }
            Ok(Type::Tuple(items))
        }
        "SimpleAggregateFunction" => {
            // SimpleAggregateFunction(func, T) stores plain T values
            lexer.expect(Token::LParen)?;
            match lexer.next()? {
                Some(Token::Ident(_)) => {}
                other => {
                    return Err(Error::Protocol(format!(
                        "Type spec: expected function name, got {:?}",
                        other
                    )))
                }
            }
            lexer.expect(Token::Comma)?;
            let inner = parse_type(lexer)?;
            lexer.expect(Token::RParen)?;
            Ok(inner)
        }
        "Object" => {
            // Object('json') is the pre-25.x spelling of JSON
            lexer.expect(Token::LParen)?;
            let kind = parse_quoted(lexer)?;
            lexer.expect(Token::RParen)?;
            if kind.eq_ignore_ascii_case("json") {
                Ok(Type::Json)
            } else {
                Err(Error::UnsupportedType(format!("Object('{}')", kind)))
            }
        }
        other => Err(Error::UnsupportedType(other.to_string())),
    }
}

// True when the token after the upcoming one is also an identifier, which
// only happens for named tuple elements. When a token is already peeked,
// `pos` sits past it, so the probe's first lex yields the second token.
fn peek_second_is_ident(lexer: &mut Lexer<'_>) -> Result<bool> {
    let mut probe = Lexer::new(lexer.input);
    probe.pos = lexer.pos;
    if lexer.peeked.is_none() {
        probe.lex()?;
    }
    Ok(matches!(probe.lex()?, Some(Token::Ident(_))))
}

fn parse_sized_decimal(lexer: &mut Lexer<'_>, precision: u32) -> Result<Type> {
    lexer.expect(Token::LParen)?;
    let scale = parse_number(lexer)? as u32;
    lexer.expect(Token::RParen)?;
    make_decimal(precision, scale)
}

fn make_decimal(precision: u32, scale: u32) -> Result<Type> {
    if super::DecimalWidth::for_precision(precision).is_none() {
        return Err(Error::Protocol(format!(
            "Decimal precision must be 1..=76, got {}",
            precision
        )));
    }
    if scale > precision {
        return Err(Error::Protocol(format!(
            "Decimal scale {} exceeds precision {}",
            scale, precision
        )));
    }
    Ok(Type::Decimal { precision, scale })
}

fn parse_number(lexer: &mut Lexer<'_>) -> Result<i64> {
    match lexer.next()? {
        Some(Token::Number(value)) => Ok(value),
        other => Err(Error::Protocol(format!(
            "Type spec: expected number, got {:?}",
            other
        ))),
    }
}

fn parse_quoted(lexer: &mut Lexer<'_>) -> Result<String> {
    match lexer.next()? {
        Some(Token::Quoted(value)) => Ok(value.to_string()),
        other => Err(Error::Protocol(format!(
            "Type spec: expected quoted string, got {:?}",
            other
        ))),
    }
}

fn parse_enum_items(lexer: &mut Lexer<'_>) -> Result<Vec<(String, i64)>> {
    lexer.expect(Token::LParen)?;
    let mut items = Vec::new();
    loop {
        let name = parse_quoted(lexer)?;
        lexer.expect(Token::Equals)?;
        let value = parse_number(lexer)?;
        items.push((name, value));
        match lexer.next()? {
            Some(Token::Comma) => continue,
            Some(Token::RParen) => break,
            other => {
                return Err(Error::Protocol(format!(
                    "Type spec: expected ',' or ')' in Enum, got {:?}",
                    other
                )))
            }
        }
    }
    Ok(items)
}

thread_local! {
    static SPEC_CACHE: RefCell<HashMap<String, Type>> =
        RefCell::new(HashMap::new());
}

/// Parse a type spec, consulting the thread-local cache first.
pub fn parse_type_spec(spec: &str) -> Result<Type> {
    SPEC_CACHE.with(|cache| {
        if let Some(parsed) = cache.borrow().get(spec) {
            return Ok(parsed.clone());
        }

        let mut lexer = Lexer::new(spec);
        let parsed = parse_type(&mut lexer)?;
        if let Some(trailing) = lexer.next()? {
            return Err(Error::Protocol(format!(
                "Type spec: trailing token {:?} in '{}'",
                trailing, spec
            )));
        }

        cache
            .borrow_mut()
            .insert(spec.to_string(), parsed.clone());
        Ok(parsed)
    })
}
