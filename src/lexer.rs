//! Byte-level lexer.
//!
//! Two faces over the same grammar:
//! - nom combinators ([`token`]) used by the object parser,
//! - a cursor ([`Tokenizer`]) that can seek to any offset and read raw stream
//!   payloads, used by the cross-reference and object-stream readers.
//!
//! Token types:
//! - Numbers: integers (42, -123) and reals (3.14, -2.5, .5)
//! - Strings: literal ((Hello)) and hexadecimal (<48656C6C6F>)
//! - Names: /Type, /A#20B
//! - Delimiters: `[`, `]`, `<<`, `>>`
//! - Keywords: true, false, null, obj, endobj, stream, endstream, R, and any
//!   other bare word (xref, trailer, startxref, n, f)
//!
//! Whitespace (space, \t, \r, \n, \0, \f) and comments (% to EOL) are skipped.
//! Running out of input mid-token is reported with [`nom::error::ErrorKind::Eof`]
//! so callers can tell truncation from malformed bytes.

use crate::error::{Error, Result};
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_till, take_while, take_while1},
    character::complete::{char, digit1, one_of},
    combinator::{opt, value},
    multi::many0,
    sequence::preceded,
};

/// Token types recognized by the lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number (e.g., 42, -123)
    Integer(i64),

    /// Real number (e.g., 3.14, -2.5, .5)
    Real(f64),

    /// Literal string bytes, escapes not yet decoded
    LiteralString(&'a [u8]),

    /// Hexadecimal string digits, whitespace preserved
    HexString(&'a [u8]),

    /// Name with `#xx` escapes decoded
    Name(String),

    /// Boolean true keyword
    True,

    /// Boolean false keyword
    False,

    /// Null keyword
    Null,

    /// Array start delimiter [
    ArrayStart,

    /// Array end delimiter ]
    ArrayEnd,

    /// Dictionary start delimiter <<
    DictStart,

    /// Dictionary end delimiter >>
    DictEnd,

    /// Indirect object start keyword "obj"
    ObjStart,

    /// Indirect object end keyword "endobj"
    ObjEnd,

    /// Stream start keyword "stream"
    StreamStart,

    /// Stream end keyword "endstream"
    StreamEnd,

    /// Reference keyword "R" (used in "10 0 R")
    R,

    /// Any other bare word (xref, trailer, startxref, n, f, ...)
    Keyword(&'a [u8]),
}

/// PDF whitespace characters.
pub fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

/// PDF delimiter characters.
pub fn is_delimiter(c: u8) -> bool {
    matches!(c, b'/' | b'%' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}')
}

/// Characters that can appear in a bare word or name body.
fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

fn eof_error(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Eof))
}

fn tag_error(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))
}

/// Parse one comment (% to end of line).
fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    value((), preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip all whitespace and comments. Never fails.
pub fn skip_ws(input: &[u8]) -> IResult<&[u8], ()> {
    let mut remaining = input;

    loop {
        let (rest, ws) = take_while(is_whitespace)(remaining)?;
        remaining = rest;
        if let Ok((rest, _)) = comment(remaining) {
            remaining = rest;
            continue;
        }
        if ws.is_empty() {
            break;
        }
    }

    Ok((remaining, ()))
}

/// Parse an integer or real number.
///
/// Integers too large for `i64` are returned as reals.
fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let start = input;
    let (input, sign) = opt(one_of("+-"))(input)?;
    let (input, int_part) = opt(digit1)(input)?;
    let (input, frac_part) = opt(preceded(char('.'), opt(digit1)))(input)?;

    if int_part.is_none() && !matches!(frac_part, Some(Some(_))) {
        return Err(nom::Err::Error(nom::error::Error::new(start, nom::error::ErrorKind::Digit)));
    }

    let negative = sign == Some('-');
    let ascii = |bytes: Option<&[u8]>| {
        bytes
            .and_then(|b| std::str::from_utf8(b).ok())
            .unwrap_or("0")
            .to_string()
    };

    if let Some(frac) = frac_part {
        let text = format!("{}.{}", ascii(int_part), ascii(frac));
        let num: f64 = text
            .parse()
            .map_err(|_| nom::Err::Error(nom::error::Error::new(start, nom::error::ErrorKind::Digit)))?;
        return Ok((input, Token::Real(if negative { -num } else { num })));
    }

    let text = ascii(int_part);
    match text.parse::<i64>() {
        Ok(n) => Ok((input, Token::Integer(if negative { -n } else { n }))),
        Err(_) => {
            let num: f64 = text.parse().unwrap_or(f64::MAX);
            Ok((input, Token::Real(if negative { -num } else { num })))
        },
    }
}

/// Parse a literal string enclosed in parentheses.
///
/// Tracks nesting depth; escape sequences are skipped here and decoded by the
/// parser. An unterminated string is reported as end of input.
fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (body, _) = char('(')(input)?;
    let mut depth = 1usize;
    let mut pos = 0;

    while pos < body.len() {
        match body[pos] {
            b'\\' => pos += 2,
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&body[pos + 1..], Token::LiteralString(&body[..pos])));
                }
                pos += 1;
            },
            _ => pos += 1,
        }
    }

    Err(eof_error(&input[input.len()..]))
}

/// Parse a hexadecimal string enclosed in angle brackets.
fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.starts_with(b"<<") {
        return Err(tag_error(input));
    }
    let (body, _) = char('<')(input)?;

    for (pos, &c) in body.iter().enumerate() {
        if c == b'>' {
            return Ok((&body[pos + 1..], Token::HexString(&body[..pos])));
        }
        if !c.is_ascii_hexdigit() && !is_whitespace(c) {
            return Err(nom::Err::Error(nom::error::Error::new(
                &body[pos..],
                nom::error::ErrorKind::HexDigit,
            )));
        }
    }

    Err(eof_error(&input[input.len()..]))
}

/// Decode `#XX` escape sequences in a raw name body.
///
/// Invalid sequences are kept literally. Bytes that do not form UTF-8 are
/// mapped one-to-one onto code points U+0000..U+00FF.
///
/// ```
/// # use pdf_kernel::lexer::decode_name_escapes;
/// assert_eq!(decode_name_escapes(b"A#20B#23C"), "A B#C");
/// assert_eq!(decode_name_escapes(b"Type"), "Type");
/// assert_eq!(decode_name_escapes(b"A#"), "A#");
/// ```
pub fn decode_name_escapes(raw: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] == b'#' && i + 2 < raw.len() {
            let hex = std::str::from_utf8(&raw[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            if let Some(byte) = hex {
                bytes.push(byte);
                i += 3;
                continue;
            }
        }
        bytes.push(raw[i]);
        i += 1;
    }

    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

/// Parse a name starting with /.
fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (input, _) = char('/')(input)?;
    let (input, body) = take_while(is_regular)(input)?;
    Ok((input, Token::Name(decode_name_escapes(body))))
}

/// Parse delimiters `<<`, `>>`, `[`, `]`.
fn parse_delimiter(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        value(Token::DictStart, tag(b"<<")),
        value(Token::DictEnd, tag(b">>")),
        value(Token::ArrayStart, tag(b"[")),
        value(Token::ArrayEnd, tag(b"]")),
    ))(input)
}

/// Parse a bare word and classify it.
///
/// The whole run of regular characters is taken first, so `trueish` is a
/// keyword and never `true` followed by garbage.
fn parse_keyword(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, word) = take_while1(is_regular)(input)?;
    let token = match word {
        b"true" => Token::True,
        b"false" => Token::False,
        b"null" => Token::Null,
        b"obj" => Token::ObjStart,
        b"endobj" => Token::ObjEnd,
        b"stream" => Token::StreamStart,
        b"endstream" => Token::StreamEnd,
        b"R" => Token::R,
        other => Token::Keyword(other),
    };
    Ok((rest, token))
}

/// Parse a single token after skipping whitespace and comments.
///
/// Empty input (after skipping) fails with `ErrorKind::Eof`.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (input, _) = skip_ws(input)?;
    let Some(&first) = input.first() else {
        return Err(eof_error(input));
    };

    match first {
        b'/' => parse_name(input),
        b'(' => parse_literal_string(input),
        b'<' if input.len() == 1 => Err(eof_error(&input[1..])),
        b'<' if input[1] != b'<' => parse_hex_string(input),
        b'<' | b'>' | b'[' | b']' => parse_delimiter(input),
        b'+' | b'-' | b'.' | b'0'..=b'9' => parse_number(input),
        c if is_regular(c) => parse_keyword(input),
        _ => Err(tag_error(input)),
    }
}

/// Parse tokens until the input is exhausted or a token fails.
pub fn tokens(input: &[u8]) -> IResult<&[u8], Vec<Token<'_>>> {
    many0(token)(input)
}

/// Convert a nom failure on `data` into an engine error with an absolute offset.
pub fn nom_error(err: nom::Err<nom::error::Error<&[u8]>>, data: &[u8], base: usize) -> Error {
    match err {
        nom::Err::Incomplete(_) => Error::UnexpectedEof {
            offset: base + data.len(),
        },
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let offset = base + data.len().saturating_sub(e.input.len());
            if e.code == nom::error::ErrorKind::Eof {
                Error::UnexpectedEof { offset }
            } else {
                Error::syntax(offset, format!("malformed token ({:?})", e.code))
            }
        },
    }
}

/// A seekable cursor over a byte window.
///
/// `base` is the absolute offset of `data[0]` in the underlying source, so
/// positions and error offsets are always absolute.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Tokenizer<'a> {
    /// Create a cursor at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    /// Create a cursor over a window that starts at absolute offset `base`.
    pub fn with_base(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    /// Absolute position of the cursor.
    pub fn position(&self) -> usize {
        self.base + self.pos
    }

    /// Absolute offset of the first byte of the window.
    pub fn base(&self) -> usize {
        self.base
    }

    /// Move the cursor to an absolute offset inside the window.
    pub fn seek(&mut self, offset: usize) -> Result<()> {
        if offset < self.base || offset > self.base + self.data.len() {
            return Err(Error::UnexpectedEof { offset });
        }
        self.pos = offset - self.base;
        Ok(())
    }

    /// Bytes from the cursor to the end of the window.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Advance past `n` bytes that a caller consumed from [`Self::remaining`].
    pub fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.data.len());
    }

    /// Skip whitespace and comments.
    pub fn skip_whitespace(&mut self) {
        if let Ok((rest, _)) = skip_ws(self.remaining()) {
            self.pos = self.data.len() - rest.len();
        }
    }

    /// Whether only whitespace and comments remain.
    pub fn at_end(&mut self) -> bool {
        self.skip_whitespace();
        self.pos >= self.data.len()
    }

    /// Read the next token; `None` marks the end of the window.
    pub fn next_token(&mut self) -> Result<Option<Token<'a>>> {
        self.skip_whitespace();
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let input = self.remaining();
        match token(input) {
            Ok((rest, tok)) => {
                self.pos = self.data.len() - rest.len();
                Ok(Some(tok))
            },
            Err(e) => Err(nom_error(e, input, self.position())),
        }
    }

    /// Read the next token without moving the cursor.
    pub fn peek_token(&self) -> Result<Option<Token<'a>>> {
        self.clone().next_token()
    }

    /// Read a token that must be present.
    pub fn require_token(&mut self) -> Result<Token<'a>> {
        let at = self.position();
        self.next_token()?.ok_or(Error::UnexpectedEof { offset: at })
    }

    /// Read an integer token.
    pub fn read_integer(&mut self) -> Result<i64> {
        let at = self.position();
        match self.require_token()? {
            Token::Integer(n) => Ok(n),
            other => Err(Error::syntax(at, format!("expected integer, found {:?}", other))),
        }
    }

    /// Read a token and check that it is the bare word `keyword`.
    pub fn expect_keyword(&mut self, keyword: &[u8]) -> Result<()> {
        let at = self.position();
        let tok = self.require_token()?;
        let matches = match (&tok, keyword) {
            (Token::Keyword(word), _) => *word == keyword,
            (Token::ObjStart, b"obj") | (Token::ObjEnd, b"endobj") => true,
            (Token::StreamStart, b"stream") | (Token::StreamEnd, b"endstream") => true,
            _ => false,
        };
        if matches {
            Ok(())
        } else {
            Err(Error::syntax(
                at,
                format!("expected '{}', found {:?}", String::from_utf8_lossy(keyword), tok),
            ))
        }
    }

    /// Read a stream payload of `len` bytes.
    ///
    /// The cursor must sit right after the `stream` keyword; the single EOL
    /// marker that follows it is skipped first.
    pub fn read_stream_payload(&mut self, len: usize) -> Result<&'a [u8]> {
        self.skip_stream_eol();
        let start = self.pos;
        let end = start.checked_add(len).ok_or(Error::UnexpectedEof {
            offset: self.position(),
        })?;
        if end > self.data.len() {
            return Err(Error::UnexpectedEof {
                offset: self.base + self.data.len(),
            });
        }
        self.pos = end;
        Ok(&self.data[start..end])
    }

    /// Skip the EOL after a `stream` keyword (CRLF, LF, or a lone CR).
    pub fn skip_stream_eol(&mut self) {
        let rest = self.remaining();
        let skip = if rest.starts_with(b"\r\n") {
            2
        } else if rest.starts_with(b"\n") || rest.starts_with(b"\r") {
            1
        } else {
            0
        };
        self.pos += skip;
    }
}
