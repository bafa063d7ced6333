//! Object parser.
//!
//! Builds [`Object`] values from lexer tokens. Parsing is depth-limited and
//! distinguishes truncated input (`ErrorKind::Eof`) from malformed input, so a
//! caller reading a window of a larger source can grow the window and retry.

use crate::error::{Error, Result};
use crate::lexer::{Token, Tokenizer, nom_error, token};
use crate::object::{Dictionary, Object, ObjectRef, PdfString};
use nom::IResult;
use nom::error::ErrorKind;

/// Default nesting limit for [`parse_object`].
pub const DEFAULT_MAX_NESTING: usize = 256;

/// Settings threaded through one parse.
#[derive(Debug, Clone, Copy)]
pub struct ParseSettings {
    /// Maximum array/dictionary nesting
    pub max_nesting: usize,
    /// The input ends where the source ends, rather than at a window boundary
    ///
    /// When true, unclosed containers at end of input are returned as-is and a
    /// stream whose `/Length` overruns the input falls back to an `endstream`
    /// scan. When false these cases report `Eof` so the caller can read more.
    pub input_complete: bool,
}

impl Default for ParseSettings {
    fn default() -> Self {
        Self {
            max_nesting: DEFAULT_MAX_NESTING,
            input_complete: true,
        }
    }
}

fn fail(input: &[u8], kind: ErrorKind) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, kind))
}

/// Decode escape sequences in a literal string body.
///
/// ```
/// # use pdf_kernel::parser::decode_literal_string_escapes;
/// assert_eq!(decode_literal_string_escapes(b"Section \\247 1"), b"Section \xa7 1");
/// ```
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        let c = raw[i];
        if c == b'\r' {
            // bare CR and CRLF inside a string both read as LF
            result.push(b'\n');
            i += if raw.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
            continue;
        }
        if c != b'\\' || i + 1 >= raw.len() {
            if c != b'\\' {
                result.push(c);
            }
            i += 1;
            continue;
        }

        let next = raw[i + 1];
        i += 2;
        match next {
            b'n' => result.push(b'\n'),
            b'r' => result.push(b'\r'),
            b't' => result.push(b'\t'),
            b'b' => result.push(0x08),
            b'f' => result.push(0x0C),
            b'(' | b')' | b'\\' => result.push(next),
            b'\n' => {},
            b'\r' => {
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'0'..=b'7' => {
                let mut value = u32::from(next - b'0');
                for _ in 0..2 {
                    match raw.get(i) {
                        Some(&d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            i += 1;
                        },
                        _ => break,
                    }
                }
                result.push((value & 0xFF) as u8);
            },
            // unknown escape: the backslash is dropped
            other => result.push(other),
        }
    }

    result
}

/// Decode hex string digits to bytes, padding an odd final digit with 0.
pub fn decode_hex(hex_bytes: &[u8]) -> Result<Vec<u8>> {
    let digits: Vec<u8> = hex_bytes
        .iter()
        .copied()
        .filter(|c| !c.is_ascii_whitespace() && *c != 0)
        .collect();
    let nibble = |c: u8| -> Result<u8> {
        (c as char)
            .to_digit(16)
            .map(|d| d as u8)
            .ok_or_else(|| Error::syntax(0, format!("invalid hex digit 0x{:02X}", c)))
    };

    digits
        .chunks(2)
        .map(|pair| Ok(nibble(pair[0])? << 4 | pair.get(1).map(|&c| nibble(c)).transpose()?.unwrap_or(0)))
        .collect()
}

/// Parse one object with default settings.
///
/// ```
/// use pdf_kernel::parser::parse_object;
///
/// let (_, obj) = parse_object(b"<< /Type /Page /Kids [1 0 R] >>").unwrap();
/// assert_eq!(obj.as_dict().and_then(|d| d.type_name()), Some("Page"));
/// ```
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    parse_object_with(input, &ParseSettings::default())
}

/// Parse one object.
pub fn parse_object_with<'a>(input: &'a [u8], settings: &ParseSettings) -> IResult<&'a [u8], Object> {
    parse_value(input, settings, 0)
}

fn parse_value<'a>(input: &'a [u8], settings: &ParseSettings, depth: usize) -> IResult<&'a [u8], Object> {
    let start = input;
    let (input, tok) = token(input)?;

    match tok {
        Token::Null => Ok((input, Object::Null)),
        Token::True => Ok((input, Object::Boolean(true))),
        Token::False => Ok((input, Object::Boolean(false))),
        Token::Integer(i) => Ok(parse_integer_or_reference(input, i)),
        Token::Real(r) => Ok((input, Object::Real(r))),
        Token::LiteralString(raw) => Ok((
            input,
            Object::String(PdfString::new(decode_literal_string_escapes(raw))),
        )),
        Token::HexString(digits) => match decode_hex(digits) {
            Ok(bytes) => Ok((input, Object::String(PdfString::hex(bytes)))),
            Err(_) => Err(fail(start, ErrorKind::HexDigit)),
        },
        Token::Name(name) => Ok((input, Object::Name(name))),
        Token::ArrayStart | Token::DictStart if depth >= settings.max_nesting => {
            Err(nom::Err::Failure(nom::error::Error::new(start, ErrorKind::TooLarge)))
        },
        Token::ArrayStart => parse_array(input, settings, depth + 1),
        Token::DictStart => {
            let (rest, dict) = parse_dictionary(input, settings, depth + 1)?;
            match token(rest) {
                Ok((after_kw, Token::StreamStart)) => {
                    let (rest, data) = parse_stream_data(after_kw, &dict, settings)?;
                    Ok((
                        rest,
                        Object::Stream {
                            dict,
                            data: bytes::Bytes::copy_from_slice(data),
                        },
                    ))
                },
                _ => Ok((rest, Object::Dictionary(dict))),
            }
        },
        _ => Err(fail(start, ErrorKind::Tag)),
    }
}

/// `n g R` becomes a reference when both numbers fit; otherwise `n` is an integer.
fn parse_integer_or_reference(input: &[u8], number: i64) -> (&[u8], Object) {
    if let Ok((after_gen, Token::Integer(gen))) = token(input) {
        if let Ok((after_r, Token::R)) = token(after_gen) {
            if let (Ok(id), Ok(gen)) = (u32::try_from(number), u16::try_from(gen)) {
                return (after_r, Object::Reference(ObjectRef::new(id, gen)));
            }
        }
    }
    (input, Object::Integer(number))
}

fn parse_array<'a>(input: &'a [u8], settings: &ParseSettings, depth: usize) -> IResult<&'a [u8], Object> {
    let mut items = Vec::new();
    let mut remaining = input;

    loop {
        match token(remaining) {
            Ok((rest, Token::ArrayEnd)) => return Ok((rest, Object::Array(items))),
            Ok(_) => {
                let (rest, item) = parse_value(remaining, settings, depth)?;
                items.push(item);
                remaining = rest;
            },
            Err(nom::Err::Error(e)) if e.code == ErrorKind::Eof && settings.input_complete => {
                log::warn!("Unterminated array at end of input, keeping {} items", items.len());
                return Ok((e.input, Object::Array(items)));
            },
            Err(e) => return Err(e),
        }
    }
}

fn parse_dictionary<'a>(
    input: &'a [u8],
    settings: &ParseSettings,
    depth: usize,
) -> IResult<&'a [u8], Dictionary> {
    let mut dict = Dictionary::new();
    let mut remaining = input;

    loop {
        match token(remaining) {
            Ok((rest, Token::DictEnd)) => return Ok((rest, dict)),
            Ok((rest, Token::Name(key))) => {
                // "/Key >>" drops the key
                if let Ok((after, Token::DictEnd)) = token(rest) {
                    log::debug!("Dictionary key /{} has no value", key);
                    return Ok((after, dict));
                }
                let (rest, value) = parse_value(rest, settings, depth)?;
                dict.insert(key, value);
                remaining = rest;
            },
            Ok(_) => return Err(fail(remaining, ErrorKind::Tag)),
            Err(nom::Err::Error(e)) if e.code == ErrorKind::Eof && settings.input_complete => {
                log::warn!("Unterminated dictionary at end of input, keeping {} entries", dict.len());
                return Ok((e.input, dict));
            },
            Err(e) => return Err(e),
        }
    }
}

/// Read a stream payload right after the `stream` keyword.
///
/// A direct `/Length` is trusted when `endstream` follows it; otherwise the
/// payload runs to the next `endstream`, minus the EOL before it.
fn parse_stream_data<'a>(
    input: &'a [u8],
    dict: &Dictionary,
    settings: &ParseSettings,
) -> IResult<&'a [u8], &'a [u8]> {
    let body = if input.starts_with(b"\r\n") {
        &input[2..]
    } else if input.starts_with(b"\n") || input.starts_with(b"\r") {
        &input[1..]
    } else {
        input
    };

    let declared = dict
        .get_integer("Length")
        .and_then(|len| usize::try_from(len).ok());

    if let Some(length) = declared {
        if length <= body.len() {
            if let Ok((rest, Token::StreamEnd)) = token(&body[length..]) {
                return Ok((rest, &body[..length]));
            }
            log::debug!("Stream /Length {} is not followed by endstream, scanning", length);
        } else if !settings.input_complete {
            return Err(fail(&body[body.len()..], ErrorKind::Eof));
        }
    }

    match find_endstream(body) {
        Some(pos) => {
            let mut end = pos;
            if body[..end].ends_with(b"\r\n") {
                end -= 2;
            } else if body[..end].ends_with(b"\n") || body[..end].ends_with(b"\r") {
                end -= 1;
            }
            let rest = &body[pos + b"endstream".len()..];
            Ok((rest, &body[..end]))
        },
        None => Err(fail(&body[body.len()..], ErrorKind::Eof)),
    }
}

/// Position of the first `endstream` keyword.
pub fn find_endstream(input: &[u8]) -> Option<usize> {
    memchr_keyword(input, b"endstream")
}

/// Position of the first occurrence of `keyword`.
pub fn memchr_keyword(input: &[u8], keyword: &[u8]) -> Option<usize> {
    input.windows(keyword.len()).position(|window| window == keyword)
}

/// A parsed `n g obj ... endobj` record.
#[derive(Debug, Clone, PartialEq)]
pub struct IndirectObject {
    /// Identity declared in the header
    pub reference: ObjectRef,
    /// Object body
    pub object: Object,
    /// Absolute offset just past the record
    pub end_offset: usize,
}

/// Read an `n g obj` header, returning the declared identity.
pub fn parse_object_header(tz: &mut Tokenizer<'_>) -> Result<ObjectRef> {
    let at = tz.position();
    let id = tz.read_integer()?;
    let gen = tz.read_integer()?;
    tz.expect_keyword(b"obj")?;
    match (u32::try_from(id), u16::try_from(gen)) {
        (Ok(id), Ok(gen)) => Ok(ObjectRef::new(id, gen)),
        _ => Err(Error::syntax(at, format!("object header {} {} out of range", id, gen))),
    }
}

/// Parse an indirect object definition from a window starting at absolute offset `base`.
///
/// `allow_missing_endobj` accepts a record whose `endobj` is absent or
/// replaced by the next object's header.
pub fn parse_indirect_object(
    data: &[u8],
    base: usize,
    settings: &ParseSettings,
    allow_missing_endobj: bool,
) -> Result<IndirectObject> {
    let mut tz = Tokenizer::with_base(data, base);
    let reference = parse_object_header(&mut tz)?;

    if let Some(Token::ObjEnd) = tz.peek_token()? {
        tz.next_token()?;
        return Ok(IndirectObject {
            reference,
            object: Object::Null,
            end_offset: tz.position(),
        });
    }

    let body_start = tz.position();
    let input = tz.remaining();
    let (rest, object) =
        parse_object_with(input, settings).map_err(|e| parse_failure(e, input, body_start))?;
    tz.advance(input.len() - rest.len());

    let before_end = tz.position();
    let mut lookahead = tz.clone();
    let next = lookahead.next_token();
    if !settings.input_complete && (lookahead.remaining().is_empty() || next.as_ref().is_err_and(Error::is_eof)) {
        // the closing keyword may be cut by the window
        return Err(Error::UnexpectedEof { offset: before_end });
    }
    match next {
        Ok(Some(Token::ObjEnd)) => tz = lookahead,
        _ if allow_missing_endobj => {
            log::debug!("Object {} has no endobj at byte {}", reference, before_end);
        },
        _ => return Err(Error::syntax(before_end, format!("expected endobj after {}", reference))),
    }

    Ok(IndirectObject {
        reference,
        object,
        end_offset: tz.position(),
    })
}

/// Map a parse failure to an engine error, keeping nesting overflow distinct.
pub fn parse_failure(err: nom::Err<nom::error::Error<&[u8]>>, data: &[u8], base: usize) -> Error {
    if let nom::Err::Failure(e) = &err {
        if e.code == ErrorKind::TooLarge {
            return Error::RecursionLimitExceeded(base + data.len() - e.input.len());
        }
    }
    nom_error(err, data, base)
}
