//! Object stream decoding (PDF 1.5+).
//!
//! An object stream (`/Type /ObjStm`) packs several objects into one
//! compressed payload:
//!
//! ```text
//! 4000 0 obj
//! << /Type /ObjStm /N 3 /First 18 /Filter /FlateDecode >>
//! stream
//! 5 0 11 15 12 28          % N pairs: object number, offset from /First
//! << /Kids [...] >>        % member 0 (object 5)
//! [1 2 3]                  % member 1 (object 11)
//! (text)                   % member 2 (object 12)
//! endstream
//! ```
//!
//! The whole payload is decoded once; members are sliced by consecutive
//! offsets and parsed individually.

use crate::error::{Error, Result};
use crate::lexer::{Token, Tokenizer};
use crate::object::Object;
use crate::parser::{ParseSettings, parse_failure, parse_object_with};
use crate::parser_config::ParserOptions;

/// A decoded object stream.
#[derive(Debug, Clone)]
pub struct ObjectStream {
    /// `(object number, offset relative to first)` for each member
    members: Vec<(u32, usize)>,
    data: Vec<u8>,
    first: usize,
}

impl ObjectStream {
    /// Decode a container object and read its header pairs.
    ///
    /// Fails with [`Error::Format`] when the object is not an object stream,
    /// when `/N` cannot fit in the payload, or when the member offsets do not
    /// strictly increase.
    pub fn parse(container: &Object, options: &ParserOptions) -> Result<Self> {
        let dict = match container {
            Object::Stream { dict, .. } => dict,
            other => {
                return Err(Error::Format(format!(
                    "object stream container is a {}",
                    other.type_name()
                )));
            },
        };
        match dict.type_name() {
            Some("ObjStm") => {},
            Some(other) => return Err(Error::Format(format!("expected /Type /ObjStm, found /{}", other))),
            None => return Err(Error::Format("object stream has no /Type".to_string())),
        }

        let n = dict
            .get_integer("N")
            .filter(|&n| n >= 0)
            .ok_or_else(|| Error::Format("object stream has no valid /N".to_string()))? as usize;
        let first = dict
            .get_integer("First")
            .filter(|&f| f >= 0)
            .ok_or_else(|| Error::Format("object stream has no valid /First".to_string()))? as usize;

        let data = container.decode_stream_data_with_options(options).map_err(|e| match e {
            Error::Format(_) => e,
            other => Error::Format(format!("object stream payload: {}", other)),
        })?;

        if first > data.len() {
            return Err(Error::Format(format!(
                "/First {} is past the {} byte payload",
                first,
                data.len()
            )));
        }
        // every pair needs at least "0 0 "
        if n.saturating_mul(4) > first.max(data.len()) {
            return Err(Error::Format(format!(
                "/N {} exceeds what a {} byte payload can hold",
                n,
                data.len()
            )));
        }

        let members = read_header_pairs(&data[..first], n)?;
        Ok(Self { members, data, first })
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the container holds no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Object numbers of the members, in index order.
    pub fn object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.members.iter().map(|&(num, _)| num)
    }

    /// Object number declared for member `index`.
    pub fn member_number(&self, index: usize) -> Option<u32> {
        self.members.get(index).map(|&(num, _)| num)
    }

    /// Raw bytes of member `index`.
    fn member_bytes(&self, index: usize) -> Option<&[u8]> {
        let &(_, offset) = self.members.get(index)?;
        let start = self.first.checked_add(offset)?;
        let end = match self.members.get(index + 1) {
            Some(&(_, next)) => self.first.checked_add(next)?,
            None => self.data.len(),
        };
        self.data.get(start..end.min(self.data.len()))
    }

    /// Parse member `index`, checking that it is object `expected`.
    pub fn get(&self, index: usize, expected: u32, settings: &ParseSettings) -> Result<Object> {
        match self.member_number(index) {
            Some(num) if num == expected => self.parse_member(index, settings),
            Some(num) => Err(Error::Format(format!(
                "member {} of the object stream is object {}, not {}",
                index, num, expected
            ))),
            None => Err(Error::Format(format!(
                "index {} is out of range for an object stream with {} members",
                index,
                self.members.len()
            ))),
        }
    }

    /// Parse member `index` without an identity check.
    pub fn parse_member(&self, index: usize, settings: &ParseSettings) -> Result<Object> {
        let bytes = self
            .member_bytes(index)
            .ok_or_else(|| Error::Format(format!("member {} lies outside the payload", index)))?;
        let base = self.first + self.members[index].1;
        let (_, obj) = parse_object_with(bytes, settings).map_err(|e| parse_failure(e, bytes, base))?;
        Ok(obj)
    }

    /// Parse every member; a member that fails to parse is reported alongside the rest.
    pub fn parse_all(&self, settings: &ParseSettings) -> Vec<(u32, Result<Object>)> {
        (0..self.members.len())
            .map(|i| (self.members[i].0, self.parse_member(i, settings)))
            .collect()
    }
}

/// Read `count` `(object number, offset)` pairs.
fn read_header_pairs(header: &[u8], count: usize) -> Result<Vec<(u32, usize)>> {
    let mut tz = Tokenizer::new(header);
    let mut pairs: Vec<(u32, usize)> = Vec::with_capacity(count);
    for i in 0..count {
        let (num, offset) = match (tz.next_token(), tz.next_token()) {
            (Ok(Some(Token::Integer(num))), Ok(Some(Token::Integer(offset)))) => (num, offset),
            _ => {
                return Err(Error::Format(format!(
                    "object stream header ends after {} of {} pairs",
                    i, count
                )));
            },
        };
        let (Ok(num), Ok(offset)) = (u32::try_from(num), usize::try_from(offset)) else {
            return Err(Error::Format(format!("bad header pair {} {}", num, offset)));
        };
        if let Some(&(_, prev)) = pairs.last() {
            if offset <= prev {
                return Err(Error::Format(format!(
                    "member offsets do not increase ({} after {})",
                    offset, prev
                )));
            }
        }
        pairs.push((num, offset));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Dictionary;

    fn container(n: i64, first: i64, payload: &[u8]) -> Object {
        let mut dict = Dictionary::new();
        dict.insert("Type", Object::name("ObjStm"));
        dict.insert("N", Object::Integer(n));
        dict.insert("First", Object::Integer(first));
        Object::Stream {
            dict,
            data: payload.to_vec().into(),
        }
    }

    #[test]
    fn test_members_are_sliced_by_offset() {
        let payload = b"10 0 11 6 12 14 /Name [1 2 3] (text)";
        let stm = ObjectStream::parse(&container(3, 16, payload), &ParserOptions::default()).unwrap();
        assert_eq!(stm.len(), 3);
        assert_eq!(stm.object_numbers().collect::<Vec<_>>(), vec![10, 11, 12]);

        let settings = ParseSettings::default();
        assert_eq!(stm.get(0, 10, &settings).unwrap(), Object::name("Name"));
        assert_eq!(stm.get(1, 11, &settings).unwrap().as_array().map(Vec::len), Some(3));
        assert!(stm.get(2, 12, &settings).unwrap().as_string().is_some());
    }

    #[test]
    fn test_member_number_mismatch_is_format_error() {
        let payload = b"10 0 true";
        let stm = ObjectStream::parse(&container(1, 5, payload), &ParserOptions::default()).unwrap();
        let settings = ParseSettings::default();
        assert!(matches!(stm.get(0, 11, &settings), Err(Error::Format(_))));
        assert!(matches!(stm.get(1, 10, &settings), Err(Error::Format(_))));
    }

    #[test]
    fn test_count_exceeding_payload() {
        let result = ObjectStream::parse(&container(500, 4, b"1 0 null"), &ParserOptions::default());
        assert!(matches!(result, Err(Error::Format(_))));
    }

    #[test]
    fn test_backwards_offsets() {
        let payload = b"1 4 2 0 null true";
        let result = ObjectStream::parse(&container(2, 8, payload), &ParserOptions::default());
        assert!(matches!(result, Err(Error::Format(_))));
    }

    #[test]
    fn test_repeated_offset() {
        let payload = b"5 0 6 0 true";
        let result = ObjectStream::parse(&container(2, 8, payload), &ParserOptions::default());
        assert!(matches!(result, Err(Error::Format(_))));
    }

    #[test]
    fn test_wrong_type_and_missing_keys() {
        let mut obj = container(1, 4, b"1 0 null");
        if let Object::Stream { dict, .. } = &mut obj {
            dict.insert("Type", Object::name("XRef"));
        }
        assert!(ObjectStream::parse(&obj, &ParserOptions::default()).is_err());
        assert!(ObjectStream::parse(&Object::Integer(1), &ParserOptions::default()).is_err());

        if let Object::Stream { dict, .. } = &mut obj {
            dict.insert("Type", Object::name("ObjStm"));
            dict.remove("First");
        }
        assert!(ObjectStream::parse(&obj, &ParserOptions::default()).is_err());
    }

    #[test]
    fn test_compressed_payload() {
        let raw = b"7 0 << /A 1 >>";
        let compressed = crate::decoders::flate_encode(raw).unwrap();
        let mut obj = container(1, 4, &compressed);
        if let Object::Stream { dict, .. } = &mut obj {
            dict.insert("Filter", Object::name("FlateDecode"));
        }
        let stm = ObjectStream::parse(&obj, &ParserOptions::default()).unwrap();
        let member = stm.get(0, 7, &ParseSettings::default()).unwrap();
        assert_eq!(member.as_dict().and_then(|d| d.get_integer("A")), Some(1));
    }
}
