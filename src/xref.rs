//! Cross-reference index.
//!
//! Maps object numbers to the place their definitions live: a byte offset for
//! objects stored directly in the file, a (container, index) pair for objects
//! packed into an object stream, or a free-list link. A document's index is
//! assembled from a chain of sections linked by `/Prev` (and `/XRefStm` in
//! hybrid files); the most recent section wins for every object number.

use crate::error::{Error, Result};
use crate::lexer::{Token, Tokenizer};
use crate::object::{Dictionary, Object};
use crate::parser::{ParseSettings, parse_indirect_object, parse_object_with, parse_failure};
use crate::parser_config::ParserOptions;
use crate::source::ByteSource;
use std::collections::{BTreeMap, HashSet};

/// Largest object number accepted from an index section.
pub const MAX_OBJECT_NUMBER: u32 = 8_388_607;

/// Bytes scanned backwards from the end of the file for `startxref`.
const STARTXREF_SEARCH: usize = 1024;

/// Initial window when reading an index section.
const SECTION_WINDOW: usize = 4096;

/// Keys that describe an index stream rather than the document.
const STREAM_ONLY_KEYS: [&str; 7] = ["Type", "W", "Index", "Length", "Filter", "DecodeParms", "Prev"];

/// One index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Deleted object; links to the next free object number
    Free {
        /// Next object number in the free list
        next_free: u32,
        /// Generation to use if the number is reused
        generation: u16,
    },
    /// Object stored directly at a byte offset
    InUse {
        /// Byte offset of the `n g obj` header
        offset: u64,
        /// Generation number
        generation: u16,
    },
    /// Object stored inside an object stream
    Compressed {
        /// Object number of the containing object stream
        stream_number: u32,
        /// Position of the object inside the container
        index: u32,
    },
}

impl XRefEntry {
    /// Generation number of the entry; compressed objects always have 0.
    pub fn generation(&self) -> u16 {
        match *self {
            XRefEntry::Free { generation, .. } | XRefEntry::InUse { generation, .. } => generation,
            XRefEntry::Compressed { .. } => 0,
        }
    }

    /// Whether the entry marks a deleted object.
    pub fn is_free(&self) -> bool {
        matches!(self, XRefEntry::Free { .. })
    }

    /// Whether the entry refers to a live object.
    pub fn is_in_use(&self) -> bool {
        !self.is_free()
    }
}

/// The merged index of a document.
///
/// Entries are keyed by object number and iterate in ascending order; a
/// sparse numbering costs nothing for the gaps.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    entries: BTreeMap<u32, XRefEntry>,
    declared_size: u32,
    trailer: Option<Dictionary>,
}

impl CrossRefTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an object number.
    pub fn get(&self, num: u32) -> Option<&XRefEntry> {
        self.entries.get(&num)
    }

    /// Whether an entry exists for `num`.
    pub fn contains(&self, num: u32) -> bool {
        self.entries.contains_key(&num)
    }

    /// Add an entry unless one already exists for `num`.
    ///
    /// Returns whether the entry was stored. Sections are merged newest
    /// first, so an existing entry is always the more recent one.
    pub fn add_entry(&mut self, num: u32, entry: XRefEntry) -> bool {
        if self.contains(num) {
            return false;
        }
        self.set(num, entry);
        true
    }

    /// Store an entry, replacing any existing one.
    pub fn set(&mut self, num: u32, entry: XRefEntry) {
        self.entries.insert(num, entry);
    }

    /// Drop the entry for `num`.
    pub fn remove(&mut self, num: u32) -> Option<XRefEntry> {
        self.entries.remove(&num)
    }

    /// Merge an older table: only numbers this table lacks are taken.
    pub fn merge_older(&mut self, older: &CrossRefTable) {
        for (num, entry) in older.iter() {
            self.add_entry(num, *entry);
        }
    }

    /// Number of populated entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Object count of the document.
    ///
    /// The declared `/Size` of the newest section, or one past the highest
    /// known object number when entries exceed it.
    pub fn size(&self) -> u32 {
        let highest = self
            .entries
            .last_key_value()
            .map_or(0, |(&num, _)| num.saturating_add(1));
        self.declared_size.max(highest)
    }

    /// Record the declared object count.
    pub fn set_declared_size(&mut self, size: u32) {
        self.declared_size = size;
    }

    /// Iterate `(object number, entry)` in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &XRefEntry)> + '_ {
        self.entries.iter().map(|(&num, entry)| (num, entry))
    }

    /// Object numbers with live entries, ascending.
    pub fn in_use_numbers(&self) -> Vec<u32> {
        self.iter().filter(|(_, e)| e.is_in_use()).map(|(n, _)| n).collect()
    }

    /// Walk the free list from object 0.
    ///
    /// Stops at the first repeated or missing link, so a damaged list never
    /// loops.
    pub fn free_list(&self) -> Vec<u32> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut current = 0u32;
        seen.insert(0);
        while let Some(XRefEntry::Free { next_free, .. }) = self.get(current) {
            let next = *next_free;
            if next == 0 || !seen.insert(next) {
                break;
            }
            match self.get(next) {
                Some(entry) if entry.is_free() => out.push(next),
                _ => break,
            }
            current = next;
        }
        out
    }

    /// The document trailer, once loaded.
    pub fn trailer(&self) -> Option<&Dictionary> {
        self.trailer.as_ref()
    }

    /// Replace the trailer.
    pub fn set_trailer(&mut self, trailer: Dictionary) {
        self.trailer = Some(trailer);
    }
}

/// Which syntax an index section used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// `xref` keyword table with a `trailer` dictionary
    Table,
    /// Binary `/Type /XRef` stream
    Stream,
}

/// One parsed index section.
#[derive(Debug, Clone)]
pub struct XrefSection {
    /// Syntax of the section
    pub kind: SectionKind,
    /// Entries declared by this section alone
    pub table: CrossRefTable,
    /// Trailer dictionary (stream-only keys removed for index streams)
    pub trailer: Dictionary,
    /// `/Prev` pointer taken before stream keys were stripped
    pub prev: Option<usize>,
}

/// Locate the index pointer after the last `startxref` keyword.
pub fn find_startxref(source: &mut ByteSource) -> Result<usize> {
    let (start, tail) = source.tail(STARTXREF_SEARCH)?;
    let pos = tail
        .windows(9)
        .rposition(|w| w == b"startxref")
        .ok_or_else(|| Error::TableInvalid("startxref not found".to_string()))?;

    let mut tz = Tokenizer::with_base(&tail[pos + 9..], start + pos + 9);
    match tz.next_token() {
        Ok(Some(Token::Integer(offset))) if offset >= 0 && (offset as usize) < source.len() => {
            Ok(offset as usize)
        },
        _ => Err(Error::TableInvalid(format!(
            "startxref at byte {} has no usable offset",
            start + pos
        ))),
    }
}

/// Parse the index section at `offset`, detecting its syntax.
pub fn parse_section_at(
    source: &mut ByteSource,
    offset: usize,
    options: &ParserOptions,
) -> Result<XrefSection> {
    let starts_with_xref = {
        let head = source.read_at(offset, 32)?;
        let mut tz = Tokenizer::with_base(&head, offset);
        matches!(tz.next_token(), Ok(Some(Token::Keyword(b"xref"))))
    };

    if starts_with_xref {
        source.with_window(offset, SECTION_WINDOW, |window, complete| {
            parse_table_section(window, offset, complete, options)
        })
    } else {
        let indirect = source.with_window(offset, SECTION_WINDOW, |window, complete| {
            let settings = ParseSettings {
                max_nesting: options.max_nesting,
                input_complete: complete,
            };
            parse_indirect_object(window, offset, &settings, true)
        })?;
        parse_stream_section(&indirect.object, options)
    }
}

/// Read a token, reporting `Eof` when it touches the edge of an incomplete window.
fn next_token_checked<'a>(tz: &mut Tokenizer<'a>, complete: bool) -> Result<Token<'a>> {
    let tok = tz.require_token()?;
    if !complete && tz.remaining().is_empty() {
        return Err(Error::UnexpectedEof {
            offset: tz.position(),
        });
    }
    Ok(tok)
}

fn read_u64(tz: &mut Tokenizer<'_>, complete: bool) -> Result<u64> {
    let at = tz.position();
    match next_token_checked(tz, complete)? {
        Token::Integer(n) if n >= 0 => Ok(n as u64),
        other => Err(Error::syntax(at, format!("expected non-negative integer, found {:?}", other))),
    }
}

/// Parse a classic `xref` table and its trailer from a window at `base`.
///
/// Records are read as tokens, so 19-, 20- and 21-byte line endings and
/// missing EOL markers are all accepted. A malformed record fails the section.
pub fn parse_table_section(
    data: &[u8],
    base: usize,
    complete: bool,
    options: &ParserOptions,
) -> Result<XrefSection> {
    let mut tz = Tokenizer::with_base(data, base);
    tz.expect_keyword(b"xref")?;

    let mut table = CrossRefTable::new();
    loop {
        let at = tz.position();
        if let Token::Keyword(b"trailer") = tz.peek_token()?.ok_or(Error::UnexpectedEof { offset: at })? {
            tz.next_token()?;
            break;
        }

        let first = read_u64(&mut tz, complete)?;
        let count = read_u64(&mut tz, complete)?;
        if first.saturating_add(count) > MAX_OBJECT_NUMBER as u64 + 1 {
            return Err(Error::TableInvalid(format!(
                "subsection {} {} at byte {} exceeds the object number limit",
                first, count, at
            )));
        }

        let mut first = first as u32;
        for i in 0..count as u32 {
            let rec_at = tz.position();
            let offset = read_u64(&mut tz, complete)?;
            let generation = read_u64(&mut tz, complete)?;
            let kind = next_token_checked(&mut tz, complete)?;
            let generation = u16::try_from(generation)
                .map_err(|_| Error::syntax(rec_at, format!("generation {} out of range", generation)))?;

            let entry = match kind {
                Token::Keyword(b"n") => XRefEntry::InUse { offset, generation },
                Token::Keyword(b"f") => XRefEntry::Free {
                    next_free: u32::try_from(offset).unwrap_or(0),
                    generation,
                },
                other => {
                    log::warn!("Bad index record at byte {}: {:?}", rec_at, other);
                    return Err(Error::TableInvalid(format!("bad record at byte {}", rec_at)));
                },
            };

            // A table that starts at 1 but whose first record is the free-list head
            // is off by one.
            if i == 0 && first == 1 && generation == 65535 && entry.is_free() {
                log::debug!("Index subsection at byte {} numbered from 1, shifting to 0", at);
                first = 0;
            }
            table.add_entry(first + i, entry);
        }
    }

    let settings = ParseSettings {
        max_nesting: options.max_nesting,
        input_complete: complete,
    };
    let body_start = tz.position();
    let input = tz.remaining();
    let (_, trailer) = parse_object_with(input, &settings).map_err(|e| parse_failure(e, input, body_start))?;
    let trailer = match trailer {
        Object::Dictionary(d) => d,
        other => {
            return Err(Error::TableInvalid(format!(
                "trailer at byte {} is a {}",
                body_start,
                other.type_name()
            )));
        },
    };

    if let Some(size) = trailer.get_integer("Size") {
        table.set_declared_size(size.clamp(0, MAX_OBJECT_NUMBER as i64 + 1) as u32);
    }
    let prev = offset_value(trailer.get("Prev"));

    Ok(XrefSection {
        kind: SectionKind::Table,
        table,
        trailer,
        prev,
    })
}

fn offset_value(obj: Option<&Object>) -> Option<usize> {
    obj.and_then(Object::as_integer)
        .filter(|&n| n >= 0)
        .map(|n| n as usize)
}

/// Decode an index stream object into a section.
pub fn parse_stream_section(object: &Object, options: &ParserOptions) -> Result<XrefSection> {
    let dict = match object {
        Object::Stream { dict, .. } => dict,
        other => {
            return Err(Error::TableInvalid(format!(
                "expected an index stream, found {}",
                other.type_name()
            )));
        },
    };
    if let Some(type_name) = dict.type_name() {
        if type_name != "XRef" {
            return Err(Error::TableInvalid(format!("stream has /Type /{}", type_name)));
        }
    }

    let size = dict
        .get_integer("Size")
        .filter(|&s| s >= 0 && s <= MAX_OBJECT_NUMBER as i64 + 1)
        .ok_or_else(|| Error::TableInvalid("index stream has no valid /Size".to_string()))? as u32;

    let widths: Vec<usize> = dict
        .get_array("W")
        .ok_or_else(|| Error::TableInvalid("index stream has no /W".to_string()))?
        .iter()
        .map(|w| w.as_integer().filter(|&w| (0..=8).contains(&w)).map(|w| w as usize))
        .collect::<Option<Vec<_>>>()
        .filter(|w| w.len() == 3)
        .ok_or_else(|| Error::TableInvalid("malformed /W".to_string()))?;

    let ranges: Vec<(u32, u32)> = match dict.get_array("Index") {
        Some(index) => {
            let nums: Vec<i64> = index.iter().filter_map(Object::as_integer).collect();
            if nums.len() != index.len() || nums.len() % 2 != 0 {
                return Err(Error::TableInvalid("malformed /Index".to_string()));
            }
            nums.chunks(2)
                .map(|pair| {
                    let (first, count) = (pair[0], pair[1]);
                    if first < 0 || count < 0 || first + count > MAX_OBJECT_NUMBER as i64 + 1 {
                        Err(Error::TableInvalid(format!("bad /Index range {} {}", first, count)))
                    } else {
                        Ok((first as u32, count as u32))
                    }
                })
                .collect::<Result<_>>()?
        },
        None => vec![(0, size)],
    };

    let data = object
        .decode_stream_data_with_options(options)
        .map_err(|e| Error::TableInvalid(format!("index stream data: {}", e)))?;

    let record_len: usize = widths.iter().sum();
    if record_len == 0 {
        return Err(Error::TableInvalid("/W describes empty records".to_string()));
    }

    let mut table = CrossRefTable::new();
    table.set_declared_size(size);
    let mut records = data.chunks_exact(record_len);
    for (first, count) in ranges {
        for num in first..first + count {
            let record = records
                .next()
                .ok_or_else(|| Error::TableInvalid(format!("index stream ends before object {}", num)))?;
            let (f1, rest) = record.split_at(widths[0]);
            let (f2, f3) = rest.split_at(widths[1]);
            // a zero-width type field means every record is type 1
            let kind = if widths[0] == 0 { 1 } else { read_be(f1) };
            let (f2, f3) = (read_be(f2), read_be(f3));

            let entry = match kind {
                0 => XRefEntry::Free {
                    next_free: f2 as u32,
                    generation: f3 as u16,
                },
                1 => XRefEntry::InUse {
                    offset: f2,
                    generation: f3 as u16,
                },
                2 => XRefEntry::Compressed {
                    stream_number: f2 as u32,
                    index: f3 as u32,
                },
                other => {
                    log::debug!("Ignoring index record type {} for object {}", other, num);
                    continue;
                },
            };
            table.add_entry(num, entry);
        }
    }

    let prev = offset_value(dict.get("Prev"));
    let trailer: Dictionary = dict
        .iter()
        .filter(|(k, _)| !STREAM_ONLY_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok(XrefSection {
        kind: SectionKind::Stream,
        table,
        trailer,
        prev,
    })
}

/// Big-endian unsigned integer of up to eight bytes.
fn read_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Load and merge the whole section chain starting at `start`.
///
/// Sections are visited newest first; a repeated offset ends the chain. For a
/// hybrid file the `/XRefStm` section is merged right after the table that
/// names it, ahead of that table's `/Prev`. The trailer of the newest section
/// becomes the document trailer, with `/Prev` and `/XRefStm` removed.
pub fn load_xref_chain(
    source: &mut ByteSource,
    start: usize,
    options: &ParserOptions,
) -> Result<CrossRefTable> {
    let mut table = CrossRefTable::new();
    let mut trailer: Option<Dictionary> = None;
    let mut visited = HashSet::new();
    let mut next = Some(start);
    let mut sections = 0usize;

    while let Some(offset) = next.take() {
        if !visited.insert(offset) {
            log::warn!("Index chain revisits byte {}, stopping", offset);
            break;
        }
        sections += 1;
        if sections > options.max_xref_sections {
            log::warn!("Index chain longer than {} sections, stopping", options.max_xref_sections);
            break;
        }

        let section = parse_section_at(source, offset, options).map_err(|e| match e {
            Error::TableInvalid(_) => e,
            other => Error::TableInvalid(format!("section at byte {}: {}", offset, other)),
        })?;
        log::debug!(
            "Loaded {:?} index section at byte {} with {} entries",
            section.kind,
            offset,
            section.table.len()
        );
        table.merge_older(&section.table);

        if section.kind == SectionKind::Table {
            if let Some(stm) = offset_value(section.trailer.get("XRefStm")) {
                if visited.insert(stm) {
                    let hybrid = parse_section_at(source, stm, options).map_err(|e| {
                        Error::TableInvalid(format!("/XRefStm section at byte {}: {}", stm, e))
                    })?;
                    table.merge_older(&hybrid.table);
                }
            }
        }

        if trailer.is_none() {
            table.set_declared_size(section.table.declared_size);
            let mut newest = section.trailer.clone();
            newest.remove("Prev");
            newest.remove("XRefStm");
            trailer = Some(newest);
        }
        next = section.prev;
    }

    match trailer {
        Some(t) => table.set_trailer(t),
        None => return Err(Error::TableInvalid("no index section loaded".to_string())),
    }
    Ok(table)
}

/// Check that every direct entry points at a matching `n g obj` header.
///
/// Returns the first mismatching object number as an error.
pub fn check_entry_offsets(table: &CrossRefTable, source: &mut ByteSource) -> Result<()> {
    for (num, entry) in table.iter() {
        let XRefEntry::InUse { offset, generation } = *entry else {
            continue;
        };
        if num == 0 {
            continue;
        }
        let offset = offset as usize;
        if offset >= source.len() {
            return Err(Error::TableInvalid(format!(
                "object {} offset {} is past the end of the file",
                num, offset
            )));
        }
        let head = source.read_at(offset, 64)?;
        let mut tz = Tokenizer::with_base(&head, offset);
        match crate::parser::parse_object_header(&mut tz) {
            Ok(found) if found.id == num && found.gen == generation => {},
            Ok(found) => {
                return Err(Error::TableInvalid(format!(
                    "object {} {} expected at byte {}, found {}",
                    num, generation, offset, found
                )));
            },
            Err(e) => {
                return Err(Error::TableInvalid(format!(
                    "object {} at byte {}: {}",
                    num, offset, e
                )));
            },
        }
    }
    Ok(())
}
