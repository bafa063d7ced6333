//! Cross-reference table reconstruction for damaged files.
//!
//! When the index is missing, truncated, or disagrees with the bytes it
//! describes, the table is rebuilt by scanning the whole file for object
//! headers. A later definition of the same object number replaces an earlier
//! one, which matches what incremental updates would have produced.

use crate::error::{Error, Result};
use crate::lexer::{is_delimiter, is_whitespace, Tokenizer};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::objstm::ObjectStream;
use crate::parser::{parse_indirect_object, parse_object_header, parse_object_with, ParseSettings};
use crate::parser_config::ParserOptions;
use crate::source::ByteSource;
use crate::xref::{CrossRefTable, XRefEntry, MAX_OBJECT_NUMBER};
use lazy_static::lazy_static;

lazy_static! {
    /// "N G obj" candidates
    static ref RE_OBJ_PATTERN: regex::bytes::Regex =
        regex::bytes::Regex::new(r"(\d{1,10})[ \t\r\n\x0C\x00]+(\d{1,5})[ \t\r\n\x0C\x00]+obj").unwrap();

    /// "trailer <<" records
    static ref RE_TRAILER: regex::bytes::Regex = regex::bytes::Regex::new(r"trailer[ \t\r\n\x0C\x00]*<<").unwrap();
}

/// Keys that belong to an index stream dictionary, not the trailer it stands in for.
const STREAM_ONLY_KEYS: [&str; 9] =
    ["Type", "W", "Index", "Length", "Filter", "DecodeParms", "Prev", "XRefStm", "DL"];

/// Keys that suggest a dictionary is a document information dictionary.
const INFO_KEYS: [&str; 6] = ["Producer", "Creator", "CreationDate", "ModDate", "Title", "Author"];

/// Highest object number a scan accepts from a file of `len` bytes.
///
/// A header numbered beyond the file length is noise, not an object.
fn object_number_limit(len: usize) -> u32 {
    u32::try_from(len).map_or(MAX_OBJECT_NUMBER, |len| len.min(MAX_OBJECT_NUMBER))
}

/// Whether a dictionary looks like a document catalog.
pub fn is_catalog_like(dict: &Dictionary) -> bool {
    match dict.type_name() {
        Some("Catalog") => true,
        None => dict.get("Pages").is_some_and(|p| p.as_reference().is_some()),
        Some(_) => false,
    }
}

fn is_info_like(dict: &Dictionary) -> bool {
    dict.type_name().is_none() && INFO_KEYS.iter().any(|k| dict.contains_key(k))
}

/// What the scan learned about one recovered object.
#[derive(Debug, Default)]
struct ScanFindings {
    catalog: Option<ObjectRef>,
    info: Option<ObjectRef>,
    catalogs: Vec<ObjectRef>,
    /// Containers in file order
    object_streams: Vec<(u32, Object)>,
    /// Last index stream dictionary, with its offset
    xref_stream: Option<(usize, Dictionary)>,
}

/// Rebuild the table by scanning every byte of `source`.
///
/// The returned table carries a trailer. Fails with
/// [`Error::UnresolvableRoot`] only when no catalog can be identified.
pub fn reconstruct_xref(source: &mut ByteSource, options: &ParserOptions) -> Result<CrossRefTable> {
    log::info!("Reconstructing cross-reference table by scanning {} bytes", source.len());
    let contents = source.read_all()?;

    let limit = object_number_limit(contents.len());
    let mut table = CrossRefTable::new();
    let mut found = 0usize;
    for capture in RE_OBJ_PATTERN.captures_iter(&contents) {
        let Some(m) = capture.get(0) else { continue };
        let start = m.start();
        // the number must begin a token
        if start > 0 {
            let before = contents[start - 1];
            if !is_whitespace(before) && !is_delimiter(before) {
                continue;
            }
        }

        let end = (start + 64).min(contents.len());
        let mut tz = Tokenizer::with_base(&contents[start..end], start);
        let reference = match parse_object_header(&mut tz) {
            Ok(r) if r.id <= limit => r,
            Ok(r) => {
                log::debug!("Ignoring object number {} in a {} byte file", r.id, contents.len());
                continue;
            },
            _ => continue,
        };
        table.set(
            reference.id,
            XRefEntry::InUse {
                offset: start as u64,
                generation: reference.gen,
            },
        );
        found += 1;
    }
    log::debug!("Recovery scan found {} object headers", found);

    let settings = ParseSettings {
        max_nesting: options.max_nesting,
        input_complete: true,
    };
    let mut findings = inspect_objects(&contents, &table, &settings);

    // latest container first, so its members win over older copies
    let mut containers = Vec::new();
    for (container, object) in findings.object_streams.iter().rev() {
        match ObjectStream::parse(object, options) {
            Ok(stm) => {
                for (index, member) in stm.object_numbers().enumerate() {
                    if member != *container && member <= limit {
                        table.add_entry(
                            member,
                            XRefEntry::Compressed {
                                stream_number: *container,
                                index: index as u32,
                            },
                        );
                    }
                }
                containers.push((*container, stm));
            },
            Err(e) => log::warn!("Recovered object stream {} is unusable: {}", container, e),
        }
    }
    classify_members(&containers, &table, &settings, &mut findings);

    let mut trailer = find_trailer(&contents, &findings, &settings).unwrap_or_default();
    for key in STREAM_ONLY_KEYS {
        trailer.remove(key);
    }

    let root_ok = trailer
        .get_reference("Root")
        .is_some_and(|r| findings.catalogs.contains(&r));
    if !root_ok {
        let catalog = findings.catalog.ok_or(Error::UnresolvableRoot)?;
        log::info!("Using object {} as the document catalog", catalog);
        trailer.insert("Root", Object::Reference(catalog));
    }
    if !trailer.contains_key("Info") {
        if let Some(info) = findings.info {
            trailer.insert("Info", Object::Reference(info));
        }
    }
    trailer.insert("Size", Object::Integer(table.size() as i64));

    table.set_declared_size(table.size());
    table.set_trailer(trailer);
    log::info!("Recovery rebuilt {} entries", table.len());
    Ok(table)
}

/// Classify the registered members of recovered object streams.
///
/// Direct objects take precedence; a compressed catalog is used only when no
/// direct one was found.
fn classify_members(
    containers: &[(u32, ObjectStream)],
    table: &CrossRefTable,
    settings: &ParseSettings,
    findings: &mut ScanFindings,
) {
    for (container, stm) in containers {
        for (index, (member, parsed)) in stm.parse_all(settings).into_iter().enumerate() {
            let expected = XRefEntry::Compressed {
                stream_number: *container,
                index: index as u32,
            };
            if table.get(member) != Some(&expected) {
                continue;
            }
            let Ok(Object::Dictionary(dict)) = parsed else { continue };
            let reference = ObjectRef::new(member, 0);
            if is_catalog_like(&dict) {
                findings.catalogs.push(reference);
                findings.catalog.get_or_insert(reference);
            } else if is_info_like(&dict) {
                findings.info.get_or_insert(reference);
            }
        }
    }
}

/// Parse every recovered object once to classify it.
fn inspect_objects(contents: &[u8], table: &CrossRefTable, settings: &ParseSettings) -> ScanFindings {
    let mut findings = ScanFindings::default();
    let mut by_offset: Vec<(usize, u32)> = table
        .iter()
        .filter_map(|(num, e)| match *e {
            XRefEntry::InUse { offset, .. } => Some((offset as usize, num)),
            _ => None,
        })
        .collect();
    by_offset.sort_unstable();

    for (offset, num) in by_offset {
        let parsed = match parse_indirect_object(&contents[offset..], offset, settings, true) {
            Ok(p) => p,
            Err(e) => {
                log::debug!("Recovered object {} at byte {} does not parse: {}", num, offset, e);
                continue;
            },
        };
        let reference = parsed.reference;
        let type_name = parsed.object.as_dict().and_then(Dictionary::type_name).map(str::to_owned);
        match (parsed.object, type_name.as_deref()) {
            (stream @ Object::Stream { .. }, Some("ObjStm")) => {
                findings.object_streams.push((num, stream));
            },
            (Object::Stream { dict, .. }, Some("XRef")) => {
                findings.xref_stream = Some((offset, dict));
            },
            (Object::Dictionary(dict), _) => {
                if is_catalog_like(&dict) {
                    findings.catalog = Some(reference);
                    findings.catalogs.push(reference);
                } else if is_info_like(&dict) {
                    findings.info = Some(reference);
                }
            },
            _ => {},
        }
    }
    findings
}

/// The last trailer-like record: a classic `trailer` dictionary or an index
/// stream dictionary, whichever appears later in the file.
fn find_trailer(contents: &[u8], findings: &ScanFindings, settings: &ParseSettings) -> Option<Dictionary> {
    let classic = RE_TRAILER.find_iter(contents).last().and_then(|m| {
        let body = m.start() + "trailer".len();
        match parse_object_with(&contents[body..], settings) {
            Ok((_, Object::Dictionary(dict))) => Some((m.start(), dict)),
            _ => {
                log::warn!("Trailer at byte {} does not parse", m.start());
                None
            },
        }
    });

    match (classic, &findings.xref_stream) {
        (Some((at, dict)), Some((stream_at, _))) if at > *stream_at => Some(dict),
        (_, Some((_, dict))) => Some(dict.clone()),
        (Some((_, dict)), None) => Some(dict),
        (None, None) => {
            log::info!("No trailer found, building one");
            None
        },
    }
}
