//! Whole-document output.
//!
//! [`DocumentWriter::write_full`] rewrites every live object under a fresh
//! index; [`DocumentWriter::write_incremental`] appends only the objects
//! added or marked for rewrite, chaining the new index section to the old
//! one through `/Prev`.

use super::object_serializer::ObjectSerializer;
use super::{WriterOptions, XrefStyle};
use crate::decoders::flate_encode;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

/// Members per generated object stream.
const OBJECTS_PER_STREAM: usize = 100;

/// Binary marker line written after the header.
const BINARY_MARKER: &[u8] = b"%\xE2\xE3\xCF\xD3\n";

/// Where a written object ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Direct { offset: u64, generation: u16 },
    Packed { container: u32, index: u32 },
}

/// Writes documents to bytes.
#[derive(Debug, Clone, Default)]
pub struct DocumentWriter {
    options: WriterOptions,
    serializer: ObjectSerializer,
}

impl DocumentWriter {
    /// Create a writer with the given options.
    pub fn new(options: WriterOptions) -> Self {
        Self {
            options,
            serializer: ObjectSerializer::compact(),
        }
    }

    /// The options in effect.
    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Rewrite every live object of `doc` with a fresh index.
    ///
    /// Object stream containers and cross-reference streams of the source are
    /// not carried over; their numbers become free. Objects that resolve to
    /// nothing are written as `null` so references to them stay valid.
    pub fn write_full(&self, doc: &mut Document) -> Result<Vec<u8>> {
        if doc.is_closed() {
            return Err(Error::DocumentClosed);
        }
        // encrypted payloads must keep their filters and layout
        let encrypted = doc.is_encrypted();
        let pack = self.options.use_object_streams && !encrypted;
        let style = if pack { XrefStyle::Stream } else { self.options.xref_style };

        let mut objects: Vec<(ObjectRef, Arc<Object>)> = Vec::new();
        let mut dropped: Vec<u32> = Vec::new();
        let live: Vec<(u32, u16)> = doc
            .xref()
            .iter()
            .filter(|&(num, entry)| num != 0 && entry.is_in_use())
            .map(|(num, entry)| (num, entry.generation()))
            .collect();
        for (num, generation) in live {
            let reference = ObjectRef::new(num, generation);
            let object = doc.resolve(reference);
            if object.has_type("ObjStm") || object.has_type("XRef") {
                dropped.push(num);
                continue;
            }
            objects.push((reference, object));
        }

        let mut out = Vec::new();
        let (major, minor) = doc.version();
        let (major, minor) = if style == XrefStyle::Stream && (major, minor) < (1, 5) {
            (1, 5)
        } else {
            (major, minor)
        };
        writeln!(out, "%PDF-{}.{}", major, minor)?;
        out.extend_from_slice(BINARY_MARKER);

        let mut slots: BTreeMap<u32, Slot> = BTreeMap::new();
        let mut next_number = doc.xref().size().max(1);
        let mut packable: Vec<(ObjectRef, Arc<Object>)> = Vec::new();

        for (reference, object) in objects {
            if pack && reference.gen == 0 && !object.is_stream() {
                packable.push((reference, object));
                continue;
            }
            let offset = out.len() as u64;
            self.write_object(&mut out, reference, &object, encrypted)?;
            slots.insert(
                reference.id,
                Slot::Direct {
                    offset,
                    generation: reference.gen,
                },
            );
        }

        for chunk in packable.chunks(OBJECTS_PER_STREAM) {
            let container = next_number;
            next_number += 1;
            let stream = self.build_object_stream(chunk)?;
            let offset = out.len() as u64;
            self.serializer
                .write_indirect(&mut out, ObjectRef::new(container, 0), &stream)?;
            slots.insert(container, Slot::Direct { offset, generation: 0 });
            for (index, (reference, _)) in chunk.iter().enumerate() {
                slots.insert(
                    reference.id,
                    Slot::Packed {
                        container,
                        index: index as u32,
                    },
                );
            }
            log::debug!("Packed {} objects into object stream {}", chunk.len(), container);
        }

        let mut trailer = doc.trailer().clone();
        trailer.remove("Prev");
        trailer.remove("XRefStm");

        match style {
            XrefStyle::Table => {
                let size = next_number;
                trailer.insert("Size", Object::Integer(i64::from(size)));
                let free = free_chain(size, &slots, doc);
                let startxref = out.len();
                write_table(&mut out, &[(0, size)], &slots, &free)?;
                self.write_trailer(&mut out, &trailer, startxref)?;
            },
            XrefStyle::Stream => {
                let xref_number = next_number;
                let size = xref_number + 1;
                let startxref = out.len();
                slots.insert(
                    xref_number,
                    Slot::Direct {
                        offset: startxref as u64,
                        generation: 0,
                    },
                );
                let free = free_chain(size, &slots, doc);
                let stream = build_xref_stream(trailer, &[(0, size)], size, &slots, &free)?;
                self.serializer
                    .write_indirect(&mut out, ObjectRef::new(xref_number, 0), &stream)?;
                write!(out, "startxref\n{}\n%%EOF\n", startxref)?;
            },
        }

        if !dropped.is_empty() {
            log::debug!("Dropped {} container objects from the rewrite", dropped.len());
        }
        Ok(out)
    }

    /// Append the modified objects of `doc` to its original bytes.
    ///
    /// Falls back to [`write_full`](Self::write_full) when the document was
    /// created in memory or opened through recovery, since there is no
    /// trustworthy index to chain to.
    pub fn write_incremental(&self, doc: &mut Document) -> Result<Vec<u8>> {
        let original = doc.original_bytes()?;
        let (mut out, prev) = match (original, doc.startxref()) {
            (Some(bytes), Some(prev)) if !doc.is_recovered() => (bytes, prev),
            _ => {
                log::info!("No index to append to, writing the whole document");
                return self.write_full(doc);
            },
        };
        if !matches!(out.last(), Some(b'\n') | Some(b'\r')) {
            out.push(b'\n');
        }

        let encrypted = doc.is_encrypted();
        let mut slots: BTreeMap<u32, Slot> = BTreeMap::new();
        for reference in doc.modified_objects() {
            let object = doc.resolve(reference);
            let offset = out.len() as u64;
            self.write_object(&mut out, reference, &object, encrypted)?;
            slots.insert(
                reference.id,
                Slot::Direct {
                    offset,
                    generation: reference.gen,
                },
            );
        }

        let mut trailer = doc.trailer().clone();
        trailer.remove("XRefStm");
        trailer.insert("Prev", Object::Integer(prev as i64));
        let size = doc.xref().size().max(1);

        match self.options.xref_style {
            XrefStyle::Table => {
                trailer.insert("Size", Object::Integer(i64::from(size)));
                let subsections = subsections(slots.keys().copied());
                let startxref = out.len();
                write_table(&mut out, &subsections, &slots, &BTreeMap::new())?;
                self.write_trailer(&mut out, &trailer, startxref)?;
            },
            XrefStyle::Stream => {
                let xref_number = size;
                let startxref = out.len();
                slots.insert(
                    xref_number,
                    Slot::Direct {
                        offset: startxref as u64,
                        generation: 0,
                    },
                );
                let subsections = subsections(slots.keys().copied());
                let stream = build_xref_stream(trailer, &subsections, xref_number + 1, &slots, &BTreeMap::new())?;
                self.serializer
                    .write_indirect(&mut out, ObjectRef::new(xref_number, 0), &stream)?;
                write!(out, "startxref\n{}\n%%EOF\n", startxref)?;
            },
        }

        log::debug!("Appended {} objects after offset {}", slots.len(), prev);
        Ok(out)
    }

    /// Write one indirect object, compressing unfiltered streams when asked.
    fn write_object(&self, out: &mut Vec<u8>, reference: ObjectRef, object: &Object, encrypted: bool) -> Result<()> {
        match object {
            Object::Stream { dict, data }
                if self.options.compress_streams && !encrypted && !dict.contains_key("Filter") =>
            {
                let mut dict = dict.clone();
                dict.insert("Filter", Object::name("FlateDecode"));
                dict.remove("DecodeParms");
                let compressed = Object::Stream {
                    dict,
                    data: flate_encode(data)?.into(),
                };
                self.serializer.write_indirect(out, reference, &compressed)
            },
            _ => self.serializer.write_indirect(out, reference, object),
        }
    }

    /// Build an object stream holding `members`.
    fn build_object_stream(&self, members: &[(ObjectRef, Arc<Object>)]) -> Result<Object> {
        let mut header = Vec::new();
        let mut body = Vec::new();
        for (reference, object) in members {
            write!(header, "{} {} ", reference.id, body.len())?;
            self.serializer.write_object(&mut body, object)?;
            body.push(b'\n');
        }
        header.push(b'\n');
        let first = header.len();
        header.extend_from_slice(&body);

        let mut dict = Dictionary::new();
        dict.insert("Type", Object::name("ObjStm"));
        dict.insert("N", Object::Integer(members.len() as i64));
        dict.insert("First", Object::Integer(first as i64));
        dict.insert("Filter", Object::name("FlateDecode"));
        Ok(Object::Stream {
            dict,
            data: flate_encode(&header)?.into(),
        })
    }

    fn write_trailer(&self, out: &mut Vec<u8>, trailer: &Dictionary, startxref: usize) -> Result<()> {
        out.extend_from_slice(b"trailer\n");
        self.serializer.write_object(out, &Object::Dictionary(trailer.clone()))?;
        write!(out, "\nstartxref\n{}\n%%EOF\n", startxref)?;
        Ok(())
    }
}

/// Free entries for `0..size` that were not written, as `number -> (next, generation)`.
///
/// The chain starts at object 0 and ends back at 0. Numbers that were free
/// in the source keep their generation.
fn free_chain(size: u32, slots: &BTreeMap<u32, Slot>, doc: &Document) -> BTreeMap<u32, (u32, u16)> {
    let free: Vec<u32> = (1..size).filter(|num| !slots.contains_key(num)).collect();
    let mut chain = BTreeMap::new();
    let mut previous = 0u32;
    let mut previous_generation = 65535u16;
    for &num in &free {
        chain.insert(previous, (num, previous_generation));
        previous = num;
        previous_generation = match doc.xref().get(num) {
            Some(entry) if entry.is_free() => entry.generation(),
            _ => 0,
        };
    }
    chain.insert(previous, (0, previous_generation));
    chain
}

/// Runs of consecutive numbers as `(first, count)`.
fn subsections(numbers: impl Iterator<Item = u32>) -> Vec<(u32, u32)> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for num in numbers {
        match runs.last_mut() {
            Some((first, count)) if *first + *count == num => *count += 1,
            _ => runs.push((num, 1)),
        }
    }
    runs
}

/// Write a classic `xref` section with 20-byte records.
fn write_table(
    out: &mut Vec<u8>,
    subsections: &[(u32, u32)],
    slots: &BTreeMap<u32, Slot>,
    free: &BTreeMap<u32, (u32, u16)>,
) -> Result<()> {
    out.extend_from_slice(b"xref\n");
    for &(first, count) in subsections {
        writeln!(out, "{} {}", first, count)?;
        for num in first..first + count {
            match (slots.get(&num), free.get(&num)) {
                (Some(Slot::Direct { offset, generation }), _) => {
                    write!(out, "{:010} {:05} n\r\n", offset, generation)?;
                },
                (None, Some(&(next, generation))) => {
                    write!(out, "{:010} {:05} f\r\n", next, generation)?;
                },
                _ => {
                    return Err(Error::Format(format!(
                        "object {} cannot be described by a classic table",
                        num
                    )));
                },
            }
        }
    }
    Ok(())
}

/// Bytes needed to hold `value`, at least one.
fn byte_width(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

fn push_be(data: &mut Vec<u8>, value: u64, width: usize) {
    for i in (0..width).rev() {
        data.push((value >> (i * 8)) as u8);
    }
}

/// Build a cross-reference stream from `trailer` and the written slots.
fn build_xref_stream(
    mut dict: Dictionary,
    subsections: &[(u32, u32)],
    size: u32,
    slots: &BTreeMap<u32, Slot>,
    free: &BTreeMap<u32, (u32, u16)>,
) -> Result<Object> {
    let mut records: Vec<(u8, u64, u64)> = Vec::new();
    for &(first, count) in subsections {
        for num in first..first + count {
            let record = match (slots.get(&num), free.get(&num)) {
                (Some(&Slot::Direct { offset, generation }), _) => (1, offset, u64::from(generation)),
                (Some(&Slot::Packed { container, index }), _) => (2, u64::from(container), u64::from(index)),
                (None, Some(&(next, generation))) => (0, u64::from(next), u64::from(generation)),
                (None, None) => (0, 0, 0),
            };
            records.push(record);
        }
    }
    let w1 = records.iter().map(|r| r.1).max().map_or(1, byte_width);
    let w2 = records.iter().map(|r| r.2).max().map_or(1, byte_width);

    let mut data = Vec::with_capacity(records.len() * (1 + w1 + w2));
    for (kind, field1, field2) in records {
        data.push(kind);
        push_be(&mut data, field1, w1);
        push_be(&mut data, field2, w2);
    }

    dict.insert("Type", Object::name("XRef"));
    dict.insert("Size", Object::Integer(i64::from(size)));
    dict.insert(
        "W",
        Object::Array(vec![
            Object::Integer(1),
            Object::Integer(w1 as i64),
            Object::Integer(w2 as i64),
        ]),
    );
    if subsections != [(0, size)] {
        let index = subsections
            .iter()
            .flat_map(|&(first, count)| [Object::Integer(i64::from(first)), Object::Integer(i64::from(count))])
            .collect();
        dict.insert("Index", Object::Array(index));
    }
    dict.insert("Filter", Object::name("FlateDecode"));
    dict.remove("DecodeParms");
    Ok(Object::Stream {
        dict,
        data: flate_encode(&data)?.into(),
    })
}
