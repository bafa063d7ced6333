//! Byte-level fixture builder shared by the integration tests.
//!
//! Files are assembled section by section: objects are appended as they are
//! added, and each `xref_table`/`xref_stream` call closes a section that
//! describes the objects added since the previous one. A second section
//! chains to the first through `/Prev`, which is how incremental updates
//! look on disk.

#![allow(dead_code)]

use std::collections::BTreeMap;

/// Install the test logger once per binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Clone, Copy)]
enum Entry {
    Direct { offset: usize, gen: u16 },
    Compressed { container: u32, index: u32 },
    Free { next: u32, gen: u16 },
}

/// Incremental file builder.
#[derive(Debug, Clone)]
pub struct FileBuilder {
    out: Vec<u8>,
    /// Entries of the section being built
    section: BTreeMap<u32, Entry>,
    /// Entries written only to the `/XRefStm` stream of a hybrid section
    hybrid: BTreeMap<u32, Entry>,
    prev: Option<usize>,
    size: u32,
    /// Added to every direct offset written to a table
    offset_shift: i64,
}

impl Default for FileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FileBuilder {
    pub fn new() -> Self {
        Self::with_header("%PDF-1.7")
    }

    pub fn with_header(header: &str) -> Self {
        let mut out = header.as_bytes().to_vec();
        out.extend_from_slice(b"\n%\xE2\xE3\xCF\xD3\n");
        Self {
            out,
            section: BTreeMap::new(),
            hybrid: BTreeMap::new(),
            prev: None,
            size: 1,
            offset_shift: 0,
        }
    }

    fn note(&mut self, num: u32, entry: Entry) {
        self.section.insert(num, entry);
        self.size = self.size.max(num + 1);
    }

    /// Append `num gen obj body endobj`.
    pub fn object_gen(&mut self, num: u32, gen: u16, body: &str) -> &mut Self {
        let offset = self.out.len();
        self.out
            .extend_from_slice(format!("{} {} obj\n{}\nendobj\n", num, gen, body).as_bytes());
        self.note(num, Entry::Direct { offset, gen });
        self
    }

    /// Append a generation 0 object.
    pub fn object(&mut self, num: u32, body: &str) -> &mut Self {
        self.object_gen(num, 0, body)
    }

    /// Append an object without listing it in any index.
    pub fn unlisted_object(&mut self, num: u32, body: &str) -> &mut Self {
        self.out
            .extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", num, body).as_bytes());
        self
    }

    /// Append a stream object; `/Length` is added to `dict_entries`.
    pub fn stream(&mut self, num: u32, dict_entries: &str, data: &[u8]) -> &mut Self {
        let offset = self.out.len();
        self.out.extend_from_slice(
            format!("{} 0 obj\n<< {} /Length {} >>\nstream\n", num, dict_entries, data.len()).as_bytes(),
        );
        self.out.extend_from_slice(data);
        self.out.extend_from_slice(b"\nendstream\nendobj\n");
        self.note(num, Entry::Direct { offset, gen: 0 });
        self
    }

    /// Append an object stream holding `members`, optionally FlateDecode compressed.
    pub fn object_stream(&mut self, container: u32, members: &[(u32, &str)], compress: bool) -> &mut Self {
        let (payload, first) = object_stream_payload(members);
        let (data, filter) = if compress {
            (deflate(&payload), "/Filter /FlateDecode")
        } else {
            (payload, "")
        };
        let dict = format!("/Type /ObjStm /N {} /First {} {}", members.len(), first, filter);
        self.stream(container, &dict, &data);
        for (index, &(num, _)) in members.iter().enumerate() {
            self.note(
                num,
                Entry::Compressed {
                    container,
                    index: index as u32,
                },
            );
        }
        self
    }

    /// List `num` as member `index` of `container` in the current section.
    pub fn compressed(&mut self, num: u32, container: u32, index: u32) -> &mut Self {
        self.note(num, Entry::Compressed { container, index });
        self
    }

    /// List `num` as free in the current section.
    pub fn free(&mut self, num: u32, next: u32, gen: u16) -> &mut Self {
        self.note(num, Entry::Free { next, gen });
        self
    }

    /// Shift every direct offset written to later tables by `shift` bytes.
    pub fn shift_offsets(&mut self, shift: i64) -> &mut Self {
        self.offset_shift = shift;
        self
    }

    /// Append raw bytes.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.out.extend_from_slice(bytes);
        self
    }

    /// Current length of the file.
    pub fn len(&self) -> usize {
        self.out.len()
    }

    fn take_section(&mut self) -> BTreeMap<u32, Entry> {
        let mut section = std::mem::take(&mut self.section);
        if self.prev.is_none() {
            section.entry(0).or_insert(Entry::Free { next: 0, gen: 65535 });
        }
        section
    }

    fn shifted(&self, offset: usize) -> u64 {
        (offset as i64 + self.offset_shift).max(0) as u64
    }

    /// Close the section with a classic table; `trailer_entries` go into the trailer.
    pub fn xref_table(&mut self, trailer_entries: &str) -> usize {
        let section = self.take_section();
        self.write_table(&section, trailer_entries)
    }

    /// Close the section as a hybrid-reference file section.
    ///
    /// Compressed entries, plus any listed through `hybrid_compressed`, go
    /// into an index stream stored as object `num`; everything else goes into
    /// a classic table whose trailer names the stream through `/XRefStm`.
    pub fn hybrid_table(&mut self, num: u32, trailer_entries: &str) -> usize {
        let start = self.out.len();
        self.size = self.size.max(num + 1);
        let mut section = self.take_section();
        let mut streamed = std::mem::take(&mut self.hybrid);
        section.retain(|&n, entry| match entry {
            Entry::Compressed { .. } => {
                streamed.insert(n, *entry);
                false
            },
            _ => true,
        });
        self.write_stream(num, &streamed, None, "");
        section.insert(num, Entry::Direct { offset: start, gen: 0 });
        let table_trailer = format!("/XRefStm {} {}", start, trailer_entries);
        self.write_table(&section, &table_trailer)
    }

    /// List `num` as member `index` of `container` in the `/XRefStm` stream
    /// of the next hybrid section only.
    pub fn hybrid_compressed(&mut self, num: u32, container: u32, index: u32) -> &mut Self {
        self.hybrid.insert(num, Entry::Compressed { container, index });
        self.size = self.size.max(num + 1);
        self
    }

    fn write_table(&mut self, section: &BTreeMap<u32, Entry>, trailer_entries: &str) -> usize {
        let start = self.out.len();
        let mut text = String::from("xref\n");
        for (first, count) in runs(section.keys().copied()) {
            text.push_str(&format!("{} {}\n", first, count));
            for num in first..first + count {
                let line = match section[&num] {
                    Entry::Direct { offset, gen } => format!("{:010} {:05} n\r\n", self.shifted(offset), gen),
                    Entry::Free { next, gen } => format!("{:010} {:05} f\r\n", next, gen),
                    Entry::Compressed { .. } => panic!("compressed entry {} needs an index stream", num),
                };
                text.push_str(&line);
            }
        }
        let prev = self.prev.map(|p| format!(" /Prev {}", p)).unwrap_or_default();
        text.push_str(&format!(
            "trailer\n<< /Size {}{} {} >>\nstartxref\n{}\n%%EOF\n",
            self.size, prev, trailer_entries, start
        ));
        self.out.extend_from_slice(text.as_bytes());
        self.prev = Some(start);
        start
    }

    /// Close the section with an uncompressed index stream stored as object `num`.
    pub fn xref_stream(&mut self, num: u32, trailer_entries: &str) -> usize {
        let start = self.out.len();
        self.size = self.size.max(num + 1);
        let mut section = self.take_section();
        section.insert(num, Entry::Direct { offset: start, gen: 0 });
        let prev = self.prev;
        self.write_stream(num, &section, prev, trailer_entries);
        self.out
            .extend_from_slice(format!("startxref\n{}\n%%EOF\n", start).as_bytes());
        self.prev = Some(start);
        start
    }

    fn write_stream(&mut self, num: u32, section: &BTreeMap<u32, Entry>, prev: Option<usize>, trailer_entries: &str) {
        let mut data = Vec::new();
        let mut index = Vec::new();
        for (first, count) in runs(section.keys().copied()) {
            index.push(format!("{} {}", first, count));
            for n in first..first + count {
                let (kind, a, b) = match section[&n] {
                    Entry::Free { next, gen } => (0u8, u64::from(next), gen),
                    Entry::Direct { offset, gen } => (1, self.shifted(offset), gen),
                    Entry::Compressed { container, index } => (2, u64::from(container), index as u16),
                };
                data.push(kind);
                data.extend_from_slice(&(a as u32).to_be_bytes());
                data.extend_from_slice(&b.to_be_bytes());
            }
        }
        let prev = prev.map(|p| format!(" /Prev {}", p)).unwrap_or_default();
        let header = format!(
            "{} 0 obj\n<< /Type /XRef /Size {} /W [1 4 2] /Index [{}]{} {} /Length {} >>\nstream\n",
            num,
            self.size,
            index.join(" "),
            prev,
            trailer_entries,
            data.len()
        );
        self.out.extend_from_slice(header.as_bytes());
        self.out.extend_from_slice(&data);
        self.out.extend_from_slice(b"\nendstream\nendobj\n");
    }

    /// The bytes built so far.
    pub fn build(&self) -> Vec<u8> {
        self.out.clone()
    }
}

/// Build the payload of an object stream; returns `(payload, first)`.
pub fn object_stream_payload(members: &[(u32, &str)]) -> (Vec<u8>, usize) {
    let mut header = String::new();
    let mut body = String::new();
    for &(num, text) in members {
        header.push_str(&format!("{} {} ", num, body.len()));
        body.push_str(text);
        body.push('\n');
    }
    header.push('\n');
    let first = header.len();
    let mut payload = header.into_bytes();
    payload.extend_from_slice(body.as_bytes());
    (payload, first)
}

/// zlib-compress `data`.
pub fn deflate(data: &[u8]) -> Vec<u8> {
    pdf_kernel::decoders::flate_encode(data).unwrap()
}

/// Damage every `startxref` keyword so the index cannot be found.
pub fn strip_startxref(mut data: Vec<u8>) -> Vec<u8> {
    let mut i = 0;
    while i + 9 <= data.len() {
        if &data[i..i + 9] == b"startxref" {
            data[i + 8] = b'z';
        }
        i += 1;
    }
    data
}

fn runs(numbers: impl Iterator<Item = u32>) -> Vec<(u32, u32)> {
    let mut out: Vec<(u32, u32)> = Vec::new();
    for n in numbers {
        match out.last_mut() {
            Some((first, count)) if *first + *count == n => *count += 1,
            _ => out.push((n, 1)),
        }
    }
    out
}

/// A minimal two-object file: catalog 1 and pages 2.
pub fn simple_file() -> Vec<u8> {
    let mut b = FileBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>");
    b.xref_table("/Root 1 0 R");
    b.build()
}
