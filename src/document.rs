//! Document model.
//!
//! A [`Document`] owns its byte source, the merged cross-reference table, the
//! trailer and a cache of parsed objects. Objects are parsed lazily on first
//! resolution and shared as `Arc<Object>` afterwards, so resolving the same
//! identity twice yields the same instance.
//!
//! Opening never fails because of a broken index: when the index is missing
//! or inconsistent with the bytes it describes, the table is rebuilt by
//! scanning the file, and [`Document::is_recovered`] reports it.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::objstm::ObjectStream;
use crate::parser::{ParseSettings, parse_indirect_object};
use crate::parser_config::ParserOptions;
use crate::source::{ByteSource, PdfSource};
use crate::xref::{CrossRefTable, XRefEntry, check_entry_offsets, find_startxref, load_xref_chain};
use crate::xref_reconstruction::reconstruct_xref;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Version assumed when the header is missing or damaged.
const DEFAULT_VERSION: (u8, u8) = (1, 4);

/// Initial window when parsing an object.
const OBJECT_WINDOW: usize = 4096;

/// How far into the file the header may be preceded by garbage.
const HEADER_SEARCH: usize = 1024;

/// Trailer keys carried over from a rejected index when recovery rebuilds the trailer.
const CARRIED_TRAILER_KEYS: [&str; 2] = ["Encrypt", "ID"];

/// Process-unique identity of an open document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(Uuid);

impl DocumentId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A reference to an indirect object tied to the document it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    document: DocumentId,
    reference: ObjectRef,
}

impl ObjectHandle {
    /// The owning document.
    pub fn document(&self) -> DocumentId {
        self.document
    }

    /// The object identity inside that document.
    pub fn reference(&self) -> ObjectRef {
        self.reference
    }
}

/// Counters describing the work a document has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DocumentStats {
    /// Objects parsed from bytes, including object stream members
    pub objects_parsed: u64,
    /// Object stream payloads decoded
    pub object_streams_decoded: u64,
    /// Resolutions answered from the cache
    pub cache_hits: u64,
    /// Recovery scans performed
    pub recoveries: u64,
}

/// An open document.
///
/// # Example
///
/// ```no_run
/// use pdf_kernel::document::Document;
///
/// let mut doc = Document::open("sample.pdf")?;
/// let catalog = doc.catalog()?;
/// println!("recovered: {}, objects: {}", doc.is_recovered(), doc.size());
/// println!("catalog: {:?}", catalog.as_dict().and_then(|d| d.type_name()));
/// # Ok::<(), pdf_kernel::error::Error>(())
/// ```
pub struct Document {
    id: DocumentId,
    source: Option<ByteSource>,
    options: ParserOptions,
    version: (u8, u8),
    xref: CrossRefTable,
    trailer: Dictionary,
    /// Offset named by the file's `startxref`, when the index loaded cleanly
    startxref: Option<usize>,
    recovered: bool,
    /// A lazy rebuild has already been attempted after open
    rebuilt: bool,
    cache: HashMap<ObjectRef, Arc<Object>>,
    /// Shared instance handed out for every identity that resolves to null
    null: Arc<Object>,
    /// Identities currently being parsed (guards indirect `/Length` loops)
    loading: HashSet<ObjectRef>,
    /// Objects added or marked for rewrite, by number
    modified: BTreeMap<u32, u16>,
    /// Objects copied into this document: (source document, source number) to target identity
    copy_map: HashMap<(DocumentId, u32), ObjectRef>,
    stats: DocumentStats,
    closed: bool,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("xref_entries", &self.xref.len())
            .field("cached_objects", &self.cache.len())
            .field("recovered", &self.recovered)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty in-memory document.
    ///
    /// The table holds only the free-list head; objects are added with
    /// [`Document::add_indirect_object`].
    pub fn new() -> Self {
        let mut xref = CrossRefTable::new();
        xref.set(
            0,
            XRefEntry::Free {
                next_free: 0,
                generation: 65535,
            },
        );
        xref.set_declared_size(1);
        let mut trailer = Dictionary::new();
        trailer.insert("Size", Object::Integer(1));
        Self {
            id: DocumentId::new(),
            source: None,
            options: ParserOptions::default(),
            version: (1, 7),
            xref,
            trailer,
            startxref: None,
            recovered: false,
            rebuilt: false,
            cache: HashMap::new(),
            null: Arc::new(Object::Null),
            loading: HashSet::new(),
            modified: BTreeMap::new(),
            copy_map: HashMap::new(),
            stats: DocumentStats::default(),
            closed: false,
        }
    }

    /// Open a document from a file path.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read, or with [`Error::UnresolvableRoot`]
    /// when not even a recovery scan finds a catalog.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, ParserOptions::default())
    }

    /// Open a document from a file path with explicit options.
    pub fn open_with_options(path: impl AsRef<Path>, options: ParserOptions) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader_with_options(file, options)
    }

    /// Open a document held in memory.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Result<Self> {
        Self::from_bytes_with_options(data, ParserOptions::default())
    }

    /// Open a document held in memory with explicit options.
    pub fn from_bytes_with_options(data: impl Into<Vec<u8>>, options: ParserOptions) -> Result<Self> {
        Self::load(ByteSource::from_bytes(data), options)
    }

    /// Open a document from any seekable reader.
    pub fn from_reader(reader: impl PdfSource + 'static) -> Result<Self> {
        Self::from_reader_with_options(reader, ParserOptions::default())
    }

    /// Open a document from any seekable reader with explicit options.
    pub fn from_reader_with_options(reader: impl PdfSource + 'static, options: ParserOptions) -> Result<Self> {
        Self::load(ByteSource::new(Box::new(reader))?, options)
    }

    fn load(mut source: ByteSource, options: ParserOptions) -> Result<Self> {
        let head = source.read_at(0, HEADER_SEARCH)?;
        let version = match parse_header(&head) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("{}; assuming version {}.{}", e, DEFAULT_VERSION.0, DEFAULT_VERSION.1);
                DEFAULT_VERSION
            },
        };

        let mut doc = Self {
            source: Some(source),
            options,
            version,
            ..Self::new()
        };
        doc.xref = CrossRefTable::new();
        doc.trailer = Dictionary::new();

        match doc.load_index() {
            Ok(()) => {},
            Err(e) if e.invalidates_table() => {
                log::warn!("Index rejected, recovering: {}", e);
                doc.recover(true)?;
            },
            Err(e) => return Err(e),
        }
        log::debug!(
            "Opened document {} (version {}.{}, {} entries, recovered: {})",
            doc.id,
            doc.version.0,
            doc.version.1,
            doc.xref.len(),
            doc.recovered
        );
        Ok(doc)
    }

    /// Load the index through `startxref`, then validate it.
    fn load_index(&mut self) -> Result<()> {
        let options = self.options;
        let source = self.source.as_mut().ok_or(Error::DocumentClosed)?;
        let startxref = find_startxref(source)?;
        let table = load_xref_chain(source, startxref, &options)?;
        let trailer = table.trailer().cloned().unwrap_or_default();

        if trailer.get_integer("Size").is_none() {
            return Err(Error::TableInvalid("trailer has no /Size".to_string()));
        }
        let root = trailer
            .get_reference("Root")
            .ok_or_else(|| Error::TableInvalid("trailer has no /Root reference".to_string()))?;

        if options.validate_offsets {
            check_entry_offsets(&table, source)?;
        }

        self.xref = table;
        self.trailer = trailer;
        self.startxref = Some(startxref);

        self.check_containers()?;

        match self.fetch(root) {
            Ok(obj) if is_plausible_root(&obj) => Ok(()),
            Ok(obj) => Err(Error::TableInvalid(format!(
                "root {} resolves to a {}",
                root,
                obj.type_name()
            ))),
            Err(e) => Err(Error::TableInvalid(format!("root {} does not load: {}", root, e))),
        }
    }

    /// Every compressed entry must name a direct object stream with enough members.
    fn check_containers(&mut self) -> Result<()> {
        let mut highest_index: BTreeMap<u32, u32> = BTreeMap::new();
        for (_, entry) in self.xref.iter() {
            if let XRefEntry::Compressed { stream_number, index } = *entry {
                let slot = highest_index.entry(stream_number).or_insert(0);
                *slot = (*slot).max(index);
            }
        }

        for (container, highest) in highest_index {
            let generation = match self.xref.get(container) {
                Some(XRefEntry::InUse { generation, .. }) => *generation,
                other => {
                    return Err(Error::TableInvalid(format!(
                        "object stream {} has entry {:?}",
                        container, other
                    )));
                },
            };
            let obj = self
                .fetch(ObjectRef::new(container, generation))
                .map_err(|e| Error::TableInvalid(format!("object stream {}: {}", container, e)))?;
            if !obj.is_stream() || !obj.has_type("ObjStm") {
                return Err(Error::TableInvalid(format!("object {} is not an object stream", container)));
            }
            let members = obj.as_dict().and_then(|d| d.get_integer("N")).unwrap_or(0);
            if i64::from(highest) >= members {
                return Err(Error::TableInvalid(format!(
                    "index {} is out of range for object stream {} with {} members",
                    highest, container, members
                )));
            }
        }
        Ok(())
    }

    /// Replace the table with one rebuilt by scanning the file.
    ///
    /// At open the cache is discarded, since it may hold objects read through
    /// the rejected index. Afterwards it is kept so handed-out instances stay
    /// the instances of their identities.
    fn recover(&mut self, at_open: bool) -> Result<()> {
        let options = self.options;
        let source = self.source.as_mut().ok_or(Error::DocumentClosed)?;
        let mut table = reconstruct_xref(source, &options)?;
        self.stats.recoveries += 1;

        let mut trailer = table.trailer().cloned().unwrap_or_default();
        for key in CARRIED_TRAILER_KEYS {
            if !trailer.contains_key(key) {
                if let Some(value) = self.trailer.get(key) {
                    trailer.insert(key, value.clone());
                }
            }
        }

        if at_open {
            self.cache.clear();
        } else {
            for (&num, &generation) in &self.modified {
                if !table.contains(num) {
                    table.set(num, XRefEntry::InUse { offset: 0, generation });
                }
            }
        }
        table.set_trailer(trailer.clone());
        self.xref = table;
        self.trailer = trailer;
        self.startxref = None;
        self.recovered = true;
        Ok(())
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Resolve an indirect reference.
    ///
    /// Never fails: free, absent and damaged objects resolve to `Null`, with
    /// a logged diagnostic for damaged ones. A closed document resolves
    /// everything to `Null`.
    pub fn resolve(&mut self, reference: ObjectRef) -> Arc<Object> {
        match self.fetch(reference) {
            Ok(obj) => obj,
            Err(Error::DocumentClosed) => {
                log::warn!("Resolving {} on a closed document", reference);
                Arc::clone(&self.null)
            },
            Err(e) => {
                log::warn!("Object {} resolves to null: {}", reference, e);
                let null = Arc::clone(&self.null);
                self.cache.insert(reference, Arc::clone(&null));
                null
            },
        }
    }

    /// Fetch an object by number and generation.
    ///
    /// Fails with [`Error::DocumentClosed`] after [`Document::close`]. A
    /// damaged object is an error in strict mode and `Null` otherwise.
    pub fn get_object_by_number(&mut self, num: u32, gen: u16) -> Result<Arc<Object>> {
        let reference = ObjectRef::new(num, gen);
        if self.closed {
            return Err(Error::DocumentClosed);
        }
        if self.options.strict {
            self.fetch(reference)
        } else {
            Ok(self.resolve(reference))
        }
    }

    /// Follow references until a direct object is reached.
    ///
    /// A reference loop, or a chain longer than the configured limit,
    /// resolves to `Null`.
    pub fn dereference(&mut self, obj: &Object) -> Arc<Object> {
        let Some(mut reference) = obj.as_reference() else {
            return Arc::new(obj.clone());
        };
        let mut seen = HashSet::new();
        loop {
            if !seen.insert(reference) {
                log::warn!("Reference loop through {}", reference);
                return Arc::clone(&self.null);
            }
            if seen.len() > self.options.max_reference_chain {
                log::warn!("Reference chain longer than {} at {}", self.options.max_reference_chain, reference);
                return Arc::clone(&self.null);
            }
            let resolved = self.resolve(reference);
            match resolved.as_reference() {
                Some(next) => reference = next,
                None => return resolved,
            }
        }
    }

    /// Look up `key` in a dictionary and dereference the value.
    pub fn get_from_dict(&mut self, dict: &Dictionary, key: &str) -> Arc<Object> {
        match dict.get(key) {
            Some(value) => self.dereference(value),
            None => Arc::clone(&self.null),
        }
    }

    /// Resolve with errors, caching what loads.
    fn fetch(&mut self, reference: ObjectRef) -> Result<Arc<Object>> {
        if self.closed {
            return Err(Error::DocumentClosed);
        }
        if let Some(obj) = self.cache.get(&reference) {
            self.stats.cache_hits += 1;
            return Ok(Arc::clone(obj));
        }
        if !self.loading.insert(reference) {
            return Err(Error::ObjectLoad(reference, "object refers to itself while loading".to_string()));
        }
        let loaded = self.load_object(reference);
        self.loading.remove(&reference);

        let loaded = match loaded {
            Err(Error::Format(reason)) if !self.rebuilt && self.source.is_some() => {
                self.rebuilt = true;
                log::warn!("Object {} hit a format error ({}), rebuilding the index", reference, reason);
                match self.recover(false) {
                    Ok(()) => {
                        if let Some(obj) = self.cache.get(&reference) {
                            return Ok(Arc::clone(obj));
                        }
                        self.loading.insert(reference);
                        let retry = self.load_object(reference);
                        self.loading.remove(&reference);
                        retry
                    },
                    Err(e) => {
                        log::warn!("Rebuild failed: {}", e);
                        Err(Error::Format(reason))
                    },
                }
            },
            other => other,
        };

        match loaded? {
            Some(obj) => {
                let obj = Arc::new(obj);
                self.cache.insert(reference, Arc::clone(&obj));
                Ok(obj)
            },
            None => Ok(Arc::clone(&self.null)),
        }
    }

    /// Parse an object through its index entry; `None` when the slot holds no live object.
    fn load_object(&mut self, reference: ObjectRef) -> Result<Option<Object>> {
        match self.xref.get(reference.id).copied() {
            None => {
                log::debug!("Object {} is not in the index", reference);
                Ok(None)
            },
            Some(XRefEntry::Free { .. }) => {
                log::debug!("Object {} is free", reference);
                Ok(None)
            },
            Some(XRefEntry::InUse { offset, generation }) => {
                if generation != reference.gen {
                    log::debug!("Object {} requested, index has generation {}", reference, generation);
                    return Ok(None);
                }
                self.load_direct(reference, offset).map(Some)
            },
            Some(XRefEntry::Compressed { stream_number, index }) => {
                if reference.gen != 0 {
                    log::debug!("Compressed object {} requested with a nonzero generation", reference);
                    return Ok(None);
                }
                self.load_compressed(reference, stream_number, index).map(Some)
            },
        }
    }

    fn load_direct(&mut self, reference: ObjectRef, offset: u64) -> Result<Object> {
        let options = self.options;
        let source = self.source.as_mut().ok_or(Error::DocumentClosed)?;
        let offset = usize::try_from(offset)
            .ok()
            .filter(|&o| o < source.len())
            .ok_or_else(|| Error::ObjectLoad(reference, format!("offset {} is past the end", offset)))?;

        let parsed = source.with_window(offset, OBJECT_WINDOW, |window, complete| {
            let settings = ParseSettings {
                max_nesting: options.max_nesting,
                input_complete: complete,
            };
            parse_indirect_object(window, offset, &settings, options.allow_missing_endobj)
        })?;
        self.stats.objects_parsed += 1;

        if parsed.reference != reference {
            return Err(Error::ObjectLoad(
                reference,
                format!("byte {} holds object {}", offset, parsed.reference),
            ));
        }
        let mut object = parsed.object;
        self.apply_indirect_length(reference, &mut object);
        Ok(object)
    }

    /// Trim a stream whose `/Length` is indirect to the resolved length.
    fn apply_indirect_length(&mut self, reference: ObjectRef, object: &mut Object) {
        let Object::Stream { dict, data } = object else {
            return;
        };
        let Some(length_ref) = dict.get_reference("Length") else {
            return;
        };
        let length = match self.fetch(length_ref) {
            Ok(obj) => obj.as_integer(),
            Err(e) => {
                log::debug!("Length {} of stream {} does not load: {}", length_ref, reference, e);
                None
            },
        };
        match length.and_then(|n| usize::try_from(n).ok()) {
            Some(n) if n <= data.len() => data.truncate(n),
            Some(n) => log::debug!(
                "Stream {} declares length {} but holds {} bytes before endstream",
                reference,
                n,
                data.len()
            ),
            None => {},
        }
    }

    /// Decode the container once and cache every member it owns.
    fn load_compressed(&mut self, reference: ObjectRef, container: u32, index: u32) -> Result<Object> {
        let container_ref = match self.xref.get(container) {
            Some(XRefEntry::InUse { generation, .. }) => ObjectRef::new(container, *generation),
            other => {
                return Err(Error::Format(format!(
                    "object stream {} for {} has entry {:?}",
                    container, reference, other
                )));
            },
        };
        let container_obj = self.fetch(container_ref)?;
        let stm = ObjectStream::parse(&container_obj, &self.options)?;
        self.stats.object_streams_decoded += 1;
        log::debug!("Decoded object stream {} with {} members", container, stm.len());

        let settings = ParseSettings {
            max_nesting: self.options.max_nesting,
            input_complete: true,
        };
        let requested = stm.get(index as usize, reference.id, &settings)?;
        self.stats.objects_parsed += 1;

        for (i, num) in stm.object_numbers().enumerate() {
            let member = ObjectRef::new(num, 0);
            let owned = self.xref.get(num)
                == Some(&XRefEntry::Compressed {
                    stream_number: container,
                    index: i as u32,
                });
            if i == index as usize || !owned || self.cache.contains_key(&member) {
                continue;
            }
            match stm.parse_member(i, &settings) {
                Ok(obj) => {
                    self.stats.objects_parsed += 1;
                    self.cache.insert(member, Arc::new(obj));
                },
                Err(e) => log::debug!("Member {} of object stream {} does not parse: {}", num, container, e),
            }
        }
        Ok(requested)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The document's identity.
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// A handle naming `reference` in this document.
    pub fn handle(&self, reference: ObjectRef) -> ObjectHandle {
        ObjectHandle {
            document: self.id,
            reference,
        }
    }

    /// The trailer dictionary.
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// Mutable trailer, for documents being assembled.
    pub fn trailer_mut(&mut self) -> &mut Dictionary {
        &mut self.trailer
    }

    /// Resolve the catalog named by the trailer's `/Root`.
    pub fn catalog(&mut self) -> Result<Arc<Object>> {
        if self.closed {
            return Err(Error::DocumentClosed);
        }
        let root = self.trailer.get("Root").cloned().ok_or(Error::UnresolvableRoot)?;
        let catalog = self.dereference(&root);
        if catalog.as_dict().is_some() {
            Ok(catalog)
        } else {
            Err(Error::UnresolvableRoot)
        }
    }

    /// Whether the index was rebuilt by scanning the file.
    pub fn is_recovered(&self) -> bool {
        self.recovered
    }

    /// Number of object slots, including free ones.
    pub fn size(&self) -> usize {
        self.xref.size() as usize
    }

    /// Header version `(major, minor)`.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Whether the trailer names an encryption dictionary.
    ///
    /// Payloads are never decrypted.
    pub fn is_encrypted(&self) -> bool {
        self.trailer.contains_key("Encrypt")
    }

    /// The options this document was opened with.
    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Work counters.
    pub fn stats(&self) -> DocumentStats {
        self.stats
    }

    /// The cross-reference table.
    pub fn xref(&self) -> &CrossRefTable {
        &self.xref
    }

    /// Whether [`Document::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Add a new indirect object, returning its identity.
    ///
    /// The number is one past the current highest slot; existing entries are
    /// never reused. Its byte offset is assigned when the document is written.
    pub fn add_indirect_object(&mut self, object: Object) -> ObjectRef {
        let num = self.xref.size().max(1);
        let reference = ObjectRef::new(num, 0);
        self.xref.add_entry(
            num,
            XRefEntry::InUse {
                offset: 0,
                generation: 0,
            },
        );
        self.trailer.insert("Size", Object::Integer(i64::from(num) + 1));
        self.cache.insert(reference, Arc::new(object));
        self.modified.insert(num, 0);
        reference
    }

    /// Replace the object at `reference` and mark it for rewrite.
    ///
    /// A free or absent slot becomes live with the given generation.
    pub fn update_object(&mut self, reference: ObjectRef, object: Object) -> Result<()> {
        if self.closed {
            return Err(Error::DocumentClosed);
        }
        let live = matches!(
            self.xref.get(reference.id),
            Some(entry) if entry.is_in_use() && entry.generation() == reference.gen
        );
        if !live {
            self.xref.set(
                reference.id,
                XRefEntry::InUse {
                    offset: 0,
                    generation: reference.gen,
                },
            );
            let size = i64::from(self.xref.size());
            self.trailer.insert("Size", Object::Integer(size));
        }
        self.cache.insert(reference, Arc::new(object));
        self.modified.insert(reference.id, reference.gen);
        Ok(())
    }

    /// Mark an existing object to be written by the next incremental update.
    pub fn mark_object_for_rewrite(&mut self, reference: ObjectRef) {
        match self.xref.get(reference.id) {
            Some(entry) if entry.is_in_use() => {
                self.modified.insert(reference.id, reference.gen);
            },
            _ => log::debug!("Not marking {}: no live entry", reference),
        }
    }

    /// Objects added or marked for rewrite since open, ascending.
    pub fn modified_objects(&self) -> Vec<ObjectRef> {
        self.modified
            .iter()
            .map(|(&num, &gen)| ObjectRef::new(num, gen))
            .collect()
    }

    /// Drop the cached instance of `reference`; the next resolution re-parses.
    ///
    /// Objects added or updated in memory have no bytes to re-parse and are kept.
    pub fn invalidate(&mut self, reference: ObjectRef) {
        if self.modified.contains_key(&reference.id) {
            log::debug!("Keeping in-memory object {}", reference);
            return;
        }
        self.cache.remove(&reference);
    }

    /// Release the byte source and the cache.
    ///
    /// Every later resolution fails with [`Error::DocumentClosed`].
    pub fn close(&mut self) {
        self.source = None;
        self.cache.clear();
        self.loading.clear();
        self.closed = true;
    }

    // ========================================================================
    // Crate-internal plumbing for copying and writing
    // ========================================================================

    pub(crate) fn copied(&self, source: DocumentId, num: u32) -> Option<ObjectRef> {
        self.copy_map.get(&(source, num)).copied()
    }

    pub(crate) fn record_copy(&mut self, source: DocumentId, num: u32, target: ObjectRef) {
        self.copy_map.insert((source, num), target);
    }

    /// Whether `reference` is the catalog named by the trailer.
    pub(crate) fn is_root(&self, reference: ObjectRef) -> bool {
        self.trailer.get_reference("Root") == Some(reference)
    }

    /// Whether the index has a live entry for `reference`.
    pub(crate) fn has_live_entry(&self, reference: ObjectRef) -> bool {
        matches!(self.xref.get(reference.id), Some(e) if e.is_in_use() && e.generation() == reference.gen)
    }

    /// The bytes the document was opened from, if any.
    pub(crate) fn original_bytes(&mut self) -> Result<Option<Vec<u8>>> {
        if self.closed {
            return Err(Error::DocumentClosed);
        }
        match self.source.as_mut() {
            Some(source) => source.read_all().map(Some),
            None => Ok(None),
        }
    }

    /// Offset of the index the file was opened through.
    pub(crate) fn startxref(&self) -> Option<usize> {
        self.startxref
    }
}

/// A root must be a dictionary that is not typed as something else.
fn is_plausible_root(obj: &Object) -> bool {
    match obj {
        Object::Dictionary(dict) => matches!(dict.type_name(), None | Some("Catalog")),
        _ => false,
    }
}

/// Parse the `%PDF-M.m` header, tolerating leading garbage.
///
/// ```
/// # use pdf_kernel::document::parse_header;
/// assert_eq!(parse_header(b"%PDF-1.7\n").unwrap(), (1, 7));
/// assert_eq!(parse_header(b"junk\n%PDF-2.0\n").unwrap(), (2, 0));
/// assert!(parse_header(b"GIF89a").is_err());
/// ```
pub fn parse_header(data: &[u8]) -> Result<(u8, u8)> {
    let start = data
        .windows(5)
        .position(|w| w == b"%PDF-")
        .ok_or_else(|| {
            Error::InvalidHeader(String::from_utf8_lossy(&data[..data.len().min(8)]).into_owned())
        })?;
    let version = &data[start + 5..];
    match version {
        [major, b'.', minor, ..] if major.is_ascii_digit() && minor.is_ascii_digit() => {
            let (major, minor) = (major - b'0', minor - b'0');
            if major > 2 || (major == 0 && minor == 0) {
                return Err(Error::InvalidHeader(format!("%PDF-{}.{}", major, minor)));
            }
            Ok((major, minor))
        },
        _ => Err(Error::InvalidHeader(
            String::from_utf8_lossy(&data[start..data.len().min(start + 8)]).into_owned(),
        )),
    }
}
