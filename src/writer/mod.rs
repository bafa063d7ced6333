//! Writing documents back to bytes.
//!
//! ## Architecture
//!
//! ```text
//! Document (index + cached objects + modified set)
//!     ↓
//! [DocumentWriter] (full rewrite or incremental append)
//!     ↓
//! [ObjectSerializer] (serializes objects)
//!     ↓
//! bytes
//! ```
//!
//! ```
//! use pdf_kernel::{Document, Object};
//! use pdf_kernel::writer::{DocumentWriter, WriterOptions, XrefStyle};
//!
//! let mut doc = Document::new();
//! let root = doc.add_indirect_object(Object::Null);
//! doc.trailer_mut().insert("Root", Object::Reference(root));
//!
//! let options = WriterOptions { xref_style: XrefStyle::Stream, ..WriterOptions::default() };
//! let bytes = DocumentWriter::new(options).write_full(&mut doc).unwrap();
//! assert!(bytes.starts_with(b"%PDF-1.7"));
//! ```

use serde::{Deserialize, Serialize};

mod document_writer;
mod object_serializer;

pub use document_writer::DocumentWriter;
pub use object_serializer::ObjectSerializer;

/// How the cross-reference index is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XrefStyle {
    /// Classic `xref` table with a `trailer` dictionary
    #[default]
    Table,
    /// Cross-reference stream (PDF 1.5)
    Stream,
}

/// Configuration for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterOptions {
    /// Index format
    pub xref_style: XrefStyle,
    /// Pack non-stream objects into object streams (forces a stream index)
    pub use_object_streams: bool,
    /// FlateDecode streams that have no filter
    pub compress_streams: bool,
}

impl WriterOptions {
    /// Smallest output: object streams, a stream index and compressed payloads.
    pub fn compact() -> Self {
        Self {
            xref_style: XrefStyle::Stream,
            use_object_streams: true,
            compress_streams: true,
        }
    }
}
