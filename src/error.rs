//! Error types for the object graph engine.
//!
//! Most of these never reach a caller directly: syntax and index failures are
//! absorbed by the recovery path, and a damaged object degrades to `Null`.
//! Opening a document fails only with [`Error::UnresolvableRoot`] or an I/O error.

use crate::object::ObjectRef;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while reading, resolving or copying objects.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed token or object syntax at a byte offset
    #[error("Syntax error at byte {offset}: {reason}")]
    Syntax {
        /// Absolute byte offset where the error occurred
        offset: usize,
        /// Reason for the failure
        reason: String,
    },

    /// Input ended in the middle of a token or object
    #[error("Unexpected end of input at byte {offset}")]
    UnexpectedEof {
        /// Absolute byte offset where input ran out
        offset: usize,
    },

    /// A cross-reference section failed to load or validate
    #[error("Invalid cross-reference table: {0}")]
    TableInvalid(String),

    /// Object stream or filter data is inconsistent
    #[error("Format error: {0}")]
    Format(String),

    /// No catalog could be identified, even after recovery
    #[error("Document root cannot be resolved")]
    UnresolvableRoot,

    /// Object cannot be copied (no source document affiliation)
    #[error("Copy error: {0}")]
    Copy(String),

    /// The document was closed; its objects can no longer be resolved
    #[error("Document is closed")]
    DocumentClosed,

    /// Invalid header (expected '%PDF-')
    #[error("Invalid header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Object has the wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// Referenced object could not be loaded
    #[error("Object {0} could not be loaded: {1}")]
    ObjectLoad(ObjectRef, String),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Unsupported stream filter
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Nesting or chain limit exceeded
    #[error("Recursion limit exceeded: {0}")]
    RecursionLimitExceeded(usize),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a syntax error at `offset`.
    pub fn syntax(offset: usize, reason: impl Into<String>) -> Self {
        Error::Syntax {
            offset,
            reason: reason.into(),
        }
    }

    /// Whether this error means the index cannot be trusted and recovery should run.
    pub fn invalidates_table(&self) -> bool {
        matches!(
            self,
            Error::Syntax { .. } | Error::UnexpectedEof { .. } | Error::TableInvalid(_) | Error::Format(_)
        )
    }

    /// Whether this error came from running out of input.
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::UnexpectedEof { .. })
    }
}
