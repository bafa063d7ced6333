//! Reader configuration.
//!
//! Options that trade strictness for compatibility with damaged files, plus
//! the resource limits applied while parsing untrusted input.
//!
//! # Example
//!
//! ```
//! use pdf_kernel::parser_config::ParserOptions;
//!
//! // Default: lenient, damaged objects resolve to Null
//! let lenient = ParserOptions::default();
//! assert!(!lenient.strict);
//!
//! // Strict: damaged objects surface as errors from fallible accessors
//! let strict = ParserOptions::strict().with_max_nesting(64);
//! assert_eq!(strict.max_nesting, 64);
//! ```
//!
//! Options deserialize from any serde format; missing fields take the
//! lenient defaults.

use serde::{Deserialize, Serialize};

/// Parser options for error handling and resource limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Surface damaged single objects as errors instead of Null
    ///
    /// Opening a document always falls back to recovery; this only affects
    /// fallible object accessors.
    pub strict: bool,

    /// Maximum array/dictionary nesting depth inside one object
    pub max_nesting: usize,

    /// Maximum reference-to-reference hops followed when dereferencing
    pub max_reference_chain: usize,

    /// Maximum number of index sections followed through back-pointers
    pub max_xref_sections: usize,

    /// Check that every in-use index entry points at a matching object header
    pub validate_offsets: bool,

    /// Accept objects without a closing `endobj`
    pub allow_missing_endobj: bool,

    /// Maximum decompression ratio (decompressed:compressed), 0 disables
    pub max_decompression_ratio: u32,

    /// Maximum decompressed stream size in bytes, 0 disables
    pub max_decompressed_size: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self::lenient()
    }
}

impl ParserOptions {
    /// Strict mode: damaged objects are reported, not hidden.
    pub fn strict() -> Self {
        Self {
            strict: true,
            allow_missing_endobj: false,
            ..Self::lenient()
        }
    }

    /// Lenient mode: damaged objects resolve to Null with a logged warning.
    pub fn lenient() -> Self {
        Self {
            strict: false,
            max_nesting: 256,
            max_reference_chain: 512,
            max_xref_sections: 512,
            validate_offsets: true,
            allow_missing_endobj: true,
            max_decompression_ratio: 1000,
            max_decompressed_size: 256 * 1024 * 1024,
        }
    }

    /// Set the nesting limit.
    pub fn with_max_nesting(mut self, depth: usize) -> Self {
        self.max_nesting = depth;
        self
    }

    /// Enable or disable offset validation after loading the index.
    pub fn with_offset_validation(mut self, validate: bool) -> Self {
        self.validate_offsets = validate;
        self
    }

    /// Set the decompression bomb limits.
    pub fn with_decompression_limits(mut self, max_ratio: u32, max_size: usize) -> Self {
        self.max_decompression_ratio = max_ratio;
        self.max_decompressed_size = max_size;
        self
    }
}
