//! Stream filters.
//!
//! Decoders for the general-purpose filters that wrap object streams,
//! cross-reference streams and arbitrary stream payloads:
//! - FlateDecode (zlib/deflate), with PNG/TIFF predictors
//! - ASCIIHexDecode
//! - ASCII85Decode
//! - LZWDecode
//! - RunLengthDecode
//!
//! Filters are chained in `/Filter` order; each may carry its own
//! `/DecodeParms` entry.

use crate::error::{Error, Result};
use crate::object::Dictionary;
use crate::parser_config::ParserOptions;

mod ascii85;
mod ascii_hex;
mod flate;
mod lzw;
mod predictor;
mod runlength;

pub use ascii85::Ascii85Decoder;
pub use ascii_hex::AsciiHexDecoder;
pub use flate::{FlateDecoder, flate_encode};
pub use lzw::LzwDecoder;
pub use predictor::{DecodeParams, decode_predictor};
pub use runlength::RunLengthDecoder;

/// A filter algorithm.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8], params: Option<&DecodeParams>) -> Result<Vec<u8>>;

    /// Canonical filter name (e.g., "FlateDecode").
    fn name(&self) -> &'static str;
}

/// Look up the decoder for a filter name, accepting the abbreviated forms.
pub fn decoder_for(filter: &str) -> Result<Box<dyn StreamDecoder>> {
    let decoder: Box<dyn StreamDecoder> = match filter {
        "FlateDecode" | "Fl" => Box::new(FlateDecoder),
        "ASCIIHexDecode" | "AHx" => Box::new(AsciiHexDecoder),
        "ASCII85Decode" | "A85" => Box::new(Ascii85Decoder),
        "LZWDecode" | "LZW" => Box::new(LzwDecoder),
        "RunLengthDecode" | "RL" => Box::new(RunLengthDecoder),
        other => return Err(Error::UnsupportedFilter(other.to_string())),
    };
    Ok(decoder)
}

/// Decode stream data through a filter pipeline with default limits.
pub fn decode_stream(data: &[u8], filters: &[String]) -> Result<Vec<u8>> {
    decode_stream_with_options(data, filters, &[], &ParserOptions::default())
}

/// Decode stream data through a filter pipeline.
///
/// `params[i]` holds the decode parameters of `filters[i]`; missing slots mean
/// defaults. Decompression bomb limits from `options` are checked after every
/// filter.
pub fn decode_stream_with_options(
    data: &[u8],
    filters: &[String],
    params: &[Option<DecodeParams>],
    options: &ParserOptions,
) -> Result<Vec<u8>> {
    let compressed_size = data.len().max(1) as u64;
    let mut current = data.to_vec();

    for (i, filter_name) in filters.iter().enumerate() {
        let decoder = decoder_for(filter_name)?;
        let filter_params = params.get(i).and_then(Option::as_ref);
        current = decoder.decode(&current, filter_params)?;

        let max_ratio = options.max_decompression_ratio as u64;
        if max_ratio > 0 && current.len() as u64 / compressed_size > max_ratio {
            return Err(Error::Decode(format!(
                "decompression ratio exceeds {}:1 ({} -> {} bytes)",
                max_ratio,
                data.len(),
                current.len()
            )));
        }
        if options.max_decompressed_size > 0 && current.len() > options.max_decompressed_size {
            return Err(Error::Decode(format!(
                "decompressed size {} exceeds limit {}",
                current.len(),
                options.max_decompressed_size
            )));
        }
        log::trace!("{} decoded {} bytes", decoder.name(), current.len());
    }

    Ok(current)
}

impl DecodeParams {
    /// Read predictor parameters from a `/DecodeParms` dictionary.
    pub fn from_dict(dict: &Dictionary) -> Self {
        let get = |key: &str, default: i64| dict.get_integer(key).unwrap_or(default);
        Self {
            predictor: get("Predictor", 1),
            columns: get("Columns", 1).max(1) as usize,
            colors: get("Colors", 1).clamp(1, 32) as usize,
            bits_per_component: get("BitsPerComponent", 8).clamp(1, 16) as usize,
            early_change: get("EarlyChange", 1) != 0,
        }
    }
}
