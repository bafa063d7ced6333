//! FlateDecode (zlib/deflate).

use crate::decoders::{DecodeParams, StreamDecoder, decode_predictor};
use crate::error::{Error, Result};
use flate2::Compression;
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use std::io::{Read, Write};

/// FlateDecode filter implementation.
pub struct FlateDecoder;

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8], params: Option<&DecodeParams>) -> Result<Vec<u8>> {
        let inflated = inflate(input)?;
        match params {
            Some(p) if p.predictor > 1 => decode_predictor(&inflated, p),
            _ => Ok(inflated),
        }
    }

    fn name(&self) -> &'static str {
        "FlateDecode"
    }
}

/// Inflate zlib data, falling back to raw deflate for a damaged header.
///
/// Output produced before a corruption point is kept.
fn inflate(input: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    let zlib_err = match ZlibDecoder::new(input).read_to_end(&mut output) {
        Ok(_) => return Ok(output),
        Err(e) => e,
    };
    if !output.is_empty() {
        log::warn!("FlateDecode kept {} bytes before corruption: {}", output.len(), zlib_err);
        return Ok(output);
    }

    for skip in [0usize, 2] {
        if input.len() <= skip {
            break;
        }
        output.clear();
        let result = DeflateDecoder::new(&input[skip..]).read_to_end(&mut output);
        if result.is_ok() || !output.is_empty() {
            log::debug!("FlateDecode recovered {} bytes as raw deflate", output.len());
            return Ok(output);
        }
    }

    Err(Error::Decode(format!("FlateDecode: {}", zlib_err)))
}

/// Compress data with zlib for a FlateDecode stream.
pub fn flate_encode(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
