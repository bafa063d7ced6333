//! LZWDecode.
//!
//! Uses `weezl` with MSB bit order and 8-bit symbols. `/EarlyChange 1` (the
//! default) matches the TIFF code-size switching weezl implements.

use crate::decoders::{DecodeParams, StreamDecoder, decode_predictor};
use crate::error::{Error, Result};
use weezl::{BitOrder, decode::Decoder};

/// LZWDecode filter implementation.
pub struct LzwDecoder;

impl StreamDecoder for LzwDecoder {
    fn decode(&self, input: &[u8], params: Option<&DecodeParams>) -> Result<Vec<u8>> {
        let early_change = params.map(|p| p.early_change).unwrap_or(true);
        let mut decoder = if early_change {
            Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
        } else {
            Decoder::new(BitOrder::Msb, 8)
        };
        let decoded = decoder
            .decode(input)
            .map_err(|e| Error::Decode(format!("LZWDecode: {:?}", e)))?;
        match params {
            Some(p) if p.predictor > 1 => decode_predictor(&decoded, p),
            _ => Ok(decoded),
        }
    }

    fn name(&self) -> &'static str {
        "LZWDecode"
    }
}
