//! ASCIIHexDecode.

use crate::decoders::{DecodeParams, StreamDecoder};
use crate::error::{Error, Result};

/// ASCIIHexDecode filter implementation.
///
/// Whitespace is ignored, `>` ends the data, an odd final digit is padded with 0.
pub struct AsciiHexDecoder;

impl StreamDecoder for AsciiHexDecoder {
    fn decode(&self, input: &[u8], _params: Option<&DecodeParams>) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(input.len() / 2);
        let mut high: Option<u8> = None;

        for &c in input {
            let nibble = match c {
                b'>' => break,
                b'0'..=b'9' => c - b'0',
                b'a'..=b'f' => c - b'a' + 10,
                b'A'..=b'F' => c - b'A' + 10,
                c if crate::lexer::is_whitespace(c) => continue,
                other => {
                    return Err(Error::Decode(format!(
                        "ASCIIHexDecode: invalid character 0x{:02X}",
                        other
                    )));
                },
            };
            match high.take() {
                Some(h) => output.push(h << 4 | nibble),
                None => high = Some(nibble),
            }
        }
        if let Some(h) = high {
            output.push(h << 4);
        }

        Ok(output)
    }

    fn name(&self) -> &'static str {
        "ASCIIHexDecode"
    }
}
