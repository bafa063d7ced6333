//! RunLengthDecode.

use crate::decoders::{DecodeParams, StreamDecoder};
use crate::error::{Error, Result};

/// RunLengthDecode filter implementation.
///
/// Length byte 0..=127 copies the next n+1 bytes, 129..=255 repeats the next
/// byte 257-n times, 128 ends the data.
pub struct RunLengthDecoder;

impl StreamDecoder for RunLengthDecoder {
    fn decode(&self, input: &[u8], _params: Option<&DecodeParams>) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(input.len() * 2);
        let mut i = 0;

        while i < input.len() {
            let len = input[i];
            i += 1;
            match len {
                128 => break,
                0..=127 => {
                    let n = len as usize + 1;
                    let run = input.get(i..i + n).ok_or_else(|| {
                        Error::Decode("RunLengthDecode: literal run past end of data".to_string())
                    })?;
                    output.extend_from_slice(run);
                    i += n;
                },
                _ => {
                    let byte = *input.get(i).ok_or_else(|| {
                        Error::Decode("RunLengthDecode: repeat run past end of data".to_string())
                    })?;
                    output.extend(std::iter::repeat_n(byte, 257 - len as usize));
                    i += 1;
                },
            }
        }

        Ok(output)
    }

    fn name(&self) -> &'static str {
        "RunLengthDecode"
    }
}
