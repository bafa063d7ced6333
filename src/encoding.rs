//! Text encodings used by string objects.
//!
//! Text strings are either UTF-16BE (marked by a leading `FE FF`) or
//! PDFDocEncoding, a superset of ASCII with its own 0x80-0xA0 block and
//! Latin-1 above that.

/// UTF-16BE byte order marker that prefixes Unicode text strings.
pub const UTF16BE_MARKER: [u8; 2] = [0xFE, 0xFF];

/// Code points for 0x80..=0xA0 in PDFDocEncoding.
const HIGH_BLOCK: [char; 33] = [
    '\u{2022}', '\u{2020}', '\u{2021}', '\u{2026}', '\u{2014}', '\u{2013}', '\u{0192}', '\u{2044}',
    '\u{2039}', '\u{203A}', '\u{2212}', '\u{2030}', '\u{201E}', '\u{201C}', '\u{201D}', '\u{2018}',
    '\u{2019}', '\u{201A}', '\u{2122}', '\u{FB01}', '\u{FB02}', '\u{0141}', '\u{0152}', '\u{0160}',
    '\u{0178}', '\u{017D}', '\u{0131}', '\u{0142}', '\u{0153}', '\u{0161}', '\u{017E}', '\u{FFFD}',
    '\u{20AC}',
];

/// Decode one PDFDocEncoding byte.
pub fn pdfdoc_decode(code: u8) -> char {
    match code {
        0x80..=0xA0 => HIGH_BLOCK[(code - 0x80) as usize],
        _ => code as char,
    }
}

/// Encode one character in PDFDocEncoding, if it has a code.
pub fn pdfdoc_encode(ch: char) -> Option<u8> {
    match ch as u32 {
        0..=0x7F => Some(ch as u8),
        0xA1..=0xFF => Some(ch as u32 as u8),
        _ => HIGH_BLOCK
            .iter()
            .position(|&c| c == ch && c != '\u{FFFD}')
            .map(|i| 0x80 + i as u8),
    }
}

/// Decode text string bytes into a Rust string.
pub fn decode_text(bytes: &[u8]) -> String {
    if bytes.starts_with(&UTF16BE_MARKER) {
        let units: Vec<u16> = bytes[2..]
            .chunks(2)
            .map(|pair| u16::from_be_bytes([pair[0], *pair.get(1).unwrap_or(&0)]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| pdfdoc_decode(b)).collect()
}

/// Encode text as PDFDocEncoding when every character has a code, UTF-16BE otherwise.
pub fn encode_text(text: &str) -> Vec<u8> {
    let single_byte: Option<Vec<u8>> = text.chars().map(pdfdoc_encode).collect();
    match single_byte {
        Some(bytes) => bytes,
        None => {
            let mut out = UTF16BE_MARKER.to_vec();
            for unit in text.encode_utf16() {
                out.extend_from_slice(&unit.to_be_bytes());
            }
            out
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passthrough() {
        assert_eq!(decode_text(b"Hello"), "Hello");
        assert_eq!(encode_text("Hello"), b"Hello");
    }

    #[test]
    fn test_pdfdoc_high_block() {
        assert_eq!(pdfdoc_decode(0x80), '\u{2022}');
        assert_eq!(pdfdoc_decode(0xA0), '\u{20AC}');
        assert_eq!(pdfdoc_encode('\u{2122}'), Some(0x92));
        assert_eq!(pdfdoc_encode('\u{e9}'), Some(0xE9));
    }

    #[test]
    fn test_utf16_marker_decoding() {
        let bytes = [0xFE, 0xFF, 0x04, 0x1F, 0x04, 0x40];
        assert_eq!(decode_text(&bytes), "\u{41F}\u{440}");
    }

    #[test]
    fn test_non_latin_text_encodes_as_utf16() {
        let encoded = encode_text("\u{41F}");
        assert_eq!(encoded, vec![0xFE, 0xFF, 0x04, 0x1F]);
        assert_eq!(decode_text(&encoded), "\u{41F}");
    }

    #[test]
    fn test_odd_length_utf16_does_not_panic() {
        let bytes = [0xFE, 0xFF, 0x00, 0x41, 0x00];
        assert_eq!(decode_text(&bytes).chars().next(), Some('A'));
    }
}
