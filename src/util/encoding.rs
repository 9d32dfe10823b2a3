//! Text decoding cascade for the `read` tool: UTF-8, then UTF-16 (by BOM),
//! then Latin-1 as a decoding that can never fail, since every byte value
//! is a valid Latin-1 code point. A plain `read_to_string` (UTF-8 only)
//! hard-errors on the first non-UTF-8 byte; this cascade covers the three
//! encodings actual project files show up in instead.

/// Result of decoding a byte buffer as text.
pub struct Decoded {
    pub text: String,
    pub encoding: &'static str,
}

/// Decode `bytes` using the UTF-8 → UTF-16 (BOM) → Latin-1 cascade.
#[must_use]
pub fn decode_text(bytes: &[u8]) -> Decoded {
    if let Some(stripped) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        if let Ok(text) = std::str::from_utf8(stripped) {
            return Decoded {
                text: text.to_owned(),
                encoding: "utf-8",
            };
        }
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return Decoded {
            text: text.to_owned(),
            encoding: "utf-8",
        };
    }

    if bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] == 0xFE {
        return Decoded {
            text: decode_utf16(&bytes[2..], false),
            encoding: "utf-16le",
        };
    }
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        return Decoded {
            text: decode_utf16(&bytes[2..], true),
            encoding: "utf-16be",
        };
    }

    Decoded {
        text: bytes.iter().map(|&b| b as char).collect(),
        encoding: "latin-1",
    }
}

fn decode_utf16(bytes: &[u8], big_endian: bool) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| {
            if big_endian {
                u16::from_be_bytes([pair[0], pair[1]])
            } else {
                u16::from_le_bytes([pair[0], pair[1]])
            }
        })
        .collect();
    String::from_utf16_lossy(&units)
}

/// Examine the first `BINARY_CHECK_BYTES` bytes of `buf`; a NUL byte is
/// treated as conclusive evidence of binary content.
pub const BINARY_CHECK_BYTES: usize = 8192;

#[must_use]
pub fn looks_binary(buf: &[u8]) -> bool {
    let check_len = buf.len().min(BINARY_CHECK_BYTES);
    buf[..check_len].contains(&0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_utf8() {
        let d = decode_text("hello".as_bytes());
        assert_eq!(d.encoding, "utf-8");
        assert_eq!(d.text, "hello");
    }

    #[test]
    fn decodes_utf8_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("hi".as_bytes());
        let d = decode_text(&bytes);
        assert_eq!(d.encoding, "utf-8");
        assert_eq!(d.text, "hi");
    }

    #[test]
    fn decodes_utf16_le_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for c in "hi".encode_utf16() {
            bytes.extend_from_slice(&c.to_le_bytes());
        }
        let d = decode_text(&bytes);
        assert_eq!(d.encoding, "utf-16le");
        assert_eq!(d.text, "hi");
    }

    #[test]
    fn falls_back_to_latin1_for_invalid_utf8() {
        let bytes = [0xFF, 0x41, 0x42];
        let d = decode_text(&bytes);
        assert_eq!(d.encoding, "latin-1");
        assert_eq!(d.text.chars().count(), 3);
    }

    #[test]
    fn detects_binary_via_nul_byte() {
        assert!(looks_binary(&[0, 1, 2]));
        assert!(!looks_binary(b"hello world"));
    }
}
