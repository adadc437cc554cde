//! Byte-order-mark sniffing for command output.
//!
//! Guests normally emit BOM-less UTF-8; everything else is detected from
//! the signature at the start of the first output chunk.

/// Text encoding of a command's output, as determined by its byte order
/// mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// UTF-7 (`2B 2F 76`).
    Utf7,
    /// UTF-8, with or without a signature. The default.
    Utf8,
    /// UTF-16 little endian (`FF FE`).
    Utf16Le,
    /// UTF-16 big endian (`FE FF`).
    Utf16Be,
    /// UTF-32 little endian (`FF FE 00 00`).
    Utf32Le,
    /// UTF-32 big endian (`00 00 FE FF`).
    Utf32Be,
}

impl TextEncoding {
    /// Detects the encoding of an output stream from its first chunk.
    ///
    /// Fragments shorter than four bytes, and fragments with no recognized
    /// signature, are treated as BOM-less UTF-8. The UTF-32LE signature is
    /// a superset of the UTF-16LE one and must be checked first.
    #[must_use]
    pub fn detect(fragment: &[u8]) -> Self {
        if fragment.len() < 4 {
            return Self::Utf8;
        }

        match fragment {
            [0x2b, 0x2f, 0x76, ..] => Self::Utf7,
            [0xef, 0xbb, 0xbf, ..] => Self::Utf8,
            [0xff, 0xfe, 0x00, 0x00, ..] => Self::Utf32Le,
            [0xff, 0xfe, ..] => Self::Utf16Le,
            [0xfe, 0xff, ..] => Self::Utf16Be,
            [0x00, 0x00, 0xfe, 0xff, ..] => Self::Utf32Be,
            _ => Self::Utf8,
        }
    }

    /// Returns the IANA-style name of the encoding.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Utf7 => "utf-7",
            Self::Utf8 => "utf-8",
            Self::Utf16Le => "utf-16le",
            Self::Utf16Be => "utf-16be",
            Self::Utf32Le => "utf-32le",
            Self::Utf32Be => "utf-32be",
        }
    }

    /// Decodes a chunk lossily: malformed sequences become U+FFFD.
    ///
    /// The signature is not stripped; callers receive exactly what the
    /// child wrote. UTF-7 shift sequences are passed through undecoded
    /// (the direct-encoded subset is plain ASCII).
    #[must_use]
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Utf7 | Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Utf16Le => Self::decode_utf16(bytes, u16::from_le_bytes),
            Self::Utf16Be => Self::decode_utf16(bytes, u16::from_be_bytes),
            Self::Utf32Le => Self::decode_utf32(bytes, u32::from_le_bytes),
            Self::Utf32Be => Self::decode_utf32(bytes, u32::from_be_bytes),
        }
    }

    fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> String {
        let mut units = Vec::with_capacity(bytes.len() / 2);
        let mut chunks = bytes.chunks_exact(2);
        for pair in chunks.by_ref() {
            units.push(unit([pair[0], pair[1]]));
        }
        let mut decoded = String::from_utf16_lossy(&units);
        if !chunks.remainder().is_empty() {
            decoded.push(char::REPLACEMENT_CHARACTER);
        }
        decoded
    }

    fn decode_utf32(bytes: &[u8], unit: fn([u8; 4]) -> u32) -> String {
        let mut decoded = String::with_capacity(bytes.len() / 4);
        let mut chunks = bytes.chunks_exact(4);
        for quad in chunks.by_ref() {
            let scalar = unit([quad[0], quad[1], quad[2], quad[3]]);
            decoded.push(char::from_u32(scalar).unwrap_or(char::REPLACEMENT_CHARACTER));
        }
        if !chunks.remainder().is_empty() {
            decoded.push(char::REPLACEMENT_CHARACTER);
        }
        decoded
    }
}

impl Default for TextEncoding {
    fn default() -> Self {
        Self::Utf8
    }
}

impl std::fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_signatures() {
        assert_eq!(TextEncoding::detect(b"\x2b\x2f\x76\x38"), TextEncoding::Utf7);
        assert_eq!(TextEncoding::detect(b"\xef\xbb\xbfhi"), TextEncoding::Utf8);
        assert_eq!(
            TextEncoding::detect(b"\xff\xfeh\x00i\x00"),
            TextEncoding::Utf16Le
        );
        assert_eq!(
            TextEncoding::detect(b"\xfe\xff\x00h\x00i"),
            TextEncoding::Utf16Be
        );
        assert_eq!(
            TextEncoding::detect(b"\x00\x00\xfe\xff\x00\x00\x00h"),
            TextEncoding::Utf32Be
        );
    }

    #[test]
    fn test_utf32le_wins_over_utf16le() {
        // FF FE 00 00 is both a UTF-16LE mark followed by NUL and the
        // UTF-32LE mark; the longer signature must win.
        assert_eq!(
            TextEncoding::detect(b"\xff\xfe\x00\x00h\x00\x00\x00"),
            TextEncoding::Utf32Le
        );
    }

    #[test]
    fn test_short_fragment_defaults_to_utf8() {
        assert_eq!(TextEncoding::detect(b"\xff\xfe"), TextEncoding::Utf8);
        assert_eq!(TextEncoding::detect(b""), TextEncoding::Utf8);
    }

    #[test]
    fn test_unmatched_defaults_to_utf8() {
        assert_eq!(TextEncoding::detect(b"hello"), TextEncoding::Utf8);
    }

    #[test]
    fn test_decode_utf8() {
        assert_eq!(TextEncoding::Utf8.decode(b"hello"), "hello");
    }

    #[test]
    fn test_decode_utf8_lossy() {
        assert_eq!(TextEncoding::Utf8.decode(b"a\xffb"), "a\u{fffd}b");
    }

    #[test]
    fn test_decode_utf16le() {
        let bytes: Vec<u8> = "hola".encode_utf16().flat_map(u16::to_le_bytes).collect();
        assert_eq!(TextEncoding::Utf16Le.decode(&bytes), "hola");
    }

    #[test]
    fn test_decode_utf16be_with_trailing_byte() {
        let mut bytes: Vec<u8> = "hi".encode_utf16().flat_map(u16::to_be_bytes).collect();
        bytes.push(0x00);
        assert_eq!(TextEncoding::Utf16Be.decode(&bytes), "hi\u{fffd}");
    }

    #[test]
    fn test_decode_utf32le() {
        let bytes: Vec<u8> = "ok".chars().flat_map(|c| (c as u32).to_le_bytes()).collect();
        assert_eq!(TextEncoding::Utf32Le.decode(&bytes), "ok");
    }

    #[test]
    fn test_decode_utf32_invalid_scalar() {
        let bytes = 0x0011_0000u32.to_le_bytes();
        assert_eq!(TextEncoding::Utf32Le.decode(&bytes), "\u{fffd}");
    }

    #[test]
    fn test_mark_is_not_stripped() {
        let decoded = TextEncoding::Utf8.decode(b"\xef\xbb\xbfhello");
        assert_eq!(decoded, "\u{feff}hello");
    }

    #[test]
    fn test_names() {
        assert_eq!(TextEncoding::Utf8.name(), "utf-8");
        assert_eq!(TextEncoding::Utf32Be.to_string(), "utf-32be");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Arbitrary first chunks always detect and decode;
            /// malformed input degrades to U+FFFD, never to a panic.
            #[test]
            fn detection_is_deterministic_and_decode_total(
                bytes in proptest::collection::vec(any::<u8>(), 0..256)
            ) {
                let encoding = TextEncoding::detect(&bytes);
                prop_assert_eq!(encoding, TextEncoding::detect(&bytes));
                let _ = encoding.decode(&bytes);
            }

            /// Valid UTF-8 without a signature decodes byte for byte.
            #[test]
            fn utf8_decode_is_lossless(text in "\\PC*") {
                prop_assert_eq!(TextEncoding::Utf8.decode(text.as_bytes()), text);
            }
        }
    }
}
