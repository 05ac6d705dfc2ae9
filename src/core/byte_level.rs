//! Byte/codepoint transcoding for byte-level BPE.
//!
//! GPT-2 style merge tables are written over *visible* characters, yet the
//! tokenizer must accept arbitrary bytes. This module provides the fixed
//! bijection between the 256 byte values and 256 printable Unicode characters
//! that makes every byte representable as an ordinary symbol.
//!
//! # Mapping
//!
//! - Bytes 33-126 (`!` to `~`): map to themselves
//! - Bytes 161-172 (`¡` to `¬`): map to themselves
//! - Bytes 174-255 (`®` to `ÿ`): map to themselves
//! - Every other byte (0-32, 127-160, 173): mapped, in ascending byte order,
//!   onto the contiguous block starting at U+0100
//!
//! So the space byte (the 33rd non-printable byte) becomes `Ġ` (U+0120), which
//! is why most vocabulary entries that begin a word start with `Ġ`.
//!
//! The extension block is contiguous, so for a character `c >= U+0100` the value
//! `c - 0x100` is the *position of its byte among the non-printable bytes*. That
//! equals the byte value only for bytes 0-32; the reverse table below is the
//! authoritative inverse.

/// First codepoint of the extension block.
const EXTENSION_START: u32 = 0x100;

/// Number of bytes that do not map to themselves.
const EXTENDED_BYTES: usize = 68;

/// One past the highest codepoint the transcoder produces.
const ALPHABET_END: usize = EXTENSION_START as usize + EXTENDED_BYTES;

#[inline]
const fn maps_to_itself(b: u8) -> bool {
    matches!(b, b'!'..=b'~' | 0xA1..=0xAC | 0xAE..=0xFF)
}

const fn build_byte_to_char() -> [char; 256] {
    let mut table = ['\0'; 256];
    let mut next = EXTENSION_START;
    let mut b = 0usize;
    while b < 256 {
        table[b] = if maps_to_itself(b as u8) {
            b as u8 as char
        } else {
            let ch = match char::from_u32(next) {
                Some(ch) => ch,
                None => panic!("extension block must be valid scalar values"),
            };
            next += 1;
            ch
        };
        b += 1;
    }
    table
}

const fn build_char_to_byte() -> [Option<u8>; ALPHABET_END] {
    let forward = build_byte_to_char();
    let mut table = [None; ALPHABET_END];
    let mut b = 0usize;
    while b < 256 {
        table[forward[b] as usize] = Some(b as u8);
        b += 1;
    }
    table
}

/// `byte -> char`, indexed by byte value.
static BYTE_TO_CHAR: [char; 256] = build_byte_to_char();

/// `char -> byte`, indexed by codepoint.
static CHAR_TO_BYTE: [Option<u8>; ALPHABET_END] = build_char_to_byte();

/// Transcode raw bytes into their printable character form.
///
/// Input is consumed byte by byte. Pass the UTF-8 bytes of a text fragment,
/// never characters that were already decoded: `"é"` is two bytes and becomes
/// two symbols (`Ã©`), which is what the vocabulary was built against.
///
/// ```
/// use gpt_bpe::byte_level_encode;
///
/// assert_eq!(byte_level_encode(b" the"), "Ġthe");
/// ```
#[inline]
pub fn byte_level_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| BYTE_TO_CHAR[b as usize]).collect()
}

/// Invert [`byte_level_encode`].
///
/// Returns `None` if `text` contains a character outside the transcoder
/// alphabet.
#[inline]
pub fn byte_level_decode(text: &str) -> Option<Vec<u8>> {
    text.chars().map(byte_level_byte).collect()
}

/// Character for a single byte value.
#[inline]
pub fn byte_level_char(byte: u8) -> char {
    BYTE_TO_CHAR[byte as usize]
}

/// Byte value for a transcoded character.
#[inline]
pub fn byte_level_byte(ch: char) -> Option<u8> {
    CHAR_TO_BYTE.get(ch as usize).copied().flatten()
}

/// Whether `ch` belongs to the transcoder alphabet.
#[inline]
pub fn is_byte_level_char(ch: char) -> bool {
    byte_level_byte(ch).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_mapping_is_bijective() {
        let seen: HashSet<char> = (0u8..=255).map(byte_level_char).collect();
        assert_eq!(seen.len(), 256);
    }

    #[test]
    fn test_roundtrip_every_byte() {
        for b in 0u8..=255 {
            let encoded = byte_level_encode(&[b]);
            assert_eq!(encoded.chars().count(), 1);
            assert_eq!(
                byte_level_decode(&encoded),
                Some(vec![b]),
                "roundtrip failed for byte {}",
                b
            );
        }
    }

    #[test]
    fn test_printable_ranges_map_to_themselves() {
        for b in (33u8..=126).chain(161..=172).chain(174..=255) {
            assert_eq!(byte_level_char(b) as u32, b as u32, "byte {}", b);
        }
    }

    #[test]
    fn test_extension_block_is_contiguous_and_ordered() {
        let extended: Vec<u32> = (0u8..=255)
            .filter(|&b| !maps_to_itself(b))
            .map(|b| byte_level_char(b) as u32)
            .collect();
        assert_eq!(extended.len(), EXTENDED_BYTES);
        let expected: Vec<u32> = (0..EXTENDED_BYTES as u32).map(|i| 0x100 + i).collect();
        assert_eq!(extended, expected);
    }

    #[test]
    fn test_known_extension_characters() {
        assert_eq!(byte_level_char(0), '\u{100}');
        assert_eq!(byte_level_char(b' '), 'Ġ');
        assert_eq!(byte_level_char(b'\n'), 'Ċ');
        // DEL is the 34th non-printable byte, not U+0100 + 127
        assert_eq!(byte_level_char(0x7F), '\u{121}');
        assert_eq!(byte_level_char(0xAD), '\u{143}');
    }

    #[test]
    fn test_encode_multibyte_is_bytewise() {
        assert_eq!(byte_level_encode("é".as_bytes()), "Ã©");
        assert_eq!(byte_level_encode("你".as_bytes()).chars().count(), 3);
    }

    #[test]
    fn test_decode_rejects_foreign_characters() {
        assert_eq!(byte_level_decode("Ġ€"), None);
        assert!(!is_byte_level_char('\u{144}'));
        assert!(!is_byte_level_char(' '));
        assert!(is_byte_level_char('Ġ'));
    }

    #[test]
    fn test_full_string_roundtrip() {
        let original = "Hello, 世界!\t\r\n🦀";
        let encoded = byte_level_encode(original.as_bytes());
        assert!(!encoded.contains(' '));
        let decoded = byte_level_decode(&encoded).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), original);
    }
}
