//! Byte-level codec used by the Llama 3 vocabulary.
//!
//! Every learned token string is expressed in a restricted alphabet of
//! printable Unicode codepoints, one codepoint per raw byte. This module
//! implements the bijection between the 256 byte values and that alphabet.
//!
//! # Mapping
//!
//! Bytes that are already printable map to themselves as codepoints:
//!
//! - `0x21..=0x7E` (`!` to `~`)
//! - `0xA1..=0xAC` (`¡` to `¬`)
//! - `0xAE..=0xFF` (`®` to `ÿ`)
//!
//! The remaining 68 bytes (controls, space, `0x7F..=0xA0`, `0xAD`) map to
//! `U+0100`, `U+0101`, … in the order they are met while walking `0..=255`.
//! The same scheme is used by GPT-2 style tokenizers and is what the Llama 3
//! vocabulary files are written in.

use rustc_hash::FxHashMap;
use std::sync::LazyLock;

/// Forward table: byte value to alphabet codepoint.
static BYTE_TO_CHAR: LazyLock<[char; 256]> = LazyLock::new(|| {
    let mut table = ['\0'; 256];
    let mut next_fallback = 0x100u32;

    for b in 0u8..=255 {
        let direct = matches!(b, 0x21..=0x7E | 0xA1..=0xAC | 0xAE..=0xFF);
        if direct {
            table[b as usize] = b as char;
        } else {
            // 68 fallback bytes land on U+0100..=U+0143, in byte order.
            table[b as usize] = char::from_u32(next_fallback).unwrap();
            next_fallback += 1;
        }
    }

    table
});

/// Inverse table: alphabet codepoint back to byte value.
static CHAR_TO_BYTE: LazyLock<FxHashMap<char, u8>> = LazyLock::new(|| {
    BYTE_TO_CHAR
        .iter()
        .enumerate()
        .map(|(byte, &ch)| (ch, byte as u8))
        .collect()
});

/// Encode raw bytes into the byte-level alphabet.
///
/// The returned string has exactly one codepoint per input byte and can be
/// looked up against vocabulary entries directly.
pub fn encode_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        out.push(BYTE_TO_CHAR[b as usize]);
    }
    out
}

/// Decode a token string from the byte-level alphabet back to raw bytes.
///
/// Codepoints outside the alphabet are skipped; they can only appear when
/// the input did not come from [`encode_bytes`] or a vocabulary entry.
pub fn decode_token(token: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(token.len());
    decode_token_into(token, &mut out);
    out
}

/// Append the decoded bytes of `token` to `out`.
///
/// Same contract as [`decode_token`]; used by the decoder to reuse one
/// output buffer across many tokens.
pub fn decode_token_into(token: &str, out: &mut Vec<u8>) {
    for ch in token.chars() {
        if let Some(&b) = CHAR_TO_BYTE.get(&ch) {
            out.push(b);
        }
    }
}

/// The codepoint a single byte maps to.
#[inline]
pub fn char_for_byte(byte: u8) -> char {
    BYTE_TO_CHAR[byte as usize]
}
