//! Shared helpers for integration tests.
//!
//! Builds a tokenizer over a synthetic vocabulary through the public API:
//! the 256-entry byte alphabet, a few whole words assembled by chained
//! merge rules, and filler up to the required 128,000 entries. Special
//! tokens are the canonical set, so IDs 128000+ match production.

use llamatok::{StaticVocabularyLoader, Tokenizer, BASE_VOCAB_SIZE};

/// `\u{120}` is the byte-level image of a space.
const WORDS: &[&str] = &[
    "Hello",
    "\u{120}world",
    "\u{120}Hello",
    "\u{120}the",
    "\u{120}quick",
    "\u{120}\u{120}\u{120}",
];

pub fn loader() -> StaticVocabularyLoader {
    let mut vocabulary: Vec<String> = (0u8..=255)
        .map(|b| byte_level_char(b).to_string())
        .collect();
    let mut rules: Vec<(u32, u32)> = Vec::new();

    for word in WORDS {
        add_word(&mut vocabulary, &mut rules, word);
    }
    for i in vocabulary.len()..BASE_VOCAB_SIZE {
        vocabulary.push(format!("\u{100}filler{i}"));
    }

    let values: Vec<u32> = rules.iter().flat_map(|&(l, r)| [l, r]).collect();
    StaticVocabularyLoader {
        vocabulary,
        merges_blob: pack_merge_ids(&values),
    }
}

pub fn tokenizer() -> Tokenizer {
    Tokenizer::new(&loader()).expect("fixture tokenizer must build")
}

/// The byte-level alphabet: printable bytes map to themselves, the rest
/// to U+0100 onwards in byte order.
fn byte_level_char(byte: u8) -> char {
    let mut next_fallback = 0x100u32;
    for b in 0u8..=255 {
        let direct = matches!(b, 0x21..=0x7E | 0xA1..=0xAC | 0xAE..=0xFF);
        if b == byte {
            return if direct {
                b as char
            } else {
                char::from_u32(next_fallback).unwrap()
            };
        }
        if !direct {
            next_fallback += 1;
        }
    }
    unreachable!()
}

fn add_word(vocabulary: &mut Vec<String>, rules: &mut Vec<(u32, u32)>, word: &str) {
    let mut chars = word.chars();
    let Some(first) = chars.next() else { return };
    let mut prefix = first.to_string();

    for ch in chars {
        let left = intern(vocabulary, &prefix);
        let right = intern(vocabulary, &ch.to_string());
        prefix.push(ch);
        let _ = intern(vocabulary, &prefix);
        rules.push((left, right));
    }
}

fn intern(vocabulary: &mut Vec<String>, token: &str) -> u32 {
    if let Some(pos) = vocabulary.iter().position(|t| t == token) {
        return pos as u32;
    }
    vocabulary.push(token.to_string());
    vocabulary.len() as u32 - 1
}

/// Pack values as an MSB-first 17-bit bitstream.
fn pack_merge_ids(values: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut acc: u64 = 0;
    let mut bits = 0u32;
    for &v in values {
        acc = (acc << 17) | v as u64;
        bits += 17;
        while bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
        }
    }
    if bits > 0 {
        out.push((acc << (8 - bits)) as u8);
    }
    out
}
