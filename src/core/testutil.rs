//! Shared fixtures for unit tests.
//!
//! Real data files are 1.5 MB each, so unit tests run against a synthetic
//! vocabulary: the full 256-entry byte alphabet first, then a handful of
//! whole words reachable through chained merge rules, padded out to the
//! required 128,000 entries. Special tokens are the canonical set, so IDs
//! like 128000/128001 line up with production values.

use super::byte_level;
use super::special::BASE_VOCAB_SIZE;
use super::tokenizer::Tokenizer;
use super::vocab::StaticVocabularyLoader;

/// Words the fixture can encode as single tokens. `\u{120}` is the
/// byte-level image of a space.
const FIXTURE_WORDS: &[&str] = &[
    "Hello",
    "\u{120}world",
    "\u{120}Hello",
    "\u{120}the",
    "\u{120}grabbed",
    "\u{120}\u{120}\u{120}",
];

/// Build the synthetic loader.
pub(crate) fn test_loader() -> StaticVocabularyLoader {
    // IDs 0..=255: one token per byte-level alphabet character.
    let mut vocabulary: Vec<String> = (0u8..=255)
        .map(|b| byte_level::char_for_byte(b).to_string())
        .collect();
    let mut rules: Vec<(u32, u32)> = Vec::new();

    for word in FIXTURE_WORDS {
        add_word(&mut vocabulary, &mut rules, word);
    }

    for i in vocabulary.len()..BASE_VOCAB_SIZE {
        vocabulary.push(format!("\u{100}filler{i}"));
    }

    let merges_blob = pack_merge_ids(&flatten(&rules));
    StaticVocabularyLoader {
        vocabulary,
        merges_blob,
    }
}

/// Build a tokenizer over the synthetic vocabulary.
pub(crate) fn test_tokenizer() -> Tokenizer {
    Tokenizer::new(&test_loader()).expect("fixture tokenizer must build")
}

/// Register `word` by chaining merges left to right: each prefix merges
/// with the next single character, creating intermediate tokens as needed.
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

fn flatten(rules: &[(u32, u32)]) -> Vec<u32> {
    rules.iter().flat_map(|&(l, r)| [l, r]).collect()
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
