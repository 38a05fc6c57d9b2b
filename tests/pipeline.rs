//! End-to-end pipeline tests over a synthetic vocabulary.
//!
//! These exercise the full encode/decode/stream path without the real data
//! files; bit-exact vectors against the shipped Llama 3 data live in
//! `reference_vectors.rs`.

mod common;

use llamatok::{EncodeOptions, ScannerOptions, Tokenizer, BOS_TOKEN_ID, EOS_TOKEN_ID};
use std::io::Cursor;

#[test]
fn framing_wraps_the_stream() {
    let t = common::tokenizer();
    let ids = t.encode("Hello world", &EncodeOptions::default());
    assert_eq!(ids.first(), Some(&BOS_TOKEN_ID));
    assert_eq!(ids.last(), Some(&EOS_TOKEN_ID));

    let inner = t.decode(&ids[1..ids.len() - 1]).unwrap();
    assert_eq!(inner, "Hello world");
}

#[test]
fn text_of_only_specials_encodes_to_their_ids() {
    let t = common::tokenizer();
    let text = "<|start_header_id|><|eom_id|><|eot_id|><|end_header_id|>";
    let ids = t.encode(text, &EncodeOptions::RAW);
    assert_eq!(ids, vec![128_006, 128_008, 128_009, 128_007]);
    assert_eq!(t.decode(&ids).unwrap(), text);
}

#[test]
fn specials_interleave_with_text() {
    let t = common::tokenizer();
    let ids = t.encode(
        "<|start_header_id|>Hello world<|eot_id|>",
        &EncodeOptions::RAW,
    );
    assert_eq!(ids.first(), Some(&128_006));
    assert_eq!(ids.last(), Some(&128_009));
    assert_eq!(
        t.decode(&ids).unwrap(),
        "<|start_header_id|>Hello world<|eot_id|>"
    );
}

#[test]
fn natural_text_roundtrips_exactly() {
    let t = common::tokenizer();
    for text in [
        "The quick brown fox jumps over the lazy dog.",
        "Tabs\tand\nnewlines\r\nand    runs of spaces",
        "Mixed scripts: привет שלום こんにちは 🦙",
        "Contractions don't can't I'll we're",
        "           grabbed",
        "123 45678 9",
    ] {
        let ids = t.encode(text, &EncodeOptions::RAW);
        assert_eq!(t.decode(&ids).unwrap(), text, "roundtrip for {text:?}");
    }
}

#[test]
fn scanner_matches_one_shot_when_input_fits_one_chunk() {
    let t = common::tokenizer();
    let text = "Hello world and some 123 punctuation!";
    let mut scanner = t.scanner(Cursor::new(text));
    let mut streamed = Vec::new();
    while scanner.advance() {
        streamed.push(scanner.current_token());
    }
    assert!(scanner.error().is_none());
    assert_eq!(streamed, t.encode(text, &EncodeOptions::RAW));
}

#[test]
fn chunked_scanning_preserves_framing_and_text() {
    let t = common::tokenizer();
    // Chunk boundaries may re-split words; the decoded text and the
    // one-per-stream framing tokens are invariant.
    let text = "Hello world ".repeat(200);
    let opts = ScannerOptions {
        read_chunk: 64,
        encode: EncodeOptions { bos: true, eos: true },
        ..ScannerOptions::default()
    };

    let mut scanner = t.scanner_with_options(Cursor::new(text.as_str()), opts);
    let mut streamed = Vec::new();
    while scanner.advance() {
        streamed.push(scanner.current_token());
    }
    assert!(scanner.error().is_none());

    assert_eq!(streamed.first(), Some(&BOS_TOKEN_ID));
    assert_eq!(streamed.last(), Some(&EOS_TOKEN_ID));
    assert_eq!(streamed.iter().filter(|&&id| id == BOS_TOKEN_ID).count(), 1);
    assert_eq!(streamed.iter().filter(|&&id| id == EOS_TOKEN_ID).count(), 1);
    assert_eq!(
        t.decode(&streamed[1..streamed.len() - 1]).unwrap(),
        text
    );
}

#[test]
fn scanner_bounds_memory_on_large_input() {
    let t = common::tokenizer();
    // 1 MiB of ASCII with regular whitespace.
    let text = "the quick brown fox ".repeat(50_000);
    assert!(text.len() >= 1_000_000);

    let opts = ScannerOptions {
        read_chunk: 4096,
        max_buffer: 16 * 1024,
        ..ScannerOptions::default()
    };
    let mut scanner = t.scanner_with_options(Cursor::new(text.as_str()), opts);
    let mut streamed = Vec::new();
    while scanner.advance() {
        streamed.push(scanner.current_token());
    }
    assert!(scanner.error().is_none());
    assert_eq!(t.decode(&streamed).unwrap(), text);
}

#[test]
fn process_writes_little_endian_ids() {
    let t = common::tokenizer();
    let mut out = Vec::new();
    let count = t.process(Cursor::new("Hello world"), &mut out).unwrap();

    assert_eq!(out.len(), count as usize * 4);
    let ids: Vec<u32> = out
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    assert_eq!(ids, t.encode("Hello world", &EncodeOptions::RAW));
}

#[test]
fn optimistic_count_exceeds_strict_knowledge() {
    let t = common::tokenizer();
    let n = t.optimistic_count("<|custom_unknown|>Hello<|another|>");
    assert!(n >= 5, "got {n}");
}

#[test]
fn concurrent_encodes_share_one_tokenizer() {
    let t = std::sync::Arc::new(common::tokenizer());
    let expected = t.encode("Hello world", &EncodeOptions::RAW);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let t = std::sync::Arc::clone(&t);
            let expected = expected.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    assert_eq!(t.encode("Hello world", &EncodeOptions::RAW), expected);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn custom_special_tokens_drive_the_strict_matcher() {
    use llamatok::{default_special_tokens, CachePolicy, TokenizerOptions};

    let mut specials = default_special_tokens();
    specials[9] = "<|turn_end|>".to_string();

    let t = Tokenizer::with_options(
        &common::loader(),
        TokenizerOptions {
            special_tokens: Some(specials),
            cache: CachePolicy::Lru(1024),
        },
    )
    .unwrap();

    assert_eq!(
        t.encode("<|turn_end|>Hello", &EncodeOptions::RAW),
        vec![128_009, t.encode("Hello", &EncodeOptions::RAW)[0]]
    );
    // The replaced default is no longer matched.
    let ids = t.encode("<|eot_id|>", &EncodeOptions::RAW);
    assert_eq!(t.decode(&ids).unwrap(), "<|eot_id|>");
    assert!(ids.len() > 1);
}

#[test]
fn construction_requires_full_vocabulary() {
    let loader = llamatok::StaticVocabularyLoader {
        vocabulary: vec!["a".to_string(); 100],
        merges_blob: Vec::new(),
    };
    assert!(Tokenizer::new(&loader).is_err());
}
