//! llamatok - Llama 3 byte-level BPE tokenizer
//!
//! A bit-exact implementation of the Llama 3 family tokenizer (3.0 through
//! 3.3 and derivatives): 128,000 learned subword tokens plus 256 reserved
//! special tokens, byte-level reversible encoding, and the exact
//! pre-tokenization behavior of the reference implementation, including
//! its negative-lookahead whitespace splits.
//!
//! # Design
//!
//! - Hand-written pre-tokenization state machine (no regex backend can
//!   express the reference pattern's lookahead)
//! - Linked-list BPE with a priority queue; equal priorities resolve
//!   leftmost-first, so output is deterministic
//! - Aho-Corasick matching for the 256 special tokens
//! - FxHashMap lookups and a configurable (unbounded or LRU) BPE cache
//! - Rayon parallelism for batch encode/decode
//! - UTF-8-safe streaming scanner with bounded memory
//!
//! # Example
//!
//! ```no_run
//! use llamatok::{EncodeOptions, Tokenizer};
//!
//! let tokenizer = Tokenizer::from_files("vocab_base64.txt", "merges_binary.txt")?;
//! let ids = tokenizer.encode("Hello, world!", &EncodeOptions::default());
//! assert_eq!(tokenizer.decode(&ids[1..ids.len() - 1])?, "Hello, world!");
//! # Ok::<(), llamatok::TokenizerError>(())
//! ```
//!
//! Vocabulary and merge data are injected through a
//! [`VocabularyLoader`]; nothing is embedded in the crate.

pub mod core;

pub use core::{
    default_special_tokens, is_special_format, pre_tokenize, CachePolicy, EncodeOptions,
    FileVocabularyLoader, ScanError, Scanner, ScannerOptions, StaticVocabularyLoader, Tokenizer,
    TokenizerError, TokenizerOptions, VocabError, VocabularyLoader, BASE_VOCAB_SIZE,
    BEGIN_OF_TEXT, BOS_TOKEN_ID, END_OF_TEXT, EOS_TOKEN_ID, SPECIAL_TOKEN_COUNT,
    TOTAL_VOCAB_SIZE,
};
