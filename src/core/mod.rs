//! Core tokenization engine.
//!
//! The pipeline has three stages, each with its own module:
//!
//! 1. `special`: split input around reserved `<|…|>` control tokens
//!    (Aho-Corasick over the configured set).
//! 2. `pretokenizer`: split each text slice into pre-tokens with a state
//!    machine that replicates the reference regex, including its negative
//!    lookahead on trailing whitespace.
//! 3. `bpe`: byte-encode each pre-token ([`byte_level`]) and merge
//!    adjacent pairs by learned priority until no rule applies.
//!
//! `vocab` loads the data driving stages 2 and 3; `cache` memoizes BPE
//! results; `tokenizer` ties the stages together behind the public
//! [`Tokenizer`] API; `scanner` runs the same pipeline incrementally over
//! a byte stream with bounded memory.

mod bpe;
pub mod byte_level;
mod cache;
mod pretokenizer;
mod scanner;
mod special;
mod tokenizer;
mod vocab;

#[cfg(test)]
pub(crate) mod testutil;

pub use cache::CachePolicy;
pub use pretokenizer::pre_tokenize;
pub use scanner::{ScanError, Scanner, ScannerOptions};
pub use special::{
    default_special_tokens, is_special_format, BASE_VOCAB_SIZE, BEGIN_OF_TEXT, BOS_TOKEN_ID,
    END_OF_TEXT, EOS_TOKEN_ID, SPECIAL_TOKEN_COUNT, TOTAL_VOCAB_SIZE,
};
pub use tokenizer::{EncodeOptions, Tokenizer, TokenizerError, TokenizerOptions};
pub use vocab::{FileVocabularyLoader, StaticVocabularyLoader, VocabError, VocabularyLoader};
