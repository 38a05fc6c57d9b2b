//! The Llama 3 tokenizer: encode, decode, and token counting.
//!
//! A [`Tokenizer`] owns its vocabulary, merge table, special-token set, and
//! BPE cache; all data is loaded once at construction through a
//! [`VocabularyLoader`] and immutable afterwards. Encoding runs the
//! three-stage pipeline: split around special tokens, pre-tokenize each
//! text slice, byte-encode and BPE each pre-token. Decoding concatenates
//! token strings and inverts the byte-level alphabet.
//!
//! Calls are pure over the immutable data; the cache is the only shared
//! mutable state and is internally synchronized, so one tokenizer can serve
//! concurrent callers (which [`encode_batch`](Tokenizer::encode_batch)
//! exploits via rayon).

use rayon::prelude::*;
use std::io::{Read, Write};
use std::num::NonZeroUsize;
use std::path::Path;
use thiserror::Error;

use super::bpe::byte_pair_encode;
use super::byte_level::{decode_token_into, encode_bytes};
use super::cache::{BoundedCache, BpeCache, CachePolicy, UnboundedCache};
use super::pretokenizer::pre_tokenize;
use super::scanner::{ScanError, Scanner, ScannerOptions};
use super::special::{
    default_special_tokens, is_special_format, split_optimistic, validate_special_tokens, Segment,
    SpecialMatcher, BEGIN_OF_TEXT, END_OF_TEXT,
};
use super::vocab::{
    decode_merges, FileVocabularyLoader, MergeTable, VocabError, Vocabulary, VocabularyLoader,
};

/// Errors surfaced by tokenizer construction and lookups.
///
/// `encode` and the decode family never fail; invalid token IDs are dropped
/// during decoding by design.
#[derive(Error, Debug)]
pub enum TokenizerError {
    /// Data loading or decoding failed.
    #[error(transparent)]
    Vocab(#[from] VocabError),
    /// The string passed to a special-token lookup is not `<|…|>`-shaped.
    #[error("invalid token: {0:?} is not in special-token format")]
    InvalidToken(String),
    /// A well-formed special token is absent from the vocabulary.
    #[error("token not found: {0:?} is not in the vocabulary")]
    TokenNotFound(String),
    /// A token ID outside `[0, vocab_size)`.
    #[error("invalid token ID: {0}")]
    InvalidTokenId(u32),
    /// Decoded bytes were not valid UTF-8 (strict decode only).
    #[error("decoded bytes are not valid UTF-8")]
    Utf8,
    /// A construction option was rejected.
    #[error("invalid configuration: {field}: {message}")]
    Config {
        field: &'static str,
        message: String,
    },
    /// The special-token automaton could not be built.
    #[error("special-token matcher: {0}")]
    SpecialMatcher(#[from] aho_corasick::BuildError),
    /// Streaming read failure, reported by [`Tokenizer::process`].
    #[error(transparent)]
    Scan(#[from] ScanError),
    /// Output write failure, reported by [`Tokenizer::process`].
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Controls BOS/EOS framing for [`Tokenizer::encode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Prepend `<|begin_of_text|>` (ID 128000).
    pub bos: bool,
    /// Append `<|end_of_text|>` (ID 128001).
    pub eos: bool,
}

impl EncodeOptions {
    /// No framing tokens.
    pub const RAW: EncodeOptions = EncodeOptions {
        bos: false,
        eos: false,
    };
}

impl Default for EncodeOptions {
    /// Both framing tokens on, matching the reference implementation.
    fn default() -> Self {
        EncodeOptions {
            bos: true,
            eos: true,
        }
    }
}

/// Construction options for [`Tokenizer::with_options`].
#[derive(Default)]
pub struct TokenizerOptions {
    /// Replacement special-token list for fine-tuned derivatives. Must hold
    /// exactly 256 unique `<|…|>` strings. `None` uses the canonical
    /// Llama 3 set.
    pub special_tokens: Option<Vec<String>>,
    /// BPE cache policy.
    pub cache: CachePolicy,
}

/// Byte-level BPE tokenizer, bit-exact with the Llama 3 reference.
pub struct Tokenizer {
    vocab: Vocabulary,
    merges: MergeTable,
    special_tokens: Vec<String>,
    special_matcher: SpecialMatcher,
    cache: Box<dyn BpeCache>,
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("vocab", &self.vocab)
            .field("merges", &self.merges)
            .field("special_tokens", &self.special_tokens)
            .field("special_matcher", &self.special_matcher)
            .finish_non_exhaustive()
    }
}

impl Tokenizer {
    /// Build a tokenizer with default options from the given data source.
    pub fn new(loader: &dyn VocabularyLoader) -> Result<Self, TokenizerError> {
        Self::with_options(loader, TokenizerOptions::default())
    }

    /// Build a tokenizer with explicit options.
    pub fn with_options(
        loader: &dyn VocabularyLoader,
        options: TokenizerOptions,
    ) -> Result<Self, TokenizerError> {
        let special_tokens = match options.special_tokens {
            Some(tokens) => {
                validate_special_tokens(&tokens)?;
                tokens
            }
            None => default_special_tokens(),
        };

        let cache: Box<dyn BpeCache> = match options.cache {
            CachePolicy::Unbounded => Box::new(UnboundedCache::new()),
            CachePolicy::Lru(capacity) => {
                let capacity = NonZeroUsize::new(capacity).ok_or(TokenizerError::Config {
                    field: "cache",
                    message: "LRU capacity must be positive".to_string(),
                })?;
                Box::new(BoundedCache::new(capacity))
            }
        };

        let base = loader.load_vocabulary()?;
        let vocab = Vocabulary::build(base, &special_tokens)?;
        let blob = loader.load_merges_blob()?;
        let merges = decode_merges(&blob, &vocab);
        let special_matcher = SpecialMatcher::new(&special_tokens)?;

        Ok(Self {
            vocab,
            merges,
            special_tokens,
            special_matcher,
            cache,
        })
    }

    /// Build a tokenizer from base64 data files on disk.
    pub fn from_files(
        vocab_path: impl AsRef<Path>,
        merges_path: impl AsRef<Path>,
    ) -> Result<Self, TokenizerError> {
        Self::new(&FileVocabularyLoader::new(vocab_path, merges_path))
    }

    /// Encode text into token IDs.
    ///
    /// Strict special-token matches in the input are emitted as their own
    /// IDs; everything else goes through pre-tokenization and BPE. The
    /// output is deterministic for a given vocabulary and input.
    pub fn encode(&self, text: &str, opts: &EncodeOptions) -> Vec<u32> {
        let mut out = Vec::with_capacity(text.len() / 4 + 2);

        if opts.bos {
            if let Ok(id) = self.special_token_id(BEGIN_OF_TEXT) {
                out.push(id);
            }
        }

        for segment in self.special_matcher.split(text) {
            match segment {
                Segment::Special(token) => {
                    if let Some(id) = self.vocab.id(token) {
                        out.push(id);
                    } else {
                        // Matcher strings come from the vocabulary, so this
                        // only triggers for exotic custom setups; fall back
                        // to treating the slice as text.
                        self.encode_text(token, &mut out);
                    }
                }
                Segment::Text(slice) => self.encode_text(slice, &mut out),
            }
        }

        if opts.eos {
            if let Ok(id) = self.special_token_id(END_OF_TEXT) {
                out.push(id);
            }
        }

        out
    }

    /// Encode many texts in parallel.
    pub fn encode_batch(&self, texts: &[String], opts: &EncodeOptions) -> Vec<Vec<u32>> {
        texts
            .par_iter()
            .map(|text| self.encode(text, opts))
            .collect()
    }

    fn encode_text(&self, text: &str, out: &mut Vec<u32>) {
        for pretoken in pre_tokenize(text) {
            let encoded = encode_bytes(pretoken.as_bytes());
            out.extend(self.encode_pretoken(&encoded));
        }
    }

    /// BPE one byte-encoded pre-token, consulting the cache first.
    fn encode_pretoken(&self, pretoken: &str) -> Vec<u32> {
        if let Some(cached) = self.cache.get(pretoken) {
            return cached;
        }

        let result = match self.vocab.id(pretoken) {
            Some(id) => vec![id],
            None => byte_pair_encode(pretoken, &self.vocab, &self.merges),
        };

        self.cache.put(pretoken, result.clone());
        result
    }

    /// Decode token IDs into raw bytes.
    ///
    /// Out-of-range IDs are skipped. The result is the exact byte sequence
    /// the tokens encode; it is valid UTF-8 whenever the IDs came from
    /// [`encode`](Self::encode).
    pub fn decode_bytes(&self, ids: &[u32]) -> Vec<u8> {
        let mut out = Vec::with_capacity(ids.len() * 3);
        for &id in ids {
            if let Some(token) = self.vocab.token(id) {
                decode_token_into(token, &mut out);
            }
        }
        out
    }

    /// Decode token IDs into text, failing on invalid UTF-8.
    pub fn decode(&self, ids: &[u32]) -> Result<String, TokenizerError> {
        String::from_utf8(self.decode_bytes(ids)).map_err(|_| TokenizerError::Utf8)
    }

    /// Decode token IDs into text, substituting U+FFFD for invalid UTF-8.
    pub fn decode_lossy(&self, ids: &[u32]) -> String {
        match String::from_utf8(self.decode_bytes(ids)) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        }
    }

    /// Decode many ID lists in parallel (strict UTF-8).
    pub fn decode_batch(&self, lists: &[Vec<u32>]) -> Result<Vec<String>, TokenizerError> {
        lists.par_iter().map(|ids| self.decode(ids)).collect()
    }

    /// Look up the ID of a special token string.
    pub fn special_token_id(&self, token: &str) -> Result<u32, TokenizerError> {
        if !is_special_format(token) {
            return Err(TokenizerError::InvalidToken(token.to_string()));
        }
        self.vocab
            .id(token)
            .ok_or_else(|| TokenizerError::TokenNotFound(token.to_string()))
    }

    /// The string stored for a token ID.
    pub fn token_text(&self, id: u32) -> Result<&str, TokenizerError> {
        self.vocab
            .token(id)
            .ok_or(TokenizerError::InvalidTokenId(id))
    }

    /// Token count assuming anything `<|word|>`-shaped is one special
    /// token, whether or not the vocabulary knows it.
    ///
    /// Useful for estimating context budgets of fine-tuned models whose
    /// special-token set differs from the default. BOS and EOS are always
    /// counted.
    pub fn optimistic_count(&self, text: &str) -> usize {
        let mut count = 0usize;

        if self.special_token_id(BEGIN_OF_TEXT).is_ok() {
            count += 1;
        }

        for segment in split_optimistic(text) {
            match segment {
                // Unknown markers still count as a single token.
                Segment::Special(_) => count += 1,
                Segment::Text(slice) => {
                    for pretoken in pre_tokenize(slice) {
                        let encoded = encode_bytes(pretoken.as_bytes());
                        count += self.encode_pretoken(&encoded).len();
                    }
                }
            }
        }

        if self.special_token_id(END_OF_TEXT).is_ok() {
            count += 1;
        }

        count
    }

    /// Total vocabulary size, special tokens included.
    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// The configured special-token strings, in ID order.
    pub fn special_tokens(&self) -> &[String] {
        &self.special_tokens
    }

    /// Number of cached pre-token encodings.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Stream tokens from a reader with default scanner options (no
    /// BOS/EOS framing).
    pub fn scanner<R: Read>(&self, reader: R) -> Scanner<'_, R> {
        Scanner::new(self, reader, ScannerOptions::default())
    }

    /// Stream tokens from a reader with explicit options.
    pub fn scanner_with_options<R: Read>(
        &self,
        reader: R,
        options: ScannerOptions,
    ) -> Scanner<'_, R> {
        Scanner::new(self, reader, options)
    }

    /// Tokenize everything from `reader`, writing each token ID to
    /// `writer` as four little-endian bytes. Returns the token count.
    ///
    /// Memory stays bounded by the scanner's buffer limit regardless of
    /// input size.
    pub fn process<R: Read, W: Write>(
        &self,
        reader: R,
        writer: &mut W,
    ) -> Result<u64, TokenizerError> {
        let mut scanner = self.scanner(reader);
        let mut count = 0u64;

        while scanner.advance() {
            writer.write_all(&scanner.current_token().to_le_bytes())?;
            count += 1;
        }

        match scanner.into_error() {
            Some(err) => Err(err.into()),
            None => Ok(count),
        }
    }

    pub(crate) fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }
}
