//! Vocabulary construction and merge-table decoding.
//!
//! The tokenizer consumes a [`VocabularyLoader`] at construction. A loader
//! supplies the 128,000 learned token strings (in vocabulary order, already
//! expressed in the byte-level alphabet) and the packed merge blob. The
//! wire formats:
//!
//! - **Vocabulary**: base64 text that decodes to UTF-8, one token per line,
//!   empty lines dropped. Exactly 128,000 entries are required.
//! - **Merges**: base64 text that decodes to a bitstream of 17-bit
//!   big-endian unsigned values. Consecutive values form `(left, right)`
//!   token-ID pairs; the 1-based pair index is the merge priority (lower
//!   merges first). Trailing bits that do not fill a value are padding.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use super::special::BASE_VOCAB_SIZE;

/// Width of each packed merge token ID.
const MERGE_ID_BITS: u32 = 17;

/// Errors raised while loading or decoding tokenizer data.
#[derive(Error, Debug)]
pub enum VocabError {
    /// Vocabulary or merges data could not be read.
    #[error("tokenizer data not found: {}: {source}", .path.display())]
    DataNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Base64 payload did not decode.
    #[error("invalid base64 in {what}: {source}")]
    InvalidBase64 {
        what: &'static str,
        #[source]
        source: base64::DecodeError,
    },
    /// Vocabulary text was not UTF-8.
    #[error("vocabulary is not valid UTF-8")]
    InvalidUtf8,
    /// Vocabulary line count was wrong.
    #[error("vocabulary must have {BASE_VOCAB_SIZE} entries, got {0}")]
    WrongVocabSize(usize),
}

/// Source of vocabulary and merge data.
///
/// The tokenizer calls [`load_vocabulary`](Self::load_vocabulary) first and
/// then [`load_merges_blob`](Self::load_merges_blob). Implementations can
/// read embedded resources, files, or anything else.
pub trait VocabularyLoader {
    /// The ordered learned token strings, one per token ID.
    fn load_vocabulary(&self) -> Result<Vec<String>, VocabError>;

    /// The packed merge blob (already base64-decoded).
    fn load_merges_blob(&self) -> Result<Vec<u8>, VocabError>;
}

/// Loads vocabulary and merge data from base64 text files on disk.
pub struct FileVocabularyLoader {
    vocab_path: PathBuf,
    merges_path: PathBuf,
}

impl FileVocabularyLoader {
    pub fn new(vocab_path: impl AsRef<Path>, merges_path: impl AsRef<Path>) -> Self {
        Self {
            vocab_path: vocab_path.as_ref().to_path_buf(),
            merges_path: merges_path.as_ref().to_path_buf(),
        }
    }

    fn read_base64(path: &Path, what: &'static str) -> Result<Vec<u8>, VocabError> {
        let text = std::fs::read_to_string(path).map_err(|source| VocabError::DataNotFound {
            path: path.to_path_buf(),
            source,
        })?;
        BASE64
            .decode(text.trim())
            .map_err(|source| VocabError::InvalidBase64 { what, source })
    }
}

impl VocabularyLoader for FileVocabularyLoader {
    fn load_vocabulary(&self) -> Result<Vec<String>, VocabError> {
        let decoded = Self::read_base64(&self.vocab_path, "vocabulary")?;
        let text = String::from_utf8(decoded).map_err(|_| VocabError::InvalidUtf8)?;
        Ok(text
            .split('\n')
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn load_merges_blob(&self) -> Result<Vec<u8>, VocabError> {
        Self::read_base64(&self.merges_path, "merges")
    }
}

/// A loader over data already held in memory.
///
/// Useful when the caller embeds the data files itself, and for tests.
pub struct StaticVocabularyLoader {
    /// Learned token strings in vocabulary order.
    pub vocabulary: Vec<String>,
    /// Packed merge blob.
    pub merges_blob: Vec<u8>,
}

impl VocabularyLoader for StaticVocabularyLoader {
    fn load_vocabulary(&self) -> Result<Vec<String>, VocabError> {
        Ok(self.vocabulary.clone())
    }

    fn load_merges_blob(&self) -> Result<Vec<u8>, VocabError> {
        Ok(self.merges_blob.clone())
    }
}

/// Immutable token table: ID to string and back.
///
/// Learned tokens occupy `[0, 128000)`; the 256 special tokens follow in
/// their canonical order.
#[derive(Debug)]
pub(crate) struct Vocabulary {
    id_to_str: Vec<String>,
    str_to_id: FxHashMap<String, u32>,
}

impl Vocabulary {
    /// Build from the learned tokens plus the special-token list.
    pub fn build(base: Vec<String>, specials: &[String]) -> Result<Self, VocabError> {
        if base.len() != BASE_VOCAB_SIZE {
            return Err(VocabError::WrongVocabSize(base.len()));
        }

        let mut id_to_str = base;
        id_to_str.extend(specials.iter().cloned());

        let mut str_to_id = FxHashMap::default();
        str_to_id.reserve(id_to_str.len());
        for (id, token) in id_to_str.iter().enumerate() {
            str_to_id.insert(token.clone(), id as u32);
        }

        debug!(tokens = id_to_str.len(), "vocabulary built");
        Ok(Self { id_to_str, str_to_id })
    }

    #[inline]
    pub fn id(&self, token: &str) -> Option<u32> {
        self.str_to_id.get(token).copied()
    }

    #[inline]
    pub fn token(&self, id: u32) -> Option<&str> {
        self.id_to_str.get(id as usize).map(String::as_str)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.id_to_str.len()
    }
}

/// One decoded merge rule: how early it applies and what it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MergeRule {
    /// 1-based rank; lower merges first.
    pub priority: u32,
    /// Token ID of the concatenated pair.
    pub merged: u32,
}

/// Merge table keyed by adjacent token-ID pairs.
pub(crate) type MergeTable = FxHashMap<(u32, u32), MergeRule>;

/// Unpack MSB-first 17-bit unsigned values from `blob`.
///
/// Trailing bits that cannot fill a whole value are ignored.
fn unpack_merge_ids(blob: &[u8]) -> Vec<u32> {
    let mut out = Vec::with_capacity(blob.len() * 8 / MERGE_ID_BITS as usize);
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;

    for &byte in blob {
        acc = (acc << 8) | byte as u32;
        bits += 8;
        if bits >= MERGE_ID_BITS {
            bits -= MERGE_ID_BITS;
            out.push((acc >> bits) & ((1 << MERGE_ID_BITS) - 1));
            acc &= (1 << bits) - 1;
        }
    }

    out
}

/// Decode the packed merge blob into a [`MergeTable`].
///
/// Pairs referencing out-of-range token IDs are skipped, as are pairs whose
/// concatenation is missing from the vocabulary. If the same pair appears
/// twice, the earlier (lower-priority-value) occurrence wins.
pub(crate) fn decode_merges(blob: &[u8], vocab: &Vocabulary) -> MergeTable {
    let ids = unpack_merge_ids(blob);
    let mut merges = MergeTable::default();
    merges.reserve(ids.len() / 2);

    for (index, pair) in ids.chunks_exact(2).enumerate() {
        let (left, right) = (pair[0], pair[1]);
        let (Some(left_str), Some(right_str)) = (vocab.token(left), vocab.token(right)) else {
            continue;
        };

        let merged = format!("{left_str}{right_str}");
        let Some(merged_id) = vocab.id(&merged) else {
            continue;
        };

        merges.entry((left, right)).or_insert(MergeRule {
            priority: index as u32 + 1,
            merged: merged_id,
        });
    }

    debug!(rules = merges.len(), "merge table decoded");
    merges
}
