//! Special-token registry and matchers.
//!
//! Llama 3 reserves 256 in-band control markers, appended to the vocabulary
//! after the 128,000 learned tokens. Eleven of them are named; the rest are
//! `<|reserved_special_token_N|>` placeholders. Two matchers operate on
//! input text:
//!
//! - the **strict** matcher recognizes exactly the configured token strings
//!   (for the default set, that is the canonical Llama 3 list), and
//! - the **optimistic** matcher recognizes anything shaped like
//!   `<|word|>`, used to estimate counts for fine-tuned models whose
//!   special tokens are unknown.

use aho_corasick::{AhoCorasick, MatchKind};
use regex::Regex;
use std::sync::LazyLock;

use super::tokenizer::TokenizerError;

/// Number of learned subword tokens in the base vocabulary.
pub const BASE_VOCAB_SIZE: usize = 128_000;

/// Number of reserved special tokens appended after the base vocabulary.
pub const SPECIAL_TOKEN_COUNT: usize = 256;

/// Total vocabulary size including special tokens.
pub const TOTAL_VOCAB_SIZE: usize = BASE_VOCAB_SIZE + SPECIAL_TOKEN_COUNT;

/// The beginning-of-text marker.
pub const BEGIN_OF_TEXT: &str = "<|begin_of_text|>";

/// The end-of-text marker.
pub const END_OF_TEXT: &str = "<|end_of_text|>";

/// Token ID of [`BEGIN_OF_TEXT`] in the default vocabulary.
pub const BOS_TOKEN_ID: u32 = 128_000;

/// Token ID of [`END_OF_TEXT`] in the default vocabulary.
pub const EOS_TOKEN_ID: u32 = 128_001;

/// Matches anything that looks like a special token: `<|word|>`.
static OPTIMISTIC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\|[A-Za-z0-9_]+\|>").unwrap());

/// The canonical Llama 3 special tokens in vocabulary order.
///
/// IDs are `128000 + index`. The named tokens and the interleaved reserved
/// slots match the ordering Meta ships with Llama 3.1 and later.
pub fn default_special_tokens() -> Vec<String> {
    let mut tokens: Vec<String> = [
        BEGIN_OF_TEXT,
        END_OF_TEXT,
        "<|reserved_special_token_0|>",
        "<|reserved_special_token_1|>",
        "<|finetune_right_pad_id|>",
        "<|reserved_special_token_2|>",
        "<|start_header_id|>",
        "<|end_header_id|>",
        "<|eom_id|>",
        "<|eot_id|>",
        "<|python_tag|>",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    for n in 3..=247 {
        tokens.push(format!("<|reserved_special_token_{n}|>"));
    }

    debug_assert_eq!(tokens.len(), SPECIAL_TOKEN_COUNT);
    tokens
}

/// Returns true when `s` has the special-token shape `<|…|>`.
pub fn is_special_format(s: &str) -> bool {
    s.starts_with("<|") && s.ends_with("|>") && s.len() >= 4
}

/// Validate a caller-supplied special-token list.
///
/// The list must contain exactly [`SPECIAL_TOKEN_COUNT`] entries, each in
/// `<|…|>` format, with no duplicates.
pub(crate) fn validate_special_tokens(tokens: &[String]) -> Result<(), TokenizerError> {
    if tokens.len() != SPECIAL_TOKEN_COUNT {
        return Err(TokenizerError::Config {
            field: "special_tokens",
            message: format!("expected {SPECIAL_TOKEN_COUNT} entries, got {}", tokens.len()),
        });
    }
    for (i, token) in tokens.iter().enumerate() {
        if !is_special_format(token) {
            return Err(TokenizerError::Config {
                field: "special_tokens",
                message: format!("entry {i} ({token:?}) is not in <|…|> format"),
            });
        }
        if tokens[..i].contains(token) {
            return Err(TokenizerError::Config {
                field: "special_tokens",
                message: format!("duplicate entry {token:?}"),
            });
        }
    }
    Ok(())
}

/// One piece of an input split around special-token matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// A matched special token, to be emitted as a single ID.
    Special(&'a str),
    /// Ordinary text, to be pre-tokenized and BPE-encoded.
    Text(&'a str),
}

/// Strict matcher over the configured special-token strings.
///
/// Built once per tokenizer; the automaton recognizes exactly the strings
/// the vocabulary carries, which for the default set coincides with the
/// canonical strict pattern (named tokens plus reserved 0..=247).
#[derive(Debug)]
pub(crate) struct SpecialMatcher {
    automaton: AhoCorasick,
}

impl SpecialMatcher {
    pub fn new(tokens: &[String]) -> Result<Self, TokenizerError> {
        let automaton = AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .build(tokens)
            .map_err(TokenizerError::SpecialMatcher)?;
        Ok(Self { automaton })
    }

    /// Split `text` around strict matches, preserving the matches.
    ///
    /// Non-empty slices only; concatenating the segments reproduces the
    /// input exactly.
    pub fn split<'a>(&self, text: &'a str) -> Vec<Segment<'a>> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut segments = Vec::new();
        let mut last_end = 0;
        for m in self.automaton.find_iter(text) {
            if m.start() > last_end {
                segments.push(Segment::Text(&text[last_end..m.start()]));
            }
            segments.push(Segment::Special(&text[m.start()..m.end()]));
            last_end = m.end();
        }
        if last_end < text.len() {
            segments.push(Segment::Text(&text[last_end..]));
        }
        segments
    }
}

/// Split `text` around optimistic `<|word|>` matches, preserving them.
pub(crate) fn split_optimistic(text: &str) -> Vec<Segment<'_>> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut last_end = 0;
    for m in OPTIMISTIC_PATTERN.find_iter(text) {
        if m.start() > last_end {
            segments.push(Segment::Text(&text[last_end..m.start()]));
        }
        segments.push(Segment::Special(m.as_str()));
        last_end = m.end();
    }
    if last_end < text.len() {
        segments.push(Segment::Text(&text[last_end..]));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_has_256_tokens() {
        let tokens = default_special_tokens();
        assert_eq!(tokens.len(), SPECIAL_TOKEN_COUNT);
        assert_eq!(tokens[0], BEGIN_OF_TEXT);
        assert_eq!(tokens[1], END_OF_TEXT);
        assert_eq!(tokens[6], "<|start_header_id|>");
        assert_eq!(tokens[9], "<|eot_id|>");
        assert_eq!(tokens[255], "<|reserved_special_token_247|>");
    }

    #[test]
    fn special_format_check() {
        assert!(is_special_format("<|eot_id|>"));
        assert!(is_special_format("<|x|>"));
        assert!(!is_special_format("eot_id"));
        assert!(!is_special_format("<|unclosed"));
        assert!(!is_special_format("|>"));
    }

    #[test]
    fn strict_split_preserves_input() {
        let matcher = SpecialMatcher::new(&default_special_tokens()).unwrap();
        let text = "a<|eot_id|>b<|begin_of_text|><|eom_id|>c";
        let segments = matcher.split(text);
        assert_eq!(
            segments,
            vec![
                Segment::Text("a"),
                Segment::Special("<|eot_id|>"),
                Segment::Text("b"),
                Segment::Special("<|begin_of_text|>"),
                Segment::Special("<|eom_id|>"),
                Segment::Text("c"),
            ]
        );
        let rebuilt: String = segments
            .iter()
            .map(|s| match s {
                Segment::Special(p) | Segment::Text(p) => *p,
            })
            .collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn strict_split_ignores_unknown_markers() {
        let matcher = SpecialMatcher::new(&default_special_tokens()).unwrap();
        let segments = matcher.split("<|made_up|>x");
        assert_eq!(segments, vec![Segment::Text("<|made_up|>x")]);
    }

    #[test]
    fn strict_split_without_matches_is_single_text() {
        let matcher = SpecialMatcher::new(&default_special_tokens()).unwrap();
        assert_eq!(matcher.split("plain"), vec![Segment::Text("plain")]);
        assert!(matcher.split("").is_empty());
    }

    #[test]
    fn reserved_number_is_matched_whole() {
        // "<|reserved_special_token_24|>" must not match as token 2 plus
        // trailing garbage.
        let matcher = SpecialMatcher::new(&default_special_tokens()).unwrap();
        let segments = matcher.split("<|reserved_special_token_24|>");
        assert_eq!(
            segments,
            vec![Segment::Special("<|reserved_special_token_24|>")]
        );
    }

    #[test]
    fn optimistic_split_accepts_unknown_markers() {
        let segments = split_optimistic("<|custom_unknown|>Hello<|another|>");
        assert_eq!(
            segments,
            vec![
                Segment::Special("<|custom_unknown|>"),
                Segment::Text("Hello"),
                Segment::Special("<|another|>"),
            ]
        );
    }

    #[test]
    fn optimistic_split_rejects_bad_shapes() {
        let segments = split_optimistic("<|with space|> <||>");
        assert_eq!(segments, vec![Segment::Text("<|with space|> <||>")]);
    }

    #[test]
    fn validation_rejects_bad_lists() {
        let mut tokens = default_special_tokens();
        assert!(validate_special_tokens(&tokens).is_ok());

        tokens[10] = tokens[9].clone();
        assert!(matches!(
            validate_special_tokens(&tokens),
            Err(TokenizerError::Config { .. })
        ));

        let mut tokens = default_special_tokens();
        tokens[0] = "begin_of_text".to_string();
        assert!(validate_special_tokens(&tokens).is_err());

        tokens.pop();
        assert!(validate_special_tokens(&tokens).is_err());
    }
}
