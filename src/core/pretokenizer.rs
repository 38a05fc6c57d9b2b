//! Pre-tokenization state machine.
//!
//! Splits a text slice (already free of special tokens) into pre-tokens,
//! replicating the reference regex used by Llama 3 tokenizers:
//!
//! ```text
//! (?i:'s|'t|'re|'ve|'m|'ll|'d) | [^\r\n\p{L}\p{N}]?\p{L}+ | \p{N}{1,3}
//!   |  ?[^\s\p{L}\p{N}]+[\r\n]* | \s*[\r\n]+ | \s+(?!\S) | \s+
//! ```
//!
//! The `\s+(?!\S)` alternative needs a negative lookahead that standard
//! regex engines cannot express, so the alternation is implemented directly
//! as a state machine: each step tries the alternatives in order and takes
//! the first that consumes at least one codepoint. The lookahead becomes an
//! explicit rule: consume maximal whitespace, then give back one codepoint
//! when the run is followed by non-whitespace and is at least two long.
//!
//! Pre-tokens are non-empty, non-overlapping slices of the input whose
//! concatenation reproduces it exactly.

/// Longest run of digits a single pre-token may carry.
const MAX_DIGIT_RUN: usize = 3;

/// Contraction suffixes recognized after an apostrophe, ASCII case-folded.
const CONTRACTIONS: [&str; 7] = ["'s", "'t", "'re", "'ve", "'m", "'ll", "'d"];

/// Split `text` into pre-token slices.
pub fn pre_tokenize(text: &str) -> Vec<&str> {
    StateMachine::new(text).run()
}

struct StateMachine<'a> {
    text: &'a str,
    chars: Vec<char>,
    /// Byte offset of each codepoint, plus a trailing sentinel at `text.len()`.
    offsets: Vec<usize>,
    pos: usize,
    out: Vec<&'a str>,
}

impl<'a> StateMachine<'a> {
    fn new(text: &'a str) -> Self {
        let mut chars = Vec::with_capacity(text.len());
        let mut offsets = Vec::with_capacity(text.len() + 1);
        for (offset, ch) in text.char_indices() {
            chars.push(ch);
            offsets.push(offset);
        }
        offsets.push(text.len());

        Self {
            text,
            chars,
            offsets,
            pos: 0,
            out: Vec::with_capacity(32),
        }
    }

    fn run(mut self) -> Vec<&'a str> {
        while self.pos < self.chars.len() {
            self.match_next();
        }
        self.out
    }

    /// Try the alternatives in pattern order; emit the first match.
    fn match_next(&mut self) {
        let start = self.pos;

        if self.try_contraction()
            || self.try_word_with_prefix()
            || self.try_digit_run()
            || self.try_punctuation()
            || self.try_newline_sequence()
            || self.try_whitespace()
        {
            self.emit(start);
            return;
        }

        // No alternative matched: single codepoint.
        self.pos += 1;
        self.emit(start);
    }

    fn emit(&mut self, start: usize) {
        self.out
            .push(&self.text[self.offsets[start]..self.offsets[self.pos]]);
    }

    #[inline]
    fn peek(&self, at: usize) -> Option<char> {
        self.chars.get(at).copied()
    }

    /// `(?i:'s|'t|'re|'ve|'m|'ll|'d)` — original case is preserved.
    fn try_contraction(&mut self) -> bool {
        if self.peek(self.pos) != Some('\'') {
            return false;
        }

        for suffix in CONTRACTIONS {
            let len = suffix.len();
            if self.pos + len > self.chars.len() {
                continue;
            }
            let matches = suffix
                .chars()
                .enumerate()
                .all(|(i, c)| self.chars[self.pos + i].to_ascii_lowercase() == c);
            if matches {
                self.pos += len;
                return true;
            }
        }
        false
    }

    /// `[^\r\n\p{L}\p{N}]?\p{L}+`
    fn try_word_with_prefix(&mut self) -> bool {
        let start = self.pos;

        if let Some(ch) = self.peek(self.pos) {
            if !is_letter(ch) && !is_number(ch) && ch != '\r' && ch != '\n' {
                self.pos += 1;
            }
        }

        match self.peek(self.pos) {
            Some(ch) if is_letter(ch) => {}
            _ => {
                // The optional prefix is only valid before a letter.
                self.pos = start;
                return false;
            }
        }

        while matches!(self.peek(self.pos), Some(ch) if is_letter(ch)) {
            self.pos += 1;
        }
        true
    }

    /// `\p{N}{1,3}` — longer runs re-enter the machine on the next step.
    fn try_digit_run(&mut self) -> bool {
        let start = self.pos;
        while self.pos - start < MAX_DIGIT_RUN {
            match self.peek(self.pos) {
                Some(ch) if is_number(ch) => self.pos += 1,
                _ => break,
            }
        }
        self.pos > start
    }

    /// ` ?[^\s\p{L}\p{N}]+[\r\n]*`
    fn try_punctuation(&mut self) -> bool {
        let start = self.pos;

        if self.peek(self.pos) == Some(' ') {
            self.pos += 1;
        }

        let body_start = self.pos;
        while let Some(ch) = self.peek(self.pos) {
            if is_whitespace(ch) || is_letter(ch) || is_number(ch) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == body_start {
            // A lone leading space does not count.
            self.pos = start;
            return false;
        }

        while matches!(self.peek(self.pos), Some('\r' | '\n')) {
            self.pos += 1;
        }
        true
    }

    /// `\s*[\r\n]+`
    fn try_newline_sequence(&mut self) -> bool {
        let start = self.pos;

        while let Some(ch) = self.peek(self.pos) {
            if ch == '\r' || ch == '\n' || !is_whitespace(ch) {
                break;
            }
            self.pos += 1;
        }

        let newline_start = self.pos;
        while matches!(self.peek(self.pos), Some('\r' | '\n')) {
            self.pos += 1;
        }
        if self.pos == newline_start {
            self.pos = start;
            return false;
        }
        true
    }

    /// `\s+(?!\S)` with `\s+` fallback.
    ///
    /// Consume maximal whitespace; when the run is followed by a
    /// non-whitespace codepoint and is at least two long, give one back.
    /// That reserves the final space for the following word (e.g. eleven
    /// spaces before `grabbed` split as ten plus one).
    fn try_whitespace(&mut self) -> bool {
        let start = self.pos;
        while matches!(self.peek(self.pos), Some(ch) if is_whitespace(ch)) {
            self.pos += 1;
        }
        if self.pos == start {
            return false;
        }

        if self.pos < self.chars.len() && self.pos > start + 1 {
            self.pos -= 1;
        }
        true
    }
}

#[inline]
fn is_letter(ch: char) -> bool {
    ch.is_alphabetic()
}

#[inline]
fn is_number(ch: char) -> bool {
    ch.is_numeric()
}

#[inline]
fn is_whitespace(ch: char) -> bool {
    ch.is_whitespace()
}
