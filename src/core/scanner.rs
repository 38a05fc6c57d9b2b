//! Incremental tokenization over a byte stream.
//!
//! A [`Scanner`] pulls bytes from a reader, accumulates them in a bounded
//! buffer, and tokenizes at UTF-8-safe cut points, surfacing token IDs one
//! at a time. BOS is emitted with the first tokenized chunk only; EOS is
//! emitted once, after the final chunk.
//!
//! The buffer is never cut inside a multi-byte UTF-8 sequence: a partial
//! sequence at a cut point is carried over as pending bytes and prepended
//! to the next read. Tokenization is triggered when the buffer ends in
//! ASCII whitespace, is at least half a read-chunk full while ending on a
//! codepoint boundary, hits the maximum buffer size, or when the reader is
//! exhausted.
//!
//! The scanner is a single-consumer iterator; it holds no locks and yields
//! synchronously.

use std::io::Read;
use thiserror::Error;

use super::special::{BEGIN_OF_TEXT, END_OF_TEXT};
use super::tokenizer::{EncodeOptions, Tokenizer};

/// Read failure during streaming, with position context.
#[derive(Error, Debug)]
#[error("read failed at offset {offset} (near {preview:?}): {source}")]
pub struct ScanError {
    /// Total bytes consumed from the reader when the failure occurred.
    pub offset: u64,
    /// Bounded preview of the unprocessed text.
    pub preview: String,
    #[source]
    pub source: std::io::Error,
}

/// Longest preview carried inside a [`ScanError`].
const ERROR_PREVIEW_LEN: usize = 50;

/// Configuration for a [`Scanner`].
#[derive(Debug, Clone, Copy)]
pub struct ScannerOptions {
    /// Bytes requested per read. Default 4096.
    pub read_chunk: usize,
    /// Maximum accumulated buffer before tokenization is forced.
    /// Default 1 MiB.
    pub max_buffer: usize,
    /// BOS/EOS framing for the whole stream. Default: no framing.
    pub encode: EncodeOptions,
}

impl Default for ScannerOptions {
    fn default() -> Self {
        Self {
            read_chunk: 4096,
            max_buffer: 1024 * 1024,
            encode: EncodeOptions::RAW,
        }
    }
}

/// Streaming tokenizer over a reader.
///
/// ```no_run
/// # use llamatok::Tokenizer;
/// # fn demo(tokenizer: &Tokenizer) -> std::io::Result<()> {
/// let file = std::fs::File::open("input.txt")?;
/// let mut scanner = tokenizer.scanner(file);
/// while scanner.advance() {
///     println!("{}", scanner.current_token());
/// }
/// if let Some(err) = scanner.error() {
///     eprintln!("scan failed: {err}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct Scanner<'a, R: Read> {
    tokenizer: &'a Tokenizer,
    reader: R,
    opts: ScannerOptions,

    buffer: Vec<u8>,
    /// Partial UTF-8 sequence held back from the buffer.
    pending: Vec<u8>,
    tokens: Vec<u32>,
    /// 1-based position of the current token in `tokens`; 0 before the
    /// first `advance`.
    cursor: usize,
    /// Text of the chunk that produced `tokens`.
    chunk_text: String,

    consumed: u64,
    error: Option<ScanError>,
    at_eof: bool,
    sent_bos: bool,
    framing_done: bool,
}

impl<'a, R: Read> Scanner<'a, R> {
    pub(crate) fn new(tokenizer: &'a Tokenizer, reader: R, opts: ScannerOptions) -> Self {
        let max_buffer = opts.max_buffer.max(4);
        let opts = ScannerOptions {
            read_chunk: opts.read_chunk.clamp(1, max_buffer),
            max_buffer,
            encode: opts.encode,
        };
        Self {
            tokenizer,
            reader,
            opts,
            buffer: Vec::new(),
            pending: Vec::new(),
            tokens: Vec::new(),
            cursor: 0,
            chunk_text: String::new(),
            consumed: 0,
            error: None,
            at_eof: false,
            sent_bos: false,
            framing_done: false,
        }
    }

    /// Advance to the next token. Returns false at end of stream or on
    /// error; check [`error`](Self::error) to distinguish.
    pub fn advance(&mut self) -> bool {
        if self.error.is_some() {
            return false;
        }
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
            return true;
        }
        if self.at_eof && self.buffer.is_empty() {
            return self.finish();
        }

        self.tokens.clear();
        self.cursor = 0;

        if let Err(source) = self.fill() {
            self.error = Some(self.scan_error(source));
            return false;
        }

        if !self.buffer.is_empty() {
            self.tokenize_buffer();
        }
        if self.tokens.is_empty() {
            if self.at_eof && self.buffer.is_empty() {
                return self.finish();
            }
            return false;
        }

        self.cursor = 1;
        true
    }

    /// The token produced by the last successful [`advance`](Self::advance).
    pub fn current_token(&self) -> u32 {
        if self.cursor > 0 && self.cursor <= self.tokens.len() {
            self.tokens[self.cursor - 1]
        } else {
            0
        }
    }

    /// The chunk text whose encoding produced the current token. Framing
    /// tokens emitted at end of stream carry an empty chunk.
    pub fn current_text(&self) -> &str {
        &self.chunk_text
    }

    /// The first error encountered, if any.
    pub fn error(&self) -> Option<&ScanError> {
        self.error.as_ref()
    }

    /// Consume the scanner, returning the error it stopped on.
    pub fn into_error(self) -> Option<ScanError> {
        self.error
    }

    /// Emit end-of-stream framing tokens exactly once.
    fn finish(&mut self) -> bool {
        if self.framing_done {
            return false;
        }
        self.framing_done = true;

        self.tokens.clear();
        self.chunk_text.clear();

        // BOS only if no chunk ever carried it (empty input).
        if self.opts.encode.bos && !self.sent_bos {
            if let Ok(id) = self.tokenizer.special_token_id(BEGIN_OF_TEXT) {
                self.tokens.push(id);
            }
            self.sent_bos = true;
        }
        if self.opts.encode.eos {
            if let Ok(id) = self.tokenizer.special_token_id(END_OF_TEXT) {
                self.tokens.push(id);
            }
        }

        if self.tokens.is_empty() {
            return false;
        }
        self.cursor = 1;
        true
    }

    /// Read until the buffer reaches a tokenization point or EOF.
    fn fill(&mut self) -> Result<(), std::io::Error> {
        let mut chunk = vec![0u8; self.opts.read_chunk];
        loop {
            if !self.pending.is_empty() {
                // Carried-over bytes go in ahead of any new read.
                let incoming = std::mem::take(&mut self.pending);
                self.append_bounded(incoming);
            } else {
                let n = match self.reader.read(&mut chunk) {
                    Ok(n) => n,
                    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(err) => return Err(err),
                };
                self.consumed += n as u64;

                if n == 0 {
                    // Pending is always drained before a read, so nothing
                    // is left behind at EOF.
                    self.at_eof = true;
                    return Ok(());
                }
                self.append_bounded(chunk[..n].to_vec());
            }

            if !self.pending.is_empty() || self.buffer.len() >= self.opts.max_buffer {
                self.retain_partial_tail();
                return Ok(());
            }
            if self.has_boundary() {
                return Ok(());
            }
        }
    }

    /// Append `incoming` without exceeding `max_buffer`; overflow is held
    /// as pending, split at a codepoint boundary.
    fn append_bounded(&mut self, incoming: Vec<u8>) {
        let space = self.opts.max_buffer.saturating_sub(self.buffer.len());
        if incoming.len() <= space {
            self.buffer.extend_from_slice(&incoming);
            return;
        }

        let mut cut = floor_char_boundary(&incoming, space);
        if cut == 0 && self.buffer.is_empty() {
            // Malformed input with no boundary in reach; take the bytes
            // as-is rather than stall.
            cut = space.min(incoming.len());
        }
        self.buffer.extend_from_slice(&incoming[..cut]);
        self.pending = incoming[cut..].to_vec();
    }

    /// When the buffer is full but ends mid-sequence, hold the partial
    /// sequence back so tokenization sees whole codepoints.
    fn retain_partial_tail(&mut self) {
        if !self.pending.is_empty() || ends_on_char_boundary(&self.buffer) {
            return;
        }

        let tail_start = self.buffer.len().saturating_sub(4);
        if let Some(rel) = self.buffer[tail_start..]
            .iter()
            .rposition(|&b| b & 0xC0 != 0x80)
        {
            let start = tail_start + rel;
            if start + utf8_len(self.buffer[start]) > self.buffer.len() {
                self.pending = self.buffer.split_off(start);
            }
        }
    }

    /// Is the buffer at a good place to tokenize?
    fn has_boundary(&self) -> bool {
        let Some(&last) = self.buffer.last() else {
            return false;
        };
        if last.is_ascii_whitespace() {
            return true;
        }
        self.buffer.len() > self.opts.read_chunk / 2 && ends_on_char_boundary(&self.buffer)
    }

    /// Encode the buffered chunk and reset the buffer.
    fn tokenize_buffer(&mut self) {
        let text = String::from_utf8_lossy(&self.buffer).into_owned();
        let bos = self.opts.encode.bos && !self.sent_bos;
        self.sent_bos = self.sent_bos || bos;

        self.tokens = self.tokenizer.encode(
            &text,
            &EncodeOptions { bos, eos: false },
        );
        self.chunk_text = text;
        self.buffer.clear();
    }

    fn scan_error(&self, source: std::io::Error) -> ScanError {
        let text = String::from_utf8_lossy(&self.buffer);
        let preview = match text.char_indices().nth(ERROR_PREVIEW_LEN) {
            Some((cut, _)) => format!("{}...", &text[..cut]),
            None => text.into_owned(),
        };
        ScanError {
            offset: self.consumed,
            preview,
            source,
        }
    }
}

/// Is the final byte the end of a complete UTF-8 codepoint?
fn ends_on_char_boundary(buf: &[u8]) -> bool {
    let Some(&last) = buf.last() else {
        return true;
    };
    if last < 0x80 {
        return true;
    }

    let tail_start = buf.len().saturating_sub(4);
    match buf[tail_start..].iter().rposition(|&b| b & 0xC0 != 0x80) {
        Some(rel) => {
            let start = tail_start + rel;
            start + utf8_len(buf[start]) == buf.len()
        }
        // Four continuation bytes in a row: malformed input.
        None => false,
    }
}

/// Largest prefix length of `data` that is at most `max` bytes and does
/// not end inside a multi-byte sequence.
fn floor_char_boundary(data: &[u8], max: usize) -> usize {
    if max >= data.len() {
        return data.len();
    }
    let mut cut = max;
    while cut > 0 && data[cut] & 0xC0 == 0x80 {
        cut -= 1;
    }
    cut
}

/// Sequence length promised by a UTF-8 lead byte.
fn utf8_len(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    }
}
