//! UTF-8 safe streaming decoder for token-by-token LLM output.
//!
//! Re-decoding the whole generated prefix after every token is quadratic over
//! a generation. This decoder instead keeps only the bytes of a character that
//! is still incomplete and emits everything else as soon as it arrives.

use super::tokenizer::Tokenizer;
use super::vocab::TokenId;

/// A streaming decoder that handles incomplete UTF-8 sequences across token boundaries.
///
/// A token's bytes may end in the middle of a multi-byte character. Such a
/// tail is buffered until the next token completes it. Bytes that can never
/// form a valid character are emitted as U+FFFD, so the concatenation of all
/// outputs plus [`flush`](Self::flush) equals a lossy decode of the whole id
/// sequence (before trimming).
///
/// # Example
///
/// ```
/// use corebpe::{StreamingDecoder, Tokenizer, Vocabulary};
///
/// let ranks = (0..=255u8).map(|b| (vec![b], b as u32)).collect();
/// let tokenizer = Tokenizer::new(Vocabulary::from_ranks(ranks), Vec::<String>::new()).unwrap();
/// let mut decoder = StreamingDecoder::new(&tokenizer);
///
/// // "é" is 0xC3 0xA9
/// assert_eq!(decoder.add_token(0xC3), None);
/// assert_eq!(decoder.add_token(0xA9), Some("é".to_string()));
/// assert_eq!(decoder.flush(), "");
/// ```
pub struct StreamingDecoder<'a> {
    tokenizer: &'a Tokenizer,
    buffer: Vec<u8>,
}

impl<'a> StreamingDecoder<'a> {
    /// Create a decoder with an empty buffer.
    pub fn new(tokenizer: &'a Tokenizer) -> Self {
        Self {
            tokenizer,
            buffer: Vec::with_capacity(16),
        }
    }

    /// Add a token and return any complete UTF-8 characters.
    ///
    /// Unknown ids are ignored.
    pub fn add_token(&mut self, token_id: TokenId) -> Option<String> {
        self.push(token_id);
        self.drain_complete()
    }

    /// Add multiple tokens at once and return complete UTF-8 characters.
    pub fn add_tokens(&mut self, token_ids: &[TokenId]) -> Option<String> {
        for &token_id in token_ids {
            self.push(token_id);
        }
        self.drain_complete()
    }

    /// Flush any remaining buffered bytes.
    ///
    /// An incomplete trailing sequence becomes U+FFFD.
    pub fn flush(&mut self) -> String {
        if self.buffer.is_empty() {
            return String::new();
        }

        let result = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        result
    }

    /// Discard any buffered bytes.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Whether an incomplete UTF-8 tail is buffered.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn push(&mut self, token_id: TokenId) {
        match self.tokenizer.token_bytes(token_id) {
            Some(bytes) => self.buffer.extend_from_slice(bytes),
            None => log::debug!("streaming decoder ignoring unknown token id {token_id}"),
        }
    }

    /// Take every decodable byte off the front of the buffer.
    ///
    /// Stops at an incomplete sequence at the end of the buffer, which may
    /// still be completed by later tokens.
    fn drain_complete(&mut self) -> Option<String> {
        let mut out = String::new();
        let mut consumed = 0;

        while consumed < self.buffer.len() {
            let rest = &self.buffer[consumed..];
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    consumed = self.buffer.len();
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&rest[..valid]));
                    match e.error_len() {
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            consumed += valid + invalid;
                        }
                        None => {
                            consumed += valid;
                            break;
                        }
                    }
                }
            }
        }

        self.buffer.drain(..consumed);
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }
}
