//! Vocabulary loading utilities for tiktoken BPE format.
//!
//! A merge table is a plain text file where each line contains:
//! - A base64-encoded token (the raw byte sequence)
//! - A space separator
//! - A decimal rank (the token's priority in BPE merging, doubling as its id)
//!
//! Lower ranks indicate higher priority: tokens with lower ranks were learned
//! earlier during training and are merged first during encoding.
//!
//! # Example Format
//!
//! ```text
//! SGVsbG8= 0
//! V29ybGQ= 1
//! IQ== 2
//! ```
//!
//! # Malformed Lines
//!
//! Loading is lenient. A line that does not split into exactly two
//! space-separated fields, whose first field is not valid base64, or whose
//! second field is not a non-negative integer is skipped and counted (see
//! [`Vocabulary::skipped_lines`]). Blank lines are ignored and a trailing
//! `\r` is stripped.
//!
//! # Duplicate Keys
//!
//! When the same byte sequence appears on more than one line the last line
//! wins. The inverse map forgets the overwritten rank so that
//! `bytes(rank(x)) == x` holds for every key that survives.

use std::collections::hash_map;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Merge priority of a byte sequence. Lower merges first.
pub type Rank = u32;

/// Integer id of a mergeable byte sequence or a special token.
///
/// For mergeable entries the id equals the rank.
pub type TokenId = u32;

/// Errors that can occur when reading vocabulary files.
#[derive(Error, Debug)]
pub enum VocabError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Immutable byte-sequence ↔ rank mapping built from a merge table.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    encoder: FxHashMap<Vec<u8>, Rank>,
    decoder: FxHashMap<Rank, Vec<u8>>,
    skipped_lines: usize,
}

impl Vocabulary {
    /// Build a vocabulary from an in-memory `bytes -> rank` map.
    ///
    /// If several keys share one rank, the inverse map keeps the
    /// lexicographically greatest key so that the result is deterministic.
    pub fn from_ranks(ranks: FxHashMap<Vec<u8>, Rank>) -> Self {
        let mut entries: Vec<(&Vec<u8>, &Rank)> = ranks.iter().collect();
        entries.sort_unstable_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));

        let decoder = entries
            .into_iter()
            .map(|(bytes, &rank)| (rank, bytes.clone()))
            .collect();

        Self {
            encoder: ranks,
            decoder,
            skipped_lines: 0,
        }
    }

    /// Look up the rank (= token id) of a byte sequence.
    #[inline]
    pub fn rank(&self, bytes: &[u8]) -> Option<Rank> {
        self.encoder.get(bytes).copied()
    }

    /// Look up the byte sequence of a token id.
    #[inline]
    pub fn bytes(&self, id: TokenId) -> Option<&[u8]> {
        self.decoder.get(&id).map(Vec::as_slice)
    }

    /// Number of distinct mergeable byte sequences.
    ///
    /// This is the base id for special tokens (see
    /// [`SpecialTokens::for_vocabulary`](super::SpecialTokens::for_vocabulary)).
    pub fn len(&self) -> usize {
        self.encoder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoder.is_empty()
    }

    /// Highest rank present, if any.
    pub fn max_rank(&self) -> Option<Rank> {
        self.decoder.keys().max().copied()
    }

    /// Number of malformed lines skipped while parsing.
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    /// Iterate over `(bytes, rank)` entries in arbitrary order.
    pub fn iter(&self) -> hash_map::Iter<'_, Vec<u8>, Rank> {
        self.encoder.iter()
    }

    /// Get the encoder map (token bytes -> rank).
    pub fn encoder(&self) -> &FxHashMap<Vec<u8>, Rank> {
        &self.encoder
    }

    /// Get the decoder map (rank -> token bytes).
    pub fn decoder(&self) -> &FxHashMap<Rank, Vec<u8>> {
        &self.decoder
    }

    fn insert(&mut self, token: Vec<u8>, rank: Rank) {
        if let Some(old) = self.encoder.insert(token.clone(), rank) {
            if old != rank && self.decoder.get(&old).is_some_and(|b| *b == token) {
                self.decoder.remove(&old);
            }
        }
        self.decoder.insert(rank, token);
    }
}

/// Parse one `"<base64> <rank>"` line.
fn parse_line(line: &[u8]) -> Option<(Vec<u8>, Rank)> {
    let mut fields = line.split(|&b| b == b' ').filter(|f| !f.is_empty());
    let token_b64 = fields.next()?;
    let rank_field = fields.next()?;
    if fields.next().is_some() {
        return None;
    }

    let token = STANDARD.decode(token_b64).ok()?;
    let rank = std::str::from_utf8(rank_field).ok()?.parse::<Rank>().ok()?;
    Some((token, rank))
}

/// Load a tiktoken BPE vocabulary from raw bytes.
///
/// Never fails: malformed lines are skipped and counted.
pub fn load_tiktoken_bpe(data: &[u8]) -> Vocabulary {
    let mut vocab = Vocabulary::default();

    for (index, line) in data.split(|&b| b == b'\n').enumerate() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }

        match parse_line(line) {
            Some((token, rank)) => vocab.insert(token, rank),
            None => {
                vocab.skipped_lines += 1;
                log::debug!("skipping malformed vocabulary line {}", index + 1);
            }
        }
    }

    if vocab.skipped_lines > 0 {
        log::warn!(
            "vocabulary loaded with {} entries, {} malformed lines skipped",
            vocab.len(),
            vocab.skipped_lines
        );
    } else {
        log::debug!("vocabulary loaded with {} entries", vocab.len());
    }

    vocab
}

/// Load a tiktoken BPE vocabulary from a file path.
pub fn load_tiktoken_bpe_file(path: impl AsRef<Path>) -> Result<Vocabulary, VocabError> {
    let data = std::fs::read(path.as_ref())?;
    Ok(load_tiktoken_bpe(&data))
}
