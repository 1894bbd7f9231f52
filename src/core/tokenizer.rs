use std::num::NonZeroUsize;
use std::ops::Range;
use std::path::Path;
use std::sync::Mutex;

use lru::LruCache;
use rayon::prelude::*;
use thiserror::Error;

use super::bpe::byte_pair_merge;
use super::pretokenizer::{PreTokenizer, CL100K_BASE_PATTERN};
use super::special::SpecialTokens;
use super::splitter::SpecialSplitter;
use super::stats::{StatsSnapshot, TokenizerStats};
use super::vocab::{load_tiktoken_bpe, load_tiktoken_bpe_file, TokenId, VocabError, Vocabulary};

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("Regex compilation error (fancy-regex): {0}")]
    RegexError(#[from] fancy_regex::Error),
    #[cfg(feature = "pcre2")]
    #[error("Regex compilation error (PCRE2): {0}")]
    Pcre2Error(#[from] pcre2::Error),
    #[error("Vocabulary error: {0}")]
    VocabError(#[from] VocabError),
    #[error("Aho-Corasick build error: {0}")]
    AhoCorasickError(#[from] aho_corasick::BuildError),
    #[error("PCRE2 feature not enabled. Compile with --features pcre2")]
    Pcre2NotEnabled,
}

/// Default number of chunk merges kept in the LRU cache.
pub const DEFAULT_CACHE_SIZE: usize = 4096;

/// What to do with ordinary segments made only of blank characters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WhitespacePolicy {
    /// Skip segments consisting only of spaces and tabs (any Unicode space
    /// separator). Segments containing a line break are still encoded.
    #[default]
    DropBlank,
    /// Encode every segment.
    Keep,
}

/// Id emitted for a piece that has no vocabulary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownPolicy {
    /// A fixed id. The default is `Sentinel(0)`, which can collide with a
    /// real rank-0 entry.
    Sentinel(TokenId),
    /// `vocab_size()`, one past every valid id.
    OutOfBand,
}

impl Default for UnknownPolicy {
    fn default() -> Self {
        UnknownPolicy::Sentinel(0)
    }
}

/// Construction options for [`Tokenizer`].
#[derive(Debug, Clone)]
pub struct TokenizerOptions {
    /// Pre-tokenizer split pattern.
    pub pattern: String,
    /// LRU capacity in chunks. `0` disables the cache.
    pub cache_size: usize,
    pub whitespace: WhitespacePolicy,
    pub unknown: UnknownPolicy,
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        Self {
            pattern: CL100K_BASE_PATTERN.to_string(),
            cache_size: DEFAULT_CACHE_SIZE,
            whitespace: WhitespacePolicy::default(),
            unknown: UnknownPolicy::default(),
        }
    }
}

/// Result of [`Tokenizer::encode`]: parallel lists of pieces and ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Encoding {
    pieces: Vec<Vec<u8>>,
    ids: Vec<TokenId>,
}

impl Encoding {
    fn push(&mut self, piece: &[u8], id: TokenId) {
        self.pieces.push(piece.to_vec());
        self.ids.push(id);
    }

    /// Byte sequence of every piece, in input order.
    pub fn pieces(&self) -> &[Vec<u8>] {
        &self.pieces
    }

    /// Id of every piece, parallel to [`pieces`](Self::pieces).
    pub fn ids(&self) -> &[TokenId] {
        &self.ids
    }

    /// Split into `(pieces, ids)`.
    pub fn into_parts(self) -> (Vec<Vec<u8>>, Vec<TokenId>) {
        (self.pieces, self.ids)
    }

    /// Keep only the ids.
    pub fn into_ids(self) -> Vec<TokenId> {
        self.ids
    }

    /// Number of pieces.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

type ChunkCache = Mutex<LruCache<Vec<u8>, Vec<Range<usize>>>>;

/// Byte-level BPE tokenizer over a tiktoken vocabulary.
///
/// Encoding pipeline:
///
/// 1. split the input around special-token literals (longest literal wins)
/// 2. emit each special literal as one piece with its registered id
/// 3. pre-tokenize every ordinary segment into chunks
/// 4. merge each chunk with greedy rank-ordered BPE
/// 5. look up the id of each resulting piece
///
/// Encoding and decoding never fail. Unknown pieces map to the configured
/// [`UnknownPolicy`] id, unknown ids are dropped and invalid UTF-8 decodes to
/// an empty string. Every such fallback is counted in [`Tokenizer::stats`].
///
/// A `Tokenizer` is immutable after construction and can be shared across
/// threads. The only interior state is the chunk cache and the counters,
/// neither of which affects results.
///
/// # Example
/// ```
/// use corebpe::{load_tiktoken_bpe, Tokenizer};
///
/// // "a", "b", "ab"
/// let vocab = load_tiktoken_bpe(b"YQ== 0\nYg== 1\nYWI= 2\n");
/// let tokenizer = Tokenizer::new(vocab, ["<|eot|>"]).unwrap();
///
/// let encoding = tokenizer.encode("ab<|eot|>");
/// assert_eq!(encoding.ids(), &[2, 3]);
/// assert_eq!(tokenizer.decode(encoding.ids()), "ab<|eot|>");
/// ```
pub struct Tokenizer {
    vocab: Vocabulary,
    special: SpecialTokens,
    splitter: SpecialSplitter,
    pretokenizer: PreTokenizer,
    chunk_cache: Option<ChunkCache>,
    options: TokenizerOptions,
    unknown_id: TokenId,
    shadowed_specials: Vec<TokenId>,
    stats: TokenizerStats,
}

impl Tokenizer {
    /// Create a tokenizer with default options.
    ///
    /// The literal at index `i` of `special_literals` gets id
    /// `vocab.len() + i`.
    pub fn new<I, S>(vocab: Vocabulary, special_literals: I) -> Result<Self, TokenizerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_options(vocab, special_literals, TokenizerOptions::default())
    }

    /// Create a tokenizer with explicit options.
    pub fn with_options<I, S>(
        vocab: Vocabulary,
        special_literals: I,
        options: TokenizerOptions,
    ) -> Result<Self, TokenizerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let special = SpecialTokens::for_vocabulary(&vocab, special_literals);
        Self::from_parts(vocab, special, options)
    }

    /// Create a tokenizer from an already built special-token registry.
    ///
    /// A special id that is also a vocabulary rank decodes to the vocabulary
    /// bytes. Such ids are logged and listed by
    /// [`shadowed_special_ids`](Self::shadowed_special_ids).
    pub fn from_parts(
        vocab: Vocabulary,
        special: SpecialTokens,
        options: TokenizerOptions,
    ) -> Result<Self, TokenizerError> {
        let pretokenizer = PreTokenizer::new(&options.pattern)?;
        let splitter = SpecialSplitter::new(special.literals())?;
        let chunk_cache =
            NonZeroUsize::new(options.cache_size).map(|n| Mutex::new(LruCache::new(n)));
        let shadowed_specials = shadowed_special_ids(&vocab, &special);

        let mut tokenizer = Self {
            vocab,
            special,
            splitter,
            pretokenizer,
            chunk_cache,
            options,
            unknown_id: 0,
            shadowed_specials,
            stats: TokenizerStats::default(),
        };
        tokenizer.unknown_id = tokenizer.resolve_unknown_id();

        log::debug!(
            "tokenizer ready: {} ranks, {} special tokens, {} backend",
            tokenizer.vocab.len(),
            tokenizer.special.len(),
            tokenizer.pretokenizer.backend_name()
        );
        Ok(tokenizer)
    }

    /// Create a tokenizer from a tiktoken vocabulary file.
    pub fn from_file<I, S>(
        vocab_path: impl AsRef<Path>,
        special_literals: I,
    ) -> Result<Self, TokenizerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let vocab = load_tiktoken_bpe_file(vocab_path)?;
        Self::new(vocab, special_literals)
    }

    /// Create a tokenizer from raw tiktoken vocabulary bytes.
    pub fn from_bytes<I, S>(vocab_data: &[u8], special_literals: I) -> Result<Self, TokenizerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(load_tiktoken_bpe(vocab_data), special_literals)
    }

    /// Set the whitespace policy.
    pub fn whitespace_policy(mut self, policy: WhitespacePolicy) -> Self {
        self.options.whitespace = policy;
        self
    }

    /// Set the unknown-piece policy.
    pub fn unknown_policy(mut self, policy: UnknownPolicy) -> Self {
        self.options.unknown = policy;
        self.unknown_id = self.resolve_unknown_id();
        self
    }

    /// Switch the pre-tokenizer to the PCRE2 backend (JIT when available).
    ///
    /// # Errors
    /// Returns an error if the `pcre2` feature is not enabled or the pattern
    /// does not compile.
    #[cfg(feature = "pcre2")]
    pub fn pcre2(mut self, use_pcre2: bool) -> Result<Self, TokenizerError> {
        self.pretokenizer = if use_pcre2 {
            PreTokenizer::new_pcre2(&self.options.pattern, true)?
        } else {
            PreTokenizer::new(&self.options.pattern)?
        };
        Ok(self)
    }

    /// Switch to PCRE2 regex backend (stub when feature not enabled).
    #[cfg(not(feature = "pcre2"))]
    pub fn pcre2(self, use_pcre2: bool) -> Result<Self, TokenizerError> {
        if use_pcre2 {
            Err(TokenizerError::Pcre2NotEnabled)
        } else {
            Ok(self)
        }
    }

    fn resolve_unknown_id(&self) -> TokenId {
        match self.options.unknown {
            UnknownPolicy::Sentinel(id) => id,
            UnknownPolicy::OutOfBand => {
                TokenId::try_from(self.vocab_size()).unwrap_or(TokenId::MAX)
            }
        }
    }

    fn unknown_piece(&self, piece: &[u8]) -> TokenId {
        if self.stats.record_unknown_piece() == 0 {
            log::warn!(
                "piece {piece:02x?} has no vocabulary entry, encoding as id {}",
                self.unknown_id
            );
        } else {
            log::debug!("piece {piece:02x?} has no vocabulary entry");
        }
        self.unknown_id
    }

    fn is_blank(text: &str) -> bool {
        text.chars().all(|c| {
            c.is_whitespace()
                && !matches!(
                    c,
                    '\n' | '\r' | '\x0B' | '\x0C' | '\u{85}' | '\u{2028}' | '\u{2029}'
                )
        })
    }

    /// Merge one chunk, consulting the LRU cache.
    fn merge_chunk(&self, chunk: &[u8]) -> Vec<Range<usize>> {
        let Some(cache) = &self.chunk_cache else {
            return byte_pair_merge(chunk, &self.vocab);
        };

        if let Ok(mut cache) = cache.lock() {
            if let Some(cached) = cache.get(chunk) {
                self.stats.record_cache(true);
                return cached.clone();
            }
        }
        self.stats.record_cache(false);

        let result = byte_pair_merge(chunk, &self.vocab);

        if let Ok(mut cache) = cache.lock() {
            cache.put(chunk.to_vec(), result.clone());
        }

        result
    }

    fn encode_segment(&self, text: &str, out: &mut Encoding) {
        if self.options.whitespace == WhitespacePolicy::DropBlank && Self::is_blank(text) {
            return;
        }

        for chunk in self.pretokenizer.chunks(text) {
            let bytes = chunk.as_bytes();
            for range in self.merge_chunk(bytes) {
                let piece = &bytes[range];
                let id = match self.vocab.rank(piece) {
                    Some(rank) => rank,
                    None => self.unknown_piece(piece),
                };
                out.push(piece, id);
            }
        }
    }

    /// Encode text, matching special-token literals.
    pub fn encode(&self, text: &str) -> Encoding {
        let mut encoding = Encoding::default();

        for segment in self.splitter.split(text) {
            let special_id = if segment.is_special {
                self.special.id(segment.text)
            } else {
                None
            };
            match special_id {
                Some(id) => encoding.push(segment.text.as_bytes(), id),
                None => self.encode_segment(segment.text, &mut encoding),
            }
        }

        encoding
    }

    /// Encode text and keep only the ids.
    pub fn encode_ids(&self, text: &str) -> Vec<TokenId> {
        self.encode(text).into_ids()
    }

    /// Encode text as ordinary text; special literals go through BPE.
    pub fn encode_ordinary(&self, text: &str) -> Encoding {
        let mut encoding = Encoding::default();
        if !text.is_empty() {
            self.encode_segment(text, &mut encoding);
        }
        encoding
    }

    /// Batch encode multiple texts in parallel.
    pub fn encode_batch(&self, texts: &[String]) -> Vec<Encoding> {
        texts.par_iter().map(|text| self.encode(text)).collect()
    }

    /// Bytes of a single id: mergeable entries first, then special literals.
    pub fn token_bytes(&self, id: TokenId) -> Option<&[u8]> {
        self.vocab
            .bytes(id)
            .or_else(|| self.special.literal(id).map(str::as_bytes))
    }

    /// Concatenate the bytes of `ids`, dropping unknown ids. Not trimmed.
    pub fn decode_bytes(&self, ids: &[TokenId]) -> Vec<u8> {
        let mut result = Vec::with_capacity(ids.len() * 4);

        for &id in ids {
            match self.token_bytes(id) {
                Some(bytes) => result.extend_from_slice(bytes),
                None => {
                    self.stats.record_dropped_id();
                    log::debug!("dropping unknown token id {id}");
                }
            }
        }

        result
    }

    /// Decode ids to text.
    ///
    /// Unknown ids are dropped, invalid UTF-8 yields an empty string, and the
    /// result is trimmed of leading and trailing whitespace.
    ///
    /// Each call decodes the whole sequence, so re-decoding a growing prefix
    /// once per generated token costs O(n²) over a generation. Use
    /// [`StreamingDecoder`](super::StreamingDecoder) for incremental output.
    pub fn decode(&self, ids: &[TokenId]) -> String {
        match String::from_utf8(self.decode_bytes(ids)) {
            Ok(text) => trim_owned(text),
            Err(e) => {
                self.stats.record_invalid_utf8();
                log::warn!("decoded bytes are not valid UTF-8: {}", e.utf8_error());
                String::new()
            }
        }
    }

    /// Decode ids to text, replacing invalid UTF-8 with U+FFFD. Trimmed.
    pub fn decode_lossy(&self, ids: &[TokenId]) -> String {
        let bytes = self.decode_bytes(ids);
        String::from_utf8_lossy(&bytes).trim().to_string()
    }

    /// Batch decode multiple id lists in parallel.
    pub fn decode_batch(&self, id_lists: &[Vec<TokenId>]) -> Vec<String> {
        id_lists.par_iter().map(|ids| self.decode(ids)).collect()
    }

    /// Number of id slots: highest mergeable or special id plus one.
    pub fn vocab_size(&self) -> usize {
        self.vocab
            .max_rank()
            .into_iter()
            .chain(self.special.max_id())
            .max()
            .map_or(0, |max_id| max_id as usize + 1)
    }

    /// The mergeable vocabulary.
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// The special-token registry.
    pub fn special_tokens(&self) -> &SpecialTokens {
        &self.special
    }

    /// Id of a special literal, if registered.
    pub fn special_token_id(&self, literal: &str) -> Option<TokenId> {
        self.special.id(literal)
    }

    /// Special ids that collide with a vocabulary rank, ascending.
    ///
    /// Encoding still emits these ids for their literals, but decoding them
    /// yields the vocabulary bytes. Empty for a dense tiktoken vocabulary.
    pub fn shadowed_special_ids(&self) -> &[TokenId] {
        &self.shadowed_specials
    }

    /// Id used for pieces without a vocabulary entry.
    pub fn unknown_id(&self) -> TokenId {
        self.unknown_id
    }

    /// Options the tokenizer was built with.
    pub fn options(&self) -> &TokenizerOptions {
        &self.options
    }

    pub fn pretokenizer(&self) -> &PreTokenizer {
        &self.pretokenizer
    }

    /// Snapshot of the fallback and cache counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Zero the fallback and cache counters.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Clear the encoding cache.
    pub fn clear_cache(&self) {
        if let Some(Ok(mut cache)) = self.chunk_cache.as_ref().map(Mutex::lock) {
            cache.clear();
        }
    }

    /// Number of cached chunks.
    pub fn cache_len(&self) -> usize {
        match self.chunk_cache.as_ref().map(Mutex::lock) {
            Some(Ok(cache)) => cache.len(),
            _ => 0,
        }
    }
}

/// Special ids that also name a vocabulary entry.
fn shadowed_special_ids(vocab: &Vocabulary, special: &SpecialTokens) -> Vec<TokenId> {
    let mut shadowed: Vec<TokenId> = special
        .decoder()
        .keys()
        .copied()
        .filter(|&id| vocab.bytes(id).is_some())
        .collect();
    shadowed.sort_unstable();

    for &id in &shadowed {
        log::warn!(
            "special token {:?} has id {id}, which is also a vocabulary rank; \
             decoding {id} yields the vocabulary bytes",
            special.literal(id).unwrap_or_default()
        );
    }
    shadowed
}

fn trim_owned(text: String) -> String {
    let trimmed = text.trim();
    if trimmed.len() == text.len() {
        text
    } else {
        trimmed.to_string()
    }
}

impl Clone for Tokenizer {
    /// Clones share nothing mutable: the cache starts empty and the counters
    /// at zero.
    fn clone(&self) -> Self {
        let chunk_cache =
            NonZeroUsize::new(self.options.cache_size).map(|n| Mutex::new(LruCache::new(n)));

        Self {
            vocab: self.vocab.clone(),
            special: self.special.clone(),
            splitter: self.splitter.clone(),
            pretokenizer: self.pretokenizer.clone(),
            chunk_cache,
            options: self.options.clone(),
            unknown_id: self.unknown_id,
            shadowed_specials: self.shadowed_specials.clone(),
            stats: TokenizerStats::default(),
        }
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("vocab_len", &self.vocab.len())
            .field("special_tokens", &self.special.len())
            .field("pretokenizer", &self.pretokenizer)
            .field("options", &self.options)
            .field("unknown_id", &self.unknown_id)
            .finish()
    }
}
