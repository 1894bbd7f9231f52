//! Core tokenization engine for corebpe.
//!
//! # Architecture
//!
//! Encoding runs the input through these components in order:
//!
//! - [`SpecialSplitter`]: Aho-Corasick split around special-token literals,
//!   longest literal first
//! - [`PreTokenizer`]: regex segmentation of ordinary text into chunks
//!   (fancy-regex, or PCRE2 with the `pcre2` feature)
//! - [`bpe`]: greedy rank-ordered byte-pair merge of one chunk
//! - [`Vocabulary`] and [`SpecialTokens`]: id lookup in both directions
//!
//! [`Tokenizer`] owns all of them and adds an LRU chunk cache, rayon batch
//! APIs and [`TokenizerStats`] counters for the never-fail fallbacks.
//!
//! Around the tokenizer:
//!
//! - [`StreamingDecoder`]: incremental UTF-8 safe decoding of generated ids
//! - [`llama3`]: Llama 3 special tokens and chat prompt formatting
//! - [`cache`]: read-through file cache for vocabulary files

pub mod bpe;
pub mod cache;
pub mod llama3;
mod pretokenizer;
mod special;
mod splitter;
mod stats;
mod streaming;
mod tokenizer;
mod vocab;

pub use bpe::{byte_pair_merge, byte_pair_split, RankLookup};
pub use cache::{load_tiktoken_bpe_cached, read_file_cached, VocabCache};
pub use pretokenizer::{Chunks, PreTokenizer, CL100K_BASE_PATTERN, LLAMA3_PATTERN};
pub use special::SpecialTokens;
pub use splitter::{split_special, Segment, SpecialSplitter};
pub use stats::{StatsSnapshot, TokenizerStats};
pub use streaming::StreamingDecoder;
pub use tokenizer::{
    Encoding, Tokenizer, TokenizerError, TokenizerOptions, UnknownPolicy, WhitespacePolicy,
    DEFAULT_CACHE_SIZE,
};
pub use vocab::{
    load_tiktoken_bpe, load_tiktoken_bpe_file, Rank, TokenId, VocabError, Vocabulary,
};
