//! corebpe - byte-level BPE tokenizer for tiktoken-format merge tables
//!
//! Converts UTF-8 text into sub-word pieces and integer ids for a transformer
//! language model, and generated ids back into text:
//! - tiktoken vocabulary loading with lenient line parsing
//! - special tokens with contiguous ids after the merge table
//! - cl100k-style regex pre-tokenization
//! - greedy rank-ordered byte-pair merging with an LRU chunk cache
//! - encode and decode that degrade to defined fallbacks instead of failing
//! - UTF-8 streaming decoder for token-by-token output
//! - Llama 3 special tokens and chat prompt formatting
//!
//! ```
//! use corebpe::{load_tiktoken_bpe, Tokenizer};
//!
//! // "h", "i", "hi"
//! let vocab = load_tiktoken_bpe(b"aA== 0\naQ== 1\naGk= 2\n");
//! let tokenizer = Tokenizer::new(vocab, ["<|eot_id|>"]).unwrap();
//!
//! let ids = tokenizer.encode_ids("hi<|eot_id|>");
//! assert_eq!(ids, vec![2, 3]);
//! assert_eq!(tokenizer.decode(&ids), "hi<|eot_id|>");
//! ```

pub mod core;

pub use crate::core::{
    llama3, load_tiktoken_bpe, load_tiktoken_bpe_file, Encoding, Segment, SpecialTokens,
    StatsSnapshot, StreamingDecoder, TokenId, Tokenizer, TokenizerError, TokenizerOptions,
    UnknownPolicy, VocabError, Vocabulary, WhitespacePolicy, CL100K_BASE_PATTERN,
    LLAMA3_PATTERN,
};
