//! Llama 3 special tokens and chat prompt formatting.
//!
//! Llama 3 ships a 128,000-entry tiktoken merge table and reserves 256
//! special tokens directly after it, so `<|begin_of_text|>` is id 128000 and
//! `<|eot_id|>` is id 128009. The order of [`llama3_special_literals`] is part
//! of the model's contract.
//!
//! # Example
//!
//! ```rust
//! use corebpe::llama3::{format_chat_prompt, llama3_special_literals};
//!
//! let literals = llama3_special_literals(256);
//! assert_eq!(literals[9], "<|eot_id|>");
//!
//! let prompt = format_chat_prompt("Be brief.", "Hi!");
//! assert!(prompt.starts_with("<|begin_of_text|><|start_header_id|>system"));
//! ```

use std::fmt;

use super::tokenizer::{Tokenizer, TokenizerError};
use super::vocab::{TokenId, Vocabulary};

pub const BEGIN_OF_TEXT: &str = "<|begin_of_text|>";
pub const END_OF_TEXT: &str = "<|end_of_text|>";
pub const START_HEADER_ID: &str = "<|start_header_id|>";
pub const END_HEADER_ID: &str = "<|end_header_id|>";
pub const EOT_ID: &str = "<|eot_id|>";

/// Number of special-token slots reserved after the merge table.
pub const NUM_RESERVED_SPECIAL_TOKENS: usize = 256;

/// Named tokens occupy ten slots; reserved tokens 0..=4 are interleaved.
const NAMED_SLOTS: usize = 10;

fn reserved(index: usize) -> String {
    format!("<|reserved_special_token_{index}|>")
}

/// The ordered special-token list for `num_reserved` slots.
///
/// The first ten entries are fixed. The rest are
/// `<|reserved_special_token_5|>` onwards, filling the remaining slots, so the
/// list has `num_reserved` entries (at least ten).
pub fn llama3_special_literals(num_reserved: usize) -> Vec<String> {
    let mut literals = vec![
        BEGIN_OF_TEXT.to_string(),
        END_OF_TEXT.to_string(),
        reserved(0),
        reserved(1),
        reserved(2),
        reserved(3),
        START_HEADER_ID.to_string(),
        END_HEADER_ID.to_string(),
        reserved(4),
        EOT_ID.to_string(),
    ];
    literals.extend((5..num_reserved.saturating_sub(NAMED_SLOTS - 5)).map(reserved));
    literals
}

/// Build a tokenizer with the default Llama 3 special tokens.
pub fn llama3_tokenizer(vocab: Vocabulary) -> Result<Tokenizer, TokenizerError> {
    Tokenizer::new(vocab, llama3_special_literals(NUM_RESERVED_SPECIAL_TOKENS))
}

/// Ids that end generation: `<|end_of_text|>` and `<|eot_id|>`.
pub fn stop_token_ids(tokenizer: &Tokenizer) -> Vec<TokenId> {
    [END_OF_TEXT, EOT_ID]
        .into_iter()
        .filter_map(|literal| tokenizer.special_token_id(literal))
        .collect()
}

/// Whether `id` is `<|end_of_text|>` or `<|eot_id|>`.
pub fn is_stop_token(tokenizer: &Tokenizer, id: TokenId) -> bool {
    tokenizer
        .special_tokens()
        .literal(id)
        .is_some_and(|literal| literal == END_OF_TEXT || literal == EOT_ID)
}

/// Generated ids up to (not including) the first stop token.
pub fn truncate_at_stop<'a>(tokenizer: &Tokenizer, ids: &'a [TokenId]) -> &'a [TokenId] {
    let end = ids
        .iter()
        .position(|&id| is_stop_token(tokenizer, id))
        .unwrap_or(ids.len());
    &ids[..end]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Name used inside the header markers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of a dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

fn push_header(out: &mut String, role: Role) {
    out.push_str(START_HEADER_ID);
    out.push_str(role.as_str());
    out.push_str(END_HEADER_ID);
    out.push_str("\n\n");
}

/// Render a dialog and open an assistant turn for the model to complete.
pub fn format_dialog(messages: &[ChatMessage]) -> String {
    let mut out = String::from(BEGIN_OF_TEXT);
    for message in messages {
        push_header(&mut out, message.role);
        out.push_str(&message.content);
        out.push_str(EOT_ID);
    }
    push_header(&mut out, Role::Assistant);
    out
}

/// Single-turn prompt: one system message and one user message.
pub fn format_chat_prompt(system: &str, user: &str) -> String {
    format_dialog(&[ChatMessage::system(system), ChatMessage::user(user)])
}
