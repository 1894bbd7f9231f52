//! Special token registry.
//!
//! Special tokens are reserved literal strings (role markers, end-of-turn
//! markers, ...) that bypass BPE and map straight to a dedicated id. For a
//! pre-trained tiktoken vocabulary the ids are assigned contiguously right
//! after the mergeable range: the literal at index `i` of the configured list
//! gets id `vocabulary.len() + i`. Interoperability with the model depends on
//! reproducing that rule exactly, including list order.

use rustc_hash::FxHashMap;

use super::vocab::{TokenId, Vocabulary};

/// Literal string ↔ id mapping for special tokens.
#[derive(Debug, Clone, Default)]
pub struct SpecialTokens {
    literals: Vec<String>,
    ids: FxHashMap<String, TokenId>,
    decoder: FxHashMap<TokenId, String>,
}

impl SpecialTokens {
    /// Assign `base + index` to each literal in list order.
    ///
    /// A literal listed twice keeps the id of its last occurrence; every
    /// occurrence still consumes an index so the other literals keep their
    /// positional ids. Empty literals consume an index but are not registered.
    pub fn from_literals<I, S>(base: TokenId, literals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut special = Self::default();

        for (index, literal) in literals.into_iter().enumerate() {
            let literal = literal.into();
            let Some(id) = u32::try_from(index)
                .ok()
                .and_then(|index| base.checked_add(index))
            else {
                log::warn!("special token id overflow at index {index}, ignoring the rest");
                break;
            };

            if literal.is_empty() {
                log::warn!("ignoring empty special token literal at index {index}");
                continue;
            }

            special.insert(literal, id);
        }

        special
    }

    /// Assign ids starting at `vocab.len()`.
    pub fn for_vocabulary<I, S>(vocab: &Vocabulary, literals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let base = u32::try_from(vocab.len()).unwrap_or(TokenId::MAX);
        Self::from_literals(base, literals)
    }

    /// Build from an explicit `literal -> id` map.
    ///
    /// Literal order (used for [`literals`](Self::literals)) follows ascending id.
    pub fn from_map(map: FxHashMap<String, TokenId>) -> Self {
        let mut entries: Vec<(String, TokenId)> =
            map.into_iter().filter(|(k, _)| !k.is_empty()).collect();
        entries.sort_unstable_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let mut special = Self::default();
        for (literal, id) in entries {
            special.insert(literal, id);
        }
        special
    }

    fn insert(&mut self, literal: String, id: TokenId) {
        if !self.ids.contains_key(&literal) {
            self.literals.push(literal.clone());
        }
        self.decoder.insert(id, literal.clone());
        self.ids.insert(literal, id);
    }

    /// Get the `literal -> id` map.
    pub fn ids(&self) -> &FxHashMap<String, TokenId> {
        &self.ids
    }

    /// Get the `id -> literal` map.
    pub fn decoder(&self) -> &FxHashMap<TokenId, String> {
        &self.decoder
    }

    /// Id of `literal`, if registered.
    #[inline]
    pub fn id(&self, literal: &str) -> Option<TokenId> {
        self.ids.get(literal).copied()
    }

    /// Literal registered under `id`.
    #[inline]
    pub fn literal(&self, id: TokenId) -> Option<&str> {
        self.decoder.get(&id).map(String::as_str)
    }

    /// Registered literals, distinct, in first-seen order.
    pub fn literals(&self) -> &[String] {
        &self.literals
    }

    /// Number of distinct registered literals.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Highest assigned id, if any.
    pub fn max_id(&self) -> Option<TokenId> {
        self.decoder.keys().max().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vocab::load_tiktoken_bpe;

    #[test]
    fn test_contiguous_assignment() {
        let special = SpecialTokens::from_literals(100, ["<|a|>", "<|b|>", "<|c|>"]);
        assert_eq!(special.id("<|a|>"), Some(100));
        assert_eq!(special.id("<|b|>"), Some(101));
        assert_eq!(special.id("<|c|>"), Some(102));
        assert_eq!(special.literal(101), Some("<|b|>"));
        assert_eq!(special.max_id(), Some(102));
    }

    #[test]
    fn test_base_is_vocabulary_size() {
        let vocab = load_tiktoken_bpe(b"YQ== 0\nYg== 1\nYw== 2\n");
        let special = SpecialTokens::for_vocabulary(&vocab, ["<|eot|>"]);
        assert_eq!(special.id("<|eot|>"), Some(3));
    }

    #[test]
    fn test_duplicate_literal_keeps_last_index() {
        let special = SpecialTokens::from_literals(10, ["<|x|>", "<|y|>", "<|x|>"]);
        assert_eq!(special.id("<|x|>"), Some(12));
        assert_eq!(special.id("<|y|>"), Some(11));
        assert_eq!(special.literals(), ["<|x|>", "<|y|>"]);
        assert_eq!(special.len(), 2);
    }

    #[test]
    fn test_empty_literal_consumes_index() {
        let special = SpecialTokens::from_literals(0, ["", "<|y|>"]);
        assert_eq!(special.len(), 1);
        assert_eq!(special.id("<|y|>"), Some(1));
    }

    #[test]
    fn test_from_map_orders_by_id() {
        let mut map = FxHashMap::default();
        map.insert("<|late|>".to_string(), 9);
        map.insert("<|early|>".to_string(), 4);

        let special = SpecialTokens::from_map(map);
        assert_eq!(special.literals(), ["<|early|>", "<|late|>"]);
        assert_eq!(special.literal(9), Some("<|late|>"));
    }
}
