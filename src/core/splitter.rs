//! Splitting text around special-token literals.
//!
//! All literals are compiled into one Aho-Corasick automaton with
//! leftmost-first semantics over the literals sorted by descending length.
//! This matches an escaped regex alternation `long|...|short`: at the
//! leftmost matching position the longest literal wins, so a literal that
//! is a prefix of another can never cut the longer one short.

use aho_corasick::{AhoCorasick, MatchKind};

/// A run of input text tagged as either a special literal or ordinary text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub text: &'a str,
    pub is_special: bool,
}

impl<'a> Segment<'a> {
    pub fn ordinary(text: &'a str) -> Self {
        Self {
            text,
            is_special: false,
        }
    }

    pub fn special(text: &'a str) -> Self {
        Self {
            text,
            is_special: true,
        }
    }
}

/// Longest-first special literal matcher.
#[derive(Debug, Clone)]
pub struct SpecialSplitter {
    matcher: Option<AhoCorasick>,
    literals: Vec<String>,
}

impl SpecialSplitter {
    /// Build a splitter for the given literals.
    ///
    /// Empty and repeated literals are ignored. Ties in length keep the
    /// original relative order.
    pub fn new<S: AsRef<str>>(literals: &[S]) -> Result<Self, aho_corasick::BuildError> {
        let mut sorted: Vec<String> = Vec::with_capacity(literals.len());
        for literal in literals {
            let literal = literal.as_ref();
            if !literal.is_empty() && !sorted.iter().any(|l| l == literal) {
                sorted.push(literal.to_string());
            }
        }
        sorted.sort_by(|a, b| b.len().cmp(&a.len()));

        let matcher = if sorted.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::builder()
                    .match_kind(MatchKind::LeftmostFirst)
                    .build(&sorted)?,
            )
        };

        Ok(Self {
            matcher,
            literals: sorted,
        })
    }

    /// Literals in match priority order (longest first).
    pub fn literals(&self) -> &[String] {
        &self.literals
    }

    /// Split `text` into ordinary and special segments.
    ///
    /// The segments concatenate back to `text` exactly. Empty input yields
    /// no segments.
    pub fn split<'a>(&self, text: &'a str) -> Vec<Segment<'a>> {
        let mut segments = Vec::new();
        if text.is_empty() {
            return segments;
        }

        let Some(ref matcher) = self.matcher else {
            segments.push(Segment::ordinary(text));
            return segments;
        };

        let mut last_end = 0;
        for m in matcher.find_iter(text) {
            let (start, end) = (m.start(), m.end());
            if start > last_end {
                segments.push(Segment::ordinary(&text[last_end..start]));
            }
            segments.push(Segment::special(&text[start..end]));
            last_end = end;
        }

        if last_end < text.len() {
            segments.push(Segment::ordinary(&text[last_end..]));
        }

        segments
    }
}

/// One-shot split of `text` around `literals`.
///
/// If the automaton cannot be built the whole text is returned as a single
/// ordinary segment.
pub fn split_special<'a, S: AsRef<str>>(text: &'a str, literals: &[S]) -> Vec<Segment<'a>> {
    match SpecialSplitter::new(literals) {
        Ok(splitter) => splitter.split(text),
        Err(e) => {
            log::warn!("special token matcher build failed: {e}");
            if text.is_empty() {
                Vec::new()
            } else {
                vec![Segment::ordinary(text)]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn join(segments: &[Segment<'_>]) -> String {
        segments.iter().map(|s| s.text).collect()
    }

    #[test]
    fn test_split_basic() {
        let segments = split_special("Hello<|eot|>World", &["<|eot|>"]);
        assert_eq!(
            segments,
            vec![
                Segment::ordinary("Hello"),
                Segment::special("<|eot|>"),
                Segment::ordinary("World"),
            ]
        );
    }

    #[test]
    fn test_adjacent_and_edge_matches() {
        let segments = split_special("<|a|><|a|>x<|a|>", &["<|a|>"]);
        assert_eq!(
            segments,
            vec![
                Segment::special("<|a|>"),
                Segment::special("<|a|>"),
                Segment::ordinary("x"),
                Segment::special("<|a|>"),
            ]
        );
    }

    #[test]
    fn test_longest_literal_wins() {
        // "<|end|>" is a prefix of "<|end|>_of_text" and is listed first.
        let literals = ["<|end|>", "<|end|>_of_text"];
        let segments = split_special("a<|end|>_of_textb<|end|>", &literals);
        assert_eq!(
            segments,
            vec![
                Segment::ordinary("a"),
                Segment::special("<|end|>_of_text"),
                Segment::ordinary("b"),
                Segment::special("<|end|>"),
            ]
        );
    }

    #[test]
    fn test_no_literals() {
        let splitter = SpecialSplitter::new::<&str>(&[]).unwrap();
        assert_eq!(splitter.split("plain"), vec![Segment::ordinary("plain")]);
        assert!(splitter.split("").is_empty());
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let segments = split_special("a.b[x]c", &["[x]", "."]);
        assert_eq!(
            segments,
            vec![
                Segment::ordinary("a"),
                Segment::special("."),
                Segment::ordinary("b"),
                Segment::special("[x]"),
                Segment::ordinary("c"),
            ]
        );
    }

    #[test]
    fn test_priority_order() {
        let splitter = SpecialSplitter::new(&["ab", "abcd", "xy", "abc"]).unwrap();
        assert_eq!(splitter.literals(), ["abcd", "abc", "ab", "xy"]);
    }

    proptest! {
        #[test]
        fn prop_segments_cover_input(
            text in "[a-c<|>é ]{0,40}",
            literals in proptest::collection::vec("[a-c<|>é]{1,4}", 0..4),
        ) {
            let segments = split_special(&text, &literals);
            prop_assert_eq!(join(&segments), text.clone());
            for segment in &segments {
                prop_assert!(!segment.text.is_empty());
                if segment.is_special {
                    prop_assert!(literals.iter().any(|l| l == segment.text));
                }
            }
        }
    }
}
