//! Regex pre-tokenization of ordinary text into chunks.
//!
//! Each chunk is merged independently by the BPE step, which bounds the work
//! per merge: digit runs are at most three long and words are split off from
//! punctuation and whitespace.

use super::tokenizer::TokenizerError;

#[cfg(feature = "pcre2")]
use pcre2::bytes::Regex as Pcre2Regex;

/// Split pattern for cl100k_base style vocabularies.
///
/// Alternatives, in priority order at each position:
/// 1. case-insensitive contractions `'s 't 're 've 'm 'll 'd`
/// 2. an optional non-letter, non-number, non-newline character then letters
/// 3. one to three digits
/// 4. an optional space, punctuation/symbols, then trailing newlines
/// 5. whitespace ending in newlines
/// 6. whitespace not followed by a non-whitespace character
/// 7. any other whitespace
pub const CL100K_BASE_PATTERN: &str = r"(?i:'s|'t|'re|'ve|'m|'ll|'d)|[^\r\n\p{L}\p{N}]?\p{L}+|\p{N}{1,3}| ?[^\s\p{L}\p{N}]+[\r\n]*|\s*[\r\n]+|\s+(?!\S)|\s+";

/// Llama 3 uses the cl100k_base split pattern.
pub const LLAMA3_PATTERN: &str = CL100K_BASE_PATTERN;

/// Regex backend: fancy-regex (default) or PCRE2 (optional).
#[derive(Clone)]
enum RegexBackend {
    Fancy(Box<fancy_regex::Regex>),
    #[cfg(feature = "pcre2")]
    Pcre2(Pcre2Regex),
}

enum MatchIter<'r, 't> {
    Fancy(fancy_regex::Matches<'r, 't>),
    #[cfg(feature = "pcre2")]
    Pcre2(pcre2::bytes::Matches<'r, 't>),
}

impl Iterator for MatchIter<'_, '_> {
    type Item = Result<(usize, usize), String>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            MatchIter::Fancy(matches) => matches.next().map(|m| {
                m.map(|m| (m.start(), m.end()))
                    .map_err(|e| e.to_string())
            }),
            #[cfg(feature = "pcre2")]
            MatchIter::Pcre2(matches) => matches.next().map(|m| {
                m.map(|m| (m.start(), m.end()))
                    .map_err(|e| e.to_string())
            }),
        }
    }
}

/// Compiled split pattern, owned by a tokenizer and shared read-only.
#[derive(Clone)]
pub struct PreTokenizer {
    regex: RegexBackend,
    pattern: String,
}

impl std::fmt::Debug for PreTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreTokenizer")
            .field("pattern", &self.pattern)
            .field("backend", &self.backend_name())
            .finish()
    }
}

impl PreTokenizer {
    /// Compile `pattern` with the fancy-regex backend.
    pub fn new(pattern: &str) -> Result<Self, TokenizerError> {
        let regex = fancy_regex::Regex::new(pattern)?;
        Ok(Self {
            regex: RegexBackend::Fancy(Box::new(regex)),
            pattern: pattern.to_string(),
        })
    }

    /// Compile `pattern` with PCRE2 (UTF and Unicode properties enabled).
    #[cfg(feature = "pcre2")]
    pub fn new_pcre2(pattern: &str, jit: bool) -> Result<Self, TokenizerError> {
        let mut builder = pcre2::bytes::RegexBuilder::new();
        if jit {
            builder.jit_if_available(true);
        }
        builder.utf(true);
        builder.ucp(true);
        let regex = builder.build(pattern)?;
        Ok(Self {
            regex: RegexBackend::Pcre2(regex),
            pattern: pattern.to_string(),
        })
    }

    /// The source pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// `"fancy-regex"` or `"pcre2"`.
    pub fn backend_name(&self) -> &'static str {
        match self.regex {
            RegexBackend::Fancy(_) => "fancy-regex",
            #[cfg(feature = "pcre2")]
            RegexBackend::Pcre2(_) => "pcre2",
        }
    }

    /// Lazily split `text` into chunks.
    ///
    /// The chunks concatenate to `text` exactly. Calling `chunks` again
    /// restarts the scan.
    pub fn chunks<'r, 't>(&'r self, text: &'t str) -> Chunks<'r, 't> {
        let matches = match &self.regex {
            RegexBackend::Fancy(regex) => MatchIter::Fancy(regex.find_iter(text)),
            #[cfg(feature = "pcre2")]
            RegexBackend::Pcre2(regex) => MatchIter::Pcre2(regex.find_iter(text.as_bytes())),
        };

        Chunks {
            text,
            pos: 0,
            matches,
            pending: None,
        }
    }

    /// Collect all chunks of `text`.
    pub fn segment<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.chunks(text).collect()
    }
}

/// Iterator over the chunks of one text. See [`PreTokenizer::chunks`].
///
/// Text the pattern does not match is yielded as its own chunk, and if the
/// regex engine fails mid-scan the remainder is yielded whole.
pub struct Chunks<'r, 't> {
    text: &'t str,
    pos: usize,
    matches: MatchIter<'r, 't>,
    pending: Option<(usize, usize)>,
}

impl<'t> Chunks<'_, 't> {
    fn rest(&mut self) -> Option<&'t str> {
        let rest = &self.text[self.pos..];
        self.pos = self.text.len();
        Some(rest)
    }
}

impl<'t> Iterator for Chunks<'_, 't> {
    type Item = &'t str;

    fn next(&mut self) -> Option<&'t str> {
        if self.pos >= self.text.len() {
            return None;
        }

        loop {
            if let Some((start, end)) = self.pending.take() {
                if start > self.pos {
                    let gap = &self.text[self.pos..start];
                    self.pending = Some((start, end));
                    self.pos = start;
                    return Some(gap);
                }
                self.pos = end;
                return Some(&self.text[start..end]);
            }

            match self.matches.next() {
                Some(Ok((start, end))) => {
                    let aligned =
                        self.text.is_char_boundary(start) && self.text.is_char_boundary(end);
                    if !aligned {
                        log::warn!("pre-tokenizer match {start}..{end} splits a character");
                        return self.rest();
                    }
                    if start >= self.pos && end > start {
                        self.pending = Some((start, end));
                    }
                }
                Some(Err(e)) => {
                    log::warn!("pre-tokenizer regex failed at byte {}: {e}", self.pos);
                    return self.rest();
                }
                None => return self.rest(),
            }
        }
    }
}
