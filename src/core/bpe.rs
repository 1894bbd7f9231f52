//! Greedy byte-pair merge over a single chunk.
//!
//! The chunk starts as one part per byte. Each round merges the adjacent pair
//! whose concatenation has the lowest rank in the vocabulary (leftmost on a
//! tie) and stops when no adjacent concatenation is in the vocabulary.
//!
//! Every part is a contiguous byte range of the input, so parts are stored as
//! `start..end` offsets in a flat array linked by `prev`/`next` indices. A
//! merge is an O(1) unlink. Short chunks find the minimum with a linear walk
//! per round; long chunks keep a min-heap of `(rank, position)` candidates and
//! discard entries invalidated by neighbouring merges. Both strategies return
//! the same parts.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::hash::BuildHasher;
use std::ops::Range;

use super::vocab::{Rank, Vocabulary};

/// Above this many initial parts the heap strategy is used.
const HEAP_THRESHOLD: usize = 32;

const NONE: usize = usize::MAX;

/// Rank lookup for a byte sequence.
pub trait RankLookup {
    fn rank_of(&self, bytes: &[u8]) -> Option<Rank>;
}

impl RankLookup for Vocabulary {
    #[inline]
    fn rank_of(&self, bytes: &[u8]) -> Option<Rank> {
        self.rank(bytes)
    }
}

impl<S: BuildHasher> RankLookup for HashMap<Vec<u8>, Rank, S> {
    #[inline]
    fn rank_of(&self, bytes: &[u8]) -> Option<Rank> {
        self.get(bytes).copied()
    }
}

struct Part {
    start: usize,
    end: usize,
    prev: usize,
    next: usize,
    /// Rank of merging this part with `next`.
    rank: Option<Rank>,
}

struct Parts<'a, R: ?Sized> {
    piece: &'a [u8],
    ranks: &'a R,
    parts: Vec<Part>,
}

impl<'a, R: RankLookup + ?Sized> Parts<'a, R> {
    fn new(piece: &'a [u8], ranks: &'a R) -> Self {
        let n = piece.len();
        let parts = (0..n)
            .map(|i| Part {
                start: i,
                end: i + 1,
                prev: if i > 0 { i - 1 } else { NONE },
                next: if i + 1 < n { i + 1 } else { NONE },
                rank: None,
            })
            .collect();

        let mut this = Self {
            piece,
            ranks,
            parts,
        };
        for i in 0..n.saturating_sub(1) {
            this.parts[i].rank = this.pair_rank(i);
        }
        this
    }

    #[inline]
    fn pair_rank(&self, i: usize) -> Option<Rank> {
        let next = self.parts[i].next;
        if next == NONE {
            return None;
        }
        self.ranks
            .rank_of(&self.piece[self.parts[i].start..self.parts[next].end])
    }

    /// Merge part `i` with its successor and refresh the affected ranks.
    fn merge(&mut self, i: usize) {
        let j = self.parts[i].next;
        let after = self.parts[j].next;

        self.parts[i].end = self.parts[j].end;
        self.parts[i].next = after;
        if after != NONE {
            self.parts[after].prev = i;
        }
        self.parts[j].rank = None;

        self.parts[i].rank = self.pair_rank(i);
        let prev = self.parts[i].prev;
        if prev != NONE {
            self.parts[prev].rank = self.pair_rank(prev);
        }
    }

    fn merge_linear(&mut self) {
        loop {
            let mut best: Option<(Rank, usize)> = None;
            let mut cur = 0;
            while cur != NONE {
                if let Some(rank) = self.parts[cur].rank {
                    if best.map_or(true, |(b, _)| rank < b) {
                        best = Some((rank, cur));
                    }
                }
                cur = self.parts[cur].next;
            }

            match best {
                Some((_, i)) => self.merge(i),
                None => break,
            }
        }
    }

    fn merge_heap(&mut self) {
        let mut heap: BinaryHeap<Reverse<(Rank, usize)>> = self
            .parts
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.rank.map(|r| Reverse((r, i))))
            .collect();

        while let Some(Reverse((rank, i))) = heap.pop() {
            if self.parts[i].rank != Some(rank) {
                continue;
            }

            self.merge(i);

            if let Some(r) = self.parts[i].rank {
                heap.push(Reverse((r, i)));
            }
            let prev = self.parts[i].prev;
            if prev != NONE {
                if let Some(r) = self.parts[prev].rank {
                    heap.push(Reverse((r, prev)));
                }
            }
        }
    }

    fn into_ranges(self) -> Vec<Range<usize>> {
        let mut out = Vec::new();
        let mut cur = 0;
        while cur != NONE {
            let part = &self.parts[cur];
            out.push(part.start..part.end);
            cur = part.next;
        }
        out
    }
}

/// Merge `piece` and return the byte range of every resulting part.
///
/// The ranges are in order and cover `piece` exactly.
pub fn byte_pair_merge<R: RankLookup + ?Sized>(piece: &[u8], ranks: &R) -> Vec<Range<usize>> {
    match piece.len() {
        0 => Vec::new(),
        1 => vec![0..1],
        n => {
            let mut parts = Parts::new(piece, ranks);
            if n > HEAP_THRESHOLD {
                parts.merge_heap();
            } else {
                parts.merge_linear();
            }
            parts.into_ranges()
        }
    }
}

/// Merge `piece` and return the resulting byte groups.
pub fn byte_pair_split<'a, R: RankLookup + ?Sized>(piece: &'a [u8], ranks: &R) -> Vec<&'a [u8]> {
    byte_pair_merge(piece, ranks)
        .into_iter()
        .map(|range| &piece[range])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    fn ranks(entries: &[(&str, Rank)]) -> FxHashMap<Vec<u8>, Rank> {
        entries
            .iter()
            .map(|(k, v)| (k.as_bytes().to_vec(), *v))
            .collect()
    }

    fn split_str(piece: &str, ranks: &FxHashMap<Vec<u8>, Rank>) -> Vec<String> {
        byte_pair_split(piece.as_bytes(), ranks)
            .into_iter()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .collect()
    }

    fn force(piece: &[u8], ranks: &FxHashMap<Vec<u8>, Rank>, heap: bool) -> Vec<Range<usize>> {
        let mut parts = Parts::new(piece, ranks);
        if heap {
            parts.merge_heap();
        } else {
            parts.merge_linear();
        }
        parts.into_ranges()
    }

    #[test]
    fn test_lowest_rank_merges_first() {
        let r = ranks(&[("ab", 0), ("bc", 1)]);
        assert_eq!(split_str("abc", &r), vec!["ab", "c"]);
    }

    #[test]
    fn test_rank_order_not_position_order() {
        let r = ranks(&[("ab", 1), ("bc", 0)]);
        assert_eq!(split_str("abc", &r), vec!["a", "bc"]);
    }

    #[test]
    fn test_chained_merges() {
        let r = ranks(&[("he", 0), ("ll", 1), ("llo", 2), ("hello", 3)]);
        assert_eq!(split_str("hello", &r), vec!["hello"]);
    }

    #[test]
    fn test_whole_token_only_through_pairs() {
        let r = ranks(&[("ab", 0), ("abc", 5)]);
        assert_eq!(split_str("abc", &r), vec!["abc"]);
        let r = ranks(&[("bc", 0), ("abc", 5)]);
        assert_eq!(split_str("abc", &r), vec!["abc"]);
        // No adjacent pair of single bytes is ranked, so "abc" is never reached.
        let r = ranks(&[("abc", 5)]);
        assert_eq!(split_str("abc", &r), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_tie_breaks_leftmost() {
        let r = ranks(&[("aa", 0)]);
        assert_eq!(split_str("aaa", &r), vec!["aa", "a"]);
        assert_eq!(split_str("aaaaa", &r), vec!["aa", "aa", "a"]);
    }

    #[test]
    fn test_no_merges() {
        let r = ranks(&[]);
        assert_eq!(split_str("xyz", &r), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_empty_and_single() {
        let r = ranks(&[("ab", 0)]);
        assert!(byte_pair_merge(b"", &r).is_empty());
        assert_eq!(byte_pair_merge(b"a", &r), vec![0..1]);
    }

    #[test]
    fn test_multibyte_utf8() {
        let e = "é".as_bytes();
        let mut r = FxHashMap::default();
        r.insert(e.to_vec(), 10);
        let parts = byte_pair_split("éé".as_bytes(), &r);
        assert_eq!(parts, vec![e, e]);
    }

    #[test]
    fn test_vocabulary_lookup() {
        let vocab = crate::core::vocab::load_tiktoken_bpe(b"YWI= 0\nYmM= 1\n");
        assert_eq!(byte_pair_split(b"abc", &vocab), vec![b"ab".as_slice(), b"c".as_slice()]);
    }

    #[test]
    fn test_heap_matches_linear() {
        let r = ranks(&[
            ("aa", 0),
            ("ab", 1),
            ("ba", 2),
            ("aaa", 3),
            ("aab", 4),
            ("abab", 5),
            ("aaaa", 6),
            ("bb", 7),
            ("abb", 8),
        ]);

        let mut state: u32 = 7;
        for len in [2usize, 5, 17, 33, 64, 100] {
            let piece: Vec<u8> = (0..len)
                .map(|_| {
                    state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                    if (state >> 16) & 1 == 0 {
                        b'a'
                    } else {
                        b'b'
                    }
                })
                .collect();
            assert_eq!(force(&piece, &r, false), force(&piece, &r, true), "len {len}");
        }
    }

    #[test]
    fn test_long_chunk_uses_heap_and_covers_input() {
        let r = ranks(&[("ab", 0), ("abab", 1)]);
        let piece = "ab".repeat(40);
        let ranges = byte_pair_merge(piece.as_bytes(), &r);
        assert_eq!(ranges.len(), 20);
        assert_eq!(ranges.first(), Some(&(0..4)));
        assert_eq!(ranges.last().map(|r| r.end), Some(80));
    }

    #[test]
    fn test_deterministic() {
        let r = ranks(&[("ab", 0), ("bc", 1), ("ca", 2)]);
        let first = byte_pair_merge(b"abcabcabca", &r);
        for _ in 0..10 {
            assert_eq!(byte_pair_merge(b"abcabcabca", &r), first);
        }
    }
}
