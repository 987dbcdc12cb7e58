//! Byte-range rewrites over a single source text.
//!
//! Rewrites are collected first and applied in one pass. A rewrite may embed the
//! (rewritten) text of one of its own sub-ranges through [`Piece::Source`], which lets an
//! outer replacement such as `h.setX(<rhs>)` carry the rewrites collected inside `<rhs>`
//! without ever mutating the text while it is being scanned.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A half-open text range `[start, end)` in UTF-8 byte offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "invalid range: {start}..{end}");
        Self { start, end }
    }

    pub fn empty(offset: usize) -> Self {
        Self::new(offset, offset)
    }

    pub fn len(self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(self) -> bool {
        self.start == self.end
    }

    pub fn contains(self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    pub fn contains_range(self, other: TextRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn intersects(self, other: TextRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl From<std::ops::Range<usize>> for TextRange {
    fn from(range: std::ops::Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}

/// One piece of a rewrite's replacement text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Piece {
    Text(String),
    /// The source text of a sub-range of the rewritten range, with any rewrites nested in
    /// that sub-range applied.
    Source(TextRange),
}

/// Replace `range` with the concatenation of `pieces`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rewrite {
    pub range: TextRange,
    pub pieces: Vec<Piece>,
}

impl Rewrite {
    pub fn replace(range: TextRange, text: impl Into<String>) -> Self {
        Self {
            range,
            pieces: vec![Piece::Text(text.into())],
        }
    }

    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self::replace(TextRange::empty(offset), text)
    }

    pub fn delete(range: TextRange) -> Self {
        Self {
            range,
            pieces: Vec::new(),
        }
    }

    pub fn template(range: TextRange, pieces: Vec<Piece>) -> Self {
        Self { range, pieces }
    }

    /// Whether `other` must be applied as part of this rewrite rather than next to it.
    ///
    /// Inserts sitting exactly on one of our boundaries are siblings, not children.
    fn encloses(&self, other: &Rewrite) -> bool {
        if self.range.is_empty() || self.range == other.range {
            return false;
        }
        if !self.range.contains_range(other.range) {
            return false;
        }
        !(other.range.is_empty()
            && (other.range.start == self.range.start || other.range.start == self.range.end))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RewriteError {
    #[error("text range {range:?} is outside the source bounds (len={len})")]
    OutOfBounds { range: TextRange, len: usize },
    #[error("text range {range:?} does not fall on a UTF-8 character boundary")]
    NotCharBoundary { range: TextRange },
    #[error("overlapping rewrites: {first:?} overlaps {second:?}")]
    OverlappingEdits { first: TextRange, second: TextRange },
    #[error("rewrite of {range:?} embeds source range {piece:?} outside of itself")]
    PieceOutsideRewrite { range: TextRange, piece: TextRange },
}

/// An ordered collection of rewrites against one source text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RewriteSet {
    rewrites: Vec<Rewrite>,
}

impl RewriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rewrite: Rewrite) {
        self.rewrites.push(rewrite);
    }

    pub fn len(&self) -> usize {
        self.rewrites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewrites.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rewrite> {
        self.rewrites.iter()
    }

    /// Sort, deduplicate and merge same-offset inserts.
    ///
    /// Inserts at the same offset are concatenated in the order they were pushed.
    pub fn normalize(&mut self) {
        self.rewrites.sort_by(|a, b| {
            a.range
                .start
                .cmp(&b.range.start)
                .then_with(|| (!a.range.is_empty()).cmp(&!b.range.is_empty()))
                .then_with(|| b.range.end.cmp(&a.range.end))
        });

        self.rewrites.dedup();

        let mut merged: Vec<Rewrite> = Vec::with_capacity(self.rewrites.len());
        for rewrite in self.rewrites.drain(..) {
            if let Some(last) = merged.last_mut() {
                if last.range.is_empty() && last.range == rewrite.range {
                    last.pieces.extend(rewrite.pieces);
                    continue;
                }
            }
            merged.push(rewrite);
        }
        self.rewrites = merged;
    }

    /// Apply every rewrite to `original` and return the resulting text.
    pub fn apply(&self, original: &str) -> Result<String, RewriteError> {
        let mut normalized = self.clone();
        normalized.normalize();

        for rewrite in &normalized.rewrites {
            let range = rewrite.range;
            if range.end > original.len() || range.start > range.end {
                return Err(RewriteError::OutOfBounds {
                    range,
                    len: original.len(),
                });
            }
            if !original.is_char_boundary(range.start) || !original.is_char_boundary(range.end) {
                return Err(RewriteError::NotCharBoundary { range });
            }
        }

        render_range(
            original,
            TextRange::new(0, original.len()),
            &normalized.rewrites,
        )
    }
}

impl FromIterator<Rewrite> for RewriteSet {
    fn from_iter<I: IntoIterator<Item = Rewrite>>(iter: I) -> Self {
        Self {
            rewrites: iter.into_iter().collect(),
        }
    }
}

/// Render `range` of `original` with `rewrites` applied.
///
/// `rewrites` must be sorted the way [`RewriteSet::normalize`] sorts them and lie within
/// `range`.
fn render_range(
    original: &str,
    range: TextRange,
    rewrites: &[Rewrite],
) -> Result<String, RewriteError> {
    let mut out = String::with_capacity(range.len());
    let mut cursor = range.start;
    let mut idx = 0usize;

    while idx < rewrites.len() {
        let current = &rewrites[idx];

        let mut next = idx + 1;
        while next < rewrites.len() && current.encloses(&rewrites[next]) {
            next += 1;
        }
        if let Some(following) = rewrites.get(next) {
            if following.range.start < current.range.end {
                return Err(RewriteError::OverlappingEdits {
                    first: current.range,
                    second: following.range,
                });
            }
        }

        out.push_str(&original[cursor..current.range.start]);
        let nested = &rewrites[idx + 1..next];
        for piece in &current.pieces {
            match piece {
                Piece::Text(text) => out.push_str(text),
                Piece::Source(sub) => {
                    if !current.range.contains_range(*sub) {
                        return Err(RewriteError::PieceOutsideRewrite {
                            range: current.range,
                            piece: *sub,
                        });
                    }
                    let inner: Vec<Rewrite> = nested
                        .iter()
                        .filter(|rewrite| sub.contains_range(rewrite.range))
                        .cloned()
                        .collect();
                    out.push_str(&render_range(original, *sub, &inner)?);
                }
            }
        }

        cursor = current.range.end;
        idx = next;
    }

    out.push_str(&original[cursor..range.end]);
    Ok(out)
}
