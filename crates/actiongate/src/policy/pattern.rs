//! Wildcard expansion of action names.
//!
//! A policy's action table is keyed by *patterns*: dot-segmented strings in
//! which any segment may be the single-segment wildcard `*`. To find the
//! entry that governs an action, the action is expanded into every
//! wildcard-substitution of its segments and the candidates are tried in a
//! fixed order. The first candidate present in the table wins.
//!
//! # Enumeration Order
//!
//! For an action of `n` segments there are `2^n` candidates. They are
//! enumerated by an integer mask running from `0` to `2^n - 1`; the segment at
//! index `b` is replaced by `*` when the bit of weight `2^(n-1-b)` is set. So
//! for `test.findOne`:
//!
//! | mask | candidate      |
//! |------|----------------|
//! | 0    | `test.findOne` |
//! | 1    | `test.*`       |
//! | 2    | `*.findOne`    |
//! | 3    | `*.*`          |
//!
//! The fully literal action is always tried first and `*.*…*` always last;
//! in between the order is numeric, not "fewest wildcards first".
//!
//! Multi-level wildcards (`**`) are not part of the pattern language.

use std::fmt;

/// The single-segment wildcard.
pub const WILDCARD: &str = "*";

/// Default upper bound on the number of segments in an action name.
pub const DEFAULT_MAX_SEGMENTS: usize = 16;

/// Absolute upper bound on segments, regardless of configuration.
///
/// Keeps the candidate mask within a `u64` and the expansion finite.
pub const HARD_MAX_SEGMENTS: usize = 32;

// =============================================================================
// Pattern Error
// =============================================================================

/// Errors produced when an action name cannot be expanded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    /// The action name is the empty string.
    #[error("action name is empty")]
    Empty,

    /// One of the dot-delimited segments is empty.
    #[error("action '{action}' has an empty segment at position {index}")]
    EmptySegment {
        /// The offending action.
        action: String,
        /// Zero-based segment index.
        index: usize,
    },

    /// The action has more segments than the configured limit.
    #[error("action has {count} segments, limit is {max}")]
    TooManySegments {
        /// Number of segments in the action.
        count: usize,
        /// Effective limit.
        max: usize,
    },
}

impl From<PatternError> for crate::AclError {
    fn from(err: PatternError) -> Self {
        crate::AclError::invalid_action(err.to_string())
    }
}

// =============================================================================
// Action Name
// =============================================================================

/// A validated, pre-split action name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionName {
    raw: String,
    segments: Vec<String>,
}

impl ActionName {
    /// Parse an action name with the default segment limit.
    ///
    /// # Errors
    ///
    /// Returns a [`PatternError`] if the action is empty, contains an empty
    /// segment, or exceeds [`DEFAULT_MAX_SEGMENTS`].
    pub fn parse(action: &str) -> Result<Self, PatternError> {
        Self::parse_with_limit(action, DEFAULT_MAX_SEGMENTS)
    }

    /// Parse an action name, allowing at most `max_segments` segments.
    ///
    /// The limit is clamped to [`HARD_MAX_SEGMENTS`].
    ///
    /// # Errors
    ///
    /// See [`ActionName::parse`].
    pub fn parse_with_limit(action: &str, max_segments: usize) -> Result<Self, PatternError> {
        if action.is_empty() {
            return Err(PatternError::Empty);
        }

        let segments: Vec<String> = action.split('.').map(str::to_string).collect();
        if let Some(index) = segments.iter().position(String::is_empty) {
            return Err(PatternError::EmptySegment {
                action: action.to_string(),
                index,
            });
        }

        let max = max_segments.min(HARD_MAX_SEGMENTS);
        if segments.len() > max {
            return Err(PatternError::TooManySegments {
                count: segments.len(),
                max,
            });
        }

        Ok(Self {
            raw: action.to_string(),
            segments,
        })
    }

    /// The action as supplied by the caller.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The action's segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Iterate over the wildcard candidates in lookup order.
    #[must_use]
    pub fn candidates(&self) -> PatternCandidates<'_> {
        PatternCandidates::new(&self.segments)
    }

    /// Try candidates in order and return the first one `lookup` accepts.
    ///
    /// Returns the matching pattern together with the looked-up value.
    pub fn first_match<T>(&self, mut lookup: impl FnMut(&str) -> Option<T>) -> Option<(String, T)> {
        self.candidates()
            .find_map(|pattern| lookup(&pattern).map(|found| (pattern, found)))
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// =============================================================================
// Candidate Iterator
// =============================================================================

/// Iterator over the `2^n` wildcard substitutions of an action.
#[derive(Debug, Clone)]
pub struct PatternCandidates<'a> {
    segments: &'a [String],
    next_mask: u64,
    end: u64,
}

impl<'a> PatternCandidates<'a> {
    fn new(segments: &'a [String]) -> Self {
        Self {
            segments,
            next_mask: 0,
            end: 1u64 << segments.len(),
        }
    }

    fn render(&self, mask: u64) -> String {
        let n = self.segments.len();
        let mut out = String::with_capacity(self.segments.iter().map(|s| s.len() + 1).sum());
        for (b, segment) in self.segments.iter().enumerate() {
            if b > 0 {
                out.push('.');
            }
            let weight = 1u64 << (n - 1 - b);
            if mask & weight != 0 {
                out.push_str(WILDCARD);
            } else {
                out.push_str(segment);
            }
        }
        out
    }
}

impl Iterator for PatternCandidates<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_mask >= self.end {
            return None;
        }
        let mask = self.next_mask;
        self.next_mask += 1;
        Some(self.render(mask))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.end - self.next_mask) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PatternCandidates<'_> {}

/// Expand pre-split segments into every wildcard candidate, in lookup order.
#[must_use]
pub fn expand<S: AsRef<str>>(segments: &[S]) -> Vec<String> {
    let owned: Vec<String> = segments.iter().map(|s| s.as_ref().to_string()).collect();
    PatternCandidates::new(&owned).collect()
}

/// Returns `true` if `pattern` is a well-formed action pattern.
///
/// Well-formed patterns are non-empty, have no empty segments, and use `*`
/// only as a whole segment.
#[must_use]
pub fn is_valid_pattern(pattern: &str) -> bool {
    !pattern.is_empty()
        && pattern
            .split('.')
            .all(|segment| !segment.is_empty() && (segment == WILDCARD || !segment.contains('*')))
}

// =============================================================================
// Tests
// =============================================================================
