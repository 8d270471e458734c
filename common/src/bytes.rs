//! Byte-key ranges used by storage scans.

use std::ops::{Bound, RangeBounds};

use bytes::Bytes;

/// A range over byte keys.
///
/// Implements [`RangeBounds<Bytes>`] so it can be handed directly to ordered
/// maps and to SlateDB scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytesRange {
    start: Bound<Bytes>,
    end: Bound<Bytes>,
}

impl BytesRange {
    pub fn new(start: Bound<Bytes>, end: Bound<Bytes>) -> Self {
        Self { start, end }
    }

    /// The range covering every key.
    pub fn unbounded() -> Self {
        Self::new(Bound::Unbounded, Bound::Unbounded)
    }

    /// All keys starting with `prefix`.
    pub fn prefix(prefix: Bytes) -> Self {
        let end = match prefix_successor(&prefix) {
            Some(succ) => Bound::Excluded(succ),
            None => Bound::Unbounded,
        };
        Self::new(Bound::Included(prefix), end)
    }

    /// Splits the range into its start and end bounds.
    pub fn into_bounds(self) -> (Bound<Bytes>, Bound<Bytes>) {
        (self.start, self.end)
    }

    /// Returns true if no key can fall inside this range.
    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Bound::Included(s), Bound::Included(e)) => s > e,
            (Bound::Included(s), Bound::Excluded(e))
            | (Bound::Excluded(s), Bound::Included(e))
            | (Bound::Excluded(s), Bound::Excluded(e)) => s >= e,
            _ => false,
        }
    }

    /// Returns true if `key` falls inside this range.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        let after_start = match &self.start {
            Bound::Included(s) => key >= s.as_ref(),
            Bound::Excluded(s) => key > s.as_ref(),
            Bound::Unbounded => true,
        };
        let before_end = match &self.end {
            Bound::Included(e) => key <= e.as_ref(),
            Bound::Excluded(e) => key < e.as_ref(),
            Bound::Unbounded => true,
        };
        after_start && before_end
    }
}

impl RangeBounds<Bytes> for BytesRange {
    fn start_bound(&self) -> Bound<&Bytes> {
        self.start.as_ref()
    }

    fn end_bound(&self) -> Bound<&Bytes> {
        self.end.as_ref()
    }
}

/// Smallest key greater than every key with the given prefix, or `None` if
/// the prefix is all `0xFF`.
fn prefix_successor(prefix: &[u8]) -> Option<Bytes> {
    let mut succ = prefix.to_vec();
    while let Some(last) = succ.pop() {
        if last < 0xFF {
            succ.push(last + 1);
            return Some(Bytes::from(succ));
        }
    }
    None
}
