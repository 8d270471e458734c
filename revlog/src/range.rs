//! Range utilities.
//!
//! Public query APIs accept `impl RangeBounds<Revision>` for ergonomic range
//! syntax (`..`, `5..`, `..=10`, `5..=10`, etc.). Internal code works with
//! half-open `Range<Revision>` where an end of `Revision::MAX` means
//! unbounded. Conversion happens at the API boundary via
//! [`normalize_revision`].

use std::ops::{Bound, Range, RangeBounds};

use crate::error::{Error, Result};
use crate::model::Revision;

/// Converts any `RangeBounds<Revision>` to a normalized `Range<Revision>`.
pub(crate) fn normalize_revision<R: RangeBounds<Revision>>(range: &R) -> Range<Revision> {
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        // `..=Revision::MAX` saturates onto the unbounded sentinel, which
        // still covers every storable revision.
        Bound::Included(&e) => e.saturating_add(1),
        Bound::Excluded(&e) => e,
        Bound::Unbounded => Revision::MAX,
    };
    start..end
}

/// Builds the half-open range for the closed interval `[bottom, top]`.
///
/// Fails with [`Error::InvalidInput`] when `bottom > top`.
pub(crate) fn closed_revision_range(bottom: Revision, top: Revision) -> Result<Range<Revision>> {
    if bottom > top {
        return Err(Error::InvalidInput(format!(
            "bottom revision {} is greater than top revision {}",
            bottom, top
        )));
    }
    Ok(normalize_revision(&(bottom..=top)))
}

/// Restricts `range` to revisions no greater than `cap`.
pub(crate) fn cap_revision(range: Range<Revision>, cap: Revision) -> Range<Revision> {
    let end = range.end.min(cap.saturating_add(1));
    range.start..end.max(range.start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_normalize_full_range() {
        assert_eq!(normalize_revision(&(..)), 0..u64::MAX);
    }

    #[test]
    fn should_treat_inclusive_max_as_unbounded() {
        assert_eq!(normalize_revision(&(..=u64::MAX)), normalize_revision(&(..)));
        assert_eq!(normalize_revision(&(3..=u64::MAX)), 3..u64::MAX);
    }

    #[test]
    fn should_normalize_range_inclusive() {
        assert_eq!(normalize_revision(&(50u64..=150)), 50..151);
    }

    #[test]
    fn should_handle_excluded_start() {
        let range = normalize_revision(&(Bound::Excluded(10u64), Bound::Unbounded));
        assert_eq!(range, 11..u64::MAX);
    }

    #[test]
    fn should_build_closed_range() {
        assert_eq!(closed_revision_range(1, 3).unwrap(), 1..4);
        assert_eq!(closed_revision_range(2, 2).unwrap(), 2..3);
    }

    #[test]
    fn should_reject_inverted_closed_range() {
        assert!(matches!(
            closed_revision_range(3, 1),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn should_cap_range_at_revision() {
        assert_eq!(cap_revision(0..u64::MAX, 5), 0..6);
        assert_eq!(cap_revision(2..4, 5), 2..4);
        // empty when the range starts above the cap
        assert!(cap_revision(7..9, 5).is_empty());
    }
}
