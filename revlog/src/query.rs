//! Typed queries and paging for the read views.
//!
//! Every view returns a [`Page`]. Passing [`Page::next`] back in a
//! [`PageRequest`] resumes the scan where the previous page ended.

use std::ops::{Range, RangeBounds};

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::model::Revision;
use crate::range::normalize_revision;

/// Opaque position inside a view.
///
/// Cursors are only meaningful for the view and log that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(Bytes);

impl Cursor {
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self(bytes)
    }

    pub(crate) fn into_key(self) -> Bytes {
        self.0
    }
}

/// Limit and resume position for one page of a view.
///
/// A missing limit uses the configured page size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: Option<usize>,
    pub cursor: Option<Cursor>,
}

impl PageRequest {
    /// First page with the configured page size.
    pub fn first() -> Self {
        Self::default()
    }

    /// First page with an explicit limit.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            cursor: None,
        }
    }

    /// Continues from `cursor`, keeping this request's limit.
    pub fn after(mut self, cursor: Cursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub(crate) fn resolve_limit(&self, default: usize) -> Result<usize> {
        match self.limit {
            Some(0) => Err(Error::InvalidInput(
                "page limit must be greater than zero".to_string(),
            )),
            Some(limit) => Ok(limit),
            None => Ok(default),
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Position of the next page, or `None` if this page is the last.
    pub next: Option<Cursor>,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }

    /// Request for the page following this one, with the given limit.
    pub fn next_request(&self, limit: Option<usize>) -> Option<PageRequest> {
        self.next.clone().map(|cursor| PageRequest {
            limit,
            cursor: Some(cursor),
        })
    }
}

/// Filter over one log's commits.
///
/// Results are ordered by revision, then creation time, then commit id.
///
/// # Example
///
/// ```ignore
/// let unapplied = log
///     .query(CommitQuery::new().revisions(1..=3).applied(false))
///     .await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitQuery {
    pub(crate) revisions: Range<Revision>,
    pub(crate) applied: Option<bool>,
    pub(crate) page: PageRequest,
}

impl Default for CommitQuery {
    fn default() -> Self {
        Self {
            revisions: 0..Revision::MAX,
            applied: None,
            page: PageRequest::default(),
        }
    }
}

impl CommitQuery {
    /// Matches every commit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts results to revisions within `range`.
    pub fn revisions(mut self, range: impl RangeBounds<Revision>) -> Self {
        self.revisions = normalize_revision(&range);
        self
    }

    /// Restricts results to commits whose applied flag equals `applied`.
    pub fn applied(mut self, applied: bool) -> Self {
        self.applied = Some(applied);
        self
    }

    pub fn page(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }

    pub fn revision_range(&self) -> &Range<Revision> {
        &self.revisions
    }

    pub(crate) fn matches_applied(&self, applied: bool) -> bool {
        self.applied.is_none_or(|wanted| wanted == applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_resolve_default_limit() {
        assert_eq!(PageRequest::first().resolve_limit(10).unwrap(), 10);
        assert_eq!(PageRequest::with_limit(3).resolve_limit(10).unwrap(), 3);
    }

    #[test]
    fn should_reject_zero_limit() {
        assert!(matches!(
            PageRequest::with_limit(0).resolve_limit(10),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn should_build_commit_query() {
        // given/when
        let query = CommitQuery::new()
            .revisions(2..=4)
            .applied(false)
            .page(PageRequest::with_limit(5));

        // then
        assert_eq!(query.revision_range(), &(2..5));
        assert!(query.matches_applied(false));
        assert!(!query.matches_applied(true));
        assert_eq!(query.page.limit, Some(5));
    }

    #[test]
    fn should_match_any_applied_flag_by_default() {
        let query = CommitQuery::new();
        assert!(query.matches_applied(true));
        assert!(query.matches_applied(false));
    }

    #[test]
    fn should_chain_next_request_from_page() {
        // given
        let page: Page<u64> = Page {
            items: vec![1, 2],
            next: Some(Cursor::from_bytes(Bytes::from_static(b"k"))),
        };

        // when
        let next = page.next_request(Some(2)).unwrap();

        // then
        assert_eq!(next.cursor, Some(Cursor::from_bytes(Bytes::from_static(b"k"))));
        let last: Page<u64> = Page {
            items: vec![3],
            next: None,
        };
        assert!(last.is_last());
        assert!(last.next_request(None).is_none());
    }
}
