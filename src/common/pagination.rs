//! Offset-based pagination types for the persistence gateway.
//!
//! Query methods accept a `Page` (limit/offset) and return a `Paged<T>`
//! (rows plus a total count), per the `(limit, offset)` contract the gateway
//! exposes. There is no cursor encoding here — callers that need a stable
//! cursor build one at the HTTP boundary, outside this crate.

/// Requested page bounds, clamped and defaulted on construction.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl Page {
    /// Build a page, clamping `limit` to `[1, 100]` (default 25) and
    /// floor-ing a negative `offset` to zero.
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        let limit = limit.unwrap_or(25).clamp(1, 100);
        let offset = offset.unwrap_or(0).max(0);
        Self { limit, offset }
    }
}

/// A page of rows plus the total row count matching the query (ignoring
/// `limit`/`offset`), so callers can compute whether more pages exist.
#[derive(Debug, Clone)]
pub struct Paged<T> {
    pub rows: Vec<T>,
    pub total: i64,
}

impl<T> Paged<T> {
    pub fn new(rows: Vec<T>, total: i64) -> Self {
        Self { rows, total }
    }

    /// Whether there are rows beyond this page.
    pub fn has_more(&self, page: &Page) -> bool {
        page.offset + (self.rows.len() as i64) < self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_defaults() {
        let page = Page::default();
        assert_eq!(page.limit, 25);
        assert_eq!(page.offset, 0);
    }

    #[test]
    fn page_clamps_limit() {
        let page = Page::new(Some(500), None);
        assert_eq!(page.limit, 100);

        let page = Page::new(Some(0), None);
        assert_eq!(page.limit, 1);
    }

    #[test]
    fn page_floors_negative_offset() {
        let page = Page::new(Some(10), Some(-5));
        assert_eq!(page.offset, 0);
    }

    #[test]
    fn paged_has_more() {
        let page = Page::new(Some(10), Some(0));
        let paged = Paged::new(vec![1; 10], 25);
        assert!(paged.has_more(&page));

        let page = Page::new(Some(10), Some(20));
        let paged = Paged::new(vec![1; 5], 25);
        assert!(!paged.has_more(&page));
    }
}
