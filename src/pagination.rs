//! Pagination for list queries

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Raw `(limit, offset)` as supplied by a caller.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A validated window: `limit` within `1..=max`, `offset >= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub limit: i64,
    pub offset: i64,
}

impl PageRequest {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
        }
    }

    /// Negative values are rejected; a missing limit falls back to
    /// `default_limit` and every limit is clamped to `max_limit`. A limit of
    /// zero is legal and yields an empty page with the total still counted.
    pub fn window(&self, default_limit: i64, max_limit: i64) -> CoreResult<Window> {
        let limit = self.limit.unwrap_or(default_limit);
        let offset = self.offset.unwrap_or(0);
        if limit < 0 {
            return Err(CoreError::validation(format!("limit must be >= 0, got {limit}")));
        }
        if offset < 0 {
            return Err(CoreError::validation(format!("offset must be >= 0, got {offset}")));
        }
        Ok(Window {
            limit: limit.min(max_limit),
            offset,
        })
    }
}

/// Pagination metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub limit: i64,
    pub offset: i64,
    pub total_items: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn new(window: Window, total_items: i64) -> Self {
        Self {
            limit: window.limit,
            offset: window.offset,
            total_items,
            has_next: window.limit > 0 && window.offset + window.limit < total_items,
            has_prev: window.offset > 0,
        }
    }
}

/// One page of results plus the total match count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, window: Window, total_items: i64) -> Self {
        Self {
            data,
            pagination: PaginationMeta::new(window, total_items),
        }
    }

    pub fn total(&self) -> i64 {
        self.pagination.total_items
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_and_clamp() {
        let window = PageRequest::default().window(20, 100).unwrap();
        assert_eq!(window, Window { limit: 20, offset: 0 });
        let window = PageRequest::new(500, 40).window(20, 100).unwrap();
        assert_eq!(window, Window { limit: 100, offset: 40 });
    }

    #[test]
    fn negatives_are_rejected() {
        assert_matches!(PageRequest::new(-1, 0).window(20, 100), Err(CoreError::Validation(_)));
        assert_matches!(PageRequest::new(10, -5).window(20, 100), Err(CoreError::Validation(_)));
    }

    #[test]
    fn meta_flags() {
        let meta = PaginationMeta::new(Window { limit: 10, offset: 10 }, 25);
        assert!(meta.has_next);
        assert!(meta.has_prev);
        let meta = PaginationMeta::new(Window { limit: 10, offset: 20 }, 25);
        assert!(!meta.has_next);
        let meta = PaginationMeta::new(Window { limit: 0, offset: 0 }, 25);
        assert!(!meta.has_next);
    }
}
