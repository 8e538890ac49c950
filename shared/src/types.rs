//! Common types used across the platform

use serde::{Deserialize, Serialize};

/// Largest page a client may request
pub const MAX_PER_PAGE: u32 = 100;

/// Pagination parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

impl Pagination {
    /// Clamp to sane bounds: page starts at 1, per_page in 1..=MAX_PER_PAGE
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.normalized().per_page)
    }

    pub fn offset(&self) -> i64 {
        let p = self.normalized();
        i64::from(p.page - 1) * i64::from(p.per_page)
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, pagination: Pagination, total_items: u64) -> Self {
        let p = pagination.normalized();
        let total_pages = total_items.div_ceil(u64::from(p.per_page)) as u32;
        Self {
            data,
            pagination: PaginationMeta {
                page: p.page,
                per_page: p.per_page,
                total_items,
                total_pages,
            },
        }
    }
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_and_limit() {
        let p = Pagination { page: 3, per_page: 25 };
        assert_eq!(p.offset(), 50);
        assert_eq!(p.limit(), 25);
    }

    #[test]
    fn zero_page_is_first_page() {
        let p = Pagination { page: 0, per_page: 0 };
        assert_eq!(p.offset(), 0);
        assert_eq!(p.limit(), 1);
    }

    #[test]
    fn total_pages_rounds_up() {
        let resp = PaginatedResponse::new(vec![1, 2], Pagination { page: 1, per_page: 20 }, 41);
        assert_eq!(resp.pagination.total_pages, 3);
    }
}
