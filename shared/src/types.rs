//! Common types used across the tracker

use serde::{Deserialize, Serialize};

/// Largest page size a list endpoint will serve
pub const MAX_PER_PAGE: u32 = 200;

/// Pagination parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl Pagination {
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page.clamp(1, MAX_PER_PAGE))
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.max(1) - 1) * self.limit()
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, pagination: Pagination, total_items: u64) -> Self {
        let per_page = pagination.limit() as u64;
        let total_pages = total_items.div_ceil(per_page) as u32;
        Self {
            data,
            pagination: PaginationMeta {
                page: pagination.page.max(1),
                per_page: per_page as u32,
                total_items,
                total_pages,
            },
        }
    }
}

/// Date range for queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub start: chrono::NaiveDate,
    pub end: chrono::NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_offsets() {
        let p = Pagination {
            page: 3,
            per_page: 25,
        };
        assert_eq!(p.limit(), 25);
        assert_eq!(p.offset(), 50);

        let zero = Pagination {
            page: 0,
            per_page: 0,
        };
        assert_eq!(zero.limit(), 1);
        assert_eq!(zero.offset(), 0);
    }

    #[test]
    fn test_per_page_is_capped() {
        let p = Pagination {
            page: 1,
            per_page: 10_000,
        };
        assert_eq!(p.limit(), i64::from(MAX_PER_PAGE));
    }

    #[test]
    fn test_total_pages() {
        let resp = PaginatedResponse::new(vec![1, 2], Pagination::default(), 41);
        assert_eq!(resp.pagination.total_pages, 3);
        let empty: PaginatedResponse<i32> = PaginatedResponse::new(vec![], Pagination::default(), 0);
        assert_eq!(empty.pagination.total_pages, 0);
    }
}
