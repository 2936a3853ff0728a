//! Common types used across the engine

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Pagination parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 50,
        }
    }
}

impl Pagination {
    pub fn offset(&self) -> usize {
        (self.page.max(1) as usize - 1) * self.per_page as usize
    }

    /// Page size, never zero
    pub fn limit(&self) -> usize {
        self.per_page.max(1) as usize
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
    /// Slice one page out of a full, already ordered result set
    pub fn from_all(all: Vec<T>, pagination: Pagination) -> Self {
        let total_items = all.len() as u64;
        let per_page = pagination.limit();
        let total_pages = total_items.div_ceil(per_page as u64) as u32;
        let data = all
            .into_iter()
            .skip(pagination.offset())
            .take(per_page)
            .collect();

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

/// Inclusive date range for queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let day = at.date_naive();
        day >= self.start && day <= self.end
    }

    /// Start of `start` to the end of `end`, in UTC
    pub fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let from = self.start.and_time(NaiveTime::MIN).and_utc();
        let to = self
            .end
            .succ_opt()
            .unwrap_or(self.end)
            .and_time(NaiveTime::MIN)
            .and_utc();
        (from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate() {
        let page = PaginatedResponse::from_all((1..=7).collect::<Vec<_>>(), Pagination { page: 2, per_page: 3 });
        assert_eq!(page.data, vec![4, 5, 6]);
        assert_eq!(page.pagination.total_items, 7);
        assert_eq!(page.pagination.total_pages, 3);
    }

    #[test]
    fn test_date_range_contains() {
        let range = DateRange {
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        };
        let inside = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap().and_hms_opt(23, 59, 0).unwrap().and_utc();
        let outside = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap().and_hms_opt(0, 0, 0).unwrap().and_utc();
        assert!(range.contains(inside));
        assert!(!range.contains(outside));
    }
}
