//! Filter, sort and paginate rows whose sort fields are derived per request.

use crate::error::Error;
use crate::stats::classifier::FillStatus;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// All-time detail rows
    TotalCount,
    /// Detail rows in the request's window
    CurrentCount,
    CapacityRemaining,
    /// full > medium > low > unknown
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            key: SortKey::Status,
            direction: SortDirection::Desc,
        }
    }
}

/// Optional filters, combined with AND
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerFilter {
    /// Case-insensitive substring of the city. Never matches an unknown city.
    pub city: Option<String>,
    /// Case-insensitive substring of the name
    pub name: Option<String>,
    pub is_online: Option<bool>,
    pub status: Option<FillStatus>,
}

impl ContainerFilter {
    pub fn matches(
        &self,
        name: &str,
        city: Option<&str>,
        is_online: bool,
        status: FillStatus,
    ) -> bool {
        if let Some(needle) = non_blank(&self.city) {
            match city {
                Some(city) if contains_ignore_case(city, needle) => {}
                _ => return false,
            }
        }
        if let Some(needle) = non_blank(&self.name) {
            if !contains_ignore_case(name, needle) {
                return false;
            }
        }
        if self.is_online.map_or(false, |online| online != is_online) {
            return false;
        }
        if self.status.map_or(false, |wanted| wanted != status) {
            return false;
        }
        true
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Offset/limit with the limit already clamped to the configured maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    pub fn new(offset: usize, limit: usize, max_limit: usize) -> Result<Self> {
        if limit == 0 {
            return Err(Error::InvalidArgument("limit must be positive".into()).into());
        }
        Ok(Self {
            offset,
            limit: limit.min(max_limit.max(1)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Matching rows before pagination
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

/// Row the engine can order
pub trait Queryable {
    /// Tie-break, ascending
    fn row_id(&self) -> i64;

    /// `None` sorts last in either direction
    fn sort_value(&self, key: SortKey) -> Option<i64>;
}

/// Filter, sort (ties broken by id ascending) and cut one page
pub fn run_query<T: Queryable>(
    items: Vec<T>,
    keep: impl Fn(&T) -> bool,
    sort: SortSpec,
    page: PageRequest,
) -> Page<T> {
    let mut rows: Vec<T> = items.into_iter().filter(|item| keep(item)).collect();
    rows.sort_by(|a, b| {
        compare(a.sort_value(sort.key), b.sort_value(sort.key), sort.direction)
            .then_with(|| a.row_id().cmp(&b.row_id()))
    });

    let total = rows.len();
    let items = rows
        .into_iter()
        .skip(page.offset)
        .take(page.limit)
        .collect();

    Page {
        items,
        total,
        offset: page.offset,
        limit: page.limit,
    }
}

fn compare(a: Option<i64>, b: Option<i64>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match direction {
            SortDirection::Asc => a.cmp(&b),
            SortDirection::Desc => b.cmp(&a),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: i64,
        total: i64,
        remaining: Option<i64>,
        status: FillStatus,
    }

    impl Queryable for Row {
        fn row_id(&self) -> i64 {
            self.id
        }

        fn sort_value(&self, key: SortKey) -> Option<i64> {
            match key {
                SortKey::TotalCount | SortKey::CurrentCount => Some(self.total),
                SortKey::CapacityRemaining => self.remaining,
                SortKey::Status => Some(i64::from(self.status.rank())),
            }
        }
    }

    fn row(id: i64, total: i64, remaining: Option<i64>, status: FillStatus) -> Row {
        Row {
            id,
            total,
            remaining,
            status,
        }
    }

    fn ids(page: &Page<Row>) -> Vec<i64> {
        page.items.iter().map(|r| r.id).collect()
    }

    fn rows() -> Vec<Row> {
        vec![
            row(4, 10, Some(5), FillStatus::Low),
            row(2, 30, None, FillStatus::Full),
            row(3, 10, Some(90), FillStatus::Unknown),
            row(1, 10, Some(0), FillStatus::Medium),
        ]
    }

    fn all() -> PageRequest {
        PageRequest::new(0, 100, 100).unwrap()
    }

    #[test]
    fn ties_break_by_id_ascending_in_both_directions() {
        let desc = SortSpec {
            key: SortKey::TotalCount,
            direction: SortDirection::Desc,
        };
        let asc = SortSpec {
            key: SortKey::TotalCount,
            direction: SortDirection::Asc,
        };
        assert_eq!(ids(&run_query(rows(), |_| true, desc, all())), vec![2, 1, 3, 4]);
        assert_eq!(ids(&run_query(rows(), |_| true, asc, all())), vec![1, 3, 4, 2]);

        // repeated identical queries give identical order
        let mut shuffled = rows();
        shuffled.reverse();
        assert_eq!(ids(&run_query(shuffled, |_| true, desc, all())), vec![2, 1, 3, 4]);
    }

    #[test]
    fn status_rank_desc_puts_full_first() {
        let page = run_query(rows(), |_| true, SortSpec::default(), all());
        assert_eq!(ids(&page), vec![2, 1, 4, 3]);
    }

    #[test]
    fn missing_values_sort_last_either_way() {
        for direction in [SortDirection::Asc, SortDirection::Desc] {
            let sort = SortSpec {
                key: SortKey::CapacityRemaining,
                direction,
            };
            let page = run_query(rows(), |_| true, sort, all());
            assert_eq!(page.items.last().map(|r| r.id), Some(2));
        }
    }

    #[test]
    fn pagination_reports_total_before_paging() -> Result<()> {
        let page = run_query(rows(), |_| true, SortSpec::default(), PageRequest::new(1, 2, 100)?);
        assert_eq!(page.total, 4);
        assert_eq!(ids(&page), vec![1, 4]);

        let past_end = run_query(
            rows(),
            |_| true,
            SortSpec::default(),
            PageRequest::new(10, 2, 100)?,
        );
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total, 4);
        Ok(())
    }

    #[test]
    fn limit_is_clamped_and_zero_rejected() -> Result<()> {
        assert_eq!(PageRequest::new(0, 500, 100)?.limit, 100);
        let err = PageRequest::new(0, 0, 100).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::InvalidArgument(_))));
        Ok(())
    }

    #[test]
    fn filters_combine_with_and() {
        let filter = ContainerFilter {
            city: Some("seo".into()),
            name: Some("GANG".into()),
            is_online: Some(true),
            status: None,
        };
        assert!(filter.matches("Gangnam Station", Some("Seoul"), true, FillStatus::Low));
        assert!(!filter.matches("Gangnam Station", Some("Seoul"), false, FillStatus::Low));
        assert!(!filter.matches("Jongno", Some("Seoul"), true, FillStatus::Low));
        assert!(!filter.matches("Gangnam Station", None, true, FillStatus::Low));
    }

    #[test]
    fn blank_filters_match_everything() {
        let filter = ContainerFilter {
            city: Some("  ".into()),
            ..ContainerFilter::default()
        };
        assert!(filter.matches("Any", None, false, FillStatus::Unknown));

        let by_status = ContainerFilter {
            status: Some(FillStatus::Full),
            ..ContainerFilter::default()
        };
        assert!(!by_status.matches("Any", None, false, FillStatus::Medium));
    }
}
