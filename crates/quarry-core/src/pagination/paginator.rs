use serde::Serialize;
use serde::ser::Serializer;

use crate::error::{OrmError, OrmResult};

/// A page of items with offset pagination metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Paginator<T> {
    items: Vec<T>,
    total: u64,
    per_page: u64,
    current_page: u64,
    last_page: u64,
}

impl<T> Paginator<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, per_page: u64) -> OrmResult<Self> {
        if per_page == 0 {
            return Err(OrmError::InvalidQuery("per_page must be greater than 0".into()));
        }
        if page == 0 {
            return Err(OrmError::InvalidQuery("page must be at least 1".into()));
        }
        Ok(Self {
            items,
            total,
            per_page,
            current_page: page,
            // an empty result still has one (empty) page
            last_page: total.div_ceil(per_page).max(1),
        })
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn per_page(&self) -> u64 {
        self.per_page
    }

    pub fn current_page(&self) -> u64 {
        self.current_page
    }

    pub fn last_page(&self) -> u64 {
        self.last_page
    }

    pub fn has_pages(&self) -> bool {
        self.last_page > 1
    }

    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page
    }

    pub fn previous_page(&self) -> Option<u64> {
        (self.current_page > 1).then(|| self.current_page - 1)
    }

    pub fn next_page(&self) -> Option<u64> {
        self.has_more_pages().then(|| self.current_page + 1)
    }

    /// Relative query string for `page`.
    pub fn url(&self, page: u64) -> OrmResult<String> {
        if page < 1 || page > self.last_page {
            return Err(OrmError::InvalidQuery(format!("Page {page} is out of range")));
        }
        Ok(format!("?page={page}&per_page={}", self.per_page))
    }

    /// Transform the items, keeping the metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginator<U> {
        Paginator {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            per_page: self.per_page,
            current_page: self.current_page,
            last_page: self.last_page,
        }
    }

    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Paginator<U>, E> {
        Ok(Paginator {
            items: self.items.into_iter().map(f).collect::<Result<_, E>>()?,
            total: self.total,
            per_page: self.per_page,
            current_page: self.current_page,
            last_page: self.last_page,
        })
    }
}

#[derive(Serialize)]
struct Meta {
    current_page: u64,
    per_page: u64,
    total: u64,
    total_pages: u64,
    has_more: bool,
    next_page: Option<u64>,
    previous_page: Option<u64>,
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    data: &'a [T],
    meta: Meta,
}

impl<T: Serialize> Serialize for Paginator<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Envelope {
            data: &self.items,
            meta: Meta {
                current_page: self.current_page,
                per_page: self.per_page,
                total: self.total,
                total_pages: self.last_page,
                has_more: self.has_more_pages(),
                next_page: self.next_page(),
                previous_page: self.previous_page(),
            },
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_arithmetic() {
        let page = Paginator::new(vec![1, 2, 3], 45, 2, 15).unwrap();
        assert_eq!(page.last_page(), 3);
        assert_eq!(page.previous_page(), Some(1));
        assert_eq!(page.next_page(), Some(3));
        assert!(page.has_pages());
        assert_eq!(page.url(3).unwrap(), "?page=3&per_page=15");
        assert!(page.url(4).is_err());
    }

    #[test]
    fn test_empty_result_has_one_page() {
        let page = Paginator::<i32>::new(vec![], 0, 1, 15).unwrap();
        assert_eq!(page.last_page(), 1);
        assert!(!page.has_more_pages());
        assert_eq!(page.next_page(), None);
    }

    #[test]
    fn test_rejects_zero_per_page() {
        assert!(Paginator::<i32>::new(vec![], 10, 1, 0).is_err());
        assert!(Paginator::<i32>::new(vec![], 10, 0, 5).is_err());
    }

    #[test]
    fn test_serializes_envelope() {
        let page = Paginator::new(vec!["a"], 16, 2, 15).unwrap();
        let value = serde_json::to_value(&page).unwrap();
        assert_eq!(
            value,
            json!({
                "data": ["a"],
                "meta": {
                    "current_page": 2,
                    "per_page": 15,
                    "total": 16,
                    "total_pages": 2,
                    "has_more": false,
                    "next_page": null,
                    "previous_page": 1
                }
            })
        );
    }
}
