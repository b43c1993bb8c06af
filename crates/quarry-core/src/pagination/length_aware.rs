use serde::Serialize;
use serde::ser::Serializer;

use super::paginator::Paginator;
use crate::error::OrmResult;

/// First / last / previous / next page URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageLinks {
    pub first: Option<String>,
    pub last: Option<String>,
    pub prev: Option<String>,
    pub next: Option<String>,
}

/// Paginator that knows the total and can render page links.
#[derive(Debug, Clone, PartialEq)]
pub struct LengthAwarePaginator<T> {
    inner: Paginator<T>,
    path: Option<String>,
    query_params: Vec<(String, String)>,
}

impl<T> LengthAwarePaginator<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, per_page: u64) -> OrmResult<Self> {
        Ok(Self::from_paginator(Paginator::new(items, total, page, per_page)?))
    }

    pub fn from_paginator(inner: Paginator<T>) -> Self {
        Self {
            inner,
            path: None,
            query_params: Vec::new(),
        }
    }

    /// Base path used to build links, e.g. `/api/users`.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Extra query parameter carried on every link.
    pub fn append(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query_params.push((key.into(), value.to_string()));
        self
    }

    pub fn paginator(&self) -> &Paginator<T> {
        &self.inner
    }

    pub fn into_paginator(self) -> Paginator<T> {
        self.inner
    }

    pub fn items(&self) -> &[T] {
        self.inner.items()
    }

    pub fn into_items(self) -> Vec<T> {
        self.inner.into_items()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn total(&self) -> u64 {
        self.inner.total()
    }

    pub fn per_page(&self) -> u64 {
        self.inner.per_page()
    }

    pub fn current_page(&self) -> u64 {
        self.inner.current_page()
    }

    pub fn last_page(&self) -> u64 {
        self.inner.last_page()
    }

    pub fn has_more_pages(&self) -> bool {
        self.inner.has_more_pages()
    }

    /// Items on this page.
    pub fn count(&self) -> u64 {
        self.inner.items().len() as u64
    }

    /// 1-based index of the first item on this page, 0 when empty.
    pub fn from_item(&self) -> u64 {
        if self.total() == 0 {
            return 0;
        }
        (self.current_page() - 1)
            .saturating_mul(self.per_page())
            .saturating_add(1)
    }

    pub fn to_item(&self) -> u64 {
        if self.total() == 0 {
            return 0;
        }
        self.from_item()
            .saturating_add(self.count())
            .saturating_sub(1)
            .min(self.total())
    }

    /// Absolute link for `page`, or `None` without a path or out of range.
    pub fn url(&self, page: u64) -> Option<String> {
        let path = self.path.as_deref()?;
        if page < 1 || page > self.last_page() {
            return None;
        }
        let mut params: Vec<String> = self
            .query_params
            .iter()
            .filter(|(k, _)| k != "page" && k != "per_page")
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        params.push(format!("page={page}"));
        params.push(format!("per_page={}", self.per_page()));
        Some(format!("{path}?{}", params.join("&")))
    }

    pub fn links(&self) -> PageLinks {
        PageLinks {
            first: self.url(1),
            last: self.url(self.last_page()),
            prev: self.inner.previous_page().and_then(|p| self.url(p)),
            next: self.inner.next_page().and_then(|p| self.url(p)),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> LengthAwarePaginator<U> {
        LengthAwarePaginator {
            inner: self.inner.map(f),
            path: self.path,
            query_params: self.query_params,
        }
    }

    pub fn try_map<U, E>(
        self,
        f: impl FnMut(T) -> Result<U, E>,
    ) -> Result<LengthAwarePaginator<U>, E> {
        Ok(LengthAwarePaginator {
            inner: self.inner.try_map(f)?,
            path: self.path,
            query_params: self.query_params,
        })
    }
}

#[derive(Serialize)]
struct Meta {
    current_page: u64,
    per_page: u64,
    total: u64,
    total_pages: u64,
    count: u64,
    from: u64,
    to: u64,
    has_more: bool,
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    data: &'a [T],
    meta: Meta,
    #[serde(skip_serializing_if = "Option::is_none")]
    links: Option<PageLinks>,
}

impl<T: Serialize> Serialize for LengthAwarePaginator<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Envelope {
            data: self.items(),
            meta: Meta {
                current_page: self.current_page(),
                per_page: self.per_page(),
                total: self.total(),
                total_pages: self.last_page(),
                count: self.count(),
                from: self.from_item(),
                to: self.to_item(),
                has_more: self.has_more_pages(),
            },
            links: self.path.as_ref().map(|_| self.links()),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_and_to() {
        let page = LengthAwarePaginator::new(vec![1, 2, 3], 33, 3, 15).unwrap();
        assert_eq!(page.from_item(), 31);
        assert_eq!(page.to_item(), 33);

        let empty = LengthAwarePaginator::<i32>::new(vec![], 0, 1, 15).unwrap();
        assert_eq!((empty.from_item(), empty.to_item()), (0, 0));
    }

    #[test]
    fn test_from_and_to_saturate_on_huge_page() {
        let page = LengthAwarePaginator::new(vec![1], 5, u64::MAX / 2, 10).unwrap();
        assert_eq!(page.from_item(), u64::MAX);
        assert_eq!(page.to_item(), 5);
        assert!(page.links().next.is_none());
    }

    #[test]
    fn test_links_carry_query_params() {
        let page = LengthAwarePaginator::new(vec![1], 45, 2, 15)
            .unwrap()
            .with_path("/api/users")
            .append("status", "active");

        let links = page.links();
        assert_eq!(links.first.as_deref(), Some("/api/users?status=active&page=1&per_page=15"));
        assert_eq!(links.prev.as_deref(), Some("/api/users?status=active&page=1&per_page=15"));
        assert_eq!(links.next.as_deref(), Some("/api/users?status=active&page=3&per_page=15"));
        assert_eq!(links.last.as_deref(), Some("/api/users?status=active&page=3&per_page=15"));
    }

    #[test]
    fn test_links_omitted_without_path() {
        let page = LengthAwarePaginator::new(vec![json!({"id": 1})], 1, 1, 15).unwrap();
        let value = serde_json::to_value(&page).unwrap();
        assert!(value.get("links").is_none());
        assert_eq!(value["meta"]["count"], json!(1));
        assert_eq!(value["meta"]["from"], json!(1));
        assert_eq!(value["meta"]["to"], json!(1));
    }
}
