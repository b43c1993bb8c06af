use std::fmt;

use quarry_core::{Attributes, CursorPaginator, JsonValue, LengthAwarePaginator, OrmResult};
use quarry_orm::Record;

use crate::fields::{render_many, to_value};
use crate::resource::Resource;

/// Many records rendered through one resource.
///
/// Serializes as `{"data": [...]}`, with a `meta` object once
/// [`ResourceCollection::additional`] has added anything.
pub struct ResourceCollection<'r> {
    resource: &'r dyn Resource,
    records: Vec<Record>,
    additional: Attributes,
}

impl fmt::Debug for ResourceCollection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCollection")
            .field("records", &self.records.len())
            .field("additional", &self.additional)
            .finish()
    }
}

impl<'r> ResourceCollection<'r> {
    pub fn new(resource: &'r dyn Resource, records: Vec<Record>) -> Self {
        Self {
            resource,
            records,
            additional: Attributes::new(),
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Merge extra keys into `meta`.
    pub fn additional(mut self, meta: Attributes) -> Self {
        self.additional.extend(meta);
        self
    }

    pub fn filter<F>(mut self, mut predicate: F) -> Self
    where
        F: FnMut(&Record) -> bool,
    {
        self.records.retain(|record| predicate(record));
        self
    }

    /// The rendered records, without an envelope.
    pub fn data(&self) -> OrmResult<JsonValue> {
        render_many(self.resource, &self.records)
    }

    pub fn to_json(&self) -> OrmResult<JsonValue> {
        let mut out = Attributes::new();
        out.insert("data".to_string(), self.data()?);
        if !self.additional.is_empty() {
            out.insert("meta".to_string(), JsonValue::Object(self.additional.clone()));
        }
        Ok(JsonValue::Object(out))
    }

    /// Paginate the records in memory.
    ///
    /// `links` is only present when `path` is given; extra meta from
    /// [`ResourceCollection::additional`] is merged into `meta`.
    pub fn paginate(&self, page: u64, per_page: u64, path: Option<&str>) -> OrmResult<JsonValue> {
        let start = page.saturating_sub(1).saturating_mul(per_page);
        let slice: Vec<Record> = self
            .records
            .iter()
            .skip(usize::try_from(start).unwrap_or(usize::MAX))
            .take(usize::try_from(per_page).unwrap_or(usize::MAX))
            .cloned()
            .collect();

        let mut paginator =
            LengthAwarePaginator::new(slice, self.records.len() as u64, page, per_page)?;
        if let Some(path) = path {
            paginator = paginator.with_path(path);
        }
        let mut value = Self::from_paginator(self.resource, paginator)?;
        self.merge_meta(&mut value);
        Ok(value)
    }

    /// Render a page fetched with `QueryBuilder::paginate`.
    pub fn from_paginator(
        resource: &dyn Resource,
        paginator: LengthAwarePaginator<Record>,
    ) -> OrmResult<JsonValue> {
        let page = paginator.try_map(|record| resource.to_json(&record))?;
        to_value(&page)
    }

    /// Render a page fetched with `QueryBuilder::cursor_paginate`.
    pub fn from_cursor_paginator(
        resource: &dyn Resource,
        paginator: CursorPaginator<Record>,
    ) -> OrmResult<JsonValue> {
        let items = paginator
            .items()
            .iter()
            .map(|record| resource.to_json(record))
            .collect::<OrmResult<Vec<_>>>()?;
        let page = CursorPaginator::new(
            items,
            paginator.has_more(),
            paginator.cursor_field(),
            paginator.limit(),
            paginator.next_cursor().map(str::to_string),
            paginator.previous_cursor().map(str::to_string),
        );
        to_value(&page)
    }

    fn merge_meta(&self, value: &mut JsonValue) {
        if self.additional.is_empty() {
            return;
        }
        if let Some(JsonValue::Object(meta)) = value.get_mut("meta") {
            meta.extend(self.additional.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::RecordResource;
    use crate::resource::tests::post;
    use serde_json::json;

    fn posts(n: i64) -> Vec<Record> {
        (1..=n).map(|id| post(json!({"id": id}))).collect()
    }

    fn meta(value: JsonValue) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_meta_only_when_additional() {
        let plain = RecordResource.collection(posts(2)).to_json().unwrap();
        assert_eq!(plain, json!({"data": [{"id": 1}, {"id": 2}]}));

        let with_meta = RecordResource
            .collection(posts(1))
            .additional(meta(json!({"total_admins": 0})))
            .to_json()
            .unwrap();
        assert_eq!(with_meta["meta"], json!({"total_admins": 0}));
    }

    #[test]
    fn test_paginate_in_memory() {
        let page = RecordResource
            .collection(posts(5))
            .paginate(2, 2, Some("/api/posts"))
            .unwrap();

        assert_eq!(page["data"], json!([{"id": 3}, {"id": 4}]));
        assert_eq!(page["meta"]["current_page"], json!(2));
        assert_eq!(page["meta"]["total"], json!(5));
        assert_eq!(page["meta"]["total_pages"], json!(3));
        assert_eq!(page["meta"]["has_more"], json!(true));
        assert_eq!(page["links"]["first"], json!("/api/posts?page=1&per_page=2"));
        assert_eq!(page["links"]["next"], json!("/api/posts?page=3&per_page=2"));
    }

    #[test]
    fn test_paginate_without_path_has_no_links() {
        let page = RecordResource
            .collection(posts(1))
            .additional(meta(json!({"source": "cache"})))
            .paginate(1, 15, None)
            .unwrap();
        assert!(page.get("links").is_none());
        assert_eq!(page["meta"]["source"], json!("cache"));
        assert_eq!(page["meta"]["has_more"], json!(false));
    }

    #[test]
    fn test_paginate_rejects_zero_page() {
        assert!(RecordResource.collection(posts(1)).paginate(0, 15, None).is_err());
    }

    #[test]
    fn test_filter_keeps_matching_records() {
        let resource = RecordResource;
        let even = resource
            .collection(posts(4))
            .filter(|r| r.get("id").and_then(JsonValue::as_i64).is_some_and(|id| id % 2 == 0));
        assert_eq!(even.len(), 2);
    }

    #[test]
    fn test_from_cursor_paginator() {
        let page = CursorPaginator::new(posts(2), true, "id", 2, Some("2".into()), None);
        let value = ResourceCollection::from_cursor_paginator(&RecordResource, page).unwrap();
        assert_eq!(value["meta"]["next_cursor"], json!("2"));
        assert_eq!(value["data"][1]["id"], json!(2));
    }
}
