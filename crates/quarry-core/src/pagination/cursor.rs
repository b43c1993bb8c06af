use serde::Serialize;
use serde::ser::Serializer;

/// Keyset page: the cursors are the boundary values of the cursor field.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorPaginator<T> {
    items: Vec<T>,
    has_more: bool,
    cursor_field: String,
    limit: u64,
    next_cursor: Option<String>,
    previous_cursor: Option<String>,
}

impl<T> CursorPaginator<T> {
    pub fn new(
        items: Vec<T>,
        has_more: bool,
        cursor_field: impl Into<String>,
        limit: u64,
        next_cursor: Option<String>,
        previous_cursor: Option<String>,
    ) -> Self {
        Self {
            items,
            has_more,
            cursor_field: cursor_field.into(),
            limit,
            next_cursor,
            previous_cursor,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn cursor_field(&self) -> &str {
        &self.cursor_field
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn next_cursor(&self) -> Option<&str> {
        self.next_cursor.as_deref()
    }

    pub fn previous_cursor(&self) -> Option<&str> {
        self.previous_cursor.as_deref()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> CursorPaginator<U> {
        CursorPaginator {
            items: self.items.into_iter().map(f).collect(),
            has_more: self.has_more,
            cursor_field: self.cursor_field,
            limit: self.limit,
            next_cursor: self.next_cursor,
            previous_cursor: self.previous_cursor,
        }
    }
}

#[derive(Serialize)]
struct Meta<'a> {
    has_more: bool,
    next_cursor: Option<&'a str>,
    previous_cursor: Option<&'a str>,
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    data: &'a [T],
    meta: Meta<'a>,
}

impl<T: Serialize> Serialize for CursorPaginator<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Envelope {
            data: &self.items,
            meta: Meta {
                has_more: self.has_more,
                next_cursor: self.next_cursor(),
                previous_cursor: self.previous_cursor(),
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
    fn test_serializes_cursor_meta() {
        let page = CursorPaginator::new(vec![1, 2], true, "id", 2, Some("2".into()), None);
        assert_eq!(
            serde_json::to_value(&page).unwrap(),
            json!({
                "data": [1, 2],
                "meta": {"has_more": true, "next_cursor": "2", "previous_cursor": null}
            })
        );
    }
}
