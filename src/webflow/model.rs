//! Wire types for the Webflow collection items API.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A collection item as returned by list/create/update.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    #[serde(default)]
    pub field_data: Map<String, Value>,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_published: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

impl Item {
    /// A field rendered as a string; numbers are stringified, blanks are `None`.
    pub fn field_str(&self, name: &str) -> Option<String> {
        match self.field_data.get(name)? {
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ItemList {
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

/// Body for create and update calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemPayload {
    pub field_data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_draft: Option<bool>,
}

impl ItemPayload {
    pub fn fields(field_data: Map<String, Value>) -> Self {
        Self {
            field_data,
            ..Default::default()
        }
    }

    /// A live (non-archived, non-draft) item.
    pub fn live(field_data: Map<String, Value>) -> Self {
        Self {
            field_data,
            is_archived: Some(false),
            is_draft: Some(false),
        }
    }
}

/// Offset/limit paging plus raw query filters passed through to the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub offset: u32,
    pub limit: u32,
    pub filter: Vec<(String, String)>,
}

impl ListQuery {
    pub fn page(offset: u32, limit: u32) -> Self {
        Self {
            offset,
            limit,
            filter: Vec::new(),
        }
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter.push((key.into(), value.into()));
        self
    }

    pub fn filter_value(&self, key: &str) -> Option<&str> {
        self.filter
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = vec![
            ("offset".to_string(), self.offset.to_string()),
            ("limit".to_string(), self.limit.to_string()),
        ];
        query.extend(self.filter.iter().cloned());
        query
    }
}
