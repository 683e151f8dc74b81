//! Source-side domain types as delivered by the Engine API.
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A read-only snapshot of one source article.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceArticle {
    #[serde(default, deserialize_with = "de_key")]
    pub post_id: String,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub desc: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub updated_date: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub cat: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub color: Option<String>,
    #[serde(default, deserialize_with = "de_tags")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "de_flag")]
    pub is_featured: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub is_recurring: bool,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub featured_image_big: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub featured_image_small: Option<String>,
}

impl SourceArticle {
    pub fn title_or_empty(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    /// Date used for recency ordering: last edit, else publication.
    pub fn recency_date(&self) -> Option<&str> {
        self.updated_date.as_deref().or(self.timestamp.as_deref())
    }
}

/// A source category as listed by the Engine API.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceCategory {
    #[serde(default, deserialize_with = "de_key")]
    pub cat_id: String,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub cat_name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub color: Option<String>,
}

/// One page of articles for a category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryPage {
    pub articles: Vec<SourceArticle>,
    pub total_records: Option<u64>,
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Source keys arrive as either numbers or strings.
fn de_key<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(scalar_to_string(value).unwrap_or_default())
}

/// Blank strings are treated the same as missing values.
fn de_opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(scalar_to_string(value))
}

fn de_flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64().map(|v| v != 0).unwrap_or(false),
        Value::String(s) => matches!(s.trim(), "1" | "true" | "True" | "TRUE"),
        _ => false,
    })
}

/// Tags are a list, but exports sometimes carry a comma-separated string.
fn de_tags<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match value {
        Value::Array(items) => items.into_iter().filter_map(scalar_to_string).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    })
}
