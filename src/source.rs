//! Source reader for the Engine news API.
use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::dates::parse_timestamp;
use crate::error::{ApiError, ErrorKind};
use crate::http::ApiClient;
use crate::model::{CategoryPage, SourceArticle, SourceCategory};

pub const RECENT_POSTS: &str = "GetRecentPosts";
pub const POST_BY_ID: &str = "GetPostById";
pub const POSTS_BY_CATEGORY: &str = "GetPostsByCategory";
pub const ALL_CATEGORIES: &str = "GetAllCategories";

/// Read access to the upstream content system.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// The `count` most recently edited articles, deduplicated, newest first.
    async fn get_recent_posts(&self, count: usize) -> Result<Vec<SourceArticle>, ApiError>;

    /// Full detail for one article, including the body.
    async fn get_post_by_id(&self, post_id: &str) -> Result<SourceArticle, ApiError>;

    async fn get_all_categories(&self) -> Result<Vec<SourceCategory>, ApiError>;

    /// One page (1-based) of a category's articles.
    async fn get_posts_by_category(
        &self,
        cat_id: &str,
        limit: u32,
        page: u32,
    ) -> Result<CategoryPage, ApiError>;
}

#[derive(Debug, Clone)]
pub struct EngineClient {
    api: ApiClient,
}

impl EngineClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn from_config(cfg: &Config) -> Result<Self, ApiError> {
        let api = ApiClient::new(
            &cfg.engine.base_url,
            None,
            Duration::from_secs(cfg.engine.timeout_secs),
            cfg.retry.policy(cfg.engine.max_attempts),
        )?;
        Ok(Self::new(api))
    }

    async fn get(&self, endpoint: &str, query: Vec<(String, String)>) -> Result<Value, ApiError> {
        let body = self.api.request(Method::GET, endpoint, &query, None).await?;
        Ok(body.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl ArticleSource for EngineClient {
    #[instrument(skip(self))]
    async fn get_recent_posts(&self, count: usize) -> Result<Vec<SourceArticle>, ApiError> {
        let body = self
            .get(RECENT_POSTS, vec![("recent".into(), count.to_string())])
            .await?;
        if body.is_null() {
            warn!("recent posts response was empty");
            return Ok(Vec::new());
        }
        let articles = flatten_sections(&body);
        let recent = select_recent(articles, count);
        info!(returned = recent.len(), "fetched recent posts");
        Ok(recent)
    }

    #[instrument(skip(self))]
    async fn get_post_by_id(&self, post_id: &str) -> Result<SourceArticle, ApiError> {
        let post_id = post_id.trim();
        if post_id.is_empty() {
            return Err(ApiError::new(
                ErrorKind::NotFoundError,
                "postId is required for GetPostById",
            ));
        }
        let body = self
            .get(POST_BY_ID, vec![("postId".into(), post_id.to_string())])
            .await?;
        let detail = match body {
            Value::Object(mut map) if map.contains_key("post") => {
                map.remove("post").unwrap_or(Value::Null)
            }
            other => other,
        };
        if !detail.is_object() {
            return Err(ApiError::new(
                ErrorKind::NotFoundError,
                format!("post {} not found", post_id),
            ));
        }
        serde_json::from_value(detail).map_err(|e| {
            ApiError::new(
                ErrorKind::UnknownError,
                format!("unexpected post detail shape for {}: {}", post_id, e),
            )
        })
    }

    #[instrument(skip(self))]
    async fn get_all_categories(&self) -> Result<Vec<SourceCategory>, ApiError> {
        let body = self.get(ALL_CATEGORIES, Vec::new()).await?;
        let list = match body {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("categories") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        Ok(list
            .into_iter()
            .filter_map(|v| serde_json::from_value::<SourceCategory>(v).ok())
            .filter(|c| !c.cat_id.is_empty())
            .collect())
    }

    #[instrument(skip(self))]
    async fn get_posts_by_category(
        &self,
        cat_id: &str,
        limit: u32,
        page: u32,
    ) -> Result<CategoryPage, ApiError> {
        if cat_id.trim().is_empty() {
            return Err(ApiError::new(
                ErrorKind::NotFoundError,
                "catId is required for GetPostsByCategory",
            ));
        }
        let body = self
            .get(
                POSTS_BY_CATEGORY,
                vec![
                    ("catId".into(), cat_id.to_string()),
                    ("Limit".into(), limit.to_string()),
                    ("Page".into(), page.to_string()),
                ],
            )
            .await?;
        let total_records = body.get("totalRecords").and_then(Value::as_u64);
        Ok(CategoryPage {
            articles: flatten_sections(&body),
            total_records,
        })
    }
}

/// Collect every article from a sectioned response.
///
/// `featured` comes first so that it wins deduplication. Other top-level
/// arrays follow in key order; objects of arrays are appended section by
/// section with numeric keys in numeric order.
pub fn flatten_sections(body: &Value) -> Vec<SourceArticle> {
    let mut raw: Vec<&Value> = Vec::new();
    match body {
        Value::Array(items) => raw.extend(items),
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get("featured") {
                raw.extend(items);
            }
            for (key, value) in map {
                if key == "featured" {
                    continue;
                }
                match value {
                    Value::Array(items) => raw.extend(items),
                    Value::Object(sections) => {
                        let mut keyed: Vec<(&String, &Value)> = sections.iter().collect();
                        keyed.sort_by(|(a, _), (b, _)| section_order(a, b));
                        for (_, section) in keyed {
                            if let Value::Array(items) = section {
                                raw.extend(items);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }

    raw.into_iter()
        .filter(|v| v.is_object())
        .filter_map(|v| match serde_json::from_value::<SourceArticle>(v.clone()) {
            Ok(article) => Some(article),
            Err(err) => {
                warn!(?err, "skipping malformed source article");
                None
            }
        })
        .collect()
}

/// Numeric section keys sort numerically and ahead of named ones.
fn section_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Keep the first occurrence of every `postId`; drop entries without one.
pub fn dedupe_by_post_id(articles: Vec<SourceArticle>) -> Vec<SourceArticle> {
    let mut seen = HashSet::new();
    articles
        .into_iter()
        .filter(|a| !a.post_id.is_empty() && seen.insert(a.post_id.clone()))
        .collect()
}

/// Newest first by `updatedDate`, falling back to `timestamp`. Undated
/// articles sort last; equal dates are ordered by `postId`.
pub fn sort_by_recency(articles: &mut [SourceArticle]) {
    articles.sort_by(|a, b| {
        let da = a.recency_date().and_then(parse_timestamp);
        let db = b.recency_date().and_then(parse_timestamp);
        match db.cmp(&da) {
            Ordering::Equal => a.post_id.cmp(&b.post_id),
            other => other,
        }
    });
}

/// Dedupe, sort by recency and truncate to `count`.
pub fn select_recent(articles: Vec<SourceArticle>, count: usize) -> Vec<SourceArticle> {
    let mut unique = dedupe_by_post_id(articles);
    sort_by_recency(&mut unique);
    unique.truncate(count);
    unique
}
