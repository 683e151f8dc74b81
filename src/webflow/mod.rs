use std::any::Any;
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::{ApiError, ErrorKind};
use crate::http::ApiClient;

pub mod model;

pub use model::{Item, ItemList, ItemPayload, ListQuery, Pagination};

/// Collection-scoped CRUD against the destination CMS.
#[async_trait]
pub trait CmsService: Send + Sync + Any {
    async fn list_items(&self, collection_id: &str, query: &ListQuery)
        -> Result<ItemList, ApiError>;

    async fn create_item(
        &self,
        collection_id: &str,
        payload: &ItemPayload,
    ) -> Result<Item, ApiError>;

    async fn update_item(
        &self,
        collection_id: &str,
        item_id: &str,
        payload: &ItemPayload,
    ) -> Result<Item, ApiError>;

    async fn delete_item(&self, collection_id: &str, item_id: &str) -> Result<(), ApiError>;

    async fn publish_items(&self, collection_id: &str, item_ids: &[String])
        -> Result<(), ApiError>;

    async fn unpublish_items(
        &self,
        collection_id: &str,
        item_ids: &[String],
    ) -> Result<(), ApiError>;
}

#[derive(Debug, Clone)]
pub struct WebflowClient {
    api: ApiClient,
}

impl WebflowClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn from_config(cfg: &Config) -> Result<Self, ApiError> {
        let api = ApiClient::new(
            &cfg.webflow.base_url,
            Some(cfg.webflow.token.clone()),
            Duration::from_secs(cfg.webflow.timeout_secs),
            cfg.retry.policy(cfg.webflow.max_attempts),
        )?;
        Ok(Self::new(api))
    }

    async fn item_request(
        &self,
        method: Method,
        endpoint: &str,
        body: &ItemPayload,
    ) -> Result<Item, ApiError> {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::new(ErrorKind::ValidationError, e.to_string()))?;
        self.api.request_json(method, endpoint, &[], Some(&body)).await
    }
}

#[async_trait]
impl CmsService for WebflowClient {
    async fn list_items(
        &self,
        collection_id: &str,
        query: &ListQuery,
    ) -> Result<ItemList, ApiError> {
        let endpoint = format!("collections/{}/items", collection_id);
        let list = self
            .api
            .request(Method::GET, &endpoint, &query.to_query(), None)
            .await?;
        match list {
            Some(value) => serde_json::from_value(value).map_err(|e| {
                ApiError::new(
                    ErrorKind::UnknownError,
                    format!("unexpected item list shape: {}", e),
                )
            }),
            None => Ok(ItemList::default()),
        }
    }

    async fn create_item(
        &self,
        collection_id: &str,
        payload: &ItemPayload,
    ) -> Result<Item, ApiError> {
        let endpoint = format!("collections/{}/items", collection_id);
        self.item_request(Method::POST, &endpoint, payload).await
    }

    async fn update_item(
        &self,
        collection_id: &str,
        item_id: &str,
        payload: &ItemPayload,
    ) -> Result<Item, ApiError> {
        let endpoint = format!("collections/{}/items/{}", collection_id, item_id);
        self.item_request(Method::PATCH, &endpoint, payload).await
    }

    async fn delete_item(&self, collection_id: &str, item_id: &str) -> Result<(), ApiError> {
        let endpoint = format!("collections/{}/items/{}", collection_id, item_id);
        self.api.request(Method::DELETE, &endpoint, &[], None).await?;
        Ok(())
    }

    async fn publish_items(
        &self,
        collection_id: &str,
        item_ids: &[String],
    ) -> Result<(), ApiError> {
        let endpoint = format!("collections/{}/items/publish", collection_id);
        let body = json!({ "itemIds": item_ids });
        self.api
            .request(Method::POST, &endpoint, &[], Some(&body))
            .await?;
        Ok(())
    }

    async fn unpublish_items(
        &self,
        collection_id: &str,
        item_ids: &[String],
    ) -> Result<(), ApiError> {
        let endpoint = format!("collections/{}/items/unpublish", collection_id);
        let body = json!({ "itemIds": item_ids });
        self.api
            .request(Method::POST, &endpoint, &[], Some(&body))
            .await?;
        Ok(())
    }
}

/// Page through a whole collection (optionally filtered/sorted by `filter`).
pub async fn list_all_items(
    cms: &dyn CmsService,
    collection_id: &str,
    page_size: u32,
    filter: &[(String, String)],
) -> Result<Vec<Item>, ApiError> {
    let page_size = page_size.max(1);
    let mut items = Vec::new();
    let mut offset = 0u32;
    loop {
        let mut query = ListQuery::page(offset, page_size);
        query.filter = filter.to_vec();
        let page = cms.list_items(collection_id, &query).await?;
        if page.items.is_empty() {
            break;
        }
        let fetched = page.items.len();
        items.extend(page.items);
        if !has_more(page.pagination, offset, page_size, fetched) {
            break;
        }
        offset += page_size;
    }
    Ok(items)
}

/// Whether another page follows the one at `offset`.
pub fn has_more(pagination: Option<Pagination>, offset: u32, limit: u32, fetched: usize) -> bool {
    match pagination {
        Some(p) => u64::from(offset) + u64::from(limit) < p.total,
        None => fetched >= limit as usize,
    }
}

/// Load the whole collection once, indexed by the stringified source key.
/// Items without a source key are left out.
#[instrument(skip(cms))]
pub async fn preload_all_items(
    cms: &dyn CmsService,
    collection_id: &str,
    post_id_field: &str,
    page_size: u32,
) -> Result<HashMap<String, Item>, ApiError> {
    let items = list_all_items(cms, collection_id, page_size, &[]).await?;
    let total = items.len();
    let mut index = HashMap::with_capacity(total);
    for item in items {
        let Some(post_id) = item.field_str(post_id_field) else {
            debug!(item_id = %item.id, "item has no source key; not indexed");
            continue;
        };
        if let Some(existing) = index.get(&post_id) {
            let existing: &Item = existing;
            warn!(
                post_id = %post_id,
                kept = %existing.id,
                dropped = %item.id,
                "duplicate source key in collection"
            );
            continue;
        }
        index.insert(post_id, item);
    }
    info!(total, indexed = index.len(), "preloaded destination collection");
    Ok(index)
}

/// Scan the collection page by page until an item carries `post_id`.
/// O(collection size) per call; prefer [`preload_all_items`] for runs.
#[instrument(skip(cms))]
pub async fn find_item_by_post_id(
    cms: &dyn CmsService,
    collection_id: &str,
    post_id_field: &str,
    post_id: &str,
    page_size: u32,
) -> Result<Option<Item>, ApiError> {
    let page_size = page_size.max(1);
    let mut offset = 0u32;
    loop {
        let page = cms
            .list_items(collection_id, &ListQuery::page(offset, page_size))
            .await?;
        if page.items.is_empty() {
            return Ok(None);
        }
        let fetched = page.items.len();
        if let Some(found) = page
            .items
            .into_iter()
            .find(|item| item.field_str(post_id_field).as_deref() == Some(post_id))
        {
            return Ok(Some(found));
        }
        if !has_more(page.pagination, offset, page_size, fetched) {
            return Ok(None);
        }
        offset += page_size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_more_uses_total_when_present() {
        let p = Some(Pagination {
            offset: 0,
            limit: 100,
            total: 150,
        });
        assert!(has_more(p, 0, 100, 100));
        assert!(!has_more(p, 100, 100, 50));
        assert!(!has_more(
            Some(Pagination {
                offset: 0,
                limit: 100,
                total: 100
            }),
            0,
            100,
            100
        ));
    }

    #[test]
    fn has_more_without_pagination_uses_page_fill() {
        assert!(has_more(None, 0, 2, 2));
        assert!(!has_more(None, 0, 2, 1));
    }
}
