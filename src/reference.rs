//! Category and tag upsert with a per-run name→id cache.
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::try_join_all;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::config::{Config, ReferenceFields};
use crate::error::{ApiError, ErrorKind};
use crate::summary::CacheStats;
use crate::transform::slugify;
use crate::webflow::{CmsService, ItemPayload, ListQuery};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefKind {
    Category,
    Tag,
}

/// Resolves reference names to destination ids, creating and publishing
/// missing records on first use. One resolver per run.
pub struct ReferenceResolver {
    cms: Arc<dyn CmsService>,
    categories_collection: String,
    tags_collection: String,
    fields: ReferenceFields,
    default_color: String,
    categories: Mutex<HashMap<String, String>>,
    tags: Mutex<HashMap<String, String>>,
}

fn normalize_name(name: &str) -> String {
    name.trim().to_string()
}

fn guard(map: &Mutex<HashMap<String, String>>) -> MutexGuard<'_, HashMap<String, String>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ReferenceResolver {
    pub fn new(cms: Arc<dyn CmsService>, cfg: &Config) -> Self {
        Self {
            cms,
            categories_collection: cfg.webflow.collections.categories.clone(),
            tags_collection: cfg.webflow.collections.tags.clone(),
            fields: cfg.webflow.reference_fields.clone(),
            default_color: cfg.webflow.default_category_color.clone(),
            categories: Mutex::new(HashMap::new()),
            tags: Mutex::new(HashMap::new()),
        }
    }

    fn cache(&self, kind: RefKind) -> &Mutex<HashMap<String, String>> {
        match kind {
            RefKind::Category => &self.categories,
            RefKind::Tag => &self.tags,
        }
    }

    fn collection(&self, kind: RefKind) -> &str {
        match kind {
            RefKind::Category => &self.categories_collection,
            RefKind::Tag => &self.tags_collection,
        }
    }

    /// Id of the category called `name`, created with `color` (or the
    /// configured default) when it does not exist yet.
    #[instrument(skip(self))]
    pub async fn ensure_category_exists(
        &self,
        name: &str,
        color: Option<&str>,
    ) -> Result<String, ApiError> {
        let color = color
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.default_color)
            .to_string();
        self.ensure(RefKind::Category, name, Some(color)).await
    }

    #[instrument(skip(self))]
    pub async fn ensure_tag_exists(&self, name: &str) -> Result<String, ApiError> {
        self.ensure(RefKind::Tag, name, None).await
    }

    /// Resolve a tag list concurrently. Blank names are dropped and repeated
    /// names resolve once; ids follow the first occurrence of each name.
    pub async fn ensure_tags_exist(&self, names: &[String]) -> Result<Vec<String>, ApiError> {
        let mut seen = HashSet::new();
        let unique: Vec<String> = names
            .iter()
            .map(|n| normalize_name(n))
            .filter(|n| !n.is_empty() && seen.insert(n.clone()))
            .collect();
        if unique.is_empty() {
            return Ok(Vec::new());
        }
        try_join_all(unique.iter().map(|name| self.ensure_tag_exists(name))).await
    }

    async fn ensure(
        &self,
        kind: RefKind,
        name: &str,
        color: Option<String>,
    ) -> Result<String, ApiError> {
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(ApiError::new(
                ErrorKind::ValidationError,
                format!("{:?} name is required", kind).to_lowercase(),
            ));
        }
        let cached = guard(self.cache(kind)).get(&name).cloned();
        if let Some(id) = cached {
            return Ok(id);
        }

        let collection = self.collection(kind);
        let query = ListQuery::page(0, 1).with_filter(self.fields.name.clone(), name.clone());
        let found = self.cms.list_items(collection, &query).await?;
        // The filter is advisory on some API versions; only trust exact matches.
        if let Some(item) = found
            .items
            .into_iter()
            .find(|item| item.field_str(&self.fields.name).as_deref() == Some(name.as_str()))
        {
            debug!(?kind, name = %name, id = %item.id, "reference found");
            guard(self.cache(kind)).insert(name, item.id.clone());
            return Ok(item.id);
        }

        let mut field_data = Map::new();
        field_data.insert(self.fields.name.clone(), Value::String(name.clone()));
        field_data.insert(self.fields.slug.clone(), Value::String(slugify(&name)));
        if let Some(color) = color {
            field_data.insert(self.fields.color.clone(), Value::String(color));
        }
        let created = self
            .cms
            .create_item(collection, &ItemPayload::fields(field_data))
            .await?;
        self.cms
            .publish_items(collection, std::slice::from_ref(&created.id))
            .await?;
        info!(?kind, name = %name, id = %created.id, "reference created");

        // A concurrent resolution may have won the race; keep the first id.
        let mut cache = guard(self.cache(kind));
        let id = cache.entry(name).or_insert(created.id).clone();
        Ok(id)
    }

    pub fn cache_stats(&self) -> CacheStats {
        let categories = guard(&self.categories).len();
        let tags = guard(&self.tags).len();
        CacheStats {
            categories,
            tags,
            total: categories + tags,
        }
    }
}
