//! Configuration loader and validator for the Engine→Webflow sync.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::http::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub app: App,
    pub engine: Engine,
    pub webflow: Webflow,
    #[serde(default)]
    pub retry: Retry,
    #[serde(default = "Sweep::archive_default")]
    pub archive: Sweep,
    #[serde(default = "Sweep::delete_default")]
    pub delete: Sweep,
}

/// Run pacing settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct App {
    pub delay_ms: u64,
    pub progress_every: usize,
    pub republish_created: bool,
}

impl Default for App {
    fn default() -> Self {
        Self {
            delay_ms: 1000,
            progress_every: 50,
            republish_created: true,
        }
    }
}

/// Source content API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Engine {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_true")]
    pub fetch_missing_content: bool,
}

/// Destination CMS settings and collection mappings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Webflow {
    pub token: String,
    #[serde(default = "default_webflow_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    pub collections: Collections,
    #[serde(default)]
    pub fields: FieldMap,
    #[serde(default)]
    pub reference_fields: ReferenceFields,
    #[serde(default = "default_category_color")]
    pub default_category_color: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Collections {
    pub articles: String,
    pub categories: String,
    pub tags: String,
}

/// One row of the source→destination mapping table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: String,
    #[serde(default)]
    pub required: bool,
}

impl FieldSpec {
    fn new(field: &str, required: bool) -> Self {
        Self {
            field: field.to_string(),
            required,
        }
    }
}

/// Destination field names keyed by source attribute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FieldMap {
    pub post_id: FieldSpec,
    pub title: FieldSpec,
    pub slug: FieldSpec,
    pub content: FieldSpec,
    pub desc: FieldSpec,
    pub timestamp: FieldSpec,
    pub updated_date: FieldSpec,
    pub cat: FieldSpec,
    pub tags: FieldSpec,
    pub color: FieldSpec,
    pub is_featured: FieldSpec,
    pub is_recurring: FieldSpec,
    pub featured_image_big: FieldSpec,
    pub featured_image_small: FieldSpec,
    pub last_synced: FieldSpec,
    pub sync_status: FieldSpec,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            post_id: FieldSpec::new("engine-post-id", true),
            title: FieldSpec::new("name", true),
            slug: FieldSpec::new("slug", true),
            content: FieldSpec::new("content", false),
            desc: FieldSpec::new("excerpt", false),
            timestamp: FieldSpec::new("publish-date", true),
            updated_date: FieldSpec::new("last-updated", false),
            cat: FieldSpec::new("category", true),
            tags: FieldSpec::new("tags", false),
            color: FieldSpec::new("category-color", false),
            is_featured: FieldSpec::new("is-featured", false),
            is_recurring: FieldSpec::new("is-recurring", false),
            featured_image_big: FieldSpec::new("featured-image", false),
            featured_image_small: FieldSpec::new("thumbnail", false),
            last_synced: FieldSpec::new("last-synced", true),
            sync_status: FieldSpec::new("sync-status", true),
        }
    }
}

impl FieldMap {
    fn specs(&self) -> [&FieldSpec; 16] {
        [
            &self.post_id,
            &self.title,
            &self.slug,
            &self.content,
            &self.desc,
            &self.timestamp,
            &self.updated_date,
            &self.cat,
            &self.tags,
            &self.color,
            &self.is_featured,
            &self.is_recurring,
            &self.featured_image_big,
            &self.featured_image_small,
            &self.last_synced,
            &self.sync_status,
        ]
    }
}

/// Field names inside the category and tag collections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReferenceFields {
    pub name: String,
    pub slug: String,
    pub color: String,
    pub category_type: String,
}

impl Default for ReferenceFields {
    fn default() -> Self {
        Self {
            name: "name".into(),
            slug: "slug".into(),
            color: "color".into(),
            category_type: "category-type".into(),
        }
    }
}

/// Request retry schedule shared by both remote clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Retry {
    pub delays_ms: Vec<u64>,
    pub rate_limit_wait_secs: u64,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            delays_ms: vec![1000, 2000, 4000, 5000],
            rate_limit_wait_secs: 60,
        }
    }
}

impl Retry {
    pub fn policy(&self, max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delays: self
                .delays_ms
                .iter()
                .copied()
                .map(Duration::from_millis)
                .collect(),
            rate_limit_wait: Duration::from_secs(self.rate_limit_wait_secs),
        }
    }
}

/// Which stored date decides a record's age.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DateField {
    LastUpdated,
    Published,
}

/// How archive/delete candidates are gathered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SweepStrategy {
    /// Preload the whole collection, filter and sort in memory.
    Preloaded,
    /// Page through the collection sorted oldest-first by the age field and
    /// stop at the first record on the recent side of the cutoff.
    SortedScan,
}

/// Settings for an archive or delete pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sweep {
    pub days_threshold: u32,
    pub date_field: DateField,
    #[serde(default = "default_strategy")]
    pub strategy: SweepStrategy,
    #[serde(default)]
    pub category_type: Option<String>,
}

impl Sweep {
    fn archive_default() -> Self {
        Self {
            days_threshold: 90,
            date_field: DateField::LastUpdated,
            strategy: SweepStrategy::Preloaded,
            category_type: None,
        }
    }

    fn delete_default() -> Self {
        Self {
            days_threshold: 365,
            date_field: DateField::Published,
            strategy: SweepStrategy::Preloaded,
            category_type: None,
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_webflow_base_url() -> String {
    "https://api.webflow.com/v2/".into()
}

fn default_category_color() -> String {
    "#000000".into()
}

fn default_page_size() -> u32 {
    100
}

fn default_strategy() -> SweepStrategy {
    SweepStrategy::Preloaded
}

impl Config {
    /// Override secrets and endpoints from the environment when present.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("WEBFLOW_API_TOKEN") {
            if !token.trim().is_empty() {
                self.webflow.token = token;
            }
        }
        if let Ok(url) = std::env::var("ENGINE_API_URL") {
            if !url.trim().is_empty() {
                self.engine.base_url = url;
            }
        }
    }
}

/// Load configuration from a YAML file, apply environment overrides and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env();
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.engine.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("engine.base_url must be non-empty"));
    }
    if cfg.engine.max_attempts == 0 {
        return Err(ConfigError::Invalid("engine.max_attempts must be > 0"));
    }

    let wf = &cfg.webflow;
    if wf.token.trim().is_empty() {
        return Err(ConfigError::Invalid("webflow.token must be non-empty"));
    }
    if wf.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("webflow.base_url must be non-empty"));
    }
    if wf.max_attempts == 0 {
        return Err(ConfigError::Invalid("webflow.max_attempts must be > 0"));
    }
    if wf.page_size == 0 {
        return Err(ConfigError::Invalid("webflow.page_size must be > 0"));
    }
    if wf.collections.articles.trim().is_empty() {
        return Err(ConfigError::Invalid("webflow.collections.articles must be non-empty"));
    }
    if wf.collections.categories.trim().is_empty() {
        return Err(ConfigError::Invalid("webflow.collections.categories must be non-empty"));
    }
    if wf.collections.tags.trim().is_empty() {
        return Err(ConfigError::Invalid("webflow.collections.tags must be non-empty"));
    }
    if wf.fields.specs().iter().any(|s| s.field.trim().is_empty()) {
        return Err(ConfigError::Invalid("webflow.fields entries must name a field"));
    }
    let rf = &wf.reference_fields;
    if rf.name.trim().is_empty() || rf.slug.trim().is_empty() {
        return Err(ConfigError::Invalid("webflow.reference_fields.name/slug must be non-empty"));
    }

    for sweep in [&cfg.archive, &cfg.delete] {
        if sweep.days_threshold == 0 || sweep.days_threshold > 3650 {
            return Err(ConfigError::Invalid("days_threshold must be within 1..=3650"));
        }
    }

    Ok(())
}

/// Returns an example YAML configuration.
pub fn example() -> &'static str {
    r##"app:
  delay_ms: 1000
  progress_every: 50
  republish_created: true

engine:
  base_url: "https://uat-brochure.engine.online/api/EngineNews"
  timeout_secs: 30
  max_attempts: 3
  fetch_missing_content: true

webflow:
  token: "YOUR_WEBFLOW_API_TOKEN"
  base_url: "https://api.webflow.com/v2/"
  collections:
    articles: "WEBFLOW_NEWS_COLLECTION_ID"
    categories: "WEBFLOW_NEWS_CATEGORY_COLLECTION_ID"
    tags: "WEBFLOW_NEWS_TAG_COLLECTION_ID"
  fields:
    updated_date:
      field: "last-updated"
  default_category_color: "#000000"

retry:
  delays_ms: [1000, 2000, 4000, 5000]
  rate_limit_wait_secs: 60

archive:
  days_threshold: 90
  date_field: last_updated
  strategy: preloaded

delete:
  days_threshold: 365
  date_field: published
  strategy: preloaded
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.webflow.fields.post_id.field, "engine-post-id");
        assert!(cfg.webflow.fields.post_id.required);
        assert_eq!(cfg.archive.date_field, DateField::LastUpdated);
        assert_eq!(cfg.delete.date_field, DateField::Published);
        assert_eq!(cfg.webflow.default_category_color, "#000000");
        assert_eq!(cfg.delete.days_threshold, 365);
    }

    #[test]
    fn partial_field_override_keeps_other_defaults() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        assert_eq!(cfg.webflow.fields.updated_date.field, "last-updated");
        assert!(!cfg.webflow.fields.updated_date.required);
        assert_eq!(cfg.webflow.fields.desc.field, "excerpt");
    }

    #[test]
    fn invalid_token() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.webflow.token = " ".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("webflow.token")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_collection_ids() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.webflow.collections.articles = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("collections.articles")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.webflow.collections.tags = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_thresholds() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.archive.days_threshold = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.delete.days_threshold = 5000;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn empty_mapped_field_rejected() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.webflow.fields.slug.field = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn retry_policy_from_config() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        let policy = cfg.retry.policy(cfg.webflow.max_attempts);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delays[2], Duration::from_secs(4));
        assert_eq!(policy.rate_limit_wait, Duration::from_secs(60));
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.webflow.collections.tags, "WEBFLOW_NEWS_TAG_COLLECTION_ID");
        assert_eq!(cfg.app.delay_ms, 1000);
    }
}
