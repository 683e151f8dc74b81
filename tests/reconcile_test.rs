use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use engine_webflow_sync::config::{self, Config, SweepStrategy};
use engine_webflow_sync::dates::format_timestamp;
use engine_webflow_sync::model::{CategoryPage, SourceArticle, SourceCategory};
use engine_webflow_sync::source::{select_recent, ArticleSource};
use engine_webflow_sync::summary::SkipReason;
use engine_webflow_sync::webflow::{CmsService, Item, ItemList, ItemPayload, ListQuery, Pagination};
use engine_webflow_sync::{ApiError, ErrorKind, MigrationOptions, Reconciler};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;

const ARTICLES: &str = "WEBFLOW_NEWS_COLLECTION_ID";
const CATEGORIES: &str = "WEBFLOW_NEWS_CATEGORY_COLLECTION_ID";
const TAGS: &str = "WEBFLOW_NEWS_TAG_COLLECTION_ID";

#[derive(Debug, Clone, PartialEq)]
enum Call {
    List(String),
    Create(String, Map<String, Value>),
    Update(String, String, ItemPayload),
    Delete(String, String),
    Publish(String, Vec<String>),
    Unpublish(String, Vec<String>),
}

#[derive(Default)]
struct CmsState {
    collections: HashMap<String, Vec<Item>>,
    next_id: usize,
    calls: Vec<Call>,
    create_failures: VecDeque<ApiError>,
    list_failure: Option<ApiError>,
}

#[derive(Clone, Default)]
struct RecordingCms {
    state: Arc<Mutex<CmsState>>,
}

impl RecordingCms {
    fn with_items(collection: &str, items: Vec<Item>) -> Self {
        let cms = Self::default();
        cms.state
            .try_lock()
            .unwrap()
            .collections
            .insert(collection.to_string(), items);
        cms
    }

    async fn seed(&self, collection: &str, items: Vec<Item>) {
        self.state
            .lock()
            .await
            .collections
            .entry(collection.to_string())
            .or_default()
            .extend(items);
    }

    async fn fail_creates(&self, errors: Vec<ApiError>) {
        self.state.lock().await.create_failures.extend(errors);
    }

    async fn calls(&self) -> Vec<Call> {
        self.state.lock().await.calls.clone()
    }

    async fn mutations(&self) -> Vec<Call> {
        self.calls()
            .await
            .into_iter()
            .filter(|c| !matches!(c, Call::List(_)))
            .collect()
    }

    async fn creates_in(&self, collection: &str) -> Vec<Map<String, Value>> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|c| match c {
                Call::Create(col, fields) if col == collection => Some(fields),
                _ => None,
            })
            .collect()
    }

    async fn publishes_in(&self, collection: &str) -> Vec<Vec<String>> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|c| match c {
                Call::Publish(col, ids) if col == collection => Some(ids),
                _ => None,
            })
            .collect()
    }

    async fn items(&self, collection: &str) -> Vec<Item> {
        self.state
            .lock()
            .await
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl CmsService for RecordingCms {
    async fn list_items(&self, collection_id: &str, query: &ListQuery) -> Result<ItemList, ApiError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::List(collection_id.to_string()));
        if collection_id == ARTICLES {
            if let Some(err) = state.list_failure.clone() {
                return Err(err);
            }
        }
        let mut items = state
            .collections
            .get(collection_id)
            .cloned()
            .unwrap_or_default();
        if let Some(name) = query.filter_value("name") {
            items.retain(|i| i.field_str("name").as_deref() == Some(name));
        }
        if let Some(field) = query.filter_value("sortBy") {
            items.sort_by_key(|i| i.field_str(field));
        }
        let total = items.len() as u64;
        let page = items
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect();
        Ok(ItemList {
            items: page,
            pagination: Some(Pagination {
                offset: u64::from(query.offset),
                limit: u64::from(query.limit),
                total,
            }),
        })
    }

    async fn create_item(&self, collection_id: &str, payload: &ItemPayload) -> Result<Item, ApiError> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(Call::Create(collection_id.to_string(), payload.field_data.clone()));
        if collection_id == ARTICLES {
            if let Some(err) = state.create_failures.pop_front() {
                return Err(err);
            }
        }
        state.next_id += 1;
        let item = Item {
            id: format!("{}-{}", collection_id.to_lowercase(), state.next_id),
            field_data: payload.field_data.clone(),
            is_archived: payload.is_archived.unwrap_or(false),
            is_draft: payload.is_draft.unwrap_or(false),
            ..Default::default()
        };
        state
            .collections
            .entry(collection_id.to_string())
            .or_default()
            .push(item.clone());
        Ok(item)
    }

    async fn update_item(
        &self,
        collection_id: &str,
        item_id: &str,
        payload: &ItemPayload,
    ) -> Result<Item, ApiError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::Update(
            collection_id.to_string(),
            item_id.to_string(),
            payload.clone(),
        ));
        let item = state
            .collections
            .get_mut(collection_id)
            .and_then(|items| items.iter_mut().find(|i| i.id == item_id))
            .ok_or_else(|| ApiError::with_status(ErrorKind::NotFoundError, 404, "no such item"))?;
        for (k, v) in &payload.field_data {
            item.field_data.insert(k.clone(), v.clone());
        }
        if let Some(archived) = payload.is_archived {
            item.is_archived = archived;
        }
        if let Some(draft) = payload.is_draft {
            item.is_draft = draft;
        }
        Ok(item.clone())
    }

    async fn delete_item(&self, collection_id: &str, item_id: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(Call::Delete(collection_id.to_string(), item_id.to_string()));
        if let Some(items) = state.collections.get_mut(collection_id) {
            items.retain(|i| i.id != item_id);
        }
        Ok(())
    }

    async fn publish_items(&self, collection_id: &str, item_ids: &[String]) -> Result<(), ApiError> {
        self.state
            .lock()
            .await
            .calls
            .push(Call::Publish(collection_id.to_string(), item_ids.to_vec()));
        Ok(())
    }

    async fn unpublish_items(&self, collection_id: &str, item_ids: &[String]) -> Result<(), ApiError> {
        self.state
            .lock()
            .await
            .calls
            .push(Call::Unpublish(collection_id.to_string(), item_ids.to_vec()));
        Ok(())
    }
}

#[derive(Default)]
struct FakeSource {
    recent: Vec<SourceArticle>,
    details: HashMap<String, SourceArticle>,
    categories: Vec<SourceCategory>,
    by_category: HashMap<String, Vec<SourceArticle>>,
    fail_recent: bool,
    detail_calls: Mutex<Vec<String>>,
}

#[async_trait]
impl ArticleSource for FakeSource {
    async fn get_recent_posts(&self, count: usize) -> Result<Vec<SourceArticle>, ApiError> {
        if self.fail_recent {
            return Err(ApiError::with_status(ErrorKind::ServerError, 503, "down"));
        }
        Ok(select_recent(self.recent.clone(), count))
    }

    async fn get_post_by_id(&self, post_id: &str) -> Result<SourceArticle, ApiError> {
        self.detail_calls.lock().await.push(post_id.to_string());
        self.details
            .get(post_id)
            .cloned()
            .ok_or_else(|| ApiError::new(ErrorKind::NotFoundError, "missing"))
    }

    async fn get_all_categories(&self) -> Result<Vec<SourceCategory>, ApiError> {
        Ok(self.categories.clone())
    }

    async fn get_posts_by_category(
        &self,
        cat_id: &str,
        limit: u32,
        page: u32,
    ) -> Result<CategoryPage, ApiError> {
        let all = self.by_category.get(cat_id).cloned().unwrap_or_default();
        let start = ((page - 1) * limit) as usize;
        Ok(CategoryPage {
            total_records: Some(all.len() as u64),
            articles: all.into_iter().skip(start).take(limit as usize).collect(),
        })
    }
}

fn test_config() -> Config {
    let mut cfg: Config = serde_yaml::from_str(config::example()).unwrap();
    cfg.app.delay_ms = 0;
    cfg
}

fn article(post_id: &str, updated: &str) -> SourceArticle {
    SourceArticle {
        post_id: post_id.into(),
        title: Some(format!("Article {}", post_id)),
        slug: Some(format!("article-{}", post_id)),
        content: Some("<p>Body</p>".into()),
        timestamp: Some("2024-01-01T00:00:00Z".into()),
        updated_date: Some(updated.into()),
        cat: Some("Markets".into()),
        ..Default::default()
    }
}

fn stored(id: &str, post_id: &str, last_updated: &str) -> Item {
    let field_data = json!({
        "engine-post-id": post_id,
        "name": format!("Article {}", post_id),
        "slug": format!("article-{}", post_id),
        "last-updated": last_updated,
    });
    Item {
        id: id.into(),
        field_data: field_data.as_object().unwrap().clone(),
        ..Default::default()
    }
}

fn aged(id: &str, days: i64, field: &str) -> Item {
    let date = format_timestamp(&(Utc::now() - Duration::days(days)));
    let mut item = stored(id, &format!("p-{}", id), "");
    item.field_data.remove("last-updated");
    item.field_data.insert(field.into(), json!(date));
    item
}

fn engine(source: FakeSource, cms: &RecordingCms, cfg: &Config) -> Reconciler {
    Reconciler::new(Arc::new(source), Arc::new(cms.clone()), cfg)
}

#[tokio::test]
async fn new_article_is_created_then_published_once() {
    let mut cfg = test_config();
    cfg.app.republish_created = false;
    let cms = RecordingCms::default();
    let source = FakeSource {
        recent: vec![article("1", "2024-01-10T00:00:00Z")],
        ..Default::default()
    };

    let summary = engine(source, &cms, &cfg).run_sync(20).await.unwrap();

    assert_eq!(summary.created, vec!["1"]);
    assert!(summary.errors.is_empty());
    let creates = cms.creates_in(ARTICLES).await;
    assert_eq!(creates.len(), 1);
    assert_eq!(creates[0]["engine-post-id"], json!("1"));
    assert_eq!(creates[0]["slug"], json!("article-1"));
    let created_id = cms.items(ARTICLES).await[0].id.clone();
    assert_eq!(cms.publishes_in(ARTICLES).await, vec![vec![created_id]]);
    assert_eq!(cms.creates_in(CATEGORIES).await.len(), 1);
    assert_eq!(summary.cache.unwrap().categories, 1);
}

#[tokio::test]
async fn created_ids_are_republished_at_the_end() {
    let cfg = test_config();
    let cms = RecordingCms::default();
    let source = FakeSource {
        recent: vec![
            article("1", "2024-01-10T00:00:00Z"),
            article("2", "2024-01-11T00:00:00Z"),
        ],
        ..Default::default()
    };

    engine(source, &cms, &cfg).run_sync(20).await.unwrap();

    let publishes = cms.publishes_in(ARTICLES).await;
    assert_eq!(publishes.len(), 3);
    assert_eq!(publishes[2].len(), 2);
}

#[tokio::test]
async fn unchanged_article_is_skipped_without_mutations() {
    let cfg = test_config();
    let cms = RecordingCms::with_items(
        ARTICLES,
        vec![stored("item-1", "1", "2024-01-10T00:00:00.000Z")],
    );
    let source = FakeSource {
        recent: vec![article("1", "2024-01-09T00:00:00Z")],
        ..Default::default()
    };

    let summary = engine(source, &cms, &cfg).run_sync(20).await.unwrap();

    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.skipped[0].reason, SkipReason::NoChanges);
    assert!(cms.mutations().await.is_empty());
}

#[tokio::test]
async fn newer_article_updates_without_slug() {
    let mut cfg = test_config();
    cfg.app.republish_created = false;
    let cms = RecordingCms::with_items(
        ARTICLES,
        vec![stored("item-1", "1", "2024-01-01T00:00:00.000Z")],
    );
    let source = FakeSource {
        recent: vec![article("1", "2024-01-02T00:00:00Z")],
        ..Default::default()
    };

    let summary = engine(source, &cms, &cfg).run_sync(20).await.unwrap();

    assert_eq!(summary.updated, vec!["1"]);
    let updates: Vec<_> = cms
        .calls()
        .await
        .into_iter()
        .filter_map(|c| match c {
            Call::Update(col, id, payload) if col == ARTICLES => Some((id, payload)),
            _ => None,
        })
        .collect();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, "item-1");
    assert!(!updates[0].1.field_data.contains_key("slug"));
    assert_eq!(
        updates[0].1.field_data["last-updated"],
        json!("2024-01-02T00:00:00.000Z")
    );
    assert_eq!(
        cms.publishes_in(ARTICLES).await,
        vec![vec!["item-1".to_string()]]
    );
}

#[tokio::test]
async fn second_run_without_source_changes_is_all_skips() {
    let cfg = test_config();
    let cms = RecordingCms::default();
    let recent = vec![
        article("1", "2024-01-10T00:00:00Z"),
        article("2", "2024-01-12T00:00:00Z"),
    ];

    let first = FakeSource {
        recent: recent.clone(),
        ..Default::default()
    };
    let summary = engine(first, &cms, &cfg).run_sync(20).await.unwrap();
    assert_eq!(summary.created.len(), 2);

    let second = FakeSource {
        recent,
        ..Default::default()
    };
    let summary = engine(second, &cms, &cfg).run_sync(20).await.unwrap();
    assert!(summary.created.is_empty());
    assert!(summary.updated.is_empty());
    assert_eq!(summary.skipped_with(SkipReason::NoChanges), 2);
}

#[tokio::test]
async fn shared_category_is_created_once() {
    let cfg = test_config();
    let cms = RecordingCms::default();
    let mut second = article("2", "2024-01-12T00:00:00Z");
    second.cat = Some("  Markets ".into());
    second.tags = vec!["LNG".into(), "LNG".into(), "Ammonia".into()];
    let source = FakeSource {
        recent: vec![article("1", "2024-01-10T00:00:00Z"), second],
        ..Default::default()
    };

    let summary = engine(source, &cms, &cfg).run_sync(20).await.unwrap();

    assert_eq!(summary.created.len(), 2);
    let categories = cms.creates_in(CATEGORIES).await;
    assert_eq!(categories.len(), 1);
    let category_id = cms.items(CATEGORIES).await[0].id.clone();
    for item in cms.items(ARTICLES).await {
        assert_eq!(item.field_data["category"], json!(category_id));
    }
    assert_eq!(cms.creates_in(TAGS).await.len(), 2);
    let cache = summary.cache.unwrap();
    assert_eq!((cache.categories, cache.tags, cache.total), (1, 2, 3));
}

#[tokio::test]
async fn slug_conflict_retries_once_with_hashed_slug() {
    let cfg = test_config();
    let cms = RecordingCms::default();
    cms.fail_creates(vec![ApiError::with_status(
        ErrorKind::SlugConflict,
        400,
        "slug: Unique value is already in database",
    )])
    .await;
    let source = FakeSource {
        recent: vec![article("1", "2024-01-10T00:00:00Z")],
        ..Default::default()
    };

    let summary = engine(source, &cms, &cfg).run_sync(20).await.unwrap();

    assert_eq!(summary.created, vec!["1"]);
    let creates = cms.creates_in(ARTICLES).await;
    assert_eq!(creates.len(), 2);
    let retried = creates[1]["slug"].as_str().unwrap();
    assert!(retried.starts_with("article-1-"));
    assert_ne!(retried, "article-1");
}

#[tokio::test]
async fn repeated_slug_conflict_is_a_terminal_error() {
    let cfg = test_config();
    let cms = RecordingCms::default();
    let conflict = ApiError::with_status(ErrorKind::SlugConflict, 400, "slug already exists");
    cms.fail_creates(vec![conflict.clone(), conflict.clone(), conflict])
        .await;
    let source = FakeSource {
        recent: vec![article("1", "2024-01-10T00:00:00Z")],
        ..Default::default()
    };

    let summary = engine(source, &cms, &cfg).run_sync(20).await.unwrap();

    assert!(summary.created.is_empty());
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].category, "SLUG_CONFLICT");
    assert_eq!(summary.errors[0].title.as_deref(), Some("Article 1"));
    assert_eq!(cms.creates_in(ARTICLES).await.len(), 2);
}

#[tokio::test]
async fn image_import_failure_retries_without_images() {
    let cfg = test_config();
    let cms = RecordingCms::default();
    cms.fail_creates(vec![ApiError::with_status(
        ErrorKind::ImageImport,
        400,
        "Remote file failed to import",
    )])
    .await;
    let mut a = article("1", "2024-01-10T00:00:00Z");
    a.featured_image_big = Some("https://cdn.example/big.webp".into());
    let source = FakeSource {
        recent: vec![a],
        ..Default::default()
    };

    let summary = engine(source, &cms, &cfg).run_sync(20).await.unwrap();

    assert_eq!(summary.created, vec!["1"]);
    assert_eq!(summary.warnings.len(), 1);
    assert!(summary.warnings[0].message.contains("without images"));
    let creates = cms.creates_in(ARTICLES).await;
    assert!(creates[0].contains_key("featured-image"));
    assert!(!creates[1].contains_key("featured-image"));
}

#[tokio::test]
async fn invalid_article_is_recorded_and_run_continues() {
    let cfg = test_config();
    let cms = RecordingCms::default();
    let mut broken = article("1", "2024-01-10T00:00:00Z");
    broken.slug = None;
    let source = FakeSource {
        recent: vec![broken, article("2", "2024-01-09T00:00:00Z")],
        ..Default::default()
    };

    let summary = engine(source, &cms, &cfg).run_sync(20).await.unwrap();

    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].key, "1");
    assert_eq!(summary.errors[0].category, "VALIDATION_ERROR");
    assert_eq!(summary.created, vec!["2"]);
    assert_eq!(summary.total_checked, 2);
}

#[tokio::test]
async fn missing_content_is_backfilled_from_detail() {
    let cfg = test_config();
    let cms = RecordingCms::default();
    let mut listed = article("1", "2024-01-10T00:00:00Z");
    listed.content = None;
    let mut detail = listed.clone();
    detail.content = Some("<p>Full body</p>".into());
    let source = FakeSource {
        recent: vec![listed],
        details: HashMap::from([("1".to_string(), detail)]),
        ..Default::default()
    };

    engine(source, &cms, &cfg).run_sync(20).await.unwrap();

    let creates = cms.creates_in(ARTICLES).await;
    assert_eq!(creates[0]["content"], json!("<p>Full body</p>"));
}

#[tokio::test]
async fn source_failure_aborts_with_partial_summary() {
    let cfg = test_config();
    let cms = RecordingCms::default();
    let source = FakeSource {
        fail_recent: true,
        ..Default::default()
    };

    let aborted = engine(source, &cms, &cfg).run_sync(20).await.unwrap_err();

    assert!(aborted.summary.fatal.is_some());
    assert_eq!(aborted.source.category(), "SERVER_ERROR");
    assert!(cms.mutations().await.is_empty());
}

#[tokio::test]
async fn preload_failure_aborts_the_run() {
    let cfg = test_config();
    let cms = RecordingCms::default();
    cms.state.lock().await.list_failure =
        Some(ApiError::with_status(ErrorKind::AuthError, 401, "bad token"));
    let source = FakeSource {
        recent: vec![article("1", "2024-01-10T00:00:00Z")],
        ..Default::default()
    };

    let aborted = engine(source, &cms, &cfg).run_sync(20).await.unwrap_err();

    assert_eq!(aborted.source.category(), "AUTH_ERROR");
    assert!(aborted.summary.created.is_empty());
    assert!(aborted.to_string().contains("sync run aborted"));
}

#[tokio::test]
async fn full_sync_pages_every_category() {
    let mut cfg = test_config();
    cfg.webflow.page_size = 2;
    let cms = RecordingCms::default();
    let markets: Vec<_> = (1..=3)
        .map(|n| article(&n.to_string(), "2024-01-10T00:00:00Z"))
        .collect();
    let mut shipping = vec![article("3", "2024-01-10T00:00:00Z")];
    shipping[0].cat = Some("Shipping".into());
    let source = FakeSource {
        categories: vec![
            SourceCategory {
                cat_id: "10".into(),
                cat_name: Some("Markets".into()),
                color: None,
            },
            SourceCategory {
                cat_id: "11".into(),
                cat_name: Some("Shipping".into()),
                color: None,
            },
        ],
        by_category: HashMap::from([
            ("10".to_string(), markets),
            ("11".to_string(), shipping),
        ]),
        ..Default::default()
    };

    let summary = engine(source, &cms, &cfg).run_full_sync().await.unwrap();

    assert_eq!(summary.total_checked, 3);
    assert_eq!(summary.created.len(), 3);
}

#[tokio::test]
async fn create_only_migration_leaves_existing_records_alone() {
    let cfg = test_config();
    let cms = RecordingCms::with_items(
        ARTICLES,
        vec![stored("item-1", "1", "2023-01-01T00:00:00.000Z")],
    );
    let articles = vec![
        article("1", "2024-01-10T00:00:00Z"),
        article("2", "2024-01-10T00:00:00Z"),
    ];
    let opts = MigrationOptions {
        create_only: true,
        delay: std::time::Duration::ZERO,
        ..MigrationOptions::from_config(&cfg)
    };

    let summary = engine(FakeSource::default(), &cms, &cfg)
        .run_migration(articles, opts)
        .await
        .unwrap();

    assert_eq!(summary.skipped_with(SkipReason::AlreadyExists), 1);
    assert_eq!(summary.created, vec!["2"]);
    assert!(!cms
        .calls()
        .await
        .iter()
        .any(|c| matches!(c, Call::Update(..))));
}

#[tokio::test]
async fn migration_with_duplicate_keys_creates_once() {
    let cfg = test_config();
    let cms = RecordingCms::default();
    let articles = vec![
        article("1", "2024-01-10T00:00:00Z"),
        article("1", "2024-01-10T00:00:00Z"),
    ];

    let summary = engine(FakeSource::default(), &cms, &cfg)
        .run_migration(articles, MigrationOptions::from_config(&cfg))
        .await
        .unwrap();

    assert_eq!(summary.created, vec!["1"]);
    assert_eq!(summary.skipped_with(SkipReason::NoChanges), 1);
    assert_eq!(cms.creates_in(ARTICLES).await.len(), 1);
}

#[tokio::test]
async fn test_sync_uses_point_lookup() {
    let cfg = test_config();
    let cms = RecordingCms::with_items(
        ARTICLES,
        vec![stored("item-1", "1", "2024-02-01T00:00:00.000Z")],
    );

    let summary = engine(FakeSource::default(), &cms, &cfg)
        .run_test_sync(vec![article("1", "2024-01-10T00:00:00Z")])
        .await
        .unwrap();

    assert_eq!(summary.mode.to_string(), "test_sync");
    assert_eq!(summary.skipped_with(SkipReason::NoChanges), 1);
}

#[tokio::test]
async fn sync_article_fetches_detail() {
    let cfg = test_config();
    let cms = RecordingCms::default();
    let source = FakeSource {
        details: HashMap::from([("7".to_string(), article("7", "2024-01-10T00:00:00Z"))]),
        ..Default::default()
    };

    let summary = engine(source, &cms, &cfg).sync_article("7").await.unwrap();

    assert_eq!(summary.created, vec!["7"]);
}

#[tokio::test]
async fn archive_respects_the_cutoff_boundary() {
    let cfg = test_config();
    let cms = RecordingCms::with_items(
        ARTICLES,
        vec![
            aged("a59", 59, "last-updated"),
            aged("a61", 61, "last-updated"),
            aged("a90", 90, "last-updated"),
        ],
    );

    let summary = engine(FakeSource::default(), &cms, &cfg)
        .run_archive(60)
        .await
        .unwrap();

    let archived: Vec<_> = summary.archived.iter().map(|e| e.item_id.as_str()).collect();
    assert_eq!(archived, vec!["a90", "a61"]);
    assert_eq!(summary.archived[1].days_old, 61);
    assert_eq!(summary.skipped_with(SkipReason::TooRecent), 1);
    assert_eq!(summary.skipped[0].days_old, Some(59));
    let items = cms.items(ARTICLES).await;
    assert!(items.iter().find(|i| i.id == "a61").unwrap().is_archived);
    assert!(!items.iter().find(|i| i.id == "a59").unwrap().is_archived);
    assert!(cms
        .calls()
        .await
        .contains(&Call::Unpublish(ARTICLES.into(), vec!["a61".into()])));
}

#[tokio::test]
async fn archive_skips_archived_and_undated_records() {
    let cfg = test_config();
    let mut archived = aged("old", 120, "last-updated");
    archived.is_archived = true;
    let mut undated = aged("undated", 120, "last-updated");
    undated.field_data.remove("last-updated");
    let cms = RecordingCms::with_items(ARTICLES, vec![archived, undated]);

    let summary = engine(FakeSource::default(), &cms, &cfg)
        .run_archive(60)
        .await
        .unwrap();

    assert!(summary.archived.is_empty());
    assert_eq!(summary.skipped_with(SkipReason::AlreadyArchived), 1);
    assert_eq!(summary.skipped_with(SkipReason::MissingDate), 1);
    assert!(cms.mutations().await.is_empty());
}

#[tokio::test]
async fn archive_category_type_filter() {
    let mut cfg = test_config();
    cfg.archive.category_type = Some("Updates".into());
    let category = |id: &str, kind: &str| Item {
        id: id.into(),
        field_data: json!({ "name": id, "category-type": kind })
            .as_object()
            .unwrap()
            .clone(),
        ..Default::default()
    };
    let cms = RecordingCms::with_items(
        CATEGORIES,
        vec![category("c-news", "News"), category("c-upd", "Updates")],
    );
    let with_cat = |id: &str, cat: Option<&str>| {
        let mut item = aged(id, 100, "last-updated");
        if let Some(cat) = cat {
            item.field_data.insert("category".into(), json!(cat));
        }
        item
    };
    cms.seed(
        ARTICLES,
        vec![
            with_cat("news", Some("c-news")),
            with_cat("upd", Some("c-upd")),
            with_cat("none", None),
            with_cat("ghost", Some("c-gone")),
        ],
    )
    .await;

    let summary = engine(FakeSource::default(), &cms, &cfg)
        .run_archive(60)
        .await
        .unwrap();

    let archived: Vec<_> = summary.archived.iter().map(|e| e.item_id.as_str()).collect();
    assert_eq!(archived, vec!["upd"]);
    assert_eq!(summary.skipped_with(SkipReason::WrongCategoryType), 1);
    assert_eq!(summary.skipped_with(SkipReason::NoCategory), 1);
    assert_eq!(summary.skipped_with(SkipReason::CategoryNotFound), 1);
}

#[tokio::test]
async fn delete_removes_oldest_first() {
    let cfg = test_config();
    let cms = RecordingCms::with_items(
        ARTICLES,
        vec![
            aged("d400", 400, "publish-date"),
            aged("d800", 800, "publish-date"),
            aged("d10", 10, "publish-date"),
            aged("d500", 500, "publish-date"),
        ],
    );

    let summary = engine(FakeSource::default(), &cms, &cfg)
        .run_delete(365)
        .await
        .unwrap();

    let deletes: Vec<_> = cms
        .calls()
        .await
        .into_iter()
        .filter_map(|c| match c {
            Call::Delete(_, id) => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(deletes, vec!["d800", "d500", "d400"]);
    assert_eq!(summary.deleted.len(), 3);
    assert_eq!(cms.items(ARTICLES).await.len(), 1);
}

#[tokio::test]
async fn sorted_scan_delete_walks_shrinking_pages() {
    let mut cfg = test_config();
    cfg.webflow.page_size = 2;
    cfg.delete.strategy = SweepStrategy::SortedScan;
    let cms = RecordingCms::with_items(
        ARTICLES,
        vec![
            aged("d1", 900, "publish-date"),
            aged("d2", 800, "publish-date"),
            aged("d3", 700, "publish-date"),
            aged("d4", 600, "publish-date"),
            aged("d5", 500, "publish-date"),
            aged("keep", 30, "publish-date"),
            aged("keep2", 20, "publish-date"),
        ],
    );

    let summary = engine(FakeSource::default(), &cms, &cfg)
        .run_delete(365)
        .await
        .unwrap();

    assert_eq!(summary.deleted.len(), 5);
    assert_eq!(summary.skipped_with(SkipReason::TooRecent), 1);
    let left: Vec<_> = cms.items(ARTICLES).await.into_iter().map(|i| i.id).collect();
    assert_eq!(left, vec!["keep", "keep2"]);
}

#[tokio::test]
async fn sorted_scan_archive_stops_at_first_recent_record() {
    let mut cfg = test_config();
    cfg.archive.strategy = SweepStrategy::SortedScan;
    let cms = RecordingCms::with_items(
        ARTICLES,
        vec![
            aged("recent", 5, "last-updated"),
            aged("old", 200, "last-updated"),
            aged("newer", 1, "last-updated"),
        ],
    );

    let summary = engine(FakeSource::default(), &cms, &cfg)
        .run_archive(90)
        .await
        .unwrap();

    assert_eq!(summary.archived.len(), 1);
    assert_eq!(summary.archived[0].item_id, "old");
    assert_eq!(summary.total_checked, 2);
}
