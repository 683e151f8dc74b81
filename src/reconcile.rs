//! The reconciliation engine: decides create/update/skip/archive/delete per
//! record and applies it through the destination client.
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{Config, DateField, FieldMap, ReferenceFields, Sweep, SweepStrategy};
use crate::dates::{cutoff, days_old, format_timestamp, is_past_cutoff, parse_timestamp};
use crate::error::{ErrorKind, RunAborted, SyncError};
use crate::model::SourceArticle;
use crate::reference::ReferenceResolver;
use crate::source::{dedupe_by_post_id, ArticleSource};
use crate::summary::{RunMode, RunSummary, SkipReason, SweptEntry};
use crate::transform::{
    needs_update, transform_to_destination, validate_article, References, TransformOptions,
};
use crate::webflow::{
    find_item_by_post_id, has_more, list_all_items, preload_all_items, CmsService, Item,
    ItemPayload, ListQuery,
};

/// Publish calls accept at most this many ids.
const PUBLISH_BATCH: usize = 100;

/// How an article's existing destination record is found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LookupStrategy {
    /// Load the whole collection once and look up in memory.
    #[default]
    Preload,
    /// Scan the collection per article.
    PointLookup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOptions {
    pub delay: Duration,
    pub progress_every: usize,
    /// Never touch records that already exist.
    pub create_only: bool,
    pub lookup: LookupStrategy,
}

impl MigrationOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            delay: Duration::from_millis(cfg.app.delay_ms),
            progress_every: cfg.app.progress_every,
            create_only: false,
            lookup: LookupStrategy::Preload,
        }
    }
}

/// Engine settings derived from [`Config`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub articles: String,
    pub categories: String,
    pub fields: FieldMap,
    pub reference_fields: ReferenceFields,
    pub page_size: u32,
    pub delay: Duration,
    pub progress_every: usize,
    pub republish_created: bool,
    pub fetch_missing_content: bool,
    pub archive: Sweep,
    pub delete: Sweep,
}

impl Settings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            articles: cfg.webflow.collections.articles.clone(),
            categories: cfg.webflow.collections.categories.clone(),
            fields: cfg.webflow.fields.clone(),
            reference_fields: cfg.webflow.reference_fields.clone(),
            page_size: cfg.webflow.page_size,
            delay: Duration::from_millis(cfg.app.delay_ms),
            progress_every: cfg.app.progress_every,
            republish_created: cfg.app.republish_created,
            fetch_missing_content: cfg.engine.fetch_missing_content,
            archive: cfg.archive.clone(),
            delete: cfg.delete.clone(),
        }
    }

    /// Destination field holding the date that decides a record's age.
    pub fn date_field(&self, which: DateField) -> &str {
        match which {
            DateField::LastUpdated => &self.fields.updated_date.field,
            DateField::Published => &self.fields.timestamp.field,
        }
    }
}

/// Fixed spacing between mutating operations. The first one goes out
/// immediately.
#[derive(Debug)]
struct Pacer {
    delay: Duration,
    primed: AtomicBool,
}

impl Pacer {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            primed: AtomicBool::new(false),
        }
    }

    async fn pace(&self) {
        if self.primed.swap(true, Ordering::SeqCst) && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

enum Lookup {
    Preloaded(HashMap<String, Item>),
    PointLookup,
}

#[derive(Debug, Clone, Copy)]
struct BatchOptions {
    create_only: bool,
    backfill: bool,
    progress_every: usize,
}

#[derive(Debug)]
enum Outcome {
    Created(Item),
    Updated(Item),
    Skipped(SkipReason),
}

#[derive(Clone, Copy)]
enum Write<'a> {
    Create,
    Update(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SweepAction {
    Archive,
    Delete,
}

enum Verdict {
    Eligible { date: DateTime<Utc>, days_old: i64 },
    Skip(SkipReason, Option<i64>),
}

/// Category lookup for the category-type filter, keyed by item id and name.
type CategoryIndex = HashMap<String, Option<String>>;

/// One run's worth of state: reference caches, pacing and the collaborators.
/// Build a fresh one per run; every `run_*` method consumes it.
pub struct Reconciler {
    source: Arc<dyn ArticleSource>,
    cms: Arc<dyn CmsService>,
    settings: Settings,
    refs: ReferenceResolver,
    pacer: Pacer,
}

impl Reconciler {
    pub fn new(source: Arc<dyn ArticleSource>, cms: Arc<dyn CmsService>, cfg: &Config) -> Self {
        let settings = Settings::from_config(cfg);
        let refs = ReferenceResolver::new(cms.clone(), cfg);
        let pacer = Pacer::new(settings.delay);
        Self {
            source,
            cms,
            settings,
            refs,
            pacer,
        }
    }

    /// Sync the `count` most recently edited source articles.
    #[instrument(skip(self))]
    pub async fn run_sync(self, count: usize) -> Result<RunSummary, RunAborted> {
        let mut summary = RunSummary::new(RunMode::Sync);
        info!(count, "starting sync");
        let articles = match self.source.get_recent_posts(count).await {
            Ok(articles) => articles,
            Err(err) => return Err(self.abort(summary, err.into())),
        };
        info!(fetched = articles.len(), "fetched recent source articles");
        let mut lookup = match self.preload(LookupStrategy::Preload).await {
            Ok(lookup) => lookup,
            Err(err) => return Err(self.abort(summary, err)),
        };
        let opts = self.source_batch_options();
        let created = self
            .process_batch(articles, &mut lookup, opts, &mut summary)
            .await;
        Ok(self.finish(summary, &created).await)
    }

    /// Sync every article of every source category.
    #[instrument(skip(self))]
    pub async fn run_full_sync(self) -> Result<RunSummary, RunAborted> {
        let mut summary = RunSummary::new(RunMode::FullSync);
        let categories = match self.source.get_all_categories().await {
            Ok(categories) => categories,
            Err(err) => return Err(self.abort(summary, err.into())),
        };
        info!(categories = categories.len(), "starting full sync");

        let mut articles = Vec::new();
        for category in &categories {
            match self.fetch_category(&category.cat_id).await {
                Ok(mut found) => {
                    debug!(cat_id = %category.cat_id, found = found.len(), "category fetched");
                    articles.append(&mut found);
                }
                Err(err) => {
                    let key = format!("category:{}", category.cat_id);
                    error!(cat_id = %category.cat_id, %err, "failed to fetch category");
                    summary.error(key, category.cat_name.as_deref(), &err);
                }
            }
        }
        let articles = dedupe_by_post_id(articles);
        info!(articles = articles.len(), "collected source articles");

        let mut lookup = match self.preload(LookupStrategy::Preload).await {
            Ok(lookup) => lookup,
            Err(err) => return Err(self.abort(summary, err)),
        };
        let opts = self.source_batch_options();
        let created = self
            .process_batch(articles, &mut lookup, opts, &mut summary)
            .await;
        Ok(self.finish(summary, &created).await)
    }

    /// Sync a single article by source key.
    #[instrument(skip(self))]
    pub async fn sync_article(self, post_id: &str) -> Result<RunSummary, RunAborted> {
        let mut summary = RunSummary::new(RunMode::SyncArticle);
        let article = match self.source.get_post_by_id(post_id).await {
            Ok(article) => article,
            Err(err) => return Err(self.abort(summary, err.into())),
        };
        let mut lookup = Lookup::PointLookup;
        let opts = BatchOptions {
            backfill: false,
            ..self.source_batch_options()
        };
        let created = self
            .process_batch(vec![article], &mut lookup, opts, &mut summary)
            .await;
        Ok(self.finish(summary, &created).await)
    }

    /// Reconcile a pre-loaded article list, typically an export file.
    #[instrument(skip(self, articles), fields(count = articles.len()))]
    pub async fn run_migration(
        self,
        articles: Vec<SourceArticle>,
        opts: MigrationOptions,
    ) -> Result<RunSummary, RunAborted> {
        self.migrate(RunMode::Migration, articles, opts).await
    }

    /// Migration over a local file using per-article point lookups.
    #[instrument(skip(self, articles), fields(count = articles.len()))]
    pub async fn run_test_sync(
        self,
        articles: Vec<SourceArticle>,
    ) -> Result<RunSummary, RunAborted> {
        let opts = MigrationOptions {
            delay: self.settings.delay,
            progress_every: self.settings.progress_every,
            create_only: false,
            lookup: LookupStrategy::PointLookup,
        };
        self.migrate(RunMode::TestSync, articles, opts).await
    }

    /// Archive records older than `days_threshold` days.
    pub async fn run_archive(self, days_threshold: u32) -> Result<RunSummary, RunAborted> {
        self.sweep(SweepAction::Archive, days_threshold).await
    }

    /// Permanently delete records older than `days_threshold` days.
    pub async fn run_delete(self, days_threshold: u32) -> Result<RunSummary, RunAborted> {
        self.sweep(SweepAction::Delete, days_threshold).await
    }

    async fn migrate(
        mut self,
        mode: RunMode,
        articles: Vec<SourceArticle>,
        opts: MigrationOptions,
    ) -> Result<RunSummary, RunAborted> {
        let mut summary = RunSummary::new(mode);
        self.pacer = Pacer::new(opts.delay);
        info!(
            %mode,
            total = articles.len(),
            create_only = opts.create_only,
            delay_ms = opts.delay.as_millis() as u64,
            "starting migration"
        );
        let mut lookup = match self.preload(opts.lookup).await {
            Ok(lookup) => lookup,
            Err(err) => return Err(self.abort(summary, err)),
        };
        let batch = BatchOptions {
            create_only: opts.create_only,
            backfill: false,
            progress_every: opts.progress_every,
        };
        let created = self
            .process_batch(articles, &mut lookup, batch, &mut summary)
            .await;
        Ok(self.finish(summary, &created).await)
    }

    fn source_batch_options(&self) -> BatchOptions {
        BatchOptions {
            create_only: false,
            backfill: self.settings.fetch_missing_content,
            progress_every: self.settings.progress_every,
        }
    }

    async fn preload(&self, strategy: LookupStrategy) -> Result<Lookup, SyncError> {
        match strategy {
            LookupStrategy::Preload => {
                let map = preload_all_items(
                    self.cms.as_ref(),
                    &self.settings.articles,
                    &self.settings.fields.post_id.field,
                    self.settings.page_size,
                )
                .await?;
                Ok(Lookup::Preloaded(map))
            }
            LookupStrategy::PointLookup => Ok(Lookup::PointLookup),
        }
    }

    /// Page through one source category until an empty page, the declared
    /// total, or a page with nothing new.
    async fn fetch_category(&self, cat_id: &str) -> Result<Vec<SourceArticle>, SyncError> {
        let limit = self.settings.page_size.max(1);
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut page = 1u32;
        loop {
            let batch = self.source.get_posts_by_category(cat_id, limit, page).await?;
            if batch.articles.is_empty() {
                break;
            }
            let mut fresh = 0usize;
            for article in batch.articles {
                if seen.insert(article.post_id.clone()) {
                    fresh += 1;
                    out.push(article);
                }
            }
            if fresh == 0 {
                warn!(cat_id, page, "category page repeated earlier results; stopping");
                break;
            }
            if let Some(total) = batch.total_records {
                if out.len() as u64 >= total {
                    break;
                }
            }
            page += 1;
        }
        Ok(out)
    }

    /// Reconcile articles one at a time. Returns the ids of items created.
    async fn process_batch(
        &self,
        articles: Vec<SourceArticle>,
        lookup: &mut Lookup,
        opts: BatchOptions,
        summary: &mut RunSummary,
    ) -> Vec<String> {
        let total = articles.len();
        let mut created = Vec::new();
        for (n, article) in articles.into_iter().enumerate() {
            summary.total_checked += 1;
            let key = article.post_id.clone();
            let title = article.title.clone();
            match self.reconcile_article(article, lookup, opts, summary).await {
                Ok(Outcome::Created(item)) => {
                    info!(post_id = %key, item_id = %item.id, "created");
                    created.push(item.id.clone());
                    summary.created.push(key.clone());
                    if let Lookup::Preloaded(map) = lookup {
                        map.insert(key, item);
                    }
                }
                Ok(Outcome::Updated(item)) => {
                    info!(post_id = %key, item_id = %item.id, "updated");
                    summary.updated.push(key.clone());
                    if let Lookup::Preloaded(map) = lookup {
                        map.insert(key, item);
                    }
                }
                Ok(Outcome::Skipped(reason)) => {
                    debug!(post_id = %key, %reason, "skipped");
                    summary.skip(key, reason, None);
                }
                Err(err) => {
                    error!(post_id = %key, %err, "failed to reconcile article");
                    summary.error(key, title.as_deref(), &err);
                }
            }
            let done = n + 1;
            if opts.progress_every > 0 && done % opts.progress_every == 0 && done < total {
                info!(
                    done,
                    total,
                    created = summary.created.len(),
                    updated = summary.updated.len(),
                    skipped = summary.skipped.len(),
                    errors = summary.errors.len(),
                    "progress"
                );
            }
        }
        created
    }

    async fn reconcile_article(
        &self,
        mut article: SourceArticle,
        lookup: &Lookup,
        opts: BatchOptions,
        summary: &mut RunSummary,
    ) -> Result<Outcome, SyncError> {
        validate_article(&article)?;
        let fields = &self.settings.fields;

        let existing = match lookup {
            Lookup::Preloaded(map) => map.get(&article.post_id).cloned(),
            Lookup::PointLookup => {
                find_item_by_post_id(
                    self.cms.as_ref(),
                    &self.settings.articles,
                    &fields.post_id.field,
                    &article.post_id,
                    self.settings.page_size,
                )
                .await?
            }
        };

        if let Some(item) = &existing {
            if opts.create_only {
                return Ok(Outcome::Skipped(SkipReason::AlreadyExists));
            }
            if !needs_update(item, &article, fields) {
                return Ok(Outcome::Skipped(SkipReason::NoChanges));
            }
        }

        if opts.backfill && article.content.is_none() {
            self.backfill_content(&mut article, summary).await;
        }

        let cat = article.cat.as_deref().unwrap_or("");
        let category_id = self
            .refs
            .ensure_category_exists(cat, article.color.as_deref())
            .await?;
        let tag_ids = self.refs.ensure_tags_exist(&article.tags).await?;
        let refs = References {
            category_id,
            tag_ids: Some(tag_ids).filter(|ids| !ids.is_empty()),
        };

        self.pacer.pace().await;
        match existing {
            None => {
                let item = self.create_article(&article, &refs, summary).await?;
                self.publish_one(&item.id, &article.post_id, summary).await;
                Ok(Outcome::Created(item))
            }
            Some(current) => {
                let item = self
                    .write_article(
                        Write::Update(&current.id),
                        &article,
                        &refs,
                        TransformOptions::for_update(),
                        summary,
                    )
                    .await?;
                self.publish_one(&item.id, &article.post_id, summary).await;
                Ok(Outcome::Updated(item))
            }
        }
    }

    async fn backfill_content(&self, article: &mut SourceArticle, summary: &mut RunSummary) {
        match self.source.get_post_by_id(&article.post_id).await {
            Ok(detail) => {
                if detail.content.is_some() {
                    article.content = detail.content;
                }
            }
            Err(err) => {
                warn!(post_id = %article.post_id, %err, "could not fetch article detail");
                summary.warn(
                    article.post_id.clone(),
                    format!("synced without content: {}", err),
                );
            }
        }
    }

    /// Create, retrying once with a hashed slug on a slug conflict.
    async fn create_article(
        &self,
        article: &SourceArticle,
        refs: &References,
        summary: &mut RunSummary,
    ) -> Result<Item, SyncError> {
        let first = self
            .write_article(Write::Create, article, refs, TransformOptions::default(), summary)
            .await;
        match first {
            Err(err) if err.api_kind() == Some(ErrorKind::SlugConflict) => {
                warn!(post_id = %article.post_id, "slug conflict; retrying with hashed slug");
                let hashed = TransformOptions {
                    use_hashed_slug: true,
                    ..Default::default()
                };
                self.write_article(Write::Create, article, refs, hashed, summary)
                    .await
            }
            other => other,
        }
    }

    /// One create or update, retried once without images when the
    /// destination cannot import them.
    async fn write_article(
        &self,
        write: Write<'_>,
        article: &SourceArticle,
        refs: &References,
        opts: TransformOptions,
        summary: &mut RunSummary,
    ) -> Result<Item, SyncError> {
        let fields = &self.settings.fields;
        let payload = self.payload(write, transform_to_destination(article, refs, &opts, fields));
        match self.send_write(write, &payload).await {
            Err(err) if err.api_kind() == Some(ErrorKind::ImageImport) && !opts.exclude_images => {
                warn!(post_id = %article.post_id, %err, "image import failed; retrying without images");
                let stripped = opts.without_images();
                let payload =
                    self.payload(write, transform_to_destination(article, refs, &stripped, fields));
                let item = self.send_write(write, &payload).await?;
                summary.warn(
                    article.post_id.clone(),
                    format!("written without images: {}", err),
                );
                Ok(item)
            }
            other => other,
        }
    }

    fn payload(&self, write: Write<'_>, field_data: serde_json::Map<String, Value>) -> ItemPayload {
        match write {
            Write::Create => ItemPayload::live(field_data),
            Write::Update(_) => ItemPayload::fields(field_data),
        }
    }

    async fn send_write(&self, write: Write<'_>, payload: &ItemPayload) -> Result<Item, SyncError> {
        let collection = &self.settings.articles;
        let item = match write {
            Write::Create => self.cms.create_item(collection, payload).await?,
            Write::Update(id) => self.cms.update_item(collection, id, payload).await?,
        };
        Ok(item)
    }

    async fn publish_one(&self, item_id: &str, key: &str, summary: &mut RunSummary) {
        let ids = [item_id.to_string()];
        if let Err(err) = self.cms.publish_items(&self.settings.articles, &ids).await {
            warn!(post_id = key, item_id, %err, "publish failed");
            summary.warn(key, format!("publish failed: {}", err));
        }
    }

    /// Republish everything created this run, then seal the summary.
    async fn finish(&self, mut summary: RunSummary, created: &[String]) -> RunSummary {
        if self.settings.republish_created && !created.is_empty() {
            for chunk in created.chunks(PUBLISH_BATCH) {
                if let Err(err) = self.cms.publish_items(&self.settings.articles, chunk).await {
                    warn!(%err, ids = chunk.len(), "final republish failed");
                    summary.warn("republish", format!("final republish failed: {}", err));
                }
            }
        }
        summary.cache = Some(self.refs.cache_stats());
        summary.finish();
        info!(%summary, "run complete");
        summary
    }

    fn abort(&self, mut summary: RunSummary, err: SyncError) -> RunAborted {
        error!(mode = %summary.mode, %err, "run aborted");
        summary.fatal = Some(err.to_string());
        summary.cache = Some(self.refs.cache_stats());
        summary.finish();
        RunAborted {
            summary: Box::new(summary),
            source: err,
        }
    }

    #[instrument(skip(self))]
    async fn sweep(self, action: SweepAction, days_threshold: u32) -> Result<RunSummary, RunAborted> {
        let (mode, cfg) = match action {
            SweepAction::Archive => (RunMode::Archive, self.settings.archive.clone()),
            SweepAction::Delete => (RunMode::Delete, self.settings.delete.clone()),
        };
        let mut summary = RunSummary::new(mode);
        let now = Utc::now();
        let cutoff = cutoff(now, days_threshold);
        info!(
            %mode,
            days_threshold,
            cutoff = %format_timestamp(&cutoff),
            date_field = ?cfg.date_field,
            strategy = ?cfg.strategy,
            "starting sweep"
        );

        let index = match &cfg.category_type {
            Some(_) => match self.category_index().await {
                Ok(index) => Some(index),
                Err(err) => return Err(self.abort(summary, err)),
            },
            None => None,
        };
        let ctx = SweepContext {
            action,
            cfg: &cfg,
            date_field: self.settings.date_field(cfg.date_field),
            cutoff,
            now,
            index: index.as_ref(),
        };

        let res = match cfg.strategy {
            SweepStrategy::Preloaded => self.sweep_preloaded(&ctx, &mut summary).await,
            SweepStrategy::SortedScan => self.sweep_sorted(&ctx, &mut summary).await,
        };
        match res {
            Ok(()) => Ok(self.finish(summary, &[]).await),
            Err(err) => Err(self.abort(summary, err)),
        }
    }

    /// Whole collection in memory, filtered, then processed oldest-first.
    async fn sweep_preloaded(
        &self,
        ctx: &SweepContext<'_>,
        summary: &mut RunSummary,
    ) -> Result<(), SyncError> {
        let items = list_all_items(
            self.cms.as_ref(),
            &self.settings.articles,
            self.settings.page_size,
            &[],
        )
        .await?;
        let mut eligible = Vec::new();
        for item in items {
            summary.total_checked += 1;
            match self.judge(ctx, &item) {
                Verdict::Eligible { date, days_old } => eligible.push((date, days_old, item)),
                Verdict::Skip(reason, days) => summary.skip(self.item_key(&item), reason, days),
            }
        }
        eligible.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.2.id.cmp(&b.2.id)));
        info!(eligible = eligible.len(), "sweep candidates selected");
        for (date, days_old, item) in eligible {
            self.apply_sweep(ctx, &item, date, days_old, summary).await;
        }
        Ok(())
    }

    /// Page through the collection sorted oldest-first by the age field and
    /// stop at the first record that is too recent.
    async fn sweep_sorted(
        &self,
        ctx: &SweepContext<'_>,
        summary: &mut RunSummary,
    ) -> Result<(), SyncError> {
        let limit = self.settings.page_size.max(1);
        let mut offset = 0u32;
        loop {
            let query = ListQuery::page(offset, limit)
                .with_filter("sortBy", ctx.date_field)
                .with_filter("sortOrder", "asc");
            let page = self.cms.list_items(&self.settings.articles, &query).await?;
            if page.items.is_empty() {
                break;
            }
            let fetched = page.items.len();
            let mut removed = 0u32;
            let mut reached_recent = false;
            for item in &page.items {
                summary.total_checked += 1;
                match self.judge(ctx, item) {
                    Verdict::Eligible { date, days_old } => {
                        if self.apply_sweep(ctx, item, date, days_old, summary).await
                            && ctx.action == SweepAction::Delete
                        {
                            removed += 1;
                        }
                    }
                    Verdict::Skip(SkipReason::TooRecent, days) => {
                        summary.skip(self.item_key(item), SkipReason::TooRecent, days);
                        reached_recent = true;
                        break;
                    }
                    Verdict::Skip(reason, days) => {
                        summary.skip(self.item_key(item), reason, days)
                    }
                }
            }
            if reached_recent {
                info!(offset, "reached records newer than the cutoff; stopping");
                break;
            }
            if !has_more(page.pagination, offset, limit, fetched) {
                break;
            }
            // Deleted records vanish from the listing, shifting the rest up.
            offset += fetched as u32 - removed;
        }
        Ok(())
    }

    fn item_key(&self, item: &Item) -> String {
        item.field_str(&self.settings.fields.post_id.field)
            .unwrap_or_else(|| item.id.clone())
    }

    fn judge(&self, ctx: &SweepContext<'_>, item: &Item) -> Verdict {
        if ctx.action == SweepAction::Archive && item.is_archived {
            return Verdict::Skip(SkipReason::AlreadyArchived, None);
        }
        let Some(date) = item
            .field_str(ctx.date_field)
            .as_deref()
            .and_then(parse_timestamp)
        else {
            return Verdict::Skip(SkipReason::MissingDate, None);
        };
        if let (Some(wanted), Some(index)) = (&ctx.cfg.category_type, ctx.index) {
            let Some(category) = item.field_str(&self.settings.fields.cat.field) else {
                return Verdict::Skip(SkipReason::NoCategory, None);
            };
            let Some(kind) = index.get(&category) else {
                return Verdict::Skip(SkipReason::CategoryNotFound, None);
            };
            let matches = kind
                .as_deref()
                .map(|k| k.trim().eq_ignore_ascii_case(wanted.trim()))
                .unwrap_or(false);
            if !matches {
                return Verdict::Skip(SkipReason::WrongCategoryType, None);
            }
        }
        let age = days_old(ctx.now, date);
        if is_past_cutoff(date, ctx.cutoff) {
            Verdict::Eligible {
                date,
                days_old: age,
            }
        } else {
            Verdict::Skip(SkipReason::TooRecent, Some(age))
        }
    }

    /// Archive or delete one record. Returns whether the action succeeded.
    async fn apply_sweep(
        &self,
        ctx: &SweepContext<'_>,
        item: &Item,
        date: DateTime<Utc>,
        days_old: i64,
        summary: &mut RunSummary,
    ) -> bool {
        let key = self.item_key(item);
        self.pacer.pace().await;
        let res = match ctx.action {
            SweepAction::Archive => self.archive_item(item, &key, summary).await,
            SweepAction::Delete => self
                .cms
                .delete_item(&self.settings.articles, &item.id)
                .await
                .map_err(SyncError::from),
        };
        match res {
            Ok(()) => {
                info!(post_id = %key, item_id = %item.id, days_old, action = ?ctx.action, "swept");
                let entry = SweptEntry {
                    key,
                    item_id: item.id.clone(),
                    record_date: format_timestamp(&date),
                    days_old,
                };
                match ctx.action {
                    SweepAction::Archive => summary.archived.push(entry),
                    SweepAction::Delete => summary.deleted.push(entry),
                }
                true
            }
            Err(err) => {
                error!(post_id = %key, item_id = %item.id, %err, "sweep failed");
                let title = item.field_str(&self.settings.fields.title.field);
                summary.error(key, title.as_deref(), &err);
                false
            }
        }
    }

    async fn archive_item(
        &self,
        item: &Item,
        key: &str,
        summary: &mut RunSummary,
    ) -> Result<(), SyncError> {
        let payload = ItemPayload {
            field_data: item.field_data.clone(),
            is_archived: Some(true),
            is_draft: Some(false),
        };
        self.cms
            .update_item(&self.settings.articles, &item.id, &payload)
            .await?;
        let ids = [item.id.clone()];
        match self.cms.unpublish_items(&self.settings.articles, &ids).await {
            Ok(()) => {}
            Err(err) if err.kind == ErrorKind::NotFoundError => {
                debug!(item_id = %item.id, "item was not live");
            }
            Err(err) => {
                warn!(item_id = %item.id, %err, "unpublish after archive failed");
                summary.warn(key, format!("archived but unpublish failed: {}", err));
            }
        }
        Ok(())
    }

    async fn category_index(&self) -> Result<CategoryIndex, SyncError> {
        let items = list_all_items(
            self.cms.as_ref(),
            &self.settings.categories,
            self.settings.page_size,
            &[],
        )
        .await?;
        let rf = &self.settings.reference_fields;
        let mut index = CategoryIndex::new();
        for item in items {
            let kind = item.field_str(&rf.category_type);
            if let Some(name) = item.field_str(&rf.name) {
                index.entry(name).or_insert_with(|| kind.clone());
            }
            index.insert(item.id, kind);
        }
        debug!(entries = index.len(), "category index loaded");
        Ok(index)
    }
}

struct SweepContext<'a> {
    action: SweepAction,
    cfg: &'a Sweep,
    date_field: &'a str,
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
    index: Option<&'a CategoryIndex>,
}

/// Read an export file: a JSON array of source articles.
pub async fn load_articles(path: &Path) -> Result<Vec<SourceArticle>, SyncError> {
    let raw = tokio::fs::read_to_string(path).await?;
    let value: Value = serde_json::from_str(&raw)?;
    let Value::Array(entries) = value else {
        return Err(SyncError::Validation(format!(
            "{} must contain an array of articles",
            path.display()
        )));
    };
    let articles = entries
        .into_iter()
        .map(serde_json::from_value::<SourceArticle>)
        .collect::<Result<Vec<_>, _>>()?;
    info!(path = %path.display(), count = articles.len(), "loaded articles");
    Ok(articles)
}
