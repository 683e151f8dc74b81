//! Validation, sanitizing and field mapping from source articles to
//! destination payloads.
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::config::{FieldMap, FieldSpec};
use crate::dates::{format_timestamp, normalize, parse_timestamp};
use crate::error::SyncError;
use crate::model::SourceArticle;
use crate::webflow::Item;

pub const SYNC_STATUS_SYNCED: &str = "Synced";

static CONTROL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").unwrap());
static TRAILING_OPEN_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+$").unwrap());
static LEADING_CLOSE_FRAGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^<]+>").unwrap());
static BLOCK_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(p|div|h[1-6]|ul|ol|blockquote)").unwrap());
static EMPTY_PAIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(\w+)[^>]*>\s*</(\w+)>").unwrap());
static SLUG_INVALID: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static SLUG_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static SLUG_DASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").unwrap());

/// Reference ids resolved for one article.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct References {
    pub category_id: String,
    /// `None` leaves the destination's tag field untouched.
    pub tag_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformOptions {
    /// Append a fresh hash to the slug; used on a slug-conflict retry.
    pub use_hashed_slug: bool,
    /// Leave the slug out entirely; used on updates.
    pub exclude_slug: bool,
    /// Leave image fields out; used after an image-import failure.
    pub exclude_images: bool,
}

impl TransformOptions {
    pub fn for_update() -> Self {
        Self {
            exclude_slug: true,
            ..Default::default()
        }
    }

    pub fn without_images(self) -> Self {
        Self {
            exclude_images: true,
            ..self
        }
    }
}

/// Reject articles missing `postId`, `title` or `slug`.
pub fn validate_article(article: &SourceArticle) -> Result<(), SyncError> {
    if article.post_id.trim().is_empty() {
        return Err(SyncError::Validation(
            "article missing required field: postId".into(),
        ));
    }
    let missing = |v: &Option<String>| v.as_deref().map(str::trim).unwrap_or("").is_empty();
    if missing(&article.title) {
        return Err(SyncError::Validation(format!(
            "article {} missing required field: title",
            article.post_id
        )));
    }
    if missing(&article.slug) {
        return Err(SyncError::Validation(format!(
            "article {} missing required field: slug",
            article.post_id
        )));
    }
    Ok(())
}

/// Best-effort cleanup so the rich-text field accepts the markup.
pub fn sanitize_html_content(html: &str) -> String {
    let mut out = CONTROL_CHARS.replace_all(html, "").into_owned();
    out = TRAILING_OPEN_TAG.replace(&out, "").into_owned();
    out = LEADING_CLOSE_FRAGMENT.replace(&out, "").into_owned();
    if !BLOCK_TAG.is_match(&out) {
        out = format!("<p>{}</p>", out);
    }
    out = EMPTY_PAIR
        .replace_all(&out, |caps: &Captures| {
            if caps[1] == caps[2] {
                String::new()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned();
    out.trim().to_string()
}

/// URL-safe slug for reference records.
pub fn slugify(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let cleaned = SLUG_INVALID.replace_all(&lower, "");
    let dashed = SLUG_SPACES.replace_all(&cleaned, "-");
    let collapsed = SLUG_DASHES.replace_all(&dashed, "-");
    collapsed.trim_matches('-').to_string()
}

/// Optionally suffix `slug` with a short hash of `post_id` and the current
/// time. Every call yields a new suffix.
pub fn generate_unique_slug(slug: &str, post_id: &str, append_hash: bool) -> String {
    if !append_hash {
        return slug.to_string();
    }
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(post_id.as_bytes());
    hasher.update(nanos.to_string().as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{}-{}", slug, &digest[..4])
}

fn put(out: &mut Map<String, Value>, spec: &FieldSpec, value: Option<Value>) {
    match value {
        Some(v) if !v.is_null() => {
            out.insert(spec.field.clone(), v);
        }
        _ if spec.required => {
            out.insert(spec.field.clone(), Value::Null);
        }
        _ => {}
    }
}

/// Build the destination `fieldData` for `article`.
///
/// Required fields are always present (null when the source has nothing).
/// Optional fields are omitted when absent so that an update leaves them alone.
pub fn transform_to_destination(
    article: &SourceArticle,
    refs: &References,
    opts: &TransformOptions,
    fields: &FieldMap,
) -> Map<String, Value> {
    let mut out = Map::new();
    let s = |v: &Option<String>| v.clone().map(Value::String);

    put(&mut out, &fields.post_id, Some(Value::String(article.post_id.clone())));
    put(
        &mut out,
        &fields.title,
        Some(Value::String(article.title_or_empty().to_string())),
    );
    if !opts.exclude_slug {
        let slug = generate_unique_slug(
            article.slug.as_deref().unwrap_or(""),
            &article.post_id,
            opts.use_hashed_slug,
        );
        put(&mut out, &fields.slug, Some(Value::String(slug)));
    }
    put(
        &mut out,
        &fields.content,
        article
            .content
            .as_deref()
            .map(sanitize_html_content)
            .filter(|c| !c.is_empty())
            .map(Value::String),
    );
    put(&mut out, &fields.desc, s(&article.desc));
    put(
        &mut out,
        &fields.timestamp,
        normalize(article.timestamp.as_deref()).map(Value::String),
    );
    put(
        &mut out,
        &fields.updated_date,
        normalize(article.updated_date.as_deref()).map(Value::String),
    );
    let category = Some(refs.category_id.clone()).filter(|id| !id.is_empty());
    put(&mut out, &fields.cat, category.map(Value::String));
    if let Some(tag_ids) = &refs.tag_ids {
        let ids = tag_ids.iter().cloned().map(Value::String).collect();
        put(&mut out, &fields.tags, Some(Value::Array(ids)));
    }
    put(&mut out, &fields.color, s(&article.color));
    put(&mut out, &fields.is_featured, Some(Value::Bool(article.is_featured)));
    put(&mut out, &fields.is_recurring, Some(Value::Bool(article.is_recurring)));
    if !opts.exclude_images {
        put(&mut out, &fields.featured_image_big, s(&article.featured_image_big));
        put(&mut out, &fields.featured_image_small, s(&article.featured_image_small));
    }
    put(
        &mut out,
        &fields.last_synced,
        Some(Value::String(format_timestamp(&Utc::now()))),
    );
    put(
        &mut out,
        &fields.sync_status,
        Some(Value::String(SYNC_STATUS_SYNCED.into())),
    );
    out
}

/// Whether the stored copy is older than the fresh article.
///
/// Any missing or unparseable date fails open and reports an update.
pub fn needs_update(existing: &Item, fresh: &SourceArticle, fields: &FieldMap) -> bool {
    let stored = existing
        .field_str(&fields.updated_date.field)
        .as_deref()
        .and_then(parse_timestamp);
    let incoming = fresh.updated_date.as_deref().and_then(parse_timestamp);
    match (stored, incoming) {
        (Some(stored), Some(incoming)) => incoming > stored,
        _ => true,
    }
}
