//! Per-run outcome accounting.
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Sync,
    FullSync,
    SyncArticle,
    Migration,
    TestSync,
    Archive,
    Delete,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Sync => "sync",
            RunMode::FullSync => "full_sync",
            RunMode::SyncArticle => "sync_article",
            RunMode::Migration => "migration",
            RunMode::TestSync => "test_sync",
            RunMode::Archive => "archive",
            RunMode::Delete => "delete",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an item was left untouched. Skips are outcomes, not errors.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
pub enum SkipReason {
    #[serde(rename = "no_changes")]
    NoChanges,
    #[serde(rename = "already_exists")]
    AlreadyExists,
    #[serde(rename = "already_archived")]
    AlreadyArchived,
    #[serde(rename = "missing_date")]
    MissingDate,
    #[serde(rename = "no_category")]
    NoCategory,
    #[serde(rename = "category_not_found")]
    CategoryNotFound,
    #[serde(rename = "not_updates_type")]
    WrongCategoryType,
    #[serde(rename = "too_recent")]
    TooRecent,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoChanges => "no_changes",
            SkipReason::AlreadyExists => "already_exists",
            SkipReason::AlreadyArchived => "already_archived",
            SkipReason::MissingDate => "missing_date",
            SkipReason::NoCategory => "no_category",
            SkipReason::CategoryNotFound => "category_not_found",
            SkipReason::WrongCategoryType => "not_updates_type",
            SkipReason::TooRecent => "too_recent",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedEntry {
    pub key: String,
    pub reason: SkipReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_old: Option<i64>,
}

/// An archived or deleted destination record.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SweptEntry {
    pub key: String,
    pub item_id: String,
    pub record_date: String,
    pub days_old: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorEntry {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub message: String,
    pub category: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Warning {
    pub key: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub categories: usize,
    pub tags: usize,
    pub total: usize,
}

/// Everything one invocation did. Built incrementally, returned once.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub total_checked: usize,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub skipped: Vec<SkippedEntry>,
    pub archived: Vec<SweptEntry>,
    pub deleted: Vec<SweptEntry>,
    pub errors: Vec<ErrorEntry>,
    pub warnings: Vec<Warning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
}

impl RunSummary {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            started_at: Utc::now(),
            finished_at: None,
            total_checked: 0,
            created: Vec::new(),
            updated: Vec::new(),
            skipped: Vec::new(),
            archived: Vec::new(),
            deleted: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            cache: None,
            fatal: None,
        }
    }

    pub fn skip(&mut self, key: impl Into<String>, reason: SkipReason, days_old: Option<i64>) {
        self.skipped.push(SkippedEntry {
            key: key.into(),
            reason,
            days_old,
        });
    }

    pub fn error(&mut self, key: impl Into<String>, title: Option<&str>, err: &SyncError) {
        self.errors.push(ErrorEntry {
            key: key.into(),
            title: title.map(str::to_string),
            message: err.to_string(),
            category: err.category().to_string(),
        });
    }

    pub fn warn(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(Warning {
            key: key.into(),
            message: message.into(),
        });
    }

    pub fn skipped_with(&self, reason: SkipReason) -> usize {
        self.skipped.iter().filter(|s| s.reason == reason).count()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || self.fatal.is_some()
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - checked: {}, created: {}, updated: {}, skipped: {}, archived: {}, deleted: {}, errors: {}, warnings: {}",
            self.mode,
            self.total_checked,
            self.created.len(),
            self.updated.len(),
            self.skipped.len(),
            self.archived.len(),
            self.deleted.len(),
            self.errors.len(),
            self.warnings.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, ErrorKind};

    #[test]
    fn records_errors_with_category() {
        let mut summary = RunSummary::new(RunMode::Sync);
        let err: SyncError = ApiError::new(ErrorKind::NotFoundError, "gone").into();
        summary.error("17", Some("Title"), &err);
        assert!(summary.has_errors());
        assert_eq!(summary.errors[0].category, "NOT_FOUND_ERROR");
        assert_eq!(summary.errors[0].title.as_deref(), Some("Title"));
    }

    #[test]
    fn skip_reasons_serialize_as_codes() {
        let mut summary = RunSummary::new(RunMode::Archive);
        summary.skip("1", SkipReason::WrongCategoryType, None);
        summary.skip("2", SkipReason::TooRecent, Some(3));
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["skipped"][0]["reason"], "not_updates_type");
        assert_eq!(json["skipped"][1]["days_old"], 3);
        assert_eq!(json["mode"], "archive");
        assert_eq!(summary.skipped_with(SkipReason::TooRecent), 1);
    }
}
