pub mod config;
pub mod dates;
pub mod error;
pub mod http;
pub mod model;
pub mod monitor;
pub mod reconcile;
pub mod reference;
pub mod source;
pub mod summary;
pub mod transform;
pub mod webflow;

pub use error::{ApiError, ErrorKind, RunAborted, SyncError};
pub use reconcile::{load_articles, LookupStrategy, MigrationOptions, Reconciler};
pub use summary::RunSummary;
