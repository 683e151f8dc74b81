//! Connectivity probe for both remote systems.
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::source::ArticleSource;
use crate::webflow::{CmsService, ListQuery};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Unhealthy,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Health::Healthy => f.write_str("healthy"),
            Health::Unhealthy => f.write_str("unhealthy"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub engine_api: Health,
    pub webflow_api: Health,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.engine_api == Health::Healthy && self.webflow_api == Health::Healthy
    }
}

/// Fetch one recent source article and list one destination item.
pub async fn check_health(
    source: &dyn ArticleSource,
    cms: &dyn CmsService,
    articles_collection: &str,
) -> HealthReport {
    let mut failures = Vec::new();

    let engine_api = match source.get_recent_posts(1).await {
        Ok(_) => {
            info!("engine api healthy");
            Health::Healthy
        }
        Err(err) => {
            error!(%err, "engine api health check failed");
            failures.push(format!("engine: {}", err));
            Health::Unhealthy
        }
    };

    let webflow_api = match cms
        .list_items(articles_collection, &ListQuery::page(0, 1))
        .await
    {
        Ok(_) => {
            info!("webflow api healthy");
            Health::Healthy
        }
        Err(err) => {
            error!(%err, "webflow api health check failed");
            failures.push(format!("webflow: {}", err));
            Health::Unhealthy
        }
    };

    HealthReport {
        engine_api,
        webflow_api,
        failures,
        timestamp: Utc::now(),
    }
}
