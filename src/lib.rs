pub mod config;
pub mod date_util;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod query;
pub mod storage;

use std::sync::Arc;

pub use config::AnalyticsConfig;
pub use error::{Error, Result};
pub use gateway::{DataGateway, Dimension, EntityType, Record};
pub use metrics::time::{
    business_hours, compliance_rate, duration_hours, format_duration, is_sla_compliant,
    summarize, time_ago,
};
pub use metrics::{
    DashboardOverview, DealAnalyticsReport, Distribution, LeadAnalyticsReport,
    MetricsOrchestrator, TaskAnalyticsReport, TimeMetrics, TrendPoint, TrendWindow,
};
pub use query::Filter;
pub use storage::{Database, SqliteGateway};

use storage::repository;

/// Main entry point for the CRM metrics engine.
pub struct CrmMetrics {
    db: Database,
    orchestrator: MetricsOrchestrator,
}

impl CrmMetrics {
    /// Load configuration from `db` and wire a SQLite-backed orchestrator.
    pub async fn open(db: Database) -> Result<Self> {
        let config = AnalyticsConfig::load(&db).await?;
        let gateway = SqliteGateway::new(db.clone(), config.query_timeout);
        let orchestrator = MetricsOrchestrator::new(Arc::new(gateway), config);
        Ok(Self { db, orchestrator })
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn orchestrator(&self) -> &MetricsOrchestrator {
        &self.orchestrator
    }

    // ── Config commands ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Store a setting. Values are validated before they are written so a
    /// bad override cannot break later loads.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        AnalyticsConfig::from_pairs(&[(key.to_string(), value.to_string())])?;
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Row count per entity table.
    pub async fn table_counts(&self) -> Result<Vec<(EntityType, i64)>> {
        Ok(self
            .db
            .reader()
            .call(|conn| repository::table_counts(conn))
            .await?)
    }
}
