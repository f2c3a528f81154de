use std::time::Duration;

use crate::error::{Error, Result};
use crate::metrics::trend::TrendWindow;
use crate::storage::{repository, Database};

pub const KEY_TOP_N: &str = "top_n";
pub const KEY_RECENT_LIMIT: &str = "recent_limit";
pub const KEY_UPCOMING_LIMIT: &str = "upcoming_limit";
pub const KEY_TREND_MONTHS: &str = "trend_months";
pub const KEY_TREND_WEEKS: &str = "trend_weeks";
pub const KEY_QUERY_TIMEOUT_MS: &str = "query_timeout_ms";

/// Tunables for report building. Defaults apply unless overridden in the
/// `app_config` table.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsConfig {
    /// Length of the top performer and top deal lists.
    pub top_n: u32,
    pub recent_limit: u32,
    pub upcoming_limit: u32,
    /// Window for monthly deal revenue and lead creation trends.
    pub monthly_window: TrendWindow,
    /// Window for the weekly task trend.
    pub weekly_window: TrendWindow,
    pub query_timeout: Duration,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            top_n: 5,
            recent_limit: 10,
            upcoming_limit: 10,
            monthly_window: TrendWindow::SIX_MONTHS,
            weekly_window: TrendWindow::SIX_WEEKS,
            query_timeout: Duration::from_millis(5000),
        }
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid value for {key}: {value:?}")))
}

impl AnalyticsConfig {
    /// Apply `(key, value)` overrides on top of the defaults. Unknown keys
    /// are ignored.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self> {
        let mut config = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                KEY_TOP_N => config.top_n = parse_num(key, value)?,
                KEY_RECENT_LIMIT => config.recent_limit = parse_num(key, value)?,
                KEY_UPCOMING_LIMIT => config.upcoming_limit = parse_num(key, value)?,
                KEY_TREND_MONTHS => {
                    config.monthly_window = TrendWindow::months(parse_num(key, value)?)?
                }
                KEY_TREND_WEEKS => {
                    config.weekly_window = TrendWindow::weeks(parse_num(key, value)?)?
                }
                KEY_QUERY_TIMEOUT_MS => {
                    config.query_timeout = Duration::from_millis(parse_num(key, value)?)
                }
                _ => {}
            }
        }
        Ok(config)
    }

    /// Load overrides from the database's `app_config` table.
    pub async fn load(db: &Database) -> Result<Self> {
        let pairs = db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await?;
        let config = Self::from_pairs(&pairs)?;
        log::debug!("Loaded analytics config: {config:?}");
        Ok(config)
    }
}
