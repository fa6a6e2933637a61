//! # API Configuration
//!
//! The `api` config domain:
//!
//! ```json
//! {
//!   "base_url": "https://api.example.com/api/v1",
//!   "timeout": 30,
//!   "retry_attempts": 3,
//!   "retry_delay": 1.0,
//!   "token": null,
//!   "endpoints": {
//!     "products": "/products",
//!     "customers": "/customers",
//!     "sales": "/sales",
//!     "cashier_sessions": "/cashier-sessions"
//!   },
//!   "sync": { "interval_secs": 60, "batch_size": 50, "pull": true }
//! }
//! ```

use pdv_config::ConfigResolver;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::{SyncError, SyncResult};
use crate::retry::RetryPolicy;

fn default_base_url() -> String {
    "http://localhost:8000/api/v1".to_string()
}

fn default_timeout() -> f64 {
    30.0
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(default = "default_products")]
    pub products: String,
    #[serde(default = "default_customers")]
    pub customers: String,
    #[serde(default = "default_sales")]
    pub sales: String,
    #[serde(default = "default_sessions")]
    pub cashier_sessions: String,
}

fn default_products() -> String {
    "/products".to_string()
}

fn default_customers() -> String {
    "/customers".to_string()
}

fn default_sales() -> String {
    "/sales".to_string()
}

fn default_sessions() -> String {
    "/cashier-sessions".to_string()
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            products: default_products(),
            customers: default_customers(),
            sales: default_sales(),
            cashier_sessions: default_sessions(),
        }
    }
}

/// Sync scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSchedule {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Dirty rows pushed per table per pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Pull products and customers after pushing.
    #[serde(default = "default_pull")]
    pub pull: bool,
}

fn default_interval_secs() -> u64 {
    60
}

fn default_batch_size() -> u32 {
    50
}

fn default_pull() -> bool {
    true
}

impl Default for SyncSchedule {
    fn default() -> Self {
        SyncSchedule {
            interval_secs: default_interval_secs(),
            batch_size: default_batch_size(),
            pull: default_pull(),
        }
    }
}

impl SyncSchedule {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: f64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// First retry delay in seconds; doubles on each attempt.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,

    /// Bearer token sent with every request.
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub endpoints: Endpoints,

    #[serde(default)]
    pub sync: SyncSchedule,
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            base_url: default_base_url(),
            timeout: default_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_delay: default_retry_delay(),
            token: None,
            endpoints: Endpoints::default(),
            sync: SyncSchedule::default(),
        }
    }
}

impl ApiSettings {
    pub fn from_resolver(config: &ConfigResolver) -> Self {
        config.section("api", "")
    }

    /// Parsed base URL, always ending in `/` so relative joins keep its path.
    pub fn base_url(&self) -> SyncResult<Url> {
        let trimmed = self.base_url.trim();
        if trimmed.is_empty() {
            return Err(SyncError::InvalidConfig("api.base_url is empty".to_string()));
        }
        let url = Url::parse(&format!("{}/", trimmed.trim_end_matches('/')))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(SyncError::InvalidConfig(format!(
                "api.base_url must be http or https, got {other}"
            ))),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout).unwrap_or(Duration::from_secs(30))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts.max(1),
            initial_interval: Duration::try_from_secs_f64(self.retry_delay)
                .unwrap_or(Duration::from_secs(1)),
            ..RetryPolicy::default()
        }
    }
}
