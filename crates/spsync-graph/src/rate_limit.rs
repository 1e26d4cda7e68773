//! Rate-limit monitoring for Microsoft Graph API
//!
//! Graph reports how close a tenant is to its throttling limit through
//! response headers once usage passes 80%:
//!
//! - `x-ms-throttle-limit-percentage`: fraction of the limit consumed (0.8–1.8)
//! - `x-ms-resource-unit`: resource units charged for the request
//! - `x-ms-throttle-scope`: which limit applies
//!
//! [`RateLimitMonitor`] records these for every response, along with request
//! counts by method and by operation, and tells callers when to back off
//! before Graph starts answering 429.
//!
//! ## Usage
//!
//! ```rust
//! use reqwest::{header::HeaderMap, Method};
//! use spsync_graph::rate_limit::RateLimitMonitor;
//!
//! let monitor = RateLimitMonitor::new();
//! monitor.record(&Method::GET, "/sites/contoso", &HeaderMap::new(), false);
//! assert!(!monitor.should_slow_down());
//! ```

use std::{collections::BTreeMap, sync::Mutex, time::Duration};

use reqwest::{header::HeaderMap, Method};
use serde::Serialize;
use tracing::{debug, warn};

/// Usage fraction at which a warning is logged.
pub const ALERT_THRESHOLD: f64 = 0.8;

/// Usage fraction at which callers should pause between requests.
pub const SLOW_DOWN_THRESHOLD: f64 = 0.9;

/// Usage fraction at which Graph is throttling.
pub const THROTTLED_THRESHOLD: f64 = 1.0;

// ============================================================================
// Operation categories
// ============================================================================

/// Coarse classification of a Graph request by URL shape and method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    FileUpload,
    FileDelete,
    MetadataGet,
    MetadataUpdate,
    FolderCreate,
    FolderCheck,
    BatchOperation,
    CacheBuild,
    ColumnOps,
    SiteListInfo,
    Other,
}

impl Operation {
    /// Classify a request. Rules are checked in order; the first match wins.
    pub fn classify(method: &Method, url: &str) -> Self {
        let url = url.to_ascii_lowercase();
        let m = method.as_str();

        if m == "PUT" && (url.contains("/content") || url.contains("uploadsession")) {
            Self::FileUpload
        } else if m == "DELETE" && url.contains("/items/") {
            Self::FileDelete
        } else if m == "PATCH" && (url.contains("/fields") || url.contains("/listitem")) {
            Self::MetadataUpdate
        } else if m == "POST" && url.contains("/children") {
            Self::FolderCreate
        } else if m == "POST" && url.contains("$batch") {
            Self::BatchOperation
        } else if m == "GET" && url.contains("$expand=listitem") && url.contains("/children") {
            Self::CacheBuild
        } else if m == "GET" && url.contains("/children") && !url.contains("$expand") {
            Self::FolderCheck
        } else if url.contains("/columns") {
            Self::ColumnOps
        } else if m == "GET"
            && (url.contains("/sites/") || url.contains("/lists"))
            && !url.contains("/items/")
            && !url.contains("/drives/")
        {
            Self::SiteListInfo
        } else if m == "GET" && (url.contains("/items/") || url.contains("/drives/")) {
            Self::MetadataGet
        } else {
            Self::Other
        }
    }

    /// Title-cased label for reports.
    pub fn label(self) -> &'static str {
        match self {
            Self::FileUpload => "File Upload",
            Self::FileDelete => "File Delete",
            Self::MetadataGet => "Metadata Get",
            Self::MetadataUpdate => "Metadata Update",
            Self::FolderCreate => "Folder Create",
            Self::FolderCheck => "Folder Check",
            Self::BatchOperation => "Batch Operation",
            Self::CacheBuild => "Cache Build",
            Self::ColumnOps => "Column Ops",
            Self::SiteListInfo => "Site List Info",
            Self::Other => "Other",
        }
    }
}

// ============================================================================
// RateLimitMonitor
// ============================================================================

#[derive(Debug, Default)]
struct MonitorState {
    total_requests: u64,
    throttled_requests: u64,
    status_429: u64,
    throttle_samples: u64,
    average_throttle: f64,
    max_throttle: f64,
    resource_units: u64,
    alerts: u64,
    by_method: BTreeMap<String, u64>,
    by_operation: BTreeMap<Operation, u64>,
}

/// Thread-safe record of Graph throttling signals for one run.
#[derive(Debug, Default)]
pub struct RateLimitMonitor {
    state: Mutex<MonitorState>,
}

/// Serializable view of [`RateLimitMonitor`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RateLimitSummary {
    pub total_requests: u64,
    /// Responses reporting usage at or above the limit.
    pub throttled_requests: u64,
    /// Responses with status 429.
    pub status_429: u64,
    pub average_throttle_percentage: f64,
    pub max_throttle_percentage: f64,
    pub resource_units_consumed: u64,
    pub alerts_triggered: u64,
    pub by_method: BTreeMap<String, u64>,
    pub by_operation: BTreeMap<Operation, u64>,
}

impl RateLimitSummary {
    /// Throttled responses over all responses.
    pub fn throttle_rate(&self) -> f64 {
        self.throttled_requests as f64 / self.total_requests.max(1) as f64
    }
}

impl RateLimitMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one response.
    pub fn record(&self, method: &Method, url: &str, headers: &HeaderMap, is_429: bool) {
        let percentage = header_value::<f64>(headers, "x-ms-throttle-limit-percentage");
        let units = header_value::<u64>(headers, "x-ms-resource-unit");
        let scope = headers
            .get("x-ms-throttle-scope")
            .and_then(|v| v.to_str().ok());

        let mut state = self.state.lock().unwrap();
        state.total_requests += 1;
        *state.by_method.entry(method.as_str().to_string()).or_insert(0) += 1;
        *state
            .by_operation
            .entry(Operation::classify(method, url))
            .or_insert(0) += 1;
        if is_429 {
            state.status_429 += 1;
        }

        if let Some(pct) = percentage {
            state.throttle_samples += 1;
            let n = state.throttle_samples as f64;
            state.average_throttle += (pct - state.average_throttle) / n;
            state.max_throttle = state.max_throttle.max(pct);

            if pct >= THROTTLED_THRESHOLD {
                state.throttled_requests += 1;
                warn!(
                    usage_pct = pct * 100.0,
                    scope = scope.unwrap_or("unknown"),
                    "Graph throttling detected"
                );
            } else if pct >= ALERT_THRESHOLD {
                state.alerts += 1;
                warn!(usage_pct = pct * 100.0, "Approaching Graph rate limit");
            }
        }

        if let Some(units) = units {
            state.resource_units += units;
            debug!(units, "Resource units consumed");
        }
    }

    /// True once any response reported usage at or above 90%.
    pub fn should_slow_down(&self) -> bool {
        self.state.lock().unwrap().max_throttle >= SLOW_DOWN_THRESHOLD
    }

    pub fn max_throttle_percentage(&self) -> f64 {
        self.state.lock().unwrap().max_throttle
    }

    pub fn summary(&self) -> RateLimitSummary {
        let state = self.state.lock().unwrap();
        RateLimitSummary {
            total_requests: state.total_requests,
            throttled_requests: state.throttled_requests,
            status_429: state.status_429,
            average_throttle_percentage: state.average_throttle,
            max_throttle_percentage: state.max_throttle,
            resource_units_consumed: state.resource_units,
            alerts_triggered: state.alerts,
            by_method: state.by_method.clone(),
            by_operation: state.by_operation.clone(),
        }
    }
}

fn header_value<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

// ============================================================================
// Retry-After parsing
// ============================================================================

/// Parses the `Retry-After` header value into a `Duration`.
///
/// Supports two formats per RFC 7231:
/// 1. Integer seconds: `"120"`
/// 2. HTTP-date: `"Wed, 21 Oct 2015 07:28:00 GMT"` (at most an hour ahead)
///
/// Falls back to `default` when the value cannot be parsed.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let now = chrono::Utc::now();
        let target = date.with_timezone(&chrono::Utc);
        if target > now {
            if let Some(secs) = (target - now)
                .num_seconds()
                .try_into()
                .ok()
                .filter(|&s: &u64| s <= 3600)
            {
                return Duration::from_secs(secs);
            }
        }
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}
