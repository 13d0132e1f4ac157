//! Transport configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default request rate for the integrations API.
pub const DEFAULT_INTEGRATIONS_RATE: u32 = 6;

/// Default request rate for the connectors API.
pub const DEFAULT_CONNECTORS_RATE: u32 = 1;

/// API family a request belongs to; each family has its own rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiFamily {
    /// Primary integrations resource API.
    Integrations,
    /// Connectors API used for connection lookups.
    Connectors,
    /// Token info and other auxiliary endpoints, not throttled.
    Auxiliary,
}

impl ApiFamily {
    /// Default requests per second, `None` meaning unlimited.
    pub const fn default_rate(&self) -> Option<u32> {
        match self {
            ApiFamily::Integrations => Some(DEFAULT_INTEGRATIONS_RATE),
            ApiFamily::Connectors => Some(DEFAULT_CONNECTORS_RATE),
            ApiFamily::Auxiliary => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            ApiFamily::Integrations => "integrations",
            ApiFamily::Connectors => "connectors",
            ApiFamily::Auxiliary => "auxiliary",
        }
    }
}

impl std::fmt::Display for ApiFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How an HTTP 409 response is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// 409 is an API error like any other status >= 400.
    #[default]
    Fail,
    /// 409 is reported as a successful response flagged as a conflict.
    Ignore,
}

/// HTTP methods used against the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Process-wide transport options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportOptions {
    /// Short-circuits every call without touching the network.
    pub dry_run: bool,
    /// Treatment of HTTP 409.
    pub conflict_policy: ConflictPolicy,
    /// Proxy applied to every request.
    pub proxy_url: Option<String>,
    /// Connect timeout of the underlying client; requests themselves have no deadline.
    pub connect_timeout: Option<Duration>,
}
