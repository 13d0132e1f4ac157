//! Request execution against the control plane.
//!
//! Every request waits on the rate limiter of its API family, carries a bearer token
//! and has its failures mapped into [`Error`]. Dry run short-circuits before any of that.

use crate::auth::{self, TokenProvider};
use crate::config::{ApiFamily, ConflictPolicy, Method, TransportOptions};
use crate::rate_limit::RateLimiter;
use flowctl_core::context::RequestContext;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Token validation endpoint.
pub const DEFAULT_TOKEN_INFO_URL: &str = "https://www.googleapis.com/oauth2/v3/tokeninfo";

/// Errors that can occur while executing a request.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("API returned {status} ({category}): {body}")]
    Api {
        status: u16,
        category: ErrorCategory,
        body: String,
    },
    #[error("Failed to decode response body: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid request URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Failed to obtain access token: {source}")]
    Auth {
        #[source]
        source: auth::Error,
    },
    #[error("Failed to build HTTP client: {source}")]
    ClientBuild {
        #[source]
        source: reqwest::Error,
    },
    #[error("Missing required builder attribute: {}", _0)]
    MissingRequiredAttribute(String),
}

impl Error {
    /// HTTP status of an API error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Human readable class of an HTTP failure status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    BadRequest,
    Unauthenticated,
    PermissionDenied,
    NotFound,
    Conflict,
    TooManyRequests,
    ServerError,
    Other,
}

impl ErrorCategory {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => ErrorCategory::BadRequest,
            401 => ErrorCategory::Unauthenticated,
            403 => ErrorCategory::PermissionDenied,
            404 => ErrorCategory::NotFound,
            409 => ErrorCategory::Conflict,
            429 => ErrorCategory::TooManyRequests,
            500..=599 => ErrorCategory::ServerError,
            _ => ErrorCategory::Other,
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ErrorCategory::BadRequest => "bad request",
            ErrorCategory::Unauthenticated => "unauthenticated",
            ErrorCategory::PermissionDenied => "permission denied",
            ErrorCategory::NotFound => "not found",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::TooManyRequests => "too many requests",
            ErrorCategory::ServerError => "server error",
            ErrorCategory::Other => "unexpected status",
        };
        f.write_str(text)
    }
}

/// Outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub family: ApiFamily,
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
    /// Whether a bearer token is attached.
    pub authenticated: bool,
}

impl ApiRequest {
    pub fn new(family: ApiFamily, method: Method, url: impl Into<String>) -> Self {
        Self {
            family,
            method,
            url: url.into(),
            body: None,
            authenticated: true,
        }
    }

    pub fn get(family: ApiFamily, url: impl Into<String>) -> Self {
        Self::new(family, Method::Get, url)
    }

    pub fn post(family: ApiFamily, url: impl Into<String>, body: Value) -> Self {
        Self::new(family, Method::Post, url).body(body)
    }

    pub fn patch(family: ApiFamily, url: impl Into<String>, body: Value) -> Self {
        Self::new(family, Method::Patch, url).body(body)
    }

    pub fn delete(family: ApiFamily, url: impl Into<String>) -> Self {
        Self::new(family, Method::Delete, url)
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn unauthenticated(mut self) -> Self {
        self.authenticated = false;
        self
    }
}

/// Successful (or tolerated) response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
    /// Set when a 409 was tolerated by [`ConflictPolicy::Ignore`].
    pub conflict: bool,
    /// Set when no request was made because dry run is active.
    pub dry_run: bool,
}

impl ApiResponse {
    /// Response returned for every call while dry run is active.
    pub fn dry_run() -> Self {
        Self {
            status: 200,
            body: Value::Object(Default::default()),
            conflict: false,
            dry_run: true,
        }
    }

    /// Decodes the body into a typed value.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, Error> {
        serde_json::from_value(self.body).map_err(|source| Error::Decode { source })
    }
}

/// Shared HTTP transport.
#[derive(Debug)]
pub struct Transport {
    client: reqwest::Client,
    token_provider: Arc<dyn TokenProvider>,
    limiters: HashMap<ApiFamily, Arc<RateLimiter>>,
    options: TransportOptions,
    token_info_url: String,
}

impl Transport {
    /// Whether requests are short-circuited.
    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    /// Limiter shared by every request of a family.
    pub fn limiter(&self, family: ApiFamily) -> Option<&Arc<RateLimiter>> {
        self.limiters.get(&family)
    }

    /// Executes a request.
    #[tracing::instrument(
        skip(self, ctx, request),
        fields(operation = %ctx.operation, family = %request.family, method = ?request.method, url = %request.url)
    )]
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        request: ApiRequest,
    ) -> Result<ApiResponse, Error> {
        if self.options.dry_run {
            debug!("Dry run, request not sent");
            return Ok(ApiResponse::dry_run());
        }

        let url = Url::parse(&request.url).map_err(|source| Error::InvalidUrl {
            url: request.url.clone(),
            source,
        })?;

        if let Some(limiter) = self.limiters.get(&request.family) {
            limiter.acquire().await;
        }

        let mut builder = self.client.request(request.method.into(), url);
        if request.authenticated {
            let token = self
                .token_provider
                .token()
                .await
                .map_err(|source| Error::Auth { source })?;
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|source| Error::Transport {
            url: request.url.clone(),
            source,
        })?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|source| Error::Transport {
            url: request.url.clone(),
            source,
        })?;

        if status == 409 && self.options.conflict_policy == ConflictPolicy::Ignore {
            if !ctx.suppress_warnings {
                warn!(status, "Resource already exists, conflict ignored");
            }
            return Ok(ApiResponse {
                status,
                body: serde_json::from_str(&text).unwrap_or(Value::Null),
                conflict: true,
                dry_run: false,
            });
        }

        if status >= 400 {
            return Err(Error::Api {
                status,
                category: ErrorCategory::from_status(status),
                body: text,
            });
        }

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|source| Error::Decode { source })?
        };
        debug!(status, "Request completed");

        if ctx.print_output {
            let pretty =
                serde_json::to_string_pretty(&body).map_err(|source| Error::Decode { source })?;
            println!("{pretty}");
        }

        Ok(ApiResponse {
            status,
            body,
            conflict: false,
            dry_run: false,
        })
    }

    /// Checks an access token against the token info endpoint.
    ///
    /// Returns `false` when the endpoint rejects the token.
    pub async fn token_info(&self, ctx: &RequestContext, token: &str) -> Result<bool, Error> {
        let mut url = Url::parse(&self.token_info_url).map_err(|source| Error::InvalidUrl {
            url: self.token_info_url.clone(),
            source,
        })?;
        url.query_pairs_mut().append_pair("access_token", token);

        let request = ApiRequest::get(ApiFamily::Auxiliary, url.to_string()).unauthenticated();
        match self.execute(&ctx.silenced(), request).await {
            Ok(_) => Ok(true),
            Err(Error::Api {
                status: 400 | 401, ..
            }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Fetches the provider's token and checks that it is still accepted.
    pub async fn validate_token(&self, ctx: &RequestContext) -> Result<bool, Error> {
        if self.options.dry_run {
            return Ok(true);
        }
        let token = self
            .token_provider
            .token()
            .await
            .map_err(|source| Error::Auth { source })?;
        self.token_info(ctx, &token).await
    }

    /// Current bearer token.
    pub async fn token(&self) -> Result<String, Error> {
        self.token_provider
            .token()
            .await
            .map_err(|source| Error::Auth { source })
    }
}

/// Builder for [`Transport`].
#[derive(Debug, Default)]
pub struct TransportBuilder {
    token_provider: Option<Arc<dyn TokenProvider>>,
    options: TransportOptions,
    rates: HashMap<ApiFamily, u32>,
    token_info_url: Option<String>,
}

impl TransportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    pub fn options(mut self, options: TransportOptions) -> Self {
        self.options = options;
        self
    }

    /// Overrides the rate of a family; zero disables throttling.
    pub fn rate_limit(mut self, family: ApiFamily, per_second: u32) -> Self {
        self.rates.insert(family, per_second);
        self
    }

    pub fn token_info_url(mut self, url: impl Into<String>) -> Self {
        self.token_info_url = Some(url.into());
        self
    }

    pub fn build(self) -> Result<Transport, Error> {
        let token_provider = self
            .token_provider
            .ok_or_else(|| Error::MissingRequiredAttribute("token_provider".to_string()))?;

        let mut client = reqwest::Client::builder();
        if let Some(proxy_url) = &self.options.proxy_url {
            let proxy =
                reqwest::Proxy::all(proxy_url).map_err(|source| Error::ClientBuild { source })?;
            client = client.proxy(proxy);
        }
        if let Some(timeout) = self.options.connect_timeout {
            client = client.connect_timeout(timeout);
        }
        let client = client
            .build()
            .map_err(|source| Error::ClientBuild { source })?;

        let limiters = [
            ApiFamily::Integrations,
            ApiFamily::Connectors,
            ApiFamily::Auxiliary,
        ]
        .into_iter()
        .map(|family| {
            let rate = self
                .rates
                .get(&family)
                .copied()
                .or(family.default_rate())
                .unwrap_or(0);
            (family, Arc::new(RateLimiter::new(rate)))
        })
        .collect();

        Ok(Transport {
            client,
            token_provider,
            limiters,
            options: self.options,
            token_info_url: self
                .token_info_url
                .unwrap_or_else(|| DEFAULT_TOKEN_INFO_URL.to_string()),
        })
    }
}
