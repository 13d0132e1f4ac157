//! Bearer token providers.
//!
//! A provider hands out the access token injected into every authenticated request.
//! The Google provider follows the `Client`/`Builder` pattern: build it, then `connect`
//! to create the underlying token source.

use async_trait::async_trait;
use flowctl_core::client::Client;
use gcloud_auth::credentials::CredentialsFile;
use gcloud_auth::project::Config;
use gcloud_auth::token::DefaultTokenSourceProvider;
use std::path::PathBuf;
use std::sync::Arc;
use token_source::{TokenSource, TokenSourceProvider};
use tracing::debug;

/// OAuth scope requested for control plane calls.
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Errors that can occur while obtaining access tokens.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Failed to read credentials file {path}: {source}")]
    Credentials {
        path: PathBuf,
        #[source]
        source: gcloud_auth::error::Error,
    },
    #[error("Failed to create token source: {source}")]
    TokenSource {
        #[source]
        source: gcloud_auth::error::Error,
    },
    #[error("Failed to fetch access token: {source}")]
    Token {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Token provider is not connected")]
    NotConnected,
    #[error("Access token is empty")]
    EmptyToken,
}

/// Source of bearer tokens.
#[async_trait]
pub trait TokenProvider: Send + Sync + std::fmt::Debug {
    /// Returns a bearer token, fetching it on first use.
    async fn token(&self) -> Result<String, Error>;
}

/// Provider returning a fixed, previously obtained token.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<String, Error> {
        if self.token.is_empty() {
            return Err(Error::EmptyToken);
        }
        Ok(self.token.clone())
    }
}

/// Provider backed by Google credentials.
///
/// Uses a service account key file when a path is configured, otherwise application
/// default credentials (environment, gcloud configuration or the metadata server).
/// The token source reuses its token until shortly before expiry, then fetches a new one.
pub struct GoogleTokenProvider {
    credentials_path: Option<PathBuf>,
    scopes: Vec<String>,
    source: Option<Arc<dyn TokenSource>>,
}

impl std::fmt::Debug for GoogleTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleTokenProvider")
            .field("credentials_path", &self.credentials_path)
            .field("scopes", &self.scopes)
            .field("connected", &self.source.is_some())
            .finish()
    }
}

impl GoogleTokenProvider {
    /// Provider reading a service account key file.
    pub fn from_credentials_file(path: impl Into<PathBuf>) -> GoogleTokenProviderBuilder {
        GoogleTokenProviderBuilder::new().credentials_path(path)
    }

    /// Provider using application default credentials.
    pub fn ambient() -> GoogleTokenProviderBuilder {
        GoogleTokenProviderBuilder::new()
    }
}

impl Client for GoogleTokenProvider {
    type Error = Error;

    async fn connect(mut self) -> Result<Self, Error> {
        let scopes: Vec<&str> = self.scopes.iter().map(String::as_str).collect();
        let config = Config::default().with_scopes(&scopes);

        let provider = match &self.credentials_path {
            Some(path) => {
                debug!(path = %path.display(), "Loading service account credentials");
                let credentials =
                    CredentialsFile::new_from_file(path.to_string_lossy().to_string())
                        .await
                        .map_err(|source| Error::Credentials {
                            path: path.clone(),
                            source,
                        })?;
                DefaultTokenSourceProvider::new_with_credentials(config, Box::new(credentials))
                    .await
                    .map_err(|source| Error::TokenSource { source })?
            }
            None => {
                debug!("Using application default credentials");
                DefaultTokenSourceProvider::new(config)
                    .await
                    .map_err(|source| Error::TokenSource { source })?
            }
        };

        self.source = Some(provider.token_source());
        Ok(self)
    }
}

#[async_trait]
impl TokenProvider for GoogleTokenProvider {
    async fn token(&self) -> Result<String, Error> {
        let source = self.source.as_ref().ok_or(Error::NotConnected)?;
        let header = source
            .token()
            .await
            .map_err(|source| Error::Token { source })?;
        access_token(&header)
    }
}

/// Strips the token type from an `Authorization` header value.
fn access_token(header: &str) -> Result<String, Error> {
    let token = header
        .strip_prefix("Bearer ")
        .unwrap_or(header)
        .trim();
    if token.is_empty() {
        return Err(Error::EmptyToken);
    }
    Ok(token.to_string())
}

/// Builder for [`GoogleTokenProvider`].
#[derive(Debug, Default)]
pub struct GoogleTokenProviderBuilder {
    credentials_path: Option<PathBuf>,
    scopes: Vec<String>,
}

impl GoogleTokenProviderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    pub fn build(self) -> GoogleTokenProvider {
        let scopes = if self.scopes.is_empty() {
            vec![DEFAULT_SCOPE.to_string()]
        } else {
            self.scopes
        };
        GoogleTokenProvider {
            credentials_path: self.credentials_path,
            scopes,
            source: None,
        }
    }
}
