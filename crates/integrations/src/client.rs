//! REST client for the integrations control plane.
//!
//! Wraps a shared [`Transport`] with the URL layout of the integrations, auth config and
//! connectors APIs. List endpoints are exposed as [`PageFetcher`]s so callers drive them
//! through an [`Enumerator`](crate::enumerate::Enumerator).

use crate::definition::Definition;
use crate::enumerate::{Page, PageFetcher, PageRequest};
use crate::overrides::{ConnectionInfo, OverrideResolver};
use crate::resource::{self, ResourceDescriptor};
use async_trait::async_trait;
use flowctl_core::context::RequestContext;
use flowctl_http::config::ApiFamily;
use flowctl_http::transport::{ApiRequest, ApiResponse, Transport};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, Instrument};

/// Connectors API root.
pub const DEFAULT_CONNECTORS_ENDPOINT: &str = "https://connectors.googleapis.com";

/// Errors that can occur while calling the control plane.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] flowctl_http::transport::Error),
    #[error("Invalid version resource: {source}")]
    Resource {
        #[source]
        source: resource::Error,
    },
    #[error("JSON serialization failed: {source}")]
    SerdeJson {
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid URL {url}: {source}")]
    ParseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Connection {name} response has no connector version")]
    IncompleteConnection { name: String },
    #[error("Missing required builder attribute: {}", _0)]
    MissingRequiredAttribute(String),
}

/// Format of an uploaded definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileFormat {
    #[default]
    Json,
    Yaml,
}

/// A listed version together with its full body.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionRecord {
    pub descriptor: ResourceDescriptor,
    pub body: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListIntegrationsResponse {
    #[serde(default)]
    integrations: Vec<NamedResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListVersionsResponse {
    #[serde(default)]
    integration_versions: Vec<Value>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedResource {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListAuthConfigsResponse {
    #[serde(default)]
    auth_configs: Vec<AuthConfigResource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthConfigResource {
    #[serde(default)]
    name: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionResource {
    #[serde(default)]
    name: String,
    #[serde(default)]
    connector_version: Option<String>,
    #[serde(default)]
    service_directory: Option<String>,
}

/// Client bound to one project and region.
#[derive(Debug)]
pub struct IntegrationsClient {
    transport: Arc<Transport>,
    project: String,
    region: String,
    /// Root of the integrations API, region specific when unset.
    integrations_endpoint: Option<String>,
    connectors_endpoint: String,
}

impl IntegrationsClient {
    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    fn integrations_root(&self) -> String {
        match &self.integrations_endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}-integrations.googleapis.com", self.region),
        }
    }

    /// `.../v1/projects/<project>/locations/<region>`.
    pub fn parent_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}",
            self.integrations_root(),
            self.project,
            self.region
        )
    }

    fn integration_url(&self, name: &str) -> String {
        format!("{}/integrations/{}", self.parent_url(), name)
    }

    fn with_query(base: &str, query: &[(&str, String)]) -> Result<String, Error> {
        let mut url = url::Url::parse(base).map_err(|source| Error::ParseUrl {
            url: base.to_string(),
            source,
        })?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url.to_string())
    }

    async fn send(&self, ctx: &RequestContext, request: ApiRequest) -> Result<ApiResponse, Error> {
        Ok(self.transport.execute(ctx, request).await?)
    }

    /// Lists one page of integration names.
    pub async fn list_integrations(
        &self,
        ctx: &RequestContext,
        request: &PageRequest,
        page_token: Option<&str>,
    ) -> Result<Page<String>, Error> {
        let url = Self::with_query(
            &format!("{}/integrations", self.parent_url()),
            &request.query(page_token),
        )?;
        let response: ListIntegrationsResponse = self
            .send(ctx, ApiRequest::get(ApiFamily::Integrations, url))
            .await?
            .json()?;

        let items = response
            .integrations
            .into_iter()
            .map(|integration| {
                resource::integration_name(&integration.name)
                    .map(str::to_string)
                    .unwrap_or(integration.name)
            })
            .collect();

        Ok(Page {
            items,
            next_page_token: response.next_page_token,
        })
    }

    /// Lists one page of versions of an integration.
    pub async fn list_versions(
        &self,
        ctx: &RequestContext,
        integration: &str,
        request: &PageRequest,
        page_token: Option<&str>,
    ) -> Result<Page<VersionRecord>, Error> {
        let url = Self::with_query(
            &format!("{}/versions", self.integration_url(integration)),
            &request.query(page_token),
        )?;
        let response: ListVersionsResponse = self
            .send(ctx, ApiRequest::get(ApiFamily::Integrations, url))
            .await?
            .json()?;

        let items = response
            .integration_versions
            .into_iter()
            .map(|body| {
                let descriptor = ResourceDescriptor::from_version(&body)
                    .map_err(|source| Error::Resource { source })?;
                Ok(VersionRecord { descriptor, body })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(Page {
            items,
            next_page_token: response.next_page_token,
        })
    }

    /// Fetches one version.
    pub async fn get_version(
        &self,
        ctx: &RequestContext,
        integration: &str,
        version: &str,
    ) -> Result<Value, Error> {
        let url = format!("{}/versions/{}", self.integration_url(integration), version);
        Ok(self
            .send(ctx, ApiRequest::get(ApiFamily::Integrations, url))
            .await?
            .body)
    }

    /// Creates a new version from a definition.
    pub async fn create_version(
        &self,
        ctx: &RequestContext,
        integration: &str,
        definition: &Definition,
    ) -> Result<ApiResponse, Error> {
        let body = serde_json::to_value(definition).map_err(|source| Error::SerdeJson { source })?;
        let url = format!("{}/versions", self.integration_url(integration));
        self.send(ctx, ApiRequest::post(ApiFamily::Integrations, url, body))
            .await
    }

    /// Uploads a serialized definition as a new version.
    pub async fn upload_version(
        &self,
        ctx: &RequestContext,
        integration: &str,
        content: String,
        format: FileFormat,
    ) -> Result<ApiResponse, Error> {
        let url = format!("{}/versions:upload", self.integration_url(integration));
        let body = json!({ "content": content, "fileFormat": format });
        self.send(ctx, ApiRequest::post(ApiFamily::Integrations, url, body))
            .await
    }

    /// Looks up an auth config id by display name.
    pub async fn find_auth_config(
        &self,
        ctx: &RequestContext,
        display_name: &str,
    ) -> Result<Option<String>, Error> {
        let url = Self::with_query(
            &format!("{}/authConfigs", self.parent_url()),
            &[("filter", format!("display_name=\"{display_name}\""))],
        )?;
        let response: ListAuthConfigsResponse = self
            .send(ctx, ApiRequest::get(ApiFamily::Integrations, url))
            .await?
            .json()?;

        Ok(response
            .auth_configs
            .into_iter()
            .find(|config| !config.name.is_empty())
            .and_then(|config| config.name.rsplit('/').next().map(str::to_string)))
    }

    /// Looks up the display name of an auth config, `None` when it does not exist.
    pub async fn auth_config_display_name(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<Option<String>, Error> {
        let url = format!("{}/authConfigs/{}", self.parent_url(), id);
        match self
            .send(ctx, ApiRequest::get(ApiFamily::Integrations, url))
            .await
        {
            Ok(response) => Ok(response.json::<AuthConfigResource>()?.display_name),
            Err(Error::Transport(err)) if err.status() == Some(404) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Fetches a connection, in `region` when given, otherwise in the client's region.
    pub async fn get_connection(
        &self,
        ctx: &RequestContext,
        name: &str,
        region: Option<&str>,
    ) -> Result<ConnectionInfo, Error> {
        let region = region.unwrap_or(&self.region);
        let url = Self::with_query(
            &format!(
                "{}/v1/projects/{}/locations/{}/connections/{}",
                self.connectors_endpoint.trim_end_matches('/'),
                self.project,
                region,
                name
            ),
            &[("view", "BASIC".to_string())],
        )?;
        let response: ConnectionResource = self
            .send(ctx, ApiRequest::get(ApiFamily::Connectors, url))
            .await?
            .json()?;

        let connector_version = response
            .connector_version
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::IncompleteConnection {
                name: name.to_string(),
            })?;
        debug!(connection = %response.name, %connector_version, "Resolved connection");

        Ok(ConnectionInfo {
            name: response.name,
            connector_version,
            service_name: response.service_directory.unwrap_or_default(),
        })
    }
}

/// Builder for [`IntegrationsClient`].
#[derive(Debug, Default)]
pub struct IntegrationsClientBuilder {
    transport: Option<Arc<Transport>>,
    project: Option<String>,
    region: Option<String>,
    integrations_endpoint: Option<String>,
    connectors_endpoint: Option<String>,
}

impl IntegrationsClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(mut self, transport: Arc<Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Overrides the integrations API root, e.g. for a local test server.
    pub fn integrations_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.integrations_endpoint = Some(endpoint.into());
        self
    }

    pub fn connectors_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.connectors_endpoint = Some(endpoint.into());
        self
    }

    pub fn build(self) -> Result<IntegrationsClient, Error> {
        Ok(IntegrationsClient {
            transport: self
                .transport
                .ok_or_else(|| Error::MissingRequiredAttribute("transport".to_string()))?,
            project: self
                .project
                .filter(|p| !p.is_empty())
                .ok_or_else(|| Error::MissingRequiredAttribute("project".to_string()))?,
            region: self
                .region
                .filter(|r| !r.is_empty())
                .ok_or_else(|| Error::MissingRequiredAttribute("region".to_string()))?,
            integrations_endpoint: self.integrations_endpoint,
            connectors_endpoint: self
                .connectors_endpoint
                .unwrap_or_else(|| DEFAULT_CONNECTORS_ENDPOINT.to_string()),
        })
    }
}

/// Pages of integration names.
pub struct IntegrationsFetcher {
    client: Arc<IntegrationsClient>,
    ctx: RequestContext,
}

impl IntegrationsFetcher {
    pub fn new(client: Arc<IntegrationsClient>, ctx: &RequestContext) -> Self {
        Self {
            client,
            ctx: ctx.silenced(),
        }
    }
}

#[async_trait]
impl PageFetcher for IntegrationsFetcher {
    type Item = String;

    async fn fetch(
        &self,
        request: &PageRequest,
        page_token: Option<&str>,
    ) -> Result<Page<String>, Error> {
        self.client
            .list_integrations(&self.ctx, request, page_token)
            .await
    }
}

/// Pages of versions of one integration.
pub struct VersionsFetcher {
    client: Arc<IntegrationsClient>,
    ctx: RequestContext,
    integration: String,
}

impl VersionsFetcher {
    pub fn new(
        client: Arc<IntegrationsClient>,
        ctx: &RequestContext,
        integration: impl Into<String>,
    ) -> Self {
        Self {
            client,
            ctx: ctx.silenced(),
            integration: integration.into(),
        }
    }
}

#[async_trait]
impl PageFetcher for VersionsFetcher {
    type Item = VersionRecord;

    async fn fetch(
        &self,
        request: &PageRequest,
        page_token: Option<&str>,
    ) -> Result<Page<VersionRecord>, Error> {
        let span = tracing::debug_span!("list_versions", integration = %self.integration);
        self.client
            .list_versions(&self.ctx, &self.integration, request, page_token)
            .instrument(span)
            .await
    }
}

/// Live lookups used by the override engine; responses are never printed.
pub struct ClientResolver {
    client: Arc<IntegrationsClient>,
    ctx: RequestContext,
}

impl ClientResolver {
    pub fn new(client: Arc<IntegrationsClient>, ctx: &RequestContext) -> Self {
        Self {
            client,
            ctx: ctx.silenced(),
        }
    }
}

#[async_trait]
impl OverrideResolver for ClientResolver {
    async fn auth_config_id(&self, display_name: &str) -> Result<Option<String>, Error> {
        self.client.find_auth_config(&self.ctx, display_name).await
    }

    async fn auth_config_display_name(&self, id: &str) -> Result<Option<String>, Error> {
        self.client.auth_config_display_name(&self.ctx, id).await
    }

    async fn connection(
        &self,
        name: &str,
        region: Option<&str>,
    ) -> Result<ConnectionInfo, Error> {
        self.client.get_connection(&self.ctx, name, region).await
    }
}
