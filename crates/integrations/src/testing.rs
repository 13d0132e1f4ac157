//! In-process fake of the integrations, auth config and connectors APIs.

use crate::client::{IntegrationsClient, IntegrationsClientBuilder};
use axum::extract::{Query, State};
use axum::http::{Method, StatusCode, Uri};
use axum::Router;
use flowctl_http::auth::StaticTokenProvider;
use flowctl_http::config::{ApiFamily, TransportOptions};
use flowctl_http::transport::{Transport, TransportBuilder};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub const PROJECT: &str = "test-project";
pub const REGION: &str = "us-central1";

#[derive(Default)]
pub struct FakeApi {
    catalog: BTreeMap<String, Vec<Value>>,
    page_size: usize,
    auth_configs: BTreeMap<String, String>,
    connections: BTreeMap<(String, String), (String, String)>,
    failing: HashSet<String>,
    uploads: Mutex<Vec<(String, Value)>>,
    created: Mutex<Vec<(String, Value)>>,
}

impl FakeApi {
    /// Catalog of integrations with `n` versions each, snapshots `1..=n`.
    pub fn with_catalog(entries: &[(&str, u64)]) -> Self {
        let mut api = Self::default();
        for (name, versions) in entries {
            let bodies = (1..=*versions)
                .map(|snapshot| version_body(name, snapshot))
                .collect();
            api.catalog.insert(name.to_string(), bodies);
        }
        api
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn auth_config(mut self, id: &str, display_name: &str) -> Self {
        self.auth_configs
            .insert(id.to_string(), display_name.to_string());
        self
    }

    pub fn connection(mut self, region: &str, name: &str, version: &str, service: &str) -> Self {
        self.connections.insert(
            (region.to_string(), name.to_string()),
            (version.to_string(), service.to_string()),
        );
        self
    }

    /// Every call touching this integration fails with 500.
    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn uploads(&self) -> Vec<(String, Value)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<(String, Value)> {
        self.created.lock().unwrap().clone()
    }

    fn page<T: Clone>(&self, items: &[T], query: &HashMap<String, String>) -> (Vec<T>, String) {
        let size = query
            .get("pageSize")
            .and_then(|s| s.parse().ok())
            .unwrap_or(self.page_size);
        let start: usize = query
            .get("pageToken")
            .and_then(|t| t.parse().ok())
            .unwrap_or(0);
        let end = if size == 0 {
            items.len()
        } else {
            (start + size).min(items.len())
        };
        let next = if end < items.len() {
            end.to_string()
        } else {
            String::new()
        };
        (items[start.min(end)..end].to_vec(), next)
    }

    fn list_integrations(&self, query: &HashMap<String, String>) -> (StatusCode, String) {
        let names: Vec<Value> = self
            .catalog
            .keys()
            .map(|name| {
                json!({ "name": format!("projects/{PROJECT}/locations/{REGION}/integrations/{name}") })
            })
            .collect();
        let (integrations, next) = self.page(&names, query);
        ok(json!({ "integrations": integrations, "nextPageToken": next }))
    }

    fn list_versions(&self, name: &str, query: &HashMap<String, String>) -> (StatusCode, String) {
        if self.failing.contains(name) {
            return failure();
        }
        let mut versions = self.catalog.get(name).cloned().unwrap_or_default();
        if query
            .get("orderBy")
            .is_some_and(|order| order.ends_with("desc"))
        {
            versions.reverse();
        }
        let (versions, next) = self.page(&versions, query);
        ok(json!({ "integrationVersions": versions, "nextPageToken": next }))
    }

    fn get_version(&self, name: &str, version: &str) -> (StatusCode, String) {
        self.catalog
            .get(name)
            .and_then(|versions| {
                versions.iter().find(|body| {
                    body["name"]
                        .as_str()
                        .is_some_and(|n| n.ends_with(&format!("/versions/{version}")))
                })
            })
            .map(|body| ok(body.clone()))
            .unwrap_or_else(not_found)
    }

    fn upload(&self, name: &str, body: &str) -> (StatusCode, String) {
        if self.failing.contains(name) {
            return failure();
        }
        let Ok(envelope) = serde_json::from_str::<Value>(body) else {
            return (StatusCode::BAD_REQUEST, "invalid body".to_string());
        };
        self.uploads
            .lock()
            .unwrap()
            .push((name.to_string(), envelope));
        ok(json!({}))
    }

    fn create(&self, name: &str, body: &str) -> (StatusCode, String) {
        let Ok(definition) = serde_json::from_str::<Value>(body) else {
            return (StatusCode::BAD_REQUEST, "invalid body".to_string());
        };
        self.created
            .lock()
            .unwrap()
            .push((name.to_string(), definition.clone()));
        ok(definition)
    }

    fn list_auth_configs(&self, query: &HashMap<String, String>) -> (StatusCode, String) {
        let wanted = query
            .get("filter")
            .and_then(|f| f.strip_prefix("display_name=\""))
            .and_then(|f| f.strip_suffix('"'))
            .unwrap_or_default();
        let configs: Vec<Value> = self
            .auth_configs
            .iter()
            .filter(|(_, display)| display.as_str() == wanted)
            .map(|(id, display)| auth_config_body(id, display))
            .collect();
        if configs.is_empty() {
            ok(json!({}))
        } else {
            ok(json!({ "authConfigs": configs }))
        }
    }

    fn get_auth_config(&self, id: &str) -> (StatusCode, String) {
        self.auth_configs
            .get(id)
            .map(|display| ok(auth_config_body(id, display)))
            .unwrap_or_else(not_found)
    }

    fn get_connection(&self, region: &str, name: &str) -> (StatusCode, String) {
        self.connections
            .get(&(region.to_string(), name.to_string()))
            .map(|(version, service)| {
                ok(json!({
                    "name": format!("projects/{PROJECT}/locations/{region}/connections/{name}"),
                    "connectorVersion": version,
                    "serviceDirectory": service,
                }))
            })
            .unwrap_or_else(not_found)
    }
}

pub fn version_body(name: &str, snapshot: u64) -> Value {
    json!({
        "name": format!("projects/{PROJECT}/locations/{REGION}/integrations/{name}/versions/ver-{snapshot}"),
        "snapshotNumber": snapshot.to_string(),
        "state": "DRAFT",
        "lockHolder": "dev@example.com",
        "updateTime": "2024-03-01T12:00:00Z",
        "description": format!("{name} snapshot {snapshot}"),
        "triggerConfigs": [{
            "triggerNumber": "1",
            "triggerType": "API",
            "triggerId": format!("api_trigger/{name}")
        }]
    })
}

fn auth_config_body(id: &str, display_name: &str) -> Value {
    json!({
        "name": format!("projects/{PROJECT}/locations/{REGION}/authConfigs/{id}"),
        "displayName": display_name,
    })
}

fn ok(body: Value) -> (StatusCode, String) {
    (StatusCode::OK, body.to_string())
}

fn not_found() -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, "{\"error\":\"not found\"}".to_string())
}

fn failure() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "{\"error\":\"internal\"}".to_string(),
    )
}

async fn handle(
    State(api): State<Arc<FakeApi>>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    body: String,
) -> (StatusCode, String) {
    let segments: Vec<&str> = uri.path().trim_matches('/').split('/').collect();
    if segments.len() < 6 || segments[0] != "v1" {
        return not_found();
    }
    let region = segments[4];

    match (method.as_str(), &segments[5..]) {
        ("GET", ["integrations"]) => api.list_integrations(&query),
        ("GET", ["integrations", name, "versions"]) => api.list_versions(name, &query),
        ("POST", ["integrations", name, "versions"]) => api.create(name, &body),
        ("POST", ["integrations", name, "versions:upload"]) => api.upload(name, &body),
        ("GET", ["integrations", name, "versions", version]) => api.get_version(name, version),
        ("GET", ["authConfigs"]) => api.list_auth_configs(&query),
        ("GET", ["authConfigs", id]) => api.get_auth_config(id),
        ("GET", ["connections", name]) => api.get_connection(region, name),
        _ => not_found(),
    }
}

/// Serves the fake on an ephemeral local port.
pub async fn serve(api: FakeApi) -> (String, Arc<FakeApi>) {
    let api = Arc::new(api);
    let router = Router::new().fallback(handle).with_state(Arc::clone(&api));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}"), api)
}

/// Unthrottled transport with a static token.
pub fn transport(options: TransportOptions) -> Arc<Transport> {
    Arc::new(
        TransportBuilder::new()
            .token_provider(Arc::new(StaticTokenProvider::new("test-token")))
            .options(options)
            .rate_limit(ApiFamily::Integrations, 0)
            .rate_limit(ApiFamily::Connectors, 0)
            .build()
            .unwrap(),
    )
}

pub fn dry_run_transport() -> Arc<Transport> {
    transport(TransportOptions {
        dry_run: true,
        ..Default::default()
    })
}

/// Client talking to a freshly served fake.
pub async fn client(api: FakeApi) -> (Arc<IntegrationsClient>, Arc<FakeApi>) {
    let (base, api) = serve(api).await;
    let client = IntegrationsClientBuilder::new()
        .transport(transport(TransportOptions::default()))
        .project(PROJECT)
        .region(REGION)
        .integrations_endpoint(base.clone())
        .connectors_endpoint(base)
        .build()
        .unwrap();
    (Arc::new(client), api)
}
