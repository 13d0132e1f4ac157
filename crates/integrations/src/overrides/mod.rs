//! Override engine.
//!
//! [`extract`] derives an environment-agnostic [`OverrideSpec`] from a captured definition,
//! [`merge`] applies one to a definition before it is deployed elsewhere. Targets that do
//! not exist yield [`Warning`]s; strict mode turns them into an error.

use async_trait::async_trait;
use std::fmt;
use tracing::warn;

pub mod extract;
pub mod merge;
pub mod spec;

pub use extract::{extract, ExtractOutcome};
pub use merge::{merge, MergeOptions, MergeOutcome};
pub use spec::{
    ConnectionOverride, ConnectionParameters, OverrideSpec, ParamOverride, TaskOverride,
    TriggerOverride, TriggerType,
};

/// Fixed project hosting external pub/sub subscriptions.
pub const PUBSUB_SUBSCRIPTION_PREFIX: &str =
    "cloud_pubsub_external_trigger/projects/cloud-crm-eventbus-cpsexternal/subscriptions/";
/// Trigger property holding the subscription.
pub const SUBSCRIPTION_PROPERTY: &str = "Subscription name";
/// Trigger id prefix of API triggers.
pub const API_TRIGGER_PREFIX: &str = "api_trigger/";

/// Errors that can occur while extracting or merging overrides.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Lookup failed: {source}")]
    Resolver {
        #[source]
        source: crate::client::Error,
    },
    #[error("Auth config {display_name} not found")]
    AuthConfigNotFound { display_name: String },
    #[error("Invalid {kind} override at index {index}: {reason}")]
    InvalidOverride {
        kind: &'static str,
        index: usize,
        reason: String,
    },
    #[error("Task {task_id} has an invalid {key} parameter: {source}")]
    EmbeddedJson {
        task_id: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to parse override document: {source}")]
    SerdeJson {
        #[source]
        source: serde_json::Error,
    },
    #[error("IO operation failed on path {path}: {source}")]
    IO {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} override warning(s) in strict mode: {}", .warnings.len(), join(.warnings))]
    Warnings { warnings: Vec<Warning> },
}

fn join(warnings: &[Warning]) -> String {
    warnings
        .iter()
        .map(Warning::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Recoverable condition found while applying or extracting overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    TriggerNotFound { trigger_number: String },
    UnsupportedTrigger { trigger_number: String, trigger_type: String },
    TaskNotFound { task_id: String, task: String },
    ParameterNotFound { task_id: String, key: String },
    ParamNotFound { key: String },
    ConnectionTaskNotFound { task_id: String },
    AuthConfigNotFound { task_id: String, auth_config_id: String },
    InvalidSubscription { trigger_number: String, subscription: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::TriggerNotFound { trigger_number } => {
                write!(f, "trigger {trigger_number} not found")
            }
            Warning::UnsupportedTrigger {
                trigger_number,
                trigger_type,
            } => write!(
                f,
                "trigger {trigger_number} has unsupported type {trigger_type}"
            ),
            Warning::TaskNotFound { task_id, task } => {
                write!(f, "task {task_id} ({task}) not found")
            }
            Warning::ParameterNotFound { task_id, key } => {
                write!(f, "parameter {key} not found in task {task_id}")
            }
            Warning::ParamNotFound { key } => {
                write!(f, "integration parameter {key} not found")
            }
            Warning::ConnectionTaskNotFound { task_id } => {
                write!(f, "connector task {task_id} not found")
            }
            Warning::AuthConfigNotFound {
                task_id,
                auth_config_id,
            } => write!(
                f,
                "auth config {auth_config_id} of task {task_id} not found"
            ),
            Warning::InvalidSubscription {
                trigger_number,
                subscription,
            } => write!(
                f,
                "trigger {trigger_number} subscription {subscription:?} is not <project>_<topic>"
            ),
        }
    }
}

/// Collects warnings and logs them unless suppressed.
#[derive(Debug, Default)]
pub(crate) struct Warnings {
    items: Vec<Warning>,
    suppress: bool,
}

impl Warnings {
    pub(crate) fn new(suppress: bool) -> Self {
        Self {
            items: Vec::new(),
            suppress,
        }
    }

    pub(crate) fn push(&mut self, warning: Warning) {
        if !self.suppress {
            warn!("{}", warning);
        }
        self.items.push(warning);
    }

    pub(crate) fn into_vec(self) -> Vec<Warning> {
        self.items
    }
}

/// Connection details resolved from the connectors API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Full connection resource name.
    pub name: String,
    pub connector_version: String,
    pub service_name: String,
}

/// Live lookups needed by the override engine.
#[async_trait]
pub trait OverrideResolver: Send + Sync {
    /// Auth config id for a display name.
    async fn auth_config_id(
        &self,
        display_name: &str,
    ) -> Result<Option<String>, crate::client::Error>;

    /// Display name of an auth config id.
    async fn auth_config_display_name(
        &self,
        id: &str,
    ) -> Result<Option<String>, crate::client::Error>;

    /// Connection by short name, in `region` when given.
    async fn connection(
        &self,
        name: &str,
        region: Option<&str>,
    ) -> Result<ConnectionInfo, crate::client::Error>;
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Resolver answering from in-memory tables.
    #[derive(Default)]
    pub struct FakeResolver {
        pub auth_configs: BTreeMap<String, String>,
        pub connections: BTreeMap<String, ConnectionInfo>,
        pub connection_lookups: AtomicUsize,
    }

    impl FakeResolver {
        pub fn auth_config(mut self, id: &str, display_name: &str) -> Self {
            self.auth_configs
                .insert(id.to_string(), display_name.to_string());
            self
        }

        pub fn connection(mut self, region: &str, name: &str, version: &str) -> Self {
            self.connections.insert(
                format!("{region}/{name}"),
                ConnectionInfo {
                    name: format!("projects/p2/locations/{region}/connections/{name}"),
                    connector_version: version.to_string(),
                    service_name: format!("projects/p2/locations/{region}/services/{name}"),
                },
            );
            self
        }
    }

    #[async_trait]
    impl OverrideResolver for FakeResolver {
        async fn auth_config_id(
            &self,
            display_name: &str,
        ) -> Result<Option<String>, crate::client::Error> {
            Ok(self
                .auth_configs
                .iter()
                .find(|(_, display)| display.as_str() == display_name)
                .map(|(id, _)| id.clone()))
        }

        async fn auth_config_display_name(
            &self,
            id: &str,
        ) -> Result<Option<String>, crate::client::Error> {
            Ok(self.auth_configs.get(id).cloned())
        }

        async fn connection(
            &self,
            name: &str,
            region: Option<&str>,
        ) -> Result<ConnectionInfo, crate::client::Error> {
            self.connection_lookups.fetch_add(1, Ordering::SeqCst);
            let key = format!("{}/{}", region.unwrap_or("us-central1"), name);
            self.connections.get(&key).cloned().ok_or(
                crate::client::Error::IncompleteConnection {
                    name: name.to_string(),
                },
            )
        }
    }
}
