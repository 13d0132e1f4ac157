//! Override document.
//!
//! ```json
//! {
//!   "trigger_overrides": [{"triggerNumber": "1", "triggerType": "CLOUD_PUBSUB_EXTERNAL", "projectId": "p", "topicName": "t"}],
//!   "task_overrides": [{"taskId": "3", "task": "GenericRestV2Task", "parameters": {...}}],
//!   "connection_overrides": [{"taskId": "2", "task": "GenericConnectorTask", "parameters": {"connectionName": "crm"}}],
//!   "param_overrides": [{"key": "_endpoint", "defaultValue": {"stringValue": "https://b"}}]
//! }
//! ```

use super::Error;
use crate::definition::EventParameter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Trigger type named by a trigger override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerType {
    CloudPubsubExternal,
    Api,
    Other(String),
}

impl From<String> for TriggerType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "CLOUD_PUBSUB_EXTERNAL" => TriggerType::CloudPubsubExternal,
            "API" => TriggerType::Api,
            _ => TriggerType::Other(value),
        }
    }
}

impl From<TriggerType> for String {
    fn from(value: TriggerType) -> Self {
        value.as_str().to_string()
    }
}

impl TriggerType {
    pub fn as_str(&self) -> &str {
        match self {
            TriggerType::CloudPubsubExternal => "CLOUD_PUBSUB_EXTERNAL",
            TriggerType::Api => "API",
            TriggerType::Other(other) => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerOverride {
    pub trigger_number: String,
    pub trigger_type: TriggerType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_path: Option<String>,
}

impl TriggerOverride {
    pub fn pubsub(
        trigger_number: impl Into<String>,
        project_id: impl Into<String>,
        topic_name: impl Into<String>,
    ) -> Self {
        Self {
            trigger_number: trigger_number.into(),
            trigger_type: TriggerType::CloudPubsubExternal,
            project_id: Some(project_id.into()),
            topic_name: Some(topic_name.into()),
            api_path: None,
        }
    }

    pub fn api(trigger_number: impl Into<String>, api_path: impl Into<String>) -> Self {
        Self {
            trigger_number: trigger_number.into(),
            trigger_type: TriggerType::Api,
            project_id: None,
            topic_name: None,
            api_path: Some(api_path.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOverride {
    pub task_id: String,
    pub task: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, EventParameter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionParameters {
    /// Connection short name.
    pub connection_name: String,
    /// Region of the connection when it differs from the integration's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionOverride {
    pub task_id: String,
    pub task: String,
    pub parameters: ConnectionParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamOverride {
    pub key: String,
    pub default_value: Value,
}

/// Environment-specific fields of a definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trigger_overrides: Vec<TriggerOverride>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub task_overrides: Vec<TaskOverride>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connection_overrides: Vec<ConnectionOverride>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub param_overrides: Vec<ParamOverride>,
}

impl OverrideSpec {
    pub fn is_empty(&self) -> bool {
        self.trigger_overrides.is_empty()
            && self.task_overrides.is_empty()
            && self.connection_overrides.is_empty()
            && self.param_overrides.is_empty()
    }

    /// Parses and validates an override document.
    pub fn from_json(content: &str) -> Result<Self, Error> {
        let spec: Self =
            serde_json::from_str(content).map_err(|source| Error::SerdeJson { source })?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::IO {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn to_file(&self, path: &Path) -> Result<(), Error> {
        let content =
            serde_json::to_string_pretty(self).map_err(|source| Error::SerdeJson { source })?;
        std::fs::write(path, content).map_err(|source| Error::IO {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks fields that are required depending on the trigger type.
    pub fn validate(&self) -> Result<(), Error> {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());

        for (index, trigger) in self.trigger_overrides.iter().enumerate() {
            let invalid = |reason: &str| Error::InvalidOverride {
                kind: "trigger",
                index,
                reason: reason.to_string(),
            };
            if trigger.trigger_number.is_empty() {
                return Err(invalid("triggerNumber is required"));
            }
            match trigger.trigger_type {
                TriggerType::CloudPubsubExternal => {
                    if !present(&trigger.project_id) || !present(&trigger.topic_name) {
                        return Err(invalid(
                            "projectId and topicName are required for CLOUD_PUBSUB_EXTERNAL",
                        ));
                    }
                }
                TriggerType::Api => {
                    if !present(&trigger.api_path) {
                        return Err(invalid("apiPath is required for API"));
                    }
                }
                TriggerType::Other(_) => {}
            }
        }

        for (index, task) in self.task_overrides.iter().enumerate() {
            if task.task_id.is_empty() || task.task.is_empty() {
                return Err(Error::InvalidOverride {
                    kind: "task",
                    index,
                    reason: "taskId and task are required".to_string(),
                });
            }
        }

        for (index, connection) in self.connection_overrides.iter().enumerate() {
            if connection.task_id.is_empty() || connection.parameters.connection_name.is_empty()
            {
                return Err(Error::InvalidOverride {
                    kind: "connection",
                    index,
                    reason: "taskId and parameters.connectionName are required".to_string(),
                });
            }
        }

        for (index, param) in self.param_overrides.iter().enumerate() {
            if param.key.is_empty() {
                return Err(Error::InvalidOverride {
                    kind: "param",
                    index,
                    reason: "key is required".to_string(),
                });
            }
        }

        Ok(())
    }
}
