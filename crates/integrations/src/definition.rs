//! Integration version document model.
//!
//! Only the parts the override engine touches are typed; everything else rides along in
//! `extra` maps so a parse/serialize cycle preserves unknown fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Top-level fields only meaningful inside the source environment.
pub const INTERNAL_FIELDS: &[&str] = &[
    "name",
    "origin",
    "lockHolder",
    "createTime",
    "updateTime",
    "lastModifierEmail",
    "snapshotNumber",
    "state",
    "status",
    "parentTemplateId",
    "createdFromTemplate",
];

/// Task type of connector tasks.
pub const CONNECTOR_TASK: &str = "GenericConnectorTask";
/// Task type of REST tasks.
pub const REST_TASK: &str = "GenericRestV2Task";
/// Task type of cloud function tasks.
pub const CLOUD_FUNCTION_TASK: &str = "CloudFunctionTask";

/// Parameter holding a task's auth config reference.
pub const AUTH_CONFIG_PARAM: &str = "authConfig";
/// Parameter holding a connector task's connection.
pub const CONNECTOR_CONFIG_PARAM: &str = "config";
/// URL parameter of REST tasks.
pub const REST_URL_PARAM: &str = "url";
/// URL parameter of cloud function tasks.
pub const CLOUD_FUNCTION_URL_PARAM: &str = "TriggerUrl";

/// `@type` of an embedded auth config reference.
pub const AUTH_CONFIG_TYPE: &str =
    "type.googleapis.com/enterprise.crm.eventbus.authconfig.AuthConfigTaskParam";
/// `@type` of an embedded connection reference.
pub const CONNECTOR_CONFIG_TYPE: &str =
    "type.googleapis.com/enterprise.crm.eventbus.proto.ConnectorsConnection";

/// Errors that can occur while reading definitions.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Failed to parse definition: {source}")]
    SerdeJson {
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to parse YAML definition: {source}")]
    SerdeYaml {
        #[source]
        source: serde_yaml::Error,
    },
    #[error("IO operation failed on path {path}: {source}")]
    IO {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Strips internal fields from a version body, producing its promotable form.
pub fn to_external(mut body: Value) -> Value {
    if let Value::Object(map) = &mut body {
        for field in INTERNAL_FIELDS {
            map.remove(*field);
        }
    }
    body
}

/// Integration version definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Definition {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trigger_configs: Vec<TriggerConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub task_configs: Vec<TaskConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub integration_parameters: Vec<IntegrationParameter>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Definition {
    pub fn from_value(value: Value) -> Result<Self, Error> {
        serde_json::from_value(value).map_err(|source| Error::SerdeJson { source })
    }

    pub fn to_value(&self) -> Result<Value, Error> {
        serde_json::to_value(self).map_err(|source| Error::SerdeJson { source })
    }

    /// Reads a definition file; `.yaml`/`.yml` files are parsed as YAML.
    pub fn from_file(path: &std::path::Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::IO {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|source| Error::SerdeYaml { source })
            }
            _ => serde_json::from_str(&content).map_err(|source| Error::SerdeJson { source }),
        }
    }

    pub fn trigger_mut(&mut self, trigger_number: &str) -> Option<&mut TriggerConfig> {
        self.trigger_configs
            .iter_mut()
            .find(|t| t.trigger_number == trigger_number)
    }

    pub fn task_mut(&mut self, task_id: &str, task: &str) -> Option<&mut TaskConfig> {
        self.task_configs
            .iter_mut()
            .find(|t| t.task_id == task_id && t.task == task)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
    #[serde(default)]
    pub trigger_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskConfig {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub task: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, EventParameter>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Named task parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventParameter {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: ParameterValue,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventParameter {
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: ParameterValue {
                string_value: Some(value.into()),
                ..Default::default()
            },
            extra: Map::new(),
        }
    }
}

/// Parameter value; kinds other than string and JSON stay in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    /// JSON document encoded as a string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_value: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ParameterValue {
    /// Decodes the embedded JSON document.
    pub fn decode_json<T: serde::de::DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.json_value.as_deref().map(serde_json::from_str)
    }

    /// Replaces the embedded JSON document.
    pub fn encode_json<T: Serialize>(&mut self, value: &T) -> Result<(), serde_json::Error> {
        self.json_value = Some(serde_json::to_string(value)?);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationParameter {
    #[serde(default)]
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_output_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IntegrationParameter {
    /// Config-style parameter: `_` prefixed and neither input nor output.
    pub fn is_config_param(&self) -> bool {
        self.key.starts_with('_')
            && !matches!(
                self.input_output_type.as_deref(),
                Some("IN") | Some("OUT") | Some("IN_OUT")
            )
    }
}

/// Auth config reference embedded in a task's `authConfig` parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfigTaskParam {
    #[serde(rename = "@type", default = "auth_config_type")]
    pub type_url: String,
    #[serde(default)]
    pub auth_config_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn auth_config_type() -> String {
    AUTH_CONFIG_TYPE.to_string()
}

impl AuthConfigTaskParam {
    pub fn new(auth_config_id: impl Into<String>) -> Self {
        Self {
            type_url: auth_config_type(),
            auth_config_id: auth_config_id.into(),
            extra: Map::new(),
        }
    }
}

/// Connection reference embedded in a connector task's `config` parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorConfig {
    #[serde(rename = "@type", default = "connector_config_type")]
    pub type_url: String,
    #[serde(default)]
    pub connection_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub connection_version: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn connector_config_type() -> String {
    CONNECTOR_CONFIG_TYPE.to_string()
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            type_url: connector_config_type(),
            connection_name: String::new(),
            service_name: String::new(),
            connection_version: String::new(),
            extra: Map::new(),
        }
    }
}

impl ConnectorConfig {
    /// Connection short name, the last segment of `connection_name`.
    pub fn connection_short_name(&self) -> &str {
        self.connection_name
            .rsplit('/')
            .next()
            .unwrap_or(&self.connection_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "name": "projects/p/locations/r/integrations/orders/versions/v1",
            "snapshotNumber": "3",
            "state": "ACTIVE",
            "lockHolder": "someone@example.com",
            "description": "order sync",
            "triggerConfigs": [{
                "triggerNumber": "1",
                "triggerType": "CLOUD_PUBSUB_EXTERNAL",
                "triggerId": "cloud_pubsub_external_trigger/projects/cloud-crm-eventbus-cpsexternal/subscriptions/proj1_topicA",
                "properties": {"Subscription name": "proj1_topicA"},
                "label": "Pub/Sub"
            }],
            "taskConfigs": [{
                "taskId": "2",
                "task": "GenericConnectorTask",
                "parameters": {
                    "config": {
                        "key": "config",
                        "value": {"jsonValue": "{\"@type\":\"type.googleapis.com/enterprise.crm.eventbus.proto.ConnectorsConnection\",\"connectionName\":\"projects/p/locations/r/connections/crm\"}"}
                    },
                    "connectorInputPayloadVariable": {
                        "key": "connectorInputPayloadVariable",
                        "value": {"stringValue": "$payload$"}
                    },
                    "retries": {"key": "retries", "value": {"intValue": "3"}}
                },
                "nextTasks": [{"taskId": "3"}]
            }],
            "integrationParameters": [
                {"key": "_endpoint", "dataType": "STRING_VALUE", "defaultValue": {"stringValue": "https://a"}},
                {"key": "_input", "inputOutputType": "IN"},
                {"key": "payload", "dataType": "JSON_VALUE"}
            ]
        })
    }

    #[test]
    fn test_to_external_strips_internal_fields() {
        let external = to_external(sample());
        let object = external.as_object().unwrap();

        for field in INTERNAL_FIELDS {
            assert!(!object.contains_key(*field), "{field} kept");
        }
        assert_eq!(object["description"], "order sync");
        assert!(object.contains_key("triggerConfigs"));
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let definition = Definition::from_value(sample()).unwrap();
        let value = definition.to_value().unwrap();

        assert_eq!(value, sample());
        assert_eq!(definition.trigger_configs[0].extra["label"], "Pub/Sub");
        assert_eq!(
            definition.task_configs[0].parameters["retries"].value.extra["intValue"],
            "3"
        );
    }

    #[test]
    fn test_config_param_rule() {
        let definition = Definition::from_value(sample()).unwrap();
        let config: Vec<_> = definition
            .integration_parameters
            .iter()
            .filter(|p| p.is_config_param())
            .map(|p| p.key.as_str())
            .collect();
        assert_eq!(config, vec!["_endpoint"]);
    }

    #[test]
    fn test_connector_config_decode() {
        let definition = Definition::from_value(sample()).unwrap();
        let config: ConnectorConfig = definition.task_configs[0].parameters["config"]
            .value
            .decode_json()
            .unwrap()
            .unwrap();

        assert_eq!(config.type_url, CONNECTOR_CONFIG_TYPE);
        assert_eq!(config.connection_short_name(), "crm");
        assert!(config.connection_version.is_empty());
    }

    #[test]
    fn test_auth_config_param_encode() {
        let mut value = ParameterValue::default();
        value.encode_json(&AuthConfigTaskParam::new("1234")).unwrap();

        let decoded: AuthConfigTaskParam = value.decode_json().unwrap().unwrap();
        assert_eq!(decoded.auth_config_id, "1234");
        assert_eq!(decoded.type_url, AUTH_CONFIG_TYPE);
    }

    #[test]
    fn test_yaml_definition_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("orders.yaml");
        std::fs::write(
            &path,
            "triggerConfigs:\n  - triggerNumber: \"1\"\n    triggerType: API\n    triggerId: api_trigger/orders\n",
        )
        .unwrap();

        let definition = Definition::from_file(&path).unwrap();
        assert_eq!(
            definition.trigger_configs[0].trigger_id.as_deref(),
            Some("api_trigger/orders")
        );
    }
}
