//! Applying an override spec to a definition.

use super::{
    Error, OverrideResolver, OverrideSpec, TriggerType, Warning, Warnings, API_TRIGGER_PREFIX,
    PUBSUB_SUBSCRIPTION_PREFIX, SUBSCRIPTION_PROPERTY,
};
use crate::definition::{
    AuthConfigTaskParam, ConnectorConfig, Definition, EventParameter, AUTH_CONFIG_PARAM,
    CONNECTOR_CONFIG_PARAM, CONNECTOR_TASK,
};
use tracing::debug;

/// Merge behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Skips live lookups (connections, auth configs).
    pub dry_run: bool,
    /// Fails when any warning was produced.
    pub strict: bool,
    /// Stops warnings from being logged; they are still returned.
    pub suppress_warnings: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub definition: Definition,
    pub warnings: Vec<Warning>,
}

/// Applies `spec` to `definition`.
#[tracing::instrument(skip_all, fields(
    triggers = spec.trigger_overrides.len(),
    tasks = spec.task_overrides.len(),
    connections = spec.connection_overrides.len(),
    params = spec.param_overrides.len(),
))]
pub async fn merge<R>(
    mut definition: Definition,
    spec: &OverrideSpec,
    resolver: &R,
    options: MergeOptions,
) -> Result<MergeOutcome, Error>
where
    R: OverrideResolver + ?Sized,
{
    spec.validate()?;
    let mut warnings = Warnings::new(options.suppress_warnings);

    apply_triggers(&mut definition, spec, &mut warnings);
    apply_tasks(&mut definition, spec, resolver, options, &mut warnings).await?;
    apply_params(&mut definition, spec, &mut warnings);

    if options.dry_run {
        debug!("Dry run, connection overrides skipped");
    } else {
        apply_connections(&mut definition, spec, resolver, &mut warnings).await?;
    }

    let warnings = warnings.into_vec();
    if options.strict && !warnings.is_empty() {
        return Err(Error::Warnings { warnings });
    }

    Ok(MergeOutcome {
        definition,
        warnings,
    })
}

fn apply_triggers(definition: &mut Definition, spec: &OverrideSpec, warnings: &mut Warnings) {
    for entry in &spec.trigger_overrides {
        let Some(trigger) = definition.trigger_mut(&entry.trigger_number) else {
            warnings.push(Warning::TriggerNotFound {
                trigger_number: entry.trigger_number.clone(),
            });
            continue;
        };

        match &entry.trigger_type {
            TriggerType::CloudPubsubExternal => {
                let subscription = format!(
                    "{}_{}",
                    entry.project_id.as_deref().unwrap_or_default(),
                    entry.topic_name.as_deref().unwrap_or_default()
                );
                trigger.trigger_id = Some(format!("{PUBSUB_SUBSCRIPTION_PREFIX}{subscription}"));
                trigger
                    .properties
                    .insert(SUBSCRIPTION_PROPERTY.to_string(), subscription);
            }
            TriggerType::Api => {
                trigger.trigger_id = Some(format!(
                    "{API_TRIGGER_PREFIX}{}",
                    entry.api_path.as_deref().unwrap_or_default()
                ));
            }
            TriggerType::Other(trigger_type) => {
                warnings.push(Warning::UnsupportedTrigger {
                    trigger_number: entry.trigger_number.clone(),
                    trigger_type: trigger_type.clone(),
                });
            }
        }
    }
}

async fn apply_tasks<R>(
    definition: &mut Definition,
    spec: &OverrideSpec,
    resolver: &R,
    options: MergeOptions,
    warnings: &mut Warnings,
) -> Result<(), Error>
where
    R: OverrideResolver + ?Sized,
{
    for entry in &spec.task_overrides {
        // Connector tasks are handled through connection overrides.
        if entry.task == CONNECTOR_TASK {
            continue;
        }

        let Some(task) = definition.task_mut(&entry.task_id, &entry.task) else {
            warnings.push(Warning::TaskNotFound {
                task_id: entry.task_id.clone(),
                task: entry.task.clone(),
            });
            continue;
        };

        for (key, parameter) in &entry.parameters {
            let Some(existing) = task.parameters.get_mut(key) else {
                warnings.push(Warning::ParameterNotFound {
                    task_id: entry.task_id.clone(),
                    key: key.clone(),
                });
                continue;
            };

            if key == AUTH_CONFIG_PARAM {
                if options.dry_run {
                    debug!(task_id = %entry.task_id, "Dry run, auth config lookup skipped");
                    continue;
                }
                rewrite_auth_config(&entry.task_id, existing, parameter, resolver).await?;
            } else {
                *existing = parameter.clone();
            }
        }
    }
    Ok(())
}

/// Points an `authConfig` parameter at the auth config named by the override.
async fn rewrite_auth_config<R>(
    task_id: &str,
    existing: &mut EventParameter,
    parameter: &EventParameter,
    resolver: &R,
) -> Result<(), Error>
where
    R: OverrideResolver + ?Sized,
{
    let display_name = parameter.value.string_value.clone().unwrap_or_default();
    let auth_config_id = resolver
        .auth_config_id(&display_name)
        .await
        .map_err(|source| Error::Resolver { source })?
        .ok_or_else(|| Error::AuthConfigNotFound {
            display_name: display_name.clone(),
        })?;

    let mut param = match existing.value.decode_json::<AuthConfigTaskParam>() {
        Some(Ok(param)) => param,
        Some(Err(source)) => {
            return Err(Error::EmbeddedJson {
                task_id: task_id.to_string(),
                key: AUTH_CONFIG_PARAM.to_string(),
                source,
            })
        }
        None => AuthConfigTaskParam::new(""),
    };
    param.auth_config_id = auth_config_id;

    existing
        .value
        .encode_json(&param)
        .map_err(|source| Error::EmbeddedJson {
            task_id: task_id.to_string(),
            key: AUTH_CONFIG_PARAM.to_string(),
            source,
        })?;
    existing.value.string_value = None;
    Ok(())
}

fn apply_params(definition: &mut Definition, spec: &OverrideSpec, warnings: &mut Warnings) {
    for entry in &spec.param_overrides {
        let target = definition
            .integration_parameters
            .iter_mut()
            .find(|p| p.key == entry.key && p.is_config_param());
        match target {
            Some(parameter) => {
                parameter.default_value =
                    (!entry.default_value.is_null()).then(|| entry.default_value.clone())
            }
            None => warnings.push(Warning::ParamNotFound {
                key: entry.key.clone(),
            }),
        }
    }
}

async fn apply_connections<R>(
    definition: &mut Definition,
    spec: &OverrideSpec,
    resolver: &R,
    warnings: &mut Warnings,
) -> Result<(), Error>
where
    R: OverrideResolver + ?Sized,
{
    for entry in &spec.connection_overrides {
        let Some(task) = definition.task_mut(&entry.task_id, CONNECTOR_TASK) else {
            warnings.push(Warning::ConnectionTaskNotFound {
                task_id: entry.task_id.clone(),
            });
            continue;
        };
        let Some(config) = task.parameters.get_mut(CONNECTOR_CONFIG_PARAM) else {
            warnings.push(Warning::ParameterNotFound {
                task_id: entry.task_id.clone(),
                key: CONNECTOR_CONFIG_PARAM.to_string(),
            });
            continue;
        };

        let info = resolver
            .connection(
                &entry.parameters.connection_name,
                entry.parameters.connection_location.as_deref(),
            )
            .await
            .map_err(|source| Error::Resolver { source })?;

        let embedded_error = |source| Error::EmbeddedJson {
            task_id: entry.task_id.clone(),
            key: CONNECTOR_CONFIG_PARAM.to_string(),
            source,
        };
        let mut connector = match config.value.decode_json::<ConnectorConfig>() {
            Some(result) => result.map_err(embedded_error)?,
            None => ConnectorConfig::default(),
        };
        connector.connection_name = info.name;
        connector.connection_version = info.connector_version;
        connector.service_name = info.service_name;

        config
            .value
            .encode_json(&connector)
            .map_err(embedded_error)?;
        debug!(
            task_id = %entry.task_id,
            connection = %connector.connection_name,
            "Connection override applied"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{ParameterValue, CONNECTOR_CONFIG_TYPE, REST_TASK};
    use crate::overrides::fake::FakeResolver;
    use crate::overrides::{
        ConnectionOverride, ConnectionParameters, ParamOverride, TaskOverride, TriggerOverride,
    };
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::Ordering;

    fn definition() -> Definition {
        Definition::from_value(json!({
            "triggerConfigs": [
                {
                    "triggerNumber": "1",
                    "triggerType": "CLOUD_PUBSUB_EXTERNAL",
                    "triggerId": "cloud_pubsub_external_trigger/projects/cloud-crm-eventbus-cpsexternal/subscriptions/proj1_topicA",
                    "properties": {"Subscription name": "proj1_topicA", "IP Project name": "proj1"}
                },
                {"triggerNumber": "2", "triggerType": "API", "triggerId": "api_trigger/orders-dev"},
                {"triggerNumber": "3", "triggerType": "CRON", "triggerId": "cron_trigger/x"}
            ],
            "taskConfigs": [
                {
                    "taskId": "2",
                    "task": "GenericConnectorTask",
                    "parameters": {"config": {"key": "config", "value": {
                        "jsonValue": "{\"@type\":\"type.googleapis.com/enterprise.crm.eventbus.proto.ConnectorsConnection\",\"connectionName\":\"projects/p1/locations/us-central1/connections/crm\",\"connectionVersion\":\"old\",\"serviceName\":\"old-svc\",\"operation\":\"EXECUTE_ACTION\"}"
                    }}}
                },
                {
                    "taskId": "3",
                    "task": "GenericRestV2Task",
                    "parameters": {
                        "url": {"key": "url", "value": {"stringValue": "https://dev.example.com"}},
                        "authConfig": {"key": "authConfig", "value": {
                            "jsonValue": "{\"@type\":\"type.googleapis.com/enterprise.crm.eventbus.authconfig.AuthConfigTaskParam\",\"authConfigId\":\"dev-id\"}"
                        }}
                    }
                }
            ],
            "integrationParameters": [
                {"key": "_endpoint", "dataType": "STRING_VALUE", "defaultValue": {"stringValue": "https://dev"}},
                {"key": "_input", "inputOutputType": "IN", "defaultValue": {"stringValue": "in"}}
            ]
        }))
        .unwrap()
    }

    fn resolver() -> FakeResolver {
        FakeResolver::default()
            .auth_config("prod-id", "crm-oauth-prod")
            .connection("us-central1", "crm-prod", "v9")
            .connection("europe-west1", "crm-eu", "v2")
    }

    fn options() -> MergeOptions {
        MergeOptions {
            suppress_warnings: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_pubsub_trigger_override() {
        let spec = OverrideSpec {
            trigger_overrides: vec![TriggerOverride::pubsub("1", "proj2", "topicB")],
            ..Default::default()
        };

        let outcome = merge(definition(), &spec, &resolver(), options())
            .await
            .unwrap();

        let trigger = &outcome.definition.trigger_configs[0];
        assert_eq!(
            trigger.trigger_id.as_deref(),
            Some("cloud_pubsub_external_trigger/projects/cloud-crm-eventbus-cpsexternal/subscriptions/proj2_topicB")
        );
        assert_eq!(trigger.properties[SUBSCRIPTION_PROPERTY], "proj2_topicB");
        assert_eq!(trigger.properties["IP Project name"], "proj1");
        assert!(outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_api_trigger_override() {
        let spec = OverrideSpec {
            trigger_overrides: vec![TriggerOverride::api("2", "orders")],
            ..Default::default()
        };

        let outcome = merge(definition(), &spec, &resolver(), options())
            .await
            .unwrap();

        assert_eq!(
            outcome.definition.trigger_configs[1].trigger_id.as_deref(),
            Some("api_trigger/orders")
        );
    }

    #[tokio::test]
    async fn test_missing_trigger_leaves_definition_unchanged() {
        let spec = OverrideSpec {
            trigger_overrides: vec![TriggerOverride::pubsub("9", "proj2", "topicB")],
            ..Default::default()
        };

        let outcome = merge(definition(), &spec, &resolver(), options())
            .await
            .unwrap();

        assert_eq!(outcome.definition, definition());
        assert_eq!(
            outcome.warnings,
            vec![Warning::TriggerNotFound {
                trigger_number: "9".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_unsupported_trigger_type_warns() {
        let spec = OverrideSpec::from_json(
            r#"{"trigger_overrides": [{"triggerNumber": "3", "triggerType": "CRON"}]}"#,
        )
        .unwrap();

        let outcome = merge(definition(), &spec, &resolver(), options())
            .await
            .unwrap();

        assert_eq!(outcome.definition, definition());
        assert!(matches!(
            outcome.warnings.as_slice(),
            [Warning::UnsupportedTrigger { trigger_type, .. }] if trigger_type == "CRON"
        ));
    }

    #[tokio::test]
    async fn test_strict_mode_escalates_warnings() {
        let spec = OverrideSpec {
            trigger_overrides: vec![TriggerOverride::api("9", "x")],
            param_overrides: vec![ParamOverride {
                key: "_input".to_string(),
                default_value: json!({"stringValue": "x"}),
            }],
            ..Default::default()
        };
        let options = MergeOptions {
            strict: true,
            ..options()
        };

        let err = merge(definition(), &spec, &resolver(), options)
            .await
            .unwrap_err();

        match err {
            Error::Warnings { warnings } => assert_eq!(warnings.len(), 2),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_task_override_replaces_parameters_and_resolves_auth_config() {
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "url".to_string(),
            EventParameter::string("url", "https://prod.example.com"),
        );
        parameters.insert(
            "authConfig".to_string(),
            EventParameter::string("authConfig", "crm-oauth-prod"),
        );
        parameters.insert(
            "timeout".to_string(),
            EventParameter::string("timeout", "30"),
        );
        let spec = OverrideSpec {
            task_overrides: vec![TaskOverride {
                task_id: "3".to_string(),
                task: REST_TASK.to_string(),
                parameters,
            }],
            ..Default::default()
        };

        let outcome = merge(definition(), &spec, &resolver(), options())
            .await
            .unwrap();

        let task = &outcome.definition.task_configs[1];
        assert_eq!(
            task.parameters["url"].value.string_value.as_deref(),
            Some("https://prod.example.com")
        );
        let auth: AuthConfigTaskParam = task.parameters["authConfig"]
            .value
            .decode_json()
            .unwrap()
            .unwrap();
        assert_eq!(auth.auth_config_id, "prod-id");
        assert_eq!(
            outcome.warnings,
            vec![Warning::ParameterNotFound {
                task_id: "3".to_string(),
                key: "timeout".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_unknown_auth_config_is_an_error() {
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "authConfig".to_string(),
            EventParameter::string("authConfig", "does-not-exist"),
        );
        let spec = OverrideSpec {
            task_overrides: vec![TaskOverride {
                task_id: "3".to_string(),
                task: REST_TASK.to_string(),
                parameters,
            }],
            ..Default::default()
        };

        let err = merge(definition(), &spec, &resolver(), options())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthConfigNotFound { .. }));
    }

    #[tokio::test]
    async fn test_missing_task_warns() {
        let spec = OverrideSpec {
            task_overrides: vec![TaskOverride {
                task_id: "3".to_string(),
                task: "CloudFunctionTask".to_string(),
                parameters: BTreeMap::new(),
            }],
            ..Default::default()
        };

        let outcome = merge(definition(), &spec, &resolver(), options())
            .await
            .unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert!(matches!(outcome.warnings[0], Warning::TaskNotFound { .. }));
    }

    #[tokio::test]
    async fn test_param_override_only_touches_config_params() {
        let spec = OverrideSpec {
            param_overrides: vec![
                ParamOverride {
                    key: "_endpoint".to_string(),
                    default_value: json!({"stringValue": "https://prod"}),
                },
                ParamOverride {
                    key: "_input".to_string(),
                    default_value: json!({"stringValue": "changed"}),
                },
            ],
            ..Default::default()
        };

        let outcome = merge(definition(), &spec, &resolver(), options())
            .await
            .unwrap();

        let params = &outcome.definition.integration_parameters;
        assert_eq!(
            params[0].default_value,
            Some(json!({"stringValue": "https://prod"}))
        );
        assert_eq!(params[1].default_value, Some(json!({"stringValue": "in"})));
        assert_eq!(
            outcome.warnings,
            vec![Warning::ParamNotFound {
                key: "_input".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_connection_override_rewrites_embedded_config() {
        let spec = OverrideSpec {
            connection_overrides: vec![ConnectionOverride {
                task_id: "2".to_string(),
                task: CONNECTOR_TASK.to_string(),
                parameters: ConnectionParameters {
                    connection_name: "crm-eu".to_string(),
                    connection_location: Some("europe-west1".to_string()),
                },
            }],
            ..Default::default()
        };

        let outcome = merge(definition(), &spec, &resolver(), options())
            .await
            .unwrap();

        let config: ConnectorConfig = outcome.definition.task_configs[0].parameters["config"]
            .value
            .decode_json()
            .unwrap()
            .unwrap();
        assert_eq!(
            config.connection_name,
            "projects/p2/locations/europe-west1/connections/crm-eu"
        );
        assert_eq!(config.connection_version, "v2");
        assert_eq!(
            config.service_name,
            "projects/p2/locations/europe-west1/services/crm-eu"
        );
        assert_eq!(config.type_url, CONNECTOR_CONFIG_TYPE);
        assert_eq!(config.extra["operation"], "EXECUTE_ACTION");
    }

    #[tokio::test]
    async fn test_connection_override_creates_missing_embedded_value() {
        let mut definition = definition();
        definition.task_configs[0]
            .parameters
            .get_mut("config")
            .unwrap()
            .value = ParameterValue::default();
        let spec = OverrideSpec {
            connection_overrides: vec![ConnectionOverride {
                task_id: "2".to_string(),
                task: CONNECTOR_TASK.to_string(),
                parameters: ConnectionParameters {
                    connection_name: "crm-prod".to_string(),
                    connection_location: None,
                },
            }],
            ..Default::default()
        };

        let outcome = merge(definition, &spec, &resolver(), options())
            .await
            .unwrap();

        let config: ConnectorConfig = outcome.definition.task_configs[0].parameters["config"]
            .value
            .decode_json()
            .unwrap()
            .unwrap();
        assert_eq!(config.connection_version, "v9");
    }

    #[tokio::test]
    async fn test_dry_run_skips_connection_lookups() {
        let spec = OverrideSpec {
            connection_overrides: vec![ConnectionOverride {
                task_id: "2".to_string(),
                task: CONNECTOR_TASK.to_string(),
                parameters: ConnectionParameters {
                    connection_name: "unknown".to_string(),
                    connection_location: None,
                },
            }],
            ..Default::default()
        };
        let resolver = resolver();

        let outcome = merge(
            definition(),
            &spec,
            &resolver,
            MergeOptions {
                dry_run: true,
                ..options()
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome.definition, definition());
        assert_eq!(resolver.connection_lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_connection_override_for_missing_task_warns() {
        let spec = OverrideSpec {
            connection_overrides: vec![ConnectionOverride {
                task_id: "7".to_string(),
                task: CONNECTOR_TASK.to_string(),
                parameters: ConnectionParameters {
                    connection_name: "crm-prod".to_string(),
                    connection_location: None,
                },
            }],
            ..Default::default()
        };

        let outcome = merge(definition(), &spec, &resolver(), options())
            .await
            .unwrap();
        assert_eq!(
            outcome.warnings,
            vec![Warning::ConnectionTaskNotFound {
                task_id: "7".to_string()
            }]
        );
    }
}
