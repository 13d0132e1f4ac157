//! Deriving an override spec from a captured definition.

use super::{
    ConnectionOverride, ConnectionParameters, Error, OverrideResolver, OverrideSpec,
    ParamOverride, TaskOverride, TriggerOverride, Warning, Warnings, API_TRIGGER_PREFIX,
    SUBSCRIPTION_PROPERTY,
};
use crate::definition::{
    AuthConfigTaskParam, ConnectorConfig, Definition, EventParameter, TaskConfig,
    AUTH_CONFIG_PARAM, CLOUD_FUNCTION_TASK, CLOUD_FUNCTION_URL_PARAM, CONNECTOR_CONFIG_PARAM,
    CONNECTOR_TASK, REST_TASK, REST_URL_PARAM,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOutcome {
    pub spec: OverrideSpec,
    pub warnings: Vec<Warning>,
}

/// Builds the override template of `definition`.
///
/// Auth configs are recorded by display name, never by id, so the template can be
/// resolved again in another project.
#[tracing::instrument(skip_all)]
pub async fn extract<R>(
    definition: &Definition,
    resolver: &R,
    suppress_warnings: bool,
) -> Result<ExtractOutcome, Error>
where
    R: OverrideResolver + ?Sized,
{
    let mut spec = OverrideSpec::default();
    let mut warnings = Warnings::new(suppress_warnings);

    for task in &definition.task_configs {
        match task.task.as_str() {
            CONNECTOR_TASK => {
                if let Some(connection) = extract_connection(task)? {
                    spec.connection_overrides.push(connection);
                }
            }
            REST_TASK => {
                if let Some(entry) =
                    extract_task(task, REST_URL_PARAM, resolver, &mut warnings).await?
                {
                    spec.task_overrides.push(entry);
                }
            }
            CLOUD_FUNCTION_TASK => {
                if let Some(entry) =
                    extract_task(task, CLOUD_FUNCTION_URL_PARAM, resolver, &mut warnings).await?
                {
                    spec.task_overrides.push(entry);
                }
            }
            _ => {}
        }
    }

    spec.param_overrides = definition
        .integration_parameters
        .iter()
        .filter(|p| p.is_config_param())
        .map(|p| ParamOverride {
            key: p.key.clone(),
            default_value: p.default_value.clone().unwrap_or_default(),
        })
        .collect();

    for trigger in &definition.trigger_configs {
        match trigger.trigger_type.as_deref() {
            Some("CLOUD_PUBSUB_EXTERNAL") => {
                let subscription = trigger
                    .properties
                    .get(SUBSCRIPTION_PROPERTY)
                    .cloned()
                    .unwrap_or_default();
                // Project ids cannot contain `_`, so the first one separates the topic.
                match subscription.split_once('_') {
                    Some((project_id, topic_name))
                        if !project_id.is_empty() && !topic_name.is_empty() =>
                    {
                        spec.trigger_overrides.push(TriggerOverride::pubsub(
                            trigger.trigger_number.clone(),
                            project_id,
                            topic_name,
                        ));
                    }
                    _ => warnings.push(Warning::InvalidSubscription {
                        trigger_number: trigger.trigger_number.clone(),
                        subscription,
                    }),
                }
            }
            Some("API") => {
                if let Some(path) = trigger
                    .trigger_id
                    .as_deref()
                    .and_then(|id| id.strip_prefix(API_TRIGGER_PREFIX))
                    .filter(|path| !path.is_empty())
                {
                    spec.trigger_overrides
                        .push(TriggerOverride::api(trigger.trigger_number.clone(), path));
                }
            }
            _ => {}
        }
    }

    Ok(ExtractOutcome {
        spec,
        warnings: warnings.into_vec(),
    })
}

fn extract_connection(task: &TaskConfig) -> Result<Option<ConnectionOverride>, Error> {
    let Some(decoded) = task
        .parameters
        .get(CONNECTOR_CONFIG_PARAM)
        .and_then(|config| config.value.decode_json::<ConnectorConfig>())
    else {
        return Ok(None);
    };
    let connector = decoded.map_err(|source| Error::EmbeddedJson {
        task_id: task.task_id.clone(),
        key: CONNECTOR_CONFIG_PARAM.to_string(),
        source,
    })?;
    if connector.connection_name.is_empty() {
        return Ok(None);
    }

    Ok(Some(ConnectionOverride {
        task_id: task.task_id.clone(),
        task: task.task.clone(),
        parameters: ConnectionParameters {
            connection_name: connector.connection_short_name().to_string(),
            connection_location: None,
        },
    }))
}

async fn extract_task<R>(
    task: &TaskConfig,
    url_param: &str,
    resolver: &R,
    warnings: &mut Warnings,
) -> Result<Option<TaskOverride>, Error>
where
    R: OverrideResolver + ?Sized,
{
    let mut parameters = BTreeMap::new();

    if let Some(url) = task.parameters.get(url_param) {
        parameters.insert(url_param.to_string(), url.clone());
    }

    if let Some(auth) = task.parameters.get(AUTH_CONFIG_PARAM) {
        if let Some(decoded) = auth.value.decode_json::<AuthConfigTaskParam>() {
            let param = decoded.map_err(|source| Error::EmbeddedJson {
                task_id: task.task_id.clone(),
                key: AUTH_CONFIG_PARAM.to_string(),
                source,
            })?;
            let display_name = resolver
                .auth_config_display_name(&param.auth_config_id)
                .await
                .map_err(|source| Error::Resolver { source })?;
            match display_name {
                Some(display_name) => {
                    parameters.insert(
                        AUTH_CONFIG_PARAM.to_string(),
                        EventParameter::string(AUTH_CONFIG_PARAM, display_name),
                    );
                }
                None => warnings.push(Warning::AuthConfigNotFound {
                    task_id: task.task_id.clone(),
                    auth_config_id: param.auth_config_id,
                }),
            }
        }
    }

    if parameters.is_empty() {
        return Ok(None);
    }
    Ok(Some(TaskOverride {
        task_id: task.task_id.clone(),
        task: task.task.clone(),
        parameters,
    }))
}
