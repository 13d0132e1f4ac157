//! Command implementations.

use crate::session;
use crate::{GlobalArgs, IntegrationsAction};
use flowctl_core::config::{EnvSettings, Preferences};
use flowctl_core::context::RequestContext;
use flowctl_integrations::naming::Separator;
use std::path::PathBuf;

pub mod integrations;

/// Errors surfaced to the user by a command.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Config(#[from] flowctl_core::config::Error),
    #[error(transparent)]
    Auth(#[from] flowctl_http::auth::Error),
    #[error(transparent)]
    Transport(#[from] flowctl_http::transport::Error),
    #[error(transparent)]
    Client(#[from] flowctl_integrations::client::Error),
    #[error(transparent)]
    Enumerate(#[from] flowctl_integrations::enumerate::Error),
    #[error(transparent)]
    Definition(#[from] flowctl_integrations::definition::Error),
    #[error(transparent)]
    Overrides(#[from] flowctl_integrations::overrides::Error),
    #[error(transparent)]
    Pipeline(#[from] flowctl_integrations::pipeline::Error),
    #[error("No {0} configured, pass --{0} or set it in the preferences file")]
    MissingSetting(&'static str),
    #[error("Integration {name} has no versions")]
    NoVersions { name: String },
    #[error("IO operation failed on path {path}: {source}")]
    IO {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON serialization failed: {source}")]
    SerdeJson {
        #[source]
        source: serde_json::Error,
    },
    #[error("{failed} of {total} transfer job(s) did not complete")]
    Incomplete { failed: usize, total: usize },
}

fn separator(legacy_names: bool) -> Separator {
    if legacy_names {
        Separator::Underscore
    } else {
        Separator::Plus
    }
}

/// Connects and runs one integrations command.
pub async fn run(
    action: IntegrationsAction,
    global: &GlobalArgs,
    settings: &EnvSettings,
    prefs: Preferences,
    ctx: RequestContext,
) -> Result<(), Error> {
    let session = session::connect(global, settings, prefs, ctx).await?;

    match action {
        IntegrationsAction::List => integrations::list(&session).await,
        IntegrationsAction::Get {
            name,
            version,
            output,
            extract,
        } => {
            integrations::get(
                &session,
                &name,
                version.as_deref(),
                output.as_deref(),
                extract.as_deref(),
            )
            .await
        }
        IntegrationsAction::Apply {
            name,
            file,
            overrides,
            strict,
        } => integrations::apply(&session, &name, &file, overrides.as_deref(), strict).await,
        IntegrationsAction::Upload { name, file } => {
            integrations::upload(&session, &name, &file).await
        }
        IntegrationsAction::Export {
            folder,
            concurrency,
            all_versions,
            legacy_names,
            fail_fast,
        } => {
            integrations::export(
                &session,
                integrations::BulkArgs {
                    folder,
                    concurrency,
                    separator: separator(legacy_names),
                    fail_fast,
                },
                all_versions,
            )
            .await
        }
        IntegrationsAction::Import {
            folder,
            concurrency,
            legacy_names,
            fail_fast,
        } => {
            integrations::import(
                &session,
                integrations::BulkArgs {
                    folder,
                    concurrency,
                    separator: separator(legacy_names),
                    fail_fast,
                },
            )
            .await
        }
    }
}
