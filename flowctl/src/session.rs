//! Connection setup shared by every command: project and region resolution, bearer token
//! selection and transport construction.

use crate::commands::Error;
use crate::GlobalArgs;
use chrono::{DateTime, Utc};
use flowctl_core::client::Client;
use flowctl_core::config::{EnvSettings, Preferences};
use flowctl_core::context::RequestContext;
use flowctl_http::auth::{GoogleTokenProvider, StaticTokenProvider, TokenProvider};
use flowctl_http::config::{ConflictPolicy, TransportOptions};
use flowctl_http::transport::TransportBuilder;
use flowctl_integrations::client::{IntegrationsClient, IntegrationsClientBuilder};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Cached tokens younger than this are used without asking the token info endpoint.
pub const TOKEN_CHECK_INTERVAL: Duration = Duration::from_secs(50 * 60);

/// Everything a command needs to talk to the control plane.
pub struct Session {
    pub client: Arc<IntegrationsClient>,
    pub ctx: RequestContext,
}

impl Session {
    pub fn is_dry_run(&self) -> bool {
        self.client.transport().is_dry_run()
    }
}

fn transport_options(
    global: &GlobalArgs,
    settings: &EnvSettings,
    prefs: &Preferences,
) -> TransportOptions {
    TransportOptions {
        dry_run: global.dry_run || settings.dryrun,
        conflict_policy: if global.ignore_conflicts {
            ConflictPolicy::Ignore
        } else {
            ConflictPolicy::Fail
        },
        proxy_url: prefs.proxy_url.clone(),
        connect_timeout: settings.connect_timeout,
    }
}

/// Picks a flag value over the preference.
fn resolve(
    flag: &Option<String>,
    preference: &Option<String>,
    name: &'static str,
) -> Result<String, Error> {
    flag.clone()
        .or_else(|| preference.clone())
        .filter(|value| !value.is_empty())
        .ok_or(Error::MissingSetting(name))
}

/// Builds a session from flags, environment settings and preferences.
pub async fn connect(
    global: &GlobalArgs,
    settings: &EnvSettings,
    mut prefs: Preferences,
    ctx: RequestContext,
) -> Result<Session, Error> {
    let project = resolve(&global.project, &prefs.project, "project")?;
    let region = resolve(&global.region, &prefs.region, "region")?;
    let options = transport_options(global, settings, &prefs);

    let token = if options.dry_run {
        debug!("Dry run, no credentials needed");
        String::from("dry-run")
    } else {
        resolve_token(global, settings, &mut prefs, &options, &ctx, Utc::now()).await?
    };

    let transport = TransportBuilder::new()
        .token_provider(Arc::new(StaticTokenProvider::new(token)))
        .options(options)
        .build()?;

    let client = IntegrationsClientBuilder::new()
        .transport(Arc::new(transport))
        .project(project)
        .region(region)
        .build()?;

    Ok(Session {
        client: Arc::new(client),
        ctx,
    })
}

/// Explicit token, then a cached token that is recent or still valid, then a fresh one.
async fn resolve_token(
    global: &GlobalArgs,
    settings: &EnvSettings,
    prefs: &mut Preferences,
    options: &TransportOptions,
    ctx: &RequestContext,
    now: DateTime<Utc>,
) -> Result<String, Error> {
    if let Some(token) = &global.token {
        return Ok(token.clone());
    }

    if let Some(token) = prefs.token.clone() {
        if !prefs.check_due(now, TOKEN_CHECK_INTERVAL) {
            debug!("Using cached token");
            return Ok(token);
        }

        let validator = TransportBuilder::new()
            .token_provider(Arc::new(StaticTokenProvider::new(token.clone())))
            .options(options.clone())
            .build()?;
        if validator.token_info(ctx, &token).await? {
            debug!("Cached token is still valid");
            prefs.last_checked = Some(now);
            persist(settings, prefs)?;
            return Ok(token);
        }
        info!("Cached token expired, requesting a new one");
    }

    let builder = match &settings.credentials_path {
        Some(path) => GoogleTokenProvider::from_credentials_file(path),
        None => GoogleTokenProvider::ambient(),
    };
    let provider = builder.build().connect().await?;
    let token = provider.token().await?;

    prefs.record_token(token.clone(), now);
    persist(settings, prefs)?;
    Ok(token)
}

fn persist(settings: &EnvSettings, prefs: &Preferences) -> Result<(), Error> {
    if settings.skipcache {
        return Ok(());
    }
    prefs.save()?;
    Ok(())
}
