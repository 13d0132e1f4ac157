//! `flowctl integrations` subcommands.

use super::Error;
use crate::session::Session;
use flowctl_core::task::runner::Runner;
use flowctl_http::transport::ApiResponse;
use flowctl_integrations::client::{
    ClientResolver, FileFormat, IntegrationsFetcher, VersionsFetcher,
};
use flowctl_integrations::definition::{to_external, Definition};
use flowctl_integrations::enumerate::{Enumerator, PageRequest};
use flowctl_integrations::naming::Separator;
use flowctl_integrations::overrides::{self, MergeOptions, OverrideSpec};
use flowctl_integrations::pipeline::export::LATEST_FIRST;
use flowctl_integrations::pipeline::{ExportBuilder, ImportBuilder, TransferReport};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Flags shared by export and import.
#[derive(Debug, Clone)]
pub struct BulkArgs {
    pub folder: PathBuf,
    pub concurrency: usize,
    pub separator: Separator,
    pub fail_fast: bool,
}

pub async fn list(session: &Session) -> Result<(), Error> {
    let fetcher = IntegrationsFetcher::new(Arc::clone(&session.client), &session.ctx);
    let mut enumerator = Enumerator::new(fetcher, PageRequest::new());
    for name in enumerator.collect_all().await? {
        println!("{name}");
    }
    Ok(())
}

async fn latest_version(session: &Session, name: &str) -> Result<Option<Value>, Error> {
    let fetcher = VersionsFetcher::new(Arc::clone(&session.client), &session.ctx, name);
    let mut enumerator = Enumerator::new(
        fetcher,
        PageRequest::new().page_size(1).order_by(LATEST_FIRST),
    );
    let page = enumerator.next_page().await?.unwrap_or_default();
    Ok(page.into_iter().next().map(|record| record.body))
}

pub async fn get(
    session: &Session,
    name: &str,
    version: Option<&str>,
    output: Option<&Path>,
    extract_to: Option<&Path>,
) -> Result<(), Error> {
    let quiet = session.ctx.silenced();
    let body = match version {
        Some(version) => session.client.get_version(&quiet, name, version).await?,
        None => match latest_version(session, name).await? {
            Some(body) => body,
            None if session.is_dry_run() => Value::Null,
            None => {
                return Err(Error::NoVersions {
                    name: name.to_string(),
                })
            }
        },
    };
    if session.is_dry_run() {
        info!("Dry run, no definition fetched");
        return Ok(());
    }

    let external = to_external(body);
    let content =
        serde_json::to_string_pretty(&external).map_err(|source| Error::SerdeJson { source })?;
    match output {
        Some(path) => write(path, content).await?,
        None => println!("{content}"),
    }

    if let Some(path) = extract_to {
        let definition = Definition::from_value(external)?;
        let resolver = ClientResolver::new(Arc::clone(&session.client), &session.ctx);
        let outcome =
            overrides::extract(&definition, &resolver, session.ctx.suppress_warnings).await?;
        outcome.spec.to_file(path)?;
        info!(
            path = %path.display(),
            warnings = outcome.warnings.len(),
            "Wrote override template"
        );
    }
    Ok(())
}

pub async fn apply(
    session: &Session,
    name: &str,
    file: &Path,
    overrides_path: Option<&Path>,
    strict: bool,
) -> Result<(), Error> {
    let mut definition = Definition::from_file(file)?;

    if let Some(path) = overrides_path {
        let spec = OverrideSpec::from_file(path)?;
        let resolver = ClientResolver::new(Arc::clone(&session.client), &session.ctx);
        let options = MergeOptions {
            dry_run: session.is_dry_run(),
            strict,
            suppress_warnings: session.ctx.suppress_warnings,
        };
        let outcome = overrides::merge(definition, &spec, &resolver, options).await?;
        if !outcome.warnings.is_empty() {
            info!(warnings = outcome.warnings.len(), "Overrides applied with warnings");
        }
        definition = outcome.definition;
    }

    let response = session
        .client
        .create_version(&session.ctx, name, &definition)
        .await?;
    report_conflict(name, &response);
    Ok(())
}

pub async fn upload(session: &Session, name: &str, file: &Path) -> Result<(), Error> {
    let content = tokio::fs::read_to_string(file)
        .await
        .map_err(|source| Error::IO {
            path: file.to_path_buf(),
            source,
        })?;
    let response = session
        .client
        .upload_version(&session.ctx, name, content, file_format(file))
        .await?;
    report_conflict(name, &response);
    Ok(())
}

pub async fn export(session: &Session, args: BulkArgs, all_versions: bool) -> Result<(), Error> {
    let report = ExportBuilder::new()
        .client(Arc::clone(&session.client))
        .context(session.ctx.silenced())
        .output_dir(args.folder)
        .concurrency(args.concurrency)
        .separator(args.separator)
        .fail_fast(args.fail_fast)
        .all_versions(all_versions)
        .build()?
        .run()
        .await?;
    finish(report)
}

pub async fn import(session: &Session, args: BulkArgs) -> Result<(), Error> {
    let report = ImportBuilder::new()
        .client(Arc::clone(&session.client))
        .context(session.ctx.silenced())
        .input_dir(args.folder)
        .concurrency(args.concurrency)
        .separator(args.separator)
        .fail_fast(args.fail_fast)
        .build()?
        .run()
        .await?;
    finish(report)
}

fn file_format(path: &Path) -> FileFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml") => FileFormat::Yaml,
        _ => FileFormat::Json,
    }
}

fn report_conflict(name: &str, response: &ApiResponse) {
    if response.conflict {
        warn!(integration = %name, "Version already exists, conflict ignored");
    }
}

async fn write(path: &Path, content: String) -> Result<(), Error> {
    tokio::fs::write(path, content)
        .await
        .map_err(|source| Error::IO {
            path: path.to_path_buf(),
            source,
        })
}

/// Prints the summary and fails when any job did not complete.
fn finish(report: TransferReport) -> Result<(), Error> {
    println!("{report}");
    for failure in &report.failures {
        println!(
            "  {} ({}): {}",
            failure.job.resource_name,
            failure.job.local_path.display(),
            failure.error
        );
    }

    if report.is_success() {
        return Ok(());
    }
    let failed = report.failures.len() + report.cancelled;
    Err(Error::Incomplete {
        failed,
        total: report.completed + failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowctl_integrations::pipeline::{self, TransferFailure};
    use flowctl_integrations::resource::TransferJob;

    #[test]
    fn test_file_format_from_extension() {
        assert_eq!(file_format(Path::new("flow.yaml")), FileFormat::Yaml);
        assert_eq!(file_format(Path::new("flow.yml")), FileFormat::Yaml);
        assert_eq!(file_format(Path::new("flow.json")), FileFormat::Json);
        assert_eq!(file_format(Path::new("flow")), FileFormat::Json);
    }

    #[test]
    fn test_finish_success() {
        let report = TransferReport {
            completed: 3,
            files: 3,
            ..Default::default()
        };
        assert!(finish(report).is_ok());
    }

    #[test]
    fn test_finish_counts_failed_and_cancelled() {
        let report = TransferReport {
            completed: 2,
            files: 2,
            failures: vec![TransferFailure {
                job: TransferJob::import("orders", "/tmp/orders+1+ver-1.json"),
                error: pipeline::Error::MissingRequiredAttribute("client".to_string()),
            }],
            cancelled: 1,
            skipped: Vec::new(),
        };

        let err = finish(report).unwrap_err();
        assert!(matches!(err, Error::Incomplete { failed: 2, total: 4 }));
    }

    #[tokio::test]
    async fn test_write_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.json");
        write(&path, "{}".to_string()).await.unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "{}");
    }
}
