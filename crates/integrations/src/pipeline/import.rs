//! Import of exported version files into the control plane.
//!
//! Every `*.json` file in the input folder whose name follows the naming pattern becomes
//! one upload job. Files are grouped by integration name for logging, but all jobs share
//! a single pool. Files not matching the pattern are skipped with a warning.

use super::pool::{TransferHandler, WorkerPool};
use super::{Error, TransferReport, DEFAULT_CONCURRENCY};
use crate::client::{FileFormat, IntegrationsClient};
use crate::naming::{Separator, VersionFile};
use crate::resource::TransferJob;
use flowctl_core::context::RequestContext;
use flowctl_core::task::runner::Runner;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    pub input_dir: PathBuf,
    pub concurrency: usize,
    pub separator: Separator,
    pub fail_fast: bool,
}

/// Files to upload per integration, and files that were skipped.
#[derive(Debug, Default)]
pub struct ImportPlan {
    pub groups: BTreeMap<String, Vec<PathBuf>>,
    pub skipped: Vec<PathBuf>,
}

impl ImportPlan {
    /// Scans `dir` for version files.
    pub fn scan(dir: &Path, separator: Separator) -> Result<Self, Error> {
        let pattern = format!(
            "{}/*.json",
            glob::Pattern::escape(&dir.to_string_lossy())
        );
        let entries = glob::glob(&pattern).map_err(|source| Error::Pattern { source })?;

        let mut plan = Self::default();
        for entry in entries {
            let path = entry.map_err(|source| Error::Glob { source })?;
            let parsed = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| VersionFile::parse(name, separator));

            match parsed {
                Some(file) => plan.groups.entry(file.name).or_default().push(path),
                None => {
                    warn!(path = %path.display(), "Skipping file not following the naming pattern");
                    plan.skipped.push(path);
                }
            }
        }
        Ok(plan)
    }

    pub fn jobs(&self) -> Vec<TransferJob> {
        self.groups
            .iter()
            .flat_map(|(name, files)| {
                files
                    .iter()
                    .map(move |file| TransferJob::import(name, file))
            })
            .collect()
    }
}

/// Uploads one version file per job.
struct ImportHandler {
    client: Arc<IntegrationsClient>,
    ctx: RequestContext,
}

impl TransferHandler for ImportHandler {
    async fn transfer(&self, job: &TransferJob) -> Result<usize, Error> {
        let path = &job.local_path;
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| Error::IO {
                path: path.clone(),
                source,
            })?;
        let definition: serde_json::Value =
            serde_json::from_str(&raw).map_err(|source| Error::InvalidFile {
                path: path.clone(),
                source,
            })?;
        let content =
            serde_json::to_string(&definition).map_err(|source| Error::SerdeJson { source })?;

        self.client
            .upload_version(&self.ctx, &job.resource_name, content, FileFormat::Json)
            .await
            .map_err(|source| Error::Client { source })?;

        debug!(path = %path.display(), "Uploaded version");
        Ok(1)
    }
}

/// Uploads every version file of a folder.
pub struct Import {
    client: Arc<IntegrationsClient>,
    ctx: RequestContext,
    options: ImportOptions,
}

impl Runner for Import {
    type Output = TransferReport;
    type Error = Error;

    #[tracing::instrument(skip(self), name = "import", fields(dir = %self.options.input_dir.display()))]
    async fn run(self) -> Result<TransferReport, Error> {
        let dir = &self.options.input_dir;
        let metadata = tokio::fs::metadata(dir)
            .await
            .map_err(|source| Error::IO {
                path: dir.clone(),
                source,
            })?;
        if !metadata.is_dir() {
            return Err(Error::IO {
                path: dir.clone(),
                source: std::io::Error::other("not a directory"),
            });
        }

        let plan = ImportPlan::scan(&self.options.input_dir, self.options.separator)?;
        for (name, files) in &plan.groups {
            debug!(integration = %name, files = files.len(), "Queued versions");
        }
        info!(
            integrations = plan.groups.len(),
            skipped = plan.skipped.len(),
            "Importing integrations"
        );

        let pool = WorkerPool::new(self.options.concurrency).fail_fast(self.options.fail_fast);
        let handler = Arc::new(ImportHandler {
            client: self.client,
            ctx: self.ctx,
        });
        let mut report = pool.run(plan.jobs(), handler).await;
        report.skipped = plan.skipped;

        info!("Import finished: {}", report);
        Ok(report)
    }
}

#[derive(Default)]
pub struct ImportBuilder {
    client: Option<Arc<IntegrationsClient>>,
    ctx: Option<RequestContext>,
    input_dir: Option<PathBuf>,
    concurrency: Option<usize>,
    separator: Separator,
    fail_fast: bool,
}

impl ImportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(mut self, client: Arc<IntegrationsClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn context(mut self, ctx: RequestContext) -> Self {
        self.ctx = Some(ctx);
        self
    }

    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.input_dir = Some(dir.into());
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn separator(mut self, separator: Separator) -> Self {
        self.separator = separator;
        self
    }

    pub fn fail_fast(mut self, enabled: bool) -> Self {
        self.fail_fast = enabled;
        self
    }

    pub fn build(self) -> Result<Import, Error> {
        Ok(Import {
            client: self
                .client
                .ok_or_else(|| Error::MissingRequiredAttribute("client".to_string()))?,
            ctx: self.ctx.unwrap_or_default(),
            options: ImportOptions {
                input_dir: self
                    .input_dir
                    .ok_or_else(|| Error::MissingRequiredAttribute("input_dir".to_string()))?,
                concurrency: self.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
                separator: self.separator,
                fail_fast: self.fail_fast,
            },
        })
    }
}
