//! Export of integration versions to a local folder.
//!
//! Integration names are enumerated up front, then each integration becomes one job. A job
//! lists the versions of its integration (the latest only unless all versions are
//! requested) and writes every version as pretty-printed JSON stripped of server-managed
//! fields, named `<name>+<snapshot>+<version>.json`.

use super::pool::{TransferHandler, WorkerPool};
use super::{Error, TransferReport, DEFAULT_CONCURRENCY};
use crate::client::{IntegrationsClient, IntegrationsFetcher, VersionsFetcher};
use crate::definition::to_external;
use crate::enumerate::{Enumerator, PageRequest};
use crate::naming::{Separator, VersionFile};
use crate::resource::TransferJob;
use flowctl_core::context::RequestContext;
use flowctl_core::task::runner::Runner;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Order putting the most recent snapshot first.
pub const LATEST_FIRST: &str = "snapshot_number desc";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    pub concurrency: usize,
    pub all_versions: bool,
    pub separator: Separator,
    pub fail_fast: bool,
    /// Page size for list calls, server default when unset.
    pub page_size: Option<u32>,
}

/// Writes versions of one integration per job.
struct ExportHandler {
    client: Arc<IntegrationsClient>,
    ctx: RequestContext,
    options: Arc<ExportOptions>,
}

impl ExportHandler {
    fn request(&self) -> PageRequest {
        if self.options.all_versions {
            PageRequest {
                page_size: self.options.page_size,
                ..Default::default()
            }
        } else {
            PageRequest::new().page_size(1).order_by(LATEST_FIRST)
        }
    }
}

impl TransferHandler for ExportHandler {
    async fn transfer(&self, job: &TransferJob) -> Result<usize, Error> {
        let fetcher = VersionsFetcher::new(Arc::clone(&self.client), &self.ctx, &job.resource_name);
        let mut enumerator = Enumerator::new(fetcher, self.request());

        let records = if self.options.all_versions {
            enumerator.collect_all().await
        } else {
            enumerator.next_page().await.map(Option::unwrap_or_default)
        }
        .map_err(|source| Error::Enumerate { source })?;

        let mut written = 0;
        for record in records {
            let descriptor = record.descriptor;
            let file_name = VersionFile::new(
                &descriptor.display_name,
                descriptor.snapshot_number,
                &descriptor.version,
            )
            .file_name(self.options.separator);
            let path = job.local_path.join(file_name);

            let content = serde_json::to_string_pretty(&to_external(record.body))
                .map_err(|source| Error::SerdeJson { source })?;
            tokio::fs::write(&path, content)
                .await
                .map_err(|source| Error::IO {
                    path: path.clone(),
                    source,
                })?;

            debug!(path = %path.display(), "Wrote version");
            written += 1;
        }
        Ok(written)
    }
}

/// Exports every integration of the configured project and region.
pub struct Export {
    client: Arc<IntegrationsClient>,
    ctx: RequestContext,
    options: Arc<ExportOptions>,
}

impl Runner for Export {
    type Output = TransferReport;
    type Error = Error;

    #[tracing::instrument(skip(self), name = "export", fields(dir = %self.options.output_dir.display()))]
    async fn run(self) -> Result<TransferReport, Error> {
        let output_dir = &self.options.output_dir;
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| Error::IO {
                path: output_dir.clone(),
                source,
            })?;

        let request = PageRequest {
            page_size: self.options.page_size,
            ..Default::default()
        };
        let mut enumerator =
            Enumerator::new(IntegrationsFetcher::new(Arc::clone(&self.client), &self.ctx), request);
        let names = enumerator
            .collect_all()
            .await
            .map_err(|source| Error::Enumerate { source })?;
        info!(integrations = names.len(), "Exporting integrations");

        let jobs = names
            .into_iter()
            .map(|name| TransferJob::export(name, output_dir))
            .collect();

        let pool = WorkerPool::new(self.options.concurrency).fail_fast(self.options.fail_fast);
        let handler = Arc::new(ExportHandler {
            client: self.client,
            ctx: self.ctx,
            options: Arc::clone(&self.options),
        });
        let report = pool.run(jobs, handler).await;

        info!("Export finished: {}", report);
        Ok(report)
    }
}

#[derive(Default)]
pub struct ExportBuilder {
    client: Option<Arc<IntegrationsClient>>,
    ctx: Option<RequestContext>,
    output_dir: Option<PathBuf>,
    concurrency: Option<usize>,
    all_versions: bool,
    separator: Separator,
    fail_fast: bool,
    page_size: Option<u32>,
}

impl ExportBuilder {
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

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn all_versions(mut self, enabled: bool) -> Self {
        self.all_versions = enabled;
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

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn build(self) -> Result<Export, Error> {
        Ok(Export {
            client: self
                .client
                .ok_or_else(|| Error::MissingRequiredAttribute("client".to_string()))?,
            ctx: self.ctx.unwrap_or_default(),
            options: Arc::new(ExportOptions {
                output_dir: self
                    .output_dir
                    .ok_or_else(|| Error::MissingRequiredAttribute("output_dir".to_string()))?,
                concurrency: self.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
                all_versions: self.all_versions,
                separator: self.separator,
                fail_fast: self.fail_fast,
                page_size: self.page_size,
            }),
        })
    }
}
