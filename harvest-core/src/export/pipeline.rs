use std::cell::Cell;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};

use crate::browser::{wait_until, BrowserError, PageSession};
use crate::context::HarvestContext;
use crate::storage;

use super::download::DownloadTally;
use super::error::{ExportError, ExportResult};
use super::records::{DocumentRecord, ExportRow};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub part: String,
    pub company: String,
    pub records: usize,
    pub json_path: PathBuf,
    pub downloads: DownloadTally,
    /// Records without a link or file name.
    pub skipped: usize,
}

/// Turns the currently filtered search results into a JSON manifest plus
/// downloaded documents.
pub struct ExportPipeline<'a> {
    ctx: &'a HarvestContext,
}

impl<'a> ExportPipeline<'a> {
    pub fn new(ctx: &'a HarvestContext) -> Self {
        Self { ctx }
    }

    /// Triggers the export for `part`, persists its records and documents,
    /// and removes the intermediate CSV whether or not processing succeeded.
    pub async fn export_results(
        &self,
        page: &dyn PageSession,
        part: &str,
        company: &str,
    ) -> ExportResult<ExportSummary> {
        let docs = &self.ctx.config.documentation;
        let layout = &self.ctx.layout;
        let csv_dir = layout.ensure_folder(&layout.csv_dir()).await?;
        let export_path = csv_dir.join(&docs.export_file_name);
        if storage::delete_file(&export_path).await? {
            debug!(path = %export_path.display(), "removed stale export");
        }

        let result = async {
            self.capture_export(page, &csv_dir, &export_path).await?;
            self.process_export(&export_path, part, company).await
        }
        .await;

        if let Err(err) = storage::delete_file(&export_path).await {
            warn!(path = %export_path.display(), error = %err, "failed to delete export file");
        }
        result
    }

    async fn capture_export(
        &self,
        page: &dyn PageSession,
        csv_dir: &Path,
        export_path: &Path,
    ) -> ExportResult<()> {
        let docs = &self.ctx.config.documentation;
        page.capture_downloads(csv_dir).await?;
        let triggered = async {
            page.click_nth(&docs.export_button_selector, 0).await?;
            wait_for_completed_file(export_path, docs.export_timeout(), docs.poll_interval()).await
        }
        .await;
        if let Err(err) = page.release_downloads().await {
            warn!(error = %err, "failed to release download capture");
        }
        triggered
    }

    async fn process_export(
        &self,
        export_path: &Path,
        part: &str,
        company: &str,
    ) -> ExportResult<ExportSummary> {
        let docs = &self.ctx.config.documentation;
        let layout = &self.ctx.layout;

        let rows: Vec<ExportRow> = storage::parse_tabular(export_path).await?;
        let records: Vec<DocumentRecord> = rows.into_iter().map(DocumentRecord::from).collect();

        let dir = layout
            .ensure_folder(&layout.datasheet_dir(part, company))
            .await?;
        let json_path = layout.datasheet_json(part, company);
        storage::write_json(&json_path, &records).await?;
        info!(
            part,
            company,
            records = records.len(),
            path = %json_path.display(),
            "export manifest written"
        );

        let mut downloads = DownloadTally::default();
        let mut skipped = 0usize;
        for record in &records {
            match record.download_task(&dir, &docs.document_extension) {
                Some(task) => downloads.record(&self.ctx.downloader.download(task).await),
                None => {
                    debug!(filename = ?record.filename, "record has nothing to download");
                    skipped += 1;
                }
            }
        }

        Ok(ExportSummary {
            part: part.to_string(),
            company: company.to_string(),
            records: records.len(),
            json_path,
            downloads,
            skipped,
        })
    }
}

/// Waits until `path` exists with a non-zero size that is unchanged between
/// two polls and the browser's in-progress sibling is gone.
async fn wait_for_completed_file(
    path: &Path,
    timeout: std::time::Duration,
    interval: std::time::Duration,
) -> ExportResult<()> {
    let in_progress = {
        let mut name = path.as_os_str().to_owned();
        name.push(".crdownload");
        PathBuf::from(name)
    };
    let last_size = Cell::new(None::<u64>);
    let outcome = wait_until("export file", timeout, interval, || {
        let last_size = &last_size;
        let in_progress = &in_progress;
        async move {
            if fs::metadata(in_progress).await.is_ok() {
                return Ok(false);
            }
            let size = match fs::metadata(path).await {
                Ok(meta) => meta.len(),
                Err(_) => return Ok(false),
            };
            let stable = size > 0 && last_size.get() == Some(size);
            last_size.set(Some(size));
            Ok(stable)
        }
    })
    .await;
    match outcome {
        Ok(()) => Ok(()),
        Err(BrowserError::Timeout(reason)) => Err(ExportError::Incomplete {
            path: path.to_path_buf(),
            reason,
        }),
        Err(err) => Err(err.into()),
    }
}
