use serde::Serialize;
use tracing::{info, warn};

use crate::browser::{settle, wait_until, BrowserError, BrowserResult, PageSession};
use crate::context::HarvestContext;
use crate::export::{ExportError, ExportPipeline, ExportSummary};

use super::gate::{is_present, ClickGate};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub parts_seen: usize,
    pub parts_exported: usize,
    pub records: usize,
    pub documents_written: usize,
    pub documents_abandoned: usize,
    pub failures: Vec<PartFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartFailure {
    pub part: String,
    pub error: String,
}

impl SweepReport {
    fn record_export(&mut self, summary: &ExportSummary) {
        self.parts_exported += 1;
        self.records += summary.records;
        self.documents_written += summary.downloads.written;
        self.documents_abandoned += summary.downloads.abandoned;
    }
}

/// Walks every part filter on the document search page and exports the
/// matching documents for each one.
pub struct DocumentSweep<'a> {
    ctx: &'a HarvestContext,
    gate: ClickGate<'a>,
    pipeline: ExportPipeline<'a>,
}

impl<'a> DocumentSweep<'a> {
    pub fn new(ctx: &'a HarvestContext) -> Self {
        let docs = &ctx.config.documentation;
        Self {
            ctx,
            gate: ClickGate::new(
                &docs.ready_selector,
                docs.ready_timeout(),
                docs.poll_interval(),
                docs.click_settle_ms,
            ),
            pipeline: ExportPipeline::new(ctx),
        }
    }

    /// Fails only when the search page cannot be reached or read; each part
    /// is isolated from the others.
    pub async fn run(&self, page: &dyn PageSession) -> BrowserResult<SweepReport> {
        let docs = &self.ctx.config.documentation;
        page.goto(&docs.search_url).await?;
        self.expand_taxonomy(page).await;

        let labels = page.texts(&docs.part_label_selector).await?;
        let checkboxes = page.count(&docs.part_checkbox_selector).await?;
        if labels.len() != checkboxes {
            warn!(
                labels = labels.len(),
                checkboxes, "part labels and checkboxes disagree, sweeping the overlap"
            );
        }
        info!(parts = labels.len().min(checkboxes), "starting document sweep");

        let mut report = SweepReport::default();
        for (index, label) in labels.iter().take(checkboxes).enumerate() {
            report.parts_seen += 1;
            if self.gate.take_reloaded() {
                self.expand_taxonomy(page).await;
            }
            match self.process_part(page, index, label).await {
                Ok(summary) => {
                    info!(
                        part = %label,
                        records = summary.records,
                        written = summary.downloads.written,
                        abandoned = summary.downloads.abandoned,
                        "part exported"
                    );
                    report.record_export(&summary);
                }
                Err(err) => {
                    warn!(part = %label, error = %err, "part skipped");
                    report.failures.push(PartFailure {
                        part: label.clone(),
                        error: err.to_string(),
                    });
                }
            }
            self.reset_filters(page).await;
        }
        Ok(report)
    }

    async fn expand_taxonomy(&self, page: &dyn PageSession) {
        let docs = &self.ctx.config.documentation;
        let toggles = docs.taxonomy_toggle_selector.as_str();
        let present = wait_until(
            "taxonomy toggles",
            docs.ready_timeout(),
            docs.poll_interval(),
            || is_present(page, toggles),
        )
        .await;
        if let Err(err) = present {
            warn!(error = %err, "taxonomy toggles not found");
            return;
        }
        let expanded = self.gate.click_all(page, toggles).await;
        settle(docs.expand_settle_ms).await;
        self.gate.take_reloaded();
        info!(expanded, "taxonomy expanded");
    }

    async fn process_part(
        &self,
        page: &dyn PageSession,
        index: usize,
        label: &str,
    ) -> Result<ExportSummary, ExportError> {
        let docs = &self.ctx.config.documentation;
        if !self
            .gate
            .click(page, &docs.part_checkbox_selector, index)
            .await
        {
            let reason = format!("could not select part filter {label}");
            return Err(BrowserError::Interaction(reason).into());
        }
        for document_type in &docs.document_types {
            let selector = docs.document_type_selector(document_type);
            self.gate.click_all(page, &selector).await;
            if self.gate.reloaded() {
                let reason = format!("filters for {label} lost to a reload at {document_type}");
                return Err(BrowserError::Interaction(reason).into());
            }
        }
        self.pipeline
            .export_results(page, label, &docs.company)
            .await
    }

    async fn reset_filters(&self, page: &dyn PageSession) {
        let docs = &self.ctx.config.documentation;
        settle(docs.click_settle_ms).await;
        self.gate.click_all(page, &docs.reset_button_selector).await;
    }
}
