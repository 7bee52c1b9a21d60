use std::sync::Arc;

use crate::config::HarvestConfig;
use crate::export::{AssetDownloader, ExportResult};
use crate::storage::OutputLayout;

/// Shared, read-only state handed to every harvest stage.
#[derive(Debug, Clone)]
pub struct HarvestContext {
    pub config: Arc<HarvestConfig>,
    pub layout: OutputLayout,
    pub downloader: AssetDownloader,
}

impl HarvestContext {
    pub fn new(config: HarvestConfig) -> ExportResult<Self> {
        let downloader = AssetDownloader::new(&config.download, &config.headers)?;
        let layout = OutputLayout::new(config.output_root());
        Ok(Self {
            config: Arc::new(config),
            layout,
            downloader,
        })
    }
}
