pub mod browser;
pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod extract;
pub mod harvester;
pub mod navigation;
pub mod storage;

pub use browser::{BrowserLauncher, BrowserError, SessionManager};
pub use config::{load_harvest_config, HarvestConfig};
pub use context::HarvestContext;
pub use error::{ConfigError, Result};
pub use export::{AssetDownloader, DownloadOutcome, DownloadTask, ExportError, ExportPipeline};
pub use extract::{ForumPost, PostVariant};
pub use harvester::{HarvestError, HarvestResult, Harvester, RunPlan, RunReport};
pub use navigation::{DocumentSweep, ForumReport, ForumTraversal, SweepReport};
pub use storage::{OutputLayout, StorageError};
