//! CSV export handling and binary asset downloads.

mod download;
mod error;
mod pipeline;
mod records;

pub use download::{
    partial_path, AssetDownloader, AssetKind, DownloadOutcome, DownloadTally, DownloadTask,
    HeaderProfile,
};
pub use error::{ExportError, ExportResult};
pub use pipeline::{ExportPipeline, ExportSummary};
pub use records::{DocumentRecord, ExportRow};
