use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::storage::sanitize_segment;

use super::download::{AssetKind, DownloadTask, HeaderProfile};

/// One row of the document-search export, keyed by the export's header names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportRow {
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
    #[serde(rename = "Document Title", default)]
    pub title: Option<String>,
    #[serde(rename = "Link", default)]
    pub link: Option<String>,
}

/// Metadata persisted for every exported document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub filename: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl From<ExportRow> for DocumentRecord {
    fn from(row: ExportRow) -> Self {
        Self {
            filename: present(row.name)
                .map(|name| sanitize_segment(&name))
                .filter(|name| !name.is_empty()),
            description: present(row.title),
            url: present(row.link),
        }
    }
}

impl DocumentRecord {
    /// Builds the download for this record, or `None` when it has no link or
    /// no usable file name.
    pub fn download_task(&self, dir: &Path, extension: &str) -> Option<DownloadTask> {
        let url = self.url.as_deref()?;
        let filename = self.filename.as_deref()?;
        Some(DownloadTask::new(
            url,
            dir.join(format!("{filename}.{extension}")),
            AssetKind::Document,
            HeaderProfile::Documentation,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_strips_separators_from_filename() {
        let record = DocumentRecord::from(ExportRow {
            name: Some(" NCP/1234 ".into()),
            title: Some("Controller datasheet".into()),
            link: Some("https://www.onsemi.com/pdf/datasheet/ncp1234-d.pdf".into()),
        });
        assert_eq!(record.filename.as_deref(), Some("NCP1234"));
        assert_eq!(record.description.as_deref(), Some("Controller datasheet"));
        let task = record.download_task(Path::new("/out"), "pdf").unwrap();
        assert_eq!(task.destination, Path::new("/out/NCP1234.pdf"));
        assert_eq!(task.profile, HeaderProfile::Documentation);
    }

    #[test]
    fn record_without_link_has_no_download() {
        let record = DocumentRecord::from(ExportRow {
            name: Some("AND9001".into()),
            title: None,
            link: Some("   ".into()),
        });
        assert_eq!(record.url, None);
        assert!(record.download_task(Path::new("/out"), "pdf").is_none());
    }

    #[test]
    fn serializes_with_null_for_missing_fields() {
        let record = DocumentRecord {
            filename: Some("AND9001".into()),
            description: None,
            url: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"filename": "AND9001", "description": null, "url": null})
        );
    }
}
