//! Output tree layout and the small file operations the harvester needs.

use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error at {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("serialization error for {path}: {source}")]
    Json {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("malformed tabular file {path}: {source}")]
    Tabular { source: csv::Error, path: PathBuf },
}

pub type StorageResult<T> = Result<T, StorageError>;

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        source,
        path: path.to_path_buf(),
    }
}

/// Strips path separators so a label can be used as a single path segment.
pub fn sanitize_segment(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '/' && *c != '\\')
        .collect::<String>()
        .trim()
        .to_string()
}

#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn csv_dir(&self) -> PathBuf {
        self.root.join("csv")
    }

    /// `<root>/datasheets/<part>/<company>`
    pub fn datasheet_dir(&self, part: &str, company: &str) -> PathBuf {
        self.root
            .join("datasheets")
            .join(sanitize_segment(part))
            .join(sanitize_segment(company))
    }

    pub fn datasheet_json(&self, part: &str, company: &str) -> PathBuf {
        self.datasheet_dir(part, company).join(format!(
            "{}_{}.json",
            sanitize_segment(part),
            sanitize_segment(company)
        ))
    }

    /// `<root>/forums/<post>`
    pub fn forum_dir(&self, post_name: &str) -> PathBuf {
        self.root.join("forums").join(sanitize_segment(post_name))
    }

    pub fn forum_json(&self, post_name: &str) -> PathBuf {
        let name = sanitize_segment(post_name);
        self.forum_dir(post_name).join(format!("{name}.json"))
    }

    /// Creates `dir` (and parents) and returns it as an absolute path.
    pub async fn ensure_folder(&self, dir: &Path) -> StorageResult<PathBuf> {
        let absolute = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(io_error(dir))?
                .join(dir)
        };
        fs::create_dir_all(&absolute)
            .await
            .map_err(io_error(&absolute))?;
        Ok(absolute)
    }
}

pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> StorageResult<()> {
    let body = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Json {
        source,
        path: path.to_path_buf(),
    })?;
    write_bytes(path, &body).await
}

pub async fn read_json<T: DeserializeOwned>(path: &Path) -> StorageResult<T> {
    let body = fs::read(path).await.map_err(io_error(path))?;
    serde_json::from_slice(&body).map_err(|source| StorageError::Json {
        source,
        path: path.to_path_buf(),
    })
}

pub async fn write_bytes(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    fs::write(path, bytes).await.map_err(io_error(path))?;
    debug!(path = %path.display(), bytes = bytes.len(), "file written");
    Ok(())
}

/// Removes `path`; returns whether a file was actually there.
pub async fn delete_file(path: &Path) -> StorageResult<bool> {
    match fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "file deleted");
            Ok(true)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "file not found, nothing to delete");
            Ok(false)
        }
        Err(source) => Err(StorageError::Io {
            source,
            path: path.to_path_buf(),
        }),
    }
}

pub async fn rename(dir: &Path, old_name: &str, new_name: &str) -> StorageResult<PathBuf> {
    let from = dir.join(old_name);
    let to = dir.join(new_name);
    fs::rename(&from, &to).await.map_err(io_error(&from))?;
    debug!(from = %from.display(), to = %to.display(), "file renamed");
    Ok(to)
}

/// Parses a header-row CSV file into typed rows, skipping blank lines and
/// tolerating ragged records.
pub async fn parse_tabular<T: DeserializeOwned>(path: &Path) -> StorageResult<Vec<T>> {
    let content = fs::read(path).await.map_err(io_error(path))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(content.as_slice());
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|source| StorageError::Tabular {
            source,
            path: path.to_path_buf(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[test]
    fn sanitize_strips_separators() {
        assert_eq!(sanitize_segment("MOSFET/IGBT"), "MOSFETIGBT");
        assert_eq!(sanitize_segment("a\\b/c/"), "abc");
        assert_eq!(sanitize_segment("Sensors"), "Sensors");
    }

    #[test]
    fn datasheet_paths_are_deterministic() {
        let layout = OutputLayout::new("output");
        assert_eq!(
            layout.datasheet_dir("MOSFET/IGBT", "Onsemi"),
            PathBuf::from("output/datasheets/MOSFETIGBT/Onsemi")
        );
        assert_eq!(
            layout.datasheet_json("MOSFET/IGBT", "Onsemi"),
            PathBuf::from("output/datasheets/MOSFETIGBT/Onsemi/MOSFETIGBT_Onsemi.json")
        );
        assert_eq!(
            layout.forum_json("0D54V00007"),
            PathBuf::from("output/forums/0D54V00007/0D54V00007.json")
        );
    }

    #[tokio::test]
    async fn ensure_folder_is_idempotent() {
        let dir = tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());
        let target = layout.datasheet_dir("Diodes", "Onsemi");
        let first = layout.ensure_folder(&target).await.unwrap();
        let second = layout.ensure_folder(&target).await.unwrap();
        assert_eq!(first, second);
        assert!(first.is_dir());
    }

    #[tokio::test]
    async fn delete_reports_missing_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("export.csv");
        write_bytes(&path, b"Name\n").await.unwrap();
        assert!(delete_file(&path).await.unwrap());
        assert!(!delete_file(&path).await.unwrap());
    }

    #[tokio::test]
    async fn rename_moves_file_within_directory() {
        let dir = tempdir().unwrap();
        write_bytes(&dir.path().join("a.part"), b"pdf").await.unwrap();
        let renamed = rename(dir.path(), "a.part", "a.pdf").await.unwrap();
        assert_eq!(std::fs::read(renamed).unwrap(), b"pdf");
        assert!(!dir.path().join("a.part").exists());
    }

    #[derive(Debug, Deserialize)]
    struct Row {
        #[serde(rename = "Name", default)]
        name: Option<String>,
        #[serde(rename = "Link", default)]
        link: Option<String>,
    }

    #[tokio::test]
    async fn parse_tabular_skips_blank_lines_and_tolerates_missing_cells() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("export.csv");
        write_bytes(
            &path,
            b"Name,Document Title,Link\nAND9001,Intro,https://x/a.pdf\n\nAND9002,Only title\n",
        )
        .await
        .unwrap();
        let rows: Vec<Row> = parse_tabular(&path).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name.as_deref(), Some("AND9001"));
        assert_eq!(rows[0].link.as_deref(), Some("https://x/a.pdf"));
        assert_eq!(rows[1].link, None);
    }
}
