use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{DownloadSection, HeaderProfiles};
use crate::storage::{self, StorageError};

use super::error::{ExportError, ExportResult};

/// Headers the HTTP client owns and never forwards from a profile.
const CLIENT_MANAGED_HEADERS: &[&str] = &["host", "accept-encoding"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Document,
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderProfile {
    Documentation,
    Forum,
}

impl HeaderProfile {
    fn label(self) -> &'static str {
        match self {
            HeaderProfile::Documentation => "documentation",
            HeaderProfile::Forum => "forum",
        }
    }
}

/// A single binary asset to fetch. Owns its own attempt counter.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub source_url: String,
    pub destination: PathBuf,
    pub kind: AssetKind,
    pub profile: HeaderProfile,
    attempts: u32,
}

impl DownloadTask {
    pub fn new(
        source_url: impl Into<String>,
        destination: PathBuf,
        kind: AssetKind,
        profile: HeaderProfile,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            destination,
            kind,
            profile,
            attempts: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Written {
        path: PathBuf,
        bytes: u64,
        attempts: u32,
    },
    Abandoned {
        url: String,
        attempts: u32,
        error: String,
    },
}

impl DownloadOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, DownloadOutcome::Written { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            DownloadOutcome::Written { attempts, .. }
            | DownloadOutcome::Abandoned { attempts, .. } => *attempts,
        }
    }
}

/// Running totals of download outcomes for a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadTally {
    pub written: usize,
    pub abandoned: usize,
}

impl DownloadTally {
    pub fn record(&mut self, outcome: &DownloadOutcome) {
        if outcome.is_written() {
            self.written += 1;
        } else {
            self.abandoned += 1;
        }
    }
}

/// Streams assets to disk with a bounded number of attempts per task.
#[derive(Debug, Clone)]
pub struct AssetDownloader {
    client: Client,
    documentation_headers: HeaderMap,
    forum_headers: HeaderMap,
    max_attempts: u32,
    retry_delay: Duration,
}

impl AssetDownloader {
    pub fn new(config: &DownloadSection, headers: &HeaderProfiles) -> ExportResult<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            documentation_headers: header_map(
                HeaderProfile::Documentation,
                &headers.documentation,
            )?,
            forum_headers: header_map(HeaderProfile::Forum, &headers.forum)?,
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn headers_for(&self, profile: HeaderProfile) -> &HeaderMap {
        match profile {
            HeaderProfile::Documentation => &self.documentation_headers,
            HeaderProfile::Forum => &self.forum_headers,
        }
    }

    /// Fetches `task`, retrying up to the attempt ceiling. Failures never
    /// propagate; an abandoned task is reported in the outcome and logged once.
    pub async fn download(&self, mut task: DownloadTask) -> DownloadOutcome {
        loop {
            task.attempts += 1;
            match self.fetch_once(&task).await {
                Ok(bytes) => {
                    info!(
                        url = %task.source_url,
                        path = %task.destination.display(),
                        bytes,
                        attempts = task.attempts,
                        "asset downloaded"
                    );
                    return DownloadOutcome::Written {
                        path: task.destination,
                        bytes,
                        attempts: task.attempts,
                    };
                }
                Err(err) if task.attempts >= self.max_attempts => {
                    warn!(
                        url = %task.source_url,
                        kind = ?task.kind,
                        attempts = task.attempts,
                        error = %err,
                        "asset download abandoned"
                    );
                    return DownloadOutcome::Abandoned {
                        url: task.source_url,
                        attempts: task.attempts,
                        error: err.to_string(),
                    };
                }
                Err(err) => {
                    debug!(
                        url = %task.source_url,
                        attempt = task.attempts,
                        error = %err,
                        "asset download attempt failed"
                    );
                    if !self.retry_delay.is_zero() {
                        sleep(self.retry_delay).await;
                    }
                }
            }
        }
    }

    async fn fetch_once(&self, task: &DownloadTask) -> ExportResult<u64> {
        let dir = task.destination.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)
            .await
            .map_err(|source| io_error(dir, source))?;
        let partial = partial_path(&task.destination);
        let result = async {
            let bytes = self.stream_to(&task.source_url, task.profile, &partial).await?;
            storage::rename(dir, &file_name(&partial), &file_name(&task.destination)).await?;
            Ok::<_, ExportError>(bytes)
        }
        .await;
        if result.is_err() {
            if let Err(remove_err) = fs::remove_file(&partial).await {
                if remove_err.kind() != std::io::ErrorKind::NotFound {
                    debug!(
                        path = %partial.display(),
                        error = %remove_err,
                        "failed to remove partial file"
                    );
                }
            }
        }
        result
    }

    async fn stream_to(&self, url: &str, profile: HeaderProfile, path: &Path) -> ExportResult<u64> {
        let response = self
            .client
            .get(url)
            .headers(self.headers_for(profile).clone())
            .send()
            .await?
            .error_for_status()?;
        let mut stream = response.bytes_stream();
        let mut file = fs::File::create(path)
            .await
            .map_err(|source| io_error(path, source))?;
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let data = chunk?;
            file.write_all(&data)
                .await
                .map_err(|source| io_error(path, source))?;
            written += data.len() as u64;
        }
        file.flush().await.map_err(|source| io_error(path, source))?;
        Ok(written)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ExportError {
    ExportError::Storage(StorageError::Io {
        source,
        path: path.to_path_buf(),
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `<destination>.part`, the in-flight name of a download.
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

fn header_map(
    profile: HeaderProfile,
    entries: &std::collections::BTreeMap<String, String>,
) -> ExportResult<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in entries {
        if CLIENT_MANAGED_HEADERS
            .iter()
            .any(|managed| name.eq_ignore_ascii_case(managed))
        {
            continue;
        }
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
            ExportError::HeaderProfile {
                profile: profile.label().to_string(),
                reason: format!("{name}: {err}"),
            }
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|err| ExportError::HeaderProfile {
            profile: profile.label().to_string(),
            reason: format!("{name}: {err}"),
        })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn header_map_skips_client_managed_entries() {
        let mut entries = BTreeMap::new();
        entries.insert("Host".to_string(), "www.onsemi.com".to_string());
        entries.insert("Accept-Encoding".to_string(), "gzip".to_string());
        entries.insert("Referer".to_string(), "https://www.onsemi.com/".to_string());
        let map = header_map(HeaderProfile::Documentation, &entries).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["referer"], "https://www.onsemi.com/");
    }

    #[test]
    fn header_map_rejects_invalid_names() {
        let mut entries = BTreeMap::new();
        entries.insert("bad header".to_string(), "x".to_string());
        let err = header_map(HeaderProfile::Forum, &entries).unwrap_err();
        assert!(matches!(err, ExportError::HeaderProfile { .. }));
    }

    #[test]
    fn default_profiles_build() {
        let downloader =
            AssetDownloader::new(&DownloadSection::default(), &HeaderProfiles::default()).unwrap();
        assert_eq!(downloader.max_attempts(), 3);
        assert!(downloader.headers_for(HeaderProfile::Forum).contains_key("sec-ch-ua"));
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/out/AND9001.pdf")),
            PathBuf::from("/out/AND9001.pdf.part")
        );
    }

    #[test]
    fn tally_counts_outcomes() {
        let mut tally = DownloadTally::default();
        tally.record(&DownloadOutcome::Written {
            path: PathBuf::from("a"),
            bytes: 3,
            attempts: 1,
        });
        tally.record(&DownloadOutcome::Abandoned {
            url: "http://x".into(),
            attempts: 3,
            error: "500".into(),
        });
        assert_eq!(tally, DownloadTally { written: 1, abandoned: 1 });
    }
}
