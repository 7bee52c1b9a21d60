use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Per-asset download attempt ceiling.
pub const MAX_DOWNLOAD_ATTEMPTS: u32 = 3;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub browser: BrowserSection,
    pub output: OutputSection,
    pub documentation: DocumentationSection,
    pub forum: ForumSection,
    pub download: DownloadSection,
    pub run: RunSection,
    pub headers: HeaderProfiles,
}

impl HarvestConfig {
    pub fn output_root(&self) -> PathBuf {
        PathBuf::from(&self.output.root_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub executable_path: Option<String>,
    pub headless: bool,
    pub sandbox: bool,
    pub viewport: [u32; 2],
    pub user_agent: String,
    pub accept_language: Option<String>,
    pub bypass_csp: bool,
    pub default_timeout_seconds: u64,
    pub extra_args: Vec<String>,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            executable_path: None,
            headless: true,
            sandbox: false,
            viewport: [1920, 1080],
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: Some("en-US,en;q=0.9".to_string()),
            bypass_csp: true,
            default_timeout_seconds: 60,
            extra_args: vec![
                "--disable-web-security".to_string(),
                "--start-fullscreen".to_string(),
            ],
        }
    }
}

impl BrowserSection {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub root_dir: String,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            root_dir: "output".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentationSection {
    pub search_url: String,
    pub company: String,
    pub taxonomy_toggle_selector: String,
    pub part_checkbox_selector: String,
    pub part_label_selector: String,
    pub document_types: Vec<String>,
    pub export_button_selector: String,
    pub reset_button_selector: String,
    pub ready_selector: String,
    pub export_file_name: String,
    pub document_extension: String,
    pub click_settle_ms: u64,
    pub expand_settle_ms: u64,
    pub ready_timeout_seconds: u64,
    pub export_timeout_seconds: u64,
    pub poll_interval_ms: u64,
}

impl Default for DocumentationSection {
    fn default() -> Self {
        Self {
            search_url: "https://www.onsemi.com/design/technical-documentation".to_string(),
            company: "Onsemi".to_string(),
            taxonomy_toggle_selector: ".filter-by-taxonomy > ul > li > .form-check > button[aria-label='Toggle Dropdown'] i.bi-chevron-down".to_string(),
            part_checkbox_selector: ".filter-by-taxonomy > ul > li > .form-check + ul > li > div > input.form-check-input".to_string(),
            part_label_selector: ".filter-by-taxonomy > ul > li > .form-check + ul > li > div > label".to_string(),
            document_types: vec![
                "Application Notes".to_string(),
                "Data Sheet".to_string(),
                "White Papers".to_string(),
            ],
            export_button_selector: "button.document-search-export-btn".to_string(),
            reset_button_selector: "button[aria-label=\"Clear Filter\"]".to_string(),
            ready_selector: "button.document-search-quick-ref-btn".to_string(),
            export_file_name: "document-search-export.csv".to_string(),
            document_extension: "pdf".to_string(),
            click_settle_ms: 1000,
            expand_settle_ms: 1000,
            ready_timeout_seconds: 30,
            export_timeout_seconds: 60,
            poll_interval_ms: 250,
        }
    }
}

impl DocumentationSection {
    /// Selector matching the enabled checkbox for one document type.
    pub fn document_type_selector(&self, document_type: &str) -> String {
        format!(
            ".filter-by-type input[value='{}']:not([disabled])",
            document_type.replace('\'', "\\'")
        )
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_seconds)
    }

    pub fn export_timeout(&self) -> Duration {
        Duration::from_secs(self.export_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForumSection {
    pub category_url: String,
    pub topic_url: String,
    pub article_base_url: String,
    pub categories: Vec<String>,
    pub category_tile_selector: String,
    pub article_list_selector: String,
    pub article_id_attribute: String,
    pub load_more_selector: String,
    pub topic_link_selector: String,
    pub wait_timeout_seconds: u64,
    pub poll_interval_ms: u64,
    pub politeness_delay_ms: [u64; 2],
    pub load_more_settle_ms: u64,
    pub max_load_more: usize,
    pub selectors: PostSelectors,
}

impl Default for ForumSection {
    fn default() -> Self {
        Self {
            category_url: "https://community.onsemi.com/s/datacategory".to_string(),
            topic_url:
                "https://community.onsemi.com/s/topic/0TO4V000000QUzVWAW/discrete-power-modules"
                    .to_string(),
            article_base_url: "https://community.onsemi.com/s/article/".to_string(),
            categories: [
                "Discrete & Power Modules",
                "Power Management",
                "Signal Conditioning & Control",
                "Sensors",
                "Motor Control",
                "Custom & ASSP",
                "Interfaces",
                "Wireless Connectivity",
                "Timing, Logic & Memory",
                "Packaging",
                "Tools and Software",
                "Nomenclature / Part Marking",
                "Thermal Management",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            category_tile_selector: "div.dataBox[data-category='{category}']".to_string(),
            article_list_selector: "div.articleList [data-article-id]".to_string(),
            article_id_attribute: "data-article-id".to_string(),
            load_more_selector: "button.loadMore".to_string(),
            topic_link_selector: "a.topic-item".to_string(),
            wait_timeout_seconds: 30,
            poll_interval_ms: 250,
            politeness_delay_ms: [3000, 3000],
            load_more_settle_ms: 1500,
            max_load_more: 500,
            selectors: PostSelectors::default(),
        }
    }
}

impl ForumSection {
    pub fn tile_selector(&self, category: &str) -> String {
        self.category_tile_selector
            .replace("{category}", &category.replace('\'', "\\'"))
    }

    pub fn article_url(&self, article_id: &str) -> String {
        if self.article_base_url.ends_with('/') {
            format!("{}{article_id}", self.article_base_url)
        } else {
            format!("{}/{article_id}", self.article_base_url)
        }
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Selectors the post extractor reads. Every one of them may be absent on a
/// given page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostSelectors {
    pub title: String,
    pub date: String,
    pub body: String,
    pub best_answer: String,
    pub answer_count: String,
    pub answers: String,
    pub answer_body: String,
    pub replies: String,
    pub reply_username: String,
    pub reply_body: String,
    pub tags: String,
}

impl Default for PostSelectors {
    fn default() -> Self {
        Self {
            title: "h1, .article-head h1, .cuf-questionTitle".to_string(),
            date: ".article-date, .cuf-timestamp, lightning-formatted-date-time".to_string(),
            body: ".article-body, .forceCommunityQuestionDetail .cuf-feedBodyText".to_string(),
            best_answer: ".cuf-bestAnswer .cuf-feedBodyText, .best-answer".to_string(),
            answer_count: ".cuf-commentCount, .answer-count".to_string(),
            answers: ".cuf-commentItem, .answer-item".to_string(),
            answer_body: ".cuf-feedBodyText, .answer-body".to_string(),
            replies: ".cuf-threadedReply, .reply-item".to_string(),
            reply_username: ".cuf-entityLinkId, .reply-author".to_string(),
            reply_body: ".cuf-feedBodyText, .reply-body".to_string(),
            tags: ".topic-list a, .tags a".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSection {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub timeout_seconds: u64,
    pub accept_invalid_certs: bool,
    pub image_extension: String,
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self {
            max_attempts: MAX_DOWNLOAD_ATTEMPTS,
            retry_delay_ms: 0,
            timeout_seconds: 120,
            accept_invalid_certs: true,
            image_extension: "png".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub max_attempts: usize,
}

impl Default for RunSection {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Named request header sets attached to asset downloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderProfiles {
    pub documentation: BTreeMap<String, String>,
    pub forum: BTreeMap<String, String>,
}

impl Default for HeaderProfiles {
    fn default() -> Self {
        let documentation = [
            ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7"),
            ("Accept-Language", "en-US,en;q=0.9"),
            ("Cache-Control", "max-age=0"),
            ("Connection", "keep-alive"),
            ("Cookie", "Apache=834f1f74.63b01b5664a61"),
            ("Sec-Fetch-Dest", "document"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Sec-Fetch-Site", "none"),
            ("Sec-Fetch-User", "?1"),
            ("Upgrade-Insecure-Requests", "1"),
            ("User-Agent", DEFAULT_USER_AGENT),
            ("Referer", "https://www.onsemi.com/"),
        ];
        let forum = [
            ("accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7"),
            ("accept-language", "en-US,en;q=0.9"),
            ("cache-control", "max-age=0"),
            ("cookie", "CookieConsentPolicy=0:1; LSKey-c$CookieConsentPolicy=0:1"),
            ("priority", "u=0, i"),
            ("sec-ch-ua", "\" Not A;Brand\";v=\"99\", \"Chromium\";v=\"138\", \"Google Chrome\";v=\"138\""),
            ("sec-ch-ua-mobile", "?0"),
            ("sec-ch-ua-platform", "\"Mac OS X\""),
            ("sec-fetch-dest", "document"),
            ("sec-fetch-mode", "navigate"),
            ("sec-fetch-site", "none"),
            ("sec-fetch-user", "?1"),
            ("upgrade-insecure-requests", "1"),
            ("user-agent", "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36"),
        ];
        Self {
            documentation: to_map(&documentation),
            forum: to_map(&forum),
        }
    }
}

fn to_map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

pub fn load_harvest_config<P: AsRef<Path>>(path: P) -> Result<HarvestConfig> {
    let config: HarvestConfig = load_toml(path)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &HarvestConfig) -> Result<()> {
    if !(1..=MAX_DOWNLOAD_ATTEMPTS).contains(&config.download.max_attempts) {
        return Err(ConfigError::Invalid {
            field: "download.max_attempts".to_string(),
            reason: format!("must be between 1 and {MAX_DOWNLOAD_ATTEMPTS}"),
        });
    }
    if config.run.max_attempts == 0 {
        return Err(ConfigError::Invalid {
            field: "run.max_attempts".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    if config.output.root_dir.trim().is_empty() {
        return Err(ConfigError::Invalid {
            field: "output.root_dir".to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
