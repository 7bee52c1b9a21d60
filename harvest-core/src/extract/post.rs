use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::browser::{evaluate_as, BrowserError, PageSession};
use crate::context::HarvestContext;
use crate::export::{AssetDownloader, AssetKind, DownloadTally, DownloadTask, HeaderProfile};
use crate::storage::{self, sanitize_segment, StorageError};

use super::fields::{collect_script, RawBlock, RawPost, RawSegment};
use super::model::{ContentBlock, ContentSection, ForumPost, PostVariant, Reply, Tag};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp"];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("browser error during extraction: {0}")]
    Browser(#[from] BrowserError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type ExtractResult<T> = Result<T, ExtractError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    Detail,
    Answer,
    Reply,
}

impl ImageRole {
    fn label(self) -> &'static str {
        match self {
            ImageRole::Detail => "detail",
            ImageRole::Answer => "answer",
            ImageRole::Reply => "reply",
        }
    }
}

/// Persists one referenced image and returns its local file name.
#[async_trait(?Send)]
pub trait ImageStore {
    async fn store(&mut self, role: ImageRole, source: &str) -> Option<String>;
}

/// Downloads post images next to the post's JSON, numbering them with one
/// counter per post.
pub struct DownloadingImageStore<'a> {
    downloader: &'a AssetDownloader,
    dir: PathBuf,
    post_name: String,
    base: Option<Url>,
    default_extension: &'a str,
    counter: usize,
    tally: DownloadTally,
}

impl<'a> DownloadingImageStore<'a> {
    pub fn new(
        downloader: &'a AssetDownloader,
        dir: PathBuf,
        post_name: &str,
        page_url: &str,
        default_extension: &'a str,
    ) -> Self {
        Self {
            downloader,
            dir,
            post_name: sanitize_segment(post_name),
            base: Url::parse(page_url).ok(),
            default_extension,
            counter: 0,
            tally: DownloadTally::default(),
        }
    }

    pub fn tally(&self) -> DownloadTally {
        self.tally
    }
}

#[async_trait(?Send)]
impl ImageStore for DownloadingImageStore<'_> {
    async fn store(&mut self, role: ImageRole, source: &str) -> Option<String> {
        let Some(url) = resolve_source(self.base.as_ref(), source) else {
            debug!(source, "skipping image with unsupported source");
            return None;
        };
        self.counter += 1;
        let extension = image_extension(&url).unwrap_or(self.default_extension);
        let file_name = format!(
            "{}_{}_{}.{}",
            self.post_name,
            role.label(),
            self.counter,
            extension
        );
        let task = DownloadTask::new(
            url.as_str(),
            self.dir.join(&file_name),
            AssetKind::Image,
            HeaderProfile::Forum,
        );
        let outcome = self.downloader.download(task).await;
        self.tally.record(&outcome);
        outcome.is_written().then_some(file_name)
    }
}

/// Absolute http(s) URL for an image source, resolving relative paths
/// against the page.
fn resolve_source(base: Option<&Url>, source: &str) -> Option<Url> {
    let url = match Url::parse(source) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => base?.join(source).ok()?,
        Err(_) => return None,
    };
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn image_extension(url: &Url) -> Option<&'static str> {
    let last = url.path_segments()?.next_back()?;
    let (_, ext) = last.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().copied().find(|known| *known == ext)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostSummary {
    pub post_name: String,
    pub json_path: PathBuf,
    pub images: DownloadTally,
}

/// Reads the open post page and writes `forums/<post>/<post>.json`.
pub struct PostExtractor<'a> {
    ctx: &'a HarvestContext,
    script: String,
}

impl<'a> PostExtractor<'a> {
    pub fn new(ctx: &'a HarvestContext) -> Self {
        Self {
            ctx,
            script: collect_script(&ctx.config.forum.selectors),
        }
    }

    pub async fn extract(
        &self,
        page: &dyn PageSession,
        link: &str,
        post_name: &str,
        variant: PostVariant,
    ) -> ExtractResult<PostSummary> {
        let raw: RawPost = evaluate_as(page, &self.script).await?;
        let layout = &self.ctx.layout;
        let dir = layout.ensure_folder(&layout.forum_dir(post_name)).await?;

        let mut images = DownloadingImageStore::new(
            &self.ctx.downloader,
            dir.clone(),
            post_name,
            link,
            &self.ctx.config.download.image_extension,
        );
        let post = assemble_post(&raw, link, variant, &mut images).await;

        let json_path = layout.forum_json(post_name);
        storage::write_json(&json_path, &post).await?;
        let tally = images.tally();
        info!(
            post = post_name,
            ?variant,
            images = tally.written,
            images_abandoned = tally.abandoned,
            "post extracted"
        );
        Ok(PostSummary {
            post_name: post_name.to_string(),
            json_path,
            images: tally,
        })
    }
}

/// Builds the persisted post from the raw payload, storing images as they
/// are encountered.
pub async fn assemble_post(
    raw: &RawPost,
    link: &str,
    variant: PostVariant,
    images: &mut dyn ImageStore,
) -> ForumPost {
    let mut details = None;
    let best_answer;
    let mut answers = Vec::new();

    match variant {
        PostVariant::Article => {
            best_answer = match raw.body() {
                Some(body) => layered(body, ImageRole::Detail, images).await,
                None => Vec::new(),
            };
            for answer in raw.answers() {
                answers.extend(layered(answer, ImageRole::Answer, images).await);
            }
        }
        PostVariant::Question => {
            let body = match raw.body() {
                Some(body) => interleaved(body, ImageRole::Detail, images).await,
                None => Vec::new(),
            };
            details = Some(ContentSection::new(body));
            best_answer = match raw.best_answer() {
                Some(best) => interleaved(best, ImageRole::Answer, images).await,
                None => Vec::new(),
            };
            for answer in raw.answers() {
                answers.extend(interleaved(answer, ImageRole::Answer, images).await);
            }
        }
    }

    let count = raw.answer_count().or_else(|| {
        (!raw.answers().is_empty()).then(|| u32::try_from(raw.answers().len()).unwrap_or(u32::MAX))
    });

    let mut replies = Vec::with_capacity(raw.replies().len());
    for reply in raw.replies() {
        let mut content: Vec<ContentBlock> = reply
            .text()
            .map(|text| ContentBlock::Text(text.to_string()))
            .into_iter()
            .collect();
        for source in reply.images() {
            if let Some(name) = images.store(ImageRole::Reply, source).await {
                content.push(ContentBlock::Image(name));
            }
        }
        replies.push(Reply {
            username: reply.username().map(str::to_string),
            content,
        });
    }

    let tags = raw
        .tags()
        .iter()
        .filter_map(|tag| {
            Some(Tag {
                name: tag.name()?.to_string(),
                link: tag.link().map(str::to_string),
            })
        })
        .collect();

    ForumPost {
        link: link.to_string(),
        heading: variant.heading(raw.title().map(str::to_string)),
        date: raw.date().map(str::to_string),
        details,
        best_answer: ContentSection::new(best_answer),
        all_answers: ContentSection {
            count,
            content: answers,
        },
        replies,
        tags,
    }
}

/// Text, then markup, then every image.
async fn layered(
    block: &RawBlock,
    role: ImageRole,
    images: &mut dyn ImageStore,
) -> Vec<ContentBlock> {
    let mut content = Vec::new();
    if let Some(text) = block.text() {
        content.push(ContentBlock::Text(text.to_string()));
    }
    if let Some(html) = block.html() {
        content.push(ContentBlock::Html(html.to_string()));
    }
    for source in block.images() {
        if let Some(name) = images.store(role, source).await {
            content.push(ContentBlock::Image(name));
        }
    }
    content
}

/// Text runs and images in page order.
async fn interleaved(
    block: &RawBlock,
    role: ImageRole,
    images: &mut dyn ImageStore,
) -> Vec<ContentBlock> {
    let mut content = Vec::new();
    for segment in block.segments() {
        match segment {
            RawSegment::Text(text) => content.push(ContentBlock::Text(text)),
            RawSegment::Image(source) => {
                if let Some(name) = images.store(role, &source).await {
                    content.push(ContentBlock::Image(name));
                }
            }
        }
    }
    content
}
