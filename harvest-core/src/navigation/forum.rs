use std::collections::HashSet;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::browser::{settle, wait_until, BrowserResult, PageSession, PageSessionFactory};
use crate::context::HarvestContext;
use crate::extract::{ExtractResult, PostExtractor, PostNamer, PostSummary, PostVariant};

use super::gate::is_present;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ForumReport {
    pub categories_visited: usize,
    pub categories_skipped: Vec<CategoryFailure>,
    pub load_more_clicks: usize,
    pub articles_extracted: usize,
    pub topics_extracted: usize,
    pub failed_posts: Vec<PostFailure>,
    pub images_written: usize,
    pub images_abandoned: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryFailure {
    pub category: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostFailure {
    pub link: String,
    pub error: String,
}

impl ForumReport {
    fn record_post(&mut self, variant: PostVariant, summary: &PostSummary) {
        match variant {
            PostVariant::Article => self.articles_extracted += 1,
            PostVariant::Question => self.topics_extracted += 1,
        }
        self.images_written += summary.images.written;
        self.images_abandoned += summary.images.abandoned;
    }
}

/// Randomized pause between consecutive post visits.
struct Politeness {
    range: [u64; 2],
    visits: usize,
}

impl Politeness {
    fn new(range: [u64; 2]) -> Self {
        Self { range, visits: 0 }
    }

    async fn before_visit(&mut self) {
        self.visits += 1;
        if self.visits == 1 || (self.range[0] == 0 && self.range[1] == 0) {
            return;
        }
        let lower = self.range[0].min(self.range[1]);
        let upper = self.range[0].max(self.range[1]);
        let delay = rand::thread_rng().gen_range(lower..=upper);
        debug!(delay_ms = delay, "politeness delay");
        sleep(Duration::from_millis(delay)).await;
    }
}

/// Visits category knowledge articles and community questions.
pub struct ForumTraversal<'a> {
    ctx: &'a HarvestContext,
    extractor: PostExtractor<'a>,
}

impl<'a> ForumTraversal<'a> {
    pub fn new(ctx: &'a HarvestContext) -> Self {
        Self {
            ctx,
            extractor: PostExtractor::new(ctx),
        }
    }

    /// Opens a fresh tab per category. A category whose tile or article list
    /// never shows up is skipped.
    pub async fn run_categories(&self, pages: &dyn PageSessionFactory, report: &mut ForumReport) {
        let forum = &self.ctx.config.forum;
        let mut politeness = Politeness::new(forum.politeness_delay_ms);
        for category in &forum.categories {
            let page = match pages.open().await {
                Ok(page) => page,
                Err(err) => {
                    warn!(category = %category, error = %err, "could not open page for category");
                    report.categories_skipped.push(CategoryFailure {
                        category: category.clone(),
                        error: err.to_string(),
                    });
                    continue;
                }
            };
            let visited = self
                .visit_category(page.as_ref(), category, &mut politeness, report)
                .await;
            if let Err(err) = page.close().await {
                warn!(category = %category, error = %err, "failed to close category page");
            }
            match visited {
                Ok(articles) => {
                    info!(category = %category, articles, "category visited");
                    report.categories_visited += 1;
                }
                Err(err) => {
                    warn!(
                        category = %category,
                        timed_out = err.is_timeout(),
                        error = %err,
                        "category skipped"
                    );
                    report.categories_skipped.push(CategoryFailure {
                        category: category.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
    }

    async fn visit_category(
        &self,
        page: &dyn PageSession,
        category: &str,
        politeness: &mut Politeness,
        report: &mut ForumReport,
    ) -> BrowserResult<usize> {
        let forum = &self.ctx.config.forum;
        page.goto(&forum.category_url).await?;

        let tile = forum.tile_selector(category);
        let tile = tile.as_str();
        wait_until("category tile", forum.wait_timeout(), forum.poll_interval(), || {
            is_present(page, tile)
        })
        .await?;
        page.click_nth(tile, 0).await?;

        let list = forum.article_list_selector.as_str();
        wait_until("article list", forum.wait_timeout(), forum.poll_interval(), || {
            is_present(page, list)
        })
        .await?;
        let ids = unique(page.attribute_values(list, &forum.article_id_attribute).await?);
        debug!(category, articles = ids.len(), "article ids collected");

        let mut namer = PostNamer::articles();
        for id in &ids {
            let link = forum.article_url(id);
            let name = namer.name_for(&link);
            politeness.before_visit().await;
            self.visit_post(page, &link, &name, PostVariant::Article, report)
                .await;
        }
        Ok(ids.len())
    }

    /// Expands the paginated question list, then extracts every question.
    pub async fn run_topics(
        &self,
        page: &dyn PageSession,
        report: &mut ForumReport,
    ) -> BrowserResult<()> {
        let forum = &self.ctx.config.forum;
        page.goto(&forum.topic_url).await?;
        report.load_more_clicks += self.expand_listing(page).await;

        let links = unique(page.link_targets(&forum.topic_link_selector).await?);
        info!(topics = links.len(), "topic links collected");

        let mut namer = PostNamer::questions();
        let mut politeness = Politeness::new(forum.politeness_delay_ms);
        for link in &links {
            let name = namer.name_for(link);
            politeness.before_visit().await;
            self.visit_post(page, link, &name, PostVariant::Question, report)
                .await;
        }
        Ok(())
    }

    /// Clicks "load more" until it is gone, detached, or stops appearing in
    /// time. Returns the number of clicks.
    async fn expand_listing(&self, page: &dyn PageSession) -> usize {
        let forum = &self.ctx.config.forum;
        let control = forum.load_more_selector.as_str();
        let mut clicks = 0usize;
        loop {
            if clicks >= forum.max_load_more {
                warn!(clicks, "load-more ceiling reached");
                break;
            }
            let attached = wait_until(
                "load-more control",
                forum.wait_timeout(),
                forum.poll_interval(),
                || page.is_attached(control),
            )
            .await;
            if let Err(err) = attached {
                debug!(clicks, error = %err, "load-more control gone");
                break;
            }
            if let Err(err) = page.click_nth(control, 0).await {
                debug!(clicks, error = %err, "load-more control detached before click");
                break;
            }
            clicks += 1;
            settle(forum.load_more_settle_ms).await;
        }
        info!(clicks, "topic listing expanded");
        clicks
    }

    async fn visit_post(
        &self,
        page: &dyn PageSession,
        link: &str,
        name: &str,
        variant: PostVariant,
        report: &mut ForumReport,
    ) {
        match self.extract_post(page, link, name, variant).await {
            Ok(summary) => report.record_post(variant, &summary),
            Err(err) => {
                warn!(link, error = %err, "post extraction failed");
                report.failed_posts.push(PostFailure {
                    link: link.to_string(),
                    error: err.to_string(),
                });
            }
        }
    }

    async fn extract_post(
        &self,
        page: &dyn PageSession,
        link: &str,
        name: &str,
        variant: PostVariant,
    ) -> ExtractResult<PostSummary> {
        let forum = &self.ctx.config.forum;
        page.goto(link).await?;
        let title = forum.selectors.title.as_str();
        if let Err(err) = wait_until("post title", forum.wait_timeout(), forum.poll_interval(), || {
            is_present(page, title)
        })
        .await
        {
            debug!(link, error = %err, "post title never appeared, extracting what is there");
        }
        self.extractor.extract(page, link, name, variant).await
    }
}

/// Drops repeats while keeping first-seen order.
fn unique(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(value.clone()))
        .collect()
}
