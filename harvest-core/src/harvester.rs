use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::browser::{BrowserError, ManagedSession, RetryPolicy, SessionLauncher, SessionManager};
use crate::context::HarvestContext;
use crate::navigation::{DocumentSweep, ForumReport, ForumTraversal, SweepReport};

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
    #[error("harvest failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: usize,
        last: Box<HarvestError>,
    },
}

pub type HarvestResult<T> = Result<T, HarvestError>;

/// Which phases a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunPlan {
    pub documents: bool,
    pub forum_categories: bool,
    pub forum_topics: bool,
}

impl Default for RunPlan {
    fn default() -> Self {
        Self {
            documents: true,
            forum_categories: true,
            forum_topics: true,
        }
    }
}

impl RunPlan {
    pub fn documents_only() -> Self {
        Self {
            documents: true,
            forum_categories: false,
            forum_topics: false,
        }
    }

    pub fn forum(categories: bool, topics: bool) -> Self {
        Self {
            documents: false,
            forum_categories: categories,
            forum_topics: topics,
        }
    }

    fn wants_forum(&self) -> bool {
        self.forum_categories || self.forum_topics
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub attempts: usize,
    pub plan: RunPlan,
    pub documents: Option<SweepReport>,
    pub forum: Option<ForumReport>,
}

struct PhaseReports {
    documents: Option<SweepReport>,
    forum: Option<ForumReport>,
}

/// Drives one whole harvest: a fresh browser per attempt, the enabled
/// phases in order, teardown on every exit path.
pub struct Harvester<L: SessionLauncher> {
    context: HarvestContext,
    sessions: SessionManager<L>,
    retry: RetryPolicy,
    plan: RunPlan,
}

impl<L: SessionLauncher> Harvester<L> {
    pub fn new(context: HarvestContext, launcher: L) -> Self {
        let retry = RetryPolicy::new(context.config.run.max_attempts);
        Self {
            context,
            sessions: SessionManager::new(launcher),
            retry,
            plan: RunPlan::default(),
        }
    }

    pub fn with_plan(mut self, plan: RunPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn context(&self) -> &HarvestContext {
        &self.context
    }

    pub fn sessions(&self) -> &SessionManager<L> {
        &self.sessions
    }

    pub async fn run(&self) -> HarvestResult<RunReport> {
        let started_at = Utc::now();
        info!(plan = ?self.plan, max_attempts = self.retry.max_attempts(), "harvest starting");
        let outcome = self
            .retry
            .run("harvest run", |attempt| self.run_once(attempt))
            .await;
        match outcome {
            Ok(outcome) => {
                let report = RunReport {
                    started_at,
                    finished_at: Utc::now(),
                    attempts: outcome.attempts,
                    plan: self.plan,
                    documents: outcome.result.documents,
                    forum: outcome.result.forum,
                };
                info!(attempts = report.attempts, "harvest finished");
                Ok(report)
            }
            Err(exhausted) => {
                if let Err(err) = self.sessions.destroy().await {
                    warn!(error = %err, "teardown after final failure did not complete");
                }
                Err(HarvestError::RetriesExhausted {
                    attempts: exhausted.attempts,
                    last: Box::new(exhausted.last_error),
                })
            }
        }
    }

    async fn run_once(&self, attempt: usize) -> HarvestResult<PhaseReports> {
        info!(attempt = attempt + 1, "harvest attempt");
        let result = self.run_phases().await;
        let teardown = self.sessions.destroy().await;
        let reports = result?;
        teardown?;
        Ok(reports)
    }

    async fn run_phases(&self) -> HarvestResult<PhaseReports> {
        let session = self.sessions.acquire().await?;

        let documents = if self.plan.documents {
            let sweep = DocumentSweep::new(&self.context);
            Some(sweep.run(session.main_page()).await?)
        } else {
            None
        };

        let forum = if self.plan.wants_forum() {
            let traversal = ForumTraversal::new(&self.context);
            let mut report = ForumReport::default();
            if self.plan.forum_categories {
                traversal.run_categories(session.pages(), &mut report).await;
            }
            if self.plan.forum_topics {
                traversal.run_topics(session.main_page(), &mut report).await?;
            }
            Some(report)
        } else {
            None
        };

        Ok(PhaseReports { documents, forum })
    }
}
