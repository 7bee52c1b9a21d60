use std::cell::Cell;
use std::time::Duration;

use tracing::{debug, warn};

use crate::browser::{settle, wait_until, BrowserResult, PageSession};

/// Clicks that must leave the page in a ready state. A failed click reloads
/// the page and is reported to the caller, who carries on.
pub struct ClickGate<'a> {
    ready_selector: &'a str,
    timeout: Duration,
    interval: Duration,
    settle_ms: u64,
    reloaded: Cell<bool>,
}

impl<'a> ClickGate<'a> {
    pub fn new(
        ready_selector: &'a str,
        timeout: Duration,
        interval: Duration,
        settle_ms: u64,
    ) -> Self {
        Self {
            ready_selector,
            timeout,
            interval,
            settle_ms,
            reloaded: Cell::new(false),
        }
    }

    /// Returns `true` when the click landed and the ready control came back.
    pub async fn click(&self, page: &dyn PageSession, selector: &str, index: usize) -> bool {
        settle(self.settle_ms).await;
        match self.click_and_wait(page, selector, index).await {
            Ok(()) => true,
            Err(err) => {
                warn!(selector, index, error = %err, "click failed, reloading page");
                if let Err(reload_err) = page.reload().await {
                    warn!(error = %reload_err, "page reload failed");
                }
                self.reloaded.set(true);
                false
            }
        }
    }

    /// Clicks every element matching `selector` when called, even those a
    /// click takes out of the match set. Stops at the first failed click,
    /// since that reloaded the page. Returns how many succeeded.
    pub async fn click_all(&self, page: &dyn PageSession, selector: &str) -> usize {
        let targets = match page.pin_all(selector).await {
            Ok(targets) => targets,
            Err(err) => {
                debug!(selector, error = %err, "could not resolve click targets");
                return 0;
            }
        };
        let mut clicked = 0;
        for target in &targets {
            if !self.click(page, target, 0).await {
                debug!(
                    selector,
                    clicked,
                    remaining = targets.len() - clicked,
                    "click sequence cut short"
                );
                break;
            }
            clicked += 1;
        }
        clicked
    }

    /// Whether a click reloaded the page since the flag was last taken.
    pub fn reloaded(&self) -> bool {
        self.reloaded.get()
    }

    /// Reports, then clears, whether any click since the last call reloaded
    /// the page.
    pub fn take_reloaded(&self) -> bool {
        self.reloaded.replace(false)
    }

    async fn click_and_wait(
        &self,
        page: &dyn PageSession,
        selector: &str,
        index: usize,
    ) -> BrowserResult<()> {
        page.click_nth(selector, index).await?;
        let ready = self.ready_selector;
        wait_until("page ready", self.timeout, self.interval, || page.is_enabled(ready)).await
    }
}

/// True when at least one element matches `selector`.
pub async fn is_present(page: &dyn PageSession, selector: &str) -> BrowserResult<bool> {
    Ok(page.count(selector).await? > 0)
}
