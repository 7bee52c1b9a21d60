use std::path::Path;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::page::ReloadParams;
use chromiumoxide::page::Page;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::error::{BrowserError, BrowserResult};

/// The DOM operations navigation and extraction need from a live tab.
///
/// Every query is expressed in terms of CSS selectors so the state machines
/// can be driven by a scripted double in tests.
#[async_trait(?Send)]
pub trait PageSession {
    async fn goto(&self, url: &str) -> BrowserResult<()>;
    async fn reload(&self) -> BrowserResult<()>;
    async fn count(&self, selector: &str) -> BrowserResult<usize>;
    /// Clicks the `index`-th element matching `selector` in document order.
    async fn click_nth(&self, selector: &str, index: usize) -> BrowserResult<()>;
    /// Tags every current match of `selector` and returns one selector per
    /// element, in document order. Each keeps addressing its element after
    /// the element stops matching `selector`.
    async fn pin_all(&self, selector: &str) -> BrowserResult<Vec<String>>;
    async fn texts(&self, selector: &str) -> BrowserResult<Vec<String>>;
    async fn attribute_values(&self, selector: &str, attribute: &str)
        -> BrowserResult<Vec<String>>;
    /// Resolved `href` of every anchor matching `selector`.
    async fn link_targets(&self, selector: &str) -> BrowserResult<Vec<String>>;
    /// True when the first match exists and is not disabled.
    async fn is_enabled(&self, selector: &str) -> BrowserResult<bool>;
    /// True when the first match exists and is still connected to the document.
    async fn is_attached(&self, selector: &str) -> BrowserResult<bool>;
    async fn evaluate(&self, script: &str) -> BrowserResult<Value>;
    /// Redirects downloads triggered from this page into `directory`.
    async fn capture_downloads(&self, directory: &Path) -> BrowserResult<()>;
    async fn release_downloads(&self) -> BrowserResult<()>;
    async fn close(&self) -> BrowserResult<()>;
}

#[async_trait(?Send)]
pub trait PageSessionFactory {
    async fn open(&self) -> BrowserResult<Box<dyn PageSession>>;
}

/// Deserializes the result of `script` into `T`.
pub async fn evaluate_as<T: DeserializeOwned>(
    page: &dyn PageSession,
    script: &str,
) -> BrowserResult<T> {
    let value = page.evaluate(script).await?;
    serde_json::from_value(value)
        .map_err(|err| BrowserError::Extraction(format!("failed to decode payload: {err}")))
}

/// Hands back `page` when `setup` succeeded; otherwise closes it and
/// returns the setup error.
pub async fn close_on_error<P: PageSession>(
    page: P,
    setup: BrowserResult<()>,
) -> BrowserResult<P> {
    match setup {
        Ok(()) => Ok(page),
        Err(err) => {
            if let Err(close_err) = page.close().await {
                warn!(error = %close_err, "failed to close page after setup failure");
            }
            Err(err)
        }
    }
}

const PIN_ATTRIBUTE: &str = "data-harvest-pin";

/// `Browser.setDownloadBehavior`: allow into `directory`, or restore the
/// default when `None`.
fn download_behavior(directory: Option<&Path>) -> BrowserResult<SetDownloadBehaviorParams> {
    let builder = SetDownloadBehaviorParams::builder();
    let builder = match directory {
        Some(dir) => builder
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(dir.to_string_lossy().to_string()),
        None => builder.behavior(SetDownloadBehaviorBehavior::Default),
    };
    builder.build().map_err(BrowserError::Configuration)
}

#[derive(Debug, Clone)]
pub struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn eval_value<T: DeserializeOwned>(&self, script: &str) -> BrowserResult<T> {
        self.page
            .evaluate(script)
            .await?
            .into_value()
            .map_err(|err| {
                BrowserError::Extraction(format!("failed to decode script result: {err}"))
            })
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[async_trait(?Send)]
impl PageSession for ChromiumPage {
    async fn goto(&self, url: &str) -> BrowserResult<()> {
        debug!(url, "navigating");
        self.page
            .goto(url)
            .await
            .map_err(|err| BrowserError::Navigation(format!("{url}: {err}")))?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    async fn reload(&self) -> BrowserResult<()> {
        self.page.execute(ReloadParams::default()).await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    async fn count(&self, selector: &str) -> BrowserResult<usize> {
        let script = format!(
            "document.querySelectorAll({}).length",
            js_string(selector)
        );
        self.eval_value(&script).await
    }

    async fn click_nth(&self, selector: &str, index: usize) -> BrowserResult<()> {
        let elements = self.page.find_elements(selector).await.map_err(|err| {
            BrowserError::Interaction(format!("lookup of {selector} failed: {err}"))
        })?;
        let element = elements.get(index).ok_or_else(|| {
            BrowserError::Interaction(format!(
                "{selector}[{index}] not present ({} matches)",
                elements.len()
            ))
        })?;
        element
            .click()
            .await
            .map_err(|err| {
                BrowserError::Interaction(format!("click on {selector}[{index}]: {err}"))
            })?;
        Ok(())
    }

    async fn pin_all(&self, selector: &str) -> BrowserResult<Vec<String>> {
        let script = format!(
            "Array.from(document.querySelectorAll({sel})).map(el => {{ \
               if (!el.hasAttribute({attr})) {{ \
                 window.__harvestPins = (window.__harvestPins || 0) + 1; \
                 el.setAttribute({attr}, String(window.__harvestPins)); \
               }} \
               return el.getAttribute({attr}); \
             }})",
            sel = js_string(selector),
            attr = js_string(PIN_ATTRIBUTE)
        );
        let pins: Vec<String> = self.eval_value(&script).await?;
        Ok(pins
            .into_iter()
            .map(|pin| format!("[{}=\"{}\"]", PIN_ATTRIBUTE, pin))
            .collect())
    }

    async fn texts(&self, selector: &str) -> BrowserResult<Vec<String>> {
        let script = format!(
            "Array.from(document.querySelectorAll({})).map(el => (el.textContent || '').trim())",
            js_string(selector)
        );
        self.eval_value(&script).await
    }

    async fn attribute_values(
        &self,
        selector: &str,
        attribute: &str,
    ) -> BrowserResult<Vec<String>> {
        let script = format!(
            "Array.from(document.querySelectorAll({})) \
               .map(el => el.getAttribute({})).filter(Boolean)",
            js_string(selector),
            js_string(attribute)
        );
        self.eval_value(&script).await
    }

    async fn link_targets(&self, selector: &str) -> BrowserResult<Vec<String>> {
        let script = format!(
            "Array.from(document.querySelectorAll({})).map(el => el.href || '').filter(Boolean)",
            js_string(selector)
        );
        self.eval_value(&script).await
    }

    async fn is_enabled(&self, selector: &str) -> BrowserResult<bool> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); return !!el && !el.disabled; }})()",
            js_string(selector)
        );
        self.eval_value(&script).await
    }

    async fn is_attached(&self, selector: &str) -> BrowserResult<bool> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); return !!el && el.isConnected; }})()",
            js_string(selector)
        );
        self.eval_value(&script).await
    }

    async fn evaluate(&self, script: &str) -> BrowserResult<Value> {
        self.eval_value(script).await
    }

    async fn capture_downloads(&self, directory: &Path) -> BrowserResult<()> {
        self.page.execute(download_behavior(Some(directory))?).await?;
        debug!(directory = %directory.display(), "download capture enabled");
        Ok(())
    }

    async fn release_downloads(&self) -> BrowserResult<()> {
        self.page.execute(download_behavior(None)?).await?;
        debug!("download capture released");
        Ok(())
    }

    async fn close(&self) -> BrowserResult<()> {
        self.page.clone().close().await?;
        Ok(())
    }
}
