use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::SetBypassCspParams;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BrowserSection;

use super::error::{BrowserError, BrowserResult};
use super::page::{close_on_error, ChromiumPage, PageSession, PageSessionFactory};
use super::session::{ManagedSession, SessionLauncher};

#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    config: Arc<BrowserSection>,
}

impl BrowserLauncher {
    pub fn new(config: BrowserSection) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    fn build_chromium_config(&self) -> BrowserResult<ChromiumConfig> {
        let [width, height] = self.config.viewport;
        let mut builder = ChromiumConfig::builder()
            .viewport(ChromiumViewport {
                width,
                height,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: width >= height,
                has_touch: false,
            })
            .request_timeout(self.config.default_timeout());

        if let Some(executable) = &self.config.executable_path {
            builder = builder.chrome_executable(executable);
        }
        if !self.config.headless {
            builder = builder.with_head();
        }
        if !self.config.sandbox {
            builder = builder.no_sandbox();
        }

        let mut args = vec![
            format!("--user-agent={}", self.config.user_agent),
            format!("--window-size={width},{height}"),
        ];
        if let Some(accept) = &self.config.accept_language {
            args.push(format!("--accept-lang={accept}"));
        }
        args.extend(self.config.extra_args.iter().cloned());
        builder = builder.args(args);

        builder.build().map_err(BrowserError::Configuration)
    }

    async fn configure_page(&self, page: &Page) -> BrowserResult<()> {
        if self.config.bypass_csp {
            page.execute(SetBypassCspParams::new(true)).await?;
        }
        let mut params_builder =
            SetUserAgentOverrideParams::builder().user_agent(self.config.user_agent.clone());
        if let Some(accept) = &self.config.accept_language {
            params_builder = params_builder.accept_language(accept.clone());
        }
        let params = params_builder
            .build()
            .map_err(BrowserError::Configuration)?;
        page.set_user_agent(params).await?;
        Ok(())
    }

    async fn open_configured_page(&self, browser: &Browser) -> BrowserResult<ChromiumPage> {
        let page = browser.new_page("about:blank").await?;
        let configured = self.configure_page(&page).await;
        close_on_error(ChromiumPage::new(page), configured).await
    }
}

#[async_trait(?Send)]
impl SessionLauncher for BrowserLauncher {
    type Session = BrowserSession;

    async fn launch(&self) -> BrowserResult<BrowserSession> {
        let chromium_config = self.build_chromium_config()?;
        info!(
            ua = %self.config.user_agent,
            width = self.config.viewport[0],
            height = self.config.viewport[1],
            headless = self.config.headless,
            "Launching Chromium instance"
        );

        let (mut browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "Chromium handler reported error");
                }
            }
        });

        match self.open_configured_page(&browser).await {
            Ok(main) => Ok(BrowserSession {
                browser: AsyncMutex::new(browser),
                handler_task: Mutex::new(Some(handler_task)),
                main,
                launcher: self.clone(),
            }),
            Err(err) => {
                warn!(error = %err, "page setup failed, closing half-initialized browser");
                if let Err(close_err) = browser.close().await {
                    warn!(error = %close_err, "Failed to close browser after setup failure");
                }
                handler_task.abort();
                Err(BrowserError::Launch(err.to_string()))
            }
        }
    }
}

pub struct BrowserSession {
    browser: AsyncMutex<Browser>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
    main: ChromiumPage,
    launcher: BrowserLauncher,
}

#[async_trait(?Send)]
impl PageSessionFactory for BrowserSession {
    async fn open(&self) -> BrowserResult<Box<dyn PageSession>> {
        let browser = self.browser.lock().await;
        let page = self.launcher.open_configured_page(&browser).await?;
        Ok(Box::new(page))
    }
}

#[async_trait(?Send)]
impl ManagedSession for BrowserSession {
    fn main_page(&self) -> &dyn PageSession {
        &self.main
    }

    fn pages(&self) -> &dyn PageSessionFactory {
        self
    }

    async fn shutdown(&self) -> BrowserResult<()> {
        info!("Shutting down Chromium instance");
        {
            let mut browser = self.browser.lock().await;
            if let Err(err) = browser.close().await {
                warn!(error = %err, "Failed to close browser gracefully");
            }
        }
        let handle = self
            .handler_task
            .lock()
            .map_err(|_| BrowserError::Unexpected("handler task lock poisoned".into()))?
            .take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(error = %err, "Browser handler join error");
            }
        }
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Ok(guard) = self.handler_task.lock() {
            if let Some(handle) = guard.as_ref() {
                if !handle.is_finished() {
                    warn!("BrowserSession dropped without explicit shutdown");
                }
            }
        }
    }
}
