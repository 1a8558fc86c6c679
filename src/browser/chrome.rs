//! Chromium session lifecycle and the production [`BrowserPage`].
//!
//! [`ChromeSession`] owns the browser process for exactly one run. Callers
//! drive it through [`ChromeSession::page`] and then call
//! [`ChromeSession::close`] with the outcome already captured, so the browser
//! is shut down on success and on every early error return alike. If the
//! session is dropped without `close` (a panic, or the run future being
//! cancelled) the `Drop` impl spawns the shutdown on the runtime captured at
//! launch.

use super::diagnostics::{Snapshot, summarize_view};
use super::locator::Locator;
use super::{BrowserPage, Readiness};
use crate::config::BrowserSettings;
use crate::error::BrowserError;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::element::Element;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};

/// How often a pending lookup re-queries the DOM.
const LOOKUP_POLL: Duration = Duration::from_millis(250);

const HIDE_WEBDRIVER: &str =
    "Object.defineProperty(navigator, 'webdriver', {get: () => undefined});";

const IS_CLICKABLE: &str = "function() {
    const r = this.getBoundingClientRect();
    const s = window.getComputedStyle(this);
    return !this.disabled && r.width > 0 && r.height > 0
        && s.visibility !== 'hidden' && s.display !== 'none';
}";

const IS_DISPLAYED: &str = "function() {
    const r = this.getBoundingClientRect();
    const s = window.getComputedStyle(this);
    return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none';
}";

const CLEAR_VALUE: &str = "function() {
    this.value = '';
    this.dispatchEvent(new Event('input', { bubbles: true }));
}";

const SCROLL_AND_CLICK: &str = "function() {
    this.scrollIntoView({ block: 'center' });
    this.click();
}";

/// One Chromium process plus the single page the pipeline drives.
pub struct ChromeSession {
    browser: Option<Browser>,
    page: ChromePage,
    handler: JoinHandle<()>,
    runtime_handle: tokio::runtime::Handle,
}

impl ChromeSession {
    /// Launch Chromium with downloads routed into `downloads_dir`.
    #[instrument(level = "info", skip_all, fields(headless = settings.headless))]
    pub async fn launch(
        settings: &BrowserSettings,
        downloads_dir: &Path,
    ) -> Result<Self, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1920, 1080)
            .args([
                "--disable-dev-shm-usage",
                "--disable-gpu",
                "--disable-extensions",
                "--disable-plugins",
                "--disable-blink-features=AutomationControlled",
            ]);
        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(exe) = &settings.chrome_executable {
            builder = builder.chrome_executable(exe);
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (mut browser, mut handler) = Browser::launch(config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler event error");
                }
            }
        });

        match Self::prepare(&browser, settings, downloads_dir).await {
            Ok(page) => {
                info!(downloads_dir = %downloads_dir.display(), "Browser session started");
                Ok(Self {
                    browser: Some(browser),
                    page: ChromePage { page },
                    handler,
                    runtime_handle: tokio::runtime::Handle::current(),
                })
            }
            Err(e) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler.abort();
                Err(e)
            }
        }
    }

    async fn prepare(
        browser: &Browser,
        settings: &BrowserSettings,
        downloads_dir: &Path,
    ) -> Result<Page, BrowserError> {
        let download_path = tokio::fs::canonicalize(downloads_dir).await?;
        let behavior = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(download_path.to_string_lossy().to_string())
            .build()
            .map_err(BrowserError::Launch)?;
        browser.execute(behavior).await?;

        let page = browser.new_page("about:blank").await?;
        page.set_user_agent(SetUserAgentOverrideParams::new(settings.user_agent.clone()))
            .await?;
        page.evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(
            HIDE_WEBDRIVER,
        ))
        .await?;
        Ok(page)
    }

    pub fn page(&self) -> &ChromePage {
        &self.page
    }

    /// Shut the browser down. Failures are logged, never returned: by the
    /// time this runs the run's outcome is already decided.
    pub async fn close(mut self) {
        if let Some(mut browser) = self.browser.take() {
            info!("Closing browser");
            if let Err(e) = browser.close().await {
                warn!(error = %e, "Browser close command failed");
            }
            if let Err(e) = browser.wait().await {
                warn!(error = %e, "Waiting for browser process failed");
            }
            info!("Browser closed");
        }
        self.handler.abort();
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            warn!("Browser session dropped without close; shutting down in background");
            self.runtime_handle.spawn(async move {
                let _ = browser.close().await;
                let _ = browser.wait().await;
            });
        }
        self.handler.abort();
    }
}

/// [`BrowserPage`] over a chromiumoxide page.
pub struct ChromePage {
    page: Page,
}

impl ChromePage {
    async fn js_bool(element: &Element, function: &str) -> bool {
        match element.call_js_fn(function, false).await {
            Ok(ret) => ret.result.value.and_then(|v| v.as_bool()).unwrap_or(false),
            Err(e) => {
                debug!(error = %e, "Element script failed");
                false
            }
        }
    }
}

impl BrowserPage for ChromePage {
    type Element = Element;

    #[instrument(level = "info", skip(self))]
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn attempt(
        &self,
        locator: &Locator,
        readiness: Readiness,
        timeout: Duration,
    ) -> Option<Element> {
        let xpath = locator.to_xpath();
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(element) = self.page.find_xpath(&xpath).await {
                match readiness {
                    Readiness::Present => return Some(element),
                    Readiness::Clickable => {
                        if Self::js_bool(&element, IS_CLICKABLE).await {
                            return Some(element);
                        }
                    }
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            sleep(LOOKUP_POLL).await;
        }
    }

    async fn find_all(&self, locator: &Locator) -> Vec<Element> {
        self.page
            .find_xpaths(locator.to_xpath())
            .await
            .unwrap_or_default()
    }

    async fn is_displayed(&self, element: &Element) -> bool {
        Self::js_bool(element, IS_DISPLAYED).await
    }

    async fn attribute(&self, element: &Element, name: &str) -> Option<String> {
        // Framework-bound inputs keep their state in the `value` property,
        // not the attribute.
        let function = format!(
            "function() {{ const v = this[{name:?}]; \
             return (v === undefined || v === null) ? this.getAttribute({name:?}) : String(v); }}"
        );
        let ret = element.call_js_fn(function, false).await.ok()?;
        ret.result
            .value
            .and_then(|v| v.as_str().map(str::to_string))
    }

    async fn fill(&self, element: &Element, text: &str) -> Result<(), BrowserError> {
        element
            .focus()
            .await
            .map_err(|e| BrowserError::Interaction(format!("field cannot take focus: {e}")))?;
        element.call_js_fn(CLEAR_VALUE, false).await?;
        element.type_str(text).await?;
        Ok(())
    }

    async fn click(&self, element: &Element) -> Result<(), BrowserError> {
        element.call_js_fn(SCROLL_AND_CLICK, false).await?;
        Ok(())
    }

    async fn snapshot(&self, dir: &Path, label: &str) -> Result<Snapshot, BrowserError> {
        tokio::fs::create_dir_all(dir).await?;
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");

        let png = dir.join(format!("{label}-{stamp}.png"));
        let screenshot = match self
            .page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), &png)
            .await
        {
            Ok(_) => Some(png),
            Err(e) => {
                warn!(error = %e, "Screenshot failed");
                None
            }
        };

        let (html, summary) = match self.page.content().await {
            Ok(content) => {
                let path = dir.join(format!("{label}-{stamp}.html"));
                tokio::fs::write(&path, &content).await?;
                (Some(path), summarize_view(&content))
            }
            Err(e) => {
                warn!(error = %e, "Reading page content failed");
                (None, Default::default())
            }
        };

        Ok(Snapshot {
            screenshot,
            html,
            summary,
        })
    }
}
