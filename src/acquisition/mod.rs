//! Edition acquisition: portal login, publication filter, PDF download.
//!
//! [`acquire_edition`] owns one browser session from launch to close and
//! returns the canonical PDF path. The browser is closed on every exit path
//! before the result is returned, including early navigation failures.
//!
//! # Submodules
//!
//! - [`login`]: the portal login state machine
//! - [`filter`]: the best-effort "Public. Legal" filter
//! - [`download`]: staging directory, completion watcher and normalizer

pub mod download;
pub mod filter;
pub mod login;

use crate::browser::chrome::ChromeSession;
use crate::browser::diagnostics::log_summary;
use crate::browser::locator::{Attr, Locator, locate_clickable};
use crate::browser::BrowserPage;
use crate::config::{PortalCredentials, Settings, SettleDelays};
use crate::error::{PipelineError, Result};
use crate::utils::mask_secret;
use download::{DownloadDir, clear_staging, normalize_artifact, wait_for_download};
use filter::{FilterOutcome, FilterSelector};
use login::LoginController;
use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// CSS class of the Material Design icon the portal uses for "download PDF".
pub const PDF_ICON_CLASS: &str = "mdi-file-pdf-box";

/// Fixed wait for client-side rendering. Zero means no wait.
pub(crate) async fn settle(delay: Duration) {
    if !delay.is_zero() {
        sleep(delay).await;
    }
}

/// Random pause before a click, bounded by the configured jitter window.
pub(crate) async fn human_pause(delays: &SettleDelays) {
    let min = delays.click_jitter_min.as_millis() as u64;
    let max = delays.click_jitter_max.as_millis() as u64;
    if max == 0 {
        return;
    }
    let millis = if max > min {
        rand::rng().random_range(min..=max)
    } else {
        max
    };
    debug!(millis, "Pausing before click");
    sleep(Duration::from_millis(millis)).await;
}

/// Capture a snapshot labelled `label` and build the `Navigation` error for
/// `stage`. A failed capture is logged and leaves the error without a path.
pub(crate) async fn navigation_failure<P: BrowserPage>(
    page: &P,
    settings: &Settings,
    stage: &'static str,
    label: &str,
    reason: String,
) -> PipelineError {
    warn!(stage, %reason, "Navigation failed");
    let snapshot = match page.snapshot(&settings.paths.diagnostics_dir, label).await {
        Ok(snapshot) => {
            log_summary(label, &snapshot);
            snapshot.primary_path()
        }
        Err(e) => {
            warn!(error = %e, "Could not capture diagnostic snapshot");
            None
        }
    };
    PipelineError::Navigation {
        stage,
        reason,
        snapshot,
    }
}

/// Download trigger strategies on the access page.
pub fn pdf_icon_locators() -> Vec<Locator> {
    let icon = || vec![Attr::contains("class", PDF_ICON_CLASS)];
    vec![
        Locator::attrs("*", icon()),
        Locator::attrs("*", icon()).ancestor("button", vec![]),
        Locator::attrs("*", icon()).ancestor("a", vec![]),
    ]
}

fn log_environment(settings: &Settings, credentials: &PortalCredentials) {
    let chrome_exists = settings
        .browser
        .chrome_executable
        .as_deref()
        .map(|exe| exe.exists());
    info!(
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        data_dir = %settings.paths.data_dir.display(),
        login_host = credentials.login_url.host_str().unwrap_or("-"),
        access_host = credentials.access_url.host_str().unwrap_or("-"),
        user = %mask_secret(&credentials.username),
        password_set = !credentials.password.is_empty(),
        headless = settings.browser.headless,
        chrome = ?settings.browser.chrome_executable,
        ?chrome_exists,
        downloads_dir = %settings.paths.downloads_dir.display(),
        "Acquisition environment"
    );
}

/// Log in, open the edition listing, apply the filter and click the PDF
/// icon. Returns how the filter step ended.
#[instrument(level = "info", skip_all)]
pub async fn trigger_download<P: BrowserPage>(
    page: &P,
    credentials: &PortalCredentials,
    settings: &Settings,
) -> Result<FilterOutcome> {
    let mut login = LoginController::new(page, credentials, settings);
    login.authenticate().await?;
    debug!(state = ?login.state(), "Login stage finished");

    if let Err(e) = page.goto(credentials.access_url.as_str()).await {
        let reason = format!("could not open access page: {e}");
        return Err(navigation_failure(page, settings, "access", "access_error", reason).await);
    }
    settle(settings.delays.access_page).await;
    info!(url = %credentials.access_url, "Access page loaded");

    let mut selector = FilterSelector::new(page, settings);
    let outcome = selector.apply().await;
    debug!(state = ?selector.state(), "Filter stage finished");

    let Some(icon) = locate_clickable(page, &pdf_icon_locators(), settings.timeouts.pdf_icon).await
    else {
        let reason = "PDF download icon not found".to_string();
        return Err(navigation_failure(page, settings, "download", "download_error", reason).await);
    };
    human_pause(&settings.delays).await;
    if let Err(e) = page.click(&icon).await {
        let reason = format!("could not click PDF icon: {e}");
        return Err(navigation_failure(page, settings, "download", "download_error", reason).await);
    }
    info!("PDF download started");
    Ok(outcome)
}

/// Run the whole browser side of the pipeline and return the canonical PDF.
#[instrument(level = "info", skip_all)]
pub async fn acquire_edition(settings: &Settings) -> Result<PathBuf> {
    let credentials = settings.portal()?;
    log_environment(settings, &credentials);

    let staging = &settings.paths.downloads_dir;
    clear_staging(staging).await?;

    let session = ChromeSession::launch(&settings.browser, staging).await?;
    let downloaded = async {
        let outcome = trigger_download(session.page(), &credentials, settings).await?;
        if let FilterOutcome::Skipped { reason, .. } = &outcome {
            info!(%reason, "Downloading unfiltered listing's edition");
        }
        let probe = DownloadDir::new(staging.clone());
        wait_for_download(
            &probe,
            settings.timeouts.download,
            settings.timeouts.download_poll,
        )
        .await
    }
    .await;
    session.close().await;

    let downloaded = downloaded?;
    normalize_artifact(&downloaded, &settings.paths.canonical_pdf).await?;
    Ok(settings.paths.canonical_pdf.clone())
}
