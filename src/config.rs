//! Run configuration.
//!
//! A single immutable [`Settings`] value is resolved once in `main` from the
//! CLI/environment, an optional YAML tuning file and built-in defaults (in that
//! order of precedence), then passed by reference into every stage. No stage
//! reads the environment on its own.
//!
//! Required inputs are checked lazily but before any resource is acquired:
//! [`Settings::portal`] before a browser is launched and
//! [`Settings::gemini_api_key`] before the classification gateway is built.
//!
//! # YAML file
//!
//! ```yaml
//! data_dir: /srv/clipping
//! model: gemini-2.0-flash
//! prompt_template: prompts/clipagem.txt
//! timeouts:
//!   login_secs: 15
//!   download_secs: 60
//! delays:
//!   after_submit_millis: 8000
//! browser:
//!   headless: true
//!   chrome_executable: /usr/bin/google-chrome-stable
//! post_login_check: true
//! ```

use crate::api::{CLIPPING_PROMPT, CORPUS_PLACEHOLDER, DEFAULT_API_BASE, DEFAULT_MODEL};
use crate::cli::Cli;
use crate::error::ConfigError;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_PDF_FILENAME: &str = "diario_sm_atual.pdf";
pub const DEFAULT_JSON_FILENAME: &str = "clipagem_hoje.json";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Validated portal access data, only available through [`Settings::portal`].
#[derive(Clone)]
pub struct PortalCredentials {
    pub login_url: Url,
    pub access_url: Url,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for PortalCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalCredentials")
            .field("login_url", &self.login_url.as_str())
            .field("access_url", &self.access_url.as_str())
            .field("username", &crate::utils::mask_secret(&self.username))
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Paths {
    pub data_dir: PathBuf,
    /// Browser download target; wiped at the start of every acquisition.
    pub downloads_dir: PathBuf,
    pub diagnostics_dir: PathBuf,
    pub canonical_pdf: PathBuf,
    pub canonical_json: PathBuf,
    pub lock_file: PathBuf,
}

/// Upper bounds for every blocking wait in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Per-locator wait on the login page.
    pub login: Duration,
    /// Per-locator wait while applying the publication filter.
    pub filter: Duration,
    /// Wait for the PDF icon on the access page.
    pub pdf_icon: Duration,
    pub download: Duration,
    pub download_poll: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            login: Duration::from_secs(15),
            filter: Duration::from_secs(15),
            pdf_icon: Duration::from_secs(20),
            download: Duration::from_secs(30),
            download_poll: Duration::from_secs(1),
        }
    }
}

/// Fixed pauses that give the portal's client-side rendering time to settle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleDelays {
    pub page_load: Duration,
    pub after_submit: Duration,
    pub access_page: Duration,
    pub typing_pause: Duration,
    pub dropdown_open: Duration,
    pub filter_apply: Duration,
    pub click_jitter_min: Duration,
    pub click_jitter_max: Duration,
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self {
            page_load: Duration::from_secs(3),
            after_submit: Duration::from_secs(5),
            access_page: Duration::from_secs(5),
            typing_pause: Duration::from_millis(500),
            dropdown_open: Duration::from_millis(1500),
            filter_apply: Duration::from_secs(3),
            click_jitter_min: Duration::from_secs(2),
            click_jitter_max: Duration::from_secs(5),
        }
    }
}

impl SettleDelays {
    /// All delays zeroed; used by tests that drive fake pages.
    #[cfg(test)]
    pub fn none() -> Self {
        Self {
            page_load: Duration::ZERO,
            after_submit: Duration::ZERO,
            access_page: Duration::ZERO,
            typing_pause: Duration::ZERO,
            dropdown_open: Duration::ZERO,
            filter_apply: Duration::ZERO,
            click_jitter_min: Duration::ZERO,
            click_jitter_max: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub model: String,
    pub api_base_url: String,
    pub prompt_template: String,
}

#[derive(Clone)]
pub struct Settings {
    login_url: Option<String>,
    access_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    gemini_api_key: Option<String>,
    pub paths: Paths,
    pub timeouts: Timeouts,
    pub delays: SettleDelays,
    pub browser: BrowserSettings,
    pub gateway: GatewaySettings,
    pub lock_stale_after: Duration,
    pub post_login_check: bool,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("login_url", &self.login_url)
            .field("access_url", &self.access_url)
            .field("username", &self.username.as_deref().map(crate::utils::mask_secret))
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "***"))
            .field("paths", &self.paths)
            .field("timeouts", &self.timeouts)
            .field("delays", &self.delays)
            .field("browser", &self.browser)
            .field("gateway.model", &self.gateway.model)
            .field("lock_stale_after", &self.lock_stale_after)
            .field("post_login_check", &self.post_login_check)
            .finish()
    }
}

/// Shape of the optional YAML tuning file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub data_dir: Option<PathBuf>,
    pub pdf_filename: Option<String>,
    pub json_filename: Option<String>,
    pub model: Option<String>,
    pub api_base_url: Option<String>,
    pub prompt_template: Option<PathBuf>,
    pub timeouts: FileTimeouts,
    pub delays: FileDelays,
    pub browser: FileBrowser,
    pub lock_stale_after_secs: Option<u64>,
    pub post_login_check: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileTimeouts {
    pub login_secs: Option<u64>,
    pub filter_secs: Option<u64>,
    pub pdf_icon_secs: Option<u64>,
    pub download_secs: Option<u64>,
    pub download_poll_millis: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileDelays {
    pub page_load_millis: Option<u64>,
    pub after_submit_millis: Option<u64>,
    pub access_page_millis: Option<u64>,
    pub typing_pause_millis: Option<u64>,
    pub dropdown_open_millis: Option<u64>,
    pub filter_apply_millis: Option<u64>,
    pub click_jitter_min_millis: Option<u64>,
    pub click_jitter_max_millis: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileBrowser {
    pub headless: Option<bool>,
    pub chrome_executable: Option<PathBuf>,
    pub user_agent: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn secs(value: Option<u64>, default: Duration) -> Duration {
    value.map(Duration::from_secs).unwrap_or(default)
}

fn millis(value: Option<u64>, default: Duration) -> Duration {
    value.map(Duration::from_millis).unwrap_or(default)
}

/// Treat empty strings from the environment the same as absent ones.
fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}

impl Settings {
    /// Build the settings from parsed CLI arguments, reading the YAML file
    /// named by `--config` when present.
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::from_parts(cli, file)
    }

    pub fn from_parts(cli: &Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let data_dir = cli
            .data_dir
            .clone()
            .or(file.data_dir)
            .unwrap_or_else(|| PathBuf::from("data"));
        let pdf_filename = file
            .pdf_filename
            .unwrap_or_else(|| DEFAULT_PDF_FILENAME.to_string());
        let json_filename = file
            .json_filename
            .unwrap_or_else(|| DEFAULT_JSON_FILENAME.to_string());

        let paths = Paths {
            downloads_dir: data_dir.join("downloads"),
            diagnostics_dir: data_dir.join("diagnostics"),
            canonical_pdf: data_dir.join(pdf_filename),
            canonical_json: data_dir.join(json_filename),
            lock_file: data_dir.join(".clipping.lock"),
            data_dir,
        };

        let defaults = Timeouts::default();
        let timeouts = Timeouts {
            login: secs(cli.login_timeout.or(file.timeouts.login_secs), defaults.login),
            filter: secs(cli.filter_timeout.or(file.timeouts.filter_secs), defaults.filter),
            pdf_icon: secs(file.timeouts.pdf_icon_secs, defaults.pdf_icon),
            download: secs(
                cli.download_timeout.or(file.timeouts.download_secs),
                defaults.download,
            ),
            download_poll: millis(file.timeouts.download_poll_millis, defaults.download_poll),
        };

        let d = SettleDelays::default();
        let fd = &file.delays;
        let delays = SettleDelays {
            page_load: millis(fd.page_load_millis, d.page_load),
            after_submit: millis(fd.after_submit_millis, d.after_submit),
            access_page: millis(fd.access_page_millis, d.access_page),
            typing_pause: millis(fd.typing_pause_millis, d.typing_pause),
            dropdown_open: millis(fd.dropdown_open_millis, d.dropdown_open),
            filter_apply: millis(fd.filter_apply_millis, d.filter_apply),
            click_jitter_min: millis(fd.click_jitter_min_millis, d.click_jitter_min),
            click_jitter_max: millis(fd.click_jitter_max_millis, d.click_jitter_max),
        };

        let browser = BrowserSettings {
            headless: !cli.headful && file.browser.headless.unwrap_or(true),
            chrome_executable: file.browser.chrome_executable,
            user_agent: file
                .browser
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        };

        let prompt_template = match &file.prompt_template {
            Some(path) => {
                let template =
                    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                        path: path.clone(),
                        source,
                    })?;
                if !template.contains(CORPUS_PLACEHOLDER) {
                    return Err(ConfigError::Template {
                        path: path.clone(),
                        placeholder: CORPUS_PLACEHOLDER,
                    });
                }
                template
            }
            None => CLIPPING_PROMPT.to_string(),
        };

        let gateway = GatewaySettings {
            model: file.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_base_url: file
                .api_base_url
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            prompt_template,
        };

        Ok(Self {
            login_url: non_empty(cli.login_url.as_ref()),
            access_url: non_empty(cli.access_url.as_ref()),
            username: non_empty(cli.username.as_ref()),
            password: non_empty(cli.password.as_ref()),
            gemini_api_key: non_empty(cli.gemini_api_key.as_ref()),
            paths,
            timeouts,
            delays,
            browser,
            gateway,
            lock_stale_after: secs(file.lock_stale_after_secs, Duration::from_secs(3600)),
            post_login_check: file.post_login_check.unwrap_or(false),
        })
    }

    /// Portal URLs and credentials; every missing one is reported at once.
    pub fn portal(&self) -> Result<PortalCredentials, ConfigError> {
        let mut missing = Vec::new();
        if self.login_url.is_none() {
            missing.push("DIARIO_LOGIN_URL");
        }
        if self.access_url.is_none() {
            missing.push("DIARIO_ACCESS_URL");
        }
        if self.username.is_none() {
            missing.push("DIARIO_USER");
        }
        if self.password.is_none() {
            missing.push("DIARIO_PASS");
        }

        match (&self.login_url, &self.access_url, &self.username, &self.password) {
            (Some(login), Some(access), Some(user), Some(pass)) => Ok(PortalCredentials {
                login_url: Url::parse(login).map_err(|source| ConfigError::InvalidUrl {
                    field: "DIARIO_LOGIN_URL",
                    source,
                })?,
                access_url: Url::parse(access).map_err(|source| ConfigError::InvalidUrl {
                    field: "DIARIO_ACCESS_URL",
                    source,
                })?,
                username: user.clone(),
                password: pass.clone(),
            }),
            _ => Err(ConfigError::Missing(missing)),
        }
    }

    pub fn gemini_api_key(&self) -> Result<&str, ConfigError> {
        self.gemini_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::Missing(vec!["GEMINI_API_KEY"]))
    }

    /// Settings rooted at `data_dir` with zeroed delays and short waits, for
    /// tests that never touch a real browser.
    #[cfg(test)]
    pub fn for_tests(data_dir: &Path) -> Self {
        use clap::Parser;
        let cli = Cli::parse_from([
            "diario_clipping",
            "--data-dir",
            data_dir.to_str().unwrap_or("data"),
        ]);
        let mut settings = Self::from_parts(&cli, FileConfig::default()).unwrap();
        // Ignore whatever the developer's shell exports.
        settings.login_url = None;
        settings.access_url = None;
        settings.username = None;
        settings.password = None;
        settings.gemini_api_key = None;
        settings.delays = SettleDelays::none();
        settings.timeouts = Timeouts {
            login: Duration::from_millis(10),
            filter: Duration::from_millis(10),
            pdf_icon: Duration::from_millis(10),
            download: Duration::from_millis(200),
            download_poll: Duration::from_millis(10),
        };
        settings
    }
}
