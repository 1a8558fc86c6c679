//! Command-line interface definitions for Diario Clipping.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Portal credentials and the Gemini key are normally supplied through the
//! environment; tuning values can come from flags or a YAML config file.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the Diario Clipping application.
///
/// # Examples
///
/// ```sh
/// # Full daily run (download, extract, classify, persist)
/// diario_clipping run
///
/// # Only fetch today's PDF edition
/// diario_clipping --data-dir /srv/clipping acquire
///
/// # Re-classify the PDF already on disk with a tuned config
/// diario_clipping -c clipping.yaml analyze
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML tuning file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the canonical PDF and JSON artifacts
    #[arg(short, long, env = "CLIPPING_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Portal login page URL
    #[arg(long, env = "DIARIO_LOGIN_URL", global = true)]
    pub login_url: Option<String>,

    /// Portal page listing the editions
    #[arg(long, env = "DIARIO_ACCESS_URL", global = true)]
    pub access_url: Option<String>,

    /// Portal username (e-mail)
    #[arg(long, env = "DIARIO_USER", global = true)]
    pub username: Option<String>,

    /// Portal password
    #[arg(long, env = "DIARIO_PASS", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// Google Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    pub gemini_api_key: Option<String>,

    /// Per-locator wait on the login page, in seconds
    #[arg(long, env = "CLIPPING_LOGIN_TIMEOUT", global = true)]
    pub login_timeout: Option<u64>,

    /// Per-locator wait while applying the publication filter, in seconds
    #[arg(long, env = "CLIPPING_FILTER_TIMEOUT", global = true)]
    pub filter_timeout: Option<u64>,

    /// Time budget for the PDF download to finish, in seconds
    #[arg(long, env = "CLIPPING_DOWNLOAD_TIMEOUT", global = true)]
    pub download_timeout: Option<u64>,

    /// Show the browser window instead of running headless
    #[arg(long, global = true)]
    pub headful: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Download today's edition, then extract, classify and persist it (default)
    Run,
    /// Only log in and download today's edition to the canonical PDF path
    Acquire,
    /// Only extract, classify and persist the canonical PDF already on disk
    Analyze,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_run() {
        let cli = Cli::parse_from(["diario_clipping"]);
        assert_eq!(cli.command(), Command::Run);
        assert!(!cli.headful);
    }

    #[test]
    fn test_cli_subcommand_and_global_flags() {
        let cli = Cli::parse_from([
            "diario_clipping",
            "analyze",
            "--data-dir",
            "/tmp/clipping",
            "--download-timeout",
            "45",
        ]);

        assert_eq!(cli.command(), Command::Analyze);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/clipping")));
        assert_eq!(cli.download_timeout, Some(45));
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from(["diario_clipping", "-c", "clipping.yaml", "acquire", "--headful"]);

        assert_eq!(cli.config, Some(PathBuf::from("clipping.yaml")));
        assert_eq!(cli.command(), Command::Acquire);
        assert!(cli.headful);
    }
}
