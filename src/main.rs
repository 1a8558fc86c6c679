//! # Diário Clipping
//!
//! A daily press-clipping pipeline for the Santa Maria city hall. It logs in
//! to the Diário de Santa Maria subscriber portal with a headless Chromium,
//! downloads today's journalistic edition as a PDF, extracts its text page by
//! page, and asks Gemini to select the stories relevant to the city
//! administration. The result is written as a single JSON document that a
//! separate presentation layer serves alongside the PDF.
//!
//! ## Usage
//!
//! ```sh
//! export DIARIO_LOGIN_URL=... DIARIO_ACCESS_URL=... DIARIO_USER=... DIARIO_PASS=...
//! export GEMINI_API_KEY=...
//! diario_clipping -d ./data            # full run
//! diario_clipping -d ./data acquire    # only download the PDF
//! diario_clipping -d ./data analyze    # only re-analyze the PDF on disk
//! ```
//!
//! ## Architecture
//!
//! 1. **Acquisition**: login, publication filter, download, normalize
//! 2. **Extraction**: page-marked text corpus from the PDF
//! 3. **Classification**: one Gemini call with the corpus embedded in a prompt
//! 4. **Validation**: strip code fences, parse and shape-check the JSON
//! 5. **Output**: atomically replace the canonical JSON
//!
//! Each failure kind exits with its own status code (see
//! [`error::PipelineError::exit_code`]).

use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod acquisition;
mod api;
mod browser;
mod cli;
mod config;
mod error;
mod extract;
mod lock;
mod models;
mod outputs;
mod pipeline;
mod response;
mod utils;

use cli::Cli;
use config::Settings;
use error::PipelineError;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> ExitCode {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "diario_clipping starting up");

    let args = Cli::parse();
    let command = args.command();
    debug!(?command, config = ?args.config, "Parsed CLI arguments");

    let settings = match Settings::resolve(&args) {
        Ok(settings) => settings,
        Err(e) => return fail(&PipelineError::from(e)),
    };
    debug!(?settings, "Resolved settings");

    // Early check: the data directory must be writable before any stage runs
    if let Err(e) = ensure_writable_dir(&settings.paths.data_dir).await {
        error!(
            path = %settings.paths.data_dir.display(),
            error = %e,
            "Data directory is not writable (fix perms or choose a different path)"
        );
        return ExitCode::from(8);
    }

    match pipeline::execute(&settings, command).await {
        Ok(report) => {
            report.log();
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn fail(e: &PipelineError) -> ExitCode {
    error!(kind = e.kind(), exit_code = e.exit_code(), error = %e, "Run failed");
    ExitCode::from(e.exit_code())
}
