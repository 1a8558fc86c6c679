//! Stage orchestration.
//!
//! ```text
//! acquire:  login -> filter -> download -> normalize      => canonical PDF
//! analyze:  extract -> classify -> sanitize/validate -> write => canonical JSON
//! run:      acquire, then analyze
//! ```
//!
//! Stages run strictly in order and every stage error unwinds the whole run.
//! There is nothing to resume; a new run starts from the first stage of its
//! command.

use crate::acquisition::acquire_edition;
use crate::api::{Classifier, GeminiClassifier, classify_corpus};
use crate::cli::Command;
use crate::config::Settings;
use crate::error::{PipelineError, Result};
use crate::extract::extract_corpus;
use crate::lock::RunLock;
use crate::outputs::json::write_clipping;
use crate::response::{sanitize_reply, validate_reply};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, instrument};

/// What the analysis stages produced.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    pub pages: usize,
    pub corpus_chars: usize,
    pub items: usize,
    pub warnings: Vec<String>,
    pub json_path: PathBuf,
    pub json_bytes: u64,
}

/// Summary of one invocation, logged at the end of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub command: Command,
    pub started_at: DateTime<Utc>,
    pub pdf: Option<PathBuf>,
    pub analysis: Option<AnalysisReport>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn log(&self) {
        let analysis = self.analysis.as_ref();
        info!(
            command = ?self.command,
            started_at = %self.started_at.to_rfc3339(),
            pdf = ?self.pdf,
            pages = analysis.map(|a| a.pages),
            items = analysis.map(|a| a.items),
            warnings = analysis.map(|a| a.warnings.len()),
            json = ?analysis.map(|a| &a.json_path),
            elapsed_ms = self.elapsed.as_millis() as u64,
            "Run finished"
        );
    }
}

/// Log in, download today's edition and place it at the canonical path.
pub async fn run_acquisition(settings: &Settings) -> Result<PathBuf> {
    let start = Instant::now();
    let pdf = acquire_edition(settings).await?;
    info!(
        path = %pdf.display(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Edition acquired"
    );
    Ok(pdf)
}

/// Turn the canonical PDF into the canonical JSON using `classifier`.
#[instrument(level = "info", skip_all, fields(pdf = %settings.paths.canonical_pdf.display()))]
pub async fn analyze_edition<C: Classifier>(
    settings: &Settings,
    classifier: &C,
) -> Result<AnalysisReport> {
    let start = Instant::now();
    let pdf = settings.paths.canonical_pdf.clone();
    if !pdf.exists() {
        return Err(PipelineError::Extraction {
            path: pdf,
            reason: "canonical PDF does not exist; run acquisition first".to_string(),
        });
    }

    let extract_path = pdf.clone();
    let corpus = tokio::task::spawn_blocking(move || extract_corpus(&extract_path))
        .await
        .map_err(|e| PipelineError::Extraction {
            path: pdf.clone(),
            reason: format!("extraction task failed: {e}"),
        })??;
    let rendered = corpus.render();
    info!(elapsed_ms = start.elapsed().as_millis() as u64, "Extraction stage finished");

    let reply = classify_corpus(classifier, &settings.gateway.prompt_template, &rendered).await?;
    let validated = validate_reply(&sanitize_reply(&reply))?;

    let json_path = settings.paths.canonical_json.clone();
    let json_bytes = write_clipping(&validated.clipping, &json_path).await?;
    info!(elapsed_ms = start.elapsed().as_millis() as u64, "Analysis finished");

    Ok(AnalysisReport {
        pages: corpus.page_count(),
        corpus_chars: rendered.chars().count(),
        items: validated.clipping.item_count(),
        warnings: validated.warnings,
        json_path,
        json_bytes,
    })
}

fn gemini(settings: &Settings) -> Result<GeminiClassifier> {
    let key = settings.gemini_api_key()?;
    Ok(GeminiClassifier::new(key, &settings.gateway.model)
        .with_base_url(&settings.gateway.api_base_url))
}

/// Execute `command` under the run lock.
#[instrument(level = "info", skip(settings))]
pub async fn execute(settings: &Settings, command: Command) -> Result<RunReport> {
    let start = Instant::now();
    let started_at = Utc::now();
    let _lock = RunLock::acquire(&settings.paths.lock_file, settings.lock_stale_after).await?;

    let (pdf, analysis) = match command {
        Command::Acquire => (Some(run_acquisition(settings).await?), None),
        Command::Analyze => {
            let classifier = gemini(settings)?;
            (None, Some(analyze_edition(settings, &classifier).await?))
        }
        Command::Run => {
            // Both inputs are checked before the browser starts.
            settings.portal()?;
            let classifier = gemini(settings)?;
            let pdf = run_acquisition(settings).await?;
            (Some(pdf), Some(analyze_edition(settings, &classifier).await?))
        }
    };

    Ok(RunReport {
        command,
        started_at,
        pdf,
        analysis,
        elapsed: start.elapsed(),
    })
}
