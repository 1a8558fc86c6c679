//! Error taxonomy for the clipping pipeline.
//!
//! Every fatal condition unwinds the whole run and ends up as a
//! [`PipelineError`]. Each variant maps to a distinct process exit status
//! through [`PipelineError::exit_code`], so a scheduler can tell a bad
//! configuration apart from a portal that changed its layout.
//!
//! Non-fatal conditions (publication filter not applied, missing fields in an
//! otherwise valid reply) are never represented here; they are logged as
//! warnings where they happen.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// A required configuration input is missing or malformed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting(s): {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid URL for {field}: {source}")]
    InvalidUrl {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("prompt template {path} does not contain the {placeholder} placeholder")]
    Template {
        path: PathBuf,
        placeholder: &'static str,
    },
}

/// Failure talking to the browser itself (not a missing element).
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("devtools protocol error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error("browser interaction failed: {0}")]
    Interaction(String),

    #[error("i/o error while writing browser diagnostics: {0}")]
    Io(#[from] io::Error),
}

/// The classification service could not produce a reply.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service error (status {status}): {body}")]
    Service { status: u16, body: String },

    #[error("service returned no text: {reason}")]
    EmptyReply { reason: String },
}

/// The classifier reply is not usable JSON after sanitization.
#[derive(Debug, Error)]
#[error("classifier reply is not valid clipping JSON: {message}")]
pub struct ParseError {
    pub message: String,
    /// The parser hit end-of-input, i.e. the reply was probably cut off.
    pub truncated: bool,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("navigation failed during {stage}: {reason}{}", snapshot_hint(.snapshot))]
    Navigation {
        stage: &'static str,
        reason: String,
        snapshot: Option<PathBuf>,
    },

    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("download did not complete within {}s", .0.as_secs())]
    DownloadTimeout(Duration),

    #[error("failed to place downloaded artifact at {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to extract text from {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    #[error("classification service failed: {0}")]
    ClassificationService(#[from] ClassificationError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("failed to write output {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("another run holds the lock at {path}")]
    AlreadyRunning { path: PathBuf },
}

fn snapshot_hint(snapshot: &Option<PathBuf>) -> String {
    match snapshot {
        Some(path) => format!(" (snapshot: {})", path.display()),
        None => String::new(),
    }
}

impl PipelineError {
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Configuration(_) => 2,
            PipelineError::Navigation { .. } | PipelineError::Browser(_) => 3,
            PipelineError::DownloadTimeout(_) | PipelineError::Artifact { .. } => 4,
            PipelineError::Extraction { .. } => 5,
            PipelineError::ClassificationService(_) => 6,
            PipelineError::Parse(_) => 7,
            PipelineError::Output { .. } => 8,
            PipelineError::AlreadyRunning { .. } => 9,
        }
    }

    /// Short machine-friendly name of the failure kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Configuration(_) => "configuration",
            PipelineError::Navigation { .. } => "navigation",
            PipelineError::Browser(_) => "browser",
            PipelineError::DownloadTimeout(_) => "download_timeout",
            PipelineError::Artifact { .. } => "artifact",
            PipelineError::Extraction { .. } => "extraction",
            PipelineError::ClassificationService(_) => "classification_service",
            PipelineError::Parse(_) => "parse",
            PipelineError::Output { .. } => "output",
            PipelineError::AlreadyRunning { .. } => "already_running",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_per_kind() {
        let errors = vec![
            PipelineError::Configuration(ConfigError::Missing(vec!["DIARIO_USER"])),
            PipelineError::Navigation {
                stage: "login",
                reason: "x".into(),
                snapshot: None,
            },
            PipelineError::DownloadTimeout(Duration::from_secs(30)),
            PipelineError::Extraction {
                path: "a.pdf".into(),
                reason: "bad".into(),
            },
            PipelineError::ClassificationService(ClassificationError::EmptyReply {
                reason: "none".into(),
            }),
            PipelineError::Parse(ParseError {
                message: "eof".into(),
                truncated: true,
            }),
            PipelineError::Output {
                path: "out.json".into(),
                source: io::Error::other("disk full"),
            },
            PipelineError::AlreadyRunning {
                path: ".lock".into(),
            },
        ];
        let mut codes: Vec<u8> = errors.iter().map(|e| e.exit_code()).collect();
        assert!(codes.iter().all(|c| *c != 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_navigation_message_mentions_snapshot() {
        let err = PipelineError::Navigation {
            stage: "login",
            reason: "username field not found".into(),
            snapshot: Some("/tmp/login.png".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("login"));
        assert!(msg.contains("username field not found"));
        assert!(msg.contains("/tmp/login.png"));
    }

    #[test]
    fn test_missing_config_lists_fields() {
        let err = ConfigError::Missing(vec!["DIARIO_USER", "DIARIO_PASS"]);
        assert_eq!(
            err.to_string(),
            "missing required setting(s): DIARIO_USER, DIARIO_PASS"
        );
    }
}
