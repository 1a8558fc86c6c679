//! Classification gateway to the Gemini `generateContent` endpoint.
//!
//! The corpus is embedded into a fixed Portuguese instruction template and
//! sent as a single user turn. The raw reply text comes back unmodified;
//! cleaning it up is the job of [`crate::response`].
//!
//! # Architecture
//!
//! - [`Classifier`]: async trait the pipeline talks to
//! - [`GeminiClassifier`]: the production implementation over `reqwest`
//! - [`classify_corpus`]: prompt assembly plus one classifier call
//!
//! # Failure Policy
//!
//! A transport error, a non-success status or a reply without text is fatal
//! for the run and is not retried. The request has no timeout beyond the
//! HTTP client's own.

use crate::error::ClassificationError;
use crate::utils::truncate_for_log;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Placeholder the corpus is substituted into.
pub const CORPUS_PLACEHOLDER: &str = "{texto_extraido}";

/// Built-in instruction template. Editorial criteria for the Santa Maria
/// city hall press office.
pub const CLIPPING_PROMPT: &str = r#"Você é um analista de mídia da Prefeitura de Santa Maria. Analise o texto do jornal Diário de Santa Maria.

Critérios de Inclusão:
- Prefeitura de SM (Secretarias, obras, ações)
- Câmara de Vereadores
- Segurança Pública regional
- Política com impacto local
- Infraestrutura (Rodovias, UFSM)
- Caso Boate Kiss (Sempre incluir)

Formato de Saída: Retorne exclusivamente um JSON puro com: data_clipping, e uma lista chamada "noticias" contendo (pagina, titulo, resumo_120_chars, relevância).

Texto do Jornal:
{texto_extraido}"#;

/// Something that turns a prompt into raw reply text.
pub trait Classifier {
    /// Send `prompt` and return the service's reply text.
    ///
    /// # Arguments
    ///
    /// * `prompt` - Full instruction text with the corpus already embedded
    ///
    /// # Returns
    ///
    /// The reply text exactly as produced, possibly wrapped in code fences.
    async fn classify(&self, prompt: &str) -> Result<String, ClassificationError>;
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<CandidateContent>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ReplyPart>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReplyPart {
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

/// Concatenated text of the first candidate.
///
/// A reply with no candidate, or whose candidate carries no text (blocked by
/// safety filters, for instance), is an `EmptyReply`.
pub fn reply_text(response: GenerateContentResponse) -> Result<String, ClassificationError> {
    let block_reason = response
        .prompt_feedback
        .and_then(|f| f.block_reason);

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(ClassificationError::EmptyReply {
            reason: match block_reason {
                Some(reason) => format!("prompt blocked: {reason}"),
                None => "no candidates".to_string(),
            },
        });
    };

    let finish_reason = candidate.finish_reason;
    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ClassificationError::EmptyReply {
            reason: format!(
                "candidate has no text (finish reason: {})",
                finish_reason.as_deref().unwrap_or("unknown")
            ),
        });
    }
    if finish_reason.as_deref() == Some("MAX_TOKENS") {
        warn!("Reply stopped at the output token limit; JSON is likely truncated");
    }
    Ok(text)
}

/// Gemini over HTTPS.
pub struct GeminiClassifier {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClassifier {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: DEFAULT_API_BASE.to_string(),
            model: model.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url,
            urlencoding::encode(&self.model)
        )
    }
}

impl Classifier for GeminiClassifier {
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn classify(&self, prompt: &str) -> Result<String, ClassificationError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassificationError::Service {
                status: status.as_u16(),
                body: truncate_for_log(&body, 500),
            });
        }

        reply_text(response.json().await?)
    }
}

/// Substitute `corpus` into `template`.
pub fn build_prompt(template: &str, corpus: &str) -> String {
    template.replace(CORPUS_PLACEHOLDER, corpus)
}

/// Build the prompt for `corpus` and ask `classifier` once.
#[instrument(level = "info", skip_all)]
pub async fn classify_corpus<C: Classifier>(
    classifier: &C,
    template: &str,
    corpus: &str,
) -> Result<String, ClassificationError> {
    let prompt = build_prompt(template, corpus);
    info!(
        corpus_chars = corpus.chars().count(),
        prompt_chars = prompt.chars().count(),
        "Sending corpus for classification"
    );

    let start = Instant::now();
    let reply = classifier.classify(&prompt).await?;
    info!(
        reply_chars = reply.chars().count(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Classification reply received"
    );
    debug!(preview = %truncate_for_log(&reply, 300), "Reply preview");
    Ok(reply)
}
