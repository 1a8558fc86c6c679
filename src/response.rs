//! Reply sanitization and validation.
//!
//! Classifier replies are supposed to be bare JSON but routinely come
//! wrapped in a markdown code fence, with or without a language tag.
//! [`sanitize_reply`] strips that wrapping; [`validate_reply`] parses what is
//! left and checks it has the clipping shape.
//!
//! Only text that is not JSON, or JSON that is not an object, is a
//! [`ParseError`]. Missing or oddly typed fields inside the object are kept
//! as the classifier wrote them and reported as warnings.

use crate::error::ParseError;
use crate::models::StructuredClipping;
use crate::utils::{looks_truncated, truncate_for_log};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

static OPENING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z0-9_+-]*").expect("opening fence pattern is valid"));

static CLOSING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```$").expect("closing fence pattern is valid"));

/// Strip surrounding code fences and whitespace.
///
/// Repeats until nothing changes, so nested or doubled fences are removed
/// too and applying it twice gives the same result as applying it once.
pub fn sanitize_reply(raw: &str) -> String {
    let mut text = raw.trim();
    loop {
        let before = text.len();
        if let Some(m) = OPENING_FENCE.find(text) {
            text = text[m.end()..].trim();
        }
        if let Some(m) = CLOSING_FENCE.find(text) {
            text = text[..m.start()].trim();
        }
        if text.len() == before {
            return text.to_string();
        }
    }
}

/// A parsed reply plus the non-fatal problems found in it.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedReply {
    pub clipping: StructuredClipping,
    pub warnings: Vec<String>,
}

fn parse_error(message: String, truncated: bool, text: &str) -> ParseError {
    error!(
        %message,
        truncated,
        preview = %truncate_for_log(text, 300),
        "Classifier reply rejected"
    );
    ParseError { message, truncated }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parse sanitized reply text into a [`StructuredClipping`].
#[instrument(level = "info", skip_all, fields(chars = text.chars().count()))]
pub fn validate_reply(text: &str) -> Result<ValidatedReply, ParseError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| parse_error(e.to_string(), looks_truncated(&e), text))?;

    let mut object = match value {
        Value::Object(object) => object,
        other => {
            return Err(parse_error(
                format!("expected a JSON object, found {}", json_type(&other)),
                false,
                text,
            ));
        }
    };

    let mut warnings = Vec::new();
    match object.get("noticias") {
        None => warnings.push("field 'noticias' is missing; writing an empty list".to_string()),
        Some(Value::Array(_)) => {}
        Some(other) => {
            warnings.push(format!(
                "field 'noticias' is {}, not an array; writing an empty list",
                json_type(other)
            ));
            object.remove("noticias");
        }
    }
    match object.get("data_clipping") {
        None => warnings.push("field 'data_clipping' is missing".to_string()),
        Some(Value::String(_)) => {}
        Some(other) => warnings.push(format!(
            "field 'data_clipping' is {}, not text",
            json_type(other)
        )),
    }

    let clipping: StructuredClipping = serde_json::from_value(Value::Object(object))
        .map_err(|e| parse_error(format!("unexpected clipping shape: {e}"), false, text))?;

    for (index, entry) in clipping.noticias.iter().enumerate() {
        let Some(item) = entry.item() else {
            warnings.push(format!("noticias[{index}] is not an object"));
            continue;
        };
        if item.title().is_none() {
            warnings.push(format!("noticias[{index}] has no 'titulo' text"));
        }
        match &item.pagina {
            None => warnings.push(format!("noticias[{index}] has no 'pagina'")),
            Some(page) if page.number().is_none() => {
                warnings.push(format!("noticias[{index}] has a non-numeric 'pagina'"))
            }
            Some(_) => {}
        }
    }

    for warning in &warnings {
        warn!(%warning, "Clipping reply is incomplete");
    }
    info!(
        items = clipping.item_count(),
        data_clipping = clipping.edition_label().unwrap_or("-"),
        warnings = warnings.len(),
        "Clipping reply validated"
    );
    Ok(ValidatedReply { clipping, warnings })
}
