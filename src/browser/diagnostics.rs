//! Postmortem snapshots of the browser view.
//!
//! When a required element cannot be found the run aborts, and the only
//! evidence of what the portal actually rendered is what gets captured here:
//! a full-page screenshot, the serialized DOM, and a short structural summary
//! of the DOM that is logged inline so the cause is visible without opening
//! any file.

use scraper::{Html, Selector};
use std::path::PathBuf;
use tracing::info;

/// Files written for one snapshot plus the logged summary.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub screenshot: Option<PathBuf>,
    pub html: Option<PathBuf>,
    pub summary: ViewSummary,
}

impl Snapshot {
    /// The most useful single file to point an operator at.
    pub fn primary_path(&self) -> Option<PathBuf> {
        self.screenshot.clone().or_else(|| self.html.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewSummary {
    pub title: Option<String>,
    pub inputs: usize,
    pub password_inputs: usize,
    pub buttons: usize,
    pub comboboxes: usize,
    /// Placeholders of visible-looking inputs, in document order.
    pub placeholders: Vec<String>,
}

/// Summarize the form structure of a serialized page.
pub fn summarize_view(html: &str) -> ViewSummary {
    let document = Html::parse_document(html);
    let count = |css: &str| {
        Selector::parse(css)
            .map(|selector| document.select(&selector).count())
            .unwrap_or(0)
    };

    let title = Selector::parse("title").ok().and_then(|selector| {
        document
            .select(&selector)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    });

    let placeholders = Selector::parse("input[placeholder]:not([type=hidden])")
        .map(|selector| {
            document
                .select(&selector)
                .filter_map(|e| e.value().attr("placeholder"))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    ViewSummary {
        title,
        inputs: count("input:not([type=hidden])"),
        password_inputs: count("input[type=password]"),
        buttons: count("button, input[type=submit]"),
        comboboxes: count("[role=combobox]"),
        placeholders,
    }
}

pub fn log_summary(label: &str, snapshot: &Snapshot) {
    let s = &snapshot.summary;
    info!(
        label,
        title = s.title.as_deref().unwrap_or("-"),
        inputs = s.inputs,
        password_inputs = s.password_inputs,
        buttons = s.buttons,
        comboboxes = s.comboboxes,
        placeholders = ?s.placeholders,
        screenshot = ?snapshot.screenshot,
        html = ?snapshot.html,
        "Captured diagnostic snapshot"
    );
}
