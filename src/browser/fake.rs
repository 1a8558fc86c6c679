//! Scripted in-memory page for driving stage logic in tests.
//!
//! Elements are declared with the exact XPath expressions they answer to, so
//! a test also pins down how locators render.

use super::diagnostics::{Snapshot, ViewSummary};
use super::locator::Locator;
use super::{BrowserPage, Readiness};
use crate::error::BrowserError;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FakeElement {
    pub name: String,
    answers_to: Vec<String>,
    clickable: bool,
    displayed: bool,
    attributes: HashMap<String, String>,
}

impl FakeElement {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            answers_to: Vec::new(),
            clickable: true,
            displayed: true,
            attributes: HashMap::new(),
        }
    }

    pub fn answers_to(mut self, xpath: &str) -> Self {
        self.answers_to.push(xpath.to_string());
        self
    }

    pub fn not_clickable(mut self) -> Self {
        self.clickable = false;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.displayed = false;
        self.clickable = false;
        self
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }
}

#[derive(Default)]
pub struct FakePage {
    elements: Vec<FakeElement>,
    attempts: Mutex<Vec<String>>,
    actions: Mutex<Vec<String>>,
    fail_clicks: bool,
}

impl FakePage {
    pub fn new(elements: Vec<FakeElement>) -> Self {
        Self {
            elements,
            ..Self::default()
        }
    }

    pub fn failing_clicks(mut self) -> Self {
        self.fail_clicks = true;
        self
    }

    /// XPaths passed to `attempt`, in call order.
    pub fn attempted_xpaths(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    /// `goto:<url>`, `fill:<element>=<text>`, `click:<element>`, `snapshot:<label>`.
    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }

    fn record(&self, action: String) {
        self.actions.lock().unwrap().push(action);
    }

    fn matching(&self, xpath: &str) -> impl Iterator<Item = &FakeElement> {
        self.elements
            .iter()
            .filter(move |e| e.answers_to.iter().any(|x| x == xpath))
    }
}

impl BrowserPage for FakePage {
    type Element = FakeElement;

    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.record(format!("goto:{url}"));
        Ok(())
    }

    async fn attempt(
        &self,
        locator: &Locator,
        readiness: Readiness,
        _timeout: Duration,
    ) -> Option<FakeElement> {
        let xpath = locator.to_xpath();
        self.attempts.lock().unwrap().push(xpath.clone());
        self.matching(&xpath)
            .find(|e| readiness == Readiness::Present || e.clickable)
            .cloned()
    }

    async fn find_all(&self, locator: &Locator) -> Vec<FakeElement> {
        self.matching(&locator.to_xpath()).cloned().collect()
    }

    async fn is_displayed(&self, element: &FakeElement) -> bool {
        element.displayed
    }

    async fn attribute(&self, element: &FakeElement, name: &str) -> Option<String> {
        element.attributes.get(name).cloned()
    }

    async fn fill(&self, element: &FakeElement, text: &str) -> Result<(), BrowserError> {
        self.record(format!("fill:{}={text}", element.name));
        Ok(())
    }

    async fn click(&self, element: &FakeElement) -> Result<(), BrowserError> {
        if self.fail_clicks {
            return Err(BrowserError::Interaction(format!(
                "click on {} intercepted",
                element.name
            )));
        }
        self.record(format!("click:{}", element.name));
        Ok(())
    }

    async fn snapshot(&self, dir: &Path, label: &str) -> Result<Snapshot, BrowserError> {
        self.record(format!("snapshot:{label}"));
        Ok(Snapshot {
            screenshot: Some(dir.join(format!("{label}.png"))),
            html: None,
            summary: ViewSummary::default(),
        })
    }
}
