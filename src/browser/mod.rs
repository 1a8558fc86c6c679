//! Browser automation seam.
//!
//! Everything the acquisition stages need from a live page is expressed by
//! the [`BrowserPage`] trait. The production implementation in [`chrome`]
//! drives Chromium over the DevTools protocol; tests drive the same stage
//! logic against a scripted page.
//!
//! # Submodules
//!
//! - [`locator`]: element descriptors and the ordered-fallback lookup engine
//! - [`chrome`]: Chromium session lifecycle and the `BrowserPage` implementation
//! - [`diagnostics`]: postmortem snapshots of the current view

pub mod chrome;
pub mod diagnostics;
pub mod locator;

#[cfg(test)]
pub mod fake;

use crate::error::BrowserError;
use diagnostics::Snapshot;
use locator::Locator;
use std::path::Path;
use std::time::Duration;

/// What an element must satisfy before a lookup counts as a success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Attached to the DOM.
    Present,
    /// Attached, rendered with a non-empty box, and not disabled.
    Clickable,
}

/// Capabilities of one open browser page.
///
/// Lookups return `Option` rather than `Result`: an element that does not
/// show up in time is an ordinary outcome the caller interprets, not an
/// error.
pub trait BrowserPage {
    type Element;

    async fn goto(&self, url: &str) -> Result<(), BrowserError>;

    /// Wait up to `timeout` for `locator` to resolve to an element that meets
    /// `readiness`.
    async fn attempt(
        &self,
        locator: &Locator,
        readiness: Readiness,
        timeout: Duration,
    ) -> Option<Self::Element>;

    /// Every element currently matching `locator`, without waiting.
    async fn find_all(&self, locator: &Locator) -> Vec<Self::Element>;

    async fn is_displayed(&self, element: &Self::Element) -> bool;

    /// Live property value (falling back to the DOM attribute).
    async fn attribute(&self, element: &Self::Element, name: &str) -> Option<String>;

    /// Clear the field and type `text` into it.
    async fn fill(&self, element: &Self::Element, text: &str) -> Result<(), BrowserError>;

    /// Scroll the element into view and click it.
    async fn click(&self, element: &Self::Element) -> Result<(), BrowserError>;

    /// Capture the current view into `dir`, file names prefixed with `label`.
    async fn snapshot(&self, dir: &Path, label: &str) -> Result<Snapshot, BrowserError>;
}
