//! Publication Filter Selector.
//!
//! The edition listing mixes the journalistic edition with legal-notice
//! supplements. A Vuetify combobox labelled "Public. Legal" narrows it; the
//! option "Exceto" (except) leaves only journalistic editions.
//!
//! ```text
//! Unfiltered -> DropdownLocated -> DropdownOpened -> OptionSelected -> Applied
//!                      \______________________________________________/
//!                       value already "Exceto": short-circuit to Applied
//! ```
//!
//! Nothing here is fatal. Without the filter the listing is a superset and
//! the PDF icon lookup still works, so every failure is logged and the
//! pipeline continues unfiltered.

use super::settle;
use crate::browser::diagnostics::log_summary;
use crate::browser::locator::{Attr, Locator, TextMatch, locate, locate_clickable};
use crate::browser::BrowserPage;
use crate::config::Settings;
use tracing::{debug, info, instrument, warn};

pub const FILTER_LABEL: &str = "Public. Legal";
pub const TARGET_OPTION: &str = "Exceto";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    Unfiltered,
    DropdownLocated,
    DropdownOpened,
    OptionSelected,
    Applied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// The dropdown already showed the target option.
    AlreadyApplied,
    Applied,
    /// Continuing unfiltered; `reached` is the last state before giving up.
    Skipped { reached: FilterState, reason: String },
}

fn label_locators() -> Vec<Locator> {
    vec![
        Locator::text("label", FILTER_LABEL, TextMatch::NormalizedContains),
        Locator::text("*", FILTER_LABEL, TextMatch::NormalizedContains),
    ]
}

fn combobox() -> Vec<Attr> {
    vec![Attr::equals("role", "combobox")]
}

/// Dropdown strategies; `label_id` comes from the located label, if any.
pub fn dropdown_locators(label_id: Option<&str>, label_found: bool) -> Vec<Locator> {
    let mut locators = Vec::new();
    if let Some(id) = label_id.filter(|id| !id.is_empty()) {
        locators.push(Locator::attrs(
            "input",
            vec![
                Attr::equals("role", "combobox"),
                Attr::equals("aria-labelledby", id),
            ],
        ));
    }
    if label_found {
        let label_text = || Locator::text("*", FILTER_LABEL, TextMatch::NormalizedContains);
        locators.push(
            label_text()
                .ancestor("*", vec![Attr::contains("class", "v-input")])
                .descendant("input", combobox()),
        );
        locators.push(
            label_text()
                .ancestor("*", vec![Attr::contains("class", "v-select")])
                .descendant("input", combobox()),
        );
        locators.push(label_text().following("input", combobox()));
    }
    locators.push(Locator::attrs(
        "input",
        vec![
            Attr::equals("role", "combobox"),
            Attr::contains("aria-label", "Public"),
        ],
    ));
    locators.push(Locator::attrs(
        "input",
        vec![
            Attr::equals("role", "combobox"),
            Attr::contains("aria-label", "Legal"),
        ],
    ));
    locators.push(Locator::attrs("input", combobox()));
    locators
}

pub fn option_locators() -> Vec<Locator> {
    let option = || vec![Attr::equals("role", "option")];
    vec![
        Locator::text_with_attrs("div", TARGET_OPTION, TextMatch::Normalized, option()),
        Locator::text("span", TARGET_OPTION, TextMatch::Normalized).ancestor("div", option()),
        Locator::text("div", TARGET_OPTION, TextMatch::Normalized)
            .ancestor("div", vec![Attr::contains("class", "v-list-item")]),
        Locator::text("span", TARGET_OPTION, TextMatch::Normalized)
            .ancestor("div", vec![Attr::contains("class", "v-list-item")]),
        Locator::attrs("div", vec![Attr::equals("role", "listbox")]).descendant_text(
            "div",
            TARGET_OPTION,
        ),
    ]
}

pub struct FilterSelector<'a, P: BrowserPage> {
    page: &'a P,
    settings: &'a Settings,
    state: FilterState,
}

impl<'a, P: BrowserPage> FilterSelector<'a, P> {
    pub fn new(page: &'a P, settings: &'a Settings) -> Self {
        Self {
            page,
            settings,
            state: FilterState::Unfiltered,
        }
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    #[instrument(level = "info", skip_all)]
    pub async fn apply(&mut self) -> FilterOutcome {
        let settings: &'a Settings = self.settings;
        let timeout = settings.timeouts.filter;
        info!(label = FILTER_LABEL, option = TARGET_OPTION, "Applying publication filter");

        self.log_comboboxes().await;

        let label = locate(self.page, &label_locators(), timeout).await;
        let label_id = match &label {
            Some(el) => {
                info!("Filter label found");
                self.page.attribute(el, "id").await
            }
            None => None,
        };

        let Some(dropdown) = self
            .first_displayed(&dropdown_locators(label_id.as_deref(), label.is_some()))
            .await
        else {
            return self.skip("dropdown not found").await;
        };
        self.state = FilterState::DropdownLocated;

        let current = self
            .page
            .attribute(&dropdown, "value")
            .await
            .unwrap_or_default();
        if current.trim().contains(TARGET_OPTION) {
            self.state = FilterState::Applied;
            info!(value = %current.trim(), "Filter already applied");
            return FilterOutcome::AlreadyApplied;
        }

        if let Err(e) = self.page.click(&dropdown).await {
            return self.skip(&format!("could not open dropdown: {e}")).await;
        }
        self.state = FilterState::DropdownOpened;
        debug!("Dropdown opened; waiting for options");
        settle(settings.delays.dropdown_open).await;

        let Some(option) = locate_clickable(self.page, &option_locators(), timeout).await else {
            return self.skip("option not found in opened list").await;
        };
        if let Err(e) = self.page.click(&option).await {
            return self.skip(&format!("could not select option: {e}")).await;
        }
        self.state = FilterState::OptionSelected;
        info!("Filter option selected");

        settle(settings.delays.filter_apply).await;
        self.state = FilterState::Applied;
        info!("Filter applied; listing shows journalistic editions only");
        FilterOutcome::Applied
    }

    /// First displayed element across `locators`, without waiting.
    async fn first_displayed(&self, locators: &[Locator]) -> Option<P::Element> {
        for locator in locators {
            for candidate in self.page.find_all(locator).await {
                if self.page.is_displayed(&candidate).await {
                    debug!(xpath = %locator, "Dropdown candidate is displayed");
                    return Some(candidate);
                }
            }
        }
        None
    }

    async fn log_comboboxes(&self) {
        let all = self.page.find_all(&Locator::attrs("input", combobox())).await;
        debug!(count = all.len(), "Comboboxes on page");
        for (i, combo) in all.iter().enumerate() {
            let labelled_by = self.page.attribute(combo, "aria-labelledby").await;
            let value = self.page.attribute(combo, "value").await;
            debug!(index = i, ?labelled_by, ?value, "Combobox");
        }
    }

    async fn skip(&mut self, reason: &str) -> FilterOutcome {
        warn!(reached = ?self.state, %reason, "Publication filter not applied; continuing unfiltered");
        if let Ok(snapshot) = self
            .page
            .snapshot(&self.settings.paths.diagnostics_dir, "filter_skipped")
            .await
        {
            log_summary("filter_skipped", &snapshot);
        }
        FilterOutcome::Skipped {
            reached: self.state,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeElement, FakePage};

    const LABEL: &str = "//label[contains(normalize-space(), 'Public. Legal')]";
    const BY_LABEL_ID: &str =
        "//input[@role='combobox' and @aria-labelledby='input-12-label']";
    const OPTION: &str = "//div[normalize-space()='Exceto' and @role='option']";

    #[test]
    fn test_dropdown_locators_prefer_label_id() {
        let with_id = dropdown_locators(Some("input-12-label"), true);
        assert_eq!(with_id[0].to_xpath(), BY_LABEL_ID);
        assert_eq!(
            with_id.last().map(Locator::to_xpath),
            Some("//input[@role='combobox']".to_string())
        );

        let without_label = dropdown_locators(None, false);
        assert_eq!(without_label.len(), 3);
        assert_eq!(
            without_label[0].to_xpath(),
            "//input[@role='combobox' and contains(@aria-label, 'Public')]"
        );
    }

    #[test]
    fn test_option_locator_xpaths() {
        let xpaths: Vec<String> = option_locators().iter().map(Locator::to_xpath).collect();
        assert_eq!(xpaths[0], OPTION);
        assert_eq!(
            xpaths[1],
            "(//span[normalize-space()='Exceto'])/ancestor::div[@role='option'][1]"
        );
        assert_eq!(
            xpaths[4],
            "(//div[@role='listbox'])/descendant::div[normalize-space()='Exceto']"
        );
    }

    #[tokio::test]
    async fn test_filter_applies_when_unset() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings::for_tests(tmp.path());
        let page = FakePage::new(vec![
            FakeElement::new("label")
                .answers_to(LABEL)
                .with_attribute("id", "input-12-label"),
            FakeElement::new("dropdown")
                .answers_to(BY_LABEL_ID)
                .with_attribute("value", "Todas"),
            FakeElement::new("exceto").answers_to(OPTION),
        ]);

        let mut selector = FilterSelector::new(&page, &settings);
        let outcome = selector.apply().await;

        assert_eq!(outcome, FilterOutcome::Applied);
        assert_eq!(selector.state(), FilterState::Applied);
        assert_eq!(
            page.actions(),
            vec!["click:dropdown".to_string(), "click:exceto".to_string()]
        );
    }

    #[tokio::test]
    async fn test_filter_is_idempotent_when_already_set() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings::for_tests(tmp.path());
        let page = FakePage::new(vec![
            FakeElement::new("dropdown")
                .answers_to("//input[@role='combobox']")
                .with_attribute("value", " Exceto "),
        ]);

        let mut selector = FilterSelector::new(&page, &settings);
        let outcome = selector.apply().await;

        assert_eq!(outcome, FilterOutcome::AlreadyApplied);
        assert!(page.actions().is_empty());
    }

    #[tokio::test]
    async fn test_hidden_dropdown_candidates_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings::for_tests(tmp.path());
        let page = FakePage::new(vec![
            FakeElement::new("hidden-combo")
                .answers_to("//input[@role='combobox']")
                .hidden(),
        ]);

        let mut selector = FilterSelector::new(&page, &settings);
        let outcome = selector.apply().await;

        match outcome {
            FilterOutcome::Skipped { reached, reason } => {
                assert_eq!(reached, FilterState::Unfiltered);
                assert!(reason.contains("dropdown"));
            }
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_option_degrades_without_error() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings::for_tests(tmp.path());
        let page = FakePage::new(vec![
            FakeElement::new("dropdown")
                .answers_to("//input[@role='combobox']")
                .with_attribute("value", "Todas"),
        ]);

        let mut selector = FilterSelector::new(&page, &settings);
        let outcome = selector.apply().await;

        assert_eq!(
            outcome,
            FilterOutcome::Skipped {
                reached: FilterState::DropdownOpened,
                reason: "option not found in opened list".into(),
            }
        );
        assert!(page.actions().contains(&"snapshot:filter_skipped".to_string()));
    }
}
