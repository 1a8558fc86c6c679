//! Element descriptors and the ordered-fallback lookup engine.
//!
//! The portal renders its forms client-side and regenerates element ids on
//! every load, so no single selector is reliable. Each element the pipeline
//! needs is described by an ordered list of [`Locator`]s, from the most
//! specific (placeholder, exact label) down to purely structural guesses
//! ("the first input on the page"). [`locate`] and [`locate_clickable`] walk
//! that list and return the first element that resolves within its own
//! bounded wait.
//!
//! Locators are plain data rendered to XPath 1.0 by [`Locator::to_xpath`],
//! which keeps them printable in logs and testable without a browser.

use super::{BrowserPage, Readiness};
use itertools::Itertools;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    Equals,
    Contains,
}

/// One attribute predicate, e.g. `@type='password'`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub name: String,
    pub value: String,
    pub op: AttrOp,
}

impl Attr {
    pub fn equals(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            op: AttrOp::Equals,
        }
    }

    pub fn contains(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            op: AttrOp::Contains,
        }
    }

    fn to_predicate(&self) -> String {
        match self.op {
            AttrOp::Equals => format!("@{}={}", self.name, xpath_literal(&self.value)),
            AttrOp::Contains => {
                format!("contains(@{}, {})", self.name, xpath_literal(&self.value))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMatch {
    /// Direct text node equals the value.
    Exact,
    /// Whitespace-normalized string value equals the value.
    Normalized,
    /// Direct text node contains the value.
    Contains,
    /// Whitespace-normalized string value contains the value.
    NormalizedContains,
    /// Direct text node contains the value, ASCII case-insensitively.
    ContainsIgnoreCase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Following,
    Ancestor,
    Descendant,
}

impl Axis {
    fn as_str(self) -> &'static str {
        match self {
            Axis::Following => "following",
            Axis::Ancestor => "ancestor",
            Axis::Descendant => "descendant",
        }
    }
}

/// How to find one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// `tag` whose attributes all satisfy `attrs`.
    ByAttribute { tag: String, attrs: Vec<Attr> },
    /// `tag` whose text satisfies `matching` against `text`, plus optional
    /// attribute predicates.
    ByText {
        tag: String,
        text: String,
        matching: TextMatch,
        attrs: Vec<Attr>,
    },
    /// `target` reached from `anchor` along `axis`; `nth` picks the n-th
    /// (1-based) match in axis order, nearest first. `target` is a single
    /// step: a `ByAttribute` or `ByText`.
    ByRelativePosition {
        anchor: Box<Locator>,
        axis: Axis,
        target: Box<Locator>,
        nth: Option<usize>,
    },
    /// The `index`-th (1-based) `tag` in document order matching `attrs`.
    ByStructuralFallback {
        tag: String,
        attrs: Vec<Attr>,
        index: usize,
    },
}

impl Locator {
    pub fn attr(tag: &str, name: &str, value: &str) -> Self {
        Locator::ByAttribute {
            tag: tag.to_string(),
            attrs: vec![Attr::equals(name, value)],
        }
    }

    pub fn attrs(tag: &str, attrs: Vec<Attr>) -> Self {
        Locator::ByAttribute {
            tag: tag.to_string(),
            attrs,
        }
    }

    pub fn text(tag: &str, text: &str, matching: TextMatch) -> Self {
        Self::text_with_attrs(tag, text, matching, Vec::new())
    }

    pub fn text_with_attrs(tag: &str, text: &str, matching: TextMatch, attrs: Vec<Attr>) -> Self {
        Locator::ByText {
            tag: tag.to_string(),
            text: text.to_string(),
            matching,
            attrs,
        }
    }

    pub fn nth(tag: &str, attrs: Vec<Attr>, index: usize) -> Self {
        Locator::ByStructuralFallback {
            tag: tag.to_string(),
            attrs,
            index,
        }
    }

    /// First `tag` after this element in document order.
    pub fn following(self, tag: &str, attrs: Vec<Attr>) -> Self {
        self.relative(Axis::Following, Locator::attrs(tag, attrs), Some(1))
    }

    /// Nearest enclosing `tag`.
    pub fn ancestor(self, tag: &str, attrs: Vec<Attr>) -> Self {
        self.relative(Axis::Ancestor, Locator::attrs(tag, attrs), Some(1))
    }

    /// Any `tag` nested inside this element.
    pub fn descendant(self, tag: &str, attrs: Vec<Attr>) -> Self {
        self.relative(Axis::Descendant, Locator::attrs(tag, attrs), None)
    }

    /// Any `tag` nested inside this element whose normalized text is `text`.
    pub fn descendant_text(self, tag: &str, text: &str) -> Self {
        self.relative(
            Axis::Descendant,
            Locator::text(tag, text, TextMatch::Normalized),
            None,
        )
    }

    fn relative(self, axis: Axis, target: Locator, nth: Option<usize>) -> Self {
        Locator::ByRelativePosition {
            anchor: Box::new(self),
            axis,
            target: Box::new(target),
            nth,
        }
    }

    pub fn to_xpath(&self) -> String {
        match self {
            Locator::ByAttribute { tag, attrs } => format!("//{tag}{}", predicates(attrs)),
            Locator::ByText {
                tag,
                text,
                matching,
                attrs,
            } => {
                let lit = xpath_literal(text);
                let predicate = match matching {
                    TextMatch::Exact => format!("text()={lit}"),
                    TextMatch::Normalized => format!("normalize-space()={lit}"),
                    TextMatch::Contains => format!("contains(text(), {lit})"),
                    TextMatch::NormalizedContains => format!("contains(normalize-space(), {lit})"),
                    TextMatch::ContainsIgnoreCase => format!(
                        "contains(translate(text(), 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', \
                         'abcdefghijklmnopqrstuvwxyz'), {})",
                        xpath_literal(&text.to_ascii_lowercase())
                    ),
                };
                if attrs.is_empty() {
                    format!("//{tag}[{predicate}]")
                } else {
                    let extra = attrs.iter().map(Attr::to_predicate).join(" and ");
                    format!("//{tag}[{predicate} and {extra}]")
                }
            }
            Locator::ByRelativePosition {
                anchor,
                axis,
                target,
                nth,
            } => {
                let position = nth.map(|n| format!("[{n}]")).unwrap_or_default();
                let target = target.to_xpath();
                format!(
                    "({})/{}::{}{position}",
                    anchor.to_xpath(),
                    axis.as_str(),
                    target.trim_start_matches('/')
                )
            }
            Locator::ByStructuralFallback { tag, attrs, index } => {
                format!("(//{tag}{})[{index}]", predicates(attrs))
            }
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xpath())
    }
}

fn predicates(attrs: &[Attr]) -> String {
    if attrs.is_empty() {
        String::new()
    } else {
        format!("[{}]", attrs.iter().map(Attr::to_predicate).join(" and "))
    }
}

/// Quote `value` as an XPath 1.0 string literal.
///
/// XPath has no escape sequences, so a value holding both quote kinds has to
/// be assembled with `concat()`.
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{value}'")
    } else if !value.contains('"') {
        format!("\"{value}\"")
    } else {
        let parts = value
            .split('\'')
            .map(|part| format!("'{part}'"))
            .join(", \"'\", ");
        format!("concat({parts})")
    }
}

/// Return the first element, in priority order, that is present within its
/// individual `timeout`.
pub async fn locate<P: BrowserPage>(
    page: &P,
    strategies: &[Locator],
    timeout: Duration,
) -> Option<P::Element> {
    locate_with(page, strategies, Readiness::Present, timeout).await
}

/// Like [`locate`], but the element must also be visible and enabled.
pub async fn locate_clickable<P: BrowserPage>(
    page: &P,
    strategies: &[Locator],
    timeout: Duration,
) -> Option<P::Element> {
    locate_with(page, strategies, Readiness::Clickable, timeout).await
}

#[instrument(level = "debug", skip_all, fields(strategies = strategies.len(), ?readiness))]
async fn locate_with<P: BrowserPage>(
    page: &P,
    strategies: &[Locator],
    readiness: Readiness,
    timeout: Duration,
) -> Option<P::Element> {
    for (index, locator) in strategies.iter().enumerate() {
        if let Some(element) = page.attempt(locator, readiness, timeout).await {
            debug!(index, xpath = %locator, "Locator matched");
            return Some(element);
        }
        debug!(index, xpath = %locator, "Locator did not match");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeElement, FakePage};

    #[test]
    fn test_attribute_xpath() {
        assert_eq!(
            Locator::attr("input", "placeholder", "E-mail").to_xpath(),
            "//input[@placeholder='E-mail']"
        );
        assert_eq!(
            Locator::attrs(
                "input",
                vec![Attr::equals("type", "text"), Attr::equals("maxlength", "100")]
            )
            .to_xpath(),
            "//input[@type='text' and @maxlength='100']"
        );
        assert_eq!(
            Locator::attrs("*", vec![Attr::contains("class", "mdi-file-pdf-box")]).to_xpath(),
            "//*[contains(@class, 'mdi-file-pdf-box')]"
        );
    }

    #[test]
    fn test_text_xpath_variants() {
        assert_eq!(
            Locator::text("button", "Entrar", TextMatch::Exact).to_xpath(),
            "//button[text()='Entrar']"
        );
        assert_eq!(
            Locator::text("button", "Entrar", TextMatch::Normalized).to_xpath(),
            "//button[normalize-space()='Entrar']"
        );
        assert_eq!(
            Locator::text("label", "Public. Legal", TextMatch::NormalizedContains).to_xpath(),
            "//label[contains(normalize-space(), 'Public. Legal')]"
        );
        assert_eq!(
            Locator::text("button", "Entrar", TextMatch::ContainsIgnoreCase).to_xpath(),
            "//button[contains(translate(text(), 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', \
             'abcdefghijklmnopqrstuvwxyz'), 'entrar')]"
        );
    }

    #[test]
    fn test_relative_and_structural_xpath() {
        let label_then_input = Locator::text("label", "E-mail", TextMatch::Contains)
            .following("input", vec![Attr::equals("type", "text")]);
        assert_eq!(
            label_then_input.to_xpath(),
            "(//label[contains(text(), 'E-mail')])/following::input[@type='text'][1]"
        );

        let span_button =
            Locator::text("span", "Entrar", TextMatch::Exact).ancestor("button", vec![]);
        assert_eq!(
            span_button.to_xpath(),
            "(//span[text()='Entrar'])/ancestor::button[1]"
        );

        assert_eq!(
            Locator::nth("input", vec![Attr::equals("type", "text")], 2).to_xpath(),
            "(//input[@type='text'])[2]"
        );
        assert_eq!(Locator::nth("input", vec![], 1).to_xpath(), "(//input)[1]");
    }

    #[test]
    fn test_text_with_attrs_and_descendant_text() {
        assert_eq!(
            Locator::text_with_attrs(
                "div",
                "Exceto",
                TextMatch::Normalized,
                vec![Attr::equals("role", "option")]
            )
            .to_xpath(),
            "//div[normalize-space()='Exceto' and @role='option']"
        );
        assert_eq!(
            Locator::attr("div", "role", "listbox")
                .descendant_text("div", "Exceto")
                .to_xpath(),
            "(//div[@role='listbox'])/descendant::div[normalize-space()='Exceto']"
        );
    }

    #[test]
    fn test_xpath_literal_quoting() {
        assert_eq!(xpath_literal("Senha"), "'Senha'");
        assert_eq!(xpath_literal("D'Ávila"), "\"D'Ávila\"");
        assert_eq!(
            xpath_literal(r#"a'b"c"#),
            r#"concat('a', "'", 'b"c')"#
        );
    }

    #[tokio::test]
    async fn test_locate_returns_first_matching_strategy_in_order() {
        let page = FakePage::new(vec![
            FakeElement::new("generic").answers_to("(//input)[1]"),
            FakeElement::new("email").answers_to("//input[@type='email']"),
        ]);
        let strategies = vec![
            Locator::attr("input", "placeholder", "E-mail"),
            Locator::attr("input", "type", "email"),
            Locator::nth("input", vec![], 1),
        ];

        let found = locate(&page, &strategies, Duration::from_millis(5)).await;

        assert_eq!(found.map(|e| e.name), Some("email".to_string()));
        assert_eq!(
            page.attempted_xpaths(),
            vec![
                "//input[@placeholder='E-mail']".to_string(),
                "//input[@type='email']".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_locate_exhaustion_is_none() {
        let page = FakePage::new(vec![]);
        let strategies = vec![
            Locator::attr("input", "placeholder", "Senha"),
            Locator::attr("input", "type", "password"),
        ];

        assert!(locate(&page, &strategies, Duration::from_millis(5)).await.is_none());
        assert_eq!(page.attempted_xpaths().len(), 2);
    }

    #[tokio::test]
    async fn test_locate_clickable_skips_present_but_disabled() {
        let page = FakePage::new(vec![
            FakeElement::new("disabled")
                .answers_to("//button[@type='submit']")
                .not_clickable(),
            FakeElement::new("first-button").answers_to("(//button)[1]"),
        ]);
        let strategies = vec![
            Locator::attr("button", "type", "submit"),
            Locator::nth("button", vec![], 1),
        ];

        let present = locate(&page, &strategies, Duration::from_millis(5)).await;
        assert_eq!(present.map(|e| e.name), Some("disabled".to_string()));

        let clickable = locate_clickable(&page, &strategies, Duration::from_millis(5)).await;
        assert_eq!(clickable.map(|e| e.name), Some("first-button".to_string()));
    }
}
