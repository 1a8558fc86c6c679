//! Session Acquisition Controller: one login attempt per run.
//!
//! ```text
//! NotStarted -> PageLoaded -> CredentialsEntered -> Submitted -> Authenticated
//!      \____________\_______________\__________________\______> Failed
//! ```
//!
//! The portal gives no reliable "logged in" signal, so after submitting the
//! controller waits a fixed settle delay and proceeds. When
//! `post_login_check` is enabled it additionally warns if the password field
//! is still on screen, which usually means the credentials were rejected.

use super::{human_pause, navigation_failure, settle};
use crate::browser::locator::{Attr, Locator, TextMatch, locate, locate_clickable};
use crate::browser::BrowserPage;
use crate::config::{PortalCredentials, Settings};
use crate::error::{PipelineError, Result};
use crate::utils::mask_secret;
use std::time::Duration;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    NotStarted,
    PageLoaded,
    CredentialsEntered,
    Submitted,
    Authenticated,
    Failed,
}

/// Username field strategies, most specific first.
pub fn username_locators() -> Vec<Locator> {
    let text_input = || vec![Attr::equals("type", "text")];
    vec![
        Locator::attr("input", "placeholder", "E-mail"),
        Locator::attr("input", "placeholder", "Email"),
        Locator::attr("input", "placeholder", "e-mail"),
        Locator::attr("input", "placeholder", "Usuário"),
        Locator::attr("input", "type", "email"),
        Locator::attrs(
            "input",
            vec![Attr::equals("type", "text"), Attr::equals("maxlength", "100")],
        ),
        Locator::text("label", "E-mail", TextMatch::Contains).following("input", text_input()),
        Locator::text("label", "E-mail", TextMatch::Contains).following("input", vec![]),
        Locator::text("label", "Usuário", TextMatch::Contains).following("input", text_input()),
        Locator::attr("input", "aria-label", "E-mail"),
        Locator::attr("input", "aria-label", "Email"),
        Locator::attr("input", "aria-label", "Usuário"),
        Locator::nth("input", text_input(), 1),
        Locator::nth("input", vec![], 1),
    ]
}

/// Password field strategies, most specific first.
pub fn password_locators() -> Vec<Locator> {
    vec![
        Locator::attr("input", "placeholder", "Senha"),
        Locator::attr("input", "placeholder", "senha"),
        Locator::attr("input", "placeholder", "Password"),
        Locator::attr("input", "type", "password"),
        Locator::attrs(
            "input",
            vec![Attr::equals("type", "text"), Attr::equals("maxlength", "20")],
        ),
        Locator::text("label", "Senha", TextMatch::Contains)
            .following("input", vec![Attr::equals("type", "password")]),
        Locator::text("label", "Senha", TextMatch::Contains)
            .following("input", vec![Attr::equals("type", "text")]),
        Locator::text("label", "Senha", TextMatch::Contains).following("input", vec![]),
        Locator::attr("input", "aria-label", "Senha"),
        Locator::attr("input", "aria-label", "Password"),
        Locator::nth("input", vec![Attr::equals("type", "text")], 2),
        Locator::nth("input", vec![], 2),
    ]
}

/// Submit control strategies, most specific first.
pub fn submit_locators() -> Vec<Locator> {
    vec![
        Locator::text("button", "Entrar", TextMatch::Exact),
        Locator::text("button", "Entrar", TextMatch::Normalized),
        Locator::text("span", "Entrar", TextMatch::Exact).ancestor("button", vec![]),
        Locator::text("span", "Entrar", TextMatch::Normalized).ancestor("button", vec![]),
        Locator::text("button", "Entrar", TextMatch::Contains),
        Locator::text("button", "entrar", TextMatch::ContainsIgnoreCase),
        Locator::attr("button", "aria-label", "Entrar"),
        Locator::attrs("button", vec![Attr::contains("class", "btn-login")]),
        Locator::attrs("button", vec![Attr::contains("class", "login")]),
        Locator::attr("button", "type", "submit"),
        Locator::nth("button", vec![], 1),
    ]
}

/// Drives one page through the portal login form.
pub struct LoginController<'a, P: BrowserPage> {
    page: &'a P,
    credentials: &'a PortalCredentials,
    settings: &'a Settings,
    state: LoginState,
}

impl<'a, P: BrowserPage> LoginController<'a, P> {
    pub fn new(page: &'a P, credentials: &'a PortalCredentials, settings: &'a Settings) -> Self {
        Self {
            page,
            credentials,
            settings,
            state: LoginState::NotStarted,
        }
    }

    pub fn state(&self) -> LoginState {
        self.state
    }

    /// Run the login flow to `Authenticated`, or to `Failed` with a
    /// `NavigationError` carrying a diagnostic snapshot.
    #[instrument(level = "info", skip_all, fields(url = %self.credentials.login_url))]
    pub async fn authenticate(&mut self) -> Result<()> {
        let settings: &'a Settings = self.settings;
        let timeout = settings.timeouts.login;
        let delays = &settings.delays;

        if let Err(e) = self.page.goto(self.credentials.login_url.as_str()).await {
            return Err(self.fail(format!("could not open login page: {e}")).await);
        }
        settle(delays.page_load).await;
        self.state = LoginState::PageLoaded;
        info!("Login page loaded");

        let Some(username) = locate(self.page, &username_locators(), timeout).await else {
            return Err(self.fail("username field not found by any strategy".into()).await);
        };
        if let Err(e) = self.page.fill(&username, &self.credentials.username).await {
            return Err(self.fail(format!("could not type username: {e}")).await);
        }
        settle(delays.typing_pause).await;
        info!(user = %mask_secret(&self.credentials.username), "Username filled");

        let Some(password) = locate(self.page, &password_locators(), timeout).await else {
            return Err(self.fail("password field not found by any strategy".into()).await);
        };
        if let Err(e) = self.page.fill(&password, &self.credentials.password).await {
            return Err(self.fail(format!("could not type password: {e}")).await);
        }
        settle(delays.typing_pause).await;
        self.state = LoginState::CredentialsEntered;
        info!("Password filled");

        let Some(submit) = locate_clickable(self.page, &submit_locators(), timeout).await else {
            return Err(self.fail("submit button not found by any strategy".into()).await);
        };
        human_pause(delays).await;
        if let Err(e) = self.page.click(&submit).await {
            return Err(self.fail(format!("could not click submit: {e}")).await);
        }
        self.state = LoginState::Submitted;
        info!("Login submitted; waiting for redirect");

        settle(delays.after_submit).await;
        if settings.post_login_check {
            self.check_form_gone().await;
        }
        self.state = LoginState::Authenticated;
        info!("Login flow completed");
        Ok(())
    }

    async fn check_form_gone(&self) {
        let still_there = Locator::attr("input", "type", "password");
        if let Some(field) = self
            .page
            .attempt(&still_there, crate::browser::Readiness::Present, Duration::ZERO)
            .await
        {
            if self.page.is_displayed(&field).await {
                warn!("Password field still visible after submit; credentials may have been rejected");
            }
        }
    }

    async fn fail(&mut self, reason: String) -> PipelineError {
        self.state = LoginState::Failed;
        navigation_failure(self.page, self.settings, "login", "login_error", reason).await
    }
}
