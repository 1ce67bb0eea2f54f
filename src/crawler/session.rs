//! Login handshake
//!
//! Loads the login page, fills the login form and checks that the forum
//! redirected to its landing page. The session itself lives in the client's
//! cookie jar.

use crate::config::{Credentials, ForumConfig};
use crate::crawler::fetcher::{fetch_page, submit_form};
use crate::HarvestError;
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

/// A login form found on the login page
#[derive(Debug, Clone, PartialEq)]
pub struct LoginForm {
    /// Absolute URL the form posts to
    pub action: Url,
    /// Hidden fields carried over from the page
    pub hidden: Vec<(String, String)>,
}

/// Finds the form that posts to the login script
pub fn find_login_form(html: &str, page_url: &Url, login_url: &Url) -> Option<LoginForm> {
    let document = Html::parse_document(html);
    let form_selector = Selector::parse("form[action]").ok()?;
    let hidden_selector = Selector::parse(r#"input[type="hidden"][name]"#).ok()?;

    document.select(&form_selector).find_map(|form| {
        let action = page_url.join(form.value().attr("action")?.trim()).ok()?;
        if action.path() != login_url.path() {
            return None;
        }

        let hidden = form
            .select(&hidden_selector)
            .filter_map(|input| {
                let name = input.value().attr("name")?;
                let value = input.value().attr("value").unwrap_or_default();
                Some((name.to_string(), value.to_string()))
            })
            .collect();

        Some(LoginForm { action, hidden })
    })
}

/// Builds the submitted fields: hidden inputs overridden by the login fields
pub fn login_fields(
    form: &LoginForm,
    credentials: &Credentials,
    submit_label: &str,
) -> Vec<(String, String)> {
    let overrides = [
        ("username", credentials.login.as_str()),
        ("password", credentials.password.as_str()),
        ("login", submit_label),
        ("redirect", ""),
        ("autologin", "on"),
    ];

    let mut fields: Vec<(String, String)> = form
        .hidden
        .iter()
        .filter(|(name, _)| !overrides.iter().any(|(key, _)| *key == name.as_str()))
        .cloned()
        .collect();

    fields.extend(
        overrides
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string())),
    );
    fields
}

/// Performs the login handshake for one crawl session
pub struct Authenticator<'a> {
    client: &'a Client,
    forum: &'a ForumConfig,
    base: &'a Url,
}

impl<'a> Authenticator<'a> {
    pub fn new(client: &'a Client, forum: &'a ForumConfig, base: &'a Url) -> Self {
        Self {
            client,
            forum,
            base,
        }
    }

    /// Logs in and returns the landing page URL
    ///
    /// # Returns
    ///
    /// * `Ok(Url)` - The forum redirected to its landing page
    /// * `Err(HarvestError::Auth)` - No login form, or no redirect to the landing page
    /// * `Err(HarvestError)` - Transport or status failure
    pub async fn login(&self, credentials: &Credentials) -> Result<Url, HarvestError> {
        let login_url = self.base.join(&self.forum.login_path)?;
        tracing::info!("Attempting login through {}", login_url);

        let page = fetch_page(self.client, &login_url).await?.into_success()?;
        let form = find_login_form(&page.body, &page.url, &login_url)
            .ok_or_else(|| HarvestError::Auth("could not find login form".to_string()))?;

        let fields = login_fields(&form, credentials, &self.forum.login_submit_label);
        let response = submit_form(self.client, &form.action, &fields)
            .await?
            .into_success()?;

        tracing::info!("Response URL after login: {}", response.url);
        if response.url.as_str().contains(&self.forum.landing_marker) {
            tracing::info!("Login successful");
            Ok(response.url)
        } else {
            Err(HarvestError::Auth(format!(
                "not redirected to {} (ended at {})",
                self.forum.landing_marker, response.url
            )))
        }
    }
}
