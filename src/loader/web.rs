/// Web page loader.
///
/// Fetches a single URL, selects elements with a CSS selector and returns
/// their visible text as one [`Document`] whose `source` metadata is the URL.
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use super::{DocumentLoader, LoaderError};
use crate::document::Document;

pub const DEFAULT_SELECTOR: &str = "body";

/// Elements whose text never reaches the reader.
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

pub struct WebLoader {
    url: Url,
    selector: String,
    timeout: Duration,
    user_agent: String,
    client: Option<reqwest::Client>,
}

impl WebLoader {
    /// Create a loader for `url`. Only `http` and `https` URLs are accepted.
    pub fn new(url: &str) -> Result<Self, LoaderError> {
        let parsed = Url::parse(url).map_err(|e| LoaderError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(LoaderError::InvalidUrl {
                url: url.to_string(),
                message: format!("unsupported scheme {:?}", parsed.scheme()),
            });
        }

        Ok(Self {
            url: parsed,
            selector: DEFAULT_SELECTOR.to_string(),
            timeout: Duration::from_secs(30),
            user_agent: concat!("webrag/", env!("CARGO_PKG_VERSION")).to_string(),
            client: None,
        })
    }

    #[must_use]
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = selector.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Use a preconfigured client; timeout and user agent are then the client's.
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    fn client(&self) -> Result<reqwest::Client, LoaderError> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .build()
            .map_err(LoaderError::Client)
    }
}

#[async_trait]
impl DocumentLoader for WebLoader {
    async fn load(&self) -> Result<Vec<Document>, LoaderError> {
        let url = self.url.as_str();
        info!("Fetching {url}");

        let resp = self
            .client()?
            .get(self.url.clone())
            .send()
            .await
            .map_err(|source| LoaderError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LoaderError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let html = resp.text().await.map_err(|source| LoaderError::Request {
            url: url.to_string(),
            source,
        })?;

        let text = extract_text(&html, &self.selector)?;
        debug!(
            "Extracted {} characters from {url} ({} bytes of HTML)",
            text.chars().count(),
            html.len()
        );

        Ok(vec![Document::new(text).with_metadata("source", url)])
    }
}

/// Extract the visible text of every element matching `selector`.
///
/// Matches are separated by a blank line. Lines are trimmed, runs of
/// horizontal whitespace collapse to one space and runs of blank lines
/// collapse to a single blank line, so paragraph breaks survive.
pub fn extract_text(html: &str, selector: &str) -> Result<String, LoaderError> {
    let parsed = Selector::parse(selector).map_err(|e| LoaderError::InvalidSelector {
        selector: selector.to_string(),
        message: e.to_string(),
    })?;

    let document = Html::parse_document(html);
    let sections: Vec<String> = document
        .select(&parsed)
        .map(|element| {
            let mut raw = String::new();
            collect_text(element, &mut raw);
            normalize_whitespace(&raw)
        })
        .filter(|s| !s.is_empty())
        .collect();

    Ok(sections.join("\n\n"))
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_element) = ElementRef::wrap(child) {
            if !SKIPPED_TAGS.contains(&child_element.value().name()) {
                collect_text(child_element, out);
            }
        }
    }
}

fn normalize_whitespace(raw: &str) -> String {
    static INLINE_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").unwrap());
    static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

    let lines: Vec<String> = raw
        .lines()
        .map(|line| INLINE_SPACE.replace_all(line.trim(), " ").into_owned())
        .collect();
    let joined = lines.join("\n");

    BLANK_LINES.replace_all(joined.trim(), "\n\n").into_owned()
}
