use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("invalid selector '{0}'")]
    InvalidSelector(String),
}

/// Verdict of a single page check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub matched: bool,
    pub description: String,
}

/// Source of raw page content.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, CheckError>;
}

/// Fetches pages over HTTP with a bounded wait.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, CheckError> {
        let client = Client::builder()
            .user_agent(concat!("pagewatch/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, CheckError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CheckError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }
}

/// Tests fetched page content against a CSS selector or a literal text fragment.
#[derive(Clone)]
pub struct PageChecker {
    fetcher: Arc<dyn PageFetcher>,
}

impl PageChecker {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Check `url` for a match.
    ///
    /// A non-empty `selector` takes precedence over `text`. When neither is
    /// supplied the page is not fetched and the result is a plain "no match".
    /// Fetch failures are returned as errors, never as a negative verdict.
    pub async fn check(
        &self,
        url: &str,
        selector: Option<&str>,
        text: Option<&str>,
    ) -> Result<CheckOutcome, CheckError> {
        let selector = selector.filter(|s| !s.is_empty());
        let text = text.filter(|t| !t.is_empty());
        if selector.is_none() && text.is_none() {
            return Ok(no_pattern());
        }

        let html = self.fetcher.fetch(url).await?;
        evaluate(&html, selector, text)
    }
}

fn no_pattern() -> CheckOutcome {
    CheckOutcome {
        matched: false,
        description: "no selector/text provided".to_string(),
    }
}

/// Parse a CSS selector, mapping the borrowed parser error to an owned one.
pub fn parse_selector(selector: &str) -> Result<Selector, CheckError> {
    Selector::parse(selector).map_err(|_| CheckError::InvalidSelector(selector.to_string()))
}

/// Pure matching step over already fetched content.
pub fn evaluate(
    html: &str,
    selector: Option<&str>,
    text: Option<&str>,
) -> Result<CheckOutcome, CheckError> {
    if let Some(selector) = selector.filter(|s| !s.is_empty()) {
        let parsed = parse_selector(selector)?;
        let document = Html::parse_document(html);
        let matched = document.select(&parsed).next().is_some();
        return Ok(CheckOutcome {
            matched,
            description: format!("selector '{}'", selector),
        });
    }

    if let Some(text) = text.filter(|t| !t.is_empty()) {
        return Ok(CheckOutcome {
            matched: html.contains(text),
            description: format!("text '{}'", text),
        });
    }

    Ok(no_pattern())
}
