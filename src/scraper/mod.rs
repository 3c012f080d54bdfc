use anyhow::Result;
use async_trait::async_trait;
use scraper::Selector;
use std::time::Duration;
use tracing::{debug, info, warn};

#[cfg(feature = "browser")]
pub mod browser;
pub mod extractor;
pub mod http_client;
pub mod locator;

use crate::config::{AppConfig, SessionBackend};
use crate::error::ScrapeError;

pub use extractor::{Extractor, RawExtraction, RevealReport};
pub use locator::Locator;

/// Capability interface over the page automation collaborator.
///
/// Navigation and reads return errors. Every interactive step (wait, fill,
/// click, scroll) is best-effort: it reports whether it happened and never
/// fails the caller.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Which backend drives this session
    fn backend(&self) -> SessionBackend;

    /// Navigate to `url` and wait for the document to load
    async fn open(&mut self, url: &str) -> Result<()>;

    /// Address of the currently loaded document, after redirects
    async fn current_url(&self) -> Result<String>;

    /// Rendered HTML of the current document
    async fn content(&self) -> Result<String>;

    /// Wait until `selector` matches at least one element, up to `timeout`
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> bool;

    /// Replace the value of the first matching input with `text`
    async fn fill(&mut self, selector: &str, text: &str) -> bool;

    /// Click the first matching element
    async fn click(&mut self, selector: &str) -> bool;

    /// Click the first visible element whose text contains one of `labels`
    async fn click_labelled(&mut self, selector: &str, labels: &[String]) -> bool;

    /// Click every visible match of `selector` inside `container`, returns the count
    async fn click_all_within(&mut self, container: &str, selector: &str) -> usize;

    /// Scroll through a scrollable region to trigger lazy loading
    async fn scroll_through(&mut self, selector: &str) -> bool;

    /// Release the underlying resources. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}

/// A loaded page frozen for extraction
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub url: String,
    pub html: String,
}

impl PageSnapshot {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }

    /// Capture the session's current document
    pub async fn capture(session: &dyn PageSession) -> Result<Self> {
        let url = session.current_url().await?;
        let html = session.content().await?;
        debug!("Captured snapshot of {} ({} bytes)", url, html.len());
        Ok(Self { url, html })
    }
}

/// Start the session configured in `scraping.backend`
pub async fn launch(config: &AppConfig) -> Result<Box<dyn PageSession>> {
    info!("Starting {} page session", config.scraping.backend);

    match config.scraping.backend {
        SessionBackend::Http => {
            let session = http_client::HttpSession::new(&config.scraping)
                .map_err(|e| ScrapeError::session(e.to_string()))?;
            Ok(Box::new(session))
        }
        SessionBackend::Browser => launch_browser(config).await,
    }
}

#[cfg(feature = "browser")]
async fn launch_browser(config: &AppConfig) -> Result<Box<dyn PageSession>> {
    let session = browser::BrowserSession::new(&config.scraping)
        .await
        .map_err(|e| ScrapeError::session(e.to_string()))?;
    Ok(Box::new(session))
}

#[cfg(not(feature = "browser"))]
async fn launch_browser(_config: &AppConfig) -> Result<Box<dyn PageSession>> {
    Err(ScrapeError::BrowserUnavailable.into())
}

/// Parse a configured CSS selector, logging instead of failing on bad input
pub(crate) fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!("Invalid CSS selector '{}': {:?}", selector, e);
            None
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeSession;
    use super::*;

    #[test]
    fn test_parse_selector() {
        assert!(parse_selector("#br-pr-7").is_some());
        assert!(parse_selector("div[").is_none());
    }

    #[tokio::test]
    async fn test_snapshot_capture() {
        let mut session = FakeSession::new().with_page("https://brain.com.ua/ukr/p1", "<html></html>");
        session.open("https://brain.com.ua/ukr/p1").await.unwrap();

        let snapshot = PageSnapshot::capture(&session).await.unwrap();
        assert_eq!(snapshot.url, "https://brain.com.ua/ukr/p1");
        assert_eq!(snapshot.html, "<html></html>");
    }

    #[cfg(not(feature = "browser"))]
    #[tokio::test]
    async fn test_browser_backend_requires_feature() {
        let mut config = AppConfig::default();
        config.scraping.backend = SessionBackend::Browser;

        let err = launch(&config).await.err().unwrap();
        assert!(matches!(
            err.downcast_ref::<ScrapeError>(),
            Some(ScrapeError::BrowserUnavailable)
        ));
    }
}
