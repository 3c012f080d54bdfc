use anyhow::Result;
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{parse_selector, PageSession};
use crate::config::{ScrapingConfig, SessionBackend};
use crate::error::ScrapeError;

/// Static page session over plain HTTP.
///
/// Pages are fetched as served, without running scripts. Form filling and
/// clicks are not available, so every interactive step reports `false` and
/// callers fall back to direct addresses.
pub struct HttpSession {
    client: Client,
    current_url: Option<String>,
    html: Option<String>,
}

impl HttpSession {
    pub fn new(config: &ScrapingConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Accept",
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert("Accept-Language", HeaderValue::from_static("uk-UA,uk;q=0.9,en;q=0.5"));
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        info!("HTTP session initialized");

        Ok(Self {
            client,
            current_url: None,
            html: None,
        })
    }

    fn matches(&self, selector: &str) -> bool {
        let (Some(html), Some(parsed)) = (self.html.as_deref(), parse_selector(selector)) else {
            return false;
        };
        let document = scraper::Html::parse_document(html);
        let found = document.select(&parsed).next().is_some();
        found
    }
}

#[async_trait]
impl PageSession for HttpSession {
    fn backend(&self) -> SessionBackend {
        SessionBackend::Http
    }

    async fn open(&mut self, url: &str) -> Result<()> {
        let started = Instant::now();
        debug!("HTTP GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ScrapeError::navigation(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::navigation(url, format!("HTTP {}", status)).into());
        }

        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| ScrapeError::navigation(url, e.to_string()))?;

        debug!(
            "Fetched {} ({} bytes) in {}ms",
            final_url,
            body.len(),
            started.elapsed().as_millis()
        );

        self.current_url = Some(final_url);
        self.html = Some(body);
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        self.current_url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("No page has been opened"))
    }

    async fn content(&self) -> Result<String> {
        self.html
            .clone()
            .ok_or_else(|| anyhow::anyhow!("No page has been opened"))
    }

    async fn wait_for(&mut self, selector: &str, _timeout: Duration) -> bool {
        // The document never changes after the fetch
        self.matches(selector)
    }

    async fn fill(&mut self, selector: &str, _text: &str) -> bool {
        debug!("Skipping fill of {} on static session", selector);
        false
    }

    async fn click(&mut self, selector: &str) -> bool {
        debug!("Skipping click on {} on static session", selector);
        false
    }

    async fn click_labelled(&mut self, selector: &str, _labels: &[String]) -> bool {
        debug!("Skipping click on {} on static session", selector);
        false
    }

    async fn click_all_within(&mut self, _container: &str, _selector: &str) -> usize {
        0
    }

    async fn scroll_through(&mut self, _selector: &str) -> bool {
        false
    }

    async fn close(&mut self) -> Result<()> {
        self.current_url = None;
        self.html = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_interactive_steps_are_unavailable() {
        let mut session = HttpSession::new(&ScrapingConfig::default()).unwrap();

        assert!(!session.fill("input.quick-search-input", "iPhone").await);
        assert!(!session.click("input.qsr-submit").await);
        assert!(!session.scroll_through("#br-pr-7").await);
        assert_eq!(session.click_all_within("#br-pr-7", "a").await, 0);
    }

    #[tokio::test]
    async fn test_reads_fail_before_open() {
        let mut session = HttpSession::new(&ScrapingConfig::default()).unwrap();

        assert!(session.current_url().await.is_err());
        assert!(session.content().await.is_err());
        assert!(!session.wait_for("body", Duration::from_secs(1)).await);
        assert!(session.close().await.is_ok());
    }

    #[test]
    fn test_selector_matching_on_loaded_document() {
        let mut session = HttpSession::new(&ScrapingConfig::default()).unwrap();
        session.current_url = Some("https://brain.com.ua/ukr/p1".to_string());
        session.html = Some(r#"<div id="br-pr-7"><div><span>Колір</span></div></div>"#.to_string());

        assert!(session.matches("#br-pr-7"));
        assert!(!session.matches("#br-characteristics"));
    }

    #[tokio::test]
    async fn test_open_rejects_unreachable_host() {
        let mut config = ScrapingConfig::default();
        config.timeout_seconds = 2;
        let mut session = HttpSession::new(&config).unwrap();

        let err = session.open("http://127.0.0.1:1/").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScrapeError>(),
            Some(ScrapeError::Navigation { .. })
        ));
    }
}
