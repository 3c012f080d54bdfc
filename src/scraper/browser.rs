use anyhow::Result;
use async_trait::async_trait;
use playwright::api::{Browser, BrowserContext, Page};
use playwright::Playwright;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::PageSession;
use crate::config::{ScrapingConfig, SessionBackend};
use crate::error::ScrapeError;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const SCROLL_STEP_PX: u32 = 300;
const MAX_SCROLL_STEPS: u32 = 10;

const EXISTS_JS: &str = "sel => document.querySelector(sel) !== null";

const FILL_JS: &str = r#"([sel, text]) => {
    const el = document.querySelector(sel);
    if (!el) return false;
    el.focus();
    el.value = text;
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
}"#;

const CLICK_JS: &str = r#"sel => {
    const el = document.querySelector(sel);
    if (!el) return false;
    el.scrollIntoView({ block: 'center' });
    el.click();
    return true;
}"#;

const CLICK_LABELLED_JS: &str = r#"([sel, labels]) => {
    for (const el of document.querySelectorAll(sel)) {
        const text = (el.innerText || el.textContent || '').trim();
        if (el.offsetParent !== null && labels.some(label => text.includes(label))) {
            el.scrollIntoView({ block: 'center' });
            el.click();
            return true;
        }
    }
    return false;
}"#;

const CLICK_ALL_WITHIN_JS: &str = r#"([container, sel]) => {
    const root = document.querySelector(container);
    if (!root) return 0;
    let clicked = 0;
    for (const el of root.querySelectorAll(sel)) {
        if (el.offsetParent === null) continue;
        try { el.click(); clicked++; } catch (e) {}
    }
    return clicked;
}"#;

const SCROLL_JS: &str = r#"async ([sel, step, maxSteps]) => {
    const el = document.querySelector(sel);
    if (!el) return false;
    el.scrollIntoView({ block: 'start' });
    let lastHeight = el.scrollHeight;
    for (let i = 1; i <= maxSteps; i++) {
        el.scrollTop = i * step;
        await new Promise(resolve => setTimeout(resolve, 200));
        if (el.scrollHeight === lastHeight && el.scrollTop + el.clientHeight >= el.scrollHeight) break;
        lastHeight = el.scrollHeight;
    }
    el.scrollTop = 0;
    return true;
}"#;

/// Headless Chromium session driven through playwright
pub struct BrowserSession {
    config: ScrapingConfig,
    // Kept alive for the lifetime of the page
    _playwright: Playwright,
    browser: Option<Browser>,
    _context: BrowserContext,
    page: Page,
}

impl BrowserSession {
    pub async fn new(config: &ScrapingConfig) -> Result<Self> {
        debug!("Initializing browser session");

        let playwright = Playwright::initialize().await?;
        playwright.prepare()?;

        let browser = playwright
            .chromium()
            .launcher()
            .headless(config.headless)
            .launch()
            .await?;

        let context = browser
            .context_builder()
            .user_agent(&config.user_agent)
            .viewport(Some(playwright::api::Viewport { width: 1920, height: 1080 }))
            .build()
            .await?;

        let page = context.new_page().await?;

        info!("Browser session ready (headless: {})", config.headless);

        Ok(Self {
            config: config.clone(),
            _playwright: playwright,
            browser: Some(browser),
            _context: context,
            page,
        })
    }

    fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds)
    }

    async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;
    }

    async fn exists(&self, selector: &str) -> bool {
        match self.page.evaluate::<&str, bool>(EXISTS_JS, selector).await {
            Ok(found) => found,
            Err(e) => {
                debug!("Selector probe failed for {}: {}", selector, e);
                false
            }
        }
    }
}

#[async_trait]
impl PageSession for BrowserSession {
    fn backend(&self) -> SessionBackend {
        SessionBackend::Browser
    }

    async fn open(&mut self, url: &str) -> Result<()> {
        debug!("Browser navigating to {}", url);

        let navigation = self.page.goto_builder(url).goto();
        match tokio::time::timeout(self.navigation_timeout(), navigation).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(ScrapeError::navigation(url, e.to_string()).into()),
            Err(_) => return Err(ScrapeError::navigation(url, "page load timed out").into()),
        }

        self.settle().await;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let url = self
            .page
            .evaluate::<(), String>("() => window.location.href", ())
            .await?;
        Ok(url)
    }

    async fn content(&self) -> Result<String> {
        let html = self
            .page
            .evaluate::<(), String>("() => document.documentElement.outerHTML", ())
            .await?;
        Ok(html)
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> bool {
        let started = Instant::now();
        loop {
            if self.exists(selector).await {
                return true;
            }
            if started.elapsed() >= timeout {
                debug!("Timed out after {:?} waiting for {}", timeout, selector);
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn fill(&mut self, selector: &str, text: &str) -> bool {
        match self
            .page
            .evaluate::<Value, bool>(FILL_JS, json!([selector, text]))
            .await
        {
            Ok(filled) => filled,
            Err(e) => {
                debug!("Fill failed for {}: {}", selector, e);
                false
            }
        }
    }

    async fn click(&mut self, selector: &str) -> bool {
        let clicked = match self.page.evaluate::<&str, bool>(CLICK_JS, selector).await {
            Ok(clicked) => clicked,
            Err(e) => {
                debug!("Click failed for {}: {}", selector, e);
                false
            }
        };
        if clicked {
            self.settle().await;
        }
        clicked
    }

    async fn click_labelled(&mut self, selector: &str, labels: &[String]) -> bool {
        let clicked = match self
            .page
            .evaluate::<Value, bool>(CLICK_LABELLED_JS, json!([selector, labels]))
            .await
        {
            Ok(clicked) => clicked,
            Err(e) => {
                debug!("Labelled click failed for {}: {}", selector, e);
                false
            }
        };
        if clicked {
            self.settle().await;
        }
        clicked
    }

    async fn click_all_within(&mut self, container: &str, selector: &str) -> usize {
        let clicked = match self
            .page
            .evaluate::<Value, u32>(CLICK_ALL_WITHIN_JS, json!([container, selector]))
            .await
        {
            Ok(count) => count as usize,
            Err(e) => {
                debug!("Expanding controls in {} failed: {}", container, e);
                0
            }
        };
        if clicked > 0 {
            self.settle().await;
        }
        clicked
    }

    async fn scroll_through(&mut self, selector: &str) -> bool {
        match self
            .page
            .evaluate::<Value, bool>(SCROLL_JS, json!([selector, SCROLL_STEP_PX, MAX_SCROLL_STEPS]))
            .await
        {
            Ok(scrolled) => scrolled,
            Err(e) => {
                debug!("Scrolling {} failed: {}", selector, e);
                false
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser: {}", e);
                return Err(e.into());
            }
            debug!("Browser closed");
        }
        Ok(())
    }
}
