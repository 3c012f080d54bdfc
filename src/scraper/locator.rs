use anyhow::Result;
use scraper::Html;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::form_urlencoded;

use super::{parse_selector, PageSession};
use crate::config::SiteConfig;
use crate::utils::resolve_url;

/// Resolves a free-text query to the address of the first matching product
pub struct Locator<'a> {
    site: &'a SiteConfig,
    timeout: Duration,
}

impl<'a> Locator<'a> {
    pub fn new(site: &'a SiteConfig, timeout: Duration) -> Self {
        Self { site, timeout }
    }

    /// Search the site and open the first result.
    ///
    /// Returns the session's address after reaching the product page, or
    /// `None` when the search produced no usable result. Only failing to
    /// load the site itself is an error.
    pub async fn locate(&self, session: &mut dyn PageSession, query: &str) -> Result<Option<String>> {
        info!("Locating product for query: {}", query);

        session.open(&self.site.base_url).await?;

        if !self.submit_search(session, query).await {
            let search_url = self.search_url(query);
            debug!("Search form unavailable, opening {}", search_url);
            session.open(&search_url).await?;
        }

        if !session.wait_for(&self.site.first_result_selector, self.timeout).await {
            warn!("No search results for query: {}", query);
            return Ok(None);
        }

        let page_url = session.current_url().await?;
        let html = session.content().await?;

        if let Some(link) = first_result_link(&html, &page_url, self.site) {
            debug!("Following first result link {}", link);
            session.open(&link).await?;
            return Ok(Some(session.current_url().await?));
        }

        debug!("First result has no product link, clicking the card");
        if session.click(&self.site.first_result_selector).await {
            let url = session.current_url().await?;
            if !url.contains(&self.site.search_path_marker) {
                return Ok(Some(url));
            }
        }

        warn!("Could not open the first result for query: {}", query);
        Ok(None)
    }

    /// Fill the search box and submit; false when the form is not usable
    async fn submit_search(&self, session: &mut dyn PageSession, query: &str) -> bool {
        for selector in &self.site.search_input_selectors {
            if !session.wait_for(selector, self.timeout).await {
                continue;
            }
            if session.fill(selector, query).await {
                debug!("Filled search input {}", selector);
                return session.click(&self.site.search_button_selector).await;
            }
        }
        false
    }

    /// Direct search address for backends without form interaction
    pub fn search_url(&self, query: &str) -> String {
        let encoded: String = form_urlencoded::byte_serialize(query.as_bytes()).collect();
        self.site.search_url.replace("{query}", &encoded)
    }
}

/// Address of the product link inside the first result card
pub fn first_result_link(html: &str, page_url: &str, site: &SiteConfig) -> Option<String> {
    let card_selector = parse_selector(&site.first_result_selector)?;
    let link_selector = parse_selector(&site.result_link_selector)?;

    let document = Html::parse_document(html);
    let card = document.select(&card_selector).next()?;
    let link = card
        .select(&link_selector)
        .filter_map(|a| a.value().attr("href"))
        .find_map(|href| resolve_url(page_url, href));
    link
}

#[cfg(test)]
mod tests {
    use super::super::testing::FakeSession;
    use super::*;

    const HOME: &str = "https://brain.com.ua/";
    const PRODUCT: &str = "https://brain.com.ua/ukr/Mobilniy_telefon_Apple_iPhone_15_128GB_Black-p1044347.html";
    const RESULTS_URL: &str = "https://brain.com.ua/ukr/search/?Search=Apple+iPhone+15+128GB+Black";

    const HOME_HTML: &str = r#"<header><form><input class="quick-search-input"><input class="qsr-submit" type="submit"></form></header>"#;

    const RESULTS_HTML: &str = r#"
        <div class="br-pp br-pp-ex goods-block__item" data-pid="1044347">
          <a href="/ukr/compare/">compare</a>
          <a href="/ukr/Mobilniy_telefon_Apple_iPhone_15_128GB_Black-p1044347.html">Apple iPhone 15</a>
        </div>
        <div class="br-pp br-pp-ex goods-block__item" data-pid="2">
          <a href="/ukr/other-p2.html">Other</a>
        </div>"#;

    fn locator(site: &SiteConfig) -> Locator<'_> {
        Locator::new(site, Duration::ZERO)
    }

    #[test]
    fn test_first_result_link_takes_first_card() {
        let site = SiteConfig::default();
        let link = first_result_link(RESULTS_HTML, RESULTS_URL, &site);
        assert_eq!(link.as_deref(), Some("https://brain.com.ua/ukr/compare/"));
    }

    #[test]
    fn test_first_result_link_absent() {
        let site = SiteConfig::default();
        let html = r#"<div class="br-pp br-pp-ex goods-block__item" data-pid="1"><a href="/rus/p1.html">x</a></div>"#;
        assert_eq!(first_result_link(html, RESULTS_URL, &site), None);
        assert_eq!(first_result_link("<p>Нічого не знайдено</p>", RESULTS_URL, &site), None);
    }

    #[test]
    fn test_search_url_encoding() {
        let site = SiteConfig::default();
        assert_eq!(locator(&site).search_url("Apple iPhone 15 128GB Black"), RESULTS_URL);
        assert_eq!(
            locator(&site).search_url("пам'ять"),
            "https://brain.com.ua/ukr/search/?Search=%D0%BF%D0%B0%D0%BC%27%D1%8F%D1%82%D1%8C"
        );
    }

    #[tokio::test]
    async fn test_locate_through_search_form() {
        let site = SiteConfig::default();
        let results = r#"<div class="br-pp br-pp-ex goods-block__item" data-pid="1044347">
              <a href="/ukr/Mobilniy_telefon_Apple_iPhone_15_128GB_Black-p1044347.html">Apple iPhone 15</a>
            </div>"#;
        let mut session = FakeSession::new()
            .with_page(HOME, HOME_HTML)
            .with_page("https://brain.com.ua/ukr/search/?form", results)
            .with_page(PRODUCT, "<html></html>");
        session.search_target = Some("https://brain.com.ua/ukr/search/?form".to_string());

        let url = locator(&site).locate(&mut session, "Apple iPhone 15 128GB Black").await.unwrap();

        assert_eq!(url.as_deref(), Some(PRODUCT));
        assert_eq!(
            session.filled,
            vec![("input.quick-search-input".to_string(), "Apple iPhone 15 128GB Black".to_string())]
        );
    }

    #[tokio::test]
    async fn test_locate_falls_back_to_search_url() {
        let site = SiteConfig::default();
        let results = r#"<div class="br-pp br-pp-ex goods-block__item" data-pid="1044347">
              <a href="/ukr/Mobilniy_telefon_Apple_iPhone_15_128GB_Black-p1044347.html">Apple iPhone 15</a>
            </div>"#;
        let mut session = FakeSession::new()
            .with_page(HOME, HOME_HTML)
            .with_page(RESULTS_URL, results)
            .with_page(PRODUCT, "<html></html>");

        let url = locator(&site).locate(&mut session, "Apple iPhone 15 128GB Black").await.unwrap();

        assert_eq!(url.as_deref(), Some(PRODUCT));
        assert!(session.actions.iter().any(|a| a == &format!("open {}", RESULTS_URL)));
    }

    #[tokio::test]
    async fn test_locate_clicks_card_without_link() {
        let site = SiteConfig::default();
        let results = r#"<div class="br-pp br-pp-ex goods-block__item" data-pid="1044347">Apple iPhone 15</div>"#;
        let mut session = FakeSession::new()
            .with_page(HOME, HOME_HTML)
            .with_page(RESULTS_URL, results)
            .with_page(PRODUCT, "<html></html>");
        session
            .click_targets
            .insert(site.first_result_selector.clone(), PRODUCT.to_string());

        let url = locator(&site).locate(&mut session, "Apple iPhone 15 128GB Black").await.unwrap();
        assert_eq!(url.as_deref(), Some(PRODUCT));
    }

    #[tokio::test]
    async fn test_locate_without_results() {
        let site = SiteConfig::default();
        let mut session = FakeSession::new()
            .with_page(HOME, HOME_HTML)
            .with_page(RESULTS_URL, "<p>Нічого не знайдено</p>");

        let url = locator(&site).locate(&mut session, "Apple iPhone 15 128GB Black").await.unwrap();
        assert_eq!(url, None);
    }

    #[tokio::test]
    async fn test_locate_fails_when_site_unreachable() {
        let site = SiteConfig::default();
        let mut session = FakeSession::new();

        assert!(locator(&site).locate(&mut session, "iPhone").await.is_err());
    }
}
