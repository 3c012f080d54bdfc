use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

use super::{parse_selector, PageSession, PageSnapshot};
use crate::config::SiteConfig;
use crate::log_warn;
use crate::logging::LogContext;
use crate::product::Characteristics;
use crate::utils::{collapse_whitespace, is_all_digits, resolve_url};

/// Raw candidates pulled from one product page, before reconciliation
#[derive(Debug, Clone, Default)]
pub struct RawExtraction {
    pub url: String,
    pub title: Option<String>,
    /// First product-typed structured-data entry, verbatim
    pub structured: Option<Map<String, Value>>,
    pub characteristics: Characteristics,
    pub review_count: Option<u32>,
    pub page_images: Vec<String>,
}

/// What the reveal sequence managed to do on the live page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevealReport {
    pub tab_opened: bool,
    pub all_characteristics_shown: bool,
    pub expand_controls_clicked: usize,
    pub scrolled: bool,
    pub container: Option<String>,
}

/// Pulls raw product data out of a loaded page
pub struct Extractor<'a> {
    site: &'a SiteConfig,
}

impl<'a> Extractor<'a> {
    pub fn new(site: &'a SiteConfig) -> Self {
        Self { site }
    }

    /// Make the full characteristics table present in the DOM.
    ///
    /// Every step is attempted regardless of how the previous one went.
    pub async fn reveal(&self, session: &mut dyn PageSession, timeout: Duration) -> RevealReport {
        let mut report = RevealReport::default();

        if session.wait_for(&self.site.characteristics_tab_selector, timeout).await {
            report.tab_opened = session.click(&self.site.characteristics_tab_selector).await;
        }
        if !report.tab_opened {
            debug!("Characteristics tab not opened");
        }

        report.all_characteristics_shown = session
            .click_labelled(
                &self.site.all_characteristics_button_selector,
                &self.site.all_characteristics_labels,
            )
            .await;

        for container in &self.site.characteristics_containers {
            if session.wait_for(container, Duration::ZERO).await {
                report.container = Some(container.clone());
                break;
            }
        }

        match &report.container {
            Some(container) => {
                report.expand_controls_clicked = session
                    .click_all_within(container, &self.site.expand_control_selector)
                    .await;
                report.scrolled = session.scroll_through(container).await;
            }
            None => debug!("No characteristics container present before extraction"),
        }

        debug!("Reveal finished: {:?}", report);
        report
    }

    /// Extract all raw candidates from a page snapshot
    pub fn extract(&self, snapshot: &PageSnapshot) -> RawExtraction {
        let document = Html::parse_document(&snapshot.html);

        let structured = self.structured_data(&document);
        if structured.is_none() {
            let context = LogContext::new("extractor", "structured_data")
                .with_url(snapshot.url.clone())
                .with_status("degraded");
            log_warn!(context, "No product structured data found");
        }

        let characteristics = self.characteristics(&document);
        if characteristics.is_empty() {
            let context = LogContext::new("extractor", "characteristics")
                .with_url(snapshot.url.clone())
                .with_status("degraded")
                .with_number_field("containers_tried", self.site.characteristics_containers.len() as i64);
            log_warn!(context, "No characteristics rows found");
        }

        RawExtraction {
            url: snapshot.url.clone(),
            title: page_title(&document),
            structured,
            characteristics,
            review_count: self.review_count(&document),
            page_images: self.page_images(&document, &snapshot.url),
        }
    }

    fn structured_data(&self, document: &Html) -> Option<Map<String, Value>> {
        let selector = parse_selector(&self.site.structured_data_selector)?;
        let blocks: Vec<String> = document
            .select(&selector)
            .map(|script| script.text().collect::<String>())
            .collect();
        find_product_block(blocks.iter().map(String::as_str))
    }

    fn characteristics(&self, document: &Html) -> Characteristics {
        let (Some(row_selector), Some(cell_selector), Some(link_selector)) = (
            parse_selector(&self.site.row_selector),
            parse_selector(&self.site.cell_selector),
            parse_selector(&self.site.link_selector),
        ) else {
            return Characteristics::new();
        };

        for container_selector in &self.site.characteristics_containers {
            let Some(selector) = parse_selector(container_selector) else {
                continue;
            };
            if let Some(container) = document.select(&selector).next() {
                let rows = collect_rows(container, &row_selector, &cell_selector, &link_selector);
                debug!("Collected {} characteristics rows from {}", rows.len(), container_selector);
                return rows;
            }
        }

        Characteristics::new()
    }

    fn review_count(&self, document: &Html) -> Option<u32> {
        for candidate in &self.site.review_count_selectors {
            let Some(selector) = parse_selector(candidate) else {
                continue;
            };
            if let Some(element) = document.select(&selector).next() {
                let text = element_text(&element);
                if is_all_digits(&text) {
                    return text.parse().ok();
                }
                debug!("Review count text is not numeric: {:?}", text);
                return None;
            }
        }
        None
    }

    fn page_images(&self, document: &Html, page_url: &str) -> Vec<String> {
        let Some(selector) = parse_selector(&self.site.image_selector) else {
            return Vec::new();
        };
        document
            .select(&selector)
            .filter_map(|img| img.value().attr("src"))
            .filter_map(|src| resolve_url(page_url, src))
            .collect()
    }
}

/// Find the first product-typed entry among raw structured-data blocks
pub fn find_product_block<'b>(blocks: impl IntoIterator<Item = &'b str>) -> Option<Map<String, Value>> {
    for (index, text) in blocks.into_iter().enumerate() {
        match serde_json::from_str::<Value>(text.trim()) {
            Ok(value) => {
                if let Some(product) = product_entry(value) {
                    return Some(product);
                }
            }
            Err(e) => debug!("Skipping malformed structured-data block {}: {}", index, e),
        }
    }
    None
}

fn product_entry(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Array(items) => items.into_iter().find_map(product_entry),
        Value::Object(mut map) => {
            if is_product_type(map.get("@type")) {
                return Some(map);
            }
            map.remove("@graph").and_then(product_entry)
        }
        _ => None,
    }
}

fn is_product_type(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(kind)) => kind == "Product",
        Some(Value::Array(kinds)) => kinds.iter().any(|kind| kind.as_str() == Some("Product")),
        _ => false,
    }
}

fn collect_rows(
    container: ElementRef<'_>,
    row_selector: &Selector,
    cell_selector: &Selector,
    link_selector: &Selector,
) -> Characteristics {
    let mut rows = Characteristics::new();

    for row in container.select(row_selector) {
        let cells: Vec<ElementRef<'_>> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|child| cell_selector.matches(child))
            .collect();
        if cells.is_empty() {
            continue;
        }
        if let Some((key, value)) = parse_row(row, &cells, link_selector) {
            rows.insert(key, value);
        }
    }

    rows
}

fn parse_row(row: ElementRef<'_>, cells: &[ElementRef<'_>], link_selector: &Selector) -> Option<(String, String)> {
    let key = element_text(&cells[0]);
    if key.is_empty() {
        return None;
    }

    let mut value = cells.get(1).map(element_text).unwrap_or_default();

    if value.is_empty() {
        value = row
            .select(link_selector)
            .map(|link| element_text(&link))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
    }

    if value.is_empty() {
        let row_text = collapse_whitespace(&row.text().collect::<Vec<_>>().join(" "));
        if let Some((before, after)) = row_text.split_once(':') {
            if collapse_whitespace(before) == key {
                value = collapse_whitespace(after);
            }
        }
    }

    Some((key, value))
}

fn element_text(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn page_title(document: &Html) -> Option<String> {
    let selector = parse_selector("title")?;
    document
        .select(&selector)
        .next()
        .map(|title| element_text(&title))
        .filter(|title| !title.is_empty())
}

#[cfg(test)]
mod tests {
    use super::super::testing::FakeSession;
    use super::*;

    const PAGE_URL: &str = "https://brain.com.ua/ukr/Mobilniy_telefon_Apple_iPhone_15_128GB_Black-p1044347.html";

    fn extract(html: &str) -> RawExtraction {
        let site = SiteConfig::default();
        Extractor::new(&site).extract(&PageSnapshot::new(PAGE_URL, html))
    }

    #[test]
    fn test_characteristics_rows() {
        let raw = extract(
            r#"<html><body>
            <div id="br-pr-7">
              <div class="br-pr-chr-item">
                <div><span>Модель</span><span> iPhone 15 </span></div>
                <div><span>Вбудована
                    пам'ять</span><span>128 ГБ</span></div>
                <div><span></span><span>orphan</span></div>
              </div>
            </div>
            </body></html>"#,
        );

        let keys: Vec<&str> = raw.characteristics.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Модель", "Вбудована пам'ять"]);
        assert_eq!(raw.characteristics["Модель"], "iPhone 15");
        assert_eq!(raw.characteristics["Вбудована пам'ять"], "128 ГБ");
    }

    #[test]
    fn test_empty_value_falls_back_to_links() {
        let raw = extract(
            r#"<div id="br-pr-7">
                 <div><span>Колір</span><span></span><a href="/c/red">Red, Blue</a></div>
               </div>"#,
        );
        assert_eq!(raw.characteristics["Колір"], "Red, Blue");
    }

    #[test]
    fn test_multiple_links_are_joined() {
        let raw = extract(
            r#"<div id="br-pr-7">
                 <div><span>Колір</span><span></span><a>Red</a><a> </a><a>Blue</a></div>
               </div>"#,
        );
        assert_eq!(raw.characteristics["Колір"], "Red, Blue");
    }

    #[test]
    fn test_colon_split_fallback() {
        let raw = extract(
            r#"<div id="br-pr-7">
                 <div><span>Діагональ екрану</span>: 6.1"</div>
                 <div><span>Гарантія</span>Термін: 12 міс.</div>
               </div>"#,
        );
        assert_eq!(raw.characteristics["Діагональ екрану"], "6.1\"");
        assert_eq!(raw.characteristics["Гарантія"], "");
    }

    #[test]
    fn test_duplicate_keys_overwrite() {
        let raw = extract(
            r#"<div id="br-pr-7">
                 <div><span>Колір</span><span>Black</span></div>
                 <div><span>Модель</span><span>iPhone 15</span></div>
                 <div><span>Колір</span><span>Blue</span></div>
               </div>"#,
        );
        assert_eq!(raw.characteristics.len(), 2);
        assert_eq!(raw.characteristics["Колір"], "Blue");
        assert_eq!(raw.characteristics.get_index(0).map(|(k, _)| k.as_str()), Some("Колір"));
    }

    #[test]
    fn test_fallback_container() {
        let raw = extract(
            r#"<div id="br-characteristics">
                 <div><span>Виробник</span><span>Apple</span></div>
               </div>"#,
        );
        assert_eq!(raw.characteristics["Виробник"], "Apple");
    }

    #[test]
    fn test_structured_data_selection() {
        let raw = extract(
            r#"<head>
            <script type="application/ld+json">{ not json</script>
            <script type="application/ld+json">{"@type": "BreadcrumbList"}</script>
            <script type="application/ld+json">
              [{"@type": "Organization"}, {"@type": ["Product"], "name": "Apple iPhone 15", "sku": "U0882"}]
            </script>
            <script type="application/ld+json">{"@type": "Product", "name": "second"}</script>
            </head>"#,
        );

        let structured = raw.structured.unwrap();
        assert_eq!(structured["name"], "Apple iPhone 15");
        assert_eq!(structured["sku"], "U0882");
    }

    #[test]
    fn test_structured_data_graph() {
        let product = find_product_block([r#"{"@graph": [{"@type": "WebPage"}, {"@type": "Product", "mpn": "MTP03"}]}"#]);
        assert_eq!(product.unwrap()["mpn"], "MTP03");

        assert!(find_product_block(["[]", "42", r#"{"@type": "Offer"}"#]).is_none());
    }

    #[test]
    fn test_review_count() {
        let raw = extract(
            r#"<div class="comments-average-rating-stars"></div>
               <div class="br-pp-r"><span> 17 </span></div>"#,
        );
        assert_eq!(raw.review_count, Some(17));

        let raw = extract(r#"<span class="forbid-click reviews-count"><span>5</span></span>"#);
        assert_eq!(raw.review_count, Some(5));

        let raw = extract(r#"<span class="forbid-click reviews-count"><span>немає відгуків</span></span>"#);
        assert_eq!(raw.review_count, None);
    }

    #[test]
    fn test_page_images_and_title() {
        let raw = extract(
            r#"<html><head><title>  Apple iPhone 15
               128GB Black </title></head><body>
               <img src="/static/p1.jpg"><img src=""><img alt="no source">
               <img src="https://cdn.brain.com.ua/p2.jpg">
               </body></html>"#,
        );
        assert_eq!(raw.title.as_deref(), Some("Apple iPhone 15 128GB Black"));
        assert_eq!(
            raw.page_images,
            vec![
                "https://brain.com.ua/static/p1.jpg".to_string(),
                "https://cdn.brain.com.ua/p2.jpg".to_string(),
            ]
        );
    }

    #[test]
    fn test_empty_page() {
        let raw = extract("<html></html>");
        assert!(raw.structured.is_none());
        assert!(raw.characteristics.is_empty());
        assert!(raw.review_count.is_none());
        assert!(raw.page_images.is_empty());
        assert_eq!(raw.url, PAGE_URL);
    }

    #[tokio::test]
    async fn test_reveal_is_best_effort() {
        let site = SiteConfig::default();
        let mut session = FakeSession::new().with_page(
            PAGE_URL,
            r##"<a class="scroll-to-element-after" href="#br-characteristics">Характеристики</a>
               <div id="br-pr-7"><div><span>Колір</span><span>Black</span></div></div>"##,
        );
        session.open(PAGE_URL).await.unwrap();

        let report = Extractor::new(&site).reveal(&mut session, Duration::ZERO).await;

        assert!(!report.tab_opened);
        assert!(!report.all_characteristics_shown);
        assert_eq!(report.container.as_deref(), Some("#br-pr-7"));
        assert!(report.scrolled);
        assert!(session.actions.iter().any(|a| a == "click_all_within #br-pr-7"));
    }
}
