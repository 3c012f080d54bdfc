use anyhow::Result;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::ScrapeError;
use crate::log_info;
use crate::export::{ExportStats, ResultsFile};
use crate::logging::{LogContext, StageTimer};
use crate::normalize::Normalizer;
use crate::product::ProductRecord;
use crate::scraper::{self, Extractor, Locator, PageSession, PageSnapshot};
use crate::storage::{ProductStore, StoredProduct};
use crate::utils::{format_duration, generate_run_id, is_valid_page_url};

/// What to scrape: a known product page or a search query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Url(String),
    Query(String),
}

/// Result of one extraction run
#[derive(Debug, Clone)]
pub struct ExtractOutcome {
    pub record: ProductRecord,
    pub export: ExportStats,
    /// Row id when the record was saved to the database
    pub row_id: Option<i64>,
}

/// Runs the Locator → Extractor → Normalizer → Sink pipeline
pub struct BrainScrape {
    config: AppConfig,
    normalizer: Normalizer,
    results: ResultsFile,
}

impl BrainScrape {
    pub fn new(config: AppConfig) -> Result<Self> {
        let normalizer = Normalizer::new(&config.normalizer)?;
        let results = ResultsFile::new(&config.output);

        Ok(Self {
            config,
            normalizer,
            results,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Resolve a query to the first matching product page
    pub async fn locate(&self, query: &str) -> Result<String> {
        let mut session = scraper::launch(&self.config).await?;
        self.locate_in(session.as_mut(), query).await
    }

    /// Locate with an already started session, closing it afterwards
    pub async fn locate_in(&self, session: &mut dyn PageSession, query: &str) -> Result<String> {
        let run_id = generate_run_id();
        let timer = StageTimer::new(
            LogContext::new("locator", "locate")
                .with_run_id(run_id)
                .with_string_field("query", query),
        );

        let result = self.locate_with(session, query).await;
        close_session(session).await;

        match result {
            Ok(url) => {
                timer.finish("Product located");
                Ok(url)
            }
            Err(e) => {
                timer.finish_with_error("Locating product failed", &e);
                Err(e)
            }
        }
    }

    /// Scrape one product and write the results file, optionally saving it
    pub async fn extract(&self, target: Target, save: bool) -> Result<ExtractOutcome> {
        if let Target::Url(url) = &target {
            if !is_valid_page_url(url) {
                return Err(ScrapeError::InvalidUrl { url: url.clone() }.into());
            }
        }

        let mut session = scraper::launch(&self.config).await?;
        self.extract_in(session.as_mut(), target, save).await
    }

    /// Extract with an already started session.
    ///
    /// The session is closed once the page is scraped, before anything is
    /// written, whether or not scraping succeeded.
    pub async fn extract_in(
        &self,
        session: &mut dyn PageSession,
        target: Target,
        save: bool,
    ) -> Result<ExtractOutcome> {
        let started = Instant::now();
        let run_id = generate_run_id();
        info!("Starting extraction run {} for {:?}", run_id, target);

        let timer = StageTimer::new(LogContext::new("pipeline", "page").with_run_id(run_id.clone()));
        let result = self.scrape_with(session, &target).await;
        close_session(session).await;

        let record = match result {
            Ok(record) => {
                timer.finish("Page scraped");
                record
            }
            Err(e) => {
                timer.finish_with_error("Page scrape failed", &e);
                return Err(e);
            }
        };

        let outcome = self.deliver(record, save, &run_id).await?;
        info!("Run {} finished in {}", run_id, format_duration(started.elapsed()));
        Ok(outcome)
    }

    /// Save the record from the results file to the database
    pub async fn replay(&self, path: Option<&Path>) -> Result<(ProductRecord, i64)> {
        let file = match path {
            Some(path) => ResultsFile::at(path),
            None => ResultsFile::new(&self.config.output),
        };

        let record = file.read().await?;
        info!("Replaying {} from {}", record.url, file.path().display());

        let row_id = self.open_store().await?.upsert(&record).await?;
        Ok((record, row_id))
    }

    /// Stored products, optionally restricted to one page
    pub async fn list_products(&self, url: Option<&str>, limit: usize) -> Result<Vec<StoredProduct>> {
        let store = self.open_store().await?;
        match url {
            Some(url) => Ok(store.get_by_url(url).await?.into_iter().collect()),
            None => store.list(limit).await,
        }
    }

    async fn open_store(&self) -> Result<ProductStore> {
        ProductStore::new(&self.config.database).await
    }

    async fn locate_with(&self, session: &mut dyn PageSession, query: &str) -> Result<String> {
        let locator = Locator::new(&self.config.site, self.config.step_timeout());
        locator
            .locate(session, query)
            .await?
            .ok_or_else(|| ScrapeError::ProductNotFound { query: query.to_string() }.into())
    }

    /// Load the product page and turn it into a record
    async fn scrape_with(&self, session: &mut dyn PageSession, target: &Target) -> Result<ProductRecord> {
        let timeout = self.config.step_timeout();
        let site = &self.config.site;

        match target {
            Target::Url(url) => session.open(url).await?,
            Target::Query(query) => {
                let url = self.locate_with(session, query).await?;
                info!("Using first search result: {}", url);
            }
        }

        if !session.wait_for(&site.structured_data_selector, timeout).await {
            debug!("Structured data did not appear within {:?}", timeout);
        }

        let extractor = Extractor::new(site);
        let report = extractor.reveal(session, timeout).await;
        if report.container.is_none() {
            warn!("Characteristics region not found on the page");
        }

        let snapshot = PageSnapshot::capture(session).await?;
        let raw = extractor.extract(&snapshot);
        let record = self.normalizer.normalize(&raw);

        let context = LogContext::new("normalizer", "normalize")
            .with_url(record.url.clone())
            .with_number_field("characteristics", record.characteristics.len() as i64)
            .with_number_field("missing_fields", record.missing_fields.len() as i64);
        log_info!(context, format!("Extracted {}", record.label()));
        Ok(record)
    }

    /// Write the results file, then upsert when requested
    async fn deliver(&self, record: ProductRecord, save: bool, run_id: &str) -> Result<ExtractOutcome> {
        let timer = StageTimer::new(
            LogContext::new("sink", "file")
                .with_run_id(run_id)
                .with_url(record.url.clone()),
        );
        let export = match self.results.write(&record).await {
            Ok(stats) => {
                timer.finish("Results file written");
                stats
            }
            Err(e) => {
                timer.finish_with_error("Writing results file failed", &e);
                return Err(e);
            }
        };

        let row_id = if save {
            let timer = StageTimer::new(
                LogContext::new("sink", "database")
                    .with_run_id(run_id)
                    .with_url(record.url.clone()),
            );
            let saved = async { self.open_store().await?.upsert(&record).await }.await;
            match saved {
                Ok(id) => {
                    timer.finish("Record saved");
                    Some(id)
                }
                Err(e) => {
                    timer.finish_with_error("Saving record failed", &e);
                    return Err(e);
                }
            }
        } else {
            debug!("Database save skipped");
            None
        };

        Ok(ExtractOutcome { record, export, row_id })
    }
}

async fn close_session(session: &mut dyn PageSession) {
    if let Err(e) = session.close().await {
        warn!("Failed to close {} session: {}", session.backend(), e);
    }
}
