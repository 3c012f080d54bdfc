//! brain-scrape: single-product scraper for the brain.com.ua storefront
//!
//! The crate drives a page session to find a product, extracts its embedded
//! structured data and characteristics table, reconciles them into one
//! canonical [`ProductRecord`] and stores it:
//! - Locator: query to product page address
//! - Extractor: raw candidates from the loaded page
//! - Normalizer: per-field resolution chains and `missing_fields`
//! - Sink: intermediate JSON file and SQLite upsert

pub mod config;
pub mod core;
pub mod error;
pub mod export;
pub mod logging;
pub mod normalize;
pub mod product;
pub mod scraper;
pub mod storage;
pub mod utils;

// Re-export main types for convenience
pub use crate::config::AppConfig;
pub use crate::core::{BrainScrape, ExtractOutcome, Target};
pub use crate::error::ScrapeError;
pub use crate::product::{ProductRecord, TrackedField};
