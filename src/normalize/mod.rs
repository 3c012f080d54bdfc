use anyhow::Result;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

pub mod keywords;
pub mod structured;

use crate::config::NormalizerConfig;
use crate::error::ScrapeError;
use crate::product::{Characteristics, ProductRecord, DEFAULT_CURRENCY};
use crate::scraper::RawExtraction;
use crate::utils::non_empty;
use keywords::{exact_lookup, keyword_scan, palette_match, secondary_scan, Synonyms};

/// Candidate sources a resolver may consult
pub struct Sources<'a> {
    pub structured: Option<&'a Map<String, Value>>,
    pub characteristics: &'a Characteristics,
    /// Resolved product name, or the page title when no name resolved
    pub subject: Option<&'a str>,
}

/// One step of a field's resolution chain
type Resolver = fn(&Normalizer, &Sources<'_>) -> Option<String>;

const NAME_CHAIN: &[Resolver] = &[Normalizer::name_from_model_key, Normalizer::name_from_structured];

const MANUFACTURER_CHAIN: &[Resolver] = &[
    Normalizer::manufacturer_from_brand,
    Normalizer::manufacturer_from_key,
];

const COLOR_CHAIN: &[Resolver] = &[
    Normalizer::color_by_keyword,
    Normalizer::color_by_key,
    Normalizer::color_from_palette,
];

const MEMORY_CHAIN: &[Resolver] = &[
    Normalizer::memory_by_keyword,
    Normalizer::memory_by_key,
    Normalizer::memory_from_pattern,
];

const SCREEN_SIZE_CHAIN: &[Resolver] = &[
    Normalizer::screen_size_by_keyword,
    Normalizer::screen_size_by_key,
    Normalizer::screen_size_secondary,
];

const RESOLUTION_CHAIN: &[Resolver] = &[
    Normalizer::resolution_by_keyword,
    Normalizer::resolution_by_key,
    Normalizer::resolution_secondary,
];

/// Reconciles raw page candidates into one canonical record
pub struct Normalizer {
    config: NormalizerConfig,
    color: Synonyms,
    memory: Synonyms,
    screen_size: Synonyms,
    screen_size_secondary: Synonyms,
    resolution: Synonyms,
    resolution_secondary: Synonyms,
    memory_pattern: Regex,
}

impl Normalizer {
    pub fn new(config: &NormalizerConfig) -> Result<Self> {
        let memory_pattern = Regex::new(&config.memory_pattern)
            .map_err(|e| ScrapeError::config(format!("Invalid memory_pattern: {}", e)))?;

        Ok(Self {
            color: Synonyms::new(&config.color_synonyms),
            memory: Synonyms::new(&config.memory_synonyms),
            screen_size: Synonyms::new(&config.screen_size_synonyms),
            screen_size_secondary: Synonyms::new(&config.screen_size_secondary),
            resolution: Synonyms::new(&config.resolution_synonyms),
            resolution_secondary: Synonyms::new(&config.resolution_secondary),
            memory_pattern,
            config: config.clone(),
        })
    }

    /// Build the canonical record. Never fails; unresolved fields end up in
    /// `missing_fields`.
    pub fn normalize(&self, raw: &RawExtraction) -> ProductRecord {
        let structured = raw.structured.as_ref();
        let mut record = ProductRecord::new(raw.url.clone());

        let mut sources = Sources {
            structured,
            characteristics: &raw.characteristics,
            subject: None,
        };

        record.name = self.resolve("name", NAME_CHAIN, &sources);
        sources.subject = record.name.as_deref().or(raw.title.as_deref());

        record.manufacturer = self.resolve("manufacturer", MANUFACTURER_CHAIN, &sources);
        record.color = self.resolve("color", COLOR_CHAIN, &sources);
        record.memory = self.resolve("memory", MEMORY_CHAIN, &sources);
        record.screen_size = self.resolve("screen_size", SCREEN_SIZE_CHAIN, &sources);
        record.resolution = self.resolve("resolution", RESOLUTION_CHAIN, &sources);

        if let Some(entry) = structured {
            record.sku = structured::text_field(entry, "sku");
            record.mpn = structured::text_field(entry, "mpn");
            record.description = structured::text_field(entry, "description");
            record.price = structured::offer_price(entry);
            record.rating = structured::rating_value(entry);
            record.images = structured::image_list(entry);
        }

        record.currency = structured
            .and_then(structured::offer_currency)
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        if record.images.is_empty() {
            record.images = raw.page_images.clone();
        }

        record.review_count = raw
            .review_count
            .or_else(|| structured.and_then(structured::rating_review_count))
            .unwrap_or(0);

        record.characteristics = raw.characteristics.clone();
        record.raw_source = structured
            .map(|entry| Value::Object(entry.clone()))
            .unwrap_or_else(|| Value::Object(Map::new()));

        record.refresh_missing_fields();
        if !record.missing_fields.is_empty() {
            debug!(
                "Unresolved fields for {}: {}",
                record.url,
                record
                    .missing_fields
                    .iter()
                    .map(|field| field.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        record
    }

    fn resolve(&self, field: &str, chain: &[Resolver], sources: &Sources<'_>) -> Option<String> {
        for (step, resolver) in chain.iter().enumerate() {
            if let Some(value) = resolver(self, sources).as_deref().and_then(non_empty) {
                debug!("{} resolved by step {}: {}", field, step + 1, value);
                return Some(value);
            }
        }
        None
    }

    fn name_from_model_key(&self, sources: &Sources<'_>) -> Option<String> {
        exact_lookup(sources.characteristics, &self.config.model_keys)
    }

    fn name_from_structured(&self, sources: &Sources<'_>) -> Option<String> {
        structured::text_field(sources.structured?, "name")
    }

    fn manufacturer_from_brand(&self, sources: &Sources<'_>) -> Option<String> {
        structured::brand_name(sources.structured?)
    }

    fn manufacturer_from_key(&self, sources: &Sources<'_>) -> Option<String> {
        exact_lookup(sources.characteristics, &self.config.manufacturer_keys)
    }

    fn color_by_keyword(&self, sources: &Sources<'_>) -> Option<String> {
        keyword_scan(sources.characteristics, &self.color, self.config.match_order)
    }

    fn color_by_key(&self, sources: &Sources<'_>) -> Option<String> {
        exact_lookup(sources.characteristics, &self.config.color_keys)
    }

    fn color_from_palette(&self, sources: &Sources<'_>) -> Option<String> {
        palette_match(sources.subject?, &self.config.color_palette)
    }

    fn memory_by_keyword(&self, sources: &Sources<'_>) -> Option<String> {
        keyword_scan(sources.characteristics, &self.memory, self.config.match_order)
    }

    fn memory_by_key(&self, sources: &Sources<'_>) -> Option<String> {
        exact_lookup(sources.characteristics, &self.config.memory_keys)
    }

    fn memory_from_pattern(&self, sources: &Sources<'_>) -> Option<String> {
        let captures = self.memory_pattern.captures(sources.subject?)?;
        captures
            .get(1)
            .or_else(|| captures.get(0))
            .map(|m| m.as_str().to_string())
    }

    fn screen_size_by_keyword(&self, sources: &Sources<'_>) -> Option<String> {
        keyword_scan(sources.characteristics, &self.screen_size, self.config.match_order)
    }

    fn screen_size_by_key(&self, sources: &Sources<'_>) -> Option<String> {
        exact_lookup(sources.characteristics, &self.config.screen_size_keys)
    }

    fn screen_size_secondary(&self, sources: &Sources<'_>) -> Option<String> {
        secondary_scan(sources.characteristics, &self.screen_size_secondary)
    }

    fn resolution_by_keyword(&self, sources: &Sources<'_>) -> Option<String> {
        keyword_scan(sources.characteristics, &self.resolution, self.config.match_order)
    }

    fn resolution_by_key(&self, sources: &Sources<'_>) -> Option<String> {
        exact_lookup(sources.characteristics, &self.config.resolution_keys)
    }

    fn resolution_secondary(&self, sources: &Sources<'_>) -> Option<String> {
        secondary_scan(sources.characteristics, &self.resolution_secondary)
    }
}
