use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw key/value rows scraped from the characteristics region.
///
/// Keys are kept exactly as found on the page. Inserting an existing key
/// replaces its value but keeps the position of the first occurrence.
pub type Characteristics = IndexMap<String, String>;

pub const DEFAULT_CURRENCY: &str = "UAH";

/// Canonical fields whose absence is reported in `missing_fields`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedField {
    Name,
    Sku,
    Manufacturer,
    Color,
    Memory,
    ScreenSize,
    Resolution,
    Characteristics,
}

impl TrackedField {
    /// Fixed evaluation order, also the serialized order
    pub const ALL: [TrackedField; 8] = [
        TrackedField::Name,
        TrackedField::Sku,
        TrackedField::Manufacturer,
        TrackedField::Color,
        TrackedField::Memory,
        TrackedField::ScreenSize,
        TrackedField::Resolution,
        TrackedField::Characteristics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackedField::Name => "name",
            TrackedField::Sku => "sku",
            TrackedField::Manufacturer => "manufacturer",
            TrackedField::Color => "color",
            TrackedField::Memory => "memory",
            TrackedField::ScreenSize => "screen_size",
            TrackedField::Resolution => "resolution",
            TrackedField::Characteristics => "characteristics",
        }
    }
}

impl fmt::Display for TrackedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical product record produced once per run.
///
/// Every field is serialized, including absent ones (as `null`), so the
/// intermediate file always carries the full schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub name: Option<String>,
    pub url: String,
    pub sku: Option<String>,
    pub mpn: Option<String>,
    pub manufacturer: Option<String>,
    pub color: Option<String>,
    pub memory: Option<String>,
    pub screen_size: Option<String>,
    pub resolution: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub sale_price: Option<Decimal>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub rating: Option<Decimal>,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub characteristics: Characteristics,
    #[serde(default)]
    pub missing_fields: Vec<TrackedField>,
    #[serde(default = "empty_object")]
    pub raw_source: serde_json::Value,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl ProductRecord {
    /// Empty record for a loaded page
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            name: None,
            url: url.into(),
            sku: None,
            mpn: None,
            manufacturer: None,
            color: None,
            memory: None,
            screen_size: None,
            resolution: None,
            description: None,
            price: None,
            sale_price: None,
            currency: default_currency(),
            images: Vec::new(),
            rating: None,
            review_count: 0,
            characteristics: Characteristics::new(),
            missing_fields: Vec::new(),
            raw_source: empty_object(),
        }
    }

    /// True when the resolved value of `field` is absent or empty
    pub fn is_blank(&self, field: TrackedField) -> bool {
        let text = match field {
            TrackedField::Name => &self.name,
            TrackedField::Sku => &self.sku,
            TrackedField::Manufacturer => &self.manufacturer,
            TrackedField::Color => &self.color,
            TrackedField::Memory => &self.memory,
            TrackedField::ScreenSize => &self.screen_size,
            TrackedField::Resolution => &self.resolution,
            TrackedField::Characteristics => return self.characteristics.is_empty(),
        };
        text.as_deref().map_or(true, |value| value.trim().is_empty())
    }

    /// Recompute `missing_fields` from the current field values
    pub fn refresh_missing_fields(&mut self) {
        self.missing_fields = TrackedField::ALL
            .iter()
            .copied()
            .filter(|field| self.is_blank(*field))
            .collect();
    }

    pub fn is_missing(&self, field: TrackedField) -> bool {
        self.missing_fields.contains(&field)
    }

    /// Short label for logs and listings
    pub fn label(&self) -> String {
        match (&self.name, &self.sku) {
            (Some(name), Some(sku)) => format!("{} ({})", name, sku),
            (Some(name), None) => name.clone(),
            _ => self.url.clone(),
        }
    }
}
