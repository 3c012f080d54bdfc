//! Accessors over the structured-data (JSON-LD) product entry.
//!
//! Values on real pages are loosely typed: numbers arrive as strings and
//! single objects as one-element arrays. Every accessor returns `None`
//! instead of guessing.

use regex::Regex;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::LazyLock;

use crate::utils::non_empty;

type Entry = Map<String, Value>;

static PLAIN_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").expect("hardcoded regex pattern is valid")
});

/// Text of a string or number field
pub fn text_field(entry: &Entry, key: &str) -> Option<String> {
    value_text(entry.get(key)?)
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => non_empty(text),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// `brand.name`, or `brand` itself when given as a plain string
pub fn brand_name(entry: &Entry) -> Option<String> {
    match entry.get("brand")? {
        Value::Object(brand) => text_field(brand, "name"),
        Value::String(brand) => non_empty(brand),
        _ => None,
    }
}

/// The offer to read prices from: the object itself or the first array entry
pub fn first_offer(entry: &Entry) -> Option<&Entry> {
    match entry.get("offers")? {
        Value::Object(offer) => Some(offer),
        Value::Array(offers) => offers.iter().find_map(Value::as_object),
        _ => None,
    }
}

pub fn offer_price(entry: &Entry) -> Option<Decimal> {
    decimal_value(first_offer(entry)?.get("price")?)
}

pub fn offer_currency(entry: &Entry) -> Option<String> {
    text_field(first_offer(entry)?, "priceCurrency")
}

fn aggregate_rating(entry: &Entry) -> Option<&Entry> {
    entry.get("aggregateRating")?.as_object()
}

pub fn rating_value(entry: &Entry) -> Option<Decimal> {
    decimal_value(aggregate_rating(entry)?.get("ratingValue")?)
}

pub fn rating_review_count(entry: &Entry) -> Option<u32> {
    match aggregate_rating(entry)?.get("reviewCount")? {
        Value::Number(count) => count.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(count) => count.trim().parse().ok(),
        _ => None,
    }
}

/// `image` entries when given as an array; other shapes yield nothing
pub fn image_list(entry: &Entry) -> Vec<String> {
    match entry.get("image") {
        Some(Value::Array(images)) => images
            .iter()
            .filter_map(Value::as_str)
            .filter_map(non_empty)
            .collect(),
        _ => Vec::new(),
    }
}

fn decimal_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => parse_decimal(&number.to_string()),
        Value::String(text) => parse_decimal(text),
        _ => None,
    }
}

/// Parse a plain decimal literal such as `41999`, `41999.00` or `4.5`.
///
/// Grouping separators, currency signs and comma decimals are rejected.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    if !PLAIN_NUMBER.is_match(text) {
        return None;
    }
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}
