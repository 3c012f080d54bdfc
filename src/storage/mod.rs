use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub mod migrations;

use crate::config::DatabaseConfig;
use crate::error::ScrapeError;
use crate::product::ProductRecord;

/// SQLite-backed product store.
///
/// Rows are keyed by `url`: saving a page that is already stored replaces
/// its fields, keeps `created_at` and bumps `updated_at`.
pub struct ProductStore {
    connection: Arc<Mutex<Connection>>,
}

/// A stored product with its bookkeeping columns
#[derive(Debug, Clone)]
pub struct StoredProduct {
    pub id: i64,
    pub record: ProductRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const PRODUCT_COLUMNS: &str = "id, name, url, sku, mpn, manufacturer, color, memory, description, \
     price, sale_price, currency, images, rating, review_count, screen_size, resolution, \
     characteristics, missing_fields, raw_source, created_at, updated_at";

impl ProductStore {
    /// Open (or create) the database and bring its schema up to date
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Opening product database: {}", config.path.display());

        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ScrapeError::database(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let connection = Connection::open(&config.path).map_err(ScrapeError::from)?;
        Self::with_connection(connection)
    }

    /// Store backed by a private in-memory database
    pub fn in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory().map_err(ScrapeError::from)?;
        Self::with_connection(connection)
    }

    fn with_connection(connection: Connection) -> Result<Self> {
        connection
            .execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(ScrapeError::from)?;
        migrations::run_migrations(&connection)?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Insert the record, or update the row already stored for its URL.
    /// Returns the row id.
    pub async fn upsert(&self, record: &ProductRecord) -> Result<i64> {
        self.upsert_at(record, Utc::now()).await
    }

    async fn upsert_at(&self, record: &ProductRecord, now: DateTime<Utc>) -> Result<i64> {
        let images = serde_json::to_string(&record.images).context("Failed to encode images column")?;
        let characteristics = serde_json::to_string(&record.characteristics).context("Failed to encode characteristics column")?;
        let missing_fields = serde_json::to_string(&record.missing_fields).context("Failed to encode missing_fields column")?;
        let raw_source = serde_json::to_string(&record.raw_source).context("Failed to encode raw_source column")?;

        let conn = self.connection.lock().await;
        let id: i64 = conn
            .query_row(
                "INSERT INTO product (
                    name, url, sku, mpn, manufacturer, color, memory, description,
                    price, sale_price, currency, images, rating, review_count,
                    screen_size, resolution, characteristics, missing_fields, raw_source,
                    created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                           ?15, ?16, ?17, ?18, ?19, ?20, ?20)
                 ON CONFLICT(url) DO UPDATE SET
                    name = excluded.name,
                    sku = excluded.sku,
                    mpn = excluded.mpn,
                    manufacturer = excluded.manufacturer,
                    color = excluded.color,
                    memory = excluded.memory,
                    description = excluded.description,
                    price = excluded.price,
                    sale_price = excluded.sale_price,
                    currency = excluded.currency,
                    images = excluded.images,
                    rating = excluded.rating,
                    review_count = excluded.review_count,
                    screen_size = excluded.screen_size,
                    resolution = excluded.resolution,
                    characteristics = excluded.characteristics,
                    missing_fields = excluded.missing_fields,
                    raw_source = excluded.raw_source,
                    updated_at = excluded.updated_at
                 RETURNING id",
                params![
                    record.name,
                    record.url,
                    record.sku,
                    record.mpn,
                    record.manufacturer,
                    record.color,
                    record.memory,
                    record.description,
                    record.price.map(|d| d.to_string()),
                    record.sale_price.map(|d| d.to_string()),
                    record.currency,
                    images,
                    record.rating.map(|d| d.to_string()),
                    record.review_count,
                    record.screen_size,
                    record.resolution,
                    characteristics,
                    missing_fields,
                    raw_source,
                    now.timestamp(),
                ],
                |row| row.get(0),
            )
            .map_err(ScrapeError::from)?;

        info!("Saved product {} as row {}", record.label(), id);
        Ok(id)
    }

    /// Get a stored product by page URL
    pub async fn get_by_url(&self, url: &str) -> Result<Option<StoredProduct>> {
        let conn = self.connection.lock().await;

        let product = conn
            .query_row(
                &format!("SELECT {} FROM product WHERE url = ?1", PRODUCT_COLUMNS),
                params![url],
                product_from_row,
            )
            .optional()
            .map_err(ScrapeError::from)?;

        Ok(product)
    }

    /// List stored products, most recently updated first
    pub async fn list(&self, limit: usize) -> Result<Vec<StoredProduct>> {
        let conn = self.connection.lock().await;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM product ORDER BY updated_at DESC, id DESC LIMIT ?1",
                PRODUCT_COLUMNS
            ))
            .map_err(ScrapeError::from)?;

        let products = stmt
            .query_map(params![limit as i64], product_from_row)
            .map_err(ScrapeError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(ScrapeError::from)?;

        debug!("Listed {} stored products", products.len());
        Ok(products)
    }

    pub async fn count(&self) -> Result<usize> {
        let conn = self.connection.lock().await;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM product", [], |row| row.get(0))
            .map_err(ScrapeError::from)?;
        Ok(count as usize)
    }
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<StoredProduct> {
    let record = ProductRecord {
        name: row.get(1)?,
        url: row.get(2)?,
        sku: row.get(3)?,
        mpn: row.get(4)?,
        manufacturer: row.get(5)?,
        color: row.get(6)?,
        memory: row.get(7)?,
        description: row.get(8)?,
        price: decimal_column(row, 9)?,
        sale_price: decimal_column(row, 10)?,
        currency: row.get(11)?,
        images: json_column(row, 12)?,
        rating: decimal_column(row, 13)?,
        review_count: row.get(14)?,
        screen_size: row.get(15)?,
        resolution: row.get(16)?,
        characteristics: json_column(row, 17)?,
        missing_fields: json_column(row, 18)?,
        raw_source: json_column(row, 19)?,
    };

    Ok(StoredProduct {
        id: row.get(0)?,
        record,
        created_at: DateTime::from_timestamp(row.get(20)?, 0).unwrap_or_else(Utc::now),
        updated_at: DateTime::from_timestamp(row.get(21)?, 0).unwrap_or_else(Utc::now),
    })
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, index: usize) -> rusqlite::Result<T> {
    let text: String = row.get(index)?;
    serde_json::from_str(&text).map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn decimal_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<Decimal>> {
    let text: Option<String> = row.get(index)?;
    text.map(|value| {
        Decimal::from_str(&value)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
    })
    .transpose()
}
