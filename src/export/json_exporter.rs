use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::path::Path;
use tracing::{debug, info};

use crate::error::ScrapeError;
use crate::product::ProductRecord;

const INDENT: &[u8] = b"    ";

/// Render a record as pretty JSON with 4-space indentation.
///
/// Non-ASCII text is written as UTF-8, never escaped.
pub fn render_record(record: &ProductRecord) -> Result<String> {
    let mut buffer = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(INDENT));
    record
        .serialize(&mut serializer)
        .context("Failed to serialize product record")?;
    let text = String::from_utf8(buffer).context("Serialized record is not UTF-8")?;
    Ok(text)
}

/// Write the record to `path`, replacing any previous file
pub async fn write_record(record: &ProductRecord, path: &Path) -> Result<u64> {
    debug!("Writing product record to {}", path.display());

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ScrapeError::OutputPath {
                path: parent.display().to_string(),
                message: e.to_string(),
            })?;
    }

    let text = render_record(record)?;
    tokio::fs::write(path, text.as_bytes())
        .await
        .map_err(|e| ScrapeError::FileWrite {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    let file_size = tokio::fs::metadata(path).await?.len();

    info!("JSON export completed: {} ({} bytes)", path.display(), file_size);
    Ok(file_size)
}

/// Read a record previously written by [`write_record`]
pub async fn read_record(path: &Path) -> Result<ProductRecord> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ScrapeError::FileRead {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    let record: ProductRecord = serde_json::from_str(&content).map_err(|e| ScrapeError::FileRead {
        path: path.display().to_string(),
        message: format!("not a product record: {}", e),
    })?;

    debug!("Read product record for {} from {}", record.url, path.display());
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::TrackedField;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use tempfile::TempDir;

    fn sample_record() -> ProductRecord {
        let mut record = ProductRecord::new("https://brain.com.ua/ukr/Mobilniy_telefon_Apple_iPhone_15_128GB_Black-p1044347.html");
        record.name = Some("Apple iPhone 15 128GB Black".to_string());
        record.sku = Some("U0882389".to_string());
        record.price = Decimal::from_str("41999.00").ok();
        record.rating = Decimal::from_str("4.9").ok();
        record.review_count = 8;
        record.characteristics.insert("Модель".to_string(), "iPhone 15".to_string());
        record.characteristics.insert("Вбудована пам'ять".to_string(), "128 ГБ".to_string());
        record.characteristics.insert("Колір".to_string(), "Black".to_string());
        record.raw_source = serde_json::json!({"@type": "Product", "name": "Apple iPhone 15 128GB Black"});
        record.refresh_missing_fields();
        record
    }

    #[test]
    fn test_render_format() {
        let text = render_record(&sample_record()).unwrap();

        assert!(text.starts_with("{\n    \"name\": \"Apple iPhone 15 128GB Black\",\n    \"url\""));
        assert!(text.contains("\"Вбудована пам'ять\": \"128 ГБ\""));
        assert!(text.contains("\"price\": \"41999.00\""));
        assert!(text.contains("\"sale_price\": null"));
        assert!(!text.contains("\\u"));

        let model = text.find("Модель").unwrap();
        let memory = text.find("Вбудована").unwrap();
        let color = text.find("Колір").unwrap();
        assert!(model < memory && memory < color);
    }

    #[tokio::test]
    async fn test_file_round_trip_is_byte_identical() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("results").join("last_product.json");

        let record = sample_record();
        write_record(&record, &path).await.unwrap();
        let first = tokio::fs::read(&path).await.unwrap();

        let loaded = read_record(&path).await.unwrap();
        assert_eq!(loaded, record);
        assert!(loaded.is_missing(TrackedField::Manufacturer));

        write_record(&loaded, &path).await.unwrap();
        let second = tokio::fs::read(&path).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_write_overwrites_previous_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("last_product.json");

        write_record(&sample_record(), &path).await.unwrap();
        let smaller = ProductRecord::new("https://brain.com.ua/ukr/p2.html");
        write_record(&smaller, &path).await.unwrap();

        let loaded = read_record(&path).await.unwrap();
        assert_eq!(loaded.url, "https://brain.com.ua/ukr/p2.html");
    }

    #[tokio::test]
    async fn test_unwritable_output_directory() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("results");
        tokio::fs::write(&blocker, b"not a directory").await.unwrap();

        let err = write_record(&sample_record(), &blocker.join("last_product.json"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScrapeError>(),
            Some(ScrapeError::OutputPath { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_missing_or_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("last_product.json");
        assert!(read_record(&path).await.is_err());

        tokio::fs::write(&path, b"{\"name\": 1}").await.unwrap();
        let err = read_record(&path).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScrapeError>(),
            Some(ScrapeError::FileRead { .. })
        ));
    }
}
