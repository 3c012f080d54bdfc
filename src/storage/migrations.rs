use anyhow::Result;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::ScrapeError;

/// Database schema version
const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Run all necessary database migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    debug!("Running database migrations");

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )
    .map_err(ScrapeError::from)?;

    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    for version in (current_version + 1)..=CURRENT_SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        apply_migration(conn, version).map_err(|e| {
            tracing::error!("Migration {} failed: {}", version, e);
            ScrapeError::Migration { version }
        })?;
        update_schema_version(conn, version)?;
    }

    Ok(())
}

/// Get current schema version
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    let version: i32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))
        .map_err(ScrapeError::from)?;
    Ok(version)
}

fn update_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![version, chrono::Utc::now().timestamp()],
    )
    .map_err(ScrapeError::from)?;
    Ok(())
}

fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => apply_migration_v1(conn),
        _ => Err(anyhow::anyhow!("Unknown migration version: {}", version)),
    }
}

/// Migration v1: product table
fn apply_migration_v1(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE product (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT,
            url TEXT NOT NULL UNIQUE,
            sku TEXT,
            mpn TEXT,
            manufacturer TEXT,
            color TEXT,
            memory TEXT,
            description TEXT,
            price TEXT,
            sale_price TEXT,
            currency TEXT NOT NULL DEFAULT 'UAH',
            images TEXT NOT NULL DEFAULT '[]',
            rating TEXT,
            review_count INTEGER NOT NULL DEFAULT 0,
            screen_size TEXT,
            resolution TEXT,
            characteristics TEXT NOT NULL DEFAULT '{}',
            missing_fields TEXT NOT NULL DEFAULT '[]',
            raw_source TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX idx_product_sku ON product (sku);
        CREATE INDEX idx_product_updated_at ON product (updated_at);",
    )?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'product'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn test_url_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let insert = "INSERT INTO product (url, created_at, updated_at) VALUES ('https://brain.com.ua/ukr/p1', 0, 0)";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }

    #[test]
    fn test_failed_migration_rolls_back() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE schema_version (version INTEGER PRIMARY KEY, applied_at INTEGER NOT NULL);")
            .unwrap();
        conn.execute_batch("CREATE INDEX idx_product_sku ON schema_version (version);")
            .unwrap();

        let err = run_migrations(&conn).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScrapeError>(),
            Some(ScrapeError::Migration { version: 1 })
        ));

        assert!(conn.is_autocommit());
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'product'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 0);
        assert_eq!(get_schema_version(&conn).unwrap(), 0);
    }
}
