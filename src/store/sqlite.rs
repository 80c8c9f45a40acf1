//! SQLite backend.
//!
//! A single connection is shared by all writer threads behind a mutex; the
//! insert template lives in the connection's statement cache so it is
//! compiled once per session. `purchase_date` is stored as epoch millis.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, ErrorCode, OpenFlags, Row};

use super::{insert_statement, select_statement, Store, StoreError, TABLE_NAME};
use crate::record::SaleRecord;

/// How long a write waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQL schema for the sales table.
pub const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS sales_transactions (
    state TEXT NOT NULL,
    category TEXT NOT NULL,
    transaction_id TEXT NOT NULL PRIMARY KEY,
    customer_id TEXT NOT NULL,
    product_id TEXT NOT NULL,
    price REAL NOT NULL,
    quantity INTEGER NOT NULL,
    total_value REAL NOT NULL,
    purchase_date INTEGER NOT NULL,
    city TEXT NOT NULL,
    payment_method TEXT NOT NULL,
    device_type TEXT NOT NULL,
    rating REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sales_state_category
    ON sales_transactions(state, category);
"#;

pub fn create_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)
}

/// Compiled insert for the SQLite backend: the key into the statement cache.
#[derive(Debug, Clone)]
pub struct SqlitePrepared {
    sql: String,
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn classify(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            StoreError::Timeout(BUSY_TIMEOUT)
        }
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::CannotOpen | ErrorCode::NotADatabase) =>
        {
            StoreError::Unreachable(err.to_string())
        }
        _ => StoreError::Rejected(err.to_string()),
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<SaleRecord> {
    Ok(SaleRecord {
        state: row.get(0)?,
        category: row.get(1)?,
        transaction_id: row.get(2)?,
        customer_id: row.get(3)?,
        product_id: row.get(4)?,
        price: row.get(5)?,
        quantity: row.get(6)?,
        total_value: row.get(7)?,
        purchase_ts_ms: row.get(8)?,
        city: row.get(9)?,
        payment_method: row.get(10)?,
        device_type: row.get(11)?,
        rating: row.get(12)?,
    })
}

impl SqliteStore {
    /// Open an existing database whose sales table is already present.
    ///
    /// With `create_table` the file and table are created if missing.
    pub fn open(path: &Path, create_table: bool) -> Result<Self, StoreError> {
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI;
        if create_table {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| StoreError::Unreachable(format!("{}: {e}", path.display())))?;
        Self::from_connection(conn, create_table)
    }

    /// Private in-memory database with the schema applied.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        Self::from_connection(conn, true)
    }

    fn from_connection(conn: Connection, create_table: bool) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(classify)?;
        if create_table {
            create_schema(&conn).map_err(|e| StoreError::Unreachable(e.to_string()))?;
        }
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![TABLE_NAME],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        if tables == 0 {
            return Err(StoreError::Unreachable(format!(
                "table {TABLE_NAME} does not exist"
            )));
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unreachable("sqlite connection poisoned".to_string()))
    }
}

impl Store for SqliteStore {
    type Prepared = SqlitePrepared;

    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn prepare_insert(&self) -> Result<Self::Prepared, StoreError> {
        let sql = insert_statement();
        let conn = self.lock()?;
        conn.prepare_cached(&sql)
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        Ok(SqlitePrepared { sql })
    }

    fn insert(&self, prepared: &Self::Prepared, record: &SaleRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&prepared.sql).map_err(classify)?;
        stmt.execute(params![
            record.state,
            record.category,
            record.transaction_id,
            record.customer_id,
            record.product_id,
            record.price,
            record.quantity,
            record.total_value,
            record.purchase_ts_ms,
            record.city,
            record.payment_method,
            record.device_type,
            record.rating,
        ])
        .map_err(classify)?;
        Ok(())
    }

    fn sample(&self, limit: usize) -> Result<Vec<SaleRecord>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("{} LIMIT ?1", select_statement());
        let mut stmt = conn.prepare(&sql).map_err(classify)?;
        let rows = stmt
            .query_map(params![limit as i64], row_to_record)
            .map_err(classify)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(classify)
    }

    fn scan(
        &self,
        page_size: usize,
        visit: &mut dyn FnMut(SaleRecord),
    ) -> Result<u64, StoreError> {
        let page_size = page_size.max(1);
        let sql = format!(
            "{} WHERE transaction_id > ?1 ORDER BY transaction_id LIMIT ?2",
            select_statement()
        );
        let mut last = String::new();
        let mut visited = 0u64;
        loop {
            let page: Vec<SaleRecord> = {
                let conn = self.lock()?;
                let mut stmt = conn.prepare_cached(&sql).map_err(classify)?;
                let rows = stmt
                    .query_map(params![last, page_size as i64], row_to_record)
                    .map_err(classify)?;
                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(classify)?
            };
            let Some(tail) = page.last() else {
                return Ok(visited);
            };
            last = tail.transaction_id.clone();
            let full = page.len() == page_size;
            for record in page {
                visited += 1;
                visit(record);
            }
            if !full {
                return Ok(visited);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_utils::sample_records;
    use tempfile::TempDir;

    #[test]
    fn test_insert_and_sample() {
        let store = SqliteStore::open_in_memory().unwrap();
        let prepared = store.prepare_insert().unwrap();
        let records = sample_records(10);
        for record in &records {
            store.insert(&prepared, record).unwrap();
        }
        let sample = store.sample(5).unwrap();
        assert_eq!(sample.len(), 5);
        assert!(sample.iter().all(|r| records.contains(r)));
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let prepared = store.prepare_insert().unwrap();
        let record = sample_records(1).remove(0);
        store.insert(&prepared, &record).unwrap();
        let err = store.insert(&prepared, &record).unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)), "got {err:?}");
    }

    #[test]
    fn test_missing_table_is_unreachable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.db");
        Connection::open(&path).unwrap();
        let err = SqliteStore::open(&path, false).err().unwrap();
        assert!(matches!(err, StoreError::Unreachable(_)));
    }

    #[test]
    fn test_missing_file_without_create_is_unreachable() {
        let dir = TempDir::new().unwrap();
        let err = SqliteStore::open(&dir.path().join("absent.db"), false)
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::Unreachable(_)));
    }

    #[test]
    fn test_scan_visits_all_rows_in_key_order() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&dir.path().join("sales.db"), true).unwrap();
        let prepared = store.prepare_insert().unwrap();
        let records = sample_records(23);
        for record in records.iter().rev() {
            store.insert(&prepared, record).unwrap();
        }
        let mut seen = Vec::new();
        let visited = store.scan(5, &mut |r| seen.push(r)).unwrap();
        assert_eq!(visited, 23);
        assert_eq!(seen, records);
    }
}
