//! Storage backends the loader writes to and the reports read from.
//!
//! Every backend implements [`Store`]: a prepared single-record insert, a
//! bounded sample read for post-load validation, and a paginated full scan.
//! Backends:
//!
//! - [`cassandra`]: Cassandra/Scylla cluster through the `scylla` driver
//! - [`sqlite`]: a local SQLite file
//! - [`memory`]: in-process map for dry runs and tests

pub mod cassandra;
pub mod memory;
pub mod sqlite;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::LoadError;
use crate::record::schema::SALES_FIELDS;
use crate::record::SaleRecord;

pub use cassandra::CassandraStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Table every backend writes to.
pub const TABLE_NAME: &str = "sales_transactions";

/// Default native protocol port.
pub const DEFAULT_CQL_PORT: u16 = 9042;

/// Parameterized insert of the 13 sales fields in [`SALES_FIELDS`] order.
pub fn insert_statement() -> String {
    let columns: Vec<&str> = SALES_FIELDS.iter().map(|(name, _)| *name).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {TABLE_NAME} ({}) VALUES ({placeholders})",
        columns.join(", ")
    )
}

/// Select of the 13 sales fields in [`SALES_FIELDS`] order.
pub fn select_statement() -> String {
    let columns: Vec<&str> = SALES_FIELDS.iter().map(|(name, _)| *name).collect();
    format!("SELECT {} FROM {TABLE_NAME}", columns.join(", "))
}

/// Why a single write did not land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum FailureKind {
    /// The store refused the record (constraint, invalid value, server error).
    Rejected,
    /// The write did not complete before its deadline.
    Timeout,
    /// No connection to the store was available for the write.
    ConnectionLost,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Rejected => write!(f, "rejected"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::ConnectionLost => write!(f, "connection lost"),
        }
    }
}

/// Error returned by a backend operation.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    Unreachable(String),
    Rejected(String),
    Timeout(Duration),
}

impl StoreError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StoreError::Unreachable(_) => FailureKind::ConnectionLost,
            StoreError::Rejected(_) => FailureKind::Rejected,
            StoreError::Timeout(_) => FailureKind::Timeout,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unreachable(msg) => write!(f, "store unreachable: {msg}"),
            StoreError::Rejected(msg) => write!(f, "write rejected: {msg}"),
            StoreError::Timeout(deadline) => {
                write!(f, "write timed out after {}ms", deadline.as_millis())
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for LoadError {
    fn from(err: StoreError) -> Self {
        LoadError::unreachable(err.to_string())
    }
}

/// A session against a sales store.
///
/// Implementations must be usable from many writer threads at once.
pub trait Store: Send + Sync + 'static {
    /// Compiled form of the insert template.
    type Prepared: Send + Sync + 'static;

    /// Short backend name for log lines.
    fn name(&self) -> &'static str;

    /// Compile [`insert_statement`] once for reuse by every write.
    fn prepare_insert(&self) -> Result<Self::Prepared, StoreError>;

    /// Write a single record through the prepared template.
    fn insert(&self, prepared: &Self::Prepared, record: &SaleRecord) -> Result<(), StoreError>;

    /// Read at most `limit` stored records.
    fn sample(&self, limit: usize) -> Result<Vec<SaleRecord>, StoreError>;

    /// Visit every stored record, fetching `page_size` rows per round trip.
    /// Returns the number of records visited.
    fn scan(
        &self,
        page_size: usize,
        visit: &mut dyn FnMut(SaleRecord),
    ) -> Result<u64, StoreError>;
}

/// A shared handle is a store too, so callers can keep inspecting a store
/// after handing it to a job.
impl<S: Store> Store for std::sync::Arc<S> {
    type Prepared = S::Prepared;

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn prepare_insert(&self) -> Result<Self::Prepared, StoreError> {
        (**self).prepare_insert()
    }

    fn insert(&self, prepared: &Self::Prepared, record: &SaleRecord) -> Result<(), StoreError> {
        (**self).insert(prepared, record)
    }

    fn sample(&self, limit: usize) -> Result<Vec<SaleRecord>, StoreError> {
        (**self).sample(limit)
    }

    fn scan(
        &self,
        page_size: usize,
        visit: &mut dyn FnMut(SaleRecord),
    ) -> Result<u64, StoreError> {
        (**self).scan(page_size, visit)
    }
}

/// Where a store lives, parsed from an address such as
/// `cassandra://127.0.0.1:9042/marketplace_ks`, `sqlite:sales.db` or `memory:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    Cassandra {
        hosts: Vec<String>,
        port: u16,
        keyspace: String,
    },
    Sqlite {
        path: PathBuf,
    },
    Memory,
}

impl Default for StoreTarget {
    fn default() -> Self {
        StoreTarget::Cassandra {
            hosts: vec!["127.0.0.1".to_string()],
            port: DEFAULT_CQL_PORT,
            keyspace: "marketplace_ks".to_string(),
        }
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 48
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_cluster(rest: &str) -> Result<StoreTarget, LoadError> {
    let bad = |msg: &str| LoadError::invalid_config("store", format!("{msg}: {rest}"));

    let (authority, keyspace) = rest
        .split_once('/')
        .ok_or_else(|| bad("missing keyspace"))?;
    if !is_identifier(keyspace) {
        return Err(bad("invalid keyspace name"));
    }
    let (hosts, port) = match authority.rsplit_once(':') {
        Some((hosts, port)) => {
            let port = port.parse::<u16>().map_err(|_| bad("invalid port"))?;
            (hosts, port)
        }
        None => (authority, DEFAULT_CQL_PORT),
    };
    let hosts: Vec<String> = hosts
        .split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(String::from)
        .collect();
    if hosts.is_empty() {
        return Err(bad("missing host"));
    }
    Ok(StoreTarget::Cassandra {
        hosts,
        port,
        keyspace: keyspace.to_string(),
    })
}

impl FromStr for StoreTarget {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(rest) = s
            .strip_prefix("cassandra://")
            .or_else(|| s.strip_prefix("scylla://"))
        {
            return parse_cluster(rest);
        }
        if let Some(rest) = s.strip_prefix("sqlite:") {
            let path = rest.strip_prefix("//").unwrap_or(rest);
            if path.is_empty() {
                return Err(LoadError::invalid_config("store", "sqlite address needs a path"));
            }
            return Ok(StoreTarget::Sqlite {
                path: PathBuf::from(path),
            });
        }
        if s == "memory:" || s == "memory://" || s == "memory" {
            return Ok(StoreTarget::Memory);
        }
        Err(LoadError::invalid_config(
            "store",
            format!("unsupported store address: {s}"),
        ))
    }
}

impl fmt::Display for StoreTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreTarget::Cassandra {
                hosts,
                port,
                keyspace,
            } => write!(f, "cassandra://{}:{port}/{keyspace}", hosts.join(",")),
            StoreTarget::Sqlite { path } => write!(f, "sqlite:{}", path.display()),
            StoreTarget::Memory => write!(f, "memory:"),
        }
    }
}
