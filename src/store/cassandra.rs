//! Cassandra / Scylla backend.
//!
//! The `scylla` driver is async; the store owns a small private tokio
//! runtime and every call blocks a writer thread on it, so the bounded
//! writer pool still caps the number of requests in flight.

use std::time::Duration;

use futures::TryStreamExt;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::errors::{ExecutionError, RequestAttemptError};
use scylla::statement::prepared::PreparedStatement;
use scylla::statement::unprepared::Statement;
use scylla::value::CqlTimestamp;
use tokio::runtime::{Builder, Runtime};

use super::{insert_statement, select_statement, Store, StoreError, TABLE_NAME};
use crate::record::SaleRecord;

/// Bound on establishing the first connection to the cluster.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Driver threads; the writers do the fan-out, not the runtime.
const RUNTIME_THREADS: usize = 2;

/// Column layout of the sales table, in `SALES_FIELDS` order.
type SalesRow = (
    String,
    String,
    String,
    String,
    String,
    f64,
    i32,
    f64,
    CqlTimestamp,
    String,
    String,
    String,
    f64,
);

/// CQL definition of the sales table inside `keyspace`.
pub fn create_table_cql(keyspace: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {keyspace}.{TABLE_NAME} (
            state text,
            category text,
            transaction_id text,
            customer_id text,
            product_id text,
            price double,
            quantity int,
            total_value double,
            purchase_date timestamp,
            city text,
            payment_method text,
            device_type text,
            rating double,
            PRIMARY KEY ((state), category, transaction_id)
        )"
    )
}

/// Connection settings beyond the address.
#[derive(Debug, Clone, Default)]
pub struct CassandraOptions {
    /// Per-write deadline; a breach becomes a timeout failure for that record.
    pub write_timeout: Option<Duration>,
    /// Create the sales table if it does not exist.
    pub create_table: bool,
}

pub struct CassandraStore {
    runtime: Runtime,
    session: Session,
    write_timeout: Option<Duration>,
}

/// Map a driver error onto the loader's failure kinds. A connection that
/// broke under the request counts as lost, the same as an empty pool.
fn classify(err: ExecutionError) -> StoreError {
    match err {
        ExecutionError::ConnectionPoolError(e) => StoreError::Unreachable(e.to_string()),
        ExecutionError::LastAttemptError(RequestAttemptError::BrokenConnectionError(e)) => {
            StoreError::Unreachable(e.to_string())
        }
        ExecutionError::RequestTimeout(deadline) => StoreError::Timeout(deadline),
        other => StoreError::Rejected(other.to_string()),
    }
}

fn row_to_record(row: SalesRow) -> SaleRecord {
    let (
        state,
        category,
        transaction_id,
        customer_id,
        product_id,
        price,
        quantity,
        total_value,
        purchase_date,
        city,
        payment_method,
        device_type,
        rating,
    ) = row;
    SaleRecord {
        state,
        category,
        transaction_id,
        customer_id,
        product_id,
        price,
        quantity,
        total_value,
        purchase_ts_ms: purchase_date.0,
        city,
        payment_method,
        device_type,
        rating,
    }
}

impl CassandraStore {
    /// Connect to `hosts` and open `keyspace`.
    ///
    /// Fails with [`StoreError::Unreachable`] if no node answers or the
    /// keyspace cannot be used.
    pub fn connect(
        hosts: &[String],
        port: u16,
        keyspace: &str,
        options: &CassandraOptions,
    ) -> Result<Self, StoreError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(RUNTIME_THREADS)
            .thread_name("marketload-cql")
            .enable_all()
            .build()
            .map_err(|e| StoreError::Unreachable(format!("failed to start runtime: {e}")))?;

        let nodes: Vec<String> = hosts.iter().map(|h| format!("{h}:{port}")).collect();
        let session = runtime.block_on(async {
            let session = SessionBuilder::new()
                .known_nodes(&nodes)
                .connection_timeout(CONNECT_TIMEOUT)
                .build()
                .await
                .map_err(|e| StoreError::Unreachable(e.to_string()))?;
            if options.create_table {
                session
                    .query_unpaged(create_table_cql(keyspace), ())
                    .await
                    .map_err(|e| StoreError::Unreachable(e.to_string()))?;
            }
            session
                .use_keyspace(keyspace, false)
                .await
                .map_err(|e| StoreError::Unreachable(format!("keyspace {keyspace}: {e}")))?;
            Ok::<_, StoreError>(session)
        })?;

        tracing::debug!("Connected to {} (keyspace {keyspace})", nodes.join(","));
        Ok(Self {
            runtime,
            session,
            write_timeout: options.write_timeout,
        })
    }

    fn read_rows(
        &self,
        statement: Statement,
        visit: &mut dyn FnMut(SaleRecord),
    ) -> Result<u64, StoreError> {
        self.runtime.handle().block_on(async {
            let pager = self
                .session
                .query_iter(statement, ())
                .await
                .map_err(|e| StoreError::Rejected(e.to_string()))?;
            let mut rows = pager
                .rows_stream::<SalesRow>()
                .map_err(|e| StoreError::Rejected(e.to_string()))?;
            let mut visited = 0u64;
            while let Some(row) = rows
                .try_next()
                .await
                .map_err(|e| StoreError::Rejected(e.to_string()))?
            {
                visited += 1;
                visit(row_to_record(row));
            }
            Ok(visited)
        })
    }
}

impl Store for CassandraStore {
    type Prepared = PreparedStatement;

    fn name(&self) -> &'static str {
        "cassandra"
    }

    fn prepare_insert(&self) -> Result<Self::Prepared, StoreError> {
        self.runtime
            .handle()
            .block_on(self.session.prepare(insert_statement()))
            .map_err(|e| StoreError::Unreachable(e.to_string()))
    }

    fn insert(&self, prepared: &Self::Prepared, record: &SaleRecord) -> Result<(), StoreError> {
        let values = (
            record.state.as_str(),
            record.category.as_str(),
            record.transaction_id.as_str(),
            record.customer_id.as_str(),
            record.product_id.as_str(),
            record.price,
            record.quantity,
            record.total_value,
            CqlTimestamp(record.purchase_ts_ms),
            record.city.as_str(),
            record.payment_method.as_str(),
            record.device_type.as_str(),
            record.rating,
        );
        let handle = self.runtime.handle();
        let result = match self.write_timeout {
            Some(deadline) => handle.block_on(async {
                tokio::time::timeout(deadline, self.session.execute_unpaged(prepared, values))
                    .await
                    .map_err(|_| StoreError::Timeout(deadline))
            })?,
            None => handle.block_on(self.session.execute_unpaged(prepared, values)),
        };
        result.map(|_| ()).map_err(classify)
    }

    fn sample(&self, limit: usize) -> Result<Vec<SaleRecord>, StoreError> {
        let mut statement = Statement::new(format!("{} LIMIT {limit}", select_statement()));
        statement.set_page_size(limit.clamp(1, i32::MAX as usize) as i32);
        let mut records = Vec::with_capacity(limit);
        self.read_rows(statement, &mut |r| records.push(r))?;
        Ok(records)
    }

    fn scan(
        &self,
        page_size: usize,
        visit: &mut dyn FnMut(SaleRecord),
    ) -> Result<u64, StoreError> {
        let mut statement = Statement::new(select_statement());
        statement.set_page_size(page_size.clamp(1, i32::MAX as usize) as i32);
        self.read_rows(statement, visit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FailureKind;
    use scylla::errors::{BrokenConnectionError, BrokenConnectionErrorKind, ConnectionPoolError};
    use std::io;

    #[test]
    fn test_create_table_targets_keyspace() {
        let cql = create_table_cql("marketplace_ks");
        assert!(cql.starts_with("CREATE TABLE IF NOT EXISTS marketplace_ks.sales_transactions"));
        assert!(cql.contains("PRIMARY KEY ((state), category, transaction_id)"));
    }

    #[test]
    fn test_row_conversion() {
        let row: SalesRow = (
            "SP".into(),
            "Livros".into(),
            "T000000001".into(),
            "C000001".into(),
            "P0000001".into(),
            19.9,
            2,
            39.8,
            CqlTimestamp(1_600_000_000_000),
            "Santos".into(),
            "pix".into(),
            "mobile".into(),
            4.5,
        );
        let record = row_to_record(row);
        assert_eq!(record.transaction_id, "T000000001");
        assert_eq!(record.quantity, 2);
        assert_eq!(record.purchase_ts_ms, 1_600_000_000_000);
    }

    #[test]
    fn test_broken_connection_is_connection_lost() {
        let broken = BrokenConnectionError::from(BrokenConnectionErrorKind::WriteError(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        )));
        let err = classify(ExecutionError::LastAttemptError(
            RequestAttemptError::BrokenConnectionError(broken),
        ));
        assert!(matches!(err, StoreError::Unreachable(_)));
        assert_eq!(err.kind(), FailureKind::ConnectionLost);

        let err = classify(ExecutionError::ConnectionPoolError(
            ConnectionPoolError::Initializing,
        ));
        assert_eq!(err.kind(), FailureKind::ConnectionLost);
    }

    #[test]
    fn test_request_timeout() {
        let err = classify(ExecutionError::RequestTimeout(Duration::from_secs(2)));
        assert_eq!(err, StoreError::Timeout(Duration::from_secs(2)));
    }

    #[test]
    fn test_unreachable_cluster() {
        // Nothing listens on port 1; the session builder must fail, not hang.
        let err = CassandraStore::connect(
            &["127.0.0.1".to_string()],
            1,
            "marketplace_ks",
            &CassandraOptions::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, StoreError::Unreachable(_)));
    }
}
