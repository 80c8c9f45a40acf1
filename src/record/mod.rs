//! Sales records: the model, its Arrow schema, and Parquet I/O.
//!
//! - [`models`]: the `SaleRecord` tuple
//! - [`schema`]: canonical Arrow layout and accepted source encodings
//! - [`source`]: lazy, restartable reader used by the loader
//! - [`writer`]: streaming writer used by the generator

pub mod models;
pub mod schema;
pub mod source;
#[cfg(test)]
pub(crate) mod test_utils;
pub mod writer;

pub use models::SaleRecord;
pub use source::RecordSource;
pub use writer::{write_sales_parquet, SalesParquetWriter};
