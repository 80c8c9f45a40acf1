//! Sales record model shared by the loader, the store backends and the
//! read-back reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One marketplace sale, as read from the source table and written to the store.
///
/// # Fields
/// - `transaction_id`: Unique key of the sale
/// - `price`, `total_value`: Monetary amounts (two decimal places in practice)
/// - `purchase_ts_ms`: Purchase time in milliseconds since the Unix epoch, UTC
/// - `rating`: Customer rating between 1.0 and 5.0
///
/// Note: Cannot derive `Eq` because of the `f64` fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub state: String,
    pub category: String,
    pub transaction_id: String,
    pub customer_id: String,
    pub product_id: String,
    pub price: f64,
    pub quantity: i32,
    pub total_value: f64,
    pub purchase_ts_ms: i64,
    pub city: String,
    pub payment_method: String,
    pub device_type: String,
    pub rating: f64,
}

impl SaleRecord {
    /// Purchase time as a UTC datetime, if the stored millis are in range.
    pub fn purchased_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.purchase_ts_ms)
    }

    /// Calendar month of the purchase formatted as `YYYY-MM`.
    pub fn year_month(&self) -> Option<String> {
        self.purchased_at()
            .map(|ts| ts.format("%Y-%m").to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_month() {
        let record = SaleRecord {
            // 2021-03-15T10:00:00Z
            purchase_ts_ms: 1_615_802_400_000,
            ..SaleRecord::default()
        };
        assert_eq!(record.year_month().as_deref(), Some("2021-03"));
    }

    #[test]
    fn test_epoch_default() {
        let record = SaleRecord::default();
        assert_eq!(record.year_month().as_deref(), Some("1970-01"));
    }
}
