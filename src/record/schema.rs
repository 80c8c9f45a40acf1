//! Arrow schema definitions for the sales table.
//!
//! `sales_schema()` is the layout written by the generator. The reader does
//! not require it verbatim: columns are looked up by name and any encoding
//! listed by [`FieldKind::accepts`] is coerced to the canonical type.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, Float64Builder, Int32Builder, RecordBatch, StringBuilder,
    TimestampMillisecondBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::error::ArrowError;

use super::SaleRecord;

/// Broad type family of a sales column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Float,
    Integer,
    Timestamp,
}

impl FieldKind {
    /// Human-readable name used in schema mismatch errors.
    pub fn describe(self) -> &'static str {
        match self {
            FieldKind::Text => "string",
            FieldKind::Float => "decimal",
            FieldKind::Integer => "integer",
            FieldKind::Timestamp => "timestamp",
        }
    }

    /// Returns true if a column encoded as `data_type` can be coerced to this kind.
    pub fn accepts(self, data_type: &DataType) -> bool {
        match self {
            FieldKind::Text => is_text(data_type),
            FieldKind::Float => data_type.is_integer() || is_float_like(data_type),
            FieldKind::Integer => data_type.is_integer(),
            FieldKind::Timestamp => matches!(
                data_type,
                DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64
            ),
        }
    }

    /// Canonical type a column of this kind is cast to before decoding.
    ///
    /// Timestamps keep their timezone annotation so the cast only rescales
    /// the unit; the stored values are UTC epoch offsets either way.
    pub fn canonical_type(self, source: &DataType) -> DataType {
        match self {
            FieldKind::Text => DataType::Utf8,
            FieldKind::Float => DataType::Float64,
            FieldKind::Integer => DataType::Int32,
            FieldKind::Timestamp => match source {
                DataType::Timestamp(_, tz) => DataType::Timestamp(TimeUnit::Millisecond, tz.clone()),
                _ => DataType::Timestamp(TimeUnit::Millisecond, None),
            },
        }
    }
}

fn is_text(data_type: &DataType) -> bool {
    match data_type {
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => true,
        DataType::Dictionary(_, value) => is_text(value),
        _ => false,
    }
}

fn is_float_like(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Float16
            | DataType::Float32
            | DataType::Float64
            | DataType::Decimal128(_, _)
            | DataType::Decimal256(_, _)
    )
}

/// Required source columns in the store's insert order.
pub const SALES_FIELDS: [(&str, FieldKind); 13] = [
    ("state", FieldKind::Text),
    ("category", FieldKind::Text),
    ("transaction_id", FieldKind::Text),
    ("customer_id", FieldKind::Text),
    ("product_id", FieldKind::Text),
    ("price", FieldKind::Float),
    ("quantity", FieldKind::Integer),
    ("total_value", FieldKind::Float),
    ("purchase_date", FieldKind::Timestamp),
    ("city", FieldKind::Text),
    ("payment_method", FieldKind::Text),
    ("device_type", FieldKind::Text),
    ("rating", FieldKind::Float),
];

/// Schema for sales parquet files written by the generator.
pub fn sales_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("transaction_id", DataType::Utf8, false),
        Field::new("customer_id", DataType::Utf8, false),
        Field::new("product_id", DataType::Utf8, false),
        Field::new("category", DataType::Utf8, false),
        Field::new("price", DataType::Float64, false),
        Field::new("quantity", DataType::Int32, false),
        Field::new("total_value", DataType::Float64, false),
        Field::new(
            "purchase_date",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            false,
        ),
        Field::new("city", DataType::Utf8, false),
        Field::new("state", DataType::Utf8, false),
        Field::new("payment_method", DataType::Utf8, false),
        Field::new("device_type", DataType::Utf8, false),
        Field::new("rating", DataType::Float64, false),
    ]))
}

/// Build a record batch in the [`sales_schema`] layout.
pub fn to_record_batch(records: &[SaleRecord]) -> Result<RecordBatch, ArrowError> {
    let n = records.len();
    let mut transaction_id = StringBuilder::with_capacity(n, n * 10);
    let mut customer_id = StringBuilder::with_capacity(n, n * 7);
    let mut product_id = StringBuilder::with_capacity(n, n * 8);
    let mut category = StringBuilder::new();
    let mut price = Float64Builder::with_capacity(n);
    let mut quantity = Int32Builder::with_capacity(n);
    let mut total_value = Float64Builder::with_capacity(n);
    let mut purchase_date = TimestampMillisecondBuilder::with_capacity(n);
    let mut city = StringBuilder::new();
    let mut state = StringBuilder::new();
    let mut payment_method = StringBuilder::new();
    let mut device_type = StringBuilder::new();
    let mut rating = Float64Builder::with_capacity(n);

    for r in records {
        transaction_id.append_value(&r.transaction_id);
        customer_id.append_value(&r.customer_id);
        product_id.append_value(&r.product_id);
        category.append_value(&r.category);
        price.append_value(r.price);
        quantity.append_value(r.quantity);
        total_value.append_value(r.total_value);
        purchase_date.append_value(r.purchase_ts_ms);
        city.append_value(&r.city);
        state.append_value(&r.state);
        payment_method.append_value(&r.payment_method);
        device_type.append_value(&r.device_type);
        rating.append_value(r.rating);
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(transaction_id.finish()),
        Arc::new(customer_id.finish()),
        Arc::new(product_id.finish()),
        Arc::new(category.finish()),
        Arc::new(price.finish()),
        Arc::new(quantity.finish()),
        Arc::new(total_value.finish()),
        Arc::new(purchase_date.finish()),
        Arc::new(city.finish()),
        Arc::new(state.finish()),
        Arc::new(payment_method.finish()),
        Arc::new(device_type.finish()),
        Arc::new(rating.finish()),
    ];
    RecordBatch::try_new(sales_schema(), columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_accepts_dictionary() {
        let dict = DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8));
        assert!(FieldKind::Text.accepts(&dict));
        assert!(!FieldKind::Text.accepts(&DataType::Int64));
    }

    #[test]
    fn test_integer_rejects_float() {
        assert!(FieldKind::Integer.accepts(&DataType::Int64));
        assert!(!FieldKind::Integer.accepts(&DataType::Float64));
        assert!(FieldKind::Float.accepts(&DataType::Int64));
    }

    #[test]
    fn test_timestamp_keeps_timezone() {
        let source = DataType::Timestamp(TimeUnit::Nanosecond, Some("UTC".into()));
        assert_eq!(
            FieldKind::Timestamp.canonical_type(&source),
            DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into()))
        );
        assert_eq!(
            FieldKind::Timestamp.canonical_type(&DataType::Date32),
            DataType::Timestamp(TimeUnit::Millisecond, None)
        );
    }

    #[test]
    fn test_every_schema_field_is_required() {
        let schema = sales_schema();
        for (name, kind) in SALES_FIELDS {
            let field = schema.field_with_name(name).expect("field present");
            assert!(kind.accepts(field.data_type()), "{name} not accepted");
        }
        assert_eq!(schema.fields().len(), SALES_FIELDS.len());
    }

    #[test]
    fn test_to_record_batch_rows() {
        let records = vec![SaleRecord::default(), SaleRecord::default()];
        let batch = to_record_batch(&records).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 13);
    }
}
