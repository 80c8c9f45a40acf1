//! Read-back aggregation reports.
//!
//! A full paginated scan of the sales table is folded into three
//! aggregates, each written as a CSV file:
//!
//! - `receita_estado_categoria.csv`: revenue per state and category, with
//!   the category's share of its state's revenue
//! - `preco_rating_por_produto.csv`: mean price, mean rating and transaction
//!   count per product
//! - `vendas_por_mes.csv`: revenue and transaction count per `YYYY-MM`
//!
//! The scan is streamed into running sums, so memory grows with the number
//! of groups rather than the number of rows.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::config::AnalyzeConfig;
use crate::record::SaleRecord;
use crate::store::Store;

pub const REVENUE_REPORT: &str = "receita_estado_categoria.csv";
pub const PRODUCT_REPORT: &str = "preco_rating_por_produto.csv";
pub const MONTHLY_REPORT: &str = "vendas_por_mes.csv";

#[derive(Debug, Default, Clone, Copy)]
struct ProductTotals {
    price_sum: f64,
    rating_sum: f64,
    count: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct MonthTotals {
    revenue: f64,
    count: u64,
}

/// Running group-by state for the three reports.
#[derive(Debug, Default)]
pub struct SalesAggregates {
    rows: u64,
    revenue: HashMap<(String, String), f64>,
    products: BTreeMap<String, ProductTotals>,
    months: BTreeMap<String, MonthTotals>,
    undated: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RevenueRow {
    pub state: String,
    pub category: String,
    pub total_revenue: f64,
    pub state_total_revenue: f64,
    pub share_in_state: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductRow {
    pub product_id: String,
    pub avg_price: f64,
    pub avg_rating: f64,
    pub num_transactions: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthRow {
    pub year_month: String,
    pub total_revenue: f64,
    pub num_transactions: u64,
}

impl SalesAggregates {
    pub fn add(&mut self, record: &SaleRecord) {
        self.rows += 1;
        *self
            .revenue
            .entry((record.state.clone(), record.category.clone()))
            .or_default() += record.total_value;

        let product = self.products.entry(record.product_id.clone()).or_default();
        product.price_sum += record.price;
        product.rating_sum += record.rating;
        product.count += 1;

        match record.year_month() {
            Some(month) => {
                let totals = self.months.entry(month).or_default();
                totals.revenue += record.total_value;
                totals.count += 1;
            }
            None => self.undated += 1,
        }
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Sorted by state ascending, then revenue descending.
    pub fn revenue_by_state_category(&self) -> Vec<RevenueRow> {
        let mut state_totals: HashMap<&str, f64> = HashMap::new();
        for ((state, _), revenue) in &self.revenue {
            *state_totals.entry(state.as_str()).or_default() += revenue;
        }
        let mut rows: Vec<RevenueRow> = self
            .revenue
            .iter()
            .map(|((state, category), &total_revenue)| {
                let state_total_revenue = state_totals[state.as_str()];
                RevenueRow {
                    state: state.clone(),
                    category: category.clone(),
                    total_revenue,
                    state_total_revenue,
                    share_in_state: if state_total_revenue != 0.0 {
                        total_revenue / state_total_revenue
                    } else {
                        0.0
                    },
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            a.state
                .cmp(&b.state)
                .then(b.total_revenue.total_cmp(&a.total_revenue))
                .then(a.category.cmp(&b.category))
        });
        rows
    }

    /// Sorted by product id.
    pub fn price_rating_by_product(&self) -> Vec<ProductRow> {
        self.products
            .iter()
            .map(|(product_id, t)| ProductRow {
                product_id: product_id.clone(),
                avg_price: t.price_sum / t.count as f64,
                avg_rating: t.rating_sum / t.count as f64,
                num_transactions: t.count,
            })
            .collect()
    }

    /// Sorted by month.
    pub fn sales_by_month(&self) -> Vec<MonthRow> {
        self.months
            .iter()
            .map(|(year_month, t)| MonthRow {
                year_month: year_month.clone(),
                total_revenue: t.revenue,
                num_transactions: t.count,
            })
            .collect()
    }
}

/// Quote a CSV field if it needs it.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn write_csv(path: &Path, header: &str, lines: impl Iterator<Item = String>) -> Result<usize> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    writeln!(out, "{header}")?;
    let mut n = 0;
    for line in lines {
        writeln!(out, "{line}")?;
        n += 1;
    }
    out.flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(n)
}

/// Write the three reports into `dir`, returning their paths.
pub fn write_reports(aggregates: &SalesAggregates, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

    let revenue_path = dir.join(REVENUE_REPORT);
    let n = write_csv(
        &revenue_path,
        "state,category,total_revenue,state_total_revenue,share_in_state",
        aggregates.revenue_by_state_category().into_iter().map(|r| {
            format!(
                "{},{},{:.2},{:.2},{:.6}",
                csv_field(&r.state),
                csv_field(&r.category),
                r.total_revenue,
                r.state_total_revenue,
                r.share_in_state
            )
        }),
    )?;
    info!("Wrote {} ({n} rows)", revenue_path.display());

    let product_path = dir.join(PRODUCT_REPORT);
    let n = write_csv(
        &product_path,
        "product_id,avg_price,avg_rating,num_transactions",
        aggregates.price_rating_by_product().into_iter().map(|r| {
            format!(
                "{},{:.2},{:.3},{}",
                csv_field(&r.product_id),
                r.avg_price,
                r.avg_rating,
                r.num_transactions
            )
        }),
    )?;
    info!("Wrote {} ({n} rows)", product_path.display());

    let month_path = dir.join(MONTHLY_REPORT);
    let n = write_csv(
        &month_path,
        "year_month,total_revenue,num_transactions",
        aggregates
            .sales_by_month()
            .into_iter()
            .map(|r| format!("{},{:.2},{}", r.year_month, r.total_revenue, r.num_transactions)),
    )?;
    info!("Wrote {} ({n} rows)", month_path.display());

    Ok(vec![revenue_path, product_path, month_path])
}

/// Scan the whole store and write the reports.
///
/// Fails if the scan fails or returns no rows.
pub fn run_analysis<S: Store>(store: &S, config: &AnalyzeConfig) -> Result<Vec<PathBuf>> {
    config.validate()?;
    info!(
        "Scanning {} store (page size {})",
        store.name(),
        config.page_size
    );

    let mut aggregates = SalesAggregates::default();
    let every = config.progress_every.max(1);
    let scanned = store
        .scan(config.page_size, &mut |record| {
            aggregates.add(&record);
            if aggregates.rows() % every == 0 {
                info!("Rows read: {}", aggregates.rows());
            }
        })
        .context("Failed to scan sales table")?;
    info!("Total rows read: {scanned}");

    if scanned == 0 {
        bail!("No rows returned from the sales table");
    }
    if aggregates.undated > 0 {
        tracing::warn!(
            "{} rows have an out-of-range purchase date and are missing from the monthly report",
            aggregates.undated
        );
    }
    write_reports(&aggregates, &config.output_dir)
}
