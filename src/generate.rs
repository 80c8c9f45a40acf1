//! Synthetic marketplace dataset.
//!
//! Produces a Parquet file in the layout the loader reads, with every
//! random choice drawn from a [`StdRng`] seeded by the caller so runs are
//! reproducible.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;
use tracing::info;

use crate::config::GenerateConfig;
use crate::record::{SaleRecord, SalesParquetWriter};

/// Category, sampling weight, and uniform price range.
const CATEGORIES: [(&str, f64, (f64, f64)); 12] = [
    ("Eletrônicos", 0.13, (100.0, 4000.0)),
    ("Casa & Cozinha", 0.08, (30.0, 800.0)),
    ("Moda", 0.12, (20.0, 600.0)),
    ("Livros", 0.07, (15.0, 200.0)),
    ("Esportes", 0.08, (40.0, 1500.0)),
    ("Beleza", 0.07, (10.0, 400.0)),
    ("Brinquedos", 0.07, (20.0, 500.0)),
    ("Pet Shop", 0.06, (10.0, 600.0)),
    ("Mercado", 0.12, (5.0, 300.0)),
    ("Informática", 0.08, (80.0, 3000.0)),
    ("Móveis", 0.06, (150.0, 5000.0)),
    ("Automotivo", 0.06, (50.0, 2500.0)),
];

const STATES: [&str; 16] = [
    "SP", "RJ", "MG", "ES", "PR", "SC", "RS", "BA", "PE", "CE", "DF", "GO", "MT", "MS", "AM", "PA",
];

const CITIES: [&str; 16] = [
    "São Paulo",
    "Rio de Janeiro",
    "Belo Horizonte",
    "Curitiba",
    "Porto Alegre",
    "Salvador",
    "Fortaleza",
    "Recife",
    "Brasília",
    "Campinas",
    "Niterói",
    "Santos",
    "Florianópolis",
    "Vitória",
    "Goiania",
    "Manaus",
];

const PAYMENT_METHODS: [(&str, f64); 4] = [
    ("cartao_credito", 0.45),
    ("pix", 0.30),
    ("boleto", 0.15),
    ("carteira_digital", 0.10),
];

const DEVICE_TYPES: [(&str, f64); 3] = [("desktop", 0.30), ("mobile", 0.60), ("tablet", 0.10)];

const RATING_MEAN: f64 = 4.1;
const RATING_STD_DEV: f64 = 0.6;

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Draws records one at a time.
pub struct SalesGenerator {
    rng: StdRng,
    categories: WeightedIndex<f64>,
    payments: WeightedIndex<f64>,
    devices: WeightedIndex<f64>,
    rating: Normal<f64>,
    start_ms: i64,
    span_days: i64,
    next_id: u64,
}

impl SalesGenerator {
    pub fn new(seed: u64) -> Result<Self> {
        let start = NaiveDate::from_ymd_opt(2019, 1, 1).context("invalid start date")?;
        let end = NaiveDate::from_ymd_opt(2024, 12, 31).context("invalid end date")?;
        let start_ms = start
            .and_hms_opt(0, 0, 0)
            .context("invalid start time")?
            .and_utc()
            .timestamp_millis();

        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            categories: WeightedIndex::new(CATEGORIES.iter().map(|c| c.1))?,
            payments: WeightedIndex::new(PAYMENT_METHODS.iter().map(|p| p.1))?,
            devices: WeightedIndex::new(DEVICE_TYPES.iter().map(|d| d.1))?,
            rating: Normal::new(RATING_MEAN, RATING_STD_DEV)?,
            start_ms,
            span_days: (end - start).num_days(),
            next_id: 1,
        })
    }

    pub fn next_record(&mut self) -> SaleRecord {
        let id = self.next_id;
        self.next_id += 1;

        let (category, _, (low, high)) = CATEGORIES[self.categories.sample(&mut self.rng)];
        let price = round_to(self.rng.random_range(low..high), 2);
        let quantity: i32 = self.rng.random_range(1..=5);
        let day = self.rng.random_range(0..=self.span_days);
        let second = self.rng.random_range(0..24 * 60 * 60);
        let offset = Duration::days(day) + Duration::seconds(second);
        let rating = round_to(self.rating.sample(&mut self.rng).clamp(1.0, 5.0), 1);

        SaleRecord {
            state: STATES[self.rng.random_range(0..STATES.len())].to_string(),
            category: category.to_string(),
            transaction_id: format!("T{id:09}"),
            customer_id: format!("C{:06}", self.rng.random_range(1..300_000)),
            product_id: format!("P{:07}", self.rng.random_range(1..50_000)),
            price,
            quantity,
            total_value: round_to(price * quantity as f64, 2),
            purchase_ts_ms: self.start_ms + offset.num_milliseconds(),
            city: CITIES[self.rng.random_range(0..CITIES.len())].to_string(),
            payment_method: PAYMENT_METHODS[self.payments.sample(&mut self.rng)]
                .0
                .to_string(),
            device_type: DEVICE_TYPES[self.devices.sample(&mut self.rng)].0.to_string(),
            rating,
        }
    }
}

impl Iterator for SalesGenerator {
    type Item = SaleRecord;

    fn next(&mut self) -> Option<SaleRecord> {
        Some(self.next_record())
    }
}

/// Write `config.rows` synthetic records to `config.output`.
pub fn generate_dataset(config: &GenerateConfig) -> Result<usize> {
    config.validate()?;
    info!(
        "Generating {} records (seed {}) into {}",
        config.rows,
        config.seed,
        config.output.display()
    );
    let mut writer = SalesParquetWriter::with_batch_size(&config.output, config.chunk_rows)?;
    for (i, record) in SalesGenerator::new(config.seed)?
        .take(config.rows)
        .enumerate()
    {
        writer.push(record)?;
        if (i + 1) % config.chunk_rows == 0 {
            info!("Generated {} records", i + 1);
        }
    }
    let written = writer.finish()?;
    info!("Wrote {written} records to {}", config.output.display());
    Ok(written)
}
