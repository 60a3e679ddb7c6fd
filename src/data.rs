//! Bar data loading
//!
//! Reads OHLC history from CSV for backtests and paper sessions.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{info, warn};

use crate::Candle;

fn parse_datetime(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // No timezone: assume UTC
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        })
        .with_context(|| format!("Failed to parse datetime: {}", raw))
}

fn parse_field(record: &csv::StringRecord, index: usize, name: &str) -> Result<f64> {
    record
        .get(index)
        .with_context(|| format!("Missing {} column", name))?
        .trim()
        .parse()
        .with_context(|| format!("Failed to parse {}", name))
}

/// Load bars from a CSV with `datetime,open,high,low,close[,volume]` rows.
///
/// Rows must be in chronological order. Bars that fail validation are
/// skipped with a warning.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

    let mut candles: Vec<Candle> = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;

        let datetime = parse_datetime(record.get(0).context("Missing datetime column")?)?;
        let open = parse_field(&record, 1, "open")?;
        let high = parse_field(&record, 2, "high")?;
        let low = parse_field(&record, 3, "low")?;
        let close = parse_field(&record, 4, "close")?;
        let volume = match record.get(5) {
            Some(raw) if !raw.trim().is_empty() => parse_field(&record, 5, "volume")?,
            _ => 0.0,
        };

        if let Some(prev) = candles.last() {
            if datetime <= prev.datetime {
                anyhow::bail!(
                    "Row {}: {} is not after {}",
                    row_idx + 1,
                    datetime,
                    prev.datetime
                );
            }
        }

        match Candle::new(datetime, open, high, low, close, volume) {
            Ok(candle) => candles.push(candle),
            Err(e) => warn!("Skipping row {}: {}", row_idx + 1, e),
        }
    }

    info!("Loaded {} bars from {}", candles.len(), path.display());
    Ok(candles)
}
