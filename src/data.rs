//! Data loading
//!
//! Loads OHLCV bars from CSV files named `{symbol}_{timeframe}.csv` with the
//! columns `datetime,open,high,low,close,volume`.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Candle, Symbol};

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = raw.parse::<DateTime<Utc>>() {
        return Some(dt);
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|nd| nd.and_hms_opt(0, 0, 0))
        .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
}

fn parse_field(record: &csv::StringRecord, idx: usize, name: &str) -> Result<f64> {
    record
        .get(idx)
        .with_context(|| format!("Missing {} column", name))?
        .trim()
        .parse()
        .with_context(|| format!("Failed to parse {}", name))
}

/// Load OHLCV data from CSV file with validation
///
/// Rows that parse but fail candle validation are skipped with a warning.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

    let mut candles = Vec::new();
    let mut invalid_count = 0;

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(0).context("Missing datetime column")?.trim();
        let datetime = parse_datetime(dt_str)
            .with_context(|| format!("Failed to parse datetime: {}", dt_str))?;

        let open = parse_field(&record, 1, "open")?;
        let high = parse_field(&record, 2, "high")?;
        let low = parse_field(&record, 3, "low")?;
        let close = parse_field(&record, 4, "close")?;
        let volume = parse_field(&record, 5, "volume")?;

        match Candle::new(datetime, open, high, low, close, volume) {
            Ok(candle) => candles.push(candle),
            Err(e) => {
                invalid_count += 1;
                warn!(
                    "Skipping invalid candle at row {} in {:?}: {}",
                    row_idx + 2, // +2 for 1-indexed and header row
                    path.file_name().unwrap_or_default(),
                    e
                );
            }
        }
    }

    if invalid_count > 0 {
        warn!(
            "Skipped {} invalid candles out of {} in {:?}",
            invalid_count,
            invalid_count + candles.len(),
            path.file_name().unwrap_or_default()
        );
    }

    Ok(candles)
}

/// Filter candles by date range
pub fn filter_candles_by_date(
    candles: Vec<Candle>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Vec<Candle> {
    candles
        .into_iter()
        .filter(|c| {
            let after_start = start.is_none_or(|s| c.datetime >= s);
            let before_end = end.is_none_or(|e| c.datetime <= e);
            after_start && before_end
        })
        .collect()
}

/// Parse a date string (RFC 3339, YYYY-MM-DD HH:MM:SS or YYYY-MM-DD)
pub fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    parse_datetime(date_str.trim()).with_context(|| {
        format!(
            "Failed to parse date: {}. Use YYYY-MM-DD or YYYY-MM-DD HH:MM:SS format",
            date_str
        )
    })
}

/// Path of the CSV file for `symbol` at `timeframe`
pub fn data_file(data_dir: impl AsRef<Path>, symbol: &Symbol, timeframe: &str) -> PathBuf {
    data_dir
        .as_ref()
        .join(format!("{}_{}.csv", symbol.as_str(), timeframe))
}

/// Load data for multiple symbols with optional date range filtering
///
/// Missing files are skipped with a warning; finding no data at all is an error.
pub fn load_multi_symbol(
    data_dir: impl AsRef<Path>,
    symbols: &[Symbol],
    timeframe: &str,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<HashMap<Symbol, Vec<Candle>>> {
    let mut data = HashMap::new();

    for symbol in symbols {
        let path = data_file(data_dir.as_ref(), symbol, timeframe);

        if !path.exists() {
            warn!("Data file not found: {}", path.display());
            continue;
        }

        let candles =
            load_csv(&path).with_context(|| format!("Failed to load data for {}", symbol))?;
        let original_len = candles.len();
        let candles = filter_candles_by_date(candles, start, end);

        if start.is_some() || end.is_some() {
            info!(
                "Loaded {} candles for {} (filtered from {} total)",
                candles.len(),
                symbol,
                original_len
            );
        } else {
            info!("Loaded {} candles for {}", candles.len(), symbol);
        }

        if !candles.is_empty() {
            data.insert(symbol.clone(), candles);
        }
    }

    if data.is_empty() {
        anyhow::bail!("No data loaded for any symbol");
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_csv(name: &str, body: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("divergence_trader_data_tests");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_csv_skips_invalid_rows() {
        let path = write_csv(
            "skip_invalid.csv",
            "datetime,open,high,low,close,volume\n\
             2024-01-01,100,101,99,100.5,10\n\
             2024-01-02,100,99,101,100,10\n\
             2024-01-03 00:00:00,100.5,102,100,101,12\n",
        );
        let candles = load_csv(&path).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].close, 101.0);
    }

    #[test]
    fn test_load_csv_rejects_unparseable_number() {
        let path = write_csv(
            "bad_number.csv",
            "datetime,open,high,low,close,volume\n2024-01-01,abc,101,99,100,10\n",
        );
        assert!(load_csv(&path).is_err());
    }

    #[test]
    fn test_parse_date_formats() {
        assert!(parse_date("2024-03-01").is_ok());
        assert!(parse_date("2024-03-01 09:30:00").is_ok());
        assert!(parse_date("2024-03-01T09:30:00Z").is_ok());
        assert!(parse_date("03/01/2024").is_err());
    }

    #[test]
    fn test_filter_by_date() {
        let path = write_csv(
            "filter.csv",
            "datetime,open,high,low,close,volume\n\
             2024-01-01,100,101,99,100,10\n\
             2024-01-02,100,101,99,100,10\n\
             2024-01-03,100,101,99,100,10\n",
        );
        let candles = load_csv(&path).unwrap();
        let start = parse_date("2024-01-02").ok();
        assert_eq!(filter_candles_by_date(candles, start, None).len(), 2);
    }
}
