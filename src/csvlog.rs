//! Per-order CSV result log
//!
//! Append-only; one row per order event when logging is enabled. Numeric
//! fields are decimal integers, `side` is BUY/SELL/TICK, `symbol` is the
//! human string form.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use crate::core_types::{Price, Quantity, Symbol, Timestamp};

pub const CSV_HEADER: &str = "timestamp_ns,order_id,latency_ns,side,price,quantity,symbol";

#[derive(Debug, Error)]
pub enum CsvLogError {
    #[error("failed to create result log {path}: {source}")]
    Create {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write result log: {0}")]
    Write(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct CsvLogger {
    writer: BufWriter<File>,
    rows: u64,
}

impl CsvLogger {
    pub fn create(path: &Path) -> Result<Self, CsvLogError> {
        let file = File::create(path).map_err(|source| CsvLogError::Create {
            path: path.display().to_string(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", CSV_HEADER)?;
        Ok(Self { writer, rows: 0 })
    }

    /// One row per order event; `side` must be BUY, SELL, or TICK
    pub fn log_row(
        &mut self,
        timestamp_ns: Timestamp,
        order_id: u64,
        latency_ns: i64,
        side: &str,
        price: Price,
        quantity: Quantity,
        symbol: Symbol,
    ) -> Result<(), CsvLogError> {
        writeln!(
            self.writer,
            "{},{},{},{},{},{},{}",
            timestamp_ns, order_id, latency_ns, side, price, quantity, symbol
        )?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn flush(&mut self) -> Result<(), CsvLogError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::PRICE_MULTIPLIER;

    #[test]
    fn test_header_and_rows() {
        let dir = std::env::temp_dir().join("hftperf_csv_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("results.csv");

        {
            let mut log = CsvLogger::create(&path).unwrap();
            log.log_row(
                1_000,
                1,
                250,
                "BUY",
                100 * PRICE_MULTIPLIER,
                10,
                Symbol::new("TEST-USD"),
            )
            .unwrap();
            log.log_row(2_000, 2, 300, "SELL", 99 * PRICE_MULTIPLIER, 5, Symbol::new("TEST-USD"))
                .unwrap();
            assert_eq!(log.rows(), 2);
            log.flush().unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "1000,1,250,BUY,10000000000,10,TEST-USD");
        assert_eq!(lines[2], "2000,2,300,SELL,9900000000,5,TEST-USD");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_create_in_missing_directory_fails() {
        let err = CsvLogger::create(Path::new("/nonexistent-dir/x/results.csv")).unwrap_err();
        assert!(err.to_string().contains("results.csv"));
    }
}
