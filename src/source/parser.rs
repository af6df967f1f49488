//! Response shape classification and row decoding
//!
//! Both sources answer candle queries with a JSON matrix. A scalar or object
//! reply is how Coinbase signals throttling or an error; a JSON array that is
//! not a non-empty rectangular matrix means no data for the window.

use serde_json::Value;

use super::{SourceError, SourceResult};
use crate::CandleRow;

/// Shape of a decoded response body (T043)
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadShape {
    /// Object, string, number, bool or null
    Scalar(Value),
    /// Non-empty array of equally long, non-empty arrays
    Matrix(Vec<Vec<Value>>),
    /// Any other array, including `[]` and ragged rows
    Irregular,
}

impl PayloadShape {
    /// Classify a decoded body
    pub fn classify(value: Value) -> Self {
        let rows = match value {
            Value::Array(rows) => rows,
            other => return PayloadShape::Scalar(other),
        };
        if rows.is_empty() {
            return PayloadShape::Irregular;
        }

        let mut matrix = Vec::with_capacity(rows.len());
        let mut width = None;
        for row in rows {
            match row {
                Value::Array(cells) if !cells.is_empty() => {
                    if *width.get_or_insert(cells.len()) != cells.len() {
                        return PayloadShape::Irregular;
                    }
                    matrix.push(cells);
                }
                _ => return PayloadShape::Irregular,
            }
        }
        PayloadShape::Matrix(matrix)
    }
}

/// Stateless decoder for candle matrices
pub struct CandleParser;

impl CandleParser {
    /// Decode Coinbase historic rates (T044)
    ///
    /// # Format
    /// `[time, low, high, open, close, volume]`, time in seconds
    pub fn parse_coinbase(rows: Vec<Vec<Value>>) -> SourceResult<Vec<CandleRow>> {
        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() < 6 {
                return Err(SourceError::Decode(format!(
                    "Expected 6 elements in candle, got {}",
                    row.len()
                )));
            }
            candles.push(CandleRow {
                epoch: Self::parse_epoch(&row[0], 1)?,
                low: Some(Self::parse_number(&row[1], "low")?),
                high: Some(Self::parse_number(&row[2], "high")?),
                open: Some(Self::parse_number(&row[3], "open")?),
                close: Some(Self::parse_number(&row[4], "close")?),
                volume: Some(Self::parse_number(&row[5], "volume")?),
                amount: None,
                count: None,
            });
        }
        Ok(candles)
    }

    /// Decode Binance klines (T045)
    ///
    /// # Format
    /// `[open_time, open, high, low, close, volume, close_time, quote_volume,
    /// trades, taker_buy_base, taker_buy_quote, ignore]`, times in
    /// milliseconds. Close time and the taker/ignore fields are dropped.
    pub fn parse_binance(rows: Vec<Vec<Value>>) -> SourceResult<Vec<CandleRow>> {
        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() < 9 {
                return Err(SourceError::Decode(format!(
                    "Expected at least 9 elements in kline, got {}",
                    row.len()
                )));
            }
            let count = Self::parse_number(&row[8], "count")?;
            if count < 0.0 {
                return Err(SourceError::Decode(format!("Negative trade count {count}")));
            }
            candles.push(CandleRow {
                epoch: Self::parse_epoch(&row[0], 1_000)?,
                open: Some(Self::parse_number(&row[1], "open")?),
                high: Some(Self::parse_number(&row[2], "high")?),
                low: Some(Self::parse_number(&row[3], "low")?),
                close: Some(Self::parse_number(&row[4], "close")?),
                volume: Some(Self::parse_number(&row[5], "volume")?),
                amount: Some(Self::parse_number(&row[7], "amount")?),
                count: Some(count as u64),
            });
        }
        Ok(candles)
    }

    /// Epoch seconds from an integer time in `units_per_second`
    pub fn parse_epoch(value: &Value, units_per_second: i64) -> SourceResult<i64> {
        let raw = match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        }
        .ok_or_else(|| SourceError::Decode(format!("Invalid epoch: {value}")))?;
        Ok(raw.div_euclid(units_per_second))
    }

    /// Float from a JSON number or numeric string
    pub fn parse_number(value: &Value, field: &str) -> SourceResult<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| SourceError::Decode(format!("Invalid {field}: {value}")))
    }
}
