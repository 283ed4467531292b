//! Row sources for bulk loads.

use chrono::{Duration as ChronoDuration, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

use crate::error::Result;
use crate::types::{Column, DataType, RowData};

/// Produces batches of rows for a bulk load.
pub trait BatchGenerator: Send {
    /// `n` rows shaped for `columns`.
    fn generate(&mut self, columns: &[Column], n: usize) -> Result<Vec<RowData>>;
}

const WORDS: &[&str] = &[
    "alpha", "amber", "atlas", "basil", "birch", "cobalt", "copper", "delta", "ember", "fjord",
    "garnet", "harbor", "indigo", "juniper", "kestrel", "lumen", "maple", "nectar", "onyx",
    "pebble", "quartz", "raven", "saffron", "tundra", "umber", "velvet", "willow", "zephyr",
];

/// Random rows typed per column: words for text, numbers, booleans and
/// ISO dates. A small share of cells is left empty.
pub struct SyntheticRows {
    rng: StdRng,
    empty_ratio: f64,
}

impl SyntheticRows {
    pub fn new() -> Self {
        Self { rng: StdRng::from_entropy(), empty_ratio: 0.05 }
    }

    /// Deterministic output for a given seed.
    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed), empty_ratio: 0.05 }
    }

    pub fn empty_ratio(mut self, ratio: f64) -> Self {
        self.empty_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    fn cell(&mut self, data_type: DataType) -> Value {
        match data_type {
            DataType::Text => {
                let words = self.rng.gen_range(1..=3);
                let text: Vec<&str> = (0..words)
                    .filter_map(|_| WORDS.choose(&mut self.rng).copied())
                    .collect();
                Value::String(text.join(" "))
            }
            DataType::Numeric => {
                if self.rng.gen_bool(0.5) {
                    json!(self.rng.gen_range(0..100_000))
                } else {
                    let cents: i64 = self.rng.gen_range(0..10_000_000);
                    json!(cents as f64 / 100.0)
                }
            }
            DataType::Boolean => Value::Bool(self.rng.gen_bool(0.5)),
            DataType::Date => {
                let base = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default();
                let offset = ChronoDuration::days(self.rng.gen_range(0..11_000));
                Value::String((base + offset).format("%Y-%m-%d").to_string())
            }
        }
    }
}

impl Default for SyntheticRows {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchGenerator for SyntheticRows {
    fn generate(&mut self, columns: &[Column], n: usize) -> Result<Vec<RowData>> {
        let mut rows = Vec::with_capacity(n);
        for _ in 0..n {
            let mut data = RowData::new();
            for column in columns {
                if self.empty_ratio > 0.0 && self.rng.gen_bool(self.empty_ratio) {
                    continue;
                }
                data.insert(column.name.clone(), self.cell(column.data_type));
            }
            rows.push(data);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::coerce::{parse_number, parse_timestamp};

    fn columns() -> Vec<Column> {
        [("name", DataType::Text), ("age", DataType::Numeric), ("active", DataType::Boolean), ("born", DataType::Date)]
            .iter()
            .enumerate()
            .map(|(i, (name, data_type))| Column {
                id: i as u64,
                name: name.to_string(),
                data_type: *data_type,
                position: i as u32,
            })
            .collect()
    }

    #[test]
    fn test_cells_match_column_types() {
        let mut source = SyntheticRows::seeded(7).empty_ratio(0.0);
        let rows = source.generate(&columns(), 200).unwrap();
        assert_eq!(rows.len(), 200);
        for row in &rows {
            assert!(row["name"].is_string());
            assert!(row["age"].as_f64().is_some());
            assert!(row["active"].is_boolean());
            let born = row["born"].as_str().unwrap();
            assert!(parse_timestamp(born).is_some());
            assert!(parse_number(&row["age"]).is_some());
        }
    }

    #[test]
    fn test_seeded_is_deterministic() {
        let a = SyntheticRows::seeded(42).generate(&columns(), 10).unwrap();
        let b = SyntheticRows::seeded(42).generate(&columns(), 10).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_ratio_leaves_gaps() {
        let rows = SyntheticRows::seeded(1).empty_ratio(1.0).generate(&columns(), 5).unwrap();
        assert!(rows.iter().all(|r| r.is_empty()));
    }
}
