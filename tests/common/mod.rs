#![allow(dead_code)]

use std::cell::Cell;

use auto_labeler::prelude::*;
use chrono::NaiveDate;
use polars::{df, prelude::DataFrame};

pub const BENCHMARK: &str = "IDX";

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 2, d).expect("valid date")
}

/// Two instruments over five trading days plus a benchmark with one missing day.
///
/// `B` has a zero-amount row on 2024-02-06.
pub fn history() -> DataFrame {
    df![
        "date" => [
            day(5), day(6), day(7), day(8), day(9),
            day(5), day(6), day(7), day(8), day(9),
            day(5), day(6), day(8), day(9),
        ],
        "instrument" => [
            "A", "A", "A", "A", "A",
            "B", "B", "B", "B", "B",
            BENCHMARK, BENCHMARK, BENCHMARK, BENCHMARK,
        ],
        "open" => [
            10.0, 10.5, 11.0, 10.0, 12.0,
            20.0, 20.0, 21.0, 22.0, 20.0,
            100.0, 101.0, 103.0, 104.0,
        ],
        "close" => [
            10.0, 11.0, 12.0, 9.0, 12.0,
            20.0, 25.0, 20.0, 22.0, 24.0,
            100.0, 102.0, 104.0, 100.0,
        ],
        "amount" => [
            1.0, 1.0, 1.0, 1.0, 1.0,
            1.0, 0.0, 1.0, 1.0, 1.0,
            1.0, 1.0, 1.0, 1.0,
        ],
    ]
    .expect("Failed to create history frame")
}

pub fn request(exprs: &[&str]) -> LabelingRequest {
    LabelingRequest::new(vec!["A".to_string(), "B".to_string()], "2024-02-01", "2024-02-29")
        .expect("valid request")
        .with_benchmark(BENCHMARK)
        .with_label_expr(exprs.iter().map(|s| s.to_string()).collect())
}

/// History source that counts how often it is asked for data.
pub struct CountingHistory {
    inner: FrameHistory,
    fetches: Cell<usize>,
}

impl CountingHistory {
    pub fn new(frame: DataFrame) -> Self {
        Self {
            inner: FrameHistory::new(frame),
            fetches: Cell::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.get()
    }
}

impl HistorySource for CountingHistory {
    fn history(
        &self,
        instruments: &[String],
        start: NaiveDate,
        end: NaiveDate,
        fields: &[String],
    ) -> LabelerResult<DataFrame> {
        self.fetches.set(self.fetches.get() + 1);
        self.inner.history(instruments, start, end, fields)
    }
}

pub fn column_f64(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
    df.column(name)
        .expect("column exists")
        .f64()
        .expect("f64 column")
        .into_iter()
        .collect()
}

pub fn column_i64(df: &DataFrame, name: &str) -> Vec<Option<i64>> {
    df.column(name)
        .expect("column exists")
        .i64()
        .expect("i64 column")
        .into_iter()
        .collect()
}
