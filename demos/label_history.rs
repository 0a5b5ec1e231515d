use std::{env, time::Instant};

use anyhow::{Context, Result};
use auto_labeler::prelude::*;
use chrono::{Duration, NaiveDate};
use polars::{df, prelude::DataFrame};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Labels a CSV history file (or a generated one) and prints the label distribution.
///
/// ```text
/// cargo run --example label_history -- [history.csv] [out_dir]
/// ```
fn main() -> Result<()> {
    init_tracing();

    let mut args = env::args().skip(1);
    let csv = args.next();
    let out_dir = args
        .next()
        .unwrap_or_else(|| env::temp_dir().join("auto_labeler").display().to_string());

    let instruments = vec!["AAA.SZA".to_string(), "BBB.SHA".to_string()];
    let request = LabelingRequest::new(instruments, "2024-01-01", "2024-06-30")?;
    let sink = FileSink::new(&out_dir).with_format(FileFormat::Parquet);

    let start = Instant::now();
    let outputs = match csv {
        Some(path) => AutoLabeler::new(CsvHistory::new(path), &sink).load_or_run(&request)?,
        None => AutoLabeler::new(FrameHistory::new(synthetic_history()?), &sink)
            .load_or_run(&request)?,
    };
    info!(table = %outputs.data().id(), "Labeled in {:?}", start.elapsed());

    let mut renderer = TextChartRenderer::new(std::io::stdout().lock());
    outputs
        .plot_label_counts(&sink, &mut renderer)
        .context("Failed to plot label distribution")?;

    let report = match outputs.label_distribution(&sink)? {
        LabelDistribution::Counts(counts) => counts.to_csv(&out_dir)?,
        LabelDistribution::Histogram(histogram) => histogram.to_csv(&out_dir)?,
    };

    println!("Labeled table: {}", sink.path_of(outputs.data().id()).display());
    println!("Label distribution: {}", report.display());
    Ok(())
}

// ================================================================================================
// Tracing Configuration
// ================================================================================================

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Detect if running in container
    let in_container =
        env::var("CONTAINER").is_ok() || std::path::Path::new("/.dockerenv").exists();

    if in_container {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_current_span(true)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

// ================================================================================================
// Helper Functions
// ================================================================================================

/// Two random-walk instruments plus the default benchmark, one row per calendar day.
fn synthetic_history() -> Result<DataFrame> {
    let first = NaiveDate::from_ymd_opt(2024, 1, 1).context("invalid start date")?;
    let ids = ["AAA.SZA", "BBB.SHA", DEFAULT_BENCHMARK];

    let (mut date, mut instrument, mut open, mut high, mut low, mut close, mut amount) =
        (vec![], vec![], vec![], vec![], vec![], vec![], vec![]);
    for (k, id) in ids.iter().enumerate() {
        let mut price = 10.0 * (k + 1) as f64;
        for d in 0..182 {
            let drift = ((d * (k + 3)) % 7) as f64 - 3.0;
            let next = (price * (1.0 + drift / 100.0)).max(1.0);
            date.push(first + Duration::days(d as i64));
            instrument.push(id.to_string());
            open.push(price);
            high.push(price.max(next) * 1.01);
            low.push(price.min(next) * 0.99);
            close.push(next);
            amount.push(if d % 30 == 29 { 0.0 } else { 1e6 });
            price = next;
        }
    }

    let df = df![
        "date" => date,
        "instrument" => instrument,
        "open" => open,
        "high" => high,
        "low" => low,
        "close" => close,
        "amount" => amount,
    ]?;
    Ok(df)
}
