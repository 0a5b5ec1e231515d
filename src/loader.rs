use itertools::Itertools;
use polars::prelude::{
    DataFrame, DataType, Expr, IntoLazy, JoinArgs, JoinType, PlSmallStr, SortMultipleOptions, col,
    lit,
};
use tracing::{debug, info};

use crate::{
    config::LabelingRequest,
    error::{DataError, LabelerResult},
    resolver::FeatureSet,
    schema::{ColumnTag, ReservedCol},
    source::HistorySource,
};

/// Loads the history table the label expressions run on.
///
/// Fetches `date`, `instrument`, `amount` and the instrument features. If benchmark
/// features are needed, the benchmark series is fetched over the same window, its
/// columns are prefixed with `benchmark_` and it is left-joined on `date`. Rows with a
/// non-positive or missing `amount` are dropped. The result is sorted by instrument,
/// then date.
pub fn load<H: HistorySource + ?Sized>(
    source: &H,
    request: &LabelingRequest,
    features: &FeatureSet,
) -> LabelerResult<DataFrame> {
    let instruments = request.instruments().resolve()?;
    let (start, end) = (request.start_date(), request.end_date());

    let fields = [ReservedCol::Date, ReservedCol::Instrument, ReservedCol::Amount]
        .iter()
        .map(|c| c.as_str().to_string())
        .chain(features.instrument_features().iter().cloned())
        .unique()
        .collect::<Vec<_>>();

    let mut lf = source.history(&instruments, start, end, &fields)?.lazy();

    if features.has_benchmark() {
        let benchmark = [request.benchmark().to_string()];
        let bench_fields = std::iter::once(ReservedCol::Date.as_str().to_string())
            .chain(features.benchmark_features().iter().cloned())
            .unique()
            .collect::<Vec<_>>();
        debug!(benchmark = %request.benchmark(), fields = ?bench_fields, "Fetching benchmark");

        let bench = source
            .history(&benchmark, start, end, &bench_fields)?
            .lazy()
            .select(benchmark_columns(&bench_fields));

        lf = lf.join(
            bench,
            [col(ReservedCol::Date)],
            [col(ReservedCol::Date)],
            JoinArgs::new(JoinType::Left),
        );
    }

    let keys: [PlSmallStr; 2] = [ReservedCol::Instrument.into(), ReservedCol::Date.into()];
    let df = lf
        .filter(col(ReservedCol::Amount).cast(DataType::Float64).gt(lit(0.0)))
        .sort(keys, SortMultipleOptions::default().with_maintain_order(true))
        .collect()
        .map_err(|e| DataError::DataFrame(format!("Failed to load history: {e}")))?;

    info!(rows = df.height(), "Loaded history");
    Ok(df)
}

/// Keeps `date` and renames every benchmark field to its prefixed input name.
fn benchmark_columns(fields: &[String]) -> Vec<Expr> {
    fields
        .iter()
        .map(|f| {
            if f.as_str() == ReservedCol::Date.as_str() {
                col(ReservedCol::Date)
            } else {
                col(f.as_str()).alias(ColumnTag::BenchmarkFeature(f.clone()).input_name())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use polars::df;

    use super::*;
    use crate::{
        expr::PolarsEngine, resolver::resolve, source::FrameHistory,
    };

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).expect("valid date")
    }

    fn history() -> DataFrame {
        df![
            "date" => [day(7), day(6), day(6), day(7), day(8), day(6), day(8)],
            "instrument" => ["A", "A", "B", "B", "B", "IDX", "IDX"],
            "close" => [11.0, 10.0, 20.0, 21.0, 22.0, 100.0, 102.0],
            "amount" => [5.0, 5.0, 0.0, 3.0, 4.0, 1.0, 1.0],
        ]
        .expect("Failed to create history frame")
    }

    fn request(exprs: &[&str]) -> LabelingRequest {
        LabelingRequest::new(vec!["A".to_string(), "B".to_string()], "2024-05-06", "2024-05-08")
            .expect("valid request")
            .with_label_expr(exprs.iter().map(|s| s.to_string()).collect())
            .with_benchmark("IDX")
    }

    #[test]
    fn test_load_filters_amount_and_sorts() {
        let req = request(&["close"]);
        let features = resolve(&PolarsEngine, req.label_expr(), None).expect("resolve");
        let df = load(&FrameHistory::new(history()), &req, &features).expect("load");

        let want = df![
            "date" => [day(6), day(7), day(7), day(8)],
            "instrument" => ["A", "A", "B", "B"],
            "amount" => [5.0, 5.0, 3.0, 4.0],
            "close" => [10.0, 11.0, 21.0, 22.0],
        ]
        .expect("Failed to create expected frame");
        assert!(df.equals_missing(&want), "have: {df}");
    }

    #[test]
    fn test_load_left_joins_benchmark() {
        let req = request(&["close / benchmark_close"]);
        let features = resolve(&PolarsEngine, req.label_expr(), None).expect("resolve");
        let df = load(&FrameHistory::new(history()), &req, &features).expect("load");

        assert_eq!(
            df.get_column_names_str(),
            vec!["date", "instrument", "amount", "close", "benchmark_close"]
        );
        let bench = df
            .column("benchmark_close")
            .expect("benchmark column")
            .f64()
            .expect("f64")
            .into_iter()
            .collect::<Vec<_>>();
        // 2024-05-07 has no benchmark row
        assert_eq!(bench, vec![Some(100.0), None, None, Some(102.0)]);
    }
}
