pub mod functions;
pub(crate) mod lexer;
pub mod lower;
pub mod parser;

use polars::prelude::{DataFrame, IntoLazy, PlSmallStr, Series, SortMultipleOptions, col};

use crate::{
    error::{DataError, ExpressionError, LabelerResult},
    expr::{
        functions::UserFunctions,
        lower::{LowerCtx, check_calls, lower},
        parser::{Ast, parse_expression},
    },
    schema::ReservedCol,
};

/// Evaluates label expressions over a history table.
pub trait ExpressionEngine {
    /// Free variables of `expr` in order of first appearance.
    ///
    /// Calls to user functions are expanded first, so variables referenced only
    /// inside a function body are reported as well.
    fn extract_variables(
        &self,
        expr: &str,
        user_functions: Option<&str>,
    ) -> LabelerResult<Vec<String>>;

    /// Evaluates `expr` against `table`, returning one value per row in row order.
    fn evaluate(
        &self,
        table: &DataFrame,
        expr: &str,
        user_functions: Option<&str>,
    ) -> LabelerResult<Series>;
}

/// Expression engine lowering the label language onto polars lazy expressions.
///
/// Time-series functions see each instrument's rows in date order, whatever the
/// row order of the input table. The result is always `Float64`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolarsEngine;

const ROW_NR: &str = "__row_nr";
const RESULT: &str = "__result";

impl PolarsEngine {
    fn compile(expr: &str, user_functions: Option<&str>) -> Result<Ast, ExpressionError> {
        let ast = parse_expression(expr)?;
        let ast = UserFunctions::parse(user_functions)?.expand(&ast)?;
        check_calls(&ast)?;
        Ok(ast)
    }
}

impl ExpressionEngine for PolarsEngine {
    fn extract_variables(
        &self,
        expr: &str,
        user_functions: Option<&str>,
    ) -> LabelerResult<Vec<String>> {
        Ok(Self::compile(expr, user_functions)?.variables())
    }

    fn evaluate(
        &self,
        table: &DataFrame,
        expr: &str,
        user_functions: Option<&str>,
    ) -> LabelerResult<Series> {
        let ast = Self::compile(expr, user_functions)?;
        if let Some(missing) = ast
            .variables()
            .into_iter()
            .find(|name| table.column(name).is_err())
        {
            return Err(DataError::MissingColumn(missing).into());
        }

        let ctx = LowerCtx {
            grouped: table.column(ReservedCol::Instrument.as_str()).is_ok(),
            has_date: table.column(ReservedCol::Date.as_str()).is_ok(),
        };
        let value = lower(&ast, &ctx)?;

        let mut lf = table
            .with_row_index(ROW_NR.into(), None)
            .map_err(eval_err)?
            .lazy();
        if ctx.grouped {
            let mut keys: Vec<PlSmallStr> = vec![ReservedCol::Instrument.into()];
            if ctx.has_date {
                keys.push(ReservedCol::Date.into());
            }
            lf = lf.sort(keys, SortMultipleOptions::default().with_maintain_order(true));
        }

        let out = lf
            .select([col(ROW_NR), value.alias(RESULT)])
            .sort([ROW_NR], SortMultipleOptions::default())
            .collect()
            .map_err(eval_err)?;

        let result = out
            .column(RESULT)
            .map_err(eval_err)?
            .as_materialized_series()
            .clone();

        // Aggregations such as `all_quantile` collapse to one value.
        if result.len() == 1 && table.height() != 1 {
            return Ok(result.new_from_index(0, table.height()));
        }
        if result.len() != table.height() {
            return Err(ExpressionError::Evaluation(format!(
                "'{expr}' produced {} values for {} rows",
                result.len(),
                table.height()
            ))
            .into());
        }
        Ok(result)
    }
}

fn eval_err(e: polars::error::PolarsError) -> ExpressionError {
    ExpressionError::Evaluation(e.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use polars::{df, prelude::DataType};

    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).expect("valid date")
    }

    /// Two instruments, rows interleaved by date.
    fn history() -> DataFrame {
        df![
            "date" => [day(2), day(2), day(3), day(3), day(4), day(4)],
            "instrument" => ["A", "B", "A", "B", "A", "B"],
            "close" => [10.0, 20.0, 11.0, 18.0, 12.1, 27.0],
            "open" => [1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        ]
        .expect("Failed to create history frame")
    }

    fn values(series: &Series) -> Vec<Option<f64>> {
        series
            .cast(&DataType::Float64)
            .expect("cast to f64")
            .f64()
            .expect("f64 series")
            .into_iter()
            .collect()
    }

    fn approx(have: &[Option<f64>], want: &[Option<f64>]) {
        assert_eq!(have.len(), want.len(), "length mismatch: {have:?} vs {want:?}");
        for (h, w) in have.iter().zip(want) {
            match (h, w) {
                (Some(h), Some(w)) => assert!((h - w).abs() < 1e-9, "{have:?} != {want:?}"),
                (None, None) => {}
                _ => panic!("{have:?} != {want:?}"),
            }
        }
    }

    #[test]
    fn test_extract_variables() {
        let engine = PolarsEngine;
        let vars = engine
            .extract_variables("shift(close, -5) / shift(open, -1)", None)
            .expect("extract");
        assert_eq!(vars, vec!["close", "open"]);

        let vars = engine
            .extract_variables("clip(label, all_quantile(label, 0.01), benchmark_close)", None)
            .expect("extract");
        assert_eq!(vars, vec!["label", "benchmark_close"]);

        let vars = engine
            .extract_variables("gap(close)", Some("gap(x) = x / vwap - 1"))
            .expect("extract");
        assert_eq!(vars, vec!["close", "vwap"]);
    }

    #[test]
    fn test_extract_variables_rejects_unknown_function() {
        let err = PolarsEngine
            .extract_variables("bogus(close)", None)
            .expect_err("unknown function should fail");
        assert!(err.to_string().contains("bogus"), "unexpected error: {err}");
    }

    #[test]
    fn test_shift_stays_within_instrument() {
        let have = PolarsEngine
            .evaluate(&history(), "shift(close, -1) / close", None)
            .expect("evaluate");
        approx(
            &values(&have),
            &[Some(1.1), Some(0.9), Some(1.1), Some(1.5), None, None],
        );
    }

    #[test]
    fn test_rolling_mean_per_instrument() {
        let have = PolarsEngine
            .evaluate(&history(), "mean(open, 2)", None)
            .expect("evaluate");
        approx(
            &values(&have),
            &[None, None, Some(2.0), Some(3.0), Some(4.0), Some(5.0)],
        );
    }

    #[test]
    fn test_aggregate_broadcasts() {
        let have = PolarsEngine
            .evaluate(&history(), "all_quantile(open, 0.5)", None)
            .expect("evaluate");
        approx(&values(&have), &[Some(3.5); 6]);
    }

    #[test]
    fn test_wbins_range() {
        let have = PolarsEngine
            .evaluate(&history(), "all_wbins(open, 5)", None)
            .expect("evaluate");
        approx(
            &values(&have),
            &[Some(0.0), Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(4.0)],
        );
    }

    #[test]
    fn test_cs_rank_per_date() {
        let have = PolarsEngine
            .evaluate(&history(), "cs_rank(close)", None)
            .expect("evaluate");
        approx(
            &values(&have),
            &[Some(0.5), Some(1.0), Some(0.5), Some(1.0), Some(0.5), Some(1.0)],
        );
    }

    #[test]
    fn test_where_and_comparison() {
        let have = PolarsEngine
            .evaluate(&history(), "where(close > 15, 1, 0) + where(isnan(NaN), 1, 0)", None)
            .expect("evaluate");
        approx(
            &values(&have),
            &[Some(1.0), Some(2.0), Some(1.0), Some(2.0), Some(1.0), Some(2.0)],
        );
    }

    #[test]
    fn test_missing_column() {
        let err = PolarsEngine
            .evaluate(&history(), "volume / close", None)
            .expect_err("missing column should fail");
        assert!(matches!(
            err,
            crate::error::LabelerError::Data(DataError::MissingColumn(ref c)) if c == "volume"
        ));
    }

    #[test]
    fn test_time_series_functions_stay_within_instrument() {
        let sqrt2 = 2.0_f64.sqrt();
        let cases: [(&str, [Option<f64>; 6]); 5] = [
            ("delta(open, 1)", [None, None, Some(2.0), Some(2.0), Some(2.0), Some(2.0)]),
            ("sum(open, 2)", [None, None, Some(4.0), Some(6.0), Some(8.0), Some(10.0)]),
            (
                "std(open, 2)",
                [None, None, Some(sqrt2), Some(sqrt2), Some(sqrt2), Some(sqrt2)],
            ),
            ("ts_min(close, 2)", [None, None, Some(10.0), Some(18.0), Some(11.0), Some(18.0)]),
            ("ts_max(close, 2)", [None, None, Some(11.0), Some(20.0), Some(12.1), Some(27.0)]),
        ];
        for (expr, want) in cases {
            let have = PolarsEngine
                .evaluate(&history(), expr, None)
                .unwrap_or_else(|e| panic!("{expr}: {e}"));
            approx(&values(&have), &want);
        }
    }

    #[test]
    fn test_element_wise_functions() {
        let open = [1.0_f64, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mapped = |f: fn(f64) -> f64| open.map(|v| Some(f(v)));
        let cases: [(&str, [Option<f64>; 6]); 6] = [
            ("log(open)", mapped(f64::ln)),
            ("exp(open)", mapped(f64::exp)),
            ("sqrt(open)", mapped(f64::sqrt)),
            (
                "abs(close - 15)",
                [Some(5.0), Some(5.0), Some(4.0), Some(3.0), Some(2.9), Some(12.0)],
            ),
            (
                "clip(open, 2, 5)",
                [Some(2.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0), Some(5.0)],
            ),
            (
                "sign(open - 3)",
                [Some(-1.0), Some(-1.0), Some(0.0), Some(1.0), Some(1.0), Some(1.0)],
            ),
        ];
        for (expr, want) in cases {
            let have = PolarsEngine
                .evaluate(&history(), expr, None)
                .unwrap_or_else(|e| panic!("{expr}: {e}"));
            approx(&values(&have), &want);
        }
    }

    #[test]
    fn test_cs_mean_per_date() {
        let have = PolarsEngine
            .evaluate(&history(), "cs_mean(close)", None)
            .expect("evaluate");
        approx(
            &values(&have),
            &[Some(15.0), Some(15.0), Some(14.5), Some(14.5), Some(19.55), Some(19.55)],
        );
    }

    #[test]
    fn test_qbins_equal_frequency() {
        let have = PolarsEngine
            .evaluate(&history(), "all_qbins(open, 3)", None)
            .expect("evaluate");
        approx(
            &values(&have),
            &[Some(0.0), Some(0.0), Some(1.0), Some(1.0), Some(2.0), Some(2.0)],
        );
    }

    #[test]
    fn test_nan_field_compares_as_missing() {
        let table = df![
            "date" => [day(2), day(3), day(4)],
            "instrument" => ["A", "A", "A"],
            "close" => [10.0, 11.0, 12.0],
            "high" => [10.5, f64::NAN, 12.0],
            "low" => [9.5, f64::NAN, 12.0],
        ]
        .expect("Failed to create history frame");

        let have = PolarsEngine
            .evaluate(&table, "where(shift(high, -1) == shift(low, -1), NaN, close)", None)
            .expect("evaluate");
        let have = values(&have);
        assert_eq!(have[0], Some(10.0), "NaN == NaN must not mask the row");
        assert!(have[1].is_some_and(f64::is_nan), "limit-up day is masked: {have:?}");
        assert_eq!(have[2], Some(12.0));

        let have = PolarsEngine
            .evaluate(&table, "where(high != low, 1, 0) + where(isnan(high), 10, 0)", None)
            .expect("evaluate");
        approx(&values(&have), &[Some(1.0), Some(11.0), Some(0.0)]);

        let have = PolarsEngine.evaluate(&table, "high", None).expect("evaluate");
        approx(&values(&have), &[Some(10.5), None, Some(12.0)]);
    }
}
