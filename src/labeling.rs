use polars::prelude::{DataFrame, DataType, IntoColumn, IntoLazy, NULL, col, lit, when};
use tracing::debug;

use crate::{
    error::{DataError, ExpressionError, LabelerResult},
    expr::ExpressionEngine,
    schema::ReservedCol,
};

/// Evaluates `expressions` in order, binding each result to the `label` column.
///
/// Every expression after the first sees the previous result as `label`. The label is
/// always `Float64` and NaN results are stored as missing values.
pub fn label<E: ExpressionEngine + ?Sized>(
    engine: &E,
    table: DataFrame,
    expressions: &[String],
    user_functions: Option<&str>,
) -> LabelerResult<DataFrame> {
    expressions
        .iter()
        .enumerate()
        .try_fold(table, |table, (step, expr)| {
            debug!(step, expr = %expr, "Evaluating label expression");
            apply(engine, table, expr, user_functions)
        })
}

fn apply<E: ExpressionEngine + ?Sized>(
    engine: &E,
    mut table: DataFrame,
    expr: &str,
    user_functions: Option<&str>,
) -> LabelerResult<DataFrame> {
    let mut values = engine.evaluate(&table, expr, user_functions)?;
    if values.len() != table.height() {
        return Err(ExpressionError::Evaluation(format!(
            "'{expr}' produced {} values for {} rows",
            values.len(),
            table.height()
        ))
        .into());
    }

    values.rename(ReservedCol::Label.into());
    table
        .with_column(values.into_column())
        .map_err(|e| DataError::DataFrame(e.to_string()))?;

    let label = col(ReservedCol::Label).cast(DataType::Float64);
    let table = table
        .lazy()
        .with_column(
            when(label.clone().is_nan())
                .then(lit(NULL).cast(DataType::Float64))
                .otherwise(label)
                .alias(ReservedCol::Label),
        )
        .collect()
        .map_err(|e| DataError::DataFrame(e.to_string()))?;
    Ok(table)
}
