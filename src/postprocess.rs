use polars::prelude::{ChunkAgg, DataFrame, DataType, IntoLazy, col};
use tracing::debug;

use crate::{
    error::{DataError, LabelerResult},
    schema::{ColumnTag, ReservedCol},
};

/// Finalizes a labeled table.
///
/// 1. With `drop_na`, rows without a label are removed.
/// 2. With `cast_int`, labels are truncated to `Int64`. Negative labels are rejected, as
///    are missing labels that were kept.
/// 3. Every column except `date`, `instrument` and `label` is renamed to `m:<name>`.
///
/// Row order is preserved. Polars frames carry no index, so the result is dense and
/// zero-based by construction.
pub fn postprocess(table: DataFrame, drop_na: bool, cast_int: bool) -> LabelerResult<DataFrame> {
    if table.column(ReservedCol::Label.as_str()).is_err() {
        return Err(DataError::MissingColumn(ReservedCol::Label.to_string()).into());
    }

    let mut table = if drop_na {
        let before = table.height();
        let kept = table
            .lazy()
            .filter(col(ReservedCol::Label).is_not_null())
            .collect()
            .map_err(|e| DataError::DataFrame(e.to_string()))?;
        debug!(dropped = before - kept.height(), "Dropped rows without label");
        kept
    } else {
        table
    };

    if cast_int {
        cast_label(&mut table)?;
    }

    let names = table
        .get_column_names_str()
        .into_iter()
        .map(|name| ColumnTag::parse(name).output_name())
        .collect::<Vec<_>>();
    table
        .set_column_names(names)
        .map_err(|e| DataError::DataFrame(e.to_string()))?;

    Ok(table)
}

fn cast_label(table: &mut DataFrame) -> LabelerResult<()> {
    let label = table
        .column(ReservedCol::Label.as_str())
        .and_then(|c| c.cast(&DataType::Float64))
        .map_err(|e| DataError::DataFrame(e.to_string()))?;

    let missing = label.null_count();
    if missing > 0 {
        return Err(DataError::MissingLabel { count: missing }.into());
    }

    let values = label
        .f64()
        .map_err(|e| DataError::DataFrame(e.to_string()))?;
    if let Some(min) = values.min()
        && min < 0.0
    {
        return Err(DataError::NegativeLabel { min }.into());
    }

    let cast = label
        .strict_cast(&DataType::Int64)
        .map_err(|e| DataError::LabelCast(e.to_string()))?;
    table
        .with_column(cast)
        .map_err(|e| DataError::DataFrame(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;
    use crate::error::LabelerError;

    fn labeled(label: &[Option<f64>]) -> DataFrame {
        let n = label.len();
        df![
            "instrument" => vec!["A"; n],
            "close" => (0..n).map(|i| i as f64).collect::<Vec<_>>(),
            "benchmark_close" => vec![1.0; n],
            "label" => label,
        ]
        .expect("Failed to create labeled frame")
    }

    #[test]
    fn test_drop_na_cast_and_rename() {
        let have = postprocess(labeled(&[Some(1.7), None, Some(3.0)]), true, true)
            .expect("postprocess");
        let want = df![
            "instrument" => ["A", "A"],
            "m:close" => [0.0, 2.0],
            "m:benchmark_close" => [1.0, 1.0],
            "label" => [1i64, 3],
        ]
        .expect("Failed to create expected frame");
        assert!(have.equals_missing(&want), "have: {have}");
    }

    #[test]
    fn test_keep_na_without_cast() {
        let have = postprocess(labeled(&[Some(0.5), None]), false, false).expect("postprocess");
        assert_eq!(have.height(), 2);
        assert_eq!(
            have.column("label").expect("label").dtype(),
            &DataType::Float64
        );
        assert_eq!(have.column("label").expect("label").null_count(), 1);
    }

    #[test]
    fn test_negative_label_is_rejected() {
        let err = postprocess(labeled(&[Some(2.0), Some(-0.5)]), true, true)
            .expect_err("negative label should fail");
        assert!(matches!(
            err,
            LabelerError::Data(DataError::NegativeLabel { min }) if min == -0.5
        ));
    }

    #[test]
    fn test_missing_label_with_cast_is_rejected() {
        let err = postprocess(labeled(&[Some(2.0), None]), false, true)
            .expect_err("missing label should fail");
        assert!(matches!(
            err,
            LabelerError::Data(DataError::MissingLabel { count: 1 })
        ));
    }

    #[test]
    fn test_missing_label_column() {
        let df = df!["close" => [1.0]].expect("Failed to create frame");
        assert!(matches!(
            postprocess(df, true, true),
            Err(LabelerError::Data(DataError::MissingColumn(_)))
        ));
    }
}
