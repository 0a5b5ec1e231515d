use polars::prelude::{AnyValue, DataFrame};
use serde_json::{Map, Value};

use crate::error::{DataError, LabelerError, LabelerResult};

pub(super) fn polars_to_labeler_error(report: &str, e: polars::error::PolarsError) -> LabelerError {
    LabelerError::Data(DataError::DataFrame(format!(
        "Error while building {report} from labeled DataFrame: {e}"
    )))
}

pub trait DataFrameExt {
    /// One JSON object per row, keyed by column name.
    fn to_json_rows(&self) -> LabelerResult<Vec<Map<String, Value>>>;
}

impl DataFrameExt for DataFrame {
    fn to_json_rows(&self) -> LabelerResult<Vec<Map<String, Value>>> {
        let columns = self.get_columns();
        (0..self.height())
            .map(|row| {
                columns
                    .iter()
                    .map(|c| -> LabelerResult<(String, Value)> {
                        let value = c.get(row).map_err(|e| DataError::DataFrame(e.to_string()))?;
                        Ok((c.name().to_string(), any_value_to_json(value)))
                    })
                    .collect()
            })
            .collect()
    }
}

/// Non-finite floats become `null`; dates and other logical types use their display form.
fn any_value_to_json(value: AnyValue<'_>) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(v) => v.into(),
        AnyValue::Int8(v) => v.into(),
        AnyValue::Int16(v) => v.into(),
        AnyValue::Int32(v) => v.into(),
        AnyValue::Int64(v) => v.into(),
        AnyValue::UInt8(v) => v.into(),
        AnyValue::UInt16(v) => v.into(),
        AnyValue::UInt32(v) => v.into(),
        AnyValue::UInt64(v) => v.into(),
        AnyValue::Float32(v) => v.into(),
        AnyValue::Float64(v) => v.into(),
        AnyValue::String(v) => v.into(),
        AnyValue::StringOwned(v) => v.as_str().into(),
        other => other.to_string().into(),
    }
}

#[cfg(test)]
mod tests {
    use polars::df;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_to_json_rows() {
        let df = df![
            "label" => [0i64, 2],
            "count" => [3u64, 1],
        ]
        .expect("Failed to create frame");

        let rows = df.to_json_rows().expect("json rows");
        let have = Value::Array(rows.into_iter().map(Value::Object).collect());
        assert_eq!(have, json!([{"label": 0, "count": 3}, {"label": 2, "count": 1}]));
    }

    #[test]
    fn test_to_json_rows_mixed_types() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 2, 5).expect("valid date");
        let df = df![
            "date" => [date, date],
            "instrument" => ["A", "B"],
            "edge" => [Some(0.5), Some(f64::NAN)],
            "amount" => [None, Some(2.0f32)],
            "kept" => [true, false],
        ]
        .expect("Failed to create frame");

        let rows = df.to_json_rows().expect("json rows");
        let have = Value::Array(rows.into_iter().map(Value::Object).collect());
        assert_eq!(
            have,
            json!([
                {"date": "2024-02-05", "instrument": "A", "edge": 0.5, "amount": null, "kept": true},
                {"date": "2024-02-05", "instrument": "B", "edge": null, "amount": 2.0, "kept": false},
            ])
        );
    }

    #[test]
    fn test_empty_frame_has_no_rows() {
        let df = DataFrame::empty();
        assert!(df.to_json_rows().expect("json rows").is_empty());
    }
}
