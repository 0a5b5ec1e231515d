use std::path::{Path, PathBuf};

use polars::{frame::DataFrame, prelude::SchemaRef};
use serde_json::Value;
use tracing::debug;

use crate::{
    error::LabelerResult,
    report::polars_ext::DataFrameExt,
    sink::{FileFormat, FileSink, TableSink},
};

// ================================================================================================
// Traits
// ================================================================================================

/// A summary frame derived from a labeled table.
pub trait Report {
    fn as_df(&self) -> &DataFrame;
}

pub trait ReportName {
    fn base_name(&self) -> String;

    fn filename(&self, format: FileFormat) -> String {
        format!("{}.{}", self.base_name(), format)
    }
}

pub trait ToSchema {
    /// Column layout of an empty report.
    fn to_schema() -> SchemaRef;
}

pub trait ToJson {
    /// One JSON object per report row, wrapped in a `Value::Array`.
    fn to_json(&self) -> LabelerResult<Value>;
}

/// Writes a report next to the labeled tables, using the same file layout as [`FileSink`].
pub trait ToFile {
    /// Writes `<dir>/<base_name>.<format>` and returns its path.
    ///
    /// Creates `dir` if missing and overwrites an existing file.
    fn to_file(&self, dir: impl AsRef<Path>, format: FileFormat) -> LabelerResult<PathBuf>;

    fn to_csv(&self, dir: impl AsRef<Path>) -> LabelerResult<PathBuf> {
        self.to_file(dir, FileFormat::Csv)
    }

    fn to_parquet(&self, dir: impl AsRef<Path>) -> LabelerResult<PathBuf> {
        self.to_file(dir, FileFormat::Parquet)
    }
}

// ================================================================================================
// Blanket Implementations
// ================================================================================================

impl<T> ToJson for T
where
    T: Report + ToSchema,
{
    fn to_json(&self) -> LabelerResult<Value> {
        let rows = self.as_df().to_json_rows()?;
        Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
    }
}

impl<T> ToFile for T
where
    T: Report + ReportName,
{
    fn to_file(&self, dir: impl AsRef<Path>, format: FileFormat) -> LabelerResult<PathBuf> {
        let sink = FileSink::new(dir.as_ref()).with_format(format);
        let handle = sink.write(self.as_df(), &self.base_name())?;
        let path = sink.path_of(handle.id());
        debug!(path = %path.display(), "Wrote {}", self.filename(format));
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;
    use crate::report::distribution::LabelCounts;

    #[test]
    fn test_report_files() {
        let labeled = df![
            "instrument" => ["A", "B", "C"],
            "label" => [1i64, 0, 1],
        ]
        .expect("Failed to create labeled frame");
        let counts = LabelCounts::try_from(&labeled).expect("label counts");

        let dir = std::env::temp_dir().join(format!("auto_labeler_report_{}", std::process::id()));
        let csv_path = counts.to_csv(&dir).expect("write csv");
        let parquet_path = counts.to_parquet(&dir).expect("write parquet");

        assert_eq!(csv_path, dir.join("label_counts.csv"));
        assert_eq!(parquet_path, dir.join("label_counts.parquet"));
        assert!(parquet_path.is_file());

        let csv = std::fs::read_to_string(&csv_path).expect("read csv");
        assert_eq!(csv.lines().collect::<Vec<_>>(), vec!["label,count", "0,1", "1,2"]);

        std::fs::remove_dir_all(&dir).ok();
    }
}
