use std::{collections::HashSet, path::PathBuf};

use chrono::NaiveDate;
use polars::prelude::{
    BooleanChunked, DataFrame, DataType, IntoLazy, LazyCsvReader, LazyFileListReader, PlPath,
    col, lit,
};
use tracing::debug;

use crate::{
    error::{CollaboratorError, LabelerResult},
    schema::ReservedCol,
};

/// Provides daily history for a set of instruments.
pub trait HistorySource {
    /// Returns the requested `fields` for `instruments` between `start` and `end`,
    /// both inclusive.
    ///
    /// The returned frame holds exactly the requested columns in the requested order.
    fn history(
        &self,
        instruments: &[String],
        start: NaiveDate,
        end: NaiveDate,
        fields: &[String],
    ) -> LabelerResult<DataFrame>;
}

impl<T: HistorySource + ?Sized> HistorySource for &T {
    fn history(
        &self,
        instruments: &[String],
        start: NaiveDate,
        end: NaiveDate,
        fields: &[String],
    ) -> LabelerResult<DataFrame> {
        (**self).history(instruments, start, end, fields)
    }
}

// ================================================================================================
// In-memory
// ================================================================================================

/// History served from a frame held in memory.
///
/// The frame needs a `date` column of type `Date` and a string `instrument` column.
#[derive(Debug, Clone)]
pub struct FrameHistory {
    frame: DataFrame,
}

impl FrameHistory {
    pub fn new(frame: DataFrame) -> Self {
        Self { frame }
    }
}

impl HistorySource for FrameHistory {
    fn history(
        &self,
        instruments: &[String],
        start: NaiveDate,
        end: NaiveDate,
        fields: &[String],
    ) -> LabelerResult<DataFrame> {
        select_history(&self.frame, instruments, start, end, fields)
    }
}

// ================================================================================================
// CSV
// ================================================================================================

/// History read from a CSV file with a header row.
///
/// Dates are parsed from `YYYY-MM-DD` strings.
#[derive(Debug, Clone)]
pub struct CsvHistory {
    path: PathBuf,
}

impl CsvHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> LabelerResult<DataFrame> {
        let uri = self.path.to_str().ok_or_else(|| {
            CollaboratorError::Fetch(format!(
                "Path contains invalid UTF-8 characters: {}",
                self.path.display()
            ))
        })?;

        let df = LazyCsvReader::new(PlPath::new(uri))
            .with_has_header(true)
            .with_try_parse_dates(true)
            .finish()
            .and_then(|lf| {
                lf.with_column(col(ReservedCol::Date).cast(DataType::Date))
                    .collect()
            })
            .map_err(|e| {
                CollaboratorError::Fetch(format!(
                    "Failed to read history from '{}': {e}",
                    self.path.display()
                ))
            })?;
        Ok(df)
    }
}

impl HistorySource for CsvHistory {
    fn history(
        &self,
        instruments: &[String],
        start: NaiveDate,
        end: NaiveDate,
        fields: &[String],
    ) -> LabelerResult<DataFrame> {
        select_history(&self.read()?, instruments, start, end, fields)
    }
}

// ================================================================================================
// Helper Functions
// ================================================================================================

fn select_history(
    frame: &DataFrame,
    instruments: &[String],
    start: NaiveDate,
    end: NaiveDate,
    fields: &[String],
) -> LabelerResult<DataFrame> {
    if let Some(missing) = fields.iter().find(|f| frame.column(f).is_err()) {
        return Err(CollaboratorError::Fetch(format!("Unknown history field '{missing}'")).into());
    }

    let wanted = instruments.iter().map(String::as_str).collect::<HashSet<_>>();
    let instrument = frame
        .column(ReservedCol::Instrument.as_str())
        .map_err(fetch_err)?;
    let mask = instrument
        .str()
        .map_err(fetch_err)?
        .into_iter()
        .map(|id| id.is_some_and(|id| wanted.contains(id)))
        .collect::<BooleanChunked>();

    let date = col(ReservedCol::Date);
    let df = frame
        .filter(&mask)
        .map_err(fetch_err)?
        .lazy()
        .filter(date.clone().gt_eq(lit(start)).and(date.lt_eq(lit(end))))
        .select(fields.iter().map(|f| col(f.as_str())).collect::<Vec<_>>())
        .collect()
        .map_err(fetch_err)?;

    debug!(
        instruments = instruments.len(),
        fields = ?fields,
        rows = df.height(),
        "Fetched history"
    );
    Ok(df)
}

fn fetch_err(e: polars::error::PolarsError) -> CollaboratorError {
    CollaboratorError::Fetch(e.to_string())
}
