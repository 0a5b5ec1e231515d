use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, LabelerResult};

/// Benchmark index used for `benchmark_*` variables unless configured otherwise (CSI 300).
pub const DEFAULT_BENCHMARK: &str = "000300.SHA";

/// Date format accepted for the start and end of the labeling window.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Default label script.
///
/// One expression per line, evaluated in order. From the second expression on,
/// `label` refers to the result of the previous line. Fields prefixed with
/// `benchmark_` are read from the benchmark series.
pub const DEFAULT_LABEL_SCRIPT: &str = "\
# Return: close in 5 days (sell price) over tomorrow's open (buy price)
shift(close, -5) / shift(open, -1)

# Outliers: clip at the 1% and 99% quantiles
clip(label, all_quantile(label, 0.01), all_quantile(label, 0.99))

# Map the score to 20 classes
all_wbins(label, 20)

# Mask limit-up days (a NaN label is ignored downstream)
where(shift(high, -1) == shift(low, -1), NaN, label)
";

/// Splits a label script into its expressions.
///
/// Blank lines and lines starting with `#` are skipped.
pub fn parse_label_script(script: &str) -> Vec<String> {
    script
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub(crate) fn parse_date(value: &str) -> LabelerResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|e| {
        ConfigError::InvalidDate {
            value: value.to_string(),
            msg: e.to_string(),
        }
        .into()
    })
}

// ================================================================================================
// Instruments
// ================================================================================================

/// The instruments to label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentSource {
    /// Explicit, ordered instrument identifiers.
    List(Vec<String>),

    /// A JSON document holding either an array of identifiers or an object with an
    /// `instruments` array.
    File(PathBuf),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InstrumentDocument {
    Plain(Vec<String>),
    Wrapped { instruments: Vec<String> },
}

impl InstrumentSource {
    /// Resolves the source into a de-duplicated list, keeping first-seen order.
    pub fn resolve(&self) -> LabelerResult<Vec<String>> {
        let raw = match self {
            Self::List(items) => items.clone(),
            Self::File(path) => read_instrument_file(path)?,
        };

        let instruments = raw
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unique()
            .collect::<Vec<_>>();

        if instruments.is_empty() {
            return Err(ConfigError::NoInstruments.into());
        }
        Ok(instruments)
    }
}

impl From<Vec<String>> for InstrumentSource {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<&[&str]> for InstrumentSource {
    fn from(value: &[&str]) -> Self {
        Self::List(value.iter().map(|s| s.to_string()).collect())
    }
}

fn read_instrument_file(path: &Path) -> LabelerResult<Vec<String>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::InstrumentSource(format!("Failed to read {}: {e}", path.display()))
    })?;
    let doc: InstrumentDocument = serde_json::from_str(&text).map_err(|e| {
        ConfigError::InstrumentSource(format!("Failed to parse {}: {e}", path.display()))
    })?;
    Ok(match doc {
        InstrumentDocument::Plain(items) => items,
        InstrumentDocument::Wrapped { instruments } => instruments,
    })
}

// ================================================================================================
// Labeling Request
// ================================================================================================

/// Immutable description of one labeling run.
///
/// # Example
///
/// ```
/// use auto_labeler::prelude::*;
///
/// let request = LabelingRequest::new(vec!["000001.SZA".to_string()], "2020-01-01", "2020-01-10")?
///     .with_label_expr(vec!["shift(close, -1) / close".to_string()])
///     .with_cast_label_int(false);
/// assert!(request.validate().is_ok());
/// # Ok::<(), auto_labeler::LabelerError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelingRequest {
    instruments: InstrumentSource,
    start_date: NaiveDate,
    end_date: NaiveDate,
    label_expr: Vec<String>,
    benchmark: String,
    drop_na_label: bool,
    cast_label_int: bool,
    user_functions: Option<String>,
}

impl LabelingRequest {
    /// Creates a request with the default label script and defaults for every flag.
    ///
    /// Dates are `YYYY-MM-DD` strings.
    pub fn new(
        instruments: impl Into<InstrumentSource>,
        start_date: &str,
        end_date: &str,
    ) -> LabelerResult<Self> {
        Ok(Self {
            instruments: instruments.into(),
            start_date: parse_date(start_date)?,
            end_date: parse_date(end_date)?,
            label_expr: parse_label_script(DEFAULT_LABEL_SCRIPT),
            benchmark: DEFAULT_BENCHMARK.to_string(),
            drop_na_label: true,
            cast_label_int: true,
            user_functions: None,
        })
    }

    /// Checks the invariants that do not require the expression engine.
    pub fn validate(&self) -> LabelerResult<()> {
        if self.start_date > self.end_date {
            return Err(ConfigError::InvalidDateRange {
                start: self.start_date.to_string(),
                end: self.end_date.to_string(),
            }
            .into());
        }
        if self.label_expr.is_empty() {
            return Err(ConfigError::NoExpressions.into());
        }
        if self.benchmark.trim().is_empty() {
            return Err(ConfigError::EmptyBenchmark.into());
        }
        Ok(())
    }

    /// Computes a deterministic hash of this request.
    ///
    /// Used as the storage key of the labeled table.
    pub fn hash(&self) -> LabelerResult<String> {
        let mut hasher = blake3::Hasher::new();
        let bytes = postcard::to_stdvec(self).map_err(ConfigError::Encoding)?;
        hasher.update(&bytes);
        Ok(format!("{}", hasher.finalize()))
    }
}

// ================================================================================================
// Builder Methods
// ================================================================================================

impl LabelingRequest {
    /// Replaces the expressions with an explicit ordered list.
    pub fn with_label_expr(self, label_expr: Vec<String>) -> Self {
        Self { label_expr, ..self }
    }

    /// Replaces the expressions with the ones found in a multi-line script.
    pub fn with_label_script(self, script: &str) -> Self {
        Self {
            label_expr: parse_label_script(script),
            ..self
        }
    }

    pub fn with_benchmark(self, benchmark: impl Into<String>) -> Self {
        Self {
            benchmark: benchmark.into(),
            ..self
        }
    }

    pub fn with_drop_na_label(self, drop_na_label: bool) -> Self {
        Self {
            drop_na_label,
            ..self
        }
    }

    pub fn with_cast_label_int(self, cast_label_int: bool) -> Self {
        Self {
            cast_label_int,
            ..self
        }
    }

    /// Sets the user-defined function source. Blank source clears it.
    pub fn with_user_functions(self, source: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            user_functions: (!source.trim().is_empty()).then_some(source),
            ..self
        }
    }
}

// ================================================================================================
// Accessor Methods
// ================================================================================================

impl LabelingRequest {
    pub fn instruments(&self) -> &InstrumentSource {
        &self.instruments
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn label_expr(&self) -> &[String] {
        &self.label_expr
    }

    pub fn benchmark(&self) -> &str {
        &self.benchmark
    }

    pub fn drop_na_label(&self) -> bool {
        self.drop_na_label
    }

    pub fn cast_label_int(&self) -> bool {
        self.cast_label_int
    }

    pub fn user_functions(&self) -> Option<&str> {
        self.user_functions.as_deref()
    }
}
