use polars::prelude::PlSmallStr;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Prefix marking a variable as a benchmark field (e.g. `benchmark_close`).
pub const BENCHMARK_PREFIX: &str = "benchmark_";

/// Prefix applied to every auxiliary column of the labeled output table.
pub const FEATURE_PREFIX: &str = "m:";

/// Column names with a fixed meaning in the history and labeled tables.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ReservedCol {
    /// Trading day of the row.
    Date,
    /// Instrument identifier (e.g. `000001.SZA`).
    Instrument,
    /// Traded amount. Rows with a non-positive amount are not tradable.
    Amount,
    /// The running label column.
    Label,
}

impl From<ReservedCol> for PlSmallStr {
    fn from(value: ReservedCol) -> Self {
        value.as_str().into()
    }
}

impl ReservedCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Whether the column keeps its name in the labeled output.
    ///
    /// `amount` is fetched for filtering only and is tagged like any other feature.
    pub fn is_output_key(&self) -> bool {
        matches!(self, Self::Date | Self::Instrument | Self::Label)
    }
}

/// Typed category of a column or expression variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnTag {
    Reserved(ReservedCol),
    /// An instrument-level field fetched from the history source.
    Feature(String),
    /// A field of the benchmark series, stored without its prefix.
    BenchmarkFeature(String),
}

impl ColumnTag {
    /// Classifies a raw column or variable name.
    ///
    /// A bare `benchmark_` with nothing after it is treated as a plain feature.
    pub fn parse(name: &str) -> Self {
        if let Ok(reserved) = name.parse::<ReservedCol>() {
            return Self::Reserved(reserved);
        }
        match name.strip_prefix(BENCHMARK_PREFIX) {
            Some(field) if !field.is_empty() => Self::BenchmarkFeature(field.to_string()),
            _ => Self::Feature(name.to_string()),
        }
    }

    /// Name of the column in the history table.
    pub fn input_name(&self) -> String {
        match self {
            Self::Reserved(col) => col.as_str().to_string(),
            Self::Feature(name) => name.clone(),
            Self::BenchmarkFeature(name) => format!("{BENCHMARK_PREFIX}{name}"),
        }
    }

    /// Name of the column in the labeled output table.
    pub fn output_name(&self) -> String {
        match self {
            Self::Reserved(col) if col.is_output_key() => col.as_str().to_string(),
            other => format!("{FEATURE_PREFIX}{}", other.input_name()),
        }
    }

    pub fn is_label(&self) -> bool {
        matches!(self, Self::Reserved(ReservedCol::Label))
    }
}
