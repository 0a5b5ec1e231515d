use std::sync::Arc;

use polars::{
    df,
    frame::DataFrame,
    prelude::{DataType, Field, IntoLazy, Schema, SchemaRef, SortMultipleOptions, col, len},
};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    error::{DataError, LabelerError, LabelerResult},
    report::{
        chart::{ChartKind, ChartSeries, ChartSpec, PointPlacement, SeriesOptions},
        io::{Report, ReportName, ToSchema},
        polars_ext::polars_to_labeler_error,
    },
    schema::ReservedCol,
};

/// Number of equal-width buckets used for continuous labels.
pub const HISTOGRAM_BINS: usize = 20;

// ================================================================================================
// Label Counts
// ================================================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum LabelCountCol {
    Label,
    Count,
}

impl From<LabelCountCol> for polars::prelude::PlSmallStr {
    fn from(value: LabelCountCol) -> Self {
        value.as_str().into()
    }
}

impl LabelCountCol {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Number of rows per integer label, sorted by label.
#[derive(Debug, Clone)]
pub struct LabelCounts {
    df: DataFrame,
}

impl Default for LabelCounts {
    fn default() -> Self {
        let df = DataFrame::empty_with_schema(&Self::to_schema());
        Self { df }
    }
}

impl ReportName for LabelCounts {
    fn base_name(&self) -> String {
        "label_counts".to_string()
    }
}

impl Report for LabelCounts {
    fn as_df(&self) -> &DataFrame {
        &self.df
    }
}

impl ToSchema for LabelCounts {
    fn to_schema() -> SchemaRef {
        let fields = LabelCountCol::iter().map(|c| {
            let dtype = match c {
                LabelCountCol::Label => DataType::Int64,
                LabelCountCol::Count => DataType::UInt64,
            };
            Field::new(c.into(), dtype)
        });
        Arc::new(Schema::from_iter(fields))
    }
}

impl TryFrom<&DataFrame> for LabelCounts {
    type Error = LabelerError;

    fn try_from(labeled: &DataFrame) -> LabelerResult<Self> {
        require_label(labeled)?;
        if labeled.is_empty() {
            return Ok(Self::default());
        }

        let df = labeled
            .clone()
            .lazy()
            .filter(col(ReservedCol::Label).is_not_null())
            .group_by([col(ReservedCol::Label).cast(DataType::Int64).alias(LabelCountCol::Label)])
            .agg([len().cast(DataType::UInt64).alias(LabelCountCol::Count)])
            .sort([LabelCountCol::Label.as_str()], SortMultipleOptions::default())
            .collect()
            .map_err(|e| polars_to_labeler_error("label counts", e))?;
        Ok(Self { df })
    }
}

impl LabelCounts {
    pub fn to_chart(&self) -> LabelerResult<ChartSpec> {
        let categories = f64_values(&self.df, LabelCountCol::Label.as_str())?
            .into_iter()
            .map(|v| (v as i64).to_string())
            .collect();
        let data = f64_values(&self.df, LabelCountCol::Count.as_str())?;

        Ok(ChartSpec {
            title: "Label distribution".to_string(),
            kind: ChartKind::Column,
            x_label: LabelCountCol::Label.to_string(),
            categories,
            series: vec![ChartSeries {
                name: LabelCountCol::Count.to_string(),
                data,
            }],
            series_options: SeriesOptions::default(),
            double_precision: Some(0),
        })
    }
}

// ================================================================================================
// Label Histogram
// ================================================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum LabelHistogramCol {
    BinStart,
    BinEnd,
    Count,
}

impl From<LabelHistogramCol> for polars::prelude::PlSmallStr {
    fn from(value: LabelHistogramCol) -> Self {
        value.as_str().into()
    }
}

impl LabelHistogramCol {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Equal-width histogram of continuous labels.
///
/// Buckets span `[min, max]` of the finite labels. Every bucket is half-open except
/// the last, which also holds `max`. If all labels are equal the range is widened by
/// 0.5 on each side.
#[derive(Debug, Clone)]
pub struct LabelHistogram {
    df: DataFrame,
}

impl Default for LabelHistogram {
    fn default() -> Self {
        let df = DataFrame::empty_with_schema(&Self::to_schema());
        Self { df }
    }
}

impl ReportName for LabelHistogram {
    fn base_name(&self) -> String {
        "label_histogram".to_string()
    }
}

impl Report for LabelHistogram {
    fn as_df(&self) -> &DataFrame {
        &self.df
    }
}

impl ToSchema for LabelHistogram {
    fn to_schema() -> SchemaRef {
        let fields = LabelHistogramCol::iter().map(|c| {
            let dtype = match c {
                LabelHistogramCol::BinStart | LabelHistogramCol::BinEnd => DataType::Float64,
                LabelHistogramCol::Count => DataType::UInt64,
            };
            Field::new(c.into(), dtype)
        });
        Arc::new(Schema::from_iter(fields))
    }
}

impl TryFrom<&DataFrame> for LabelHistogram {
    type Error = LabelerError;

    fn try_from(labeled: &DataFrame) -> LabelerResult<Self> {
        Self::with_bins(labeled, HISTOGRAM_BINS)
    }
}

impl LabelHistogram {
    pub fn with_bins(labeled: &DataFrame, bins: usize) -> LabelerResult<Self> {
        require_label(labeled)?;
        let values = f64_values(labeled, ReservedCol::Label.as_str())?
            .into_iter()
            .filter(|v| v.is_finite())
            .collect::<Vec<_>>();
        if values.is_empty() || bins == 0 {
            return Ok(Self::default());
        }

        let (lo, hi) = range(&values);
        let width = (hi - lo) / bins as f64;
        let mut counts = vec![0u64; bins];
        for v in &values {
            let idx = (((v - lo) / width) as usize).min(bins - 1);
            counts[idx] += 1;
        }

        let starts = (0..bins).map(|i| lo + i as f64 * width).collect::<Vec<_>>();
        let ends = (1..=bins)
            .map(|i| if i == bins { hi } else { lo + i as f64 * width })
            .collect::<Vec<_>>();

        let df = df![
            LabelHistogramCol::BinStart.as_str() => starts,
            LabelHistogramCol::BinEnd.as_str() => ends,
            LabelHistogramCol::Count.as_str() => counts,
        ]
        .map_err(|e| polars_to_labeler_error("label histogram", e))?;
        Ok(Self { df })
    }

    pub fn to_chart(&self) -> LabelerResult<ChartSpec> {
        let categories = f64_values(&self.df, LabelHistogramCol::BinStart.as_str())?
            .into_iter()
            .map(|v| format!("{v:.4}"))
            .collect();
        let data = f64_values(&self.df, LabelHistogramCol::Count.as_str())?;

        Ok(ChartSpec {
            title: ReservedCol::Label.to_string(),
            kind: ChartKind::Column,
            x_label: ReservedCol::Label.to_string(),
            categories,
            series: vec![ChartSeries {
                name: LabelHistogramCol::Count.to_string(),
                data,
            }],
            series_options: SeriesOptions {
                point_padding: Some(0.0),
                group_padding: Some(0.0),
                point_placement: Some(PointPlacement::Between),
            },
            double_precision: None,
        })
    }
}

// ================================================================================================
// Label Distribution
// ================================================================================================

/// Distribution of the labels of a persisted table.
#[derive(Debug, Clone)]
pub enum LabelDistribution {
    /// Integer labels: one bar per label.
    Counts(LabelCounts),
    /// Continuous labels: equal-width histogram.
    Histogram(LabelHistogram),
}

impl LabelDistribution {
    pub fn from_labeled(labeled: &DataFrame, cast_label_int: bool) -> LabelerResult<Self> {
        if cast_label_int {
            Ok(Self::Counts(LabelCounts::try_from(labeled)?))
        } else {
            Ok(Self::Histogram(LabelHistogram::try_from(labeled)?))
        }
    }

    pub fn to_chart(&self) -> LabelerResult<ChartSpec> {
        match self {
            Self::Counts(r) => r.to_chart(),
            Self::Histogram(r) => r.to_chart(),
        }
    }

    pub fn as_df(&self) -> &DataFrame {
        match self {
            Self::Counts(r) => r.as_df(),
            Self::Histogram(r) => r.as_df(),
        }
    }
}

// ================================================================================================
// Helper Functions
// ================================================================================================

fn require_label(df: &DataFrame) -> LabelerResult<()> {
    if df.column(ReservedCol::Label.as_str()).is_err() {
        return Err(DataError::MissingColumn(ReservedCol::Label.to_string()).into());
    }
    Ok(())
}

/// Non-null values of `name` as `f64`.
fn f64_values(df: &DataFrame, name: &str) -> LabelerResult<Vec<f64>> {
    let column = df
        .column(name)
        .and_then(|c| c.cast(&DataType::Float64))
        .map_err(|e| polars_to_labeler_error("label distribution", e))?;
    let values = column
        .f64()
        .map_err(|e| polars_to_labeler_error("label distribution", e))?
        .into_iter()
        .flatten()
        .collect();
    Ok(values)
}

fn range(values: &[f64]) -> (f64, f64) {
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if lo == hi {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo, hi)
    }
}
