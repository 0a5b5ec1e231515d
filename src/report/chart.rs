use std::io::Write;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::error::{CollaboratorError, LabelerResult};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChartKind {
    Column,
}

/// Where a bar sits relative to its category tick.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PointPlacement {
    On,
    /// Bars span the interval between two ticks, as in a histogram.
    Between,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SeriesOptions {
    pub point_padding: Option<f64>,
    pub group_padding: Option<f64>,
    pub point_placement: Option<PointPlacement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub name: String,
    pub data: Vec<f64>,
}

/// Renderer-agnostic description of a categorical chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub title: String,
    pub kind: ChartKind,
    pub x_label: String,
    pub categories: Vec<String>,
    pub series: Vec<ChartSeries>,
    pub series_options: SeriesOptions,
    /// Decimal places shown for values; `None` leaves formatting to the renderer.
    pub double_precision: Option<u8>,
}

/// Draws a [`ChartSpec`].
pub trait ChartRenderer {
    fn render(&mut self, chart: &ChartSpec) -> LabelerResult<()>;
}

impl<T: ChartRenderer + ?Sized> ChartRenderer for &mut T {
    fn render(&mut self, chart: &ChartSpec) -> LabelerResult<()> {
        (**self).render(chart)
    }
}

// ================================================================================================
// JSON
// ================================================================================================

/// Writes the chart spec as JSON, for a front end to draw.
#[derive(Debug)]
pub struct JsonChartRenderer<W> {
    writer: W,
    pretty: bool,
}

impl<W: Write> JsonChartRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            pretty: false,
        }
    }

    pub fn with_pretty(self, pretty: bool) -> Self {
        Self { pretty, ..self }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ChartRenderer for JsonChartRenderer<W> {
    fn render(&mut self, chart: &ChartSpec) -> LabelerResult<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.writer, chart)
        } else {
            serde_json::to_writer(&mut self.writer, chart)
        }
        .map_err(CollaboratorError::Json)?;
        writeln!(self.writer).map_err(CollaboratorError::Io)?;
        Ok(())
    }
}

// ================================================================================================
// Text
// ================================================================================================

/// Horizontal bar chart for terminals.
///
/// ```text
/// Label distribution
/// 0 | ########             4
/// 1 | #################### 10
/// ```
#[derive(Debug)]
pub struct TextChartRenderer<W> {
    writer: W,
    width: usize,
}

impl<W: Write> TextChartRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, width: 40 }
    }

    /// Length of the longest bar, in characters.
    pub fn with_width(self, width: usize) -> Self {
        Self {
            width: width.max(1),
            ..self
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ChartRenderer for TextChartRenderer<W> {
    fn render(&mut self, chart: &ChartSpec) -> LabelerResult<()> {
        let render_err = |e: std::io::Error| CollaboratorError::Render(e.to_string());
        let Some(series) = chart.series.first() else {
            return Err(CollaboratorError::Render("Chart has no series".to_string()).into());
        };

        writeln!(self.writer, "{}", chart.title).map_err(render_err)?;
        let max = series.data.iter().copied().fold(0.0_f64, f64::max);
        let label_width = chart.categories.iter().map(String::len).max().unwrap_or(0);
        let precision = chart.double_precision.map(usize::from).unwrap_or(2);

        for (category, value) in chart.categories.iter().zip(&series.data) {
            let len = if max > 0.0 {
                ((value / max) * self.width as f64).round() as usize
            } else {
                0
            };
            writeln!(
                self.writer,
                "{category:>label_width$} | {:<width$} {value:.precision$}",
                "#".repeat(len),
                width = self.width,
            )
            .map_err(render_err)?;
        }
        Ok(())
    }
}
