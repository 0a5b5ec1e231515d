use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::LabelerResult,
    report::{
        chart::{ChartRenderer, ChartSpec},
        distribution::LabelDistribution,
    },
    sink::{TableHandle, TableSink},
};

/// Result of a labeling run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelingOutputs {
    data: TableHandle,
    cast_label_int: bool,
}

impl LabelingOutputs {
    pub fn new(data: TableHandle, cast_label_int: bool) -> Self {
        Self {
            data,
            cast_label_int,
        }
    }

    /// Handle of the labeled table.
    pub fn data(&self) -> &TableHandle {
        &self.data
    }

    pub fn cast_label_int(&self) -> bool {
        self.cast_label_int
    }

    /// Reads the labeled table back and summarizes its labels.
    ///
    /// Integer labels are counted per value; continuous labels are bucketed into an
    /// equal-width histogram.
    pub fn label_distribution<K: TableSink + ?Sized>(
        &self,
        sink: &K,
    ) -> LabelerResult<LabelDistribution> {
        let labeled = sink.read(&self.data)?;
        LabelDistribution::from_labeled(&labeled, self.cast_label_int)
    }

    /// Draws the label distribution as a column chart and returns the chart drawn.
    pub fn plot_label_counts<K, R>(&self, sink: &K, renderer: &mut R) -> LabelerResult<ChartSpec>
    where
        K: TableSink + ?Sized,
        R: ChartRenderer + ?Sized,
    {
        let chart = self.label_distribution(sink)?.to_chart()?;
        info!(
            table = %self.data.id(),
            categories = chart.categories.len(),
            "Plotting label distribution"
        );
        renderer.render(&chart)?;
        Ok(chart)
    }
}
