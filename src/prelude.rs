// 1. Traits
pub use crate::expr::ExpressionEngine;
pub use crate::report::chart::ChartRenderer;
pub use crate::report::io::{Report, ReportName, ToFile, ToJson, ToSchema};
pub use crate::sink::TableSink;
pub use crate::source::HistorySource;

// 2. The Core Pipeline Types
pub use crate::config::{InstrumentSource, LabelingRequest};
pub use crate::labeler::AutoLabeler;
pub use crate::outputs::LabelingOutputs;
pub use crate::resolver::FeatureSet;

// 3. Collaborators
pub use crate::expr::PolarsEngine;
pub use crate::report::chart::{JsonChartRenderer, TextChartRenderer};
pub use crate::sink::{FileFormat, FileSink, MemorySink, TableHandle};
pub use crate::source::{CsvHistory, FrameHistory};

// 4. Reports & Charts
pub use crate::report::chart::{ChartKind, ChartSeries, ChartSpec, PointPlacement, SeriesOptions};
pub use crate::report::distribution::{LabelCounts, LabelDistribution, LabelHistogram};

// 5. Columns & Constants
pub use crate::config::{DEFAULT_BENCHMARK, DEFAULT_LABEL_SCRIPT, parse_label_script};
pub use crate::schema::{BENCHMARK_PREFIX, ColumnTag, FEATURE_PREFIX, ReservedCol};

// 6. Errors
pub use crate::error::{
    CollaboratorError, ConfigError, DataError, ExpressionError, LabelerError, LabelerResult,
};
