use std::time::{Duration, Instant};

use tracing::info;

use crate::{
    config::LabelingRequest,
    error::LabelerResult,
    expr::{ExpressionEngine, PolarsEngine},
    labeling::label,
    loader::load,
    outputs::LabelingOutputs,
    postprocess::postprocess,
    resolver::resolve,
    sink::TableSink,
    source::HistorySource,
};

/// Labels market history with an ordered list of expressions.
///
/// Owns its three collaborators: where history comes from, where labeled tables
/// go, and the engine evaluating the expressions.
#[derive(Debug, Clone)]
pub struct AutoLabeler<H, K, E = PolarsEngine> {
    history: H,
    sink: K,
    engine: E,
}

impl<H, K> AutoLabeler<H, K, PolarsEngine>
where
    H: HistorySource,
    K: TableSink,
{
    pub fn new(history: H, sink: K) -> Self {
        Self {
            history,
            sink,
            engine: PolarsEngine,
        }
    }
}

impl<H, K, E> AutoLabeler<H, K, E>
where
    H: HistorySource,
    K: TableSink,
    E: ExpressionEngine,
{
    pub fn with_engine<E2: ExpressionEngine>(self, engine: E2) -> AutoLabeler<H, K, E2> {
        AutoLabeler {
            history: self.history,
            sink: self.sink,
            engine,
        }
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Runs the full pipeline and persists the labeled table under the request hash.
    ///
    /// Feature resolution happens before any data is fetched, so an invalid
    /// expression list never reaches the history source.
    #[tracing::instrument(skip_all, fields(hash = tracing::field::Empty))]
    pub fn run(&self, request: &LabelingRequest) -> LabelerResult<LabelingOutputs> {
        let started = Instant::now();
        request.validate()?;
        let key = request.hash()?;
        tracing::Span::current().record("hash", key.as_str());

        let user_functions = request.user_functions();
        let features = resolve(&self.engine, request.label_expr(), user_functions)?;
        let history = load(&self.history, request, &features)?;
        let labeled = label(&self.engine, history, request.label_expr(), user_functions)?;
        let table = postprocess(labeled, request.drop_na_label(), request.cast_label_int())?;
        let handle = self.sink.write(&table, &key)?;

        let elapsed = Duration::from_millis(started.elapsed().as_millis() as u64);
        info!(
            rows = table.height(),
            elapsed = %humantime::format_duration(elapsed),
            "Labeling complete"
        );
        Ok(LabelingOutputs::new(handle, request.cast_label_int()))
    }

    /// Returns the stored result for `request`, or runs the pipeline on a cache miss.
    #[tracing::instrument(skip_all, fields(hash = tracing::field::Empty))]
    pub fn load_or_run(&self, request: &LabelingRequest) -> LabelerResult<LabelingOutputs> {
        request.validate()?;
        let key = request.hash()?;
        tracing::Span::current().record("hash", key.as_str());

        match self.sink.lookup(&key)? {
            Some(handle) => {
                info!("Cache hit: Reusing labeled table.");
                Ok(LabelingOutputs::new(handle, request.cast_label_int()))
            }
            None => {
                info!("Cache miss: Labeling from history.");
                self.run(request)
            }
        }
    }
}
