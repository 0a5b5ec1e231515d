use std::collections::BTreeSet;

use tracing::debug;

use crate::{
    error::{ConfigError, LabelerResult},
    expr::ExpressionEngine,
    schema::{ColumnTag, ReservedCol},
};

/// Fields the label expressions need, split by where they are fetched from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet {
    instrument_features: BTreeSet<String>,
    /// Benchmark fields, stored without the `benchmark_` prefix.
    benchmark_features: BTreeSet<String>,
}

impl FeatureSet {
    pub fn instrument_features(&self) -> &BTreeSet<String> {
        &self.instrument_features
    }

    pub fn benchmark_features(&self) -> &BTreeSet<String> {
        &self.benchmark_features
    }

    pub fn has_benchmark(&self) -> bool {
        !self.benchmark_features.is_empty()
    }
}

/// Determines which instrument and benchmark fields must be loaded.
///
/// # Errors
/// Checked in this order, before any data is fetched:
/// - [`ConfigError::NoExpressions`] for an empty list.
/// - [`ConfigError::LabelInFirstExpression`] if the first expression reads `label`.
/// - [`ConfigError::NoVariables`] if no expression references any field.
/// - [`ConfigError::BenchmarkKeyColumn`] for `benchmark_date`, `benchmark_instrument` or
///   `benchmark_label`, which the joined table does not carry.
/// - [`ConfigError::NoInstrumentFeatures`] if only benchmark fields are referenced.
pub fn resolve<E: ExpressionEngine + ?Sized>(
    engine: &E,
    expressions: &[String],
    user_functions: Option<&str>,
) -> LabelerResult<FeatureSet> {
    let Some(first) = expressions.first() else {
        return Err(ConfigError::NoExpressions.into());
    };

    let mut variables = BTreeSet::new();
    for (idx, expr) in expressions.iter().enumerate() {
        let vars = engine.extract_variables(expr, user_functions)?;
        if idx == 0 && vars.iter().any(|v| ColumnTag::parse(v).is_label()) {
            return Err(ConfigError::LabelInFirstExpression(first.clone()).into());
        }
        variables.extend(vars);
    }

    if variables.is_empty() {
        return Err(ConfigError::NoVariables(expressions.to_vec()).into());
    }

    let mut features = FeatureSet::default();
    for var in variables {
        match ColumnTag::parse(&var) {
            ColumnTag::Reserved(ReservedCol::Label) => {}
            ColumnTag::BenchmarkFeature(name) => {
                if let ColumnTag::Reserved(col) = ColumnTag::parse(&name)
                    && col.is_output_key()
                {
                    return Err(ConfigError::BenchmarkKeyColumn(var).into());
                }
                features.benchmark_features.insert(name);
            }
            tag @ (ColumnTag::Reserved(_) | ColumnTag::Feature(_)) => {
                features.instrument_features.insert(tag.input_name());
            }
        }
    }

    if features.instrument_features.is_empty() {
        return Err(ConfigError::NoInstrumentFeatures(expressions.to_vec()).into());
    }

    debug!(
        instrument = ?features.instrument_features,
        benchmark = ?features.benchmark_features,
        "Resolved label features"
    );
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{DEFAULT_LABEL_SCRIPT, parse_label_script},
        error::LabelerError,
        expr::PolarsEngine,
    };

    fn exprs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_default_script() {
        let features = resolve(&PolarsEngine, &parse_label_script(DEFAULT_LABEL_SCRIPT), None)
            .expect("default script should resolve");
        let want = ["close", "high", "low", "open"]
            .into_iter()
            .map(String::from)
            .collect::<BTreeSet<_>>();
        assert_eq!(features.instrument_features(), &want);
        assert!(!features.has_benchmark());
    }

    #[test]
    fn test_resolve_partitions_benchmark_fields() {
        let features = resolve(
            &PolarsEngine,
            &exprs(&["close / benchmark_close", "label - benchmark_open"]),
            None,
        )
        .expect("resolve");
        assert_eq!(
            features.instrument_features().iter().collect::<Vec<_>>(),
            vec!["close"]
        );
        assert_eq!(
            features.benchmark_features().iter().collect::<Vec<_>>(),
            vec!["close", "open"]
        );
    }

    #[test]
    fn test_resolve_errors() {
        let cases: [(Vec<String>, fn(&LabelerError) -> bool); 6] = [
            (Vec::new(), |e| {
                matches!(e, LabelerError::Config(ConfigError::NoExpressions))
            }),
            (exprs(&["label + 1"]), |e| {
                matches!(e, LabelerError::Config(ConfigError::LabelInFirstExpression(_)))
            }),
            (exprs(&["1 + 2", "3"]), |e| {
                matches!(e, LabelerError::Config(ConfigError::NoVariables(_)))
            }),
            (exprs(&["benchmark_close", "label * 2"]), |e| {
                matches!(e, LabelerError::Config(ConfigError::NoInstrumentFeatures(_)))
            }),
            (exprs(&["close + 0 * benchmark_date"]), |e| {
                matches!(e, LabelerError::Config(ConfigError::BenchmarkKeyColumn(v)) if v == "benchmark_date")
            }),
            (exprs(&["close", "label - benchmark_instrument"]), |e| {
                matches!(e, LabelerError::Config(ConfigError::BenchmarkKeyColumn(v)) if v == "benchmark_instrument")
            }),
        ];
        for (input, check) in cases {
            let err = resolve(&PolarsEngine, &input, None).expect_err("should fail");
            assert!(check(&err), "unexpected error for {input:?}: {err:?}");
        }
    }

    #[test]
    fn test_label_later_is_allowed_and_removed() {
        let features = resolve(&PolarsEngine, &exprs(&["close", "label * amount"]), None)
            .expect("resolve");
        assert_eq!(
            features.instrument_features().iter().collect::<Vec<_>>(),
            vec!["amount", "close"]
        );
    }

    #[test]
    fn test_benchmark_amount_is_a_field() {
        let features = resolve(&PolarsEngine, &exprs(&["close * benchmark_amount"]), None)
            .expect("resolve");
        assert_eq!(
            features.benchmark_features().iter().collect::<Vec<_>>(),
            vec!["amount"]
        );
    }
}
