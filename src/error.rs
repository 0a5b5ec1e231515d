use thiserror::Error;

pub type LabelerResult<T> = Result<T, LabelerError>;

#[derive(Debug, Error)]
pub enum LabelerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl From<ExpressionError> for LabelerError {
    fn from(value: ExpressionError) -> Self {
        LabelerError::Collaborator(CollaboratorError::Expression(value))
    }
}

/// Errors raised while validating a labeling request, before any data is fetched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No label expressions were supplied")]
    NoExpressions,

    #[error("The `label` variable cannot be used in the first expression: '{0}'")]
    LabelInFirstExpression(String),

    #[error("The label expressions do not reference any data field: {0:?}")]
    NoVariables(Vec<String>),

    #[error("No instrument fields to load were found in the expressions: {0:?}")]
    NoInstrumentFeatures(Vec<String>),

    #[error("'{0}' names a key column, not a field of the benchmark series")]
    BenchmarkKeyColumn(String),

    #[error("The instrument list is empty")]
    NoInstruments,

    #[error("Invalid date '{value}': {msg}")]
    InvalidDate { value: String, msg: String },

    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("Benchmark identifier must not be empty")]
    EmptyBenchmark,

    #[error("Failed to resolve instrument source: {0}")]
    InstrumentSource(String),

    #[error("Failed to encode labeling request")]
    Encoding(#[from] postcard::Error),
}

/// Errors related to the content of the labeled table.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Labels must be non-negative integers, found minimum label={min}")]
    NegativeLabel { min: f64 },

    #[error("Cannot cast labels to integers: {count} rows have a missing label")]
    MissingLabel { count: usize },

    #[error("Failed to cast labels to integers: {0}")]
    LabelCast(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Data frame error: {0}")]
    DataFrame(String),
}

/// Failures surfaced from the history source, expression engine, table sink or chart renderer.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("History fetch failed: {0}")]
    Fetch(String),

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error("Table sink failure: {0}")]
    Sink(String),

    #[error("Chart rendering failed: {0}")]
    Render(String),

    #[error("IO operation failed")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed")]
    Json(#[from] serde_json::Error),
}

/// Errors produced while parsing, expanding or evaluating label expressions.
#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error("Parse error in '{expr}' at position {pos}: {msg}")]
    Parse {
        expr: String,
        pos: usize,
        msg: String,
    },

    #[error("Unknown function: '{0}'")]
    UnknownFunction(String),

    #[error("Function '{name}' expects {expected} argument(s), found {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Argument '{arg}' of '{name}' must be a constant")]
    NonConstant { name: String, arg: String },

    #[error("Invalid argument for '{name}': {msg}")]
    InvalidArgument { name: String, msg: String },

    #[error("User function '{0}' is defined more than once or shadows a built-in")]
    DuplicateFunction(String),

    #[error("Recursive user function: '{0}'")]
    Recursion(String),

    #[error("Expression evaluation failed: {0}")]
    Evaluation(String),
}
