pub mod config;
pub mod error;
pub mod expr;
pub mod labeler;
pub mod labeling;
pub mod loader;
pub mod outputs;
pub mod postprocess;
pub mod prelude;
pub mod report;
pub mod resolver;
pub mod schema;
pub mod sink;
pub mod source;

pub use error::{LabelerError, LabelerResult};
pub use labeler::AutoLabeler;
