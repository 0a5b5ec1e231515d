pub mod chart;
pub mod distribution;
pub mod io;
pub mod polars_ext;
