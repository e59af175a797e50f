//! Document ingestion: format detection and conversion into units

pub mod converters;
mod parser;

pub use converters::DocumentConverter;
pub use parser::{SourceFormat, UniversalParser};
