//! Concept extraction from ingested text

mod concepts;

pub use concepts::{parse_concepts, ConceptExtractor};
