//! Format-specific converters producing [`IngestedDoc`] units

mod hwp;
mod hwpx;
mod layout;
mod pdf;
mod tabular;

pub use hwp::HwpConverter;
pub use hwpx::HwpxConverter;
pub use layout::{detect_tables, LayoutLine, TextRun};
pub use pdf::PdfConverter;
pub use tabular::{CsvConverter, ExcelConverter};

use serde_json::Value;
use std::path::Path;

use crate::error::Result;
use crate::types::{IngestedDoc, Metadata};

/// Converts one file into ingestion units.
///
/// `metadata` already carries `source`, `filename` and `extension`; converters
/// copy it into every unit they emit and add their own keys.
pub trait DocumentConverter: Send + Sync {
    fn convert(&self, path: &Path, metadata: &Metadata) -> Result<Vec<IngestedDoc>>;
}

/// Copy of `base` tagged with the converter `type`
pub(crate) fn tagged(base: &Metadata, kind: &str) -> Metadata {
    let mut metadata = base.clone();
    metadata.insert("type".to_string(), Value::String(kind.to_string()));
    metadata
}

/// Source path recorded in the metadata, or the path itself
pub(crate) fn source_of(path: &Path, metadata: &Metadata) -> String {
    metadata
        .get("source")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}
