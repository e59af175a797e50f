//! Extension-dispatched entry point over all converters

use serde_json::Value;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{ExtractionResult, IngestedDoc, Metadata};

use super::converters::{
    tagged, CsvConverter, DocumentConverter, ExcelConverter, HwpConverter, HwpxConverter,
    PdfConverter,
};

/// Input format, resolved once from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// `.hwp` compound binary
    LegacyBinary,
    /// `.hwpx` / `.zip`
    ZipXml,
    Csv,
    /// `.xlsx` / `.xls`
    Spreadsheet,
    Pdf,
    /// Anything else, read as text
    Fallback,
}

impl SourceFormat {
    /// Format for a lower-cased extension without the dot
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "hwp" => Self::LegacyBinary,
            "hwpx" | "zip" => Self::ZipXml,
            "csv" => Self::Csv,
            "xlsx" | "xls" => Self::Spreadsheet,
            "pdf" => Self::Pdf,
            _ => Self::Fallback,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        Self::from_extension(&extension_of(path))
    }

    fn converter(&self) -> &'static dyn DocumentConverter {
        match self {
            Self::LegacyBinary => &HwpConverter,
            Self::ZipXml => &HwpxConverter,
            Self::Csv => &CsvConverter,
            Self::Spreadsheet => &ExcelConverter,
            Self::Pdf => &PdfConverter,
            Self::Fallback => &FallbackConverter,
        }
    }

    /// Run the converter for this format
    pub fn convert(&self, path: &Path, metadata: &Metadata) -> Result<Vec<IngestedDoc>> {
        self.converter().convert(path, metadata)
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// Reads any file as lossy UTF-8 text
#[derive(Debug, Default, Clone, Copy)]
struct FallbackConverter;

impl DocumentConverter for FallbackConverter {
    fn convert(&self, path: &Path, metadata: &Metadata) -> Result<Vec<IngestedDoc>> {
        let bytes = std::fs::read(path)?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        Ok(vec![IngestedDoc::text(text, tagged(metadata, "fallback_text"))])
    }
}

/// Multi-format parser dispatching on file extension
#[derive(Debug, Default, Clone, Copy)]
pub struct UniversalParser;

impl UniversalParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a file into units; converter failures are logged and yield no units
    pub fn parse(&self, path: &Path, metadata: &Metadata) -> Result<Vec<IngestedDoc>> {
        Ok(self.extract(path, metadata)?.documents)
    }

    /// Parse a file, keeping absorbed converter failures in the result
    pub fn extract(&self, path: &Path, metadata: &Metadata) -> Result<ExtractionResult> {
        if !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }

        let file_path = path.display().to_string();
        let format = SourceFormat::from_path(path);

        let mut file_metadata = metadata.clone();
        file_metadata.insert("source".into(), Value::String(file_path.clone()));
        file_metadata.insert(
            "filename".into(),
            Value::String(
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            ),
        );
        let ext = extension_of(path);
        let ext = if ext.is_empty() { ext } else { format!(".{}", ext) };
        file_metadata.insert("extension".into(), Value::String(ext));

        tracing::debug!("Parsing {} as {:?}", file_path, format);

        match format.convert(path, &file_metadata) {
            Ok(documents) => Ok(ExtractionResult {
                file_path,
                documents,
                errors: Vec::new(),
            }),
            Err(e) => {
                tracing::warn!("Error parsing {}: {}", file_path, e);
                Ok(ExtractionResult {
                    file_path,
                    documents: Vec::new(),
                    errors: vec![e.to_string()],
                })
            }
        }
    }
}
