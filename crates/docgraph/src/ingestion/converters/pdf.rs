//! PDF: per-page tables from the text layout, plus page text

use lopdf::content::Content;
use lopdf::Document;
use serde_json::Value;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{render_markdown, IngestedDoc, Metadata, Row, Table};

use super::layout::{detect_tables, group_lines, page_encodings, page_runs, LayoutLine};
use super::{source_of, DocumentConverter};

/// Converter for `.pdf` files
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfConverter;

impl DocumentConverter for PdfConverter {
    fn convert(&self, path: &Path, metadata: &Metadata) -> Result<Vec<IngestedDoc>> {
        let file_path = path.display().to_string();
        let source = source_of(path, metadata);

        let doc = Document::load(path)
            .map_err(|e| Error::format(&file_path, format!("failed to load PDF: {}", e)))?;

        let mut units = Vec::new();
        for (page_number, page_id) in doc.get_pages() {
            let content = doc
                .get_page_content(page_id)
                .and_then(|bytes| Content::decode(&bytes))
                .map_err(|e| Error::format(&file_path, format!("page {}: {}", page_number, e)))?;

            let encodings = page_encodings(&doc, page_id);
            let lines = group_lines(page_runs(&content, &encodings));
            let mut page_metadata = metadata.clone();
            page_metadata.insert("source".into(), Value::String(source.clone()));
            page_metadata.insert("page".into(), Value::from(page_number));

            for grid in detect_tables(&lines) {
                units.push(table_unit(&grid, page_number, &page_metadata));
            }

            let text = page_text(&doc, page_number, &lines);
            if !text.trim().is_empty() {
                units.push(IngestedDoc::text(text, page_metadata));
            }
        }

        tracing::debug!("Extracted {} units from {}", units.len(), file_path);
        Ok(units)
    }
}

fn page_text(doc: &Document, page_number: u32, lines: &[LayoutLine]) -> String {
    match doc.extract_text(&[page_number]) {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => layout_text(lines),
        Err(e) => {
            tracing::debug!("Text extraction failed on page {}, using layout lines: {}", page_number, e);
            layout_text(lines)
        }
    }
}

fn layout_text(lines: &[LayoutLine]) -> String {
    lines.iter().map(LayoutLine::text).collect::<Vec<_>>().join("\n")
}

/// Build a TABLE unit from a cell grid whose first row is the header
pub(crate) fn table_unit(grid: &[Vec<String>], page_number: u32, metadata: &Metadata) -> IngestedDoc {
    let clean = |row: &Vec<String>| -> Vec<String> { row.iter().map(|c| c.replace('\n', " ")).collect() };

    let header = grid.first().map(clean).unwrap_or_default();
    let body: Vec<Vec<String>> = grid.iter().skip(1).map(clean).collect();

    let markdown = render_markdown(&header, &body);
    let rows = body
        .iter()
        .enumerate()
        .map(|(index, cells)| Row::from_cells(index, &header, cells))
        .collect();

    let mut table_metadata = Metadata::new();
    table_metadata.insert("page".into(), Value::from(page_number));

    let table = Table::new("", markdown.clone(), rows, table_metadata);
    IngestedDoc::table(markdown, table, metadata.clone())
}
