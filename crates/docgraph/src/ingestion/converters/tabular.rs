//! CSV and spreadsheet tables

use calamine::{open_workbook_auto, Data, Reader};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{render_markdown, IngestedDoc, Metadata, Row, Table};

use super::{source_of, tagged, DocumentConverter};

/// Converter for `.csv` files: one TABLE unit per file
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvConverter;

/// Converter for `.xlsx` / `.xls` files: one TABLE unit per non-empty sheet
#[derive(Debug, Default, Clone, Copy)]
pub struct ExcelConverter;

impl DocumentConverter for CsvConverter {
    fn convert(&self, path: &Path, metadata: &Metadata) -> Result<Vec<IngestedDoc>> {
        let file_path = path.display().to_string();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(|e| Error::format(&file_path, e.to_string()))?;

        let mut records = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| Error::format(&file_path, e.to_string()))?;
            records.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        let mut records = records.into_iter();
        let Some(header) = records.next() else {
            tracing::debug!("{} is empty", file_path);
            return Ok(Vec::new());
        };

        let source = source_of(path, metadata);
        let caption = format!("Table extracted from {}", source);
        let unit = table_unit(
            &source,
            caption,
            &header,
            records.collect(),
            tagged(metadata, "csv"),
        );
        Ok(vec![unit])
    }
}

impl DocumentConverter for ExcelConverter {
    fn convert(&self, path: &Path, metadata: &Metadata) -> Result<Vec<IngestedDoc>> {
        let file_path = path.display().to_string();
        let mut workbook = open_workbook_auto(path)
            .map_err(|e| Error::format(&file_path, format!("failed to open workbook: {}", e)))?;

        let source = source_of(path, metadata);
        let mut units = Vec::new();

        for sheet_name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&sheet_name)
                .map_err(|e| Error::format(&file_path, format!("sheet {}: {}", sheet_name, e)))?;

            // blank rows above the header are padding; blank data rows are kept
            let mut rows = range
                .rows()
                .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>())
                .skip_while(|cells| is_blank(cells));

            let Some(header) = rows.next() else {
                tracing::debug!("Skipping empty sheet {} in {}", sheet_name, file_path);
                continue;
            };

            let mut sheet_metadata = tagged(metadata, "excel");
            sheet_metadata.insert("sheet_name".into(), Value::String(sheet_name.clone()));

            let caption = format!("Table extracted from {} (sheet {})", source, sheet_name);
            units.push(table_unit(&source, caption, &header, rows.collect(), sheet_metadata));
        }

        Ok(units)
    }
}

/// Render a spreadsheet cell; integral floats drop their decimal part
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#{:?}", e),
    }
}

fn is_blank(cells: &[String]) -> bool {
    cells.iter().all(|c| c.trim().is_empty())
}

/// Blank headers become `Unnamed: {i}`; repeats get `.1`, `.2`, ... suffixes
fn clean_headers(raw: &[String]) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    let mut headers = Vec::with_capacity(raw.len());

    for (i, header) in raw.iter().enumerate() {
        let base = match header.trim() {
            "" => format!("Unnamed: {}", i),
            name => name.to_string(),
        };

        let mut name = base.clone();
        let mut suffix = 0;
        while used.contains(&name) {
            suffix += 1;
            name = format!("{}.{}", base, suffix);
        }
        used.insert(name.clone());
        headers.push(name);
    }
    headers
}

fn table_unit(
    source: &str,
    caption: String,
    raw_header: &[String],
    records: Vec<Vec<String>>,
    metadata: Metadata,
) -> IngestedDoc {
    let headers = clean_headers(raw_header);

    let body: Vec<Vec<String>> = records
        .into_iter()
        .map(|mut cells| {
            if cells.len() > headers.len() {
                tracing::warn!(
                    "Dropping {} extra field(s) in a row of {}",
                    cells.len() - headers.len(),
                    source
                );
            }
            cells.resize(headers.len(), String::new());
            cells
        })
        .collect();

    let markdown = render_markdown(&headers, &body);
    let rows = body
        .iter()
        .enumerate()
        .map(|(index, cells)| Row::from_cells(index, &headers, cells))
        .collect();

    let table = Table::new(caption, markdown.clone(), rows, metadata.clone());
    IngestedDoc::table(format!("Table from {}.\n\n{}", source, markdown), table, metadata)
}
