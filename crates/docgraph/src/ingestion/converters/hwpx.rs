//! HWPX: zipped OWPML sections

use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::Value;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::types::{IngestedDoc, Metadata};

use super::{tagged, DocumentConverter};

/// Converter for `.hwpx` (and `.zip`) files.
///
/// Tables (`tbl`) are counted but their cells stay inline in the text.
#[derive(Debug, Default, Clone, Copy)]
pub struct HwpxConverter;

/// Text pieces and table count of one section
#[derive(Debug, Default, PartialEq)]
struct SectionText {
    pieces: Vec<String>,
    tables: usize,
}

impl DocumentConverter for HwpxConverter {
    fn convert(&self, path: &Path, metadata: &Metadata) -> Result<Vec<IngestedDoc>> {
        let file_path = path.display().to_string();

        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file)
            .map_err(|e| Error::format(&file_path, format!("invalid zip container: {}", e)))?;

        let mut sections: Vec<(u32, String)> = archive
            .file_names()
            .filter_map(|name| section_number(name).map(|n| (n, name.to_string())))
            .collect();
        sections.sort();

        let mut pieces = Vec::new();
        let mut table_count = 0usize;

        for (_, name) in &sections {
            let mut xml = String::new();
            archive
                .by_name(name)
                .map_err(|e| Error::format(&file_path, format!("{}: {}", name, e)))?
                .read_to_string(&mut xml)
                .map_err(|e| Error::format(&file_path, format!("{}: {}", name, e)))?;

            let section = read_section(&xml)
                .map_err(|message| Error::format(&file_path, format!("{}: {}", name, message)))?;
            pieces.extend(section.pieces);
            table_count += section.tables;
        }

        tracing::debug!(
            "Read {} sections, {} text runs, {} tables from {}",
            sections.len(),
            pieces.len(),
            table_count,
            file_path
        );

        let mut metadata = tagged(metadata, "hwpx");
        metadata.insert("table_count".into(), Value::from(table_count));

        Ok(vec![IngestedDoc::text(pieces.join("\n"), metadata)])
    }
}

/// `Contents/section{n}.xml` → `n`
fn section_number(name: &str) -> Option<u32> {
    name.strip_prefix("Contents/section")?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

/// Collect the text of every `t` element in document order
fn read_section(xml: &str) -> std::result::Result<SectionText, String> {
    let mut reader = Reader::from_str(xml);
    let mut section = SectionText::default();
    let mut depth = 0usize;
    let mut text_depth = 0usize;
    let mut current = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                match e.local_name().as_ref() {
                    b"t" => text_depth += 1,
                    b"tbl" => section.tables += 1,
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"tbl" {
                    section.tables += 1;
                }
            }
            Ok(Event::Text(e)) if text_depth > 0 => {
                let text = e.unescape().map_err(|e| e.to_string())?;
                current.push_str(&text);
            }
            Ok(Event::CData(e)) if text_depth > 0 => {
                current.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Ok(Event::End(e)) => {
                depth = depth.saturating_sub(1);
                if e.local_name().as_ref() == b"t" && text_depth > 0 {
                    text_depth -= 1;
                    if text_depth == 0 && !current.is_empty() {
                        section.pieces.push(std::mem::take(&mut current));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!("malformed XML at position {}: {}", reader.buffer_position(), e))
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(format!("{} unclosed element(s) at end of file", depth));
    }
    Ok(section)
}
