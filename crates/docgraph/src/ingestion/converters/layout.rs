//! Positioned text runs rebuilt from a PDF content stream, and table detection
//! over the resulting lines.
//!
//! Positions come from the text-positioning operators only; the CTM and font
//! metrics are ignored, so glyph widths are estimated from the font size.
//! String operands are decoded through the encoding of the font selected by `Tf`.

use lopdf::content::Content;
use lopdf::{Document, Encoding, Object, ObjectId};
use std::collections::BTreeMap;

/// Estimated glyph advance as a fraction of the font size
const GLYPH_WIDTH: f32 = 0.5;

/// A piece of text at a position on the page
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
    pub text: String,
}

impl TextRun {
    /// Estimated right edge of the run
    pub fn end_x(&self) -> f32 {
        self.x + self.text.chars().count() as f32 * self.font_size * GLYPH_WIDTH
    }
}

/// Runs sharing a baseline, merged into cells
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutLine {
    pub y: f32,
    pub cells: Vec<TextRun>,
}

impl LayoutLine {
    pub fn text(&self) -> String {
        self.cells
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn font_size(&self) -> f32 {
        self.cells.iter().map(|c| c.font_size).fold(1.0, f32::max)
    }
}

#[derive(Debug, Clone, Copy)]
struct TextState {
    font_size: f32,
    scale: f32,
    leading: f32,
    line_x: f32,
    line_y: f32,
    x: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font_size: 12.0,
            scale: 1.0,
            leading: 0.0,
            line_x: 0.0,
            line_y: 0.0,
            x: 0.0,
        }
    }
}

impl TextState {
    fn size(&self) -> f32 {
        (self.font_size * self.scale).abs().max(1.0)
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_x += tx * self.scale;
        self.line_y += ty * self.scale;
        self.x = self.line_x;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    fn show(&mut self, text: String, runs: &mut Vec<TextRun>) {
        let run = TextRun {
            x: self.x,
            y: self.line_y,
            font_size: self.size(),
            text,
        };
        self.x = run.end_x();
        if !run.text.trim().is_empty() {
            runs.push(run);
        }
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn numbers<const N: usize>(operands: &[Object]) -> Option<[f32; N]> {
    let mut out = [0.0; N];
    if operands.len() < N {
        return None;
    }
    for (slot, obj) in out.iter_mut().zip(&operands[operands.len() - N..]) {
        *slot = number(obj)?;
    }
    Some(out)
}

/// Font resource name to text encoding, for one page
pub type FontEncodings<'a> = BTreeMap<Vec<u8>, Encoding<'a>>;

/// Encodings of the fonts a page uses. Fonts lopdf cannot resolve are left
/// out and their strings are decoded without font information.
pub fn page_encodings(doc: &Document, page_id: ObjectId) -> FontEncodings<'_> {
    let fonts = match doc.get_page_fonts(page_id) {
        Ok(fonts) => fonts,
        Err(e) => {
            tracing::debug!("No font resources for page {:?}: {}", page_id, e);
            return FontEncodings::new();
        }
    };

    fonts
        .into_iter()
        .filter_map(|(name, font)| match font.get_font_encoding(doc) {
            Ok(encoding) => Some((name, encoding)),
            Err(e) => {
                tracing::debug!("Unresolved encoding for font {}: {}", String::from_utf8_lossy(&name), e);
                None
            }
        })
        .collect()
}

fn decode_operand(bytes: &[u8], encoding: Option<&Encoding>) -> String {
    encoding
        .and_then(|encoding| Document::decode_text(encoding, bytes).ok())
        .unwrap_or_else(|| decode_pdf_string(bytes))
}

/// Decode a PDF string operand without font information: UTF-16BE with BOM,
/// otherwise one byte per char
fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
        return char::decode_utf16(units).filter_map(|c| c.ok()).collect();
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Text runs of a decoded page content stream, in stream order
pub fn page_runs(content: &Content, encodings: &FontEncodings) -> Vec<TextRun> {
    let mut runs = Vec::new();
    let mut state = TextState::default();
    let mut encoding: Option<&Encoding> = None;

    for op in &content.operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "BT" => {
                state = TextState {
                    font_size: state.font_size,
                    leading: state.leading,
                    ..TextState::default()
                };
            }
            "Tf" => {
                encoding = operands
                    .first()
                    .and_then(|name| name.as_name().ok())
                    .and_then(|name| encodings.get(name));
                if let Some(size) = operands.get(1).and_then(number) {
                    state.font_size = size;
                }
            }
            "TL" => {
                if let Some([leading]) = numbers::<1>(operands) {
                    state.leading = leading;
                }
            }
            "Td" => {
                if let Some([tx, ty]) = numbers::<2>(operands) {
                    state.move_line(tx, ty);
                }
            }
            "TD" => {
                if let Some([tx, ty]) = numbers::<2>(operands) {
                    state.leading = -ty;
                    state.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some([a, _, _, d, e, f]) = numbers::<6>(operands) {
                    state.scale = if d != 0.0 { d.abs() } else { a.abs().max(1.0) };
                    state.line_x = e;
                    state.line_y = f;
                    state.x = e;
                }
            }
            "T*" => state.next_line(),
            "Tj" | "'" | "\"" => {
                if op.operator != "Tj" {
                    state.next_line();
                }
                if let Some(Object::String(bytes, _)) = operands.last() {
                    state.show(decode_operand(bytes, encoding), &mut runs);
                }
            }
            "TJ" => {
                let Some(Object::Array(items)) = operands.first() else {
                    continue;
                };
                for item in items {
                    match item {
                        Object::String(bytes, _) => state.show(decode_operand(bytes, encoding), &mut runs),
                        other => {
                            if let Some(adjust) = number(other) {
                                state.x -= adjust * state.size() / 1000.0;
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    runs
}

/// Group runs into lines by baseline (top of page first) and merge adjacent
/// runs into cells; a gap wider than the font size starts a new cell.
pub fn group_lines(mut runs: Vec<TextRun>) -> Vec<LayoutLine> {
    runs.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

    let mut lines: Vec<LayoutLine> = Vec::new();
    let mut current: Vec<TextRun> = Vec::new();

    for run in runs {
        let same_line = current
            .first()
            .map(|first| (first.y - run.y).abs() <= first.font_size.min(run.font_size) * 0.5)
            .unwrap_or(true);
        if !same_line {
            lines.push(merge_cells(std::mem::take(&mut current)));
        }
        current.push(run);
    }
    if !current.is_empty() {
        lines.push(merge_cells(current));
    }
    lines
}

fn merge_cells(mut runs: Vec<TextRun>) -> LayoutLine {
    runs.sort_by(|a, b| a.x.total_cmp(&b.x));
    let y = runs.first().map(|r| r.y).unwrap_or(0.0);

    let mut cells: Vec<TextRun> = Vec::new();
    for run in runs {
        match cells.last_mut() {
            Some(cell) if run.x - cell.end_x() <= run.font_size.max(cell.font_size) => {
                if run.x - cell.end_x() > cell.font_size * 0.2 {
                    cell.text.push(' ');
                }
                cell.text.push_str(&run.text);
            }
            _ => cells.push(run),
        }
    }

    for cell in &mut cells {
        cell.text = cell.text.trim().to_string();
    }
    LayoutLine { y, cells }
}

fn aligned(a: &LayoutLine, b: &LayoutLine) -> bool {
    let tolerance = a.font_size().max(b.font_size());
    a.cells.len() == b.cells.len()
        && a
            .cells
            .iter()
            .zip(&b.cells)
            .all(|(x, y)| (x.x - y.x).abs() <= tolerance)
}

/// Tables as grids of cell strings; row 0 is the header.
///
/// A table is a run of at least two consecutive lines that all have the same
/// number (two or more) of column-aligned cells.
pub fn detect_tables(lines: &[LayoutLine]) -> Vec<Vec<Vec<String>>> {
    let mut tables = Vec::new();
    let mut start = 0;

    while start < lines.len() {
        let mut end = start + 1;
        if lines[start].cells.len() >= 2 {
            while end < lines.len() && aligned(&lines[start], &lines[end]) {
                end += 1;
            }
        }

        if end - start >= 2 {
            let grid = lines[start..end]
                .iter()
                .map(|line| line.cells.iter().map(|c| c.text.clone()).collect())
                .collect();
            tables.push(grid);
        }
        start = end;
    }

    tables
}
