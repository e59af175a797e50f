//! Legacy HWP: text recovery from the compound binary container
//!
//! Body sections live in `BodyText/Section{n}` streams as raw DEFLATE data
//! holding UTF-16LE records. Record headers are not parsed; decoded text is
//! filtered down to printable characters, which gives a lower bound on the
//! document text.

use flate2::read::DeflateDecoder;
use serde_json::Value;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use unicode_general_category::{get_general_category, GeneralCategory};

use crate::error::{Error, Result};
use crate::types::{IngestedDoc, Metadata};

use super::{tagged, DocumentConverter};

const CFB_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const BODY_STORAGE: &str = "BodyText";

/// Converter for `.hwp` files
#[derive(Debug, Default, Clone, Copy)]
pub struct HwpConverter;

impl DocumentConverter for HwpConverter {
    fn convert(&self, path: &Path, metadata: &Metadata) -> Result<Vec<IngestedDoc>> {
        let file_path = path.display().to_string();

        if !has_cfb_magic(path)? {
            return Err(Error::format(&file_path, "not a compound binary container"));
        }

        let mut container = cfb::open(path)
            .map_err(|e| Error::format(&file_path, format!("invalid compound file: {}", e)))?;

        let mut sections: Vec<(u32, PathBuf)> = container
            .walk()
            .filter(|entry| entry.is_stream())
            .filter_map(|entry| {
                let path = entry.path();
                let top = path.components().find_map(|c| match c {
                    Component::Normal(name) => name.to_str(),
                    _ => None,
                });
                if top != Some(BODY_STORAGE) {
                    return None;
                }
                let number = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_prefix("Section"))
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(u32::MAX);
                Some((number, path.to_path_buf()))
            })
            .collect();
        sections.sort();

        let mut texts = Vec::with_capacity(sections.len());
        let mut skipped = 0usize;

        for (_, stream_path) in &sections {
            let mut raw = Vec::new();
            container
                .open_stream(stream_path)
                .and_then(|mut stream| stream.read_to_end(&mut raw))
                .map_err(|e| Error::format(&file_path, format!("unreadable stream {}: {}", stream_path.display(), e)))?;

            match inflate_raw(&raw) {
                Ok(data) => texts.push(decode_utf16_text(&data)),
                Err(e) => {
                    tracing::warn!("Skipping {} in {}: {}", stream_path.display(), file_path, e);
                    skipped += 1;
                }
            }
        }

        let content = texts.concat().trim().to_string();
        tracing::debug!(
            "Recovered {} chars from {} ({} sections, {} skipped)",
            content.chars().count(),
            file_path,
            sections.len(),
            skipped
        );

        if content.is_empty() {
            return Ok(Vec::new());
        }

        let mut metadata = tagged(metadata, "hwp_legacy");
        metadata.insert("sections_read".into(), Value::from(sections.len() - skipped));
        metadata.insert("sections_skipped".into(), Value::from(skipped));

        Ok(vec![IngestedDoc::text(content, metadata)])
    }
}

fn has_cfb_magic(path: &Path) -> Result<bool> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 8];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == CFB_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn inflate_raw(raw: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    DeflateDecoder::new(raw)
        .read_to_end(&mut out)
        .map_err(|e| Error::decode(format!("deflate failed: {}", e)))?;
    Ok(out)
}

/// Permissive UTF-16LE decode keeping printable characters, newlines and tabs
fn decode_utf16_text(data: &[u8]) -> String {
    let units = data
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));

    char::decode_utf16(units)
        .filter_map(|c| c.ok())
        .filter(|c| *c == '\n' || *c == '\t' || is_printable(*c))
        .collect()
}

/// Printable in the Unicode sense: no controls, format or private-use code points,
/// unassigned code points, or separators other than the ASCII space
fn is_printable(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    !matches!(
        get_general_category(c),
        GeneralCategory::Control
            | GeneralCategory::Format
            | GeneralCategory::Surrogate
            | GeneralCategory::PrivateUse
            | GeneralCategory::Unassigned
            | GeneralCategory::SpaceSeparator
            | GeneralCategory::LineSeparator
            | GeneralCategory::ParagraphSeparator
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    fn utf16le(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn write_hwp(path: &Path, streams: &[(&str, Vec<u8>)]) {
        let mut container = cfb::create(path).unwrap();
        container.create_storage("/BodyText").unwrap();
        for (name, data) in streams {
            let mut stream = container.create_stream(format!("/BodyText/{}", name)).unwrap();
            stream.write_all(data).unwrap();
        }
        container.flush().unwrap();
    }

    fn source_metadata(path: &Path) -> Metadata {
        let mut m = Metadata::new();
        m.insert("source".into(), Value::String(path.display().to_string()));
        m
    }

    #[test]
    fn test_recovers_sections_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.hwp");

        let mut second = utf16le("두번째 섹션");
        second.extend_from_slice(&[0x02, 0x00]);
        write_hwp(
            &path,
            &[
                ("Section1", deflate(&second)),
                ("Section0", deflate(&utf16le("안녕하세요 HWP\t문서"))),
                ("Section2", vec![0xFF; 16]),
            ],
        );

        let docs = HwpConverter.convert(&path, &source_metadata(&path)).unwrap();
        assert_eq!(docs.len(), 1);
        // sections are concatenated in order with no separator
        assert_eq!(docs[0].content, "안녕하세요 HWP\t문서두번째 섹션");
        assert_eq!(docs[0].metadata["type"], "hwp_legacy");
        assert_eq!(docs[0].metadata["sections_read"], 2);
        assert_eq!(docs[0].metadata["sections_skipped"], 1);
    }

    #[test]
    fn test_no_text_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.hwp");
        write_hwp(&path, &[("Section0", deflate(&[0x01, 0x00, 0x02, 0x00]))]);

        assert!(HwpConverter.convert(&path, &Metadata::new()).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_non_container() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fake.hwp");
        std::fs::write(&path, b"just some text pretending to be hwp").unwrap();

        assert!(matches!(
            HwpConverter.convert(&path, &Metadata::new()),
            Err(Error::Format { .. })
        ));

        std::fs::write(&path, b"abc").unwrap();
        assert!(matches!(
            HwpConverter.convert(&path, &Metadata::new()),
            Err(Error::Format { .. })
        ));
    }

    #[test]
    fn test_decode_drops_unpaired_surrogates() {
        let mut data = utf16le("ab");
        data.extend_from_slice(&0xD800u16.to_le_bytes());
        data.extend_from_slice(&utf16le("c\r\n"));
        assert_eq!(decode_utf16_text(&data), "abc\n");
    }

    #[test]
    fn test_decode_drops_format_private_use_and_odd_spaces() {
        let data = utf16le("a\u{E000}\u{200B}\u{FEFF}\u{A0}b c\u{2028}d");
        assert_eq!(decode_utf16_text(&data), "ab cd");
    }
}
