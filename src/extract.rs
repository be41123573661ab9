//! Text extraction for binary document formats (PDF, OOXML).
//!
//! Callers hand over raw bytes; this module returns plain UTF-8 text.
//! Nothing here panics on malformed input: every failure is an
//! [`ExtractError`] so the ingestion loop can skip the file.

use std::io::Read;

/// Maximum worksheets read from one workbook.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells read per worksheet.
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

pub fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed inputs.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("parser panicked on malformed input".to_string())),
    }
}

/// Paragraph text of a `.docx`, one line per non-empty paragraph.
pub fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) if e.local_name().as_ref() == b"t" => {
                in_text = true;
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if !current.trim().is_empty() {
                        paragraphs.push(std::mem::take(&mut current));
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !current.trim().is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join("\n"))
}

/// Slide text of a `.pptx`, slides in numeric order separated by blank lines.
pub fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let slide_names = numbered_entries(&archive, "ppt/slides/slide");
    let mut slides = Vec::new();
    for name in slide_names {
        let xml = read_zip_entry_bounded(&mut archive, &name)?;
        let text = collect_t_elements(&xml)?;
        if !text.is_empty() {
            slides.push(text);
        }
    }
    Ok(slides.join("\n\n"))
}

/// A workbook whose worksheets are parsed one at a time.
pub struct Workbook {
    bytes: Vec<u8>,
    shared_strings: Vec<String>,
    sheets: Vec<String>,
}

impl Workbook {
    pub fn open(bytes: Vec<u8>) -> Result<Self, ExtractError> {
        let (shared_strings, sheets) = {
            let mut archive = open_archive(&bytes)?;
            let shared = if archive.by_name("xl/sharedStrings.xml").is_ok() {
                let xml = read_zip_entry_bounded(&mut archive, "xl/sharedStrings.xml")?;
                read_shared_strings(&xml)?
            } else {
                Vec::new()
            };
            let mut sheets = numbered_entries(&archive, "xl/worksheets/sheet");
            sheets.truncate(XLSX_MAX_SHEETS);
            (shared, sheets)
        };
        Ok(Self {
            bytes,
            shared_strings,
            sheets,
        })
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    /// Cell text of the sheet at `idx`: one line per row, cells tab-separated.
    pub fn sheet_text(&self, idx: usize) -> Result<String, ExtractError> {
        let name = self
            .sheets
            .get(idx)
            .ok_or_else(|| ExtractError::Ooxml(format!("no worksheet at index {}", idx)))?;
        let mut archive = open_archive(&self.bytes)?;
        let xml = read_zip_entry_bounded(&mut archive, name)?;
        sheet_cells(&xml, &self.shared_strings)
    }
}

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Entries named `<prefix>N.xml`, sorted by `N`.
fn numbered_entries(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Concatenated `<*:t>` text runs, paragraphs (`<*:p>`) separated by newlines.
fn collect_t_elements(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) if e.local_name().as_ref() == b"t" => {
                in_text = true;
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" if !out.is_empty() && !out.ends_with('\n') => out.push('\n'),
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

/// Reads `<si>` entries, skipping `<rPh>` phonetic runs (furigana).
fn read_shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    let mut phonetic_depth = 0usize;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"rPh" => phonetic_depth += 1,
                b"t" => in_text = phonetic_depth == 0,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_text => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn sheet_cells(xml: &[u8], shared_strings: &[String]) -> Result<String, ExtractError> {
    let mut rows: Vec<String> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_value = false;
    let mut shared = false;
    let mut phonetic_depth = 0usize;
    let mut cell_count = 0usize;
    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    shared = e.attributes().flatten().any(|a| {
                        a.key.local_name().as_ref() == b"t" && a.value.as_ref() == b"s"
                    });
                }
                b"rPh" => phonetic_depth += 1,
                // <v> holds stored values, <t> holds inline strings.
                b"v" | b"t" => in_value = phonetic_depth == 0,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_value => {
                let raw = te.unescape().unwrap_or_default();
                let value = raw.trim();
                if !value.is_empty() {
                    let text = if shared {
                        value
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared_strings.get(i).cloned())
                            .unwrap_or_default()
                    } else {
                        value.to_string()
                    };
                    if !text.is_empty() {
                        row.push(text);
                        cell_count += 1;
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"c" => shared = false,
                b"row" if !row.is_empty() => rows.push(std::mem::take(&mut row).join("\t")),
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !row.is_empty() {
        rows.push(row.join("\t"));
    }
    Ok(rows.join("\n"))
}
