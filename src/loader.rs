//! File loader dispatch.
//!
//! [`load`] picks a handler from the file extension and resolves it once
//! into a [`LoadResult`]:
//!
//! | Extension | Handler | Result |
//! |-----------|---------|--------|
//! | `pdf` | `pdf-extract` | [`LoadResult::RawText`] |
//! | `docx`, `pptx` | OOXML text runs | [`LoadResult::RawText`] |
//! | `csv` | one document per row | [`LoadResult::Records`] |
//! | `xlsx` | one document per worksheet | [`LoadResult::Records`] |
//! | `xls` | unsupported legacy format | error |
//! | anything else | encoding-detected plain text | [`LoadResult::Records`] |
//!
//! Record loaders are lazy: CSV rows are parsed one per `next()`, worksheets are
//! parsed one per `next()`, and plain text is read on first `next()`.

use std::path::{Path, PathBuf};

use encoding_rs::Encoding;

use crate::extract::{self, ExtractError, Workbook};
use crate::models::Document;

/// Bytes fed to the statistical encoding detector.
const DETECT_SAMPLE_BYTES: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("file looks binary, not text")]
    Binary,
    #[error("no extractable text")]
    Empty,
}

pub type Records = Box<dyn Iterator<Item = Result<Document, LoadError>> + Send>;

pub enum LoadResult {
    /// Whole-file text from a direct extractor.
    RawText(String),
    /// Documents produced on demand.
    Records(Records),
}

impl std::fmt::Debug for LoadResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadResult::RawText(text) => f.debug_tuple("RawText").field(&text.len()).finish(),
            LoadResult::Records(_) => f.write_str("Records(..)"),
        }
    }
}

impl LoadResult {
    /// Normalize into documents, dropping those without text.
    ///
    /// `RawText` becomes a single document with `source` and `file_type`
    /// metadata. The first failing record aborts normalization.
    pub fn into_documents(self, path: &Path) -> Result<Vec<Document>, LoadError> {
        match self {
            LoadResult::RawText(text) => {
                if text.trim().is_empty() {
                    return Ok(Vec::new());
                }
                Ok(vec![Document::new(
                    path.display().to_string(),
                    &file_type(path),
                    text,
                )])
            }
            LoadResult::Records(records) => {
                let mut docs = Vec::new();
                for record in records {
                    let doc = record?;
                    if !doc.text.trim().is_empty() {
                        docs.push(doc);
                    }
                }
                Ok(docs)
            }
        }
    }
}

/// Lower-cased extension, or `"unknown"`.
pub fn file_type(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn load(path: &Path) -> Result<LoadResult, LoadError> {
    match file_type(path).as_str() {
        "pdf" => Ok(LoadResult::RawText(extract::extract_pdf(&read_bytes(path)?)?)),
        "docx" => Ok(LoadResult::RawText(extract::extract_docx(&read_bytes(path)?)?)),
        "pptx" => Ok(LoadResult::RawText(extract::extract_pptx(&read_bytes(path)?)?)),
        "csv" => csv_records(path),
        "xlsx" => sheet_records(path),
        "xls" => Err(LoadError::Unsupported(
            "legacy .xls workbooks (save as .xlsx)".to_string(),
        )),
        _ => Ok(LoadResult::Records(Box::new(TextRecords {
            path: Some(path.to_path_buf()),
        }))),
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, LoadError> {
    std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Each row becomes `header: value` lines, like a record card.
///
/// The file is decoded the same way as plain text, so legacy-encoded
/// exports (Shift_JIS, windows-1252) load too.
fn csv_records(path: &Path) -> Result<LoadResult, LoadError> {
    let (text, encoding) = decode_text(&read_bytes(path)?)?;
    let encoding = encoding.name();
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(std::io::Cursor::new(text.into_bytes()));
    let headers = reader.headers()?.clone();
    let source = path.display().to_string();

    let rows = reader.into_records().enumerate().map(move |(row, record)| -> Result<Document, LoadError> {
        let record = record?;
        let text = record
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let header = headers.get(i).unwrap_or("");
                format!("{}: {}", header.trim(), value.trim())
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Document::new(source.clone(), "csv", text)
            .with_meta("row", row as u64)
            .with_meta("encoding", encoding))
    });
    Ok(LoadResult::Records(Box::new(rows)))
}

fn sheet_records(path: &Path) -> Result<LoadResult, LoadError> {
    let workbook = Workbook::open(read_bytes(path)?)?;
    let source = path.display().to_string();
    let sheets = (0..workbook.sheet_count()).map(move |idx| -> Result<Document, LoadError> {
        let text = workbook.sheet_text(idx)?;
        Ok(Document::new(source.clone(), "xlsx", text).with_meta("sheet", (idx + 1) as u64))
    });
    Ok(LoadResult::Records(Box::new(sheets)))
}

/// Single plain-text document, read when first pulled.
struct TextRecords {
    path: Option<PathBuf>,
}

impl Iterator for TextRecords {
    type Item = Result<Document, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.path.take()?;
        Some(read_text_document(&path))
    }
}

fn read_text_document(path: &Path) -> Result<Document, LoadError> {
    let bytes = read_bytes(path)?;
    let (text, encoding) = decode_text(&bytes)?;
    Ok(
        Document::new(path.display().to_string(), &file_type(path), text)
            .with_meta("encoding", encoding.name()),
    )
}

/// Decode bytes of unknown encoding: BOM first, then UTF-8, then detection.
pub fn decode_text(bytes: &[u8]) -> Result<(String, &'static Encoding), LoadError> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return Ok((text.into_owned(), encoding));
    }
    if bytes.contains(&0) {
        return Err(LoadError::Binary);
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok((text.to_string(), encoding_rs::UTF_8));
    }

    let mut detector = chardetng::EncodingDetector::new();
    let sample = &bytes[..bytes.len().min(DETECT_SAMPLE_BYTES)];
    detector.feed(sample, sample.len() == bytes.len());
    let encoding = detector.guess(None, true);
    let (text, _) = encoding.decode_without_bom_handling(bytes);
    Ok((text.into_owned(), encoding))
}
