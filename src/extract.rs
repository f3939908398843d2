//! Text extraction for binary document formats.
//!
//! The ingester guesses a MIME type from each file's extension with
//! [`mime_hint_for_path`]. Convertible formats (PDF and the OOXML family)
//! are turned into plain UTF-8 text by [`extract`]; every other type passes
//! through untouched. There is no content sniffing or charset detection.

use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

const XLSX_MAX_SHEETS: usize = 100;
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Decompressed bytes read from any single archive member (zip-bomb bound).
const MAX_PART_BYTES: u64 = 50 * 1024 * 1024;

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content type: {0}")]
    Unsupported(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

impl From<zip::result::ZipError> for ExtractError {
    fn from(e: zip::result::ZipError) -> Self {
        ExtractError::Ooxml(e.to_string())
    }
}

impl From<quick_xml::Error> for ExtractError {
    fn from(e: quick_xml::Error) -> Self {
        ExtractError::Ooxml(e.to_string())
    }
}

/// Guess a MIME type from the file extension (case-insensitive).
pub fn mime_hint_for_path(path: &str) -> &'static str {
    let name = path.rsplit('/').next().unwrap_or(path);
    let ext = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => return MIME_OCTET_STREAM,
    };
    match ext.as_str() {
        "pdf" => MIME_PDF,
        "docx" => MIME_DOCX,
        "pptx" => MIME_PPTX,
        "xlsx" => MIME_XLSX,
        "txt" | "md" | "rst" | "c" | "h" | "cc" | "cpp" | "hpp" | "go" | "rs" | "py" | "java"
        | "js" | "ts" | "json" | "toml" | "yaml" | "yml" | "xml" | "html" | "css" | "sh" => {
            MIME_TEXT
        }
        _ => MIME_OCTET_STREAM,
    }
}

/// Whether [`extract`] converts content of this type.
pub fn is_convertible(mime: &str) -> bool {
    matches!(mime, MIME_PDF | MIME_DOCX | MIME_PPTX | MIME_XLSX)
}

/// Convert `content` to indexable text when `mime_hint` names a convertible
/// format, otherwise return it unchanged.
pub fn extract(mime_hint: &str, content: Vec<u8>) -> Result<Vec<u8>, ExtractError> {
    if !is_convertible(mime_hint) {
        return Ok(content);
    }
    extract_text(&content, mime_hint).map(String::into_bytes)
}

/// Extract plain text from a convertible document.
pub fn extract_text(bytes: &[u8], mime: &str) -> Result<String, ExtractError> {
    match mime {
        MIME_PDF => pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string())),
        MIME_DOCX => docx_text(bytes),
        MIME_PPTX => pptx_text(bytes),
        MIME_XLSX => xlsx_text(bytes),
        other => Err(ExtractError::Unsupported(other.to_string())),
    }
}

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    Ok(zip::ZipArchive::new(Cursor::new(bytes))?)
}

fn read_part(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let member = archive.by_name(name)?;
    let mut out = Vec::new();
    member
        .take(MAX_PART_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_PART_BYTES {
        return Err(ExtractError::Ooxml(format!("{} exceeds {} bytes", name, MAX_PART_BYTES)));
    }
    Ok(out)
}

/// Members named `<prefix><n>.xml`, ordered by `n`.
fn numbered_parts(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut parts: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let n = name.strip_prefix(prefix)?.strip_suffix(".xml")?;
            Some((n.parse().unwrap_or(u32::MAX), name.to_string()))
        })
        .collect();
    parts.sort();
    parts.into_iter().map(|(_, name)| name).collect()
}

/// Non-empty text inside every `<*:t>` element, in document order.
fn text_runs(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut runs = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_t = true,
            Event::End(e) if e.local_name().as_ref() == b"t" => in_t = false,
            Event::Text(t) if in_t => {
                let text = t.unescape().unwrap_or_default();
                if !text.is_empty() {
                    runs.push(text.into_owned());
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(runs)
}

fn docx_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_part(&mut archive, "word/document.xml")?;
    Ok(text_runs(&xml)?.join(" "))
}

fn pptx_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let mut slides = Vec::new();
    for name in numbered_parts(&archive, "ppt/slides/slide") {
        let xml = read_part(&mut archive, &name)?;
        let text = text_runs(&xml)?.join(" ");
        if !text.is_empty() {
            slides.push(text);
        }
    }
    Ok(slides.join("\n"))
}

fn xlsx_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared = match read_part(&mut archive, "xl/sharedStrings.xml") {
        Ok(xml) => shared_strings(&xml)?,
        // Workbooks with only numeric cells have no shared string table.
        Err(_) => Vec::new(),
    };
    let mut sheets = Vec::new();
    for name in numbered_parts(&archive, "xl/worksheets/sheet").into_iter().take(XLSX_MAX_SHEETS) {
        let xml = read_part(&mut archive, &name)?;
        let cells = sheet_cells(&xml, &shared)?;
        if !cells.is_empty() {
            sheets.push(cells.join(" "));
        }
    }
    Ok(sheets.join("\n"))
}

/// One entry per `<si>`; rich-text runs inside an item are concatenated.
fn shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.extend(current.take()),
                b"t" => in_t = false,
                _ => {}
            },
            Event::Text(t) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&t.unescape().unwrap_or_default());
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Cell values of one worksheet: shared strings resolved, inline and
/// numeric values kept verbatim.
fn sheet_cells(xml: &[u8], shared: &[String]) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut cells = Vec::new();
    let mut shared_ref = false;
    let mut in_value = false;
    while cells.len() < XLSX_MAX_CELLS_PER_SHEET {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"c" => {
                    shared_ref = e
                        .attributes()
                        .flatten()
                        .any(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s");
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => shared_ref = false,
                _ => {}
            },
            Event::Text(t) if in_value => {
                let raw = t.unescape().unwrap_or_default();
                let value = raw.trim();
                if shared_ref {
                    if let Some(s) = value.parse::<usize>().ok().and_then(|i| shared.get(i)) {
                        cells.push(s.clone());
                    }
                } else if !value.is_empty() {
                    cells.push(value.to_string());
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(cells)
}
