//! Document text extraction for binary KB formats (PDF, DOCX, XLSX, RTF).
//!
//! The import pipeline hands a file path to a [`TextExtractor`] and gets back
//! plain UTF-8 text, or `None` when the format carries no extractable text
//! (legacy `.doc` / `.xls` binaries). Extraction never panics; failures come
//! back as [`ExtractError`] and the pipeline skips the file.

use std::io::Read;
use std::path::Path;

use thiserror::Error;

/// Maximum sheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet.
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported document type: {0}")]
    Unsupported(String),
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

/// Path in, optional plain text out.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<Option<String>, ExtractError>;
}

/// Production extractor backed by `pdf-extract`, `zip`, and `quick-xml`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentExtractor;

impl TextExtractor for DocumentExtractor {
    fn extract(&self, path: &Path) -> Result<Option<String>, ExtractError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let text = match ext.as_str() {
            "doc" | "xls" => return Ok(None),
            "pdf" => extract_pdf(&std::fs::read(path)?)?,
            "docx" => extract_docx(&std::fs::read(path)?)?,
            "xlsx" => extract_xlsx(&std::fs::read(path)?)?,
            "rtf" => strip_rtf(&String::from_utf8_lossy(&std::fs::read(path)?)),
            other => return Err(ExtractError::Unsupported(other.to_string())),
        };

        let text = text.trim();
        Ok(if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        })
    }
}

/// Returns a fixed text for every path. Used in tests.
#[derive(Debug, Default, Clone)]
pub struct StaticExtractor {
    pub text: Option<String>,
}

impl TextExtractor for StaticExtractor {
    fn extract(&self, _path: &Path) -> Result<Option<String>, ExtractError> {
        Ok(self.text.clone())
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut Archive<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    paragraphs_text(&xml)
}

/// Collect `<w:t>` runs, breaking lines at paragraph ends so step lists
/// survive extraction.
fn paragraphs_text(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_t = true,
            Ok(Event::Text(te)) if in_t => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared_strings = if archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
        read_shared_strings(&mut archive)?
    } else {
        Vec::new()
    };

    let mut sheet_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    sheet_names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let mut sheets = Vec::new();
    for name in sheet_names.into_iter().take(XLSX_MAX_SHEETS) {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let rows = sheet_rows(&xml, &shared_strings)?;
        if !rows.is_empty() {
            sheets.push(rows);
        }
    }
    Ok(sheets.join("\n\n"))
}

fn read_shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>, ExtractError> {
    use quick_xml::events::Event;

    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.extend(current.take()),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// One line per row, cells separated by tabs.
fn sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut rows: Vec<String> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_value = false;
    let mut cell_type = Vec::new();
    let mut cell_count = 0usize;
    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    cell_type = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == b"t")
                        .map(|a| a.value.into_owned())
                        .unwrap_or_default();
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                let raw = te.unescape().unwrap_or_default();
                let value = raw.trim();
                let text = if cell_type.as_slice() == b"s" {
                    value
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| shared_strings.get(i))
                        .cloned()
                } else {
                    Some(value.to_string())
                };
                if let Some(text) = text.filter(|t| !t.is_empty()) {
                    row.push(text);
                    cell_count += 1;
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => cell_type.clear(),
                b"row" => {
                    if !row.is_empty() {
                        rows.push(row.join("\t"));
                    }
                    row.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
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

/// Drop RTF control words, groups, and hex escapes, keeping the text runs.
fn strip_rtf(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    // Depth of destination groups (`{\*...}`, fonttbl, colortbl) being skipped.
    let mut skip_depth: Option<usize> = None;
    let mut depth = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                depth += 1;
                if chars.peek() == Some(&'\\') && skip_depth.is_none() {
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    let word: String = lookahead
                        .take_while(|c| c.is_ascii_alphabetic() || *c == '*')
                        .collect();
                    if matches!(
                        word.as_str(),
                        "*" | "fonttbl" | "colortbl" | "stylesheet" | "info" | "pict"
                    ) {
                        skip_depth = Some(depth);
                    }
                }
            }
            '}' => {
                if skip_depth == Some(depth) {
                    skip_depth = None;
                }
                depth = depth.saturating_sub(1);
            }
            '\\' => {
                let Some(&next) = chars.peek() else { break };
                if next == '\'' {
                    chars.next();
                    let hex: String = chars.by_ref().take(2).collect();
                    if skip_depth.is_none() {
                        if let Ok(b) = u8::from_str_radix(&hex, 16) {
                            out.push(b as char);
                        }
                    }
                } else if next.is_ascii_alphabetic() {
                    let mut word = String::new();
                    while let Some(&c) = chars.peek() {
                        if c.is_ascii_alphabetic() {
                            word.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    while let Some(&c) = chars.peek() {
                        if c.is_ascii_digit() || c == '-' {
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if chars.peek() == Some(&' ') {
                        chars.next();
                    }
                    if skip_depth.is_none() && matches!(word.as_str(), "par" | "line" | "row") {
                        out.push('\n');
                    } else if skip_depth.is_none() && word == "tab" {
                        out.push('\t');
                    }
                } else {
                    chars.next();
                    if skip_depth.is_none() && matches!(next, '\\' | '{' | '}') {
                        out.push(next);
                    }
                }
            }
            '\r' | '\n' => {}
            _ => {
                if skip_depth.is_none() {
                    out.push(c);
                }
            }
        }
    }
    out
}
