//! Text extraction for uploaded files.
//!
//! The format is chosen by file extension. Plain-text formats are read as
//! UTF-8; PDF goes through `pdf-extract`; DOCX is unzipped and its
//! `word/document.xml` walked with `quick-xml`, one paragraph per `<w:p>`.

use std::io::Read;
use std::path::Path;

use thiserror::Error;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "rst", "csv", "log", "json", "html"];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("file is not valid UTF-8 text")]
    NotUtf8,
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// Recognised input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Text,
    Pdf,
    Docx,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Result<Self, ExtractError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(FileKind::Pdf),
            "docx" => Ok(FileKind::Docx),
            e if TEXT_EXTENSIONS.contains(&e) => Ok(FileKind::Text),
            "" => Err(ExtractError::Unsupported(format!(
                "{} (no extension)",
                path.display()
            ))),
            other => Err(ExtractError::Unsupported(format!(".{}", other))),
        }
    }
}

pub fn extract_text(bytes: &[u8], kind: FileKind) -> Result<String, ExtractError> {
    match kind {
        FileKind::Text => String::from_utf8(bytes.to_vec()).map_err(|_| ExtractError::NotUtf8),
        FileKind::Pdf => {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
        }
        FileKind::Docx => extract_docx(bytes),
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    docx_paragraphs(&xml)
}

/// Concatenate `<w:t>` runs, separating `<w:p>` paragraphs with a blank line
/// so the chunker can split on them.
fn docx_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Docx(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let para = current.trim();
                    if !para.is_empty() {
                        paragraphs.push(para.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !current.trim().is_empty() {
        paragraphs.push(current.trim().to_string());
    }

    Ok(paragraphs.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with(document_xml: &str) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut cursor);
            zip.start_file(
                "word/document.xml",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
            zip.write_all(document_xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn kind_follows_extension() {
        assert_eq!(FileKind::from_path(Path::new("a/B.PDF")).unwrap(), FileKind::Pdf);
        assert_eq!(FileKind::from_path(Path::new("notes.md")).unwrap(), FileKind::Text);
        assert_eq!(FileKind::from_path(Path::new("x.docx")).unwrap(), FileKind::Docx);
        assert!(matches!(
            FileKind::from_path(Path::new("movie.mp4")),
            Err(ExtractError::Unsupported(_))
        ));
        assert!(FileKind::from_path(Path::new("README")).is_err());
    }

    #[test]
    fn text_must_be_utf8() {
        assert_eq!(extract_text(b"hello", FileKind::Text).unwrap(), "hello");
        assert!(matches!(
            extract_text(&[0xff, 0xfe, 0x00], FileKind::Text),
            Err(ExtractError::NotUtf8)
        ));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", FileKind::Pdf).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn docx_paragraphs_are_separated() {
        let xml = r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t xml:space="preserve"> world</w:t></w:r></w:p>
    <w:p><w:r><w:t>Fish &amp; chips</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let text = extract_text(&docx_with(xml), FileKind::Docx).unwrap();
        assert_eq!(text, "Hello world\n\nFish & chips");
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_text(b"not a zip", FileKind::Docx).unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }
}
