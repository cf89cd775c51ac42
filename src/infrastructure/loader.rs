use std::io::{Cursor, Read};
use std::path::Path;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use crate::domain::{ports::DocumentLoader, Document, DomainError};

const SUPPORTED: [&str; 5] = ["txt", "md", "pdf", "docx", "doc"];

/// Shortest run of printable bytes kept when scraping legacy `.doc` files.
const MIN_DOC_RUN: usize = 4;

/// Reads plain text, Markdown, PDF, DOCX and legacy DOC files from disk.
#[derive(Debug, Clone, Default)]
pub struct FileDocumentLoader;

impl FileDocumentLoader {
    pub fn new() -> Self {
        Self
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

#[async_trait]
impl DocumentLoader for FileDocumentLoader {
    fn supports(&self, path: &Path) -> bool {
        extension(path).is_some_and(|ext| SUPPORTED.contains(&ext.as_str()))
    }

    async fn load(&self, path: &Path) -> Result<Document, DomainError> {
        let ext = extension(path)
            .filter(|ext| SUPPORTED.contains(&ext.as_str()))
            .ok_or_else(|| {
                DomainError::validation(format!("unsupported file type: {}", path.display()))
            })?;

        let bytes = tokio::fs::read(path).await?;
        let text = match ext.as_str() {
            "pdf" => blocking(move || {
                pdf_extract::extract_text_from_mem(&bytes)
                    .map_err(|e| DomainError::validation(format!("failed to extract PDF text: {e}")))
            })
            .await?,
            "docx" => blocking(move || docx_text(&bytes)).await?,
            "doc" => printable_runs(&bytes),
            _ => String::from_utf8_lossy(&bytes).into_owned(),
        };

        if text.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "no text extracted from {}",
                path.display()
            )));
        }

        debug!(path = %path.display(), chars = text.chars().count(), "loaded document");
        Ok(Document::new(path, text))
    }
}

async fn blocking<F>(f: F) -> Result<String, DomainError>
where
    F: FnOnce() -> Result<String, DomainError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DomainError::internal(format!("extraction task failed: {e}")))?
}

fn local_name(qualified: &[u8]) -> &[u8] {
    match qualified.iter().position(|&b| b == b':') {
        Some(i) => &qualified[i + 1..],
        None => qualified,
    }
}

/// Paragraph text of `word/document.xml`, one paragraph per line.
fn docx_text(bytes: &[u8]) -> Result<String, DomainError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| DomainError::validation(format!("not a valid .docx archive: {e}")))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|_| DomainError::validation("missing word/document.xml"))?
        .read_to_string(&mut xml)?;

    let mut reader = Reader::from_str(&xml);
    reader.trim_text(false);
    let mut buf = Vec::new();

    let mut text = String::new();
    let mut paragraph = String::new();
    let mut in_text = false;

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local_name(e.name().as_ref()) {
                b"p" => paragraph.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match local_name(e.name().as_ref()) {
                b"br" => paragraph.push('\n'),
                b"tab" => paragraph.push('\t'),
                _ => {}
            },
            Ok(Event::End(e)) => match local_name(e.name().as_ref()) {
                b"t" => in_text = false,
                b"p" => {
                    let line = paragraph.trim();
                    if !line.is_empty() {
                        text.push_str(line);
                        text.push('\n');
                    }
                    paragraph.clear();
                }
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let unescaped = t
                    .unescape()
                    .map_err(|e| DomainError::validation(format!("malformed document.xml: {e}")))?;
                paragraph.push_str(&unescaped);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DomainError::validation(format!("malformed document.xml: {e}")));
            }
            _ => {}
        }
    }

    Ok(text)
}

/// Legacy Word files are binary; keep the runs of printable text.
fn printable_runs(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .split(|c: char| (c.is_control() && !matches!(c, '\n' | '\r' | '\t')) || c == '\u{FFFD}')
        .map(str::trim)
        .filter(|run| run.chars().count() >= MIN_DOC_RUN)
        .collect::<Vec<_>>()
        .join("\n")
}
