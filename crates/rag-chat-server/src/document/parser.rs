use anyhow::{bail, Result};
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use pulldown_cmark::{html, Options, Parser as MdParser};
use scraper::{ElementRef, Html, Node};
use std::path::Path;
use tracing::debug;

/// Upload formats the ingestion path understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Text,
    Markdown,
    Html,
    Csv,
    Json,
}

impl FileType {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())?
            .to_lowercase();

        match extension.as_str() {
            "txt" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            "html" | "htm" => Some(Self::Html),
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Text => "text/plain",
            Self::Markdown => "text/markdown",
            Self::Html => "text/html",
            Self::Csv => "text/csv",
            Self::Json => "application/json",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    pub file_type: String,
    pub char_count: usize,
    pub encoding: String,
}

pub struct DocumentParser;

impl DocumentParser {
    /// Parse an uploaded file already held in memory
    pub fn parse_bytes(bytes: &[u8], file_type: FileType) -> Result<ParsedDocument> {
        let (raw, encoding) = Self::decode_text(bytes);

        let content = match file_type {
            FileType::Markdown => Self::markdown_to_text(&raw),
            FileType::Html => Self::extract_text_from_html(&raw),
            FileType::Text | FileType::Csv | FileType::Json => raw,
        };

        let content = content.trim().to_string();
        if content.is_empty() {
            bail!("Document contains no extractable text");
        }

        debug!("Parsed {} characters ({})", content.len(), file_type.mime());

        Ok(ParsedDocument {
            metadata: DocumentMetadata {
                file_type: file_type.mime().to_string(),
                char_count: content.chars().count(),
                encoding: encoding.name().to_string(),
            },
            content,
        })
    }

    /// UTF-8 first, Windows-1252 otherwise (never fails, every byte maps)
    fn decode_text(bytes: &[u8]) -> (String, &'static Encoding) {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        if let Ok(text) = std::str::from_utf8(bytes) {
            return (text.to_string(), UTF_8);
        }

        let (text, _, _) = WINDOWS_1252.decode(bytes);
        (text.into_owned(), WINDOWS_1252)
    }

    fn markdown_to_text(markdown: &str) -> String {
        let parser = MdParser::new_ext(markdown, Options::all());
        let mut html_output = String::new();
        html::push_html(&mut html_output, parser);

        Self::extract_text_from_html(&html_output)
    }

    /// Visible text of an HTML document, one line per text block
    fn extract_text_from_html(source: &str) -> String {
        let document = Html::parse_document(source);
        let mut text = String::new();
        Self::collect_text(document.root_element(), &mut text);

        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn collect_text(element: ElementRef<'_>, out: &mut String) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => out.push_str(text),
                Node::Element(el) => {
                    if matches!(el.name(), "script" | "style" | "head") {
                        continue;
                    }
                    if let Some(child_ref) = ElementRef::wrap(child) {
                        Self::collect_text(child_ref, out);
                    }
                    if matches!(
                        el.name(),
                        "p" | "div" | "br" | "li" | "tr" | "h1" | "h2" | "h3" | "h4" | "h5"
                            | "h6" | "pre" | "blockquote"
                    ) {
                        out.push('\n');
                    }
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_detection() {
        assert_eq!(FileType::from_filename("notes.TXT"), Some(FileType::Text));
        assert_eq!(FileType::from_filename("README.markdown"), Some(FileType::Markdown));
        assert_eq!(FileType::from_filename("page.htm"), Some(FileType::Html));
        assert_eq!(FileType::from_filename("data.csv"), Some(FileType::Csv));
        assert_eq!(FileType::from_filename("report.pdf"), None);
        assert_eq!(FileType::from_filename("no_extension"), None);
    }

    #[test]
    fn test_markdown_is_reduced_to_text() {
        let doc = DocumentParser::parse_bytes(b"# Title\n\nSome **bold** text.", FileType::Markdown)
            .unwrap();
        assert_eq!(doc.content, "Title\nSome bold text.");
        assert_eq!(doc.metadata.file_type, "text/markdown");
    }

    #[test]
    fn test_html_skips_scripts_and_styles() {
        let html = b"<html><head><title>t</title><style>p{}</style></head>\
            <body><p>Hello</p><script>alert(1)</script><div>World</div></body></html>";
        let doc = DocumentParser::parse_bytes(html, FileType::Html).unwrap();
        assert_eq!(doc.content, "Hello\nWorld");
    }

    #[test]
    fn test_windows_1252_fallback() {
        // "café" with 0xE9 is invalid UTF-8
        let doc = DocumentParser::parse_bytes(b"caf\xE9", FileType::Text).unwrap();
        assert_eq!(doc.content, "café");
        assert_eq!(doc.metadata.encoding, "windows-1252");
    }

    #[test]
    fn test_empty_document_is_rejected() {
        assert!(DocumentParser::parse_bytes(b"   \n ", FileType::Text).is_err());
        assert!(DocumentParser::parse_bytes(b"<html><body></body></html>", FileType::Html).is_err());
    }
}
