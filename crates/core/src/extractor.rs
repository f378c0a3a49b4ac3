use crate::chunking::normalize_whitespace;
use crate::error::IngestError;
use lopdf::Document;
use regex::Regex;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Pdf,
    Docx,
    Text,
}

impl SourceFormat {
    pub fn detect(path: &Path, mime: &str) -> Self {
        let mime = mime.to_lowercase();
        let suffix = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        if mime.contains("pdf") || suffix == "pdf" {
            Self::Pdf
        } else if mime.contains("word") || suffix == "docx" {
            Self::Docx
        } else {
            Self::Text
        }
    }

    pub fn from_suffix(path: &Path) -> Option<Self> {
        let suffix = path.extension().and_then(|ext| ext.to_str())?;
        match suffix.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::Text),
            _ => None,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            Self::Text => "text/plain",
        }
    }
}

pub trait TextExtractor: Send + Sync {
    fn extract_pages(&self, path: &Path, mime: &str) -> Result<Vec<String>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FileExtractor;

impl TextExtractor for FileExtractor {
    fn extract_pages(&self, path: &Path, mime: &str) -> Result<Vec<String>, IngestError> {
        extract_by_mime(path, mime)
    }
}

pub fn extract_by_mime(path: &Path, mime: &str) -> Result<Vec<String>, IngestError> {
    let pages = match SourceFormat::detect(path, mime) {
        SourceFormat::Pdf => extract_pdf(path)?,
        SourceFormat::Docx => extract_docx(path)?,
        SourceFormat::Text => extract_txt(path)?,
    };
    Ok(pages.iter().map(|page| normalize_whitespace(page)).collect())
}

pub fn extract_pdf(path: &Path) -> Result<Vec<String>, IngestError> {
    let document = Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

    let mut pages = Vec::new();
    for page_no in document.get_pages().into_keys() {
        let text = document
            .extract_text(&[page_no])
            .map_err(|error| IngestError::PdfParse(error.to_string()))?;
        pages.push(text);
    }

    Ok(pages)
}

pub fn extract_docx(path: &Path) -> Result<Vec<String>, IngestError> {
    let mut archive = zip::ZipArchive::new(File::open(path)?)
        .map_err(|error| IngestError::Docx(error.to_string()))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|error| IngestError::Docx(error.to_string()))?
        .read_to_string(&mut xml)?;

    let run_re = Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>")?;
    let paragraphs = xml
        .split("</w:p>")
        .map(|paragraph| {
            run_re
                .captures_iter(paragraph)
                .filter_map(|capture| capture.get(1))
                .map(|run| unescape_xml(run.as_str()))
                .collect::<String>()
        })
        .filter(|paragraph| !paragraph.trim().is_empty())
        .collect::<Vec<_>>();

    Ok(vec![paragraphs.join("\n")])
}

pub fn extract_txt(path: &Path) -> Result<Vec<String>, IngestError> {
    let bytes = fs::read(path)?;
    Ok(vec![String::from_utf8_lossy(&bytes).into_owned()])
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
