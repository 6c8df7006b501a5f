//! Extractor Registry (C2 §4.2): dispatch-by-extension registry mapping a
//! file extension to a `TextExtractor` strategy, built once at startup —
//! the same shape as the teacher's `DependencyScanner` trait +
//! `default_scanners()` registry.

pub mod email;
pub mod forensic;
pub mod image;
pub mod pdf;
pub mod text;
pub mod video;

use crate::config::Config;
use archon_core::error::PerFileError;
use archon_core::model::FileType;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;

/// One extracted document. A single input file normally yields exactly one;
/// `.mbox` yields one per message.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    pub used_ocr: bool,
    /// Intrinsic date from file metadata (PDF CreationDate, EXIF
    /// DateTimeOriginal, email Date header) — wins over filesystem mtime
    /// per spec §4.2/§9 Open Question 1.
    pub intrinsic_date: Option<DateTime<Utc>>,
    /// Set only for sub-documents synthesized from a container file (a
    /// single `.mbox` message). `None` means "use the file's own name".
    pub virtual_name: Option<String>,
}

impl ExtractedText {
    pub fn simple(text: String, used_ocr: bool) -> Self {
        Self { text, used_ocr, intrinsic_date: None, virtual_name: None }
    }
}

pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path, config: &Config) -> Result<Vec<ExtractedText>, PerFileError>;
}

/// Built once at startup; looked up by lowercased extension.
pub struct ExtractorRegistry {
    by_extension: HashMap<&'static str, Box<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        let mut by_extension: HashMap<&'static str, Box<dyn TextExtractor>> = HashMap::new();

        for ext in ["txt", "md", "csv", "json", "xml", "html", "htm", "log"] {
            by_extension.insert(ext, Box::new(text::TextFileExtractor));
        }

        by_extension.insert("pdf", Box::new(pdf::PdfExtractor));

        for ext in ["png", "jpg", "jpeg", "tif", "tiff", "bmp", "gif", "webp"] {
            by_extension.insert(ext, Box::new(image::ImageExtractor));
        }

        for ext in ["mp4", "avi", "mov", "mkv", "webm"] {
            by_extension.insert(ext, Box::new(video::VideoExtractor));
        }

        by_extension.insert("eml", Box::new(email::EmailExtractor));
        by_extension.insert("mbox", Box::new(email::MboxExtractor));
        by_extension.insert("pst", Box::new(email::PstExtractor));

        for ext in ["e01", "dd", "raw", "img", "aff"] {
            by_extension.insert(ext, Box::new(forensic::ForensicImageExtractor));
        }

        Self { by_extension }
    }

    pub fn extract(&self, path: &Path, config: &Config) -> Result<Vec<ExtractedText>, PerFileError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
        match self.by_extension.get(ext.as_str()) {
            Some(extractor) => extractor.extract(path, config),
            None => Ok(vec![ExtractedText::simple(String::new(), false)]),
        }
    }

    pub fn file_type_for(path: &Path) -> FileType {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        FileType::from_extension(ext)
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_dispatches_by_extension() {
        let registry = ExtractorRegistry::new();
        assert!(registry.by_extension.contains_key("pdf"));
        assert!(registry.by_extension.contains_key("eml"));
        assert!(registry.by_extension.contains_key("e01"));
    }

    #[test]
    fn unknown_extension_yields_empty_text_not_an_error() {
        let registry = ExtractorRegistry::new();
        let config = Config::default();
        let result = registry.extract(Path::new("mystery.xyz"), &config).unwrap();
        assert_eq!(result.len(), 1);
        assert!(result[0].text.is_empty());
    }
}
