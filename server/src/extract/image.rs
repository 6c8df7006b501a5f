//! Image extractor (spec §4.2): always OCR via the configured `tesseract`
//! binary; EXIF `DateTimeOriginal` → `DateTimeDigitized` → `DateTime` wins
//! over filesystem mtime per spec's intrinsic-date precedence.

use super::{ExtractedText, TextExtractor};
use crate::config::Config;
use archon_core::error::PerFileError;
use archon_core::model::{is_deferred_ocr, IMAGE_DEFERRED_SENTINEL};
use chrono::{DateTime, Utc};
use std::path::Path;

pub struct ImageExtractor;

impl TextExtractor for ImageExtractor {
    fn extract(&self, path: &Path, config: &Config) -> Result<Vec<ExtractedText>, PerFileError> {
        let intrinsic_date = read_exif_date(path);

        let output = std::process::Command::new(&config.tesseract_path)
            .arg(path)
            .arg("stdout")
            .args(["-l", "fra+eng"])
            .output();

        let text = match output {
            Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).trim().to_string(),
            _ => IMAGE_DEFERRED_SENTINEL.to_string(),
        };

        Ok(vec![ExtractedText {
            used_ocr: !is_deferred_ocr(&text),
            text,
            intrinsic_date,
            virtual_name: None,
        }])
    }
}

fn read_exif_date(path: &Path) -> Option<DateTime<Utc>> {
    let file = std::fs::File::open(path).ok()?;
    let mut buf_reader = std::io::BufReader::new(file);
    let reader = exif::Reader::new().read_from_container(&mut buf_reader).ok()?;

    for tag in [exif::Tag::DateTimeOriginal, exif::Tag::DateTimeDigitized, exif::Tag::DateTime] {
        if let Some(field) = reader.get_field(tag, exif::In::PRIMARY) {
            if let Some(naive) = parse_exif_datetime(&field.display_value().to_string()) {
                return Some(naive);
            }
        }
    }
    None
}

fn parse_exif_datetime(raw: &str) -> Option<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S").ok().map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_exif_yields_no_intrinsic_date() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("plain.png");
        std::fs::write(&path, b"not a real png").unwrap();
        assert!(read_exif_date(&path).is_none());
    }
}
