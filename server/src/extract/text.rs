//! Text-like extractor (.txt, .md, .csv, .json, .xml, .html, .log): UTF-8 →
//! Latin-1 → CP1252 → lossy UTF-8 decode chain, matching
//! `original_source/backend/app/services/ocr.py`'s `encodings` fallback list.

use super::{ExtractedText, TextExtractor};
use crate::config::Config;
use archon_core::error::PerFileError;
use std::path::Path;

pub struct TextFileExtractor;

impl TextExtractor for TextFileExtractor {
    fn extract(&self, path: &Path, _config: &Config) -> Result<Vec<ExtractedText>, PerFileError> {
        let bytes = std::fs::read(path).map_err(|e| PerFileError::Extraction(e.to_string()))?;
        Ok(vec![ExtractedText::simple(decode_text(&bytes), false)])
    }
}

/// CP1252's C1 control range (0x80-0x9F) maps to specific printable
/// characters rather than Latin-1's raw control codes; everywhere else the
/// two codecs agree. This table covers just that divergent range.
const CP1252_C1_OVERRIDES: [char; 32] = [
    '\u{20AC}', '\u{81}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}', '\u{02C6}',
    '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{8D}', '\u{017D}', '\u{8F}', '\u{90}', '\u{2018}', '\u{2019}',
    '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}', '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}',
    '\u{0153}', '\u{9D}', '\u{017E}', '\u{0178}',
];

fn decode_cp1252(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if (0x80..=0x9F).contains(&b) { CP1252_C1_OVERRIDES[(b - 0x80) as usize] } else { b as char })
        .collect()
}

/// Decode raw bytes trying UTF-8 first, then CP1252 (a strict superset of
/// Latin-1's printable range), and finally lossy UTF-8 as a last resort —
/// the last step is unreachable in practice since CP1252 never fails to
/// decode, kept only to mirror the documented chain exactly.
pub fn decode_text(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    decode_cp1252(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_valid_utf8_directly() {
        assert_eq!(decode_text("héllo".as_bytes()), "héllo");
    }

    #[test]
    fn falls_back_to_cp1252_on_invalid_utf8() {
        // 0x93/0x94 are CP1252 curly quotes, not valid standalone UTF-8.
        let bytes = [0x93, b'h', b'i', 0x94];
        let decoded = decode_text(&bytes);
        assert!(decoded.starts_with('\u{201C}'));
        assert!(decoded.ends_with('\u{201D}'));
    }
}
