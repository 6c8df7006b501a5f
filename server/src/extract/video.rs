//! Video extractor (spec §4.2): sample up to 20 keyframes at 1 frame per 30s
//! of stream via `ffmpeg`, OCR each frame, keep a frame's text only if it's
//! new and long enough, and prefix kept blocks with a timestamp label.

use super::{ExtractedText, TextExtractor};
use crate::config::Config;
use archon_core::error::PerFileError;
use std::collections::HashSet;
use std::path::Path;

const MAX_KEYFRAMES: u32 = 20;
const SECONDS_PER_FRAME: u32 = 30;
const MIN_FRAME_TEXT_CHARS: usize = 20;
const DEDUP_PREFIX_CHARS: usize = 100;

pub struct VideoExtractor;

impl TextExtractor for VideoExtractor {
    fn extract(&self, path: &Path, config: &Config) -> Result<Vec<ExtractedText>, PerFileError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| PerFileError::Extraction(e.to_string()))?;

        let status = std::process::Command::new(&config.ffmpeg_path)
            .args(["-i"])
            .arg(path)
            .args(["-vf", &format!("fps=1/{SECONDS_PER_FRAME}"), "-frames:v", &MAX_KEYFRAMES.to_string()])
            .arg(temp_dir.path().join("frame_%04d.png"))
            .output()
            .map_err(|e| PerFileError::Extraction(format!("ffmpeg unavailable: {e}")))?;

        if !status.status.success() {
            return Ok(vec![ExtractedText::simple(archon_core::model::VIDEO_DEFERRED_SENTINEL.to_string(), false)]);
        }

        let mut frame_paths: Vec<_> = std::fs::read_dir(temp_dir.path())
            .map_err(|e| PerFileError::Extraction(e.to_string()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        frame_paths.sort();

        let mut seen_prefixes: HashSet<String> = HashSet::new();
        let mut blocks = Vec::new();
        let mut used_ocr = false;

        for (index, frame) in frame_paths.iter().enumerate() {
            let output = std::process::Command::new(&config.tesseract_path)
                .arg(frame)
                .arg("stdout")
                .args(["-l", "fra+eng"])
                .output();
            let Ok(out) = output else { continue };
            if !out.status.success() {
                continue;
            }
            let text = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if text.chars().count() < MIN_FRAME_TEXT_CHARS {
                continue;
            }
            let prefix: String = text.to_lowercase().chars().take(DEDUP_PREFIX_CHARS).collect();
            if !seen_prefixes.insert(prefix) {
                continue;
            }
            used_ocr = true;
            let timestamp_secs = index as u32 * SECONDS_PER_FRAME;
            blocks.push(format!("[t={timestamp_secs}s] {text}"));
        }

        let text =
            if blocks.is_empty() { archon_core::model::VIDEO_DEFERRED_SENTINEL.to_string() } else { blocks.join("\n\n") };

        Ok(vec![ExtractedText::simple(text, used_ocr)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_match_spec_sampling_policy() {
        assert_eq!(MAX_KEYFRAMES, 20);
        assert_eq!(SECONDS_PER_FRAME, 30);
        assert_eq!(MIN_FRAME_TEXT_CHARS, 20);
    }
}
