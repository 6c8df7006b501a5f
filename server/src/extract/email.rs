//! Email extractors (spec §4.2): `.eml` headers/body/attachments via
//! `mail-parser`; `.mbox` splits into one virtual document per message;
//! `.pst` is converted to per-message `.eml` files via the configured
//! `readpst` binary (poppler/libpst's CLI) and recursed into the `.eml`
//! path, matching `original_source`'s "PST expanded via external tool" note.
//! The `readpst` subprocess runs under `Config::external_tool_timeout`
//! (spec §5: "PST extraction [has] explicit timeouts (60-300s) after which
//! the file is reported failed"), so a hung conversion fails just this file.

use super::{ExtractedText, TextExtractor};
use crate::config::Config;
use crate::subprocess::run_with_timeout;
use archon_core::error::PerFileError;
use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MimeHeaders};
use std::path::Path;
use std::process::Command;

pub struct EmailExtractor;

impl TextExtractor for EmailExtractor {
    fn extract(&self, path: &Path, _config: &Config) -> Result<Vec<ExtractedText>, PerFileError> {
        let bytes = std::fs::read(path).map_err(|e| PerFileError::Extraction(e.to_string()))?;
        Ok(vec![parse_message(&bytes)?])
    }
}

pub struct MboxExtractor;

impl TextExtractor for MboxExtractor {
    fn extract(&self, path: &Path, _config: &Config) -> Result<Vec<ExtractedText>, PerFileError> {
        let bytes = std::fs::read(path).map_err(|e| PerFileError::Extraction(e.to_string()))?;
        let raw = String::from_utf8_lossy(&bytes);

        let mut messages = Vec::new();
        let mut current = String::new();
        for line in raw.lines() {
            if line.starts_with("From ") && !current.is_empty() {
                messages.push(std::mem::take(&mut current));
            }
            current.push_str(line);
            current.push('\n');
        }
        if !current.trim().is_empty() {
            messages.push(current);
        }

        let mut out = Vec::with_capacity(messages.len());
        for (index, message_raw) in messages.into_iter().enumerate() {
            let mut extracted = parse_message(message_raw.as_bytes())?;
            extracted.virtual_name = Some(format!("message_{index}.eml"));
            out.push(extracted);
        }
        Ok(out)
    }
}

pub struct PstExtractor;

impl TextExtractor for PstExtractor {
    fn extract(&self, path: &Path, config: &Config) -> Result<Vec<ExtractedText>, PerFileError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| PerFileError::Extraction(e.to_string()))?;

        let mut command = Command::new(&config.readpst_path);
        command.args(["-e", "-o"]).arg(temp_dir.path()).arg(path);
        let output = run_with_timeout(command, &config.readpst_path, config.external_tool_timeout())
            .map_err(|e| PerFileError::Extraction(e.to_string()))?;
        if !output.status.success() {
            return Err(PerFileError::Extraction(format!("readpst conversion failed: {}", String::from_utf8_lossy(&output.stderr))));
        }

        let mut out = Vec::new();
        collect_eml_files(temp_dir.path(), &mut out)?;
        let mut extracted = Vec::with_capacity(out.len());
        for (index, eml_path) in out.iter().enumerate() {
            let bytes = std::fs::read(eml_path).map_err(|e| PerFileError::Extraction(e.to_string()))?;
            let mut message = parse_message(&bytes)?;
            message.virtual_name = Some(format!("message_{index}.eml"));
            extracted.push(message);
        }
        Ok(extracted)
    }
}

fn collect_eml_files(dir: &Path, out: &mut Vec<std::path::PathBuf>) -> Result<(), PerFileError> {
    let entries = std::fs::read_dir(dir).map_err(|e| PerFileError::Extraction(e.to_string()))?;
    for entry in entries {
        let entry = entry.map_err(|e| PerFileError::Extraction(e.to_string()))?;
        let path = entry.path();
        if path.is_dir() {
            collect_eml_files(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("eml") {
            out.push(path);
        }
    }
    Ok(())
}

fn parse_message(bytes: &[u8]) -> Result<ExtractedText, PerFileError> {
    let message = MessageParser::default().parse(bytes).ok_or_else(|| PerFileError::Extraction("unparseable message".to_string()))?;

    let mut text = String::new();
    if let Some(from) = message.from() {
        text.push_str(&format!("From: {}\n", from));
    }
    if let Some(to) = message.to() {
        text.push_str(&format!("To: {}\n", to));
    }
    if let Some(cc) = message.cc() {
        text.push_str(&format!("Cc: {}\n", cc));
    }
    if let Some(subject) = message.subject() {
        text.push_str(&format!("Subject: {subject}\n"));
    }
    if let Some(date) = message.date() {
        text.push_str(&format!("Date: {date}\n"));
    }
    if let Some(id) = message.message_id() {
        text.push_str(&format!("Message-Id: {id}\n"));
    }
    if let Some(in_reply_to) = message.in_reply_to().as_text() {
        text.push_str(&format!("In-Reply-To: {in_reply_to}\n"));
    }
    text.push('\n');

    if let Some(body) = message.body_text(0) {
        text.push_str(&body);
    } else if let Some(html) = message.body_html(0) {
        text.push_str(&strip_tags(&html));
    }

    for attachment in message.attachments() {
        let name = attachment.attachment_name().unwrap_or("unnamed");
        let mime = attachment.content_type().map(|ct| ct.ctype().to_string()).unwrap_or_else(|| "application/octet-stream".to_string());
        text.push_str(&format!("\n[attachment: {name} ({mime}, {} bytes)]", attachment.contents().len()));
    }

    let intrinsic_date = message.date().and_then(|d| parse_rfc2822_like(&d.to_rfc3339()));

    Ok(ExtractedText { text, used_ocr: false, intrinsic_date, virtual_name: None })
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut inside_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => inside_tag = true,
            '>' => inside_tag = false,
            c if !inside_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn parse_rfc2822_like(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_tags_removes_html_markup() {
        assert_eq!(strip_tags("<p>Hello <b>world</b></p>"), "Hello world");
    }

    #[test]
    fn parses_simple_eml_message() {
        let raw = b"From: a@example.com\r\nTo: b@example.com\r\nSubject: Test\r\n\r\nHello body.\r\n";
        let extracted = parse_message(raw).unwrap();
        assert!(extracted.text.contains("Hello body"));
    }
}
