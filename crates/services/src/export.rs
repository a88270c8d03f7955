//! Thread export formats.
//!
//! JSON and Markdown are produced here. PDF and Word go through a
//! `DocumentRenderer`; the bundled `MarkdownPassthrough` passes the Markdown
//! bytes through, and `ExportDocument` labels them with the target MIME type
//! and a file name.

use chrono::{Local, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use shared::chat::{ChatThread, Role};

use crate::error::Result;

pub const PDF_MIME: &str = "application/pdf";
pub const WORD_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// `{ "threads": [...], "exportedAt": "<RFC 3339>" }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadExport {
    pub threads: Vec<ChatThread>,
    pub exported_at: String,
}

pub fn threads_to_json(threads: &[ChatThread]) -> Result<String> {
    let export = ThreadExport {
        threads: threads.to_vec(),
        exported_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };
    Ok(serde_json::to_string_pretty(&export)?)
}

pub fn parse_json_export(json: &str) -> Result<ThreadExport> {
    Ok(serde_json::from_str(json)?)
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "**User**",
        Role::Assistant => "**AI**",
    }
}

fn local_time(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis).single() {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => millis.to_string(),
    }
}

pub fn thread_to_markdown(thread: &ChatThread) -> String {
    let mut out = format!("# {}\n\n", thread.title);
    out.push_str(&format!("*{}*\n\n", Local::now().format("%Y-%m-%d %H:%M:%S")));

    let sections: Vec<String> = thread
        .messages
        .iter()
        .map(|m| {
            format!(
                "## {} ({})\n\n{}\n\n",
                role_label(m.role),
                local_time(m.timestamp),
                m.content
            )
        })
        .collect();
    out.push_str(&sections.join("---\n\n"));
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Word,
}

impl DocumentFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => PDF_MIME,
            DocumentFormat::Word => WORD_MIME,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Word => "docx",
        }
    }
}

/// Suggested download name: `<title>_<millis>.<ext>`, with the title
/// lower-cased and anything outside ASCII letters and digits replaced by `_`
pub fn export_file_name(title: &str, extension: &str, now_ms: i64) -> String {
    let stem: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    let stem = if stem.is_empty() { "chat" } else { stem.as_str() };
    format!("{}_{}.{}", stem, now_ms, extension)
}

/// A rendered thread ready to be saved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDocument {
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl ExportDocument {
    pub fn new(title: &str, format: DocumentFormat, bytes: Vec<u8>, now_ms: i64) -> Self {
        Self {
            file_name: export_file_name(title, format.extension(), now_ms),
            mime_type: format.mime_type(),
            bytes,
        }
    }
}

/// Converts Markdown to a binary document format
pub trait DocumentRenderer: Send + Sync {
    fn render(&self, markdown: &str, format: DocumentFormat) -> Vec<u8>;
}

/// No conversion: the document body is the Markdown text itself
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownPassthrough;

impl DocumentRenderer for MarkdownPassthrough {
    fn render(&self, markdown: &str, _format: DocumentFormat) -> Vec<u8> {
        markdown.as_bytes().to_vec()
    }
}
