//! Acquisition boundary for uploaded documents.
//!
//! Only policy documents, contracts and emails get through: PDF, DOC, DOCX,
//! plain text and RFC-822 mail. Everything else is rejected here and never
//! reaches the workspace state.

use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

use crate::models::{FileStatus, RawFile, UploadedFile};

/// Accepted `(mime type, extension)` pairs.
pub const ACCEPTED_TYPES: &[(&str, &str)] = &[
    ("application/pdf", "pdf"),
    ("application/msword", "doc"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "docx",
    ),
    ("text/plain", "txt"),
    ("message/rfc822", "eml"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedFile {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Acceptance {
    pub accepted: Vec<UploadedFile>,
    pub rejected: Vec<RejectedFile>,
}

/// Lower-cased extension of a file name, if any.
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    ACCEPTED_TYPES
        .iter()
        .find(|(_, ext)| ext.eq_ignore_ascii_case(extension))
        .map(|(mime, _)| *mime)
}

fn is_accepted_mime(mime_type: &str) -> bool {
    let essence = mime_type.split(';').next().unwrap_or_default().trim();
    ACCEPTED_TYPES
        .iter()
        .any(|(mime, _)| mime.eq_ignore_ascii_case(essence))
}

/// Check one file against the allow-list, returning the MIME type to record.
fn classify(file: &RawFile) -> Result<String, String> {
    if file.name.trim().is_empty() {
        return Err("file name is empty".to_string());
    }

    let by_extension = extension_of(&file.name).and_then(|ext| mime_for_extension(&ext));

    if !file.mime_type.trim().is_empty() && is_accepted_mime(&file.mime_type) {
        return Ok(file.mime_type.trim().to_string());
    }

    match by_extension {
        Some(mime) => Ok(mime.to_string()),
        None if file.mime_type.trim().is_empty() => Err(format!(
            "unsupported file type; accepted: {}",
            accepted_extensions()
        )),
        None => Err(format!(
            "unsupported file type `{}`; accepted: {}",
            file.mime_type.trim(),
            accepted_extensions()
        )),
    }
}

fn accepted_extensions() -> String {
    ACCEPTED_TYPES
        .iter()
        .map(|(_, ext)| format!(".{ext}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Filter raw files through the allow-list and assign ids to the accepted ones.
///
/// Accepted files start out as [`FileStatus::Uploading`].
pub fn accept_files(files: Vec<RawFile>) -> Acceptance {
    accept_read_files(files.into_iter().map(|file| (file, None)).collect())
}

/// [`accept_files`] for files the caller tried to read first. A file that
/// passes the allow-list but carries a read error starts as
/// [`FileStatus::Error`].
pub fn accept_read_files(files: Vec<(RawFile, Option<String>)>) -> Acceptance {
    let mut acceptance = Acceptance::default();

    for (file, read_error) in files {
        match classify(&file) {
            Ok(mime_type) => acceptance.accepted.push(UploadedFile {
                id: Uuid::new_v4().simple().to_string(),
                name: file.name,
                size: file.size,
                mime_type,
                status: match read_error {
                    Some(_) => FileStatus::Error,
                    None => FileStatus::Uploading,
                },
            }),
            Err(reason) => acceptance.rejected.push(RejectedFile {
                name: file.name,
                reason,
            }),
        }
    }

    acceptance
}

/// Human-readable size: `0 Bytes`, `512 Bytes`, `1.5 KB`, `2 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}
