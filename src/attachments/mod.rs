//! Attachment storage helpers
//!
//! Files live under `<upload_dir>/<request id>/<uuid>_<sanitized name>`. The
//! row keeps the original filename for display; everything that touches the
//! filesystem goes through the sanitized one.

use crate::models::{AttachmentDto, RequestAttachment};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use uuid::Uuid;

fn image_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\.(png|jpe?g|gif|webp|bmp)$").expect("valid image pattern"))
}

fn pdf_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\.pdf$").expect("valid pdf pattern"))
}

/// How a client should preview an attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewKind {
    Image,
    Pdf,
    Unsupported,
}

/// Classify by filename extension only. The stored content type is not
/// consulted.
pub fn preview_kind(filename: &str) -> PreviewKind {
    if image_name().is_match(filename) {
        PreviewKind::Image
    } else if pdf_name().is_match(filename) {
        PreviewKind::Pdf
    } else {
        PreviewKind::Unsupported
    }
}

/// Sanitize filename to prevent path traversal and other issues
pub fn sanitize_filename(filename: &str) -> String {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let sanitized = sanitized.trim_start_matches('.').trim();
    if sanitized.is_empty() {
        return "file".to_string();
    }

    sanitized.chars().take(200).collect()
}

/// Name on disk for a new upload
pub fn stored_filename(original: &str) -> String {
    format!("{}_{}", Uuid::new_v4(), sanitize_filename(original))
}

/// Directory holding a request's files
pub fn request_dir(upload_dir: &Path, request_id: i64) -> PathBuf {
    upload_dir.join(request_id.to_string())
}

/// Full path for a stored file, refusing anything that would escape the
/// request's directory
pub fn storage_path(upload_dir: &Path, request_id: i64, stored: &str) -> Option<PathBuf> {
    let dir = request_dir(upload_dir, request_id);
    let path = dir.join(stored);
    let escapes = Path::new(stored).components().count() != 1
        || stored.contains("..")
        || !path.starts_with(&dir);
    if escapes {
        None
    } else {
        Some(path)
    }
}

/// Absolute download URL for an attachment
pub fn content_url(public_base_url: &str, request_id: i64, attachment_id: i64) -> String {
    format!(
        "{}/api/requests/{}/attachments/{}/content",
        public_base_url.trim_end_matches('/'),
        request_id,
        attachment_id
    )
}

pub fn to_dto(attachment: RequestAttachment, public_base_url: &str) -> AttachmentDto {
    AttachmentDto {
        id: attachment.id,
        request_id: attachment.request_id,
        url: content_url(public_base_url, attachment.request_id, attachment.id),
        preview_kind: preview_kind(&attachment.filename),
        filename: attachment.filename,
        content_type: attachment.content_type,
        file_size: attachment.file_size,
        uploaded_date: attachment.uploaded_date,
    }
}
