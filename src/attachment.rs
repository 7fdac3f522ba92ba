//! Attachment codec: file bytes in, base64 payload out (and back again for
//! local preview).

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::AttachmentError;

/// Default upload ceiling (50 MiB).
pub const MAX_ATTACHMENT_BYTES: u64 = 50 * 1024 * 1024;

/// A file bound to the session, ready to be inlined into a model request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    name: String,
    mime_type: String,
    /// Standard base64 of the file contents.
    payload: String,
    byte_size: u64,
}

/// Broad media class, used for display and preview decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Pdf,
    Video,
    Audio,
    Document,
}

impl std::fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttachmentKind::Pdf => write!(f, "pdf"),
            AttachmentKind::Video => write!(f, "video"),
            AttachmentKind::Audio => write!(f, "audio"),
            AttachmentKind::Document => write!(f, "document"),
        }
    }
}

/// Decoded attachment bytes plus their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    /// Encode raw bytes, enforcing the `max_bytes` ceiling.
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: &[u8],
        max_bytes: u64,
    ) -> Result<Self, AttachmentError> {
        let size = bytes.len() as u64;
        if size > max_bytes {
            return Err(AttachmentError::TooLarge { size, max: max_bytes });
        }
        Ok(Attachment {
            name: name.into(),
            mime_type: mime_type.into(),
            payload: STANDARD.encode(bytes),
            byte_size: size,
        })
    }

    /// Read a file from disk. The size is checked from metadata before the
    /// contents are loaded so oversized files are never read into memory.
    pub fn from_path(path: &Path, max_bytes: u64) -> Result<Self, AttachmentError> {
        let io_err = |source| AttachmentError::Io {
            path: path.display().to_string(),
            source,
        };
        let size = std::fs::metadata(path).map_err(io_err)?.len();
        if size > max_bytes {
            return Err(AttachmentError::TooLarge { size, max: max_bytes });
        }
        let bytes = std::fs::read(path).map_err(io_err)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_bytes(name, mime_for_path(path), &bytes, max_bytes)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn kind(&self) -> AttachmentKind {
        if self.mime_type == "application/pdf" {
            AttachmentKind::Pdf
        } else if self.mime_type.starts_with("video/") {
            AttachmentKind::Video
        } else if self.mime_type.starts_with("audio/") {
            AttachmentKind::Audio
        } else {
            AttachmentKind::Document
        }
    }

    /// Size in MiB with two decimals, e.g. `"1.50 MB"`.
    pub fn display_size(&self) -> String {
        format!("{:.2} MB", self.byte_size as f64 / 1024.0 / 1024.0)
    }

    /// Decode the payload back into bytes for local preview.
    pub fn to_blob(&self) -> Result<Blob, AttachmentError> {
        Ok(Blob {
            mime_type: self.mime_type.clone(),
            bytes: STANDARD.decode(&self.payload)?,
        })
    }

    /// Decode the payload and write it to `path`.
    pub fn write_preview(&self, path: &Path) -> Result<Blob, AttachmentError> {
        let blob = self.to_blob()?;
        std::fs::write(path, &blob.bytes).map_err(|source| AttachmentError::Write {
            path: path.display().to_string(),
            source,
        })?;
        Ok(blob)
    }
}

/// Guess a MIME type from the file extension. Unknown extensions fall back to
/// `application/octet-stream` and are still accepted.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}
