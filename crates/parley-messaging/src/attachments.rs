// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attachment acceptance rules.
//!
//! Uploads happen elsewhere; this module only decides whether an uploaded
//! file may be referenced from a message.

use parley_config::model::AttachmentConfig;
use parley_core::{Attachment, ParleyError};
use serde::Deserialize;

/// Reference to an already uploaded file, as submitted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttachmentUpload {
    pub url: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub caption: Option<String>,
}

impl AttachmentUpload {
    pub fn to_attachment(&self) -> Attachment {
        Attachment {
            url: self.url.trim().to_string(),
            file_name: self.file_name.trim().to_string(),
            mime_type: normalize_mime(&self.mime_type),
            size_bytes: self.size_bytes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttachmentPolicy {
    max_bytes: u64,
    allowed_mime_types: Vec<String>,
}

impl AttachmentPolicy {
    pub fn new(config: &AttachmentConfig) -> Self {
        Self {
            max_bytes: config.max_bytes,
            allowed_mime_types: config
                .allowed_mime_types
                .iter()
                .map(|m| normalize_mime(m))
                .collect(),
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Size first, then type, then the reference itself.
    pub fn check(&self, upload: &AttachmentUpload) -> Result<(), ParleyError> {
        if upload.size_bytes == 0 {
            return Err(ParleyError::validation("size", "file is empty"));
        }
        if upload.size_bytes > self.max_bytes {
            return Err(ParleyError::validation(
                "size",
                format!(
                    "file is {} bytes, the limit is {} bytes",
                    upload.size_bytes, self.max_bytes
                ),
            ));
        }

        let mime = normalize_mime(&upload.mime_type);
        if !self.allowed_mime_types.iter().any(|m| *m == mime) {
            return Err(ParleyError::validation(
                "mime_type",
                format!("`{mime}` is not an accepted file type"),
            ));
        }

        if upload.url.trim().is_empty() {
            return Err(ParleyError::validation("url", "must not be empty"));
        }
        if upload.file_name.trim().is_empty() {
            return Err(ParleyError::validation("file_name", "must not be empty"));
        }
        Ok(())
    }
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self::new(&AttachmentConfig::default())
    }
}

/// `Image/PNG; charset=x` -> `image/png`
fn normalize_mime(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
