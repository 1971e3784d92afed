//! Image attachments, carried inline as `data:` URLs.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{EngineError, Result};

/// Opaque image reference attached to a user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    data_url: String,
}

impl ImageAttachment {
    /// Wrap an existing `data:image/...;base64,` URL.
    pub fn from_data_url(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let Some(rest) = url.strip_prefix("data:image/") else {
            return Err(EngineError::Attachment(
                "expected a data:image/... URL".to_string(),
            ));
        };
        if !rest.contains(";base64,") {
            return Err(EngineError::Attachment(
                "data URL is not base64 encoded".to_string(),
            ));
        }
        Ok(Self { data_url: url })
    }

    /// Encode raw image bytes.
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            data_url: format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes)),
        }
    }

    /// Read and encode an image file. The MIME type comes from the extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let mime_type = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(mime_for_extension)
            .ok_or_else(|| {
                EngineError::Attachment(format!("unsupported image type: {}", path.display()))
            })?;

        let bytes = std::fs::read(path)?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), mime = mime_type, "Attached image");
        Ok(Self::from_bytes(mime_type, &bytes))
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    /// MIME type embedded in the data URL.
    pub fn mime_type(&self) -> &str {
        self.data_url
            .strip_prefix("data:")
            .and_then(|rest| rest.split(';').next())
            .unwrap_or("application/octet-stream")
    }
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes() {
        let image = ImageAttachment::from_bytes("image/png", b"\x89PNG");
        assert_eq!(image.data_url(), "data:image/png;base64,iVBORw==");
        assert_eq!(image.mime_type(), "image/png");
    }

    #[test]
    fn test_from_data_url_validation() {
        assert!(ImageAttachment::from_data_url("data:image/jpeg;base64,/9j/").is_ok());
        assert!(ImageAttachment::from_data_url("https://example.com/cat.png").is_err());
        assert!(ImageAttachment::from_data_url("data:image/svg+xml,<svg/>").is_err());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pic.JPG");
        std::fs::write(&path, [0xFF, 0xD8, 0xFF]).unwrap();

        let image = ImageAttachment::from_path(&path).unwrap();
        assert_eq!(image.mime_type(), "image/jpeg");
        assert!(image.data_url().ends_with(";base64,/9j/"));
    }

    #[test]
    fn test_from_path_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "x").unwrap();
        assert!(matches!(
            ImageAttachment::from_path(&path),
            Err(EngineError::Attachment(_))
        ));
    }
}
