//! Intake validation: format/size policy applied before a candidate becomes
//! a staged image. Both checks run on declared metadata only; pixel data is
//! never decoded here, so a mislabeled file can pass intake and only fail at
//! the analysis service.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use shared::domain::{ImageRef, MediaType};
use thiserror::Error;

/// Upload ceiling: 10 MiB. Files of exactly this size pass.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// A user-selected file before acceptance. Consumed by [`validate`]; a
/// rejected candidate is dropped, never retained.
#[derive(Debug, Clone)]
pub struct UploadCandidate {
    declared_media_type: String,
    bytes: Vec<u8>,
}

impl UploadCandidate {
    pub fn new(declared_media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            declared_media_type: declared_media_type.into(),
            bytes,
        }
    }

    pub fn declared_media_type(&self) -> &str {
        &self.declared_media_type
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unsupported image format {declared:?}; upload a JPEG, PNG, or TIFF image")]
    UnsupportedFormat { declared: String },
    #[error("file is {size_bytes} bytes; the maximum upload size is {limit_bytes} bytes")]
    FileTooLarge { size_bytes: usize, limit_bytes: usize },
}

/// A validated candidate ready for analysis. Owned by the workflow
/// controller; the presentation layer only reads [`StagedImage::preview`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedImage {
    payload_b64: String,
    media_type: MediaType,
    size_bytes: usize,
}

impl StagedImage {
    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Base64 body forwarded to the analysis service.
    pub fn payload_b64(&self) -> &str {
        &self.payload_b64
    }

    /// Displayable in-memory reference for preview rendering.
    pub fn preview(&self) -> ImageRef {
        ImageRef(format!(
            "data:{};base64,{}",
            self.media_type.as_mime(),
            self.payload_b64
        ))
    }
}

/// Checks a candidate against the format allow-list and the size ceiling,
/// in that order. No network or disk I/O, no shared state.
pub fn validate(candidate: UploadCandidate) -> Result<StagedImage, ValidationError> {
    let Some(media_type) = MediaType::from_declared(&candidate.declared_media_type) else {
        return Err(ValidationError::UnsupportedFormat {
            declared: candidate.declared_media_type,
        });
    };

    if candidate.bytes.len() > MAX_UPLOAD_BYTES {
        return Err(ValidationError::FileTooLarge {
            size_bytes: candidate.bytes.len(),
            limit_bytes: MAX_UPLOAD_BYTES,
        });
    }

    Ok(StagedImage {
        payload_b64: STANDARD.encode(&candidate.bytes),
        media_type,
        size_bytes: candidate.bytes.len(),
    })
}
