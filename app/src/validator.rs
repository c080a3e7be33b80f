// ==============================================================================
// validator.rs - Upload Validation
// ==============================================================================
// Description: Validates raw genome uploads before parsing (size, emptiness,
//              compression, fingerprint)
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::parsers::GZIP_MAGIC;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 500 * 1024 * 1024; // 500 MB

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UploadError {
    #[error("Upload is empty")]
    EmptyUpload,

    #[error("Upload too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: usize, max: usize },
}

/// Accepted upload metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedUpload {
    /// Sanitized client file name, if one was supplied
    pub safe_name: Option<String>,
    pub size: usize,
    pub compressed: bool,
    pub hash_sha256: String,
    pub validated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UploadValidator {
    max_upload_bytes: usize,
}

impl Default for UploadValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPLOAD_BYTES)
    }
}

impl UploadValidator {
    pub fn new(max_upload_bytes: usize) -> Self {
        Self { max_upload_bytes }
    }

    /// Check an upload and fingerprint it
    ///
    /// # Arguments
    /// * `name` - Client-supplied file name (sanitized, informational only)
    /// * `bytes` - Raw upload, plain text or gzip
    pub fn validate_upload(
        &self,
        name: Option<&str>,
        bytes: &[u8],
    ) -> Result<ValidatedUpload, UploadError> {
        // 1. Emptiness
        if bytes.is_empty() {
            return Err(UploadError::EmptyUpload);
        }

        // 2. Size cap
        if bytes.len() > self.max_upload_bytes {
            return Err(UploadError::TooLarge {
                size: bytes.len(),
                max: self.max_upload_bytes,
            });
        }
        debug!("Size check passed: {} bytes", bytes.len());

        // 3. Compression sniffing
        let compressed = bytes.starts_with(&GZIP_MAGIC);

        // 4. Fingerprint
        let hash_sha256 = compute_sha256(bytes);

        let safe_name = name.and_then(sanitize_filename);
        info!(
            "Validated upload {}: {} bytes, compressed={}, sha256={}",
            safe_name.as_deref().unwrap_or("<unnamed>"),
            bytes.len(),
            compressed,
            hash_sha256
        );

        Ok(ValidatedUpload {
            safe_name,
            size: bytes.len(),
            compressed,
            hash_sha256,
            validated_at: Utc::now(),
        })
    }
}

/// Strip path separators and control characters; None if nothing survives
pub fn sanitize_filename(name: &str) -> Option<String> {
    let safe: String = name
        .replace(['/', '\\', '\0'], "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .take(255)
        .collect();

    (!safe.is_empty()).then_some(safe)
}

pub fn compute_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
