//! Validation and storage of uploaded images.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, UploadError};

/// 16 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 16 * 1024 * 1024;

pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPolicy {
    pub max_bytes: u64,
    /// Lowercase extensions without the dot
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl UploadPolicy {
    /// Lowercased extension of `filename` if it is allowed.
    pub fn check_extension(&self, filename: &str) -> std::result::Result<String, UploadError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        if self.allowed_extensions.iter().any(|allowed| *allowed == extension) {
            Ok(extension)
        } else {
            Err(UploadError::DisallowedExtension { extension })
        }
    }

    pub fn check_size(&self, size: u64) -> std::result::Result<(), UploadError> {
        if size == 0 {
            return Err(UploadError::EmptyPayload);
        }
        if size > self.max_bytes {
            return Err(UploadError::TooLarge {
                size,
                max: self.max_bytes,
            });
        }
        Ok(())
    }
}

/// A file that was accepted and written to the upload directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredUpload {
    pub path: PathBuf,
    /// Generated `<uuid>.<ext>` name
    pub filename: String,
    /// Sanitized name the client sent
    pub original_filename: String,
}

pub struct UploadStore {
    dir: PathBuf,
    policy: UploadPolicy,
}

impl UploadStore {
    /// Open the store, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>, policy: UploadPolicy) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, policy })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Validate and persist an upload under a collision-free name.
    pub fn store(&self, original_filename: Option<&str>, bytes: &[u8]) -> Result<StoredUpload> {
        let original_filename = original_filename.ok_or(UploadError::MissingFile)?;
        if original_filename.trim().is_empty() {
            return Err(UploadError::EmptyFilename.into());
        }

        let original_filename = secure_filename(original_filename);
        let extension = self.policy.check_extension(&original_filename)?;
        self.policy.check_size(bytes.len() as u64)?;

        let filename = format!("{}.{}", Uuid::new_v4(), extension);
        let path = self.dir.join(&filename);
        fs::write(&path, bytes)?;

        tracing::info!("Stored upload {original_filename} as {filename}");
        Ok(StoredUpload {
            path,
            filename,
            original_filename,
        })
    }

    /// Store a local file as if it had been uploaded.
    pub fn store_file(&self, source: &Path) -> Result<StoredUpload> {
        let name = source.file_name().and_then(|n| n.to_str());
        let size = fs::metadata(source)?.len();
        // Reject before reading a huge file
        self.policy.check_size(size)?;
        let bytes = fs::read(source)?;
        self.store(name, &bytes)
    }
}

/// Reduce a client-supplied name to a safe basename.
///
/// Path components are stripped and anything outside `[A-Za-z0-9._-]`
/// becomes `_`. Leading dots are removed so the result is never hidden.
pub fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}
