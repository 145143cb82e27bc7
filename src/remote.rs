//! # remote: contract between the transfer pipeline and the media store
//!
//! This module defines a single trait ([`RemoteStore`]) and the plain data
//! types it exchanges. The trait is the only surface the orchestrator sees;
//! transport, authentication and endpoint details live entirely in the
//! implementor (see [`crate::cloudinary`] for the production client).
//!
//! ## Interface & Extensibility
//! - Implement [`RemoteStore`] to target another backend or a test double.
//! - All methods are async and return the typed [`RemoteError`], so callers
//!   can distinguish a missing folder from a transport failure.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`, so integration tests drive the
//!   orchestrator against a deterministic `MockRemoteStore`.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote folder not found: {0}")]
    FolderNotFound(String),
    #[error("remote API error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Cloudinary's asset classes. Every upload and Admin API call is scoped to
/// exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Image,
    Video,
    Raw,
}

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "svg", "ico", "psd", "ai", "eps",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mov", "wmv", "flv", "webm", "mkv", "m4v", "3gp", "ogv", "mxf", "ts", "m2ts",
];

impl ResourceType {
    pub const ALL: [ResourceType; 3] = [ResourceType::Image, ResourceType::Video, ResourceType::Raw];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Image => "image",
            ResourceType::Video => "video",
            ResourceType::Raw => "raw",
        }
    }

    /// Classify by file extension; anything unrecognised uploads as `raw`.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            ResourceType::Image
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            ResourceType::Video
        } else {
            ResourceType::Raw
        }
    }
}

impl std::str::FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(ResourceType::Image),
            "video" => Ok(ResourceType::Video),
            "raw" => Ok(ResourceType::Raw),
            other => Err(format!("unknown resource type: {other}")),
        }
    }
}

/// One asset as reported by the remote listing. Owned by the remote service;
/// read-only to this tool and used only for duplicate comparison, listing
/// output and downloads.
#[derive(Debug, Clone)]
pub struct RemoteAsset {
    /// Full public id including folder path (extension-less for image/video).
    pub public_id: String,
    /// Original filename including extension, reconstructed from the public
    /// id and the reported format.
    pub filename: String,
    pub bytes: u64,
    /// Folder path the asset lives in (everything before the leaf).
    pub folder: String,
    pub resource_type: ResourceType,
    pub secure_url: String,
    pub created_at: Option<String>,
    /// Hex SHA-256 of the asset contents, when the backend reports one.
    /// Cloudinary's Admin API only exposes MD5 etags, so the production
    /// client leaves this unset; duplicate detection then falls back to
    /// name+size comparison.
    pub content_digest: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RemoteFolder {
    pub name: String,
    pub path: String,
}

/// The remote media store as consumed by the transfer orchestrator.
///
/// Implementors connect to the real service; tests use the generated mock.
/// One `list` call covers a folder and everything nested beneath it.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Upload one local file (or one volume) under the given public id.
    async fn upload(
        &self,
        local_path: &Path,
        public_id: &str,
        resource_type: ResourceType,
    ) -> Result<RemoteAsset, RemoteError>;

    /// List every asset under the folder prefix, across all resource types.
    async fn list(&self, folder: &str) -> Result<Vec<RemoteAsset>, RemoteError>;

    /// List folders under the configured default folder (or the root).
    async fn list_folders(&self) -> Result<Vec<RemoteFolder>, RemoteError>;

    /// Delete a folder and all of its contents. The name must match exactly;
    /// fails with [`RemoteError::FolderNotFound`] when absent.
    async fn delete_folder(&self, folder: &str) -> Result<(), RemoteError>;

    /// Download one asset to the given local path, creating parent
    /// directories as needed.
    async fn download(&self, asset: &RemoteAsset, dest: &Path) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn resource_type_classification_by_extension() {
        assert_eq!(ResourceType::from_path(&PathBuf::from("a/photo.JPG")), ResourceType::Image);
        assert_eq!(ResourceType::from_path(&PathBuf::from("clip.mp4")), ResourceType::Video);
        assert_eq!(ResourceType::from_path(&PathBuf::from("doc.pdf")), ResourceType::Raw);
        assert_eq!(ResourceType::from_path(&PathBuf::from("video.7z.001")), ResourceType::Raw);
        assert_eq!(ResourceType::from_path(&PathBuf::from("no_extension")), ResourceType::Raw);
    }
}
