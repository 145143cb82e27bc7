//! Duplicate detection against an already-fetched remote folder listing.
//!
//! This component never talks to the network: the orchestrator fetches the
//! listing once per folder per run and passes it in. Absence of a match is
//! the normal "not a duplicate" result; detection itself never fails.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::remote::RemoteAsset;
use crate::volume;

/// Strength of the duplicate comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Filename plus exact byte size. The default; needs no local reads.
    #[default]
    NameSize,
    /// Additionally compares a SHA-256 digest of the local file against the
    /// digest in the listing entry, when the backend reports one. Costs a
    /// full local read per name match before any network call.
    ContentHash,
}

impl From<&str> for MatchMode {
    fn from(s: &str) -> Self {
        match s {
            "name-size" | "NameSize" => MatchMode::NameSize,
            "content-hash" | "ContentHash" => MatchMode::ContentHash,
            other => {
                warn!(mode = other, "Unknown match mode, defaulting to name-size");
                MatchMode::NameSize
            }
        }
    }
}

/// One file discovered by local traversal. Immutable during a transfer run.
#[derive(Debug, Clone)]
pub struct LocalFile {
    /// Absolute or caller-relative path on disk.
    pub path: PathBuf,
    /// Path relative to the upload root; preserves directory structure.
    pub relative: PathBuf,
    pub size: u64,
}

impl LocalFile {
    pub fn from_path(path: &Path, base: &Path) -> io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let relative = path
            .strip_prefix(base)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.file_name().map(PathBuf::from).unwrap_or_default());
        Ok(LocalFile {
            path: path.to_path_buf(),
            relative,
            size: meta.len(),
        })
    }

    pub fn file_name(&self) -> String {
        self.relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Streaming SHA-256 of the file contents, hex-encoded.
    pub fn content_digest(&self) -> io::Result<String> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// True iff an equivalent asset already exists in the listing under the
/// configured matching policy.
///
/// Listings cover a folder prefix, so candidates are restricted to the
/// exact destination folder; an equally-named file in a nested subfolder
/// is a different asset.
pub fn is_duplicate(
    local: &LocalFile,
    listing: &[RemoteAsset],
    folder: &str,
    mode: MatchMode,
) -> bool {
    let name = local.file_name();
    let candidates: Vec<&RemoteAsset> = listing
        .iter()
        .filter(|a| a.folder == folder && a.filename == name)
        .collect();
    if candidates.is_empty() {
        return false;
    }

    match mode {
        MatchMode::NameSize => candidates.iter().any(|a| a.bytes == local.size),
        MatchMode::ContentHash => {
            let digest = match local.content_digest() {
                Ok(d) => d,
                Err(e) => {
                    warn!(
                        path = %local.path.display(),
                        error = ?e,
                        "Failed to hash local file, falling back to name+size match"
                    );
                    return candidates.iter().any(|a| a.bytes == local.size);
                }
            };
            debug!(file = %name, digest = %digest, "Computed local content digest");
            candidates.iter().any(|a| match &a.content_digest {
                Some(remote_digest) => *remote_digest == digest,
                // Listing entry carries no digest; equal size under the same
                // name is the strongest comparison available.
                None => a.bytes == local.size,
            })
        }
    }
}

/// True iff the listing already carries a volume set produced from this
/// file: `{stem}.7z.NNN` siblings in the destination folder. An oversized
/// file round-trips as such a set, so re-uploading it would only recreate
/// those volumes.
pub fn has_volume_set(local: &LocalFile, listing: &[RemoteAsset], folder: &str) -> bool {
    let stem = local
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| local.file_name());
    let group = format!("{stem}.7z");
    listing
        .iter()
        .any(|a| a.folder == folder && volume::volume_group(&a.filename) == Some(group.as_str()))
}
