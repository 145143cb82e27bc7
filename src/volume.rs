//! # volume: compression adapter around the external 7-Zip binary
//!
//! Turns one oversized file into an ordered set of fixed-size volumes
//! (`{stem}.7z.001`, `{stem}.7z.002`, ...) and reassembles them. The binary
//! is located by a capability probe over several candidate names; the probe
//! runs at most once per process and its result is cached.
//!
//! Volumes are written into a [`tempfile::TempDir`] scratch directory owned
//! by the returned [`VolumeSet`]; dropping the set reclaims the disk space,
//! whether the enclosing upload succeeded or failed.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Candidate binary names, probed in order. 7zz is the official standalone
/// build, 7z the p7zip full variant, 7za the standalone subset.
const CANDIDATE_BINARIES: &[&str] = &["7zz", "7z", "7za"];

/// Balanced compression; volumes are capped by size anyway.
const COMPRESSION_LEVEL: &str = "-mx=5";

static PROBE: OnceLock<Option<&'static str>> = OnceLock::new();

#[derive(Debug, Error)]
pub enum CompressError {
    #[error("no 7-Zip binary found on this host (tried 7zz, 7z, 7za)")]
    Unavailable,
    #[error("7-Zip invocation failed: {0}")]
    Tool(String),
    #[error("volume set is incomplete or failed integrity verification: {0}")]
    CorruptVolumeSet(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// First 7-Zip binary that can be spawned on this host. Probed once per
/// process; subsequent calls return the cached result.
pub fn sevenzip_binary() -> Option<&'static str> {
    *PROBE.get_or_init(|| {
        for candidate in CANDIDATE_BINARIES {
            let spawned = Command::new(candidate)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .stdin(Stdio::null())
                .status();
            if spawned.is_ok() {
                debug!(binary = candidate, "7-Zip capability probe succeeded");
                return Some(*candidate);
            }
        }
        warn!("7-Zip capability probe found no usable binary");
        None
    })
}

/// An ordered sequence of volume files produced from one oversized source
/// file. Transient: exists only for the duration of one upload operation.
#[derive(Debug)]
pub struct VolumeSet {
    /// The file the volumes were produced from. Never deleted by this tool.
    pub source: PathBuf,
    /// Original filename, used for duplicate matching and reporting.
    pub original_name: String,
    /// Shared group identifier: the archive name (`{stem}.7z`). Every volume
    /// filename starts with it, which is how the download path regroups them.
    pub group: String,
    /// Volume paths in index order (`.001` first). Contiguous from 1.
    pub volumes: Vec<PathBuf>,
    // Owns the scratch directory; dropping the set reclaims all volumes.
    _scratch: TempDir,
}

impl VolumeSet {
    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

/// Splits `file` into compressed volumes of at most `max_volume_bytes` each.
///
/// Fails with [`CompressError::Unavailable`] when no 7-Zip binary exists;
/// the caller decides whether to fall back to an uncompressed upload.
pub fn split(file: &Path, max_volume_bytes: u64) -> Result<VolumeSet, CompressError> {
    let binary = sevenzip_binary().ok_or(CompressError::Unavailable)?;

    let original_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| CompressError::Tool(format!("not a file path: {}", file.display())))?;
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| original_name.clone());

    let scratch = TempDir::with_prefix("cloudsync-volumes-")?;
    let group = format!("{stem}.7z");
    let archive_path = scratch.path().join(&group);

    // 7z only accepts whole units for -v; threshold is always >= 1 MB.
    let volume_mb = (max_volume_bytes / (1024 * 1024)).max(1);

    info!(
        file = %file.display(),
        volume_mb,
        binary,
        "Splitting oversized file into compressed volumes"
    );

    let output = Command::new(binary)
        .arg("a")
        .arg(format!("-v{volume_mb}m"))
        .arg(COMPRESSION_LEVEL)
        .arg(&archive_path)
        .arg(file)
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(CompressError::Tool(format!(
            "exit status {}: {stderr}",
            output.status
        )));
    }

    let mut volumes: Vec<PathBuf> = fs::read_dir(scratch.path())?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .and_then(volume_group)
                .map(|g| g == group)
                .unwrap_or(false)
        })
        .collect();
    volumes.sort();

    if volumes.is_empty() {
        return Err(CompressError::Tool("no volume files produced".to_string()));
    }

    info!(group = %group, volumes = volumes.len(), "Produced volume set");

    Ok(VolumeSet {
        source: file.to_path_buf(),
        original_name,
        group,
        volumes,
        _scratch: scratch,
    })
}

/// Reassembles the original file from a downloaded volume set by extracting
/// from its first volume into `output_dir`.
///
/// 7-Zip verifies archive integrity during extraction; a missing or mangled
/// volume surfaces as [`CompressError::CorruptVolumeSet`].
pub fn join(first_volume: &Path, output_dir: &Path) -> Result<(), CompressError> {
    let binary = sevenzip_binary().ok_or(CompressError::Unavailable)?;

    info!(
        first_volume = %first_volume.display(),
        output_dir = %output_dir.display(),
        "Reassembling file from volume set"
    );

    let output = Command::new(binary)
        .arg("x")
        .arg(first_volume)
        .arg(format!("-o{}", output_dir.display()))
        .arg("-y")
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(CompressError::CorruptVolumeSet(format!(
            "exit status {}: {stderr}",
            output.status
        )));
    }

    Ok(())
}

/// Shared group identifier for a volume filename:
/// `"video.7z.002"` -> `Some("video.7z")`. Non-volume names yield `None`.
pub fn volume_group(file_name: &str) -> Option<&str> {
    let (base, index) = file_name.rsplit_once('.')?;
    if !base.ends_with(".7z") {
        return None;
    }
    if index.len() != 3 || !index.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(base)
}

/// One-based volume index: `"video.7z.002"` -> `Some(2)`.
pub fn volume_index(file_name: &str) -> Option<u32> {
    volume_group(file_name)?;
    file_name.rsplit_once('.')?.1.parse().ok()
}

/// True for the `.001` volume a reassembly starts from.
pub fn is_first_volume(file_name: &str) -> bool {
    volume_index(file_name) == Some(1)
}
