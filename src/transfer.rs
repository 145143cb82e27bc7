//! # transfer: batch orchestration for uploads and downloads
//!
//! This module coordinates the whole pipeline: it walks a local path,
//! applies the skip filter and size policy, invokes the compression adapter
//! when a file exceeds the threshold, consults the duplicate detector
//! against a per-folder listing fetched once per run, and hands every
//! resulting unit to the [`RemoteStore`].
//!
//! # Failure semantics
//! Failures are caught at the smallest unit — one file on upload, one
//! volume group on download — and recorded in the [`TransferReport`]; one
//! bad unit never aborts the batch. Only setup errors (missing local path,
//! unreachable listing on download) fail the operation as a whole.
//!
//! # Resource discipline
//! Files are processed strictly sequentially, so at most one volume set
//! exists on disk at a time. Scratch volumes live in a [`VolumeSet`]-owned
//! temp directory and are reclaimed when the set drops, on success and on
//! failure alike.
//!
//! [`VolumeSet`]: crate::volume::VolumeSet

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::Config;
use crate::dedup::{self, LocalFile};
use crate::policy;
use crate::remote::{RemoteAsset, RemoteStore, ResourceType};
use crate::volume::{self, CompressError};

/// Terminal state of one file (upload) or one asset group (download).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Uploaded,
    Downloaded,
    SkippedDuplicate,
    SkippedHidden,
    Failed(String),
}

/// Per-run tally plus the per-unit outcomes, returned to the CLI.
#[derive(Debug, Default)]
pub struct TransferReport {
    pub uploaded: usize,
    pub downloaded: usize,
    pub skipped_duplicate: usize,
    pub skipped_hidden: usize,
    pub failed: usize,
    pub outcomes: Vec<(PathBuf, FileOutcome)>,
}

impl TransferReport {
    fn record(&mut self, unit: PathBuf, outcome: FileOutcome) {
        match &outcome {
            FileOutcome::Uploaded => {
                self.uploaded += 1;
                println!("  uploaded            {}", unit.display());
            }
            FileOutcome::Downloaded => {
                self.downloaded += 1;
                println!("  downloaded          {}", unit.display());
            }
            FileOutcome::SkippedDuplicate => {
                self.skipped_duplicate += 1;
                println!("  skipped (duplicate) {}", unit.display());
            }
            FileOutcome::SkippedHidden => {
                self.skipped_hidden += 1;
                println!("  skipped (hidden)    {}", unit.display());
            }
            FileOutcome::Failed(reason) => {
                self.failed += 1;
                println!("  FAILED              {} ({reason})", unit.display());
            }
        }
        self.outcomes.push((unit, outcome));
    }

    pub fn summary(&self) -> String {
        format!(
            "{} uploaded, {} downloaded, {} skipped (duplicate), {} skipped (hidden), {} failed",
            self.uploaded, self.downloaded, self.skipped_duplicate, self.skipped_hidden, self.failed
        )
    }
}

/// Uploads a file or directory tree into the given remote folder.
///
/// Fails only when the local path cannot be read; per-file problems are
/// recorded in the report and the batch continues.
pub async fn upload_path<R: RemoteStore>(
    remote: &R,
    config: &Config,
    local_path: &Path,
    folder: &str,
    force: bool,
) -> Result<TransferReport> {
    let run_id = Uuid::new_v4();
    let target = policy::normalize_folder(folder, &config.default_folder);
    info!(
        %run_id,
        path = %local_path.display(),
        folder = %target,
        force,
        "Starting upload batch"
    );

    let files = collect_local_files(local_path)?;
    info!(%run_id, files = files.len(), "Collected local files");

    let mut report = TransferReport::default();
    // One listing fetch per remote folder per run, shared across files.
    let mut listings: HashMap<String, Vec<RemoteAsset>> = HashMap::new();

    for file in &files {
        let outcome = upload_one(remote, config, file, &target, force, &mut listings).await;
        report.record(file.relative.clone(), outcome);
    }

    info!(%run_id, summary = %report.summary(), "Upload batch finished");
    Ok(report)
}

/// The per-file upload state machine (spec order: hidden filter, duplicate
/// check, size policy, upload of every resulting unit).
async fn upload_one<R: RemoteStore>(
    remote: &R,
    config: &Config,
    file: &LocalFile,
    target: &str,
    force: bool,
    listings: &mut HashMap<String, Vec<RemoteAsset>>,
) -> FileOutcome {
    let name = file.file_name();

    if policy::should_skip(&name) {
        info!(file = %name, "Skipping hidden/temporary file");
        return FileOutcome::SkippedHidden;
    }

    let folder = remote_subfolder(target, &file.relative);
    let oversized = policy::needs_compression(file.size, config.threshold_bytes());

    if !force {
        let listing = folder_listing(remote, &folder, listings).await;
        // An oversized file lives remotely as a volume set, so an existing
        // set for its stem is just as much a duplicate as the file itself.
        if dedup::is_duplicate(file, listing, &folder, config.match_mode)
            || (oversized && dedup::has_volume_set(file, listing, &folder))
        {
            info!(file = %name, folder = %folder, "Skipping duplicate");
            return FileOutcome::SkippedDuplicate;
        }
    }

    if oversized {
        match volume::split(&file.path, config.threshold_bytes()) {
            Ok(set) => {
                // Scratch volumes are reclaimed when `set` drops, whatever
                // the upload outcome.
                return upload_volumes(remote, &set, &folder).await;
            }
            Err(CompressError::Unavailable) => {
                warn!(
                    file = %name,
                    size = file.size,
                    "7-Zip unavailable, uploading oversized file uncompressed"
                );
            }
            Err(e) => {
                error!(file = %name, error = %e, "Compression failed");
                return FileOutcome::Failed(e.to_string());
            }
        }
    }

    let resource_type = ResourceType::from_path(&file.path);
    let public_id = public_id_for(&folder, &name, resource_type);
    match remote.upload(&file.path, &public_id, resource_type).await {
        Ok(asset) => {
            info!(public_id = %asset.public_id, "File uploaded");
            FileOutcome::Uploaded
        }
        Err(e) => {
            error!(file = %name, error = %e, "Upload failed");
            FileOutcome::Failed(e.to_string())
        }
    }
}

/// Uploads every volume of a set as sibling raw assets. The shared group
/// identifier and the index are both carried by the volume filename
/// (`{stem}.7z.NNN`), which is what the download path regroups by.
async fn upload_volumes<R: RemoteStore>(
    remote: &R,
    set: &volume::VolumeSet,
    folder: &str,
) -> FileOutcome {
    info!(
        group = %set.group,
        volumes = set.len(),
        source = %set.source.display(),
        "Uploading volume set"
    );
    for (i, vol) in set.volumes.iter().enumerate() {
        let vol_name = vol
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let public_id = format!("{folder}/{vol_name}");
        info!(volume = i + 1, total = set.len(), %public_id, "Uploading volume");
        if let Err(e) = remote.upload(vol, &public_id, ResourceType::Raw).await {
            error!(volume = i + 1, total = set.len(), error = %e, "Volume upload failed");
            return FileOutcome::Failed(format!("volume {}/{}: {e}", i + 1, set.len()));
        }
    }
    FileOutcome::Uploaded
}

/// Downloads a remote folder, reassembling volume sets into their original
/// files. Standalone assets download directly; a group with any failed
/// volume download is failed without reassembly.
pub async fn download_folder<R: RemoteStore>(
    remote: &R,
    config: &Config,
    folder: &str,
    output: &Path,
) -> Result<TransferReport> {
    let run_id = Uuid::new_v4();
    let target = policy::normalize_folder(folder, &config.default_folder);
    info!(%run_id, folder = %target, output = %output.display(), "Starting download batch");

    let assets = remote
        .list(&target)
        .await
        .with_context(|| format!("failed to list remote folder '{target}'"))?;

    // Partition volume siblings from standalone assets by filename shape.
    let mut groups: BTreeMap<(String, String), Vec<RemoteAsset>> = BTreeMap::new();
    let mut standalone: Vec<RemoteAsset> = Vec::new();
    for asset in assets {
        match volume::volume_group(&asset.filename) {
            Some(group) => groups
                .entry((asset.folder.clone(), group.to_string()))
                .or_default()
                .push(asset),
            None => standalone.push(asset),
        }
    }

    fs::create_dir_all(output)
        .with_context(|| format!("failed to create output directory {}", output.display()))?;

    let mut report = TransferReport::default();

    for asset in &standalone {
        let dest = output.join(relative_dest(asset, &target));
        let outcome = match remote.download(asset, &dest).await {
            Ok(()) => FileOutcome::Downloaded,
            Err(e) => {
                error!(public_id = %asset.public_id, error = %e, "Download failed");
                FileOutcome::Failed(e.to_string())
            }
        };
        report.record(relative_dest(asset, &target), outcome);
    }

    for ((asset_folder, group), mut volumes) in groups {
        volumes.sort_by_key(|a| volume::volume_index(&a.filename).unwrap_or(u32::MAX));
        let outcome = download_group(remote, &group, &volumes, &target, output).await;
        let unit = match asset_folder.strip_prefix(&format!("{target}/")) {
            Some(sub) => PathBuf::from(sub).join(&group),
            None => PathBuf::from(&group),
        };
        report.record(unit, outcome);
    }

    info!(%run_id, summary = %report.summary(), "Download batch finished");
    Ok(report)
}

/// Downloads every volume of one group, then reassembles. On reassembly
/// failure the downloaded volumes stay on disk for manual inspection; on
/// a failed volume download the partial set is removed.
async fn download_group<R: RemoteStore>(
    remote: &R,
    group: &str,
    volumes: &[RemoteAsset],
    target: &str,
    output: &Path,
) -> FileOutcome {
    info!(group, volumes = volumes.len(), "Downloading volume group");

    // Indices must be contiguous from 1; a hole means the remote set is
    // incomplete and reassembly would silently truncate.
    for (i, asset) in volumes.iter().enumerate() {
        if volume::volume_index(&asset.filename) != Some(i as u32 + 1) {
            error!(group, "Volume set has missing or duplicate indices");
            return FileOutcome::Failed(format!(
                "incomplete volume set: expected volume {:03}, found {}",
                i + 1,
                asset.filename
            ));
        }
    }

    let mut local_volumes: Vec<PathBuf> = Vec::new();
    for asset in volumes {
        let dest = output.join(relative_dest(asset, target));
        if let Err(e) = remote.download(asset, &dest).await {
            error!(group, volume = %asset.filename, error = %e, "Volume download failed");
            for lv in &local_volumes {
                let _ = fs::remove_file(lv);
            }
            return FileOutcome::Failed(format!("volume {}: {e}", asset.filename));
        }
        local_volumes.push(dest);
    }

    let extract_dir = local_volumes[0]
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| output.to_path_buf());
    match volume::join(&local_volumes[0], &extract_dir) {
        Ok(()) => {
            for lv in &local_volumes {
                if let Err(e) = fs::remove_file(lv) {
                    warn!(path = %lv.display(), error = ?e, "Could not remove volume after reassembly");
                }
            }
            info!(group, "Volume group reassembled");
            FileOutcome::Downloaded
        }
        Err(e) => {
            // Volumes are left in place on purpose so the set can be
            // inspected or extracted manually.
            error!(group, error = %e, "Reassembly failed, leaving volumes on disk");
            FileOutcome::Failed(e.to_string())
        }
    }
}

/// Walks a file or directory into the run's immutable [`LocalFile`] list.
/// Hidden directories are pruned during the walk; hidden files are kept so
/// the state machine can record them as skipped.
fn collect_local_files(local_path: &Path) -> Result<Vec<LocalFile>> {
    if !local_path.exists() {
        anyhow::bail!("local path not found: {}", local_path.display());
    }
    if local_path.is_file() {
        let base = local_path.parent().unwrap_or_else(|| Path::new(""));
        let file = LocalFile::from_path(local_path, base)
            .with_context(|| format!("failed to stat {}", local_path.display()))?;
        return Ok(vec![file]);
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(local_path)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !(e.file_type().is_dir() && e.file_name().to_string_lossy().starts_with('.'))
        });
    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", local_path.display()))?;
        if entry.file_type().is_file() {
            let file = LocalFile::from_path(entry.path(), local_path)
                .with_context(|| format!("failed to stat {}", entry.path().display()))?;
            files.push(file);
        }
    }
    Ok(files)
}

/// Remote folder for one file, preserving its relative directory structure.
fn remote_subfolder(target: &str, relative: &Path) -> String {
    let mut segments: Vec<String> = Vec::new();
    if let Some(parent) = relative.parent() {
        for comp in parent.components() {
            segments.push(comp.as_os_str().to_string_lossy().into_owned());
        }
    }
    if segments.is_empty() {
        target.to_string()
    } else {
        format!("{target}/{}", segments.join("/"))
    }
}

/// Public id for one upload unit. Raw ids keep the extension so the leaf
/// stays unambiguous; image and video ids are stored without it, matching
/// how the service reports them back.
fn public_id_for(folder: &str, file_name: &str, resource_type: ResourceType) -> String {
    let leaf = match resource_type {
        ResourceType::Raw => file_name.to_string(),
        ResourceType::Image | ResourceType::Video => Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.to_string()),
    };
    format!("{folder}/{leaf}")
}

/// Local destination for an asset, relative to the output directory.
fn relative_dest(asset: &RemoteAsset, target: &str) -> PathBuf {
    if asset.folder == target {
        return PathBuf::from(&asset.filename);
    }
    match asset.folder.strip_prefix(&format!("{target}/")) {
        Some(sub) => PathBuf::from(sub).join(&asset.filename),
        None => PathBuf::from(&asset.filename),
    }
}

/// Cached per-folder listing; a listing failure degrades to an empty
/// listing with a warning rather than aborting the batch.
async fn folder_listing<'a, R: RemoteStore>(
    remote: &R,
    folder: &str,
    listings: &'a mut HashMap<String, Vec<RemoteAsset>>,
) -> &'a [RemoteAsset] {
    if !listings.contains_key(folder) {
        let listing = match remote.list(folder).await {
            Ok(assets) => assets,
            Err(e) => {
                warn!(folder, error = %e, "Listing failed, duplicate detection disabled for this folder");
                Vec::new()
            }
        };
        listings.insert(folder.to_string(), listing);
    }
    listings
        .get(folder)
        .map(Vec::as_slice)
        .unwrap_or_default()
}
