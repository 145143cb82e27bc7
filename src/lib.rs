pub mod cloudinary;
pub mod config;
pub mod dedup;
pub mod policy;
pub mod remote;
pub mod transfer;
pub mod volume;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use cloudinary::CloudinaryClient;
use config::Config;
use remote::RemoteStore;

/// CLI for cloudsync: mirror local folders into a Cloudinary media library.
#[derive(Parser)]
#[clap(
    name = "cloudsync",
    version,
    about = "Synchronise local folders with a Cloudinary media library, splitting oversized files into 7z volumes"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload a file or directory into a remote folder
    Upload {
        /// Local file or directory path
        local_path: PathBuf,
        /// Remote folder name (prefixed with the configured default folder)
        folder: String,
        /// Re-upload files that already exist remotely
        #[clap(long)]
        force: bool,
    },
    /// Download a remote folder, reassembling split volumes
    Download {
        /// Remote folder name; defaults to the configured default folder
        folder: Option<String>,
        /// Local destination directory (default: ./downloads/<folder>)
        #[clap(long)]
        output: Option<PathBuf>,
    },
    /// List remote folders under the configured default folder
    List,
    /// List files in a remote folder
    Files {
        /// Remote folder name
        folder: String,
    },
    /// Delete a remote folder and all of its contents (exact name match)
    Delete {
        /// Remote folder name
        folder: String,
        /// Confirm the deletion without prompting
        #[clap(long)]
        yes: bool,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main().
pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env().context("configuration error")?;
    let remote = CloudinaryClient::new(&config);

    match cli.command {
        Commands::Upload {
            local_path,
            folder,
            force,
        } => {
            println!(
                "Uploading '{}' to '{}'...",
                local_path.display(),
                policy::normalize_folder(&folder, &config.default_folder)
            );
            let report =
                transfer::upload_path(&remote, &config, &local_path, &folder, force).await?;
            println!("Upload complete: {}", report.summary());
        }
        Commands::Download { folder, output } => {
            let folder = folder.unwrap_or_default();
            let target = policy::normalize_folder(&folder, &config.default_folder);
            if target.is_empty() {
                anyhow::bail!(
                    "no folder given and CLOUDINARY_DEFAULT_FOLDER is not set"
                );
            }
            let output = output.unwrap_or_else(|| {
                let leaf = target.rsplit('/').next().unwrap_or(&target);
                PathBuf::from("downloads").join(leaf)
            });
            println!("Downloading '{target}' to '{}'...", output.display());
            let report = transfer::download_folder(&remote, &config, &folder, &output).await?;
            println!("Download complete: {}", report.summary());
        }
        Commands::List => {
            let folders = remote.list_folders().await?;
            let root = if config.default_folder.is_empty() {
                "root"
            } else {
                &config.default_folder
            };
            if folders.is_empty() {
                println!("No folders found in '{root}'");
            } else {
                println!("Folders in '{root}':");
                for (i, folder) in folders.iter().enumerate() {
                    println!("{}. {} (path: {})", i + 1, folder.name, folder.path);
                }
            }
        }
        Commands::Files { folder } => {
            let target = policy::normalize_folder(&folder, &config.default_folder);
            let assets = remote.list(&target).await?;
            if assets.is_empty() {
                println!("No files found in folder '{target}'");
            } else {
                println!("Files in '{target}':");
                for asset in &assets {
                    println!("  {}", asset.filename);
                    println!("     id: {}", asset.public_id);
                    println!("     url: {}", asset.secure_url);
                    println!("     bytes: {}", asset.bytes);
                    if let Some(created_at) = &asset.created_at {
                        println!("     created: {created_at}");
                    }
                }
                println!("Total files: {}", assets.len());
            }
        }
        Commands::Delete { folder, yes } => {
            let target = policy::normalize_folder(&folder, &config.default_folder);
            if !yes {
                anyhow::bail!(
                    "deleting '{target}' removes the folder and ALL its contents; re-run with --yes to confirm"
                );
            }
            remote.delete_folder(&target).await?;
            println!("Deleted folder '{target}' and all its contents");
        }
    }

    Ok(())
}
