//! # cloudinary: production [`RemoteStore`] client
//!
//! Bridges the transfer pipeline to Cloudinary's HTTP surface: the signed
//! upload endpoint for writes, the Admin API (basic auth) for listing and
//! deletion, and plain GETs of `secure_url` for downloads. All transport,
//! serialization and error mapping live here; the orchestrator only sees
//! the [`RemoteStore`] trait.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::remote::{RemoteAsset, RemoteError, RemoteFolder, RemoteStore, ResourceType};

const API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Admin API page cap.
const MAX_LIST_RESULTS: u32 = 500;

pub struct CloudinaryClient {
    http: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    default_folder: String,
}

impl CloudinaryClient {
    pub fn new(config: &Config) -> Self {
        info!(cloud_name = %config.cloud_name, "Initialized Cloudinary client");
        CloudinaryClient {
            http: reqwest::Client::new(),
            cloud_name: config.cloud_name.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            default_folder: config.default_folder.clone(),
        }
    }

    fn endpoint(&self, tail: &str) -> String {
        format!("{API_BASE}/{}/{tail}", self.cloud_name)
    }

    /// SHA-256 signature over the `&`-joined, key-sorted parameter string
    /// with the API secret appended, as the upload endpoint expects.
    fn sign(&self, params: &BTreeMap<&'static str, String>) -> String {
        let to_sign = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let mut hasher = Sha256::new();
        hasher.update(to_sign.as_bytes());
        hasher.update(self.api_secret.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Deserialize)]
struct ApiResource {
    public_id: String,
    #[serde(default)]
    bytes: u64,
    #[serde(default)]
    secure_url: String,
    #[serde(default = "default_resource_type")]
    resource_type: String,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

fn default_resource_type() -> String {
    "raw".to_string()
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    resources: Vec<ApiResource>,
}

#[derive(Debug, Deserialize)]
struct ApiFolder {
    name: String,
    path: String,
}

#[derive(Debug, Deserialize)]
struct FoldersResponse {
    #[serde(default)]
    folders: Vec<ApiFolder>,
}

/// Rebuilds folder membership and the original filename from a public id.
/// Image and video public ids are stored without extension; the reported
/// format restores it. Raw ids keep their extension verbatim.
fn asset_from(res: ApiResource) -> RemoteAsset {
    let resource_type = res
        .resource_type
        .parse::<ResourceType>()
        .unwrap_or(ResourceType::Raw);
    let (folder, leaf) = match res.public_id.rsplit_once('/') {
        Some((folder, leaf)) => (folder.to_string(), leaf.to_string()),
        None => (String::new(), res.public_id.clone()),
    };
    let filename = match (&res.format, resource_type) {
        (Some(format), ResourceType::Image | ResourceType::Video) => format!("{leaf}.{format}"),
        _ => leaf,
    };
    RemoteAsset {
        public_id: res.public_id,
        filename,
        bytes: res.bytes,
        folder,
        resource_type,
        secure_url: res.secure_url,
        created_at: res.created_at,
        content_digest: None,
    }
}

async fn api_error(resp: reqwest::Response) -> RemoteError {
    let status = resp.status().as_u16();
    let message = resp
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable response body>".to_string());
    RemoteError::Api { status, message }
}

#[async_trait]
impl RemoteStore for CloudinaryClient {
    async fn upload(
        &self,
        local_path: &Path,
        public_id: &str,
        resource_type: ResourceType,
    ) -> Result<RemoteAsset, RemoteError> {
        info!(
            path = %local_path.display(),
            public_id,
            resource_type = resource_type.as_str(),
            "Uploading file"
        );

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
            .to_string();

        let mut params = BTreeMap::new();
        params.insert("public_id", public_id.to_string());
        params.insert("timestamp", timestamp.clone());
        let signature = self.sign(&params);

        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let bytes = tokio::fs::read(local_path).await?;
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("public_id", public_id.to_string())
            .text("signature", signature);

        let url = self.endpoint(&format!("{}/upload", resource_type.as_str()));
        let resp = self.http.post(&url).multipart(form).send().await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let api_res: ApiResource = resp.json().await?;
        let asset = asset_from(api_res);
        info!(public_id = %asset.public_id, bytes = asset.bytes, "Upload succeeded");
        Ok(asset)
    }

    async fn list(&self, folder: &str) -> Result<Vec<RemoteAsset>, RemoteError> {
        debug!(folder, "Listing remote assets by prefix");
        let prefix = format!("{}/", folder.trim_end_matches('/'));
        let max_results = MAX_LIST_RESULTS.to_string();
        let mut assets = Vec::new();

        // The Admin API scopes listings per resource type; one call each.
        for resource_type in ResourceType::ALL {
            let url = self.endpoint(&format!("resources/{}/upload", resource_type.as_str()));
            let resp = self
                .http
                .get(&url)
                .basic_auth(&self.api_key, Some(&self.api_secret))
                .query(&[
                    ("prefix", prefix.as_str()),
                    ("max_results", max_results.as_str()),
                ])
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(api_error(resp).await);
            }
            let page: ListResponse = resp.json().await?;
            assets.extend(page.resources.into_iter().map(asset_from));
        }

        assets.sort_by(|a, b| a.public_id.cmp(&b.public_id));
        info!(folder, count = assets.len(), "Fetched remote folder listing");
        Ok(assets)
    }

    async fn list_folders(&self) -> Result<Vec<RemoteFolder>, RemoteError> {
        let tail = if self.default_folder.is_empty() {
            "folders".to_string()
        } else {
            format!("folders/{}", self.default_folder)
        };
        let resp = self
            .http
            .get(self.endpoint(&tail))
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .send()
            .await?;
        // A default folder that has never been written to is not an error.
        if resp.status().as_u16() == 404 {
            debug!(default_folder = %self.default_folder, "Default folder absent remotely");
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        let page: FoldersResponse = resp.json().await?;
        info!(count = page.folders.len(), "Fetched remote folder list");
        Ok(page
            .folders
            .into_iter()
            .map(|f| RemoteFolder {
                name: f.name,
                path: f.path,
            })
            .collect())
    }

    async fn delete_folder(&self, folder: &str) -> Result<(), RemoteError> {
        // Exact-name existence check first; no wildcard semantics.
        let probe = self
            .http
            .get(self.endpoint(&format!("folders/{folder}")))
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .send()
            .await?;
        if probe.status().as_u16() == 404 {
            return Err(RemoteError::FolderNotFound(folder.to_string()));
        }
        if !probe.status().is_success() {
            return Err(api_error(probe).await);
        }

        let prefix = format!("{}/", folder.trim_end_matches('/'));
        for resource_type in ResourceType::ALL {
            let url = self.endpoint(&format!("resources/{}/upload", resource_type.as_str()));
            let resp = self
                .http
                .delete(&url)
                .basic_auth(&self.api_key, Some(&self.api_secret))
                .query(&[("prefix", prefix.as_str())])
                .send()
                .await?;
            if !resp.status().is_success() {
                warn!(
                    folder,
                    resource_type = resource_type.as_str(),
                    status = resp.status().as_u16(),
                    "Could not delete resources for type, continuing"
                );
            }
        }

        let resp = self
            .http
            .delete(self.endpoint(&format!("folders/{folder}")))
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        info!(folder, "Deleted remote folder and its contents");
        Ok(())
    }

    async fn download(&self, asset: &RemoteAsset, dest: &Path) -> Result<(), RemoteError> {
        info!(public_id = %asset.public_id, dest = %dest.display(), "Downloading asset");
        let resp = self.http.get(&asset.secure_url).send().await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        debug!(dest = %dest.display(), "Download complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::MatchMode;

    fn client() -> CloudinaryClient {
        CloudinaryClient::new(&Config {
            cloud_name: "demo".into(),
            api_key: "1234".into(),
            api_secret: "abcd".into(),
            default_folder: "melted".into(),
            max_file_size_mb: 8,
            match_mode: MatchMode::NameSize,
        })
    }

    #[test]
    fn signature_covers_sorted_params_and_secret() {
        let c = client();
        let mut params = BTreeMap::new();
        params.insert("timestamp", "1700000000".to_string());
        params.insert("public_id", "melted/photos/cat".to_string());

        let expected = {
            let mut hasher = Sha256::new();
            hasher.update(b"public_id=melted/photos/cat&timestamp=1700000000");
            hasher.update(b"abcd");
            format!("{:x}", hasher.finalize())
        };
        assert_eq!(c.sign(&params), expected);
    }

    #[test]
    fn filenames_are_rebuilt_from_public_id_and_format() {
        let image = asset_from(ApiResource {
            public_id: "melted/photos/cat".into(),
            bytes: 42,
            secure_url: "https://res.cloudinary.com/demo/cat.jpg".into(),
            resource_type: "image".into(),
            format: Some("jpg".into()),
            created_at: None,
        });
        assert_eq!(image.filename, "cat.jpg");
        assert_eq!(image.folder, "melted/photos");

        let raw = asset_from(ApiResource {
            public_id: "melted/backup/video.7z.001".into(),
            bytes: 8_000_000,
            secure_url: "https://res.cloudinary.com/demo/video.7z.001".into(),
            resource_type: "raw".into(),
            format: None,
            created_at: None,
        });
        assert_eq!(raw.filename, "video.7z.001");
        assert_eq!(raw.folder, "melted/backup");
    }
}
