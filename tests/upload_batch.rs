use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use tempfile::TempDir;

use cloudsync::config::Config;
use cloudsync::dedup::MatchMode;
use cloudsync::remote::{MockRemoteStore, RemoteAsset, RemoteError, ResourceType};
use cloudsync::transfer::{upload_path, FileOutcome};
use cloudsync::volume;

fn test_config() -> Config {
    Config {
        cloud_name: "demo".into(),
        api_key: "key".into(),
        api_secret: "secret".into(),
        default_folder: "melted".into(),
        max_file_size_mb: 8,
        match_mode: MatchMode::NameSize,
    }
}

fn remote_asset(folder: &str, filename: &str, bytes: u64) -> RemoteAsset {
    RemoteAsset {
        public_id: format!("{folder}/{filename}"),
        filename: filename.to_string(),
        bytes,
        folder: folder.to_string(),
        resource_type: ResourceType::Raw,
        secure_url: format!("https://res.example.com/{folder}/{filename}"),
        created_at: None,
        content_digest: None,
    }
}

fn write_file(dir: &Path, name: &str, contents: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut f = File::create(&path).expect("create test file");
    f.write_all(contents).expect("write test file");
    path
}

/// Deterministic incompressible bytes, so 7z actually produces several
/// volumes instead of collapsing the input.
fn pseudo_random_bytes(len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + 32);
    let mut counter: u64 = 0;
    while out.len() < len {
        let mut hasher = Sha256::new();
        hasher.update(counter.to_le_bytes());
        out.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    out.truncate(len);
    out
}

fn uploaded_asset(public_id: &str, resource_type: ResourceType) -> RemoteAsset {
    let filename = public_id.rsplit('/').next().unwrap_or(public_id).to_string();
    RemoteAsset {
        public_id: public_id.to_string(),
        folder: public_id
            .rsplit_once('/')
            .map(|(f, _)| f.to_string())
            .unwrap_or_default(),
        filename,
        bytes: 0,
        resource_type,
        secure_url: String::new(),
        created_at: None,
        content_digest: None,
    }
}

#[tokio::test]
async fn second_upload_of_same_file_is_skipped_as_duplicate() {
    let dir = TempDir::new().unwrap();
    let file = write_file(dir.path(), "report.pdf", b"0123456789");

    let mut remote = MockRemoteStore::new();
    remote
        .expect_list()
        .returning(|folder| Ok(vec![remote_asset(folder, "report.pdf", 10)]));
    remote.expect_upload().times(0);

    let report = upload_path(&remote, &test_config(), &file, "docs", false)
        .await
        .expect("upload batch should run");

    assert_eq!(report.skipped_duplicate, 1);
    assert_eq!(report.uploaded, 0);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn force_reuploads_without_consulting_the_listing() {
    let dir = TempDir::new().unwrap();
    let file = write_file(dir.path(), "report.pdf", b"0123456789");

    let mut remote = MockRemoteStore::new();
    remote.expect_list().times(0);
    remote
        .expect_upload()
        .times(1)
        .returning(|_, public_id, resource_type| Ok(uploaded_asset(public_id, resource_type)));

    let report = upload_path(&remote, &test_config(), &file, "docs", true)
        .await
        .expect("upload batch should run");

    assert_eq!(report.uploaded, 1);
    assert_eq!(report.skipped_duplicate, 0);
}

#[tokio::test]
async fn hidden_and_temp_files_are_recorded_but_not_uploaded() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), ".DS_Store", b"junk");
    write_file(dir.path(), "notes.txt.swp", b"junk");
    write_file(dir.path(), "notes.txt", b"keep me");

    let mut remote = MockRemoteStore::new();
    remote.expect_list().returning(|_| Ok(vec![]));
    remote
        .expect_upload()
        .times(1)
        .withf(|_, public_id, _| public_id.ends_with("notes.txt"))
        .returning(|_, public_id, resource_type| Ok(uploaded_asset(public_id, resource_type)));

    let report = upload_path(&remote, &test_config(), dir.path(), "docs", false)
        .await
        .expect("upload batch should run");

    assert_eq!(report.skipped_hidden, 2);
    assert_eq!(report.uploaded, 1);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn one_failed_upload_does_not_abort_the_batch() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.txt", b"aaa");
    write_file(dir.path(), "b.txt", b"bbb");
    write_file(dir.path(), "c.txt", b"ccc");

    let mut remote = MockRemoteStore::new();
    remote.expect_list().returning(|_| Ok(vec![]));
    remote.expect_upload().times(3).returning(|_, public_id, resource_type| {
        if public_id.ends_with("b.txt") {
            Err(RemoteError::Api {
                status: 500,
                message: "backend exploded".into(),
            })
        } else {
            Ok(uploaded_asset(public_id, resource_type))
        }
    });

    let report = upload_path(&remote, &test_config(), dir.path(), "docs", false)
        .await
        .expect("batch must not abort on a per-file failure");

    assert_eq!(report.uploaded, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped_duplicate, 0);
}

#[tokio::test]
async fn subdirectories_map_to_remote_subfolders() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("2024/summer")).unwrap();
    write_file(&dir.path().join("2024/summer"), "cat.jpg", b"meow");

    let mut remote = MockRemoteStore::new();
    remote
        .expect_list()
        .withf(|folder| folder == "melted/photos/2024/summer")
        .returning(|_| Ok(vec![]));
    remote
        .expect_upload()
        .times(1)
        .withf(|_, public_id, resource_type| {
            public_id == "melted/photos/2024/summer/cat" && *resource_type == ResourceType::Image
        })
        .returning(|_, public_id, resource_type| Ok(uploaded_asset(public_id, resource_type)));

    let report = upload_path(&remote, &test_config(), dir.path(), "photos", false)
        .await
        .expect("upload batch should run");

    assert_eq!(report.uploaded, 1);
}

#[tokio::test]
async fn same_name_in_nested_subfolder_does_not_suppress_the_upload() {
    let dir = TempDir::new().unwrap();
    let file = write_file(dir.path(), "report.pdf", b"0123456789");

    let mut remote = MockRemoteStore::new();
    // The prefix listing surfaces an equally-named, equally-sized asset in
    // a nested subfolder; it must not count as a duplicate.
    remote
        .expect_list()
        .returning(|_| Ok(vec![remote_asset("melted/docs/archive", "report.pdf", 10)]));
    remote
        .expect_upload()
        .times(1)
        .returning(|_, public_id, resource_type| Ok(uploaded_asset(public_id, resource_type)));

    let report = upload_path(&remote, &test_config(), &file, "docs", false)
        .await
        .expect("upload batch should run");

    assert_eq!(report.uploaded, 1);
    assert_eq!(report.skipped_duplicate, 0);
}

#[tokio::test]
async fn existing_remote_volume_set_is_detected_as_a_duplicate() {
    let dir = TempDir::new().unwrap();
    let file = write_file(dir.path(), "big.bin", &vec![7u8; 2 * 1024 * 1024]);

    let mut config = test_config();
    config.max_file_size_mb = 1;

    // A previous run split big.bin into these volumes.
    let mut remote = MockRemoteStore::new();
    remote.expect_list().returning(|folder| {
        Ok(vec![
            remote_asset(folder, "big.7z.001", 1024 * 1024),
            remote_asset(folder, "big.7z.002", 1024 * 1024),
            remote_asset(folder, "big.7z.003", 512 * 1024),
        ])
    });
    remote.expect_upload().times(0);

    let report = upload_path(&remote, &config, &file, "docs", false)
        .await
        .expect("upload batch should run");

    assert_eq!(report.skipped_duplicate, 1);
    assert_eq!(report.uploaded, 0);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn oversized_file_uploads_as_a_contiguous_volume_set() {
    if volume::sevenzip_binary().is_none() {
        eprintln!("skipping: no 7-Zip binary on this host");
        return;
    }

    let dir = TempDir::new().unwrap();
    let file = write_file(
        dir.path(),
        "video.bin",
        &pseudo_random_bytes(2 * 1024 * 1024 + 300 * 1024),
    );

    let mut config = test_config();
    config.max_file_size_mb = 1;

    let uploads: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&uploads);
    let mut remote = MockRemoteStore::new();
    remote.expect_list().returning(|_| Ok(vec![]));
    remote.expect_upload().returning(move |_, public_id, resource_type| {
        assert_eq!(resource_type, ResourceType::Raw);
        seen.lock().unwrap().push(public_id.to_string());
        Ok(uploaded_asset(public_id, resource_type))
    });

    let report = upload_path(&remote, &config, &file, "docs", false)
        .await
        .expect("upload batch should run");

    assert_eq!(report.uploaded, 1, "one source file, whatever the volume count");
    assert_eq!(report.failed, 0);

    let uploads = uploads.lock().unwrap();
    assert!(uploads.len() >= 2, "expected a multi-volume set, got {uploads:?}");
    for (i, public_id) in uploads.iter().enumerate() {
        assert_eq!(*public_id, format!("melted/docs/video.7z.{:03}", i + 1));
    }
}

#[tokio::test]
async fn mid_set_volume_upload_failure_fails_the_whole_file() {
    if volume::sevenzip_binary().is_none() {
        eprintln!("skipping: no 7-Zip binary on this host");
        return;
    }

    let dir = TempDir::new().unwrap();
    let file = write_file(
        dir.path(),
        "video.bin",
        &pseudo_random_bytes(2 * 1024 * 1024 + 300 * 1024),
    );

    let mut config = test_config();
    config.max_file_size_mb = 1;

    let mut remote = MockRemoteStore::new();
    remote.expect_list().returning(|_| Ok(vec![]));
    remote.expect_upload().returning(|_, public_id, resource_type| {
        if public_id.ends_with(".7z.002") {
            Err(RemoteError::Api {
                status: 500,
                message: "backend exploded".into(),
            })
        } else {
            Ok(uploaded_asset(public_id, resource_type))
        }
    });

    let report = upload_path(&remote, &config, &file, "docs", false)
        .await
        .expect("upload batch should run");

    assert_eq!(report.uploaded, 0);
    assert_eq!(report.failed, 1);
    match &report.outcomes[0].1 {
        FileOutcome::Failed(reason) => assert!(reason.contains("volume 2"), "got: {reason}"),
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn oversized_file_without_sevenzip_uploads_uncompressed() {
    if volume::sevenzip_binary().is_some() {
        eprintln!("skipping: a 7-Zip binary is present on this host");
        return;
    }

    let dir = TempDir::new().unwrap();
    let file = write_file(dir.path(), "big.bin", &vec![7u8; 2 * 1024 * 1024]);

    let mut config = test_config();
    config.max_file_size_mb = 1;

    let mut remote = MockRemoteStore::new();
    remote.expect_list().returning(|_| Ok(vec![]));
    remote
        .expect_upload()
        .times(1)
        .withf(|_, public_id, _| public_id == "melted/docs/big.bin")
        .returning(|_, public_id, resource_type| Ok(uploaded_asset(public_id, resource_type)));

    let report = upload_path(&remote, &config, &file, "docs", false)
        .await
        .expect("upload batch should run");

    assert_eq!(report.uploaded, 1);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn listing_failure_degrades_to_upload_without_duplicate_check() {
    let dir = TempDir::new().unwrap();
    let file = write_file(dir.path(), "report.pdf", b"0123456789");

    let mut remote = MockRemoteStore::new();
    remote.expect_list().returning(|_| {
        Err(RemoteError::Api {
            status: 503,
            message: "listing unavailable".into(),
        })
    });
    remote
        .expect_upload()
        .times(1)
        .returning(|_, public_id, resource_type| Ok(uploaded_asset(public_id, resource_type)));

    let report = upload_path(&remote, &test_config(), &file, "docs", false)
        .await
        .expect("upload batch should run");

    assert_eq!(report.uploaded, 1);
    assert_eq!(report.failed, 0);
}
