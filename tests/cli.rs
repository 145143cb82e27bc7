use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Strips Cloudinary configuration from the child's environment and points
/// its working directory at an empty temp dir, so no `.env` file leaks in.
fn bare_command(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cloudsync").expect("binary exists");
    cmd.current_dir(dir.path());
    for var in [
        "CLOUDINARY_CLOUD_NAME",
        "CLOUDINARY_API_KEY",
        "CLOUDINARY_API_SECRET",
        "CLOUDINARY_DEFAULT_FOLDER",
        "CLOUDINARY_MAX_FILE_SIZE",
        "CLOUDINARY_MATCH_MODE",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn help_lists_all_subcommands() {
    let dir = TempDir::new().unwrap();
    bare_command(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("upload")
                .and(predicate::str::contains("download"))
                .and(predicate::str::contains("list"))
                .and(predicate::str::contains("files"))
                .and(predicate::str::contains("delete")),
        );
}

#[test]
fn missing_configuration_exits_non_zero_before_any_transfer() {
    let dir = TempDir::new().unwrap();
    bare_command(&dir)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("CLOUDINARY_CLOUD_NAME"));
}

#[test]
fn delete_refuses_without_confirmation_flag() {
    let dir = TempDir::new().unwrap();
    bare_command(&dir)
        .args(["delete", "photos"])
        .env("CLOUDINARY_CLOUD_NAME", "demo")
        .env("CLOUDINARY_API_KEY", "1234")
        .env("CLOUDINARY_API_SECRET", "abcd")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));
}
