//! Tests for root folder resolution priority and config file loading
//!
//! Tests that manipulate ASCR_ROOT are marked with #[serial] so they do not
//! race on the process environment.

use ascr_common::config::{default_root_folder, resolve_root_folder, AscrConfig, ROOT_ENV_VAR};
use serial_test::serial;
use std::env;
use std::path::PathBuf;

#[test]
#[serial]
fn test_cli_argument_wins() {
    env::set_var(ROOT_ENV_VAR, "/from/env");
    let root = resolve_root_folder(Some("/from/cli"), ROOT_ENV_VAR, None);
    assert_eq!(root, PathBuf::from("/from/cli"));
    env::remove_var(ROOT_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_beats_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("ascr.toml");
    std::fs::write(&config_path, "root_folder = \"/from/toml\"\n").unwrap();

    env::set_var(ROOT_ENV_VAR, "/from/env");
    let root = resolve_root_folder(None, ROOT_ENV_VAR, Some(&config_path));
    assert_eq!(root, PathBuf::from("/from/env"));
    env::remove_var(ROOT_ENV_VAR);
}

#[test]
#[serial]
fn test_config_file_used_without_env() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("ascr.toml");
    std::fs::write(&config_path, "root_folder = \"/from/toml\"\n").unwrap();

    env::remove_var(ROOT_ENV_VAR);
    let root = resolve_root_folder(None, ROOT_ENV_VAR, Some(&config_path));
    assert_eq!(root, PathBuf::from("/from/toml"));
}

#[test]
#[serial]
fn test_falls_back_to_default() {
    env::remove_var(ROOT_ENV_VAR);
    let root = resolve_root_folder(None, ROOT_ENV_VAR, Some(&PathBuf::from("/missing.toml")));
    assert_eq!(root, default_root_folder());
}

#[test]
fn test_load_full_file() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("ascr.toml");
    std::fs::write(
        &config_path,
        r#"
[store]
draft_suffix = "_draft"
identity_sections = ["cell_line"]

[tasks]
payload_retention_secs = 10

[curation]
endpoint = "http://curation:8002/single_article_curate"
relay_url = "http://backend:8001/internal/broadcast-task-progress"
"#,
    )
    .unwrap();

    let config = AscrConfig::load(&config_path).unwrap();
    assert_eq!(config.store.draft_suffix, "_draft");
    assert_eq!(config.store.version_marker, "_v");
    assert_eq!(config.store.identity_sections, vec!["cell_line".to_string()]);
    assert_eq!(config.tasks.payload_retention_secs, 10);
    assert_eq!(
        config.curation.relay_url.as_deref(),
        Some("http://backend:8001/internal/broadcast-task-progress")
    );
}
