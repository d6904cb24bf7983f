use std::fs;
use std::time::Duration;

use lumen_config::{ConfigGuardRailError, ScannerConfig, apply_guard_rails};
use lumen_core::types::DeleteMode;
use tempfile::tempdir;

#[test]
fn toml_file_overrides_selected_fields() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scanner.toml");
    fs::write(
        &path,
        r#"
debounce_ms = 1500
persist_batch_size = 64
delete_mode = "hard"
extensions = ["jpg", "heic"]
"#,
    )
    .unwrap();

    let config = ScannerConfig::load_from_file(&path).unwrap();

    assert_eq!(
        config.watch_config().debounce_window,
        Duration::from_millis(1500)
    );
    assert_eq!(config.pipeline_config().persist_batch_size, 64);
    assert_eq!(config.delete_mode, DeleteMode::Hard);
    let options = config.scan_options();
    assert!(options.recursive);
    assert_eq!(options.extensions, vec!["jpg".to_string(), "heic".to_string()]);
}

#[test]
fn json_file_is_parsed_by_extension() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scanner.json");
    fs::write(&path, r#"{"generate_thumbnails": false, "worker_threads": 2}"#)
        .unwrap();

    let config = ScannerConfig::load_from_file(&path).unwrap();

    assert!(!config.scan_options().generate_thumbnails);
    assert_eq!(config.pool_config().threads, 2);
}

#[test]
fn unknown_extension_falls_back_to_sniffing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scanner.conf");
    fs::write(&path, r#"{"bootstrap_scan": false}"#).unwrap();

    let config = ScannerConfig::load_from_file(&path).unwrap();
    assert!(!config.bootstrap_scan);
}

#[test]
fn malformed_json_file_names_the_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scanner.json");
    fs::write(&path, "{ not json").unwrap();

    let err = ScannerConfig::load_from_file(&path).unwrap_err();
    assert!(format!("{err:#}").contains("scanner.json"));
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempdir().unwrap();
    let err = ScannerConfig::load_from_file(&dir.path().join("absent.toml"))
        .unwrap_err();
    assert!(err.to_string().contains("failed to read scanner config"));
}

#[test]
fn default_file_lookup_prefers_the_top_level_toml() {
    let dir = tempdir().unwrap();
    assert!(ScannerConfig::find_default_file(dir.path()).is_none());

    fs::create_dir(dir.path().join("config")).unwrap();
    fs::write(dir.path().join("config/scanner.toml"), "").unwrap();
    assert_eq!(
        ScannerConfig::find_default_file(dir.path()),
        Some(dir.path().join("config/scanner.toml"))
    );

    fs::write(dir.path().join("scanner.toml"), "").unwrap();
    assert_eq!(
        ScannerConfig::find_default_file(dir.path()),
        Some(dir.path().join("scanner.toml"))
    );
}

#[test]
fn loaded_config_with_zero_batch_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scanner.toml");
    fs::write(&path, "hash_batch_size = 0\n").unwrap();

    let config = ScannerConfig::load_from_file(&path).unwrap();
    assert_eq!(
        apply_guard_rails(&config).unwrap_err(),
        ConfigGuardRailError::ZeroBatchSize {
            field: "hash_batch_size"
        }
    );
}

#[test]
fn zero_debounce_and_empty_extensions_are_rejected() {
    let zero_debounce =
        ScannerConfig::parse_json(r#"{"debounce_ms": 0}"#).unwrap();
    assert_eq!(
        apply_guard_rails(&zero_debounce).unwrap_err(),
        ConfigGuardRailError::ZeroDebounce
    );

    let no_extensions =
        ScannerConfig::parse_json(r#"{"extensions": []}"#).unwrap();
    assert_eq!(
        apply_guard_rails(&no_extensions).unwrap_err(),
        ConfigGuardRailError::EmptyExtensions
    );
}
