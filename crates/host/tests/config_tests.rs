//! Integration tests for configuration parsing
//!
//! Tests host configuration loading, including:
//! - Minimal and full config files
//! - Save/load through the filesystem
//! - Invalid configuration handling
//! - `~` expansion of user-supplied paths

use host::ChromaSubsampling;
use host::config::{HostConfig, load_config};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

const MINIMAL_HOST_CONFIG: &str = r#"
[host]
log_level = "info"
"#;

const FULL_HOST_CONFIG: &str = r#"
[host]
log_level = "debug"

[usb]
candidates = ["0x18d1:0x4ee2", "0x04e8:0x6860"]
filters = ["0x2717:*"]
settle_delay_ms = 1500

[accessory]
manufacturer = "Acme"
model = "Viewer"
description = "Acme viewer"
version = "1.0"
uri = "https://example.com"
serial = "0001"

[stream]
poll_timeout_ms = 250
flush_timeout_ms = 20
chunk_size = 8192
handshake_frame_len = 32
orientation_frame_len = 16
max_image_bytes = 8294400

[jpeg]
quality = 80
subsampling = "444"
"#;

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("host.toml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_parse_minimal_host_config() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, MINIMAL_HOST_CONFIG);

    let config = HostConfig::load(Some(path)).unwrap();
    let defaults = HostConfig::default();

    assert_eq!(config.host.log_level, "info");
    assert_eq!(config.usb.candidates, defaults.usb.candidates);
    assert_eq!(config.accessory, defaults.accessory);
    assert_eq!(config.stream, defaults.stream);
    assert_eq!(config.jpeg, defaults.jpeg);
}

#[test]
fn test_parse_full_host_config() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, FULL_HOST_CONFIG);

    let config = HostConfig::load(Some(path)).unwrap();

    assert_eq!(config.host.log_level, "debug");
    assert_eq!(config.usb.candidates.len(), 2);
    assert_eq!(config.usb.filters, vec!["0x2717:*"]);
    assert_eq!(config.usb.settle_delay(), Duration::from_millis(1500));

    let candidates = config.usb.candidate_identities().unwrap();
    assert_eq!(candidates[1].vendor_id, 0x04e8);
    assert_eq!(candidates[1].product_id, 0x6860);

    assert_eq!(config.accessory.manufacturer, "Acme");
    assert_eq!(config.accessory.serial, "0001");

    assert_eq!(config.stream.poll_timeout(), Duration::from_millis(250));
    assert_eq!(config.stream.chunk_size, 8192);
    assert_eq!(config.stream.handshake_frame_len, 32);
    assert_eq!(
        config.stream.teardown_window(),
        Duration::from_millis(2 * 250 + 20)
    );

    assert_eq!(config.jpeg.quality, 80);
    assert_eq!(config.jpeg.subsampling, ChromaSubsampling::Yuv444);
}

#[test]
fn test_save_and_load_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("host.toml");

    let mut config = HostConfig::default();
    config.host.log_level = "trace".to_string();
    config.usb.filters = vec!["0x1234:0x5678".to_string()];
    config.stream.poll_timeout_ms = 100;
    config.jpeg.subsampling = ChromaSubsampling::Yuv422;

    config.save(&path).unwrap();
    assert!(path.exists());

    let loaded = HostConfig::load(Some(path)).unwrap();
    assert_eq!(loaded.host.log_level, "trace");
    assert_eq!(loaded.usb.filters, config.usb.filters);
    assert_eq!(loaded.stream, config.stream);
    assert_eq!(loaded.jpeg, config.jpeg);
}

#[test]
fn test_invalid_configs_rejected() {
    let cases = [
        ("bad log level", "[host]\nlog_level = \"loud\"\n"),
        (
            "candidate without 0x",
            "[host]\nlog_level = \"info\"\n[usb]\ncandidates = [\"18d1:4ee2\"]\n",
        ),
        (
            "wildcard candidate",
            "[host]\nlog_level = \"info\"\n[usb]\ncandidates = [\"0x18d1:*\"]\n",
        ),
        (
            "malformed filter",
            "[host]\nlog_level = \"info\"\n[usb]\nfilters = [\"0x18d1\"]\n",
        ),
        (
            "oversized chunk",
            "[host]\nlog_level = \"info\"\n[stream]\nchunk_size = 65536\n",
        ),
        (
            "short handshake frame",
            "[host]\nlog_level = \"info\"\n[stream]\nhandshake_frame_len = 8\n",
        ),
        (
            "zero poll timeout",
            "[host]\nlog_level = \"info\"\n[stream]\npoll_timeout_ms = 0\n",
        ),
        (
            "quality out of range",
            "[host]\nlog_level = \"info\"\n[jpeg]\nquality = 0\n",
        ),
        (
            "unknown subsampling",
            "[host]\nlog_level = \"info\"\n[jpeg]\nsubsampling = \"411\"\n",
        ),
        ("not toml", "this is not toml"),
    ];

    for (name, content) in cases {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, content);
        assert!(HostConfig::load(Some(path)).is_err(), "{name} was accepted");
    }
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let result = HostConfig::load(Some(dir.path().join("missing.toml")));
    assert!(result.is_err());
}

#[test]
fn test_load_config_expands_tilde() {
    // A path that does not use ~ is passed through unchanged
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, MINIMAL_HOST_CONFIG);
    let config = load_config(path.to_str().unwrap()).unwrap();
    assert_eq!(config.host.log_level, "info");

    let Some(home) = dirs::home_dir() else {
        return;
    };
    let err = load_config("~/definitely-not-here/host.toml").unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains(&home.display().to_string()), "{message}");
}

#[test]
fn test_default_path() {
    let path = HostConfig::default_path();
    assert!(path.ends_with("hmd-tether/host.toml"));
}
