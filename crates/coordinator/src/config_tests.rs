// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use corral_forge::AuthConfig;

fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
fn full_config_parses() {
    let (_dir, path) = write_config(
        r#"{
            "auth": {"type": "Token", "token": "ghp_abc"},
            "target": "https://github.com/acme/widgets",
            "runners": [
                {
                    "baseVMBundlePath": "/vm/base.bundle",
                    "vmConfigPath": "/vm/config.json",
                    "runnerGroup": "macs",
                    "labels": ["macos", "arm64"]
                }
            ],
            "vmctlPath": "/usr/local/bin/vmctl"
        }"#,
    );

    let config = Config::load(&path).unwrap();
    assert!(matches!(config.auth, AuthConfig::Token { .. }));
    assert_eq!(config.target, "https://github.com/acme/widgets");
    assert_eq!(config.vmctl_path.to_str(), Some("/usr/local/bin/vmctl"));

    let slot = &config.runners[0];
    assert_eq!(slot.base_vm_bundle_path.to_str(), Some("/vm/base.bundle"));
    assert_eq!(slot.vm_config_path.to_str(), Some("/vm/config.json"));
    assert_eq!(slot.runner_group.as_deref(), Some("macs"));
    assert_eq!(slot.labels, vec!["macos", "arm64"]);
}

#[test]
fn group_and_labels_are_optional() {
    let (_dir, path) = write_config(
        r#"{
            "auth": {"type": "Token", "token": "ghp_abc"},
            "target": "https://github.com/acme",
            "runners": [
                {"baseVMBundlePath": "/vm/base.bundle", "vmConfigPath": "/vm/config.json"}
            ],
            "vmctlPath": "/usr/local/bin/vmctl"
        }"#,
    );

    let config = Config::load(&path).unwrap();
    let slot = &config.runners[0];
    assert!(slot.runner_group.is_none());
    assert!(slot.labels.is_empty());
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(&dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn malformed_json_is_an_error() {
    let (_dir, path) = write_config("{not json");
    assert!(matches!(
        Config::load(&path).unwrap_err(),
        ConfigError::Parse(_)
    ));
}

#[test]
fn empty_runner_list_is_rejected() {
    let (_dir, path) = write_config(
        r#"{
            "auth": {"type": "Token", "token": "ghp_abc"},
            "target": "https://github.com/acme",
            "runners": [],
            "vmctlPath": "/usr/local/bin/vmctl"
        }"#,
    );
    assert!(matches!(
        Config::load(&path).unwrap_err(),
        ConfigError::NoRunners
    ));
}

#[test]
fn empty_vmctl_path_is_rejected() {
    let (_dir, path) = write_config(
        r#"{
            "auth": {"type": "Token", "token": "ghp_abc"},
            "target": "https://github.com/acme",
            "runners": [
                {"baseVMBundlePath": "/vm/base.bundle", "vmConfigPath": "/vm/config.json"}
            ],
            "vmctlPath": ""
        }"#,
    );
    assert!(matches!(
        Config::load(&path).unwrap_err(),
        ConfigError::NoVmctl
    ));
}
