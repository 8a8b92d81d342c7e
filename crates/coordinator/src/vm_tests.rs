// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn mac_address_is_local_unicast() {
    for _ in 0..64 {
        let mac = generate_mac_address();
        let first = u8::from_str_radix(&mac[0..2], 16).unwrap();

        // Multicast bit cleared, locally-administered bit set.
        assert_eq!(first & 0x01, 0, "multicast bit set in {mac}");
        assert_eq!(first & 0x02, 0x02, "local bit missing in {mac}");
    }
}

#[test]
fn mac_address_is_colon_hex() {
    let mac = generate_mac_address();
    let parts: Vec<&str> = mac.split(':').collect();
    assert_eq!(parts.len(), 6);
    for part in parts {
        assert_eq!(part.len(), 2);
        assert!(u8::from_str_radix(part, 16).is_ok());
    }
}

#[test]
fn prepare_config_injects_mac_address() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.json");
    let dest = dir.path().join("vm.json");
    std::fs::write(&base, r#"{"cpuCount": 4, "memorySize": 8589934592}"#).unwrap();

    prepare_config(&base, &dest, "02:11:22:33:44:55").unwrap();

    let written: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&dest).unwrap()).unwrap();
    assert_eq!(written["macAddress"], "02:11:22:33:44:55");
    assert_eq!(written["cpuCount"], 4);
    assert_eq!(written["memorySize"], 8589934592u64);
}

#[test]
fn prepare_config_overwrites_existing_mac() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.json");
    let dest = dir.path().join("vm.json");
    std::fs::write(&base, r#"{"macAddress": "aa:bb:cc:dd:ee:ff"}"#).unwrap();

    prepare_config(&base, &dest, "02:11:22:33:44:55").unwrap();

    let written: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&dest).unwrap()).unwrap();
    assert_eq!(written["macAddress"], "02:11:22:33:44:55");
}

#[test]
fn prepare_config_rejects_missing_base() {
    let dir = tempfile::tempdir().unwrap();
    let err = prepare_config(
        &dir.path().join("nope.json"),
        &dir.path().join("vm.json"),
        "02:11:22:33:44:55",
    )
    .unwrap_err();
    assert!(matches!(err, VmError::ReadConfig { .. }));
}

#[yare::parameterized(
    not_json = { "{oops" },
    array = { "[1, 2]" },
)]
fn prepare_config_rejects_bad_base(contents: &str) {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.json");
    std::fs::write(&base, contents).unwrap();

    let err = prepare_config(&base, &dir.path().join("vm.json"), "02:11:22:33:44:55").unwrap_err();
    assert!(matches!(
        err,
        VmError::ParseConfig { .. } | VmError::NotAnObject { .. }
    ));
}

#[tokio::test]
async fn clone_bundle_surfaces_nonzero_exit() {
    // `false` ignores its arguments and exits 1.
    let vmctl = Vmctl::new("false");
    let err = vmctl
        .clone_bundle("/tmp/base".as_ref(), "/tmp/dest".as_ref())
        .await
        .unwrap_err();
    assert!(matches!(err, VmError::CommandFailed { verb: "clone", .. }));
}

#[tokio::test]
async fn clone_bundle_surfaces_missing_binary() {
    let vmctl = Vmctl::new("/nonexistent/vmctl");
    let err = vmctl
        .clone_bundle("/tmp/base".as_ref(), "/tmp/dest".as_ref())
        .await
        .unwrap_err();
    assert!(matches!(err, VmError::CommandFailed { verb: "clone", .. }));
}

#[tokio::test]
async fn clone_bundle_succeeds_on_zero_exit() {
    let vmctl = Vmctl::new("true");
    vmctl
        .clone_bundle("/tmp/base".as_ref(), "/tmp/dest".as_ref())
        .await
        .unwrap();
}

#[tokio::test]
async fn start_surfaces_missing_binary() {
    let vmctl = Vmctl::new("/nonexistent/vmctl");
    let err = vmctl
        .start("/tmp/vm.json".as_ref(), "/tmp/vm.bundle".as_ref())
        .unwrap_err();
    assert!(matches!(err, VmError::CommandFailed { verb: "start", .. }));
}
