// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use std::collections::HashSet;

fn slot() -> SlotConfig {
    SlotConfig {
        base_vm_bundle_path: "/vm/base.bundle".into(),
        vm_config_path: "/vm/config.json".into(),
        runner_group: None,
        labels: vec!["macos".to_string()],
    }
}

#[test]
fn instance_ids_are_monotonic() {
    let dir = tempfile::tempdir().unwrap();
    let (first, _rx1) = RunnerInstance::new(slot(), dir.path());
    let (second, _rx2) = RunnerInstance::new(slot(), dir.path());
    assert!(second.instance_id > first.instance_id);
}

#[test]
fn tokens_are_unique_and_carry_the_instance_id() {
    let dir = tempfile::tempdir().unwrap();
    let mut seen = HashSet::new();

    for _ in 0..32 {
        let (instance, _rx) = RunnerInstance::new(slot(), dir.path());
        let suffix = format!("-{}", instance.instance_id);
        assert!(instance.token.ends_with(&suffix));
        // 12 bytes of base64url ahead of the suffix.
        assert_eq!(instance.token.len(), 16 + suffix.len());
        assert!(seen.insert(instance.token.clone()));
    }
}

#[test]
fn work_paths_live_in_the_work_dir() {
    let dir = tempfile::tempdir().unwrap();
    let (instance, _rx) = RunnerInstance::new(slot(), dir.path());
    assert_eq!(instance.bundle_path, dir.path().join("vm.bundle"));
    assert_eq!(instance.config_path, dir.path().join("vm.json"));
}

#[tokio::test]
async fn post_delivers_to_the_inbox() {
    let dir = tempfile::tempdir().unwrap();
    let (instance, mut rx) = RunnerInstance::new(slot(), dir.path());

    assert!(
        instance
            .post(InstanceMsg::Update { runner_id: Some(7) })
            .await
    );
    assert_eq!(rx.recv().await, Some(InstanceMsg::Update { runner_id: Some(7) }));
}

#[tokio::test]
async fn post_fails_once_the_supervisor_is_gone() {
    let dir = tempfile::tempdir().unwrap();
    let (instance, rx) = RunnerInstance::new(slot(), dir.path());
    drop(rx);

    assert!(!instance.post(InstanceMsg::Update { runner_id: None }).await);
}

#[tokio::test]
async fn graceful_signal_does_not_kill() {
    let dir = tempfile::tempdir().unwrap();
    let (instance, _rx) = RunnerInstance::new(slot(), dir.path());

    instance.signal_terminate(false);
    assert!(instance.is_terminating());
    instance.terminated().await;

    // The kill signal has not fired.
    tokio::select! {
        _ = instance.killed() => panic!("graceful terminate must not trip kill"),
        _ = tokio::time::sleep(std::time::Duration::from_millis(10)) => {}
    }
}

#[tokio::test]
async fn kill_signal_trips_both_stages() {
    let dir = tempfile::tempdir().unwrap();
    let (instance, _rx) = RunnerInstance::new(slot(), dir.path());

    instance.signal_terminate(true);
    instance.terminated().await;
    instance.killed().await;
}

#[tokio::test]
async fn termination_escalates_but_never_reverts() {
    let dir = tempfile::tempdir().unwrap();
    let (instance, _rx) = RunnerInstance::new(slot(), dir.path());

    instance.signal_terminate(false);
    // A later kill-intent request escalates.
    instance.signal_terminate(true);
    instance.killed().await;

    // Repeat requests are no-ops.
    instance.signal_terminate(false);
    assert!(instance.is_terminating());
}
