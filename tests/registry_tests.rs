use std::time::Duration;

use tokio::sync::mpsc;

use rollgate::child::{ChildExit, ChildHandle};
use rollgate::proxy::backends::{backend_url, BackendSet};
use rollgate::registry::ChildRegistry;

/// Spawn a real child that just sleeps, so kill semantics are exercised for
/// real.
fn sleeper(port: u16, id: &str, exit_tx: &mpsc::Sender<ChildExit>) -> ChildHandle {
    ChildHandle::spawn("sleep 30", port, id, "/heathz", exit_tx.clone()).unwrap()
}

#[tokio::test]
async fn select_slot_prefers_first_free_port() {
    let backends = BackendSet::new();
    let mut registry = ChildRegistry::new(9301, 9302);

    assert_eq!(registry.select_slot("", &backends).await, 9301);
}

#[tokio::test]
async fn select_slot_takes_second_port_when_first_occupied() {
    let (exit_tx, _exit_rx) = mpsc::channel(16);
    let backends = BackendSet::new();
    let mut registry = ChildRegistry::new(9303, 9304);
    registry.insert(sleeper(9303, "someid", &exit_tx));

    assert_eq!(registry.select_slot("", &backends).await, 9304);

    registry.kill_all();
}

#[tokio::test]
async fn select_slot_frees_the_outdated_child() {
    let (exit_tx, _exit_rx) = mpsc::channel(16);
    let backends = BackendSet::new();
    let mut registry = ChildRegistry::new(9305, 9306);

    let old = sleeper(9305, "old", &exit_tx);
    let old_pid = old.pid().unwrap();
    registry.insert(old);
    registry.insert(sleeper(9306, "current", &exit_tx));
    backends.upsert(9305, backend_url(9305)).await;
    backends.upsert(9306, backend_url(9306)).await;

    assert_eq!(registry.select_slot("current", &backends).await, 9305);

    assert!(registry.get(9305).is_none());
    assert_eq!(backends.ports().await, vec![9306]);

    // The freed child was really killed.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(nix::sys::signal::kill(nix::unistd::Pid::from_raw(old_pid), None).is_err());

    registry.kill_all();
}

#[tokio::test]
async fn select_slot_tests_first_port_before_second() {
    let (exit_tx, _exit_rx) = mpsc::channel(16);
    let backends = BackendSet::new();
    let mut registry = ChildRegistry::new(9307, 9308);
    registry.insert(sleeper(9307, "current", &exit_tx));
    registry.insert(sleeper(9308, "old", &exit_tx));

    assert_eq!(registry.select_slot("current", &backends).await, 9308);
    assert!(registry.get(9307).is_some());

    registry.kill_all();
}

#[tokio::test]
async fn select_slot_breaks_ties_on_first_port() {
    let (exit_tx, _exit_rx) = mpsc::channel(16);
    let backends = BackendSet::new();
    let mut registry = ChildRegistry::new(9309, 9310);
    registry.insert(sleeper(9309, "current", &exit_tx));
    registry.insert(sleeper(9310, "current", &exit_tx));

    assert_eq!(registry.select_slot("current", &backends).await, 9309);
    assert!(registry.get(9309).is_none());
    assert!(registry.get(9310).is_some());

    registry.kill_all();
}

#[tokio::test]
async fn retire_stale_drops_the_outdated_child() {
    let (exit_tx, _exit_rx) = mpsc::channel(16);
    let backends = BackendSet::new();
    let mut registry = ChildRegistry::new(9311, 9312);
    registry.insert(sleeper(9311, "v1", &exit_tx));
    registry.insert(sleeper(9312, "v2", &exit_tx));
    backends.upsert(9311, backend_url(9311)).await;
    backends.upsert(9312, backend_url(9312)).await;

    registry.retire_stale("v2", 9312, &backends).await;

    assert!(registry.get(9311).is_none());
    assert!(registry.get(9312).is_some());
    assert_eq!(backends.ports().await, vec![9312]);

    registry.kill_all();
}

#[tokio::test]
async fn retire_stale_drops_a_supplanted_same_id_child() {
    let (exit_tx, _exit_rx) = mpsc::channel(16);
    let backends = BackendSet::new();
    let mut registry = ChildRegistry::new(9316, 9317);
    registry.insert(sleeper(9316, "v1", &exit_tx));
    registry.insert(sleeper(9317, "v1", &exit_tx));
    backends.upsert(9316, backend_url(9316)).await;
    backends.upsert(9317, backend_url(9317)).await;

    // Forced update of an unchanged artifact: the new child on 9317 replaces
    // the old one even though the ids match.
    registry.retire_stale("v1", 9317, &backends).await;

    assert!(registry.get(9316).is_none());
    assert!(registry.get(9317).is_some());
    assert_eq!(backends.ports().await, vec![9317]);

    registry.kill_all();
}

#[tokio::test]
async fn remove_exited_requires_matching_pid() {
    let (exit_tx, _exit_rx) = mpsc::channel(16);
    let backends = BackendSet::new();
    let mut registry = ChildRegistry::new(9313, 9314);

    let child = sleeper(9313, "v1", &exit_tx);
    let pid = child.pid().unwrap();
    registry.insert(child);
    backends.upsert(9313, backend_url(9313)).await;

    // Wrong pid: the slot has been re-occupied since that exit happened.
    assert!(registry.remove_exited(9313, pid + 1, &backends).await.is_none());
    assert!(registry.get(9313).is_some());
    assert_eq!(backends.len().await, 1);

    let removed = registry.remove_exited(9313, pid, &backends).await;
    assert_eq!(removed.unwrap().id, "v1");
    assert!(registry.is_empty());
    assert!(backends.is_empty().await);

    registry.kill_all();
}

#[tokio::test]
async fn reaper_reports_killed_child() {
    let (exit_tx, mut exit_rx) = mpsc::channel(16);

    let child = sleeper(9315, "v1", &exit_tx);
    let pid = child.pid().unwrap();
    child.kill();

    let exit = tokio::time::timeout(Duration::from_secs(5), exit_rx.recv())
        .await
        .expect("no exit event within 5s")
        .unwrap();
    assert_eq!(exit, ChildExit { port: 9315, pid });
}
