//! Integration tests for the sync coordinator.
//!
//! These run against the real filesystem watcher, so every wait is bounded
//! by a timeout instead of relying on exact event timing.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

use taskwatch_repo_sync::{
    AddOutcome, ChangeKind, ChannelBroadcaster, RejectReason, RemoveOutcome, SyncConfig,
    SyncCoordinator, SyncEvent, SyncMessage,
};

const TRACKED_FILE: &str = ".taskmaster/tasks/tasks.json";

/// A temporary repository containing a tracked file.
fn repository(content: &Value) -> TempDir {
    let dir = TempDir::new().unwrap();
    let tracked = dir.path().join(TRACKED_FILE);
    std::fs::create_dir_all(tracked.parent().unwrap()).unwrap();
    std::fs::write(&tracked, serde_json::to_vec(content).unwrap()).unwrap();
    dir
}

fn tracked_path(repo: &Path) -> PathBuf {
    repo.join(TRACKED_FILE)
}

async fn started(
    config: SyncConfig,
) -> (
    SyncCoordinator,
    Arc<ChannelBroadcaster>,
    broadcast::Receiver<SyncMessage>,
) {
    let broadcaster = Arc::new(ChannelBroadcaster::new(64));
    let rx = broadcaster.subscribe();
    let coordinator = SyncCoordinator::new(config, broadcaster.clone());
    coordinator.initialize().await.unwrap();
    (coordinator, broadcaster, rx)
}

async fn next_message(rx: &mut broadcast::Receiver<SyncMessage>) -> SyncMessage {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a sync message")
        .unwrap()
}

/// Skip messages until a `TASKS_UPDATED` of `kind` arrives.
async fn next_update_of(
    rx: &mut broadcast::Receiver<SyncMessage>,
    kind: ChangeKind,
) -> SyncMessage {
    loop {
        let message = next_message(rx).await;
        if message
            .tasks_updated_payload()
            .is_some_and(|payload| payload.change_type == kind)
        {
            return message;
        }
    }
}

/// Assert nothing arrives for `wait`.
async fn assert_quiet(rx: &mut broadcast::Receiver<SyncMessage>, wait: Duration) {
    if let Ok(message) = timeout(wait, rx.recv()).await {
        panic!("unexpected message: {message:?}");
    }
}

#[tokio::test]
async fn test_add_change_remove_scenario() {
    let repo = repository(&json!({"tasks": []}));
    let (coordinator, _broadcaster, mut rx) =
        started(SyncConfig::new().with_debounce_ms(50)).await;

    let outcome = coordinator.add_repository(repo.path()).await.unwrap();
    assert_eq!(outcome, AddOutcome::Added { watching: true });

    let added = next_message(&mut rx).await;
    assert_eq!(added.event, SyncEvent::RepositoryAdded);
    assert_eq!(added.repository_path, repo.path().to_string_lossy());

    let updated_content = json!({"tasks": [{"id": 1, "title": "Ship it"}]});
    std::fs::write(
        tracked_path(repo.path()),
        serde_json::to_vec(&updated_content).unwrap(),
    )
    .unwrap();

    let updated = next_message(&mut rx).await;
    assert_eq!(updated.event, SyncEvent::TasksUpdated);
    let payload = updated.tasks_updated_payload().unwrap();
    assert_eq!(payload.change_type, ChangeKind::Changed);
    assert_eq!(payload.content, Some(updated_content));
    assert_eq!(
        serde_json::to_value(&updated).unwrap()["payload"]["changeType"],
        "change"
    );

    let removed = coordinator.remove_repository(repo.path()).await.unwrap();
    assert_eq!(removed, RemoveOutcome::Removed);

    let message = next_message(&mut rx).await;
    assert_eq!(message.event, SyncEvent::RepositoryRemoved);
    assert_eq!(message.repository_path, repo.path().to_string_lossy());
    assert!(coordinator.monitored_repositories().await.is_empty());

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_capacity_is_enforced() {
    let first = repository(&json!({}));
    let second = repository(&json!({}));
    let (coordinator, _broadcaster, mut rx) =
        started(SyncConfig::new().with_max_repositories(1)).await;

    coordinator.add_repository(first.path()).await.unwrap();
    let outcome = coordinator.add_repository(second.path()).await.unwrap();

    assert_eq!(
        outcome,
        AddOutcome::Rejected {
            reason: RejectReason::CapacityExceeded {
                max_repositories: 1
            }
        }
    );
    assert_eq!(
        coordinator.monitored_repositories().await,
        vec![first.path().to_path_buf()]
    );
    assert!(!coordinator.is_monitoring(second.path()).await);

    // Only the accepted repository was announced.
    assert_eq!(next_message(&mut rx).await.event, SyncEvent::RepositoryAdded);
    assert!(matches!(
        rx.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_burst_of_writes_emits_one_update() {
    let repo = repository(&json!({"version": 0}));
    let (coordinator, _broadcaster, mut rx) =
        started(SyncConfig::new().with_debounce_ms(200)).await;

    coordinator.add_repository(repo.path()).await.unwrap();
    assert_eq!(next_message(&mut rx).await.event, SyncEvent::RepositoryAdded);

    for version in 1..=5 {
        std::fs::write(
            tracked_path(repo.path()),
            serde_json::to_vec(&json!({"version": version})).unwrap(),
        )
        .unwrap();
        sleep(Duration::from_millis(10)).await;
    }

    let updated = next_message(&mut rx).await;
    assert_eq!(updated.event, SyncEvent::TasksUpdated);
    assert_eq!(
        updated.tasks_updated_payload().unwrap().content,
        Some(json!({"version": 5}))
    );
    assert_quiet(&mut rx, Duration::from_millis(500)).await;

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_removal_cancels_in_flight_update() {
    let repo = repository(&json!({"tasks": []}));
    let (coordinator, _broadcaster, mut rx) =
        started(SyncConfig::new().with_debounce_ms(300)).await;

    coordinator.add_repository(repo.path()).await.unwrap();
    assert_eq!(next_message(&mut rx).await.event, SyncEvent::RepositoryAdded);

    std::fs::write(tracked_path(repo.path()), b"{\"tasks\": [1]}").unwrap();
    sleep(Duration::from_millis(50)).await;
    coordinator.remove_repository(repo.path()).await.unwrap();

    assert_eq!(
        next_message(&mut rx).await.event,
        SyncEvent::RepositoryRemoved
    );
    assert_quiet(&mut rx, Duration::from_millis(600)).await;

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_invalid_json_omits_content() {
    let repo = repository(&json!({"tasks": []}));
    let (coordinator, _broadcaster, mut rx) =
        started(SyncConfig::new().with_debounce_ms(50)).await;

    coordinator.add_repository(repo.path()).await.unwrap();
    assert_eq!(next_message(&mut rx).await.event, SyncEvent::RepositoryAdded);

    std::fs::write(tracked_path(repo.path()), b"{ not json").unwrap();

    let updated = next_message(&mut rx).await;
    assert_eq!(updated.event, SyncEvent::TasksUpdated);
    assert_eq!(updated.tasks_updated_payload().unwrap().content, None);
    assert!(
        serde_json::to_value(&updated).unwrap()["payload"]
            .get("content")
            .is_none()
    );

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_re_add_is_not_announced_twice() {
    let repo = repository(&json!({}));
    let (coordinator, _broadcaster, mut rx) = started(SyncConfig::default()).await;

    coordinator.add_repository(repo.path()).await.unwrap();
    let again = coordinator.add_repository(repo.path()).await.unwrap();

    assert_eq!(again, AddOutcome::AlreadyMonitored);
    assert_eq!(next_message(&mut rx).await.event, SyncEvent::RepositoryAdded);
    assert!(matches!(
        rx.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
    assert_eq!(coordinator.stats().await.watcher_stats.watched_count, 1);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_recreated_tracked_file_is_reported_as_add() {
    let repo = repository(&json!({"tasks": []}));
    let (coordinator, _broadcaster, mut rx) =
        started(SyncConfig::new().with_debounce_ms(50)).await;

    coordinator.add_repository(repo.path()).await.unwrap();
    assert_eq!(next_message(&mut rx).await.event, SyncEvent::RepositoryAdded);

    std::fs::remove_file(tracked_path(repo.path())).unwrap();
    next_update_of(&mut rx, ChangeKind::Removed).await;

    let recreated = json!({"tasks": [{"id": 2, "title": "Recreated"}]});
    std::fs::write(
        tracked_path(repo.path()),
        serde_json::to_vec(&recreated).unwrap(),
    )
    .unwrap();

    let added = next_update_of(&mut rx, ChangeKind::Added).await;
    assert_eq!(added.tasks_updated_payload().unwrap().content, Some(recreated));
    assert_eq!(
        serde_json::to_value(&added).unwrap()["payload"]["changeType"],
        "add"
    );

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_removed_tasks_directory_is_reported_as_error() {
    let repo = repository(&json!({"tasks": []}));
    let (coordinator, _broadcaster, mut rx) =
        started(SyncConfig::new().with_debounce_ms(50)).await;

    coordinator.add_repository(repo.path()).await.unwrap();
    assert_eq!(next_message(&mut rx).await.event, SyncEvent::RepositoryAdded);

    std::fs::remove_dir_all(repo.path().join(".taskmaster/tasks")).unwrap();

    let error = loop {
        let message = next_message(&mut rx).await;
        if message.event == SyncEvent::TasksError {
            break message;
        }
    };
    assert_eq!(error.repository_path, repo.path().to_string_lossy());

    let stats = coordinator.stats().await;
    assert_eq!(stats.monitored_repositories, 1);
    assert_eq!(stats.watcher_stats.active_watcher_count, 0);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_trailing_separator_names_the_same_repository() {
    let repo = repository(&json!({}));
    let (coordinator, _broadcaster, _rx) =
        started(SyncConfig::new().with_max_repositories(1)).await;

    coordinator.add_repository(repo.path()).await.unwrap();
    let with_separator = PathBuf::from(format!("{}/", repo.path().display()));
    let again = coordinator.add_repository(&with_separator).await.unwrap();

    assert_eq!(again, AddOutcome::AlreadyMonitored);
    assert!(coordinator.is_monitoring(&with_separator).await);
    assert_eq!(coordinator.monitored_repositories().await.len(), 1);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_missing_tracked_file_is_registered_without_watch() {
    let repo = TempDir::new().unwrap();
    let (coordinator, _broadcaster, mut rx) = started(SyncConfig::default()).await;

    let outcome = coordinator.add_repository(repo.path()).await.unwrap();

    assert_eq!(outcome, AddOutcome::Added { watching: false });
    assert!(coordinator.is_monitoring(repo.path()).await);
    assert_eq!(next_message(&mut rx).await.event, SyncEvent::RepositoryAdded);
    assert_eq!(coordinator.stats().await.watcher_stats.watched_count, 0);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_removes_every_repository() {
    let first = repository(&json!({}));
    let second = repository(&json!({}));
    let (coordinator, _broadcaster, mut rx) = started(SyncConfig::default()).await;

    coordinator.add_repository(first.path()).await.unwrap();
    coordinator.add_repository(second.path()).await.unwrap();
    next_message(&mut rx).await;
    next_message(&mut rx).await;

    coordinator.shutdown().await;

    let mut removed = Vec::new();
    for _ in 0..2 {
        let message = next_message(&mut rx).await;
        assert_eq!(message.event, SyncEvent::RepositoryRemoved);
        removed.push(message.repository_path);
    }
    assert_eq!(
        removed,
        vec![
            first.path().to_string_lossy().into_owned(),
            second.path().to_string_lossy().into_owned(),
        ]
    );

    let stats = coordinator.stats().await;
    assert!(!stats.is_initialized);
    assert_eq!(stats.monitored_repositories, 0);
    assert_eq!(
        coordinator.remove_repository(first.path()).await.unwrap(),
        RemoveOutcome::NotMonitored
    );
}

#[tokio::test]
async fn test_connected_clients_is_live() {
    let (coordinator, broadcaster, rx) = started(SyncConfig::default()).await;
    assert_eq!(coordinator.stats().await.connected_clients, 1);

    let second = broadcaster.subscribe();
    assert_eq!(coordinator.stats().await.connected_clients, 2);

    drop(rx);
    drop(second);
    assert_eq!(coordinator.stats().await.connected_clients, 0);

    coordinator.shutdown().await;
}
