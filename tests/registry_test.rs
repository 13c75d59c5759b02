use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use nimbus::core::connection::Connection;
use nimbus::core::registry::RoomRegistry;
use nimbus::error::NimbusError;
use nimbus::storage::{MemorySnapshotStore, NullSnapshotStore, SnapshotStore};

fn connection() -> Arc<Connection> {
    let (tx, _rx) = mpsc::unbounded_channel();
    Arc::new(Connection::new("127.0.0.1".to_string(), tx))
}

fn registry(store: Arc<dyn SnapshotStore>, max_rooms: usize, grace: Duration) -> RoomRegistry {
    RoomRegistry::new(store, max_rooms, 128, 128, grace)
}

fn test_variables() -> HashMap<String, String> {
    HashMap::from([("☁ foo".to_string(), "123".to_string())])
}

#[tokio::test]
async fn test_create_and_has() {
    let registry = registry(Arc::new(NullSnapshotStore), 16, Duration::from_secs(60));

    assert!(!registry.has("1234").await);
    registry.create("1234", &test_variables()).await.unwrap();
    assert!(registry.has("1234").await);
    assert!(!registry.has("12345").await);

    // Duplicate creation fails
    assert!(matches!(
        registry.create("1234", &test_variables()).await,
        Err(NimbusError::RoomExists(_))
    ));

    // Invalid variable names fail room creation
    let bad = HashMap::from([("foo".to_string(), "123".to_string())]);
    assert!(registry.create("9", &bad).await.is_err());
    assert!(!registry.has("9").await);
}

#[tokio::test]
async fn test_invalid_values_become_zero() {
    let registry = registry(Arc::new(NullSnapshotStore), 16, Duration::from_secs(60));
    let vars = HashMap::from([("☁ foo".to_string(), "abc".to_string())]);
    registry.create("1", &vars).await.unwrap();

    let value = registry
        .with_room("1", |room| room.get("☁ foo").map(str::to_string))
        .await
        .unwrap();
    assert_eq!(value.as_deref(), Some("0"));
}

#[tokio::test]
async fn test_max_rooms() {
    let registry = registry(Arc::new(NullSnapshotStore), 10, Duration::from_secs(60));

    for i in 0..10 {
        registry
            .create(&i.to_string(), &test_variables())
            .await
            .unwrap();
    }
    assert_eq!(registry.room_count().await, 10);
    assert!(matches!(
        registry.create("10000", &test_variables()).await,
        Err(NimbusError::TooManyRooms)
    ));
    assert_eq!(registry.room_count().await, 10);
}

#[tokio::test]
async fn test_remove() {
    let registry = registry(Arc::new(NullSnapshotStore), 16, Duration::from_secs(60));

    assert!(matches!(
        registry.remove("1").await,
        Err(NimbusError::RoomNotFound(_))
    ));

    registry.create("1", &test_variables()).await.unwrap();
    registry.remove("1").await.unwrap();
    assert!(!registry.has("1").await);

    // A room with members cannot be removed
    registry.create("2", &test_variables()).await.unwrap();
    let conn = connection();
    registry
        .update("2", |room| room.add_member(Arc::clone(&conn)))
        .await
        .unwrap();
    assert!(matches!(
        registry.remove("2").await,
        Err(NimbusError::RoomNotEmpty(_))
    ));
    registry.leave("2", &conn.id).await;
    registry.remove("2").await.unwrap();
    assert!(!registry.has("2").await);
}

#[tokio::test]
async fn test_janitor_respects_grace_period() {
    let registry = registry(Arc::new(NullSnapshotStore), 16, Duration::from_millis(40));

    registry.create("1", &test_variables()).await.unwrap();
    let conn = connection();
    registry
        .update("1", |room| room.add_member(Arc::clone(&conn)))
        .await
        .unwrap();

    // Occupied rooms survive no matter how old
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(registry.janitor_sweep().await, 0);
    assert!(registry.has("1").await);

    // A fresh disconnect starts the grace period; a young empty room survives
    registry.leave("1", &conn.id).await;
    assert_eq!(registry.janitor_sweep().await, 0);
    assert!(registry.has("1").await);

    // Past the grace period the room is reclaimed
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(registry.janitor_sweep().await, 1);
    assert!(!registry.has("1").await);
}

#[tokio::test]
async fn test_janitor_persists_final_snapshot() {
    let store = Arc::new(MemorySnapshotStore::new());
    let registry = registry(store.clone(), 16, Duration::from_millis(10));

    registry.create("1", &test_variables()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(registry.janitor_sweep().await, 1);

    let snapshot = store.get_snapshot("1").await.unwrap().unwrap();
    assert_eq!(snapshot.get("☁ foo").map(String::as_str), Some("123"));
}

#[tokio::test]
async fn test_autosave_persists_all_rooms() {
    let store = Arc::new(MemorySnapshotStore::new());
    let registry = registry(store.clone(), 16, Duration::from_secs(60));

    registry.create("1", &test_variables()).await.unwrap();
    registry.create("2", &test_variables()).await.unwrap();
    assert_eq!(registry.autosave_sweep().await, 2);
    assert_eq!(store.snapshot_count().await, 2);
}

#[tokio::test]
async fn test_create_hydrates_from_snapshot() {
    let store = Arc::new(MemorySnapshotStore::new());
    store
        .set_snapshot(
            "1",
            &HashMap::from([("☁ foo".to_string(), "999".to_string())]),
        )
        .await
        .unwrap();
    let registry = registry(store, 16, Duration::from_secs(60));

    // The client declares "123" but the stored value wins
    let hydrated = registry.create("1", &test_variables()).await.unwrap();
    assert!(hydrated);
    let value = registry
        .with_room("1", |room| room.get("☁ foo").map(str::to_string))
        .await
        .unwrap();
    assert_eq!(value.as_deref(), Some("999"));
}

#[tokio::test]
async fn test_leave_tolerates_vanished_rooms() {
    let registry = registry(Arc::new(NullSnapshotStore), 16, Duration::from_secs(60));
    // Benign race: the room was already reclaimed
    registry.leave("404", "no-such-connection").await;
}

#[tokio::test]
async fn test_stop_is_safe_without_start() {
    let registry = Arc::new(registry(
        Arc::new(NullSnapshotStore),
        16,
        Duration::from_secs(60),
    ));
    // Never started: stop is a no-op, and a double stop is fine too
    registry.stop();
    registry.stop();

    registry.start();
    registry.stop();
    registry.stop();
}
