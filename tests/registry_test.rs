//! Integration tests for pool registration, resolution and teardown.

use db_pack::config::PoolOptions;
use db_pack::db::PoolRegistry;
use db_pack::error::DbError;
use db_pack::models::{DbConfig, QueryParam};
use tempfile::TempDir;

fn sqlite_at(dir: &TempDir, name: &str) -> DbConfig {
    DbConfig::sqlite(dir.path().join(name).to_string_lossy().to_string())
}

#[tokio::test]
async fn test_equivalent_configs_share_one_pool() {
    let dir = TempDir::new().unwrap();
    let first = sqlite_at(&dir, "shared.db");
    // Separately built value with a different pool size, same canonical key
    let second = sqlite_at(&dir, "shared.db").with_pool_options(PoolOptions {
        max_connections: Some(4),
        ..Default::default()
    });

    let registry = PoolRegistry::new();
    registry.create_pool(&first).await;
    registry.create_pool(&second).await;
    assert_eq!(registry.internal_num_pools().await, 1);

    // The first registration wins
    let configs = registry.configs().await;
    assert_eq!(configs[0].pool_options.max_connections, None);

    registry.end_pools().await;
}

#[tokio::test]
async fn test_get_pool_returns_usable_handle() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_at(&dir, "usable.db");

    let registry = PoolRegistry::new();
    registry.create_pool(&config).await;

    let pool = registry.get_pool(Some(&config)).await.unwrap();
    pool.execute("CREATE TABLE kv (k TEXT PRIMARY KEY, v TEXT)", &[])
        .await
        .unwrap();
    pool.execute(
        "INSERT INTO kv (k, v) VALUES (?, ?)",
        &[QueryParam::from("answer"), QueryParam::from("42")],
    )
    .await
    .unwrap();

    // A fresh handle resolved through the registry sees the same database.
    let rows = registry
        .get_pool(Some(&config))
        .await
        .unwrap()
        .fetch_all("SELECT v FROM kv WHERE k = ?", &[QueryParam::from("answer")])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["v"], "42");

    registry.end_pools().await;
}

#[tokio::test]
async fn test_get_pool_unregistered_is_not_found() {
    let dir = TempDir::new().unwrap();
    let registry = PoolRegistry::new();
    registry.create_pool(&sqlite_at(&dir, "one.db")).await;

    let missing = DbConfig::postgres("db.internal", 5433, "reporter", "pw", "reports");
    let err = registry.get_pool(Some(&missing)).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "No matching pool found for reporter@db.internal:5433/reports"
    );
    assert!(!err.is_upstream());

    registry.end_pools().await;
}

#[tokio::test]
async fn test_implicit_resolution_by_entry_count() {
    let dir = TempDir::new().unwrap();
    let registry = PoolRegistry::new();

    assert!(matches!(
        registry.get_pool(None).await,
        Err(DbError::AmbiguousDefault { registered: 0 })
    ));

    registry.create_pool(&sqlite_at(&dir, "a.db")).await;
    assert!(registry.get_pool(None).await.is_ok());

    registry.create_pool(&sqlite_at(&dir, "b.db")).await;
    assert!(matches!(
        registry.get_pool(None).await,
        Err(DbError::AmbiguousDefault { registered: 2 })
    ));

    registry.set_default_config(sqlite_at(&dir, "b.db")).await;
    assert!(registry.get_pool(None).await.is_ok());

    registry.end_pools().await;
}

#[tokio::test]
async fn test_configs_differing_by_database_are_independent() {
    let dir = TempDir::new().unwrap();
    let left = sqlite_at(&dir, "left.db");
    let right = sqlite_at(&dir, "right.db");

    let registry = PoolRegistry::new();
    registry.create_pool(&left).await;
    registry.create_pool(&right).await;
    assert_eq!(registry.internal_num_pools().await, 2);

    let left_pool = registry.get_pool(Some(&left)).await.unwrap();
    let right_pool = registry.get_pool(Some(&right)).await.unwrap();
    left_pool
        .execute("CREATE TABLE only_left (id INTEGER)", &[])
        .await
        .unwrap();
    right_pool
        .execute("CREATE TABLE only_right (id INTEGER)", &[])
        .await
        .unwrap();

    registry.end_pool(&left).await.unwrap();
    assert_eq!(registry.internal_num_pools().await, 1);
    assert!(left_pool.is_closed());
    assert!(!right_pool.is_closed());
    assert!(!registry.contains(&left).await);

    // The surviving pool still serves queries and never saw the other table.
    let rows = registry
        .get_pool(Some(&right))
        .await
        .unwrap()
        .fetch_all(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
            &[],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "only_right");

    registry.end_pools().await;
}

#[tokio::test]
async fn test_end_pools_empties_registry() {
    let dir = TempDir::new().unwrap();
    let registry = PoolRegistry::new();
    for name in ["one.db", "two.db", "three.db"] {
        registry.create_pool(&sqlite_at(&dir, name)).await;
    }
    registry.create_pool(&DbConfig::postgres("localhost", 5432, "app", "", "lazy")).await;

    assert_eq!(registry.end_pools().await, 4);
    assert_eq!(registry.internal_num_pools().await, 0);
    assert!(registry.list_pools().await.is_empty());
}

#[tokio::test]
async fn test_registry_shared_across_tasks() {
    let dir = TempDir::new().unwrap();
    let registry = PoolRegistry::new();
    let config = sqlite_at(&dir, "tasks.db");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = registry.clone();
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            registry.create_pool(&config).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(registry.internal_num_pools().await, 1);
    registry.end_pools().await;
}
