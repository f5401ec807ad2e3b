use std::time::Duration;

use hddb_store::store::PINNED_CONNECTION_LIFETIME;
use hddb_store::{DatabaseConfig, HdConfig, LimitsConfig, PoolConfig};
use serde_json::json;
use tempfile::tempdir;

#[test]
fn deserializes_pool_and_limits() {
    let payload = json!({
        "database": { "backend": "sqlite", "path": "gateway.sqlite" },
        "tenants_dir": "orgs",
        "pool": {
            "connect_timeout_ms": 1000,
            "acquire_timeout_ms": 500,
            "sqlx_logging": true
        },
        "limits": {
            "max_insert_rows": 250,
            "max_categories": 20,
            "max_page_size": 1000
        }
    });
    let config: HdConfig = serde_json::from_value(payload).expect("config");
    let DatabaseConfig::Sqlite { path } = &config.database;
    assert_eq!(path.as_deref(), Some("gateway.sqlite"));
    assert_eq!(config.tenants_dir.as_deref(), Some("orgs"));
    let pool = config.pool.expect("pool");
    assert_eq!(pool.connect_timeout_ms, Some(1000));
    assert_eq!(pool.acquire_timeout_ms, Some(500));
    assert_eq!(pool.sqlx_logging, Some(true));
    let limits = config.limits.expect("limits");
    assert_eq!(limits.max_insert_rows, Some(250));
    assert_eq!(limits.max_categories, Some(20));
    assert_eq!(limits.max_page_size, Some(1000));
}

#[test]
fn default_sqlite_sets_limits_but_no_pool() {
    let config = HdConfig::default_sqlite("hddb.sqlite");
    assert!(config.pool.is_none());
    let limits = config.limits.expect("limits");
    assert_eq!(limits.max_insert_rows, Some(500));
    assert_eq!(limits.max_categories, Some(100));
    assert_eq!(limits.max_page_size, Some(10_000));
}

#[test]
fn relative_paths_resolve_against_base() {
    let dir = tempdir().expect("tempdir");
    let config = HdConfig {
        database: DatabaseConfig::Sqlite { path: None },
        tenants_dir: None,
        pool: Some(PoolConfig::default()),
        limits: Some(LimitsConfig::with_defaults()),
    };
    assert_eq!(config.sqlite_path(dir.path()), dir.path().join("hddb.sqlite"));
    assert_eq!(config.tenants_path(dir.path()), dir.path().join("tenants"));

    let absolute = dir.path().join("elsewhere").join("db.sqlite");
    let config = HdConfig::default_sqlite(absolute.to_string_lossy());
    assert_eq!(config.sqlite_path(std::path::Path::new("/ignored")), absolute);
}

#[test]
fn load_or_init_writes_and_rereads_config() {
    let dir = tempdir().expect("tempdir");
    let default_path = dir.path().join("hddb.sqlite");
    let first = HdConfig::load_or_init(dir.path(), &default_path).expect("init");
    assert!(dir.path().join("hddb.json").exists());

    std::fs::write(
        dir.path().join("hddb.json"),
        r#"{"database":{"backend":"sqlite","path":"custom.sqlite"}}"#,
    )
    .expect("write");
    let second = HdConfig::load_or_init(dir.path(), &default_path).expect("reload");
    assert_eq!(second.sqlite_path(dir.path()), dir.path().join("custom.sqlite"));
    assert!(second.limits.is_none());
    assert_eq!(first.backend_name(), second.backend_name());

    std::fs::write(dir.path().join("hddb.json"), "{ not json").expect("write");
    assert!(HdConfig::load_or_init(dir.path(), &default_path).is_err());
}

#[test]
fn pinned_connection_is_never_recycled_in_practice() {
    // sqlx reaps idle connections after 10 minutes and retires them after 30.
    assert!(PINNED_CONNECTION_LIFETIME >= Duration::from_secs(24 * 60 * 60));
}
