mod catalog;
pub mod config;
mod db;
mod fetch;
mod schema_ops;
pub mod store;

pub use config::{
    default_sqlite_path, load_or_init_config, open_store, DatabaseConfig, HdConfig, LimitsConfig,
    PoolConfig,
};
pub use hddb_core::*;
pub use store::HdStore;
