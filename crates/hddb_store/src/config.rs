use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use hddb_core::{HdError, HdResult};

use crate::HdStore;

const DEFAULT_CONFIG_NAME: &str = "hddb.json";
const DEFAULT_GATEWAY_NAME: &str = "hddb.sqlite";
const DEFAULT_TENANTS_DIR: &str = "tenants";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite { path: Option<String> },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    pub connect_timeout_ms: Option<u64>,
    pub acquire_timeout_ms: Option<u64>,
    /// Emits every engine statement at debug level through `log`.
    pub sqlx_logging: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_insert_rows: Option<usize>,
    pub max_categories: Option<u64>,
    pub max_page_size: Option<u64>,
}

impl LimitsConfig {
    pub fn with_defaults() -> Self {
        Self {
            max_insert_rows: Some(500),
            max_categories: Some(100),
            max_page_size: Some(10_000),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HdConfig {
    pub database: DatabaseConfig,
    /// Directory holding one `<org>__<db>.sqlite` file per tenant database.
    pub tenants_dir: Option<String>,
    pub pool: Option<PoolConfig>,
    pub limits: Option<LimitsConfig>,
}

impl HdConfig {
    pub fn default_sqlite(path: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig::Sqlite {
                path: Some(path.into()),
            },
            tenants_dir: Some(DEFAULT_TENANTS_DIR.to_string()),
            pool: None,
            limits: Some(LimitsConfig::with_defaults()),
        }
    }

    pub fn load_or_init(base_dir: &Path, default_sqlite_path: &Path) -> HdResult<Self> {
        fs::create_dir_all(base_dir)
            .map_err(|err| HdError::connection(format!("create config dir: {err}")))?;
        let config_path = base_dir.join(DEFAULT_CONFIG_NAME);
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .map_err(|err| HdError::connection(format!("read config: {err}")))?;
            return serde_json::from_str(&raw)
                .map_err(|err| HdError::invalid(format!("parse {DEFAULT_CONFIG_NAME}: {err}")));
        }
        let default = HdConfig::default_sqlite(default_sqlite_path.to_string_lossy());
        let payload = serde_json::to_string_pretty(&default)
            .map_err(|err| HdError::invalid(format!("serialize config: {err}")))?;
        fs::write(&config_path, payload)
            .map_err(|err| HdError::connection(format!("write config: {err}")))?;
        Ok(default)
    }

    pub fn sqlite_path(&self, base_dir: &Path) -> PathBuf {
        let DatabaseConfig::Sqlite { path } = &self.database;
        resolve(
            base_dir,
            path.as_deref().unwrap_or(DEFAULT_GATEWAY_NAME),
        )
    }

    pub fn tenants_path(&self, base_dir: &Path) -> PathBuf {
        resolve(
            base_dir,
            self.tenants_dir.as_deref().unwrap_or(DEFAULT_TENANTS_DIR),
        )
    }

    pub fn backend_name(&self) -> &'static str {
        match self.database {
            DatabaseConfig::Sqlite { .. } => "sqlite",
        }
    }
}

fn resolve(base_dir: &Path, path: &str) -> PathBuf {
    let candidate = PathBuf::from(path);
    if candidate.is_absolute() {
        candidate
    } else {
        base_dir.join(candidate)
    }
}

/// Reads `hddb.json` under `base`, writing a default one with the gateway at
/// `base/hddb.sqlite` when absent.
pub fn load_or_init_config(base: &Path) -> HdResult<HdConfig> {
    HdConfig::load_or_init(base, &default_sqlite_path(base))
}

pub async fn open_store(base: &Path) -> HdResult<HdStore> {
    let config = load_or_init_config(base)?;
    HdStore::connect(&config, base).await
}

pub fn default_sqlite_path(base: &Path) -> PathBuf {
    base.join(DEFAULT_GATEWAY_NAME)
}
