use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sea_orm::sea_query::{Alias, IntoTableRef, TableRef};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection,
    DatabaseTransaction, QueryResult, Statement, StatementBuilder, TransactionTrait,
    Value as SeaValue,
};

use hddb_core::{quote_ident, DatabaseKey, ErrorContext, HdError, HdResult};

use crate::config::{HdConfig, LimitsConfig};

/// Upper bound on bound parameters per statement, below SQLite's 32766 default.
const MAX_BOUND_PARAMS: usize = 32_000;

/// Idle timeout and max lifetime of the pinned gateway connection.
pub const PINNED_CONNECTION_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Sidecar files SQLite may leave next to a tenant database.
const TENANT_SIDECARS: [&str; 3] = ["-journal", "-wal", "-shm"];

#[derive(Clone, Copy, Debug)]
pub(crate) struct HdLimits {
    pub max_insert_rows: usize,
    pub max_categories: u64,
    pub max_page_size: u64,
}

impl HdLimits {
    fn from_config(config: &HdConfig) -> Self {
        let defaults = LimitsConfig::with_defaults();
        let limits = config.limits.clone().unwrap_or_else(LimitsConfig::with_defaults);
        Self {
            max_insert_rows: limits
                .max_insert_rows
                .or(defaults.max_insert_rows)
                .unwrap_or(500)
                .max(1),
            max_categories: limits
                .max_categories
                .or(defaults.max_categories)
                .unwrap_or(100),
            max_page_size: limits
                .max_page_size
                .or(defaults.max_page_size)
                .unwrap_or(10_000),
        }
    }

    /// Rows per INSERT so that `rows * columns` stays under the parameter limit.
    pub fn insert_chunk(&self, ncols: usize) -> usize {
        self.max_insert_rows
            .min(MAX_BOUND_PARAMS / ncols.max(1))
            .max(1)
    }
}

/// Gateway connection with every tenant database ATTACHed under its
/// `org__db` schema name.
#[derive(Clone)]
pub struct HdStore {
    conn: DatabaseConnection,
    backend: DatabaseBackend,
    tenants_dir: PathBuf,
    pub(crate) limits: HdLimits,
}

impl HdStore {
    pub async fn connect(config: &HdConfig, base_dir: &Path) -> HdResult<Self> {
        let path = config.sqlite_path(base_dir);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| HdError::connection(format!("create data dir: {err}")))?;
        }
        let tenants_dir = config.tenants_path(base_dir);
        fs::create_dir_all(&tenants_dir)
            .map_err(|err| HdError::connection(format!("create tenants dir: {err}")))?;

        let mut options = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
        // ATTACH is per connection, so the pool holds exactly one and never recycles it.
        options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(PINNED_CONNECTION_LIFETIME)
            .max_lifetime(PINNED_CONNECTION_LIFETIME);
        let mut sqlx_logging = false;
        if let Some(pool) = &config.pool {
            if let Some(timeout_ms) = pool.connect_timeout_ms {
                options.connect_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.acquire_timeout_ms {
                options.acquire_timeout(Duration::from_millis(timeout_ms));
            }
            sqlx_logging = pool.sqlx_logging.unwrap_or(false);
        }
        options
            .sqlx_logging(sqlx_logging)
            .sqlx_logging_level(log::LevelFilter::Debug);

        let conn = Database::connect(options)
            .await
            .map_err(|err| HdError::connection(format!("open {}: {err}", path.display())))?;
        let backend = conn.get_database_backend();
        log::info!(
            "hddb: gateway open at {} (tenants in {})",
            path.display(),
            tenants_dir.display()
        );
        Ok(Self {
            conn,
            backend,
            tenants_dir,
            limits: HdLimits::from_config(config),
        })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub fn tenant_path(&self, key: &DatabaseKey) -> PathBuf {
        self.tenants_dir.join(format!("{}.sqlite", key.schema_name()))
    }

    /// Runs one statement outside any transaction; returns rows affected.
    pub async fn execute(&self, sql: &str, values: Vec<SeaValue>) -> HdResult<u64> {
        exec_statement(
            &self.conn,
            Statement::from_sql_and_values(self.backend, sql, values),
        )
        .await
    }

    pub async fn query(&self, sql: &str, values: Vec<SeaValue>) -> HdResult<Vec<QueryResult>> {
        query_statement(
            &self.conn,
            Statement::from_sql_and_values(self.backend, sql, values),
        )
        .await
    }

    pub async fn is_attached(&self, key: &DatabaseKey) -> HdResult<bool> {
        let rows = self
            .query(
                "SELECT name FROM pragma_database_list WHERE name = ?",
                vec![key.schema_name().into()],
            )
            .await?;
        Ok(!rows.is_empty())
    }

    /// ATTACHes the tenant file, creating it when missing. No-op when already attached.
    pub async fn attach(&self, key: &DatabaseKey) -> HdResult<()> {
        if self.is_attached(key).await? {
            return Ok(());
        }
        let path = self.tenant_path(key);
        let sql = format!("ATTACH DATABASE ? AS {}", quote_ident(&key.schema_name()));
        self.execute(&sql, vec![path.to_string_lossy().into_owned().into()])
            .await
            .map_err(|err| {
                HdError::connection(format!("attach {}: {err}", path.display()))
            })?;
        log::debug!("hddb: attached {key} from {}", path.display());
        Ok(())
    }

    pub async fn detach(&self, key: &DatabaseKey) -> HdResult<()> {
        if !self.is_attached(key).await? {
            return Ok(());
        }
        let sql = format!("DETACH DATABASE {}", quote_ident(&key.schema_name()));
        self.execute(&sql, Vec::new()).await?;
        log::debug!("hddb: detached {key}");
        Ok(())
    }

    pub async fn close(self) -> HdResult<()> {
        self.conn.close().await.map_err(HdError::from)
    }

    /// Precondition of every tenant operation: the database exists and is attached.
    pub(crate) async fn ensure_attached(&self, key: &DatabaseKey) -> HdResult<()> {
        if self.is_attached(key).await? {
            return Ok(());
        }
        if !self.tenant_path(key).exists() {
            return Err(HdError::not_found(format!("database {key} does not exist")));
        }
        self.attach(key).await
    }

    /// Creates an empty tenant file; fails if the database already exists.
    pub(crate) fn create_tenant_file(&self, key: &DatabaseKey) -> HdResult<()> {
        let path = self.tenant_path(key);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Err(
                HdError::invalid(format!("database {key} already exists")),
            ),
            Err(err) => Err(HdError::connection(format!(
                "create {}: {err}",
                path.display()
            ))),
        }
    }

    pub(crate) fn remove_tenant_file(&self, key: &DatabaseKey) -> HdResult<()> {
        let path = self.tenant_path(key);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(HdError::not_found(format!("database {key} does not exist")));
            }
            Err(err) => {
                return Err(HdError::connection(format!(
                    "remove {}: {err}",
                    path.display()
                )));
            }
        }
        for suffix in TENANT_SIDECARS {
            let mut sidecar = path.clone().into_os_string();
            sidecar.push(suffix);
            let sidecar = PathBuf::from(sidecar);
            if sidecar.exists() {
                fs::remove_file(&sidecar).map_err(|err| {
                    HdError::connection(format!("remove {}: {err}", sidecar.display()))
                })?;
            }
        }
        Ok(())
    }

    pub(crate) async fn begin(&self, ctx: &ErrorContext) -> HdResult<DatabaseTransaction> {
        self.conn.begin().await.map_err(|err| {
            HdError::transaction(format!("begin failed: {err}")).with_context(ctx)
        })
    }

    /// Commits on success; otherwise rolls back and returns the original error.
    pub(crate) async fn finish<T>(
        &self,
        tx: DatabaseTransaction,
        outcome: HdResult<T>,
        ctx: &ErrorContext,
    ) -> HdResult<T> {
        match outcome {
            Ok(value) => {
                tx.commit().await.map_err(|err| {
                    HdError::transaction(format!("commit failed: {err}")).with_context(ctx)
                })?;
                Ok(value)
            }
            Err(err) => {
                log::warn!("hddb: rolling back{ctx}: {err}");
                if let Err(rollback) = tx.rollback().await {
                    log::warn!("hddb: rollback failed{ctx}: {rollback}");
                    return Err(HdError::transaction(format!(
                        "rollback failed: {rollback}; original error: {err}"
                    ))
                    .with_context(ctx));
                }
                Err(err.with_context(ctx))
            }
        }
    }
}

pub(crate) fn scoped<T>(schema: &str, table: T) -> TableRef
where
    T: sea_orm::sea_query::IntoIden + 'static,
{
    (Alias::new(schema), table).into_table_ref()
}

pub(crate) async fn exec<C, S>(conn: &C, stmt: &S) -> HdResult<u64>
where
    C: ConnectionTrait,
    S: StatementBuilder,
{
    let statement = conn.get_database_backend().build(stmt);
    exec_statement(conn, statement).await
}

pub(crate) async fn exec_sql<C>(conn: &C, sql: String) -> HdResult<u64>
where
    C: ConnectionTrait,
{
    let statement = Statement::from_string(conn.get_database_backend(), sql);
    exec_statement(conn, statement).await
}

pub(crate) async fn exec_statement<C>(conn: &C, statement: Statement) -> HdResult<u64>
where
    C: ConnectionTrait,
{
    log::debug!("hddb: exec {}", statement.sql);
    let sql = statement.sql.clone();
    conn.execute(statement)
        .await
        .map(|result| result.rows_affected())
        .map_err(|err| HdError::from(err).with_statement(sql))
}

pub(crate) async fn query_all<C, S>(conn: &C, stmt: &S) -> HdResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: StatementBuilder,
{
    let statement = conn.get_database_backend().build(stmt);
    query_statement(conn, statement).await
}

pub(crate) async fn query_one<C, S>(conn: &C, stmt: &S) -> HdResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: StatementBuilder,
{
    let statement = conn.get_database_backend().build(stmt);
    log::debug!("hddb: query {}", statement.sql);
    let sql = statement.sql.clone();
    conn.query_one(statement)
        .await
        .map_err(|err| HdError::from(err).with_statement(sql))
}

pub(crate) async fn query_statement<C>(conn: &C, statement: Statement) -> HdResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
{
    log::debug!("hddb: query {}", statement.sql);
    let sql = statement.sql.clone();
    conn.query_all(statement)
        .await
        .map_err(|err| HdError::from(err).with_statement(sql))
}

pub(crate) fn get_string(row: &QueryResult, column: &str) -> HdResult<String> {
    Ok(row.try_get::<String>("", column)?)
}

pub(crate) fn get_count(row: &QueryResult, column: &str) -> HdResult<u64> {
    let value: i64 = row.try_get("", column)?;
    u64::try_from(value)
        .map_err(|_| HdError::data_type(format!("negative count {value} in column {column}")))
}
