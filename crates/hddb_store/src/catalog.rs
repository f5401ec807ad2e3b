//! Per-tenant metadata catalog: `hd_database`, `hd_tables` and `hd_fields`.
//!
//! The catalog lives inside the tenant schema next to the physical tables it
//! describes, so both change in the same transaction.

use async_trait::async_trait;
use sea_orm::sea_query::{
    Alias, ColumnDef, Expr, Index, Order, Query, Table,
};
use sea_orm::{ConnectionTrait, QueryResult, Statement};
use uuid::Uuid;

use hddb_core::{
    quote_ident, validate_identifier, CatalogApi, DatabaseKey, DatabaseRecord, FieldEntry,
    FieldListing, FieldsParams, HdError, HdResult, TableEntry, TableMetadata,
};

use crate::db::{HdDatabase, HdFields, HdTables};
use crate::store::{exec, get_count, get_string, query_all, query_one, query_statement, scoped};
use crate::HdStore;

pub(crate) async fn create_catalog<C: ConnectionTrait>(conn: &C, schema: &str) -> HdResult<()> {
    let database = Table::create()
        .table(scoped(schema, HdDatabase::Table))
        .if_not_exists()
        .col(ColumnDef::new(HdDatabase::Id).text().not_null().primary_key())
        .col(ColumnDef::new(HdDatabase::Username).text().not_null())
        .col(ColumnDef::new(HdDatabase::Slug).text().not_null())
        .col(
            ColumnDef::new(HdDatabase::CreatedAt)
                .text()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .col(
            ColumnDef::new(HdDatabase::UpdatedAt)
                .text()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .col(ColumnDef::new(HdDatabase::NTables).integer().not_null().default(0))
        .to_owned();
    exec(conn, &database).await?;

    let tables = Table::create()
        .table(scoped(schema, HdTables::Table))
        .if_not_exists()
        .col(ColumnDef::new(HdTables::Id).text().not_null().primary_key())
        .col(ColumnDef::new(HdTables::Label).text().not_null())
        .col(ColumnDef::new(HdTables::Nrow).big_integer().not_null().default(0))
        .col(ColumnDef::new(HdTables::Ncol).big_integer().not_null().default(0))
        .to_owned();
    exec(conn, &tables).await?;

    let fields = Table::create()
        .table(scoped(schema, HdFields::Table))
        .if_not_exists()
        .col(ColumnDef::new(HdFields::FieldId).text().not_null().unique_key())
        .col(ColumnDef::new(HdFields::Id).text().not_null())
        .col(ColumnDef::new(HdFields::Label).text().not_null())
        .col(ColumnDef::new(HdFields::OwnerTable).text().not_null())
        .col(ColumnDef::new(HdFields::Type).text().not_null())
        .primary_key(
            Index::create()
                .col(HdFields::OwnerTable)
                .col(HdFields::Id),
        )
        .to_owned();
    exec(conn, &fields).await?;
    Ok(())
}

pub(crate) async fn insert_database_row<C: ConnectionTrait>(
    conn: &C,
    key: &DatabaseKey,
    table_count: u32,
) -> HdResult<()> {
    let insert = Query::insert()
        .into_table(scoped(&key.schema_name(), HdDatabase::Table))
        .columns([
            HdDatabase::Id,
            HdDatabase::Username,
            HdDatabase::Slug,
            HdDatabase::NTables,
        ])
        .values([
            key.schema_name().into(),
            key.org().into(),
            key.db().into(),
            i64::from(table_count).into(),
        ])
        .map_err(|err| HdError::query(err.to_string()))?
        .to_owned();
    exec(conn, &insert).await?;
    Ok(())
}

/// Bumps `hd_database.updated_at` after a structural change.
pub(crate) async fn touch_database<C: ConnectionTrait>(conn: &C, schema: &str) -> HdResult<()> {
    let update = Query::update()
        .table(scoped(schema, HdDatabase::Table))
        .value(HdDatabase::UpdatedAt, Expr::current_timestamp())
        .to_owned();
    exec(conn, &update).await?;
    Ok(())
}

pub(crate) async fn read_database<C: ConnectionTrait>(
    conn: &C,
    schema: &str,
) -> HdResult<Option<DatabaseRecord>> {
    let select = Query::select()
        .columns([
            HdDatabase::Id,
            HdDatabase::Username,
            HdDatabase::Slug,
            HdDatabase::CreatedAt,
            HdDatabase::UpdatedAt,
            HdDatabase::NTables,
        ])
        .from(scoped(schema, HdDatabase::Table))
        .limit(1)
        .to_owned();
    let Some(row) = query_one(conn, &select).await? else {
        return Ok(None);
    };
    let n_tables = get_count(&row, "n_tables")?;
    Ok(Some(DatabaseRecord {
        id: get_string(&row, "id")?,
        username: get_string(&row, "username")?,
        slug: get_string(&row, "slug")?,
        created_at: get_string(&row, "created_at")?,
        updated_at: get_string(&row, "updated_at")?,
        n_tables: u32::try_from(n_tables)
            .map_err(|_| HdError::data_type(format!("n_tables {n_tables} out of range")))?,
    }))
}

pub(crate) async fn read_table_entry<C: ConnectionTrait>(
    conn: &C,
    schema: &str,
    table: &str,
) -> HdResult<Option<TableEntry>> {
    let select = Query::select()
        .columns([HdTables::Id, HdTables::Label, HdTables::Nrow, HdTables::Ncol])
        .from(scoped(schema, HdTables::Table))
        .and_where(Expr::col(HdTables::Id).eq(table))
        .limit(1)
        .to_owned();
    query_one(conn, &select)
        .await?
        .map(|row| table_entry(&row))
        .transpose()
}

fn table_entry(row: &QueryResult) -> HdResult<TableEntry> {
    Ok(TableEntry {
        id: get_string(row, "id")?,
        label: get_string(row, "label")?,
        nrow: get_count(row, "nrow")?,
        ncol: get_count(row, "ncol")?,
    })
}

fn field_entry(row: &QueryResult) -> HdResult<FieldEntry> {
    let raw_id = get_string(row, "field_id")?;
    let field_id = Uuid::parse_str(&raw_id)
        .map_err(|err| HdError::data_type(format!("field_id '{raw_id}': {err}")))?;
    Ok(FieldEntry {
        field_id,
        id: get_string(row, "id")?,
        label: get_string(row, "label")?,
        table: get_string(row, "table")?,
        field_type: get_string(row, "type")?,
    })
}

/// True when the tenant schema holds a physical table of that name, ignoring case.
pub(crate) async fn physical_table_exists<C: ConnectionTrait>(
    conn: &C,
    schema: &str,
    table: &str,
) -> HdResult<bool> {
    let sql = format!(
        "SELECT name FROM {}.sqlite_master WHERE type = 'table' AND lower(name) = lower(?)",
        quote_ident(schema)
    );
    let statement =
        Statement::from_sql_and_values(conn.get_database_backend(), sql, [table.into()]);
    Ok(!query_statement(conn, statement).await?.is_empty())
}

async fn read_categories<C: ConnectionTrait>(
    conn: &C,
    schema: &str,
    table: &str,
    column: &str,
    limit: u64,
) -> HdResult<Vec<String>> {
    let select = Query::select()
        .distinct()
        .column(Alias::new(column))
        .from(scoped(schema, Alias::new(table)))
        .and_where(Expr::col(Alias::new(column)).is_not_null())
        .and_where(Expr::col(Alias::new(column)).ne(""))
        .order_by(Alias::new(column), Order::Asc)
        .limit(limit)
        .to_owned();
    query_all(conn, &select)
        .await?
        .iter()
        .map(|row| get_string(row, column))
        .collect()
}

impl HdStore {
    pub(crate) async fn require_table_entry(
        &self,
        key: &DatabaseKey,
        table: &str,
    ) -> HdResult<TableEntry> {
        read_table_entry(self.connection(), &key.schema_name(), table)
            .await?
            .ok_or_else(|| HdError::not_found(format!("table '{table}' not found in {key}")))
    }
}

#[async_trait]
impl CatalogApi for HdStore {
    async fn get_table_metadata(
        &self,
        key: &DatabaseKey,
        table: &str,
    ) -> HdResult<TableMetadata> {
        validate_identifier("table", table)?;
        self.ensure_attached(key).await?;
        let entry = self.require_table_entry(key, table).await?;
        Ok(TableMetadata {
            nrow: entry.nrow,
            ncol: entry.ncol,
            name: table.to_string(),
        })
    }

    async fn list_tables(&self, key: &DatabaseKey) -> HdResult<Vec<TableEntry>> {
        self.ensure_attached(key).await?;
        let select = Query::select()
            .columns([HdTables::Id, HdTables::Label, HdTables::Nrow, HdTables::Ncol])
            .from(scoped(&key.schema_name(), HdTables::Table))
            .order_by(Alias::new("rowid"), Order::Asc)
            .to_owned();
        query_all(self.connection(), &select)
            .await?
            .iter()
            .map(table_entry)
            .collect()
    }

    async fn list_fields(
        &self,
        key: &DatabaseKey,
        table: &str,
        params: FieldsParams,
    ) -> HdResult<Vec<FieldListing>> {
        validate_identifier("table", table)?;
        self.ensure_attached(key).await?;
        self.require_table_entry(key, table).await?;
        let schema = key.schema_name();
        let select = Query::select()
            .columns([
                HdFields::FieldId,
                HdFields::Id,
                HdFields::Label,
                HdFields::OwnerTable,
                HdFields::Type,
            ])
            .from(scoped(&schema, HdFields::Table))
            .and_where(Expr::col(HdFields::OwnerTable).eq(table))
            .order_by(Alias::new("rowid"), Order::Asc)
            .to_owned();
        let rows = query_all(self.connection(), &select).await?;
        let mut listings = Vec::with_capacity(rows.len());
        for row in &rows {
            let field = field_entry(row)?;
            let categories = if params.with_categories {
                Some(
                    read_categories(
                        self.connection(),
                        &schema,
                        table,
                        &field.id,
                        self.limits.max_categories,
                    )
                    .await
                    .map_err(|err| {
                        err.with_context(&key.context().with_table(table).with_column(&field.id))
                    })?,
                )
            } else {
                None
            };
            listings.push(FieldListing { field, categories });
        }
        Ok(listings)
    }
}
