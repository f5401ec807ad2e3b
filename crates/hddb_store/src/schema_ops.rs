//! Structural changes that keep physical tables and the catalog in lockstep.

use async_trait::async_trait;
use sea_orm::sea_query::{Alias, ColumnDef, Expr, Query, SimpleExpr, Table};
use sea_orm::ConnectionTrait;
use uuid::Uuid;

use hddb_core::{
    generate_field_metadata, quote_ident, validate_identifier, validate_table_name, ColumnRef,
    ColumnSpec, CreateDatabaseReport, DatabaseApi, DatabaseKey, DatabaseRecord, Dataset,
    ErrorContext, FieldMetadata, HdError, HdResult, TableApi, DEFAULT_FIELD_TYPE, ROW_KEY,
};

use crate::catalog::{
    create_catalog, insert_database_row, physical_table_exists, read_database, touch_database,
};
use crate::db::{HdFields, HdTables};
use crate::store::{exec, exec_sql, scoped};
use crate::HdStore;

/// Columns per `hd_fields` row; sizes the metadata insert batches.
const FIELD_ROW_WIDTH: usize = 5;

fn count_value(count: usize) -> SimpleExpr {
    i64::try_from(count).unwrap_or(i64::MAX).into()
}

fn build_error(err: sea_orm::sea_query::error::Error) -> HdError {
    HdError::query(format!("statement build failed: {err}"))
}

impl HdStore {
    async fn create_catalog_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        key: &DatabaseKey,
        table_count: u32,
    ) -> HdResult<()> {
        create_catalog(conn, &key.schema_name()).await?;
        insert_database_row(conn, key, table_count).await
    }

    async fn discard_tenant(&self, key: &DatabaseKey) {
        if let Err(err) = self.detach(key).await {
            log::warn!("hddb: detach {key} after failed create: {err}");
        }
        if let Err(err) = self.remove_tenant_file(key) {
            log::warn!("hddb: remove {key} after failed create: {err}");
        }
    }

    async fn create_table_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        key: &DatabaseKey,
        table: &str,
        fields: &[FieldMetadata],
        rows: &[Vec<String>],
    ) -> HdResult<()> {
        let schema = key.schema_name();
        if physical_table_exists(conn, &schema, table).await? {
            return Err(HdError::table_exists(table));
        }

        let mut create = Table::create();
        create.table(scoped(&schema, Alias::new(table)));
        for field in fields {
            create.col(ColumnDef::new(Alias::new(&field.id)).text());
        }
        exec(conn, &create).await?;

        let columns: Vec<Alias> = fields.iter().map(|field| Alias::new(&field.id)).collect();
        for chunk in rows.chunks(self.limits.insert_chunk(fields.len())) {
            let mut insert = Query::insert();
            insert
                .into_table(scoped(&schema, Alias::new(table)))
                .columns(columns.clone());
            for row in chunk {
                insert
                    .values(row.iter().map(|value| value.as_str().into()))
                    .map_err(build_error)?;
            }
            exec(conn, &insert).await?;
        }

        let catalogued: Vec<&FieldMetadata> =
            fields.iter().filter(|field| field.id != ROW_KEY).collect();
        let entry = Query::insert()
            .into_table(scoped(&schema, HdTables::Table))
            .columns([HdTables::Id, HdTables::Label, HdTables::Nrow, HdTables::Ncol])
            .values([
                table.into(),
                table.into(),
                count_value(rows.len()),
                count_value(catalogued.len()),
            ])
            .map_err(build_error)?
            .to_owned();
        exec(conn, &entry).await?;

        for chunk in catalogued.chunks(self.limits.insert_chunk(FIELD_ROW_WIDTH)) {
            let mut insert = Query::insert();
            insert
                .into_table(scoped(&schema, HdFields::Table))
                .columns([
                    HdFields::FieldId,
                    HdFields::Id,
                    HdFields::Label,
                    HdFields::OwnerTable,
                    HdFields::Type,
                ]);
            for field in chunk {
                insert
                    .values([
                        field.field_id.to_string().into(),
                        field.id.as_str().into(),
                        field.label.as_str().into(),
                        table.into(),
                        DEFAULT_FIELD_TYPE.into(),
                    ])
                    .map_err(build_error)?;
            }
            exec(conn, &insert).await?;
        }

        touch_database(conn, &schema).await
    }

    async fn drop_table_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        key: &DatabaseKey,
        table: &str,
    ) -> HdResult<()> {
        let schema = key.schema_name();
        let drop = Table::drop()
            .table(scoped(&schema, Alias::new(table)))
            .if_exists()
            .to_owned();
        exec(conn, &drop).await?;

        let tables = Query::delete()
            .from_table(scoped(&schema, HdTables::Table))
            .and_where(Expr::col(HdTables::Id).eq(table))
            .to_owned();
        exec(conn, &tables).await?;

        let fields = Query::delete()
            .from_table(scoped(&schema, HdFields::Table))
            .and_where(Expr::col(HdFields::OwnerTable).eq(table))
            .to_owned();
        exec(conn, &fields).await?;

        touch_database(conn, &schema).await
    }

    async fn add_column_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        key: &DatabaseKey,
        table: &str,
        column: &ColumnSpec,
    ) -> HdResult<()> {
        let schema = key.schema_name();
        exec_sql(
            conn,
            format!(
                "ALTER TABLE {}.{} ADD COLUMN {} TEXT",
                quote_ident(&schema),
                quote_ident(table),
                quote_ident(&column.physical_id)
            ),
        )
        .await?;

        let bump = Query::update()
            .table(scoped(&schema, HdTables::Table))
            .value(HdTables::Ncol, Expr::col(HdTables::Ncol).add(1))
            .and_where(Expr::col(HdTables::Id).eq(table))
            .to_owned();
        if exec(conn, &bump).await? == 0 {
            return Err(HdError::not_found(format!(
                "table '{table}' has no catalog entry in {key}"
            )));
        }

        let field = Query::insert()
            .into_table(scoped(&schema, HdFields::Table))
            .columns([
                HdFields::FieldId,
                HdFields::Id,
                HdFields::Label,
                HdFields::OwnerTable,
                HdFields::Type,
            ])
            .values([
                column.field_id.to_string().into(),
                column.physical_id.as_str().into(),
                column.label.as_str().into(),
                table.into(),
                column.field_type.as_str().into(),
            ])
            .map_err(build_error)?
            .to_owned();
        exec(conn, &field).await?;

        touch_database(conn, &schema).await
    }

    async fn delete_column_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        key: &DatabaseKey,
        table: &str,
        column: &ColumnRef,
    ) -> HdResult<()> {
        let schema = key.schema_name();
        exec_sql(
            conn,
            format!(
                "ALTER TABLE {}.{} DROP COLUMN {}",
                quote_ident(&schema),
                quote_ident(table),
                quote_ident(&column.physical_id)
            ),
        )
        .await?;

        let shrink = Query::update()
            .table(scoped(&schema, HdTables::Table))
            .value(HdTables::Ncol, Expr::col(HdTables::Ncol).sub(1))
            .and_where(Expr::col(HdTables::Id).eq(table))
            .to_owned();
        if exec(conn, &shrink).await? == 0 {
            return Err(HdError::not_found(format!(
                "table '{table}' has no catalog entry in {key}"
            )));
        }

        let field = Query::delete()
            .from_table(scoped(&schema, HdFields::Table))
            .and_where(Expr::col(HdFields::FieldId).eq(column.field_id.to_string()))
            .and_where(Expr::col(HdFields::Id).eq(column.physical_id.as_str()))
            .and_where(Expr::col(HdFields::OwnerTable).eq(table))
            .to_owned();
        if exec(conn, &field).await? == 0 {
            return Err(HdError::not_found(format!(
                "field {} with column {} not found on table '{table}'",
                column.field_id, column.physical_id
            )));
        }

        touch_database(conn, &schema).await
    }
}

#[async_trait]
impl DatabaseApi for HdStore {
    async fn create_database(&self, key: &DatabaseKey, table_count: u32) -> HdResult<()> {
        self.create_tenant_file(key)?;
        if let Err(err) = self.attach(key).await {
            self.discard_tenant(key).await;
            return Err(err);
        }
        let ctx = key.context();
        let created = match self.begin(&ctx).await {
            Ok(tx) => {
                let outcome = self.create_catalog_in(&tx, key, table_count).await;
                self.finish(tx, outcome, &ctx).await
            }
            Err(err) => Err(err),
        };
        if let Err(err) = created {
            self.discard_tenant(key).await;
            return Err(err);
        }
        log::info!("hddb: created database {key} expecting {table_count} tables");
        Ok(())
    }

    async fn create_database_with_tables(
        &self,
        key: &DatabaseKey,
        datasets: &[Dataset],
        table_names: &[String],
    ) -> HdResult<CreateDatabaseReport> {
        if datasets.len() != table_names.len() {
            return Err(HdError::invalid(format!(
                "the number of datasets ({}) must match the number of table names ({})",
                datasets.len(),
                table_names.len()
            )));
        }
        for name in table_names {
            validate_table_name(name)?;
        }
        let table_count = u32::try_from(datasets.len())
            .map_err(|_| HdError::invalid("too many tables for one database"))?;

        self.create_database(key, table_count).await?;
        let mut committed = Vec::with_capacity(table_names.len());
        for (dataset, name) in datasets.iter().zip(table_names) {
            if let Err(err) = self.create_table(key, name, dataset).await {
                return Err(
                    HdError::query(format!("error creating table '{name}': {err}"))
                        .with_context(
                            &key.context()
                                .with_table(name)
                                .with_committed(committed.clone()),
                        ),
                );
            }
            committed.push(name.clone());
        }
        Ok(CreateDatabaseReport {
            database: key.clone(),
            committed_tables: committed,
        })
    }

    async fn get_database(&self, key: &DatabaseKey) -> HdResult<DatabaseRecord> {
        self.ensure_attached(key).await?;
        read_database(self.connection(), &key.schema_name())
            .await
            .map_err(|err| err.with_context(&key.context()))?
            .ok_or_else(|| HdError::not_found(format!("database {key} has no catalog")))
    }

    async fn drop_database(&self, key: &DatabaseKey) -> HdResult<()> {
        self.detach(key).await?;
        self.remove_tenant_file(key)?;
        log::info!("hddb: dropped database {key}");
        Ok(())
    }
}

#[async_trait]
impl TableApi for HdStore {
    async fn create_table(
        &self,
        key: &DatabaseKey,
        table: &str,
        dataset: &Dataset,
    ) -> HdResult<()> {
        validate_table_name(table)?;
        self.ensure_attached(key).await?;
        let fields = generate_field_metadata(dataset.columns());
        let rows = dataset.cleaned_rows();

        let ctx = key.context().with_table(table);
        let tx = self.begin(&ctx).await?;
        let outcome = self
            .create_table_in(&tx, key, table, &fields, &rows)
            .await;
        self.finish(tx, outcome, &ctx).await?;
        log::info!(
            "hddb: created table {table} in {key} ({} rows, {} columns)",
            rows.len(),
            fields.len()
        );
        Ok(())
    }

    async fn drop_table(&self, key: &DatabaseKey, table: &str) -> HdResult<()> {
        validate_table_name(table)?;
        self.ensure_attached(key).await?;
        let ctx = key.context().with_table(table);
        let tx = self.begin(&ctx).await?;
        let outcome = self.drop_table_in(&tx, key, table).await;
        self.finish(tx, outcome, &ctx).await?;
        log::info!("hddb: dropped table {table} from {key}");
        Ok(())
    }

    async fn add_column(
        &self,
        key: &DatabaseKey,
        table: &str,
        column: &ColumnSpec,
    ) -> HdResult<()> {
        validate_table_name(table)?;
        validate_identifier("column", &column.physical_id)?;
        if column.physical_id == ROW_KEY {
            return Err(HdError::invalid(format!("{ROW_KEY} cannot be added")));
        }
        self.ensure_attached(key).await?;
        let ctx = key
            .context()
            .with_table(table)
            .with_column(&column.physical_id);
        let tx = self.begin(&ctx).await?;
        let outcome = self.add_column_in(&tx, key, table, column).await;
        self.finish(tx, outcome, &ctx).await?;
        log::info!(
            "hddb: added column {} to {table} in {key}",
            column.physical_id
        );
        Ok(())
    }

    async fn delete_column(
        &self,
        key: &DatabaseKey,
        table: &str,
        column: &ColumnRef,
    ) -> HdResult<()> {
        validate_table_name(table)?;
        validate_identifier("column", &column.physical_id)?;
        if column.physical_id == ROW_KEY {
            return Err(HdError::invalid(format!("{ROW_KEY} cannot be deleted")));
        }
        self.ensure_attached(key).await?;
        let ctx = key
            .context()
            .with_table(table)
            .with_column(&column.physical_id);
        let tx = self.begin(&ctx).await?;
        let outcome = self.delete_column_in(&tx, key, table, column).await;
        self.finish(tx, outcome, &ctx).await?;
        log::info!(
            "hddb: deleted column {} from {table} in {key}",
            column.physical_id
        );
        Ok(())
    }

    async fn update_field_metadata(
        &self,
        key: &DatabaseKey,
        field_id: Uuid,
        label: &str,
        field_type: &str,
    ) -> HdResult<()> {
        self.ensure_attached(key).await?;
        let update = Query::update()
            .table(scoped(&key.schema_name(), HdFields::Table))
            .value(HdFields::Label, label)
            .value(HdFields::Type, field_type)
            .and_where(Expr::col(HdFields::FieldId).eq(field_id.to_string()))
            .to_owned();
        let ctx: ErrorContext = key.context();
        let updated = exec(self.connection(), &update)
            .await
            .map_err(|err| err.with_context(&ctx))?;
        if updated == 0 {
            return Err(HdError::not_found(format!(
                "field {field_id} not found in {key}"
            )));
        }
        log::info!("hddb: updated field {field_id} in {key}");
        Ok(())
    }
}
