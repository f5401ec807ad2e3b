use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    ColumnRef, ColumnSpec, CreateDatabaseReport, DatabaseKey, DatabaseRecord, Dataset,
    FetchParams, FetchResult, FieldListing, FieldsParams, HdResult, TableEntry, TableMetadata,
};

#[async_trait]
pub trait DatabaseApi {
    /// Creates the tenant database and its catalog with `n_tables = table_count`.
    async fn create_database(&self, key: &DatabaseKey, table_count: u32) -> HdResult<()>;

    /// Creates the database and then one table per dataset, each table in its
    /// own transaction.
    async fn create_database_with_tables(
        &self,
        key: &DatabaseKey,
        datasets: &[Dataset],
        table_names: &[String],
    ) -> HdResult<CreateDatabaseReport>;

    async fn get_database(&self, key: &DatabaseKey) -> HdResult<DatabaseRecord>;

    async fn drop_database(&self, key: &DatabaseKey) -> HdResult<()>;
}

#[async_trait]
pub trait TableApi {
    async fn create_table(&self, key: &DatabaseKey, table: &str, dataset: &Dataset)
        -> HdResult<()>;

    async fn drop_table(&self, key: &DatabaseKey, table: &str) -> HdResult<()>;

    async fn add_column(&self, key: &DatabaseKey, table: &str, column: &ColumnSpec)
        -> HdResult<()>;

    async fn delete_column(&self, key: &DatabaseKey, table: &str, column: &ColumnRef)
        -> HdResult<()>;

    /// Relabels or retypes a field; the physical column is untouched.
    async fn update_field_metadata(
        &self,
        key: &DatabaseKey,
        field_id: Uuid,
        label: &str,
        field_type: &str,
    ) -> HdResult<()>;
}

#[async_trait]
pub trait CatalogApi {
    async fn get_table_metadata(&self, key: &DatabaseKey, table: &str)
        -> HdResult<TableMetadata>;

    async fn list_tables(&self, key: &DatabaseKey) -> HdResult<Vec<TableEntry>>;

    async fn list_fields(
        &self,
        key: &DatabaseKey,
        table: &str,
        params: FieldsParams,
    ) -> HdResult<Vec<FieldListing>>;
}

#[async_trait]
pub trait FetchApi {
    async fn fetch_rows(
        &self,
        key: &DatabaseKey,
        table: &str,
        params: &FetchParams,
    ) -> HdResult<FetchResult>;
}
