use async_trait::async_trait;
use sea_orm::sea_query::Alias;
use sea_orm::{ConnectionTrait, QueryResult, Statement};
use serde_json::{Map, Value as JsonValue};

use hddb_core::query::{count_column, count_statement, next_group_column, select_statement};
use hddb_core::{
    parse_sort, validate_identifier, DatabaseKey, FetchApi, FetchParams, FetchResult, HdError,
    HdResult, ROW_KEY,
};

use crate::store::{get_count, get_string, query_all, query_one, query_statement, scoped};
use crate::HdStore;

async fn physical_columns<C: ConnectionTrait>(
    conn: &C,
    schema: &str,
    table: &str,
) -> HdResult<Vec<String>> {
    let statement = Statement::from_sql_and_values(
        conn.get_database_backend(),
        "SELECT name FROM pragma_table_info(?, ?) ORDER BY cid",
        [table.into(), schema.into()],
    );
    query_statement(conn, statement)
        .await?
        .iter()
        .map(|row| get_string(row, "name"))
        .collect()
}

/// Every column the request names must exist; SQLite would otherwise read an
/// unknown quoted identifier as a string literal.
fn check_columns(params: &FetchParams, columns: &[String]) -> HdResult<()> {
    let known = |name: &str| columns.iter().any(|column| column == name);
    let mut referenced: Vec<String> = params.row_group_cols.clone();
    referenced.extend(params.filters().map(|(column, _)| column.clone()));
    if let Some(sort) = params.sort.as_deref().filter(|sort| !sort.trim().is_empty()) {
        referenced.extend(parse_sort(sort)?.into_iter().map(|term| term.column));
    }
    match referenced
        .iter()
        .find(|name| !known(name.as_str()) && name.as_str() != ROW_KEY)
    {
        Some(unknown) => Err(HdError::invalid(format!("unknown column '{unknown}'"))),
        None => Ok(()),
    }
}

fn row_to_json(row: &QueryResult, columns: &[String]) -> HdResult<Map<String, JsonValue>> {
    let mut record = Map::with_capacity(columns.len());
    for column in columns {
        let value: Option<String> = row.try_get("", column)?;
        record.insert(
            column.clone(),
            value.map(JsonValue::String).unwrap_or(JsonValue::Null),
        );
    }
    Ok(record)
}

#[async_trait]
impl FetchApi for HdStore {
    async fn fetch_rows(
        &self,
        key: &DatabaseKey,
        table: &str,
        params: &FetchParams,
    ) -> HdResult<FetchResult> {
        validate_identifier("table", table)?;
        params.validate()?;
        if params.page_size() > self.limits.max_page_size {
            return Err(HdError::invalid(format!(
                "page size {} exceeds the limit of {}",
                params.page_size(),
                self.limits.max_page_size
            )));
        }
        self.ensure_attached(key).await?;
        self.require_table_entry(key, table).await?;

        let schema = key.schema_name();
        let ctx = key.context().with_table(table);
        let conn = self.connection();
        let physical = physical_columns(conn, &schema, table)
            .await
            .map_err(|err| err.with_context(&ctx))?;
        check_columns(params, &physical)?;
        let columns = match next_group_column(params) {
            Some(column) => vec![ROW_KEY.to_string(), column.to_string()],
            None => physical,
        };

        let target = scoped(&schema, Alias::new(table));
        let select = select_statement(target.clone(), params)?;
        let rows = query_all(conn, &select)
            .await
            .map_err(|err| err.with_context(&ctx))?
            .iter()
            .map(|row| row_to_json(row, &columns))
            .collect::<HdResult<Vec<_>>>()?;

        let count = count_statement(target, params);
        let row_count = match query_one(conn, &count)
            .await
            .map_err(|err| err.with_context(&ctx))?
        {
            Some(row) => get_count(&row, count_column())?,
            None => 0,
        };
        log::debug!(
            "hddb: fetched {} of {row_count} rows from {table} in {key}",
            rows.len()
        );
        Ok(FetchResult { rows, row_count })
    }
}
