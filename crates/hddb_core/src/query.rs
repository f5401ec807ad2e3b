//! Grouped/paginated grid queries.
//!
//! A request is "grouping" while `row_group_cols` has levels the user has not
//! drilled into yet. At such a level the query returns the distinct values of
//! the next grouping column, restricted by the equality path in `group_keys`;
//! past the last level it returns raw rows.
//!
//! The `build_*_sql` functions render literal SQL fragments. Values are
//! interpolated with quote doubling, so callers must run
//! [`FetchParams::validate`] first. [`select_statement`] and
//! [`count_statement`] express the same query with bound parameters and are
//! what the store executes.

use sea_orm::sea_query::{
    Alias, Asterisk, Cond, Expr, Func, LikeExpr, Order, Query, SelectStatement, SimpleExpr,
    TableRef,
};

use crate::ident::{quote_ident, quote_literal};
use crate::ids::ROW_KEY;
use crate::params::{parse_sort, FetchParams, FilterModel, TextFilterType};
use crate::HdResult;

/// Fresh random identifier per grouped row.
pub const ROW_KEY_SQL: &str = "lower(hex(randomblob(16)))";

const COUNT_ALIAS: &str = "total";
const GROUP_SUBQUERY_ALIAS: &str = "grp";

pub fn is_doing_grouping(params: &FetchParams) -> bool {
    params.row_group_cols.len() > params.group_keys.len()
}

/// The grouping column revealed at the current drill level.
pub fn next_group_column(params: &FetchParams) -> Option<&str> {
    if is_doing_grouping(params) {
        params
            .row_group_cols
            .get(params.group_keys.len())
            .map(String::as_str)
    } else {
        None
    }
}

pub fn build_select_sql(params: &FetchParams) -> String {
    match next_group_column(params) {
        Some(column) => format!(
            "SELECT {ROW_KEY_SQL} AS {}, {}",
            quote_ident(ROW_KEY),
            quote_ident(column)
        ),
        None => "SELECT *".to_string(),
    }
}

pub fn build_where_sql(params: &FetchParams) -> String {
    if params.group_keys.is_empty() || params.row_group_cols.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = params
        .row_group_cols
        .iter()
        .zip(&params.group_keys)
        .map(|(column, key)| format!("{} = {}", quote_ident(column), quote_literal(key)))
        .collect();
    format!("WHERE {}", parts.join(" AND "))
}

pub fn build_group_sql(params: &FetchParams) -> String {
    match next_group_column(params) {
        Some(column) => format!("GROUP BY {}", quote_ident(column)),
        None => String::new(),
    }
}

/// Sort expression in effect for this request.
///
/// While grouping, only terms led by a grouping column are considered and the
/// one at the current drill depth wins; otherwise the caller's expression is
/// used unchanged.
pub fn effective_sort(params: &FetchParams) -> Option<String> {
    let sort = params.sort.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    if is_doing_grouping(params) {
        let grouped_terms: Vec<&str> = sort
            .split(',')
            .map(str::trim)
            .filter(|term| {
                term.split_whitespace()
                    .next()
                    .is_some_and(|column| params.row_group_cols.iter().any(|c| c == column))
            })
            .collect();
        if let Some(term) = grouped_terms.get(params.group_keys.len()) {
            return Some((*term).to_string());
        }
    }
    Some(sort.to_string())
}

pub fn build_order_sql(params: &FetchParams) -> String {
    match effective_sort(params) {
        Some(sort) => format!("ORDER BY {sort}"),
        None => String::new(),
    }
}

pub fn build_count_sql(params: &FetchParams, from_sql: &str, where_sql: &str) -> String {
    let tail = [from_sql.trim(), where_sql.trim()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    match next_group_column(params) {
        Some(column) => format!(
            "SELECT COUNT(*) FROM (SELECT DISTINCT {} {tail})",
            quote_ident(column)
        ),
        None => format!("SELECT COUNT(*) {tail}"),
    }
}

fn col(name: &str) -> Expr {
    Expr::col(Alias::new(name))
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn like(pattern: String) -> LikeExpr {
    LikeExpr::new(pattern).escape('\\')
}

fn filter_expr(column: &str, filter: &FilterModel) -> SimpleExpr {
    let value = filter.filter.clone().unwrap_or_default();
    match filter.kind {
        TextFilterType::Equals => col(column).eq(value),
        TextFilterType::NotEqual => col(column).ne(value),
        TextFilterType::Contains => col(column).like(like(format!("%{}%", escape_like(&value)))),
        TextFilterType::NotContains => {
            col(column).not_like(like(format!("%{}%", escape_like(&value))))
        }
        TextFilterType::StartsWith => col(column).like(like(format!("{}%", escape_like(&value)))),
        TextFilterType::EndsWith => col(column).like(like(format!("%{}", escape_like(&value)))),
        TextFilterType::IsNull => col(column).is_null().or(col(column).eq("")),
        TextFilterType::IsNotNull => col(column).is_not_null().and(col(column).ne("")),
    }
}

/// Drill-down path plus column filters, with every value bound as a parameter.
pub fn predicate(params: &FetchParams) -> Cond {
    let mut cond = Cond::all();
    for (column, key) in params.row_group_cols.iter().zip(&params.group_keys) {
        cond = cond.add(col(column).eq(key.as_str()));
    }
    for (column, filter) in params.filters() {
        cond = cond.add(filter_expr(column, filter));
    }
    cond
}

pub fn select_statement(table: TableRef, params: &FetchParams) -> HdResult<SelectStatement> {
    let mut select = Query::select();
    select.from(table).cond_where(predicate(params));
    match next_group_column(params) {
        Some(column) => {
            select
                .expr_as(Expr::cust(ROW_KEY_SQL), Alias::new(ROW_KEY))
                .column(Alias::new(column))
                .group_by_col(Alias::new(column));
        }
        None => {
            select.column(Asterisk);
        }
    }
    if let Some(sort) = effective_sort(params) {
        for term in parse_sort(&sort)? {
            let order = if term.descending { Order::Desc } else { Order::Asc };
            select.order_by(Alias::new(term.column), order);
        }
    }
    select.limit(params.page_size()).offset(params.start_row);
    Ok(select)
}

pub fn count_statement(table: TableRef, params: &FetchParams) -> SelectStatement {
    let count = Func::count(Expr::col(Asterisk));
    match next_group_column(params) {
        Some(column) => {
            let distinct = Query::select()
                .distinct()
                .column(Alias::new(column))
                .from(table)
                .cond_where(predicate(params))
                .to_owned();
            Query::select()
                .expr_as(count, Alias::new(COUNT_ALIAS))
                .from_subquery(distinct, Alias::new(GROUP_SUBQUERY_ALIAS))
                .to_owned()
        }
        None => Query::select()
            .expr_as(count, Alias::new(COUNT_ALIAS))
            .from(table)
            .cond_where(predicate(params))
            .to_owned(),
    }
}

pub fn count_column() -> &'static str {
    COUNT_ALIAS
}

#[cfg(test)]
mod tests {
    use sea_orm::sea_query::{IntoTableRef, QueryStatementWriter, SqliteQueryBuilder};

    use super::*;
    use crate::params::FilterModel;

    fn target() -> TableRef {
        (Alias::new("acme__sales"), Alias::new("orders")).into_table_ref()
    }

    #[test]
    fn flat_requests_select_everything_without_where_or_group() {
        for params in [
            FetchParams::new(0, 100),
            FetchParams::new(0, 100).with_sort("city desc"),
            FetchParams::new(5, 10)
                .with_filter("city", FilterModel::text(TextFilterType::Equals, "Boston")),
        ] {
            assert_eq!(build_select_sql(&params), "SELECT *");
            assert_eq!(build_where_sql(&params), "");
            assert_eq!(build_group_sql(&params), "");
        }
    }

    #[test]
    fn grouping_selects_and_groups_the_next_column() {
        let params = FetchParams::new(0, 100).with_grouping(["country", "city"], ["US"]);
        assert!(is_doing_grouping(&params));
        assert_eq!(
            build_select_sql(&params),
            "SELECT lower(hex(randomblob(16))) AS \"rcd___id\", \"city\""
        );
        assert_eq!(build_group_sql(&params), "GROUP BY \"city\"");

        let top = FetchParams::new(0, 100).with_grouping(["country", "city"], Vec::<String>::new());
        assert!(build_select_sql(&top).ends_with(", \"country\""));
        assert_eq!(build_group_sql(&top), "GROUP BY \"country\"");
    }

    #[test]
    fn where_follows_the_drill_down_path() {
        let params = FetchParams::new(0, 100).with_grouping(["country", "city"], ["US"]);
        assert_eq!(build_where_sql(&params), "WHERE \"country\" = 'US'");

        let leaf = FetchParams::new(0, 100).with_grouping(["country", "city"], ["US", "O'Fallon"]);
        assert!(!is_doing_grouping(&leaf));
        assert_eq!(build_select_sql(&leaf), "SELECT *");
        assert_eq!(
            build_where_sql(&leaf),
            "WHERE \"country\" = 'US' AND \"city\" = 'O''Fallon'"
        );
    }

    #[test]
    fn order_picks_the_term_for_the_current_level() {
        let params = FetchParams::new(0, 100)
            .with_sort("age desc, country asc, city desc")
            .with_grouping(["country", "city"], ["US"]);
        assert_eq!(build_order_sql(&params), "ORDER BY city desc");

        let top = params.clone().with_grouping(["country", "city"], Vec::<String>::new());
        assert_eq!(build_order_sql(&top), "ORDER BY country asc");
    }

    #[test]
    fn order_falls_back_to_the_full_expression() {
        let params = FetchParams::new(0, 100)
            .with_sort("age desc")
            .with_grouping(["country"], Vec::<String>::new());
        assert_eq!(build_order_sql(&params), "ORDER BY age desc");

        let flat = FetchParams::new(0, 100).with_sort("age desc, name");
        assert_eq!(build_order_sql(&flat), "ORDER BY age desc, name");

        assert_eq!(build_order_sql(&FetchParams::new(0, 100)), "");
    }

    #[test]
    fn count_sql_counts_groups_or_rows() {
        let grouped = FetchParams::new(0, 100).with_grouping(["country", "city"], ["US"]);
        let where_sql = build_where_sql(&grouped);
        assert_eq!(
            build_count_sql(&grouped, "FROM \"orders\"", &where_sql),
            "SELECT COUNT(*) FROM (SELECT DISTINCT \"city\" FROM \"orders\" WHERE \"country\" = 'US')"
        );
        let flat = FetchParams::new(0, 100);
        assert_eq!(
            build_count_sql(&flat, "FROM \"orders\"", ""),
            "SELECT COUNT(*) FROM \"orders\""
        );
    }

    #[test]
    fn statements_bind_values_instead_of_interpolating() {
        let params = FetchParams::new(20, 30)
            .with_sort("country desc")
            .with_grouping(["country", "city"], ["US'; --"]);
        let (sql, values) = select_statement(target(), &params)
            .expect("select")
            .build(SqliteQueryBuilder);
        assert!(sql.contains("GROUP BY \"city\""), "{sql}");
        assert!(sql.contains("\"country\" = ?"), "{sql}");
        assert!(sql.contains("LIMIT ? OFFSET ?") || sql.contains("LIMIT 10 OFFSET 20"), "{sql}");
        assert!(!sql.contains("US'"), "{sql}");
        assert!(!values.0.is_empty());
    }

    #[test]
    fn count_statement_wraps_distinct_subquery_when_grouping() {
        let params = FetchParams::new(0, 10).with_grouping(["country"], Vec::<String>::new());
        let (sql, _) = count_statement(target(), &params).build(SqliteQueryBuilder);
        assert!(sql.contains("SELECT DISTINCT \"country\""), "{sql}");
        assert!(sql.contains("AS \"total\""), "{sql}");

        let flat = FetchParams::new(0, 10)
            .with_filter("name", FilterModel::null_check(TextFilterType::IsNotNull));
        let (sql, _) = count_statement(target(), &flat).build(SqliteQueryBuilder);
        assert!(!sql.contains("DISTINCT"), "{sql}");
        assert!(sql.contains("IS NOT NULL"), "{sql}");
    }
}
