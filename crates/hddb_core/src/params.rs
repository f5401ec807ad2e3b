use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ident::validate_identifier;
use crate::{HdError, HdResult};

pub const TEXT_FILTER: &str = "text";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextFilterType {
    Equals,
    NotEqual,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    IsNull,
    IsNotNull,
}

impl TextFilterType {
    pub fn takes_value(self) -> bool {
        !matches!(self, TextFilterType::IsNull | TextFilterType::IsNotNull)
    }
}

/// One column filter as sent by the grid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterModel {
    #[serde(rename = "filterType", default = "default_filter_type")]
    pub filter_type: String,
    #[serde(rename = "type")]
    pub kind: TextFilterType,
    #[serde(default)]
    pub filter: Option<String>,
}

fn default_filter_type() -> String {
    TEXT_FILTER.to_string()
}

impl FilterModel {
    pub fn text(kind: TextFilterType, filter: impl Into<String>) -> Self {
        Self {
            filter_type: default_filter_type(),
            kind,
            filter: Some(filter.into()),
        }
    }

    pub fn null_check(kind: TextFilterType) -> Self {
        Self {
            filter_type: default_filter_type(),
            kind,
            filter: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortTerm {
    pub column: String,
    pub descending: bool,
}

/// Parses `col [asc|desc], ...`.
pub fn parse_sort(expr: &str) -> HdResult<Vec<SortTerm>> {
    expr.split(',')
        .map(|term| {
            let mut tokens = term.split_whitespace();
            let column = tokens
                .next()
                .ok_or_else(|| HdError::invalid(format!("empty sort term in '{expr}'")))?;
            validate_identifier("sort column", column)?;
            let descending = match tokens.next().map(str::to_ascii_lowercase).as_deref() {
                None | Some("asc") => false,
                Some("desc") => true,
                Some(other) => {
                    return Err(HdError::invalid(format!(
                        "unsupported sort direction '{other}'"
                    )));
                }
            };
            if let Some(extra) = tokens.next() {
                return Err(HdError::invalid(format!(
                    "unexpected token '{extra}' in sort term '{}'",
                    term.trim()
                )));
            }
            Ok(SortTerm {
                column: column.to_string(),
                descending,
            })
        })
        .collect()
}

/// Pagination window, sort, filters and drill-down path for one grid request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchParams {
    pub start_row: u64,
    pub end_row: u64,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default, alias = "filters")]
    pub filter_model: Option<BTreeMap<String, FilterModel>>,
    #[serde(default)]
    pub row_group_cols: Vec<String>,
    #[serde(default)]
    pub group_keys: Vec<String>,
}

impl FetchParams {
    pub fn new(start_row: u64, end_row: u64) -> Self {
        Self {
            start_row,
            end_row,
            ..Self::default()
        }
    }

    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn with_filter(mut self, column: impl Into<String>, filter: FilterModel) -> Self {
        self.filter_model
            .get_or_insert_with(BTreeMap::new)
            .insert(column.into(), filter);
        self
    }

    pub fn with_grouping<C, K>(mut self, row_group_cols: C, group_keys: K) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        K: IntoIterator,
        K::Item: Into<String>,
    {
        self.row_group_cols = row_group_cols.into_iter().map(Into::into).collect();
        self.group_keys = group_keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn page_size(&self) -> u64 {
        self.end_row.saturating_sub(self.start_row)
    }

    pub fn filters(&self) -> impl Iterator<Item = (&String, &FilterModel)> {
        self.filter_model.iter().flat_map(|filters| filters.iter())
    }

    pub fn validate(&self) -> HdResult<()> {
        if self.end_row <= self.start_row {
            return Err(HdError::invalid(format!(
                "end_row ({}) must be greater than start_row ({})",
                self.end_row, self.start_row
            )));
        }
        if self.group_keys.len() > self.row_group_cols.len() {
            return Err(HdError::invalid(format!(
                "{} group keys given for {} grouping columns",
                self.group_keys.len(),
                self.row_group_cols.len()
            )));
        }
        for column in &self.row_group_cols {
            validate_identifier("grouping column", column)?;
        }
        if let Some(sort) = &self.sort {
            if !sort.trim().is_empty() {
                parse_sort(sort)?;
            }
        }
        for (column, filter) in self.filters() {
            validate_identifier("filter column", column)?;
            if filter.filter_type != TEXT_FILTER {
                return Err(HdError::invalid(format!(
                    "unsupported filterType '{}' on column {column}",
                    filter.filter_type
                )));
            }
            if filter.kind.takes_value() && filter.filter.is_none() {
                return Err(HdError::invalid(format!(
                    "filter {:?} on column {column} requires a value",
                    filter.kind
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldsParams {
    #[serde(default)]
    pub with_categories: bool,
}
