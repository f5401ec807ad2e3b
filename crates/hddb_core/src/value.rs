use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::{HdError, HdResult};

/// Text values that stand for a missing cell and are stored as the empty string.
const MISSING_MARKERS: [&str; 3] = ["None", "nan", "NaN"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    pub fn from_json(value: &JsonValue) -> HdResult<Self> {
        Ok(match value {
            JsonValue::Null => CellValue::Null,
            JsonValue::Bool(flag) => CellValue::Bool(*flag),
            JsonValue::Number(number) => match number.as_i64() {
                Some(int) => CellValue::Int(int),
                None => CellValue::Float(number.as_f64().ok_or_else(|| {
                    HdError::data_type(format!("number {number} is not representable"))
                })?),
            },
            JsonValue::String(text) => CellValue::Text(text.clone()),
            JsonValue::Array(_) | JsonValue::Object(_) => {
                return Err(HdError::data_type(format!(
                    "cannot coerce nested value {value} to text"
                )));
            }
        })
    }

    /// Text form used for storage; missing values become `""`.
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Bool(flag) => flag.to_string(),
            CellValue::Int(int) => int.to_string(),
            CellValue::Float(float) if float.is_nan() => String::new(),
            CellValue::Float(float) => float.to_string(),
            CellValue::Text(text) if MISSING_MARKERS.contains(&text.as_str()) => String::new(),
            CellValue::Text(text) => text.clone(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Int(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Float(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Null)
    }
}

/// Tabular input for table creation: labelled columns and rows of the same width.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> HdResult<Self> {
        if columns.is_empty() {
            return Err(HdError::invalid("dataset must have at least one column"));
        }
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(HdError::invalid(format!(
                "row {index} has {} values but the dataset has {} columns",
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    /// Builds a dataset from JSON records; columns follow first appearance and
    /// keys missing from a record are null.
    pub fn from_records(records: &[Map<String, JsonValue>]) -> HdResult<Self> {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| match record.get(column) {
                        Some(value) => CellValue::from_json(value),
                        None => Ok(CellValue::Null),
                    })
                    .collect::<HdResult<Vec<_>>>()
            })
            .collect::<HdResult<Vec<_>>>()?;
        Self::new(columns, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn cleaned_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(CellValue::to_text).collect())
            .collect()
    }
}
