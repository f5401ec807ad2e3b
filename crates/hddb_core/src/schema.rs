use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::error::ErrorContext;
use crate::ident::validate_identifier;
use crate::ids::generate_field_id;
use crate::HdResult;

pub const DEFAULT_FIELD_TYPE: &str = "Text";

/// Separator between organization and database in a schema name.
pub const SCHEMA_SEPARATOR: &str = "__";

/// Tenant database address; `org__db` is its schema name on the engine.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatabaseKey {
    org: String,
    db: String,
}

impl DatabaseKey {
    pub fn new(org: impl Into<String>, db: impl Into<String>) -> HdResult<Self> {
        let org = org.into();
        let db = db.into();
        validate_identifier("organization", &org)?;
        validate_identifier("database", &db)?;
        Ok(Self { org, db })
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    pub fn db(&self) -> &str {
        &self.db
    }

    pub fn schema_name(&self) -> String {
        format!("{}{SCHEMA_SEPARATOR}{}", self.org, self.db)
    }

    pub fn context(&self) -> ErrorContext {
        ErrorContext::database(&self.org, &self.db)
    }
}

impl std::fmt::Display for DatabaseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.org, self.db)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseRecord {
    pub id: String,
    pub username: String,
    pub slug: String,
    pub created_at: String,
    pub updated_at: String,
    pub n_tables: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    pub id: String,
    pub label: String,
    pub nrow: u64,
    pub ncol: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldEntry {
    pub field_id: Uuid,
    pub id: String,
    pub label: String,
    pub table: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

/// A field row plus, when requested, its distinct non-empty values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldListing {
    #[serde(flatten)]
    pub field: FieldEntry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub nrow: u64,
    pub ncol: u64,
    pub name: String,
}

/// A column to add to an existing table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub physical_id: String,
    pub field_id: Uuid,
    pub label: String,
    pub field_type: String,
}

impl ColumnSpec {
    /// Generates the physical id and field UUID from the label.
    pub fn new(label: impl Into<String>, field_type: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            physical_id: generate_field_id(&label),
            field_id: Uuid::new_v4(),
            label,
            field_type: field_type.into(),
        }
    }
}

/// Identifies an existing column by both its physical name and field UUID.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub physical_id: String,
    pub field_id: Uuid,
}

impl From<&FieldEntry> for ColumnRef {
    fn from(field: &FieldEntry) -> Self {
        Self {
            physical_id: field.id.clone(),
            field_id: field.field_id,
        }
    }
}

/// Outcome of a multi-table database creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDatabaseReport {
    pub database: DatabaseKey,
    pub committed_tables: Vec<String>,
}

/// One page of grid rows and the total row (or group) count behind it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    pub rows: Vec<Map<String, JsonValue>>,
    pub row_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HdError;

    #[test]
    fn key_validates_and_names_schema() {
        let key = DatabaseKey::new("acme", "sales").expect("key");
        assert_eq!(key.schema_name(), "acme__sales");
        assert_eq!(key.to_string(), "acme/sales");
        assert!(matches!(
            DatabaseKey::new("acme", "sales; DROP"),
            Err(HdError::Validation { .. })
        ));
        assert!(DatabaseKey::new("", "sales").is_err());
    }

    #[test]
    fn field_listing_flattens_and_omits_missing_categories() {
        let listing = FieldListing {
            field: FieldEntry {
                field_id: Uuid::nil(),
                id: "name_abcdef".into(),
                label: "Name".into(),
                table: "users".into(),
                field_type: DEFAULT_FIELD_TYPE.into(),
            },
            categories: None,
        };
        let value = serde_json::to_value(&listing).expect("json");
        assert_eq!(value["type"], "Text");
        assert_eq!(value["table"], "users");
        assert!(value.get("categories").is_none());
    }

    #[test]
    fn column_spec_generates_identity() {
        let column = ColumnSpec::new("Email Address", DEFAULT_FIELD_TYPE);
        assert!(column.physical_id.starts_with("email_address_"));
        assert_eq!(column.label, "Email Address");
        assert_ne!(column.field_id, Uuid::nil());
    }
}
