use crate::{HdError, HdResult};

pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Catalog relations owned by every tenant schema; user tables may not shadow them.
pub const CATALOG_TABLES: [&str; 3] = ["hd_database", "hd_tables", "hd_fields"];

/// Accepts `[A-Za-z0-9_]+` up to [`MAX_IDENTIFIER_LEN`] characters.
pub fn validate_identifier(kind: &str, name: &str) -> HdResult<()> {
    if name.is_empty() {
        return Err(HdError::invalid(format!("{kind} name must not be empty")));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(HdError::invalid(format!(
            "{kind} name '{name}' exceeds {MAX_IDENTIFIER_LEN} characters"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || *ch == '_'))
    {
        return Err(HdError::invalid(format!(
            "{kind} name '{name}' contains invalid character '{bad}'"
        )));
    }
    Ok(())
}

pub fn validate_table_name(name: &str) -> HdResult<()> {
    validate_identifier("table", name)?;
    let lowered = name.to_ascii_lowercase();
    if CATALOG_TABLES.contains(&lowered.as_str()) || lowered.starts_with("sqlite_") {
        return Err(HdError::invalid(format!("table name '{name}' is reserved")));
    }
    Ok(())
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_generated_column_ids() {
        assert!(validate_identifier("column", "city_of_birth_AbCdEf").is_ok());
        assert!(validate_identifier("column", "2020_revenue_xyzXYZ").is_ok());
        assert!(validate_identifier("column", "rcd___id").is_ok());
    }

    #[test]
    fn rejects_injection_shaped_names() {
        assert!(validate_identifier("column", "").is_err());
        assert!(validate_identifier("column", "a\"; DROP TABLE x; --").is_err());
        assert!(validate_identifier("column", "with space").is_err());
        assert!(validate_identifier("column", &"x".repeat(MAX_IDENTIFIER_LEN + 1)).is_err());
    }

    #[test]
    fn catalog_and_engine_names_are_reserved() {
        assert!(validate_table_name("hd_fields").is_err());
        assert!(validate_table_name("HD_TABLES").is_err());
        assert!(validate_table_name("sqlite_master").is_err());
        assert!(validate_table_name("users").is_ok());
    }

    #[test]
    fn quoting_doubles_delimiters() {
        assert_eq!(quote_ident("country"), "\"country\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
    }
}
