use std::fmt;

use thiserror::Error;

/// Where a failure happened: tenant, table, column and the statement the engine rejected.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub org: Option<String>,
    pub db: Option<String>,
    pub table: Option<String>,
    pub column: Option<String>,
    pub statement: Option<String>,
    pub committed_tables: Vec<String>,
}

impl ErrorContext {
    pub fn database(org: impl Into<String>, db: impl Into<String>) -> Self {
        Self {
            org: Some(org.into()),
            db: Some(db.into()),
            ..Self::default()
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = Some(statement.into());
        self
    }

    pub fn with_committed(mut self, tables: Vec<String>) -> Self {
        self.committed_tables = tables;
        self
    }

    fn absorb(&mut self, other: &ErrorContext) {
        if self.org.is_none() {
            self.org.clone_from(&other.org);
        }
        if self.db.is_none() {
            self.db.clone_from(&other.db);
        }
        if self.table.is_none() {
            self.table.clone_from(&other.table);
        }
        if self.column.is_none() {
            self.column.clone_from(&other.column);
        }
        if self.statement.is_none() {
            self.statement.clone_from(&other.statement);
        }
        if self.committed_tables.is_empty() {
            self.committed_tables.clone_from(&other.committed_tables);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(org) = &self.org {
            parts.push(format!("org={org}"));
        }
        if let Some(db) = &self.db {
            parts.push(format!("db={db}"));
        }
        if let Some(table) = &self.table {
            parts.push(format!("table={table}"));
        }
        if let Some(column) = &self.column {
            parts.push(format!("column={column}"));
        }
        if !self.committed_tables.is_empty() {
            parts.push(format!("committed=[{}]", self.committed_tables.join(",")));
        }
        if !parts.is_empty() {
            write!(f, " [{}]", parts.join(" "))?;
        }
        if let Some(statement) = &self.statement {
            write!(f, " in query: {}", statement.trim())?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum HdError {
    #[error("connection error: {message}")]
    Connection { message: String },
    #[error("query error: {message}{context}")]
    Query {
        message: String,
        context: ErrorContext,
    },
    #[error("table '{table}' already exists{context}")]
    TableExists {
        table: String,
        context: ErrorContext,
    },
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("validation error: {message}")]
    Validation { message: String },
    #[error("transaction error: {message}{context}")]
    Transaction {
        message: String,
        context: ErrorContext,
    },
    #[error("data type error: {message}")]
    DataType { message: String },
}

impl HdError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn table_exists(table: impl Into<String>) -> Self {
        Self::TableExists {
            table: table.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn data_type(message: impl Into<String>) -> Self {
        Self::DataType {
            message: message.into(),
        }
    }

    /// Fills in any context fields the error does not already carry.
    pub fn with_context(mut self, ctx: &ErrorContext) -> Self {
        if let Some(existing) = self.context_mut() {
            existing.absorb(ctx);
        }
        self
    }

    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        if let Some(existing) = self.context_mut() {
            if existing.statement.is_none() {
                existing.statement = Some(statement.into());
            }
        }
        self
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Query { context, .. }
            | Self::TableExists { context, .. }
            | Self::Transaction { context, .. } => Some(context),
            _ => None,
        }
    }

    fn context_mut(&mut self) -> Option<&mut ErrorContext> {
        match self {
            Self::Query { context, .. }
            | Self::TableExists { context, .. }
            | Self::Transaction { context, .. } => Some(context),
            _ => None,
        }
    }
}

pub type HdResult<T> = Result<T, HdError>;

impl From<sea_orm::DbErr> for HdError {
    fn from(value: sea_orm::DbErr) -> Self {
        match value {
            sea_orm::DbErr::Conn(err) => HdError::connection(err.to_string()),
            other => HdError::query(other.to_string()),
        }
    }
}
