use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation error on '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("duplicate {kind} for {key}: already exists as id {existing_id}{}", name_suffix(.existing_name))]
    Duplicate {
        kind: &'static str,
        key: String,
        existing_id: i64,
        existing_name: Option<String>,
    },

    #[error("invalid pagination: {field} = {value}")]
    Pagination { field: &'static str, value: i64 },

    #[error("invalid mode '{0}': expected 'summary' or 'details'")]
    InvalidMode(String),

    #[error("storage '{storage}' unavailable: {reason}")]
    Unavailable { storage: String, reason: String },

    #[error("database busy: write lock not acquired after {attempts} attempts")]
    Busy { attempts: u32 },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code for callers that branch on the failure class.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Duplicate { .. } => "DUPLICATE_ERROR",
            Self::Pagination { .. } => "PAGINATION_ERROR",
            Self::InvalidMode(_) => "INVALID_MODE",
            Self::Unavailable { .. } => "UNAVAILABLE",
            Self::Busy { .. } => "BUSY",
            Self::Database(_) | Self::Io(_) | Self::Serialization(_) | Self::Config(_) => {
                "INTERNAL"
            }
        }
    }
}

fn name_suffix(name: &Option<String>) -> String {
    name.as_deref()
        .map(|n| format!(" ('{n}')"))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;
