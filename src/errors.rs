use sea_orm::error::DbErr;
use serde::Serialize;
use std::fmt;

/// A `(warehouse, location)` pair that is already claimed by other parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationConflict {
    pub warehouse_code: String,
    pub warehouse_name: String,
    pub location_code: String,
    /// Conflicting parts rendered as `"CODE - Name"`.
    pub parts: Vec<String>,
}

impl fmt::Display for LocationConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} is used by {}",
            self.warehouse_name,
            self.location_code,
            self.parts.join(", ")
        )
    }
}

fn render_conflicts(conflicts: &[LocationConflict]) -> String {
    conflicts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Duplicate code: {0}")]
    DuplicateCode(String),

    #[error("Location conflict: {}", render_conflicts(.0))]
    LocationConflict(Vec<LocationConflict>),

    #[error("Still referenced: {0}")]
    Referenced(String),

    #[error("Insufficient stock: available {available}, requested {requested}")]
    InsufficientStock { available: i32, requested: i32 },

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    /// Stable machine-readable code for the presentation layer.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::DuplicateCode(_) => "duplicate_code",
            Self::LocationConflict(_) => "location_conflict",
            Self::Referenced(_) => "referenced",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::InvalidStatus(_) => "invalid_status",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Conflict-class errors identify the entity the caller has to resolve.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::DuplicateCode(_) | Self::LocationConflict(_) | Self::Referenced(_)
        )
    }

    /// Message safe to show to an operator; database details stay in the logs.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            _ => self.to_string(),
        }
    }
}

pub trait ResultExt<T> {
    fn map_err_to_service(self) -> Result<T, ServiceError>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<ServiceError>,
{
    fn map_err_to_service(self) -> Result<T, ServiceError> {
        self.map_err(|e| e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_error_wraps_plain_messages() {
        let err = ServiceError::db_error("connection reset");
        assert!(matches!(err, ServiceError::DatabaseError(DbErr::Custom(ref m)) if m == "connection reset"));
        assert_eq!(err.error_code(), "database_error");
        assert_eq!(err.response_message(), "Database error");
    }

    #[test]
    fn location_conflict_lists_every_part() {
        let err = ServiceError::LocationConflict(vec![LocationConflict {
            warehouse_code: "WH1".into(),
            warehouse_name: "Main".into(),
            location_code: "A-01".into(),
            parts: vec!["P-100 - Bolt".into(), "P-200 - Nut".into()],
        }]);
        assert_eq!(
            err.to_string(),
            "Location conflict: Main A-01 is used by P-100 - Bolt, P-200 - Nut"
        );
        assert!(err.is_conflict());
    }

    #[test]
    fn insufficient_stock_reports_both_quantities() {
        let err = ServiceError::InsufficientStock {
            available: 3,
            requested: 5,
        };
        assert_eq!(err.to_string(), "Insufficient stock: available 3, requested 5");
        assert_eq!(err.error_code(), "insufficient_stock");
        assert!(!err.is_conflict());
    }

    #[test]
    fn result_ext_converts_db_errors() {
        let res: Result<(), DbErr> = Err(DbErr::RecordNotFound("part".into()));
        let mapped = res.map_err_to_service();
        assert!(matches!(mapped, Err(ServiceError::DatabaseError(_))));
    }
}
