//! Error types for the container, transactions and data access

use thiserror::Error;

/// Errors that can occur while wiring beans or talking to the database
#[derive(Error, Debug, Clone)]
pub enum IocError {
    /// No singleton or candidate carries this bean name
    #[error("No bean found with name: {name}")]
    BeanNotFoundByName { name: String },

    /// No singleton or candidate exposes this type
    #[error("No bean found with type: {type_name}")]
    BeanNotFoundByType { type_name: &'static str },

    /// More than one instantiated singleton exposes this type
    #[error("No unique bean of type {type_name}: found {candidates:?}")]
    AmbiguousBeanType {
        type_name: &'static str,
        candidates: Vec<String>,
    },

    /// Constructor selection failed (none or several carry the inject marker)
    #[error("Cannot choose a constructor for {type_name}: {inject_marked} of {declared} constructors carry the inject marker")]
    AmbiguousConstructor {
        type_name: &'static str,
        declared: usize,
        inject_marked: usize,
    },

    /// Bean construction, injection or post-processing failed
    #[error("Failed to create bean {name}: {reason}")]
    BeanCreationFailed {
        name: String,
        reason: String,
        #[source]
        source: Option<Box<IocError>>,
    },

    /// A bean was found by name but does not expose the requested type
    #[error("Bean {name} is not of required type {type_name}")]
    BeanNotOfRequiredType {
        name: String,
        type_name: &'static str,
    },

    /// A constructor dependency chain leads back to a bean under construction
    #[error("Cyclic constructor dependency while creating {name}: {}", path.join(" -> "))]
    CircularDependency { name: String, path: Vec<String> },

    /// A repository interface has no entity binding
    #[error("Entity type not resolvable for repository {type_name}")]
    EntityTypeNotResolvable { type_name: &'static str },

    /// The driver rejected a statement
    #[error("SQL execution failed [{sql}]: {reason}")]
    SqlExecutionFailed { sql: String, reason: String },

    /// A column value could not be assigned to an entity field
    #[error("Failed to map column {column} onto {entity}: {reason}")]
    EntityMappingFailed {
        entity: &'static str,
        column: String,
        reason: String,
    },

    /// `find_by_id` matched no row
    #[error("No record in {table} with id {id}")]
    RecordNotFound { table: String, id: String },

    /// A resource is already bound to this context
    #[error("A resource is already bound to this context")]
    ResourceAlreadyBound,

    /// commit/rollback without an active transaction
    #[error("No active transaction")]
    NoActiveTransaction,

    /// A transaction step failed; cleanup failures are reported alongside
    #[error("Transaction {operation} failed: {reason}{}", cleanup.as_ref().map(|c| format!(" (cleanup also failed: {c})")).unwrap_or_default())]
    TransactionFailed {
        operation: &'static str,
        reason: String,
        cleanup: Option<String>,
    },

    /// The component scanner could not produce descriptors
    #[error("Component scan failed for {root}: {reason}")]
    ScanFailed { root: String, reason: String },

    /// Internal error
    #[error("Internal IoC error: {0}")]
    Internal(String),
}

impl IocError {
    /// Create a BeanNotFoundByName error
    #[inline]
    pub fn not_found_by_name(name: impl Into<String>) -> Self {
        Self::BeanNotFoundByName { name: name.into() }
    }

    /// Create a BeanNotFoundByType error for a type
    #[inline]
    pub fn not_found_by_type<T: ?Sized + 'static>() -> Self {
        Self::BeanNotFoundByType {
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Create a BeanCreationFailed error without an underlying cause
    #[inline]
    pub fn creation_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BeanCreationFailed {
            name: name.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Wrap a failure raised while creating `name`
    pub fn creation_failed_by(name: impl Into<String>, cause: IocError) -> Self {
        Self::BeanCreationFailed {
            name: name.into(),
            reason: cause.to_string(),
            source: Some(Box::new(cause)),
        }
    }

    /// Create a SqlExecutionFailed error
    #[inline]
    pub fn sql(sql: impl Into<String>, reason: impl ToString) -> Self {
        Self::SqlExecutionFailed {
            sql: sql.into(),
            reason: reason.to_string(),
        }
    }

    /// Walk `BeanCreationFailed` wrappers down to the innermost cause
    pub fn root_cause(&self) -> &IocError {
        let mut current = self;
        while let Self::BeanCreationFailed {
            source: Some(inner),
            ..
        } = current
        {
            current = inner;
        }
        current
    }
}

/// Result type alias for container and data-access operations
pub type Result<T> = std::result::Result<T, IocError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_nested_creation_failures() {
        let inner = IocError::not_found_by_type::<u32>();
        let outer = IocError::creation_failed_by(
            "outer",
            IocError::creation_failed_by("middle", inner),
        );

        assert!(matches!(
            outer.root_cause(),
            IocError::BeanNotFoundByType { type_name: "u32" }
        ));
    }

    #[test]
    fn test_transaction_failure_reports_cleanup() {
        let err = IocError::TransactionFailed {
            operation: "commit",
            reason: "disk full".into(),
            cleanup: Some("close failed".into()),
        };
        let message = err.to_string();
        assert!(message.contains("disk full"));
        assert!(message.contains("close failed"));
    }
}
