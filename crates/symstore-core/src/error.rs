use symstore_types::{EntityId, TypeError, TypeName};

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No collection exists for the requested type.
    #[error("unknown model '{0}'")]
    UnknownModel(TypeName),

    /// The collection exists but holds no record with this id.
    #[error("unknown record '{id}' in model '{type_name}'")]
    UnknownRecord { type_name: TypeName, id: EntityId },

    /// The raw input could not be parsed into records.
    #[error("malformed record: {0}")]
    Raw(#[from] TypeError),

    /// An internal invariant of the entity graph does not hold. The
    /// operation that hit it is abandoned without rollback.
    #[error("entity graph corrupted: {reason}")]
    Corrupt { reason: String },
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
