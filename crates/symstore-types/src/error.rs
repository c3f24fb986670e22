use thiserror::Error;

/// Errors produced while parsing raw records.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// The record carries no type tag, or an empty list of them.
    #[error("record has no `{key}` tag")]
    MissingType { key: String },

    /// The type tag is neither a string nor a list of strings.
    #[error("invalid type tag: {0}")]
    InvalidType(String),

    /// The record carries no id, or a null one.
    #[error("record has no `{key}`")]
    MissingId { key: String },

    /// The id is not a scalar.
    #[error("invalid id: {0}")]
    InvalidId(String),

    /// A value expected to be a record is not a JSON object.
    #[error("expected a record object, found {0}")]
    NotARecord(String),

    /// A list-valued field holds something other than records.
    #[error("field `{field}` element {index} is not a record")]
    InvalidListElement { field: String, index: usize },
}

/// Convenience alias for parsing results.
pub type Result<T> = std::result::Result<T, TypeError>;
