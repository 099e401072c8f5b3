use thiserror::Error;

/// A configuration value that loaded but is not usable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required value is missing or blank.
    #[error("`{0}` must be set")]
    MissingField(String),

    /// A value is present but outside its allowed range.
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}
