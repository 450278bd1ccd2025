use thiserror::Error;

pub type TypeResult<T> = Result<T, TypeError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("unsupported value: {0}")]
    Unsupported(String),
    #[error("duplicate interface: {0}")]
    DuplicateInterface(String),
    #[error("interface {name}: {reason}")]
    InvalidInterface { name: String, reason: String },
}
