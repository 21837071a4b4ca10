use thiserror::Error;

use crate::query::ParseError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("query parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("invalid hint: {0} is not bound by any MATCH clause")]
    InvalidHint(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
