//! Shared error types for the orchestration engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },

    #[error("Invalid run window: {message}")]
    InvalidWindow { message: String },

    #[error("Unknown provider: {input}")]
    UnknownProvider { input: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
