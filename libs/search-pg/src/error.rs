//! Error types for the PostgreSQL search engine

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No search configuration registered for entity '{0}'")]
    UnknownEntity(String),

    #[error(transparent)]
    Core(#[from] sifter_core::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
