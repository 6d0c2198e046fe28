use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("not found")]
    NotFound,
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("vector index error: {0}")]
    Index(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
