use thiserror::Error;

pub type GridResult<T> = Result<T, GridError>;

#[derive(Debug, Error)]
pub enum GridError {
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
