use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    /// The client cannot be keyed into the registry (empty session or
    /// client id). Detected before any mutation takes place.
    #[error("Invalid client: {0}")]
    InvalidClient(String),

    /// A remove variant was called for a session id the registry has
    /// never seen.
    #[error("Unknown session: {0}")]
    UnknownSession(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
