use thiserror::Error;

/// Errors local to the SQLite backend, before being folded into
/// `nwc_core::error::Error::Store` at the trait boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// Any rusqlite or connection-thread failure.
    #[error("sqlite error: {0}")]
    Sqlite(String),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Sqlite(e.to_string())
    }
}

impl From<Error> for nwc_core::error::Error {
    fn from(e: Error) -> Self {
        nwc_core::error::Error::Store(e.to_string())
    }
}
