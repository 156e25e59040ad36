// jogja_ingestor/src/error.rs
// Error types for the ingestion pipeline and its store backends.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error,)]
pub enum IngestorError {
    #[error("Failed to connect to database: {0}")]
    ConnectionError(String,),
    #[error("Invalid configuration: {0}")]
    ConfigurationError(String,),
    #[error("Database specific error: {0}")]
    DatabaseError(String,),
    #[error("Duplicate key: {0}")]
    DuplicateKey(String,),
    #[error("Index not found: {0}")]
    IndexNotFound(String,),
    #[error("Operation timed out: {0}")]
    Timeout(String,),
    #[error("CSV file not found at: {}", .0.display())]
    MissingInput(PathBuf,),
    #[error("No valid destinations found after processing {processed} rows")]
    NoValidRecords { processed: usize, },
    #[error("Invalid query: {0}")]
    InvalidQuery(String,),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error,),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv_async::Error,),
    #[error("Other error: {0}")]
    Other(String,),
}

impl IngestorError {
    /// Errors worth another attempt: the importer degrades these to per-record
    /// inserts, and connection setup retries them with backoff.
    pub fn is_transient(&self,) -> bool {
        match self {
            IngestorError::ConnectionError(_,) | IngestorError::Timeout(_,) => true,
            IngestorError::DatabaseError(msg,) => {
                let m = msg.to_lowercase();
                m.contains("timeout",)
                    || m.contains("timed out",)
                    || m.contains("connection",)
                    || m.contains("busy",)
                    || m.contains("server selection",)
                    || m.contains("connection reset",)
                    || m.contains("service unavailable",)
            },
            _ => false,
        }
    }

    pub fn is_duplicate_key(&self,) -> bool {
        matches!(self, IngestorError::DuplicateKey(_,))
    }

    /// Preconditions that end an import run with a non-zero exit.
    pub fn is_fatal(&self,) -> bool {
        matches!(
            self,
            IngestorError::MissingInput(_,)
                | IngestorError::ConfigurationError(_,)
                | IngestorError::ConnectionError(_,)
                | IngestorError::NoValidRecords { .. }
        )
    }
}

pub type Result<T,> = std::result::Result<T, IngestorError,>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transient_database_messages() {
        assert!(IngestorError::DatabaseError("Server selection timeout".into()).is_transient());
        assert!(IngestorError::Timeout("batch 3".into()).is_transient());
        assert!(!IngestorError::DatabaseError("document failed validation".into()).is_transient());
        assert!(!IngestorError::DuplicateKey("E11000".into()).is_transient());
    }

    #[test]
    fn fatal_preconditions() {
        assert!(IngestorError::MissingInput(PathBuf::from("x.csv")).is_fatal());
        assert!(IngestorError::NoValidRecords { processed: 3 }.is_fatal());
        assert!(!IngestorError::DuplicateKey("E11000".into()).is_fatal());
    }
}
