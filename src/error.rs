use thiserror::Error;
use uuid::Uuid;

/// Closed failure taxonomy surfaced across the core's public seams.
///
/// Only structural impossibilities become errors: unparseable input
/// structure, missing artifacts, bad query syntax, registry misses, and
/// I/O. Recoverable anomalies (cells that fail to coerce, documents that
/// fail validation) are degraded and reported as normal results instead.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("malformed input: {reason}")]
    MalformedInput { reason: String },

    #[error("artifact missing for dataset '{dataset}': {artifact} has not been generated")]
    ArtifactMissing {
        dataset: String,
        artifact: &'static str,
    },

    #[error("invalid query '{query}': {reason}")]
    InvalidQuery { query: String, reason: String },

    #[error("dataset not found: {0}")]
    DatasetNotFound(Uuid),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("schema persistence error: {0}")]
    SchemaPersistence(#[from] serde_yaml::Error),
}

impl CoreError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        CoreError::MalformedInput {
            reason: reason.into(),
        }
    }

    pub fn invalid_query(query: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::InvalidQuery {
            query: query.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable kind, for transports that map errors onto
    /// wire-level codes.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::MalformedInput { .. } => "malformed_input",
            CoreError::ArtifactMissing { .. } => "artifact_missing",
            CoreError::InvalidQuery { .. } => "invalid_query",
            CoreError::DatasetNotFound(_) => "dataset_not_found",
            CoreError::Io(_) => "io",
            CoreError::Csv(_) => "csv",
            CoreError::Xml(_) => "xml",
            CoreError::SchemaPersistence(_) => "schema_persistence",
        }
    }
}

/// A cell that failed to coerce under an already-committed schema.
///
/// Deliberately not a [`CoreError`] variant: the importer recovers by
/// storing the widened string fallback and logging, so the condition never
/// crosses a public boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMismatch {
    pub column: String,
    pub raw: String,
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable_tokens() {
        let err = CoreError::malformed("no consistent delimiter");
        assert_eq!(err.kind(), "malformed_input");
        assert!(err.to_string().contains("no consistent delimiter"));

        let err = CoreError::invalid_query("//record[", "unterminated predicate");
        assert_eq!(err.kind(), "invalid_query");
        assert!(err.to_string().contains("//record["));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: CoreError = io.into();
        assert_eq!(err.kind(), "io");
    }
}
