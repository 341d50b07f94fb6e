//! Errors that abort a diagnosis

use thiserror::Error;

use crate::sources::SourceError;

#[derive(Debug, Error)]
pub enum DiagnosisError {
    #[error("failed to get logs from container {container}: {source}")]
    LogFetch {
        container: String,
        #[source]
        source: SourceError,
    },
    #[error("no container to analyze in {unit}")]
    NoContainer { unit: String },
    #[error("diagnosis cancelled")]
    Cancelled,
}
