use std::{io, path::PathBuf};

use thiserror::Error;

/// Fatal errors for the offline conversion step. Any of these aborts the
/// conversion without touching the existing artifact.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("unable to read source file {path}: {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed source JSON: {0}")]
    SourceParse(#[from] serde_json::Error),
    #[error("unexpected source layout: {0}")]
    SourceShape(String),
    #[error("failed to serialize feature collection: {0}")]
    ArtifactSerialize(#[source] serde_json::Error),
    #[error("unable to write artifact {path}: {source}")]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
