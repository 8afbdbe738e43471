// Loading errors for fleet snapshots, station directories and sim config.
//
// Runtime paths never produce errors: missing data degrades to omission
// (excluded records, skipped assignments). Only the startup loaders return
// `FleetError`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read a whole file, tagging the error with its path.
pub(crate) fn read_file(path: &std::path::Path) -> Result<String, FleetError> {
    std::fs::read_to_string(path).map_err(|source| FleetError::Io {
        path: path.to_path_buf(),
        source,
    })
}
