use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while describing the site or loading its project data.
#[derive(Debug, Error)]
pub enum SiteError {
    /// The site cannot be served as configured (no host names, bad content root).
    #[error("invalid site configuration: {0}")]
    Configuration(String),

    #[error("projects directory {} is missing or unreadable: {source}", path.display())]
    DirectoryNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read project file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("project file {} is not valid JSON: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, SiteError>;
