use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordError {
    #[error("user data dir is required and cannot be empty")]
    EmptyUserDataDir,
    #[error("profile directory does not exist: {path}")]
    MissingProfile { path: String },
    #[error("timed out waiting for mutex {path}")]
    MutexTimeout { path: String },
    #[error("coordination i/o failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl CoordError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
