//! Error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by the host platform layer.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: unexpected content {content:?}", path.display())]
    Malformed { path: PathBuf, content: String },

    #[error("core {0} does not exist")]
    NoSuchCore(usize),
}

impl PlatformError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors that abort governor startup.
#[derive(Debug, Error)]
pub enum GovernorError {
    /// The scheduler worker thread could not be created.
    #[error("failed to spawn scheduler worker: {0}")]
    Spawn(#[source] io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("control surface {}: {source}", path.display())]
    Control {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type PlatformResult<T> = Result<T, PlatformError>;
