//! Shared error types for the services crate.

use std::path::PathBuf;

use thiserror::Error;

use exam_core::model::DescriptorError;
use exam_core::route::RouteError;
use exam_core::session::SessionError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `QuestionSupplier`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SupplierError {
    #[error("no questions matched the request")]
    Empty,
    #[error(transparent)]
    Source(#[from] StorageError),
}

/// Errors emitted by `SessionController` actions.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ControllerError {
    /// The action needs a live attempt but the controller is loading, empty
    /// or already finished.
    #[error("no active session")]
    NotActive,
    #[error("restart is only available once the session is complete")]
    NotComplete,
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `SimulationLauncher`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LaunchError {
    #[error("invalid route: {0}")]
    Route(String),
    #[error(transparent)]
    Parse(#[from] RouteError),
}

/// Errors emitted while loading `EngineConfig`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {name}: {raw}")]
    InvalidEnv { name: &'static str, raw: String },
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
