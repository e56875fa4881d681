use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No engine executable could be located. Blocks start, nothing else.
    #[error("Engine not found: {0}")]
    Resolution(String),

    /// The OS refused to launch the engine process.
    #[error("Failed to launch engine: {0}")]
    Spawn(String),

    /// A best-effort engine command (doctor, plugins) failed or timed out.
    #[error("Preparation command failed: {0}")]
    Preparation(String),

    /// The engine exited on its own while it was expected to keep running.
    #[error("Engine exited: {0}")]
    RuntimeExit(String),

    #[error("Failed to write engine configuration: {0}")]
    ConfigWrite(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Install error: {0}")]
    Install(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
