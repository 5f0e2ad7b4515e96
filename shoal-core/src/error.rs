use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShoalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index format error: {0}")]
    Format(String),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Control protocol error: {0}")]
    Protocol(String),

    #[error("Message codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl ShoalError {
    /// OS error code behind this error, when there is one. Used to propagate
    /// setup failures into the process exit status.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            ShoalError::Io(e) => e.raw_os_error(),
            ShoalError::Spawn { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, ShoalError>;
