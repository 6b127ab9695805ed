use crate::{CalibrationError, CommandChannelError, ConfigError};

/// Errors that end (or prevent) a monitoring session.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("calibration load failed: {0}")]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("arm command channel failed: {0}")]
    CommandChannel(#[from] CommandChannelError),
    #[error("detector stream closed")]
    DetectorClosed,
    #[error("session already shut down")]
    Finished,
}

impl SessionError {
    /// Whether the error compromises the safety link and ends the session.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SessionError::DetectorClosed)
    }
}
