use thiserror::Error;

/// Failure to acquire or run the capture device. Recoverable: the caller
/// reports the microphone as unavailable and keeps running.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("no audio input device available")]
    NoInputDevice,
    #[error("input device not found: {0}")]
    DeviceNotFound(String),
    #[error("input device unavailable: {0}")]
    Unavailable(String),
    #[error("unsupported capture configuration: {0}")]
    UnsupportedConfig(String),
    #[error("failed to run input stream: {0}")]
    Stream(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("failed to load backing track: {0}")]
    Load(String),
    #[error("no audio output device available")]
    NoOutputDevice,
    #[error("failed to run output stream: {0}")]
    Output(String),
}
