use fretline_audio::DeviceError;
use fretline_domain::DomainError;
use thiserror::Error;

use crate::session::SessionState;

/// Failures surfaced when a session is set up or driven through an invalid
/// transition. A running session never produces one from signal quality.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("microphone unavailable: {0}")]
    DeviceUnavailable(#[from] DeviceError),
    #[error("invalid sequence: {0}")]
    InvalidSequence(#[from] DomainError),
    #[error("clock source unavailable: {0}")]
    ClockSourceUnavailable(String),
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
    #[error("cannot {action} a session that is {from:?}")]
    InvalidTransition {
        from: SessionState,
        action: &'static str,
    },
}
