pub mod analytics;
pub mod clock;
pub mod config;
pub mod error;
pub mod scoring;
pub mod session;
pub mod tuner;

pub use analytics::{stars_for_accuracy, SessionSummary};
pub use clock::{
    media_or_wall_clock, ClockKind, InstantSource, ManualTime, MediaClock, PlaybackClock,
    TimeSource, WallClock,
};
pub use config::{EngineConfig, CALIBRATION_STEP_MS};
pub use error::SessionError;
pub use scoring::{HitEvaluator, MatchPolicy, NoteOutcome, NoteState, ScoreState};
pub use session::{InputSource, SessionState, TickReport, TimingEngine};
pub use tuner::{check_string, TargetCheck, TuneDirection, Tuner, TunerReading, IN_TUNE_CENTS};
