use std::ops::Range;

use fretline_audio::{AudioBackend, PitchEstimate, PitchEstimator, SignalSource};
use fretline_domain::{note_from_pitch, NoteName, Sequence, SequenceRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::analytics::SessionSummary;
use crate::clock::{ClockKind, PlaybackClock};
use crate::config::{EngineConfig, CALIBRATION_STEP_MS};
use crate::error::SessionError;
use crate::scoring::{HitEvaluator, NoteOutcome, NoteState, ScoreState};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Paused,
    Complete,
}

/// Where the engine listens. `None` runs a session with no capture at all;
/// every tick then estimates `NoPitch`.
pub enum InputSource {
    None,
    Microphone(Box<dyn AudioBackend>),
}

/// What one tick observed and decided.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub now_ms: f64,
    pub estimate: PitchEstimate,
    pub detected_note: Option<NoteName>,
    pub outcomes: Vec<NoteOutcome>,
    /// Set when this tick produced at least one hit.
    pub haptic: bool,
    /// Sequence indices inside the look-behind/look-ahead window.
    pub visible: Range<usize>,
    pub score: ScoreState,
    pub completed: Option<SessionSummary>,
}

type CompletionCallback = Box<dyn FnMut(&SessionSummary)>;

struct ActiveSession {
    sequence: Sequence,
    clock: Box<dyn PlaybackClock>,
    capture: Option<Box<dyn SignalSource>>,
    evaluator: HitEvaluator,
}

impl ActiveSession {
    fn release(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.close();
        }
        self.clock.stop();
    }
}

/// Drives one practice session at a time: clock, capture, estimation and
/// hit evaluation, advanced by calling [`TimingEngine::tick`] at frame rate.
pub struct TimingEngine {
    config: EngineConfig,
    input: InputSource,
    estimator: PitchEstimator,
    state: SessionState,
    calibration_offset_ms: f64,
    session: Option<ActiveSession>,
    summary: Option<SessionSummary>,
    on_complete: Option<CompletionCallback>,
}

impl TimingEngine {
    pub fn new(config: EngineConfig, input: InputSource) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            estimator: PitchEstimator::new(config.estimator),
            calibration_offset_ms: config.calibration_offset_ms,
            config,
            input,
            state: SessionState::Idle,
            session: None,
            summary: None,
            on_complete: None,
        })
    }

    /// Invoked exactly once per session, when it completes or is stopped.
    pub fn with_completion<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&SessionSummary) + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sequence(&self) -> Option<&Sequence> {
        self.session.as_ref().map(|s| &s.sequence)
    }

    pub fn clock_kind(&self) -> Option<ClockKind> {
        self.session.as_ref().map(|s| s.clock.kind())
    }

    pub fn note_state(&self, sequence_index: usize) -> Option<NoteState> {
        self.session
            .as_ref()
            .and_then(|s| s.evaluator.state(sequence_index))
    }

    pub fn score(&self) -> ScoreState {
        self.session
            .as_ref()
            .map(|s| s.evaluator.score())
            .unwrap_or_default()
    }

    /// Summary of the last finished session.
    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    pub fn calibration_offset_ms(&self) -> f64 {
        self.calibration_offset_ms
    }

    pub fn set_calibration_offset_ms(&mut self, offset_ms: f64) {
        if offset_ms.is_finite() {
            self.calibration_offset_ms = offset_ms;
            debug!(offset_ms, "calibration offset changed");
        }
    }

    /// Shifts the calibration offset by whole steps; positive is later.
    pub fn nudge_calibration(&mut self, steps: i32) -> f64 {
        let offset_ms = self.calibration_offset_ms + steps as f64 * CALIBRATION_STEP_MS;
        self.set_calibration_offset_ms(offset_ms);
        self.calibration_offset_ms
    }

    /// Length of the running session before the completion grace period.
    pub fn total_duration_ms(&self) -> Option<f64> {
        self.session.as_ref().map(|session| {
            completion_bounds(
                &self.config,
                &session.sequence,
                session.clock.duration_ms(),
                self.calibration_offset_ms,
            )
            .0
        })
    }

    /// Opens capture and starts the clock. On any failure the engine is
    /// left `Idle` with nothing held open.
    #[instrument(skip_all, fields(notes = sequence.len(), clock = ?clock.kind()))]
    pub fn start(
        &mut self,
        sequence: Sequence,
        mut clock: Box<dyn PlaybackClock>,
    ) -> Result<(), SessionError> {
        if matches!(self.state, SessionState::Running | SessionState::Paused) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                action: "start",
            });
        }
        if let Some(mut previous) = self.session.take() {
            previous.release();
        }
        self.state = SessionState::Idle;
        self.summary = None;

        let mut capture = match &self.input {
            InputSource::None => None,
            InputSource::Microphone(backend) => {
                Some(backend.open_input(&self.config.capture).map_err(|err| {
                    warn!(%err, "capture could not be opened");
                    SessionError::DeviceUnavailable(err)
                })?)
            }
        };
        if let Err(err) = clock.start() {
            warn!(%err, "clock could not be started");
            if let Some(capture) = capture.as_mut() {
                capture.close();
            }
            clock.stop();
            return Err(SessionError::ClockSourceUnavailable(err.to_string()));
        }

        let evaluator = HitEvaluator::new(
            &sequence,
            &self.config.tuning,
            self.config.hit_window_ms,
            self.config.per_hit_score,
            self.config.match_policy,
        );
        self.session = Some(ActiveSession {
            sequence,
            clock,
            capture,
            evaluator,
        });
        self.state = SessionState::Running;
        info!(
            offset_ms = self.calibration_offset_ms,
            total_ms = ?self.total_duration_ms(),
            "session started"
        );
        Ok(())
    }

    /// Validates a wire record before starting.
    pub fn start_from_record(
        &mut self,
        record: SequenceRecord,
        clock: Box<dyn PlaybackClock>,
    ) -> Result<(), SessionError> {
        let sequence = Sequence::try_from(record)?;
        self.start(sequence, clock)
    }

    /// Advances the session by one step. Returns `None` unless running.
    pub fn tick(&mut self) -> Option<TickReport> {
        if self.state != SessionState::Running {
            return None;
        }
        let offset_ms = self.calibration_offset_ms;
        let session = self.session.as_mut()?;
        session.clock.poll();
        let now_ms = session.clock.now_ms();

        let estimate = match session.capture.as_mut() {
            Some(capture) => self.estimator.estimate(&capture.read_frame()),
            None => PitchEstimate::NoPitch,
        };
        let detected_note = estimate.frequency().and_then(note_from_pitch);
        let mut outcomes = session
            .evaluator
            .evaluate(&session.sequence, now_ms, offset_ms, estimate);

        let visible = visible_range(
            &session.sequence,
            now_ms - self.config.look_behind_ms,
            now_ms + self.config.look_ahead_ms,
            offset_ms,
        );
        let (total_ms, grace_ms) = completion_bounds(
            &self.config,
            &session.sequence,
            session.clock.duration_ms(),
            offset_ms,
        );
        let finished = now_ms > total_ms + grace_ms;
        if finished {
            outcomes.extend(session.evaluator.resolve_remaining());
        }
        for outcome in &outcomes {
            debug!(?outcome, now_ms, "note resolved");
        }
        let haptic = outcomes.iter().any(NoteOutcome::is_hit);
        let score = session.evaluator.score();

        let completed = if finished { self.finish(false) } else { None };
        Some(TickReport {
            now_ms,
            estimate,
            detected_note,
            outcomes,
            haptic,
            visible,
            score,
            completed,
        })
    }

    /// Freezes the clock. Capture stays open.
    pub fn pause(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Running {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                action: "pause",
            });
        }
        if let Some(session) = self.session.as_mut() {
            session.clock.pause();
        }
        self.state = SessionState::Paused;
        debug!("session paused");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Paused {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                action: "resume",
            });
        }
        if let Some(session) = self.session.as_mut() {
            session
                .clock
                .resume()
                .map_err(|err| SessionError::ClockSourceUnavailable(err.to_string()))?;
            // Audio captured while paused must not be scored.
            if let Some(capture) = session.capture.as_mut() {
                capture.discard();
            }
        }
        self.state = SessionState::Running;
        debug!("session resumed");
        Ok(())
    }

    /// Abandons a running or paused session and reports its partial score.
    /// Does nothing in any other state.
    pub fn stop(&mut self) -> Option<SessionSummary> {
        match self.state {
            SessionState::Running | SessionState::Paused => self.finish(true),
            SessionState::Idle | SessionState::Complete => None,
        }
    }

    fn finish(&mut self, abandoned: bool) -> Option<SessionSummary> {
        let session = self.session.as_mut()?;
        session.release();
        let summary = SessionSummary::new(
            session.evaluator.score(),
            session.evaluator.states(),
            session.clock.kind(),
            abandoned,
        );
        self.state = SessionState::Complete;
        info!(
            score = summary.score,
            hits = summary.hits,
            misses = summary.misses,
            stars = summary.stars,
            abandoned,
            "session complete"
        );
        if let Some(callback) = self.on_complete.as_mut() {
            callback(&summary);
        }
        self.summary = Some(summary.clone());
        Some(summary)
    }
}

impl Drop for TimingEngine {
    fn drop(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.release();
        }
    }
}

/// Indices of notes whose shifted time lies in `[from_ms, to_ms]`.
fn visible_range(sequence: &Sequence, from_ms: f64, to_ms: f64, offset_ms: f64) -> Range<usize> {
    let notes = sequence.notes();
    let start = notes.partition_point(|n| n.scheduled_time_ms + offset_ms < from_ms);
    let end = notes.partition_point(|n| n.scheduled_time_ms + offset_ms <= to_ms);
    start..end.max(start)
}

/// Session length and the grace period allowed after it. The grace only
/// applies when the length comes from the track or the content; a length
/// derived from the last note already carries a fixed tail.
fn completion_bounds(
    config: &EngineConfig,
    sequence: &Sequence,
    track_ms: Option<f64>,
    offset_ms: f64,
) -> (f64, f64) {
    if let Some(track_ms) = track_ms {
        return (track_ms, config.completion_grace_ms);
    }
    if let Some(total_ms) = sequence.total_duration_ms() {
        return (total_ms + offset_ms, config.completion_grace_ms);
    }
    (
        sequence.last_note_time_ms() + offset_ms + config.fixed_tail_ms,
        0.0,
    )
}
