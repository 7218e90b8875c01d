//! Session time sources.
//!
//! Both clocks report milliseconds since the session started. A wall clock
//! counts real time minus pauses; a media clock follows the backing track's
//! playhead, so the note stream stays aligned with what is actually heard.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use fretline_audio::{MediaTransport, PlaybackError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClockKind {
    WallClock,
    MediaClock,
}

/// Monotonic time since an arbitrary origin.
pub trait TimeSource {
    fn elapsed(&self) -> Duration;
}

pub struct InstantSource {
    origin: Instant,
}

impl InstantSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for InstantSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for InstantSource {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Time advanced explicitly by the host, e.g. from frame-callback
/// timestamps. Clones share the same reading.
#[derive(Clone, Debug, Default)]
pub struct ManualTime(Rc<Cell<Duration>>);

impl ManualTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_ms(&self, ms: f64) {
        self.0.set(self.0.get() + Duration::from_secs_f64(ms.max(0.0) / 1000.0));
    }

    pub fn set_ms(&self, ms: f64) {
        let next = Duration::from_secs_f64(ms.max(0.0) / 1000.0);
        if next >= self.0.get() {
            self.0.set(next);
        }
    }
}

impl TimeSource for ManualTime {
    fn elapsed(&self) -> Duration {
        self.0.get()
    }
}

pub trait PlaybackClock {
    fn kind(&self) -> ClockKind;
    /// Session time in milliseconds. Frozen while paused or stopped.
    fn now_ms(&self) -> f64;
    fn start(&mut self) -> Result<(), PlaybackError>;
    fn pause(&mut self);
    fn resume(&mut self) -> Result<(), PlaybackError>;
    fn stop(&mut self);
    /// Called once per tick before `now_ms`, to pick up state changes of
    /// the underlying source.
    fn poll(&mut self) {}
    /// Length of the timed material, when the clock source knows it.
    fn duration_ms(&self) -> Option<f64> {
        None
    }
}

pub struct WallClock<T: TimeSource = InstantSource> {
    source: T,
    started_at: Option<Duration>,
    accumulated: Duration,
}

impl WallClock<InstantSource> {
    pub fn new() -> Self {
        Self::with_source(InstantSource::new())
    }
}

impl Default for WallClock<InstantSource> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeSource> WallClock<T> {
    pub fn with_source(source: T) -> Self {
        Self {
            source,
            started_at: None,
            accumulated: Duration::ZERO,
        }
    }

    fn running_for(&self) -> Duration {
        self.started_at
            .map(|start| self.source.elapsed().saturating_sub(start))
            .unwrap_or_default()
    }

    fn freeze(&mut self) {
        self.accumulated += self.running_for();
        self.started_at = None;
    }
}

impl<T: TimeSource> PlaybackClock for WallClock<T> {
    fn kind(&self) -> ClockKind {
        ClockKind::WallClock
    }

    fn now_ms(&self) -> f64 {
        (self.accumulated + self.running_for()).as_secs_f64() * 1000.0
    }

    fn start(&mut self) -> Result<(), PlaybackError> {
        self.accumulated = Duration::ZERO;
        self.started_at = Some(self.source.elapsed());
        Ok(())
    }

    fn pause(&mut self) {
        self.freeze();
    }

    fn resume(&mut self) -> Result<(), PlaybackError> {
        if self.started_at.is_none() {
            self.started_at = Some(self.source.elapsed());
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.freeze();
    }
}

/// Follows a backing track's playhead. Once the track has played out the
/// clock keeps counting from the track end on wall time, so a grace period
/// after the music can still elapse.
pub struct MediaClock<T: TimeSource = InstantSource> {
    transport: Box<dyn MediaTransport>,
    tail: WallClock<T>,
    ended_at_ms: Option<f64>,
    paused: bool,
}

impl MediaClock<InstantSource> {
    pub fn new(transport: Box<dyn MediaTransport>) -> Self {
        Self::with_source(transport, InstantSource::new())
    }
}

impl<T: TimeSource> MediaClock<T> {
    pub fn with_source(transport: Box<dyn MediaTransport>, source: T) -> Self {
        Self {
            transport,
            tail: WallClock::with_source(source),
            ended_at_ms: None,
            paused: false,
        }
    }

    pub fn track_ended(&self) -> bool {
        self.ended_at_ms.is_some()
    }
}

impl<T: TimeSource> PlaybackClock for MediaClock<T> {
    fn kind(&self) -> ClockKind {
        ClockKind::MediaClock
    }

    fn now_ms(&self) -> f64 {
        match self.ended_at_ms {
            Some(end) => end + self.tail.now_ms(),
            None => self.transport.position_ms(),
        }
    }

    fn start(&mut self) -> Result<(), PlaybackError> {
        self.ended_at_ms = None;
        self.paused = false;
        self.transport.play()
    }

    fn pause(&mut self) {
        self.paused = true;
        match self.ended_at_ms {
            Some(_) => self.tail.pause(),
            None => self.transport.pause(),
        }
    }

    fn resume(&mut self) -> Result<(), PlaybackError> {
        match self.ended_at_ms {
            Some(_) => self.tail.resume()?,
            None => self.transport.play()?,
        }
        self.paused = false;
        Ok(())
    }

    fn stop(&mut self) {
        self.transport.stop();
        self.tail.stop();
    }

    fn poll(&mut self) {
        if self.ended_at_ms.is_some() || !self.transport.has_ended() {
            return;
        }
        let end = self
            .transport
            .duration_ms()
            .unwrap_or_else(|| self.transport.position_ms());
        debug!(end_ms = end, "backing track finished");
        self.ended_at_ms = Some(end);
        // A start cannot fail on a wall clock.
        let _ = self.tail.start();
        if self.paused {
            self.tail.pause();
        }
    }

    fn duration_ms(&self) -> Option<f64> {
        self.transport.duration_ms()
    }
}

/// Uses the backing track as the clock when it could be opened, otherwise
/// falls back to wall time. The returned clock's `kind` tells the caller
/// which one is in effect.
pub fn media_or_wall_clock(
    transport: Result<Box<dyn MediaTransport>, PlaybackError>,
) -> Box<dyn PlaybackClock> {
    match transport {
        Ok(transport) => Box::new(MediaClock::new(transport)),
        Err(err) => {
            warn!(%err, "backing track unavailable; timing notes from the wall clock");
            Box::new(WallClock::new())
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use fretline_audio::ManualTransport;
    use std::cell::RefCell;

    /// Transport handle the test keeps while the clock owns the box.
    #[derive(Clone)]
    pub(crate) struct SharedTransport(pub(crate) Rc<RefCell<ManualTransport>>);

    impl SharedTransport {
        pub(crate) fn new(duration_ms: Option<f64>) -> Self {
            Self(Rc::new(RefCell::new(ManualTransport::new(duration_ms))))
        }
    }

    impl MediaTransport for SharedTransport {
        fn play(&mut self) -> Result<(), PlaybackError> {
            self.0.borrow_mut().play()
        }
        fn pause(&mut self) {
            self.0.borrow_mut().pause()
        }
        fn stop(&mut self) {
            self.0.borrow_mut().stop()
        }
        fn position_ms(&self) -> f64 {
            self.0.borrow().position_ms()
        }
        fn duration_ms(&self) -> Option<f64> {
            self.0.borrow().duration_ms()
        }
        fn has_ended(&self) -> bool {
            self.0.borrow().has_ended()
        }
    }

    #[test]
    fn wall_clock_counts_from_start() {
        let time = ManualTime::new();
        let mut clock = WallClock::with_source(time.clone());
        time.advance_ms(500.0);
        assert_eq!(clock.now_ms(), 0.0);
        clock.start().unwrap();
        time.advance_ms(250.0);
        assert_relative_eq!(clock.now_ms(), 250.0, epsilon = 1e-6);
    }

    #[test]
    fn pause_and_resume_preserve_elapsed_time() {
        let time = ManualTime::new();
        let mut clock = WallClock::with_source(time.clone());
        clock.start().unwrap();
        time.advance_ms(1000.0);
        clock.pause();
        let before = clock.now_ms();
        time.advance_ms(5000.0);
        assert_relative_eq!(clock.now_ms(), before, epsilon = 1e-6);
        clock.resume().unwrap();
        assert_relative_eq!(clock.now_ms(), 1000.0, epsilon = 1e-6);
        time.advance_ms(300.0);
        assert_relative_eq!(clock.now_ms(), 1300.0, epsilon = 1e-6);
        // A second resume is a no-op rather than a restart.
        clock.resume().unwrap();
        assert_relative_eq!(clock.now_ms(), 1300.0, epsilon = 1e-6);
    }

    #[test]
    fn stop_freezes_wall_clock() {
        let time = ManualTime::new();
        let mut clock = WallClock::with_source(time.clone());
        clock.start().unwrap();
        time.advance_ms(40.0);
        clock.stop();
        time.advance_ms(40.0);
        assert_relative_eq!(clock.now_ms(), 40.0, epsilon = 1e-6);
    }

    #[test]
    fn manual_time_never_goes_backwards() {
        let time = ManualTime::new();
        time.set_ms(100.0);
        time.set_ms(50.0);
        assert_eq!(time.elapsed(), Duration::from_millis(100));
    }

    #[test]
    fn media_clock_mirrors_the_playhead() {
        let shared = SharedTransport(Rc::new(RefCell::new(ManualTransport::new(Some(2000.0)))));
        let mut clock = MediaClock::with_source(Box::new(shared.clone()), ManualTime::new());
        assert_eq!(clock.kind(), ClockKind::MediaClock);
        clock.start().unwrap();
        shared.0.borrow_mut().advance(750.0);
        clock.poll();
        assert_eq!(clock.now_ms(), 750.0);
        clock.pause();
        assert!(!shared.0.borrow().playing);
        shared.0.borrow_mut().advance(500.0);
        assert_eq!(clock.now_ms(), 750.0);
        clock.resume().unwrap();
        assert!(shared.0.borrow().playing);
        assert_eq!(clock.duration_ms(), Some(2000.0));
    }

    #[test]
    fn media_clock_keeps_counting_after_the_track_ends() {
        let shared = SharedTransport(Rc::new(RefCell::new(ManualTransport::new(Some(1000.0)))));
        let time = ManualTime::new();
        let mut clock = MediaClock::with_source(Box::new(shared.clone()), time.clone());
        clock.start().unwrap();
        shared.0.borrow_mut().advance(1500.0);
        clock.poll();
        assert!(clock.track_ended());
        assert_eq!(clock.now_ms(), 1000.0);
        time.advance_ms(400.0);
        assert_relative_eq!(clock.now_ms(), 1400.0, epsilon = 1e-6);
        clock.pause();
        time.advance_ms(400.0);
        assert_relative_eq!(clock.now_ms(), 1400.0, epsilon = 1e-6);
        clock.stop();
        assert!(shared.0.borrow().stopped);
    }

    #[test]
    fn fallback_to_wall_clock_when_track_fails() {
        let clock = media_or_wall_clock(Err(PlaybackError::Load("corrupt".into())));
        assert_eq!(clock.kind(), ClockKind::WallClock);
        let clock = media_or_wall_clock(Ok(Box::new(ManualTransport::new(None))));
        assert_eq!(clock.kind(), ClockKind::MediaClock);
    }
}
