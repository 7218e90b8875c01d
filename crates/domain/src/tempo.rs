use serde::{Deserialize, Serialize};
use time::Duration;

use crate::DomainError;

pub const MIN_BPM: f32 = 30.0;
pub const MAX_BPM: f32 = 300.0;

/// Beats per minute of a practice sequence.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, PartialOrd)]
#[serde(try_from = "f32", into = "f32")]
pub struct Tempo {
    bpm: f32,
}

impl Tempo {
    pub fn new(bpm: f32) -> Result<Self, DomainError> {
        if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
            return Err(DomainError::validation(
                "tempo bpm must be between 30 and 300",
            ));
        }
        Ok(Self { bpm })
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm as f64
    }

    pub fn beat_duration(&self) -> Duration {
        Duration::seconds_f64(self.seconds_per_beat())
    }

    /// Beat position (quarter note = 1.0) at a session time.
    pub fn beat_at_ms(&self, time_ms: f64) -> f64 {
        time_ms / 1000.0 / self.seconds_per_beat()
    }

    pub fn ms_at_beat(&self, beat: f64) -> f64 {
        beat * self.seconds_per_beat() * 1000.0
    }
}

impl TryFrom<f32> for Tempo {
    type Error = DomainError;

    fn try_from(bpm: f32) -> Result<Self, Self::Error> {
        Tempo::new(bpm)
    }
}

impl From<Tempo> for f32 {
    fn from(tempo: Tempo) -> Self {
        tempo.bpm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tempo_validation() {
        assert!(Tempo::new(29.0).is_err());
        assert!(Tempo::new(301.0).is_err());
        assert!(Tempo::new(f32::NAN).is_err());
        assert!(Tempo::new(30.0).is_ok());
        assert!(Tempo::new(300.0).is_ok());
    }

    #[test]
    fn tempo_conversions() {
        let tempo = Tempo::new(120.0).unwrap();
        assert_eq!(tempo.seconds_per_beat(), 0.5);
        assert_eq!(tempo.beat_at_ms(1000.0), 2.0);
        assert_eq!(tempo.ms_at_beat(3.0), 1500.0);
        assert_eq!(tempo.beat_duration(), Duration::milliseconds(500));
    }

    #[test]
    fn deserialization_enforces_range() {
        assert!(serde_json::from_str::<Tempo>("90").is_ok());
        assert!(serde_json::from_str::<Tempo>("500").is_err());
    }
}
