use fretline_audio::{EstimatorConfig, PitchEstimate, PitchEstimator, SampleFrame};
use fretline_domain::pitch::cents_between;
use fretline_domain::{cents_from_nearest, note_from_pitch, NoteName, Tuning};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// A string within this many cents of its open frequency is in tune.
pub const IN_TUNE_CENTS: f64 = 10.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TuneDirection {
    InTune,
    /// Below target; tighten.
    TuneUp,
    /// Above target; loosen.
    TuneDown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TargetCheck {
    pub string: u8,
    pub target_hz: f64,
    pub cents: f64,
    pub direction: TuneDirection,
}

impl TargetCheck {
    pub fn in_tune(&self) -> bool {
        self.direction == TuneDirection::InTune
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TunerReading {
    pub estimate: PitchEstimate,
    pub note: Option<NoteName>,
    /// Offset from the nearest equal-tempered note.
    pub cents: Option<f64>,
    pub target: Option<TargetCheck>,
}

pub struct Tuner {
    estimator: PitchEstimator,
    tuning: Tuning,
    target_string: Option<u8>,
}

impl Tuner {
    pub fn new(estimator: EstimatorConfig, tuning: Tuning) -> Self {
        Self {
            estimator: PitchEstimator::new(estimator),
            tuning,
            target_string: None,
        }
    }

    /// Checks every reading against the open frequency of `string`.
    pub fn with_target_string(mut self, string: u8) -> Result<Self, SessionError> {
        if self.tuning.open_string_hz(string).is_none() {
            return Err(SessionError::InvalidConfig(format!(
                "no string {string} on a six-string guitar"
            )));
        }
        self.target_string = Some(string);
        Ok(self)
    }

    pub fn read(&mut self, frame: &SampleFrame) -> TunerReading {
        let estimate = self.estimator.estimate(frame);
        let frequency = estimate.frequency();
        TunerReading {
            estimate,
            note: frequency.and_then(note_from_pitch),
            cents: frequency.and_then(cents_from_nearest),
            target: frequency.and_then(|hz| {
                self.target_string
                    .and_then(|string| check_string(&self.tuning, string, hz))
            }),
        }
    }
}

/// Compares a detected frequency against an open string.
pub fn check_string(tuning: &Tuning, string: u8, frequency_hz: f64) -> Option<TargetCheck> {
    let target_hz = tuning.open_string_hz(string)?;
    let cents = cents_between(frequency_hz, target_hz)?;
    let direction = if cents.abs() <= IN_TUNE_CENTS {
        TuneDirection::InTune
    } else if cents < 0.0 {
        TuneDirection::TuneUp
    } else {
        TuneDirection::TuneDown
    };
    Some(TargetCheck {
        string,
        target_hz,
        cents,
        direction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_a_string_reads_in_tune() {
        let mut tuner = Tuner::new(EstimatorConfig::default(), Tuning::standard())
            .with_target_string(5)
            .unwrap();
        let reading = tuner.read(&SampleFrame::tone(110.0, 0.4, 4096, 44_100));
        assert_eq!(reading.note, Some(NoteName::A));
        let target = reading.target.unwrap();
        assert_eq!(target.target_hz, 110.0);
        assert!(target.in_tune(), "off by {} cents", target.cents);
    }

    #[test]
    fn direction_hint_points_toward_target() {
        let tuning = Tuning::standard();
        // A quarter tone flat of the low E.
        let flat = check_string(&tuning, 6, 82.41 * 2f64.powf(-0.5 / 12.0)).unwrap();
        assert_eq!(flat.direction, TuneDirection::TuneUp);
        assert!((flat.cents + 50.0).abs() < 1e-6);
        let sharp = check_string(&tuning, 1, 340.0).unwrap();
        assert_eq!(sharp.direction, TuneDirection::TuneDown);
        assert!(check_string(&tuning, 7, 340.0).is_none());
    }

    #[test]
    fn silence_gives_an_empty_reading() {
        let mut tuner = Tuner::new(EstimatorConfig::default(), Tuning::standard());
        let reading = tuner.read(&SampleFrame::silence(4096, 44_100));
        assert_eq!(reading.estimate, PitchEstimate::NoPitch);
        assert!(reading.note.is_none() && reading.cents.is_none() && reading.target.is_none());
    }

    #[test]
    fn unknown_string_is_rejected() {
        let tuner = Tuner::new(EstimatorConfig::default(), Tuning::standard());
        assert!(matches!(
            tuner.with_target_string(0),
            Err(SessionError::InvalidConfig(_))
        ));
    }
}
