use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use fretline_audio::{CaptureConstraints, EstimatorConfig};
use fretline_domain::Tuning;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::scoring::MatchPolicy;

/// Step used when the player nudges the calibration offset.
pub const CALIBRATION_STEP_MS: f64 = 100.0;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// A note counts as hit when played within this many ms of its time.
    pub hit_window_ms: f64,
    pub look_ahead_ms: f64,
    pub look_behind_ms: f64,
    /// Added after the last note when no track or explicit length is known.
    pub fixed_tail_ms: f64,
    /// Extra time after a backing track or explicit length runs out.
    pub completion_grace_ms: f64,
    pub per_hit_score: u32,
    /// Shift applied to every scheduled note time.
    pub calibration_offset_ms: f64,
    pub match_policy: MatchPolicy,
    pub capture: CaptureConstraints,
    pub estimator: EstimatorConfig,
    pub tuning: Tuning,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hit_window_ms: 600.0,
            look_ahead_ms: 4000.0,
            look_behind_ms: 1500.0,
            fixed_tail_ms: 3000.0,
            completion_grace_ms: 2000.0,
            per_hit_score: 10,
            calibration_offset_ms: 0.0,
            match_policy: MatchPolicy::default(),
            capture: CaptureConstraints::default(),
            estimator: EstimatorConfig::default(),
            tuning: Tuning::standard(),
        }
    }
}

impl EngineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let file =
            File::open(path_ref).with_context(|| format!("open engine config {:?}", path_ref))?;
        let config: EngineConfig = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parse engine config {:?}", path_ref))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        let non_negative = [
            ("hit_window_ms", self.hit_window_ms),
            ("look_ahead_ms", self.look_ahead_ms),
            ("look_behind_ms", self.look_behind_ms),
            ("fixed_tail_ms", self.fixed_tail_ms),
            ("completion_grace_ms", self.completion_grace_ms),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(SessionError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if self.hit_window_ms == 0.0 {
            return Err(SessionError::InvalidConfig(
                "hit_window_ms must be positive".into(),
            ));
        }
        if !self.calibration_offset_ms.is_finite() {
            return Err(SessionError::InvalidConfig(
                "calibration_offset_ms must be finite".into(),
            ));
        }
        let estimator = &self.estimator;
        if !(estimator.min_frequency_hz > 0.0 && estimator.min_frequency_hz < estimator.max_frequency_hz) {
            return Err(SessionError::InvalidConfig(
                "estimator frequency band is empty".into(),
            ));
        }
        if !(estimator.window_fraction > 0.0 && estimator.window_fraction <= 1.0) {
            return Err(SessionError::InvalidConfig(
                "estimator window_fraction must be in (0, 1]".into(),
            ));
        }
        self.tuning
            .validate()
            .map_err(|err| SessionError::InvalidConfig(format!("tuning: {err}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{InputSource, TimingEngine};

    #[test]
    fn defaults_favor_beginners() {
        let config = EngineConfig::default();
        assert_eq!(config.hit_window_ms, 600.0);
        assert_eq!(config.look_ahead_ms, 4000.0);
        assert_eq!(config.fixed_tail_ms, 3000.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_overrides_defaults() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"hit_window_ms": 250, "match_policy": "all", "capture": {"frame_len": 8192}}"#,
        )
        .unwrap();
        assert_eq!(config.hit_window_ms, 250.0);
        assert_eq!(config.match_policy, MatchPolicy::All);
        assert_eq!(config.capture.frame_len, 8192);
        assert_eq!(config.per_hit_score, 10);
    }

    #[test]
    fn rejects_nonsense_values() {
        let config = EngineConfig {
            hit_window_ms: -1.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SessionError::InvalidConfig(_))));
        let config = EngineConfig {
            hit_window_ms: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(EngineConfig::load("missing-config.json").is_err());
    }

    #[test]
    fn rejects_a_tuning_with_a_dead_string() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"tuning": {"name": "broken", "open_strings_hz": [82.41, 110.0, 0.0, 196.0, 246.94, 329.63]}}"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(SessionError::InvalidConfig(_))));
        assert!(matches!(
            TimingEngine::new(config, InputSource::None),
            Err(SessionError::InvalidConfig(_))
        ));
    }
}
