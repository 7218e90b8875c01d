//! Monophonic pitch estimation by gated, peak-normalized autocorrelation.
//!
//! Each frame is analyzed on its own: nothing is smoothed across frames, so
//! a note is reported on the first tick it is audible.

use serde::{Deserialize, Serialize};

use crate::backend::SampleFrame;
use crate::dsp;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub enum PitchEstimate {
    NoPitch,
    Detected(f64),
}

impl PitchEstimate {
    pub fn frequency(&self) -> Option<f64> {
        match self {
            PitchEstimate::NoPitch => None,
            PitchEstimate::Detected(hz) => Some(*hz),
        }
    }

    pub fn is_detected(&self) -> bool {
        matches!(self, PitchEstimate::Detected(_))
    }
}

/// How the winning lag is chosen from the correlation curve.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LagSelection {
    /// The lag with the largest correlation anywhere in the band. Prone to
    /// reporting a subharmonic when several periods fit in the band.
    GlobalMaximum,
    /// The shortest-lag local peak reaching `ratio` of the global maximum;
    /// falls back to the global maximum when no interior peak qualifies.
    FirstStrongPeak { ratio: f32 },
}

impl Default for LagSelection {
    fn default() -> Self {
        LagSelection::FirstStrongPeak { ratio: 0.9 }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EstimatorConfig {
    /// RMS below this is treated as silence.
    pub silence_rms: f32,
    /// Peaks below this are too small to normalize.
    pub min_peak: f32,
    pub target_peak: f32,
    pub min_frequency_hz: f64,
    pub max_frequency_hz: f64,
    /// Share of the frame summed per lag.
    pub window_fraction: f32,
    pub lag_selection: LagSelection,
    /// Refine the chosen lag between samples.
    pub interpolate: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            silence_rms: 0.002,
            min_peak: 0.0001,
            target_peak: 0.8,
            min_frequency_hz: 75.0,
            max_frequency_hz: 1200.0,
            window_fraction: 0.5,
            lag_selection: LagSelection::default(),
            interpolate: true,
        }
    }
}

pub struct PitchEstimator {
    config: EstimatorConfig,
    normalized: Vec<f32>,
    correlations: Vec<f32>,
}

impl PitchEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            config,
            normalized: Vec::new(),
            correlations: Vec::new(),
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Never fails: silence, unusable frames and out-of-band results are all
    /// `NoPitch`.
    pub fn estimate(&mut self, frame: &SampleFrame) -> PitchEstimate {
        let config = self.config;
        let samples = frame.samples();
        if samples.is_empty() || frame.sample_rate() == 0 {
            return PitchEstimate::NoPitch;
        }

        let level = dsp::measure(samples);
        if !level.rms.is_finite() || level.rms < config.silence_rms {
            return PitchEstimate::NoPitch;
        }
        if level.peak < config.min_peak {
            return PitchEstimate::NoPitch;
        }
        dsp::normalize_into(samples, level.peak, config.target_peak, &mut self.normalized);

        let sample_rate = frame.sample_rate() as f64;
        let min_lag = ((sample_rate / config.max_frequency_hz).floor() as usize).max(1);
        let max_lag = (sample_rate / config.min_frequency_hz).floor() as usize;
        // One guard lag on each side so a period at either edge of the band
        // still has two neighbours.
        let first_lag = min_lag - 1;
        let last_lag = max_lag + 1;
        let window = ((samples.len() as f32 * config.window_fraction) as usize)
            .min(samples.len().saturating_sub(last_lag));
        if window == 0 || min_lag > max_lag {
            return PitchEstimate::NoPitch;
        }

        self.correlations.clear();
        let head = &self.normalized[..window];
        for lag in first_lag..=last_lag {
            let shifted = &self.normalized[lag..lag + window];
            let sum: f32 = head.iter().zip(shifted).map(|(a, b)| a * b).sum();
            self.correlations.push(sum);
        }

        let Some(index) = select_lag(&self.correlations, config.lag_selection) else {
            return PitchEstimate::NoPitch;
        };
        let coarse_lag = (first_lag + index) as f64;
        let band = config.min_frequency_hz..=config.max_frequency_hz;
        if !band.contains(&(sample_rate / coarse_lag)) {
            return PitchEstimate::NoPitch;
        }
        let mut lag = coarse_lag;
        if config.interpolate {
            lag += dsp::parabolic_offset(
                self.correlations[index - 1],
                self.correlations[index],
                self.correlations[index + 1],
            ) as f64;
        }

        let frequency = (sample_rate / lag).clamp(config.min_frequency_hz, config.max_frequency_hz);
        PitchEstimate::Detected(frequency)
    }
}

impl Default for PitchEstimator {
    fn default() -> Self {
        Self::new(EstimatorConfig::default())
    }
}

/// Index into `correlations` of the chosen lag, or `None` when nothing
/// correlates positively. The first and last entries are guard lags outside
/// the band: they are compared against but never chosen.
fn select_lag(correlations: &[f32], selection: LagSelection) -> Option<usize> {
    if correlations.len() < 3 {
        return None;
    }
    let candidates = 1..correlations.len() - 1;
    let mut best_index = None;
    let mut best = 0.0f32;
    for index in candidates.clone() {
        let value = correlations[index];
        if value > best {
            best = value;
            best_index = Some(index);
        }
    }
    let global = best_index?;

    match selection {
        LagSelection::GlobalMaximum => Some(global),
        LagSelection::FirstStrongPeak { ratio } => {
            let threshold = best * ratio;
            let first_peak = candidates.into_iter().find(|&i| {
                let value = correlations[i];
                value >= threshold && value > correlations[i - 1] && value >= correlations[i + 1]
            });
            Some(first_peak.unwrap_or(global))
        }
    }
}
