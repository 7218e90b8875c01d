use std::f64::consts::TAU;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DeviceError;

/// Smallest analysis window that still resolves the low E string.
pub const MIN_FRAME_LEN: usize = 4096;

/// One immutable analysis window of mono samples in `[-1, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleFrame {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl SampleFrame {
    pub fn new(samples: impl Into<Arc<[f32]>>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn silence(len: usize, sample_rate: u32) -> Self {
        Self::new(vec![0.0; len], sample_rate)
    }

    /// A sine at `frequency_hz`, starting at phase zero.
    pub fn tone(frequency_hz: f64, amplitude: f32, len: usize, sample_rate: u32) -> Self {
        let step = TAU * frequency_hz / sample_rate as f64;
        let samples: Vec<f32> = (0..len)
            .map(|i| amplitude * (step * i as f64).sin() as f32)
            .collect();
        Self::new(samples, sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// What the session asks of the capture device.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConstraints {
    /// Kept off so the sustain of a plucked note is not cancelled.
    pub echo_cancellation: bool,
    pub auto_gain_control: bool,
    pub noise_suppression: bool,
    pub sample_rate: u32,
    /// Analysis window length in samples.
    pub frame_len: usize,
    /// Input device to open; the host default when absent.
    pub device_name: Option<String>,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: false,
            auto_gain_control: true,
            noise_suppression: true,
            sample_rate: 44_100,
            frame_len: MIN_FRAME_LEN,
            device_name: None,
        }
    }
}

impl CaptureConstraints {
    pub fn validate(&self) -> Result<(), DeviceError> {
        if self.sample_rate == 0 {
            return Err(DeviceError::UnsupportedConfig(
                "sample rate must be positive".into(),
            ));
        }
        if self.frame_len == 0 {
            return Err(DeviceError::UnsupportedConfig(
                "frame length must be positive".into(),
            ));
        }
        if self.frame_len < MIN_FRAME_LEN {
            debug!(
                frame_len = self.frame_len,
                "frame shorter than recommended; low strings may not resolve"
            );
        }
        Ok(())
    }
}

/// An open capture handle. Frames are read once per tick; each call returns
/// the most recent `frame_len` samples, independent of the previous frame.
pub trait SignalSource {
    fn sample_rate(&self) -> u32;
    fn read_frame(&mut self) -> SampleFrame;
    /// Drops everything captured so far; the next frame holds only audio
    /// that arrives after this call.
    fn discard(&mut self) {
        self.read_frame();
    }
    /// Releases the device. Idempotent.
    fn close(&mut self);
}

pub trait AudioBackend: Send + Sync {
    fn open_input(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn SignalSource>, DeviceError>;
}

/// Backend with no device behind it; frames are always silent.
pub struct NullBackend;

impl AudioBackend for NullBackend {
    fn open_input(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn SignalSource>, DeviceError> {
        constraints.validate()?;
        debug!(?constraints, "opening null capture");
        Ok(Box::new(SyntheticSource::new(
            None,
            constraints.sample_rate,
            constraints.frame_len,
        )))
    }
}

/// Backend that "hears" a steady sine, for demos and device-free hosts.
pub struct ToneBackend {
    pub frequency_hz: f64,
}

impl AudioBackend for ToneBackend {
    fn open_input(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn SignalSource>, DeviceError> {
        constraints.validate()?;
        debug!(frequency_hz = self.frequency_hz, "opening synthetic tone capture");
        Ok(Box::new(SyntheticSource::new(
            Some(self.frequency_hz),
            constraints.sample_rate,
            constraints.frame_len,
        )))
    }
}

/// Generates frames of a continuous sine (or silence) with phase carried
/// across reads.
pub struct SyntheticSource {
    frequency_hz: Option<f64>,
    amplitude: f32,
    sample_rate: u32,
    frame_len: usize,
    phase: f64,
    open: bool,
}

impl SyntheticSource {
    pub fn new(frequency_hz: Option<f64>, sample_rate: u32, frame_len: usize) -> Self {
        Self {
            frequency_hz,
            amplitude: 0.3,
            sample_rate,
            frame_len,
            phase: 0.0,
            open: true,
        }
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    pub fn set_frequency(&mut self, frequency_hz: Option<f64>) {
        self.frequency_hz = frequency_hz;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl SignalSource for SyntheticSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_frame(&mut self) -> SampleFrame {
        let frequency = match self.frequency_hz {
            Some(frequency) if self.open => frequency,
            _ => return SampleFrame::silence(self.frame_len, self.sample_rate),
        };
        let step = TAU * frequency / self.sample_rate as f64;
        let mut samples = Vec::with_capacity(self.frame_len);
        for _ in 0..self.frame_len {
            samples.push(self.amplitude * self.phase.sin() as f32);
            self.phase = (self.phase + step) % TAU;
        }
        SampleFrame::new(samples, self.sample_rate)
    }

    fn close(&mut self) {
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_backend_yields_silent_frames() {
        let constraints = CaptureConstraints {
            frame_len: 1024,
            ..Default::default()
        };
        let mut source = NullBackend.open_input(&constraints).unwrap();
        let frame = source.read_frame();
        assert_eq!(frame.len(), 1024);
        assert_eq!(frame.sample_rate(), 44_100);
        assert!(frame.samples().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn constraints_default_to_music_friendly_processing() {
        let constraints = CaptureConstraints::default();
        assert!(!constraints.echo_cancellation);
        assert!(constraints.auto_gain_control);
        assert!(constraints.noise_suppression);
        assert!(constraints.frame_len >= MIN_FRAME_LEN);
        let bad = CaptureConstraints {
            frame_len: 0,
            ..Default::default()
        };
        assert!(matches!(
            ToneBackend { frequency_hz: 110.0 }.open_input(&bad),
            Err(DeviceError::UnsupportedConfig(_))
        ));
    }

    #[test]
    fn constraints_deserialize_partially() {
        let constraints: CaptureConstraints =
            serde_json::from_str(r#"{"frame_len": 8192}"#).unwrap();
        assert_eq!(constraints.frame_len, 8192);
        assert_eq!(constraints.sample_rate, 44_100);
    }

    #[test]
    fn synthetic_source_is_continuous_and_closes() {
        let mut source = SyntheticSource::new(Some(100.0), 1000, 5).with_amplitude(1.0);
        let first = source.read_frame();
        let second = source.read_frame();
        // 100 Hz at 1 kHz: ten samples per cycle, so sample 5 is half a cycle in.
        assert!(first.samples()[0].abs() < 1e-6);
        assert!(second.samples()[0].abs() < 1e-4);
        assert!(second.samples()[1] < 0.0);
        source.close();
        assert!(!source.is_open());
        assert!(source.read_frame().samples().iter().all(|s| *s == 0.0));
    }
}
