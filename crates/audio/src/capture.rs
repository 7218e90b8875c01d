//! Microphone capture through cpal.
//!
//! The platform callback downmixes to mono and pushes into a single-producer
//! single-consumer ring; the tick thread drains it into a sliding analysis
//! window. Neither side locks.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample};
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use tracing::{debug, info, warn};

use crate::backend::{AudioBackend, CaptureConstraints, SampleFrame, SignalSource};
use crate::dsp;
use crate::error::DeviceError;

/// Ring capacity in analysis frames; enough to ride out a few late ticks.
const RING_FRAMES: usize = 4;

/// Opens the host's input devices through cpal.
#[derive(Default)]
pub struct CpalBackend;

impl AudioBackend for CpalBackend {
    fn open_input(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn SignalSource>, DeviceError> {
        Ok(Box::new(CpalCapture::open(constraints)?))
    }
}

pub struct CpalCapture {
    stream: Option<cpal::Stream>,
    consumer: HeapConsumer<f32>,
    window: Vec<f32>,
    scratch: Vec<f32>,
    sample_rate: u32,
}

impl CpalCapture {
    pub fn open(constraints: &CaptureConstraints) -> Result<Self, DeviceError> {
        constraints.validate()?;
        let device = match constraints.device_name.as_deref() {
            Some(name) => find_input_device(name)?,
            None => cpal::default_host()
                .default_input_device()
                .ok_or(DeviceError::NoInputDevice)?,
        };
        let device_name = device.name().unwrap_or_else(|_| "Unknown".into());

        let (config, sample_format) = select_input_config(&device, constraints.sample_rate)?;
        let channels = config.channels as usize;
        let sample_rate = config.sample_rate.0;

        let ring = HeapRb::<f32>::new(constraints.frame_len * RING_FRAMES);
        let (producer, consumer) = ring.split();
        let stream = match sample_format {
            SampleFormat::F32 => build_input::<f32>(&device, &config, channels, producer, |s| s),
            SampleFormat::I16 => build_input::<i16>(&device, &config, channels, producer, |s| {
                s as f32 / i16::MAX as f32
            }),
            SampleFormat::U16 => build_input::<u16>(&device, &config, channels, producer, |s| {
                (s as f32 / u16::MAX as f32) * 2.0 - 1.0
            }),
            other => {
                return Err(DeviceError::UnsupportedConfig(format!(
                    "sample format {other:?}"
                )))
            }
        }?;
        stream
            .play()
            .map_err(|err| DeviceError::Stream(err.to_string()))?;

        if constraints.echo_cancellation || !constraints.auto_gain_control || !constraints.noise_suppression {
            debug!("host processing switches are not exposed through cpal; using device defaults");
        }
        info!(
            device = %device_name,
            sample_rate,
            channels,
            frame_len = constraints.frame_len,
            echo_cancellation = constraints.echo_cancellation,
            auto_gain_control = constraints.auto_gain_control,
            noise_suppression = constraints.noise_suppression,
            "microphone capture started"
        );

        Ok(Self {
            stream: Some(stream),
            consumer,
            window: vec![0.0; constraints.frame_len],
            scratch: Vec::with_capacity(constraints.frame_len * RING_FRAMES),
            sample_rate,
        })
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl SignalSource for CpalCapture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_frame(&mut self) -> SampleFrame {
        let available = self.consumer.len();
        if available > 0 {
            self.scratch.resize(available, 0.0);
            let read = self.consumer.pop_slice(&mut self.scratch);
            push_window(&mut self.window, &self.scratch[..read]);
        }
        SampleFrame::new(self.window.clone(), self.sample_rate)
    }

    fn discard(&mut self) {
        let dropped = drain_ring(&mut self.consumer, &mut self.scratch);
        self.window.fill(0.0);
        debug!(dropped, "discarded buffered capture");
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                debug!(%err, "pausing input stream before release failed");
            }
            drop(stream);
            info!("microphone capture released");
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.close();
    }
}

/// Shifts `incoming` into the end of a fixed-length window.
fn push_window(window: &mut [f32], incoming: &[f32]) {
    let len = window.len();
    if incoming.len() >= len {
        window.copy_from_slice(&incoming[incoming.len() - len..]);
    } else {
        window.copy_within(incoming.len().., 0);
        window[len - incoming.len()..].copy_from_slice(incoming);
    }
}

/// Empties the ring, returning how many samples were dropped.
fn drain_ring(consumer: &mut HeapConsumer<f32>, scratch: &mut Vec<f32>) -> usize {
    let mut dropped = 0;
    while !consumer.is_empty() {
        scratch.resize(consumer.len(), 0.0);
        dropped += consumer.pop_slice(scratch);
    }
    dropped
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    mut producer: HeapProducer<f32>,
    convert: fn(T) -> f32,
) -> Result<cpal::Stream, DeviceError>
where
    T: SizedSample + 'static,
{
    let mut converted = Vec::new();
    let mut mono = Vec::new();
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                converted.clear();
                converted.extend(data.iter().map(|s| convert(*s)));
                mono.clear();
                dsp::downmix_into(&converted, channels, &mut mono);
                // A full ring drops the newest samples until the tick thread catches up.
                producer.push_slice(&mono);
            },
            |err| warn!(%err, "input stream error"),
            None,
        )
        .map_err(|err| DeviceError::Stream(err.to_string()))
}

fn select_input_config(
    device: &cpal::Device,
    target_rate: u32,
) -> Result<(cpal::StreamConfig, SampleFormat), DeviceError> {
    let supported = device
        .supported_input_configs()
        .map_err(|err| DeviceError::Unavailable(err.to_string()))?;
    let preferred = supported
        .filter(|range| {
            matches!(
                range.sample_format(),
                SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
            ) && range.min_sample_rate().0 <= target_rate
                && target_rate <= range.max_sample_rate().0
        })
        .min_by_key(|range| {
            let format_rank = match range.sample_format() {
                SampleFormat::F32 => 0,
                SampleFormat::I16 => 1,
                _ => 2,
            };
            (range.channels(), format_rank)
        });
    if let Some(range) = preferred {
        let format = range.sample_format();
        let config = range.with_sample_rate(cpal::SampleRate(target_rate)).config();
        return Ok((config, format));
    }

    let fallback = device
        .default_input_config()
        .map_err(|err| DeviceError::UnsupportedConfig(err.to_string()))?;
    warn!(
        target_rate,
        actual_rate = fallback.sample_rate().0,
        "target sample rate unsupported; using device default"
    );
    Ok((fallback.config(), fallback.sample_format()))
}

fn find_input_device(name: &str) -> Result<cpal::Device, DeviceError> {
    for host_id in cpal::available_hosts() {
        if let Ok(host) = cpal::host_from_id(host_id) {
            if let Ok(devices) = host.input_devices() {
                for device in devices {
                    if device.name().map(|n| n == name).unwrap_or(false) {
                        return Ok(device);
                    }
                }
            }
        }
    }
    Err(DeviceError::DeviceNotFound(name.to_string()))
}

/// Names of every input device across the available hosts.
pub fn list_input_devices() -> Vec<String> {
    let mut names = Vec::new();
    for host_id in cpal::available_hosts() {
        if let Ok(host) = cpal::host_from_id(host_id) {
            if let Ok(devices) = host.input_devices() {
                names.extend(devices.filter_map(|device| device.name().ok()));
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_keeps_latest_samples() {
        let mut window = vec![0.0; 4];
        push_window(&mut window, &[1.0, 2.0]);
        assert_eq!(window, vec![0.0, 0.0, 1.0, 2.0]);
        push_window(&mut window, &[3.0]);
        assert_eq!(window, vec![0.0, 1.0, 2.0, 3.0]);
        push_window(&mut window, &[4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(window, vec![5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn draining_leaves_no_stale_samples() {
        let (mut producer, mut consumer) = HeapRb::<f32>::new(16).split();
        producer.push_slice(&[0.5; 10]);
        let mut scratch = Vec::new();
        assert_eq!(drain_ring(&mut consumer, &mut scratch), 10);
        assert!(consumer.is_empty());
        assert_eq!(drain_ring(&mut consumer, &mut scratch), 0);
        producer.push_slice(&[0.25; 3]);
        assert_eq!(consumer.len(), 3);
    }

    #[test]
    fn open_never_panics_without_hardware() {
        // Availability varies by environment; either outcome is fine.
        match CpalBackend.open_input(&CaptureConstraints::default()) {
            Ok(mut source) => source.close(),
            Err(err) => assert!(!err.to_string().is_empty()),
        }
    }

    #[test]
    fn unknown_device_is_reported() {
        let constraints = CaptureConstraints {
            device_name: Some("no such microphone 7f3a".into()),
            ..Default::default()
        };
        assert!(matches!(
            CpalCapture::open(&constraints),
            Err(DeviceError::DeviceNotFound(_))
        ));
    }
}
