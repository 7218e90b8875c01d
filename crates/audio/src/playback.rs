use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use tracing::{debug, info, warn};

use crate::error::PlaybackError;
use crate::io::{AudioDecoder, DecodedTrack};

/// A playing audio resource whose playhead can serve as a session clock.
pub trait MediaTransport {
    fn play(&mut self) -> Result<(), PlaybackError>;
    fn pause(&mut self);
    /// Stops playback and releases the output device. Idempotent.
    fn stop(&mut self);
    /// Playhead position in milliseconds, never beyond the track length.
    fn position_ms(&self) -> f64;
    /// `None` until the length is known.
    fn duration_ms(&self) -> Option<f64>;
    fn has_ended(&self) -> bool;
}

/// Plays a decoded backing track on the default output device. The
/// playhead is the number of frames the device has actually pulled.
pub struct BackingTrackPlayer {
    track: Arc<DecodedTrack>,
    device_rate: u32,
    frames_played: Arc<AtomicU64>,
    playing: Arc<AtomicBool>,
    stream: Option<cpal::Stream>,
}

impl BackingTrackPlayer {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PlaybackError> {
        let track = AudioDecoder::open(path.as_ref())
            .map_err(|err| PlaybackError::Load(format!("{err:#}")))?;
        Self::from_track(track)
    }

    pub fn from_track(track: DecodedTrack) -> Result<Self, PlaybackError> {
        if track.frames() == 0 || track.sample_rate == 0 {
            return Err(PlaybackError::Load("track contains no audio".into()));
        }
        let device = cpal::default_host()
            .default_output_device()
            .ok_or(PlaybackError::NoOutputDevice)?;
        let supported = device
            .default_output_config()
            .map_err(|err| PlaybackError::Output(err.to_string()))?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.config();

        let track = Arc::new(track);
        let frames_played = Arc::new(AtomicU64::new(0));
        let playing = Arc::new(AtomicBool::new(false));
        let output = OutputState {
            track: track.clone(),
            device_rate: config.sample_rate.0 as u64,
            channels: config.channels as usize,
            frames_played: frames_played.clone(),
            playing: playing.clone(),
        };
        let stream = match sample_format {
            SampleFormat::F32 => build_output::<f32>(&device, &config, output),
            SampleFormat::I16 => build_output::<i16>(&device, &config, output),
            SampleFormat::U16 => build_output::<u16>(&device, &config, output),
            other => {
                return Err(PlaybackError::Output(format!(
                    "unsupported sample format {other:?}"
                )))
            }
        }?;
        info!(
            device_rate = config.sample_rate.0,
            track_rate = track.sample_rate,
            duration_ms = track.duration_ms(),
            "backing track ready"
        );
        Ok(Self {
            track,
            device_rate: config.sample_rate.0,
            frames_played,
            playing,
            stream: Some(stream),
        })
    }
}

impl MediaTransport for BackingTrackPlayer {
    fn play(&mut self) -> Result<(), PlaybackError> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| PlaybackError::Output("player already stopped".into()))?;
        stream
            .play()
            .map_err(|err| PlaybackError::Output(err.to_string()))?;
        self.playing.store(true, Ordering::Release);
        Ok(())
    }

    fn pause(&mut self) {
        self.playing.store(false, Ordering::Release);
        if let Some(stream) = &self.stream {
            if let Err(err) = stream.pause() {
                debug!(%err, "output stream cannot pause; emitting silence instead");
            }
        }
    }

    fn stop(&mut self) {
        self.playing.store(false, Ordering::Release);
        if self.stream.take().is_some() {
            info!("backing track released");
        }
    }

    fn position_ms(&self) -> f64 {
        let frames = self.frames_played.load(Ordering::Acquire) as f64;
        (frames * 1000.0 / self.device_rate as f64).min(self.track.duration_ms())
    }

    fn duration_ms(&self) -> Option<f64> {
        Some(self.track.duration_ms())
    }

    fn has_ended(&self) -> bool {
        self.position_ms() >= self.track.duration_ms()
    }
}

impl Drop for BackingTrackPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct OutputState {
    track: Arc<DecodedTrack>,
    device_rate: u64,
    channels: usize,
    frames_played: Arc<AtomicU64>,
    playing: Arc<AtomicBool>,
}

impl OutputState {
    /// Fills one device frame and advances the playhead while playing.
    fn next_frame(&self, out: &mut [f32]) {
        if !self.playing.load(Ordering::Acquire) {
            out.fill(0.0);
            return;
        }
        let device_frame = self.frames_played.fetch_add(1, Ordering::AcqRel);
        let track_frame =
            (device_frame as u128 * self.track.sample_rate as u128 / self.device_rate as u128) as usize;
        for (channel, sample) in out.iter_mut().enumerate() {
            *sample = self.track.sample(track_frame, channel).unwrap_or(0.0);
        }
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    state: OutputState,
) -> Result<cpal::Stream, PlaybackError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = state.channels.max(1);
    let mut frame = vec![0.0f32; channels];
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for out in data.chunks_mut(channels) {
                    state.next_frame(&mut frame);
                    for (dst, src) in out.iter_mut().zip(frame.iter()) {
                        *dst = T::from_sample(*src);
                    }
                }
            },
            |err| warn!(%err, "output stream error"),
            None,
        )
        .map_err(|err| PlaybackError::Output(err.to_string()))
}

/// Scripted transport driven by explicit position updates, for hosts that
/// own playback themselves.
#[derive(Debug, Clone, Default)]
pub struct ManualTransport {
    pub position_ms: f64,
    pub duration_ms: Option<f64>,
    pub playing: bool,
    pub stopped: bool,
}

impl ManualTransport {
    pub fn new(duration_ms: Option<f64>) -> Self {
        Self {
            duration_ms,
            ..Default::default()
        }
    }

    /// Moves the playhead forward if playing, clamped to the duration.
    pub fn advance(&mut self, delta_ms: f64) {
        if !self.playing {
            return;
        }
        let next = self.position_ms + delta_ms;
        self.position_ms = match self.duration_ms {
            Some(duration) => next.min(duration),
            None => next,
        };
    }
}

impl MediaTransport for ManualTransport {
    fn play(&mut self) -> Result<(), PlaybackError> {
        if self.stopped {
            return Err(PlaybackError::Output("transport stopped".into()));
        }
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn stop(&mut self) {
        self.playing = false;
        self.stopped = true;
    }

    fn position_ms(&self) -> f64 {
        self.position_ms
    }

    fn duration_ms(&self) -> Option<f64> {
        self.duration_ms
    }

    fn has_ended(&self) -> bool {
        self.duration_ms
            .map(|duration| self.position_ms >= duration)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(track: DecodedTrack, device_rate: u64, channels: usize) -> OutputState {
        OutputState {
            track: Arc::new(track),
            device_rate,
            channels,
            frames_played: Arc::new(AtomicU64::new(0)),
            playing: Arc::new(AtomicBool::new(true)),
        }
    }

    #[test]
    fn output_state_resamples_and_spreads_mono() {
        let track = DecodedTrack {
            sample_rate: 1000,
            channels: 1,
            samples: vec![0.1, 0.2, 0.3, 0.4],
        };
        let output = state(track, 2000, 2);
        let mut frame = [0.0f32; 2];
        output.next_frame(&mut frame);
        assert_eq!(frame, [0.1, 0.1]);
        output.next_frame(&mut frame);
        assert_eq!(frame, [0.1, 0.1]);
        output.next_frame(&mut frame);
        assert_eq!(frame, [0.2, 0.2]);
        assert_eq!(output.frames_played.load(Ordering::Acquire), 3);
    }

    #[test]
    fn paused_output_is_silent_and_holds_playhead() {
        let track = DecodedTrack {
            sample_rate: 1000,
            channels: 1,
            samples: vec![0.5; 10],
        };
        let output = state(track, 1000, 1);
        output.playing.store(false, Ordering::Release);
        let mut frame = [1.0f32];
        output.next_frame(&mut frame);
        assert_eq!(frame, [0.0]);
        assert_eq!(output.frames_played.load(Ordering::Acquire), 0);
    }

    #[test]
    fn empty_tracks_are_rejected() {
        let track = DecodedTrack {
            sample_rate: 44_100,
            channels: 2,
            samples: Vec::new(),
        };
        assert!(matches!(
            BackingTrackPlayer::from_track(track),
            Err(PlaybackError::Load(_))
        ));
    }

    #[test]
    fn manual_transport_clamps_to_duration() {
        let mut transport = ManualTransport::new(Some(1000.0));
        transport.advance(500.0);
        assert_eq!(transport.position_ms(), 0.0);
        transport.play().unwrap();
        transport.advance(800.0);
        transport.advance(800.0);
        assert_eq!(transport.position_ms(), 1000.0);
        assert!(transport.has_ended());
        transport.stop();
        assert!(transport.play().is_err());
    }
}
