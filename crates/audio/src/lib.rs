pub mod backend;
pub mod capture;
pub mod dsp;
pub mod error;
pub mod io;
pub mod pitch;
pub mod playback;

pub use backend::{
    AudioBackend, CaptureConstraints, NullBackend, SampleFrame, SignalSource, SyntheticSource,
    ToneBackend,
};
pub use capture::{list_input_devices, CpalBackend, CpalCapture};
pub use error::{DeviceError, PlaybackError};
pub use io::{AudioDecoder, DecodedTrack};
pub use pitch::{EstimatorConfig, LagSelection, PitchEstimate, PitchEstimator};
pub use playback::{BackingTrackPlayer, ManualTransport, MediaTransport};
