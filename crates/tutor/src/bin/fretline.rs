use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use fretline_audio::{
    list_input_devices, AudioBackend, BackingTrackPlayer, CpalBackend, MediaTransport,
    SignalSource, ToneBackend,
};
use fretline_domain::io::JsonExporter;
use fretline_domain::{load_sequence, ExportFormat, SequenceExporter};
use fretline_tutor::{
    media_or_wall_clock, EngineConfig, InputSource, NoteOutcome, PlaybackClock, TimingEngine,
    Tuner, WallClock,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const TICK: Duration = Duration::from_millis(16);

#[derive(Parser, Debug)]
#[command(author, version, about = "Play along to a note sequence and get scored", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a practice session against a JSON note sequence
    Play {
        sequence: PathBuf,
        /// Audio file used as the session clock; overrides the sequence's track
        #[arg(short, long)]
        backing_track: Option<PathBuf>,
        /// Engine configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long, value_enum, default_value_t = Input::Mic)]
        input: Input,
        /// Frequency heard by `--input tone`
        #[arg(long, default_value_t = 82.41)]
        tone_hz: f64,
        /// Calibration offset in ms, replacing the configured one
        #[arg(long, allow_hyphen_values = true)]
        offset_ms: Option<f64>,
    },
    /// Show live tuner readings
    Tune {
        /// String to tune, 1 (high E) to 6 (low E)
        #[arg(short, long)]
        string: Option<u8>,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
    /// Validate a sequence and print it in normalized form
    Check { sequence: PathBuf },
    /// List audio input devices
    Devices,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Input {
    Mic,
    Tone,
    None,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Command::Play {
            sequence,
            backing_track,
            config,
            input,
            tone_hz,
            offset_ms,
        } => play(&sequence, backing_track, config, input, tone_hz, offset_ms),
        Command::Tune {
            string,
            config,
            seconds,
        } => tune(string, config, seconds),
        Command::Check { sequence } => {
            let sequence = load_sequence(&sequence)?;
            let bytes = JsonExporter.export(&sequence, ExportFormat::JsonPretty)?;
            println!("{}", String::from_utf8_lossy(&bytes));
            Ok(())
        }
        Command::Devices => {
            for name in list_input_devices() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path),
        None => Ok(EngineConfig::default()),
    }
}

fn play(
    sequence_path: &Path,
    backing_track: Option<PathBuf>,
    config: Option<PathBuf>,
    input: Input,
    tone_hz: f64,
    offset_ms: Option<f64>,
) -> anyhow::Result<()> {
    let sequence = load_sequence(sequence_path)?;
    let mut config = load_config(config)?;
    if let Some(offset_ms) = offset_ms {
        config.calibration_offset_ms = offset_ms;
    }

    let input = match input {
        Input::Mic => InputSource::Microphone(Box::new(CpalBackend::default())),
        Input::Tone => InputSource::Microphone(Box::new(ToneBackend {
            frequency_hz: tone_hz,
        })),
        Input::None => InputSource::None,
    };

    // A relative track reference in the sequence resolves next to the file.
    let track = backing_track.or_else(|| {
        sequence.backing_track_url().map(|url| {
            sequence_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(url)
        })
    });
    let clock: Box<dyn PlaybackClock> = match track {
        Some(path) => media_or_wall_clock(
            BackingTrackPlayer::open(&path).map(|player| Box::new(player) as Box<dyn MediaTransport>),
        ),
        None => Box::new(WallClock::new()),
    };

    let mut engine = TimingEngine::new(config, input)?.with_completion(|summary| {
        info!(score = summary.score, stars = summary.stars, "practice finished");
    });
    engine.start(sequence, clock)?;
    info!(
        total_ms = ?engine.total_duration_ms(),
        clock = ?engine.clock_kind(),
        "playing"
    );

    loop {
        let started = Instant::now();
        let Some(report) = engine.tick() else {
            break;
        };
        for outcome in &report.outcomes {
            match outcome {
                NoteOutcome::Hit {
                    sequence_index,
                    timing_error_ms,
                } => println!(
                    "{:>8.0} ms  hit   #{sequence_index} ({timing_error_ms:+.0} ms)",
                    report.now_ms
                ),
                NoteOutcome::Missed { sequence_index } => {
                    println!("{:>8.0} ms  miss  #{sequence_index}", report.now_ms)
                }
            }
        }
        if let Some(summary) = report.completed {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            return Ok(());
        }
        thread::sleep(TICK.saturating_sub(started.elapsed()));
    }
    warn!(state = ?engine.state(), "session ended without completing");
    Ok(())
}

fn tune(string: Option<u8>, config: Option<PathBuf>, seconds: u64) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let mut tuner = Tuner::new(config.estimator, config.tuning.clone());
    if let Some(string) = string {
        tuner = tuner.with_target_string(string)?;
    }
    let mut capture = CpalBackend::default()
        .open_input(&config.capture)
        .context("open microphone for tuning")?;

    let deadline = Instant::now() + Duration::from_secs(seconds);
    while Instant::now() < deadline {
        let reading = tuner.read(&capture.read_frame());
        match (reading.note, reading.cents, reading.target) {
            (Some(note), Some(cents), Some(target)) => println!(
                "{note:<2} {cents:+5.1} cents | string {} {:+6.1} cents {:?}",
                target.string, target.cents, target.direction
            ),
            (Some(note), Some(cents), None) => println!("{note:<2} {cents:+5.1} cents"),
            _ => println!("--"),
        }
        thread::sleep(Duration::from_millis(100));
    }
    capture.close();
    Ok(())
}
