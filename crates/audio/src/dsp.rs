#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameLevel {
    pub rms: f32,
    /// Largest absolute sample value.
    pub peak: f32,
}

impl FrameLevel {
    pub fn silence() -> Self {
        Self { rms: 0.0, peak: 0.0 }
    }
}

pub fn measure(samples: &[f32]) -> FrameLevel {
    if samples.is_empty() {
        return FrameLevel::silence();
    }
    let mut sum_squares = 0.0f32;
    let mut peak = 0.0f32;
    for sample in samples {
        sum_squares += sample * sample;
        peak = peak.max(sample.abs());
    }
    FrameLevel {
        rms: (sum_squares / samples.len() as f32).sqrt(),
        peak,
    }
}

/// Writes `samples` scaled so that `peak` maps to `target_peak` into `out`.
pub fn normalize_into(samples: &[f32], peak: f32, target_peak: f32, out: &mut Vec<f32>) {
    let gain = target_peak / peak.max(f32::MIN_POSITIVE);
    out.clear();
    out.extend(samples.iter().map(|sample| sample * gain));
}

/// Averages interleaved channels down to mono.
pub fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    let channels = channels.max(1);
    out.extend(
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
    );
}

/// Sub-sample offset of a peak from its two neighbours, in `[-0.5, 0.5]`.
pub fn parabolic_offset(left: f32, centre: f32, right: f32) -> f32 {
    let denominator = left - 2.0 * centre + right;
    if denominator.abs() <= f32::EPSILON {
        return 0.0;
    }
    (0.5 * (left - right) / denominator).clamp(-0.5, 0.5)
}
