use std::fmt;

use serde::{Deserialize, Serialize};

/// Concert pitch of A4 in Hz.
pub const A4_HZ: f64 = 440.0;
/// MIDI note number of A4.
pub const A4_MIDI: i32 = 69;

/// The twelve chromatic pitch classes, sharps only.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NoteName {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl NoteName {
    pub const ALL: [NoteName; 12] = [
        NoteName::C,
        NoteName::CSharp,
        NoteName::D,
        NoteName::DSharp,
        NoteName::E,
        NoteName::F,
        NoteName::FSharp,
        NoteName::G,
        NoteName::GSharp,
        NoteName::A,
        NoteName::ASharp,
        NoteName::B,
    ];

    /// Pitch class for a MIDI note number (negative numbers wrap).
    pub fn from_midi(midi: i32) -> Self {
        Self::ALL[midi.rem_euclid(12) as usize]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NoteName::C => "C",
            NoteName::CSharp => "C#",
            NoteName::D => "D",
            NoteName::DSharp => "D#",
            NoteName::E => "E",
            NoteName::F => "F",
            NoteName::FSharp => "F#",
            NoteName::G => "G",
            NoteName::GSharp => "G#",
            NoteName::A => "A",
            NoteName::ASharp => "A#",
            NoteName::B => "B",
        }
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Fractional semitone distance from A4. `None` for frequencies that carry
/// no pitch (zero, negative, NaN or infinite).
pub fn semitones_from_a4(frequency_hz: f64) -> Option<f64> {
    if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
        return None;
    }
    Some(12.0 * (frequency_hz / A4_HZ).log2())
}

/// Nearest equal-tempered MIDI note number.
pub fn midi_from_pitch(frequency_hz: f64) -> Option<i32> {
    semitones_from_a4(frequency_hz).map(|semitones| semitones.round() as i32 + A4_MIDI)
}

/// Maps a frequency to the name of the nearest equal-tempered note.
pub fn note_from_pitch(frequency_hz: f64) -> Option<NoteName> {
    midi_from_pitch(frequency_hz).map(NoteName::from_midi)
}

/// Frequency of a MIDI note number in equal temperament.
pub fn frequency_from_midi(midi: i32) -> f64 {
    A4_HZ * 2f64.powf((midi - A4_MIDI) as f64 / 12.0)
}

/// Signed distance in cents between `frequency_hz` and `reference_hz`.
pub fn cents_between(frequency_hz: f64, reference_hz: f64) -> Option<f64> {
    if !frequency_hz.is_finite() || frequency_hz <= 0.0 || reference_hz <= 0.0 {
        return None;
    }
    Some(1200.0 * (frequency_hz / reference_hz).log2())
}

/// Cents offset from the nearest equal-tempered note, in `[-50, 50]`.
pub fn cents_from_nearest(frequency_hz: f64) -> Option<f64> {
    let midi = midi_from_pitch(frequency_hz)?;
    cents_between(frequency_hz, frequency_from_midi(midi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn a440_is_a() {
        assert_eq!(note_from_pitch(440.0), Some(NoteName::A));
        assert_eq!(note_from_pitch(880.0), Some(NoteName::A));
        assert_eq!(note_from_pitch(82.41), Some(NoteName::E));
        assert_eq!(note_from_pitch(261.63), Some(NoteName::C));
    }

    #[test]
    fn silence_has_no_note() {
        assert_eq!(note_from_pitch(0.0), None);
        assert_eq!(note_from_pitch(-1.0), None);
        assert_eq!(note_from_pitch(f64::NAN), None);
    }

    #[test]
    fn rounds_to_nearest_semitone() {
        // 45 cents above A4 still reads as A, 55 cents above reads as A#.
        assert_eq!(note_from_pitch(440.0 * 2f64.powf(0.45 / 12.0)), Some(NoteName::A));
        assert_eq!(note_from_pitch(440.0 * 2f64.powf(0.55 / 12.0)), Some(NoteName::ASharp));
    }

    #[test]
    fn names_render_with_sharps() {
        assert_eq!(NoteName::FSharp.to_string(), "F#");
        assert_eq!(NoteName::from_midi(-1), NoteName::B);
    }

    #[test]
    fn cents_offsets() {
        assert_relative_eq!(cents_from_nearest(440.0).unwrap(), 0.0, epsilon = 1e-9);
        let sharp = 440.0 * 2f64.powf(10.0 / 1200.0);
        assert_relative_eq!(cents_from_nearest(sharp).unwrap(), 10.0, epsilon = 1e-6);
        assert_relative_eq!(frequency_from_midi(57), 220.0, epsilon = 1e-9);
    }
}
