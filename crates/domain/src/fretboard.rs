use serde::{Deserialize, Serialize};

use crate::pitch::{note_from_pitch, NoteName};
use crate::DomainError;

pub const STRING_COUNT: u8 = 6;
pub const MAX_FRET: u8 = 24;

/// Open-string frequencies of standard tuning, lowest string first (E2 A2 D3 G3 B3 E4).
pub const STANDARD_TUNING_HZ: [f64; 6] = [82.41, 110.00, 146.83, 196.00, 246.94, 329.63];

/// Open-string frequencies, lowest string (string 6) first.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Tuning {
    pub name: String,
    pub open_strings_hz: [f64; 6],
}

impl Tuning {
    pub fn standard() -> Self {
        Self {
            name: "standard".into(),
            open_strings_hz: STANDARD_TUNING_HZ,
        }
    }

    pub fn new(name: impl Into<String>, open_strings_hz: [f64; 6]) -> Result<Self, DomainError> {
        let tuning = Self {
            name: name.into(),
            open_strings_hz,
        };
        tuning.validate()?;
        Ok(tuning)
    }

    /// Checks a tuning that was built or deserialized without [`Tuning::new`].
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.open_strings_hz.iter().any(|hz| !hz.is_finite() || *hz <= 0.0) {
            return Err(DomainError::validation(
                "open string frequencies must be positive",
            ));
        }
        Ok(())
    }

    /// Open frequency of a string numbered 1 (highest) to 6 (lowest).
    pub fn open_string_hz(&self, string: u8) -> Option<f64> {
        if !(1..=STRING_COUNT).contains(&string) {
            return None;
        }
        Some(self.open_strings_hz[(STRING_COUNT - string) as usize])
    }

    pub fn frequency(&self, position: FretPosition) -> f64 {
        let open = self.open_strings_hz[(STRING_COUNT - position.string) as usize];
        open * 2f64.powf(position.fret as f64 / 12.0)
    }

    pub fn note_name(&self, position: FretPosition) -> Option<NoteName> {
        note_from_pitch(self.frequency(position))
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self::standard()
    }
}

/// A validated (string, fret) pair. String 1 is the highest-pitched string.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FretPosition {
    string: u8,
    fret: u8,
}

impl FretPosition {
    pub fn new(string: u8, fret: u8) -> Result<Self, DomainError> {
        if !(1..=STRING_COUNT).contains(&string) {
            return Err(DomainError::out_of_range("string", string, 1..=STRING_COUNT));
        }
        if fret > MAX_FRET {
            return Err(DomainError::out_of_range("fret", fret, 0..=MAX_FRET));
        }
        Ok(Self { string, fret })
    }

    pub fn string(&self) -> u8 {
        self.string
    }

    pub fn fret(&self) -> u8 {
        self.fret
    }
}

/// Expected frequency in standard tuning; `None` when the position is off the board.
pub fn expected_frequency(string: u8, fret: u8) -> Option<f64> {
    FretPosition::new(string, fret)
        .ok()
        .map(|position| Tuning::standard().frequency(position))
}

pub fn expected_note(string: u8, fret: u8) -> Option<NoteName> {
    expected_frequency(string, fret).and_then(note_from_pitch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn open_strings_follow_numbering() {
        assert_relative_eq!(expected_frequency(6, 0).unwrap(), 82.41);
        assert_relative_eq!(expected_frequency(1, 0).unwrap(), 329.63);
        assert_relative_eq!(expected_frequency(5, 0).unwrap(), 110.0);
    }

    #[test]
    fn frequency_increases_with_fret() {
        for string in 1..=STRING_COUNT {
            let mut previous = 0.0;
            for fret in 0..=MAX_FRET {
                let hz = expected_frequency(string, fret).unwrap();
                assert!(hz > previous, "string {string} fret {fret}");
                previous = hz;
            }
            assert_relative_eq!(
                expected_frequency(string, 12).unwrap(),
                2.0 * expected_frequency(string, 0).unwrap(),
                max_relative = 1e-12
            );
        }
    }

    #[test]
    fn tunings_need_positive_open_strings() {
        assert!(Tuning::standard().validate().is_ok());
        let drop_d = [73.42, 110.0, 146.83, 196.0, 246.94, 329.63];
        assert!(Tuning::new("drop d", drop_d).is_ok());
        let mut broken = Tuning::standard();
        broken.open_strings_hz[2] = 0.0;
        assert!(broken.validate().is_err());
        assert!(Tuning::new("nan", [f64::NAN; 6]).is_err());
    }

    #[test]
    fn rejects_positions_off_the_board() {
        assert!(FretPosition::new(0, 3).is_err());
        assert!(FretPosition::new(7, 3).is_err());
        assert!(FretPosition::new(3, 25).is_err());
        assert_eq!(expected_frequency(7, 0), None);
    }

    #[test]
    fn note_names_on_the_board() {
        assert_eq!(expected_note(6, 0), Some(NoteName::E));
        assert_eq!(expected_note(5, 0), Some(NoteName::A));
        assert_eq!(expected_note(6, 5), Some(NoteName::A));
        assert_eq!(expected_note(2, 1), Some(NoteName::C));
        assert_eq!(expected_note(3, 2), Some(NoteName::A));
    }

    #[test]
    fn custom_tuning_shifts_strings() {
        let mut hz = STANDARD_TUNING_HZ;
        hz[0] = 73.42;
        let drop_d = Tuning::new("drop d", hz).unwrap();
        let low = FretPosition::new(6, 0).unwrap();
        assert_eq!(drop_d.note_name(low), Some(NoteName::D));
        assert!(Tuning::new("broken", [0.0; 6]).is_err());
    }
}
