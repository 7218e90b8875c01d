use serde::{Deserialize, Serialize};
use time::Duration;

use crate::fretboard::{FretPosition, MAX_FRET, STRING_COUNT};
use crate::DomainError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Technique {
    Hammer,
    Pull,
    Slide,
    Bend,
    Vibrato,
    Tremolo,
}

/// One scheduled note of a practice sequence.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NoteEvent {
    /// Position in the time-ordered sequence; assigned by [`crate::Sequence`].
    #[serde(default)]
    pub sequence_index: usize,
    /// 1 = highest-pitched string, 6 = lowest.
    pub string: u8,
    pub fret: u8,
    /// Milliseconds from the start of the session.
    #[serde(rename = "time_ms", alias = "time")]
    pub scheduled_time_ms: f64,
    #[serde(default, alias = "duration", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technique: Option<Technique>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finger: Option<u8>,
    /// Display label supplied with the content; never used for matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_name: Option<String>,
}

impl NoteEvent {
    pub fn new(string: u8, fret: u8, scheduled_time_ms: f64) -> Self {
        Self {
            sequence_index: 0,
            string,
            fret,
            scheduled_time_ms,
            duration_ms: None,
            technique: None,
            finger: None,
            note_name: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_technique(mut self, technique: Technique) -> Self {
        self.technique = Some(technique);
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if !(1..=STRING_COUNT).contains(&self.string) {
            return Err(DomainError::out_of_range(
                "string",
                self.string,
                1..=STRING_COUNT,
            ));
        }
        if self.fret > MAX_FRET {
            return Err(DomainError::out_of_range("fret", self.fret, 0..=MAX_FRET));
        }
        if !self.scheduled_time_ms.is_finite() || self.scheduled_time_ms < 0.0 {
            return Err(DomainError::validation(
                "note time must be a non-negative number of milliseconds",
            ));
        }
        if let Some(duration) = self.duration_ms {
            if !duration.is_finite() || duration < 0.0 {
                return Err(DomainError::validation(
                    "note duration must be a non-negative number of milliseconds",
                ));
            }
        }
        if let Some(finger) = self.finger {
            if !(1..=4).contains(&finger) {
                return Err(DomainError::out_of_range("finger", finger, 1..=4));
            }
        }
        Ok(())
    }

    pub fn position(&self) -> Result<FretPosition, DomainError> {
        FretPosition::new(self.string, self.fret)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_ms.map(|ms| Duration::seconds_f64(ms / 1000.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_rejects_out_of_range_fields() {
        assert!(NoteEvent::new(6, 0, 1000.0).validate().is_ok());
        assert!(NoteEvent::new(0, 0, 0.0).validate().is_err());
        assert!(NoteEvent::new(7, 0, 0.0).validate().is_err());
        assert!(NoteEvent::new(1, 25, 0.0).validate().is_err());
        assert!(NoteEvent::new(1, 0, -5.0).validate().is_err());
        assert!(NoteEvent::new(1, 0, f64::NAN).validate().is_err());
        assert!(NoteEvent::new(1, 0, 0.0)
            .with_duration(-1.0)
            .validate()
            .is_err());
    }

    #[test]
    fn deserializes_content_field_names() {
        let event: NoteEvent =
            serde_json::from_str(r#"{"string":3,"fret":2,"time":1500,"duration":250,"technique":"slide"}"#)
                .unwrap();
        assert_eq!(event.scheduled_time_ms, 1500.0);
        assert_eq!(event.duration_ms, Some(250.0));
        assert_eq!(event.technique, Some(Technique::Slide));
        assert_eq!(event.duration(), Some(Duration::milliseconds(250)));
    }
}
