use serde::{Deserialize, Serialize};

use crate::{events::NoteEvent, tempo::Tempo, DomainError};

/// Wire shape of a practice sequence, as supplied by lesson content.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SequenceRecord {
    #[serde(alias = "sequence")]
    pub notes: Vec<NoteEvent>,
    #[serde(default, rename = "tempo_bpm", alias = "bpm", skip_serializing_if = "Option::is_none")]
    pub tempo: Option<Tempo>,
    #[serde(default, alias = "backingTrackUrl", skip_serializing_if = "Option::is_none")]
    pub backing_track_url: Option<String>,
    #[serde(default, alias = "total_duration", skip_serializing_if = "Option::is_none")]
    pub total_duration_ms: Option<f64>,
}

/// A validated, time-ordered list of notes for one practice session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "SequenceRecord", into = "SequenceRecord")]
pub struct Sequence {
    notes: Vec<NoteEvent>,
    tempo: Option<Tempo>,
    backing_track_url: Option<String>,
    total_duration_ms: Option<f64>,
}

impl Sequence {
    /// Validates every note, orders them by scheduled time (stable for equal
    /// times) and assigns `sequence_index` in that order.
    pub fn new(notes: Vec<NoteEvent>) -> Result<Self, DomainError> {
        if notes.is_empty() {
            return Err(DomainError::validation(
                "sequence requires at least one note",
            ));
        }
        for note in &notes {
            note.validate()?;
        }
        let mut notes = notes;
        notes.sort_by(|a, b| a.scheduled_time_ms.total_cmp(&b.scheduled_time_ms));
        for (index, note) in notes.iter_mut().enumerate() {
            note.sequence_index = index;
        }
        Ok(Self {
            notes,
            tempo: None,
            backing_track_url: None,
            total_duration_ms: None,
        })
    }

    pub fn with_tempo(mut self, tempo: Tempo) -> Self {
        self.tempo = Some(tempo);
        self
    }

    pub fn with_backing_track(mut self, url: impl Into<String>) -> Self {
        self.backing_track_url = Some(url.into());
        self
    }

    pub fn with_total_duration_ms(mut self, total_ms: f64) -> Result<Self, DomainError> {
        if !total_ms.is_finite() || total_ms < 0.0 {
            return Err(DomainError::validation(
                "total duration must be a non-negative number of milliseconds",
            ));
        }
        self.total_duration_ms = Some(total_ms);
        Ok(self)
    }

    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, sequence_index: usize) -> Option<&NoteEvent> {
        self.notes.get(sequence_index)
    }

    pub fn tempo(&self) -> Option<Tempo> {
        self.tempo
    }

    pub fn backing_track_url(&self) -> Option<&str> {
        self.backing_track_url.as_deref()
    }

    pub fn total_duration_ms(&self) -> Option<f64> {
        self.total_duration_ms
    }

    pub fn last_note_time_ms(&self) -> f64 {
        self.notes
            .last()
            .map(|note| note.scheduled_time_ms)
            .unwrap_or(0.0)
    }
}

impl TryFrom<SequenceRecord> for Sequence {
    type Error = DomainError;

    fn try_from(record: SequenceRecord) -> Result<Self, Self::Error> {
        let mut sequence = Sequence::new(record.notes)?;
        sequence.tempo = record.tempo;
        sequence.backing_track_url = record.backing_track_url;
        match record.total_duration_ms {
            Some(total) => sequence.with_total_duration_ms(total),
            None => Ok(sequence),
        }
    }
}

impl From<Sequence> for SequenceRecord {
    fn from(sequence: Sequence) -> Self {
        Self {
            notes: sequence.notes,
            tempo: sequence.tempo,
            backing_track_url: sequence.backing_track_url,
            total_duration_ms: sequence.total_duration_ms,
        }
    }
}
