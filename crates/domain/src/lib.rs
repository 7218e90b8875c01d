pub mod error;
pub mod events;
pub mod fretboard;
pub mod io;
pub mod pitch;
pub mod sequence;
pub mod tempo;

pub use crate::error::DomainError;
pub use crate::events::{NoteEvent, Technique};
pub use crate::fretboard::{expected_frequency, expected_note, FretPosition, Tuning};
pub use crate::io::{load_sequence, parse_sequence, ExportFormat, SequenceExporter};
pub use crate::pitch::{cents_from_nearest, note_from_pitch, NoteName};
pub use crate::sequence::{Sequence, SequenceRecord};
pub use crate::tempo::Tempo;
