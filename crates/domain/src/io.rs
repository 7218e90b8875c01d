use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{error::DomainError, sequence::Sequence};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    JsonPretty,
}

pub trait SequenceExporter {
    fn export(&self, sequence: &Sequence, format: ExportFormat) -> Result<Vec<u8>, DomainError>;
}

pub struct JsonExporter;

impl SequenceExporter for JsonExporter {
    fn export(&self, sequence: &Sequence, format: ExportFormat) -> Result<Vec<u8>, DomainError> {
        let bytes = match format {
            ExportFormat::Json => serde_json::to_vec(sequence)?,
            ExportFormat::JsonPretty => serde_json::to_vec_pretty(sequence)?,
        };
        Ok(bytes)
    }
}

pub fn parse_sequence(json: &str) -> Result<Sequence, DomainError> {
    Ok(serde_json::from_str(json)?)
}

/// Loads and validates a sequence file.
pub fn load_sequence<P: AsRef<Path>>(path: P) -> Result<Sequence> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref).with_context(|| format!("open sequence file {:?}", path_ref))?;
    let sequence = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parse sequence file {:?}", path_ref))?;
    Ok(sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoteEvent;

    #[test]
    fn exports_json() {
        let sequence = Sequence::new(vec![NoteEvent::new(6, 0, 1000.0)]).unwrap();
        let bytes = JsonExporter
            .export(&sequence, ExportFormat::JsonPretty)
            .unwrap();
        let output = String::from_utf8(bytes).unwrap();
        assert!(output.contains("\"time_ms\": 1000.0"));
        assert_eq!(parse_sequence(&output).unwrap(), sequence);
    }

    #[test]
    fn invalid_content_is_a_validation_failure() {
        let err = parse_sequence(r#"{"notes": []}"#).unwrap_err();
        assert!(matches!(err, DomainError::Serialization(_)));
        assert!(err.to_string().contains("at least one note"));
    }

    #[test]
    fn load_reports_missing_file() {
        assert!(load_sequence("does-not-exist.json").is_err());
    }
}
