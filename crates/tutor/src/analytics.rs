use serde::{Deserialize, Serialize};

use crate::clock::ClockKind;
use crate::scoring::{NoteState, ScoreState};

/// Star rating for a session, 1 to 5.
pub fn stars_for_accuracy(accuracy: f32) -> u8 {
    match accuracy {
        a if a >= 0.95 => 5,
        a if a >= 0.8 => 4,
        a if a >= 0.6 => 3,
        a if a >= 0.4 => 2,
        _ => 1,
    }
}

/// Delivered once when a session completes or is abandoned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub score: u32,
    pub hits: u32,
    pub misses: u32,
    pub total_notes: usize,
    pub accuracy: f32,
    pub stars: u8,
    pub early_hits: usize,
    pub late_hits: usize,
    pub mean_abs_timing_error_ms: Option<f64>,
    pub clock: ClockKind,
    /// Stopped before the session ran to its end.
    pub abandoned: bool,
}

impl SessionSummary {
    pub fn new(score: ScoreState, states: &[NoteState], clock: ClockKind, abandoned: bool) -> Self {
        let errors: Vec<f64> = states
            .iter()
            .filter_map(|state| match state {
                NoteState::Hit { timing_error_ms } => Some(*timing_error_ms),
                _ => None,
            })
            .collect();
        let early_hits = errors.iter().filter(|e| **e < 0.0).count();
        let late_hits = errors.iter().filter(|e| **e > 0.0).count();
        let mean_abs_timing_error_ms = if errors.is_empty() {
            None
        } else {
            Some(errors.iter().map(|e| e.abs()).sum::<f64>() / errors.len() as f64)
        };
        let accuracy = if states.is_empty() {
            0.0
        } else {
            score.hits as f32 / states.len() as f32
        };
        Self {
            score: score.total_score,
            hits: score.hits,
            misses: score.misses,
            total_notes: states.len(),
            accuracy,
            stars: stars_for_accuracy(accuracy),
            early_hits,
            late_hits,
            mean_abs_timing_error_ms,
            clock,
            abandoned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn stars_follow_accuracy_bands() {
        assert_eq!(stars_for_accuracy(1.0), 5);
        assert_eq!(stars_for_accuracy(0.95), 5);
        assert_eq!(stars_for_accuracy(0.9), 4);
        assert_eq!(stars_for_accuracy(0.6), 3);
        assert_eq!(stars_for_accuracy(0.5), 2);
        assert_eq!(stars_for_accuracy(0.0), 1);
    }

    #[test]
    fn summary_splits_early_and_late() {
        let states = [
            NoteState::Hit { timing_error_ms: -40.0 },
            NoteState::Hit { timing_error_ms: 120.0 },
            NoteState::Missed,
            NoteState::Missed,
        ];
        let score = ScoreState {
            total_score: 20,
            hits: 2,
            misses: 2,
        };
        let summary = SessionSummary::new(score, &states, ClockKind::WallClock, false);
        assert_eq!(summary.early_hits, 1);
        assert_eq!(summary.late_hits, 1);
        assert_relative_eq!(summary.accuracy, 0.5);
        assert_eq!(summary.stars, 2);
        assert_relative_eq!(summary.mean_abs_timing_error_ms.unwrap(), 80.0);
        assert_eq!(summary.total_notes, 4);
    }

    #[test]
    fn summary_serializes_completion_fields() {
        let summary = SessionSummary::new(
            ScoreState::default(),
            &[NoteState::Missed],
            ClockKind::MediaClock,
            true,
        );
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["score"], 0);
        assert_eq!(json["misses"], 0);
        assert_eq!(json["clock"], "MediaClock");
        assert_eq!(json["abandoned"], true);
        assert!(json["mean_abs_timing_error_ms"].is_null());
    }
}
