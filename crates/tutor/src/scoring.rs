use fretline_audio::PitchEstimate;
use fretline_domain::{note_from_pitch, NoteName, Sequence, Tuning};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub enum NoteState {
    Pending,
    /// Positive errors are late, negative early.
    Hit { timing_error_ms: f64 },
    Missed,
}

impl NoteState {
    pub fn is_pending(&self) -> bool {
        matches!(self, NoteState::Pending)
    }
}

/// Which pending notes a single detected pitch may resolve in one tick.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Only the candidate closest in time; equal distances go to the
    /// earlier sequence index.
    #[default]
    Nearest,
    /// Every candidate at once.
    All,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreState {
    pub total_score: u32,
    pub hits: u32,
    pub misses: u32,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub enum NoteOutcome {
    Hit {
        sequence_index: usize,
        timing_error_ms: f64,
    },
    Missed {
        sequence_index: usize,
    },
}

impl NoteOutcome {
    pub fn sequence_index(&self) -> usize {
        match self {
            NoteOutcome::Hit { sequence_index, .. } | NoteOutcome::Missed { sequence_index } => {
                *sequence_index
            }
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, NoteOutcome::Hit { .. })
    }
}

/// Owns the per-note state table of one session, indexed by
/// `sequence_index`, and the running score.
pub struct HitEvaluator {
    states: Vec<NoteState>,
    expected: Vec<Option<NoteName>>,
    score: ScoreState,
    hit_window_ms: f64,
    per_hit_score: u32,
    policy: MatchPolicy,
}

impl HitEvaluator {
    pub fn new(
        sequence: &Sequence,
        tuning: &Tuning,
        hit_window_ms: f64,
        per_hit_score: u32,
        policy: MatchPolicy,
    ) -> Self {
        let expected = sequence
            .notes()
            .iter()
            .map(|note| note.position().ok().and_then(|p| tuning.note_name(p)))
            .collect();
        Self {
            states: vec![NoteState::Pending; sequence.len()],
            expected,
            score: ScoreState::default(),
            hit_window_ms,
            per_hit_score,
            policy,
        }
    }

    pub fn states(&self) -> &[NoteState] {
        &self.states
    }

    pub fn state(&self, sequence_index: usize) -> Option<NoteState> {
        self.states.get(sequence_index).copied()
    }

    pub fn expected_note(&self, sequence_index: usize) -> Option<NoteName> {
        self.expected.get(sequence_index).copied().flatten()
    }

    pub fn score(&self) -> ScoreState {
        self.score
    }

    pub fn pending(&self) -> usize {
        self.states.iter().filter(|s| s.is_pending()).count()
    }

    /// Resolves notes for one tick. `offset_ms` shifts every scheduled time.
    pub fn evaluate(
        &mut self,
        sequence: &Sequence,
        now_ms: f64,
        offset_ms: f64,
        estimate: PitchEstimate,
    ) -> Vec<NoteOutcome> {
        let mut outcomes = Vec::new();
        let notes = sequence.notes();
        let due = |index: usize| notes[index].scheduled_time_ms + offset_ms;

        if let Some(detected) = estimate.frequency().and_then(note_from_pitch) {
            let candidates = (0..self.states.len()).filter(|&index| {
                self.states[index].is_pending()
                    && (due(index) - now_ms).abs() < self.hit_window_ms
                    && self.expected[index] == Some(detected)
            });
            let chosen: Vec<usize> = match self.policy {
                MatchPolicy::All => candidates.collect(),
                MatchPolicy::Nearest => candidates
                    .min_by(|&a, &b| {
                        (due(a) - now_ms)
                            .abs()
                            .total_cmp(&(due(b) - now_ms).abs())
                            .then(a.cmp(&b))
                    })
                    .into_iter()
                    .collect(),
            };
            for index in chosen {
                let timing_error_ms = now_ms - due(index);
                self.states[index] = NoteState::Hit { timing_error_ms };
                self.score.hits += 1;
                self.score.total_score += self.per_hit_score;
                outcomes.push(NoteOutcome::Hit {
                    sequence_index: index,
                    timing_error_ms,
                });
            }
        }

        for index in 0..self.states.len() {
            if self.states[index].is_pending() && now_ms - due(index) > self.hit_window_ms {
                self.states[index] = NoteState::Missed;
                self.score.misses += 1;
                outcomes.push(NoteOutcome::Missed {
                    sequence_index: index,
                });
            }
        }
        outcomes
    }

    /// Marks everything still pending as missed; used when a session ends
    /// before every window has closed.
    pub fn resolve_remaining(&mut self) -> Vec<NoteOutcome> {
        let mut outcomes = Vec::new();
        for (index, state) in self.states.iter_mut().enumerate() {
            if state.is_pending() {
                *state = NoteState::Missed;
                self.score.misses += 1;
                outcomes.push(NoteOutcome::Missed {
                    sequence_index: index,
                });
            }
        }
        outcomes
    }
}
