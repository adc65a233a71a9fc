//! Confidence filter: the last word on which candidates are shown.
//!
//! Two steps over an already-ordered candidate list:
//! 1. drop everything below the modality's absolute floor;
//! 2. if the leader beats the runner-up by more than `leader_margin`, keep
//!    only the leader.
//!
//! The result is then cut to `top_k_final`. Pure and order-preserving.

use shopsearch_core::config::SearchSettings;
use shopsearch_core::types::{Candidate, Modality};

/// Slack for scores derived through f32 arithmetic (`1 - distance`), so a
/// score that equals the floor or margin in exact terms is judged as equal.
pub const SCORE_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidencePolicy {
    pub text_floor: f32,
    pub image_floor: f32,
    pub leader_margin: f32,
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self::from_settings(&SearchSettings::default())
    }
}

impl ConfidencePolicy {
    pub fn from_settings(s: &SearchSettings) -> Self {
        Self {
            text_floor: s.text_threshold,
            image_floor: s.image_threshold,
            leader_margin: s.leader_margin,
        }
    }

    pub fn floor(&self, modality: Modality) -> f32 {
        match modality {
            Modality::Text => self.text_floor,
            Modality::Image => self.image_floor,
        }
    }

    pub fn apply(&self, modality: Modality, candidates: Vec<Candidate>, top_k_final: usize) -> Vec<Candidate> {
        let floor = self.floor(modality);
        // NaN never passes
        let mut kept: Vec<Candidate> =
            candidates.into_iter().filter(|c| c.score() >= floor - SCORE_EPSILON).collect();

        if kept.len() >= 2 && kept[0].score() - kept[1].score() > self.leader_margin + SCORE_EPSILON {
            kept.truncate(1);
        }
        kept.truncate(top_k_final);
        kept
    }
}
