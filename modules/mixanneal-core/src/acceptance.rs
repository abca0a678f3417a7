//! Acceptance test and early-stop numerics.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Converts a win-fraction deficit into an energy gap.
pub const ACCEPT_SHARPNESS: f64 = 20.0;

/// Below this best-case acceptance chance a round is considered lost.
pub const HOPELESS_ACCEPT_CHANCE: f64 = 0.01;

/// Probability of accepting a candidate that won `score` of its comparisons.
///
/// Candidates at or above an even split are always accepted. Below it the
/// chance is `exp(-(SHARPNESS * (1 - 2 * score)) / temperature)`.
pub fn accept_chance(score: f64, temperature: f64) -> f64 {
    if score >= 0.5 {
        return 1.0;
    }
    let deficit = (1.0 - score) - score;
    (-(ACCEPT_SHARPNESS * deficit) / temperature).exp()
}

/// Fraction of judged comparisons won by the candidate, or `None` when
/// nothing was judged.
pub fn win_fraction(current_score: f64, candidate_score: f64) -> Option<f64> {
    let total = current_score + candidate_score;
    if total > 0.0 && total.is_finite() {
        Some(candidate_score / total)
    } else {
        None
    }
}

/// Number of comparisons worth judging at `temperature`; shrinks exponentially
/// as the schedule cools.
pub fn round_budget(temperature: f64, scale: f64, decay: f64) -> f64 {
    scale * (-temperature / decay).exp()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The round budget has been used up.
    BudgetExhausted,
    /// The candidate is accepted even if it loses every remaining comparison.
    CandidateDecided,
    /// Even winning every remaining comparison leaves a negligible chance.
    CurrentDecided,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::BudgetExhausted => write!(f, "budget exhausted"),
            StopReason::CandidateDecided => write!(f, "candidate won early"),
            StopReason::CurrentDecided => write!(f, "current won early"),
        }
    }
}

/// Decide whether judging can stop for the current round.
pub fn stop_reason(
    current_score: f64,
    candidate_score: f64,
    temperature: f64,
    budget_scale: f64,
    budget_decay: f64,
) -> Option<StopReason> {
    let max_rounds = round_budget(temperature, budget_scale, budget_decay);
    let judged = current_score + candidate_score;
    let remaining = max_rounds - judged;

    if remaining <= 0.0 {
        return Some(StopReason::BudgetExhausted);
    }

    let worst_case = accept_chance(candidate_score / max_rounds, temperature);
    if worst_case >= 1.0 {
        return Some(StopReason::CandidateDecided);
    }

    let best_case = accept_chance((candidate_score + remaining) / max_rounds, temperature);
    if best_case <= HOPELESS_ACCEPT_CHANCE {
        return Some(StopReason::CurrentDecided);
    }

    None
}
