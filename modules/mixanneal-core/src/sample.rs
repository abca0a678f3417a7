use serde::{Deserialize, Serialize};

use crate::weights::WeightVector;

/// A rendered artifact, referenced by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: String,
    /// Seed the generator actually used.
    pub seed: u64,
    pub weights: WeightVector,
}

/// Current and candidate renders sharing one seed, awaiting the judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePair {
    pub current: Sample,
    pub candidate: Sample,
}

impl SamplePair {
    pub fn seed(&self) -> u64 {
        self.current.seed
    }
}

/// Judge decision for a single pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Current,
    Candidate,
    Draw,
}

/// Cumulative scores for the round in progress. A draw counts half for each side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    pub current: f64,
    pub candidate: f64,
}

impl Tally {
    pub fn record(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Current => self.current += 1.0,
            Verdict::Candidate => self.candidate += 1.0,
            Verdict::Draw => {
                self.current += 0.5;
                self.candidate += 0.5;
            }
        }
    }

    pub fn judged(&self) -> f64 {
        self.current + self.candidate
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
