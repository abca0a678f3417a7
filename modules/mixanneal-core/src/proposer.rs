//! MutationProposer: learned proposal distribution over "which model to
//! perturb, and toward which weight".
//!
//! Two layers of interest drive each proposal:
//! - a per-model scalar that resets when the model is mutated and grows for
//!   every other model each round, so untouched models become more likely;
//! - a per-model array over the 101 weight buckets, reshaped after every
//!   round by Gaussian impact kernels centred on the tested weights.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AnnealError, Result};
use crate::kernel::{decay_toward_uniform, normalize_mean_one, ImpactKernel, OutcomeScalars};
use crate::roulette::weighted_index;
use crate::weights::{bucket_weight, WeightVector, BUCKET_COUNT};

const MODEL_INTEREST_BASELINE: f64 = 1.0;
const MODEL_INTEREST_GROWTH: f64 = 1.5;
const MODEL_INTEREST_CAP: f64 = 1e12;

/// Smallest interest a bucket can hold, so every weight stays reachable.
const BUCKET_INTEREST_FLOOR: f64 = f64::MIN_POSITIVE;

/// Exponent applied to every bucket after an acceptance.
const ACCEPT_DECAY_EXPONENT: f64 = 0.9;

// Kernel bases and spreads. Spreads are standard deviations in weight units
// per unit of temperature.
const DRAW_BASE: f64 = 0.5;
const DRAW_SPREAD: f64 = 0.25;
const WIN_BASE: f64 = 1.0 / 3.0;
const WIN_SPREAD: f64 = 0.5;
const LOSE_BASE: f64 = 1.0 / 3.0;
const LOSE_SPREAD: f64 = 0.5;
const NEAR_CANDIDATE_FACTOR: f64 = 0.01;
const NEAR_CANDIDATE_SPREAD: f64 = 0.2;
const NEAR_NEW_FACTOR: f64 = 0.7;
const NEAR_NEW_SPREAD: f64 = 0.2;
const FAR_FACTOR: f64 = 0.1;
const FAR_SPREAD: f64 = 1.5;

/// A proposed perturbation: set `model` to `weight`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    pub model: String,
    pub weight: f64,
}

#[derive(Debug, Clone)]
struct ModelState {
    interest: f64,
    buckets: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct MutationProposer {
    models: BTreeMap<String, ModelState>,
}

impl MutationProposer {
    /// Seed interest for every model with a positive weight, then run one
    /// null-mutation pass (candidate == current, score 0.5) per model.
    pub fn initialize(weights: &WeightVector, temperature: f64) -> Result<Self> {
        let mut models = BTreeMap::new();

        for (model, weight) in weights.iter().filter(|(_, w)| *w > 0.0) {
            let mut state = ModelState {
                interest: MODEL_INTEREST_BASELINE,
                buckets: vec![1.0; BUCKET_COUNT],
            };
            apply_outcome(&mut state.buckets, weight, weight, 0.5, false, temperature);
            renormalize(model, &mut state.buckets);
            models.insert(model.to_string(), state);
        }

        if models.is_empty() {
            return Err(AnnealError::Config(
                "no model has a positive weight".to_string(),
            ));
        }

        Ok(Self { models })
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Two-stage roulette draw: a model by model interest, then a target
    /// bucket by that model's bucket interest.
    pub fn propose<R: Rng + ?Sized>(&self, rng: &mut R) -> Mutation {
        let names: Vec<&String> = self.models.keys().collect();
        let interests: Vec<f64> = self.models.values().map(|s| s.interest).collect();
        let model_idx = weighted_index(&interests, rng).unwrap_or(0);
        let model = names[model_idx];

        let buckets = &self.models[model].buckets;
        let bucket = weighted_index(buckets, rng)
            .unwrap_or_else(|| rng.random_range(0..BUCKET_COUNT));

        Mutation {
            model: model.clone(),
            weight: bucket_weight(bucket),
        }
    }

    /// Learn from one observed round.
    ///
    /// `score` is the fraction of judged comparisons the candidate won.
    pub fn adjust(
        &mut self,
        model: &str,
        current_weight: f64,
        candidate_weight: f64,
        score: f64,
        accepted: bool,
        temperature: f64,
    ) -> Result<()> {
        if !self.models.contains_key(model) {
            return Err(AnnealError::UnknownModel(model.to_string()));
        }

        for (name, state) in self.models.iter_mut() {
            if name == model {
                state.interest = MODEL_INTEREST_BASELINE;
            } else {
                state.interest = (state.interest * MODEL_INTEREST_GROWTH).min(MODEL_INTEREST_CAP);
            }
        }

        if accepted {
            for (name, state) in self.models.iter_mut() {
                decay_toward_uniform(&mut state.buckets, ACCEPT_DECAY_EXPONENT);
                renormalize(name, &mut state.buckets);
            }
        }

        if let Some(state) = self.models.get_mut(model) {
            apply_outcome(
                &mut state.buckets,
                current_weight,
                candidate_weight,
                score,
                accepted,
                temperature,
            );
            renormalize(model, &mut state.buckets);
        }

        debug!(
            model,
            current_weight, candidate_weight, score, accepted, "Adjusted mutation interest"
        );
        Ok(())
    }

    /// Joint proposal mass per model: bucket interest scaled by model interest.
    pub fn interest(&self) -> BTreeMap<String, Vec<f64>> {
        self.models
            .iter()
            .map(|(name, state)| {
                let scaled = state.buckets.iter().map(|b| b * state.interest).collect();
                (name.clone(), scaled)
            })
            .collect()
    }

    pub fn model_interest(&self, model: &str) -> Option<f64> {
        self.models.get(model).map(|s| s.interest)
    }

    pub fn bucket_interest(&self, model: &str) -> Option<&[f64]> {
        self.models.get(model).map(|s| s.buckets.as_slice())
    }
}

/// The six kernels that encode one round's outcome.
fn outcome_kernels(
    current_weight: f64,
    candidate_weight: f64,
    score: f64,
    accepted: bool,
    temperature: f64,
) -> [ImpactKernel; 6] {
    let delta = candidate_weight - current_weight;
    let new_weight = if accepted {
        candidate_weight
    } else {
        current_weight
    };
    let outcome = OutcomeScalars::from_score(score);
    let t = temperature.max(0.0);

    [
        ImpactKernel::new(
            DRAW_BASE.powf(outcome.draw),
            (current_weight + candidate_weight) / 2.0,
            DRAW_SPREAD * t,
        ),
        ImpactKernel::new(
            WIN_BASE.powf(outcome.win),
            candidate_weight + delta,
            WIN_SPREAD * t,
        )
        .inverted(),
        ImpactKernel::new(
            LOSE_BASE.powf(outcome.lose),
            current_weight - delta,
            LOSE_SPREAD * t,
        )
        .inverted(),
        ImpactKernel::new(NEAR_CANDIDATE_FACTOR, candidate_weight, NEAR_CANDIDATE_SPREAD * t),
        ImpactKernel::new(NEAR_NEW_FACTOR, new_weight, NEAR_NEW_SPREAD * t),
        ImpactKernel::new(FAR_FACTOR, new_weight, FAR_SPREAD * t).inverted(),
    ]
}

fn apply_outcome(
    buckets: &mut [f64],
    current_weight: f64,
    candidate_weight: f64,
    score: f64,
    accepted: bool,
    temperature: f64,
) {
    let kernels = outcome_kernels(current_weight, candidate_weight, score, accepted, temperature);
    for (i, interest) in buckets.iter_mut().enumerate() {
        let weight = bucket_weight(i);
        let impact: f64 = kernels.iter().map(|k| k.impact(weight)).product();
        *interest *= impact;
    }
}

fn renormalize(model: &str, buckets: &mut [f64]) {
    if !normalize_mean_one(buckets) {
        warn!(model, "Bucket interest collapsed to zero, resetting to uniform");
        buckets.iter_mut().for_each(|b| *b = 1.0);
    }
    // Underflowed buckets could never recover through decay.
    buckets
        .iter_mut()
        .for_each(|b| *b = b.max(BUCKET_INTEREST_FLOOR));
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn proposer(pairs: &[(&str, f64)], temperature: f64) -> MutationProposer {
        let weights = WeightVector::from_pairs(pairs.iter().map(|(m, w)| (*m, *w)));
        MutationProposer::initialize(&weights, temperature).unwrap()
    }

    fn bucket_mean(buckets: &[f64]) -> f64 {
        buckets.iter().sum::<f64>() / buckets.len() as f64
    }

    #[test]
    fn initialize_skips_zero_weight_models() {
        let p = proposer(&[("a", 10.0), ("b", 0.0), ("c", 4.0)], 5.0);
        assert_eq!(p.models().collect::<Vec<_>>(), vec!["a", "c"]);
        assert!(p.bucket_interest("b").is_none());
    }

    #[test]
    fn initialize_requires_a_positive_weight() {
        let weights = WeightVector::from_pairs([("a", 0.0)]);
        assert!(matches!(
            MutationProposer::initialize(&weights, 5.0),
            Err(AnnealError::Config(_))
        ));
    }

    #[test]
    fn initial_interest_avoids_current_weight() {
        let p = proposer(&[("a", 5.0)], 5.0);
        let buckets = p.bucket_interest("a").unwrap();
        assert!((bucket_mean(buckets) - 1.0).abs() < 1e-9);
        // The null mutation makes the current weight the least interesting target.
        assert!(buckets[50] < buckets[20]);
        assert!(buckets[50] < buckets[80]);
    }

    #[test]
    fn uniform_interest_gives_uniform_proposals() {
        let mut p = proposer(&[("a", 10.0)], 1.0);
        p.models.get_mut("a").unwrap().buckets = vec![1.0; BUCKET_COUNT];

        let mut rng = StdRng::seed_from_u64(3);
        let mut histogram = vec![0usize; BUCKET_COUNT];
        let draws = 10_000;
        for _ in 0..draws {
            let m = p.propose(&mut rng);
            histogram[(m.weight * 10.0).round() as usize] += 1;
        }

        let expected = draws as f64 / BUCKET_COUNT as f64;
        let chi_squared: f64 = histogram
            .iter()
            .map(|c| (*c as f64 - expected).powi(2) / expected)
            .sum();
        // 100 degrees of freedom; p < 0.001 above ~149.
        assert!(chi_squared < 149.0, "chi^2 = {chi_squared}");
        assert!(histogram.iter().all(|c| *c > 0));
    }

    #[test]
    fn dominant_bucket_wins_most_draws() {
        let mut p = proposer(&[("a", 10.0)], 1.0);
        let mut buckets = vec![1.0; BUCKET_COUNT];
        buckets[37] = 1000.0;
        p.models.get_mut("a").unwrap().buckets = buckets;

        let mut rng = StdRng::seed_from_u64(11);
        let draws = 10_000;
        let hits = (0..draws)
            .filter(|_| {
                let bucket = (p.propose(&mut rng).weight * 10.0).round() as i64;
                (bucket - 37).abs() <= 1
            })
            .count();
        // Expected share is 1002 / 1100.
        assert!(hits as f64 / draws as f64 > 0.89, "hits = {hits}");
    }

    #[test]
    fn adjust_resets_mutated_model_and_grows_others() {
        let mut p = proposer(&[("a", 10.0), ("b", 5.0), ("c", 2.0)], 3.0);
        p.adjust("a", 10.0, 8.0, 0.7, true, 3.0).unwrap();
        assert_eq!(p.model_interest("a"), Some(1.0));
        assert_eq!(p.model_interest("b"), Some(1.5));

        p.adjust("b", 5.0, 6.0, 0.3, false, 3.0).unwrap();
        assert_eq!(p.model_interest("a"), Some(1.5));
        assert_eq!(p.model_interest("b"), Some(1.0));
        assert_eq!(p.model_interest("c"), Some(2.25));
    }

    #[test]
    fn adjust_keeps_every_array_at_mean_one() {
        let mut p = proposer(&[("a", 10.0), ("b", 5.0)], 4.0);
        let mut rng = StdRng::seed_from_u64(5);
        let mut temperature = 4.0;
        for round in 0..50 {
            let m = p.propose(&mut rng);
            let score = (round % 7) as f64 / 6.0;
            p.adjust(&m.model, 5.0, m.weight, score, round % 3 == 0, temperature)
                .unwrap();
            temperature *= 0.9;
        }
        for model in ["a", "b"] {
            let buckets = p.bucket_interest(model).unwrap();
            assert!((bucket_mean(buckets) - 1.0).abs() < 1e-9);
            assert!(buckets.iter().all(|b| b.is_finite() && *b >= 0.0));
        }
    }

    #[test]
    fn winning_direction_gains_interest() {
        let mut p = proposer(&[("a", 5.0)], 2.0);
        p.models.get_mut("a").unwrap().buckets = vec![1.0; BUCKET_COUNT];
        // Candidate moved 5 -> 6 and won decisively.
        p.adjust("a", 5.0, 6.0, 1.0, true, 2.0).unwrap();
        let buckets = p.bucket_interest("a").unwrap();
        // Beyond the candidate in the winning direction beats behind the current weight.
        assert!(buckets[70] > buckets[40]);
    }

    #[test]
    fn losing_direction_loses_interest() {
        let mut p = proposer(&[("a", 5.0)], 2.0);
        p.models.get_mut("a").unwrap().buckets = vec![1.0; BUCKET_COUNT];
        // Candidate moved 5 -> 6 and lost every comparison.
        p.adjust("a", 5.0, 6.0, 0.0, false, 2.0).unwrap();
        let buckets = p.bucket_interest("a").unwrap();
        // Equidistant from the current weight: behind it beats continuing upward.
        assert!(buckets[30] > buckets[70], "{} vs {}", buckets[30], buckets[70]);
        assert!(buckets[40] > buckets[60], "{} vs {}", buckets[40], buckets[60]);
    }

    #[test]
    fn cold_rejections_keep_every_bucket_reachable() {
        let mut p = proposer(&[("a", 5.0)], 1.0);
        for _ in 0..400 {
            p.adjust("a", 5.0, 6.0, 0.0, false, 0.05).unwrap();
        }
        let buckets = p.bucket_interest("a").unwrap();
        assert!(buckets.iter().all(|b| b.is_finite() && *b > 0.0));
        assert!((bucket_mean(buckets) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn adjust_rejects_unknown_model() {
        let mut p = proposer(&[("a", 10.0)], 1.0);
        assert!(matches!(
            p.adjust("zzz", 1.0, 2.0, 0.5, false, 1.0),
            Err(AnnealError::UnknownModel(_))
        ));
    }

    #[test]
    fn interest_scales_buckets_by_model_interest() {
        let mut p = proposer(&[("a", 10.0), ("b", 5.0)], 2.0);
        p.adjust("a", 10.0, 9.0, 0.5, false, 2.0).unwrap();
        let joint = p.interest();
        let b_buckets = p.bucket_interest("b").unwrap();
        for (joint_value, bucket) in joint["b"].iter().zip(b_buckets) {
            assert!((joint_value - bucket * 1.5).abs() < 1e-12);
        }
    }
}
