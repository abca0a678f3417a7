use std::collections::BTreeSet;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;

use mixanneal_core::{Judge, SamplePair, Verdict, WeightVector};

/// Prefers whichever sample's mixture shares lie closer to a hidden target.
pub struct SimulatedJudge {
    target: WeightVector,
    noise: f64,
    rng: Mutex<StdRng>,
}

impl SimulatedJudge {
    pub fn new(target: WeightVector, noise: f64, seed: u64) -> Self {
        Self {
            target,
            noise: noise.max(0.0),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn target(&self) -> &WeightVector {
        &self.target
    }

    /// Euclidean distance between the share vectors of `weights` and the target.
    pub fn distance(&self, weights: &WeightVector) -> f64 {
        share_distance(weights, &self.target)
    }
}

#[async_trait]
impl Judge for SimulatedJudge {
    async fn judge(&self, pair: &SamplePair) -> anyhow::Result<Verdict> {
        let advantage =
            self.distance(&pair.current.weights) - self.distance(&pair.candidate.weights);

        if self.noise == 0.0 {
            return Ok(if advantage > 0.0 {
                Verdict::Candidate
            } else if advantage < 0.0 {
                Verdict::Current
            } else {
                Verdict::Draw
            });
        }

        let p_candidate = 1.0 / (1.0 + (-advantage / self.noise).exp());
        let draw = self.rng.lock().await.random::<f64>();
        Ok(if draw < p_candidate {
            Verdict::Candidate
        } else {
            Verdict::Current
        })
    }
}

pub fn share_distance(a: &WeightVector, b: &WeightVector) -> f64 {
    let a = a.shares();
    let b = b.shares();
    let models: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
    models
        .into_iter()
        .map(|m| {
            let d = a.get(m).copied().unwrap_or(0.0) - b.get(m).copied().unwrap_or(0.0);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use mixanneal_core::Sample;

    use super::*;

    fn pair(current: WeightVector, candidate: WeightVector) -> SamplePair {
        SamplePair {
            current: Sample { id: "c".into(), seed: 1, weights: current },
            candidate: Sample { id: "n".into(), seed: 1, weights: candidate },
        }
    }

    #[test]
    fn distance_ignores_scale() {
        let a = WeightVector::from_pairs([("x", 1.0), ("y", 3.0)]);
        let b = WeightVector::from_pairs([("x", 2.5), ("y", 7.5)]);
        assert!(share_distance(&a, &b) < 1e-12);
    }

    #[tokio::test]
    async fn noiseless_judge_prefers_closer_mixture() {
        let target = WeightVector::from_pairs([("x", 10.0), ("y", 0.0)]);
        let judge = SimulatedJudge::new(target.clone(), 0.0, 1);
        let far = WeightVector::from_pairs([("x", 1.0), ("y", 10.0)]);

        let verdict = judge.judge(&pair(far.clone(), target.clone())).await.unwrap();
        assert_eq!(verdict, Verdict::Candidate);

        let verdict = judge.judge(&pair(target.clone(), far.clone())).await.unwrap();
        assert_eq!(verdict, Verdict::Current);

        let verdict = judge.judge(&pair(far.clone(), far)).await.unwrap();
        assert_eq!(verdict, Verdict::Draw);
    }

    #[tokio::test]
    async fn noisy_judge_mostly_prefers_closer_mixture() {
        let target = WeightVector::from_pairs([("x", 10.0), ("y", 0.0)]);
        let judge = SimulatedJudge::new(target.clone(), 0.1, 3);
        let far = WeightVector::from_pairs([("x", 2.0), ("y", 10.0)]);

        let mut wins = 0;
        for _ in 0..200 {
            if judge.judge(&pair(far.clone(), target.clone())).await.unwrap() == Verdict::Candidate {
                wins += 1;
            }
        }
        // Distance gap ~1.0 at noise 0.1 gives p ~0.99995.
        assert!(wins > 190, "wins = {wins}");
    }
}
