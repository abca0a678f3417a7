//! WeightVector: model name to mixture weight, bounded to [0, 10].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AnnealError, Result};

/// Largest weight a model can carry. Bucket `i` of an interest array maps to `i * BUCKET_STEP`.
pub const MAX_WEIGHT: f64 = 10.0;
pub const BUCKET_STEP: f64 = 0.1;
pub const BUCKET_COUNT: usize = 101;

/// Weight value represented by bucket `index`.
pub fn bucket_weight(index: usize) -> f64 {
    index as f64 * BUCKET_STEP
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightVector {
    weights: BTreeMap<String, f64>,
}

impl WeightVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(model, weight)` pairs. Weights are stored as given; call
    /// [`WeightVector::normalized`] to bring them onto the 0–10 scale.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            weights: pairs.into_iter().map(|(m, w)| (m.into(), w)).collect(),
        }
    }

    pub fn get(&self, model: &str) -> Option<f64> {
        self.weights.get(model).copied()
    }

    /// Set a model's weight, clamped to [0, MAX_WEIGHT].
    pub fn set(&mut self, model: &str, weight: f64) {
        let clamped = if weight.is_nan() {
            0.0
        } else {
            weight.clamp(0.0, MAX_WEIGHT)
        };
        self.weights.insert(model.to_string(), clamped);
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(m, w)| (m.as_str(), *w))
    }

    /// Models that currently contribute to the mixture.
    pub fn active_models(&self) -> Vec<String> {
        self.weights
            .iter()
            .filter(|(_, w)| **w > 0.0)
            .map(|(m, _)| m.clone())
            .collect()
    }

    pub fn max_weight(&self) -> f64 {
        self.weights.values().copied().fold(0.0, f64::max)
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Rescale so the largest weight is exactly `MAX_WEIGHT`.
    pub fn normalized(&self) -> Result<Self> {
        if let Some((model, weight)) = self
            .weights
            .iter()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(AnnealError::Config(format!(
                "model '{model}' has invalid weight {weight}"
            )));
        }

        let max = self.max_weight();
        if max <= 0.0 {
            return Err(AnnealError::Config(
                "initial weights must contain at least one positive weight".to_string(),
            ));
        }

        let scale = MAX_WEIGHT / max;
        let weights = self
            .weights
            .iter()
            .map(|(m, w)| {
                // Keep the maximum exact rather than trusting the division.
                let scaled = if *w == max { MAX_WEIGHT } else { w * scale };
                (m.clone(), scaled.clamp(0.0, MAX_WEIGHT))
            })
            .collect();

        Ok(Self { weights })
    }

    /// Each model's share of the total weight. Empty when the total is zero.
    pub fn shares(&self) -> BTreeMap<String, f64> {
        let total = self.total_weight();
        if total <= 0.0 {
            return BTreeMap::new();
        }
        self.weights
            .iter()
            .map(|(m, w)| (m.clone(), w / total))
            .collect()
    }

    /// Scale-invariant label for the mixture: zero weights dropped, models
    /// ordered by share. Two vectors that differ only by a constant factor
    /// produce the same key.
    pub fn content_key(&self) -> String {
        let mut shares: Vec<(String, f64)> = self
            .shares()
            .into_iter()
            .filter(|(_, s)| *s > 0.0)
            .collect();
        shares.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        shares
            .iter()
            .map(|(m, s)| format!("{m}:{s:.4}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for WeightVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .weights
            .iter()
            .map(|(m, w)| format!("{m}={w:.1}"))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}
