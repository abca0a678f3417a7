//! Numeric kernels shared by the proposer: Gaussian impact kernels, outcome
//! scalars and interest normalisation.

use statrs::distribution::{Beta, Continuous, Normal};

/// Scores are pulled this far inside (0, 1) before evaluating Beta densities.
const SCORE_EPSILON: f64 = 1e-6;

/// Maps a bucket weight to a multiplicative interest adjustment.
///
/// `impact(w) = factor ^ relevance(w)` where `relevance` is a Gaussian density
/// scaled to 1 at its peak. Inverted kernels use `1 - relevance` instead, so
/// they leave the peak untouched and apply the full factor far away from it.
#[derive(Debug, Clone)]
pub struct ImpactKernel {
    factor: f64,
    mean: f64,
    density: Option<(Normal, f64)>,
    inverted: bool,
}

impl ImpactKernel {
    pub fn new(factor: f64, mean: f64, spread: f64) -> Self {
        let density = Normal::new(mean, spread)
            .ok()
            .map(|normal| {
                let peak = normal.pdf(mean);
                (normal, peak)
            })
            .filter(|(_, peak)| peak.is_finite() && *peak > 0.0);

        Self {
            factor,
            mean,
            density,
            inverted: false,
        }
    }

    pub fn inverted(mut self) -> Self {
        self.inverted = true;
        self
    }

    /// Normalised density at `weight`: 1 at the peak, approaching 0 away from it.
    pub fn relevance(&self, weight: f64) -> f64 {
        match &self.density {
            Some((normal, peak)) => (normal.pdf(weight) / peak).clamp(0.0, 1.0),
            // Zero-width kernel: only the peak itself is relevant.
            None => {
                if (weight - self.mean).abs() < f64::EPSILON {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    pub fn impact(&self, weight: f64) -> f64 {
        let relevance = self.relevance(weight);
        let exponent = if self.inverted {
            1.0 - relevance
        } else {
            relevance
        };
        self.factor.powf(exponent)
    }
}

/// Win/draw/lose strengths derived from a round's score via Beta densities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutcomeScalars {
    pub draw: f64,
    pub win: f64,
    pub lose: f64,
}

impl OutcomeScalars {
    pub fn from_score(score: f64) -> Self {
        let score = if score.is_nan() { 0.5 } else { score };
        let s = score.clamp(SCORE_EPSILON, 1.0 - SCORE_EPSILON);

        let draw_peak = beta_density(0.5, 10.0, 10.0);
        let draw = if draw_peak > 0.0 {
            beta_density(s, 10.0, 10.0) / draw_peak
        } else {
            0.0
        };

        Self {
            draw: draw.clamp(0.0, 1.0),
            win: (beta_density(s, 3.0, 1.0) / 3.0).clamp(0.0, 1.0),
            lose: (beta_density(s, 1.0, 3.0) / 3.0).clamp(0.0, 1.0),
        }
    }
}

fn beta_density(x: f64, a: f64, b: f64) -> f64 {
    Beta::new(a, b).map(|beta| beta.pdf(x)).unwrap_or(0.0)
}

/// Rescale `values` in place so their arithmetic mean is 1.
///
/// Returns false and leaves the slice untouched when it is empty or its sum is
/// not a positive finite number.
pub fn normalize_mean_one(values: &mut [f64]) -> bool {
    let sum: f64 = values.iter().sum();
    if values.is_empty() || !sum.is_finite() || sum <= 0.0 {
        return false;
    }
    let scale = values.len() as f64 / sum;
    for value in values.iter_mut() {
        *value *= scale;
    }
    true
}

/// Pull every entry toward 1 by raising it to `exponent` (< 1).
pub fn decay_toward_uniform(values: &mut [f64], exponent: f64) {
    for value in values.iter_mut() {
        *value = value.powf(exponent);
    }
}
