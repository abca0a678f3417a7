use rand::Rng;

/// Cumulative-weight roulette selection.
///
/// Draws `r` uniformly from `[0, total)` and returns the first index whose
/// cumulative weight exceeds it. Non-positive and non-finite weights are never
/// selected. Returns `None` when nothing carries positive weight.
pub fn weighted_index<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Option<usize> {
    let usable = |w: f64| if w.is_finite() && w > 0.0 { w } else { 0.0 };

    let total: f64 = weights.iter().map(|w| usable(*w)).sum();
    if total <= 0.0 || !total.is_finite() {
        return None;
    }

    let target = rng.random::<f64>() * total;
    let mut cumulative = 0.0;
    let mut last_positive = None;
    for (i, w) in weights.iter().enumerate() {
        let w = usable(*w);
        if w == 0.0 {
            continue;
        }
        cumulative += w;
        last_positive = Some(i);
        if target < cumulative {
            return Some(i);
        }
    }

    // Floating-point shortfall in the running sum.
    last_positive
}
