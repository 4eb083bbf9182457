//! Weighted Random Selection
//!
//! One draw routine shared by the emotion graph and the content selector:
//! sum the weights, sample uniformly in `[0, total)`, then subtract each
//! weight in turn until the remainder reaches zero or below.
//!
//! Callers own their RNG (seeded `StdRng` in tests) so every draw is
//! reproducible for a given seed.

use rand::Rng;

/// Pick an index from `weights` with probability proportional to its weight.
///
/// Negative, NaN and infinite weights count as zero. Returns `None` when no
/// weight is positive, leaving the fallback policy to the caller.
pub fn weighted_index<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Option<usize> {
    let total: f64 = weights.iter().copied().map(sanitize).sum();
    if total <= 0.0 {
        return None;
    }

    let mut remaining = rng.gen::<f64>() * total;
    let mut last_positive = None;

    for (idx, weight) in weights.iter().copied().map(sanitize).enumerate() {
        if weight <= 0.0 {
            continue;
        }
        last_positive = Some(idx);
        remaining -= weight;
        if remaining <= 0.0 {
            return Some(idx);
        }
    }

    // Float residue can leave a sliver above zero after the last subtraction
    last_positive
}

fn sanitize(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 {
        weight
    } else {
        0.0
    }
}
