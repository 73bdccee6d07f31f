// src/services/selector.rs

//! Weighted ad selection with a recency penalty.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::models::AdDescriptor;

/// Picks one candidate, favoring heavier and less recently shown ads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selector {
    recent_penalty: f64,
}

impl Selector {
    pub fn new(recent_penalty: f64) -> Self {
        Self { recent_penalty }
    }

    pub fn recent_penalty(&self) -> f64 {
        self.recent_penalty
    }

    /// Declared weight, scaled down when the ad was shown recently.
    pub fn effective_weight(&self, ad: &AdDescriptor, recent: &[String]) -> f64 {
        let weight = ad.weight.max(0.0);
        if recent.iter().any(|id| *id == ad.id) {
            weight * self.recent_penalty
        } else {
            weight
        }
    }

    /// Pick a candidate; `None` only when `candidates` is empty.
    ///
    /// Zero-weight candidates are never drawn unless every candidate has zero
    /// effective weight, in which case the choice is uniform.
    pub fn pick<'a, R: Rng + ?Sized>(
        &self,
        candidates: &'a [AdDescriptor],
        recent: &[String],
        rng: &mut R,
    ) -> Option<&'a AdDescriptor> {
        if candidates.len() <= 1 {
            return candidates.first();
        }

        let weights: Vec<f64> = candidates
            .iter()
            .map(|ad| self.effective_weight(ad, recent))
            .collect();
        let total: f64 = weights.iter().sum();

        if !(total > 0.0 && total.is_finite()) {
            return candidates.choose(rng);
        }

        let mut remainder = rng.gen_range(0.0..total);
        let mut last_positive = None;
        for (ad, weight) in candidates.iter().zip(&weights) {
            if *weight <= 0.0 {
                continue;
            }
            last_positive = Some(ad);
            remainder -= weight;
            if remainder <= 0.0 {
                return Some(ad);
            }
        }
        // Float drift can leave a sliver of remainder.
        last_positive
    }
}

impl Default for Selector {
    fn default() -> Self {
        Self::new(0.2)
    }
}
