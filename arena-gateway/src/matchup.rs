//! Weighted sampling of ordered system pairs.

use arena_common::SystemKey;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SamplerError {
    #[error("fewer than two eligible systems for this prompt")]
    NoEligibleSystems,

    #[error("invalid weights spec: {0}")]
    InvalidSpec(String),
}

/// Unnormalized mass over *ordered* pairs of systems.
///
/// `a/b` and `b/a` are distinct entries; the drawn order is the A/B order
/// the user sees.
#[derive(Debug, Clone, Default)]
pub struct MatchupWeights {
    weights: BTreeMap<(SystemKey, SystemKey), f64>,
}

impl MatchupWeights {
    /// Parse a CLI spec of the form `a:v/b:w=1.5,c:x/d:y=0.5`.
    pub fn parse(spec: &str) -> Result<Self, SamplerError> {
        let mut weights = BTreeMap::new();
        for entry in spec.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (pair, weight) = entry
                .split_once('=')
                .ok_or_else(|| SamplerError::InvalidSpec(format!("missing '=' in {:?}", entry)))?;
            let (a, b) = pair
                .split_once('/')
                .ok_or_else(|| SamplerError::InvalidSpec(format!("missing '/' in {:?}", entry)))?;
            let a: SystemKey = a
                .trim()
                .parse()
                .map_err(|e| SamplerError::InvalidSpec(format!("{}", e)))?;
            let b: SystemKey = b
                .trim()
                .parse()
                .map_err(|e| SamplerError::InvalidSpec(format!("{}", e)))?;
            let weight: f64 = weight
                .trim()
                .parse()
                .map_err(|_| SamplerError::InvalidSpec(format!("bad weight in {:?}", entry)))?;
            if a == b {
                return Err(SamplerError::InvalidSpec(format!(
                    "a system cannot battle itself: {}",
                    a
                )));
            }
            if !(weight >= 0.0) || !weight.is_finite() {
                return Err(SamplerError::InvalidSpec(format!(
                    "weight must be a finite non-negative number in {:?}",
                    entry
                )));
            }
            weights.insert((a, b), weight);
        }
        Ok(Self { weights })
    }

    pub fn insert(&mut self, a: SystemKey, b: SystemKey, weight: f64) {
        self.weights.insert((a, b), weight);
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Draw one ordered pair of distinct candidates.
///
/// The weights table is restricted to the candidate set first; if nothing
/// survives, the draw falls back to the uniform distribution over ordered
/// distinct candidate pairs. BTreeMap iteration keeps the cumulative walk
/// deterministic, so equal weights break ties by ascending key pair.
pub fn sample_pair(
    candidates: &[SystemKey],
    weights: &MatchupWeights,
    rng: &mut impl Rng,
) -> Result<(SystemKey, SystemKey), SamplerError> {
    let candidate_set: BTreeSet<&SystemKey> = candidates.iter().collect();
    if candidate_set.len() < 2 {
        return Err(SamplerError::NoEligibleSystems);
    }

    let restricted: Vec<(&(SystemKey, SystemKey), f64)> = weights
        .weights
        .iter()
        .filter(|((a, b), &w)| {
            w > 0.0 && a != b && candidate_set.contains(a) && candidate_set.contains(b)
        })
        .map(|(pair, &w)| (pair, w))
        .collect();

    let uniform: Vec<(SystemKey, SystemKey)>;
    let pairs: Vec<(&(SystemKey, SystemKey), f64)> = if restricted.is_empty() {
        let sorted: Vec<&SystemKey> = candidate_set.iter().copied().collect();
        uniform = sorted
            .iter()
            .flat_map(|&a| {
                sorted
                    .iter()
                    .filter(move |&&b| b != a)
                    .map(move |&b| (a.clone(), b.clone()))
            })
            .collect();
        uniform.iter().map(|pair| (pair, 1.0)).collect()
    } else {
        restricted
    };

    let total: f64 = pairs.iter().map(|(_, w)| w).sum();
    let mut draw = rng.gen_range(0.0..total);
    for (pair, weight) in &pairs {
        draw -= weight;
        if draw < 0.0 {
            return Ok((pair.0.clone(), pair.1.clone()));
        }
    }
    // Floating point slop on the last boundary; take the final pair.
    let (pair, _) = pairs
        .last()
        .ok_or(SamplerError::NoEligibleSystems)?;
    Ok((pair.0.clone(), pair.1.clone()))
}
