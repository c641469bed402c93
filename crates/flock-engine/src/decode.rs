//! Action selection from raw model outputs.
//!
//! Deterministic mode takes the continuous mean and the arg-max allowed
//! logit per branch (lowest index wins ties). Stochastic mode samples
//! `mean + exp(log_std) * N(0, 1)` and draws each branch from the softmax
//! over its allowed logits. Masked actions are never selected.

use flock_core::{ActionMask, ActionResult, ActionSpec};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::SchedulerConfig;

/// Log standard deviations are clamped into this range before sampling.
const LOG_STD_MIN: f32 = -20.0;
const LOG_STD_MAX: f32 = 2.0;

/// One agent's slice of the batched outputs.
pub(crate) struct AgentOutputs<'a> {
    pub mean: &'a [f32],
    pub log_std: Option<&'a [f32]>,
    pub logits: &'a [f32],
    pub mask: Option<&'a ActionMask>,
}

pub(crate) struct ActionSelector {
    deterministic: bool,
    clip: Option<f32>,
    rng: ChaCha8Rng,
}

impl ActionSelector {
    pub(crate) fn new(config: &SchedulerConfig) -> Self {
        Self {
            deterministic: config.deterministic,
            clip: config.clip_continuous,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
        }
    }

    pub(crate) fn select(&mut self, actions: &ActionSpec, out: AgentOutputs<'_>) -> ActionResult {
        let mut continuous = Vec::with_capacity(actions.continuous_size);
        for (k, &mean) in out.mean.iter().enumerate() {
            let mut v = match (self.deterministic, out.log_std) {
                (false, Some(log_std)) => {
                    let std = log_std[k].clamp(LOG_STD_MIN, LOG_STD_MAX).exp() as f64;
                    (mean as f64 + std * box_muller(&mut self.rng)) as f32
                }
                _ => mean,
            };
            if let Some(c) = self.clip {
                v = v.clamp(-c, c);
            }
            continuous.push(v);
        }

        let mut discrete = Vec::with_capacity(actions.branch_count());
        let mut offset = 0;
        for &size in &actions.discrete_branches {
            let logits = &out.logits[offset..offset + size];
            let allowed = |i: usize| !out.mask.is_some_and(|m| m.is_masked(offset + i));
            let choice = if self.deterministic {
                argmax_allowed(logits, allowed)
            } else {
                sample_allowed(logits, allowed, &mut self.rng)
            };
            discrete.push(choice as u32);
            offset += size;
        }

        ActionResult::new(continuous, discrete)
    }
}

/// Gaussian sample via Box-Muller.
fn box_muller(rng: &mut ChaCha8Rng) -> f64 {
    let u1: f64 = rng.random::<f64>().max(1e-300); // avoid ln(0)
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Index of the largest allowed logit. NaN logits never win; if nothing
/// beats them, the first allowed index is returned.
fn argmax_allowed(logits: &[f32], allowed: impl Fn(usize) -> bool) -> usize {
    let mut best: Option<(usize, f32)> = None;
    for (i, &l) in logits.iter().enumerate() {
        if !allowed(i) {
            continue;
        }
        match best {
            None => best = Some((i, l)),
            Some((_, b)) if l > b || (b.is_nan() && !l.is_nan()) => best = Some((i, l)),
            _ => {}
        }
    }
    best.map_or(0, |(i, _)| i)
}

/// Sample from the softmax over allowed logits. Falls back to arg-max
/// when the weights are degenerate.
fn sample_allowed(logits: &[f32], allowed: impl Fn(usize) -> bool, rng: &mut ChaCha8Rng) -> usize {
    let max = logits
        .iter()
        .enumerate()
        .filter(|&(i, l)| allowed(i) && l.is_finite())
        .map(|(_, &l)| l as f64)
        .fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = logits
        .iter()
        .enumerate()
        .map(|(i, &l)| {
            if allowed(i) && l.is_finite() {
                (l as f64 - max).exp()
            } else {
                0.0
            }
        })
        .collect();
    let total: f64 = weights.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return argmax_allowed(logits, allowed);
    }
    let mut target = rng.random::<f64>() * total;
    let mut last = 0;
    for (i, &w) in weights.iter().enumerate() {
        if w == 0.0 {
            continue;
        }
        last = i;
        if target < w {
            return i;
        }
        target -= w;
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(deterministic: bool, seed: u64) -> ActionSelector {
        ActionSelector::new(&SchedulerConfig {
            deterministic,
            seed,
            ..SchedulerConfig::default()
        })
    }

    fn outputs<'a>(
        mean: &'a [f32],
        log_std: Option<&'a [f32]>,
        logits: &'a [f32],
        mask: Option<&'a ActionMask>,
    ) -> AgentOutputs<'a> {
        AgentOutputs {
            mean,
            log_std,
            logits,
            mask,
        }
    }

    #[test]
    fn deterministic_takes_mean_and_argmax() {
        let spec = ActionSpec::hybrid(2, &[3, 2]);
        let mut s = selector(true, 0);
        let a = s.select(
            &spec,
            outputs(&[0.25, -1.0], Some(&[1.0, 1.0]), &[0.1, 0.9, 0.3, 2.0, 2.0], None),
        );
        assert_eq!(a.continuous(), &[0.25, -1.0]);
        // second branch ties: lowest index wins
        assert_eq!(a.discrete(), &[1, 0]);
    }

    #[test]
    fn masked_actions_are_never_chosen() {
        let spec = ActionSpec::discrete(&[3]);
        let mut mask = ActionMask::allow_all(3);
        mask.mask(1);
        let mut det = selector(true, 0);
        let a = det.select(&spec, outputs(&[], None, &[0.0, 10.0, 1.0], Some(&mask)));
        assert_eq!(a.discrete(), &[2]);

        let mut sto = selector(false, 7);
        for _ in 0..200 {
            let a = sto.select(&spec, outputs(&[], None, &[0.0, 10.0, 0.0], Some(&mask)));
            assert_ne!(a.discrete()[0], 1);
        }
    }

    #[test]
    fn stochastic_is_reproducible_per_seed() {
        let spec = ActionSpec::hybrid(1, &[4]);
        let draw = |seed| {
            let mut s = selector(false, seed);
            (0..16)
                .map(|_| s.select(&spec, outputs(&[0.0], Some(&[0.0]), &[0.0; 4], None)))
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(3), draw(3));
        assert_ne!(draw(3), draw(4));
    }

    #[test]
    fn stochastic_without_log_std_uses_mean() {
        let spec = ActionSpec::continuous(2);
        let mut s = selector(false, 1);
        let a = s.select(&spec, outputs(&[0.5, 0.75], None, &[], None));
        assert_eq!(a.continuous(), &[0.5, 0.75]);
    }

    #[test]
    fn clipping_bounds_continuous_actions() {
        let spec = ActionSpec::continuous(2);
        let mut s = ActionSelector::new(&SchedulerConfig {
            deterministic: true,
            clip_continuous: Some(1.0),
            ..SchedulerConfig::default()
        });
        let a = s.select(&spec, outputs(&[3.0, -0.5], None, &[], None));
        assert_eq!(a.continuous(), &[1.0, -0.5]);
    }

    #[test]
    fn nan_logits_fall_back_to_first_allowed() {
        assert_eq!(argmax_allowed(&[f32::NAN, f32::NAN], |_| true), 0);
        assert_eq!(argmax_allowed(&[f32::NAN, 1.0], |_| true), 1);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert_eq!(sample_allowed(&[f32::NAN, f32::NAN], |i| i == 1, &mut rng), 1);
    }

    #[test]
    fn sampling_follows_logits() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let hits = (0..1000)
            .filter(|_| sample_allowed(&[0.0, 5.0], |_| true, &mut rng) == 1)
            .count();
        // p(1) = e^5 / (1 + e^5) ~ 0.993
        assert!(hits > 950, "hits = {hits}");
    }
}
