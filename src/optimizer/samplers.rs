//! Sampling strategies for hyperparameter optimization

use super::config::{SamplerKind, TuningConfig};
use super::search_space::{Parameter, SearchSpace, TrialParams};
use crate::training::ParameterValue;
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::f64::consts::{PI, SQRT_2};

/// Trait for hyperparameter samplers
pub trait Sampler: Send {
    /// Propose the next configuration given `(params, loss)` of earlier trials
    fn sample(&mut self, search_space: &SearchSpace, history: &[(TrialParams, f64)]) -> TrialParams;

    fn name(&self) -> &'static str;
}

/// Random sampler
#[derive(Debug)]
pub struct RandomSampler {
    rng: Xoshiro256PlusPlus,
}

impl RandomSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }
}

impl Sampler for RandomSampler {
    fn sample(&mut self, search_space: &SearchSpace, _history: &[(TrialParams, f64)]) -> TrialParams {
        search_space.sample(&mut self.rng)
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// Tree-structured Parzen Estimator sampler
///
/// After `n_startup_trials` random proposals the history is split at the
/// `gamma` quantile of loss. Each parameter gets a density `l(x)` over the
/// good trials and `g(x)` over the rest; candidates are drawn from `l` and
/// the one maximizing `l(x) / g(x)` is proposed. Parameters are modelled
/// independently.
#[derive(Debug)]
pub struct TpeSampler {
    rng: Xoshiro256PlusPlus,
    n_startup_trials: usize,
    gamma: f64,
    n_candidates: usize,
    prior_weight: f64,
}

impl TpeSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            n_startup_trials: 10,
            gamma: 0.25,
            n_candidates: 24,
            prior_weight: 1.0,
        }
    }

    /// Set number of startup trials
    pub fn with_n_startup(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    /// Set gamma (quantile for splitting good/bad)
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_n_candidates(mut self, n: usize) -> Self {
        self.n_candidates = n.max(1);
        self
    }

    fn sample_parameter(&mut self, param: &Parameter, good: &[&TrialParams], bad: &[&TrialParams]) -> ParameterValue {
        match param.n_options() {
            Some(n_options) => {
                let l = categorical_weights(param, good, n_options, self.prior_weight);
                let g = categorical_weights(param, bad, n_options, self.prior_weight);
                let (l_total, g_total) = (l.iter().sum::<f64>(), g.iter().sum::<f64>());

                let mut best: Option<(usize, f64)> = None;
                for _ in 0..self.n_candidates {
                    let idx = weighted_index(&l, &mut self.rng);
                    let score = (l[idx] / l_total).ln() - (g[idx] / g_total).ln();
                    if best.map_or(true, |(_, s)| score > s) {
                        best = Some((idx, score));
                    }
                }
                best.and_then(|(idx, _)| param.option(idx))
                    .unwrap_or_else(|| param.sample(&mut self.rng))
            }
            None => {
                let l = ParzenEstimator::fit(&unit_values(param, good), self.prior_weight);
                let g = ParzenEstimator::fit(&unit_values(param, bad), self.prior_weight);

                let mut best: Option<(f64, f64)> = None;
                for _ in 0..self.n_candidates {
                    let u = l.sample(&mut self.rng);
                    let score = l.log_pdf(u) - g.log_pdf(u);
                    if best.map_or(true, |(_, s)| score > s) {
                        best = Some((u, score));
                    }
                }
                best.and_then(|(u, _)| param.from_unit(u))
                    .unwrap_or_else(|| param.sample(&mut self.rng))
            }
        }
    }
}

impl Sampler for TpeSampler {
    fn sample(&mut self, search_space: &SearchSpace, history: &[(TrialParams, f64)]) -> TrialParams {
        if history.len() < self.n_startup_trials.max(2) {
            return search_space.sample(&mut self.rng);
        }

        let (good, bad) = split_history(history, self.gamma);
        search_space
            .parameters()
            .iter()
            .map(|param| (param.name.clone(), self.sample_parameter(param, &good, &bad)))
            .collect()
    }

    fn name(&self) -> &'static str {
        "tpe"
    }
}

/// Create the sampler a tuning configuration asks for
pub fn create_sampler(config: &TuningConfig) -> Box<dyn Sampler> {
    match config.sampler {
        SamplerKind::Random => Box::new(RandomSampler::new(config.seed)),
        SamplerKind::Tpe => Box::new(
            TpeSampler::new(config.seed)
                .with_n_startup(config.n_startup_trials)
                .with_gamma(config.gamma)
                .with_n_candidates(config.n_candidates),
        ),
    }
}

/// Split trials into the best `ceil(gamma * n)` and the rest; equal losses keep trial order
fn split_history(history: &[(TrialParams, f64)], gamma: f64) -> (Vec<&TrialParams>, Vec<&TrialParams>) {
    let mut order: Vec<usize> = (0..history.len()).collect();
    order.sort_by(|&a, &b| history[a].1.total_cmp(&history[b].1));

    let n_good = ((gamma * history.len() as f64).ceil() as usize).clamp(1, history.len() - 1);
    let good = order[..n_good].iter().map(|&i| &history[i].0).collect();
    let bad = order[n_good..].iter().map(|&i| &history[i].0).collect();
    (good, bad)
}

fn unit_values(param: &Parameter, trials: &[&TrialParams]) -> Vec<f64> {
    trials
        .iter()
        .filter_map(|params| params.get(&param.name).and_then(|v| param.to_unit(v)))
        .collect()
}

fn categorical_weights(param: &Parameter, trials: &[&TrialParams], n_options: usize, prior: f64) -> Vec<f64> {
    let mut weights = vec![prior; n_options];
    for params in trials {
        if let Some(idx) = params.get(&param.name).and_then(|v| param.option_index(v)) {
            weights[idx] += 1.0;
        }
    }
    weights
}

fn weighted_index(weights: &[f64], rng: &mut impl Rng) -> usize {
    let total: f64 = weights.iter().sum();
    let mut target = rng.gen::<f64>() * total;
    for (idx, w) in weights.iter().enumerate() {
        if target < *w {
            return idx;
        }
        target -= w;
    }
    weights.len() - 1
}

const PRIOR_MU: f64 = 0.5;
const PRIOR_SIGMA: f64 = 1.0;

/// Mixture of Gaussians truncated to `[0, 1]`, one per observation plus a broad prior
#[derive(Debug)]
struct ParzenEstimator {
    mus: Vec<f64>,
    sigmas: Vec<f64>,
    weights: Vec<f64>,
}

impl ParzenEstimator {
    fn fit(observations: &[f64], prior_weight: f64) -> Self {
        let mut points: Vec<(f64, bool)> = observations.iter().map(|&u| (u, false)).collect();
        points.push((PRIOR_MU, true));
        points.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = points.len();
        let min_sigma = PRIOR_SIGMA / (n as f64).min(100.0);
        let mut mus = Vec::with_capacity(n);
        let mut sigmas = Vec::with_capacity(n);
        let mut weights = Vec::with_capacity(n);

        for (i, &(mu, is_prior)) in points.iter().enumerate() {
            let (sigma, weight) = if is_prior {
                (PRIOR_SIGMA, prior_weight)
            } else {
                let left = if i > 0 { mu - points[i - 1].0 } else { 0.0 };
                let right = if i + 1 < n { points[i + 1].0 - mu } else { 0.0 };
                (left.max(right).clamp(min_sigma, PRIOR_SIGMA), 1.0)
            };
            mus.push(mu);
            sigmas.push(sigma);
            weights.push(weight);
        }

        let total: f64 = weights.iter().sum();
        weights.iter_mut().for_each(|w| *w /= total);
        Self { mus, sigmas, weights }
    }

    fn log_pdf(&self, u: f64) -> f64 {
        let density: f64 = self
            .mus
            .iter()
            .zip(&self.sigmas)
            .zip(&self.weights)
            .map(|((&mu, &sigma), &w)| {
                let z = (u - mu) / sigma;
                let mass = normal_cdf((1.0 - mu) / sigma) - normal_cdf(-mu / sigma);
                w * (-0.5 * z * z).exp() / (sigma * (2.0 * PI).sqrt() * mass.max(f64::MIN_POSITIVE))
            })
            .sum();
        density.max(f64::MIN_POSITIVE).ln()
    }

    fn sample(&self, rng: &mut impl Rng) -> f64 {
        let k = weighted_index(&self.weights, rng);
        let (mu, sigma) = (self.mus[k], self.sigmas[k]);
        for _ in 0..64 {
            let u = mu + sigma * standard_normal(rng);
            if (0.0..=1.0).contains(&u) {
                return u;
            }
        }
        mu.clamp(0.0, 1.0)
    }
}

fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / SQRT_2))
}

/// Abramowitz-Stegun 7.1.26
fn erf(x: f64) -> f64 {
    let sign = x.signum();
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t * (0.254829592 + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    sign * (1.0 - poly * (-x * x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial(name: &str, value: ParameterValue) -> TrialParams {
        let mut params = TrialParams::new();
        params.insert(name.to_string(), value);
        params
    }

    #[test]
    fn test_random_sampler_is_seeded() {
        let space = SearchSpace::random_forest_default();
        let mut first = RandomSampler::new(42);
        let mut second = RandomSampler::new(42);
        for _ in 0..5 {
            let params = first.sample(&space, &[]);
            assert!(space.contains(&params));
            assert_eq!(second.sample(&space, &[]), params);
        }
    }

    #[test]
    fn test_tpe_sampler_startup() {
        let space = SearchSpace::new().uniform("x", 0.0, 1.0);
        let mut sampler = TpeSampler::new(42);
        for _ in 0..5 {
            let params = sampler.sample(&space, &[]);
            assert!(space.contains(&params));
        }
    }

    #[test]
    fn test_tpe_concentrates_on_good_region() {
        let space = SearchSpace::new().uniform("x", 0.0, 1.0);
        let history: Vec<(TrialParams, f64)> = (0..30)
            .map(|i| {
                let x = i as f64 / 29.0;
                (trial("x", ParameterValue::Float(x)), (x - 0.2).powi(2))
            })
            .collect();

        let mut sampler = TpeSampler::new(7).with_n_startup(10);
        let mut total_distance = 0.0;
        for _ in 0..50 {
            let params = sampler.sample(&space, &history);
            assert!(space.contains(&params));
            total_distance += (params["x"].as_f64().unwrap() - 0.2).abs();
        }
        assert!(total_distance / 50.0 < 0.15, "mean distance {}", total_distance / 50.0);
    }

    #[test]
    fn test_tpe_prefers_good_category() {
        let space = SearchSpace::new().choice("c", vec!["a".into(), "b".into(), "c".into()]);
        let mut history = Vec::new();
        for _ in 0..4 {
            history.push((trial("c", "b".into()), 0.0));
            history.push((trial("c", "a".into()), 1.0));
            history.push((trial("c", "c".into()), 1.0));
        }

        let mut sampler = TpeSampler::new(3).with_n_startup(5);
        for _ in 0..10 {
            assert_eq!(sampler.sample(&space, &history)["c"], ParameterValue::from("b"));
        }
    }

    #[test]
    fn test_tpe_integer_choice_members() {
        let space = SearchSpace::random_forest_default();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let history: Vec<(TrialParams, f64)> = (0..15)
            .map(|i| (space.sample(&mut rng), i as f64))
            .collect();
        let mut sampler = TpeSampler::new(9).with_n_startup(10);
        for _ in 0..20 {
            assert!(space.contains(&sampler.sample(&space, &history)));
        }
    }

    #[test]
    fn test_parzen_density_integrates_to_one() {
        let estimator = ParzenEstimator::fit(&[0.1, 0.2, 0.8], 1.0);
        let steps = 2000;
        let integral: f64 = (0..steps)
            .map(|i| estimator.log_pdf((i as f64 + 0.5) / steps as f64).exp() / steps as f64)
            .sum();
        assert!((integral - 1.0).abs() < 1e-2, "integral {}", integral);
    }

    #[test]
    fn test_erf() {
        assert!(erf(0.0).abs() < 1e-7);
        assert!((erf(1.0) - 0.842_700_79).abs() < 1e-6);
        assert!((erf(-1.0) + 0.842_700_79).abs() < 1e-6);
    }
}
