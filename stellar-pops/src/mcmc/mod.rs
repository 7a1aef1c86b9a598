//! Posterior sampling of (age, [Z/H], [alpha/Fe]) given observed indices
//!
//! The observed indices are treated as Gaussian noisy evaluations of the SSP
//! forward model at unknown parameters, with a uniform prior over the box
//! spanned by the model grid. The posterior is explored with a
//! Metropolis-within-Gibbs sampler: each iteration updates one parameter at a
//! time with a Gaussian random-walk proposal. During burn-in the proposal
//! width of every parameter is retuned from its recent acceptance rate.

pub mod chain_store;

use pop_math::effective_sample_size;
use rand::Rng;
use rand_distr::StandardNormal;
use thiserror::Error;

use crate::config::McmcConfig;
use crate::ssp::{SspModel, PARAMETER_NAMES};

pub use chain_store::{ChainStore, ChainStoreError};

/// Prior draws attempted before giving up on finding a valid starting point
const MAX_START_ATTEMPTS: usize = 1_000;

/// Initial proposal width as a fraction of the prior width
const INITIAL_SCALE_FRACTION: f64 = 0.1;

#[derive(Debug, Error, PartialEq)]
pub enum SamplerError {
    #[error("No prior draw out of {0} gave a finite posterior")]
    NoValidStart(usize),

    #[error("Invalid sampler settings: {0}")]
    InvalidSettings(String),

    #[error("Likelihood needs matching values and errors, got {values} and {errors}")]
    MismatchedData { values: usize, errors: usize },

    #[error("Prior bound {0} is empty or not finite")]
    InvalidPrior(usize),
}

/// Uniform prior over a box in parameter space
#[derive(Debug, Clone, PartialEq)]
pub struct UniformPrior {
    bounds: [(f64, f64); 3],
}

impl UniformPrior {
    pub fn new(bounds: [(f64, f64); 3]) -> Result<Self, SamplerError> {
        for (i, &(lo, hi)) in bounds.iter().enumerate() {
            if !(lo.is_finite() && hi.is_finite() && hi > lo) {
                return Err(SamplerError::InvalidPrior(i));
            }
        }
        Ok(Self { bounds })
    }

    pub fn bounds(&self) -> &[(f64, f64); 3] {
        &self.bounds
    }

    pub fn width(&self, i: usize) -> f64 {
        self.bounds[i].1 - self.bounds[i].0
    }

    /// Log density up to a constant: 0 inside the box, `-inf` outside
    pub fn log_density(&self, p: &[f64; 3]) -> f64 {
        let inside = p
            .iter()
            .zip(&self.bounds)
            .all(|(&x, &(lo, hi))| x >= lo && x <= hi);
        if inside {
            0.0
        } else {
            f64::NEG_INFINITY
        }
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> [f64; 3] {
        std::array::from_fn(|i| {
            let (lo, hi) = self.bounds[i];
            lo + (hi - lo) * rng.random::<f64>()
        })
    }
}

/// Independent Gaussian errors on each observed index
#[derive(Debug, Clone)]
pub struct GaussianLikelihood {
    model: SspModel,
    observed: Vec<f64>,
    precision: Vec<f64>,
}

impl GaussianLikelihood {
    /// `observed` and `sigma` are aligned with the model's index columns
    pub fn new(model: SspModel, observed: Vec<f64>, sigma: &[f64]) -> Result<Self, SamplerError> {
        if observed.len() != sigma.len() || observed.len() != model.columns().len() {
            return Err(SamplerError::MismatchedData {
                values: observed.len(),
                errors: sigma.len(),
            });
        }
        let precision = sigma.iter().map(|s| 1.0 / (s * s)).collect();
        Ok(Self {
            model,
            observed,
            precision,
        })
    }

    /// Log likelihood up to a constant, `-inf` when the model is undefined at `p`
    pub fn log_likelihood(&self, p: &[f64; 3], scratch: &mut Vec<f64>) -> f64 {
        self.model.predict_into(*p, scratch);
        let mut chi2 = 0.0;
        for ((m, o), tau) in scratch.iter().zip(&self.observed).zip(&self.precision) {
            if !m.is_finite() {
                return f64::NEG_INFINITY;
            }
            chi2 += tau * (o - m).powi(2);
        }
        -0.5 * chi2
    }
}

/// Iteration counts of a sampling run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerSettings {
    pub iterations: usize,
    pub burn: usize,
    pub thin: usize,
    pub tune_interval: usize,
}

impl SamplerSettings {
    pub fn validate(&self) -> Result<(), SamplerError> {
        if self.thin == 0 || self.tune_interval == 0 {
            return Err(SamplerError::InvalidSettings(
                "thin and tune_interval must be at least 1".to_string(),
            ));
        }
        if self.burn >= self.iterations {
            return Err(SamplerError::InvalidSettings(format!(
                "burn ({}) must be smaller than iterations ({})",
                self.burn, self.iterations
            )));
        }
        Ok(())
    }

    /// Number of retained samples
    pub fn kept(&self) -> usize {
        (self.iterations - self.burn).div_ceil(self.thin)
    }
}

impl From<&McmcConfig> for SamplerSettings {
    fn from(c: &McmcConfig) -> Self {
        Self {
            iterations: c.iterations,
            burn: c.burn,
            thin: c.thin,
            tune_interval: c.tune_interval,
        }
    }
}

/// Retained posterior samples
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    pub names: Vec<String>,
    pub samples: Vec<[f64; 3]>,
    /// Post burn-in acceptance rate per parameter, NaN for chains read from disk
    pub acceptance: [f64; 3],
}

impl Chain {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples of parameter `i`
    pub fn column(&self, i: usize) -> Vec<f64> {
        self.samples.iter().map(|s| s[i]).collect()
    }

    /// Samples of the parameter called `name`
    pub fn parameter(&self, name: &str) -> Option<Vec<f64>> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.column(i))
    }

    /// Effective sample size of each parameter
    pub fn effective_sample_sizes(&self) -> [f64; 3] {
        std::array::from_fn(|i| effective_sample_size(&self.column(i)))
    }
}

/// Proposal scale update from an acceptance rate, as multiplicative factor
pub fn tuning_factor(acceptance_rate: f64) -> f64 {
    if acceptance_rate < 0.001 {
        0.1
    } else if acceptance_rate < 0.05 {
        0.5
    } else if acceptance_rate < 0.2 {
        0.9
    } else if acceptance_rate > 0.95 {
        10.0
    } else if acceptance_rate > 0.75 {
        2.0
    } else if acceptance_rate > 0.5 {
        1.1
    } else {
        1.0
    }
}

/// Metropolis-within-Gibbs sampler over the three SSP parameters
pub struct MetropolisWithinGibbs<R: Rng> {
    prior: UniformPrior,
    likelihood: GaussianLikelihood,
    settings: SamplerSettings,
    rng: R,
}

impl<R: Rng> MetropolisWithinGibbs<R> {
    pub fn new(
        prior: UniformPrior,
        likelihood: GaussianLikelihood,
        settings: SamplerSettings,
        rng: R,
    ) -> Result<Self, SamplerError> {
        settings.validate()?;
        Ok(Self {
            prior,
            likelihood,
            settings,
            rng,
        })
    }

    fn log_posterior(&self, p: &[f64; 3], scratch: &mut Vec<f64>) -> f64 {
        let lp = self.prior.log_density(p);
        if lp == f64::NEG_INFINITY {
            return lp;
        }
        lp + self.likelihood.log_likelihood(p, scratch)
    }

    fn initial_state(&mut self, scratch: &mut Vec<f64>) -> Result<([f64; 3], f64), SamplerError> {
        for _ in 0..MAX_START_ATTEMPTS {
            let p = self.prior.sample(&mut self.rng);
            let lp = self.log_posterior(&p, scratch);
            if lp.is_finite() {
                return Ok((p, lp));
            }
        }
        Err(SamplerError::NoValidStart(MAX_START_ATTEMPTS))
    }

    /// Run the chain and return the retained samples
    pub fn run(&mut self) -> Result<Chain, SamplerError> {
        let settings = self.settings;
        let mut scratch = Vec::new();
        let (mut state, mut current_lp) = self.initial_state(&mut scratch)?;

        let mut scale: [f64; 3] = std::array::from_fn(|i| INITIAL_SCALE_FRACTION * self.prior.width(i));
        let mut window_accepted = [0usize; 3];
        let mut kept_accepted = [0usize; 3];
        let mut samples = Vec::with_capacity(settings.kept());

        for iteration in 0..settings.iterations {
            for i in 0..3 {
                let step: f64 = self.rng.sample(StandardNormal);
                let mut proposal = state;
                proposal[i] += scale[i] * step;

                let proposal_lp = self.log_posterior(&proposal, &mut scratch);
                let accept = proposal_lp.is_finite()
                    && self.rng.random::<f64>().ln() < proposal_lp - current_lp;
                if accept {
                    state = proposal;
                    current_lp = proposal_lp;
                    window_accepted[i] += 1;
                    if iteration >= settings.burn {
                        kept_accepted[i] += 1;
                    }
                }
            }

            let done = iteration + 1;
            if iteration < settings.burn && done % settings.tune_interval == 0 {
                for i in 0..3 {
                    let rate = window_accepted[i] as f64 / settings.tune_interval as f64;
                    let factor = tuning_factor(rate);
                    scale[i] *= factor;
                    log::debug!(
                        "iteration {done}: {} acceptance {rate:.3}, scale x{factor} -> {:.4e}",
                        PARAMETER_NAMES[i],
                        scale[i]
                    );
                }
                window_accepted = [0; 3];
            }

            if iteration >= settings.burn && (iteration - settings.burn) % settings.thin == 0 {
                samples.push(state);
            }
        }

        let post_burn = (settings.iterations - settings.burn) as f64;
        Ok(Chain {
            names: PARAMETER_NAMES.iter().map(|s| s.to_string()).collect(),
            samples,
            acceptance: std::array::from_fn(|i| kept_accepted[i] as f64 / post_burn),
        })
    }
}
