//! Batch inversion of observed indices into population parameters
//!
//! One interpolator is built from the model grid and shared by every
//! spectrum. Spectra are independent, so they are sampled in parallel, each
//! with its own RNG seeded from the base seed and the spectrum position.

use std::sync::Arc;

use indicatif::ProgressBar;
use pop_math::Interpolator3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use thiserror::Error;

use crate::config::AnalysisConfig;
use crate::mcmc::{
    Chain, ChainStore, ChainStoreError, GaussianLikelihood, MetropolisWithinGibbs, SamplerError,
    SamplerSettings, UniformPrior,
};
use crate::observations::Observation;
use crate::ssp::{ModelGrid, ModelLimits, SspError, SspModel};
use crate::summary::{PopulationResult, SummaryError};

#[derive(Debug, Error)]
pub enum InversionError {
    #[error(transparent)]
    Ssp(#[from] SspError),

    #[error(transparent)]
    Sampler(#[from] SamplerError),

    #[error(transparent)]
    Store(#[from] ChainStoreError),

    #[error(transparent)]
    Summary(#[from] SummaryError),
}

/// Outcome for one spectrum
#[derive(Debug)]
pub enum SpectrumOutcome {
    Done(PopulationResult),
    /// No index passed the selection and model limits
    Skipped(String),
    Failed(String, InversionError),
}

/// Shared state of a batch run
pub struct Inversion {
    interpolator: Arc<dyn Interpolator3>,
    limits: ModelLimits,
    config: AnalysisConfig,
    store: Option<ChainStore>,
}

impl Inversion {
    pub fn new(grid: &ModelGrid, config: AnalysisConfig) -> Result<Self, InversionError> {
        Ok(Self {
            interpolator: grid.interpolator(config.interpolation)?,
            limits: grid.limits(config.model_limit_factor),
            config,
            store: None,
        })
    }

    /// Persist chains under `store` and reuse chains already there
    pub fn with_store(mut self, store: ChainStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn limits(&self) -> &ModelLimits {
        &self.limits
    }

    /// Posterior chain of one spectrum, `None` when it has no usable index
    pub fn sample(&self, obs: &Observation, position: usize) -> Result<Option<Chain>, InversionError> {
        if let Some(store) = &self.store {
            if store.contains(&obs.name) {
                log::info!("{}: reusing chain in {}", obs.name, store.folder(&obs.name).display());
                return Ok(Some(store.load(&obs.name)?));
            }
        }

        let usable = obs.usable_indices(&self.limits, &self.config.index_selection);
        if usable.is_empty() {
            return Ok(None);
        }

        let model = SspModel::new(self.interpolator.clone(), usable.columns.clone())?;
        let likelihood = GaussianLikelihood::new(model, usable.values, &usable.errors)?;
        let prior = UniformPrior::new(self.limits.params)?;
        let seed = self.config.mcmc.seed.wrapping_add(position as u64);
        let mut sampler = MetropolisWithinGibbs::new(
            prior,
            likelihood,
            SamplerSettings::from(&self.config.mcmc),
            ChaCha8Rng::seed_from_u64(seed),
        )?;
        let chain = sampler.run()?;
        log::info!(
            "{}: {} indices, {} samples, acceptance {:.2}/{:.2}/{:.2}",
            obs.name,
            usable.columns.len(),
            chain.len(),
            chain.acceptance[0],
            chain.acceptance[1],
            chain.acceptance[2]
        );

        if let Some(store) = &self.store {
            store.save(&obs.name, &chain)?;
        }
        Ok(Some(chain))
    }

    /// Sample and summarise one spectrum
    pub fn run_one(&self, obs: &Observation, position: usize) -> SpectrumOutcome {
        let chain = match self.sample(obs, position) {
            Ok(Some(chain)) => chain,
            Ok(None) => {
                log::warn!("{}: no usable indices, skipped", obs.name);
                return SpectrumOutcome::Skipped(obs.name.clone());
            }
            Err(e) => return SpectrumOutcome::Failed(obs.name.clone(), e),
        };
        let mcmc = &self.config.mcmc;
        match PopulationResult::from_chain(
            &obs.name,
            &chain,
            &self.limits.params,
            mcmc.hpd_mass,
            mcmc.kde_points,
        ) {
            Ok(result) => SpectrumOutcome::Done(result),
            Err(e) => SpectrumOutcome::Failed(obs.name.clone(), e.into()),
        }
    }

    /// Run every observation in parallel; outcomes keep the input order
    pub fn run_all(&self, observations: &[Observation], progress: &ProgressBar) -> Vec<SpectrumOutcome> {
        observations
            .par_iter()
            .enumerate()
            .map(|(position, obs)| {
                let outcome = self.run_one(obs, position);
                progress.inc(1);
                outcome
            })
            .collect()
    }
}
