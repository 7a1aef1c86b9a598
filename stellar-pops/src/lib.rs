//! Stellar population analysis of NGC 3311 long-slit spectra
//!
//! Ages, metallicities and alpha-element enhancements are inferred from Lick
//! indices by sampling the posterior of an interpolated SSP model grid. The
//! crate also covers the surrounding steps: preparing spectra for kinematic
//! fitting, tabulating the fits, estimating sky-subtraction systematics, and
//! summarising the halo populations.

pub mod catalog;
pub mod config;
pub mod gradients;
pub mod halo;
pub mod inversion;
pub mod kinematics;
pub mod mcmc;
pub mod observations;
pub mod shared_args;
pub mod sky;
pub mod spectrum;
pub mod ssp;
pub mod summary;
pub mod table;

pub use config::{AnalysisConfig, ConfigError};
pub use inversion::{Inversion, InversionError, SpectrumOutcome};
pub use mcmc::{Chain, ChainStore, MetropolisWithinGibbs, SamplerError};
pub use observations::{read_observations, Observation};
pub use ssp::{Interpolation, ModelGrid, SspModel};
pub use summary::{write_results_table, PopulationResult};
