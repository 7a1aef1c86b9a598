//! Numerical building blocks for stellar population inference
//!
//! This crate collects the numerical pieces used to turn a grid of
//! simple stellar population (SSP) model indices into posterior estimates:
//! interpolation over model grids, kernel density estimation, credible
//! intervals, robust statistics and weighted straight-line fits.

pub mod grid;
pub mod hpd;
pub mod interp;
pub mod kde;
pub mod linfit;
pub mod robust;
pub mod stats;

pub use grid::{GridError, Interpolator3, NearestInterpolator, RectilinearGrid3, ScatteredTable};
pub use hpd::{hpd_interval, HpdError};
pub use interp::{interp, interp_or, InterpError};
pub use kde::{GaussianKde, GaussianKde2, KdeError};
pub use linfit::{weighted_line_fit, FitError, LineFit};
pub use robust::{mad, median, percentile, MAD_TO_SIGMA};
pub use stats::{effective_sample_size, SampleStats};
