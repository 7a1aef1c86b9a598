//! Population statistics of the halo
//!
//! Halo spectra are those beyond one effective radius with S/N above 10.
//! They are compared as a whole and split into the NE quadrant and the rest.

use std::fmt;

use pop_math::SampleStats;

use crate::catalog::{Catalog, POPULATION_LABELS};

/// Minimum signal-to-noise of spectra entering the halo statistics
pub const MIN_SIGNAL_TO_NOISE: f64 = 10.0;

/// Halo sub-samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaloRegion {
    All,
    NorthEast,
    Other,
}

impl HaloRegion {
    pub const ALL: [HaloRegion; 3] = [HaloRegion::All, HaloRegion::NorthEast, HaloRegion::Other];

    pub fn label(&self) -> &'static str {
        match self {
            HaloRegion::All => "All halo",
            HaloRegion::NorthEast => "NE-quadrant",
            HaloRegion::Other => "Other",
        }
    }

    /// Whether a spectrum at position angle `pa` (degrees) belongs to the region
    pub fn contains(&self, pa: f64) -> bool {
        let north_east = pa > 0.0 && pa < 90.0;
        match self {
            HaloRegion::All => true,
            HaloRegion::NorthEast => north_east,
            HaloRegion::Other => !north_east,
        }
    }
}

/// Statistics of one parameter in one region; NaN moments when no value is finite
#[derive(Debug, Clone, PartialEq)]
pub struct RegionStats {
    pub region: HaloRegion,
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
}

/// Per-parameter statistics for every region
#[derive(Debug, Clone, PartialEq)]
pub struct HaloStatistics {
    pub parameters: Vec<(&'static str, Vec<RegionStats>)>,
}

/// Indices of catalog rows in the halo
pub fn halo_members(catalog: &Catalog, effective_radius: f64) -> Vec<usize> {
    (0..catalog.len())
        .filter(|&k| {
            catalog.radius[k] > effective_radius && catalog.signal_to_noise[k] > MIN_SIGNAL_TO_NOISE
        })
        .collect()
}

pub fn halo_statistics(catalog: &Catalog, effective_radius: f64) -> HaloStatistics {
    let members = halo_members(catalog, effective_radius);
    log::info!("{} of {} spectra are in the halo", members.len(), catalog.len());

    let parameters = POPULATION_LABELS
        .iter()
        .zip(&catalog.parameters)
        .map(|(&label, column)| {
            let stats = HaloRegion::ALL
                .iter()
                .map(|&region| {
                    let values: Vec<f64> = members
                        .iter()
                        .filter(|&&k| region.contains(catalog.position_angle[k]))
                        .map(|&k| column.value[k])
                        .collect();
                    let s = SampleStats::new(&values);
                    RegionStats {
                        region,
                        count: s.count(),
                        mean: s.mean().unwrap_or(f64::NAN),
                        std_dev: s.std_dev().unwrap_or(f64::NAN),
                    }
                })
                .collect();
            (label, stats)
        })
        .collect();
    HaloStatistics { parameters }
}

impl fmt::Display for HaloStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, stats) in &self.parameters {
            writeln!(f, "{label:<20}{:<5}{:>8}{:>8}", "N", "MEAN", "SIGMA")?;
            for s in stats {
                writeln!(
                    f,
                    "{:<15}{:>5}{:>8.2}{:>8.2}",
                    s.region.label(),
                    s.count,
                    s.mean,
                    s.std_dev
                )?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::{compact_columns, row};
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    fn catalog() -> Catalog {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results_masked.tab");
        let text = [
            row("in.fits", 5.0, 45.0, 40.0, 21.0, [9.0, 0.0, 0.0, 0.0], 0.1),
            row("faint.fits", 20.0, 45.0, 5.0, 23.0, [9.0, 0.0, 0.0, 0.0], 0.1),
            row("ne1.fits", 20.0, 30.0, 20.0, 23.0, [10.0, -0.2, 0.3, -0.5], 0.1),
            row("ne2.fits", 25.0, 60.0, 15.0, 23.5, [10.2, -0.4, 0.3, f64::NAN], 0.1),
            row("sw.fits", 30.0, 200.0, 12.0, 24.0, [9.8, -0.6, 0.1, -0.7], 0.1),
        ]
        .concat();
        std::fs::write(&path, text).unwrap();
        Catalog::read(&path, &compact_columns()).unwrap()
    }

    #[test]
    fn test_members() {
        assert_eq!(halo_members(&catalog(), 8.4), vec![2, 3, 4]);
    }

    #[test]
    fn test_statistics_by_region() {
        let stats = halo_statistics(&catalog(), 8.4);
        assert_eq!(stats.parameters.len(), 4);

        let (label, age) = &stats.parameters[0];
        assert_eq!(*label, "log Age");
        assert_eq!(age[0].count, 3);
        assert_relative_eq!(age[0].mean, 10.0, epsilon = 1e-12);
        assert_eq!(age[1].region, HaloRegion::NorthEast);
        assert_relative_eq!(age[1].mean, 10.1, epsilon = 1e-12);
        assert_relative_eq!(age[1].std_dev, 0.1, epsilon = 1e-12);
        assert_eq!(age[2].count, 1);
        assert_eq!(age[2].std_dev, 0.0);

        // NaN [Fe/H] is left out of the NE count
        let iron = &stats.parameters[3].1;
        assert_eq!(iron[1].count, 1);
        assert_relative_eq!(iron[1].mean, -0.5);

        let text = stats.to_string();
        assert!(text.contains("NE-quadrant"));
    }
}
