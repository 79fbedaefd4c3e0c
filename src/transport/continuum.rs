//! Continuum opacity sources
//!
//! Transport only needs the combined continuum opacity along the ray; the
//! physics behind it lives behind [`Continuum`].

use crate::consts::SIGMA_THOMSON;
use crate::medium::Medium;

/// A source of continuum opacity
pub trait Continuum: Sync {
    /// Opacity (cm^-1) in `shell` at comoving frequency `comov_nu`
    fn opacity(&self, medium: &Medium, shell: usize, comov_nu: f64) -> f64;
}

/// Thomson scattering off free electrons (grey)
#[derive(Debug, Clone, Copy, Default)]
pub struct ElectronScattering;

impl Continuum for ElectronScattering {
    #[inline]
    fn opacity(&self, medium: &Medium, shell: usize, _comov_nu: f64) -> f64 {
        medium.electron_densities[shell] * SIGMA_THOMSON
    }
}

/// Several continuum sources acting together
pub struct CombinedContinuum {
    sources: Vec<Box<dyn Continuum>>,
}

impl CombinedContinuum {
    pub fn new(sources: Vec<Box<dyn Continuum>>) -> Self {
        Self { sources }
    }
}

impl Continuum for CombinedContinuum {
    fn opacity(&self, medium: &Medium, shell: usize, comov_nu: f64) -> f64 {
        self.sources
            .iter()
            .map(|source| source.opacity(medium, shell, comov_nu))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::SyntheticMedium;

    struct Flat(f64);

    impl Continuum for Flat {
        fn opacity(&self, _medium: &Medium, _shell: usize, _comov_nu: f64) -> f64 {
            self.0
        }
    }

    #[test]
    fn test_combined_opacity_sums_sources() {
        let medium = Medium::synthetic(&SyntheticMedium::default());
        let electron = ElectronScattering.opacity(&medium, 0, 1e15);
        assert_eq!(electron, medium.electron_densities[0] * SIGMA_THOMSON);

        let combined = CombinedContinuum::new(vec![Box::new(ElectronScattering), Box::new(Flat(1e-16))]);
        let total = combined.opacity(&medium, 0, 1e15);
        assert!((total - (electron + 1e-16)).abs() < 1e-30);
    }
}
