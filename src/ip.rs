use rand::Rng;
use rand_distr::{Distribution, Normal};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::lorentz::ThreeVector;

/// Distance of closest approach between the point `pv` and the straight
/// line through `dv` along `p`
///
/// Returns zero for a vanishing momentum.
pub fn get_particle_ip(pv: &ThreeVector, dv: &ThreeVector, p: &ThreeVector) -> f64 {
    let norm = p.norm();
    if norm == 0. {
        return 0.;
    }
    let d = pv - dv;
    d.cross(&(d + p)).norm() / norm
}

/// Impact parameter with respect to one vertex
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct ImpactParameter {
    pub truth: f64,
    pub smeared: f64,
    /// Uncertainty on the smeared value
    pub sigma: f64,
}

/// Gaussian impact-parameter smearing with resolution
/// `intercept + slope / pT`
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct IpSmearGauss {
    pub intercept: f64,
    pub slope: f64,
}

impl IpSmearGauss {
    pub fn new(intercept: f64, slope: f64) -> Self {
        IpSmearGauss { intercept, slope }
    }

    pub fn sigma(&self, pt: f64) -> f64 {
        if pt > 0. {
            self.intercept + self.slope / pt
        } else {
            self.intercept
        }
    }

    /// Smeared impact parameter and its uncertainty
    pub fn smear<R: Rng + ?Sized>(&self, ip: f64, pt: f64, rng: &mut R) -> (f64, f64) {
        let sigma = self.sigma(pt).abs();
        let offset = match Normal::new(0., sigma) {
            Ok(normal) => normal.sample(rng),
            Err(_) => 0.,
        };
        ((ip + offset).abs(), sigma)
    }
}
