//! Parametric detector response for reconstructed momenta
//!
//! Every smearer keeps the rest mass of the particle: only the
//! three-momentum (and with it the energy) changes.
use std::f64::consts::LN_2;
use std::fmt::Debug;

use rand::RngCore;
use rand_distr::{Distribution, Gamma, StandardNormal};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::histogram::{Graph, Hist1D, Profile2D};
use crate::lorentz::{FourMomentum, ThreeVector};

/// Resolution on the track slopes `px/pz` and `py/pz`,
/// `sqrt(constant^2 + (inverse_momentum / p)^2)`
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SlopeResolution {
    pub constant: f64,
    pub inverse_momentum: f64,
}

impl Default for SlopeResolution {
    fn default() -> Self {
        SlopeResolution {
            constant: 6.2e-5,
            inverse_momentum: 2.1e-3,
        }
    }
}

impl SlopeResolution {
    pub fn sigma(&self, p: f64) -> f64 {
        self.constant.hypot(self.inverse_momentum / p)
    }
}

/// Description of the material a particle crosses before its momentum
/// is measured
pub trait MaterialBudget: Debug + Send + Sync {
    /// Momentum after traversing the material
    fn transport(&self, p: &ThreeVector, rng: &mut dyn RngCore) -> ThreeVector;
}

/// Planar layers perpendicular to the beam axis, each radiating according
/// to the Bethe-Heitler energy-loss distribution
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct RadiatorLayers {
    /// Thickness of each layer in radiation lengths at normal incidence
    thickness: Vec<f64>,
}

impl RadiatorLayers {
    pub fn new(thickness: Vec<f64>) -> Result<Self, Error> {
        if thickness.iter().any(|t| !(*t >= 0.)) {
            return Err(Error::Config(
                "radiator thickness must be non-negative".to_owned(),
            ));
        }
        Ok(RadiatorLayers { thickness })
    }

    pub fn thickness(&self) -> &[f64] {
        &self.thickness
    }
}

impl MaterialBudget for RadiatorLayers {
    fn transport(&self, p: &ThreeVector, rng: &mut dyn RngCore) -> ThreeVector {
        let norm = p.norm();
        if norm == 0. {
            return *p;
        }
        let cos_theta = (p.z / norm).abs().max(1e-3);
        let mut fraction = 1.;
        for t in &self.thickness {
            let path = t / cos_theta;
            if path <= 0. {
                continue;
            }
            // -ln(E'/E) follows a Gamma distribution with shape t/ln2
            if let Ok(gamma) = Gamma::new(path / LN_2, 1.) {
                let loss: f64 = gamma.sample(rng);
                fraction *= (-loss).exp();
            }
        }
        p * fraction
    }
}

/// Momentum smearing strategies
#[derive(Debug)]
pub enum MomentumSmearer {
    /// Gaussian relative momentum resolution read from a curve in
    /// momentum (in MeV), plus slope smearing
    Gauss {
        resolution: Graph,
        slopes: SlopeResolution,
    },
    /// Relative momentum smear drawn from a histogram selected by
    /// transverse momentum thresholds, plus slope smearing
    ThresholdHisto {
        thresholds: Vec<f64>,
        histograms: Vec<Hist1D>,
        slopes: SlopeResolution,
    },
    /// Momentum and slope resolutions from 2D maps.
    ///
    /// The momentum map is in `log10(pT/MeV)` and pseudorapidity and gives
    /// the resolution in percent; the slope maps are in `1/log10(pT/MeV)`
    /// and pseudorapidity and give the resolution in mrad.
    Profile {
        momentum: Profile2D,
        slope_x: Profile2D,
        slope_y: Profile2D,
    },
    /// Calorimetric energy resolution
    /// `sqrt((stochastic/sqrt(E))^2 + constant^2)`
    EnergyGauss { stochastic: f64, constant: f64 },
    /// Radiative losses in material followed by [`MomentumSmearer::Gauss`]
    Brems {
        material: Box<dyn MaterialBudget>,
        resolution: Graph,
        slopes: SlopeResolution,
    },
}

impl MomentumSmearer {
    pub fn gauss(resolution: Graph) -> Self {
        MomentumSmearer::Gauss {
            resolution,
            slopes: SlopeResolution::default(),
        }
    }

    /// Smearer drawing from `histograms[i]` for `thresholds[i] <= pT`
    ///
    /// The first bucket also collects everything below `thresholds[1]`
    /// and the last one is open-ended.
    pub fn threshold_histo(thresholds: Vec<f64>, histograms: Vec<Hist1D>) -> Result<Self, Error> {
        if thresholds.is_empty() || thresholds.len() != histograms.len() {
            return Err(Error::Config(format!(
                "need one histogram per threshold, got {} thresholds and {} histograms",
                thresholds.len(),
                histograms.len()
            )));
        }
        if thresholds.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::Config("thresholds must be ascending".to_owned()));
        }
        Ok(MomentumSmearer::ThresholdHisto {
            thresholds,
            histograms,
            slopes: SlopeResolution::default(),
        })
    }

    pub fn profile(momentum: Profile2D, slope_x: Profile2D, slope_y: Profile2D) -> Self {
        MomentumSmearer::Profile { momentum, slope_x, slope_y }
    }

    pub fn energy_gauss(stochastic: f64, constant: f64) -> Self {
        MomentumSmearer::EnergyGauss { stochastic, constant }
    }

    pub fn brems(material: Box<dyn MaterialBudget>, resolution: Graph) -> Self {
        MomentumSmearer::Brems {
            material,
            resolution,
            slopes: SlopeResolution::default(),
        }
    }

    /// Replace the slope resolution of the smearers that use one
    pub fn with_slopes(mut self, new: SlopeResolution) -> Self {
        match &mut self {
            MomentumSmearer::Gauss { slopes, .. }
            | MomentumSmearer::ThresholdHisto { slopes, .. }
            | MomentumSmearer::Brems { slopes, .. } => *slopes = new,
            MomentumSmearer::Profile { .. } | MomentumSmearer::EnergyGauss { .. } => {}
        }
        self
    }

    /// Reconstructed momentum for the true momentum `p`
    pub fn smear(&self, p: &FourMomentum, rng: &mut dyn RngCore) -> FourMomentum {
        let m = p.m();
        let kp = p.p();
        if kp == 0. {
            return *p;
        }
        match self {
            MomentumSmearer::Gauss { resolution, slopes } => {
                let kp_smeared = kp + normal(rng) * resolution.eval(1000. * kp) * kp;
                let sigma = slopes.sigma(kp_smeared);
                smear_slopes(p, kp_smeared, sigma, sigma, m, rng)
            }
            MomentumSmearer::ThresholdHisto {
                thresholds,
                histograms,
                slopes,
            } => {
                let pt = p.pt();
                let bucket = thresholds
                    .iter()
                    .skip(1)
                    .take_while(|t| pt >= **t)
                    .count();
                let rel = histograms[bucket].sample(rng).unwrap_or(0.);
                let kp_smeared = kp + rel * kp;
                let sigma = slopes.sigma(kp_smeared);
                smear_slopes(p, kp_smeared, sigma, sigma, m, rng)
            }
            MomentumSmearer::Profile {
                momentum,
                slope_x,
                slope_y,
            } => {
                let log_pt = (1000. * p.pt()).log10();
                let eta = p.eta();
                let resolution = momentum.eval(log_pt, eta) / 100. * kp;
                let kp_smeared = kp + normal(rng) * resolution;
                let sigma_x = 1e-3 * slope_x.eval(1. / log_pt, eta);
                let sigma_y = 1e-3 * slope_y.eval(1. / log_pt, eta);
                smear_slopes(p, kp_smeared, sigma_x, sigma_y, m, rng)
            }
            MomentumSmearer::EnergyGauss { stochastic, constant } => {
                let e = p.e;
                let rel = (stochastic / e.sqrt()).hypot(*constant);
                let e_smeared = (e + normal(rng) * rel * e).max(m.abs());
                let kp_smeared = (e_smeared * e_smeared - m * m).max(0.).sqrt();
                p.with_p(kp_smeared, m)
            }
            MomentumSmearer::Brems {
                material,
                resolution,
                slopes,
            } => {
                let after = material.transport(&p.vect(), rng);
                let radiated = FourMomentum::from_vector_m(&after, m);
                let kp_radiated = radiated.p();
                if kp_radiated == 0. {
                    return radiated;
                }
                let kp_smeared =
                    kp_radiated + normal(rng) * resolution.eval(1000. * kp_radiated) * kp_radiated;
                let sigma = slopes.sigma(kp_smeared);
                smear_slopes(&radiated, kp_smeared, sigma, sigma, m, rng)
            }
        }
    }
}

fn normal(rng: &mut dyn RngCore) -> f64 {
    StandardNormal.sample(rng)
}

/// Apply Gaussian smearing to the slopes `px/pz`, `py/pz` and set the
/// momentum magnitude to `kp`, keeping the sign of `pz`
fn smear_slopes(
    p: &FourMomentum,
    kp: f64,
    sigma_x: f64,
    sigma_y: f64,
    m: f64,
    rng: &mut dyn RngCore,
) -> FourMomentum {
    if p.pz == 0. {
        return p.with_p(kp, m);
    }
    let tx = p.px / p.pz + sigma_x * normal(rng);
    let ty = p.py / p.pz + sigma_y * normal(rng);
    let mut norm = (1. + tx * tx + ty * ty).sqrt();
    if p.pz < 0. {
        norm = -norm;
    }
    FourMomentum::from_xyz_m(tx * kp / norm, ty * kp / norm, kp / norm, m)
}
