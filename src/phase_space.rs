//! N-body phase space in the Raubold-Lynch (GENBOD) scheme
//!
//! The decay is built up as a chain of two-body decays in successive
//! rest frames. Each configuration comes with a weight proportional to the
//! phase-space density, normalised so that it never exceeds one.
use std::f64::consts::PI;

use rand::Rng;
use thiserror::Error;

use crate::lorentz::{FourMomentum, ThreeVector};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhaseSpaceError {
    #[error("need at least two daughters, got {0}")]
    TooFewDaughters(usize),
    #[error("parent mass {parent_mass} below sum of daughter masses {mass_sum}")]
    KinematicallyForbidden { parent_mass: f64, mass_sum: f64 },
}

/// Momentum of either daughter in the two-body decay `a -> b c`
fn pdk(a: f64, b: f64, c: f64) -> f64 {
    let x = (a - b - c) * (a + b + c) * (a - b + c) * (a + b - c);
    x.max(0.).sqrt() / (2. * a)
}

/// Decay of one parent into a fixed set of daughter masses
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSpace {
    masses: Vec<f64>,
    kinetic: f64,
    wt_max: f64,
    beta: ThreeVector,
}

impl PhaseSpace {
    /// Set up the decay of `parent` into daughters of the given masses
    ///
    /// The parent mass has to exceed the sum of daughter masses; a decay
    /// exactly at threshold is refused as forbidden.
    pub fn new(parent: &FourMomentum, masses: &[f64]) -> Result<Self, PhaseSpaceError> {
        if masses.len() < 2 {
            return Err(PhaseSpaceError::TooFewDaughters(masses.len()));
        }
        let parent_mass = parent.m();
        let mass_sum: f64 = masses.iter().sum();
        let kinetic = parent_mass - mass_sum;
        if !(kinetic > 0.) {
            return Err(PhaseSpaceError::KinematicallyForbidden { parent_mass, mass_sum });
        }

        let mut emmax = kinetic + masses[0];
        let mut emmin = 0.;
        let mut wtmax = 1.;
        for n in 1..masses.len() {
            emmin += masses[n - 1];
            emmax += masses[n];
            wtmax *= pdk(emmax, emmin, masses[n]);
        }

        Ok(PhaseSpace {
            masses: masses.to_vec(),
            kinetic,
            wt_max: 1. / wtmax,
            beta: parent.boost_vector(),
        })
    }

    pub fn n_daughters(&self) -> usize {
        self.masses.len()
    }

    /// Generate one configuration into `decay` and return its weight
    pub fn generate_weighted<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        decay: &mut Vec<FourMomentum>,
    ) -> f64 {
        let nt = self.masses.len();

        let mut rno = vec![0.; nt];
        for r in rno.iter_mut().take(nt - 1).skip(1) {
            *r = rng.gen();
        }
        rno[1..nt - 1].sort_by(f64::total_cmp);
        rno[nt - 1] = 1.;

        let mut inv_mas = Vec::with_capacity(nt);
        let mut sum = 0.;
        for (r, m) in rno.iter().zip(&self.masses) {
            sum += m;
            inv_mas.push(r * self.kinetic + sum);
        }

        let mut wt = self.wt_max;
        let mut pd = Vec::with_capacity(nt - 1);
        for n in 0..nt - 1 {
            pd.push(pdk(inv_mas[n + 1], inv_mas[n], self.masses[n + 1]));
            wt *= pd[n];
        }

        decay.clear();
        decay.push(FourMomentum::from_xyz_m(0., pd[0], 0., self.masses[0]));
        let mut i = 1;
        loop {
            decay.push(FourMomentum::from_xyz_m(0., -pd[i - 1], 0., self.masses[i]));

            let c_z = 2. * rng.gen::<f64>() - 1.;
            let s_z = (1. - c_z * c_z).max(0.).sqrt();
            let ang_y = 2. * PI * rng.gen::<f64>();
            let (s_y, c_y) = ang_y.sin_cos();
            for p in decay.iter_mut() {
                let x = c_z * p.px - s_z * p.py;
                p.py = s_z * p.px + c_z * p.py;
                p.px = x;
                let x = c_y * p.px - s_y * p.pz;
                p.pz = s_y * p.px + c_y * p.pz;
                p.px = x;
            }

            if i == nt - 1 {
                break;
            }

            let beta = pd[i] / (pd[i] * pd[i] + inv_mas[i] * inv_mas[i]).sqrt();
            let boost = ThreeVector::new(0., beta, 0.);
            for p in decay.iter_mut() {
                p.boost(&boost);
            }
            i += 1;
        }

        for p in decay.iter_mut() {
            p.boost(&self.beta);
        }
        wt
    }

    /// Generate an unweighted configuration by accept/reject on the weight
    ///
    /// Returns the number of attempts needed or `None` if no configuration
    /// was accepted within `max_attempts`.
    pub fn generate_unweighted<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        max_attempts: usize,
        decay: &mut Vec<FourMomentum>,
    ) -> Option<usize> {
        for attempt in 1..=max_attempts {
            let wt = self.generate_weighted(rng, decay);
            if rng.gen::<f64>() < wt {
                return Some(attempt);
            }
        }
        None
    }
}
