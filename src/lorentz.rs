//! Four-momenta and the three-vector geometry used throughout the generator
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Cartesian three-vector, used both for momenta and positions
pub type ThreeVector = Vector3<f64>;

/// Lorentz four-momentum in GeV
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct FourMomentum {
    pub px: f64,
    pub py: f64,
    pub pz: f64,
    pub e: f64,
}

impl FourMomentum {
    pub const ZERO: FourMomentum = FourMomentum { px: 0., py: 0., pz: 0., e: 0. };

    pub fn new(px: f64, py: f64, pz: f64, e: f64) -> Self {
        FourMomentum { px, py, pz, e }
    }

    /// Build from a three-momentum and a rest mass
    pub fn from_xyz_m(px: f64, py: f64, pz: f64, m: f64) -> Self {
        let e = (px * px + py * py + pz * pz + m * m).sqrt();
        FourMomentum { px, py, pz, e }
    }

    pub fn from_vector_m(p: &ThreeVector, m: f64) -> Self {
        Self::from_xyz_m(p.x, p.y, p.z, m)
    }

    /// Build from transverse momentum, pseudorapidity, azimuth and mass
    pub fn from_pt_eta_phi_m(pt: f64, eta: f64, phi: f64, m: f64) -> Self {
        let pt = pt.abs();
        Self::from_xyz_m(pt * phi.cos(), pt * phi.sin(), pt * eta.sinh(), m)
    }

    pub fn vect(&self) -> ThreeVector {
        ThreeVector::new(self.px, self.py, self.pz)
    }

    pub fn p2(&self) -> f64 {
        self.px * self.px + self.py * self.py + self.pz * self.pz
    }

    pub fn p(&self) -> f64 {
        self.p2().sqrt()
    }

    pub fn pt(&self) -> f64 {
        self.px.hypot(self.py)
    }

    pub fn m2(&self) -> f64 {
        self.e * self.e - self.p2()
    }

    /// Invariant mass; a space-like vector gives `-sqrt(-m2)`
    pub fn m(&self) -> f64 {
        let m2 = self.m2();
        if m2 < 0. {
            -(-m2).sqrt()
        } else {
            m2.sqrt()
        }
    }

    /// Transverse mass `sqrt(E^2 - pz^2)`, signed like [`FourMomentum::m`]
    pub fn mt(&self) -> f64 {
        let mt2 = self.e * self.e - self.pz * self.pz;
        if mt2 < 0. {
            -(-mt2).sqrt()
        } else {
            mt2.sqrt()
        }
    }

    pub fn et(&self) -> f64 {
        let p = self.p();
        if p == 0. {
            0.
        } else {
            self.e * self.pt() / p
        }
    }

    pub fn eta(&self) -> f64 {
        let pt = self.pt();
        if pt > 0. {
            (self.pz / pt).asinh()
        } else if self.pz == 0. {
            0.
        } else {
            // along the beam axis
            self.pz.signum() * 1e10
        }
    }

    /// Azimuth in `(-pi, pi]`
    pub fn phi(&self) -> f64 {
        if self.px == 0. && self.py == 0. {
            0.
        } else {
            self.py.atan2(self.px)
        }
    }

    pub fn rapidity(&self) -> f64 {
        0.5 * ((self.e + self.pz) / (self.e - self.pz)).ln()
    }

    pub fn beta(&self) -> f64 {
        if self.e == 0. {
            0.
        } else {
            self.p() / self.e
        }
    }

    pub fn gamma(&self) -> f64 {
        let b = self.beta();
        1. / (1. - b * b).sqrt()
    }

    /// Velocity of the frame in which this momentum is at rest
    pub fn boost_vector(&self) -> ThreeVector {
        if self.e == 0. {
            ThreeVector::zeros()
        } else {
            self.vect() / self.e
        }
    }

    /// Lorentz boost by velocity `b`
    pub fn boost(&mut self, b: &ThreeVector) {
        let b2 = b.norm_squared();
        if b2 == 0. {
            return;
        }
        let gamma = 1. / (1. - b2).sqrt();
        let bp = b.x * self.px + b.y * self.py + b.z * self.pz;
        let gamma2 = (gamma - 1.) / b2;
        self.px += gamma2 * bp * b.x + gamma * b.x * self.e;
        self.py += gamma2 * bp * b.y + gamma * b.y * self.e;
        self.pz += gamma2 * bp * b.z + gamma * b.z * self.e;
        self.e = gamma * (self.e + bp);
    }

    pub fn boosted(mut self, b: &ThreeVector) -> Self {
        self.boost(b);
        self
    }

    /// Opening angle between the three-momenta, in `[0, pi]`
    pub fn angle(&self, other: &FourMomentum) -> f64 {
        let norm = self.p() * other.p();
        if norm <= 0. {
            return 0.;
        }
        let c = (self.vect().dot(&other.vect()) / norm).clamp(-1., 1.);
        c.acos()
    }

    /// Rescale the three-momentum to magnitude `p` keeping direction and `m`
    pub fn with_p(&self, p: f64, m: f64) -> Self {
        let norm = self.p();
        if norm == 0. {
            return Self::from_xyz_m(0., 0., 0., m);
        }
        let scale = p / norm;
        Self::from_xyz_m(self.px * scale, self.py * scale, self.pz * scale, m)
    }

    pub fn is_finite(&self) -> bool {
        self.px.is_finite() && self.py.is_finite() && self.pz.is_finite() && self.e.is_finite()
    }
}

impl Add for FourMomentum {
    type Output = FourMomentum;

    fn add(mut self, rhs: FourMomentum) -> FourMomentum {
        self += rhs;
        self
    }
}

impl AddAssign for FourMomentum {
    fn add_assign(&mut self, rhs: FourMomentum) {
        self.px += rhs.px;
        self.py += rhs.py;
        self.pz += rhs.pz;
        self.e += rhs.e;
    }
}

impl Sub for FourMomentum {
    type Output = FourMomentum;

    fn sub(mut self, rhs: FourMomentum) -> FourMomentum {
        self -= rhs;
        self
    }
}

impl SubAssign for FourMomentum {
    fn sub_assign(&mut self, rhs: FourMomentum) {
        self.px -= rhs.px;
        self.py -= rhs.py;
        self.pz -= rhs.pz;
        self.e -= rhs.e;
    }
}

impl Neg for FourMomentum {
    type Output = FourMomentum;

    fn neg(self) -> FourMomentum {
        FourMomentum::new(-self.px, -self.py, -self.pz, -self.e)
    }
}

impl std::iter::Sum for FourMomentum {
    fn sum<I: Iterator<Item = FourMomentum>>(iter: I) -> Self {
        iter.fold(FourMomentum::ZERO, |acc, p| acc + p)
    }
}

impl fmt::Display for FourMomentum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {}, {}; {})", self.px, self.py, self.pz, self.e)
    }
}
