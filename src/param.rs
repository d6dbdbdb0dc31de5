//! Derived kinematic quantities of particle combinations
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::Error;
use crate::lorentz::FourMomentum;
use crate::particle::{DecayTree, NodeId};

/// Value reported for angles that need more particles than given
pub const UNDEFINED_ANGLE: f64 = -99.;

/// Angular resolution on the flight direction used by the corrected mass
pub const MCORR_DIRECTION_RESOLUTION: f64 = 0.01;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ParamKind {
    M,
    M2,
    MT,
    E,
    ET,
    P,
    PX,
    PY,
    PZ,
    PT,
    Eta,
    Phi,
    Rapidity,
    Gamma,
    Beta,
    /// Angle between the first two particles in the rest frame of the others
    Theta,
    CosTheta,
    /// Mass corrected for missing transverse momentum
    MCorr,
}

impl ParamKind {
    pub fn name(&self) -> &'static str {
        use ParamKind::*;
        match self {
            M => "M",
            M2 => "M2",
            MT => "MT",
            E => "E",
            ET => "ET",
            P => "P",
            PX => "PX",
            PY => "PY",
            PZ => "PZ",
            PT => "PT",
            Eta => "eta",
            Phi => "phi",
            Rapidity => "rapidity",
            Gamma => "gamma",
            Beta => "beta",
            Theta => "theta",
            CosTheta => "costheta",
            MCorr => "Mcorr",
        }
    }
}

impl FromStr for ParamKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use ParamKind::*;
        let kind = match s {
            "M" => M,
            "M2" => M2,
            "MT" => MT,
            "E" => E,
            "ET" => ET,
            "P" => P,
            "PX" => PX,
            "PY" => PY,
            "PZ" => PZ,
            "PT" => PT,
            "eta" => Eta,
            "phi" => Phi,
            "rapidity" => Rapidity,
            "gamma" => Gamma,
            "beta" => Beta,
            "theta" => Theta,
            "costheta" => CosTheta,
            "Mcorr" => MCorr,
            _ => return Err(Error::UnknownParameter(s.to_owned())),
        };
        Ok(kind)
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A quantity computed from the sum of the momenta of some particles
#[derive(Debug, Clone, PartialEq)]
pub struct KinematicParam {
    pub kind: ParamKind,
    pub nodes: Vec<NodeId>,
    /// Use true instead of reconstructed momenta
    pub truth: bool,
}

impl KinematicParam {
    /// Parameter evaluated on true momenta
    pub fn new(kind: ParamKind, nodes: Vec<NodeId>) -> Self {
        KinematicParam { kind, nodes, truth: true }
    }

    /// Parameter evaluated on reconstructed momenta
    pub fn smeared(kind: ParamKind, nodes: Vec<NodeId>) -> Self {
        KinematicParam { kind, nodes, truth: false }
    }

    fn momentum(&self, tree: &DecayTree, id: NodeId) -> FourMomentum {
        let node = tree.node(id);
        if self.truth {
            *node.p()
        } else {
            *node.p_smeared()
        }
    }

    /// Evaluate for the current event in `tree`
    ///
    /// Only the corrected mass consumes random numbers.
    pub fn eval<R: Rng + ?Sized>(&self, tree: &DecayTree, rng: &mut R) -> f64 {
        use ParamKind::*;
        let sum = || -> FourMomentum { self.nodes.iter().map(|id| self.momentum(tree, *id)).sum() };
        match self.kind {
            M => sum().m(),
            M2 => sum().m2(),
            MT => sum().mt(),
            E => sum().e,
            ET => sum().et(),
            P => sum().p(),
            PX => sum().px,
            PY => sum().py,
            PZ => sum().pz,
            PT => sum().pt(),
            Eta => sum().eta(),
            Phi => sum().phi(),
            Rapidity => sum().rapidity(),
            Gamma => sum().gamma(),
            Beta => sum().beta(),
            Theta => self.theta(tree).unwrap_or(UNDEFINED_ANGLE),
            CosTheta => self.theta(tree).map(f64::cos).unwrap_or(UNDEFINED_ANGLE),
            MCorr => self.corrected_mass(tree, rng),
        }
    }

    /// Angle between the first two particles in the rest frame of the sum
    /// of the remaining ones, or in the lab frame if there are none
    fn theta(&self, tree: &DecayTree) -> Option<f64> {
        if self.nodes.len() < 2 {
            return None;
        }
        let mut a = self.momentum(tree, self.nodes[0]);
        let mut b = self.momentum(tree, self.nodes[1]);
        if self.nodes.len() > 2 {
            let frame: FourMomentum = self.nodes[2..]
                .iter()
                .map(|id| self.momentum(tree, *id))
                .sum();
            let beta = -frame.boost_vector();
            a.boost(&beta);
            b.boost(&beta);
        }
        Some(a.angle(&b))
    }

    fn corrected_mass<R: Rng + ?Sized>(&self, tree: &DecayTree, rng: &mut R) -> f64 {
        let mut truth = FourMomentum::ZERO;
        let mut smeared = FourMomentum::ZERO;
        for id in &self.nodes {
            let node = tree.node(*id);
            truth += *node.p();
            smeared += *node.p_smeared();
        }
        let norm = truth.p() * smeared.p();
        if norm == 0. {
            return 0.;
        }
        let cos_dir = (truth.vect().dot(&smeared.vect()) / norm).clamp(-1., 1.);
        let offset = match Normal::new(0., MCORR_DIRECTION_RESOLUTION) {
            Ok(normal) => normal.sample(rng),
            Err(_) => 0.,
        };
        let dir = cos_dir.acos() + offset;
        let (sin_dir, cos_dir) = dir.sin_cos();

        let p_long = (cos_dir * smeared.p()).abs();
        let p_tran = (sin_dir * smeared.p()).abs();

        let m_vis2 = smeared.m2();
        let m_par2 = truth.m2();
        let m_miss2 = m_par2 - m_vis2;

        let m_corr = (m_vis2 + p_tran * p_tran).sqrt() + p_tran;

        // real solutions for the longitudinal momentum of the missing
        // particles are flagged by a negative sign
        let a = 2. * p_long * p_long * m_vis2;
        let b = 4. * p_long * (2. * p_tran * p_long - m_miss2);
        let c = 4. * p_tran * p_tran * (p_long * p_long + m_par2) - m_miss2 * m_miss2;
        if b * b - 4. * a * c > 0. {
            -m_corr
        } else {
            m_corr
        }
    }
}

impl fmt::Display for KinematicParam {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}(", self.kind)?;
        for (n, id) in self.nodes.iter().enumerate() {
            if n > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{id}")?;
        }
        write!(f, ")")
    }
}
