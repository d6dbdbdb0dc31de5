//! Primary and pileup vertices
use rand::Rng;
use rand_distr::{Distribution, Normal, Poisson, StandardNormal};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::histogram::Hist1D;
use crate::lorentz::ThreeVector;

/// True and reconstructed position of a vertex, in mm
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Vertex {
    pub truth: ThreeVector,
    pub smeared: ThreeVector,
}

impl Vertex {
    pub fn at(position: ThreeVector) -> Self {
        Vertex { truth: position, smeared: position }
    }
}

impl Default for Vertex {
    fn default() -> Self {
        Vertex::at(ThreeVector::zeros())
    }
}

/// A pp collision vertex with the number of tracks it produced
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct CollisionVertex {
    pub vertex: Vertex,
    pub ntracks: u32,
}

/// Per-axis vertex resolution `constant + amplitude * exp(slope * ntracks)`
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct VertexResolution {
    pub constant: f64,
    pub amplitude: f64,
    pub slope: f64,
}

impl Default for VertexResolution {
    fn default() -> Self {
        VertexResolution {
            constant: 0.010817,
            amplitude: 0.03784,
            slope: -0.0815,
        }
    }
}

impl VertexResolution {
    pub fn sigma(&self, ntracks: u32) -> f64 {
        self.constant + self.amplitude * (self.slope * ntracks as f64).exp()
    }

    /// Draw the reconstructed position for a vertex at `truth`
    pub fn smear<R: Rng + ?Sized>(&self, truth: &ThreeVector, ntracks: u32, rng: &mut R) -> Vertex {
        let sigma = self.sigma(ntracks);
        let mut offset = || -> f64 {
            let z: f64 = StandardNormal.sample(rng);
            sigma * z
        };
        let smeared = ThreeVector::new(
            truth.x + offset(),
            truth.y + offset(),
            truth.z + offset(),
        );
        Vertex { truth: *truth, smeared }
    }
}

/// Luminous region and pileup conditions
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct BeamConditions {
    /// Mean number of additional collisions per event
    pub pileup: f64,
    /// Transverse size of the luminous region in mm
    pub sigma_xy: f64,
    /// Longitudinal size of the luminous region in mm
    pub sigma_z: f64,
}

impl BeamConditions {
    /// Draw the pileup vertices for one event
    ///
    /// Each vertex gets its own track multiplicity from `ntracks`; without
    /// a multiplicity distribution all vertices have zero tracks.
    pub fn generate_pileup<R: Rng + ?Sized>(
        &self,
        ntracks: Option<&Hist1D>,
        resolution: &VertexResolution,
        rng: &mut R,
    ) -> Vec<CollisionVertex> {
        let count = self.draw_pileup_count(rng);
        let mut vertices = Vec::with_capacity(count);
        for _ in 0..count {
            let truth = ThreeVector::new(
                gauss(self.sigma_xy, rng),
                gauss(self.sigma_xy, rng),
                gauss(self.sigma_z, rng),
            );
            let ntracks = draw_ntracks(ntracks, rng);
            vertices.push(CollisionVertex {
                vertex: resolution.smear(&truth, ntracks, rng),
                ntracks,
            });
        }
        vertices
    }

    fn draw_pileup_count<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        if !(self.pileup > 0.) {
            return 0;
        }
        match Poisson::new(self.pileup) {
            Ok(poisson) => {
                let n: f64 = poisson.sample(rng);
                n as usize
            }
            Err(_) => 0,
        }
    }
}

/// Track multiplicity drawn from a histogram, zero if there is none
pub fn draw_ntracks<R: Rng + ?Sized>(hist: Option<&Hist1D>, rng: &mut R) -> u32 {
    hist.and_then(|h| h.sample(rng))
        .map(|n| n.max(0.) as u32)
        .unwrap_or(0)
}

fn gauss<R: Rng + ?Sized>(sigma: f64, rng: &mut R) -> f64 {
    match Normal::new(0., sigma) {
        Ok(normal) => normal.sample(rng),
        Err(_) => 0.,
    }
}
