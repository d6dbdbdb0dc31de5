//! Run and event records in the Les Houches layout
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::particle::{DecayTree, ParticleNode};
use crate::status;

/// Spin entry for particles without polarisation information
pub const UNPOLARISED: f64 = 9.;

/// Which momenta an event record is filled with
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Momenta {
    #[default]
    Truth,
    Smeared,
}

/// A process contributing to the run
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Process {
    /// Cross section in pb
    pub cross_section: f64,
    /// Cross section uncertainty in pb
    pub error: f64,
    pub max_weight: f64,
    pub id: i32,
}

/// Run information
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct RunInfo {
    /// PDG IDs of the colliding beams
    pub beam_ids: [i32; 2],
    /// Beam energies in GeV
    pub beam_energies: [f64; 2],
    /// Meaning of the event weights
    pub weighting: i32,
    pub processes: Vec<Process>,
    /// Optional run information
    pub info: String,
}

impl Default for RunInfo {
    /// LHC proton beams, a single process of unweighted events
    fn default() -> Self {
        RunInfo {
            beam_ids: [2212, 2212],
            beam_energies: [6500., 6500.],
            weighting: 3,
            processes: vec![Process {
                cross_section: 1.,
                error: 0.,
                max_weight: 1.,
                id: 1,
            }],
            info: String::new(),
        }
    }
}

/// A generated event, one entry per particle in each list
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventRecord {
    pub process_id: i32,
    pub weight: f64,
    /// PDG IDs
    pub ids: Vec<i32>,
    /// Status codes, see [`status`](crate::status)
    pub statuses: Vec<i32>,
    /// One-based index of the mother, 0 for the decay head
    pub mothers: Vec<i32>,
    /// `px py pz E m` in GeV
    pub momenta: Vec<[f64; 5]>,
    /// Proper decay length in mm
    pub lifetimes: Vec<f64>,
    pub spins: Vec<f64>,
    /// Optional event information
    pub info: String,
}

impl EventRecord {
    /// Record the current state of a generated decay
    pub fn from_tree(tree: &DecayTree, momenta: Momenta) -> Self {
        let mut record = EventRecord {
            process_id: 1,
            weight: 1.,
            ..Default::default()
        };
        for node in tree.nodes() {
            let p = match momenta {
                Momenta::Truth => node.p(),
                Momenta::Smeared => node.p_smeared(),
            };
            record.ids.push(node.id());
            record.statuses.push(status::of(node));
            record
                .mothers
                .push(node.mother().map_or(0, |m| m.index() as i32 + 1));
            record.momenta.push([p.px, p.py, p.pz, p.e, p.m()]);
            record.lifetimes.push(proper_decay_length(node));
            record.spins.push(UNPOLARISED);
        }
        record
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether all per-particle lists have the same length
    pub fn is_consistent(&self) -> bool {
        let n = self.ids.len();
        [
            self.statuses.len(),
            self.mothers.len(),
            self.momenta.len(),
            self.lifetimes.len(),
            self.spins.len(),
        ]
        .iter()
        .all(|&len| len == n)
    }
}

fn proper_decay_length(node: &ParticleNode) -> f64 {
    let p = node.p().p();
    if node.is_stable() || !(p > 0.) {
        return 0.;
    }
    let distance = (node.decay_vertex().truth - node.origin_vertex().truth).norm();
    distance * node.mass() / p
}
