//! Fast Monte Carlo generation of particle decay chains
//!
//! A decay is described by a descriptor such as `B0 -> {K*0 -> K+ pi-} mu+ mu-`
//! and generated by [`DecayGenerator`]: broad resonances get their masses
//! from a lineshape, the parent is given momentum, all particles are decayed
//! according to phase space, optionally reweighted to a target distribution,
//! and a parametric detector response smears momenta and impact parameters.
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! use decaysim::{read_decay, read_species, DecayGenerator, GeneratorConfig, Momenta, Writer};
//!
//! # fn main() -> Result<(), decaysim::Error> {
//! let species = read_species(BufReader::new(File::open("particles.dat")?))?;
//! let tree = read_decay(BufReader::new(File::open("Bd2Kstmumu.decay")?), &species)?;
//! let mut generator = DecayGenerator::new(tree, &GeneratorConfig::default())?;
//! let mut writer = Writer::new(File::create("events.lhe")?, decaysim::LHEF_VERSION)?;
//! writer.init(&Default::default())?;
//! for _ in 0..1000 {
//!     if generator.generate(true) {
//!         writer.event(&generator.event_record(Momenta::Smeared))?;
//!     }
//! }
//! writer.finish()?;
//! # Ok(())
//! # }
//! ```
pub mod accept_reject;
pub mod config;
pub mod data;
pub mod descriptor;
pub mod error;
pub mod generator;
pub mod histogram;
pub mod ip;
pub mod lineshape;
pub mod lorentz;
pub mod param;
pub mod particle;
pub mod phase_space;
pub mod reader;
pub mod smear;
pub mod species;
pub mod status;
mod tags;
pub mod vertex;
pub mod writer;

pub use config::{DecayConfig, GeneratorConfig};
pub use data::{EventRecord, Momenta, RunInfo};
pub use descriptor::{parse_decay, read_decay};
pub use error::{Error, EventError};
pub use generator::{DecayGenerator, DecayKinematics, ExternalDecayer, ParentKinematics};
pub use lorentz::{FourMomentum, ThreeVector};
pub use param::{KinematicParam, ParamKind};
pub use particle::{DecayTree, MassHypothesis, NodeId, ParticleNode};
pub use reader::{read_beam, read_graph, read_hist1d, read_hist2d, read_species};
pub use species::{Species, SpeciesTable};
pub use writer::{WriteError, Writer, LHEF_VERSION};
