//! Generator settings and the `.config` file layout
//!
//! A configuration file consists of `key : value` lines. A line `!` starts
//! the global section, `@N` the section for the N-th particle of the decay
//! in descriptor order. Lines before the first section marker are global.
//!
//! ```text
//! seed : 42
//! maxAttempts : 1000
//! @2
//!     name : mu_plus
//!     smear : LHCbGeneric
//!     ipSmear : 0.011 0.023
//!     altMass : pi+
//! @5
//!     invisible : true
//! ```
use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::ip::IpSmearGauss;
use crate::lineshape::LineshapeSettings;
use crate::particle::{DecayTree, NodeId};
use crate::reader::{parse, parse_f64, strip_comment};
use crate::smear::MomentumSmearer;
use crate::species::{sanitise_name, SpeciesTable};
use crate::vertex::{BeamConditions, VertexResolution};

/// Run-wide generator settings
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    /// Seed of the random number generator
    pub seed: u64,
    /// Attempt limit for the phase-space and accept/reject loops
    pub max_attempts: usize,
    /// Resonances narrower than this (in GeV) are not floated
    pub narrow_width: f64,
    /// Blatt-Weisskopf barrier radius in 1/GeV
    pub barrier_radius: f64,
    /// Size of the mass cache of each floated resonance
    pub lineshape_samples: usize,
    /// Number of events used for the accept/reject denominator
    pub denominator_samples: usize,
    pub beam: BeamConditions,
    pub vertex_resolution: VertexResolution,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        let lineshapes = LineshapeSettings::default();
        GeneratorConfig {
            seed: 4357,
            max_attempts: 1000,
            narrow_width: lineshapes.narrow_width,
            barrier_radius: lineshapes.barrier_radius,
            lineshape_samples: lineshapes.samples,
            denominator_samples: 1_000_000,
            beam: BeamConditions::default(),
            vertex_resolution: VertexResolution::default(),
        }
    }
}

impl GeneratorConfig {
    pub fn lineshape_settings(&self) -> LineshapeSettings {
        LineshapeSettings {
            narrow_width: self.narrow_width,
            barrier_radius: self.barrier_radius,
            samples: self.lineshape_samples,
        }
    }
}

/// Settings for a single particle
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParticleSettings {
    pub name: Option<String>,
    pub invisible: Option<bool>,
    /// Name of a momentum smearing category
    pub smear: Option<String>,
    pub ip_smear: Option<IpSmearGauss>,
    /// Species whose masses are tried as alternative hypotheses
    pub alt_masses: Vec<String>,
}

/// Contents of a `.config` file
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecayConfig {
    pub generator: GeneratorConfig,
    /// Per-particle settings by position in the decay
    pub particles: BTreeMap<usize, ParticleSettings>,
}

enum Section {
    Global,
    Particle(usize),
}

impl DecayConfig {
    /// Parse a configuration, starting from the default settings
    pub fn parse<T: BufRead>(stream: T) -> Result<Self, Error> {
        let mut config = DecayConfig::default();
        let mut section = Section::Global;
        for (n, line) in stream.lines().enumerate() {
            let line = line?;
            let line = strip_comment(&line).trim();
            if line.is_empty() {
                continue;
            }
            if line == "!" {
                section = Section::Global;
                continue;
            }
            if let Some(idx) = line.strip_prefix('@') {
                section = Section::Particle(parse::<usize>("particle index", Some(idx.trim()))?);
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                return Err(Error::Config(format!(
                    "line {}: expected 'key : value', found '{line}'",
                    n + 1
                )));
            };
            let (key, value) = (key.trim(), value.trim());
            match section {
                Section::Global => config.set_global(key, value)?,
                Section::Particle(idx) => config
                    .particles
                    .entry(idx)
                    .or_default()
                    .set(key, value)?,
            }
        }
        Ok(config)
    }

    fn set_global(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let generator = &mut self.generator;
        match key {
            "seed" => generator.seed = parse("seed", Some(value))?,
            "maxAttempts" => generator.max_attempts = parse("maxAttempts", Some(value))?,
            "minWidth" => generator.narrow_width = parse_f64("minWidth", Some(value))?,
            "pileup" => generator.beam.pileup = parse_f64("pileup", Some(value))?,
            "sigmaXY" => generator.beam.sigma_xy = parse_f64("sigmaXY", Some(value))?,
            "sigmaZ" => generator.beam.sigma_z = parse_f64("sigmaZ", Some(value))?,
            _ => return Err(Error::Config(format!("unknown global setting '{key}'"))),
        }
        tracing::info!("Setting {key} to {value}");
        Ok(())
    }

    /// Attach the particle settings to `tree`
    ///
    /// Alternative mass hypotheses are looked up in `species`, `smearers`
    /// maps the category names used by `smear` to smearers.
    pub fn apply(
        &self,
        tree: &mut DecayTree,
        species: &SpeciesTable,
        smearers: &HashMap<String, Arc<MomentumSmearer>>,
    ) -> Result<(), Error> {
        for (&idx, settings) in &self.particles {
            if idx >= tree.len() {
                return Err(Error::Config(format!(
                    "no particle at index {idx}, the decay has {} particles",
                    tree.len()
                )));
            }
            let node = tree.node_mut(NodeId(idx));
            if let Some(name) = &settings.name {
                node.set_name(name.as_str());
            }
            if let Some(invisible) = settings.invisible {
                node.set_invisible(invisible);
            }
            if let Some(category) = &settings.smear {
                let smearer = smearers.get(category).ok_or_else(|| {
                    Error::Config(format!("unknown smearing category '{category}'"))
                })?;
                node.set_smearer(Some(smearer.clone()));
            }
            if settings.ip_smear.is_some() {
                node.set_ip_smear(settings.ip_smear);
            }
            for name in &settings.alt_masses {
                let alt = species.get(name)?;
                node.add_mass_hypothesis(sanitise_name(&alt.name), alt.mass);
                tracing::info!("Added mass hypothesis {name} for {}", node.name());
            }
        }
        Ok(())
    }
}

impl ParticleSettings {
    fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        match key {
            "name" => self.name = Some(value.to_owned()),
            "invisible" => {
                self.invisible = match value {
                    "true" => Some(true),
                    "false" => Some(false),
                    _ => {
                        return Err(Error::Config(format!(
                            "invisible must be 'true' or 'false', found '{value}'"
                        )))
                    }
                }
            }
            "smear" => self.smear = Some(value.to_owned()),
            "ipSmear" => {
                let mut entries = value.split_whitespace();
                let intercept = parse_f64("ipSmear intercept", entries.next())?;
                let slope = parse_f64("ipSmear slope", entries.next())?;
                self.ip_smear = Some(IpSmearGauss::new(intercept, slope));
            }
            "altMass" => self
                .alt_masses
                .extend(value.split_whitespace().map(str::to_owned)),
            _ => return Err(Error::Config(format!("unknown particle setting '{key}'"))),
        }
        Ok(())
    }
}
