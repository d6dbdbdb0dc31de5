use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Parametrisation used to float the mass of a resonance
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LineshapeKind {
    /// Relativistic Breit-Wigner with mass-dependent width
    RelativisticBreitWigner,
    /// Gounaris-Sakurai
    GounarisSakurai,
}

/// Static properties of a particle species
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Species {
    /// PDG id
    pub id: i32,
    pub name: String,
    /// Pole mass in GeV
    pub mass: f64,
    /// Total width in GeV
    pub width: f64,
    /// Charge in units of the elementary charge
    pub charge: f64,
    pub spin: f64,
    pub lineshape: Option<LineshapeKind>,
    /// Proper decay length in mm
    pub ctau: f64,
}

/// Lookup table of all known species
#[derive(Debug, Clone, Default)]
pub struct SpeciesTable {
    species: Vec<Species>,
    by_id: HashMap<i32, usize>,
    by_name: HashMap<String, usize>,
}

impl SpeciesTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a species; a repeated id keeps the first definition
    ///
    /// The species can afterwards be found both by its name and by its
    /// sanitised name.
    pub fn insert(&mut self, species: Species) -> bool {
        if let Some(&idx) = self.by_id.get(&species.id) {
            tracing::info!(
                "Particle with ID {} already defined with name {}, ignoring second definition",
                species.id,
                self.species[idx].name
            );
            return false;
        }
        let idx = self.species.len();
        self.by_id.insert(species.id, idx);
        self.by_name.entry(species.name.clone()).or_insert(idx);
        self.by_name.entry(sanitise_name(&species.name)).or_insert(idx);
        self.species.push(species);
        true
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Species> {
        self.species.iter()
    }

    pub fn by_id(&self, id: i32) -> Option<&Species> {
        self.by_id.get(&id).map(|&idx| &self.species[idx])
    }

    pub fn by_name(&self, name: &str) -> Option<&Species> {
        self.by_name.get(name).map(|&idx| &self.species[idx])
    }

    pub fn get(&self, name: &str) -> Result<&Species, Error> {
        self.by_name(name)
            .ok_or_else(|| Error::UnknownParticle(name.to_owned()))
    }
}

/// Turn a particle name into one usable as an identifier
///
/// `K*0` becomes `Kst0`, `pi+` becomes `pip` and so on.
pub fn sanitise_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '+' => out.push('p'),
            '-' => out.push('m'),
            '*' => out.push_str("st"),
            '(' | ')' | '[' | ']' | '<' | '>' | '{' | '}' | ' ' => out.push('_'),
            '$' | '%' | '&' | '/' | ':' | ';' | '=' | '\\' | '^' | '|' | ',' | '.' => {}
            c => out.push(c),
        }
    }
    out.trim_matches('_').to_owned()
}
