//! Decay descriptors
//!
//! A descriptor lists a parent followed by `->` and its daughters. A
//! daughter that decays further is written as a sub-decay in braces:
//!
//! ```text
//! B0 -> {K*0 -> K+ pi-} mu+ mu-
//! ```
//!
//! Particles are numbered breadth-first, so in this example the K*0 is
//! particle 1 and its daughters are particles 4 and 5.
use std::collections::{HashSet, VecDeque};
use std::io::BufRead;

use crate::error::Error;
use crate::particle::{DecayTree, NodeId};
use crate::species::{sanitise_name, SpeciesTable};

const ARROW: &str = "->";
const DECAYING: char = '^';

/// Hands out names of the form `<sanitised name>_<n>`
#[derive(Debug, Default)]
struct UniqueNames {
    used: HashSet<String>,
}

impl UniqueNames {
    fn make(&mut self, name: &str) -> String {
        let base = sanitise_name(name);
        let mut n = 0;
        loop {
            let candidate = format!("{base}_{n}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Build the decay tree described by `descriptor`
pub fn parse_decay(descriptor: &str, species: &SpeciesTable) -> Result<DecayTree, Error> {
    let invalid = |reason: &str| Error::Descriptor {
        descriptor: descriptor.to_owned(),
        reason: reason.to_owned(),
    };
    if descriptor.matches('{').count() != descriptor.matches('}').count() {
        return Err(invalid("mismatched braces"));
    }

    let mut tree = DecayTree::new();
    let mut names = UniqueNames::default();
    let mut decays = VecDeque::from([descriptor.trim().to_owned()]);
    let mut mothers: VecDeque<NodeId> = VecDeque::new();

    while let Some(mut decay) = decays.pop_front() {
        // move sub-decays to the queue, leaving their flagged mother
        while let Some(start) = decay.find('{') {
            let end = matching_brace(&decay, start).ok_or_else(|| invalid("mismatched braces"))?;
            let sub = decay[start + 1..end].trim().to_owned();
            let Some(mother) = sub.split_whitespace().next() else {
                return Err(invalid("empty sub-decay"));
            };
            let flagged = format!("{DECAYING}{mother}");
            decay.replace_range(start..=end, &flagged);
            tracing::debug!("Found sub-decay {sub}");
            decays.push_back(sub);
        }

        let mut tokens = decay.split_whitespace();
        let parent = tokens.next().ok_or_else(|| invalid("empty decay"))?;
        let mother = if tree.is_empty() {
            let parent_species = species.get(parent)?.clone();
            tree.add_root(parent_species, names.make(parent))?
        } else {
            mothers
                .pop_front()
                .ok_or_else(|| invalid("sub-decay without a mother"))?
        };
        if tokens.next() != Some(ARROW) {
            return Err(invalid(&format!("expected '{ARROW}' after {parent}")));
        }

        let mut ndaughters = 0;
        for token in tokens {
            if token == ARROW {
                return Err(invalid(&format!(
                    "unexpected '{ARROW}' among the daughters of {parent}"
                )));
            }
            let (name, decaying) = match token.strip_prefix(DECAYING) {
                Some(name) => (name, true),
                None => (token, false),
            };
            let daughter = species.get(name)?.clone();
            let id = tree.add_daughter(mother, daughter, names.make(name))?;
            if decaying {
                mothers.push_back(id);
            }
            ndaughters += 1;
        }
        if ndaughters < 2 {
            return Err(invalid(&format!("{parent} needs at least two daughters")));
        }
    }
    tracing::info!("Decay {descriptor} has {} particles", tree.len());
    Ok(tree)
}

/// Position of the brace closing the one opened at `start`
fn matching_brace(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0;
    for (idx, c) in text[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Read a `.decay` file, whose first line is the descriptor
pub fn read_decay<T: BufRead>(mut stream: T, species: &SpeciesTable) -> Result<DecayTree, Error> {
    let mut descriptor = String::new();
    stream.read_line(&mut descriptor)?;
    parse_decay(descriptor.trim(), species)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_species;
    use std::fs;
    use std::io;

    fn species() -> SpeciesTable {
        let file = fs::File::open("test_data/particles.dat").expect("file not found");
        read_species(io::BufReader::new(file)).unwrap()
    }

    #[test]
    fn nested_decay() {
        let file = fs::File::open("test_data/Bd2Kstmumu.decay").expect("file not found");
        let tree = read_decay(io::BufReader::new(file), &species()).unwrap();
        let names: Vec<_> = tree.nodes().map(|n| n.name()).collect();
        assert_eq!(names, ["B0_0", "Kst0_0", "mup_0", "mum_0", "Kp_0", "pim_0"]);
        assert_eq!(tree.node(NodeId(1)).daughters(), [NodeId(4), NodeId(5)]);
        assert_eq!(tree.node(NodeId(5)).id(), -211);
        assert_eq!(tree.node(NodeId(4)).mother(), Some(NodeId(1)));
        tree.validate().unwrap();
    }

    #[test]
    fn repeated_species_get_unique_names() {
        let descriptor = "Bs0 -> {phi -> K+ K-} {phi -> K+ K-}";
        let tree = parse_decay(descriptor, &species()).unwrap();
        let names: Vec<_> = tree.nodes().map(|n| n.name()).collect();
        assert_eq!(names, ["Bs0_0", "phi_0", "phi_1", "Kp_0", "Km_0", "Kp_1", "Km_1"]);
        assert_eq!(tree.node(NodeId(2)).daughters(), [NodeId(5), NodeId(6)]);
    }

    #[test]
    fn deeply_nested() {
        let descriptor = "B+ -> {J/psi -> mu+ mu-} {K*0 -> K+ {rho0 -> pi+ pi-}} pi+";
        let tree = parse_decay(descriptor, &species()).unwrap();
        assert_eq!(tree.len(), 10);
        let rho = tree.find("rho0_0").unwrap();
        assert_eq!(tree.node(rho).mother(), tree.find("Kst0_0"));
        assert_eq!(tree.node(rho).daughters().len(), 2);
    }

    #[test]
    fn malformed() {
        let species = species();
        for descriptor in [
            "B0 -> {K*0 -> K+ pi- mu+ mu-",
            "B0 -> K*0 -> K+ pi-",
            "B0 K+ pi-",
            "B0 -> K+",
            "B0 -> {} K+",
            "B0 -> } K+ pi- {",
        ] {
            let err = parse_decay(descriptor, &species).unwrap_err();
            assert!(matches!(err, Error::Descriptor { .. }), "{descriptor}: {err}");
        }
        assert!(matches!(
            parse_decay("B0 -> K+ X-", &species),
            Err(Error::UnknownParticle(_))
        ));
    }
}
