//! The decay tree
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. A mother
//! is always inserted before its daughters, so iterating in reverse index
//! order visits daughters before mothers.
use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::ip::{ImpactParameter, IpSmearGauss};
use crate::lorentz::FourMomentum;
use crate::smear::MomentumSmearer;
use crate::species::{LineshapeKind, Species};
use crate::vertex::Vertex;

/// Index of a particle in its [`DecayTree`]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reconstructed momentum of a particle under a different mass assumption
#[derive(Debug, Clone, PartialEq)]
pub struct MassHypothesis {
    pub name: String,
    pub mass: f64,
    /// Smeared momentum with the energy recomputed from `mass`
    pub p: FourMomentum,
}

/// One particle in the decay chain
#[derive(Debug, Clone)]
pub struct ParticleNode {
    index: NodeId,
    species: Species,
    name: String,
    mother: Option<NodeId>,
    daughters: Vec<NodeId>,
    next: Option<NodeId>,
    invisible: bool,
    smearer: Option<Arc<MomentumSmearer>>,
    ip_smear: Option<IpSmearGauss>,

    mass: f64,
    p: FourMomentum,
    p_smeared: FourMomentum,
    origin: Vertex,
    decay: Vertex,
    ip: ImpactParameter,
    min_pileup_ip: Option<ImpactParameter>,
    mass_hypotheses: Vec<MassHypothesis>,
}

impl ParticleNode {
    fn new(index: NodeId, species: Species, name: String, mother: Option<NodeId>) -> Self {
        ParticleNode {
            index,
            mass: species.mass,
            species,
            name,
            mother,
            daughters: Vec::new(),
            next: None,
            invisible: false,
            smearer: None,
            ip_smear: None,
            p: FourMomentum::ZERO,
            p_smeared: FourMomentum::ZERO,
            origin: Vertex::default(),
            decay: Vertex::default(),
            ip: ImpactParameter::default(),
            min_pileup_ip: None,
            mass_hypotheses: Vec::new(),
        }
    }

    pub fn index(&self) -> NodeId {
        self.index
    }

    pub fn species(&self) -> &Species {
        &self.species
    }

    /// PDG id
    pub fn id(&self) -> i32 {
        self.species.id
    }

    /// Unique name within the tree
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn charge(&self) -> f64 {
        self.species.charge
    }

    pub fn pole_mass(&self) -> f64 {
        self.species.mass
    }

    pub fn width(&self) -> f64 {
        self.species.width
    }

    pub fn spin(&self) -> f64 {
        self.species.spin
    }

    pub fn lineshape(&self) -> Option<LineshapeKind> {
        self.species.lineshape
    }

    /// Proper decay length in mm
    pub fn ctau(&self) -> f64 {
        self.species.ctau
    }

    /// Mass in the current event
    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn mother(&self) -> Option<NodeId> {
        self.mother
    }

    pub fn daughters(&self) -> &[NodeId] {
        &self.daughters
    }

    pub fn first_daughter(&self) -> Option<NodeId> {
        self.daughters.first().copied()
    }

    /// The next daughter of the same mother
    pub fn next_sibling(&self) -> Option<NodeId> {
        self.next
    }

    pub fn is_stable(&self) -> bool {
        self.daughters.is_empty()
    }

    pub fn is_invisible(&self) -> bool {
        self.invisible
    }

    pub fn smearer(&self) -> Option<&MomentumSmearer> {
        self.smearer.as_deref()
    }

    pub fn ip_smear(&self) -> Option<&IpSmearGauss> {
        self.ip_smear.as_ref()
    }

    /// True momentum
    pub fn p(&self) -> &FourMomentum {
        &self.p
    }

    /// Reconstructed momentum
    pub fn p_smeared(&self) -> &FourMomentum {
        &self.p_smeared
    }

    pub fn origin_vertex(&self) -> &Vertex {
        &self.origin
    }

    pub fn decay_vertex(&self) -> &Vertex {
        &self.decay
    }

    /// Impact parameter with respect to the signal vertex
    pub fn ip(&self) -> &ImpactParameter {
        &self.ip
    }

    /// Impact parameter with respect to the pileup vertex with the
    /// smallest reconstructed impact parameter, if there is any pileup
    pub fn min_pileup_ip(&self) -> Option<&ImpactParameter> {
        self.min_pileup_ip.as_ref()
    }

    /// Distance between origin and decay vertex in mm
    pub fn flight_distance(&self) -> f64 {
        (self.decay.truth - self.origin.truth).norm()
    }

    /// Alternative mass assumptions, e.g. for misidentification studies
    pub fn mass_hypotheses(&self) -> &[MassHypothesis] {
        &self.mass_hypotheses
    }

    pub fn mass_hypothesis(&self, name: &str) -> Option<&MassHypothesis> {
        self.mass_hypotheses.iter().find(|h| h.name == name)
    }

    pub fn add_mass_hypothesis(&mut self, name: impl Into<String>, mass: f64) {
        self.mass_hypotheses.push(MassHypothesis {
            name: name.into(),
            mass,
            p: FourMomentum::ZERO,
        });
    }

    /// Recompute the momenta of all mass hypotheses from the smeared momentum
    pub(crate) fn update_mass_hypotheses(&mut self) {
        for hypothesis in &mut self.mass_hypotheses {
            hypothesis.p = if self.invisible {
                FourMomentum::ZERO
            } else {
                FourMomentum::from_vector_m(&self.p_smeared.vect(), hypothesis.mass)
            };
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Mark a stable particle as undetected
    ///
    /// Invisible particles have a zero reconstructed momentum.
    pub fn set_invisible(&mut self, invisible: bool) {
        self.invisible = invisible;
    }

    pub fn set_smearer(&mut self, smearer: Option<Arc<MomentumSmearer>>) {
        self.smearer = smearer;
    }

    pub fn set_ip_smear(&mut self, ip_smear: Option<IpSmearGauss>) {
        self.ip_smear = ip_smear;
    }

    pub fn set_mass(&mut self, mass: f64) {
        self.mass = mass;
    }

    pub fn set_p(&mut self, p: FourMomentum) {
        self.p = p;
    }

    pub fn set_p_smeared(&mut self, p: FourMomentum) {
        self.p_smeared = p;
    }

    pub fn set_origin_vertex(&mut self, vertex: Vertex) {
        self.origin = vertex;
    }

    pub fn set_decay_vertex(&mut self, vertex: Vertex) {
        self.decay = vertex;
    }

    pub fn set_ip(&mut self, ip: ImpactParameter) {
        self.ip = ip;
    }

    pub fn set_min_pileup_ip(&mut self, ip: Option<ImpactParameter>) {
        self.min_pileup_ip = ip;
    }
}

/// Arena of the particles in a decay chain, the root is the first node
#[derive(Debug, Clone, Default)]
pub struct DecayTree {
    nodes: Vec<ParticleNode>,
}

impl DecayTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the decaying parent; it must be the first node
    pub fn add_root(&mut self, species: Species, name: impl Into<String>) -> Result<NodeId, Error> {
        if !self.nodes.is_empty() {
            return Err(Error::Tree("tree already has a root".to_owned()));
        }
        let id = NodeId(0);
        self.nodes
            .push(ParticleNode::new(id, species, name.into(), None));
        Ok(id)
    }

    /// Append a daughter to `mother`
    pub fn add_daughter(
        &mut self,
        mother: NodeId,
        species: Species,
        name: impl Into<String>,
    ) -> Result<NodeId, Error> {
        if mother.0 >= self.nodes.len() {
            return Err(Error::Tree(format!("no particle with index {mother}")));
        }
        let id = NodeId(self.nodes.len());
        if let Some(&last) = self.nodes[mother.0].daughters.last() {
            self.nodes[last.0].next = Some(id);
        }
        self.nodes[mother.0].daughters.push(id);
        self.nodes
            .push(ParticleNode::new(id, species, name.into(), Some(mother)));
        Ok(id)
    }

    /// Check that every decaying particle has at least two daughters
    pub fn validate(&self) -> Result<(), Error> {
        if self.nodes.is_empty() {
            return Err(Error::Tree("empty decay tree".to_owned()));
        }
        if self.nodes[0].is_stable() {
            return Err(Error::Tree(format!(
                "parent {} does not decay",
                self.nodes[0].name
            )));
        }
        for node in &self.nodes {
            if node.daughters.len() == 1 {
                return Err(Error::Tree(format!(
                    "{} decays into a single particle",
                    node.name
                )));
            }
        }
        Ok(())
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Panics if `id` does not belong to this tree
    pub fn node(&self, id: NodeId) -> &ParticleNode {
        &self.nodes[id.0]
    }

    /// Panics if `id` does not belong to this tree
    pub fn node_mut(&mut self, id: NodeId) -> &mut ParticleNode {
        &mut self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&ParticleNode> {
        self.nodes.get(id.0)
    }

    pub fn nodes(&self) -> impl DoubleEndedIterator<Item = &ParticleNode> + ExactSizeIterator {
        self.nodes.iter()
    }

    pub fn nodes_mut(
        &mut self,
    ) -> impl DoubleEndedIterator<Item = &mut ParticleNode> + ExactSizeIterator {
        self.nodes.iter_mut()
    }

    pub fn ids(&self) -> impl DoubleEndedIterator<Item = NodeId> + ExactSizeIterator {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().find(|n| n.name == name).map(|n| n.index)
    }

    pub fn daughter_ids(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].daughters
    }

    /// Iterate over the daughters of `id` following the sibling links
    pub fn daughters(&self, id: NodeId) -> Siblings<'_> {
        Siblings {
            tree: self,
            next: self.nodes[id.0].first_daughter(),
        }
    }

    /// Sum of the current masses of the daughters of `id`
    pub fn daughter_mass_sum(&self, id: NodeId) -> f64 {
        self.daughters(id).map(|d| d.mass).sum()
    }
}

/// Iterator over the daughters of one particle
pub struct Siblings<'a> {
    tree: &'a DecayTree,
    next: Option<NodeId>,
}

impl<'a> Iterator for Siblings<'a> {
    type Item = &'a ParticleNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = &self.tree.nodes[self.next?.0];
        self.next = node.next;
        Some(node)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn species(id: i32, name: &str, mass: f64) -> Species {
        Species {
            id,
            name: name.to_owned(),
            mass,
            width: 0.,
            charge: 0.,
            spin: 0.,
            lineshape: None,
            ctau: 0.,
        }
    }

    #[test]
    fn build_and_walk() {
        let mut tree = DecayTree::new();
        let b = tree.add_root(species(511, "B0", 5.27966), "B0_0").unwrap();
        let kst = tree.add_daughter(b, species(313, "K*0", 0.89555), "Kst0_0").unwrap();
        let mu = tree.add_daughter(b, species(13, "mu-", 0.10566), "mum_0").unwrap();
        let _ = tree.add_daughter(b, species(-13, "mu+", 0.10566), "mup_0").unwrap();
        let k = tree.add_daughter(kst, species(321, "K+", 0.493677), "Kp_0").unwrap();
        let _ = tree.add_daughter(kst, species(-211, "pi-", 0.13957), "pim_0").unwrap();
        tree.validate().unwrap();

        let names: Vec<_> = tree.daughters(b).map(|n| n.name()).collect();
        assert_eq!(names, ["Kst0_0", "mum_0", "mup_0"]);
        assert_eq!(tree.node(mu).next_sibling(), Some(NodeId(3)));
        assert_eq!(tree.node(k).mother(), Some(kst));
        assert!(tree.node(k).is_stable());
        assert!(!tree.node(kst).is_stable());
        assert!((tree.daughter_mass_sum(kst) - 0.633247).abs() < 1e-9);
        assert_eq!(tree.find("mup_0"), Some(NodeId(3)));
    }

    #[test]
    fn invalid_trees() {
        let mut tree = DecayTree::new();
        assert!(tree.validate().is_err());
        let b = tree.add_root(species(511, "B0", 5.28), "B0").unwrap();
        assert!(tree.validate().is_err());
        tree.add_daughter(b, species(443, "J/psi", 3.097), "Jpsi").unwrap();
        assert!(tree.validate().is_err());
        assert!(tree.add_root(species(511, "B0", 5.28), "B0").is_err());
        assert!(tree.add_daughter(NodeId(7), species(22, "gamma", 0.), "g").is_err());
    }
}
