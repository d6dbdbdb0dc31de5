//! Event generation
//!
//! Each event is produced in a fixed sequence:
//!
//! 1. float the masses of broad resonances
//! 2. sample the parent kinematics, the primary vertex and pileup
//! 3. decay the tree top-down, repeating this step until the event
//!    passes the accept/reject stage
//! 4. smear momenta bottom-up
//! 5. compute impact parameters
use std::collections::{BTreeMap, HashMap};
use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp};

use crate::accept_reject::AcceptReject;
use crate::config::{DecayConfig, GeneratorConfig};
use crate::data::{EventRecord, Momenta};
use crate::error::{Error, EventError, FailureKind, FailureLog};
use crate::histogram::{Hist1D, Hist2D};
use crate::ip::{get_particle_ip, ImpactParameter};
use crate::lineshape::LineshapeTable;
use crate::lorentz::{FourMomentum, ThreeVector};
use crate::param::{KinematicParam, ParamKind};
use crate::particle::{DecayTree, NodeId, ParticleNode};
use crate::phase_space::{PhaseSpace, PhaseSpaceError};
use crate::smear::MomentumSmearer;
use crate::species::SpeciesTable;
use crate::vertex::{draw_ntracks, BeamConditions, CollisionVertex, Vertex, VertexResolution};

/// A decay model that can replace phase-space generation
///
/// The root momentum is set when `decay` is called. An implementation
/// either sets the momenta of all other particles and returns `Ok(true)`,
/// or returns `Ok(false)` to let the built-in phase-space generator decay
/// the event instead.
pub trait ExternalDecayer: fmt::Debug {
    fn decay(
        &mut self,
        event: &mut DecayKinematics<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<bool, Error>;
}

/// Decayer that always declines
#[derive(Debug, Copy, Clone, Default)]
pub struct NoExternalDecayer;

impl ExternalDecayer for NoExternalDecayer {
    fn decay(
        &mut self,
        _event: &mut DecayKinematics<'_>,
        _rng: &mut dyn RngCore,
    ) -> Result<bool, Error> {
        Ok(false)
    }
}

/// The decay tree as seen by an [`ExternalDecayer`]
///
/// Only momenta can be changed, the particles and their relations are fixed.
#[derive(Debug)]
pub struct DecayKinematics<'a> {
    tree: &'a mut DecayTree,
}

impl DecayKinematics<'_> {
    pub fn tree(&self) -> &DecayTree {
        self.tree
    }

    pub fn set_p(&mut self, id: NodeId, p: FourMomentum) {
        self.tree.node_mut(id).set_p(p);
    }
}

/// How the transverse momentum and pseudorapidity of the parent are drawn
#[derive(Debug, Clone, Default)]
pub enum ParentKinematics {
    /// Parent produced at rest
    #[default]
    AtRest,
    /// Independent transverse momentum and pseudorapidity distributions
    Separate { pt: Hist1D, eta: Hist1D },
    /// Joint distribution with transverse momentum on the x axis
    Joint(Hist2D),
}

/// Generator for one decay chain
#[derive(Debug)]
pub struct DecayGenerator<R = ChaCha8Rng> {
    tree: DecayTree,
    rng: R,
    lineshapes: LineshapeTable,
    parent: ParentKinematics,
    pv_ntracks: Option<Hist1D>,
    beam: BeamConditions,
    vertex_resolution: VertexResolution,
    primary: CollisionVertex,
    pileup: Vec<CollisionVertex>,
    accept_reject: Option<AcceptReject>,
    external: Box<dyn ExternalDecayer>,
    max_attempts: usize,
    denominator_samples: usize,
    failures: FailureLog,
    parent_generated: bool,
    masses: Vec<f64>,
    decay: Vec<FourMomentum>,
}

impl DecayGenerator<ChaCha8Rng> {
    /// Set up a generator seeded from `config.seed`
    ///
    /// This builds the mass caches of all floated resonances.
    pub fn new(tree: DecayTree, config: &GeneratorConfig) -> Result<Self, Error> {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self::with_rng(tree, config, rng)
    }
}

impl<R: Rng> DecayGenerator<R> {
    /// Set up a generator drawing from `rng`; `config.seed` is ignored
    pub fn with_rng(tree: DecayTree, config: &GeneratorConfig, mut rng: R) -> Result<Self, Error> {
        tree.validate()?;
        let lineshapes = LineshapeTable::build(&tree, &config.lineshape_settings(), &mut rng)?;
        tracing::info!(
            "Set up generator for {} particles with {} floated resonances",
            tree.len(),
            lineshapes.len()
        );
        Ok(DecayGenerator {
            tree,
            rng,
            lineshapes,
            parent: ParentKinematics::default(),
            pv_ntracks: None,
            beam: config.beam,
            vertex_resolution: config.vertex_resolution,
            primary: CollisionVertex::default(),
            pileup: Vec::new(),
            accept_reject: None,
            external: Box::new(NoExternalDecayer),
            max_attempts: config.max_attempts.max(1),
            denominator_samples: config.denominator_samples,
            failures: FailureLog::default(),
            parent_generated: false,
            masses: Vec::new(),
            decay: Vec::new(),
        })
    }

    /// Generate one event
    ///
    /// With `sample_parent` unset the parent kinematics and vertices of the
    /// previous event are kept and only its descendants are decayed again.
    /// Returns `false` if this event could not be generated; the reason is
    /// logged and counted in [`failure_counts`](Self::failure_counts).
    pub fn generate(&mut self, sample_parent: bool) -> bool {
        match self.try_generate(sample_parent) {
            Ok(()) => true,
            Err(err) => {
                self.failures.record(&err);
                false
            }
        }
    }

    /// Generate one event, returning the reason for a failure
    pub fn try_generate(&mut self, sample_parent: bool) -> Result<(), EventError> {
        let redecay = !sample_parent && self.parent_generated;
        self.float_masses(!redecay);
        if !redecay {
            self.gen_parent();
        }
        if self.accept_reject.is_some() {
            self.gen_accepted_decay()?;
        } else {
            self.gen_decay()?;
        }
        self.smear_momenta();
        self.calc_ips();
        tracing::debug!("Generated decay of {}", self.tree.node(self.tree.root()).p());
        Ok(())
    }

    fn float_masses(&mut self, include_root: bool) {
        let skip = if include_root { 0 } else { 1 };
        for node in self.tree.nodes_mut().skip(skip) {
            let mass = match self.lineshapes.get(node.id()) {
                Some(samples) => samples.draw(&mut self.rng),
                None => node.pole_mass(),
            };
            node.set_mass(mass);
        }
    }

    fn gen_parent(&mut self) {
        let (pt, eta) = match &self.parent {
            ParentKinematics::AtRest => (0., 0.),
            ParentKinematics::Separate { pt, eta } => (
                pt.sample(&mut self.rng).unwrap_or_default(),
                eta.sample(&mut self.rng).unwrap_or_default(),
            ),
            ParentKinematics::Joint(hist) => hist.sample(&mut self.rng).unwrap_or_default(),
        };
        let phi = self.rng.gen_range(0. ..2. * PI);

        let ntracks = draw_ntracks(self.pv_ntracks.as_ref(), &mut self.rng);
        self.primary = CollisionVertex {
            vertex: self
                .vertex_resolution
                .smear(&ThreeVector::zeros(), ntracks, &mut self.rng),
            ntracks,
        };
        self.pileup = self.beam.generate_pileup(
            self.pv_ntracks.as_ref(),
            &self.vertex_resolution,
            &mut self.rng,
        );

        let root = self.tree.node_mut(NodeId(0));
        let p = FourMomentum::from_pt_eta_phi_m(pt, eta, phi, root.mass());
        root.set_p(p);
        root.set_origin_vertex(self.primary.vertex);
        self.parent_generated = true;
    }

    /// Repeat the decay until it passes the accept/reject stage
    fn gen_accepted_decay(&mut self) -> Result<(), EventError> {
        for _ in 0..self.max_attempts {
            self.gen_decay()?;
            let accepted = match &self.accept_reject {
                Some(ar) => ar.accept(&self.tree, &mut self.rng),
                None => true,
            };
            if accepted {
                return Ok(());
            }
        }
        Err(EventError::AcceptRejectExhausted {
            attempts: self.max_attempts,
        })
    }

    fn gen_decay(&mut self) -> Result<(), EventError> {
        let mut event = DecayKinematics {
            tree: &mut self.tree,
        };
        let external = self
            .external
            .decay(&mut event, &mut self.rng)
            .map_err(|err| EventError::External(err.to_string()))?;
        if external {
            for id in self.tree.ids() {
                self.place_decay_vertex(id);
            }
            return Ok(());
        }

        let mut stack = vec![self.tree.root()];
        while let Some(id) = stack.pop() {
            self.place_decay_vertex(id);
            if self.tree.node(id).is_stable() {
                continue;
            }
            self.decay_node(id)?;
            stack.extend(self.tree.daughter_ids(id).iter().rev());
        }
        Ok(())
    }

    /// Set the decay vertex of `id` and the origin of its daughters
    fn place_decay_vertex(&mut self, id: NodeId) {
        let node = self.tree.node(id);
        let origin = *node.origin_vertex();
        let decay = if !(node.ctau() > 0.) {
            origin
        } else {
            let p = node.p();
            let mean = node.ctau() * p.gamma();
            let distance = match Exp::new(1. / mean) {
                Ok(exp) => exp.sample(&mut self.rng),
                Err(_) => 0.,
            };
            let direction = if p.p() > 0. {
                p.vect() / p.p()
            } else {
                ThreeVector::zeros()
            };
            Vertex::at(origin.truth + distance * direction)
        };
        self.tree.node_mut(id).set_decay_vertex(decay);
        for n in 0..self.tree.daughter_ids(id).len() {
            let daughter = self.tree.daughter_ids(id)[n];
            self.tree.node_mut(daughter).set_origin_vertex(decay);
        }
    }

    fn decay_node(&mut self, id: NodeId) -> Result<(), EventError> {
        let parent = *self.tree.node(id).p();
        self.masses.clear();
        self.masses.extend(self.tree.daughters(id).map(ParticleNode::mass));
        let phase_space = PhaseSpace::new(&parent, &self.masses).map_err(|err| match err {
            PhaseSpaceError::KinematicallyForbidden { parent_mass, mass_sum } => {
                EventError::KinematicallyForbidden {
                    node: id,
                    parent_mass,
                    daughter_mass_sum: mass_sum,
                }
            }
            err @ PhaseSpaceError::TooFewDaughters(_) => EventError::InvalidDecay {
                node: id,
                reason: err.to_string(),
            },
        })?;
        let generated =
            phase_space.generate_unweighted(&mut self.rng, self.max_attempts, &mut self.decay);
        if generated.is_none() {
            return Err(EventError::PhaseSpaceExhausted {
                node: id,
                attempts: self.max_attempts,
            });
        }
        for n in 0..self.decay.len() {
            let daughter = self.tree.daughter_ids(id)[n];
            self.tree.node_mut(daughter).set_p(self.decay[n]);
        }
        Ok(())
    }

    fn smear_momenta(&mut self) {
        for id in self.tree.ids().rev() {
            let node = self.tree.node(id);
            let smeared = if !node.is_stable() {
                self.tree.daughters(id).map(|d| *d.p_smeared()).sum()
            } else if node.is_invisible() {
                FourMomentum::ZERO
            } else {
                match node.smearer() {
                    Some(smearer) => smearer.smear(node.p(), &mut self.rng),
                    None => *node.p(),
                }
            };
            let node = self.tree.node_mut(id);
            node.set_p_smeared(smeared);
            node.update_mass_hypotheses();
        }
    }

    fn calc_ips(&mut self) {
        let primary = self.primary.vertex;
        for id in self.tree.ids() {
            let ip = self.impact_parameter(id, &primary);
            let mut min_pileup: Option<ImpactParameter> = None;
            for n in 0..self.pileup.len() {
                let vertex = self.pileup[n].vertex;
                let ip = self.impact_parameter(id, &vertex);
                match min_pileup {
                    Some(min) if !(ip.smeared.abs() < min.smeared.abs()) => {}
                    _ => min_pileup = Some(ip),
                }
            }
            let node = self.tree.node_mut(id);
            node.set_ip(ip);
            node.set_min_pileup_ip(min_pileup);
        }
    }

    fn impact_parameter(&mut self, id: NodeId, reference: &Vertex) -> ImpactParameter {
        let node = self.tree.node(id);
        let origin = node.origin_vertex();
        let truth = get_particle_ip(&reference.truth, &origin.truth, &node.p().vect());
        let p_smeared = node.p_smeared();
        let smeared = get_particle_ip(&reference.smeared, &origin.smeared, &p_smeared.vect());
        match node.ip_smear() {
            Some(gauss) => {
                let (smeared, sigma) = gauss.smear(smeared, p_smeared.pt(), &mut self.rng);
                ImpactParameter { truth, smeared, sigma }
            }
            None => ImpactParameter {
                truth,
                smeared,
                sigma: 0.,
            },
        }
    }

    /// Draw the parent transverse momentum and pseudorapidity independently
    pub fn set_parent_kinematics(&mut self, pt: Hist1D, eta: Hist1D) -> Result<(), Error> {
        for (name, hist) in [("pt", &pt), ("eta", &eta)] {
            if !(hist.integral() > 0.) {
                return Err(Error::Histogram(format!(
                    "parent {name} distribution is empty"
                )));
            }
        }
        self.parent = ParentKinematics::Separate { pt, eta };
        Ok(())
    }

    /// Draw the parent transverse momentum (x) and pseudorapidity (y) jointly
    pub fn set_parent_kinematics_2d(&mut self, pt_eta: Hist2D) -> Result<(), Error> {
        if !(pt_eta.integral() > 0.) {
            return Err(Error::Histogram(
                "parent pt-eta distribution is empty".to_owned(),
            ));
        }
        self.parent = ParentKinematics::Joint(pt_eta);
        Ok(())
    }

    /// Track multiplicity distribution of the primary and pileup vertices
    pub fn set_pv_ntracks(&mut self, ntracks: Hist1D) {
        self.pv_ntracks = Some(ntracks);
    }

    pub fn set_beam(&mut self, beam: BeamConditions) {
        self.beam = beam;
    }

    pub fn set_vertex_resolution(&mut self, resolution: VertexResolution) {
        self.vertex_resolution = resolution;
    }

    /// Bias generation towards the distribution `target` of `param`
    ///
    /// The distribution of `param` without any bias is measured first from
    /// the configured number of denominator events. Only one target can be
    /// set; later ones are ignored and `Ok(false)` is returned.
    pub fn set_accept_reject(
        &mut self,
        target: Hist1D,
        param: KinematicParam,
    ) -> Result<bool, Error> {
        if self.refuse_accept_reject() {
            return Ok(false);
        }
        self.check_param(&param)?;
        let ar = AcceptReject::new(target, param)?;
        self.install_accept_reject(ar)
    }

    /// Bias generation towards a joint distribution of two parameters
    pub fn set_accept_reject_2d(
        &mut self,
        target: Hist2D,
        x: KinematicParam,
        y: KinematicParam,
    ) -> Result<bool, Error> {
        if self.refuse_accept_reject() {
            return Ok(false);
        }
        self.check_param(&x)?;
        self.check_param(&y)?;
        let ar = AcceptReject::new_2d(target, x, y)?;
        self.install_accept_reject(ar)
    }

    fn refuse_accept_reject(&self) -> bool {
        if self.accept_reject.is_some() {
            tracing::warn!("Accept/reject target has already been set, ignoring additional target");
            return true;
        }
        false
    }

    fn check_param(&self, param: &KinematicParam) -> Result<(), Error> {
        // the corrected mass needs smeared momenta, which are not known yet
        if param.kind == ParamKind::MCorr {
            return Err(Error::Config(format!(
                "{} cannot be used as accept/reject parameter",
                param.kind
            )));
        }
        match param.nodes.iter().find(|id| self.tree.get(**id).is_none()) {
            Some(id) => Err(Error::Tree(format!(
                "parameter {param} refers to particle {id} not in the decay"
            ))),
            None => Ok(()),
        }
    }

    fn install_accept_reject(&mut self, mut ar: AcceptReject) -> Result<bool, Error> {
        tracing::info!(
            "Generating {} events for the accept/reject denominator",
            self.denominator_samples
        );
        let mut failed = 0;
        for _ in 0..self.denominator_samples {
            match self.try_generate(true) {
                Ok(()) => ar.fill_denominator(&self.tree, &mut self.rng),
                Err(_) => failed += 1,
            }
        }
        if failed > 0 {
            tracing::debug!("{failed} denominator events could not be generated");
        }
        ar.normalise()?;
        tracing::info!("Accept/reject weights normalised, maximum weight {}", ar.max());
        self.accept_reject = Some(ar);
        Ok(true)
    }

    /// Maximum number of attempts for phase-space and accept/reject loops
    pub fn set_max_attempts(&mut self, max_attempts: usize) {
        self.max_attempts = max_attempts.max(1);
    }

    pub fn set_external_generator(&mut self, external: Box<dyn ExternalDecayer>) {
        self.external = external;
    }

    /// Number of events used to measure the accept/reject denominator
    pub fn set_denominator_samples(&mut self, samples: usize) {
        self.denominator_samples = samples;
    }

    /// Attach the particle settings of `config` and take over its run settings
    ///
    /// The seed and the lineshape settings only take effect on construction.
    pub fn apply_config(
        &mut self,
        config: &DecayConfig,
        species: &SpeciesTable,
        smearers: &HashMap<String, Arc<MomentumSmearer>>,
    ) -> Result<(), Error> {
        config.apply(&mut self.tree, species, smearers)?;
        let settings = &config.generator;
        self.beam = settings.beam;
        self.vertex_resolution = settings.vertex_resolution;
        self.set_max_attempts(settings.max_attempts);
        self.denominator_samples = settings.denominator_samples;
        Ok(())
    }

    /// Record of the last generated event
    pub fn event_record(&self, momenta: Momenta) -> EventRecord {
        EventRecord::from_tree(&self.tree, momenta)
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn tree(&self) -> &DecayTree {
        &self.tree
    }

    pub fn node(&self, id: NodeId) -> &ParticleNode {
        self.tree.node(id)
    }

    /// Mutable access to a particle, e.g. to attach a smearer
    pub fn node_mut(&mut self, id: NodeId) -> &mut ParticleNode {
        self.tree.node_mut(id)
    }

    pub fn primary_vertex(&self) -> &CollisionVertex {
        &self.primary
    }

    pub fn pileup_vertices(&self) -> &[CollisionVertex] {
        &self.pileup
    }

    pub fn lineshapes(&self) -> &LineshapeTable {
        &self.lineshapes
    }

    pub fn accept_reject(&self) -> Option<&AcceptReject> {
        self.accept_reject.as_ref()
    }

    /// Number of failed events by reason
    pub fn failure_counts(&self) -> &BTreeMap<FailureKind, usize> {
        self.failures.counts()
    }

    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::histogram::{Axis, Graph};
    use crate::ip::IpSmearGauss;
    use crate::particle::tests::species;
    use crate::species::{LineshapeKind, Species};
    use approx::assert_relative_eq;

    const KAON: f64 = 0.493677;
    const PION: f64 = 0.13957;
    const MUON: f64 = 0.10566;

    fn config() -> GeneratorConfig {
        GeneratorConfig {
            seed: 2024,
            lineshape_samples: 20_000,
            denominator_samples: 20_000,
            ..Default::default()
        }
    }

    fn kstar(width: f64) -> Species {
        Species {
            width,
            spin: 1.,
            lineshape: Some(LineshapeKind::RelativisticBreitWigner),
            ..species(313, "K*0", 0.89555)
        }
    }

    /// B0 -> (K*0 -> K+ pi-) mu+ mu-
    fn b_to_kstar_mumu(kstar_width: f64) -> DecayTree {
        let mut tree = DecayTree::new();
        let b0 = Species {
            ctau: 0.4557,
            ..species(511, "B0", 5.27966)
        };
        let b = tree.add_root(b0, "B0_0").unwrap();
        let kst = tree.add_daughter(b, kstar(kstar_width), "Kst0_0").unwrap();
        tree.add_daughter(b, species(-13, "mu+", MUON), "mup_0").unwrap();
        tree.add_daughter(b, species(13, "mu-", MUON), "mum_0").unwrap();
        tree.add_daughter(kst, species(321, "K+", KAON), "Kp_0").unwrap();
        tree.add_daughter(kst, species(-211, "pi-", PION), "pim_0").unwrap();
        tree
    }

    fn with_lhcb_kinematics<R: Rng>(generator: &mut DecayGenerator<R>) {
        let pt = Hist1D::from_contents(0., 20., &[1.; 20]).unwrap();
        let eta = Hist1D::from_contents(2., 5., &[1.; 6]).unwrap();
        generator.set_parent_kinematics(pt, eta).unwrap();
    }

    fn assert_close(a: &FourMomentum, b: &FourMomentum, epsilon: f64) {
        assert_relative_eq!(a.px, b.px, epsilon = epsilon);
        assert_relative_eq!(a.py, b.py, epsilon = epsilon);
        assert_relative_eq!(a.pz, b.pz, epsilon = epsilon);
        assert_relative_eq!(a.e, b.e, epsilon = epsilon);
    }

    #[test]
    fn momentum_is_conserved() {
        let mut tree = b_to_kstar_mumu(0.0473);
        let resolution = Graph::new(vec![(0., 0.004), (100., 0.008)]).unwrap();
        let smearer = Arc::new(MomentumSmearer::gauss(resolution));
        for id in tree.ids().skip(2) {
            tree.node_mut(id).set_smearer(Some(smearer.clone()));
        }
        let mut generator = DecayGenerator::new(tree, &config()).unwrap();
        with_lhcb_kinematics(&mut generator);
        for _ in 0..200 {
            assert!(generator.generate(true));
            let tree = generator.tree();
            for node in tree.nodes().filter(|n| !n.is_stable()) {
                let id = node.index();
                let truth: FourMomentum = tree.daughters(id).map(|d| *d.p()).sum();
                assert_close(node.p(), &truth, 1e-6 * node.p().e);
                let smeared: FourMomentum = tree.daughters(id).map(|d| *d.p_smeared()).sum();
                assert_close(node.p_smeared(), &smeared, 1e-9 * node.p_smeared().e);
            }
            for node in tree.nodes().filter(|n| n.is_stable()) {
                assert_relative_eq!(node.p().m(), node.pole_mass(), epsilon = 1e-5);
                assert_relative_eq!(node.p_smeared().m(), node.pole_mass(), epsilon = 1e-4);
            }
        }
        assert!(generator.failure_counts().is_empty());
    }

    #[test]
    fn invisible_particles_are_not_reconstructed() {
        let mut tree = b_to_kstar_mumu(0.0473);
        let mu = tree.find("mum_0").unwrap();
        tree.node_mut(mu).set_invisible(true);
        let mut generator = DecayGenerator::new(tree, &config()).unwrap();
        with_lhcb_kinematics(&mut generator);
        for _ in 0..50 {
            assert!(generator.generate(true));
            assert_eq!(*generator.node(mu).p_smeared(), FourMomentum::ZERO);
            assert!(generator.node(mu).p().e > 0.);
            let root = generator.node(NodeId(0));
            assert!(root.p_smeared().e < root.p().e);
        }
    }

    #[test]
    fn narrow_resonances_keep_their_pole_mass() {
        let mut generator = DecayGenerator::new(b_to_kstar_mumu(1e-4), &config()).unwrap();
        assert!(generator.lineshapes().is_empty());
        for _ in 0..100 {
            assert!(generator.generate(true));
            assert_eq!(generator.node(NodeId(1)).mass(), 0.89555);
        }

        let mut generator = DecayGenerator::new(b_to_kstar_mumu(0.0473), &config()).unwrap();
        assert!(generator.lineshapes().contains(313));
        let mut masses = Vec::new();
        for _ in 0..1000 {
            assert!(generator.generate(true));
            let kst = generator.node(NodeId(1));
            assert_relative_eq!(kst.p().m(), kst.mass(), epsilon = 1e-6);
            masses.push(kst.mass());
        }
        assert!(masses.iter().all(|m| *m > KAON + PION));
        let near_pole = masses
            .iter()
            .filter(|m| (**m - 0.89555).abs() < 2. * 0.0473)
            .count();
        assert!(near_pole > 600);
        assert!(near_pole < 1000);
    }

    #[test]
    fn forbidden_decays_fail_cleanly() {
        // D -> (R -> pi pi) K where a heavy R cannot be produced
        let mut tree = DecayTree::new();
        let d = tree.add_root(species(421, "D0", 1.0), "D0").unwrap();
        let r = Species {
            width: 0.3,
            lineshape: Some(LineshapeKind::RelativisticBreitWigner),
            ..species(9000221, "R", 0.75)
        };
        let r = tree.add_daughter(d, r, "R").unwrap();
        tree.add_daughter(d, species(-321, "K-", KAON), "Km").unwrap();
        tree.add_daughter(r, species(211, "pi+", PION), "pip").unwrap();
        tree.add_daughter(r, species(-211, "pi-", PION), "pim").unwrap();

        let mut generator = DecayGenerator::new(tree, &config()).unwrap();
        let (mut passed, mut failed) = (0, 0);
        for _ in 0..300 {
            let ok = generator.generate(true);
            let tree = generator.tree();
            let allowed = tree.node(d).mass() > tree.daughter_mass_sum(d);
            assert_eq!(ok, allowed);
            if ok {
                passed += 1;
                let sum: FourMomentum = tree.daughters(d).map(|n| *n.p()).sum();
                assert_close(tree.node(d).p(), &sum, 1e-9);
            } else {
                failed += 1;
            }
        }
        assert!(passed > 0);
        assert!(failed > 0);
        assert_eq!(
            generator.failure_counts().get(&FailureKind::KinematicallyForbidden),
            Some(&failed)
        );
    }

    #[test]
    fn accept_reject_reproduces_target() {
        let mut tree = DecayTree::new();
        let b = tree.add_root(species(511, "B0", 5.27966), "B0").unwrap();
        tree.add_daughter(b, species(321, "K+", KAON), "Kp").unwrap();
        tree.add_daughter(b, species(-211, "pi-", PION), "pim").unwrap();

        let mut generator = DecayGenerator::new(tree, &config()).unwrap();
        let pt = Hist1D::from_contents(0., 10., &[1.; 5]).unwrap();
        let eta = Hist1D::from_contents(2., 5., &[1.]).unwrap();
        generator.set_parent_kinematics(pt, eta).unwrap();

        let target = Hist1D::from_contents(0., 10., &[1., 2., 3., 4., 5.]).unwrap();
        let param = KinematicParam::new(ParamKind::PT, vec![NodeId(0)]);
        assert!(generator.set_accept_reject(target.clone(), param.clone()).unwrap());
        assert!(!generator.set_accept_reject(target, param).unwrap());
        generator.set_max_attempts(1);

        let mut accepted = Hist1D::new(5, 0., 10.).unwrap();
        for _ in 0..20_000 {
            if generator.generate(true) {
                accepted.fill(generator.node(NodeId(0)).p().pt());
            }
        }
        assert!(generator.failure_counts()[&FailureKind::AcceptRejectExhausted] > 0);
        // interior bins are not affected by the flat interpolation at the edges
        let reference = accepted.bin_content(2);
        assert_relative_eq!(accepted.bin_content(3) / reference, 1.5, max_relative = 0.1);
        assert_relative_eq!(accepted.bin_content(4) / reference, 2., max_relative = 0.1);
        assert!(accepted.bin_content(1) < reference);
        assert!(accepted.bin_content(5) > accepted.bin_content(4));
    }

    #[derive(Debug, Default)]
    struct AlongZ {
        calls: usize,
    }

    impl ExternalDecayer for AlongZ {
        fn decay(
            &mut self,
            event: &mut DecayKinematics<'_>,
            _rng: &mut dyn RngCore,
        ) -> Result<bool, Error> {
            self.calls += 1;
            if self.calls % 2 == 0 {
                return Ok(false);
            }
            let tree = event.tree();
            let parent = *tree.node(NodeId(0)).p();
            let masses: Vec<_> = tree.daughters(NodeId(0)).map(|d| d.mass()).collect();
            let (m, m1, m2) = (parent.m(), masses[0], masses[1]);
            let q = crate::lineshape::breakup_momentum(m, m1, m2);
            let boost = parent.boost_vector();
            let p1 = FourMomentum::from_xyz_m(0., 0., q, m1).boosted(&boost);
            let p2 = FourMomentum::from_xyz_m(0., 0., -q, m2).boosted(&boost);
            event.set_p(NodeId(1), p1);
            event.set_p(NodeId(2), p2);
            Ok(true)
        }
    }

    #[derive(Debug)]
    struct Broken;

    impl ExternalDecayer for Broken {
        fn decay(
            &mut self,
            _event: &mut DecayKinematics<'_>,
            _rng: &mut dyn RngCore,
        ) -> Result<bool, Error> {
            Err(Error::External("model not initialised".to_owned()))
        }
    }

    fn two_body() -> DecayTree {
        let mut tree = DecayTree::new();
        let b = tree.add_root(species(511, "B0", 5.27966), "B0").unwrap();
        tree.add_daughter(b, species(321, "K+", KAON), "Kp").unwrap();
        tree.add_daughter(b, species(-211, "pi-", PION), "pim").unwrap();
        tree
    }

    #[test]
    fn external_decayer_with_fallback() {
        let mut generator = DecayGenerator::new(two_body(), &config()).unwrap();
        generator.set_external_generator(Box::new(AlongZ::default()));
        let mut along_z = 0;
        for n in 0..100 {
            assert!(generator.generate(true));
            let kaon = generator.node(NodeId(1)).p();
            if kaon.pt() < 1e-9 {
                along_z += 1;
            } else {
                assert_eq!(n % 2, 1);
            }
            let sum = *kaon + *generator.node(NodeId(2)).p();
            assert_close(generator.node(NodeId(0)).p(), &sum, 1e-9);
        }
        assert!(along_z >= 50);

        generator.set_external_generator(Box::new(Broken));
        assert!(!generator.generate(true));
        assert_eq!(generator.failure_counts()[&FailureKind::External], 1);
    }

    #[test]
    fn redecay_keeps_parent() {
        let mut generator = DecayGenerator::new(b_to_kstar_mumu(0.0473), &config()).unwrap();
        with_lhcb_kinematics(&mut generator);
        assert!(generator.generate(true));
        let parent = *generator.node(NodeId(0)).p();
        let primary = *generator.primary_vertex();
        let kaon = *generator.node(NodeId(4)).p();
        for _ in 0..10 {
            assert!(generator.generate(false));
            assert_eq!(*generator.node(NodeId(0)).p(), parent);
            assert_eq!(*generator.primary_vertex(), primary);
        }
        assert_ne!(*generator.node(NodeId(4)).p(), kaon);
        assert!(generator.generate(true));
        assert_ne!(*generator.node(NodeId(0)).p(), parent);
    }

    #[test]
    fn vertices_and_impact_parameters() {
        let mut tree = b_to_kstar_mumu(0.0473);
        for id in tree.ids().skip(2) {
            tree.node_mut(id).set_ip_smear(Some(IpSmearGauss::new(0.011, 0.023)));
        }
        let config = GeneratorConfig {
            beam: BeamConditions {
                pileup: 2.,
                sigma_xy: 0.03,
                sigma_z: 45.,
            },
            ..config()
        };
        let mut generator = DecayGenerator::new(tree, &config).unwrap();
        with_lhcb_kinematics(&mut generator);
        generator.set_pv_ntracks(Hist1D::from_contents(10., 60., &[1.; 5]).unwrap());

        let n = 2000;
        let mut proper_distance = 0.;
        let mut with_pileup = 0;
        for _ in 0..n {
            assert!(generator.generate(true));
            let b = generator.node(NodeId(0));
            assert_eq!(b.origin_vertex(), &generator.primary_vertex().vertex);
            assert_eq!(b.ip().truth, 0.);
            let flight = b.decay_vertex().truth - b.origin_vertex().truth;
            assert!(flight.cross(&b.p().vect()).norm() <= 1e-9 * flight.norm() * b.p().p());
            proper_distance += b.flight_distance() / b.p().gamma();

            for &d in b.daughters() {
                assert_eq!(generator.node(d).origin_vertex(), b.decay_vertex());
            }
            let kaon = generator.node(NodeId(4));
            // the K*0 decays at the B vertex
            assert_eq!(kaon.origin_vertex(), b.decay_vertex());
            assert!(kaon.ip().smeared >= 0.);
            assert_relative_eq!(kaon.ip().sigma, 0.011 + 0.023 / kaon.p_smeared().pt());

            let has_pileup = !generator.pileup_vertices().is_empty();
            assert_eq!(kaon.min_pileup_ip().is_some(), has_pileup);
            if has_pileup {
                with_pileup += 1;
            }
        }
        assert_relative_eq!(proper_distance / n as f64, 0.4557, max_relative = 0.1);
        assert!(with_pileup > n / 2);
    }

    #[test]
    fn corrected_mass_is_refused_as_accept_reject_parameter() {
        let mut generator = DecayGenerator::new(two_body(), &config()).unwrap();
        generator.set_denominator_samples(100);
        let target = Hist1D::from_contents(0., 10., &[1.; 5]).unwrap();
        let mcorr = KinematicParam::new(ParamKind::MCorr, vec![NodeId(1), NodeId(2)]);
        assert!(matches!(
            generator.set_accept_reject(target.clone(), mcorr.clone()),
            Err(Error::Config(_))
        ));
        let axis = Axis::new(2, 0., 10.).unwrap();
        let target_2d = Hist2D::from_contents(axis.clone(), axis, &[1.; 4]).unwrap();
        let mass = KinematicParam::new(ParamKind::M, vec![NodeId(1), NodeId(2)]);
        assert!(generator.set_accept_reject_2d(target_2d, mass.clone(), mcorr).is_err());
        assert!(generator.accept_reject().is_none());

        assert!(generator.set_accept_reject(target, mass).unwrap());
    }

    #[test]
    fn accept_reject_in_two_parameters() {
        let mut generator = DecayGenerator::new(two_body(), &config()).unwrap();
        let pt = Hist1D::from_contents(0., 10., &[1.; 4]).unwrap();
        let eta = Hist1D::from_contents(2., 5., &[1.; 3]).unwrap();
        generator.set_parent_kinematics(pt, eta).unwrap();
        generator.set_denominator_samples(60_000);

        // three times as many events at high pT, flat in eta
        let target = Hist2D::from_contents(
            Axis::new(2, 0., 10.).unwrap(),
            Axis::new(3, 2., 5.).unwrap(),
            &[1., 3., 1., 3., 1., 3.],
        )
        .unwrap();
        let pt = KinematicParam::new(ParamKind::PT, vec![NodeId(0)]);
        let eta = KinematicParam::new(ParamKind::Eta, vec![NodeId(0)]);
        assert!(generator.set_accept_reject_2d(target, pt, eta).unwrap());
        generator.set_max_attempts(1);

        let mut accepted_pt = Hist1D::new(4, 0., 10.).unwrap();
        let mut accepted_eta = Hist1D::new(2, 2., 5.).unwrap();
        for _ in 0..40_000 {
            if generator.generate(true) {
                let parent = generator.node(NodeId(0)).p();
                accepted_pt.fill(parent.pt());
                accepted_eta.fill(parent.eta());
            }
        }
        assert!(generator.failure_counts()[&FailureKind::AcceptRejectExhausted] > 0);
        // below and above the outer bin centres the weights are flat
        let ratio = accepted_pt.bin_content(4) / accepted_pt.bin_content(1);
        assert_relative_eq!(ratio, 3., max_relative = 0.1);
        let ratio = accepted_eta.bin_content(2) / accepted_eta.bin_content(1);
        assert_relative_eq!(ratio, 1., max_relative = 0.1);
    }

    #[test]
    fn long_lived_final_state_particles_fly() {
        let mut tree = DecayTree::new();
        let b = tree.add_root(species(511, "B0", 5.27966), "B0").unwrap();
        let kaon = Species {
            ctau: 3712.,
            ..species(321, "K+", KAON)
        };
        let k = tree.add_daughter(b, kaon, "Kp").unwrap();
        let pi = tree.add_daughter(b, species(-211, "pi-", PION), "pim").unwrap();
        let mut generator = DecayGenerator::new(tree, &config()).unwrap();
        with_lhcb_kinematics(&mut generator);

        for _ in 0..100 {
            assert!(generator.generate(true));
            let kaon = generator.node(k);
            assert!(kaon.is_stable());
            assert!(kaon.flight_distance() > 0.);
            let flight = kaon.decay_vertex().truth - kaon.origin_vertex().truth;
            let p = kaon.p().vect();
            assert!(flight.cross(&p).norm() <= 1e-9 * flight.norm() * p.norm());
            assert!(flight.dot(&p) > 0.);

            let pion = generator.node(pi);
            assert_eq!(pion.decay_vertex(), pion.origin_vertex());
        }
    }

    #[test]
    fn closest_pileup_vertex_wins() {
        let mut generator = DecayGenerator::new(two_body(), &config()).unwrap();
        with_lhcb_kinematics(&mut generator);
        assert!(generator.generate(true));

        let kaon = generator.node(NodeId(1));
        let origin = *kaon.origin_vertex();
        let p = kaon.p_smeared().vect();
        let along = p.normalize();
        let across = along.cross(&ThreeVector::x()).normalize();
        let at = |position: ThreeVector| CollisionVertex {
            vertex: Vertex::at(position),
            ntracks: 30,
        };
        let far = at(origin.smeared + 5. * along + 2. * across);
        let first = at(origin.smeared + 3. * along + across);
        // same reconstructed position as `first`, different true one
        let second = CollisionVertex {
            vertex: Vertex {
                truth: first.vertex.truth + ThreeVector::new(0.5, 0., 0.),
                smeared: first.vertex.smeared,
            },
            ntracks: 30,
        };
        let truth_ip = |v: &CollisionVertex| {
            get_particle_ip(&v.vertex.truth, &origin.truth, &generator.node(NodeId(1)).p().vect())
        };
        let (first_ip, second_ip) = (truth_ip(&first), truth_ip(&second));
        assert_ne!(first_ip, second_ip);

        generator.pileup = vec![far, first, second];
        generator.calc_ips();
        let min = *generator.node(NodeId(1)).min_pileup_ip().unwrap();
        assert_relative_eq!(min.smeared, 1., epsilon = 1e-9);
        assert_eq!(min.truth, first_ip);

        generator.pileup = vec![second, first, far];
        generator.calc_ips();
        let min = *generator.node(NodeId(1)).min_pileup_ip().unwrap();
        assert_eq!(min.truth, second_ip);

        generator.pileup.clear();
        generator.calc_ips();
        assert!(generator.node(NodeId(1)).min_pileup_ip().is_none());
    }

    #[test]
    fn alternative_mass_hypotheses() {
        let mut tree = two_body();
        tree.node_mut(NodeId(1)).add_mass_hypothesis("pip", PION);
        tree.node_mut(NodeId(2)).add_mass_hypothesis("Kp", KAON);
        tree.node_mut(NodeId(2)).set_invisible(true);
        let mut generator = DecayGenerator::new(tree, &config()).unwrap();
        with_lhcb_kinematics(&mut generator);

        for _ in 0..20 {
            assert!(generator.generate(true));
            let kaon = generator.node(NodeId(1));
            let as_pion = kaon.mass_hypothesis("pip").unwrap();
            assert_eq!(as_pion.p.vect(), kaon.p_smeared().vect());
            assert_relative_eq!(as_pion.p.m(), PION, epsilon = 1e-6);
            assert!(as_pion.p.e < kaon.p_smeared().e);
            let invisible = generator.node(NodeId(2));
            assert_eq!(invisible.mass_hypotheses()[0].p, FourMomentum::ZERO);
        }
        assert!(generator.node(NodeId(1)).mass_hypothesis("mup").is_none());
    }
}
