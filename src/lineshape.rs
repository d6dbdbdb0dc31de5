//! Floating resonance masses
//!
//! The mass distribution of every broad two-body resonance is sampled once
//! at setup. During generation a mass is drawn by picking one of the cached
//! samples at random.
use std::collections::HashMap;
use std::f64::consts::PI;

use rand::Rng;

use crate::error::Error;
use crate::particle::DecayTree;
use crate::species::LineshapeKind;

const WINDOW_WIDTHS: f64 = 100.;
const ENVELOPE_SCAN_POINTS: usize = 2000;
const ENVELOPE_SAFETY: f64 = 1.5;

/// Parameters of a resonance lineshape
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LineshapeParams {
    pub kind: LineshapeKind,
    /// Pole mass
    pub mass: f64,
    /// Width at the pole
    pub width: f64,
    pub spin: u32,
    /// Masses of the two decay products
    pub daughter_masses: [f64; 2],
    /// Blatt-Weisskopf barrier radius in 1/GeV
    pub radius: f64,
}

impl LineshapeParams {
    pub fn threshold(&self) -> f64 {
        self.daughter_masses[0] + self.daughter_masses[1]
    }

    /// Unnormalised probability density at mass `m`
    pub fn density(&self, m: f64) -> f64 {
        match self.kind {
            LineshapeKind::RelativisticBreitWigner => self.breit_wigner(m),
            LineshapeKind::GounarisSakurai => self.gounaris_sakurai(m),
        }
    }

    fn breit_wigner(&self, m: f64) -> f64 {
        let width = self.running_width(m);
        let dm2 = m * m - self.mass * self.mass;
        let denom = dm2 * dm2 + (self.mass * width).powi(2);
        if denom == 0. {
            return 0.;
        }
        width / denom
    }

    /// Mass-dependent width including the Blatt-Weisskopf barrier
    fn running_width(&self, m: f64) -> f64 {
        let [ma, mb] = self.daughter_masses;
        let q = breakup_momentum(m, ma, mb);
        let q0 = breakup_momentum(self.mass, ma, mb);
        if q > 0. && q0 > 0. && m > 0. && self.mass > 0. {
            self.width
                * (q / q0).powi(2 * self.spin as i32 + 1)
                * (self.mass / m)
                * (self.form_factor(q) / self.form_factor(q0))
        } else {
            0.
        }
    }

    /// Square of the Blatt-Weisskopf form factor
    fn form_factor(&self, q: f64) -> f64 {
        let z = q * self.radius;
        match self.spin {
            1 => 1. / (1. + z * z),
            2 => 1. / (9. + 3. * z * z + z.powi(4)),
            _ => 1.,
        }
    }

    fn gounaris_sakurai(&self, m: f64) -> f64 {
        if m < self.threshold() {
            return 0.;
        }
        let arg = m * m - self.mass * self.mass - self.gs_f(m);
        let gamma = self.mass * self.gs_width(m);
        let denom = arg * arg + gamma * gamma;
        if denom == 0. {
            return 0.;
        }
        m * m / denom
    }

    fn gs_width(&self, m: f64) -> f64 {
        let kx = self.gs_k(m);
        let km = self.gs_k(self.mass);
        if km == 0. || m == 0. {
            return 0.;
        }
        let rk = match self.spin {
            1 => (kx / km).powi(3),
            2 => (kx / km).powi(5),
            _ => kx / km,
        };
        self.width * (self.mass / m) * rk
    }

    fn gs_k(&self, x: f64) -> f64 {
        let [ma, mb] = self.daughter_masses;
        if x <= 0. {
            return 0.;
        }
        let sum = 1. - ((ma + mb) / x).powi(2);
        let diff = 1. - ((ma - mb) / x).powi(2);
        if sum <= 0. || diff <= 0. {
            return 0.;
        }
        0.5 * x * sum.sqrt() * diff.sqrt()
    }

    fn gs_h(&self, x: f64) -> f64 {
        if x == 0. {
            return 0.;
        }
        let mpi = 0.5 * self.threshold();
        let k = self.gs_k(x);
        2. * k / (PI * x) * ((x + 2. * k) / (2. * mpi)).ln()
    }

    fn gs_dhds(&self) -> f64 {
        let k = self.gs_k(self.mass);
        if self.mass == 0. || k == 0. {
            return 0.;
        }
        let m2 = self.mass * self.mass;
        self.gs_h(self.mass) * (1. / (8. * k * k) - 1. / (2. * m2)) + 1. / (2. * PI * m2)
    }

    fn gs_f(&self, x: f64) -> f64 {
        let k_m0 = self.gs_k(self.mass);
        if k_m0 == 0. {
            return 0.;
        }
        let k_s = self.gs_k(x);
        let m2 = self.mass * self.mass;
        let f = k_s * k_s * (self.gs_h(x) - self.gs_h(self.mass))
            + (m2 - x * x) * k_m0 * k_m0 * self.gs_dhds();
        f * self.width * m2 / k_m0.powi(3)
    }

    /// Mass window used for sampling
    pub fn window(&self) -> (f64, f64) {
        let lo = (self.mass - WINDOW_WIDTHS * self.width).max(self.threshold());
        let hi = self.mass + WINDOW_WIDTHS * self.width;
        (lo, hi)
    }
}

/// Two-body breakup momentum, zero below threshold
pub fn breakup_momentum(m: f64, ma: f64, mb: f64) -> f64 {
    if m < ma + mb || m <= 0. {
        return 0.;
    }
    let sum2 = (ma + mb) * (ma + mb);
    let diff2 = (ma - mb) * (ma - mb);
    ((m * m - sum2) * (m * m - diff2)).max(0.).sqrt() / (2. * m)
}

/// Cauchy distribution truncated to a window, used as proposal
struct TruncatedCauchy {
    location: f64,
    scale: f64,
    cdf_lo: f64,
    cdf_hi: f64,
}

impl TruncatedCauchy {
    fn new(location: f64, scale: f64, lo: f64, hi: f64) -> Self {
        let cdf = |x: f64| 0.5 + ((x - location) / scale).atan() / PI;
        TruncatedCauchy { location, scale, cdf_lo: cdf(lo), cdf_hi: cdf(hi) }
    }

    /// Unnormalised density
    fn density(&self, x: f64) -> f64 {
        let t = (x - self.location) / self.scale;
        1. / (1. + t * t)
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u = self.cdf_lo + rng.gen::<f64>() * (self.cdf_hi - self.cdf_lo);
        self.location + self.scale * (PI * (u - 0.5)).tan()
    }
}

/// Draw `n` masses with a fixed envelope
///
/// Fails with the offending density ratio as soon as the envelope is
/// exceeded.
fn sample_below<R: Rng + ?Sized>(
    params: &LineshapeParams,
    proposal: &TruncatedCauchy,
    (lo, hi): (f64, f64),
    envelope: f64,
    n: usize,
    rng: &mut R,
) -> Result<Vec<f64>, f64> {
    let mut samples = Vec::with_capacity(n);
    while samples.len() < n {
        let m = proposal.sample(rng);
        if !(lo..=hi).contains(&m) {
            continue;
        }
        let ratio = params.density(m) / proposal.density(m);
        if ratio > envelope {
            return Err(ratio);
        }
        if rng.gen::<f64>() * envelope < ratio {
            samples.push(m);
        }
    }
    Ok(samples)
}

/// Cached mass samples for one resonance
#[derive(Debug, Clone, PartialEq)]
pub struct MassSamples {
    samples: Vec<f64>,
    min: f64,
    max: f64,
}

impl MassSamples {
    /// Draw `n` masses from the lineshape by accept/reject against a
    /// Cauchy proposal
    pub fn generate<R: Rng + ?Sized>(
        params: &LineshapeParams,
        n: usize,
        rng: &mut R,
    ) -> Result<Self, Error> {
        let (lo, hi) = params.window();
        if !(lo < hi) || n == 0 {
            return Err(Error::Config(format!(
                "empty mass window [{lo}, {hi}] for resonance of mass {}",
                params.mass
            )));
        }
        let proposal = TruncatedCauchy::new(params.mass, 0.5 * params.width, lo, hi);
        let mut envelope = (0..=ENVELOPE_SCAN_POINTS)
            .map(|i| lo + (hi - lo) * i as f64 / ENVELOPE_SCAN_POINTS as f64)
            .map(|m| params.density(m) / proposal.density(m))
            .filter(|r| r.is_finite())
            .fold(0., f64::max);
        if !(envelope > 0.) {
            return Err(Error::Config(format!(
                "lineshape of resonance with mass {} vanishes in [{lo}, {hi}]",
                params.mass
            )));
        }
        envelope *= ENVELOPE_SAFETY;

        // samples drawn below a too small envelope are biased, start over
        let samples = loop {
            match sample_below(params, &proposal, (lo, hi), envelope, n, rng) {
                Ok(samples) => break samples,
                Err(ratio) => {
                    tracing::debug!("Lineshape envelope {envelope} exceeded by {ratio}");
                    envelope = ratio * ENVELOPE_SAFETY;
                }
            }
        };
        let (min, max) = samples
            .iter()
            .fold((f64::MAX, f64::MIN), |(min, max), &m| (min.min(m), max.max(m)));
        Ok(MassSamples { samples, min, max })
    }

    /// Pick one of the cached masses
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.samples[rng.gen_range(0..self.samples.len())]
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }
}

/// Settings for building the mass caches
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LineshapeSettings {
    /// Resonances narrower than this are generated at their pole mass
    pub narrow_width: f64,
    pub barrier_radius: f64,
    pub samples: usize,
}

impl Default for LineshapeSettings {
    fn default() -> Self {
        LineshapeSettings {
            narrow_width: 0.001,
            barrier_radius: 3.0,
            samples: 100_000,
        }
    }
}

/// Mass caches of all floated resonances, keyed by absolute species id
#[derive(Debug, Clone, Default)]
pub struct LineshapeTable {
    table: HashMap<i32, MassSamples>,
}

impl LineshapeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build caches for every broad two-body resonance in `tree`
    pub fn build<R: Rng + ?Sized>(
        tree: &DecayTree,
        settings: &LineshapeSettings,
        rng: &mut R,
    ) -> Result<Self, Error> {
        let mut table = HashMap::new();
        for node in tree.nodes() {
            let Some(kind) = node.lineshape() else {
                continue;
            };
            let key = node.id().abs();
            if table.contains_key(&key) {
                continue;
            }
            let daughters = tree.daughter_ids(node.index());
            if daughters.len() != 2 {
                continue;
            }
            if node.width() < settings.narrow_width {
                tracing::info!(
                    "Resonance {} is narrow ({} GeV) and will be generated with a fixed mass",
                    node.name(),
                    node.width()
                );
                continue;
            }
            let params = LineshapeParams {
                kind,
                mass: node.pole_mass(),
                width: node.width(),
                spin: node.spin().round().max(0.) as u32,
                daughter_masses: [
                    tree.node(daughters[0]).pole_mass(),
                    tree.node(daughters[1]).pole_mass(),
                ],
                radius: settings.barrier_radius,
            };
            let samples = MassSamples::generate(&params, settings.samples, rng)?;
            tracing::info!(
                "Built mass cache for {} with {} samples in [{}, {}]",
                node.name(),
                samples.len(),
                samples.min(),
                samples.max()
            );
            table.insert(key, samples);
        }
        Ok(LineshapeTable { table })
    }

    pub fn insert(&mut self, id: i32, samples: MassSamples) {
        self.table.insert(id.abs(), samples);
    }

    pub fn get(&self, id: i32) -> Option<&MassSamples> {
        self.table.get(&id.abs())
    }

    pub fn contains(&self, id: i32) -> bool {
        self.table.contains_key(&id.abs())
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
