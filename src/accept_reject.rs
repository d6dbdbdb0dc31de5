//! Re-weighting of generated decays towards a target distribution
//!
//! The target histogram is divided once by the distribution the generator
//! produces without any re-weighting. Events are then kept with a
//! probability proportional to the resulting ratio.
use rand::Rng;

use crate::error::Error;
use crate::histogram::{Hist1D, Hist2D};
use crate::param::KinematicParam;
use crate::particle::DecayTree;

#[derive(Debug, Clone)]
enum Target {
    OneD {
        hist: Hist1D,
        denominator: Hist1D,
        param: KinematicParam,
    },
    TwoD {
        hist: Hist2D,
        denominator: Hist2D,
        x: KinematicParam,
        y: KinematicParam,
    },
}

#[derive(Debug, Clone)]
pub struct AcceptReject {
    target: Target,
    max: f64,
    normalised: bool,
}

impl AcceptReject {
    /// Target distribution in one parameter
    ///
    /// The parameter is always evaluated on true momenta.
    pub fn new(hist: Hist1D, mut param: KinematicParam) -> Result<Self, Error> {
        param.truth = true;
        let axis = hist.axis();
        let denominator = Hist1D::new(axis.nbins(), axis.min(), axis.max())?;
        Ok(AcceptReject {
            target: Target::OneD { hist, denominator, param },
            max: 0.,
            normalised: false,
        })
    }

    /// Target distribution in two parameters
    pub fn new_2d(
        hist: Hist2D,
        mut x: KinematicParam,
        mut y: KinematicParam,
    ) -> Result<Self, Error> {
        x.truth = true;
        y.truth = true;
        let (xa, ya) = (hist.x_axis(), hist.y_axis());
        let denominator = Hist2D::new(
            xa.nbins(),
            xa.min(),
            xa.max(),
            ya.nbins(),
            ya.min(),
            ya.max(),
        )?;
        Ok(AcceptReject {
            target: Target::TwoD { hist, denominator, x, y },
            max: 0.,
            normalised: false,
        })
    }

    /// Whether the target has already been divided by its denominator
    pub fn is_normalised(&self) -> bool {
        self.normalised
    }

    /// Record the current event of `tree` in the denominator
    pub fn fill_denominator<R: Rng + ?Sized>(&mut self, tree: &DecayTree, rng: &mut R) {
        match &mut self.target {
            Target::OneD { denominator, param, .. } => {
                denominator.fill(param.eval(tree, rng));
            }
            Target::TwoD { denominator, x, y, .. } => {
                let (vx, vy) = (x.eval(tree, rng), y.eval(tree, rng));
                denominator.fill(vx, vy);
            }
        }
    }

    /// Divide the target by the accumulated denominator
    ///
    /// This can only happen once; later calls are refused.
    pub fn normalise(&mut self) -> Result<(), Error> {
        if self.normalised {
            return Err(Error::Config(
                "accept/reject target has already been normalised".to_owned(),
            ));
        }
        self.max = match &mut self.target {
            Target::OneD { hist, denominator, .. } => {
                hist.divide(denominator)?;
                hist.maximum()
            }
            Target::TwoD { hist, denominator, .. } => {
                hist.divide(denominator)?;
                hist.maximum()
            }
        };
        self.normalised = true;
        if !(self.max > 0.) {
            tracing::warn!("Accept/reject weights vanish everywhere, every event will be rejected");
        }
        Ok(())
    }

    /// Largest value of the ratio target/denominator
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Interpolated weight of the current event, zero outside the histogram
    pub fn score<R: Rng + ?Sized>(&self, tree: &DecayTree, rng: &mut R) -> f64 {
        match &self.target {
            Target::OneD { hist, param, .. } => hist.interpolate(param.eval(tree, rng)),
            Target::TwoD { hist, x, y, .. } => {
                let (vx, vy) = (x.eval(tree, rng), y.eval(tree, rng));
                hist.interpolate(vx, vy)
            }
        }
    }

    /// Decide whether to keep the current event
    pub fn accept<R: Rng + ?Sized>(&self, tree: &DecayTree, rng: &mut R) -> bool {
        let score = self.score(tree, rng);
        let threshold = rng.gen::<f64>() * self.max;
        score > threshold
    }

    pub fn params(&self) -> Vec<&KinematicParam> {
        match &self.target {
            Target::OneD { param, .. } => vec![param],
            Target::TwoD { x, y, .. } => vec![x, y],
        }
    }
}
