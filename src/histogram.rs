//! Binned distributions and resolution curves
//!
//! Bin indices follow the usual convention: bin `0` is the underflow,
//! bins `1..=nbins` cover the axis range and bin `nbins + 1` is the
//! overflow.
use rand::Rng;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A uniformly binned axis
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    nbins: usize,
    min: f64,
    max: f64,
}

impl Axis {
    pub fn new(nbins: usize, min: f64, max: f64) -> Result<Self, Error> {
        if nbins == 0 {
            return Err(Error::Histogram("axis needs at least one bin".to_owned()));
        }
        if !(min < max) {
            return Err(Error::Histogram(format!(
                "axis range [{min}, {max}] is empty"
            )));
        }
        Ok(Axis { nbins, min, max })
    }

    pub fn nbins(&self) -> usize {
        self.nbins
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn bin_width(&self) -> f64 {
        (self.max - self.min) / self.nbins as f64
    }

    /// Bin containing `x`, including under- and overflow
    pub fn find_bin(&self, x: f64) -> usize {
        if x.is_nan() || x < self.min {
            0
        } else if x >= self.max {
            self.nbins + 1
        } else {
            let bin = ((x - self.min) / self.bin_width()) as usize + 1;
            bin.min(self.nbins)
        }
    }

    pub fn bin_center(&self, bin: usize) -> f64 {
        self.min + (bin as f64 - 0.5) * self.bin_width()
    }

    pub fn bin_low_edge(&self, bin: usize) -> f64 {
        self.min + (bin as f64 - 1.) * self.bin_width()
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.min && x < self.max
    }

    /// Neighbouring bins and the linear weight of the upper one for `x`
    /// inside the axis range. Half-bins at the edges are flat.
    fn interpolation_bins(&self, x: f64) -> (usize, usize, f64) {
        let first = self.bin_center(1);
        let last = self.bin_center(self.nbins);
        if x <= first {
            return (1, 1, 0.);
        }
        if x >= last {
            return (self.nbins, self.nbins, 0.);
        }
        let bin = self.find_bin(x);
        let (lo, hi) = if x < self.bin_center(bin) {
            (bin - 1, bin)
        } else {
            (bin, bin + 1)
        };
        let w = (x - self.bin_center(lo)) / self.bin_width();
        (lo, hi, w)
    }

    fn clamp_inside(&self, x: f64) -> f64 {
        const EDGE_OFFSET: f64 = 1e-5;
        if x < self.min {
            self.min + EDGE_OFFSET
        } else if x >= self.max {
            self.max - EDGE_OFFSET
        } else {
            x
        }
    }
}

/// One-dimensional histogram
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Hist1D {
    axis: Axis,
    contents: Vec<f64>,
}

impl Hist1D {
    pub fn new(nbins: usize, min: f64, max: f64) -> Result<Self, Error> {
        let axis = Axis::new(nbins, min, max)?;
        Ok(Hist1D { contents: vec![0.; nbins + 2], axis })
    }

    /// Histogram with the given in-range bin contents
    pub fn from_contents(min: f64, max: f64, contents: &[f64]) -> Result<Self, Error> {
        let mut hist = Self::new(contents.len(), min, max)?;
        hist.contents[1..=contents.len()].copy_from_slice(contents);
        Ok(hist)
    }

    pub fn axis(&self) -> &Axis {
        &self.axis
    }

    pub fn nbins(&self) -> usize {
        self.axis.nbins
    }

    pub fn fill(&mut self, x: f64) {
        self.fill_weighted(x, 1.)
    }

    pub fn fill_weighted(&mut self, x: f64, weight: f64) {
        let bin = self.axis.find_bin(x);
        self.contents[bin] += weight;
    }

    pub fn bin_content(&self, bin: usize) -> f64 {
        self.contents.get(bin).copied().unwrap_or(0.)
    }

    /// Largest in-range bin content
    pub fn maximum(&self) -> f64 {
        self.in_range().iter().copied().fold(f64::MIN, f64::max)
    }

    /// Sum of in-range bin contents
    pub fn integral(&self) -> f64 {
        self.in_range().iter().sum()
    }

    fn in_range(&self) -> &[f64] {
        &self.contents[1..=self.axis.nbins]
    }

    /// Bin-by-bin division; bins with empty denominator become zero
    pub fn divide(&mut self, denominator: &Hist1D) -> Result<(), Error> {
        if self.axis != denominator.axis {
            return Err(Error::Histogram(
                "cannot divide histograms with different binning".to_owned(),
            ));
        }
        for (num, den) in self.contents.iter_mut().zip(&denominator.contents) {
            *num = if *den == 0. { 0. } else { *num / den };
        }
        Ok(())
    }

    /// Linear interpolation between bin centres, zero outside the axis range
    pub fn interpolate(&self, x: f64) -> f64 {
        if !self.axis.contains(x) {
            return 0.;
        }
        let (lo, hi, w) = self.axis.interpolation_bins(x);
        (1. - w) * self.contents[lo] + w * self.contents[hi]
    }

    /// Draw a value distributed according to the in-range bin contents
    ///
    /// Returns `None` if the histogram has no positive content.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<f64> {
        let bin = sample_index(self.in_range(), rng)? + 1;
        let offset: f64 = rng.gen();
        Some(self.axis.bin_low_edge(bin) + offset * self.axis.bin_width())
    }
}

/// Two-dimensional histogram, x varies fastest in the content layout
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Hist2D {
    x: Axis,
    y: Axis,
    contents: Vec<f64>,
}

impl Hist2D {
    pub fn new(
        nx: usize,
        xmin: f64,
        xmax: f64,
        ny: usize,
        ymin: f64,
        ymax: f64,
    ) -> Result<Self, Error> {
        let x = Axis::new(nx, xmin, xmax)?;
        let y = Axis::new(ny, ymin, ymax)?;
        Ok(Hist2D { contents: vec![0.; (nx + 2) * (ny + 2)], x, y })
    }

    /// Histogram with the given in-range contents, x varying fastest
    pub fn from_contents(x: Axis, y: Axis, contents: &[f64]) -> Result<Self, Error> {
        if contents.len() != x.nbins * y.nbins {
            return Err(Error::Histogram(format!(
                "expected {} bin contents, got {}",
                x.nbins * y.nbins,
                contents.len()
            )));
        }
        let mut hist = Hist2D {
            contents: vec![0.; (x.nbins + 2) * (y.nbins + 2)],
            x,
            y,
        };
        for (n, value) in contents.iter().enumerate() {
            let ix = n % hist.x.nbins + 1;
            let iy = n / hist.x.nbins + 1;
            let idx = hist.index(ix, iy);
            hist.contents[idx] = *value;
        }
        Ok(hist)
    }

    pub fn x_axis(&self) -> &Axis {
        &self.x
    }

    pub fn y_axis(&self) -> &Axis {
        &self.y
    }

    fn index(&self, ix: usize, iy: usize) -> usize {
        ix + (self.x.nbins + 2) * iy
    }

    pub fn fill(&mut self, x: f64, y: f64) {
        self.fill_weighted(x, y, 1.)
    }

    pub fn fill_weighted(&mut self, x: f64, y: f64, weight: f64) {
        let idx = self.index(self.x.find_bin(x), self.y.find_bin(y));
        self.contents[idx] += weight;
    }

    pub fn bin_content(&self, ix: usize, iy: usize) -> f64 {
        if ix > self.x.nbins + 1 || iy > self.y.nbins + 1 {
            return 0.;
        }
        self.contents[self.index(ix, iy)]
    }

    fn in_range(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (1..=self.y.nbins).flat_map(move |iy| (1..=self.x.nbins).map(move |ix| (ix, iy)))
    }

    pub fn maximum(&self) -> f64 {
        self.in_range()
            .map(|(ix, iy)| self.bin_content(ix, iy))
            .fold(f64::MIN, f64::max)
    }

    pub fn integral(&self) -> f64 {
        self.in_range().map(|(ix, iy)| self.bin_content(ix, iy)).sum()
    }

    pub fn divide(&mut self, denominator: &Hist2D) -> Result<(), Error> {
        if self.x != denominator.x || self.y != denominator.y {
            return Err(Error::Histogram(
                "cannot divide histograms with different binning".to_owned(),
            ));
        }
        for (num, den) in self.contents.iter_mut().zip(&denominator.contents) {
            *num = if *den == 0. { 0. } else { *num / den };
        }
        Ok(())
    }

    /// Bilinear interpolation between bin centres, zero outside the range
    pub fn interpolate(&self, x: f64, y: f64) -> f64 {
        if !self.x.contains(x) || !self.y.contains(y) {
            return 0.;
        }
        let (x0, x1, wx) = self.x.interpolation_bins(x);
        let (y0, y1, wy) = self.y.interpolation_bins(y);
        (1. - wx) * (1. - wy) * self.bin_content(x0, y0)
            + wx * (1. - wy) * self.bin_content(x1, y0)
            + (1. - wx) * wy * self.bin_content(x0, y1)
            + wx * wy * self.bin_content(x1, y1)
    }

    /// Draw a point distributed according to the in-range bin contents
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<(f64, f64)> {
        let weights: Vec<f64> = self
            .in_range()
            .map(|(ix, iy)| self.bin_content(ix, iy))
            .collect();
        let n = sample_index(&weights, rng)?;
        let ix = n % self.x.nbins + 1;
        let iy = n / self.x.nbins + 1;
        let (ux, uy): (f64, f64) = (rng.gen(), rng.gen());
        Some((
            self.x.bin_low_edge(ix) + ux * self.x.bin_width(),
            self.y.bin_low_edge(iy) + uy * self.y.bin_width(),
        ))
    }
}

/// Pick an index with probability proportional to its (positive) weight
fn sample_index<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Option<usize> {
    let total: f64 = weights.iter().filter(|w| **w > 0.).sum();
    if !(total > 0.) {
        return None;
    }
    let target = rng.gen::<f64>() * total;
    let mut cumulative = 0.;
    let mut last_positive = None;
    for (n, w) in weights.iter().enumerate() {
        if *w <= 0. {
            continue;
        }
        cumulative += w;
        last_positive = Some(n);
        if target < cumulative {
            return Some(n);
        }
    }
    last_positive
}

/// Piecewise-linear curve through a set of points
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    points: Vec<(f64, f64)>,
}

impl Graph {
    pub fn new(mut points: Vec<(f64, f64)>) -> Result<Self, Error> {
        if points.is_empty() {
            return Err(Error::Histogram("graph without points".to_owned()));
        }
        if points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(Error::Histogram("graph with non-finite points".to_owned()));
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Graph { points })
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Value at `x`; constant beyond the first and last point
    pub fn eval(&self, x: f64) -> f64 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];
        if x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }
        let upper = self.points.partition_point(|(px, _)| *px <= x);
        let (x0, y0) = self.points[upper - 1];
        let (x1, y1) = self.points[upper];
        if x1 == x0 {
            return y0;
        }
        y0 + (y1 - y0) * (x - x0) / (x1 - x0)
    }
}

/// 2D resolution map whose lookups are clamped into its domain
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Profile2D {
    hist: Hist2D,
}

impl Profile2D {
    pub fn new(hist: Hist2D) -> Self {
        Profile2D { hist }
    }

    pub fn hist(&self) -> &Hist2D {
        &self.hist
    }

    pub fn eval(&self, x: f64, y: f64) -> f64 {
        let x = self.hist.x.clamp_inside(x);
        let y = self.hist.y.clamp_inside(y);
        self.hist.interpolate(x, y)
    }
}

impl From<Hist2D> for Profile2D {
    fn from(hist: Hist2D) -> Self {
        Profile2D::new(hist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn find_bin_and_overflow() {
        let mut h = Hist1D::new(4, 0., 4.).unwrap();
        h.fill(-1.);
        h.fill(0.5);
        h.fill(3.99);
        h.fill(4.);
        assert_eq!(h.bin_content(0), 1.);
        assert_eq!(h.bin_content(1), 1.);
        assert_eq!(h.bin_content(4), 1.);
        assert_eq!(h.bin_content(5), 1.);
        assert_eq!(h.integral(), 2.);
    }

    #[test]
    fn interpolate_1d() {
        let h = Hist1D::from_contents(0., 3., &[1., 3., 5.]).unwrap();
        assert_relative_eq!(h.interpolate(0.2), 1.);
        assert_relative_eq!(h.interpolate(1.0), 2.);
        assert_relative_eq!(h.interpolate(2.0), 4.);
        assert_relative_eq!(h.interpolate(2.9), 5.);
        assert_eq!(h.interpolate(-0.1), 0.);
        assert_eq!(h.interpolate(3.0), 0.);
    }

    #[test]
    fn divide_with_empty_bins() {
        let mut num = Hist1D::from_contents(0., 2., &[4., 6.]).unwrap();
        let den = Hist1D::from_contents(0., 2., &[2., 0.]).unwrap();
        num.divide(&den).unwrap();
        assert_eq!(num.bin_content(1), 2.);
        assert_eq!(num.bin_content(2), 0.);
        let other = Hist1D::new(3, 0., 2.).unwrap();
        assert!(num.divide(&other).is_err());
    }

    #[test]
    fn sample_stays_in_filled_bins() {
        let h = Hist1D::from_contents(0., 4., &[0., 1., 0., 3.]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut upper = 0;
        for _ in 0..4000 {
            let x = h.sample(&mut rng).unwrap();
            assert!((1. ..2.).contains(&x) || (3. ..4.).contains(&x));
            if x >= 3. {
                upper += 1;
            }
        }
        let frac = upper as f64 / 4000.;
        assert!((frac - 0.75).abs() < 0.03);
        assert!(Hist1D::new(3, 0., 1.).unwrap().sample(&mut rng).is_none());
    }

    #[test]
    fn hist2d_layout_and_interpolation() {
        let x = Axis::new(2, 0., 2.).unwrap();
        let y = Axis::new(2, 0., 2.).unwrap();
        let h = Hist2D::from_contents(x, y, &[1., 2., 3., 4.]).unwrap();
        assert_eq!(h.bin_content(2, 1), 2.);
        assert_eq!(h.bin_content(1, 2), 3.);
        assert_eq!(h.maximum(), 4.);
        assert_relative_eq!(h.interpolate(1., 1.), 2.5);
        assert_eq!(h.interpolate(2.5, 1.), 0.);
    }

    #[test]
    fn profile_clamps() {
        let x = Axis::new(2, 0., 2.).unwrap();
        let y = Axis::new(1, 0., 1.).unwrap();
        let p = Profile2D::new(Hist2D::from_contents(x, y, &[1., 5.]).unwrap());
        assert_relative_eq!(p.eval(100., 0.5), 5.);
        assert_relative_eq!(p.eval(-100., -3.), 1.);
        // upper edges belong to the domain
        assert_relative_eq!(p.eval(2., 0.5), 5.);
        assert_relative_eq!(p.eval(1.5, 1.), p.eval(1.5, 0.5));
    }

    #[test]
    fn graph_eval() {
        let g = Graph::new(vec![(2., 20.), (0., 0.), (1., 10.)]).unwrap();
        assert_relative_eq!(g.eval(0.5), 5.);
        assert_relative_eq!(g.eval(1.5), 15.);
        assert_relative_eq!(g.eval(-1.), 0.);
        assert_relative_eq!(g.eval(7.), 20.);
    }
}
