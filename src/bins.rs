//! Axis definitions and position-to-bin lookup.
//!
//! A [`BinnedLink`] maps a global position into a local frame, projects it onto
//! one [`BinningValue`] and looks the result up on an [`Axis`]. The returned
//! index is always a valid bin: underflow lands in the first bin and overflow
//! in the last one, so callers can index their per-bin tables directly.

use std::f64::consts::PI;
use std::fmt;

use nalgebra::{Isometry3, Point3};
use serde::{Deserialize, Serialize};

use crate::error::{invalid, Result};

#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn equidistant_lookup_is_one_indexed() {
        let axis = Axis::equidistant(0.0, 10.0, 5).unwrap();
        assert_eq!(axis.n_bins(), 5);
        assert_eq!(axis.bin(-0.1), 0);
        assert_eq!(axis.bin(0.0), 1);
        assert_eq!(axis.bin(3.0), 2);
        assert_eq!(axis.bin(9.999), 5);
        assert_eq!(axis.bin(10.0), 6);
        assert_eq!(axis.bin(f64::NAN), 0);
    }

    #[test]
    fn variable_lookup_uses_edges() {
        let axis = Axis::variable(vec![0.0, 1.0, 5.0, 20.0]).unwrap();
        assert_eq!(axis.n_bins(), 3);
        assert_eq!(axis.bin(-1.0), 0);
        assert_eq!(axis.bin(0.5), 1);
        assert_eq!(axis.bin(1.0), 2);
        assert_eq!(axis.bin(19.0), 3);
        assert_eq!(axis.bin(20.0), 4);
        assert_eq!(axis.edges(), vec![0.0, 1.0, 5.0, 20.0]);
    }

    #[test]
    fn invalid_axes_are_rejected() {
        assert!(Axis::equidistant(1.0, 1.0, 3).is_err());
        assert!(Axis::equidistant(0.0, 1.0, 0).is_err());
        assert!(Axis::variable(vec![0.0]).is_err());
        assert!(Axis::variable(vec![0.0, 2.0, 1.0]).is_err());
    }

    #[test]
    fn link_saturates_into_edge_bins() {
        let axis = Axis::equidistant(-100.0, 100.0, 4).unwrap();
        let link = BinnedLink::new(axis, BinningValue::Z).unwrap();
        assert_eq!(link.index(&Point3::new(0.0, 0.0, -500.0)), 0);
        assert_eq!(link.index(&Point3::new(0.0, 0.0, 100.0)), 3);
        assert_eq!(link.index(&Point3::new(0.0, 0.0, 1e9)), 3);
        for k in 0..4 {
            let mid = -100.0 + 50.0 * k as f64 + 25.0;
            assert_eq!(link.index(&Point3::new(3.0, -2.0, mid)), k);
        }
    }

    #[test]
    fn link_rejects_degenerate_axes() {
        // variants are constructible without the checked constructors
        let single_edge = Axis::Variable { edges: vec![0.0] };
        assert_eq!(single_edge.n_bins(), 0);
        assert!(BinnedLink::new(single_edge, BinningValue::Z).is_err());
        let no_bins = Axis::Equidistant { min: 0.0, max: 1.0, bins: 0 };
        assert!(BinnedLink::new(no_bins, BinningValue::R).is_err());
        assert!(Axis::Variable { edges: vec![] }.min().is_nan());
    }

    #[test]
    fn link_applies_local_transform() {
        // volume centred at z = 300, axis in local coordinates
        let placement = Isometry3::translation(0.0, 0.0, 300.0);
        let axis = Axis::variable(vec![-50.0, 0.0, 50.0]).unwrap();
        let link = BinnedLink::new(axis, BinningValue::Z)
            .unwrap()
            .with_transform(placement.inverse());
        assert_eq!(link.index(&Point3::new(0.0, 0.0, 280.0)), 0);
        assert_eq!(link.index(&Point3::new(0.0, 0.0, 320.0)), 1);
    }

    #[test]
    fn cast_values() {
        let p = Point3::new(3.0, 4.0, 12.0);
        assert_relative_eq!(BinningValue::R.cast(&p), 5.0);
        assert_relative_eq!(BinningValue::Mag.cast(&p), 13.0);
        assert_relative_eq!(BinningValue::Phi.cast(&p), (4.0f64).atan2(3.0));
        assert_relative_eq!(BinningValue::RPhi.cast(&p), 5.0 * (4.0f64).atan2(3.0));
        assert_relative_eq!(BinningValue::Theta.cast(&p), (5.0f64).atan2(12.0));
        let theta = (5.0f64).atan2(12.0);
        assert_relative_eq!(BinningValue::Eta.cast(&p), -(theta / 2.0).tan().ln(), epsilon = 1e-12);
        assert_eq!(BinningValue::Eta.cast(&Point3::origin()), 0.0);
    }
}

/// Scalar projections of a position used for binning and extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinningValue {
    X,
    Y,
    Z,
    R,
    Phi,
    RPhi,
    Theta,
    Eta,
    Mag,
}

impl BinningValue {
    pub const ALL: [BinningValue; 9] = [
        BinningValue::X,
        BinningValue::Y,
        BinningValue::Z,
        BinningValue::R,
        BinningValue::Phi,
        BinningValue::RPhi,
        BinningValue::Theta,
        BinningValue::Eta,
        BinningValue::Mag,
    ];

    /// Position of this value in per-value tables such as [`crate::extent::Extent`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Project a position onto this value.
    pub fn cast(self, p: &Point3<f64>) -> f64 {
        let r = p.x.hypot(p.y);
        match self {
            BinningValue::X => p.x,
            BinningValue::Y => p.y,
            BinningValue::Z => p.z,
            BinningValue::R => r,
            BinningValue::Phi => p.y.atan2(p.x),
            BinningValue::RPhi => r * p.y.atan2(p.x),
            BinningValue::Theta => r.atan2(p.z),
            BinningValue::Eta => {
                if r == 0.0 && p.z == 0.0 {
                    0.0
                } else {
                    (p.z / r).asinh()
                }
            }
            BinningValue::Mag => p.coords.norm(),
        }
    }

    /// Natural range of the value when nothing constrains it.
    pub(crate) fn default_range(self) -> (f64, f64) {
        match self {
            BinningValue::R | BinningValue::RPhi | BinningValue::Mag => (0.0, f64::MAX),
            BinningValue::Phi => (-PI, PI),
            _ => (f64::MIN, f64::MAX),
        }
    }
}

impl fmt::Display for BinningValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinningValue::X => "x",
            BinningValue::Y => "y",
            BinningValue::Z => "z",
            BinningValue::R => "r",
            BinningValue::Phi => "phi",
            BinningValue::RPhi => "rPhi",
            BinningValue::Theta => "theta",
            BinningValue::Eta => "eta",
            BinningValue::Mag => "mag",
        };
        write!(f, "{}", name)
    }
}

/// Binning axis, either regular or with explicit edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Axis {
    Equidistant { min: f64, max: f64, bins: usize },
    Variable { edges: Vec<f64> },
}

impl Axis {
    pub fn equidistant(min: f64, max: f64, bins: usize) -> Result<Self> {
        let axis = Axis::Equidistant { min, max, bins };
        axis.validate()?;
        Ok(axis)
    }

    pub fn variable(edges: Vec<f64>) -> Result<Self> {
        let axis = Axis::Variable { edges };
        axis.validate()?;
        Ok(axis)
    }

    /// Check the invariants of an axis, e.g. one that was deserialized directly.
    pub fn validate(&self) -> Result<()> {
        match self {
            Axis::Equidistant { min, max, bins } => {
                if *bins == 0 {
                    return Err(invalid("equidistant axis needs at least one bin"));
                }
                if !(min.is_finite() && max.is_finite() && max > min) {
                    return Err(invalid(format!(
                        "equidistant axis range [{}, {}] is empty or not finite",
                        min, max
                    )));
                }
            }
            Axis::Variable { edges } => {
                if edges.len() < 2 {
                    return Err(invalid("variable axis needs at least two edges"));
                }
                if edges.windows(2).any(|w| !(w[1] > w[0])) {
                    return Err(invalid(format!(
                        "variable axis edges must be strictly increasing, got {:?}",
                        edges
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn n_bins(&self) -> usize {
        match self {
            Axis::Equidistant { bins, .. } => *bins,
            Axis::Variable { edges } => edges.len().saturating_sub(1),
        }
    }

    pub fn min(&self) -> f64 {
        match self {
            Axis::Equidistant { min, .. } => *min,
            Axis::Variable { edges } => edges.first().copied().unwrap_or(f64::NAN),
        }
    }

    pub fn max(&self) -> f64 {
        match self {
            Axis::Equidistant { max, .. } => *max,
            Axis::Variable { edges } => edges.last().copied().unwrap_or(f64::NAN),
        }
    }

    /// 1-indexed bin of `value`: `0` is underflow and `n_bins() + 1` overflow.
    pub fn bin(&self, value: f64) -> usize {
        if value.is_nan() {
            return 0;
        }
        match self {
            Axis::Equidistant { min, max, bins } => {
                if value < *min {
                    0
                } else if value >= *max {
                    bins + 1
                } else {
                    let width = (max - min) / *bins as f64;
                    // rounding right below max can land on bins
                    (((value - min) / width).floor() as usize + 1).min(*bins)
                }
            }
            Axis::Variable { edges } => edges.partition_point(|edge| *edge <= value),
        }
    }

    /// Bin boundaries, `n_bins() + 1` values.
    pub fn edges(&self) -> Vec<f64> {
        match self {
            Axis::Equidistant { min, max, bins } => {
                let width = (max - min) / *bins as f64;
                (0..=*bins).map(|i| min + width * i as f64).collect()
            }
            Axis::Variable { edges } => edges.clone(),
        }
    }
}

/// Position-to-bin mapping along one binning value in a local frame.
///
/// The axis is validated on construction, so a link always has at least one bin.
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedLink {
    axis: Axis,
    bvalue: BinningValue,
    to_local: Isometry3<f64>, // global to local frame of the binning
}

impl BinnedLink {
    pub fn new(axis: Axis, bvalue: BinningValue) -> Result<Self> {
        axis.validate()?;
        Ok(Self {
            axis,
            bvalue,
            to_local: Isometry3::identity(),
        })
    }

    pub fn with_transform(mut self, to_local: Isometry3<f64>) -> Self {
        self.to_local = to_local;
        self
    }

    pub fn axis(&self) -> &Axis {
        &self.axis
    }

    pub fn bvalue(&self) -> BinningValue {
        self.bvalue
    }

    pub fn n_bins(&self) -> usize {
        self.axis.n_bins()
    }

    /// Bin index in `[0, n_bins - 1]` for a global position.
    pub fn index(&self, position: &Point3<f64>) -> usize {
        let local = self.to_local * position;
        let value = self.bvalue.cast(&local);
        let last = self.axis.n_bins().saturating_sub(1);
        self.axis.bin(value).saturating_sub(1).min(last)
    }
}
