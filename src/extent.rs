use std::fmt;

use nalgebra::Point3;

use crate::bins::BinningValue;

#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn set_constrains_and_clamps_radius() {
        let mut extent = Extent::new();
        assert!(!extent.constrains_any());
        extent.set(BinningValue::R, -5.0, 100.0);
        extent.set(BinningValue::Z, -300.0, 300.0);
        assert!(extent.constrains(BinningValue::R));
        assert!(!extent.constrains(BinningValue::X));
        assert_eq!(extent.range(BinningValue::R).min, 0.0);
        assert_relative_eq!(extent.medium(BinningValue::Z), 0.0);
        assert_relative_eq!(extent.interval(BinningValue::Z), 600.0);
    }

    #[test]
    fn defaults_for_unconstrained_values() {
        let extent = Extent::new();
        assert_eq!(extent.range(BinningValue::R).min, 0.0);
        assert_eq!(extent.range(BinningValue::Phi).min, -std::f64::consts::PI);
        assert_eq!(extent.range(BinningValue::Phi).max, std::f64::consts::PI);
    }

    #[test]
    fn extend_by_vertices_with_envelope() {
        let mut extent = Extent::new();
        extent.set_envelope(BinningValue::X, [1.0, 2.0]);
        extent.extend_point(&Point3::new(1.0, 0.0, 0.0), &[BinningValue::X, BinningValue::Y], true);
        let xy = [BinningValue::X, BinningValue::Y];
        extent.extend_point(&Point3::new(4.0, -3.0, 0.0), &xy, true);
        assert_eq!(extent.range(BinningValue::X), Range1D::new(0.0, 6.0));
        assert_eq!(extent.range(BinningValue::Y), Range1D::new(-3.0, 0.0));
        assert!(!extent.constrains(BinningValue::Z));
    }

    #[test]
    fn extend_by_extent_and_contains() {
        let mut outer = Extent::new();
        outer.set(BinningValue::Z, -10.0, 10.0);
        let mut inner = Extent::new();
        inner.set(BinningValue::Z, -5.0, 15.0);
        assert!(!outer.contains(&inner));
        assert!(outer.intersects(&inner));
        outer.extend(&inner, &BinningValue::ALL, false);
        assert!(outer.contains(&inner));
        assert_eq!(outer.range(BinningValue::Z), Range1D::new(-10.0, 15.0));

        let mut disjoint = Extent::new();
        disjoint.set(BinningValue::Z, 20.0, 30.0);
        assert!(!outer.intersects(&disjoint));
        assert!(!outer.intersects_value(&disjoint, BinningValue::X));
    }

    #[test]
    fn display_lists_constrained_values() {
        let mut extent = Extent::new();
        extent.set(BinningValue::Z, -1.0, 1.0);
        let text = format!("{}", extent);
        assert!(text.contains("z"));
        assert!(!text.contains("phi"));
    }
}

/// Closed interval on one binning value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range1D {
    pub min: f64,
    pub max: f64,
}

impl Range1D {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn size(&self) -> f64 {
        self.max - self.min
    }

    pub fn medium(&self) -> f64 {
        0.5 * (self.min + self.max)
    }

    pub fn expand(&mut self, min: f64, max: f64) {
        self.min = self.min.min(min);
        self.max = self.max.max(max);
    }

    pub fn shrink(&mut self, min: f64, max: f64) {
        self.min = self.min.max(min);
        self.max = self.max.min(max);
    }

    pub fn contains(&self, other: &Range1D) -> bool {
        self.min <= other.min && other.max <= self.max
    }

    pub fn intersects(&self, other: &Range1D) -> bool {
        self.min <= other.max && other.min <= self.max
    }
}

/// Axis-aligned constraint region over all binning values.
///
/// Unconstrained values keep their natural range (for instance `[0, MAX]` for
/// `r` and `[-pi, pi]` for `phi`) and are ignored by the containment and
/// intersection checks. The first constraint on a value replaces that
/// natural range, later ones widen it.
#[derive(Debug, Clone, PartialEq)]
pub struct Extent {
    ranges: [Range1D; 9],
    constrains: [bool; 9],
    envelope: [[f64; 2]; 9], // [low, high] margin per value
}

impl Default for Extent {
    fn default() -> Self {
        Self::new()
    }
}

impl Extent {
    pub fn new() -> Self {
        let ranges = BinningValue::ALL.map(|bv| {
            let (min, max) = bv.default_range();
            Range1D::new(min, max)
        });
        Self {
            ranges,
            constrains: [false; 9],
            envelope: [[0.0; 2]; 9],
        }
    }

    pub fn set(&mut self, bvalue: BinningValue, min: f64, max: f64) {
        let min = if bvalue == BinningValue::R { min.max(0.0) } else { min };
        self.ranges[bvalue.index()] = Range1D::new(min, max);
        self.constrains[bvalue.index()] = true;
    }

    pub fn set_envelope(&mut self, bvalue: BinningValue, envelope: [f64; 2]) {
        self.envelope[bvalue.index()] = envelope;
    }

    pub fn envelope(&self, bvalue: BinningValue) -> [f64; 2] {
        self.envelope[bvalue.index()]
    }

    pub fn range(&self, bvalue: BinningValue) -> Range1D {
        self.ranges[bvalue.index()]
    }

    pub fn min(&self, bvalue: BinningValue) -> f64 {
        self.ranges[bvalue.index()].min
    }

    pub fn max(&self, bvalue: BinningValue) -> f64 {
        self.ranges[bvalue.index()].max
    }

    pub fn medium(&self, bvalue: BinningValue) -> f64 {
        self.ranges[bvalue.index()].medium()
    }

    pub fn interval(&self, bvalue: BinningValue) -> f64 {
        self.ranges[bvalue.index()].size()
    }

    pub fn constrains(&self, bvalue: BinningValue) -> bool {
        self.constrains[bvalue.index()]
    }

    pub fn constrains_any(&self) -> bool {
        self.constrains.iter().any(|c| *c)
    }

    /// Widen the extent to include a vertex, optionally with the envelope applied.
    pub fn extend_point(
        &mut self,
        vertex: &Point3<f64>,
        bvalues: &[BinningValue],
        apply_envelope: bool,
    ) {
        for &bv in bvalues {
            let value = bv.cast(vertex);
            let [low, high] = if apply_envelope {
                self.envelope(bv)
            } else {
                [0.0, 0.0]
            };
            let mut min = value - low;
            if bv == BinningValue::R {
                min = min.max(0.0);
            }
            self.adapt(bv, min, value + high);
        }
    }

    /// Widen the extent to include another one.
    pub fn extend(&mut self, other: &Extent, bvalues: &[BinningValue], apply_envelope: bool) {
        for &bv in bvalues {
            if other.constrains(bv) {
                let [low, high] = if apply_envelope {
                    self.envelope(bv)
                } else {
                    [0.0, 0.0]
                };
                let range = other.range(bv);
                self.adapt(bv, range.min - low, range.max + high);
            } else if other.envelope(bv) != [0.0, 0.0] {
                // only an envelope given
                let [low, high] = other.envelope(bv);
                let range = self.range(bv);
                self.ranges[bv.index()].expand(range.min - low, range.max + high);
                self.constrains[bv.index()] = true;
            }
        }
    }

    fn adapt(&mut self, bv: BinningValue, min: f64, max: f64) {
        let i = bv.index();
        if self.constrains[i] {
            self.ranges[i].expand(min, max);
        } else {
            self.ranges[i].shrink(min, max);
        }
        self.constrains[i] = true;
    }

    /// True if every value constrained here contains the other's range.
    pub fn contains(&self, other: &Extent) -> bool {
        BinningValue::ALL.iter().all(|&bv| self.contains_value(other, bv))
    }

    pub fn contains_value(&self, other: &Extent, bvalue: BinningValue) -> bool {
        !self.constrains(bvalue) || self.range(bvalue).contains(&other.range(bvalue))
    }

    /// True if any value constrained by both extents overlaps.
    pub fn intersects(&self, other: &Extent) -> bool {
        BinningValue::ALL
            .iter()
            .any(|&bv| self.intersects_value(other, bv))
    }

    pub fn intersects_value(&self, other: &Extent, bvalue: BinningValue) -> bool {
        self.constrains(bvalue)
            && other.constrains(bvalue)
            && self.range(bvalue).intersects(&other.range(bvalue))
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Extent:")?;
        for bv in BinningValue::ALL {
            if self.constrains(bv) {
                let range = self.range(bv);
                writeln!(f, "  - {:>6} | range = [{}, {}]", bv.to_string(), range.min, range.max)?;
            }
        }
        Ok(())
    }
}
