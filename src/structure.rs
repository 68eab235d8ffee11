//! Resolves a declarative shape description into placed volume bounds.

use std::f64::consts::PI;

use log::{debug, trace};
use nalgebra::{Isometry3, Translation3};

use crate::bins::BinningValue;
use crate::bounds::{BoundsType, TrapezoidBounds, VolumeBounds};
use crate::context::GeometryContext;
use crate::error::{invalid, Result};
use crate::extent::Extent;
use crate::portal::PortalGenerator;

#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn build(
        bounds_type: BoundsType,
        values: Vec<f64>,
        extent: Option<Extent>,
    ) -> Result<ExternalStructure> {
        VolumeStructureBuilder::new(VolumeStructureConfig {
            bounds_type,
            bound_values: values,
            extent,
            transform: Isometry3::identity(),
        })?
        .construct(&GeometryContext::default())
    }

    #[test]
    fn needs_values_or_extent() {
        let result = VolumeStructureBuilder::new(VolumeStructureConfig::new(BoundsType::Cuboid));
        assert!(result.is_err());
    }

    #[test]
    fn every_type_builds_from_full_values() {
        let side = TrapezoidBounds::side_angle(5.0, 10.0, 8.0);
        let cases: Vec<(BoundsType, Vec<f64>)> = vec![
            (BoundsType::Cone, vec![0.1, 60.0, 0.3, 60.0, 50.0, 0.0, PI]),
            (BoundsType::Cuboid, vec![1.0, 2.0, 3.0]),
            (BoundsType::CutoutCylinder, vec![5.0, 20.0, 50.0, 100.0, 30.0]),
            (BoundsType::Cylinder, vec![10.0, 100.0, 300.0, PI, 0.0]),
            (
                BoundsType::GenericCuboid,
                vec![
                    0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, //
                    0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0,
                ],
            ),
            (BoundsType::Trapezoid, vec![5.0, 10.0, 8.0, 4.0, side, side]),
        ];
        for (bounds_type, values) in cases {
            let structure = build(bounds_type, values.clone(), None).unwrap();
            assert_eq!(structure.bounds.bounds_type(), bounds_type);
            assert_eq!(structure.bounds.values(), values);
            assert_eq!(structure.transform, Isometry3::identity());
        }
    }

    #[test]
    fn insufficient_values_fail() {
        assert!(build(BoundsType::Cone, vec![0.1, 60.0, 0.3, 60.0], None).is_err());
        assert!(build(BoundsType::Cuboid, vec![1.0, 2.0], None).is_err());
        assert!(build(BoundsType::CutoutCylinder, vec![5.0, 20.0, 50.0, 100.0], None).is_err());
        assert!(build(BoundsType::Cylinder, vec![10.0, 100.0], None).is_err());
        assert!(build(BoundsType::GenericCuboid, vec![0.0; 23], None).is_err());
        assert!(build(BoundsType::Trapezoid, vec![5.0, 10.0, 8.0], None).is_err());
    }

    #[test]
    fn optional_values_take_defaults() {
        let cylinder = build(BoundsType::Cylinder, vec![10.0, 100.0, 300.0], None).unwrap();
        assert_eq!(cylinder.bounds.values(), vec![10.0, 100.0, 300.0, PI, 0.0]);

        let cone = build(BoundsType::Cone, vec![0.1, 60.0, 0.3, 60.0, 50.0], None).unwrap();
        assert_eq!(cone.bounds.values()[5..], [0.0, PI]);

        let trapezoid = build(BoundsType::Trapezoid, vec![5.0, 10.0, 8.0, 4.0], None).unwrap();
        let alpha = (16.0f64).atan2(5.0);
        assert_relative_eq!(trapezoid.bounds.values()[4], alpha);
        assert_relative_eq!(trapezoid.bounds.values()[5], alpha);
    }

    #[test]
    fn excess_values_are_ignored() {
        let cuboid = build(BoundsType::Cuboid, vec![1.0, 2.0, 3.0, 99.0], None).unwrap();
        assert_eq!(cuboid.bounds.values(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn cuboid_from_extent() {
        let mut extent = Extent::new();
        extent.set(BinningValue::X, -10.0, 30.0);
        extent.set(BinningValue::Y, 0.0, 4.0);
        extent.set(BinningValue::Z, -100.0, -50.0);
        let structure = build(BoundsType::Cuboid, vec![], Some(extent)).unwrap();
        assert_eq!(structure.bounds.values(), vec![20.0, 2.0, 25.0]);
        assert_relative_eq!(structure.transform.translation.vector, Vector3::new(10.0, 2.0, -75.0));

        let mut partial = Extent::new();
        partial.set(BinningValue::X, -1.0, 1.0);
        assert!(build(BoundsType::Cuboid, vec![], Some(partial)).is_err());
    }

    #[test]
    fn cylinder_from_extent() {
        let mut extent = Extent::new();
        extent.set(BinningValue::R, 10.0, 100.0);
        extent.set(BinningValue::Z, 250.0, 450.0);
        let structure = build(BoundsType::Cylinder, vec![], Some(extent.clone())).unwrap();
        assert_eq!(structure.bounds.values(), vec![10.0, 100.0, 100.0, PI, 0.0]);
        assert_relative_eq!(structure.transform.translation.vector, Vector3::new(0.0, 0.0, 350.0));

        extent.set(BinningValue::Phi, -0.2, 0.6);
        let sector = build(BoundsType::Cylinder, vec![], Some(extent)).unwrap();
        let values = sector.bounds.values();
        assert_relative_eq!(values[3], 0.4, epsilon = 1e-12);
        assert_relative_eq!(values[4], 0.2, epsilon = 1e-12);
    }

    #[test]
    fn extent_only_supported_for_cuboid_and_cylinder() {
        let mut extent = Extent::new();
        extent.set(BinningValue::X, -1.0, 1.0);
        extent.set(BinningValue::Y, -1.0, 1.0);
        extent.set(BinningValue::Z, -1.0, 1.0);
        extent.set(BinningValue::R, 0.0, 1.0);
        let unsupported = [
            BoundsType::Cone,
            BoundsType::CutoutCylinder,
            BoundsType::GenericCuboid,
            BoundsType::Trapezoid,
        ];
        for bounds_type in unsupported {
            assert!(build(bounds_type, vec![], Some(extent.clone())).is_err());
        }
    }

    #[test]
    fn extent_translation_composes_with_base_placement() {
        let mut extent = Extent::new();
        extent.set(BinningValue::R, 0.0, 10.0);
        extent.set(BinningValue::Z, 10.0, 20.0);
        let mut config = VolumeStructureConfig::new(BoundsType::Cylinder);
        config.extent = Some(extent);
        config.transform = Isometry3::translation(1.0, 0.0, 0.0);
        let structure = VolumeStructureBuilder::new(config)
            .unwrap()
            .construct(&GeometryContext::default())
            .unwrap();
        assert_relative_eq!(structure.transform.translation.vector, Vector3::new(1.0, 0.0, 15.0));
    }

    #[test]
    fn round_trip_through_values() {
        let first = build(BoundsType::Cylinder, vec![10.0, 100.0, 300.0], None).unwrap();
        let second = build(BoundsType::Cylinder, first.bounds.values(), None).unwrap();
        assert_eq!(first.bounds, second.bounds);
    }
}

/// Declarative description of one volume shape.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeStructureConfig {
    pub bounds_type: BoundsType,
    pub bound_values: Vec<f64>,     // may be empty when an extent is given
    pub extent: Option<Extent>,     // used only when no values are given
    pub transform: Isometry3<f64>,  // base placement
}

impl VolumeStructureConfig {
    pub fn new(bounds_type: BoundsType) -> Self {
        Self {
            bounds_type,
            bound_values: Vec::new(),
            extent: None,
            transform: Isometry3::identity(),
        }
    }
}

/// Placed shape together with the generator for its boundary portals.
#[derive(Debug, Clone)]
pub struct ExternalStructure {
    pub transform: Isometry3<f64>,
    pub bounds: VolumeBounds,
    pub portal_generator: PortalGenerator,
}

#[derive(Debug, Clone)]
pub struct VolumeStructureBuilder {
    config: VolumeStructureConfig,
}

impl VolumeStructureBuilder {
    pub fn new(config: VolumeStructureConfig) -> Result<Self> {
        if config.bound_values.is_empty() && config.extent.is_none() {
            return Err(invalid(format!(
                "{} volume: neither bound values nor an extent given",
                config.bounds_type
            )));
        }
        Ok(Self { config })
    }

    /// Resolve the configured shape.
    ///
    /// Explicit values win over the extent. Every check happens before the
    /// bounds are created, so a failure never yields a partial structure.
    pub fn construct(&self, _gctx: &GeometryContext) -> Result<ExternalStructure> {
        let bounds_type = self.config.bounds_type;
        let mut transform = self.config.transform;

        let values = match (&self.config.extent, self.config.bound_values.is_empty()) {
            (Some(extent), true) => {
                debug!("{}: estimating parameters from extent", bounds_type);
                let (shift, values) = from_extent(bounds_type, extent)?;
                transform = shift * transform;
                values
            }
            _ => with_defaults(bounds_type, &self.config.bound_values)?,
        };
        trace!("{} values {:?}", bounds_type, values);

        let bounds = VolumeBounds::from_values(bounds_type, &values)?;
        Ok(ExternalStructure {
            transform,
            bounds,
            portal_generator: PortalGenerator::default(),
        })
    }
}

/// Complete an explicit parameter list to the full arity.
fn with_defaults(bounds_type: BoundsType, given: &[f64]) -> Result<Vec<f64>> {
    if given.len() < bounds_type.required() {
        return Err(invalid(format!(
            "{} volume needs at least {} bound values, got {}; its parameters cannot be estimated",
            bounds_type,
            bounds_type.required(),
            given.len()
        )));
    }
    let mut values: Vec<f64> = given.iter().copied().take(bounds_type.arity()).collect();
    while values.len() < bounds_type.arity() {
        let default = match (bounds_type, values.len()) {
            (BoundsType::Cylinder, 3) => PI, // half phi
            (BoundsType::Cylinder, 4) => 0.0, // average phi
            (BoundsType::Cone, 5) => 0.0,
            (BoundsType::Cone, 6) => PI,
            (BoundsType::Trapezoid, 4 | 5) => {
                TrapezoidBounds::side_angle(values[0], values[1], values[2])
            }
            (_, n) => {
                return Err(invalid(format!(
                    "{} volume has no default for value {}",
                    bounds_type, n
                )));
            }
        };
        values.push(default);
    }
    Ok(values)
}

fn from_extent(bounds_type: BoundsType, extent: &Extent) -> Result<(Translation3<f64>, Vec<f64>)> {
    match bounds_type {
        BoundsType::Cuboid => cuboid_from_extent(extent),
        BoundsType::Cylinder => cylinder_from_extent(extent),
        other => Err(invalid(format!(
            "{} volume parameters cannot be estimated from an extent",
            other
        ))),
    }
}

fn cuboid_from_extent(extent: &Extent) -> Result<(Translation3<f64>, Vec<f64>)> {
    let needed = [BinningValue::X, BinningValue::Y, BinningValue::Z];
    if !needed.iter().all(|bv| extent.constrains(*bv)) {
        return Err(invalid("cuboid extent must constrain x, y and z"));
    }
    let shift = Translation3::new(
        extent.medium(BinningValue::X),
        extent.medium(BinningValue::Y),
        extent.medium(BinningValue::Z),
    );
    let values = needed.iter().map(|bv| 0.5 * extent.interval(*bv)).collect();
    Ok((shift, values))
}

fn cylinder_from_extent(extent: &Extent) -> Result<(Translation3<f64>, Vec<f64>)> {
    if !(extent.constrains(BinningValue::R) && extent.constrains(BinningValue::Z)) {
        return Err(invalid("cylinder extent must constrain r and z"));
    }
    let shift = Translation3::new(0.0, 0.0, extent.medium(BinningValue::Z));
    let mut values = vec![
        extent.min(BinningValue::R),
        extent.max(BinningValue::R),
        0.5 * extent.interval(BinningValue::Z),
    ];
    if extent.constrains(BinningValue::Phi) {
        values.push(0.5 * extent.interval(BinningValue::Phi));
        values.push(extent.medium(BinningValue::Phi));
    } else {
        values.push(PI);
        values.push(0.0);
    }
    Ok((shift, values))
}
