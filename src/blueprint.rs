//! Declarative detector description and its assembly into a [`Detector`].
//!
//! **Context**: A detector is described as a list of named volumes, each a
//! bounds type with either explicit values or an extent, a placement, its
//! internal surfaces and a candidate strategy. The chains of volumes to
//! attach and loose surfaces to distribute over the volumes follow.
//!
//! **How it Works**: Every volume is resolved by the structure builder and
//! added to a [`DetectorBuilder`]; binned candidate tables are bound in the
//! volume's local frame. Attachments run in declaration order, gap surfaces
//! go to the volumes containing them and the builder is frozen at the end.

use std::f64::consts::PI;

use anyhow::{bail, Context, Result};
use log::{debug, info};
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::bins::{Axis, BinnedLink, BinningValue};
use crate::bounds::BoundsType;
use crate::context::GeometryContext;
use crate::delegates::{BinnedPortals, SurfaceCandidatesUpdator};
use crate::detector::{Detector, DetectorBuilder};
use crate::extent::Extent;
use crate::structure::{VolumeStructureBuilder, VolumeStructureConfig};
use crate::surface::{Surface, SurfaceBounds};


/// Whole-detector description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub name: String,
    pub volumes: Vec<VolumeConfig>,
    #[serde(default)]
    pub attachments: Vec<AttachmentConfig>,
    #[serde(default)]
    pub gap_surfaces: Vec<SurfaceConfig>, // global frame
}

/// One volume of the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub name: String,
    pub bounds_type: BoundsType,
    #[serde(default)]
    pub values: Vec<f64>,
    #[serde(default)]
    pub extent: Vec<ExtentRange>, // used only when `values` is empty
    #[serde(default)]
    pub translation: [f64; 3],
    #[serde(default)]
    pub rotation: [f64; 3], // axis-angle vector, radians
    #[serde(default)]
    pub surfaces: Vec<SurfaceConfig>, // local frame of the volume
    pub candidates: Option<CandidatesConfig>, // builder default when absent
}

/// Constraint of one binning value of an extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtentRange {
    pub binning: BinningValue,
    pub min: f64,
    pub max: f64,
}

/// Candidate strategy of a volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum CandidatesConfig {
    AllPortals,
    AllPortalsAndSurfaces,
    /// Portal indices per bin, looked up in the volume's local frame.
    Binned {
        binning: BinningValue,
        axis: Axis,
        bins: Vec<Vec<usize>>,
    },
}

/// A full-phi surface placed by a translation and an axis-angle rotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SurfaceConfig {
    Cylinder {
        r: f64,
        half_z: f64,
        #[serde(default)]
        translation: [f64; 3],
        #[serde(default)]
        rotation: [f64; 3],
    },
    Disc {
        r_min: f64,
        r_max: f64,
        #[serde(default)]
        translation: [f64; 3],
        #[serde(default)]
        rotation: [f64; 3],
    },
    Rectangle {
        half_x: f64,
        half_y: f64,
        #[serde(default)]
        translation: [f64; 3],
        #[serde(default)]
        rotation: [f64; 3],
    },
}

/// A chain of volumes, each attached to the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentConfig {
    pub volumes: Vec<String>,
    #[serde(default)]
    pub stitch: bool,
}

fn placement(translation: [f64; 3], rotation: [f64; 3]) -> Isometry3<f64> {
    let [x, y, z] = translation;
    let [rx, ry, rz] = rotation;
    Isometry3::from_parts(
        Translation3::new(x, y, z),
        UnitQuaternion::from_scaled_axis(Vector3::new(rx, ry, rz)),
    )
}

impl SurfaceConfig {
    /// Build the surface, placed relative to `parent`.
    pub fn surface(&self, parent: &Isometry3<f64>) -> Result<Surface> {
        let (bounds, translation, rotation) = match self {
            SurfaceConfig::Cylinder { r, half_z, translation, rotation } => {
                if !(*r > 0.0 && *half_z > 0.0) {
                    bail!("cylinder surface needs r > 0 and half_z > 0, got {} and {}", r, half_z);
                }
                let bounds = SurfaceBounds::Cylinder {
                    r: *r,
                    half_z: *half_z,
                    half_phi: PI,
                    avg_phi: 0.0,
                };
                (bounds, translation, rotation)
            }
            SurfaceConfig::Disc { r_min, r_max, translation, rotation } => {
                if !(*r_min >= 0.0 && r_max > r_min) {
                    bail!("disc surface needs 0 <= r_min < r_max, got {} and {}", r_min, r_max);
                }
                let bounds = SurfaceBounds::Disc {
                    r_min: *r_min,
                    r_max: *r_max,
                    half_phi: PI,
                    avg_phi: 0.0,
                };
                (bounds, translation, rotation)
            }
            SurfaceConfig::Rectangle { half_x, half_y, translation, rotation } => {
                if !(*half_x > 0.0 && *half_y > 0.0) {
                    bail!("rectangle needs positive half lengths, got {} and {}", half_x, half_y);
                }
                let bounds = SurfaceBounds::Rectangle { half_x: *half_x, half_y: *half_y };
                (bounds, translation, rotation)
            }
        };
        Ok(Surface::new(parent * placement(*translation, *rotation), bounds))
    }
}

impl VolumeConfig {
    pub fn placement(&self) -> Isometry3<f64> {
        placement(self.translation, self.rotation)
    }

    pub fn structure_config(&self) -> VolumeStructureConfig {
        let extent = (!self.extent.is_empty()).then(|| {
            let mut extent = Extent::new();
            for range in &self.extent {
                extent.set(range.binning, range.min, range.max);
            }
            extent
        });
        VolumeStructureConfig {
            bounds_type: self.bounds_type,
            bound_values: self.values.clone(),
            extent,
            transform: self.placement(),
        }
    }
}

/// Resolve, place, bind and attach every configured volume.
pub fn build_detector(config: &DetectorConfig, gctx: &GeometryContext) -> Result<Detector> {
    let mut builder = DetectorBuilder::new(&config.name);

    for volume in &config.volumes {
        let structure = VolumeStructureBuilder::new(volume.structure_config())
            .and_then(|builder| builder.construct(gctx))
            .with_context(|| format!("failed to resolve volume '{}'", volume.name))?;
        let surfaces = volume
            .surfaces
            .iter()
            .map(|s| s.surface(&structure.transform))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("invalid surface in volume '{}'", volume.name))?;
        let id = builder
            .add_volume_with_surfaces(gctx, &volume.name, structure, surfaces)
            .with_context(|| format!("failed to build volume '{}'", volume.name))?;

        let candidates = match &volume.candidates {
            None => continue,
            Some(CandidatesConfig::AllPortals) => SurfaceCandidatesUpdator::AllPortals,
            Some(CandidatesConfig::AllPortalsAndSurfaces) => {
                SurfaceCandidatesUpdator::AllPortalsAndSurfaces
            }
            Some(CandidatesConfig::Binned { binning, axis, bins }) => {
                let to_local = builder.volumes()[id.0].transform().inverse();
                let link = BinnedLink::new(axis.clone(), *binning)
                    .with_context(|| {
                        format!("invalid candidate axis for volume '{}'", volume.name)
                    })?
                    .with_transform(to_local);
                debug!("volume '{}' uses binned candidates along {}", volume.name, binning);
                SurfaceCandidatesUpdator::Binned(BinnedPortals::new(link, bins.clone()))
            }
        };
        builder
            .set_surface_candidates(id, candidates)
            .with_context(|| format!("invalid candidate table for volume '{}'", volume.name))?;
    }

    for attachment in &config.attachments {
        let names: Vec<&str> = attachment.volumes.iter().map(String::as_str).collect();
        builder
            .attach_all(&names, attachment.stitch)
            .with_context(|| format!("failed to attach {}", attachment.volumes.join(" -> ")))?;
    }

    if !config.gap_surfaces.is_empty() {
        let surfaces = config
            .gap_surfaces
            .iter()
            .map(|s| s.surface(&Isometry3::identity()))
            .collect::<Result<Vec<_>>>()
            .context("invalid gap surface")?;
        let placed = builder.fill_gaps(surfaces);
        info!("placed {} of {} gap surfaces", placed, config.gap_surfaces.len());
    }

    Ok(builder.build()?)
}
