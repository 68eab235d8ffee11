//! Detector volumes, the mutable builder and the frozen detector.
//!
//! Portals live in one arena owned by the builder; volumes refer to them by
//! [`PortalId`]. Attaching two volumes rewrites those ids so that a shared
//! boundary is a single arena slot referenced by both volumes. [`DetectorBuilder::build`]
//! compacts the arena and hands out an immutable [`Detector`].

use std::collections::HashSet;
use std::fmt;

use itertools::Itertools;
use log::{debug, info, warn};
use nalgebra::{Isometry3, Point3};
use serde::Serialize;

use crate::bins::BinningValue;
use crate::bounds::VolumeBounds;
use crate::context::GeometryContext;
use crate::delegates::{DetectorVolumeUpdator, SurfaceCandidatesUpdator};
use crate::error::{invalid, GeometryError, Result};
use crate::extent::Extent;
use crate::geometry_id::GeometryId;
use crate::navigation::{NavigationState, NavigationTarget};
use crate::portal::Portal;
use crate::settings::{BOUNDARY_TOLERANCE, SURFACE_MATCH_TOLERANCE};
use crate::structure::{ExternalStructure, VolumeStructureBuilder, VolumeStructureConfig};
use crate::surface::Surface;


/// Index of a volume in its detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VolumeId(pub usize);

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "volume {}", self.0)
    }
}

/// Index of a portal in the portal arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PortalId(pub usize);

impl fmt::Display for PortalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "portal {}", self.0)
    }
}

/// A placed, bounded region of the detector, its boundary portals and the
/// surfaces it contains.
#[derive(Debug, Clone)]
pub struct DetectorVolume {
    name: String,
    transform: Isometry3<f64>,
    bounds: VolumeBounds,
    portals: Vec<PortalId>,
    surfaces: Vec<Surface>, // global frame
    surface_candidates: SurfaceCandidatesUpdator,
    geometry_id: GeometryId, // set when the detector is built
}

impl DetectorVolume {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transform(&self) -> &Isometry3<f64> {
        &self.transform
    }

    pub fn bounds(&self) -> &VolumeBounds {
        &self.bounds
    }

    /// Portal ids in the order the generator produced the boundaries.
    pub fn portals(&self) -> &[PortalId] {
        &self.portals
    }

    /// Internal surfaces, addressed by [`NavigationTarget::Surface`].
    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    pub fn surface_candidates(&self) -> &SurfaceCandidatesUpdator {
        &self.surface_candidates
    }

    pub fn geometry_id(&self) -> GeometryId {
        self.geometry_id
    }

    pub fn surface_geometry_id(&self, index: usize) -> GeometryId {
        self.geometry_id.with_sensitive(index + 1)
    }

    /// Whether a global position is inside (boundaries included).
    pub fn inside(&self, position: &Point3<f64>) -> bool {
        let local = self.transform.inverse_transform_point(position);
        self.bounds.inside(&local, BOUNDARY_TOLERANCE)
    }

    pub fn center(&self) -> Point3<f64> {
        Point3::from(self.transform.translation.vector)
    }

    /// Global extent estimated from a polyhedron sample of the boundary.
    pub fn extent(&self) -> Extent {
        let mut extent = Extent::new();
        for vertex in self.bounds.polyhedron(&self.transform) {
            extent.extend_point(&vertex, &BinningValue::ALL, false);
        }
        extent
    }

    /// Refresh the candidates of `state` with this volume's strategy.
    pub fn update_navigation_state(
        &self,
        gctx: &GeometryContext,
        detector: &Detector,
        state: &mut NavigationState,
    ) {
        self.surface_candidates.update(gctx, detector, self, state);
    }

    fn contains_surface(&self, surface: &Surface) -> bool {
        self.inside(&surface.reference_position())
    }
}

/// Outcome of one attach call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttachReport {
    pub fused: usize,
    pub stitched: usize,
    pub already_connected: usize, // portals shared before the call
}

/// Mutable detector under construction.
#[derive(Debug)]
pub struct DetectorBuilder {
    name: String,
    volumes: Vec<DetectorVolume>,
    portals: Vec<Option<Portal>>, // vacated slots are None
    volume_finder: DetectorVolumeUpdator,
}

impl DetectorBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            volumes: Vec::new(),
            portals: Vec::new(),
            volume_finder: DetectorVolumeUpdator::TrialAndError,
        }
    }

    /// Place a resolved structure as a new volume and generate its portals.
    ///
    /// The volume offers all its portals as candidates until another
    /// strategy is registered with [`Self::set_surface_candidates`].
    pub fn add_volume(
        &mut self,
        gctx: &GeometryContext,
        name: &str,
        structure: ExternalStructure,
    ) -> Result<VolumeId> {
        self.add_volume_with_surfaces(gctx, name, structure, Vec::new())
    }

    /// Like [`Self::add_volume`], with surfaces placed inside the volume.
    ///
    /// Every surface's reference position must lie inside the volume. A
    /// volume with surfaces offers all its portals and surfaces as candidates.
    pub fn add_volume_with_surfaces(
        &mut self,
        gctx: &GeometryContext,
        name: &str,
        structure: ExternalStructure,
        surfaces: Vec<Surface>,
    ) -> Result<VolumeId> {
        if self.volumes.iter().any(|v| v.name == name) {
            return Err(invalid(format!("volume '{}' declared twice", name)));
        }
        let id = VolumeId(self.volumes.len());
        let surface_candidates = if surfaces.is_empty() {
            SurfaceCandidatesUpdator::AllPortals
        } else {
            SurfaceCandidatesUpdator::AllPortalsAndSurfaces
        };
        let mut volume = DetectorVolume {
            name: name.to_string(),
            transform: structure.transform,
            bounds: structure.bounds,
            portals: Vec::new(),
            surfaces,
            surface_candidates,
            geometry_id: GeometryId::default(),
        };
        if let Some(index) = volume.surfaces.iter().position(|s| !volume.contains_surface(s)) {
            return Err(invalid(format!(
                "surface {} is not contained in volume '{}'",
                index, name
            )));
        }

        let generated = structure
            .portal_generator
            .generate(gctx, &volume.transform, &volume.bounds, id);
        let first = self.portals.len();
        volume.portals = (first..first + generated.len()).map(PortalId).collect();
        self.portals.extend(generated.into_iter().map(Some));
        debug!(
            "added '{}' as {} with bounds {} and {} surfaces",
            name,
            id,
            volume.bounds,
            volume.surfaces.len()
        );

        self.volumes.push(volume);
        Ok(id)
    }

    /// Hand each surface to the volume containing its reference position.
    ///
    /// Volumes that receive surfaces switch to the all-portals-and-surfaces
    /// strategy. Surfaces outside every volume, or aimed at a volume that
    /// already holds surfaces, are skipped with a warning. Returns the number
    /// of surfaces placed.
    pub fn fill_gaps(&mut self, surfaces: Vec<Surface>) -> usize {
        let mut assigned: Vec<(usize, Vec<Surface>)> = Vec::new();
        for surface in surfaces {
            let Some(index) = self.volumes.iter().position(|v| v.contains_surface(&surface)) else {
                warn!("no volume contains surface at {:?}", surface.reference_position());
                continue;
            };
            if !self.volumes[index].surfaces.is_empty() {
                warn!("volume '{}' already holds surfaces", self.volumes[index].name);
                continue;
            }
            match assigned.iter_mut().find(|(i, _)| *i == index) {
                Some((_, list)) => list.push(surface),
                None => assigned.push((index, vec![surface])),
            }
        }

        let mut placed = 0;
        for (index, list) in assigned {
            let volume = &mut self.volumes[index];
            debug!("filled '{}' with {} surfaces", volume.name, list.len());
            placed += list.len();
            volume.surfaces = list;
            volume.surface_candidates = SurfaceCandidatesUpdator::AllPortalsAndSurfaces;
        }
        placed
    }

    /// Resolve a shape description and add it in one go.
    pub fn add_volume_from_config(
        &mut self,
        gctx: &GeometryContext,
        name: &str,
        config: VolumeStructureConfig,
    ) -> Result<VolumeId> {
        let structure = VolumeStructureBuilder::new(config)?.construct(gctx)?;
        self.add_volume(gctx, name, structure)
    }

    pub fn set_surface_candidates(
        &mut self,
        volume: VolumeId,
        candidates: SurfaceCandidatesUpdator,
    ) -> Result<()> {
        let target = self
            .volumes
            .get_mut(volume.0)
            .ok_or_else(|| GeometryError::UnknownVolume(volume.to_string()))?;
        if let SurfaceCandidatesUpdator::Binned(binned) = &candidates {
            binned.validate(target.portals.len())?;
        }
        target.surface_candidates = candidates;
        Ok(())
    }

    /// Strategy used to find the volume a trajectory starts in.
    pub fn set_volume_finder(&mut self, finder: DetectorVolumeUpdator) {
        self.volume_finder = finder;
    }

    pub fn volume_id(&self, name: &str) -> Result<VolumeId> {
        self.volumes
            .iter()
            .position(|v| v.name == name)
            .map(VolumeId)
            .ok_or_else(|| GeometryError::UnknownVolume(name.to_string()))
    }

    pub fn volumes(&self) -> &[DetectorVolume] {
        &self.volumes
    }

    pub fn portal(&self, id: PortalId) -> Option<&Portal> {
        self.portals.get(id.0).and_then(Option::as_ref)
    }

    /// Connect two volumes through their common boundaries.
    ///
    /// **How it Works**
    ///
    /// Every portal pair with identical surfaces is fused first. With
    /// `stitch` set, the remaining pairs of touching surfaces of the same
    /// kind are then stitched into one surface with binned volume links. Each
    /// portal takes part in at most one merge, and portals the two volumes
    /// already share are skipped.
    ///
    /// The whole plan is computed before anything changes: a conflict, or a
    /// pair of volumes without any common boundary, returns an error and
    /// leaves the builder as it was.
    pub fn attach(&mut self, first: &str, second: &str, stitch: bool) -> Result<AttachReport> {
        let a = self.volume_id(first)?;
        let b = self.volume_id(second)?;
        if a == b {
            return Err(invalid(format!("cannot attach '{}' to itself", first)));
        }
        let mine = &self.volumes[a.0].portals;
        let theirs = &self.volumes[b.0].portals;
        let shared: HashSet<PortalId> =
            mine.iter().filter(|p| theirs.contains(p)).copied().collect();
        let mut used = shared.clone();
        let mut merges: Vec<(PortalId, PortalId, Portal)> = Vec::new();

        let conflict = |reason: String| GeometryError::PortalConflict {
            first: first.to_string(),
            second: second.to_string(),
            reason,
        };

        for (pa, pb) in mine.iter().copied().cartesian_product(theirs.iter().copied()) {
            if used.contains(&pa) || used.contains(&pb) {
                continue;
            }
            let (portal_a, portal_b) = (self.arena(pa)?, self.arena(pb)?);
            let matched = portal_a
                .surface()
                .matches(portal_b.surface(), SURFACE_MATCH_TOLERANCE);
            let Some(flipped) = matched else {
                continue;
            };
            let fused = portal_a
                .fuse(portal_b, flipped)
                .ok_or_else(|| conflict(format!("{} and {} link the same side", pa, pb)))?;
            used.extend([pa, pb]);
            merges.push((pa, pb, fused));
        }
        let fused = merges.len();

        if stitch {
            for (pa, pb) in mine.iter().copied().cartesian_product(theirs.iter().copied()) {
                if used.contains(&pa) || used.contains(&pb) {
                    continue;
                }
                let (portal_a, portal_b) = (self.arena(pa)?, self.arena(pb)?);
                let touching = portal_a
                    .surface()
                    .stitch(portal_b.surface(), SURFACE_MATCH_TOLERANCE);
                let Some(plan) = touching else {
                    continue;
                };
                match Portal::stitched(portal_a, portal_b, plan) {
                    Some(stitched) => {
                        used.extend([pa, pb]);
                        merges.push((pa, pb, stitched));
                    }
                    None => debug!("{} and {} touch but carry binned links, not stitched", pa, pb),
                }
            }
        }
        let stitched = merges.len() - fused;

        if merges.is_empty() && shared.is_empty() {
            return Err(GeometryError::Connectivity {
                first: first.to_string(),
                second: second.to_string(),
            });
        }

        for (keep, drop, portal) in merges {
            self.portals[keep.0] = Some(portal);
            self.portals[drop.0] = None;
            for volume in self.volumes.iter_mut() {
                for id in volume.portals.iter_mut().filter(|id| **id == drop) {
                    *id = keep;
                }
            }
        }

        let report = AttachReport {
            fused,
            stitched,
            already_connected: shared.len(),
        };
        info!(
            "attached '{}' and '{}': {} fused, {} stitched, {} already shared",
            first, second, report.fused, report.stitched, report.already_connected
        );
        Ok(report)
    }

    /// Attach each volume of `names` to the next one.
    pub fn attach_all(&mut self, names: &[&str], stitch: bool) -> Result<Vec<AttachReport>> {
        names
            .iter()
            .tuple_windows()
            .map(|(first, second)| self.attach(first, second, stitch))
            .collect()
    }

    fn arena(&self, id: PortalId) -> Result<&Portal> {
        self.portal(id)
            .ok_or_else(|| invalid(format!("{} was removed from the arena", id)))
    }

    /// Freeze the geometry.
    ///
    /// Fails when a volume or the detector still carries an unbound delegate.
    pub fn build(self) -> Result<Detector> {
        if !self.volume_finder.is_connected() {
            return Err(invalid(format!("detector '{}' has no volume finder", self.name)));
        }
        if let Some(volume) = self.volumes.iter().find(|v| !v.surface_candidates.is_connected()) {
            return Err(invalid(format!(
                "volume '{}' has no surface candidates strategy",
                volume.name
            )));
        }

        let mut remap = vec![None; self.portals.len()];
        let mut portals = Vec::with_capacity(self.portals.len());
        for (old, portal) in self.portals.into_iter().enumerate() {
            if let Some(portal) = portal {
                remap[old] = Some(PortalId(portals.len()));
                portals.push(portal);
            }
        }
        let mut volumes = self.volumes;
        let mut portal_ids = vec![GeometryId::default(); portals.len()];
        for (index, volume) in volumes.iter_mut().enumerate() {
            volume.geometry_id = GeometryId::volume(index + 1);
            for (boundary, id) in volume.portals.iter_mut().enumerate() {
                *id = remap[id.0].ok_or_else(|| {
                    invalid(format!("volume '{}' refers to a removed portal", volume.name))
                })?;
                // a shared portal keeps the id of its first volume
                if portal_ids[id.0] == GeometryId::default() {
                    portal_ids[id.0] = volume.geometry_id.with_boundary(boundary + 1);
                }
            }
        }

        info!(
            "built detector '{}' with {} volumes and {} portals",
            self.name,
            volumes.len(),
            portals.len()
        );
        Ok(Detector {
            name: self.name,
            volumes,
            portals,
            portal_ids,
            volume_finder: self.volume_finder,
        })
    }
}

/// Immutable detector geometry shared by all trajectories.
#[derive(Debug, Clone)]
pub struct Detector {
    name: String,
    volumes: Vec<DetectorVolume>,
    portals: Vec<Portal>,
    portal_ids: Vec<GeometryId>,
    volume_finder: DetectorVolumeUpdator,
}

impl Detector {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn volumes(&self) -> &[DetectorVolume] {
        &self.volumes
    }

    pub fn volume(&self, id: VolumeId) -> &DetectorVolume {
        &self.volumes[id.0]
    }

    pub fn portals(&self) -> &[Portal] {
        &self.portals
    }

    pub fn portal(&self, id: PortalId) -> &Portal {
        &self.portals[id.0]
    }

    pub fn portal_geometry_id(&self, id: PortalId) -> GeometryId {
        self.portal_ids[id.0]
    }

    /// Identifier of a navigation target seen from inside `volume`.
    pub fn geometry_id(&self, volume: VolumeId, target: NavigationTarget) -> GeometryId {
        match target {
            NavigationTarget::Portal(portal) => self.portal_geometry_id(portal),
            NavigationTarget::Surface(index) => self.volume(volume).surface_geometry_id(index),
        }
    }

    pub fn volume_by_name(&self, name: &str) -> Option<&DetectorVolume> {
        self.volumes.iter().find(|v| v.name == name)
    }

    pub fn volume_id(&self, name: &str) -> Option<VolumeId> {
        self.volumes.iter().position(|v| v.name == name).map(VolumeId)
    }

    /// Set the state's current volume with the detector's volume finder.
    pub fn find_volume(&self, gctx: &GeometryContext, state: &mut NavigationState) {
        self.volume_finder.update(gctx, self, state);
    }

    /// First volume containing `position`.
    pub(crate) fn search_volume(&self, position: &Point3<f64>) -> Option<VolumeId> {
        self.volumes.iter().position(|v| v.inside(position)).map(VolumeId)
    }
}
