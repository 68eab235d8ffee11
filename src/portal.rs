//! Portals: boundary surfaces linking the volumes on either side.

use std::fmt;

use log::trace;
use nalgebra::Isometry3;

use crate::bins::{Axis, BinnedLink};
use crate::bounds::VolumeBounds;
use crate::context::GeometryContext;
use crate::delegates::{BinnedVolumes, DetectorVolumeUpdator};
use crate::detector::{Detector, VolumeId};
use crate::navigation::NavigationState;
use crate::surface::{Stitch, Surface};


/// A boundary surface with the volume links on both sides of its normal.
#[derive(Debug, Clone, PartialEq)]
pub struct Portal {
    surface: Surface,
    along: DetectorVolumeUpdator,    // volume the normal points into
    opposite: DetectorVolumeUpdator, // volume behind the normal
}

impl Portal {
    pub fn with_links(
        surface: Surface,
        along: DetectorVolumeUpdator,
        opposite: DetectorVolumeUpdator,
    ) -> Self {
        Self { surface, along, opposite }
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn along(&self) -> &DetectorVolumeUpdator {
        &self.along
    }

    pub fn opposite(&self) -> &DetectorVolumeUpdator {
        &self.opposite
    }

    pub fn is_fully_linked(&self) -> bool {
        !self.along.is_end_of_world() && !self.opposite.is_end_of_world()
    }

    /// Switch the state to the volume on the side the direction points to.
    pub fn update_volume(
        &self,
        gctx: &GeometryContext,
        detector: &Detector,
        state: &mut NavigationState,
    ) {
        let normal = self.surface.normal(&state.position);
        if normal.dot(&state.direction) > 0.0 {
            self.along.update(gctx, detector, state);
        } else {
            self.opposite.update(gctx, detector, state);
        }
    }

    /// Merge with a geometrically identical portal.
    ///
    /// `flipped` tells whether the other normal points the other way, in
    /// which case its sides swap. Returns `None` when both portals claim a
    /// volume on the same side.
    pub fn fuse(&self, other: &Portal, flipped: bool) -> Option<Portal> {
        let (their_along, their_opposite) = if flipped {
            (&other.opposite, &other.along)
        } else {
            (&other.along, &other.opposite)
        };
        Some(Portal {
            surface: self.surface.clone(),
            along: merge_side(&self.along, their_along)?,
            opposite: merge_side(&self.opposite, their_opposite)?,
        })
    }

    /// Combine two touching portals into one covering both.
    ///
    /// Each side of the result is binned along the stitch direction so it
    /// yields the volume that was behind the respective input. Only portals
    /// with fixed links can be stitched.
    pub fn stitched(first: &Portal, second: &Portal, stitch: Stitch) -> Option<Portal> {
        let (b_along, b_opposite) = if stitch.flipped {
            (&second.opposite, &second.along)
        } else {
            (&second.along, &second.opposite)
        };
        let axis = Axis::variable(stitch.edges.clone()).ok()?;
        let link = BinnedLink::new(axis, stitch.bvalue)
            .ok()?
            .with_transform(stitch.surface.transform().inverse());
        let along = binned_side(
            &link,
            first.along.fixed_volume()?,
            b_along.fixed_volume()?,
            stitch.first_is_lower,
        );
        let opposite = binned_side(
            &link,
            first.opposite.fixed_volume()?,
            b_opposite.fixed_volume()?,
            stitch.first_is_lower,
        );
        trace!("stitched portal sides: along {:?}, opposite {:?}", along, opposite);
        Some(Portal {
            surface: stitch.surface,
            along,
            opposite,
        })
    }
}

impl fmt::Display for Portal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Portal at {:?}: along {:?}, opposite {:?}",
            self.surface.center().coords.as_slice(),
            self.along,
            self.opposite
        )
    }
}

fn merge_side(
    mine: &DetectorVolumeUpdator,
    theirs: &DetectorVolumeUpdator,
) -> Option<DetectorVolumeUpdator> {
    match (mine, theirs) {
        (DetectorVolumeUpdator::EndOfWorld, other) | (other, DetectorVolumeUpdator::EndOfWorld) => {
            Some(other.clone())
        }
        (a, b) if a == b => Some(a.clone()),
        _ => None,
    }
}

fn binned_side(
    link: &BinnedLink,
    first: Option<VolumeId>,
    second: Option<VolumeId>,
    first_is_lower: bool,
) -> DetectorVolumeUpdator {
    if first == second {
        return match first {
            Some(volume) => DetectorVolumeUpdator::Single(volume),
            None => DetectorVolumeUpdator::EndOfWorld,
        };
    }
    let volumes = if first_is_lower {
        vec![first, second]
    } else {
        vec![second, first]
    };
    DetectorVolumeUpdator::Binned(BinnedVolumes {
        link: link.clone(),
        volumes,
    })
}

type GeneratorFn = fn(&GeometryContext, &Isometry3<f64>, &VolumeBounds, VolumeId) -> Vec<Portal>;

/// Produces the boundary portals of a freshly placed volume.
#[derive(Clone, Copy)]
pub struct PortalGenerator(GeneratorFn);

impl PortalGenerator {
    pub fn new(generator: GeneratorFn) -> Self {
        Self(generator)
    }

    pub fn generate(
        &self,
        gctx: &GeometryContext,
        transform: &Isometry3<f64>,
        bounds: &VolumeBounds,
        volume: VolumeId,
    ) -> Vec<Portal> {
        (self.0)(gctx, transform, bounds, volume)
    }
}

impl Default for PortalGenerator {
    fn default() -> Self {
        Self(default_portal_generator)
    }
}

impl fmt::Debug for PortalGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PortalGenerator")
    }
}

/// One portal per boundary surface, owned by `volume` on its inner side.
///
/// The owner side follows the sign of (volume reference - surface reference)
/// projected on the surface normal; the other side is the end of the world
/// until the portal is fused or stitched.
pub fn default_portal_generator(
    _gctx: &GeometryContext,
    transform: &Isometry3<f64>,
    bounds: &VolumeBounds,
    volume: VolumeId,
) -> Vec<Portal> {
    bounds
        .decompose(transform)
        .into_iter()
        .map(|surface| {
            let owner = DetectorVolumeUpdator::Single(volume);
            let end = DetectorVolumeUpdator::EndOfWorld;
            if bounds.owner_is_along(transform, &surface) {
                Portal::with_links(surface, owner, end)
            } else {
                Portal::with_links(surface, end, owner)
            }
        })
        .collect()
}
