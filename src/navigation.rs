use nalgebra::{Point3, Vector3};
use serde::Serialize;

use crate::detector::{PortalId, VolumeId};
use crate::surface::Intersection;

/// Something a trajectory can hit inside a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationTarget {
    Portal(PortalId),
    Surface(usize), // index into the current volume's surfaces
}

impl NavigationTarget {
    pub fn portal(&self) -> Option<PortalId> {
        match self {
            NavigationTarget::Portal(portal) => Some(*portal),
            NavigationTarget::Surface(_) => None,
        }
    }
}

/// A reachable target with its intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavigationCandidate {
    pub target: NavigationTarget,
    pub intersection: Intersection,
}

/// Mutable per-trajectory context threaded through navigation queries.
///
/// One state belongs to one trajectory. The detector it is navigated
/// through is shared and never written to.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationState {
    pub position: Point3<f64>,
    pub direction: Vector3<f64>, // unit length
    pub abs_momentum: f64,
    pub charge: f64,
    pub current_volume: Option<VolumeId>,
    pub current_portal: Option<PortalId>,
    pub current_surface: Option<usize>, // last surface hit in the current volume
    pub candidates: Vec<NavigationCandidate>, // sorted by path length
    pub candidate: usize,                     // index of the active candidate
}

impl NavigationState {
    pub fn new(
        position: Point3<f64>,
        direction: Vector3<f64>,
        abs_momentum: f64,
        charge: f64,
    ) -> Self {
        Self {
            position,
            direction: direction.normalize(),
            abs_momentum,
            charge,
            current_volume: None,
            current_portal: None,
            current_surface: None,
            candidates: Vec::new(),
            candidate: 0,
        }
    }

    pub fn current_candidate(&self) -> Option<&NavigationCandidate> {
        self.candidates.get(self.candidate)
    }
}
