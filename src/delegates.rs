//! Navigation delegates.
//!
//! Two questions are answered during navigation: which boundaries can be
//! reached from inside a volume ([`SurfaceCandidatesUpdator`]) and which
//! volume lies behind a boundary ([`DetectorVolumeUpdator`]). Both are closed
//! sets of built-in strategies with a `Custom` variant for user code.
//! Every strategy writes its answer into the [`NavigationState`].
//!
//! An `Unbound` delegate is a configuration error: invoking it panics, and
//! [`crate::detector::DetectorBuilder::build`] refuses to freeze a detector
//! that still contains one.

use std::fmt;
use std::sync::Arc;

use crate::bins::BinnedLink;
use crate::context::GeometryContext;
use crate::detector::{Detector, DetectorVolume, VolumeId};
use crate::error::{invalid, Result};
use crate::navigation::{NavigationCandidate, NavigationState, NavigationTarget};
use crate::settings::ON_SURFACE_TOLERANCE;

#[cfg(test)]
mod tests {

    use super::*;
    use crate::bins::{Axis, BinningValue};
    use crate::bounds::BoundsType;
    use crate::detector::DetectorBuilder;
    use crate::structure::{ExternalStructure, VolumeStructureBuilder, VolumeStructureConfig};
    use crate::surface::{Surface, SurfaceBounds};
    use approx::assert_relative_eq;
    use nalgebra::{Isometry3, Point3, Vector3};
    use std::f64::consts::PI;

    fn barrel() -> ExternalStructure {
        let mut config = VolumeStructureConfig::new(BoundsType::Cylinder);
        config.bound_values = vec![10.0, 100.0, 300.0];
        VolumeStructureBuilder::new(config)
            .unwrap()
            .construct(&GeometryContext::default())
            .unwrap()
    }

    fn single_cylinder() -> Detector {
        let mut builder = DetectorBuilder::new("single");
        builder.add_volume(&GeometryContext::default(), "barrel", barrel()).unwrap();
        builder.build().unwrap()
    }

    fn layer(r: f64) -> Surface {
        let bounds = SurfaceBounds::Cylinder { r, half_z: 300.0, half_phi: PI, avg_phi: 0.0 };
        Surface::new(Isometry3::identity(), bounds)
    }

    fn layered_cylinder(layers: &[f64]) -> Detector {
        let surfaces = layers.iter().map(|r| layer(*r)).collect();
        let mut builder = DetectorBuilder::new("layered");
        builder
            .add_volume_with_surfaces(&GeometryContext::default(), "barrel", barrel(), surfaces)
            .unwrap();
        builder.build().unwrap()
    }

    fn state_at(z: f64) -> NavigationState {
        NavigationState::new(Point3::new(50.0, 0.0, z), Vector3::z(), 1.0, -1.0)
    }

    fn targets(state: &NavigationState) -> Vec<NavigationTarget> {
        state.candidates.iter().map(|c| c.target).collect()
    }

    /// Picks the volume numbered by the context tag.
    #[derive(Debug)]
    struct ByContextTag;

    impl DetectorVolumeFinder for ByContextTag {
        fn find(
            &self,
            gctx: &GeometryContext,
            detector: &Detector,
            _: &NavigationState,
        ) -> Option<VolumeId> {
            let id = VolumeId(gctx.tag() as usize);
            (id.0 < detector.volumes().len()).then_some(id)
        }
    }

    #[derive(Debug)]
    struct OnlyLast;

    impl SurfaceCandidatesFinder for OnlyLast {
        fn update(
            &self,
            _: &GeometryContext,
            detector: &Detector,
            volume: &DetectorVolume,
            state: &mut NavigationState,
        ) {
            let last = volume.portals().last().copied().map(NavigationTarget::Portal);
            fill_candidates(detector, volume, state, last);
        }
    }

    #[test]
    #[should_panic(expected = "not connected")]
    fn unbound_volume_updator_panics() {
        let detector = single_cylinder();
        let mut state = state_at(0.0);
        DetectorVolumeUpdator::Unbound.update(&GeometryContext::default(), &detector, &mut state);
    }

    #[test]
    #[should_panic(expected = "not connected")]
    fn unbound_candidates_updator_panics() {
        let detector = single_cylinder();
        let mut state = state_at(0.0);
        let volume = detector.volume(VolumeId(0));
        let gctx = GeometryContext::default();
        SurfaceCandidatesUpdator::Unbound.update(&gctx, &detector, volume, &mut state);
    }

    #[test]
    fn fixed_and_end_of_world() {
        let detector = single_cylinder();
        let gctx = GeometryContext::default();
        let mut state = state_at(0.0);
        DetectorVolumeUpdator::Single(VolumeId(0)).update(&gctx, &detector, &mut state);
        assert_eq!(state.current_volume, Some(VolumeId(0)));
        DetectorVolumeUpdator::EndOfWorld.update(&gctx, &detector, &mut state);
        assert_eq!(state.current_volume, None);
    }

    #[test]
    fn trial_and_error_searches_volumes() {
        let detector = single_cylinder();
        let gctx = GeometryContext::default();
        let mut state = state_at(0.0);
        DetectorVolumeUpdator::TrialAndError.update(&gctx, &detector, &mut state);
        assert_eq!(state.current_volume, Some(VolumeId(0)));
        let mut outside = state_at(1000.0);
        outside.current_volume = Some(VolumeId(0));
        DetectorVolumeUpdator::TrialAndError.update(&gctx, &detector, &mut outside);
        assert_eq!(outside.current_volume, None);
    }

    #[test]
    fn binned_volumes_by_position() {
        let detector = single_cylinder();
        let gctx = GeometryContext::default();
        let axis = Axis::variable(vec![-300.0, 0.0, 300.0]).unwrap();
        let link = BinnedLink::new(axis, BinningValue::Z).unwrap();
        let binned = BinnedVolumes::new(link, vec![Some(VolumeId(0)), None]).unwrap();
        let updator = DetectorVolumeUpdator::Binned(binned);
        let mut state = state_at(-100.0);
        updator.update(&gctx, &detector, &mut state);
        assert_eq!(state.current_volume, Some(VolumeId(0)));
        let mut state = state_at(100.0);
        updator.update(&gctx, &detector, &mut state);
        assert_eq!(state.current_volume, None);

        let axis = Axis::equidistant(0.0, 1.0, 3).unwrap();
        let link = BinnedLink::new(axis, BinningValue::Z).unwrap();
        assert!(BinnedVolumes::new(link, vec![None]).is_err());
    }

    #[test]
    fn custom_delegates() {
        let detector = single_cylinder();
        let gctx = GeometryContext::default();
        let mut state = state_at(0.0);
        let finder = DetectorVolumeUpdator::Custom(Arc::new(ByContextTag));
        finder.update(&GeometryContext::new(3), &detector, &mut state);
        assert_eq!(state.current_volume, None);
        finder.update(&gctx, &detector, &mut state);
        assert_eq!(state.current_volume, Some(VolumeId(0)));

        let volume = detector.volume(VolumeId(0));
        let custom = SurfaceCandidatesUpdator::Custom(Arc::new(OnlyLast));
        // inner cylinder is not reachable along +z
        custom.update(&gctx, &detector, volume, &mut state);
        assert!(state.candidates.is_empty());
    }

    #[test]
    fn all_portals_sorted_by_path_length() {
        let detector = single_cylinder();
        let gctx = GeometryContext::default();
        let volume = detector.volume(VolumeId(0));
        let direction = Vector3::new(1.0, 0.0, 1.0);
        let mut state = NavigationState::new(Point3::new(50.0, 0.0, 0.0), direction, 1.0, 1.0);
        SurfaceCandidatesUpdator::AllPortals.update(&gctx, &detector, volume, &mut state);
        assert_eq!(state.candidates.len(), 1);
        let first = state.current_candidate().unwrap();
        // outer cylinder at r = 100 reached after 50 in x
        assert_relative_eq!(first.intersection.position.x, 100.0, epsilon = 1e-9);

        let direction = Vector3::new(-1.0, 0.0, 0.01);
        let mut state = NavigationState::new(Point3::new(50.0, 0.0, 0.0), direction, 1.0, 1.0);
        SurfaceCandidatesUpdator::AllPortals.update(&gctx, &detector, volume, &mut state);
        assert!(state.candidates.len() >= 2);
        assert!(state
            .candidates
            .windows(2)
            .all(|w| w[0].intersection.path_length <= w[1].intersection.path_length));
        assert_relative_eq!(state.candidates[0].intersection.position.x, 10.0, epsilon = 1e-3);
    }

    #[test]
    fn internal_surface_hit_before_outer_portal() {
        let detector = layered_cylinder(&[70.0]);
        let gctx = GeometryContext::default();
        let volume = detector.volume(VolumeId(0));
        let outer = NavigationTarget::Portal(volume.portals()[2]);
        let mut state = NavigationState::new(Point3::new(50.0, 0.0, 0.0), Vector3::x(), 1.0, 1.0);

        // portals only: the layer is invisible
        SurfaceCandidatesUpdator::AllPortals.update(&gctx, &detector, volume, &mut state);
        assert_eq!(targets(&state), vec![outer]);

        volume.update_navigation_state(&gctx, &detector, &mut state);
        assert_eq!(targets(&state), vec![NavigationTarget::Surface(0), outer]);
        assert_relative_eq!(state.candidates[0].intersection.path_length, 20.0, epsilon = 1e-9);
        assert_relative_eq!(state.candidates[1].intersection.path_length, 50.0, epsilon = 1e-9);

        // standing on the layer it is no longer a candidate
        state.position = Point3::new(70.0, 0.0, 0.0);
        volume.update_navigation_state(&gctx, &detector, &mut state);
        assert_eq!(targets(&state), vec![outer]);
    }

    #[test]
    fn ties_keep_portals_then_surface_order() {
        // two coincident layers and one on top of the outer portal
        let detector = layered_cylinder(&[70.0, 70.0, 100.0]);
        let gctx = GeometryContext::default();
        let volume = detector.volume(VolumeId(0));
        let outer = NavigationTarget::Portal(volume.portals()[2]);
        let expected = vec![
            NavigationTarget::Surface(0),
            NavigationTarget::Surface(1),
            outer,
            NavigationTarget::Surface(2),
        ];
        for _ in 0..3 {
            let mut state =
                NavigationState::new(Point3::new(50.0, 0.0, 0.0), Vector3::x(), 1.0, 1.0);
            volume.update_navigation_state(&gctx, &detector, &mut state);
            assert_eq!(targets(&state), expected);
        }
    }

    #[test]
    fn unknown_surface_index_skipped() {
        let detector = layered_cylinder(&[70.0]);
        let volume = detector.volume(VolumeId(0));
        let mut state = NavigationState::new(Point3::new(50.0, 0.0, 0.0), Vector3::x(), 1.0, 1.0);
        let wanted = [NavigationTarget::Surface(4), NavigationTarget::Surface(0)];
        fill_candidates(&detector, volume, &mut state, wanted);
        assert_eq!(targets(&state), vec![NavigationTarget::Surface(0)]);
    }

    #[test]
    fn binned_portals_select_subset() {
        let detector = single_cylinder();
        let gctx = GeometryContext::default();
        let volume = detector.volume(VolumeId(0));
        let axis = Axis::variable(vec![-300.0, 0.0, 300.0]).unwrap();
        let link = BinnedLink::new(axis, BinningValue::Z)
            .unwrap()
            .with_transform(Isometry3::identity());
        // lower half only sees the negative disc, upper half only the positive disc
        let table = BinnedPortals::new(link, vec![vec![0], vec![1]]);
        let binned = SurfaceCandidatesUpdator::Binned(table);
        let mut state = NavigationState::new(Point3::new(50.0, 0.0, 100.0), Vector3::z(), 1.0, 1.0);
        binned.update(&gctx, &detector, volume, &mut state);
        assert_eq!(targets(&state), vec![NavigationTarget::Portal(volume.portals()[1])]);
        let mut state =
            NavigationState::new(Point3::new(50.0, 0.0, 100.0), -Vector3::z(), 1.0, 1.0);
        binned.update(&gctx, &detector, volume, &mut state);
        assert!(state.candidates.is_empty());
    }
}

/// User-provided volume lookup.
pub trait DetectorVolumeFinder: Send + Sync + fmt::Debug {
    fn find(
        &self,
        gctx: &GeometryContext,
        detector: &Detector,
        state: &NavigationState,
    ) -> Option<VolumeId>;
}

/// User-provided candidate search; implementations usually end in [`fill_candidates`].
pub trait SurfaceCandidatesFinder: Send + Sync + fmt::Debug {
    fn update(
        &self,
        gctx: &GeometryContext,
        detector: &Detector,
        volume: &DetectorVolume,
        state: &mut NavigationState,
    );
}

/// Volumes indexed by the bin of the current position; `None` is the end of the world.
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedVolumes {
    pub link: BinnedLink,
    pub volumes: Vec<Option<VolumeId>>,
}

impl BinnedVolumes {
    pub fn new(link: BinnedLink, volumes: Vec<Option<VolumeId>>) -> Result<Self> {
        if volumes.len() != link.n_bins() {
            return Err(invalid(format!(
                "binned volume link has {} bins but {} entries",
                link.n_bins(),
                volumes.len()
            )));
        }
        Ok(Self { link, volumes })
    }
}

/// Portal subsets indexed by bin; entries index the owning volume's portal list.
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedPortals {
    pub link: BinnedLink,
    pub bins: Vec<Vec<usize>>,
}

impl BinnedPortals {
    pub fn new(link: BinnedLink, bins: Vec<Vec<usize>>) -> Self {
        Self { link, bins }
    }

    /// Check the table against the volume it will be attached to.
    pub fn validate(&self, n_portals: usize) -> Result<()> {
        if self.bins.len() != self.link.n_bins() {
            return Err(invalid(format!(
                "binned portal link has {} bins but {} entries",
                self.link.n_bins(),
                self.bins.len()
            )));
        }
        if let Some(bad) = self.bins.iter().flatten().find(|i| **i >= n_portals) {
            return Err(invalid(format!(
                "binned portal index {} out of range for a volume with {} portals",
                bad, n_portals
            )));
        }
        Ok(())
    }
}

/// Decides the volume behind a portal, or the first volume of a trajectory.
#[derive(Clone, Default)]
pub enum DetectorVolumeUpdator {
    #[default]
    Unbound,
    EndOfWorld,
    Single(VolumeId),
    Binned(BinnedVolumes),
    TrialAndError,
    Custom(Arc<dyn DetectorVolumeFinder>),
}

impl DetectorVolumeUpdator {
    pub fn update(&self, gctx: &GeometryContext, detector: &Detector, state: &mut NavigationState) {
        state.current_volume = match self {
            DetectorVolumeUpdator::Unbound => panic!("detector volume updator is not connected"),
            DetectorVolumeUpdator::EndOfWorld => None,
            DetectorVolumeUpdator::Single(volume) => Some(*volume),
            DetectorVolumeUpdator::Binned(binned) => {
                binned.volumes[binned.link.index(&state.position)]
            }
            DetectorVolumeUpdator::TrialAndError => detector.search_volume(&state.position),
            DetectorVolumeUpdator::Custom(finder) => finder.find(gctx, detector, state),
        };
    }

    pub fn is_connected(&self) -> bool {
        !matches!(self, DetectorVolumeUpdator::Unbound)
    }

    pub fn is_end_of_world(&self) -> bool {
        matches!(self, DetectorVolumeUpdator::EndOfWorld)
    }

    /// The single volume (or the end of the world) this link always yields.
    pub fn fixed_volume(&self) -> Option<Option<VolumeId>> {
        match self {
            DetectorVolumeUpdator::EndOfWorld => Some(None),
            DetectorVolumeUpdator::Single(volume) => Some(Some(*volume)),
            _ => None,
        }
    }
}

impl PartialEq for DetectorVolumeUpdator {
    fn eq(&self, other: &Self) -> bool {
        use DetectorVolumeUpdator::*;
        match (self, other) {
            (Unbound, Unbound) => true,
            (EndOfWorld, EndOfWorld) => true,
            (TrialAndError, TrialAndError) => true,
            (Single(a), Single(b)) => a == b,
            (Binned(a), Binned(b)) => a == b,
            (Custom(a), Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for DetectorVolumeUpdator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorVolumeUpdator::Unbound => write!(f, "Unbound"),
            DetectorVolumeUpdator::EndOfWorld => write!(f, "EndOfWorld"),
            DetectorVolumeUpdator::Single(volume) => write!(f, "Single({})", volume),
            DetectorVolumeUpdator::Binned(binned) => write!(f, "Binned({:?})", binned.volumes),
            DetectorVolumeUpdator::TrialAndError => write!(f, "TrialAndError"),
            DetectorVolumeUpdator::Custom(finder) => write!(f, "Custom({:?})", finder),
        }
    }
}

/// Decides which portals and surfaces of the current volume are intersection candidates.
#[derive(Debug, Clone, Default)]
pub enum SurfaceCandidatesUpdator {
    #[default]
    Unbound,
    AllPortals,
    /// Every portal followed by every internal surface of the volume.
    AllPortalsAndSurfaces,
    Binned(BinnedPortals),
    Custom(Arc<dyn SurfaceCandidatesFinder>),
}

impl SurfaceCandidatesUpdator {
    pub fn update(
        &self,
        gctx: &GeometryContext,
        detector: &Detector,
        volume: &DetectorVolume,
        state: &mut NavigationState,
    ) {
        let portals = volume.portals().iter().copied().map(NavigationTarget::Portal);
        match self {
            SurfaceCandidatesUpdator::Unbound => {
                panic!("surface candidates updator is not connected")
            }
            SurfaceCandidatesUpdator::AllPortals => {
                fill_candidates(detector, volume, state, portals)
            }
            SurfaceCandidatesUpdator::AllPortalsAndSurfaces => {
                let surfaces = (0..volume.surfaces().len()).map(NavigationTarget::Surface);
                fill_candidates(detector, volume, state, portals.chain(surfaces))
            }
            SurfaceCandidatesUpdator::Binned(binned) => {
                let bin = binned.link.index(&state.position);
                let portals = volume.portals();
                let targets = binned.bins[bin]
                    .iter()
                    .map(|i| NavigationTarget::Portal(portals[*i]));
                fill_candidates(detector, volume, state, targets)
            }
            SurfaceCandidatesUpdator::Custom(finder) => {
                finder.update(gctx, detector, volume, state)
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        !matches!(self, SurfaceCandidatesUpdator::Unbound)
    }
}

/// Intersect `targets` from the state's position and store the reachable
/// ones, nearest first, as the state's candidates.
///
/// Intersections within the on-surface tolerance are dropped so the portal
/// or surface just hit is not found again. Ties keep the order of `targets`.
/// Surface indices refer to `volume`; unknown indices are skipped.
pub fn fill_candidates(
    detector: &Detector,
    volume: &DetectorVolume,
    state: &mut NavigationState,
    targets: impl IntoIterator<Item = NavigationTarget>,
) {
    let position = state.position;
    let direction = state.direction;
    let mut candidates = std::mem::take(&mut state.candidates);
    candidates.clear();
    candidates.extend(targets.into_iter().filter_map(|target| {
        let surface = match target {
            NavigationTarget::Portal(portal) => detector.portal(portal).surface(),
            NavigationTarget::Surface(index) => volume.surfaces().get(index)?,
        };
        surface
            .intersect(&position, &direction, ON_SURFACE_TOLERANCE)
            .map(|intersection| NavigationCandidate { target, intersection })
    }));
    candidates.sort_by(|a, b| a.intersection.path_length.total_cmp(&b.intersection.path_length));
    state.candidates = candidates;
    state.candidate = 0;
}
