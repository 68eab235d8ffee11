//! Straight-line navigation through a frozen detector.

use indicatif::ProgressBar;
use log::{trace, warn};
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use serde::Serialize;

use crate::context::GeometryContext;
use crate::detector::{Detector, VolumeId};
use crate::geometry_id::GeometryId;
use crate::navigation::{NavigationState, NavigationTarget};


/// Why a trace ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    Exited,
    StartedOutside,
    NavigationBreak, // nothing reachable left in the current volume
    MaxStepsReached,
}

/// One portal crossing or surface hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceStep {
    pub volume: VolumeId, // volume the step was taken in
    pub target: NavigationTarget,
    pub geometry_id: GeometryId,
    pub position: Point3<f64>,
    pub path_length: f64,
}

/// The portal crossings and surface hits of one trajectory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationTrace {
    pub origin: Point3<f64>,
    pub direction: Vector3<f64>,
    pub steps: Vec<TraceStep>,
    pub path_length: f64,
    pub status: TraceStatus,
}

impl NavigationTrace {
    /// Steps that crossed a portal.
    pub fn crossings(&self) -> impl Iterator<Item = &TraceStep> {
        self.steps.iter().filter(|s| s.target.portal().is_some())
    }
}

/// Moves straight-line trajectories from target to target.
#[derive(Debug, Clone, Copy)]
pub struct Navigator {
    max_steps: usize,
}

impl Navigator {
    pub fn new(max_steps: usize) -> Self {
        Self { max_steps }
    }

    /// Follow one trajectory until it leaves the detector.
    ///
    /// **How it Works**: The detector's volume finder sets the start volume.
    /// In each volume the candidate strategy lists the reachable portals and
    /// surfaces, and the state jumps to the nearest one. A surface hit is
    /// recorded and the trajectory stays in its volume; at a portal the
    /// portal decides the next volume from the direction of travel.
    pub fn trace(
        &self,
        gctx: &GeometryContext,
        detector: &Detector,
        mut state: NavigationState,
    ) -> NavigationTrace {
        let mut trace = NavigationTrace {
            origin: state.position,
            direction: state.direction,
            steps: Vec::new(),
            path_length: 0.0,
            status: TraceStatus::StartedOutside,
        };

        detector.find_volume(gctx, &mut state);
        let Some(mut volume) = state.current_volume else {
            return trace;
        };

        trace.status = loop {
            if trace.steps.len() >= self.max_steps {
                break TraceStatus::MaxStepsReached;
            }
            detector
                .volume(volume)
                .update_navigation_state(gctx, detector, &mut state);
            let Some(candidate) = state.current_candidate().copied() else {
                warn!(
                    "nothing reachable in {} from {:?} along {:?}",
                    volume,
                    state.position.coords.as_slice(),
                    state.direction.as_slice()
                );
                break TraceStatus::NavigationBreak;
            };

            state.position = candidate.intersection.position;
            match candidate.target {
                NavigationTarget::Portal(portal) => {
                    state.current_portal = Some(portal);
                    state.current_surface = None;
                    detector
                        .portal(portal)
                        .update_volume(gctx, detector, &mut state);
                    trace!("{} -> {:?} through {}", volume, state.current_volume, portal);
                }
                NavigationTarget::Surface(index) => {
                    state.current_surface = Some(index);
                    trace!("hit surface {} in {}", index, volume);
                }
            }

            trace.path_length += candidate.intersection.path_length;
            trace.steps.push(TraceStep {
                volume,
                target: candidate.target,
                geometry_id: detector.geometry_id(volume, candidate.target),
                position: state.position,
                path_length: candidate.intersection.path_length,
            });

            match state.current_volume {
                Some(next) => volume = next,
                None => break TraceStatus::Exited,
            }
        };
        trace
    }

    /// Trace many trajectories in parallel; the output keeps the input order.
    pub fn trace_all(
        &self,
        gctx: &GeometryContext,
        detector: &Detector,
        states: Vec<NavigationState>,
        pb: &ProgressBar,
    ) -> Vec<NavigationTrace> {
        states
            .into_par_iter()
            .map(|state| {
                let trace = self.trace(gctx, detector, state);
                pb.inc(1);
                trace
            })
            .collect()
    }
}

/// Start states for straight lines from `origin` along each direction.
pub fn initial_states(
    origin: &Point3<f64>,
    directions: &[Vector3<f64>],
    abs_momentum: f64,
    charge: f64,
) -> Vec<NavigationState> {
    directions
        .iter()
        .map(|d| NavigationState::new(*origin, *d, abs_momentum, charge))
        .collect()
}
