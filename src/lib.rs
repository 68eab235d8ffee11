//! Detector volume construction and portal-based navigation.
//!
//! Volumes are resolved from declarative shape descriptions, decomposed into
//! portals, attached into a connected detector and then navigated by many
//! trajectories at once.

pub mod bins;
pub mod blueprint;
pub mod bounds;
pub mod context;
pub mod delegates;
pub mod detector;
pub mod error;
pub mod extent;
pub mod geometry_id;
pub mod navigation;
pub mod navigator;
pub mod portal;
pub mod settings;
pub mod structure;
pub mod surface;
