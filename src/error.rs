//! Error type shared by the geometry construction and attachment layers.

use thiserror::Error;

/// Failures raised while resolving shapes, generating portals or connecting volumes.
///
/// Navigation itself never returns these: a misconfigured delegate panics,
/// and positions outside a binning range saturate into the edge bins.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// Shape parameters, extents or builder input that cannot describe a valid volume.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Two volumes were asked to attach but share no fusable or stitchable boundary.
    #[error("volumes '{first}' and '{second}' share no fusable or stitchable boundary")]
    Connectivity { first: String, second: String },

    /// Fusing would place both volumes on the same side of one boundary.
    #[error("cannot connect '{first}' and '{second}': {reason}")]
    PortalConflict {
        first: String,
        second: String,
        reason: String,
    },

    /// A blueprint referred to a volume that was never declared.
    #[error("unknown volume '{0}'")]
    UnknownVolume(String),
}

pub type Result<T> = std::result::Result<T, GeometryError>;

/// Shorthand used throughout the crate for the most common variant.
pub(crate) fn invalid(msg: impl Into<String>) -> GeometryError {
    GeometryError::InvalidConfiguration(msg.into())
}
