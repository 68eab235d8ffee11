use std::fmt;

use serde::Serialize;

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn levels_and_display() {
        let volume = GeometryId::volume(3);
        assert_eq!(volume.to_string(), "vol=3");
        let portal = volume.with_boundary(2);
        assert_eq!(portal.volume_index(), 3);
        assert_eq!(portal.to_string(), "vol=3|bnd=2");
        let surface = volume.with_sensitive(1);
        assert_eq!(surface.to_string(), "vol=3|sen=1");
        assert!(volume < portal && volume < surface);
        assert_eq!(GeometryId::default().to_string(), "undefined");
    }
}

/// Hierarchical identifier of a volume, one of its portals or one of its
/// surfaces. Indices are 1-based; `0` means the level is not set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GeometryId {
    volume: usize,
    boundary: usize,
    sensitive: usize,
}

impl GeometryId {
    pub fn volume(volume: usize) -> Self {
        Self {
            volume,
            ..Self::default()
        }
    }

    pub fn with_boundary(self, boundary: usize) -> Self {
        Self { boundary, ..self }
    }

    pub fn with_sensitive(self, sensitive: usize) -> Self {
        Self { sensitive, ..self }
    }

    pub fn volume_index(&self) -> usize {
        self.volume
    }

    pub fn boundary(&self) -> usize {
        self.boundary
    }

    pub fn sensitive(&self) -> usize {
        self.sensitive
    }
}

impl fmt::Display for GeometryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.volume == 0 {
            return write!(f, "undefined");
        }
        write!(f, "vol={}", self.volume)?;
        if self.boundary != 0 {
            write!(f, "|bnd={}", self.boundary)?;
        }
        if self.sensitive != 0 {
            write!(f, "|sen={}", self.sensitive)?;
        }
        Ok(())
    }
}
