//! Volume shapes and their decomposition into boundary surfaces.
//!
//! **Context**: A detector volume is described by a bounds type and an ordered
//! list of parameters. The navigation layer never looks at these parameters
//! directly; it needs the boundary surfaces of the shape, a containment test
//! and a reference point from which each boundary can be oriented.
//!
//! **How it Works**: Each family is a small struct with named fields that can
//! be built from, and flattened back into, its exact parameter list.
//! [`VolumeBounds`] dispatches over the families. Decomposition produces the
//! boundary surfaces in a fixed order per family.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use nalgebra::{Isometry3, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{invalid, GeometryError, Result};
use crate::settings::{BOUNDARY_TOLERANCE, DEFAULT_POLYHEDRON_SEGMENTS};
use crate::surface::{frame_from_axes, in_phi_sector, is_full_phi, Surface, SurfaceBounds};


/// Tag naming a volume shape family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundsType {
    Cone,
    Cuboid,
    CutoutCylinder,
    Cylinder,
    GenericCuboid,
    Trapezoid,
}

impl BoundsType {
    /// Number of parameters a fully specified shape carries.
    pub fn arity(self) -> usize {
        match self {
            BoundsType::Cone => 7,
            BoundsType::Cuboid => 3,
            BoundsType::CutoutCylinder => 5,
            BoundsType::Cylinder => 5,
            BoundsType::GenericCuboid => 24,
            BoundsType::Trapezoid => 6,
        }
    }

    /// Smallest number of explicit parameters; the remainder have defaults.
    pub fn required(self) -> usize {
        match self {
            BoundsType::Cone => 5,
            BoundsType::Cuboid => 3,
            BoundsType::CutoutCylinder => 5,
            BoundsType::Cylinder => 3,
            BoundsType::GenericCuboid => 24,
            BoundsType::Trapezoid => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BoundsType::Cone => "cone",
            BoundsType::Cuboid => "cuboid",
            BoundsType::CutoutCylinder => "cutout_cylinder",
            BoundsType::Cylinder => "cylinder",
            BoundsType::GenericCuboid => "generic_cuboid",
            BoundsType::Trapezoid => "trapezoid",
        }
    }
}

impl FromStr for BoundsType {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cone" => Ok(BoundsType::Cone),
            "cuboid" => Ok(BoundsType::Cuboid),
            "cutout_cylinder" => Ok(BoundsType::CutoutCylinder),
            "cylinder" => Ok(BoundsType::Cylinder),
            "generic_cuboid" => Ok(BoundsType::GenericCuboid),
            "trapezoid" => Ok(BoundsType::Trapezoid),
            other => Err(invalid(format!("unknown bounds type '{}'", other))),
        }
    }
}

impl fmt::Display for BoundsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Axis-aligned bounding box in global coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl BoundingBox {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Self {
        let mut min = Point3::new(f64::MAX, f64::MAX, f64::MAX);
        let mut max = Point3::new(f64::MIN, f64::MIN, f64::MIN);
        for p in points {
            min = min.inf(p);
            max = max.sup(p);
        }
        Self { min, max }
    }

    pub fn contains_point(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }
}

fn check_values(bounds_type: BoundsType, values: &[f64]) -> Result<()> {
    if values.len() != bounds_type.arity() {
        return Err(invalid(format!(
            "{} bounds need exactly {} values, got {}",
            bounds_type,
            bounds_type.arity(),
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(invalid(format!("{} bounds values must be finite: {:?}", bounds_type, values)));
    }
    Ok(())
}

fn check_phi(bounds_type: BoundsType, half_phi: f64, avg_phi: f64) -> Result<()> {
    if !(half_phi > 0.0 && half_phi <= PI + 1e-12) {
        return Err(invalid(format!("{} half phi {} outside (0, pi]", bounds_type, half_phi)));
    }
    if avg_phi.abs() > PI + 1e-12 {
        return Err(invalid(format!("{} average phi {} outside [-pi, pi]", bounds_type, avg_phi)));
    }
    Ok(())
}

/// Box with half lengths along the local axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CuboidBounds {
    pub half_x: f64,
    pub half_y: f64,
    pub half_z: f64,
}

impl CuboidBounds {
    pub fn new(half_x: f64, half_y: f64, half_z: f64) -> Result<Self> {
        if !(half_x > 0.0 && half_y > 0.0 && half_z > 0.0) {
            return Err(invalid(format!(
                "cuboid half lengths must be positive: ({}, {}, {})",
                half_x, half_y, half_z
            )));
        }
        Ok(Self { half_x, half_y, half_z })
    }

    fn corners(&self) -> Vec<Point3<f64>> {
        let (x, y, z) = (self.half_x, self.half_y, self.half_z);
        vec![
            Point3::new(-x, -y, -z),
            Point3::new(x, -y, -z),
            Point3::new(x, y, -z),
            Point3::new(-x, y, -z),
            Point3::new(-x, -y, z),
            Point3::new(x, -y, z),
            Point3::new(x, y, z),
            Point3::new(-x, y, z),
        ]
    }
}

/// Tube or tube sector along the local z axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CylinderBounds {
    pub r_min: f64,
    pub r_max: f64,
    pub half_z: f64,
    pub half_phi: f64,
    pub avg_phi: f64,
}

impl CylinderBounds {
    pub fn new(
        r_min: f64,
        r_max: f64,
        half_z: f64,
        half_phi: f64,
        avg_phi: f64,
    ) -> Result<Self> {
        if !(r_min >= 0.0 && r_max > r_min) {
            return Err(invalid(format!(
                "cylinder radii must satisfy 0 <= r_min < r_max: ({}, {})",
                r_min, r_max
            )));
        }
        if !(half_z > 0.0) {
            return Err(invalid(format!("cylinder half length must be positive: {}", half_z)));
        }
        check_phi(BoundsType::Cylinder, half_phi, avg_phi)?;
        Ok(Self { r_min, r_max, half_z, half_phi, avg_phi })
    }

    fn r_mid(&self) -> f64 {
        0.5 * (self.r_min + self.r_max)
    }
}

/// Tube whose inner radius grows from `r_min` to `r_med` for |z| < `half_z_cutout`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutoutCylinderBounds {
    pub r_min: f64,
    pub r_med: f64,
    pub r_max: f64,
    pub half_z: f64,
    pub half_z_cutout: f64,
}

impl CutoutCylinderBounds {
    pub fn new(
        r_min: f64,
        r_med: f64,
        r_max: f64,
        half_z: f64,
        half_z_cutout: f64,
    ) -> Result<Self> {
        if !(r_min >= 0.0 && r_med > r_min && r_max > r_med) {
            return Err(invalid(format!(
                "cutout cylinder radii must satisfy 0 <= r_min < r_med < r_max: ({}, {}, {})",
                r_min, r_med, r_max
            )));
        }
        if !(half_z_cutout > 0.0 && half_z > half_z_cutout) {
            return Err(invalid(format!(
                "cutout cylinder half lengths must satisfy 0 < cutout < total: ({}, {})",
                half_z, half_z_cutout
            )));
        }
        Ok(Self { r_min, r_med, r_max, half_z, half_z_cutout })
    }
}

/// Trapezoidal prism: x half length `half_x_neg_y` at -y and `half_x_pos_y` at +y.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrapezoidBounds {
    pub half_x_neg_y: f64,
    pub half_x_pos_y: f64,
    pub half_y: f64,
    pub half_z: f64,
    pub alpha: f64, // opening angle of the side at -x
    pub beta: f64,  // opening angle of the side at +x
}

impl TrapezoidBounds {
    pub fn new(half_x_neg_y: f64, half_x_pos_y: f64, half_y: f64, half_z: f64) -> Result<Self> {
        let angle = Self::side_angle(half_x_neg_y, half_x_pos_y, half_y);
        Self::with_angles(half_x_neg_y, half_x_pos_y, half_y, half_z, angle, angle)
    }

    pub fn with_angles(
        half_x_neg_y: f64,
        half_x_pos_y: f64,
        half_y: f64,
        half_z: f64,
        alpha: f64,
        beta: f64,
    ) -> Result<Self> {
        if !(half_x_neg_y >= 0.0 && half_x_pos_y >= 0.0 && half_x_neg_y + half_x_pos_y > 0.0) {
            return Err(invalid(format!(
                "trapezoid x half lengths must be non-negative and not both zero: ({}, {})",
                half_x_neg_y, half_x_pos_y
            )));
        }
        if !(half_y > 0.0 && half_z > 0.0) {
            return Err(invalid(format!(
                "trapezoid half lengths must be positive: ({}, {})",
                half_y, half_z
            )));
        }
        let expected = Self::side_angle(half_x_neg_y, half_x_pos_y, half_y);
        if (alpha - expected).abs() > 1e-6 || (beta - expected).abs() > 1e-6 {
            return Err(invalid(format!(
                "trapezoid side angles ({}, {}) do not match the half lengths, expected {}",
                alpha, beta, expected
            )));
        }
        Ok(Self { half_x_neg_y, half_x_pos_y, half_y, half_z, alpha, beta })
    }

    pub fn side_angle(half_x_neg_y: f64, half_x_pos_y: f64, half_y: f64) -> f64 {
        (2.0 * half_y).atan2(half_x_pos_y - half_x_neg_y)
    }

    fn half_x_at(&self, y: f64) -> f64 {
        let frac = (y + self.half_y) / (2.0 * self.half_y);
        self.half_x_neg_y + frac * (self.half_x_pos_y - self.half_x_neg_y)
    }

    fn corners(&self) -> Vec<Point3<f64>> {
        let (a, b, y, z) = (self.half_x_neg_y, self.half_x_pos_y, self.half_y, self.half_z);
        vec![
            Point3::new(-a, -y, -z),
            Point3::new(a, -y, -z),
            Point3::new(b, y, -z),
            Point3::new(-b, y, -z),
            Point3::new(-a, -y, z),
            Point3::new(a, -y, z),
            Point3::new(b, y, z),
            Point3::new(-b, y, z),
        ]
    }
}

/// Hexahedron from eight vertices: 0..4 one face, 4..8 the opposite face in matching order.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericCuboidBounds {
    pub vertices: [Point3<f64>; 8],
}

const GENERIC_CUBOID_FACES: [[usize; 4]; 6] = [
    [0, 1, 2, 3],
    [4, 5, 6, 7],
    [0, 1, 5, 4],
    [1, 2, 6, 5],
    [2, 3, 7, 6],
    [3, 0, 4, 7],
];

impl GenericCuboidBounds {
    pub fn new(vertices: [Point3<f64>; 8]) -> Result<Self> {
        let bounds = Self { vertices };
        for face in GENERIC_CUBOID_FACES {
            let (frame, points) = bounds.face_frame(face);
            let normal = frame.rotation * Vector3::z();
            if !normal.iter().all(|c| c.is_finite()) {
                return Err(invalid(format!("generic cuboid face {:?} is degenerate", face)));
            }
            let center = Point3::from(frame.translation.vector);
            if points.iter().any(|p| (p - center).dot(&normal).abs() > 1e-6) {
                return Err(invalid(format!("generic cuboid face {:?} is not planar", face)));
            }
        }
        let centroid = bounds.centroid();
        if bounds.outward_planes().iter().any(|(p, n)| (centroid - p).dot(n) > -1e-9) {
            return Err(invalid("generic cuboid vertices do not enclose a volume"));
        }
        Ok(bounds)
    }

    fn centroid(&self) -> Point3<f64> {
        let sum = self.vertices.iter().fold(Vector3::zeros(), |acc, v| acc + v.coords);
        Point3::from(sum / 8.0)
    }

    fn face_frame(&self, face: [usize; 4]) -> (Isometry3<f64>, [Point3<f64>; 4]) {
        let points = face.map(|i| self.vertices[i]);
        let sum = points.iter().fold(Vector3::zeros(), |acc, v| acc + v.coords);
        let center = Point3::from(sum / 4.0);
        let frame = frame_from_axes(center, points[1] - points[0], points[3] - points[0]);
        (frame, points)
    }

    /// Face planes as (point, outward normal).
    fn outward_planes(&self) -> Vec<(Point3<f64>, Vector3<f64>)> {
        let centroid = self.centroid();
        GENERIC_CUBOID_FACES
            .iter()
            .map(|face| {
                let (frame, _) = self.face_frame(*face);
                let center = Point3::from(frame.translation.vector);
                let mut normal = frame.rotation * Vector3::z();
                if (centroid - center).dot(&normal) > 0.0 {
                    normal = -normal;
                }
                (center, normal)
            })
            .collect()
    }
}

/// Region between two coaxial cones, z in [-half_z, half_z].
///
/// The radius of each cone is `tan(alpha) * (z + offset_z)`; a zero inner
/// angle means the volume reaches the axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConeBounds {
    pub inner_alpha: f64,
    pub inner_offset_z: f64,
    pub outer_alpha: f64,
    pub outer_offset_z: f64,
    pub half_z: f64,
    pub avg_phi: f64,
    pub half_phi: f64,
}

impl ConeBounds {
    pub fn new(
        inner_alpha: f64,
        inner_offset_z: f64,
        outer_alpha: f64,
        outer_offset_z: f64,
        half_z: f64,
        avg_phi: f64,
        half_phi: f64,
    ) -> Result<Self> {
        let bounds = Self {
            inner_alpha,
            inner_offset_z,
            outer_alpha,
            outer_offset_z,
            half_z,
            avg_phi,
            half_phi,
        };
        if !(half_z > 0.0) {
            return Err(invalid(format!("cone half length must be positive: {}", half_z)));
        }
        let opening = 0.0..0.5 * PI;
        if !(outer_alpha > 0.0
            && opening.contains(&outer_alpha)
            && opening.contains(&inner_alpha))
        {
            return Err(invalid(format!(
                "cone opening angles must lie in [0, pi/2): ({}, {})",
                inner_alpha, outer_alpha
            )));
        }
        if outer_offset_z <= half_z || (inner_alpha > 0.0 && inner_offset_z < half_z) {
            return Err(invalid(format!(
                "cone apex must lie below the volume: offsets ({}, {}) for half length {}",
                inner_offset_z, outer_offset_z, half_z
            )));
        }
        if [-half_z, half_z]
            .iter()
            .any(|z| bounds.inner_r(*z) >= bounds.outer_r(*z))
        {
            return Err(invalid("cone inner surface must stay inside the outer surface"));
        }
        check_phi(BoundsType::Cone, half_phi, avg_phi)?;
        Ok(bounds)
    }

    fn inner_r(&self, z: f64) -> f64 {
        if self.inner_alpha > 0.0 {
            self.inner_alpha.tan() * (z + self.inner_offset_z)
        } else {
            0.0
        }
    }

    fn outer_r(&self, z: f64) -> f64 {
        self.outer_alpha.tan() * (z + self.outer_offset_z)
    }
}

/// Immutable volume shape.
#[derive(Debug, Clone, PartialEq)]
pub enum VolumeBounds {
    Cone(ConeBounds),
    Cuboid(CuboidBounds),
    CutoutCylinder(CutoutCylinderBounds),
    Cylinder(CylinderBounds),
    GenericCuboid(GenericCuboidBounds),
    Trapezoid(TrapezoidBounds),
}

impl VolumeBounds {
    /// Build a shape from exactly [`BoundsType::arity`] values.
    pub fn from_values(bounds_type: BoundsType, values: &[f64]) -> Result<Self> {
        check_values(bounds_type, values)?;
        let v = values;
        let bounds = match bounds_type {
            BoundsType::Cone => {
                let bounds = ConeBounds::new(v[0], v[1], v[2], v[3], v[4], v[5], v[6])?;
                VolumeBounds::Cone(bounds)
            }
            BoundsType::Cuboid => VolumeBounds::Cuboid(CuboidBounds::new(v[0], v[1], v[2])?),
            BoundsType::CutoutCylinder => {
                let bounds = CutoutCylinderBounds::new(v[0], v[1], v[2], v[3], v[4])?;
                VolumeBounds::CutoutCylinder(bounds)
            }
            BoundsType::Cylinder => {
                VolumeBounds::Cylinder(CylinderBounds::new(v[0], v[1], v[2], v[3], v[4])?)
            }
            BoundsType::GenericCuboid => {
                let vertices: [Point3<f64>; 8] =
                    std::array::from_fn(|i| Point3::new(v[3 * i], v[3 * i + 1], v[3 * i + 2]));
                VolumeBounds::GenericCuboid(GenericCuboidBounds::new(vertices)?)
            }
            BoundsType::Trapezoid => {
                let bounds = TrapezoidBounds::with_angles(v[0], v[1], v[2], v[3], v[4], v[5])?;
                VolumeBounds::Trapezoid(bounds)
            }
        };
        Ok(bounds)
    }

    pub fn bounds_type(&self) -> BoundsType {
        match self {
            VolumeBounds::Cone(_) => BoundsType::Cone,
            VolumeBounds::Cuboid(_) => BoundsType::Cuboid,
            VolumeBounds::CutoutCylinder(_) => BoundsType::CutoutCylinder,
            VolumeBounds::Cylinder(_) => BoundsType::Cylinder,
            VolumeBounds::GenericCuboid(_) => BoundsType::GenericCuboid,
            VolumeBounds::Trapezoid(_) => BoundsType::Trapezoid,
        }
    }

    /// Parameters in the order accepted by [`VolumeBounds::from_values`].
    pub fn values(&self) -> Vec<f64> {
        match self {
            VolumeBounds::Cone(b) => vec![
                b.inner_alpha,
                b.inner_offset_z,
                b.outer_alpha,
                b.outer_offset_z,
                b.half_z,
                b.avg_phi,
                b.half_phi,
            ],
            VolumeBounds::Cuboid(b) => vec![b.half_x, b.half_y, b.half_z],
            VolumeBounds::CutoutCylinder(b) => {
                vec![b.r_min, b.r_med, b.r_max, b.half_z, b.half_z_cutout]
            }
            VolumeBounds::Cylinder(b) => vec![b.r_min, b.r_max, b.half_z, b.half_phi, b.avg_phi],
            VolumeBounds::GenericCuboid(b) => {
                b.vertices.iter().flat_map(|p| [p.x, p.y, p.z]).collect()
            }
            VolumeBounds::Trapezoid(b) => vec![
                b.half_x_neg_y,
                b.half_x_pos_y,
                b.half_y,
                b.half_z,
                b.alpha,
                b.beta,
            ],
        }
    }

    /// Containment test for a point in the local frame of the volume.
    pub fn inside(&self, p: &Point3<f64>, tol: f64) -> bool {
        let r = p.x.hypot(p.y);
        match self {
            VolumeBounds::Cuboid(b) => {
                p.x.abs() <= b.half_x + tol
                    && p.y.abs() <= b.half_y + tol
                    && p.z.abs() <= b.half_z + tol
            }
            VolumeBounds::Trapezoid(b) => {
                p.z.abs() <= b.half_z + tol
                    && p.y.abs() <= b.half_y + tol
                    && p.x.abs() <= b.half_x_at(p.y) + tol
            }
            VolumeBounds::GenericCuboid(b) => b
                .outward_planes()
                .iter()
                .all(|(center, normal)| (p - center).dot(normal) <= tol),
            VolumeBounds::Cylinder(b) => {
                r >= b.r_min - tol
                    && r <= b.r_max + tol
                    && p.z.abs() <= b.half_z + tol
                    && in_phi_sector(p.y.atan2(p.x), b.avg_phi, b.half_phi)
            }
            VolumeBounds::CutoutCylinder(b) => {
                let r_inner = if p.z.abs() < b.half_z_cutout { b.r_med } else { b.r_min };
                r >= r_inner - tol && r <= b.r_max + tol && p.z.abs() <= b.half_z + tol
            }
            VolumeBounds::Cone(b) => {
                p.z.abs() <= b.half_z + tol
                    && r <= b.outer_r(p.z) + tol
                    && r >= b.inner_r(p.z) - tol
                    && in_phi_sector(p.y.atan2(p.x), b.avg_phi, b.half_phi)
            }
        }
    }

    /// Local corner points, with curved shapes sampled on rings.
    pub fn vertices(&self, segments: usize) -> Vec<Point3<f64>> {
        match self {
            VolumeBounds::Cuboid(b) => b.corners(),
            VolumeBounds::Trapezoid(b) => b.corners(),
            VolumeBounds::GenericCuboid(b) => b.vertices.to_vec(),
            _ => self
                .decompose(&Isometry3::identity())
                .iter()
                .flat_map(|s| s.vertices(segments))
                .collect(),
        }
    }

    /// Axis-aligned box around the volume placed with `transform`.
    ///
    /// Polyhedral shapes use their exact corners; curved shapes use the
    /// corners of their local box, as a rotated round shape has no cheap
    /// exact box.
    pub fn bounding_box(&self, transform: Option<&Isometry3<f64>>) -> BoundingBox {
        let local = match self {
            VolumeBounds::Cuboid(_)
            | VolumeBounds::Trapezoid(_)
            | VolumeBounds::GenericCuboid(_) => self.vertices(0),
            VolumeBounds::Cylinder(CylinderBounds { r_max, half_z, .. })
            | VolumeBounds::CutoutCylinder(CutoutCylinderBounds { r_max, half_z, .. }) => {
                CuboidBounds { half_x: *r_max, half_y: *r_max, half_z: *half_z }.corners()
            }
            VolumeBounds::Cone(b) => {
                let r = b.outer_r(b.half_z);
                CuboidBounds { half_x: r, half_y: r, half_z: b.half_z }.corners()
            }
        };
        let placed: Vec<Point3<f64>> = match transform {
            Some(t) => local.iter().map(|p| t * p).collect(),
            None => local,
        };
        BoundingBox::from_points(&placed)
    }

    /// Global point inside the volume from which a boundary near `near` is oriented.
    ///
    /// For convex shapes this is a fixed interior point. The cutout cylinder
    /// is not convex, so the reference is taken inside the lobe adjacent to
    /// `near`: the ring around the cutout, or the end section on its side.
    pub fn reference_position(
        &self,
        transform: &Isometry3<f64>,
        near: &Point3<f64>,
    ) -> Point3<f64> {
        let local = match self {
            VolumeBounds::Cuboid(_) | VolumeBounds::Trapezoid(_) => Point3::origin(),
            VolumeBounds::GenericCuboid(b) => b.centroid(),
            VolumeBounds::Cylinder(b) => {
                let r = b.r_mid();
                Point3::new(r * b.avg_phi.cos(), r * b.avg_phi.sin(), 0.0)
            }
            VolumeBounds::Cone(b) => {
                let r = 0.5 * (b.inner_r(0.0) + b.outer_r(0.0));
                Point3::new(r * b.avg_phi.cos(), r * b.avg_phi.sin(), 0.0)
            }
            VolumeBounds::CutoutCylinder(b) => {
                let z = transform.inverse_transform_point(near).z;
                if z.abs() < b.half_z_cutout - BOUNDARY_TOLERANCE {
                    Point3::new(0.5 * (b.r_med + b.r_max), 0.0, 0.0)
                } else {
                    let lobe_z = z.signum() * 0.5 * (b.half_z + b.half_z_cutout);
                    Point3::new(0.5 * (b.r_min + b.r_max), 0.0, lobe_z)
                }
            }
        };
        transform * local
    }

    /// Whether the volume lies on the side the normal of `surface` points to.
    pub fn owner_is_along(&self, transform: &Isometry3<f64>, surface: &Surface) -> bool {
        let surface_ref = surface.reference_position();
        let volume_ref = self.reference_position(transform, &surface_ref);
        (volume_ref - surface_ref).dot(&surface.normal(&surface_ref)) > 0.0
    }

    /// Boundary surfaces of the volume placed with `transform`.
    pub fn decompose(&self, transform: &Isometry3<f64>) -> Vec<Surface> {
        let local = match self {
            VolumeBounds::Cuboid(b) => cuboid_surfaces(b),
            VolumeBounds::Trapezoid(b) => trapezoid_surfaces(b),
            VolumeBounds::GenericCuboid(b) => GENERIC_CUBOID_FACES
                .iter()
                .map(|face| {
                    let (frame, points) = b.face_frame(*face);
                    let vertices = points
                        .iter()
                        .map(|p| {
                            let l = frame.inverse_transform_point(p);
                            Point2::new(l.x, l.y)
                        })
                        .collect();
                    Surface::new(frame, SurfaceBounds::ConvexPolygon { vertices })
                })
                .collect(),
            VolumeBounds::Cylinder(b) => cylinder_surfaces(b),
            VolumeBounds::CutoutCylinder(b) => cutout_surfaces(b),
            VolumeBounds::Cone(b) => cone_surfaces(b),
        };
        local
            .into_iter()
            .map(|s| Surface::new(transform * s.transform(), s.bounds().clone()))
            .collect()
    }

    /// Polyhedron sample of the placed volume for extent estimates.
    pub fn polyhedron(&self, transform: &Isometry3<f64>) -> Vec<Point3<f64>> {
        self.vertices(DEFAULT_POLYHEDRON_SEGMENTS)
            .iter()
            .map(|p| transform * p)
            .collect()
    }
}

impl fmt::Display for VolumeBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.bounds_type(), self.values())
    }
}

fn shifted(z: f64) -> Isometry3<f64> {
    Isometry3::translation(0.0, 0.0, z)
}

fn disc(z: f64, r_min: f64, r_max: f64, half_phi: f64, avg_phi: f64) -> Surface {
    Surface::new(shifted(z), SurfaceBounds::Disc { r_min, r_max, half_phi, avg_phi })
}

fn tube(z: f64, r: f64, half_z: f64, half_phi: f64, avg_phi: f64) -> Surface {
    Surface::new(shifted(z), SurfaceBounds::Cylinder { r, half_z, half_phi, avg_phi })
}

fn cuboid_surfaces(b: &CuboidBounds) -> Vec<Surface> {
    let (ex, ey, ez) = (Vector3::x(), Vector3::y(), Vector3::z());
    let rect = |origin: Point3<f64>, x: Vector3<f64>, y: Vector3<f64>, half_x: f64, half_y: f64| {
        Surface::new(frame_from_axes(origin, x, y), SurfaceBounds::Rectangle { half_x, half_y })
    };
    vec![
        rect(Point3::new(0.0, 0.0, -b.half_z), ex, ey, b.half_x, b.half_y),
        rect(Point3::new(0.0, 0.0, b.half_z), ex, ey, b.half_x, b.half_y),
        rect(Point3::new(-b.half_x, 0.0, 0.0), ey, ez, b.half_y, b.half_z),
        rect(Point3::new(b.half_x, 0.0, 0.0), ey, ez, b.half_y, b.half_z),
        rect(Point3::new(0.0, -b.half_y, 0.0), ez, ex, b.half_z, b.half_x),
        rect(Point3::new(0.0, b.half_y, 0.0), ez, ex, b.half_z, b.half_x),
    ]
}

fn trapezoid_surfaces(b: &TrapezoidBounds) -> Vec<Surface> {
    let trapezoid = SurfaceBounds::Trapezoid {
        half_x_neg_y: b.half_x_neg_y,
        half_x_pos_y: b.half_x_pos_y,
        half_y: b.half_y,
    };
    let (a, c, hy, hz) = (b.half_x_neg_y, b.half_x_pos_y, b.half_y, b.half_z);
    let side_half = 0.5 * (c - a).hypot(2.0 * hy);
    let side = |sign: f64| {
        let origin = Point3::new(sign * 0.5 * (a + c), 0.0, 0.0);
        let along = Vector3::new(sign * (c - a), 2.0 * hy, 0.0);
        Surface::new(
            frame_from_axes(origin, along, Vector3::z()),
            SurfaceBounds::Rectangle { half_x: side_half, half_y: hz },
        )
    };
    let end = |y: f64, half_x: f64| {
        Surface::new(
            frame_from_axes(Point3::new(0.0, y, 0.0), Vector3::x(), Vector3::z()),
            SurfaceBounds::Rectangle { half_x, half_y: hz },
        )
    };
    vec![
        Surface::new(shifted(-hz), trapezoid.clone()),
        Surface::new(shifted(hz), trapezoid),
        side(-1.0),
        side(1.0),
        end(-hy, a),
        end(hy, c),
    ]
}

/// Planes bounding a phi sector at `avg_phi -/+ half_phi`, spanned by the
/// radial direction and the z axis. `profile` gives the (r, z) corners.
fn sector_planes(avg_phi: f64, half_phi: f64, profile: &[(f64, f64)]) -> Vec<Surface> {
    [avg_phi - half_phi, avg_phi + half_phi]
        .iter()
        .map(|phi| {
            let radial = Vector3::new(phi.cos(), phi.sin(), 0.0);
            let n = profile.len() as f64;
            let r_c = profile.iter().map(|(r, _)| r).sum::<f64>() / n;
            let z_c = profile.iter().map(|(_, z)| z).sum::<f64>() / n;
            let origin = Point3::from(radial * r_c + Vector3::z() * z_c);
            let vertices = profile
                .iter()
                .map(|(r, z)| Point2::new(r - r_c, z - z_c))
                .collect();
            Surface::new(
                frame_from_axes(origin, radial, Vector3::z()),
                SurfaceBounds::ConvexPolygon { vertices },
            )
        })
        .collect()
}

fn cylinder_surfaces(b: &CylinderBounds) -> Vec<Surface> {
    let mut surfaces = vec![
        disc(-b.half_z, b.r_min, b.r_max, b.half_phi, b.avg_phi),
        disc(b.half_z, b.r_min, b.r_max, b.half_phi, b.avg_phi),
        tube(0.0, b.r_max, b.half_z, b.half_phi, b.avg_phi),
    ];
    if b.r_min > 0.0 {
        surfaces.push(tube(0.0, b.r_min, b.half_z, b.half_phi, b.avg_phi));
    }
    if !is_full_phi(b.half_phi) {
        let profile = [
            (b.r_min, -b.half_z),
            (b.r_max, -b.half_z),
            (b.r_max, b.half_z),
            (b.r_min, b.half_z),
        ];
        surfaces.extend(sector_planes(b.avg_phi, b.half_phi, &profile));
    }
    surfaces
}

fn cutout_surfaces(b: &CutoutCylinderBounds) -> Vec<Surface> {
    let (hz, hzc) = (b.half_z, b.half_z_cutout);
    let mut surfaces = vec![
        disc(-hz, b.r_min, b.r_max, PI, 0.0),
        disc(hz, b.r_min, b.r_max, PI, 0.0),
        tube(0.0, b.r_max, hz, PI, 0.0),
        tube(0.0, b.r_med, hzc, PI, 0.0),
        disc(-hzc, b.r_min, b.r_med, PI, 0.0),
        disc(hzc, b.r_min, b.r_med, PI, 0.0),
    ];
    if b.r_min > 0.0 {
        let half = 0.5 * (hz - hzc);
        let mid = 0.5 * (hz + hzc);
        surfaces.push(tube(-mid, b.r_min, half, PI, 0.0));
        surfaces.push(tube(mid, b.r_min, half, PI, 0.0));
    }
    surfaces
}

fn cone_surfaces(b: &ConeBounds) -> Vec<Surface> {
    let hz = b.half_z;
    let cone = |alpha: f64, offset: f64| {
        Surface::new(
            shifted(-offset),
            SurfaceBounds::Cone {
                tan_alpha: alpha.tan(),
                z_min: offset - hz,
                z_max: offset + hz,
                half_phi: b.half_phi,
                avg_phi: b.avg_phi,
            },
        )
    };
    let mut surfaces = vec![
        disc(-hz, b.inner_r(-hz), b.outer_r(-hz), b.half_phi, b.avg_phi),
        disc(hz, b.inner_r(hz), b.outer_r(hz), b.half_phi, b.avg_phi),
        cone(b.outer_alpha, b.outer_offset_z),
    ];
    if b.inner_alpha > 0.0 {
        surfaces.push(cone(b.inner_alpha, b.inner_offset_z));
    }
    if !is_full_phi(b.half_phi) {
        let profile = [
            (b.inner_r(-hz), -hz),
            (b.outer_r(-hz), -hz),
            (b.outer_r(hz), hz),
            (b.inner_r(hz), hz),
        ];
        surfaces.extend(sector_planes(b.avg_phi, b.half_phi, &profile));
    }
    surfaces
}
