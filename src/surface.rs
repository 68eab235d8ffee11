//! Bounded boundary surfaces: planes, discs, cylinders and cones.
//!
//! Every surface lives in its own local frame given by an [`Isometry3`]:
//! planar surfaces lie in the local xy plane with the local z axis as normal,
//! cylinders and cones are symmetric about the local z axis with normals
//! pointing away from it. Cones have their apex at the local origin and open
//! towards +z.

use std::f64::consts::PI;

use nalgebra::{
    Isometry3, Matrix3, Point2, Point3, Rotation3, Translation3, UnitQuaternion, Vector3,
};

use crate::bins::BinningValue;
use crate::settings::BOUNDARY_TOLERANCE;


/// Shape of a surface in its local frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceBounds {
    Rectangle {
        half_x: f64,
        half_y: f64,
    },
    /// Half length in x at -y and +y.
    Trapezoid {
        half_x_neg_y: f64,
        half_x_pos_y: f64,
        half_y: f64,
    },
    ConvexPolygon {
        vertices: Vec<Point2<f64>>,
    },
    Disc {
        r_min: f64,
        r_max: f64,
        half_phi: f64,
        avg_phi: f64,
    },
    Cylinder {
        r: f64,
        half_z: f64,
        half_phi: f64,
        avg_phi: f64,
    },
    /// r(z) = tan_alpha * z for z in [z_min, z_max], z_min >= 0.
    Cone {
        tan_alpha: f64,
        z_min: f64,
        z_max: f64,
        half_phi: f64,
        avg_phi: f64,
    },
}

/// Solution of a straight-line surface intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    pub path_length: f64,
    pub position: Point3<f64>,
}

/// Result of reconciling two touching surfaces into one.
#[derive(Debug, Clone, PartialEq)]
pub struct Stitch {
    pub surface: Surface,       // covers both inputs, in the frame of the first
    pub bvalue: BinningValue,   // direction along which the inputs are joined
    pub edges: Vec<f64>,        // three edges in the local frame of `surface`
    pub first_is_lower: bool,   // whether the first input covers the lower bin
    pub flipped: bool,          // whether the second input's normal is reversed
}

#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    transform: Isometry3<f64>,
    bounds: SurfaceBounds,
}

impl Surface {
    pub fn new(transform: Isometry3<f64>, bounds: SurfaceBounds) -> Self {
        Self { transform, bounds }
    }

    pub fn transform(&self) -> &Isometry3<f64> {
        &self.transform
    }

    pub fn bounds(&self) -> &SurfaceBounds {
        &self.bounds
    }

    pub fn center(&self) -> Point3<f64> {
        Point3::from(self.transform.translation.vector)
    }

    pub fn is_planar(&self) -> bool {
        !matches!(
            self.bounds,
            SurfaceBounds::Cylinder { .. } | SurfaceBounds::Cone { .. }
        )
    }

    fn axis(&self) -> Vector3<f64> {
        self.transform.rotation * Vector3::z()
    }

    /// Surface normal at (or near) a global position.
    pub fn normal(&self, position: &Point3<f64>) -> Vector3<f64> {
        let local = self.transform.inverse_transform_point(position);
        let n = match &self.bounds {
            SurfaceBounds::Cylinder { .. } => {
                let phi = local.y.atan2(local.x);
                Vector3::new(phi.cos(), phi.sin(), 0.0)
            }
            SurfaceBounds::Cone { tan_alpha, .. } => {
                let phi = local.y.atan2(local.x);
                let alpha = tan_alpha.atan();
                Vector3::new(alpha.cos() * phi.cos(), alpha.cos() * phi.sin(), -alpha.sin())
            }
            _ => Vector3::z(),
        };
        self.transform.rotation * n
    }

    /// Representative point on the surface used for orientation decisions.
    pub fn reference_position(&self) -> Point3<f64> {
        let local = match &self.bounds {
            SurfaceBounds::Rectangle { .. } | SurfaceBounds::Trapezoid { .. } => Point3::origin(),
            SurfaceBounds::ConvexPolygon { vertices } => {
                let sum = vertices
                    .iter()
                    .fold(Vector3::zeros(), |acc, v| acc + Vector3::new(v.x, v.y, 0.0));
                Point3::from(sum / vertices.len().max(1) as f64)
            }
            SurfaceBounds::Disc { r_min, r_max, avg_phi, .. } => {
                let r = 0.5 * (r_min + r_max);
                Point3::new(r * avg_phi.cos(), r * avg_phi.sin(), 0.0)
            }
            SurfaceBounds::Cylinder { r, avg_phi, .. } => {
                Point3::new(r * avg_phi.cos(), r * avg_phi.sin(), 0.0)
            }
            SurfaceBounds::Cone { tan_alpha, z_min, z_max, avg_phi, .. } => {
                let z = 0.5 * (z_min + z_max);
                let r = tan_alpha * z;
                Point3::new(r * avg_phi.cos(), r * avg_phi.sin(), z)
            }
        };
        self.transform * local
    }

    /// Bounds check for a local position assumed to lie on the surface.
    fn inside_local(&self, p: &Point3<f64>, tol: f64) -> bool {
        match &self.bounds {
            SurfaceBounds::Rectangle { half_x, half_y } => {
                p.x.abs() <= half_x + tol && p.y.abs() <= half_y + tol
            }
            SurfaceBounds::Trapezoid { half_x_neg_y, half_x_pos_y, half_y } => {
                let frac = (p.y + half_y) / (2.0 * half_y);
                let half_x = half_x_neg_y + frac * (half_x_pos_y - half_x_neg_y);
                p.y.abs() <= half_y + tol && p.x.abs() <= half_x + tol
            }
            SurfaceBounds::ConvexPolygon { vertices } => {
                inside_polygon(vertices, &Point2::new(p.x, p.y), tol)
            }
            SurfaceBounds::Disc { r_min, r_max, half_phi, avg_phi } => {
                let r = p.x.hypot(p.y);
                r >= r_min - tol
                    && r <= r_max + tol
                    && in_phi_sector(p.y.atan2(p.x), *avg_phi, *half_phi)
            }
            SurfaceBounds::Cylinder { half_z, half_phi, avg_phi, .. } => {
                p.z.abs() <= half_z + tol && in_phi_sector(p.y.atan2(p.x), *avg_phi, *half_phi)
            }
            SurfaceBounds::Cone { z_min, z_max, half_phi, avg_phi, .. } => {
                p.z >= z_min - tol
                    && p.z <= z_max + tol
                    && in_phi_sector(p.y.atan2(p.x), *avg_phi, *half_phi)
            }
        }
    }

    /// Closest intersection further than `min_path` along a straight line.
    ///
    /// Solutions closer than `min_path` are treated as "already on the
    /// surface" and skipped, so a line starting on this surface finds the
    /// next crossing instead of itself.
    pub fn intersect(
        &self,
        position: &Point3<f64>,
        direction: &Vector3<f64>,
        min_path: f64,
    ) -> Option<Intersection> {
        let p = self.transform.inverse_transform_point(position);
        let d = self.transform.inverse_transform_vector(direction);

        let roots = match &self.bounds {
            SurfaceBounds::Cylinder { r, .. } => {
                let a = d.x * d.x + d.y * d.y;
                let b = 2.0 * (p.x * d.x + p.y * d.y);
                let c = p.x * p.x + p.y * p.y - r * r;
                solve_quadratic(a, b, c)
            }
            SurfaceBounds::Cone { tan_alpha, .. } => {
                let t2 = tan_alpha * tan_alpha;
                let a = d.x * d.x + d.y * d.y - t2 * d.z * d.z;
                let b = 2.0 * (p.x * d.x + p.y * d.y - t2 * p.z * d.z);
                let c = p.x * p.x + p.y * p.y - t2 * p.z * p.z;
                solve_quadratic(a, b, c)
            }
            _ => {
                if d.z.abs() < 1e-12 {
                    return None;
                }
                [-p.z / d.z, f64::NAN]
            }
        };

        roots
            .into_iter()
            .filter(|s| s.is_finite() && *s > min_path)
            .find(|s| self.inside_local(&(p + d * *s), BOUNDARY_TOLERANCE))
            .map(|s| Intersection {
                path_length: s,
                position: position + direction * s,
            })
    }

    /// Corner points, or sampled rings for curved bounds, in global coordinates.
    pub fn vertices(&self, segments: usize) -> Vec<Point3<f64>> {
        let local: Vec<Point3<f64>> = match &self.bounds {
            SurfaceBounds::Disc { r_min, r_max, half_phi, avg_phi } => {
                let mut points = ring(*r_max, 0.0, *avg_phi, *half_phi, segments);
                if *r_min > 0.0 {
                    points.extend(ring(*r_min, 0.0, *avg_phi, *half_phi, segments));
                }
                points
            }
            SurfaceBounds::Cylinder { r, half_z, half_phi, avg_phi } => {
                let mut points = ring(*r, -half_z, *avg_phi, *half_phi, segments);
                points.extend(ring(*r, *half_z, *avg_phi, *half_phi, segments));
                points
            }
            SurfaceBounds::Cone { tan_alpha, z_min, z_max, half_phi, avg_phi } => {
                let mut points = ring(tan_alpha * z_min, *z_min, *avg_phi, *half_phi, segments);
                points.extend(ring(tan_alpha * z_max, *z_max, *avg_phi, *half_phi, segments));
                points
            }
            _ => self
                .polygon_corners()
                .into_iter()
                .map(|v| Point3::new(v.x, v.y, 0.0))
                .collect(),
        };
        local.into_iter().map(|p| self.transform * p).collect()
    }

    fn polygon_corners(&self) -> Vec<Point2<f64>> {
        match &self.bounds {
            SurfaceBounds::Rectangle { half_x, half_y } => vec![
                Point2::new(-half_x, -half_y),
                Point2::new(*half_x, -half_y),
                Point2::new(*half_x, *half_y),
                Point2::new(-half_x, *half_y),
            ],
            SurfaceBounds::Trapezoid { half_x_neg_y, half_x_pos_y, half_y } => vec![
                Point2::new(-half_x_neg_y, -half_y),
                Point2::new(*half_x_neg_y, -half_y),
                Point2::new(*half_x_pos_y, *half_y),
                Point2::new(-half_x_pos_y, *half_y),
            ],
            SurfaceBounds::ConvexPolygon { vertices } => vertices.clone(),
            _ => Vec::new(),
        }
    }

    /// Whether the normal of `other` points against this one's.
    pub fn is_flipped_relative_to(&self, other: &Surface) -> bool {
        self.is_planar() && other.is_planar() && self.axis().dot(&other.axis()) < 0.0
    }

    /// Geometric identity check.
    ///
    /// Returns `Some(flipped)` when both surfaces describe the same bounded
    /// region of space, `flipped` telling whether their normals oppose.
    pub fn matches(&self, other: &Surface, tol: f64) -> Option<bool> {
        let offset = other.transform.translation.vector - self.transform.translation.vector;
        if offset.norm() > tol {
            return None;
        }
        let dot = self.axis().dot(&other.axis());
        if (dot.abs() - 1.0).abs() > tol {
            return None;
        }
        let flipped = dot < 0.0;
        match (&self.bounds, &other.bounds) {
            (
                SurfaceBounds::Disc { r_min: a_min, r_max: a_max, .. },
                SurfaceBounds::Disc { r_min: b_min, r_max: b_max, .. },
            ) => {
                let same = (a_min - b_min).abs() <= tol
                    && (a_max - b_max).abs() <= tol
                    && self.same_sector(other, tol);
                same.then_some(flipped)
            }
            (
                SurfaceBounds::Cylinder { r: ra, half_z: ha, .. },
                SurfaceBounds::Cylinder { r: rb, half_z: hb, .. },
            ) => {
                let same = (ra - rb).abs() <= tol
                    && (ha - hb).abs() <= tol
                    && self.same_sector(other, tol);
                same.then_some(false)
            }
            (
                SurfaceBounds::Cone { tan_alpha: ta, z_min: za, z_max: zb, .. },
                SurfaceBounds::Cone { tan_alpha: tb, z_min: zc, z_max: zd, .. },
            ) => {
                let same = !flipped
                    && (ta - tb).abs() <= tol
                    && (za - zc).abs() <= tol
                    && (zb - zd).abs() <= tol
                    && self.same_sector(other, tol);
                same.then_some(false)
            }
            _ if self.is_planar() && other.is_planar() => {
                let mine = self.vertices(0);
                let theirs = other.vertices(0);
                let same = !mine.is_empty()
                    && mine.len() == theirs.len()
                    && mine
                        .iter()
                        .all(|a| theirs.iter().any(|b| (a - b).norm() <= tol));
                same.then_some(flipped)
            }
            _ => None,
        }
    }

    fn sector(&self) -> Option<(f64, f64)> {
        match &self.bounds {
            SurfaceBounds::Disc { half_phi, avg_phi, .. }
            | SurfaceBounds::Cylinder { half_phi, avg_phi, .. }
            | SurfaceBounds::Cone { half_phi, avg_phi, .. } => Some((*half_phi, *avg_phi)),
            _ => None,
        }
    }

    /// Phi sectors compared through their global central direction.
    fn same_sector(&self, other: &Surface, tol: f64) -> bool {
        match (self.sector(), other.sector()) {
            (Some((ha, aa)), Some((hb, ab))) => {
                if is_full_phi(ha) && is_full_phi(hb) {
                    return true;
                }
                let da = self.transform.rotation * Vector3::new(aa.cos(), aa.sin(), 0.0);
                let db = other.transform.rotation * Vector3::new(ab.cos(), ab.sin(), 0.0);
                (ha - hb).abs() <= tol && (da - db).norm() <= tol
            }
            _ => false,
        }
    }

    /// Join two touching surfaces of the same kind into one.
    ///
    /// Supported are cylinders sharing an axis and radius that touch in z,
    /// concentric coplanar discs that touch in r and coplanar rectangles with
    /// aligned edges that touch in x or y. Overlapping inputs are rejected.
    pub fn stitch(&self, other: &Surface, tol: f64) -> Option<Stitch> {
        let za = self.axis();
        let zb = other.axis();
        if (za.dot(&zb).abs() - 1.0).abs() > tol {
            return None;
        }
        let offset = other.transform.translation.vector - self.transform.translation.vector;
        let flipped = self.is_flipped_relative_to(other);

        match (&self.bounds, &other.bounds) {
            (
                SurfaceBounds::Cylinder { r: ra, half_z: ha, half_phi, avg_phi },
                SurfaceBounds::Cylinder { r: rb, half_z: hb, .. },
            ) => {
                let t = offset.dot(&za);
                let coaxial = (offset - za * t).norm() <= tol;
                if !coaxial || (ra - rb).abs() > tol || !self.same_sector(other, tol) {
                    return None;
                }
                let (lo, mid, hi, first_is_lower) = touching(-ha, *ha, t - hb, t + hb, tol)?;
                let c = 0.5 * (lo + hi);
                let transform = Isometry3::from_parts(
                    Translation3::from(self.transform.translation.vector + za * c),
                    self.transform.rotation,
                );
                Some(Stitch {
                    surface: Surface::new(
                        transform,
                        SurfaceBounds::Cylinder {
                            r: *ra,
                            half_z: 0.5 * (hi - lo),
                            half_phi: *half_phi,
                            avg_phi: *avg_phi,
                        },
                    ),
                    bvalue: BinningValue::Z,
                    edges: vec![lo - c, mid - c, hi - c],
                    first_is_lower,
                    flipped: false,
                })
            }
            (
                SurfaceBounds::Disc { r_min: a_min, r_max: a_max, half_phi, avg_phi },
                SurfaceBounds::Disc { r_min: b_min, r_max: b_max, .. },
            ) => {
                if offset.norm() > tol || !self.same_sector(other, tol) {
                    return None;
                }
                let (lo, mid, hi, first_is_lower) = touching(*a_min, *a_max, *b_min, *b_max, tol)?;
                Some(Stitch {
                    surface: Surface::new(
                        self.transform,
                        SurfaceBounds::Disc {
                            r_min: lo,
                            r_max: hi,
                            half_phi: *half_phi,
                            avg_phi: *avg_phi,
                        },
                    ),
                    bvalue: BinningValue::R,
                    edges: vec![lo, mid, hi],
                    first_is_lower,
                    flipped,
                })
            }
            (
                SurfaceBounds::Rectangle { half_x: hxa, half_y: hya },
                SurfaceBounds::Rectangle { half_x: hxb, half_y: hyb },
            ) => {
                if offset.dot(&za).abs() > tol {
                    return None;
                }
                let xa = self.transform.rotation * Vector3::x();
                let xb = other.transform.rotation * Vector3::x();
                let yb = other.transform.rotation * Vector3::y();
                // extent of the other rectangle along this one's local axes
                let (bx, by) = if (xa.dot(&xb).abs() - 1.0).abs() <= tol {
                    (*hxb, *hyb)
                } else if (xa.dot(&yb).abs() - 1.0).abs() <= tol {
                    (*hyb, *hxb)
                } else {
                    return None;
                };
                let local = self.transform.inverse_transform_vector(&offset);
                if local.y.abs() <= tol && (hya - by).abs() <= tol {
                    let (lo, mid, hi, first_is_lower) =
                        touching(-hxa, *hxa, local.x - bx, local.x + bx, tol)?;
                    let c = 0.5 * (lo + hi);
                    Some(Stitch {
                        surface: Surface::new(
                            self.transform * Translation3::new(c, 0.0, 0.0),
                            SurfaceBounds::Rectangle { half_x: 0.5 * (hi - lo), half_y: *hya },
                        ),
                        bvalue: BinningValue::X,
                        edges: vec![lo - c, mid - c, hi - c],
                        first_is_lower,
                        flipped,
                    })
                } else if local.x.abs() <= tol && (hxa - bx).abs() <= tol {
                    let (lo, mid, hi, first_is_lower) =
                        touching(-hya, *hya, local.y - by, local.y + by, tol)?;
                    let c = 0.5 * (lo + hi);
                    Some(Stitch {
                        surface: Surface::new(
                            self.transform * Translation3::new(0.0, c, 0.0),
                            SurfaceBounds::Rectangle { half_x: *hxa, half_y: 0.5 * (hi - lo) },
                        ),
                        bvalue: BinningValue::Y,
                        edges: vec![lo - c, mid - c, hi - c],
                        first_is_lower,
                        flipped,
                    })
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

/// Union of two touching intervals as (lo, mid, hi, first_is_lower).
fn touching(a_lo: f64, a_hi: f64, b_lo: f64, b_hi: f64, tol: f64) -> Option<(f64, f64, f64, bool)> {
    if (b_lo - a_hi).abs() <= tol {
        Some((a_lo, a_hi, b_hi, true))
    } else if (a_lo - b_hi).abs() <= tol {
        Some((b_lo, a_lo, a_hi, false))
    } else {
        None
    }
}

/// Roots of a*s^2 + b*s + c in ascending order, NaN where absent.
fn solve_quadratic(a: f64, b: f64, c: f64) -> [f64; 2] {
    if a.abs() < 1e-12 {
        if b.abs() < 1e-12 {
            return [f64::NAN; 2];
        }
        return [-c / b, f64::NAN];
    }
    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return [f64::NAN; 2];
    }
    let sq = discriminant.sqrt();
    let s1 = (-b - sq) / (2.0 * a);
    let s2 = (-b + sq) / (2.0 * a);
    if s1 <= s2 {
        [s1, s2]
    } else {
        [s2, s1]
    }
}

pub(crate) fn is_full_phi(half_phi: f64) -> bool {
    half_phi >= PI - 1e-9
}

/// Wrap an angle into [-pi, pi).
pub(crate) fn wrap_angle(angle: f64) -> f64 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}

pub(crate) fn in_phi_sector(phi: f64, avg_phi: f64, half_phi: f64) -> bool {
    is_full_phi(half_phi) || wrap_angle(phi - avg_phi).abs() <= half_phi + 1e-9
}

fn inside_polygon(vertices: &[Point2<f64>], p: &Point2<f64>, tol: f64) -> bool {
    let n = vertices.len();
    if n < 3 {
        return false;
    }
    let area: f64 = (0..n)
        .map(|i| {
            let (a, b) = (vertices[i], vertices[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum();
    let sign = area.signum();
    (0..n).all(|i| {
        let (a, b) = (vertices[i], vertices[(i + 1) % n]);
        let edge = b - a;
        let to_point = p - a;
        sign * (edge.x * to_point.y - edge.y * to_point.x) >= -tol * edge.norm()
    })
}

/// Points on a circle of radius `r` at height `z`; closed sectors include both ends.
fn ring(r: f64, z: f64, avg_phi: f64, half_phi: f64, segments: usize) -> Vec<Point3<f64>> {
    let segments = segments.max(4);
    let (start, step, count) = if is_full_phi(half_phi) {
        (-PI, 2.0 * PI / segments as f64, segments)
    } else {
        (avg_phi - half_phi, 2.0 * half_phi / segments as f64, segments + 1)
    };
    (0..count)
        .map(|i| {
            let phi = start + step * i as f64;
            Point3::new(r * phi.cos(), r * phi.sin(), z)
        })
        .collect()
}

/// Placement with the given origin, local x axis and local y axis.
///
/// `y` is orthogonalised against `x`; the local z axis is `x × y`.
pub fn frame_from_axes(origin: Point3<f64>, x: Vector3<f64>, y: Vector3<f64>) -> Isometry3<f64> {
    let ex = x.normalize();
    let ey = (y - ex * ex.dot(&y)).normalize();
    let ez = ex.cross(&ey);
    let rotation = Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[ex, ey, ez]));
    Isometry3::from_parts(
        Translation3::from(origin.coords),
        UnitQuaternion::from_rotation_matrix(&rotation),
    )
}
