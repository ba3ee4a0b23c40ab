// primitives.rs - Closed solids used as fallbacks

use std::f64::consts::TAU;

use nalgebra::Point3;

use super::Mesh;
use crate::config::Dimensions;

/// Axis-aligned box, outward-wound, two triangles per face.
pub fn box_solid(min: Point3<f64>, max: Point3<f64>) -> Mesh {
    let (x0, y0, z0) = (min.x, min.y, min.z);
    let (x1, y1, z1) = (max.x, max.y, max.z);
    let vertices = vec![
        Point3::new(x0, y0, z0),
        Point3::new(x1, y0, z0),
        Point3::new(x1, y1, z0),
        Point3::new(x0, y1, z0),
        Point3::new(x0, y0, z1),
        Point3::new(x1, y0, z1),
        Point3::new(x1, y1, z1),
        Point3::new(x0, y1, z1),
    ];
    #[rustfmt::skip]
    let triangles = vec![
        [0, 2, 1], [0, 3, 2], // bottom
        [4, 5, 6], [4, 6, 7], // top
        [0, 1, 5], [0, 5, 4], // front (y0)
        [1, 2, 6], [1, 6, 5], // right (x1)
        [2, 3, 7], [2, 7, 6], // back (y1)
        [3, 0, 4], [3, 4, 7], // left (x0)
    ];
    Mesh::new(vertices, triangles)
}

/// Capped cylinder standing on z = 0 around (cx, cy).
pub fn cylinder(cx: f64, cy: f64, radius: f64, height: f64, segments: usize) -> Mesh {
    let segments = segments.max(3);
    let mut vertices = Vec::with_capacity(2 * segments + 2);
    for z in [0.0, height] {
        for i in 0..segments {
            let a = TAU * i as f64 / segments as f64;
            vertices.push(Point3::new(cx + radius * a.cos(), cy + radius * a.sin(), z));
        }
    }
    let bottom_center = vertices.len() as u32;
    vertices.push(Point3::new(cx, cy, 0.0));
    vertices.push(Point3::new(cx, cy, height));
    let top_center = bottom_center + 1;

    let n = segments as u32;
    let mut triangles = Vec::with_capacity(4 * segments);
    for i in 0..n {
        let j = (i + 1) % n;
        let (b0, b1, t0, t1) = (i, j, i + n, j + n);
        triangles.push([b0, b1, t1]);
        triangles.push([b0, t1, t0]);
        triangles.push([bottom_center, b1, b0]);
        triangles.push([top_center, t0, t1]);
    }
    Mesh::new(vertices, triangles)
}

/// Stand-in solid when synthesis or cleanup leaves nothing printable:
/// a 16-sided cylinder of radius min(width, depth) / 3, full height.
pub fn fallback_solid(dims: &Dimensions) -> Mesh {
    let height = (dims.max_height_mm + dims.base_mm).max(1.0);
    let radius = (dims.width_mm.min(dims.depth_mm) / 3.0).max(0.5);
    cylinder(dims.width_mm / 2.0, dims.depth_mm / 2.0, radius, height, 16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::analyze;

    #[test]
    fn box_is_closed_with_exact_volume() {
        let b = box_solid(Point3::new(1.0, 2.0, 0.0), Point3::new(3.0, 5.0, 4.0));
        assert_eq!((b.vertex_count(), b.triangle_count()), (8, 12));
        assert!(analyze(&b).is_watertight());
        assert!((b.signed_volume() - 24.0).abs() < 1e-9);
    }

    #[test]
    fn cylinder_is_closed_and_outward() {
        let c = cylinder(0.0, 0.0, 2.0, 3.0, 16);
        assert_eq!(c.triangle_count(), 64);
        assert!(analyze(&c).is_watertight());
        let exact = std::f64::consts::PI * 4.0 * 3.0;
        let v = c.signed_volume();
        assert!(v > 0.0 && v < exact && v > 0.9 * exact);
    }

    #[test]
    fn fallback_fits_the_requested_footprint() {
        let dims = Dimensions { width_mm: 90.0, depth_mm: 60.0, max_height_mm: 20.0, base_mm: 4.0 };
        let b = fallback_solid(&dims).bounds().expect("non-empty");
        assert!((b.min.z).abs() < 1e-9);
        assert!((b.max.z - 24.0).abs() < 1e-9);
        assert!(b.min.x >= 0.0 && b.max.x <= 90.0);
        assert!(b.min.y >= 0.0 && b.max.y <= 60.0);
    }
}
