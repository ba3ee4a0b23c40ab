// mesh/ - Indexed triangle meshes
//
// Positions are millimetres, Z up. Triangles are counter-clockwise when seen
// from outside, so a closed mesh has positive signed volume.

mod decimate;
mod io;
mod primitives;
mod repair;
mod smooth;
mod topology;

pub use decimate::*;
pub use io::*;
pub use primitives::*;
pub use repair::*;
pub use smooth::*;
pub use topology::*;

use nalgebra::{Point3, Vector3};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Point3<f64>>,
    pub triangles: Vec<[u32; 3]>,
}

/// Axis-aligned bounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    pub fn extent(&self) -> Vector3<f64> {
        self.max - self.min
    }

    pub fn clamp(&self, p: Point3<f64>) -> Point3<f64> {
        Point3::new(
            p.x.clamp(self.min.x, self.max.x),
            p.y.clamp(self.min.y, self.max.y),
            p.z.clamp(self.min.z, self.max.z),
        )
    }
}

impl Mesh {
    pub fn new(vertices: Vec<Point3<f64>>, triangles: Vec<[u32; 3]>) -> Self {
        Self { vertices, triangles }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.triangles.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Append another mesh, offsetting its indices.
    pub fn append(&mut self, other: &Mesh) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.triangles.extend(other.triangles.iter().map(|t| t.map(|i| i + base)));
    }

    pub fn corners(&self, tri: &[u32; 3]) -> [Point3<f64>; 3] {
        tri.map(|i| self.vertices[i as usize])
    }

    /// Unnormalised face normal (length = 2 × area).
    pub fn face_cross(&self, tri: &[u32; 3]) -> Vector3<f64> {
        let [a, b, c] = self.corners(tri);
        (b - a).cross(&(c - a))
    }

    pub fn face_normal(&self, tri: &[u32; 3]) -> Option<Vector3<f64>> {
        self.face_cross(tri).try_normalize(1e-12)
    }

    pub fn triangle_area(&self, tri: &[u32; 3]) -> f64 {
        0.5 * self.face_cross(tri).norm()
    }

    /// Area-weighted vertex normals. Isolated vertices get +Z.
    pub fn vertex_normals(&self) -> Vec<Vector3<f64>> {
        let mut normals = vec![Vector3::zeros(); self.vertices.len()];
        for tri in &self.triangles {
            let n = self.face_cross(tri);
            for &i in tri {
                normals[i as usize] += n;
            }
        }
        normals.into_iter().map(|n| n.try_normalize(1e-12).unwrap_or_else(Vector3::z)).collect()
    }

    pub fn bounds(&self) -> Option<Aabb> {
        let first = *self.vertices.first()?;
        Some(self.vertices.iter().fold(Aabb { min: first, max: first }, |b, p| Aabb {
            min: b.min.inf(p),
            max: b.max.sup(p),
        }))
    }

    /// Signed volume by the divergence theorem. Only meaningful for closed meshes.
    pub fn signed_volume(&self) -> f64 {
        self.triangles
            .iter()
            .map(|tri| {
                let [a, b, c] = self.corners(tri);
                a.coords.dot(&b.coords.cross(&c.coords)) / 6.0
            })
            .sum()
    }

    pub fn has_non_finite(&self) -> bool {
        self.vertices.iter().any(|p| !p.coords.iter().all(|c| c.is_finite()))
    }

    /// Every index refers to an existing vertex.
    pub fn indices_valid(&self) -> bool {
        let n = self.vertices.len() as u32;
        self.triangles.iter().all(|t| t.iter().all(|&i| i < n))
    }

    pub fn translate(&mut self, offset: Vector3<f64>) {
        self.vertices.iter_mut().for_each(|p| *p += offset);
    }

    pub fn flip_all(&mut self) {
        self.triangles.iter_mut().for_each(|t| t.swap(1, 2));
    }

    /// Positions as a flat f32 buffer (x, y, z, x, y, z, ...).
    pub fn position_buffer(&self) -> Vec<f32> {
        self.vertices.iter().flat_map(|p| [p.x as f32, p.y as f32, p.z as f32]).collect()
    }

    pub fn index_buffer(&self) -> Vec<u32> {
        self.triangles.iter().flatten().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_cube_has_unit_volume() {
        let cube = box_solid(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        assert!((cube.signed_volume() - 1.0).abs() < 1e-9);
        let b = cube.bounds().expect("non-empty");
        assert_eq!(b.extent(), Vector3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn flipping_negates_volume() {
        let mut cube = box_solid(Point3::origin(), Point3::new(2.0, 1.0, 1.0));
        cube.flip_all();
        assert!((cube.signed_volume() + 2.0).abs() < 1e-9);
    }

    #[test]
    fn append_offsets_indices() {
        let a = box_solid(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        let mut m = a.clone();
        m.append(&a);
        assert_eq!(m.vertex_count(), 16);
        assert!(m.indices_valid());
        assert_eq!(m.triangles[12][0], a.triangles[0][0] + 8);
    }

    #[test]
    fn flat_buffers_match_counts() {
        let cube = box_solid(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        assert_eq!(cube.position_buffer().len(), 24);
        assert_eq!(cube.index_buffer().len(), 36);
    }
}
