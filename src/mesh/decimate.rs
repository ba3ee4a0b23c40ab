// decimate.rs - Quadric error metric edge-collapse simplification
//
// Garland-Heckbert collapses ordered by quadric error, with boundary edges
// held by weighted perpendicular planes. A collapse is refused when it would
// break the link condition or flip a neighbouring face, so closed manifolds
// stay closed manifolds.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use log::debug;
use nalgebra::{Matrix3, Matrix4, Point3, Vector3, Vector4};

use super::{Mesh, edge_faces, remove_unreferenced_vertices};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecimateParams {
    pub target_triangles: usize,
    /// Largest quadric error (sum of squared plane distances, mm²) a single
    /// collapse may introduce.
    pub max_error: f64,
    /// Weight of the planes pinning open boundaries.
    pub boundary_weight: f64,
    /// Minimum cosine between a face normal before and after a collapse.
    pub min_normal_dot: f64,
}

impl Default for DecimateParams {
    fn default() -> Self {
        Self { target_triangles: 0, max_error: f64::INFINITY, boundary_weight: 100.0, min_normal_dot: 0.2 }
    }
}

impl DecimateParams {
    pub fn with_target_triangles(target_triangles: usize) -> Self {
        Self { target_triangles, ..Self::default() }
    }
}

#[derive(Clone, Debug)]
pub struct DecimateResult {
    pub mesh: Mesh,
    pub original_triangles: usize,
    pub final_triangles: usize,
    pub collapses: usize,
    /// False when the error bound or topology checks stopped early.
    pub reached_target: bool,
}

struct Candidate {
    cost: f64,
    a: u32,
    b: u32,
    stamp: (u32, u32),
    target: Point3<f64>,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cost.total_cmp(&other.cost) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // Reversed: BinaryHeap pops the cheapest collapse first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.cost.total_cmp(&self.cost)
    }
}

fn plane_quadric(n: Vector3<f64>, p: Point3<f64>, weight: f64) -> Matrix4<f64> {
    let v = Vector4::new(n.x, n.y, n.z, -n.dot(&p.coords));
    v * v.transpose() * weight
}

fn quadric_error(q: &Matrix4<f64>, p: &Point3<f64>) -> f64 {
    let v = Vector4::new(p.x, p.y, p.z, 1.0);
    (v.transpose() * q * v)[(0, 0)].max(0.0)
}

struct Collapser {
    positions: Vec<Point3<f64>>,
    quadrics: Vec<Matrix4<f64>>,
    faces: Vec<[u32; 3]>,
    face_alive: Vec<bool>,
    vertex_faces: Vec<Vec<u32>>,
    vertex_alive: Vec<bool>,
    stamp: Vec<u32>,
    min_normal_dot: f64,
}

impl Collapser {
    fn new(mesh: &Mesh, boundary_weight: f64) -> Self {
        let n = mesh.vertices.len();
        let mut quadrics = vec![Matrix4::zeros(); n];
        let mut vertex_faces = vec![Vec::new(); n];

        for (fi, t) in mesh.triangles.iter().enumerate() {
            let Some(normal) = mesh.face_normal(t) else { continue };
            let q = plane_quadric(normal, mesh.vertices[t[0] as usize], 1.0);
            for &v in t {
                quadrics[v as usize] += q;
                vertex_faces[v as usize].push(fi as u32);
            }
        }

        for (&(a, b), faces) in &edge_faces(mesh) {
            if faces.len() != 1 {
                continue;
            }
            let t = &mesh.triangles[faces[0] as usize];
            let Some(normal) = mesh.face_normal(t) else { continue };
            let (pa, pb) = (mesh.vertices[a as usize], mesh.vertices[b as usize]);
            let Some(side) = (pb - pa).cross(&normal).try_normalize(1e-12) else { continue };
            let q = plane_quadric(side, pa, boundary_weight);
            quadrics[a as usize] += q;
            quadrics[b as usize] += q;
        }

        Self {
            positions: mesh.vertices.clone(),
            quadrics,
            faces: mesh.triangles.clone(),
            face_alive: vec![true; mesh.triangles.len()],
            vertex_faces,
            vertex_alive: vec![true; n],
            stamp: vec![0; n],
            min_normal_dot: 0.2,
        }
    }

    fn alive_faces(&self, v: u32) -> impl Iterator<Item = u32> + '_ {
        self.vertex_faces[v as usize].iter().copied().filter(|&f| self.face_alive[f as usize])
    }

    fn neighbors(&self, v: u32) -> Vec<u32> {
        let mut out: Vec<u32> = self
            .alive_faces(v)
            .flat_map(|f| self.faces[f as usize])
            .filter(|&u| u != v)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    fn candidate(&self, a: u32, b: u32) -> Candidate {
        let q = self.quadrics[a as usize] + self.quadrics[b as usize];
        let (pa, pb) = (self.positions[a as usize], self.positions[b as usize]);

        let m = Matrix3::new(q[(0, 0)], q[(0, 1)], q[(0, 2)], q[(1, 0)], q[(1, 1)], q[(1, 2)], q[(2, 0)], q[(2, 1)], q[(2, 2)]);
        let rhs = -Vector3::new(q[(0, 3)], q[(1, 3)], q[(2, 3)]);
        let solved = (m.determinant().abs() > 1e-10)
            .then(|| m.try_inverse())
            .flatten()
            .map(|inv| Point3::from(inv * rhs))
            .filter(|p| p.coords.iter().all(|c| c.is_finite()));

        let mut options = vec![pa, pb, nalgebra::center(&pa, &pb)];
        options.extend(solved);
        let (target, cost) = options
            .into_iter()
            .map(|p| (p, quadric_error(&q, &p)))
            .min_by(|x, y| x.1.total_cmp(&y.1))
            .unwrap_or((pa, f64::INFINITY));

        Candidate { cost, a, b, stamp: (self.stamp[a as usize], self.stamp[b as usize]), target }
    }

    fn is_boundary_vertex(&self, v: u32) -> bool {
        self.neighbors(v).into_iter().any(|u| self.alive_faces(v).filter(|&f| self.faces[f as usize].contains(&u)).count() == 1)
    }

    /// Link condition plus a face-flip check.
    fn can_collapse(&self, a: u32, b: u32, target: &Point3<f64>) -> bool {
        let shared: Vec<u32> = self.alive_faces(a).filter(|&f| self.faces[f as usize].contains(&b)).collect();
        if shared.is_empty() || shared.len() > 2 {
            return false;
        }
        let na = self.neighbors(a);
        let nb = self.neighbors(b);
        let common = na.iter().filter(|v| nb.binary_search(v).is_ok()).count();
        if common != shared.len() {
            return false;
        }
        if shared.len() == 2 && self.is_boundary_vertex(a) && self.is_boundary_vertex(b) {
            return false;
        }

        for v in [a, b] {
            for f in self.alive_faces(v) {
                if shared.contains(&f) {
                    continue;
                }
                let t = self.faces[f as usize];
                let old = t.map(|i| self.positions[i as usize]);
                let new = t.map(|i| if i == a || i == b { *target } else { self.positions[i as usize] });
                let n0 = (old[1] - old[0]).cross(&(old[2] - old[0]));
                let n1 = (new[1] - new[0]).cross(&(new[2] - new[0]));
                let (l0, l1) = (n0.norm(), n1.norm());
                if l1 < 1e-12 || n0.dot(&n1) < self.min_normal_dot * l0 * l1 {
                    return false;
                }
            }
        }
        true
    }

    /// Merge `b` into `a`. Returns faces removed.
    fn collapse(&mut self, a: u32, b: u32, target: Point3<f64>) -> usize {
        self.positions[a as usize] = target;
        let qb = self.quadrics[b as usize];
        self.quadrics[a as usize] += qb;
        self.vertex_alive[b as usize] = false;

        let mut removed = 0;
        let b_faces = std::mem::take(&mut self.vertex_faces[b as usize]);
        for f in b_faces {
            if !self.face_alive[f as usize] {
                continue;
            }
            let t = &mut self.faces[f as usize];
            if t.contains(&a) {
                self.face_alive[f as usize] = false;
                removed += 1;
            } else {
                t.iter_mut().filter(|i| **i == b).for_each(|i| *i = a);
                self.vertex_faces[a as usize].push(f);
            }
        }
        let alive = &self.face_alive;
        self.vertex_faces[a as usize].retain(|&f| alive[f as usize]);
        self.stamp[a as usize] += 1;
        self.stamp[b as usize] += 1;
        removed
    }
}

pub fn decimate(mesh: &Mesh, params: &DecimateParams) -> DecimateResult {
    let original = mesh.triangles.len();
    let mut c = Collapser::new(mesh, params.boundary_weight);
    c.min_normal_dot = params.min_normal_dot;

    let mut heap = BinaryHeap::new();
    for &(a, b) in edge_faces(mesh).keys() {
        heap.push(c.candidate(a, b));
    }

    let mut alive = original;
    let mut collapses = 0;
    while alive > params.target_triangles {
        let Some(cand) = heap.pop() else { break };
        let (a, b) = (cand.a, cand.b);
        if !c.vertex_alive[a as usize]
            || !c.vertex_alive[b as usize]
            || cand.stamp != (c.stamp[a as usize], c.stamp[b as usize])
        {
            continue;
        }
        if cand.cost > params.max_error {
            debug!("decimation stopped at error bound ({:.4} > {:.4})", cand.cost, params.max_error);
            break;
        }
        if !c.can_collapse(a, b, &cand.target) {
            continue;
        }
        alive -= c.collapse(a, b, cand.target);
        collapses += 1;
        for n in c.neighbors(a) {
            heap.push(c.candidate(a, n));
        }
    }

    let triangles: Vec<[u32; 3]> =
        c.faces.iter().zip(&c.face_alive).filter(|(_, alive)| **alive).map(|(t, _)| *t).collect();
    let mut out = Mesh::new(c.positions, triangles);
    remove_unreferenced_vertices(&mut out);

    let final_triangles = out.triangles.len();
    DecimateResult {
        mesh: out,
        original_triangles: original,
        final_triangles,
        collapses,
        reached_target: final_triangles <= params.target_triangles,
    }
}
