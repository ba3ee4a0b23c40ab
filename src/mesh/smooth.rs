// smooth.rs - Laplacian and Taubin smoothing
//
// Uniform (umbrella) weights over one-ring neighbours. Boundary vertices,
// those on an edge with a single face, can be pinned.

use hashbrown::HashMap;
use nalgebra::Point3;

use super::{Mesh, edge_key};

/// Sorted, deduplicated neighbour lists per vertex.
pub fn vertex_neighbors(mesh: &Mesh) -> Vec<Vec<u32>> {
    let mut adj: Vec<Vec<u32>> = vec![Vec::new(); mesh.vertices.len()];
    for t in &mesh.triangles {
        for k in 0..3 {
            let (a, b) = (t[k], t[(k + 1) % 3]);
            adj[a as usize].push(b);
            adj[b as usize].push(a);
        }
    }
    for n in &mut adj {
        n.sort_unstable();
        n.dedup();
    }
    adj
}

/// Vertices on a single-face edge.
pub fn boundary_vertices(mesh: &Mesh) -> Vec<bool> {
    let mut counts: HashMap<(u32, u32), u32> = HashMap::new();
    for t in &mesh.triangles {
        for k in 0..3 {
            *counts.entry(edge_key(t[k], t[(k + 1) % 3])).or_default() += 1;
        }
    }
    let mut out = vec![false; mesh.vertices.len()];
    for ((a, b), _) in counts.into_iter().filter(|(_, c)| *c == 1) {
        out[a as usize] = true;
        out[b as usize] = true;
    }
    out
}

fn step(mesh: &mut Mesh, adj: &[Vec<u32>], pinned: &[bool], factor: f64) {
    let updated: Vec<Point3<f64>> = mesh
        .vertices
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let ring = &adj[i];
            if pinned[i] || ring.is_empty() {
                return p;
            }
            let sum = ring.iter().fold(nalgebra::Vector3::zeros(), |acc, &n| acc + mesh.vertices[n as usize].coords);
            let centroid = sum / ring.len() as f64;
            p + (centroid - p.coords) * factor
        })
        .collect();
    mesh.vertices = updated;
}

pub fn laplacian_smooth(mesh: &mut Mesh, lambda: f64, iterations: usize, preserve_boundary: bool) {
    let adj = vertex_neighbors(mesh);
    let pinned = if preserve_boundary { boundary_vertices(mesh) } else { vec![false; mesh.vertices.len()] };
    for _ in 0..iterations {
        step(mesh, &adj, &pinned, lambda);
    }
}

/// λ/μ smoothing: a shrinking pass followed by an inflating one, so volume
/// is roughly kept.
pub fn taubin_smooth(mesh: &mut Mesh, lambda: f64, mu: f64, iterations: usize, preserve_boundary: bool) {
    let adj = vertex_neighbors(mesh);
    let pinned = if preserve_boundary { boundary_vertices(mesh) } else { vec![false; mesh.vertices.len()] };
    for _ in 0..iterations {
        step(mesh, &adj, &pinned, lambda);
        step(mesh, &adj, &pinned, mu);
    }
}
