// repair.rs - Index-level mesh cleanup
//
// Each pass returns how many elements it removed or touched so callers can
// report what happened without diffing meshes.

use hashbrown::HashMap;
use log::warn;
use nalgebra::Point3;

use super::{Mesh, boundary_loops, edge_faces};

/// Weld vertices that fall in the same `tolerance`-sized cell.
pub fn merge_duplicate_vertices(mesh: &mut Mesh, tolerance: f64) -> usize {
    let inv = 1.0 / tolerance.max(f64::MIN_POSITIVE);
    let mut cells: HashMap<[i64; 3], u32> = HashMap::with_capacity(mesh.vertices.len());
    let mut remap = Vec::with_capacity(mesh.vertices.len());
    let mut kept = Vec::with_capacity(mesh.vertices.len());

    for p in &mesh.vertices {
        let key = [(p.x * inv).round() as i64, (p.y * inv).round() as i64, (p.z * inv).round() as i64];
        let idx = *cells.entry(key).or_insert_with(|| {
            kept.push(*p);
            kept.len() as u32 - 1
        });
        remap.push(idx);
    }

    let removed = mesh.vertices.len() - kept.len();
    for t in &mut mesh.triangles {
        for i in t.iter_mut() {
            if let Some(&r) = remap.get(*i as usize) {
                *i = r;
            }
        }
    }
    mesh.vertices = kept;
    removed
}

/// Drop faces that reference vertices past the end of the buffer.
pub fn remove_out_of_range_triangles(mesh: &mut Mesh) -> usize {
    let n = mesh.vertices.len() as u32;
    let before = mesh.triangles.len();
    mesh.triangles.retain(|t| t.iter().all(|&i| i < n));
    let removed = before - mesh.triangles.len();
    if removed > 0 {
        warn!("dropped {removed} triangles with out-of-range indices");
    }
    removed
}

/// Drop faces with a repeated index or (near) zero area.
pub fn remove_degenerate_triangles(mesh: &mut Mesh, min_area: f64) -> usize {
    let before = mesh.triangles.len();
    let verts = &mesh.vertices;
    mesh.triangles.retain(|t| {
        if t[0] == t[1] || t[1] == t[2] || t[0] == t[2] {
            return false;
        }
        let [a, b, c] = t.map(|i| verts[i as usize]);
        0.5 * (b - a).cross(&(c - a)).norm() > min_area
    });
    before - mesh.triangles.len()
}

/// Drop faces over the same three vertices, regardless of winding.
pub fn remove_duplicate_triangles(mesh: &mut Mesh) -> usize {
    let before = mesh.triangles.len();
    let mut seen = hashbrown::HashSet::with_capacity(before);
    mesh.triangles.retain(|t| {
        let mut key = *t;
        key.sort_unstable();
        seen.insert(key)
    });
    before - mesh.triangles.len()
}

/// Where more than two faces share an edge, keep the first two.
pub fn remove_non_manifold_faces(mesh: &mut Mesh) -> usize {
    let edges = edge_faces(mesh);
    let mut drop = vec![false; mesh.triangles.len()];
    for faces in edges.values().filter(|f| f.len() > 2) {
        for &f in &faces[2..] {
            drop[f as usize] = true;
        }
    }
    let before = mesh.triangles.len();
    let mut i = 0;
    mesh.triangles.retain(|_| {
        i += 1;
        !drop[i - 1]
    });
    before - mesh.triangles.len()
}

/// Compact away vertices no face references.
pub fn remove_unreferenced_vertices(mesh: &mut Mesh) -> usize {
    let mut used = vec![false; mesh.vertices.len()];
    for t in &mesh.triangles {
        for &i in t {
            if let Some(u) = used.get_mut(i as usize) {
                *u = true;
            }
        }
    }
    let mut remap = vec![u32::MAX; mesh.vertices.len()];
    let mut kept = Vec::with_capacity(mesh.vertices.len());
    for (i, p) in mesh.vertices.iter().enumerate() {
        if used[i] {
            remap[i] = kept.len() as u32;
            kept.push(*p);
        }
    }
    let removed = mesh.vertices.len() - kept.len();
    for t in &mut mesh.triangles {
        *t = t.map(|i| remap.get(i as usize).copied().unwrap_or(u32::MAX));
    }
    mesh.vertices = kept;
    removed
}

/// Zero any NaN/inf coordinate. Returns the number of vertices touched.
pub fn scrub_non_finite_vertices(mesh: &mut Mesh) -> usize {
    let mut touched = 0;
    for p in &mut mesh.vertices {
        if p.coords.iter().all(|c| c.is_finite()) {
            continue;
        }
        *p = Point3::new(
            if p.x.is_finite() { p.x } else { 0.0 },
            if p.y.is_finite() { p.y } else { 0.0 },
            if p.z.is_finite() { p.z } else { 0.0 },
        );
        touched += 1;
    }
    if touched > 0 {
        warn!("replaced non-finite coordinates on {touched} vertices");
    }
    touched
}

/// Cap every boundary loop with a fan from its first vertex. Loops longer
/// than `max_loop` are left open. Adds faces only, never vertices.
pub fn close_holes(mesh: &mut Mesh, max_loop: Option<usize>) -> usize {
    let mut closed = 0;
    for lp in boundary_loops(mesh) {
        if max_loop.is_some_and(|m| lp.len() > m) {
            continue;
        }
        // Faces run l0 -> l1 -> ...; the cap must run the other way.
        for i in 1..lp.len() - 1 {
            mesh.triangles.push([lp[0], lp[i + 1], lp[i]]);
        }
        closed += 1;
    }
    closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{analyze, box_solid};

    fn cube() -> Mesh {
        box_solid(Point3::origin(), Point3::new(1.0, 1.0, 1.0))
    }

    /// Same cube with every triangle given its own three vertices.
    fn triangle_soup() -> Mesh {
        let c = cube();
        let mut soup = Mesh::default();
        for t in &c.triangles {
            let base = soup.vertices.len() as u32;
            soup.vertices.extend(c.corners(t));
            soup.triangles.push([base, base + 1, base + 2]);
        }
        soup
    }

    #[test]
    fn welding_restores_shared_vertices() {
        let mut soup = triangle_soup();
        assert_eq!(merge_duplicate_vertices(&mut soup, 1e-6), 36 - 8);
        assert_eq!(soup.vertex_count(), 8);
        assert!(analyze(&soup).is_watertight());
    }

    #[test]
    fn degenerate_and_duplicate_faces_are_dropped() {
        let mut m = cube();
        m.triangles.push([0, 0, 1]);
        m.triangles.push(m.triangles[0]);
        m.triangles.push([m.triangles[1][2], m.triangles[1][1], m.triangles[1][0]]);
        assert_eq!(remove_degenerate_triangles(&mut m, 1e-12), 1);
        assert_eq!(remove_duplicate_triangles(&mut m), 2);
        assert_eq!(m.triangle_count(), 12);
    }

    #[test]
    fn out_of_range_and_unreferenced_cleanup() {
        let mut m = cube();
        m.triangles.push([0, 1, 99]);
        m.vertices.push(Point3::new(5.0, 5.0, 5.0));
        assert_eq!(remove_out_of_range_triangles(&mut m), 1);
        assert_eq!(remove_unreferenced_vertices(&mut m), 1);
        assert!(m.indices_valid());
        assert_eq!(m.vertex_count(), 8);
    }

    #[test]
    fn hole_is_capped_without_new_vertices() {
        let mut m = cube();
        m.triangles.truncate(10);
        assert_eq!(close_holes(&mut m, None), 1);
        assert_eq!(m.vertex_count(), 8);
        let r = analyze(&m);
        assert!(r.is_watertight() && r.consistent_orientation);
        assert!((m.signed_volume() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn extra_faces_on_an_edge_are_removed() {
        let mut m = cube();
        let [a, b, _] = m.triangles[0];
        m.vertices.push(Point3::new(0.5, 0.5, 5.0));
        m.triangles.push([a, b, 8]);
        assert_eq!(remove_non_manifold_faces(&mut m), 1);
        assert_eq!(analyze(&m).non_manifold_edges, 0);
    }

    #[test]
    fn non_finite_coordinates_are_zeroed() {
        let mut m = cube();
        m.vertices[3].y = f64::NAN;
        assert_eq!(scrub_non_finite_vertices(&mut m), 1);
        assert!(!m.has_non_finite());
    }
}
