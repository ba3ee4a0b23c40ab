// topology.rs - Edge adjacency, manifold analysis, orientation
//
// Edges are keyed by their sorted vertex pair. A closed 2-manifold has every
// edge shared by exactly two faces that traverse it in opposite directions.

use std::collections::VecDeque;

use hashbrown::HashMap;

use super::Mesh;

/// Sorted vertex pair.
pub type EdgeKey = (u32, u32);

#[inline]
pub fn edge_key(a: u32, b: u32) -> EdgeKey {
    if a < b { (a, b) } else { (b, a) }
}

#[inline]
fn directed_edges(t: &[u32; 3]) -> [(u32, u32); 3] {
    [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])]
}

#[inline]
fn has_directed(t: &[u32; 3], a: u32, b: u32) -> bool {
    directed_edges(t).contains(&(a, b))
}

/// Faces incident to each undirected edge.
pub fn edge_faces(mesh: &Mesh) -> HashMap<EdgeKey, Vec<u32>> {
    let mut map: HashMap<EdgeKey, Vec<u32>> = HashMap::with_capacity(mesh.triangles.len() * 3 / 2);
    for (fi, t) in mesh.triangles.iter().enumerate() {
        for (a, b) in directed_edges(t) {
            map.entry(edge_key(a, b)).or_default().push(fi as u32);
        }
    }
    map
}

/// Minimal union-find over dense indices.
pub(crate) struct DisjointSet {
    parent: Vec<u32>,
}

impl DisjointSet {
    pub(crate) fn new(n: usize) -> Self {
        Self { parent: (0..n as u32).collect() }
    }

    pub(crate) fn find(&mut self, mut x: u32) -> u32 {
        while self.parent[x as usize] != x {
            let p = self.parent[x as usize];
            self.parent[x as usize] = self.parent[p as usize];
            x = p;
        }
        x
    }

    pub(crate) fn union(&mut self, a: u32, b: u32) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra as usize] = rb;
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopologyReport {
    /// Edges with a single incident face.
    pub boundary_edges: usize,
    /// Edges with more than two incident faces.
    pub non_manifold_edges: usize,
    /// Vertices whose faces do not form a single fan.
    pub non_manifold_vertices: usize,
    pub isolated_vertices: usize,
    /// Edge-connected face groups.
    pub components: usize,
    pub consistent_orientation: bool,
    /// V - E + F over referenced vertices.
    pub euler_characteristic: i64,
}

impl TopologyReport {
    pub fn is_manifold(&self) -> bool {
        self.non_manifold_edges == 0 && self.non_manifold_vertices == 0
    }

    pub fn is_watertight(&self) -> bool {
        self.boundary_edges == 0 && self.non_manifold_edges == 0
    }
}

pub fn analyze(mesh: &Mesh) -> TopologyReport {
    let edges = edge_faces(mesh);
    let mut boundary_edges = 0;
    let mut non_manifold_edges = 0;
    let mut consistent_orientation = true;

    for (&(a, b), faces) in &edges {
        match faces.len() {
            1 => boundary_edges += 1,
            2 => {
                let (f0, f1) = (&mesh.triangles[faces[0] as usize], &mesh.triangles[faces[1] as usize]);
                let opposite = (has_directed(f0, a, b) && has_directed(f1, b, a))
                    || (has_directed(f0, b, a) && has_directed(f1, a, b));
                consistent_orientation &= opposite;
            }
            _ => non_manifold_edges += 1,
        }
    }

    let n = mesh.vertices.len();
    let mut referenced = vec![false; n];
    let mut links: Vec<Vec<(u32, u32)>> = vec![Vec::new(); n];
    let mut sets = DisjointSet::new(n);
    for t in &mesh.triangles {
        for k in 0..3 {
            let v = t[k] as usize;
            referenced[v] = true;
            links[v].push((t[(k + 1) % 3], t[(k + 2) % 3]));
        }
        sets.union(t[0], t[1]);
        sets.union(t[1], t[2]);
    }

    let non_manifold_vertices = links.iter().filter(|l| !l.is_empty() && !is_single_fan(l)).count();
    let isolated_vertices = referenced.iter().filter(|r| !**r).count();

    let mut roots = hashbrown::HashSet::new();
    for v in (0..n).filter(|&v| referenced[v]) {
        roots.insert(sets.find(v as u32));
    }

    let v_used = (n - isolated_vertices) as i64;
    TopologyReport {
        boundary_edges,
        non_manifold_edges,
        non_manifold_vertices,
        isolated_vertices,
        components: roots.len(),
        consistent_orientation,
        euler_characteristic: v_used - edges.len() as i64 + mesh.triangles.len() as i64,
    }
}

/// A vertex link is a disc (path) or a closed fan (cycle) when it is
/// connected and no link vertex has degree above two.
fn is_single_fan(link: &[(u32, u32)]) -> bool {
    let mut index: HashMap<u32, u32> = HashMap::new();
    let mut degree: Vec<u8> = Vec::new();
    let mut id = |v: u32, degree: &mut Vec<u8>| {
        let next = index.len() as u32;
        let i = *index.entry(v).or_insert(next);
        if i as usize == degree.len() {
            degree.push(0);
        }
        i
    };
    let pairs: Vec<(u32, u32)> = link.iter().map(|&(a, b)| (id(a, &mut degree), id(b, &mut degree))).collect();

    let mut sets = DisjointSet::new(degree.len());
    for &(a, b) in &pairs {
        degree[a as usize] = degree[a as usize].saturating_add(1);
        degree[b as usize] = degree[b as usize].saturating_add(1);
        sets.union(a, b);
    }
    if degree.iter().any(|&d| d > 2) {
        return false;
    }
    let root = sets.find(0);
    (1..degree.len() as u32).all(|i| sets.find(i) == root)
}

/// Component id per triangle, via shared vertices.
pub fn triangle_components(mesh: &Mesh) -> Vec<u32> {
    let mut sets = DisjointSet::new(mesh.vertices.len());
    for t in &mesh.triangles {
        sets.union(t[0], t[1]);
        sets.union(t[1], t[2]);
    }
    mesh.triangles.iter().map(|t| sets.find(t[0])).collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrientOutcome {
    pub flipped: usize,
    /// False when some face pair could not be made consistent (Möbius-like).
    pub orientable: bool,
}

/// Propagate winding across manifold edges so neighbours agree.
pub fn orient_consistently(mesh: &mut Mesh) -> OrientOutcome {
    let edges = edge_faces(mesh);
    let nf = mesh.triangles.len();
    let mut visited = vec![false; nf];
    let mut outcome = OrientOutcome { flipped: 0, orientable: true };
    let mut queue = VecDeque::new();

    for seed in 0..nf {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        queue.push_back(seed);
        while let Some(f) = queue.pop_front() {
            let tri = mesh.triangles[f];
            for (a, b) in directed_edges(&tri) {
                let Some(faces) = edges.get(&edge_key(a, b)) else { continue };
                if faces.len() != 2 {
                    continue;
                }
                let other = if faces[0] as usize == f { faces[1] } else { faces[0] } as usize;
                if !visited[other] {
                    if has_directed(&mesh.triangles[other], a, b) {
                        mesh.triangles[other].swap(1, 2);
                        outcome.flipped += 1;
                    }
                    visited[other] = true;
                    queue.push_back(other);
                } else if !has_directed(&mesh.triangles[other], b, a) {
                    outcome.orientable = false;
                }
            }
        }
    }
    outcome
}

/// Flip closed components whose signed volume is negative. Returns the
/// number of faces flipped.
pub fn orient_outward(mesh: &mut Mesh) -> usize {
    let comps = triangle_components(mesh);
    let edges = edge_faces(mesh);

    let mut volume: HashMap<u32, f64> = HashMap::new();
    let mut open: hashbrown::HashSet<u32> = hashbrown::HashSet::new();
    for (fi, t) in mesh.triangles.iter().enumerate() {
        let [a, b, c] = mesh.corners(t);
        *volume.entry(comps[fi]).or_default() += a.coords.dot(&b.coords.cross(&c.coords)) / 6.0;
    }
    for faces in edges.values().filter(|f| f.len() != 2) {
        open.extend(faces.iter().map(|&f| comps[f as usize]));
    }

    let mut flipped = 0;
    for (fi, t) in mesh.triangles.iter_mut().enumerate() {
        let c = comps[fi];
        if !open.contains(&c) && volume.get(&c).is_some_and(|v| *v < 0.0) {
            t.swap(1, 2);
            flipped += 1;
        }
    }
    flipped
}

/// Closed boundary loops, each in the winding order of its faces.
pub fn boundary_loops(mesh: &Mesh) -> Vec<Vec<u32>> {
    let edges = edge_faces(mesh);
    let mut outgoing: HashMap<u32, Vec<u32>> = HashMap::new();
    for t in &mesh.triangles {
        for (a, b) in directed_edges(t) {
            if edges.get(&edge_key(a, b)).is_some_and(|f| f.len() == 1) {
                outgoing.entry(a).or_default().push(b);
            }
        }
    }

    let mut starts: Vec<u32> = outgoing.keys().copied().collect();
    starts.sort_unstable();
    let mut loops = Vec::new();
    for start in starts {
        while let Some(first) = outgoing.get_mut(&start).and_then(Vec::pop) {
            let mut path = vec![start];
            let mut current = first;
            let mut closed = false;
            for _ in 0..=edges.len() {
                if current == start {
                    closed = true;
                    break;
                }
                path.push(current);
                match outgoing.get_mut(&current).and_then(Vec::pop) {
                    Some(next) => current = next,
                    None => break,
                }
            }
            if closed && path.len() >= 3 {
                loops.push(path);
            }
        }
    }
    loops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::box_solid;
    use nalgebra::Point3;

    fn cube() -> Mesh {
        box_solid(Point3::origin(), Point3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn closed_cube_is_watertight_manifold() {
        let r = analyze(&cube());
        assert!(r.is_watertight());
        assert!(r.is_manifold());
        assert!(r.consistent_orientation);
        assert_eq!(r.components, 1);
        assert_eq!(r.euler_characteristic, 2);
    }

    #[test]
    fn removing_a_face_opens_a_loop() {
        let mut m = cube();
        m.triangles.truncate(10);
        let r = analyze(&m);
        assert_eq!(r.boundary_edges, 4);
        let loops = boundary_loops(&m);
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].len(), 4);
    }

    #[test]
    fn orientation_is_repaired() {
        let mut m = cube();
        m.triangles[3].swap(1, 2);
        m.triangles[7].swap(1, 2);
        assert!(!analyze(&m).consistent_orientation);
        let out = orient_consistently(&mut m);
        assert!(out.orientable);
        assert!(analyze(&m).consistent_orientation);
        orient_outward(&mut m);
        assert!(m.signed_volume() > 0.0);
    }

    #[test]
    fn inverted_cube_is_turned_outward() {
        let mut m = cube();
        m.flip_all();
        assert_eq!(orient_outward(&mut m), 12);
        assert!((m.signed_volume() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn bowtie_vertex_is_non_manifold() {
        let p = |x: f64, y: f64| Point3::new(x, y, 0.0);
        let m = Mesh::new(
            vec![p(0.0, 0.0), p(-1.0, 1.0), p(-1.0, -1.0), p(1.0, 1.0), p(1.0, -1.0)],
            vec![[0, 1, 2], [0, 4, 3]],
        );
        let r = analyze(&m);
        assert_eq!(r.non_manifold_vertices, 1);
        assert_eq!(r.components, 1);
    }
}
