// io.rs - OBJ and STL export, OBJ validation
//
// Format is chosen by file extension: `.obj` writes Wavefront OBJ, `.stla`
// ASCII STL, anything else binary STL.

use std::fs::File;
use std::io::{self, BufWriter, Cursor, Write};
use std::path::Path;

use log::{info, warn};
use stl_io::{Normal, Triangle, Vertex, write_stl};

use super::Mesh;
use crate::error::MeshIoError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshFormat {
    Obj,
    StlBinary,
    StlAscii,
}

impl MeshFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
            Some("obj") => MeshFormat::Obj,
            Some("stla") => MeshFormat::StlAscii,
            _ => MeshFormat::StlBinary,
        }
    }
}

/// `v`, `vn` and 1-based `f i//i` records.
pub fn write_obj<W: Write>(mesh: &Mesh, out: &mut W) -> io::Result<()> {
    writeln!(out, "# {} vertices, {} faces", mesh.vertex_count(), mesh.triangle_count())?;
    for p in &mesh.vertices {
        writeln!(out, "v {:.6} {:.6} {:.6}", p.x, p.y, p.z)?;
    }
    for n in mesh.vertex_normals() {
        writeln!(out, "vn {:.6} {:.6} {:.6}", n.x, n.y, n.z)?;
    }
    for t in &mesh.triangles {
        let [a, b, c] = t.map(|i| i + 1);
        writeln!(out, "f {a}//{a} {b}//{b} {c}//{c}")?;
    }
    Ok(())
}

pub fn to_obj_string(mesh: &Mesh) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_obj(mesh, &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

fn stl_triangles(mesh: &Mesh) -> Vec<Triangle> {
    mesh.triangles
        .iter()
        .map(|t| {
            let n = mesh.face_normal(t).unwrap_or_else(nalgebra::Vector3::z);
            Triangle {
                normal: Normal::new([n.x as f32, n.y as f32, n.z as f32]),
                vertices: mesh.corners(t).map(|p| Vertex::new([p.x as f32, p.y as f32, p.z as f32])),
            }
        })
        .collect()
}

pub fn to_stl_binary(mesh: &Mesh) -> io::Result<Vec<u8>> {
    let triangles = stl_triangles(mesh);
    let mut cursor = Cursor::new(Vec::new());
    write_stl(&mut cursor, triangles.iter())?;
    Ok(cursor.into_inner())
}

pub fn to_stl_ascii(mesh: &Mesh, name: &str) -> String {
    let mut out = format!("solid {name}\n");
    for t in &mesh.triangles {
        let n = mesh.face_normal(t).unwrap_or_else(nalgebra::Vector3::z);
        out.push_str(&format!("  facet normal {:.6} {:.6} {:.6}\n    outer loop\n", n.x, n.y, n.z));
        for p in mesh.corners(t) {
            out.push_str(&format!("      vertex {:.6} {:.6} {:.6}\n", p.x, p.y, p.z));
        }
        out.push_str("    endloop\n  endfacet\n");
    }
    out.push_str(&format!("endsolid {name}\n"));
    out
}

/// Write `mesh` to `path` in the format its extension implies.
pub fn save(mesh: &Mesh, path: &Path) -> Result<MeshFormat, MeshIoError> {
    if mesh.is_empty() {
        return Err(MeshIoError::Empty(path.to_path_buf()));
    }
    if mesh.has_non_finite() {
        return Err(MeshIoError::NonFinite);
    }
    let format = MeshFormat::from_path(path);
    let wrap = |source| MeshIoError::Write { path: path.to_path_buf(), source };

    let file = File::create(path).map_err(wrap)?;
    let mut out = BufWriter::new(file);
    let written = match format {
        MeshFormat::Obj => write_obj(mesh, &mut out),
        MeshFormat::StlBinary => to_stl_binary(mesh).and_then(|bytes| out.write_all(&bytes)),
        MeshFormat::StlAscii => out.write_all(to_stl_ascii(mesh, "relief").as_bytes()),
    };
    written.and_then(|_| out.flush()).map_err(wrap)?;

    info!("wrote {} ({} vertices, {} triangles)", path.display(), mesh.vertex_count(), mesh.triangle_count());
    Ok(format)
}

/// Findings from a structural pass over OBJ text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjReport {
    pub vertices: usize,
    pub faces: usize,
    /// Face indices outside 1..=vertices (negative/relative indices included).
    pub invalid_indices: usize,
    /// `v` records with fewer than three coordinates or unparsable numbers.
    pub malformed_vertices: usize,
    /// Faces that use a vertex more than once.
    pub duplicate_index_faces: usize,
    /// Coordinates beyond ±1e6 or non-finite.
    pub extreme_values: usize,
}

impl ObjReport {
    pub fn is_valid(&self) -> bool {
        self.vertices > 0
            && self.faces > 0
            && self.invalid_indices == 0
            && self.malformed_vertices == 0
            && self.duplicate_index_faces == 0
            && self.extreme_values == 0
    }
}

pub fn validate_obj(text: &str) -> ObjReport {
    let mut r = ObjReport::default();
    let mut faces: Vec<Vec<i64>> = Vec::new();

    for line in text.lines() {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("v") => {
                r.vertices += 1;
                let coords: Vec<Option<f64>> = parts.map(|s| s.parse::<f64>().ok()).collect();
                if coords.len() < 3 || coords.iter().any(Option::is_none) {
                    r.malformed_vertices += 1;
                } else if coords.iter().flatten().any(|c| !c.is_finite() || c.abs() > 1e6) {
                    r.extreme_values += 1;
                }
            }
            Some("f") => {
                r.faces += 1;
                let idx = parts
                    .map(|s| s.split('/').next().and_then(|i| i.parse::<i64>().ok()).unwrap_or(0))
                    .collect();
                faces.push(idx);
            }
            _ => {}
        }
    }

    let n = r.vertices as i64;
    for f in &faces {
        r.invalid_indices += f.iter().filter(|&&i| i < 1 || i > n).count();
        let mut sorted = f.clone();
        sorted.sort_unstable();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            r.duplicate_index_faces += 1;
        }
    }
    if !r.is_valid() {
        warn!("obj validation: {r:?}");
    }
    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::box_solid;
    use nalgebra::Point3;

    fn cube() -> Mesh {
        box_solid(Point3::origin(), Point3::new(1.0, 2.0, 3.0))
    }

    #[test]
    fn obj_output_validates() {
        let text = to_obj_string(&cube());
        let r = validate_obj(&text);
        assert!(r.is_valid(), "{r:?}");
        assert_eq!((r.vertices, r.faces), (8, 12));
    }

    #[test]
    fn validator_flags_bad_records() {
        let text = "v 0 0 0\nv 1 0\nv 1 1 1e9\nf 1 2 4\nf 1 1 2\n";
        let r = validate_obj(text);
        assert_eq!(r.malformed_vertices, 1);
        assert_eq!(r.extreme_values, 1);
        assert_eq!(r.invalid_indices, 1);
        assert_eq!(r.duplicate_index_faces, 1);
        assert!(!r.is_valid());
    }

    #[test]
    fn binary_stl_has_expected_size() {
        let bytes = to_stl_binary(&cube()).expect("in-memory write");
        assert_eq!(bytes.len(), 84 + 50 * 12);
    }

    #[test]
    fn stla_path_is_saved_as_text() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("cube.stla");
        assert_eq!(save(&cube(), &path).expect("save"), MeshFormat::StlAscii);
        let text = std::fs::read_to_string(&path).expect("read back");
        assert!(text.starts_with("solid relief"));
        assert_eq!(text.matches("endfacet").count(), 12);
    }

    #[test]
    fn ascii_stl_lists_every_facet() {
        let text = to_stl_ascii(&cube(), "cube");
        assert_eq!(text.matches("facet normal").count(), 12);
        assert!(text.starts_with("solid cube") && text.trim_end().ends_with("endsolid cube"));
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(MeshFormat::from_path(Path::new("a/b.OBJ")), MeshFormat::Obj);
        assert_eq!(MeshFormat::from_path(Path::new("a/b.stl")), MeshFormat::StlBinary);
        assert_eq!(MeshFormat::from_path(Path::new("a/b.STLA")), MeshFormat::StlAscii);
        assert_eq!(MeshFormat::from_path(Path::new("noext")), MeshFormat::StlBinary);
    }

    #[test]
    fn save_refuses_empty_mesh() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("empty.stl");
        assert!(matches!(save(&Mesh::default(), &path), Err(MeshIoError::Empty(_))));
        assert!(!path.exists());
    }

    #[test]
    fn save_writes_both_formats() {
        let dir = tempfile::tempdir().expect("temp dir");
        for name in ["out.stl", "out.obj"] {
            let path = dir.path().join(name);
            save(&cube(), &path).expect("write");
            assert!(std::fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false));
        }
    }
}
