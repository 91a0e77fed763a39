use std::collections::HashMap;
use std::path::{Path, PathBuf};
use glam::{Vec2, Vec3};
use crate::mesh::{FrontFace, Group, MeshData, Vertex};

#[derive(Debug, thiserror::Error)]
pub enum ObjError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("line {line}: face has {count} corners, expected 3 or 4")]
    UnsupportedFace { line: usize, count: usize },
    #[error("line {line}: {kind} index {index} is out of range")]
    IndexOutOfRange { line: usize, kind: &'static str, index: i64 },
    #[error("failed to read {path:?}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

/// Reads an OBJ file, resolving material libraries against the file's directory.
pub fn load_obj(path: &Path, front_face: FrontFace) -> Result<MeshData, ObjError> {
    let source = std::fs::read_to_string(path).map_err(|source| ObjError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let base_dir = path.parent().unwrap_or(Path::new("."));
    parse_obj(&source, base_dir, front_face)
}

/// Appends the triangles for one face to `out`.
///
/// Quads `(v0, v1, v2, v3)` become `(v0, v2, v1, v0, v3, v2)` for counter-clockwise source faces
/// and `(v0, v1, v2, v0, v2, v3)` for clockwise ones, so the output is clockwise either way.
/// Triangles use the first half of the rule.
pub fn triangulate_face(corners: &[u32], front_face: FrontFace, out: &mut Vec<u32>) {
    match (corners, front_face) {
        (&[v0, v1, v2], FrontFace::CounterClockwise) => out.extend([v0, v2, v1]),
        (&[v0, v1, v2], FrontFace::Clockwise) => out.extend([v0, v1, v2]),
        (&[v0, v1, v2, v3], FrontFace::CounterClockwise) => {
            out.extend([v0, v2, v1, v0, v3, v2])
        }
        (&[v0, v1, v2, v3], FrontFace::Clockwise) => {
            out.extend([v0, v1, v2, v0, v2, v3])
        }
        _ => debug_assert!(false, "faces are validated to 3 or 4 corners"),
    }
}

#[derive(Default)]
struct ObjParser {
    positions: Vec<Vec3>,
    texcoords: Vec<Vec2>,
    normals: Vec<Vec3>,
    corner_lookup: HashMap<(usize, Option<usize>, Option<usize>), u32>,
    group_name: String,
    group_start: u32,
    mesh: MeshData,
}

pub fn parse_obj(
    source: &str,
    base_dir: &Path,
    front_face: FrontFace,
) -> Result<MeshData, ObjError> {
    let mut parser = ObjParser {
        group_name: "default".into(),
        ..Default::default()
    };

    for (i, raw_line) in source.lines().enumerate() {
        let line = i + 1;
        let content = raw_line.split('#').next().unwrap_or("").trim();
        let mut tokens = content.split_whitespace();
        let Some(keyword) = tokens.next() else {
            continue;
        };

        match keyword {
            "v" => {
                let [x, y, z] = parse_floats::<3>(&mut tokens, line)?;
                parser.positions.push(Vec3::new(x, y, z));
            }
            "vt" => {
                let [u, v] = parse_floats::<2>(&mut tokens, line)?;
                parser.texcoords.push(Vec2::new(u, v));
            }
            "vn" => {
                let [x, y, z] = parse_floats::<3>(&mut tokens, line)?;
                parser.normals.push(Vec3::new(x, y, z));
            }
            "f" => {
                let corners = tokens
                    .map(|token| parser.resolve_corner(token, line))
                    .collect::<Result<smallvec::SmallVec<[u32; 4]>, ObjError>>()?;
                if !(3..=4).contains(&corners.len()) {
                    return Err(ObjError::UnsupportedFace {
                        line,
                        count: corners.len(),
                    });
                }
                triangulate_face(&corners, front_face, &mut parser.mesh.indices);
            }
            "g" | "o" => {
                let name = tokens.collect::<Vec<_>>().join(" ");
                parser.close_group();
                parser.group_name = if name.is_empty() { "default".into() } else { name };
            }
            "mtllib" => {
                parser.mesh.material_libraries
                    .extend(tokens.map(|name| base_dir.join(name)));
            }
            // Materials, smoothing groups and the rest do not affect geometry
            _ => log::trace!("Ignoring OBJ statement '{}' on line {}", keyword, line),
        }
    }

    parser.close_group();

    let mut mesh = parser.mesh;
    if parser.normals.is_empty() && !mesh.indices.is_empty() {
        mesh.generate_normals();
    }

    log::debug!(
        "Parsed OBJ: {} vertices, {} triangles, {} groups",
        mesh.vertices.len(),
        mesh.triangle_count(),
        mesh.groups.len(),
    );

    Ok(mesh)
}

impl ObjParser {
    fn close_group(&mut self) {
        let end = self.mesh.indices.len() as u32;
        if end > self.group_start {
            self.mesh.groups.push(Group {
                name: std::mem::take(&mut self.group_name),
                indices: self.group_start..end,
            });
        }
        self.group_start = end;
    }

    /// Maps a `v`, `v/vt`, `v//vn` or `v/vt/vn` corner to a unique output vertex.
    fn resolve_corner(&mut self, token: &str, line: usize) -> Result<u32, ObjError> {
        let mut parts = token.split('/');
        let position = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| syntax(line, format!("missing position index in '{token}'")))?;
        let position = resolve_index(position, self.positions.len(), "position", line)?;
        let texcoord = match parts.next() {
            Some(t) if !t.is_empty() => Some(resolve_index(t, self.texcoords.len(), "texcoord", line)?),
            _ => None,
        };
        let normal = match parts.next() {
            Some(n) if !n.is_empty() => Some(resolve_index(n, self.normals.len(), "normal", line)?),
            _ => None,
        };
        if parts.next().is_some() {
            return Err(syntax(line, format!("too many components in '{token}'")));
        }

        let key = (position, texcoord, normal);
        if let Some(&index) = self.corner_lookup.get(&key) {
            return Ok(index);
        }

        let index = self.mesh.vertices.len() as u32;
        self.mesh.vertices.push(Vertex {
            position: self.positions[position],
            normal: normal.map_or(Vec3::ZERO, |n| self.normals[n]),
            texcoord: texcoord.map_or(Vec2::ZERO, |t| self.texcoords[t]),
        });
        self.corner_lookup.insert(key, index);
        Ok(index)
    }
}

/// OBJ indices are 1-based; negative values count back from the latest element.
fn resolve_index(token: &str, len: usize, kind: &'static str, line: usize) -> Result<usize, ObjError> {
    let index: i64 = token
        .parse()
        .map_err(|_| syntax(line, format!("invalid {kind} index '{token}'")))?;
    let resolved = match index {
        i if i > 0 => i - 1,
        i if i < 0 => len as i64 + i,
        _ => -1,
    };
    if resolved < 0 || resolved >= len as i64 {
        return Err(ObjError::IndexOutOfRange { line, kind, index });
    }
    Ok(resolved as usize)
}

fn parse_floats<'a, const N: usize>(
    tokens: &mut impl Iterator<Item = &'a str>,
    line: usize,
) -> Result<[f32; N], ObjError> {
    let mut values = [0.0; N];
    for value in &mut values {
        let token = tokens
            .next()
            .ok_or_else(|| syntax(line, format!("expected {N} components")))?;
        *value = token
            .parse()
            .map_err(|_| syntax(line, format!("invalid number '{token}'")))?;
    }
    Ok(values)
}

fn syntax(line: usize, message: String) -> ObjError {
    ObjError::Syntax { line, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
f 1 2 3 4
";

    #[test]
    fn quad_winding_counter_clockwise() {
        let mut out = Vec::new();
        triangulate_face(&[10, 11, 12, 13], FrontFace::CounterClockwise, &mut out);
        assert_eq!(out, [10, 12, 11, 10, 13, 12]);
    }

    #[test]
    fn quad_winding_clockwise() {
        let mut out = Vec::new();
        triangulate_face(&[10, 11, 12, 13], FrontFace::Clockwise, &mut out);
        assert_eq!(out, [10, 11, 12, 10, 12, 13]);
    }

    #[test]
    fn parsed_quad_uses_winding_rule() {
        let mesh = parse_obj(QUAD, Path::new("."), FrontFace::CounterClockwise).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, [0, 2, 1, 0, 3, 2]);
        // No normals in the source, so they are generated
        assert!(mesh.vertices.iter().all(|v| v.normal.length() > 0.99));
    }

    #[test]
    fn corners_with_shared_attributes_are_deduplicated() {
        let source = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vn 0 0 1
f 1/1/1 2/1/1 3/1/1
f 1/1/1 3/1/1 4/1/1
";
        let mesh = parse_obj(source, Path::new("."), FrontFace::Clockwise).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, [0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn negative_and_normal_only_indices() {
        let source = "\
v 0 0 0
v 1 0 0
v 0 1 0
vn 0 0 1
f -3//1 -2//1 -1//1
";
        let mesh = parse_obj(source, Path::new("."), FrontFace::Clockwise).unwrap();
        assert_eq!(mesh.indices, [0, 1, 2]);
        assert_eq!(mesh.vertices[2].position, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(mesh.vertices[0].normal, Vec3::Z);
    }

    #[test]
    fn groups_and_material_libraries() {
        let source = "\
mtllib a.mtl
v 0 0 0
v 1 0 0
v 0 1 0
g first
f 1 2 3
g second
f 3 2 1
";
        let mesh = parse_obj(source, Path::new("models"), FrontFace::Clockwise).unwrap();
        assert_eq!(mesh.material_libraries, [Path::new("models").join("a.mtl")]);
        assert_eq!(mesh.groups.len(), 2);
        assert_eq!(mesh.groups[0].name, "first");
        assert_eq!(mesh.groups[0].indices, 0..3);
        assert_eq!(mesh.groups[1].indices, 3..6);
    }

    #[test]
    fn malformed_faces_are_rejected() {
        let five = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nv 0 2 0\nf 1 2 3 4 5\n";
        assert!(matches!(
            parse_obj(five, Path::new("."), FrontFace::Clockwise),
            Err(ObjError::UnsupportedFace { line: 6, count: 5 })
        ));

        let out_of_range = "v 0 0 0\nf 1 2 3\n";
        assert!(matches!(
            parse_obj(out_of_range, Path::new("."), FrontFace::Clockwise),
            Err(ObjError::IndexOutOfRange { line: 2, kind: "position", index: 2 })
        ));

        let garbage = "v 0 zero 0\n";
        assert!(matches!(
            parse_obj(garbage, Path::new("."), FrontFace::Clockwise),
            Err(ObjError::Syntax { line: 1, .. })
        ));
    }
}
