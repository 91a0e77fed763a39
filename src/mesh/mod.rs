//! CPU-side mesh data. The renderer only ever sees the flat vertex and index arrays.

pub mod obj;

use glam::{Vec2, Vec3};
use std::ops::Range;

pub use obj::{load_obj, parse_obj, ObjError};

/// Winding of front faces in the source file. Triangulation always emits clockwise front faces,
/// so the rasterizer setup does not depend on it.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub texcoord: Vec2,
}

/// A named run of indices inside [`MeshData::indices`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    pub indices: Range<u32>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub groups: Vec<Group>,
    pub material_libraries: Vec<std::path::PathBuf>,
}

impl MeshData {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Axis-aligned bounds as `(min, max)`, or `None` for an empty mesh.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = self.vertices.first()?.position;
        Some(self.vertices.iter().fold((first, first), |(min, max), v| {
            (min.min(v.position), max.max(v.position))
        }))
    }

    /// Recomputes smooth per-vertex normals from the clockwise triangle list.
    pub fn generate_normals(&mut self) {
        for v in &mut self.vertices {
            v.normal = Vec3::ZERO;
        }
        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let (pa, pb, pc) = (
                self.vertices[a].position,
                self.vertices[b].position,
                self.vertices[c].position,
            );
            // Area-weighted face normal
            let n = (pc - pa).cross(pb - pa);
            for i in [a, b, c] {
                self.vertices[i].normal += n;
            }
        }
        for v in &mut self.vertices {
            v.normal = v.normal.normalize_or_zero();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(x: f32, y: f32, z: f32) -> Vertex {
        Vertex {
            position: Vec3::new(x, y, z),
            ..Default::default()
        }
    }

    #[test]
    fn bounds_cover_all_vertices() {
        let mesh = MeshData {
            vertices: vec![vertex(-1.0, 2.0, 0.5), vertex(3.0, -4.0, 0.0), vertex(0.0, 0.0, -2.0)],
            ..Default::default()
        };
        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min, Vec3::new(-1.0, -4.0, -2.0));
        assert_eq!(max, Vec3::new(3.0, 2.0, 0.5));
        assert_eq!(MeshData::default().bounds(), None);
    }

    #[test]
    fn generated_normals_follow_winding() {
        let mut mesh = MeshData {
            vertices: vec![vertex(0.0, 0.0, 0.0), vertex(1.0, 0.0, 0.0), vertex(0.0, 1.0, 0.0)],
            // Clockwise seen from +Z
            indices: vec![0, 2, 1],
            ..Default::default()
        };
        mesh.generate_normals();
        for v in &mesh.vertices {
            assert!((v.normal - Vec3::Z).length() < 1e-6);
        }
    }
}
