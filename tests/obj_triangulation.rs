use std::path::{Path, PathBuf};
use glam::Vec3;
use strata::mesh::{load_obj, parse_obj, FrontFace, MeshData, ObjError};
use strata::renderer::passes::scene::fit_to_unit_cube;

fn bundled_cube() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("assets").join("cube.obj")
}

fn triangle(mesh: &MeshData, tri: &[u32]) -> [Vec3; 3] {
    [0, 1, 2].map(|i| mesh.vertices[tri[i] as usize].position)
}

/// Clockwise triangles seen from outside have a right-handed normal pointing inward.
fn assert_clockwise_from_outside(mesh: &MeshData) {
    for tri in mesh.indices.chunks_exact(3) {
        let [a, b, c] = triangle(mesh, tri);
        let geometric = (b - a).cross(c - a);
        let outward = mesh.vertices[tri[0] as usize].normal;
        assert!(geometric.dot(outward) < 0.0, "triangle {tri:?} is not clockwise");
    }
}

#[test]
fn bundled_cube_loads() {
    let mesh = load_obj(&bundled_cube(), FrontFace::CounterClockwise).unwrap();

    // Every corner has its own texcoord/normal pair, so nothing is shared between faces
    assert_eq!(mesh.vertices.len(), 24);
    assert_eq!(mesh.triangle_count(), 12);
    assert_eq!(
        mesh.groups.iter().map(|g| g.name.as_str()).collect::<Vec<_>>(),
        ["front", "back", "right", "left", "top", "bottom"]
    );
    assert_eq!(mesh.material_libraries, [bundled_cube().with_file_name("cube.mtl")]);
    assert_eq!(mesh.bounds(), Some((Vec3::splat(-0.5), Vec3::splat(0.5))));
}

#[test]
fn counter_clockwise_source_becomes_clockwise() {
    let mesh = load_obj(&bundled_cube(), FrontFace::CounterClockwise).unwrap();
    assert_clockwise_from_outside(&mesh);
}

#[test]
fn clockwise_source_is_kept_clockwise() {
    // The bundled cube with every face reversed
    let source = std::fs::read_to_string(bundled_cube()).unwrap();
    let reversed = source
        .lines()
        .map(|line| match line.strip_prefix("f ") {
            Some(corners) => {
                let mut corners = corners.split_whitespace().collect::<Vec<_>>();
                corners.reverse();
                format!("f {}", corners.join(" "))
            }
            None => line.to_owned(),
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mesh = parse_obj(&reversed, Path::new("."), FrontFace::Clockwise).unwrap();
    assert_eq!(mesh.triangle_count(), 12);
    assert_clockwise_from_outside(&mesh);
}

#[test]
fn quads_split_along_the_first_diagonal() {
    let source = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n";
    let ccw = parse_obj(source, Path::new("."), FrontFace::CounterClockwise).unwrap();
    let cw = parse_obj(source, Path::new("."), FrontFace::Clockwise).unwrap();

    assert_eq!(ccw.indices, [0, 2, 1, 0, 3, 2]);
    assert_eq!(cw.indices, [0, 1, 2, 0, 2, 3]);
    // Same diagonal either way
    for mesh in [&ccw, &cw] {
        assert!(mesh.indices[..3].contains(&2) && mesh.indices[3..].contains(&2));
    }
}

#[test]
fn generated_normals_face_the_viewer_of_the_source_winding() {
    let source = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
    let mesh = parse_obj(source, Path::new("."), FrontFace::CounterClockwise).unwrap();
    for vertex in &mesh.vertices {
        assert!(vertex.normal.abs_diff_eq(Vec3::Z, 1e-6));
    }
}

#[test]
fn comments_blank_lines_and_unknown_statements_are_skipped() {
    let source = "\
# header

s off
usemtl red
v 0 0 0 # origin
v 1 0 0
v 0 1 0
f 1 2 3
";
    let mesh = parse_obj(source, Path::new("."), FrontFace::Clockwise).unwrap();
    assert_eq!(mesh.indices, [0, 1, 2]);
    assert_eq!(mesh.groups.len(), 1);
    assert_eq!(mesh.groups[0].name, "default");
}

#[test]
fn missing_file_reports_path() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets").join("missing.obj");
    match load_obj(&path, FrontFace::CounterClockwise) {
        Err(ObjError::Io { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected an I/O error, got {other:?}"),
    }
}

#[test]
fn empty_source_yields_empty_mesh() {
    let mesh = parse_obj("", Path::new("."), FrontFace::CounterClockwise).unwrap();
    assert!(mesh.indices.is_empty());
    assert!(mesh.bounds().is_none());
    assert_eq!(fit_to_unit_cube(mesh.bounds()), glam::Mat4::IDENTITY);
}

#[test]
fn fitted_cube_spans_minus_one_to_one() {
    let mesh = load_obj(&bundled_cube(), FrontFace::CounterClockwise).unwrap();
    let fit = fit_to_unit_cube(mesh.bounds());
    let (min, max) = mesh.bounds().unwrap();
    assert!(fit.transform_point3(min).abs_diff_eq(Vec3::splat(-1.0), 1e-6));
    assert!(fit.transform_point3(max).abs_diff_eq(Vec3::splat(1.0), 1e-6));
}
