//! Minimal OBJ parser producing a [`SceneGraph`]: positions, normals,
//! texture coordinates, polygons and their `usemtl` material references.

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use anyhow::{Context, Result, anyhow};

use crate::scene::{FaceVertex, Polygon, SceneGraph};

/// Load an OBJ scene from a file path.
pub fn load_obj_from_path(path: impl AsRef<Path>) -> Result<SceneGraph> {
    let file = File::open(&path)
        .with_context(|| format!("Failed to open OBJ file: {}", path.as_ref().display()))?;
    load_obj_from_reader(BufReader::new(file))
}

/// Load an OBJ scene from a [`BufRead`] implementation.
pub fn load_obj_from_reader<R: BufRead>(reader: R) -> Result<SceneGraph> {
    parse_obj(reader)
}

/// Convenience helper to parse an OBJ string literal.
pub fn load_obj_from_str(contents: &str) -> Result<SceneGraph> {
    parse_obj(io::Cursor::new(contents))
}

fn parse_obj<R: BufRead>(reader: R) -> Result<SceneGraph> {
    let mut scene = SceneGraph::new();
    let mut current_material: Option<String> = None;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_no + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut parts = trimmed.split_whitespace();
        let tag = parts
            .next()
            .ok_or_else(|| anyhow!("Malformed OBJ line {}: '{}'", line_no + 1, trimmed))?;

        match tag {
            "v" => {
                let x = parse_f32(parts.next(), line_no, "x coordinate")?;
                let y = parse_f32(parts.next(), line_no, "y coordinate")?;
                let z = parse_f32(parts.next(), line_no, "z coordinate")?;
                scene.positions.push([x, y, z]);
            }
            "vt" => {
                let u = parse_f32(parts.next(), line_no, "u coordinate")?;
                // `vt u` is legal; v defaults to 0.
                let v = match parts.next() {
                    Some(token) => parse_f32(Some(token), line_no, "v coordinate")?,
                    None => 0.0,
                };
                scene.texcoords.push([u, v]);
            }
            "vn" => {
                let nx = parse_f32(parts.next(), line_no, "nx coordinate")?;
                let ny = parse_f32(parts.next(), line_no, "ny coordinate")?;
                let nz = parse_f32(parts.next(), line_no, "nz coordinate")?;
                scene.normals.push([nx, ny, nz]);
            }
            "f" => {
                let mut corners: Vec<FaceVertex> = Vec::new();
                for part in parts {
                    let (vi, vti, vni) = parse_face_vertex(
                        part,
                        scene.positions.len(),
                        scene.texcoords.len(),
                        scene.normals.len(),
                        line_no,
                    )?;
                    corners.push(FaceVertex::new(vi, vti, vni));
                }

                if corners.len() < 3 {
                    log::debug!("Skipping degenerate face on line {}", line_no + 1);
                    continue;
                }
                scene
                    .polygons
                    .push(Polygon::new(corners, current_material.clone()));
            }
            "usemtl" => {
                let name = rest_of_line(trimmed, tag);
                if name.is_empty() {
                    anyhow::bail!("usemtl without a material name on line {}", line_no + 1);
                }
                current_material = Some(name.to_string());
            }
            "mtllib" => {
                scene
                    .material_libs
                    .extend(parts.map(str::to_string));
            }
            _ => {
                // Ignore other directives (o/g/s/etc.)
            }
        }
    }

    if scene.is_empty() {
        anyhow::bail!("OBJ contained no faces");
    }

    Ok(scene)
}

fn rest_of_line<'a>(line: &'a str, tag: &str) -> &'a str {
    line[tag.len()..].trim()
}

fn parse_f32(value: Option<&str>, line_no: usize, what: &str) -> Result<f32> {
    let token = value.ok_or_else(|| anyhow!("Missing {} on line {}", what, line_no + 1))?;
    token
        .parse::<f32>()
        .with_context(|| format!("Failed to parse {} on line {}", what, line_no + 1))
}

fn parse_face_vertex(
    token: &str,
    pos_count: usize,
    tex_count: usize,
    norm_count: usize,
    line_no: usize,
) -> Result<(usize, Option<usize>, Option<usize>)> {
    let mut split = token.split('/');
    let pos = split
        .next()
        .ok_or_else(|| anyhow!("Malformed face element '{}' on line {}", token, line_no + 1))?;
    let pos_idx = resolve_index(pos, pos_count, line_no)?;

    let tex_idx = match split.next() {
        Some(value) if !value.is_empty() => Some(resolve_index(value, tex_count, line_no)?),
        _ => None,
    };

    let norm_idx = match split.next() {
        Some(value) if !value.is_empty() => Some(resolve_index(value, norm_count, line_no)?),
        _ => None,
    };

    Ok((pos_idx, tex_idx, norm_idx))
}

fn resolve_index(token: &str, len: usize, line_no: usize) -> Result<usize> {
    let raw = token
        .parse::<i64>()
        .with_context(|| format!("Invalid index '{}' on line {}", token, line_no + 1))?;
    if raw == 0 {
        anyhow::bail!("OBJ indices are 1-based; found 0 on line {}", line_no + 1);
    }

    let idx = if raw > 0 { raw - 1 } else { len as i64 + raw };

    if idx < 0 || idx as usize >= len {
        anyhow::bail!(
            "OBJ index {} resolved out of bounds (len={}) on line {}",
            raw,
            len,
            line_no + 1
        );
    }

    Ok(idx as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_triangle() {
        let src = r#"
            v 0.0 0.0 0.0
            v 1.0 0.0 0.0
            v 0.0 1.0 0.0
            vn 0.0 0.0 1.0
            vt 0.0 0.0
            vt 1.0 0.0
            vt 0.0 1.0
            f 1/1/1 2/2/1 3/3/1
        "#;
        let scene = load_obj_from_str(src).expect("parse triangle");
        assert_eq!(scene.positions.len(), 3);
        assert_eq!(scene.polygons.len(), 1);
        assert_eq!(scene.polygons[0].vertices[2], FaceVertex::new(2, Some(2), Some(0)));
        assert!(scene.polygons[0].has_normals());
        assert_eq!(scene.polygons[0].material, None);
    }

    #[test]
    fn tracks_usemtl_and_mtllib() {
        let src = r#"
            mtllib cube.mtl extra.mtl
            v 0 0 0
            v 1 0 0
            v 1 1 0
            v 0 1 0
            usemtl red paint
            f 1 2 3
            usemtl blue
            f -4 -2 -1
            f 1//1 2//1 3//1
        "#;
        let err = load_obj_from_str(src).unwrap_err();
        // The last face references a normal that does not exist.
        assert!(err.to_string().contains("out of bounds"), "{err}");

        let scene = load_obj_from_str(&src.replace("f 1//1 2//1 3//1", "f 1 3 4")).unwrap();
        assert_eq!(scene.material_libs, vec!["cube.mtl", "extra.mtl"]);
        assert_eq!(scene.polygons[0].material.as_deref(), Some("red paint"));
        assert_eq!(scene.polygons[1].material.as_deref(), Some("blue"));
        assert_eq!(scene.polygons[1].vertices[0].position, 0);
        assert_eq!(scene.material_names(), vec!["red paint", "blue"]);
    }

    #[test]
    fn keeps_quads_as_single_polygons() {
        let src = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\nf 1 2\n";
        let scene = load_obj_from_str(src).unwrap();
        assert_eq!(scene.polygons.len(), 1);
        assert_eq!(scene.polygons[0].triangle_count(), 2);
        assert!(!scene.polygons[0].has_normals());
    }

    #[test]
    fn rejects_zero_index() {
        let err = load_obj_from_str("v 0 0 0\nv 1 0 0\nv 1 1 0\nf 0 1 2\n").unwrap_err();
        assert!(err.to_string().contains("1-based"));
    }
}
