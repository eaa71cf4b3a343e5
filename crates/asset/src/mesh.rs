//! CPU-side sub-mesh: one material, 16-bit addressable.

use corelib::{Bounds3, Vec3};
use thiserror::Error;

/// Vertex limit imposed by 16-bit indices.
pub const MAX_SUBMESH_VERTICES: usize = u16::MAX as usize;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeshError {
    #[error("Sub-mesh has no vertex or index data")]
    Empty,
    #[error(
        "Attribute arrays differ in length \
         (positions={positions}, normals={normals}, texcoords={texcoords})"
    )]
    AttributeLengthMismatch {
        positions: usize,
        normals: usize,
        texcoords: usize,
    },
    #[error("Sub-mesh has {count} vertices; at most {MAX_SUBMESH_VERTICES} are addressable")]
    TooManyVertices { count: usize },
    #[error("Index count {0} is not a multiple of 3")]
    NotTriangles(usize),
    #[error("Index {index} out of range for {count} vertices")]
    IndexOutOfRange { index: u16, count: usize },
}

/// Indexed triangle list with parallel attribute arrays (one entry per vertex).
#[derive(Clone, Debug, PartialEq)]
pub struct SubMesh {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    texcoords: Vec<[f32; 2]>,
    indices: Vec<u16>,
    source_polygons: Vec<usize>,
    smooth_normals: bool,
    bounds: Bounds3,
}

impl SubMesh {
    /// Validates the vertex limit, parallel array lengths and index range.
    pub fn new(
        positions: Vec<[f32; 3]>,
        normals: Vec<[f32; 3]>,
        texcoords: Vec<[f32; 2]>,
        indices: Vec<u16>,
        source_polygons: Vec<usize>,
        smooth_normals: bool,
    ) -> Result<Self, MeshError> {
        let count = positions.len();
        if count != normals.len() || count != texcoords.len() {
            return Err(MeshError::AttributeLengthMismatch {
                positions: count,
                normals: normals.len(),
                texcoords: texcoords.len(),
            });
        }
        if count > MAX_SUBMESH_VERTICES {
            return Err(MeshError::TooManyVertices { count });
        }
        if indices.len() % 3 != 0 {
            return Err(MeshError::NotTriangles(indices.len()));
        }
        if let Some(&index) = indices.iter().find(|&&i| usize::from(i) >= count) {
            return Err(MeshError::IndexOutOfRange { index, count });
        }
        let bounds = Bounds3::from_points(positions.iter().map(|p| Vec3::from_array(*p)))
            .ok_or(MeshError::Empty)?;
        if indices.is_empty() {
            return Err(MeshError::Empty);
        }

        Ok(Self {
            positions,
            normals,
            texcoords,
            indices,
            source_polygons,
            smooth_normals,
            bounds,
        })
    }

    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    pub fn normals(&self) -> &[[f32; 3]] {
        &self.normals
    }

    pub fn texcoords(&self) -> &[[f32; 2]] {
        &self.texcoords
    }

    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    /// Indices of the scene polygons this sub-mesh was built from.
    pub fn source_polygons(&self) -> &[usize] {
        &self.source_polygons
    }

    /// `true` when every source polygon carried normals; otherwise the
    /// shader derives flat normals for the whole sub-mesh.
    pub fn smooth_normals(&self) -> bool {
        self.smooth_normals
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn bounds(&self) -> Bounds3 {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> (Vec<[f32; 3]>, Vec<[f32; 3]>, Vec<[f32; 2]>) {
        (
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 2.0, 0.0]],
            vec![[0.0, 0.0, 1.0]; 3],
            vec![[0.0, 0.0]; 3],
        )
    }

    #[test]
    fn valid_triangle_has_bounds() {
        let (p, n, t) = triangle();
        let mesh = SubMesh::new(p, n, t, vec![0, 1, 2], vec![0], true).expect("valid mesh");
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.bounds().max, Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn rejects_out_of_range_index() {
        let (p, n, t) = triangle();
        let err = SubMesh::new(p, n, t, vec![0, 1, 3], vec![0], true).unwrap_err();
        assert_eq!(err, MeshError::IndexOutOfRange { index: 3, count: 3 });
    }

    #[test]
    fn rejects_oversize_vertex_count() {
        let count = MAX_SUBMESH_VERTICES + 1;
        let err = SubMesh::new(
            vec![[0.0; 3]; count],
            vec![[0.0; 3]; count],
            vec![[0.0; 2]; count],
            vec![0, 1, 2],
            vec![0],
            true,
        )
        .unwrap_err();
        assert_eq!(err, MeshError::TooManyVertices { count });
    }

    #[test]
    fn rejects_missing_data() {
        assert_eq!(
            SubMesh::new(vec![], vec![], vec![], vec![], vec![], true).unwrap_err(),
            MeshError::Empty
        );
        let (p, n, t) = triangle();
        assert_eq!(
            SubMesh::new(p, n, t, vec![], vec![], true).unwrap_err(),
            MeshError::Empty
        );
    }
}
