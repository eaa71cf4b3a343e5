//! In-memory scene graph produced by the OBJ parser.

/// One corner of a polygon: indices into the scene's attribute pools (0-based).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FaceVertex {
    pub position: usize,
    pub texcoord: Option<usize>,
    pub normal: Option<usize>,
}

impl FaceVertex {
    pub fn new(position: usize, texcoord: Option<usize>, normal: Option<usize>) -> Self {
        Self {
            position,
            texcoord,
            normal,
        }
    }
}

/// Planar polygon with an optional material reference.
/// `material == None` means the polygon is unassigned.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    pub vertices: Vec<FaceVertex>,
    pub material: Option<String>,
}

impl Polygon {
    pub fn new(vertices: Vec<FaceVertex>, material: Option<String>) -> Self {
        Self { vertices, material }
    }

    /// `true` when every corner carries a normal index.
    pub fn has_normals(&self) -> bool {
        self.vertices.iter().all(|v| v.normal.is_some())
    }

    /// Triangles produced by fan triangulation.
    pub fn triangle_count(&self) -> usize {
        self.vertices.len().saturating_sub(2)
    }
}

/// Attribute pools plus an ordered polygon list. Immutable once loaded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneGraph {
    pub positions: Vec<[f32; 3]>,
    pub texcoords: Vec<[f32; 2]>,
    pub normals: Vec<[f32; 3]>,
    pub polygons: Vec<Polygon>,
    /// `mtllib` references, as written in the file.
    pub material_libs: Vec<String>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// Distinct material names in order of first use.
    pub fn material_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.polygons.iter().filter_map(|p| p.material.as_deref()) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}
