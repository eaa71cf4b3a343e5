//! Mesh partitioner: splits a multi-material scene graph into
//! single-material sub-meshes that each fit 16-bit indices.
//!
//! Polygons are grouped by material in order of first appearance. Unassigned
//! polygons form one more group bound to [`MaterialDefinition::fallback`].
//! Each group is then carved greedily: polygons are appended to the current
//! sub-mesh until the next one would push its distinct-vertex count past the
//! limit, at which point the sub-mesh is closed and a new one is started.

use std::{collections::HashMap, sync::Arc};

use thiserror::Error;

use crate::{
    material::{MaterialDefinition, MaterialTable},
    mesh::{MAX_SUBMESH_VERTICES, MeshError, SubMesh},
    scene::{FaceVertex, Polygon, SceneGraph},
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PartitionError {
    #[error("Cannot find material '{name}' (first used by polygon {polygon})")]
    MissingMaterial { name: String, polygon: usize },
    #[error("Polygon {polygon} has {count} vertices; at least 3 are required")]
    DegeneratePolygon { polygon: usize, count: usize },
    #[error("Polygon {polygon} has {count} distinct vertices; a sub-mesh holds at most {limit}")]
    PolygonTooLarge {
        polygon: usize,
        count: usize,
        limit: usize,
    },
    #[error("Polygon {polygon} references {attribute} {index}, but only {len} exist")]
    IndexOutOfRange {
        polygon: usize,
        attribute: &'static str,
        index: usize,
        len: usize,
    },
    #[error(transparent)]
    Mesh(#[from] MeshError),
}

/// A sub-mesh and the material it is drawn with.
#[derive(Clone, Debug)]
pub struct Partition {
    pub mesh: SubMesh,
    pub material: Arc<MaterialDefinition>,
}

/// Partition `scene` with the 16-bit vertex limit.
pub fn partition_scene(
    scene: &SceneGraph,
    materials: &MaterialTable,
) -> Result<Vec<Partition>, PartitionError> {
    partition_scene_with_limit(scene, materials, MAX_SUBMESH_VERTICES)
}

/// Partition with a custom vertex limit, clamped to `1..=MAX_SUBMESH_VERTICES`.
pub fn partition_scene_with_limit(
    scene: &SceneGraph,
    materials: &MaterialTable,
    max_vertices: usize,
) -> Result<Vec<Partition>, PartitionError> {
    let limit = max_vertices.clamp(1, MAX_SUBMESH_VERTICES);
    let groups = group_by_material(scene, materials)?;

    let mut partitions = Vec::new();
    for group in groups {
        let mut builder = SubMeshBuilder::new(scene);
        for &polygon_idx in &group.polygons {
            let polygon = &scene.polygons[polygon_idx];
            let needed = builder.new_vertices(polygon);
            if builder.vertex_count() + needed > limit && !builder.is_empty() {
                partitions.push(builder.finish(&group.material)?);
                builder = SubMeshBuilder::new(scene);
            }
            let needed = builder.new_vertices(polygon);
            if needed > limit {
                return Err(PartitionError::PolygonTooLarge {
                    polygon: polygon_idx,
                    count: needed,
                    limit,
                });
            }
            builder.push(polygon_idx, polygon)?;
        }
        if !builder.is_empty() {
            partitions.push(builder.finish(&group.material)?);
        }
    }

    log::debug!(
        "Partitioned {} polygons into {} sub-meshes",
        scene.polygons.len(),
        partitions.len()
    );
    Ok(partitions)
}

struct MaterialGroup {
    material: Arc<MaterialDefinition>,
    polygons: Vec<usize>,
}

/// Stable grouping; every material name is resolved before any mesh is built.
fn group_by_material(
    scene: &SceneGraph,
    materials: &MaterialTable,
) -> Result<Vec<MaterialGroup>, PartitionError> {
    let mut groups: Vec<MaterialGroup> = Vec::new();
    let mut by_name: HashMap<Option<&str>, usize> = HashMap::new();
    let mut fallback: Option<Arc<MaterialDefinition>> = None;

    for (polygon_idx, polygon) in scene.polygons.iter().enumerate() {
        if polygon.vertices.len() < 3 {
            return Err(PartitionError::DegeneratePolygon {
                polygon: polygon_idx,
                count: polygon.vertices.len(),
            });
        }

        let key = polygon.material.as_deref();
        let group_idx = match by_name.get(&key) {
            Some(&idx) => idx,
            None => {
                let material = match key {
                    Some(name) => materials
                        .get(name)
                        .cloned()
                        .ok_or_else(|| PartitionError::MissingMaterial {
                            name: name.to_string(),
                            polygon: polygon_idx,
                        })?,
                    None => fallback
                        .get_or_insert_with(|| Arc::new(MaterialDefinition::fallback()))
                        .clone(),
                };
                groups.push(MaterialGroup {
                    material,
                    polygons: Vec::new(),
                });
                by_name.insert(key, groups.len() - 1);
                groups.len() - 1
            }
        };
        groups[group_idx].polygons.push(polygon_idx);
    }

    Ok(groups)
}

/// Accumulates polygons into one sub-mesh, de-duplicating corners.
struct SubMeshBuilder<'a> {
    scene: &'a SceneGraph,
    remap: HashMap<FaceVertex, u16>,
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    texcoords: Vec<[f32; 2]>,
    indices: Vec<u16>,
    polygons: Vec<usize>,
    smooth_normals: bool,
}

impl<'a> SubMeshBuilder<'a> {
    fn new(scene: &'a SceneGraph) -> Self {
        Self {
            scene,
            remap: HashMap::new(),
            positions: Vec::new(),
            normals: Vec::new(),
            texcoords: Vec::new(),
            indices: Vec::new(),
            polygons: Vec::new(),
            smooth_normals: true,
        }
    }

    fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Distinct corners of `polygon` not yet present in this sub-mesh.
    fn new_vertices(&self, polygon: &Polygon) -> usize {
        let mut fresh: Vec<&FaceVertex> = Vec::with_capacity(polygon.vertices.len());
        for corner in &polygon.vertices {
            if !self.remap.contains_key(corner) && !fresh.contains(&corner) {
                fresh.push(corner);
            }
        }
        fresh.len()
    }

    fn push(&mut self, polygon_idx: usize, polygon: &Polygon) -> Result<(), PartitionError> {
        let mut corners = Vec::with_capacity(polygon.vertices.len());
        for corner in &polygon.vertices {
            corners.push(self.vertex(polygon_idx, corner)?);
        }
        // Triangulate fan
        for tri in 1..(corners.len() - 1) {
            self.indices
                .extend_from_slice(&[corners[0], corners[tri], corners[tri + 1]]);
        }
        self.smooth_normals &= polygon.has_normals();
        self.polygons.push(polygon_idx);
        Ok(())
    }

    fn vertex(&mut self, polygon_idx: usize, corner: &FaceVertex) -> Result<u16, PartitionError> {
        if let Some(&idx) = self.remap.get(corner) {
            return Ok(idx);
        }
        let scene = self.scene;
        let out_of_range = |attribute: &'static str, index: usize, len: usize| {
            PartitionError::IndexOutOfRange {
                polygon: polygon_idx,
                attribute,
                index,
                len,
            }
        };

        let position = *scene
            .positions
            .get(corner.position)
            .ok_or_else(|| out_of_range("position", corner.position, scene.positions.len()))?;
        let texcoord = match corner.texcoord {
            Some(i) => *scene
                .texcoords
                .get(i)
                .ok_or_else(|| out_of_range("texcoord", i, scene.texcoords.len()))?,
            None => [0.0, 0.0],
        };
        let normal = match corner.normal {
            Some(i) => *scene
                .normals
                .get(i)
                .ok_or_else(|| out_of_range("normal", i, scene.normals.len()))?,
            None => [0.0, 0.0, 0.0],
        };

        let idx = u16::try_from(self.positions.len()).map_err(|_| MeshError::TooManyVertices {
            count: self.positions.len() + 1,
        })?;
        self.positions.push(position);
        self.texcoords.push(texcoord);
        self.normals.push(normal);
        self.remap.insert(*corner, idx);
        Ok(idx)
    }

    fn finish(self, material: &Arc<MaterialDefinition>) -> Result<Partition, PartitionError> {
        let mesh = SubMesh::new(
            self.positions,
            self.normals,
            self.texcoords,
            self.indices,
            self.polygons,
            self.smooth_normals,
        )?;
        log::debug!(
            "Sub-mesh for '{}': {} vertices, {} indices",
            material.name,
            mesh.vertex_count(),
            mesh.index_count()
        );
        Ok(Partition {
            mesh,
            material: Arc::clone(material),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::FALLBACK_MATERIAL_NAME;

    fn quad_scene(materials: &[Option<&str>]) -> SceneGraph {
        let mut scene = SceneGraph::new();
        scene.positions = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]];
        for material in materials {
            let corners = (0..4).map(|i| FaceVertex::new(i, None, None)).collect();
            scene
                .polygons
                .push(Polygon::new(corners, material.map(str::to_string)));
        }
        scene
    }

    #[test]
    fn shared_corners_are_deduplicated() {
        let scene = quad_scene(&[Some("a"), Some("a")]);
        let table: MaterialTable = [MaterialDefinition::new("a")].into_iter().collect();
        let parts = partition_scene(&scene, &table).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].mesh.vertex_count(), 4);
        assert_eq!(parts[0].mesh.index_count(), 12);
        assert_eq!(parts[0].mesh.source_polygons(), &[0, 1]);
        assert!(!parts[0].mesh.smooth_normals());
    }

    #[test]
    fn unassigned_polygons_use_fallback_group() {
        let scene = quad_scene(&[None, Some("a"), None]);
        let table: MaterialTable = [MaterialDefinition::new("a")].into_iter().collect();
        let parts = partition_scene(&scene, &table).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].material.name, FALLBACK_MATERIAL_NAME);
        assert_eq!(parts[0].mesh.source_polygons(), &[0, 2]);
        assert_eq!(parts[1].material.name, "a");
    }

    #[test]
    fn groups_keep_first_appearance_order() {
        let scene = quad_scene(&[Some("b"), Some("a"), Some("b")]);
        let table: MaterialTable = [MaterialDefinition::new("a"), MaterialDefinition::new("b")]
            .into_iter()
            .collect();
        let names: Vec<_> = partition_scene(&scene, &table)
            .unwrap()
            .into_iter()
            .map(|p| p.material.name.clone())
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn small_limit_splits_without_sharing_polygons() {
        let mut scene = SceneGraph::new();
        for i in 0..10 {
            let base = scene.positions.len();
            let x = i as f32;
            scene.positions.extend([[x, 0.0, 0.0], [x, 1.0, 0.0], [x, 0.0, 1.0]]);
            let corners = (base..base + 3).map(|p| FaceVertex::new(p, None, None)).collect();
            scene.polygons.push(Polygon::new(corners, None));
        }
        let parts = partition_scene_with_limit(&scene, &MaterialTable::new(), 7).unwrap();
        // Two triangles (6 vertices) fit per sub-mesh.
        assert_eq!(parts.len(), 5);
        assert!(parts.iter().all(|p| p.mesh.vertex_count() <= 7));
        let covered: Vec<usize> = parts
            .iter()
            .flat_map(|p| p.mesh.source_polygons().iter().copied())
            .collect();
        assert_eq!(covered, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn polygon_larger_than_limit_is_rejected() {
        let scene = quad_scene(&[None]);
        let err = partition_scene_with_limit(&scene, &MaterialTable::new(), 3).unwrap_err();
        assert_eq!(
            err,
            PartitionError::PolygonTooLarge {
                polygon: 0,
                count: 4,
                limit: 3
            }
        );
    }

    #[test]
    fn bad_attribute_index_is_reported() {
        let mut scene = quad_scene(&[None]);
        scene.polygons[0].vertices[1].normal = Some(5);
        let err = partition_scene(&scene, &MaterialTable::new()).unwrap_err();
        assert!(matches!(
            err,
            PartitionError::IndexOutOfRange {
                polygon: 0,
                attribute: "normal",
                index: 5,
                len: 0
            }
        ));
    }

    #[test]
    fn degenerate_polygon_is_rejected() {
        let mut scene = quad_scene(&[None]);
        scene.polygons[0].vertices.truncate(2);
        assert_eq!(
            partition_scene(&scene, &MaterialTable::new()).unwrap_err(),
            PartitionError::DegeneratePolygon { polygon: 0, count: 2 }
        );
    }
}
