//! Asset loading/parsers (scene graphs, materials, textures) and the mesh
//! partitioner that turns a parsed scene into GPU-addressable sub-meshes.

pub mod material;
pub mod mesh;
pub mod mtl;
pub mod obj;
pub mod partition;
pub mod scene;
pub mod texture;

pub use material::{
    IlluminationModel, MaterialDefinition, MaterialTable, TextureMaps, TextureOptions, TextureSlot,
};
pub use mesh::{MAX_SUBMESH_VERTICES, MeshError, SubMesh};
pub use mtl::load_mtl_from_path;
pub use obj::load_obj_from_path;
pub use partition::{Partition, PartitionError, partition_scene};
pub use scene::{FaceVertex, Polygon, SceneGraph};
pub use texture::TextureData;
