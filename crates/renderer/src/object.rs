//! Drawables: one sub-mesh with its material, and the composite that turns a
//! partitioned OBJ into a single object.

use std::sync::Arc;

use asset::{Partition, SubMesh};
use corelib::{Bounds3, LightingParameters, Mat4};

use crate::{
    config::IlluminationPolicy,
    device::GpuDevice,
    error::{RenderError, RenderResult},
    geometry::GeometryBuffer,
    material::{MaterialBinding, SharedMaterial},
    shader::ShaderLibrary,
    texture_cache::SharedTextureCache,
};

/// Anything the host can create, place, draw and destroy on its GL thread.
pub trait VirtualObject: Send {
    /// Object-space bounds, fixed at construction.
    fn bounds(&self) -> Bounds3;

    fn create_on_gl_thread(&mut self, device: &mut dyn GpuDevice) -> RenderResult<()>;

    fn update_model_matrix(&mut self, anchor: Mat4, scale_factor: f32);

    fn draw(
        &mut self,
        device: &mut dyn GpuDevice,
        view: Mat4,
        projection: Mat4,
        lighting: &LightingParameters,
    ) -> RenderResult<()>;

    fn destroy(&mut self, device: &mut dyn GpuDevice) -> RenderResult<()>;
}

/// One sub-mesh drawn with a (possibly shared) material.
#[derive(Debug)]
pub struct SubMeshRenderer {
    geometry: GeometryBuffer,
    material: SharedMaterial,
}

impl SubMeshRenderer {
    pub fn new(mesh: SubMesh, material: SharedMaterial) -> Self {
        Self {
            geometry: GeometryBuffer::new(mesh),
            material,
        }
    }

    pub fn geometry(&self) -> &GeometryBuffer {
        &self.geometry
    }

    pub fn material(&self) -> &SharedMaterial {
        &self.material
    }
}

impl VirtualObject for SubMeshRenderer {
    fn bounds(&self) -> Bounds3 {
        self.geometry.mesh().bounds()
    }

    fn create_on_gl_thread(&mut self, device: &mut dyn GpuDevice) -> RenderResult<()> {
        self.material.lock().create_on_gl_thread(device)?;
        self.geometry.create_on_gl_thread(device)
    }

    fn update_model_matrix(&mut self, anchor: Mat4, scale_factor: f32) {
        self.material.lock().update_model_matrix(anchor, scale_factor);
    }

    fn draw(
        &mut self,
        device: &mut dyn GpuDevice,
        view: Mat4,
        projection: Mat4,
        lighting: &LightingParameters,
    ) -> RenderResult<()> {
        let mut material = self.material.lock();
        let smooth = self.geometry.mesh().smooth_normals();
        material.pre_draw(device, view, projection, lighting, smooth)?;
        let result = match material.vertex_attributes() {
            Some(attributes) => self.geometry.draw(device, &attributes),
            None => Err(RenderError::NotCreated("Material binding")),
        };
        material.post_draw(device);
        result
    }

    /// Releases the geometry only; the owner of the shared material
    /// destroys it once.
    fn destroy(&mut self, device: &mut dyn GpuDevice) -> RenderResult<()> {
        self.geometry.destroy(device)
    }
}

/// Every sub-mesh of one OBJ behind a single create/update/draw/destroy
/// surface. Materials are destroyed once each, after all geometry.
#[derive(Debug)]
pub struct ObjRenderer {
    parts: Vec<SubMeshRenderer>,
    materials: Vec<SharedMaterial>,
    bounds: Bounds3,
    scale_factor: f32,
}

impl ObjRenderer {
    pub fn new(parts: Vec<SubMeshRenderer>) -> RenderResult<Self> {
        let part_bounds: Vec<Bounds3> = parts.iter().map(VirtualObject::bounds).collect();
        let bounds = Bounds3::union_all(&part_bounds).ok_or(RenderError::EmptyComposite)?;

        let mut materials: Vec<SharedMaterial> = Vec::new();
        for part in &parts {
            if !materials.iter().any(|m| Arc::ptr_eq(m, &part.material)) {
                materials.push(Arc::clone(&part.material));
            }
        }

        Ok(Self {
            parts,
            materials,
            bounds,
            scale_factor: 1.0,
        })
    }

    /// Build one material binding per distinct material and one renderer per
    /// partition. CPU only; nothing touches the device.
    pub fn from_partitions(
        partitions: Vec<Partition>,
        shaders: Arc<ShaderLibrary>,
        textures: SharedTextureCache,
        policy: IlluminationPolicy,
    ) -> RenderResult<Self> {
        let mut bindings: Vec<SharedMaterial> = Vec::new();
        let mut parts = Vec::with_capacity(partitions.len());
        for Partition { mesh, material } in partitions {
            let existing = bindings
                .iter()
                .find(|b| Arc::ptr_eq(b.lock().definition(), &material))
                .cloned();
            let binding = match existing {
                Some(binding) => binding,
                None => {
                    let binding = MaterialBinding::new(
                        material,
                        Arc::clone(&shaders),
                        Arc::clone(&textures),
                        policy,
                    )?
                    .shared();
                    bindings.push(Arc::clone(&binding));
                    binding
                }
            };
            parts.push(SubMeshRenderer::new(mesh, binding));
        }
        Self::new(parts)
    }

    pub fn parts(&self) -> &[SubMeshRenderer] {
        &self.parts
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    /// Own scale, composed with the caller's scale on every update.
    pub fn set_scale_factor(&mut self, scale_factor: f32) {
        self.scale_factor = scale_factor;
    }

    /// Decode all material textures ahead of upload (see
    /// [`MaterialBinding::decode_textures`]).
    pub fn decode_textures(&self) {
        for material in &self.materials {
            material.lock().decode_textures();
        }
    }

    fn destroy_all(&mut self, device: &mut dyn GpuDevice) {
        for part in &mut self.parts {
            if let Err(err) = part.destroy(device) {
                log::warn!("Failed to destroy sub-mesh geometry: {}", err);
            }
        }
        for material in &self.materials {
            let mut material = material.lock();
            if let Err(err) = material.destroy(device) {
                log::warn!("Failed to destroy material '{}': {}", material.name(), err);
            }
        }
    }
}

impl VirtualObject for ObjRenderer {
    fn bounds(&self) -> Bounds3 {
        self.bounds
    }

    fn create_on_gl_thread(&mut self, device: &mut dyn GpuDevice) -> RenderResult<()> {
        for index in 0..self.parts.len() {
            if let Err(err) = self.parts[index].create_on_gl_thread(device) {
                log::error!("Failed to create part {} of {}: {}", index, self.parts.len(), err);
                self.destroy_all(device);
                return Err(err);
            }
        }
        Ok(())
    }

    fn update_model_matrix(&mut self, anchor: Mat4, scale_factor: f32) {
        let scale = self.scale_factor * scale_factor;
        for part in &mut self.parts {
            part.update_model_matrix(anchor, scale);
        }
    }

    fn draw(
        &mut self,
        device: &mut dyn GpuDevice,
        view: Mat4,
        projection: Mat4,
        lighting: &LightingParameters,
    ) -> RenderResult<()> {
        for part in &mut self.parts {
            part.draw(device, view, projection, lighting)?;
        }
        Ok(())
    }

    /// Best-effort: failures are logged and the remaining resources are
    /// still released.
    fn destroy(&mut self, device: &mut dyn GpuDevice) -> RenderResult<()> {
        self.destroy_all(device);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use asset::MaterialDefinition;
    use corelib::Vec3;

    use super::*;
    use crate::{
        device::{GpuCall, RecordingDevice},
        texture_cache::TextureCache,
    };

    fn triangle(offset: f32) -> SubMesh {
        SubMesh::new(
            vec![[offset, 0.0, 0.0], [offset + 1.0, 0.0, 0.0], [offset, 1.0, 0.0]],
            vec![[0.0, 0.0, 1.0]; 3],
            vec![[0.0, 0.0]; 3],
            vec![0, 1, 2],
            vec![0],
            false,
        )
        .unwrap()
    }

    fn material(name: &str) -> SharedMaterial {
        MaterialBinding::new(
            Arc::new(MaterialDefinition::new(name)),
            Arc::new(ShaderLibrary::builtin()),
            TextureCache::shared(),
            IlluminationPolicy::default(),
        )
        .unwrap()
        .shared()
    }

    #[test]
    fn empty_composite_is_rejected() {
        assert!(matches!(ObjRenderer::new(Vec::new()), Err(RenderError::EmptyComposite)));
    }

    #[test]
    fn sub_mesh_draw_binds_then_cleans_up() {
        let mut device = RecordingDevice::new();
        let mut part = SubMeshRenderer::new(triangle(0.0), material("m"));
        part.update_model_matrix(Mat4::IDENTITY, 1.0);
        part.draw(&mut device, Mat4::IDENTITY, Mat4::IDENTITY, &LightingParameters::default())
            .unwrap();

        assert_eq!(device.count(|c| matches!(c, GpuCall::DrawIndexed { .. })), 1);
        assert!(device.enabled_attributes().is_empty());
        assert!(part.geometry().is_created());
        assert!(part.material().lock().is_created());
    }

    #[test]
    fn composite_bounds_cover_every_part() {
        let shared = material("m");
        let renderer = ObjRenderer::new(vec![
            SubMeshRenderer::new(triangle(0.0), Arc::clone(&shared)),
            SubMeshRenderer::new(triangle(4.0), shared),
        ])
        .unwrap();
        let bounds = renderer.bounds();
        assert_eq!(bounds.min, Vec3::ZERO);
        assert_eq!(bounds.max, Vec3::new(5.0, 1.0, 0.0));
        assert_eq!(renderer.material_count(), 1);
    }
}
