//! Device-resident vertex/index storage for one [`SubMesh`].

use asset::SubMesh;

use crate::{
    device::{AttributeFormat, AttributeLocation, BufferId, BufferUsage, GpuDevice},
    error::{GpuError, RenderError, RenderResult},
    ownership::{Acquire, OwnershipGuard},
};

const WHAT: &str = "Geometry buffer";

/// Vertex input locations resolved from the program in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttributes {
    pub position: AttributeLocation,
    pub normal: AttributeLocation,
    pub texcoord: AttributeLocation,
}

/// Byte ranges of the three attribute regions inside the vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexRegions {
    pub positions: u64,
    pub normals: u64,
    pub texcoords: u64,
    pub total: u64,
}

impl VertexRegions {
    pub fn for_vertex_count(count: usize) -> Self {
        let count = count as u64;
        let positions = 0;
        let normals = positions + count * AttributeFormat::Float32x3.size();
        let texcoords = normals + count * AttributeFormat::Float32x3.size();
        let total = texcoords + count * AttributeFormat::Float32x2.size();
        Self {
            positions,
            normals,
            texcoords,
            total,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Buffers {
    vertex: BufferId,
    index: BufferId,
}

#[derive(Debug)]
pub struct GeometryBuffer {
    mesh: SubMesh,
    regions: VertexRegions,
    buffers: Option<Buffers>,
    guard: OwnershipGuard,
}

impl GeometryBuffer {
    pub fn new(mesh: SubMesh) -> Self {
        let regions = VertexRegions::for_vertex_count(mesh.vertex_count());
        Self {
            mesh,
            regions,
            buffers: None,
            guard: OwnershipGuard::new(),
        }
    }

    pub fn mesh(&self) -> &SubMesh {
        &self.mesh
    }

    pub fn regions(&self) -> VertexRegions {
        self.regions
    }

    pub fn is_created(&self) -> bool {
        self.guard.is_created()
    }

    pub fn vertex_buffer(&self) -> Option<BufferId> {
        self.buffers.map(|b| b.vertex)
    }

    pub fn index_buffer(&self) -> Option<BufferId> {
        self.buffers.map(|b| b.index)
    }

    /// Allocate and upload on the calling thread. A second call from the
    /// owning thread is a no-op; a call from another thread re-uploads.
    pub fn create_on_gl_thread(&mut self, device: &mut dyn GpuDevice) -> RenderResult<()> {
        match self.guard.check_create(WHAT) {
            Acquire::AlreadyOwned => return Ok(()),
            // Old handles belong to the previous context; until the new
            // upload succeeds nothing is owned.
            Acquire::Migrated { .. } => {
                self.buffers = None;
                self.guard.clear();
            }
            Acquire::Fresh => {}
        }

        let vertex = device.create_buffer(BufferUsage::Vertex, self.regions.total, "Sub-mesh VB")?;
        let index_size = (self.mesh.index_count() * 2) as u64;
        let index = match device.create_buffer(BufferUsage::Index, index_size, "Sub-mesh IB") {
            Ok(index) => index,
            Err(err) => {
                device.destroy_buffer(vertex);
                return Err(err.into());
            }
        };
        if let Err(err) = self.upload(device, vertex, index) {
            device.destroy_buffer(vertex);
            device.destroy_buffer(index);
            return Err(err.into());
        }

        log::debug!(
            "Uploaded sub-mesh: {} vertices ({} bytes), {} indices",
            self.mesh.vertex_count(),
            self.regions.total,
            self.mesh.index_count()
        );
        self.buffers = Some(Buffers { vertex, index });
        self.guard.claim();
        Ok(())
    }

    fn upload(
        &self,
        device: &mut dyn GpuDevice,
        vertex: BufferId,
        index: BufferId,
    ) -> Result<(), GpuError> {
        let (mesh, regions) = (&self.mesh, &self.regions);
        device.write_buffer(vertex, regions.positions, bytemuck::cast_slice(mesh.positions()))?;
        device.write_buffer(vertex, regions.normals, bytemuck::cast_slice(mesh.normals()))?;
        device.write_buffer(vertex, regions.texcoords, bytemuck::cast_slice(mesh.texcoords()))?;
        device.write_buffer(index, 0, bytemuck::cast_slice(mesh.indices()))
    }

    /// Point the three attribute streams at this buffer, draw, then disable
    /// the streams again so the next drawable starts from a clean state.
    pub fn draw(
        &mut self,
        device: &mut dyn GpuDevice,
        attributes: &VertexAttributes,
    ) -> RenderResult<()> {
        self.create_on_gl_thread(device)?;
        let buffers = self.buffers.ok_or(RenderError::NotCreated(WHAT))?;
        let streams = [
            (attributes.position, self.regions.positions, AttributeFormat::Float32x3),
            (attributes.normal, self.regions.normals, AttributeFormat::Float32x3),
            (attributes.texcoord, self.regions.texcoords, AttributeFormat::Float32x2),
        ];

        let mut result = Ok(());
        for (location, offset, format) in streams {
            result = device.set_vertex_attribute(location, buffers.vertex, offset, format);
            if result.is_err() {
                break;
            }
            device.enable_vertex_attribute(location);
        }
        if result.is_ok() {
            result = device.draw_indexed(buffers.index, self.mesh.index_count() as u32);
        }
        for (location, _, _) in streams {
            device.disable_vertex_attribute(location);
        }
        result.map_err(Into::into)
    }

    /// Release the device buffers. Refused from a non-owning thread.
    pub fn destroy(&mut self, device: &mut dyn GpuDevice) -> RenderResult<()> {
        match self.guard.check_release(WHAT) {
            Ok(()) => {}
            Err(RenderError::NotCreated(_)) => return Ok(()),
            Err(err) => return Err(err),
        }
        if let Some(buffers) = self.buffers.take() {
            device.destroy_buffer(buffers.vertex);
            device.destroy_buffer(buffers.index);
        }
        self.guard.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::device::{GpuCall, ProgramSource, RecordingDevice};
    use crate::shader::{ATTRIBUTES, UNIFORMS};

    fn quad() -> SubMesh {
        SubMesh::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            vec![[0.0, 0.0, 1.0]; 4],
            vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            vec![0, 1, 2, 0, 2, 3],
            vec![0],
            true,
        )
        .unwrap()
    }

    fn attributes() -> VertexAttributes {
        VertexAttributes {
            position: AttributeLocation(0),
            normal: AttributeLocation(1),
            texcoord: AttributeLocation(2),
        }
    }

    #[test]
    fn regions_are_disjoint() {
        let regions = VertexRegions::for_vertex_count(4);
        assert_eq!(regions.normals, 48);
        assert_eq!(regions.texcoords, 96);
        assert_eq!(regions.total, 128);
    }

    #[test]
    fn create_uploads_once_per_thread() {
        let mut device = RecordingDevice::new();
        let mut geometry = GeometryBuffer::new(quad());
        geometry.create_on_gl_thread(&mut device).unwrap();
        let handles = (geometry.vertex_buffer(), geometry.index_buffer());
        geometry.create_on_gl_thread(&mut device).unwrap();

        assert_eq!((geometry.vertex_buffer(), geometry.index_buffer()), handles);
        assert_eq!(device.count(|c| matches!(c, GpuCall::CreateBuffer { .. })), 2);
        assert_eq!(device.count(|c| matches!(c, GpuCall::WriteBuffer { .. })), 4);
        assert!(device.calls().contains(&GpuCall::CreateBuffer {
            id: handles.1.unwrap(),
            usage: BufferUsage::Index,
            size: 12,
        }));
    }

    #[test]
    fn draw_restores_attribute_state() {
        let mut device = RecordingDevice::new();
        let program = device
            .create_program(&ProgramSource {
                label: "p",
                vertex: "",
                fragment: "",
                uniforms: UNIFORMS,
                attributes: ATTRIBUTES,
                textures: &[],
            })
            .unwrap();
        device.use_program(program).unwrap();

        let mut geometry = GeometryBuffer::new(quad());
        geometry.draw(&mut device, &attributes()).unwrap();
        assert!(device.enabled_attributes().is_empty());
        assert_eq!(
            device.count(|c| matches!(c, GpuCall::DrawIndexed { index_count: 6, .. })),
            1
        );
    }

    #[test]
    fn destroy_from_other_thread_is_refused() {
        let mut device = RecordingDevice::new();
        let mut geometry = GeometryBuffer::new(quad());
        geometry.create_on_gl_thread(&mut device).unwrap();

        thread::scope(|s| {
            s.spawn(|| {
                let err = geometry.destroy(&mut device).unwrap_err();
                assert!(matches!(err, RenderError::WrongThread { .. }));
            });
        });
        assert_eq!(device.live_buffers().len(), 2);

        geometry.destroy(&mut device).unwrap();
        assert!(device.live_buffers().is_empty());
        assert!(!geometry.is_created());
    }

    #[test]
    fn create_from_other_thread_reinitializes() {
        let mut device = RecordingDevice::new();
        let mut geometry = GeometryBuffer::new(quad());
        geometry.create_on_gl_thread(&mut device).unwrap();
        let first = geometry.vertex_buffer();

        thread::scope(|s| {
            s.spawn(|| geometry.create_on_gl_thread(&mut device).unwrap());
        });
        assert_ne!(geometry.vertex_buffer(), first);
        assert_eq!(device.count(|c| matches!(c, GpuCall::CreateBuffer { .. })), 4);
    }

    #[test]
    fn failed_migration_leaves_buffer_unowned() {
        let mut device = RecordingDevice::new();
        let mut geometry = GeometryBuffer::new(quad());
        geometry.create_on_gl_thread(&mut device).unwrap();

        thread::scope(|s| {
            s.spawn(|| {
                device.fail_next_buffer();
                assert!(geometry.create_on_gl_thread(&mut device).is_err());
            });
        });
        assert!(!geometry.is_created());
        assert!(geometry.vertex_buffer().is_none());

        geometry.create_on_gl_thread(&mut device).unwrap();
        assert!(geometry.is_created());
        assert!(geometry.index_buffer().is_some());
    }
}
