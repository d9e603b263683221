//! GPU mesh data and uploads.
//!
//! Vertices are not bound through vertex input. Shaders read them from a
//! storage buffer through its device address, which every draw passes in
//! [`GpuDrawPushConstants`] alongside the world matrix.

use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};

use crate::backend::GpuBackend;
use crate::deferred::DeletionQueue;
use crate::draw::Bounds;
use crate::error::GraphicsError;
use crate::immediate::ImmediateExecutor;
use crate::materials::MaterialInstance;
use crate::types::{BufferCopy, BufferDescriptor, BufferHandle, BufferUsage};

/// Vertex layout shared with the shaders.
///
/// UVs are split across the padding slots of the two `Vec3`s.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub uv_x: f32,
    pub normal: Vec3,
    pub uv_y: f32,
    pub color: Vec4,
}

/// Per-draw push constants.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuDrawPushConstants {
    pub world_matrix: Mat4,
    pub vertex_buffer: u64,
    pub _padding: u64,
}

impl GpuDrawPushConstants {
    /// Push constants for one draw.
    pub fn new(world_matrix: Mat4, vertex_buffer: u64) -> Self {
        Self {
            world_matrix,
            vertex_buffer,
            _padding: 0,
        }
    }
}

/// Device-local buffers of an uploaded mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuMeshBuffers {
    /// 32-bit index buffer.
    pub index_buffer: BufferHandle,
    /// Vertex storage buffer.
    pub vertex_buffer: BufferHandle,
    /// Device address of `vertex_buffer`.
    pub vertex_buffer_address: u64,
}

impl GpuMeshBuffers {
    /// Record both buffers for destruction.
    pub fn defer_destroy(&self, queue: &mut DeletionQueue) {
        queue.record(self.index_buffer);
        queue.record(self.vertex_buffer);
    }
}

/// A contiguous index range of a mesh drawn with one material.
#[derive(Debug, Clone)]
pub struct GeoSurface {
    /// First index of the range.
    pub start_index: u32,
    /// Number of indices.
    pub count: u32,
    /// Mesh-space bounds of the range.
    pub bounds: Bounds,
    /// Material the range is drawn with.
    pub material: Arc<MaterialInstance>,
}

/// An uploaded mesh and its surfaces.
#[derive(Debug, Clone)]
pub struct MeshAsset {
    /// Mesh name, for logging.
    pub name: String,
    /// Index ranges and their materials.
    pub surfaces: Vec<GeoSurface>,
    /// Index and vertex buffers.
    pub buffers: GpuMeshBuffers,
}

/// Upload a mesh into device-local buffers.
///
/// Both arrays go through one host-visible staging buffer, copied by an
/// immediate submission. The staging buffer is destroyed once the copy has
/// completed; the returned buffers are owned by the caller, who records them
/// into a deletion queue. If creating or filling a buffer fails, the buffers
/// created so far are destroyed before the error is returned.
pub fn upload_mesh(
    backend: &dyn GpuBackend,
    immediate: &mut ImmediateExecutor,
    indices: &[u32],
    vertices: &[Vertex],
) -> Result<GpuMeshBuffers, GraphicsError> {
    let mut created = DeletionQueue::new("mesh upload");
    let staged = match stage_mesh(backend, &mut created, indices, vertices) {
        Ok(staged) => staged,
        Err(err) => {
            created.flush(backend);
            return Err(err);
        }
    };

    let copied = immediate.submit(backend, |backend, cmd| {
        backend.cmd_copy_buffer(
            cmd,
            staged.staging,
            staged.vertex_buffer,
            &BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: staged.vertex_size,
            },
        );
        backend.cmd_copy_buffer(
            cmd,
            staged.staging,
            staged.index_buffer,
            &BufferCopy {
                src_offset: staged.vertex_size,
                dst_offset: 0,
                size: staged.index_size,
            },
        );
        Ok(())
    });
    // After a failed wait the copy may still be using every buffer.
    created.release();
    if let Err(err) = copied {
        log::error!("Mesh copy failed, its buffers are leaked: {}", err);
        return Err(err);
    }
    backend.destroy_buffer(staged.staging);

    log::debug!(
        "Uploaded mesh: {} vertices, {} indices",
        vertices.len(),
        indices.len()
    );

    Ok(GpuMeshBuffers {
        index_buffer: staged.index_buffer,
        vertex_buffer: staged.vertex_buffer,
        vertex_buffer_address: staged.vertex_buffer_address,
    })
}

/// Buffers of a mesh whose bytes sit in the staging buffer.
struct StagedMesh {
    vertex_buffer: BufferHandle,
    vertex_buffer_address: u64,
    index_buffer: BufferHandle,
    staging: BufferHandle,
    vertex_size: u64,
    index_size: u64,
}

/// Create the device and staging buffers and fill the staging buffer.
///
/// Every buffer is recorded into `created` as soon as it exists.
fn stage_mesh(
    backend: &dyn GpuBackend,
    created: &mut DeletionQueue,
    indices: &[u32],
    vertices: &[Vertex],
) -> Result<StagedMesh, GraphicsError> {
    let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
    let index_bytes: &[u8] = bytemuck::cast_slice(indices);
    let vertex_size = vertex_bytes.len() as u64;
    let index_size = index_bytes.len() as u64;

    let vertex_buffer = backend.create_buffer(
        &BufferDescriptor::new(
            vertex_size,
            BufferUsage::STORAGE | BufferUsage::COPY_DST | BufferUsage::DEVICE_ADDRESS,
        )
        .with_label("mesh vertices"),
    )?;
    created.record(vertex_buffer);
    let vertex_buffer_address = backend.buffer_device_address(vertex_buffer);

    let index_buffer = backend.create_buffer(
        &BufferDescriptor::new(index_size, BufferUsage::INDEX | BufferUsage::COPY_DST)
            .with_label("mesh indices"),
    )?;
    created.record(index_buffer);

    let staging = backend.create_buffer(
        &BufferDescriptor::staging(vertex_size + index_size).with_label("mesh staging"),
    )?;
    created.record(staging);
    backend.write_buffer(staging, 0, vertex_bytes)?;
    backend.write_buffer(staging, vertex_size, index_bytes)?;

    Ok(StagedMesh {
        vertex_buffer,
        vertex_buffer_address,
        index_buffer,
        staging,
        vertex_size,
        index_size,
    })
}
