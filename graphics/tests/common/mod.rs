//! Shared fixtures for the frame-core integration tests.
//!
//! Everything runs against the dummy backend, which records every call and
//! reports synchronization protocol violations.

#![allow(dead_code)]

use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};
use moon_graphics::backend::dummy::Call;
use moon_graphics::types::{DescriptorSetLayoutHandle, DescriptorType, ShaderStages};
use moon_graphics::{
    Bounds, DescriptorLayoutBuilder, DrawItem, DummyBackend, GeoSurface, MaterialId,
    MaterialInstance, MaterialPass, MaterialPipeline, MeshAsset, RenderConfig, RenderContext,
    Vertex,
};

/// Initialize logging for test output.
pub fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// A context on a fresh dummy backend.
pub fn dummy_context(frames_in_flight: usize) -> RenderContext<DummyBackend> {
    init_logging();
    RenderContext::init(
        DummyBackend::new(),
        RenderConfig::default().with_frames_in_flight(frames_in_flight),
    )
    .expect("dummy context init")
}

/// Count the calls matching `pred`.
pub fn count(calls: &[Call], pred: impl Fn(&Call) -> bool) -> usize {
    calls.iter().filter(|c| pred(c)).count()
}

/// Index counts of every `DrawIndexed` call, in order.
pub fn drawn_index_counts(calls: &[Call]) -> Vec<u32> {
    calls
        .iter()
        .filter_map(|c| match c {
            Call::DrawIndexed { index_count, .. } => Some(*index_count),
            _ => None,
        })
        .collect()
}

/// Materials sharing one pipeline, with sets from the context's global
/// allocator. Everything is recorded into the global deletion queue.
pub struct MaterialFixture {
    pub pipeline: Arc<MaterialPipeline>,
    pub layout: DescriptorSetLayoutHandle,
}

impl MaterialFixture {
    pub fn new(context: &mut RenderContext<DummyBackend>) -> Self {
        let backend = context.backend();
        let pipeline =
            MaterialPipeline::new(backend.create_pipeline(), backend.create_pipeline_layout());
        let layout = DescriptorLayoutBuilder::new()
            .add_binding(0, DescriptorType::StorageImage)
            .build(backend, ShaderStages::FRAGMENT)
            .expect("material layout");

        context.defer_destroy_global(layout);
        context.defer_destroy_global(pipeline.layout);
        context.defer_destroy_global(pipeline.pipeline);

        Self {
            pipeline: Arc::new(pipeline),
            layout,
        }
    }

    pub fn material(
        &self,
        context: &mut RenderContext<DummyBackend>,
        id: u32,
        pass: MaterialPass,
    ) -> Arc<MaterialInstance> {
        let set = context
            .allocate_global_set(self.layout)
            .expect("material set");
        Arc::new(MaterialInstance::new(
            MaterialId(id),
            self.pipeline.clone(),
            set,
            pass,
        ))
    }
}

/// A unit quad: 4 vertices, 6 indices.
pub fn quad() -> (Vec<u32>, Vec<Vertex>) {
    let vertices = [
        Vec3::new(-0.5, -0.5, 0.0),
        Vec3::new(0.5, -0.5, 0.0),
        Vec3::new(0.5, 0.5, 0.0),
        Vec3::new(-0.5, 0.5, 0.0),
    ]
    .into_iter()
    .map(|position| Vertex {
        position,
        normal: Vec3::Z,
        color: Vec4::ONE,
        ..Default::default()
    })
    .collect();
    (vec![0, 1, 2, 2, 3, 0], vertices)
}

/// Upload a quad as a one-surface mesh.
pub fn quad_mesh(
    context: &mut RenderContext<DummyBackend>,
    name: &str,
    material: Arc<MaterialInstance>,
) -> Arc<MeshAsset> {
    let (indices, vertices) = quad();
    let buffers = context
        .upload_mesh(&indices, &vertices)
        .expect("quad upload");
    Arc::new(MeshAsset {
        name: name.to_string(),
        surfaces: vec![GeoSurface {
            start_index: 0,
            count: indices.len() as u32,
            bounds: Bounds::from_points(vertices.iter().map(|v| v.position)),
            material,
        }],
        buffers,
    })
}

/// A draw item that does not reference real buffers.
pub fn draw_item(
    material: &Arc<MaterialInstance>,
    index_buffer: u64,
    index_count: u32,
) -> DrawItem {
    DrawItem {
        index_count,
        first_index: 0,
        index_buffer: moon_graphics::types::BufferHandle::from_raw(index_buffer),
        vertex_buffer_address: 0,
        material: material.clone(),
        transform: Mat4::IDENTITY,
        bounds: Bounds::default(),
    }
}
