//! Draw list recording with minimal state changes.
//!
//! [`DrawBatcher`] turns a [`DrawList`] into commands. Opaque draws are
//! visited through a permutation stably sorted by (material, index buffer) so
//! that draws sharing state are adjacent; transparent draws follow in the
//! order they were submitted. While walking both lists the batcher tracks what
//! is bound and only rebinds on change:
//!
//! | Change | Commands |
//! |---|---|
//! | pipeline | bind pipeline, bind scene set at 0 |
//! | material | bind material set at 1 |
//! | index buffer | bind index buffer |
//!
//! Every draw gets its own push constants and `draw_indexed`.

mod item;

pub use item::{Bounds, DrawItem, DrawList};

use crate::backend::GpuBackend;
use crate::materials::MaterialId;
use crate::mesh::GpuDrawPushConstants;
use crate::profile_scope;
use crate::types::{
    BufferHandle, CommandBufferHandle, DescriptorSetHandle, PipelineHandle, ShaderStages,
};

/// Descriptor set index of the per-frame scene data.
pub const SCENE_SET: u32 = 0;

/// Descriptor set index of the material set.
pub const MATERIAL_SET: u32 = 1;

/// Counters for one recorded draw list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawStats {
    /// Indexed draws issued.
    pub draw_calls: u32,
    /// Triangles drawn (`index_count / 3` per draw).
    pub triangles: u32,
}

#[derive(Debug, Default)]
struct BoundState {
    pipeline: Option<PipelineHandle>,
    material: Option<MaterialId>,
    index_buffer: Option<BufferHandle>,
}

/// Records draw lists into command buffers.
///
/// The batcher keeps its sort scratch buffer between frames.
#[derive(Debug, Default)]
pub struct DrawBatcher {
    opaque_order: Vec<usize>,
}

impl DrawBatcher {
    /// Create a new batcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Indices into `list.opaque()` in the order they will be drawn.
    pub fn sort_opaque(&mut self, list: &DrawList) -> &[usize] {
        let opaque = list.opaque();
        self.opaque_order.clear();
        self.opaque_order.extend(0..opaque.len());
        self.opaque_order
            .sort_by_key(|&i| (opaque[i].material.id(), opaque[i].index_buffer));
        &self.opaque_order
    }

    /// Record every draw of `list`, opaque first, binding `scene_set` at set 0
    /// whenever the pipeline changes.
    pub fn record(
        &mut self,
        backend: &dyn GpuBackend,
        command_buffer: CommandBufferHandle,
        scene_set: DescriptorSetHandle,
        list: &DrawList,
    ) -> DrawStats {
        profile_scope!("draw_geometry");

        let mut bound = BoundState::default();
        let mut stats = DrawStats::default();

        self.sort_opaque(list);
        for &i in &self.opaque_order {
            record_draw(
                backend,
                command_buffer,
                scene_set,
                &list.opaque()[i],
                &mut bound,
                &mut stats,
            );
        }
        for item in list.transparent() {
            record_draw(
                backend,
                command_buffer,
                scene_set,
                item,
                &mut bound,
                &mut stats,
            );
        }

        log::trace!(
            "Recorded {} draws ({} triangles)",
            stats.draw_calls,
            stats.triangles
        );
        stats
    }
}

fn record_draw(
    backend: &dyn GpuBackend,
    command_buffer: CommandBufferHandle,
    scene_set: DescriptorSetHandle,
    item: &DrawItem,
    bound: &mut BoundState,
    stats: &mut DrawStats,
) {
    let material = &item.material;
    let pipeline = material.pipeline();

    if bound.material != Some(material.id()) {
        bound.material = Some(material.id());

        if bound.pipeline != Some(pipeline.pipeline) {
            bound.pipeline = Some(pipeline.pipeline);
            backend.cmd_bind_pipeline(command_buffer, pipeline.pipeline);
            backend.cmd_bind_descriptor_sets(
                command_buffer,
                pipeline.layout,
                SCENE_SET,
                &[scene_set],
            );
        }

        backend.cmd_bind_descriptor_sets(
            command_buffer,
            pipeline.layout,
            MATERIAL_SET,
            &[material.material_set()],
        );
    }

    if bound.index_buffer != Some(item.index_buffer) {
        bound.index_buffer = Some(item.index_buffer);
        backend.cmd_bind_index_buffer(command_buffer, item.index_buffer, 0);
    }

    let push_constants = GpuDrawPushConstants::new(item.transform, item.vertex_buffer_address);
    backend.cmd_push_constants(
        command_buffer,
        pipeline.layout,
        ShaderStages::VERTEX,
        0,
        bytemuck::bytes_of(&push_constants),
    );
    backend.cmd_draw_indexed(command_buffer, item.index_count, item.first_index);

    stats.draw_calls += 1;
    stats.triangles += item.index_count / 3;
}
