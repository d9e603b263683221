//! Materials as seen by the draw batcher.
//!
//! Pipelines and material descriptor sets are built by the material loader;
//! this crate only needs their handles, the pass a material renders in, and
//! a stable identity to sort draws by.

use std::sync::Arc;

use crate::deferred::DeletionQueue;
use crate::types::{DescriptorSetHandle, PipelineHandle, PipelineLayoutHandle};

/// Stable material identity used as the primary draw sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MaterialId(pub u32);

/// Render pass a material belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MaterialPass {
    /// Drawn first, sorted to minimize state changes.
    #[default]
    Opaque,
    /// Drawn after opaque geometry, in submission order.
    Transparent,
}

/// A graphics pipeline and the layout its descriptor sets follow.
///
/// Set 0 of the layout is the per-frame scene data, set 1 the material set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialPipeline {
    /// Pipeline to bind.
    pub pipeline: PipelineHandle,
    /// Layout used for descriptor sets and push constants.
    pub layout: PipelineLayoutHandle,
}

impl MaterialPipeline {
    /// Create a new material pipeline.
    pub fn new(pipeline: PipelineHandle, layout: PipelineLayoutHandle) -> Self {
        Self { pipeline, layout }
    }

    /// Record the pipeline and its layout for destruction.
    pub fn defer_destroy(&self, queue: &mut DeletionQueue) {
        queue.record(self.layout);
        queue.record(self.pipeline);
    }
}

/// A material: a shared pipeline plus this material's own descriptor set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialInstance {
    id: MaterialId,
    pipeline: Arc<MaterialPipeline>,
    material_set: DescriptorSetHandle,
    pass: MaterialPass,
}

impl MaterialInstance {
    /// Create a new material instance.
    pub fn new(
        id: MaterialId,
        pipeline: Arc<MaterialPipeline>,
        material_set: DescriptorSetHandle,
        pass: MaterialPass,
    ) -> Self {
        Self {
            id,
            pipeline,
            material_set,
            pass,
        }
    }

    /// Material identity.
    pub fn id(&self) -> MaterialId {
        self.id
    }

    /// Pipeline the material renders with.
    pub fn pipeline(&self) -> &MaterialPipeline {
        &self.pipeline
    }

    /// The material's descriptor set, bound at set 1.
    pub fn material_set(&self) -> DescriptorSetHandle {
        self.material_set
    }

    /// Pass the material belongs to.
    pub fn pass(&self) -> MaterialPass {
        self.pass
    }
}
