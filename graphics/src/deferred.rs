//! Deferred destruction of GPU objects.
//!
//! GPU commands execute asynchronously; a buffer used by a frame recorded on
//! the CPU may still be read by the GPU one or two frames later. Objects are
//! therefore not destroyed where they stop being needed. Their handles are
//! recorded into a [`DeletionQueue`] and destroyed when the queue is flushed:
//!
//! ```text
//! per-frame queue: flushed by the frame pacer after the slot's fence signals
//! global queue:    flushed once at teardown, after the device is idle
//! ```
//!
//! Flushing runs in exact reverse of record order, so objects recorded after
//! the things they depend on are destroyed first.

use crate::backend::GpuBackend;
use crate::types::{
    BufferHandle, CommandPoolHandle, DescriptorPoolHandle, DescriptorSetLayoutHandle, FenceHandle,
    ImageHandle, ImageViewHandle, PipelineHandle, PipelineLayoutHandle, SamplerHandle,
    SemaphoreHandle,
};

/// A GPU object pending destruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeferredResource {
    Buffer(BufferHandle),
    Image(ImageHandle),
    ImageView(ImageViewHandle),
    Sampler(SamplerHandle),
    Fence(FenceHandle),
    Semaphore(SemaphoreHandle),
    CommandPool(CommandPoolHandle),
    DescriptorPool(DescriptorPoolHandle),
    DescriptorSetLayout(DescriptorSetLayoutHandle),
    Pipeline(PipelineHandle),
    PipelineLayout(PipelineLayoutHandle),
}

impl DeferredResource {
    /// Destroy the resource immediately.
    ///
    /// The caller must ensure the GPU is no longer using it.
    pub fn destroy(self, backend: &dyn GpuBackend) {
        match self {
            Self::Buffer(buffer) => backend.destroy_buffer(buffer),
            Self::Image(image) => backend.destroy_image(image),
            Self::ImageView(view) => backend.destroy_image_view(view),
            Self::Sampler(sampler) => backend.destroy_sampler(sampler),
            Self::Fence(fence) => backend.destroy_fence(fence),
            Self::Semaphore(semaphore) => backend.destroy_semaphore(semaphore),
            Self::CommandPool(pool) => backend.destroy_command_pool(pool),
            Self::DescriptorPool(pool) => backend.destroy_descriptor_pool(pool),
            Self::DescriptorSetLayout(layout) => backend.destroy_descriptor_set_layout(layout),
            Self::Pipeline(pipeline) => backend.destroy_pipeline(pipeline),
            Self::PipelineLayout(layout) => backend.destroy_pipeline_layout(layout),
        }
    }
}

/// LIFO list of GPU objects awaiting destruction.
#[derive(Debug)]
pub struct DeletionQueue {
    label: &'static str,
    pending: Vec<DeferredResource>,
}

impl DeletionQueue {
    /// Create an empty queue. The label only appears in log output.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            pending: Vec::new(),
        }
    }

    /// Record a resource for destruction at the next flush.
    pub fn record(&mut self, resource: impl Into<DeferredResource>) {
        self.pending.push(resource.into());
    }

    /// Destroy every recorded resource, most recent first, and empty the queue.
    pub fn flush(&mut self, backend: &dyn GpuBackend) {
        if self.pending.is_empty() {
            return;
        }
        log::debug!(
            "Flushing {} deferred resources from {}",
            self.pending.len(),
            self.label
        );
        while let Some(resource) = self.pending.pop() {
            resource.destroy(backend);
        }
    }

    /// Empty the queue without destroying anything.
    ///
    /// The caller takes back ownership of every recorded resource.
    pub fn release(&mut self) {
        self.pending.clear();
    }

    /// Number of resources awaiting destruction.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Recorded resources, oldest first.
    pub fn pending(&self) -> &[DeferredResource] {
        &self.pending
    }
}

impl Drop for DeletionQueue {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            log::warn!(
                "{} dropped with {} resources never destroyed",
                self.label,
                self.pending.len()
            );
        }
    }
}

macro_rules! impl_from_handle {
    ($($handle:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$handle> for DeferredResource {
                fn from(handle: $handle) -> Self {
                    Self::$variant(handle)
                }
            }
        )*
    };
}

impl_from_handle!(
    BufferHandle => Buffer,
    ImageHandle => Image,
    ImageViewHandle => ImageView,
    SamplerHandle => Sampler,
    FenceHandle => Fence,
    SemaphoreHandle => Semaphore,
    CommandPoolHandle => CommandPool,
    DescriptorPoolHandle => DescriptorPool,
    DescriptorSetLayoutHandle => DescriptorSetLayout,
    PipelineHandle => Pipeline,
    PipelineLayoutHandle => PipelineLayout,
);
