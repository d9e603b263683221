//! Per-frame resources.

use crate::backend::GpuBackend;
use crate::config::RenderConfig;
use crate::deferred::{DeferredResource, DeletionQueue};
use crate::descriptors::DescriptorAllocator;
use crate::error::GraphicsError;
use crate::types::{
    CommandBufferHandle, CommandPoolHandle, DescriptorSetHandle, DescriptorSetLayoutHandle,
    FenceHandle, SemaphoreHandle,
};

/// Where a frame slot is in the frame protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    /// The slot's previous submission is known complete (or it never had one).
    #[default]
    Idle,
    /// The CPU is recording commands into the slot.
    Recording,
    /// The slot's commands are on the GPU; its fence has not been observed.
    Submitted,
}

/// Everything one in-flight frame owns.
///
/// A slot's command buffer, deletion queue and descriptor pools are only
/// touched after its fence has been observed signaled.
#[derive(Debug)]
pub struct FrameSlot {
    index: usize,
    state: SlotState,
    render_fence: FenceHandle,
    swapchain_semaphore: SemaphoreHandle,
    render_semaphore: SemaphoreHandle,
    command_pool: CommandPoolHandle,
    command_buffer: CommandBufferHandle,
    deletion_queue: DeletionQueue,
    descriptors: DescriptorAllocator,
}

impl FrameSlot {
    /// Create the slot's sync objects, commands and descriptor pools.
    ///
    /// On failure the objects already created are destroyed again.
    pub(crate) fn new(
        backend: &dyn GpuBackend,
        index: usize,
        config: &RenderConfig,
    ) -> Result<Self, GraphicsError> {
        let mut created = DeletionQueue::new("frame slot init");
        match Self::create(backend, index, config, &mut created) {
            Ok(slot) => {
                created.release();
                Ok(slot)
            }
            Err(err) => {
                created.flush(backend);
                Err(err)
            }
        }
    }

    fn create(
        backend: &dyn GpuBackend,
        index: usize,
        config: &RenderConfig,
        created: &mut DeletionQueue,
    ) -> Result<Self, GraphicsError> {
        // Signaled so the first wait on a fresh slot returns at once.
        let render_fence = backend.create_fence(true)?;
        created.record(render_fence);
        let swapchain_semaphore = backend.create_semaphore()?;
        created.record(swapchain_semaphore);
        let render_semaphore = backend.create_semaphore()?;
        created.record(render_semaphore);
        let command_pool = backend.create_command_pool()?;
        created.record(command_pool);
        let command_buffer = backend.allocate_command_buffer(command_pool)?;
        let descriptors = DescriptorAllocator::new(
            backend,
            config.frame_descriptor_sets,
            &config.frame_pool_ratios,
        )?;

        Ok(Self {
            index,
            state: SlotState::Idle,
            render_fence,
            swapchain_semaphore,
            render_semaphore,
            command_pool,
            command_buffer,
            deletion_queue: DeletionQueue::new("frame deletion queue"),
            descriptors,
        })
    }

    /// Slot index in `[0, frames_in_flight)`.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Current protocol state.
    pub fn state(&self) -> SlotState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SlotState) {
        self.state = state;
    }

    /// Fence signaled when the slot's submission completes.
    pub fn render_fence(&self) -> FenceHandle {
        self.render_fence
    }

    /// Semaphore signaled by swapchain image acquisition.
    pub fn swapchain_semaphore(&self) -> SemaphoreHandle {
        self.swapchain_semaphore
    }

    /// Semaphore signaled when rendering completes; gates presentation.
    pub fn render_semaphore(&self) -> SemaphoreHandle {
        self.render_semaphore
    }

    /// The slot's command buffer.
    pub fn command_buffer(&self) -> CommandBufferHandle {
        self.command_buffer
    }

    /// The slot's deletion queue.
    pub fn deletion_queue(&self) -> &DeletionQueue {
        &self.deletion_queue
    }

    /// The slot's descriptor allocator.
    pub fn descriptors(&self) -> &DescriptorAllocator {
        &self.descriptors
    }

    /// Destroy `resource` once this slot's current submission has completed.
    pub fn defer_destroy(&mut self, resource: impl Into<DeferredResource>) {
        self.deletion_queue.record(resource);
    }

    /// Allocate a descriptor set that lives until this slot is next reused.
    pub fn allocate_descriptor_set(
        &mut self,
        backend: &dyn GpuBackend,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<DescriptorSetHandle, GraphicsError> {
        self.descriptors.allocate(backend, layout)
    }

    /// Flush the deletion queue and recycle descriptor pools.
    ///
    /// Only valid once the slot's fence has been observed signaled.
    pub(crate) fn recycle(&mut self, backend: &dyn GpuBackend) -> Result<(), GraphicsError> {
        self.deletion_queue.flush(backend);
        self.descriptors.reset_pools(backend)
    }

    /// Destroy everything the slot owns. The device must be idle.
    pub(crate) fn destroy(&mut self, backend: &dyn GpuBackend) {
        self.deletion_queue.flush(backend);
        self.descriptors.destroy_pools(backend);
        backend.destroy_command_pool(self.command_pool);
        backend.destroy_semaphore(self.render_semaphore);
        backend.destroy_semaphore(self.swapchain_semaphore);
        backend.destroy_fence(self.render_fence);
    }
}
