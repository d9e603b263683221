//! GPU backend abstraction layer.
//!
//! Every native call the frame core makes goes through the [`GpuBackend`]
//! trait. Objects cross the seam as typed `u64` handles (see
//! [`crate::types`]), so the descriptor allocator, deletion queues and frame
//! pacer never see a native API type.
//!
//! # Available Backends
//!
//! - `dummy` (always available): fake GPU that records every call and checks
//!   the synchronization protocol; used by the test suite
//! - `vulkan-backend` (default feature): native Vulkan backend using ash
//!
//! Bounded waits take an explicit timeout and report
//! [`GraphicsError::Timeout`] when it elapses. Descriptor set allocation
//! reports [`GraphicsError::DescriptorPoolExhausted`] when the pool is out of
//! sets or descriptors, which is the only error the core recovers from.

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

pub mod dummy;

use std::time::Duration;

use crate::error::GraphicsError;
use crate::types::{
    BufferCopy, BufferDescriptor, BufferHandle, CommandBufferHandle, CommandPoolHandle,
    DescriptorBinding, DescriptorPoolHandle, DescriptorPoolSize, DescriptorSetHandle,
    DescriptorSetLayoutHandle, DescriptorWrite, FenceHandle, ImageDescriptor, ImageHandle,
    ImageLayout, ImageViewHandle, PipelineHandle, PipelineLayoutHandle, RenderingInfo, SamplerHandle,
    SemaphoreHandle, ShaderStages, SubmitInfo,
};

pub use dummy::DummyBackend;

/// GPU backend trait for abstracting the native graphics API.
///
/// The trait is object safe; components take `&dyn GpuBackend` so the same
/// code drives Vulkan and the dummy backend. Destruction never fails.
pub trait GpuBackend {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    // === Synchronization ===

    /// Create a fence, optionally in the signaled state.
    fn create_fence(&self, signaled: bool) -> Result<FenceHandle, GraphicsError>;

    /// Destroy a fence.
    fn destroy_fence(&self, fence: FenceHandle);

    /// Block until the fence is signaled or `timeout` elapses.
    fn wait_fence(&self, fence: FenceHandle, timeout: Duration) -> Result<(), GraphicsError>;

    /// Return a fence to the unsignaled state.
    fn reset_fence(&self, fence: FenceHandle) -> Result<(), GraphicsError>;

    /// Create a binary semaphore.
    fn create_semaphore(&self) -> Result<SemaphoreHandle, GraphicsError>;

    /// Destroy a semaphore.
    fn destroy_semaphore(&self, semaphore: SemaphoreHandle);

    // === Command recording ===

    /// Create a command pool whose buffers can be reset individually.
    fn create_command_pool(&self) -> Result<CommandPoolHandle, GraphicsError>;

    /// Destroy a command pool and every buffer allocated from it.
    fn destroy_command_pool(&self, pool: CommandPoolHandle);

    /// Allocate one primary command buffer.
    fn allocate_command_buffer(
        &self,
        pool: CommandPoolHandle,
    ) -> Result<CommandBufferHandle, GraphicsError>;

    /// Reset a command buffer to the initial state.
    fn reset_command_buffer(&self, command_buffer: CommandBufferHandle)
    -> Result<(), GraphicsError>;

    /// Begin recording a one-time-submit command buffer.
    fn begin_command_buffer(&self, command_buffer: CommandBufferHandle)
    -> Result<(), GraphicsError>;

    /// Finish recording.
    fn end_command_buffer(&self, command_buffer: CommandBufferHandle) -> Result<(), GraphicsError>;

    // === Descriptors ===

    /// Create a descriptor set layout from its bindings.
    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> Result<DescriptorSetLayoutHandle, GraphicsError>;

    /// Destroy a descriptor set layout.
    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle);

    /// Create a descriptor pool holding at most `max_sets` sets and the given
    /// number of descriptors per type.
    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        sizes: &[DescriptorPoolSize],
    ) -> Result<DescriptorPoolHandle, GraphicsError>;

    /// Free every set allocated from the pool.
    fn reset_descriptor_pool(&self, pool: DescriptorPoolHandle) -> Result<(), GraphicsError>;

    /// Destroy a descriptor pool.
    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle);

    /// Allocate one set from the pool.
    ///
    /// Returns [`GraphicsError::DescriptorPoolExhausted`] when the pool is out
    /// of sets or descriptors (including fragmentation).
    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<DescriptorSetHandle, GraphicsError>;

    /// Point bindings of a set at resources.
    fn update_descriptor_set(&self, set: DescriptorSetHandle, writes: &[DescriptorWrite]);

    // === Resources ===

    /// Create a buffer.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferHandle, GraphicsError>;

    /// Write data into a host-visible buffer.
    fn write_buffer(
        &self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError>;

    /// Device address of a buffer created with `DEVICE_ADDRESS` usage.
    fn buffer_device_address(&self, buffer: BufferHandle) -> u64;

    /// Destroy a buffer and free its memory.
    fn destroy_buffer(&self, buffer: BufferHandle);

    /// Create a device-local image.
    fn create_image(&self, descriptor: &ImageDescriptor) -> Result<ImageHandle, GraphicsError>;

    /// Destroy an image and free its memory.
    fn destroy_image(&self, image: ImageHandle);

    /// Create a view of a whole image created with
    /// [`create_image`](Self::create_image). The aspect follows the image's
    /// format.
    fn create_image_view(&self, image: ImageHandle) -> Result<ImageViewHandle, GraphicsError>;

    /// Destroy an image view.
    fn destroy_image_view(&self, view: ImageViewHandle);

    /// Destroy a sampler.
    fn destroy_sampler(&self, sampler: SamplerHandle);

    /// Destroy a pipeline.
    fn destroy_pipeline(&self, pipeline: PipelineHandle);

    /// Destroy a pipeline layout.
    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle);

    // === Submission and presentation ===

    /// Acquire the next presentable image, signaling `signal` when it is
    /// ready to be written.
    fn acquire_next_image(
        &self,
        signal: SemaphoreHandle,
        timeout: Duration,
    ) -> Result<u32, GraphicsError>;

    /// Submit one command buffer to the graphics queue.
    fn submit(&self, info: &SubmitInfo) -> Result<(), GraphicsError>;

    /// Queue an acquired image for presentation once `wait` is signaled.
    fn present(&self, image_index: u32, wait: SemaphoreHandle) -> Result<(), GraphicsError>;

    /// Block until the device has finished all submitted work.
    fn wait_idle(&self) -> Result<(), GraphicsError>;

    // === Commands ===

    /// Transition a swapchain image between layouts.
    fn cmd_transition_image(
        &self,
        command_buffer: CommandBufferHandle,
        image_index: u32,
        from: ImageLayout,
        to: ImageLayout,
    );

    /// Transition an image created with [`create_image`](Self::create_image)
    /// between layouts.
    fn cmd_transition_attachment(
        &self,
        command_buffer: CommandBufferHandle,
        image: ImageHandle,
        from: ImageLayout,
        to: ImageLayout,
    );

    /// Begin dynamic rendering into a swapchain image and the optional depth
    /// attachment, setting viewport and scissor to the render area.
    fn cmd_begin_rendering(&self, command_buffer: CommandBufferHandle, info: &RenderingInfo);

    /// End dynamic rendering.
    fn cmd_end_rendering(&self, command_buffer: CommandBufferHandle);

    /// Bind a graphics pipeline.
    fn cmd_bind_pipeline(&self, command_buffer: CommandBufferHandle, pipeline: PipelineHandle);

    /// Bind descriptor sets starting at `first_set`.
    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        first_set: u32,
        sets: &[DescriptorSetHandle],
    );

    /// Bind a 32-bit index buffer.
    fn cmd_bind_index_buffer(
        &self,
        command_buffer: CommandBufferHandle,
        buffer: BufferHandle,
        offset: u64,
    );

    /// Update push constants.
    fn cmd_push_constants(
        &self,
        command_buffer: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    );

    /// Issue an indexed draw of one instance.
    fn cmd_draw_indexed(
        &self,
        command_buffer: CommandBufferHandle,
        index_count: u32,
        first_index: u32,
    );

    /// Copy a region between buffers.
    fn cmd_copy_buffer(
        &self,
        command_buffer: CommandBufferHandle,
        src: BufferHandle,
        dst: BufferHandle,
        region: &BufferCopy,
    );
}

/// Check if a real GPU backend is compiled in.
pub fn has_gpu_backend() -> bool {
    cfg!(feature = "vulkan-backend")
}
