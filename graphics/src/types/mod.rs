//! Common types and descriptors for GPU objects.
//!
//! This module contains the typed handles that cross the [`GpuBackend`]
//! seam, together with the usage flags, layouts and small descriptor structs
//! the frame core passes to the backend.
//!
//! [`GpuBackend`]: crate::backend::GpuBackend

mod buffer;
mod common;
mod descriptor;
mod handle;
mod image;

pub use buffer::{BufferCopy, BufferDescriptor, BufferUsage, MemoryLocation};
pub use common::{ClearColor, Extent2d, ImageLayout, RenderingInfo, SubmitInfo};
pub use descriptor::{
    DescriptorBinding, DescriptorPoolSize, DescriptorResource, DescriptorType, DescriptorWrite,
    ShaderStages,
};
pub use handle::{
    BufferHandle, CommandBufferHandle, CommandPoolHandle, DescriptorPoolHandle,
    DescriptorSetHandle, DescriptorSetLayoutHandle, FenceHandle, ImageHandle, ImageViewHandle,
    PipelineHandle, PipelineLayoutHandle, SamplerHandle, SemaphoreHandle,
};
pub use image::{ImageDescriptor, ImageFormat, ImageUsage};
