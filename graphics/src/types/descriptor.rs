//! Descriptor types, binding declarations and pool sizing.

use bitflags::bitflags;

use super::{BufferHandle, ImageLayout, ImageViewHandle, SamplerHandle};

/// Kind of resource a descriptor binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DescriptorType {
    /// Standalone sampler.
    Sampler,
    /// Image and sampler pair.
    CombinedImageSampler,
    /// Sampled image without a sampler.
    SampledImage,
    /// Read/write image.
    StorageImage,
    /// Uniform buffer.
    UniformBuffer,
    /// Read/write buffer.
    StorageBuffer,
}

bitflags! {
    /// Shader stages a binding or push-constant range is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        /// Vertex shader stage.
        const VERTEX = 1 << 0;
        /// Fragment shader stage.
        const FRAGMENT = 1 << 1;
        /// Compute shader stage.
        const COMPUTE = 1 << 2;
        /// Vertex and fragment stages.
        const VERTEX_FRAGMENT = Self::VERTEX.bits() | Self::FRAGMENT.bits();
    }
}

/// One binding slot of a descriptor set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorBinding {
    /// Binding index in the shader.
    pub binding: u32,
    /// Kind of resource bound.
    pub ty: DescriptorType,
    /// Number of descriptors in the binding (arrays).
    pub count: u32,
    /// Stages that read the binding.
    pub stages: ShaderStages,
}

/// Number of descriptors of one type a pool can hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorPoolSize {
    /// Descriptor type.
    pub ty: DescriptorType,
    /// Total descriptors of `ty` across all sets of the pool.
    pub count: u32,
}

/// Resource referenced by a descriptor write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorResource {
    /// A range of a buffer.
    Buffer {
        /// Buffer to bind.
        buffer: BufferHandle,
        /// Byte offset of the range.
        offset: u64,
        /// Byte size of the range.
        size: u64,
    },
    /// An image view, optionally paired with a sampler.
    Image {
        /// View to bind; null for pure samplers.
        view: ImageViewHandle,
        /// Sampler to bind; null for storage and sampled images.
        sampler: SamplerHandle,
        /// Layout the image is in when the shader reads it.
        layout: ImageLayout,
    },
}

/// One pending write into a descriptor set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorWrite {
    /// Binding index to write.
    pub binding: u32,
    /// Descriptor type of the binding.
    pub ty: DescriptorType,
    /// Resource to point the binding at.
    pub resource: DescriptorResource,
}
