//! Typed GPU object handles.
//!
//! Every handle is an opaque 64-bit value owned by the backend that created
//! it. Vulkan stores the raw `vk::*` handle; the dummy backend hands out
//! sequential ids. Zero is reserved for the null handle.

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(u64);

        impl $name {
            /// The null handle.
            pub const NULL: Self = Self(0);

            /// Wrap a raw backend handle.
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// The raw backend handle.
            pub const fn as_raw(self) -> u64 {
                self.0
            }

            /// Whether this is the null handle.
            pub const fn is_null(self) -> bool {
                self.0 == 0
            }
        }
    };
}

gpu_handle!(
    /// CPU-observable completion primitive.
    FenceHandle
);
gpu_handle!(
    /// GPU-side ordering primitive.
    SemaphoreHandle
);
gpu_handle!(
    /// Pool that command buffers are allocated from.
    CommandPoolHandle
);
gpu_handle!(
    /// Command recorder.
    CommandBufferHandle
);
gpu_handle!(
    /// Fixed-capacity arena of descriptor sets.
    DescriptorPoolHandle
);
gpu_handle!(
    /// Resource-binding set carved from a descriptor pool.
    DescriptorSetHandle
);
gpu_handle!(
    /// Shape of a descriptor set.
    DescriptorSetLayoutHandle
);
gpu_handle!(BufferHandle);
gpu_handle!(ImageHandle);
gpu_handle!(ImageViewHandle);
gpu_handle!(SamplerHandle);
gpu_handle!(PipelineHandle);
gpu_handle!(PipelineLayoutHandle);
