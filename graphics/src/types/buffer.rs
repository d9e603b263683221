//! Buffer types and descriptors.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 0;
        /// Buffer can be used as a uniform buffer.
        const UNIFORM = 1 << 1;
        /// Buffer can be used as a storage buffer.
        const STORAGE = 1 << 2;
        /// Buffer can be copied from.
        const COPY_SRC = 1 << 3;
        /// Buffer can be copied to.
        const COPY_DST = 1 << 4;
        /// Buffer address can be queried and read from shaders.
        const DEVICE_ADDRESS = 1 << 5;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Where a buffer's memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryLocation {
    /// Device-local, not CPU visible.
    #[default]
    GpuOnly,
    /// Host-visible, written by the CPU and read by the GPU.
    CpuToGpu,
    /// Host-visible, written by the GPU and read back by the CPU.
    GpuToCpu,
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
    /// Memory placement.
    pub location: MemoryLocation,
}

impl BufferDescriptor {
    /// Create a new device-local buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
            location: MemoryLocation::GpuOnly,
        }
    }

    /// Host-visible uniform buffer, rewritten by the CPU every frame.
    pub fn uniform(size: u64) -> Self {
        Self::new(size, BufferUsage::UNIFORM).with_location(MemoryLocation::CpuToGpu)
    }

    /// Host-visible source buffer for uploads.
    pub fn staging(size: u64) -> Self {
        Self::new(size, BufferUsage::COPY_SRC).with_location(MemoryLocation::CpuToGpu)
    }

    /// Set the memory placement.
    pub fn with_location(mut self, location: MemoryLocation) -> Self {
        self.location = location;
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Region of a buffer-to-buffer copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferCopy {
    /// Offset into the source buffer.
    pub src_offset: u64,
    /// Offset into the destination buffer.
    pub dst_offset: u64,
    /// Bytes to copy.
    pub size: u64,
}
