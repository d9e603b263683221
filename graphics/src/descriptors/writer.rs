//! Batched descriptor set writes.

use crate::backend::GpuBackend;
use crate::types::{
    BufferHandle, DescriptorResource, DescriptorSetHandle, DescriptorType, DescriptorWrite,
    ImageLayout, ImageViewHandle, SamplerHandle,
};

/// Collects descriptor writes and applies them to a set in one update.
#[derive(Debug, Clone, Default)]
pub struct DescriptorWriter {
    writes: Vec<DescriptorWrite>,
}

impl DescriptorWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a buffer range for `binding`.
    pub fn write_buffer(
        &mut self,
        binding: u32,
        buffer: BufferHandle,
        size: u64,
        offset: u64,
        ty: DescriptorType,
    ) -> &mut Self {
        self.writes.push(DescriptorWrite {
            binding,
            ty,
            resource: DescriptorResource::Buffer {
                buffer,
                offset,
                size,
            },
        });
        self
    }

    /// Queue an image view and sampler for `binding`.
    pub fn write_image(
        &mut self,
        binding: u32,
        view: ImageViewHandle,
        sampler: SamplerHandle,
        layout: ImageLayout,
        ty: DescriptorType,
    ) -> &mut Self {
        self.writes.push(DescriptorWrite {
            binding,
            ty,
            resource: DescriptorResource::Image {
                view,
                sampler,
                layout,
            },
        });
        self
    }

    /// Drop all queued writes.
    pub fn clear(&mut self) {
        self.writes.clear();
    }

    /// Queued writes.
    pub fn writes(&self) -> &[DescriptorWrite] {
        &self.writes
    }

    /// Apply the queued writes to `set`. The queue is kept.
    pub fn update_set(&self, backend: &dyn GpuBackend, set: DescriptorSetHandle) {
        backend.update_descriptor_set(set, &self.writes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::backend::dummy::Call;

    #[test]
    fn test_update_applies_all_writes() {
        let backend = DummyBackend::new();
        let set = DescriptorSetHandle::from_raw(99);
        let mut writer = DescriptorWriter::new();
        writer
            .write_buffer(
                0,
                BufferHandle::from_raw(1),
                256,
                0,
                DescriptorType::UniformBuffer,
            )
            .write_image(
                1,
                ImageViewHandle::from_raw(2),
                SamplerHandle::from_raw(3),
                ImageLayout::ShaderReadOnly,
                DescriptorType::CombinedImageSampler,
            );
        writer.update_set(&backend, set);

        assert!(
            backend
                .calls()
                .contains(&Call::UpdateDescriptorSet { set, writes: 2 })
        );

        writer.clear();
        assert!(writer.writes().is_empty());
    }
}
