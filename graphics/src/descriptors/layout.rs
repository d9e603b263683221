//! Descriptor set layout construction.

use crate::backend::GpuBackend;
use crate::error::GraphicsError;
use crate::types::{DescriptorBinding, DescriptorSetLayoutHandle, DescriptorType, ShaderStages};

/// Accumulates bindings and creates a descriptor set layout from them.
#[derive(Debug, Clone, Default)]
pub struct DescriptorLayoutBuilder {
    bindings: Vec<DescriptorBinding>,
}

impl DescriptorLayoutBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single-descriptor binding. Stages are assigned at build time.
    pub fn add_binding(&mut self, binding: u32, ty: DescriptorType) -> &mut Self {
        self.bindings.push(DescriptorBinding {
            binding,
            ty,
            count: 1,
            stages: ShaderStages::empty(),
        });
        self
    }

    /// Remove all bindings.
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    /// Bindings added so far.
    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.bindings
    }

    /// Create the layout, making every binding visible to `stages`.
    pub fn build(
        &self,
        backend: &dyn GpuBackend,
        stages: ShaderStages,
    ) -> Result<DescriptorSetLayoutHandle, GraphicsError> {
        let bindings: Vec<DescriptorBinding> = self
            .bindings
            .iter()
            .map(|binding| DescriptorBinding {
                stages: binding.stages | stages,
                ..*binding
            })
            .collect();
        backend.create_descriptor_set_layout(&bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_accumulates_and_clears() {
        let mut builder = DescriptorLayoutBuilder::new();
        builder
            .add_binding(0, DescriptorType::UniformBuffer)
            .add_binding(1, DescriptorType::CombinedImageSampler);
        assert_eq!(builder.bindings().len(), 2);
        assert_eq!(builder.bindings()[1].binding, 1);

        builder.clear();
        assert!(builder.bindings().is_empty());
    }
}
