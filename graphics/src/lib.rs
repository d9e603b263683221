//! # Moon Graphics
//!
//! Frame core of the Moon renderer: the machinery that keeps several frames
//! in flight on a GPU without ever touching a resource the GPU may still be
//! reading.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`RenderContext`] - Owns every component, with explicit init and teardown
//! - [`FramePacer`] - Ring of frame slots driven through the frame protocol
//! - [`DescriptorAllocator`] - Growable descriptor pools that absorb exhaustion
//! - [`DeletionQueue`] - Deferred, reverse-order resource destruction
//! - [`ImmediateExecutor`] - Blocking one-shot submissions for uploads
//! - [`DrawBatcher`] - Draw list recording with minimal state changes
//! - [`GpuBackend`] - The single seam to the native API, with a Vulkan
//!   implementation and a fake [`DummyBackend`] for tests
//!
//! ## Example
//!
//! ```ignore
//! use moon_graphics::{DrawList, RenderConfig, RenderContext, SceneGraph};
//!
//! let mut context = RenderContext::init(backend, RenderConfig::default())?;
//! let mut list = DrawList::new();
//! loop {
//!     scene.refresh_transforms(Mat4::IDENTITY);
//!     context.update_scene(&scene, view, &mut list);
//!     context.draw(&list)?;
//! }
//! context.teardown()?;
//! ```

pub mod backend;
pub mod config;
pub mod context;
pub mod deferred;
pub mod descriptors;
pub mod draw;
pub mod error;
pub mod frame;
pub mod immediate;
pub mod materials;
pub mod mesh;
pub mod profiling;
pub mod scene;
pub mod types;

// Re-export main types for convenience
pub use backend::{DummyBackend, GpuBackend};
pub use config::{PoolSizeRatio, RenderConfig};
pub use context::{RenderContext, RenderStats};
pub use deferred::{DeferredResource, DeletionQueue};
pub use descriptors::{DescriptorAllocator, DescriptorLayoutBuilder, DescriptorWriter};
pub use draw::{Bounds, DrawBatcher, DrawItem, DrawList, DrawStats};
pub use error::GraphicsError;
pub use frame::{FramePacer, FrameSlot, FrameToken, SlotState};
pub use immediate::ImmediateExecutor;
pub use materials::{MaterialId, MaterialInstance, MaterialPass, MaterialPipeline};
pub use mesh::{GeoSurface, GpuDrawPushConstants, GpuMeshBuffers, MeshAsset, Vertex, upload_mesh};
pub use scene::{GpuSceneData, NodeId, NodeKind, SceneGraph};

#[cfg(feature = "vulkan-backend")]
pub use backend::vulkan::{VulkanBackend, VulkanBackendDesc};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_backend() {
        let backend = DummyBackend::new();
        assert_eq!(backend.name(), "Dummy");
    }
}
