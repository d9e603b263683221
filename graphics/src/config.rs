//! Render context configuration.

use std::time::Duration;

use crate::types::{ClearColor, DescriptorType, Extent2d};

/// Share of a descriptor pool reserved for one descriptor type.
///
/// A pool created for `n` sets holds `ratio * n` descriptors of `ty`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolSizeRatio {
    /// Descriptor type.
    pub ty: DescriptorType,
    /// Descriptors of `ty` per set.
    pub ratio: f32,
}

impl PoolSizeRatio {
    /// Create a new ratio entry.
    pub const fn new(ty: DescriptorType, ratio: f32) -> Self {
        Self { ty, ratio }
    }
}

/// Configuration for initializing a [`RenderContext`](crate::RenderContext).
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Number of frame slots recorded ahead of the GPU.
    pub frames_in_flight: usize,
    /// Bound on the wait for a frame slot's fence.
    pub fence_timeout: Duration,
    /// Bound on swapchain image acquisition.
    pub acquire_timeout: Duration,
    /// Bound on the wait after an immediate submission.
    pub immediate_timeout: Duration,
    /// Set hint for the allocator that lives as long as the context.
    pub global_descriptor_sets: u32,
    /// Pool proportions for the global allocator.
    pub global_pool_ratios: Vec<PoolSizeRatio>,
    /// Set hint for each frame slot's allocator.
    pub frame_descriptor_sets: u32,
    /// Pool proportions for each frame slot's allocator.
    pub frame_pool_ratios: Vec<PoolSizeRatio>,
    /// Color the swapchain image is cleared to.
    pub clear_color: ClearColor,
    /// Render area.
    pub extent: Extent2d,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            fence_timeout: Duration::from_secs(1),
            acquire_timeout: Duration::from_secs(1),
            immediate_timeout: Duration::from_secs(10),
            global_descriptor_sets: 10,
            global_pool_ratios: vec![PoolSizeRatio::new(DescriptorType::StorageImage, 1.0)],
            frame_descriptor_sets: 1000,
            frame_pool_ratios: vec![
                PoolSizeRatio::new(DescriptorType::StorageImage, 3.0),
                PoolSizeRatio::new(DescriptorType::StorageBuffer, 3.0),
                PoolSizeRatio::new(DescriptorType::UniformBuffer, 3.0),
                PoolSizeRatio::new(DescriptorType::CombinedImageSampler, 4.0),
            ],
            clear_color: [0.0, 0.0, 0.0, 1.0],
            extent: Extent2d::new(1700, 900),
        }
    }
}

impl RenderConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of frames in flight.
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Set the frame fence timeout.
    pub fn with_fence_timeout(mut self, timeout: Duration) -> Self {
        self.fence_timeout = timeout;
        self
    }

    /// Set the swapchain acquire timeout.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the immediate submission timeout.
    pub fn with_immediate_timeout(mut self, timeout: Duration) -> Self {
        self.immediate_timeout = timeout;
        self
    }

    /// Set the global allocator's size hint and proportions.
    pub fn with_global_descriptors(mut self, sets: u32, ratios: Vec<PoolSizeRatio>) -> Self {
        self.global_descriptor_sets = sets;
        self.global_pool_ratios = ratios;
        self
    }

    /// Set the per-frame allocator's size hint and proportions.
    pub fn with_frame_descriptors(mut self, sets: u32, ratios: Vec<PoolSizeRatio>) -> Self {
        self.frame_descriptor_sets = sets;
        self.frame_pool_ratios = ratios;
        self
    }

    /// Set the clear color.
    pub fn with_clear_color(mut self, color: ClearColor) -> Self {
        self.clear_color = color;
        self
    }

    /// Set the render area.
    pub fn with_extent(mut self, extent: Extent2d) -> Self {
        self.extent = extent;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RenderConfig::default();
        assert_eq!(config.frames_in_flight, 2);
        assert_eq!(config.fence_timeout, Duration::from_secs(1));
        assert_eq!(config.frame_descriptor_sets, 1000);
        assert_eq!(config.frame_pool_ratios.len(), 4);
        assert_eq!(config.global_descriptor_sets, 10);
    }

    #[test]
    fn test_builder() {
        let config = RenderConfig::new()
            .with_frames_in_flight(3)
            .with_fence_timeout(Duration::from_millis(16))
            .with_extent(Extent2d::new(640, 480));
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.fence_timeout, Duration::from_millis(16));
        assert_eq!(config.extent, Extent2d::new(640, 480));
    }
}
