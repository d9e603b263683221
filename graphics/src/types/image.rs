//! Image types and descriptors.

use bitflags::bitflags;

use super::Extent2d;

/// Image format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageFormat {
    /// 16-bit RGBA channels, float.
    #[default]
    Rgba16Float,
    /// 8-bit RGBA channels, unsigned normalized.
    Rgba8Unorm,
    /// 32-bit depth, float.
    Depth32Float,
}

impl ImageFormat {
    /// Returns true if this is a depth format.
    pub fn is_depth(&self) -> bool {
        matches!(self, Self::Depth32Float)
    }
}

bitflags! {
    /// Usage flags for images.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        /// Image can be copied from.
        const COPY_SRC = 1 << 0;
        /// Image can be copied to.
        const COPY_DST = 1 << 1;
        /// Image can be sampled in a shader.
        const SAMPLED = 1 << 2;
        /// Image can be used as a storage image.
        const STORAGE = 1 << 3;
        /// Image can be used as a color attachment.
        const COLOR_ATTACHMENT = 1 << 4;
        /// Image can be used as a depth attachment.
        const DEPTH_ATTACHMENT = 1 << 5;
    }
}

impl Default for ImageUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a device-local 2D image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ImageDescriptor {
    /// Debug label for the image.
    pub label: Option<String>,
    /// Size in pixels.
    pub extent: Extent2d,
    /// Pixel format.
    pub format: ImageFormat,
    /// Usage flags.
    pub usage: ImageUsage,
}

impl ImageDescriptor {
    /// Create a new 2D image descriptor.
    pub fn new(extent: Extent2d, format: ImageFormat, usage: ImageUsage) -> Self {
        Self {
            label: None,
            extent,
            format,
            usage,
        }
    }

    /// 32-bit float depth attachment covering `extent`.
    pub fn depth(extent: Extent2d) -> Self {
        Self::new(extent, ImageFormat::Depth32Float, ImageUsage::DEPTH_ATTACHMENT)
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_descriptor() {
        let desc = ImageDescriptor::depth(Extent2d::new(1700, 900)).with_label("depth");
        assert!(desc.format.is_depth());
        assert_eq!(desc.usage, ImageUsage::DEPTH_ATTACHMENT);
        assert_eq!(desc.extent, Extent2d::new(1700, 900));
        assert_eq!(desc.label.as_deref(), Some("depth"));
    }

    #[test]
    fn test_color_formats_are_not_depth() {
        assert!(!ImageFormat::Rgba16Float.is_depth());
        assert!(!ImageFormat::Rgba8Unorm.is_depth());
    }
}
