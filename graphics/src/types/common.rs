//! Common types shared across the frame core.

use super::{CommandBufferHandle, FenceHandle, ImageViewHandle, SemaphoreHandle};

/// Size of a 2D render area in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2d {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Extent2d {
    /// Create a new extent.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// RGBA clear color.
pub type ClearColor = [f32; 4];

/// Layout of an image, as seen by the commands that touch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    /// Contents are undefined and may be discarded.
    Undefined,
    /// General layout, usable by storage image access.
    General,
    /// Written as a color attachment.
    ColorAttachment,
    /// Read and written as a depth attachment.
    DepthAttachment,
    /// Read by shaders through a sampler.
    ShaderReadOnly,
    /// Ready for the presentation engine.
    PresentSrc,
}

/// Dynamic rendering into the acquired swapchain image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderingInfo {
    /// Swapchain image index returned by acquisition.
    pub image_index: u32,
    /// Render area; also used for the viewport and scissor.
    pub extent: Extent2d,
    /// Color the attachment is cleared to.
    pub clear_color: ClearColor,
    /// Depth attachment, cleared to 0 (the far plane of a reversed-depth
    /// projection).
    pub depth_view: Option<ImageViewHandle>,
}

/// One queue submission.
///
/// The submission waits on `wait_semaphore` (if any) before color output,
/// and signals `signal_semaphore` and `fence` (if any) once it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitInfo {
    /// Recorded commands to execute.
    pub command_buffer: CommandBufferHandle,
    /// Semaphore the GPU waits on before writing color output.
    pub wait_semaphore: Option<SemaphoreHandle>,
    /// Semaphore signaled when the commands finish.
    pub signal_semaphore: Option<SemaphoreHandle>,
    /// Fence signaled when the commands finish.
    pub fence: Option<FenceHandle>,
}

impl SubmitInfo {
    /// Submission with no semaphores and no fence.
    pub fn new(command_buffer: CommandBufferHandle) -> Self {
        Self {
            command_buffer,
            wait_semaphore: None,
            signal_semaphore: None,
            fence: None,
        }
    }

    /// Wait on a semaphore before color output.
    pub fn wait(mut self, semaphore: SemaphoreHandle) -> Self {
        self.wait_semaphore = Some(semaphore);
        self
    }

    /// Signal a semaphore on completion.
    pub fn signal(mut self, semaphore: SemaphoreHandle) -> Self {
        self.signal_semaphore = Some(semaphore);
        self
    }

    /// Signal a fence on completion.
    pub fn fence(mut self, fence: FenceHandle) -> Self {
        self.fence = Some(fence);
        self
    }
}
