//! Graphics error types.
//!
//! Every GPU call in this crate returns a [`GraphicsError`] on failure and the
//! error is propagated with `?` to the owner of the frame loop. Apart from
//! [`GraphicsError::DescriptorPoolExhausted`], which the descriptor allocator
//! absorbs with a single fresh-pool retry, every variant means the GPU context
//! can no longer render and the caller is expected to log it and abort.

use std::time::Duration;

/// Errors that can occur in the frame core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphicsError {
    /// Failed to initialize the graphics system.
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
    /// Failed to create a resource (pool, fence, semaphore, buffer, ...).
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// A descriptor pool ran out of sets or descriptors.
    ///
    /// Recovered inside [`DescriptorAllocator`](crate::descriptors::DescriptorAllocator);
    /// never returned from its public API.
    #[error("descriptor pool exhausted")]
    DescriptorPoolExhausted,
    /// A descriptor set could not be allocated even from a fresh pool.
    #[error("descriptor set allocation failed after retry: {0}")]
    DescriptorAllocationFailed(String),
    /// A bounded wait on the GPU was not satisfied in time.
    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout {
        /// What was being waited on.
        what: &'static str,
        /// The bound that elapsed.
        timeout: Duration,
    },
    /// The GPU device was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// The surface is outdated and needs to be reconfigured.
    #[error("surface outdated, needs reconfiguration")]
    SurfaceOutdated,
    /// The surface was lost and needs to be recreated.
    #[error("surface lost, needs recreation")]
    SurfaceLost,
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GraphicsError {
    /// Whether this error leaves the GPU context unusable.
    ///
    /// Only pool exhaustion is recoverable, and only inside the allocator.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::DescriptorPoolExhausted)
    }

    /// Whether this error was raised by a bounded wait on the GPU.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
