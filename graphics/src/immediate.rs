//! Synchronous one-shot command submission.
//!
//! Used at load time for uploads and other work that must finish before the
//! caller continues. Submitting blocks the calling thread on a dedicated
//! fence, so this is never used from the frame loop.

use std::time::Duration;

use crate::backend::GpuBackend;
use crate::error::GraphicsError;
use crate::profile_scope;
use crate::types::{CommandBufferHandle, CommandPoolHandle, FenceHandle, SubmitInfo};

/// Records and submits one command buffer, then waits for it.
#[derive(Debug)]
pub struct ImmediateExecutor {
    fence: FenceHandle,
    command_pool: CommandPoolHandle,
    command_buffer: CommandBufferHandle,
    timeout: Duration,
}

impl ImmediateExecutor {
    /// Create the executor's fence, command pool and command buffer.
    pub fn new(backend: &dyn GpuBackend, timeout: Duration) -> Result<Self, GraphicsError> {
        let fence = backend.create_fence(true)?;
        let command_pool = match backend.create_command_pool() {
            Ok(pool) => pool,
            Err(err) => {
                backend.destroy_fence(fence);
                return Err(err);
            }
        };
        let command_buffer = match backend.allocate_command_buffer(command_pool) {
            Ok(command_buffer) => command_buffer,
            Err(err) => {
                backend.destroy_command_pool(command_pool);
                backend.destroy_fence(fence);
                return Err(err);
            }
        };
        Ok(Self {
            fence,
            command_pool,
            command_buffer,
            timeout,
        })
    }

    /// Record commands with `record`, submit them and block until they finish.
    ///
    /// Taking `&mut self` keeps a second submission from starting while one
    /// is in progress.
    pub fn submit<F>(&mut self, backend: &dyn GpuBackend, record: F) -> Result<(), GraphicsError>
    where
        F: FnOnce(&dyn GpuBackend, CommandBufferHandle) -> Result<(), GraphicsError>,
    {
        profile_scope!("immediate_submit");

        backend.reset_fence(self.fence)?;
        backend.reset_command_buffer(self.command_buffer)?;
        backend.begin_command_buffer(self.command_buffer)?;

        record(backend, self.command_buffer)?;

        backend.end_command_buffer(self.command_buffer)?;
        backend.submit(&SubmitInfo::new(self.command_buffer).fence(self.fence))?;
        backend
            .wait_fence(self.fence, self.timeout)
            .map_err(|err| match err {
                GraphicsError::Timeout { timeout, .. } => GraphicsError::Timeout {
                    what: "immediate submission",
                    timeout,
                },
                other => other,
            })
    }

    /// Destroy the executor's objects. The device must be idle.
    pub fn destroy(&mut self, backend: &dyn GpuBackend) {
        backend.destroy_command_pool(self.command_pool);
        backend.destroy_fence(self.fence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::backend::dummy::Call;

    #[test]
    fn test_submit_waits_for_completion() {
        let backend = DummyBackend::new();
        let mut executor = ImmediateExecutor::new(&backend, Duration::from_secs(10)).unwrap();

        let mut recorded = None;
        executor
            .submit(&backend, |_, cmd| {
                recorded = Some(cmd);
                Ok(())
            })
            .unwrap();

        assert_eq!(recorded, Some(executor.command_buffer));
        assert!(backend.is_fence_signaled(executor.fence));
        assert!(backend.calls().contains(&Call::WaitFence(executor.fence)));
        assert!(backend.violations().is_empty());
    }

    #[test]
    fn test_failed_creation_destroys_fence() {
        let backend = DummyBackend::new();
        backend.set_creation_limit(Some(1));
        assert!(ImmediateExecutor::new(&backend, Duration::from_secs(1)).is_err());
        assert_eq!(backend.live_objects(), 0);
        assert!(backend.violations().is_empty());
    }

    #[test]
    fn test_repeated_submissions() {
        let backend = DummyBackend::new();
        let mut executor = ImmediateExecutor::new(&backend, Duration::from_secs(10)).unwrap();
        for _ in 0..3 {
            executor.submit(&backend, |_, _| Ok(())).unwrap();
        }
        assert!(backend.violations().is_empty());
    }

    #[test]
    fn test_stalled_submission_times_out() {
        let backend = DummyBackend::new();
        let mut executor = ImmediateExecutor::new(&backend, Duration::from_millis(5)).unwrap();
        backend.set_stalled(true);

        let err = executor.submit(&backend, |_, _| Ok(())).unwrap_err();
        assert_eq!(
            err,
            GraphicsError::Timeout {
                what: "immediate submission",
                timeout: Duration::from_millis(5),
            }
        );
    }

    #[test]
    fn test_recording_error_propagates() {
        let backend = DummyBackend::new();
        let mut executor = ImmediateExecutor::new(&backend, Duration::from_secs(10)).unwrap();
        let err = executor
            .submit(&backend, |_, _| {
                Err(GraphicsError::Internal("record failed".to_string()))
            })
            .unwrap_err();
        assert_eq!(err, GraphicsError::Internal("record failed".to_string()));
    }
}
