//! Frame pacing across multiple frames in flight.
//!
//! [`FramePacer`] owns a fixed ring of [`FrameSlot`]s and drives one frame at
//! a time through them. With 2 frames in flight the CPU records frame N+1
//! while the GPU executes frame N:
//!
//! ```text
//! Slot 0: [Frame 0] ──► [Frame 2] ──► [Frame 4] ──►
//! Slot 1: [Frame 1] ──► [Frame 3] ──► [Frame 5] ──►
//! ```
//!
//! # Frame protocol
//!
//! ```text
//! begin_frame:
//!   wait slot fence (bounded) ──► reset fence ──► flush slot deletion queue
//!   ──► reset slot descriptor pools ──► acquire image (signals swapchain
//!   semaphore) ──► reset + begin command buffer
//!
//! (caller records the frame)
//!
//! end_frame:
//!   end command buffer ──► submit (waits swapchain semaphore, signals render
//!   semaphore + fence) ──► present (waits render semaphore) ──► next slot
//! ```
//!
//! Nothing a slot owns is mutated before its fence has been observed
//! signaled. The pacer is not thread-safe and is owned by the render loop.

mod slot;

pub use slot::{FrameSlot, SlotState};

use std::time::Duration;

use crate::backend::GpuBackend;
use crate::config::RenderConfig;
use crate::error::GraphicsError;
use crate::profile_scope;
use crate::types::{CommandBufferHandle, SubmitInfo};

/// Proof that a frame is being recorded, returned by
/// [`FramePacer::begin_frame`] and consumed by [`FramePacer::end_frame`].
#[must_use = "a begun frame must be ended with FramePacer::end_frame"]
#[derive(Debug)]
pub struct FrameToken {
    slot: usize,
    image_index: u32,
    command_buffer: CommandBufferHandle,
    frame_number: u64,
}

impl FrameToken {
    /// Index of the slot being recorded.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Acquired swapchain image.
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// Command buffer to record the frame into.
    pub fn command_buffer(&self) -> CommandBufferHandle {
        self.command_buffer
    }

    /// Frame number, starting at 1.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }
}

/// Drives frames through a fixed ring of frame slots.
#[derive(Debug)]
pub struct FramePacer {
    slots: Vec<FrameSlot>,
    current: usize,
    frame_count: u64,
    fence_timeout: Duration,
    acquire_timeout: Duration,
}

impl FramePacer {
    /// Create `config.frames_in_flight` slots.
    ///
    /// Zero frames in flight is rejected with
    /// [`GraphicsError::InitializationFailed`].
    pub fn new(backend: &dyn GpuBackend, config: &RenderConfig) -> Result<Self, GraphicsError> {
        if config.frames_in_flight == 0 {
            return Err(GraphicsError::InitializationFailed(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }

        let mut slots: Vec<FrameSlot> = Vec::with_capacity(config.frames_in_flight);
        for index in 0..config.frames_in_flight {
            match FrameSlot::new(backend, index, config) {
                Ok(slot) => slots.push(slot),
                Err(err) => {
                    for slot in slots.iter_mut().rev() {
                        slot.destroy(backend);
                    }
                    return Err(err);
                }
            }
        }

        log::debug!("Created frame pacer with {} slots", slots.len());

        Ok(Self {
            slots,
            current: 0,
            frame_count: 0,
            fence_timeout: config.fence_timeout,
            acquire_timeout: config.acquire_timeout,
        })
    }

    /// Begin the next frame in the current slot.
    ///
    /// Blocks until the slot's previous submission completes, at most for the
    /// configured fence timeout. A timeout is fatal.
    pub fn begin_frame(&mut self, backend: &dyn GpuBackend) -> Result<FrameToken, GraphicsError> {
        profile_scope!("begin_frame");

        let fence_timeout = self.fence_timeout;
        let acquire_timeout = self.acquire_timeout;
        let slot = self.slots.get_mut(self.current).ok_or_else(|| {
            GraphicsError::Internal("frame pacer has been destroyed".to_string())
        })?;
        if slot.state() == SlotState::Recording {
            return Err(GraphicsError::Internal(format!(
                "frame slot {} is already recording",
                slot.index()
            )));
        }

        backend
            .wait_fence(slot.render_fence(), fence_timeout)
            .map_err(|err| match err {
                GraphicsError::Timeout { timeout, .. } => GraphicsError::Timeout {
                    what: "frame fence",
                    timeout,
                },
                other => other,
            })
            .inspect_err(|err| log::error!("Frame slot {} wait failed: {}", slot.index(), err))?;
        slot.set_state(SlotState::Idle);

        backend.reset_fence(slot.render_fence())?;
        slot.recycle(backend)?;

        let image_index = backend
            .acquire_next_image(slot.swapchain_semaphore(), acquire_timeout)
            .map_err(|err| match err {
                GraphicsError::Timeout { timeout, .. } => GraphicsError::Timeout {
                    what: "swapchain image",
                    timeout,
                },
                other => other,
            })?;

        let command_buffer = slot.command_buffer();
        backend.reset_command_buffer(command_buffer)?;
        backend.begin_command_buffer(command_buffer)?;
        slot.set_state(SlotState::Recording);

        self.frame_count += 1;
        log::trace!(
            "Begin frame {} (slot {}, image {})",
            self.frame_count,
            self.current,
            image_index
        );

        Ok(FrameToken {
            slot: self.current,
            image_index,
            command_buffer,
            frame_number: self.frame_count,
        })
    }

    /// Submit and present the frame, then advance to the next slot.
    pub fn end_frame(
        &mut self,
        backend: &dyn GpuBackend,
        token: FrameToken,
    ) -> Result<(), GraphicsError> {
        profile_scope!("end_frame");

        if token.slot != self.current {
            return Err(GraphicsError::Internal(format!(
                "frame token for slot {} ended while slot {} is current",
                token.slot, self.current
            )));
        }
        let slot = self.slots.get_mut(self.current).ok_or_else(|| {
            GraphicsError::Internal("frame pacer has been destroyed".to_string())
        })?;
        if slot.state() != SlotState::Recording {
            return Err(GraphicsError::Internal(format!(
                "frame slot {} ended without being begun",
                slot.index()
            )));
        }

        backend.end_command_buffer(token.command_buffer)?;
        backend.submit(
            &SubmitInfo::new(token.command_buffer)
                .wait(slot.swapchain_semaphore())
                .signal(slot.render_semaphore())
                .fence(slot.render_fence()),
        )?;
        slot.set_state(SlotState::Submitted);
        let render_semaphore = slot.render_semaphore();

        log::trace!("End frame {} (slot {})", token.frame_number, self.current);
        self.current = (self.current + 1) % self.slots.len();

        backend.present(token.image_index, render_semaphore)
    }

    /// Wait until every submitted slot's fence has signaled.
    pub fn wait_idle(&mut self, backend: &dyn GpuBackend) -> Result<(), GraphicsError> {
        for slot in &mut self.slots {
            if slot.state() == SlotState::Submitted {
                log::trace!("Waiting for slot {}...", slot.index());
                backend.wait_fence(slot.render_fence(), self.fence_timeout)?;
                slot.set_state(SlotState::Idle);
            }
        }
        Ok(())
    }

    /// Destroy every slot, last created first. The device must be idle.
    pub fn destroy(&mut self, backend: &dyn GpuBackend) {
        for slot in self.slots.iter_mut().rev() {
            slot.destroy(backend);
        }
        log::debug!("Destroyed {} frame slots", self.slots.len());
        self.slots.clear();
        self.current = 0;
    }

    /// The slot the next (or in-progress) frame uses.
    pub fn current_slot(&self) -> Option<&FrameSlot> {
        self.slots.get(self.current)
    }

    /// Mutable access to the current slot, for per-frame allocations.
    pub fn current_slot_mut(&mut self) -> Option<&mut FrameSlot> {
        self.slots.get_mut(self.current)
    }

    /// All slots, by index.
    pub fn slots(&self) -> &[FrameSlot] {
        &self.slots
    }

    /// Index of the current slot.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Number of slots.
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Total frames begun.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}
