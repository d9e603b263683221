//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. It hands out
//! sequential handles, records every call in order, and models just enough of
//! the GPU to check the frame protocol:
//!
//! - a submission stays pending until a wait on its fence (or
//!   [`wait_idle`](GpuBackend::wait_idle)) retires it
//! - descriptor pools have exact set and per-type descriptor capacities
//! - misuse (resetting an in-flight command buffer, destroying a buffer a
//!   pending submission still reads, reusing an unsignaled semaphore, ...) is
//!   logged as a violation instead of crashing
//!
//! [`DummyBackend::set_stalled`] makes pending fences never signal so that
//! bounded waits time out.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::types::{
    BufferCopy, BufferDescriptor, BufferHandle, BufferUsage, CommandBufferHandle,
    CommandPoolHandle, DescriptorBinding, DescriptorPoolHandle, DescriptorPoolSize,
    DescriptorResource, DescriptorSetHandle, DescriptorSetLayoutHandle, DescriptorType,
    DescriptorWrite, FenceHandle, ImageDescriptor, ImageFormat, ImageHandle, ImageLayout,
    ImageViewHandle, MemoryLocation, PipelineHandle, PipelineLayoutHandle, RenderingInfo,
    SamplerHandle, SemaphoreHandle, ShaderStages, SubmitInfo,
};

use super::GpuBackend;

/// Number of swapchain images the dummy presents from.
pub const DUMMY_SWAPCHAIN_IMAGES: u32 = 3;

/// One call made through the backend, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateFence { fence: FenceHandle, signaled: bool },
    DestroyFence(FenceHandle),
    WaitFence(FenceHandle),
    ResetFence(FenceHandle),
    CreateSemaphore(SemaphoreHandle),
    DestroySemaphore(SemaphoreHandle),
    CreateCommandPool(CommandPoolHandle),
    DestroyCommandPool(CommandPoolHandle),
    AllocateCommandBuffer(CommandBufferHandle),
    ResetCommandBuffer(CommandBufferHandle),
    BeginCommandBuffer(CommandBufferHandle),
    EndCommandBuffer(CommandBufferHandle),
    CreateDescriptorSetLayout(DescriptorSetLayoutHandle),
    DestroyDescriptorSetLayout(DescriptorSetLayoutHandle),
    CreateDescriptorPool {
        pool: DescriptorPoolHandle,
        max_sets: u32,
    },
    ResetDescriptorPool(DescriptorPoolHandle),
    DestroyDescriptorPool(DescriptorPoolHandle),
    /// `set` is `None` when the pool was exhausted.
    AllocateDescriptorSet {
        pool: DescriptorPoolHandle,
        set: Option<DescriptorSetHandle>,
    },
    UpdateDescriptorSet {
        set: DescriptorSetHandle,
        writes: usize,
    },
    CreateBuffer {
        buffer: BufferHandle,
        size: u64,
    },
    WriteBuffer {
        buffer: BufferHandle,
        offset: u64,
        len: usize,
    },
    DestroyBuffer(BufferHandle),
    CreateImage {
        image: ImageHandle,
        format: ImageFormat,
    },
    DestroyImage(ImageHandle),
    CreateImageView {
        view: ImageViewHandle,
        image: ImageHandle,
    },
    DestroyImageView(ImageViewHandle),
    DestroySampler(SamplerHandle),
    DestroyPipeline(PipelineHandle),
    DestroyPipelineLayout(PipelineLayoutHandle),
    AcquireNextImage {
        semaphore: SemaphoreHandle,
        image_index: u32,
    },
    Submit {
        command_buffer: CommandBufferHandle,
        fence: Option<FenceHandle>,
    },
    Present {
        image_index: u32,
    },
    WaitIdle,
    TransitionImage {
        image_index: u32,
        from: ImageLayout,
        to: ImageLayout,
    },
    TransitionAttachment {
        image: ImageHandle,
        from: ImageLayout,
        to: ImageLayout,
    },
    BeginRendering {
        image_index: u32,
        depth_view: Option<ImageViewHandle>,
    },
    EndRendering,
    BindPipeline(PipelineHandle),
    BindDescriptorSets {
        first_set: u32,
        sets: Vec<DescriptorSetHandle>,
    },
    BindIndexBuffer(BufferHandle),
    PushConstants {
        size: usize,
    },
    DrawIndexed {
        index_count: u32,
        first_index: u32,
    },
    CopyBuffer {
        src: BufferHandle,
        dst: BufferHandle,
        size: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Unsignaled,
    Pending,
    Signaled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordState {
    Initial,
    Recording,
    Executable,
    Pending,
}

#[derive(Debug)]
struct DummyCommandBuffer {
    pool: CommandPoolHandle,
    state: RecordState,
    fence: Option<FenceHandle>,
    buffers: HashSet<BufferHandle>,
    images: HashSet<ImageHandle>,
    pools: HashSet<DescriptorPoolHandle>,
    copies: Vec<(BufferHandle, BufferHandle, BufferCopy)>,
}

#[derive(Debug)]
struct DummyPool {
    max_sets: u32,
    capacity: HashMap<DescriptorType, u32>,
    used: HashMap<DescriptorType, u32>,
    sets: Vec<DescriptorSetHandle>,
}

#[derive(Debug)]
struct DummyBuffer {
    usage: BufferUsage,
    location: MemoryLocation,
    contents: Vec<u8>,
}

#[derive(Debug)]
struct DummyImage {
    format: ImageFormat,
    layout: ImageLayout,
}

#[derive(Debug, Default)]
struct DummyState {
    next_id: u64,
    next_image: u32,
    stalled: bool,
    /// Object creations left before every further one fails.
    creation_budget: Option<usize>,
    calls: Vec<Call>,
    violations: Vec<String>,
    fences: HashMap<FenceHandle, FenceState>,
    semaphores: HashMap<SemaphoreHandle, bool>,
    command_pools: HashSet<CommandPoolHandle>,
    command_buffers: HashMap<CommandBufferHandle, DummyCommandBuffer>,
    layouts: HashMap<DescriptorSetLayoutHandle, Vec<DescriptorBinding>>,
    pools: HashMap<DescriptorPoolHandle, DummyPool>,
    sets: HashMap<DescriptorSetHandle, DescriptorPoolHandle>,
    set_buffers: HashMap<DescriptorSetHandle, Vec<BufferHandle>>,
    buffers: HashMap<BufferHandle, DummyBuffer>,
    images: HashMap<ImageHandle, DummyImage>,
    image_views: HashMap<ImageViewHandle, ImageHandle>,
    /// Samplers, pipelines and layouts created by collaborators.
    external: HashSet<u64>,
}

impl DummyState {
    fn next_handle(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn spend_creation(&mut self, what: &str) -> Result<(), GraphicsError> {
        match self.creation_budget {
            Some(0) => Err(GraphicsError::ResourceCreationFailed(format!(
                "dummy creation limit reached creating {what}"
            ))),
            Some(left) => {
                self.creation_budget = Some(left - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn violation(&mut self, message: String) {
        log::warn!("DummyBackend: {}", message);
        self.violations.push(message);
    }

    /// Mark every submission signaling `fence` as complete.
    fn retire(&mut self, fence: Option<FenceHandle>) {
        for command_buffer in self.command_buffers.values_mut() {
            if command_buffer.state == RecordState::Pending
                && (fence.is_none() || command_buffer.fence == fence)
            {
                command_buffer.state = RecordState::Executable;
                command_buffer.fence = None;
            }
        }
    }

    fn recording(&mut self, command_buffer: CommandBufferHandle, what: &str) -> bool {
        match self.command_buffers.get(&command_buffer) {
            Some(cb) if cb.state == RecordState::Recording => true,
            Some(cb) => {
                let state = cb.state;
                self.violation(format!(
                    "{what} recorded into command buffer {} in state {state:?}",
                    command_buffer.as_raw()
                ));
                false
            }
            None => {
                self.violation(format!(
                    "{what} recorded into unknown command buffer {}",
                    command_buffer.as_raw()
                ));
                false
            }
        }
    }

    fn in_flight_buffer(&self, buffer: BufferHandle) -> bool {
        self.command_buffers
            .values()
            .any(|cb| cb.state == RecordState::Pending && cb.buffers.contains(&buffer))
    }

    fn in_flight_image(&self, image: ImageHandle) -> bool {
        self.command_buffers
            .values()
            .any(|cb| cb.state == RecordState::Pending && cb.images.contains(&image))
    }

    fn in_flight_pool(&self, pool: DescriptorPoolHandle) -> bool {
        self.command_buffers
            .values()
            .any(|cb| cb.state == RecordState::Pending && cb.pools.contains(&pool))
    }

    fn release_pool_sets(&mut self, pool: DescriptorPoolHandle) {
        let Some(dummy_pool) = self.pools.get_mut(&pool) else {
            return;
        };
        dummy_pool.used.clear();
        for set in dummy_pool.sets.drain(..) {
            self.sets.remove(&set);
            self.set_buffers.remove(&set);
        }
    }
}

/// Dummy GPU backend.
#[derive(Debug, Default)]
pub struct DummyBackend {
    state: Mutex<DummyState>,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Forget the recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Protocol violations observed so far.
    pub fn violations(&self) -> Vec<String> {
        self.state.lock().violations.clone()
    }

    /// Make pending fences never signal.
    pub fn set_stalled(&self, stalled: bool) {
        self.state.lock().stalled = stalled;
    }

    /// Let `limit` more objects be created, then fail every creation.
    ///
    /// `None` removes the limit.
    pub fn set_creation_limit(&self, limit: Option<usize>) {
        self.state.lock().creation_budget = limit;
    }

    /// Whether a fence is currently signaled.
    pub fn is_fence_signaled(&self, fence: FenceHandle) -> bool {
        self.state.lock().fences.get(&fence) == Some(&FenceState::Signaled)
    }

    /// Live descriptor pools, in creation order.
    pub fn live_descriptor_pools(&self) -> Vec<DescriptorPoolHandle> {
        let mut pools: Vec<_> = self.state.lock().pools.keys().copied().collect();
        pools.sort();
        pools
    }

    /// Set capacity of a live pool.
    pub fn pool_capacity(&self, pool: DescriptorPoolHandle) -> Option<u32> {
        self.state.lock().pools.get(&pool).map(|p| p.max_sets)
    }

    /// Sets currently allocated from a live pool.
    pub fn pool_allocations(&self, pool: DescriptorPoolHandle) -> Option<u32> {
        self.state
            .lock()
            .pools
            .get(&pool)
            .map(|p| p.sets.len() as u32)
    }

    /// Descriptor capacity of one type in a live pool.
    pub fn pool_descriptor_capacity(
        &self,
        pool: DescriptorPoolHandle,
        ty: DescriptorType,
    ) -> Option<u32> {
        self.state
            .lock()
            .pools
            .get(&pool)
            .map(|p| p.capacity.get(&ty).copied().unwrap_or(0))
    }

    /// Pool a live set was allocated from.
    pub fn set_pool(&self, set: DescriptorSetHandle) -> Option<DescriptorPoolHandle> {
        self.state.lock().sets.get(&set).copied()
    }

    /// Current layout of a live image.
    pub fn image_layout(&self, image: ImageHandle) -> Option<ImageLayout> {
        self.state.lock().images.get(&image).map(|i| i.layout)
    }

    /// Contents of a live buffer.
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.state
            .lock()
            .buffers
            .get(&buffer)
            .map(|b| b.contents.clone())
    }

    /// Number of live objects of any kind.
    pub fn live_objects(&self) -> usize {
        let state = self.state.lock();
        state.fences.len()
            + state.semaphores.len()
            + state.command_pools.len()
            + state.layouts.len()
            + state.pools.len()
            + state.buffers.len()
            + state.images.len()
            + state.image_views.len()
            + state.external.len()
    }

    fn create_external(&self, kind: &str) -> u64 {
        let mut state = self.state.lock();
        let raw = state.next_handle();
        state.external.insert(raw);
        log::trace!("DummyBackend: creating {} {}", kind, raw);
        raw
    }

    /// Create a pipeline, standing in for the pipeline builder.
    pub fn create_pipeline(&self) -> PipelineHandle {
        PipelineHandle::from_raw(self.create_external("pipeline"))
    }

    /// Create a pipeline layout, standing in for the pipeline builder.
    pub fn create_pipeline_layout(&self) -> PipelineLayoutHandle {
        PipelineLayoutHandle::from_raw(self.create_external("pipeline layout"))
    }

    /// Create a sampler, standing in for the texture loader.
    pub fn create_sampler(&self) -> SamplerHandle {
        SamplerHandle::from_raw(self.create_external("sampler"))
    }

    fn destroy_external(&self, raw: u64, call: Call) {
        let mut state = self.state.lock();
        if !state.external.remove(&raw) {
            state.violation(format!("{call:?} of unknown object"));
        }
        state.calls.push(call);
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn create_fence(&self, signaled: bool) -> Result<FenceHandle, GraphicsError> {
        let mut state = self.state.lock();
        state.spend_creation("fence")?;
        let fence = FenceHandle::from_raw(state.next_handle());
        let initial = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        state.fences.insert(fence, initial);
        state.calls.push(Call::CreateFence { fence, signaled });
        log::trace!("DummyBackend: creating fence {}", fence.as_raw());
        Ok(fence)
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        let mut state = self.state.lock();
        match state.fences.remove(&fence) {
            Some(FenceState::Pending) => {
                state.violation(format!("fence {} destroyed while pending", fence.as_raw()))
            }
            Some(_) => {}
            None => state.violation(format!("destroy of unknown fence {}", fence.as_raw())),
        }
        state.calls.push(Call::DestroyFence(fence));
    }

    fn wait_fence(&self, fence: FenceHandle, timeout: Duration) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        state.calls.push(Call::WaitFence(fence));
        let timed_out = GraphicsError::Timeout {
            what: "fence",
            timeout,
        };
        match state.fences.get(&fence).copied() {
            Some(FenceState::Signaled) => Ok(()),
            Some(FenceState::Pending) if state.stalled => Err(timed_out),
            Some(FenceState::Pending) => {
                state.fences.insert(fence, FenceState::Signaled);
                state.retire(Some(fence));
                Ok(())
            }
            // Nothing will ever signal it.
            Some(FenceState::Unsignaled) => Err(timed_out),
            None => Err(GraphicsError::Internal(format!(
                "wait on unknown fence {}",
                fence.as_raw()
            ))),
        }
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        state.calls.push(Call::ResetFence(fence));
        match state.fences.get(&fence).copied() {
            Some(FenceState::Pending) => {
                state.violation(format!("fence {} reset while pending", fence.as_raw()));
                Ok(())
            }
            Some(_) => {
                state.fences.insert(fence, FenceState::Unsignaled);
                Ok(())
            }
            None => Err(GraphicsError::Internal(format!(
                "reset of unknown fence {}",
                fence.as_raw()
            ))),
        }
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle, GraphicsError> {
        let mut state = self.state.lock();
        state.spend_creation("semaphore")?;
        let semaphore = SemaphoreHandle::from_raw(state.next_handle());
        state.semaphores.insert(semaphore, false);
        state.calls.push(Call::CreateSemaphore(semaphore));
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        let mut state = self.state.lock();
        if state.semaphores.remove(&semaphore).is_none() {
            state.violation(format!(
                "destroy of unknown semaphore {}",
                semaphore.as_raw()
            ));
        }
        state.calls.push(Call::DestroySemaphore(semaphore));
    }

    fn create_command_pool(&self) -> Result<CommandPoolHandle, GraphicsError> {
        let mut state = self.state.lock();
        state.spend_creation("command pool")?;
        let pool = CommandPoolHandle::from_raw(state.next_handle());
        state.command_pools.insert(pool);
        state.calls.push(Call::CreateCommandPool(pool));
        Ok(pool)
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        let mut state = self.state.lock();
        if !state.command_pools.remove(&pool) {
            state.violation(format!("destroy of unknown command pool {}", pool.as_raw()));
        }
        let pending = state
            .command_buffers
            .values()
            .any(|cb| cb.pool == pool && cb.state == RecordState::Pending);
        if pending {
            state.violation(format!(
                "command pool {} destroyed with a pending command buffer",
                pool.as_raw()
            ));
        }
        state.command_buffers.retain(|_, cb| cb.pool != pool);
        state.calls.push(Call::DestroyCommandPool(pool));
    }

    fn allocate_command_buffer(
        &self,
        pool: CommandPoolHandle,
    ) -> Result<CommandBufferHandle, GraphicsError> {
        let mut state = self.state.lock();
        if !state.command_pools.contains(&pool) {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "unknown command pool {}",
                pool.as_raw()
            )));
        }
        let command_buffer = CommandBufferHandle::from_raw(state.next_handle());
        state.command_buffers.insert(
            command_buffer,
            DummyCommandBuffer {
                pool,
                state: RecordState::Initial,
                fence: None,
                buffers: HashSet::new(),
                images: HashSet::new(),
                pools: HashSet::new(),
                copies: Vec::new(),
            },
        );
        state.calls.push(Call::AllocateCommandBuffer(command_buffer));
        Ok(command_buffer)
    }

    fn reset_command_buffer(
        &self,
        command_buffer: CommandBufferHandle,
    ) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        state.calls.push(Call::ResetCommandBuffer(command_buffer));
        let Some(cb) = state.command_buffers.get_mut(&command_buffer) else {
            return Err(GraphicsError::Internal(format!(
                "reset of unknown command buffer {}",
                command_buffer.as_raw()
            )));
        };
        if cb.state == RecordState::Pending {
            state.violation(format!(
                "command buffer {} reset while its submission is pending",
                command_buffer.as_raw()
            ));
            return Ok(());
        }
        cb.state = RecordState::Initial;
        cb.buffers.clear();
        cb.images.clear();
        cb.pools.clear();
        cb.copies.clear();
        Ok(())
    }

    fn begin_command_buffer(
        &self,
        command_buffer: CommandBufferHandle,
    ) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        state.calls.push(Call::BeginCommandBuffer(command_buffer));
        let Some(cb) = state.command_buffers.get_mut(&command_buffer) else {
            return Err(GraphicsError::Internal(format!(
                "begin of unknown command buffer {}",
                command_buffer.as_raw()
            )));
        };
        if cb.state != RecordState::Initial {
            let previous = cb.state;
            state.violation(format!(
                "command buffer {} begun in state {previous:?}",
                command_buffer.as_raw()
            ));
            return Ok(());
        }
        cb.state = RecordState::Recording;
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: CommandBufferHandle) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        state.calls.push(Call::EndCommandBuffer(command_buffer));
        if state.recording(command_buffer, "end")
            && let Some(cb) = state.command_buffers.get_mut(&command_buffer)
        {
            cb.state = RecordState::Executable;
        }
        Ok(())
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> Result<DescriptorSetLayoutHandle, GraphicsError> {
        let mut state = self.state.lock();
        state.spend_creation("descriptor set layout")?;
        let layout = DescriptorSetLayoutHandle::from_raw(state.next_handle());
        state.layouts.insert(layout, bindings.to_vec());
        state.calls.push(Call::CreateDescriptorSetLayout(layout));
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) {
        let mut state = self.state.lock();
        if state.layouts.remove(&layout).is_none() {
            state.violation(format!(
                "destroy of unknown descriptor set layout {}",
                layout.as_raw()
            ));
        }
        state.calls.push(Call::DestroyDescriptorSetLayout(layout));
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        sizes: &[DescriptorPoolSize],
    ) -> Result<DescriptorPoolHandle, GraphicsError> {
        let mut state = self.state.lock();
        state.spend_creation("descriptor pool")?;
        if max_sets == 0 || sizes.iter().any(|size| size.count == 0) {
            state.violation(format!(
                "descriptor pool created with zero capacity (max_sets {max_sets}, sizes {sizes:?})"
            ));
        }
        let pool = DescriptorPoolHandle::from_raw(state.next_handle());
        let mut capacity = HashMap::new();
        for size in sizes {
            *capacity.entry(size.ty).or_insert(0) += size.count;
        }
        state.pools.insert(
            pool,
            DummyPool {
                max_sets,
                capacity,
                used: HashMap::new(),
                sets: Vec::new(),
            },
        );
        state.calls.push(Call::CreateDescriptorPool { pool, max_sets });
        log::trace!(
            "DummyBackend: creating descriptor pool {} ({} sets)",
            pool.as_raw(),
            max_sets
        );
        Ok(pool)
    }

    fn reset_descriptor_pool(&self, pool: DescriptorPoolHandle) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        state.calls.push(Call::ResetDescriptorPool(pool));
        if !state.pools.contains_key(&pool) {
            return Err(GraphicsError::Internal(format!(
                "reset of unknown descriptor pool {}",
                pool.as_raw()
            )));
        }
        if state.in_flight_pool(pool) {
            state.violation(format!(
                "descriptor pool {} reset while a pending submission uses its sets",
                pool.as_raw()
            ));
        }
        state.release_pool_sets(pool);
        Ok(())
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle) {
        let mut state = self.state.lock();
        if state.in_flight_pool(pool) {
            state.violation(format!(
                "descriptor pool {} destroyed while a pending submission uses its sets",
                pool.as_raw()
            ));
        }
        state.release_pool_sets(pool);
        if state.pools.remove(&pool).is_none() {
            state.violation(format!(
                "destroy of unknown descriptor pool {}",
                pool.as_raw()
            ));
        }
        state.calls.push(Call::DestroyDescriptorPool(pool));
    }

    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<DescriptorSetHandle, GraphicsError> {
        let mut state = self.state.lock();
        let Some(bindings) = state.layouts.get(&layout).cloned() else {
            return Err(GraphicsError::Internal(format!(
                "allocation with unknown layout {}",
                layout.as_raw()
            )));
        };
        let Some(dummy_pool) = state.pools.get(&pool) else {
            return Err(GraphicsError::Internal(format!(
                "allocation from unknown descriptor pool {}",
                pool.as_raw()
            )));
        };

        let mut needed: HashMap<DescriptorType, u32> = HashMap::new();
        for binding in &bindings {
            *needed.entry(binding.ty).or_insert(0) += binding.count;
        }
        let out_of_sets = dummy_pool.sets.len() as u32 >= dummy_pool.max_sets;
        let out_of_descriptors = needed.iter().any(|(ty, count)| {
            let used = dummy_pool.used.get(ty).copied().unwrap_or(0);
            let capacity = dummy_pool.capacity.get(ty).copied().unwrap_or(0);
            used + count > capacity
        });
        if out_of_sets || out_of_descriptors {
            state
                .calls
                .push(Call::AllocateDescriptorSet { pool, set: None });
            return Err(GraphicsError::DescriptorPoolExhausted);
        }

        let set = DescriptorSetHandle::from_raw(state.next_handle());
        if let Some(dummy_pool) = state.pools.get_mut(&pool) {
            for (ty, count) in needed {
                *dummy_pool.used.entry(ty).or_insert(0) += count;
            }
            dummy_pool.sets.push(set);
        }
        state.sets.insert(set, pool);
        state.calls.push(Call::AllocateDescriptorSet {
            pool,
            set: Some(set),
        });
        Ok(set)
    }

    fn update_descriptor_set(&self, set: DescriptorSetHandle, writes: &[DescriptorWrite]) {
        let mut state = self.state.lock();
        if !state.sets.contains_key(&set) {
            state.violation(format!("update of freed descriptor set {}", set.as_raw()));
        }
        let buffers: Vec<BufferHandle> = writes
            .iter()
            .filter_map(|write| match write.resource {
                DescriptorResource::Buffer { buffer, .. } => Some(buffer),
                DescriptorResource::Image { .. } => None,
            })
            .collect();
        state.set_buffers.entry(set).or_default().extend(buffers);
        state.calls.push(Call::UpdateDescriptorSet {
            set,
            writes: writes.len(),
        });
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferHandle, GraphicsError> {
        if descriptor.size == 0 {
            return Err(GraphicsError::ResourceCreationFailed(
                "buffer size must be non-zero".to_string(),
            ));
        }
        let mut state = self.state.lock();
        state.spend_creation("buffer")?;
        let buffer = BufferHandle::from_raw(state.next_handle());
        state.buffers.insert(
            buffer,
            DummyBuffer {
                usage: descriptor.usage,
                location: descriptor.location,
                contents: vec![0; descriptor.size as usize],
            },
        );
        state.calls.push(Call::CreateBuffer {
            buffer,
            size: descriptor.size,
        });
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        Ok(buffer)
    }

    fn write_buffer(
        &self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        state.calls.push(Call::WriteBuffer {
            buffer,
            offset,
            len: data.len(),
        });
        let Some(dummy_buffer) = state.buffers.get_mut(&buffer) else {
            return Err(GraphicsError::Internal(format!(
                "write to unknown buffer {}",
                buffer.as_raw()
            )));
        };
        if dummy_buffer.location == MemoryLocation::GpuOnly {
            return Err(GraphicsError::Internal(format!(
                "buffer {} is not host visible",
                buffer.as_raw()
            )));
        }
        let start = offset as usize;
        let end = start + data.len();
        if end > dummy_buffer.contents.len() {
            return Err(GraphicsError::Internal(format!(
                "write of {} bytes at offset {} overflows buffer {}",
                data.len(),
                offset,
                buffer.as_raw()
            )));
        }
        dummy_buffer.contents[start..end].copy_from_slice(data);
        Ok(())
    }

    fn buffer_device_address(&self, buffer: BufferHandle) -> u64 {
        let mut state = self.state.lock();
        let usage = state.buffers.get(&buffer).map(|b| b.usage);
        match usage {
            Some(usage) if usage.contains(BufferUsage::DEVICE_ADDRESS) => buffer.as_raw() << 32,
            _ => {
                state.violation(format!(
                    "device address of buffer {} without DEVICE_ADDRESS usage",
                    buffer.as_raw()
                ));
                0
            }
        }
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let mut state = self.state.lock();
        if state.in_flight_buffer(buffer) {
            state.violation(format!(
                "buffer {} destroyed while a pending submission uses it",
                buffer.as_raw()
            ));
        }
        if state.buffers.remove(&buffer).is_none() {
            state.violation(format!("destroy of unknown buffer {}", buffer.as_raw()));
        }
        state.calls.push(Call::DestroyBuffer(buffer));
    }

    fn create_image(&self, descriptor: &ImageDescriptor) -> Result<ImageHandle, GraphicsError> {
        if descriptor.extent.width == 0 || descriptor.extent.height == 0 {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "image extent must be non-zero, got {:?}",
                descriptor.extent
            )));
        }
        let mut state = self.state.lock();
        state.spend_creation("image")?;
        let image = ImageHandle::from_raw(state.next_handle());
        state.images.insert(
            image,
            DummyImage {
                format: descriptor.format,
                layout: ImageLayout::Undefined,
            },
        );
        state.calls.push(Call::CreateImage {
            image,
            format: descriptor.format,
        });
        log::trace!(
            "DummyBackend: creating image {:?} ({:?})",
            descriptor.label,
            descriptor.format
        );
        Ok(image)
    }

    fn destroy_image(&self, image: ImageHandle) {
        let mut state = self.state.lock();
        if state.in_flight_image(image) {
            state.violation(format!(
                "image {} destroyed while a pending submission uses it",
                image.as_raw()
            ));
        }
        if state.image_views.values().any(|&viewed| viewed == image) {
            state.violation(format!(
                "image {} destroyed before its views",
                image.as_raw()
            ));
        }
        if state.images.remove(&image).is_none() {
            state.violation(format!("destroy of unknown image {}", image.as_raw()));
        }
        state.calls.push(Call::DestroyImage(image));
    }

    fn create_image_view(&self, image: ImageHandle) -> Result<ImageViewHandle, GraphicsError> {
        let mut state = self.state.lock();
        state.spend_creation("image view")?;
        if !state.images.contains_key(&image) {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "view of unknown image {}",
                image.as_raw()
            )));
        }
        let view = ImageViewHandle::from_raw(state.next_handle());
        state.image_views.insert(view, image);
        state.calls.push(Call::CreateImageView { view, image });
        Ok(view)
    }

    fn destroy_image_view(&self, view: ImageViewHandle) {
        let mut state = self.state.lock();
        if state.image_views.remove(&view).is_none() {
            state.violation(format!("destroy of unknown image view {}", view.as_raw()));
        }
        state.calls.push(Call::DestroyImageView(view));
    }

    fn destroy_sampler(&self, sampler: SamplerHandle) {
        self.destroy_external(sampler.as_raw(), Call::DestroySampler(sampler));
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        self.destroy_external(pipeline.as_raw(), Call::DestroyPipeline(pipeline));
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle) {
        self.destroy_external(layout.as_raw(), Call::DestroyPipelineLayout(layout));
    }

    fn acquire_next_image(
        &self,
        signal: SemaphoreHandle,
        _timeout: Duration,
    ) -> Result<u32, GraphicsError> {
        let mut state = self.state.lock();
        match state.semaphores.get(&signal).copied() {
            Some(true) => state.violation(format!(
                "acquire signals semaphore {} which is already signaled",
                signal.as_raw()
            )),
            Some(false) => {}
            None => {
                return Err(GraphicsError::Internal(format!(
                    "acquire with unknown semaphore {}",
                    signal.as_raw()
                )));
            }
        }
        state.semaphores.insert(signal, true);
        let image_index = state.next_image;
        state.next_image = (state.next_image + 1) % DUMMY_SWAPCHAIN_IMAGES;
        state.calls.push(Call::AcquireNextImage {
            semaphore: signal,
            image_index,
        });
        Ok(image_index)
    }

    fn submit(&self, info: &SubmitInfo) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Submit {
            command_buffer: info.command_buffer,
            fence: info.fence,
        });

        match state.command_buffers.get(&info.command_buffer).map(|cb| cb.state) {
            Some(RecordState::Executable) => {}
            Some(other) => state.violation(format!(
                "command buffer {} submitted in state {other:?}",
                info.command_buffer.as_raw()
            )),
            None => {
                return Err(GraphicsError::Internal(format!(
                    "submit of unknown command buffer {}",
                    info.command_buffer.as_raw()
                )));
            }
        }

        if let Some(wait) = info.wait_semaphore {
            if state.semaphores.get(&wait) != Some(&true) {
                state.violation(format!(
                    "submission waits on semaphore {} which nothing signals",
                    wait.as_raw()
                ));
            }
            state.semaphores.insert(wait, false);
        }
        if let Some(signal) = info.signal_semaphore {
            state.semaphores.insert(signal, true);
        }
        if let Some(fence) = info.fence {
            if state.fences.get(&fence) != Some(&FenceState::Unsignaled) {
                state.violation(format!(
                    "submission signals fence {} which is not unsignaled",
                    fence.as_raw()
                ));
            }
            state.fences.insert(fence, FenceState::Pending);
        }

        let copies = match state.command_buffers.get_mut(&info.command_buffer) {
            Some(cb) => {
                cb.state = RecordState::Pending;
                cb.fence = info.fence;
                cb.copies.clone()
            }
            None => Vec::new(),
        };
        for (src, dst, region) in copies {
            let src_range = region.src_offset as usize..(region.src_offset + region.size) as usize;
            let dst_range = region.dst_offset as usize..(region.dst_offset + region.size) as usize;
            let data = state
                .buffers
                .get(&src)
                .and_then(|b| b.contents.get(src_range).map(<[u8]>::to_vec));
            let target = state
                .buffers
                .get_mut(&dst)
                .and_then(|b| b.contents.get_mut(dst_range));
            let copied = match (data, target) {
                (Some(data), Some(target)) => {
                    target.copy_from_slice(&data);
                    true
                }
                _ => false,
            };
            if !copied {
                state.violation(format!(
                    "copy of {} bytes from buffer {} to buffer {} out of range",
                    region.size,
                    src.as_raw(),
                    dst.as_raw()
                ));
            }
        }
        Ok(())
    }

    fn present(&self, image_index: u32, wait: SemaphoreHandle) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        if state.semaphores.get(&wait) != Some(&true) {
            state.violation(format!(
                "present waits on semaphore {} which nothing signals",
                wait.as_raw()
            ));
        }
        state.semaphores.insert(wait, false);
        state.calls.push(Call::Present { image_index });
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        state.calls.push(Call::WaitIdle);
        for fence_state in state.fences.values_mut() {
            if *fence_state == FenceState::Pending {
                *fence_state = FenceState::Signaled;
            }
        }
        state.retire(None);
        Ok(())
    }

    fn cmd_transition_image(
        &self,
        command_buffer: CommandBufferHandle,
        image_index: u32,
        from: ImageLayout,
        to: ImageLayout,
    ) {
        let mut state = self.state.lock();
        state.recording(command_buffer, "image transition");
        state.calls.push(Call::TransitionImage {
            image_index,
            from,
            to,
        });
    }

    fn cmd_transition_attachment(
        &self,
        command_buffer: CommandBufferHandle,
        image: ImageHandle,
        from: ImageLayout,
        to: ImageLayout,
    ) {
        let mut state = self.state.lock();
        state.calls.push(Call::TransitionAttachment { image, from, to });
        if !state.recording(command_buffer, "attachment transition") {
            return;
        }
        let Some(current) = state.images.get(&image).map(|i| i.layout) else {
            state.violation(format!("transition of unknown image {}", image.as_raw()));
            return;
        };
        if from != ImageLayout::Undefined && from != current {
            state.violation(format!(
                "image {} transitioned from {from:?} but is in {current:?}",
                image.as_raw()
            ));
        }
        if let Some(dummy_image) = state.images.get_mut(&image) {
            dummy_image.layout = to;
        }
        if let Some(cb) = state.command_buffers.get_mut(&command_buffer) {
            cb.images.insert(image);
        }
    }

    fn cmd_begin_rendering(&self, command_buffer: CommandBufferHandle, info: &RenderingInfo) {
        let mut state = self.state.lock();
        state.calls.push(Call::BeginRendering {
            image_index: info.image_index,
            depth_view: info.depth_view,
        });
        if !state.recording(command_buffer, "begin rendering") {
            return;
        }
        if info.image_index >= DUMMY_SWAPCHAIN_IMAGES {
            state.violation(format!(
                "rendering into swapchain image {} of {}",
                info.image_index, DUMMY_SWAPCHAIN_IMAGES
            ));
        }
        let Some(view) = info.depth_view else {
            return;
        };
        let Some(image) = state.image_views.get(&view).copied() else {
            state.violation(format!("rendering with unknown depth view {}", view.as_raw()));
            return;
        };
        let depth = state
            .images
            .get(&image)
            .map(|i| (i.format.is_depth(), i.layout));
        match depth {
            Some((true, ImageLayout::DepthAttachment)) => {}
            other => state.violation(format!(
                "depth view {} is not a depth attachment ({other:?})",
                view.as_raw()
            )),
        }
        if let Some(cb) = state.command_buffers.get_mut(&command_buffer) {
            cb.images.insert(image);
        }
    }

    fn cmd_end_rendering(&self, command_buffer: CommandBufferHandle) {
        let mut state = self.state.lock();
        state.recording(command_buffer, "end rendering");
        state.calls.push(Call::EndRendering);
    }

    fn cmd_bind_pipeline(&self, command_buffer: CommandBufferHandle, pipeline: PipelineHandle) {
        let mut state = self.state.lock();
        state.recording(command_buffer, "bind pipeline");
        state.calls.push(Call::BindPipeline(pipeline));
    }

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: CommandBufferHandle,
        _layout: PipelineLayoutHandle,
        first_set: u32,
        sets: &[DescriptorSetHandle],
    ) {
        let mut state = self.state.lock();
        if state.recording(command_buffer, "bind descriptor sets") {
            let mut pools = Vec::new();
            let mut buffers = Vec::new();
            for set in sets {
                match state.sets.get(set) {
                    Some(pool) => pools.push(*pool),
                    None => {
                        state.violation(format!("bind of freed descriptor set {}", set.as_raw()));
                        continue;
                    }
                }
                if let Some(set_buffers) = state.set_buffers.get(set) {
                    buffers.extend(set_buffers.iter().copied());
                }
            }
            if let Some(cb) = state.command_buffers.get_mut(&command_buffer) {
                cb.pools.extend(pools);
                cb.buffers.extend(buffers);
            }
        }
        state.calls.push(Call::BindDescriptorSets {
            first_set,
            sets: sets.to_vec(),
        });
    }

    fn cmd_bind_index_buffer(
        &self,
        command_buffer: CommandBufferHandle,
        buffer: BufferHandle,
        _offset: u64,
    ) {
        let mut state = self.state.lock();
        if state.recording(command_buffer, "bind index buffer")
            && let Some(cb) = state.command_buffers.get_mut(&command_buffer)
        {
            cb.buffers.insert(buffer);
        }
        state.calls.push(Call::BindIndexBuffer(buffer));
    }

    fn cmd_push_constants(
        &self,
        command_buffer: CommandBufferHandle,
        _layout: PipelineLayoutHandle,
        _stages: ShaderStages,
        _offset: u32,
        data: &[u8],
    ) {
        let mut state = self.state.lock();
        state.recording(command_buffer, "push constants");
        state.calls.push(Call::PushConstants { size: data.len() });
    }

    fn cmd_draw_indexed(
        &self,
        command_buffer: CommandBufferHandle,
        index_count: u32,
        first_index: u32,
    ) {
        let mut state = self.state.lock();
        state.recording(command_buffer, "draw");
        state.calls.push(Call::DrawIndexed {
            index_count,
            first_index,
        });
    }

    fn cmd_copy_buffer(
        &self,
        command_buffer: CommandBufferHandle,
        src: BufferHandle,
        dst: BufferHandle,
        region: &BufferCopy,
    ) {
        let mut state = self.state.lock();
        if state.recording(command_buffer, "copy buffer")
            && let Some(cb) = state.command_buffers.get_mut(&command_buffer)
        {
            cb.buffers.insert(src);
            cb.buffers.insert(dst);
            cb.copies.push((src, dst, *region));
        }
        state.calls.push(Call::CopyBuffer {
            src,
            dst,
            size: region.size,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Extent2d;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_creation_limit() {
        let backend = DummyBackend::new();
        backend.set_creation_limit(Some(1));
        let fence = backend.create_fence(true).unwrap();
        assert!(matches!(
            backend.create_semaphore(),
            Err(GraphicsError::ResourceCreationFailed(_))
        ));
        assert!(backend.create_command_pool().is_err());

        backend.set_creation_limit(None);
        let semaphore = backend.create_semaphore().unwrap();
        backend.destroy_semaphore(semaphore);
        backend.destroy_fence(fence);
        assert_eq!(backend.live_objects(), 0);
    }

    fn recorded_command_buffer(backend: &DummyBackend) -> CommandBufferHandle {
        let pool = backend.create_command_pool().unwrap();
        let cmd = backend.allocate_command_buffer(pool).unwrap();
        backend.begin_command_buffer(cmd).unwrap();
        backend.end_command_buffer(cmd).unwrap();
        cmd
    }

    #[test]
    fn test_submission_pending_until_waited() {
        let backend = DummyBackend::new();
        let fence = backend.create_fence(false).unwrap();
        let cmd = recorded_command_buffer(&backend);

        backend.submit(&SubmitInfo::new(cmd).fence(fence)).unwrap();
        assert!(!backend.is_fence_signaled(fence));

        backend.wait_fence(fence, SECOND).unwrap();
        assert!(backend.is_fence_signaled(fence));
        assert!(backend.violations().is_empty());
    }

    #[test]
    fn test_stalled_fence_times_out() {
        let backend = DummyBackend::new();
        let fence = backend.create_fence(false).unwrap();
        let cmd = recorded_command_buffer(&backend);
        backend.submit(&SubmitInfo::new(cmd).fence(fence)).unwrap();

        backend.set_stalled(true);
        let err = backend.wait_fence(fence, SECOND).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_unsubmitted_unsignaled_fence_times_out() {
        let backend = DummyBackend::new();
        let fence = backend.create_fence(false).unwrap();
        assert!(backend.wait_fence(fence, SECOND).unwrap_err().is_timeout());
    }

    #[test]
    fn test_reset_of_pending_command_buffer_is_violation() {
        let backend = DummyBackend::new();
        let fence = backend.create_fence(false).unwrap();
        let cmd = recorded_command_buffer(&backend);
        backend.submit(&SubmitInfo::new(cmd).fence(fence)).unwrap();

        backend.reset_command_buffer(cmd).unwrap();
        assert_eq!(backend.violations().len(), 1);
    }

    #[test]
    fn test_pool_refuses_beyond_set_capacity() {
        let backend = DummyBackend::new();
        let layout = backend
            .create_descriptor_set_layout(&[DescriptorBinding {
                binding: 0,
                ty: DescriptorType::UniformBuffer,
                count: 1,
                stages: ShaderStages::VERTEX,
            }])
            .unwrap();
        let pool = backend
            .create_descriptor_pool(
                2,
                &[DescriptorPoolSize {
                    ty: DescriptorType::UniformBuffer,
                    count: 8,
                }],
            )
            .unwrap();

        backend.allocate_descriptor_set(pool, layout).unwrap();
        backend.allocate_descriptor_set(pool, layout).unwrap();
        assert_eq!(
            backend.allocate_descriptor_set(pool, layout),
            Err(GraphicsError::DescriptorPoolExhausted)
        );

        backend.reset_descriptor_pool(pool).unwrap();
        assert_eq!(backend.pool_allocations(pool), Some(0));
        backend.allocate_descriptor_set(pool, layout).unwrap();
    }

    #[test]
    fn test_pool_refuses_missing_descriptor_type() {
        let backend = DummyBackend::new();
        let layout = backend
            .create_descriptor_set_layout(&[DescriptorBinding {
                binding: 0,
                ty: DescriptorType::StorageImage,
                count: 1,
                stages: ShaderStages::COMPUTE,
            }])
            .unwrap();
        let pool = backend
            .create_descriptor_pool(
                4,
                &[DescriptorPoolSize {
                    ty: DescriptorType::UniformBuffer,
                    count: 4,
                }],
            )
            .unwrap();

        assert_eq!(
            backend.allocate_descriptor_set(pool, layout),
            Err(GraphicsError::DescriptorPoolExhausted)
        );
    }

    #[test]
    fn test_copy_applies_on_submit() {
        let backend = DummyBackend::new();
        let src = backend.create_buffer(&BufferDescriptor::staging(4)).unwrap();
        let dst = backend
            .create_buffer(&BufferDescriptor::new(4, BufferUsage::COPY_DST))
            .unwrap();
        backend.write_buffer(src, 0, &[1, 2, 3, 4]).unwrap();

        let pool = backend.create_command_pool().unwrap();
        let cmd = backend.allocate_command_buffer(pool).unwrap();
        backend.begin_command_buffer(cmd).unwrap();
        backend.cmd_copy_buffer(
            cmd,
            src,
            dst,
            &BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: 4,
            },
        );
        backend.end_command_buffer(cmd).unwrap();
        backend.submit(&SubmitInfo::new(cmd)).unwrap();

        assert_eq!(backend.buffer_contents(dst), Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_destroying_in_flight_buffer_is_violation() {
        let backend = DummyBackend::new();
        let fence = backend.create_fence(false).unwrap();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::INDEX))
            .unwrap();
        let pool = backend.create_command_pool().unwrap();
        let cmd = backend.allocate_command_buffer(pool).unwrap();
        backend.begin_command_buffer(cmd).unwrap();
        backend.cmd_bind_index_buffer(cmd, buffer, 0);
        backend.end_command_buffer(cmd).unwrap();
        backend.submit(&SubmitInfo::new(cmd).fence(fence)).unwrap();

        backend.destroy_buffer(buffer);
        assert_eq!(backend.violations().len(), 1);
    }

    fn rendering(image_index: u32, depth_view: Option<ImageViewHandle>) -> RenderingInfo {
        RenderingInfo {
            image_index,
            extent: Extent2d::new(64, 64),
            clear_color: [0.0; 4],
            depth_view,
        }
    }

    #[test]
    fn test_image_destroyed_before_view_is_violation() {
        let backend = DummyBackend::new();
        let image = backend
            .create_image(&ImageDescriptor::depth(Extent2d::new(64, 64)))
            .unwrap();
        let view = backend.create_image_view(image).unwrap();

        backend.destroy_image(image);
        assert_eq!(backend.violations().len(), 1);
        backend.destroy_image_view(view);
    }

    #[test]
    fn test_depth_view_must_be_in_attachment_layout() {
        let backend = DummyBackend::new();
        let image = backend
            .create_image(&ImageDescriptor::depth(Extent2d::new(64, 64)))
            .unwrap();
        let view = backend.create_image_view(image).unwrap();
        let pool = backend.create_command_pool().unwrap();
        let cmd = backend.allocate_command_buffer(pool).unwrap();
        backend.begin_command_buffer(cmd).unwrap();

        backend.cmd_begin_rendering(cmd, &rendering(0, Some(view)));
        backend.cmd_end_rendering(cmd);
        assert_eq!(backend.violations().len(), 1);

        backend.cmd_transition_attachment(
            cmd,
            image,
            ImageLayout::Undefined,
            ImageLayout::DepthAttachment,
        );
        backend.cmd_begin_rendering(cmd, &rendering(0, Some(view)));
        backend.cmd_end_rendering(cmd);
        assert_eq!(backend.violations().len(), 1);
        assert_eq!(
            backend.image_layout(image),
            Some(ImageLayout::DepthAttachment)
        );
    }

    #[test]
    fn test_rendering_into_unknown_swapchain_image_is_violation() {
        let backend = DummyBackend::new();
        let pool = backend.create_command_pool().unwrap();
        let cmd = backend.allocate_command_buffer(pool).unwrap();
        backend.begin_command_buffer(cmd).unwrap();

        backend.cmd_begin_rendering(cmd, &rendering(DUMMY_SWAPCHAIN_IMAGES - 1, None));
        assert!(backend.violations().is_empty());
        backend.cmd_begin_rendering(cmd, &rendering(DUMMY_SWAPCHAIN_IMAGES, None));
        assert_eq!(backend.violations().len(), 1);
    }
}
