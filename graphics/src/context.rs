//! The render context: one value owning every frame-core component.
//!
//! # Lifecycle
//!
//! ```text
//! init:      frame pacer (slots: fence, semaphores, commands, descriptor pools)
//!            ──► immediate executor ──► global descriptor allocator
//!            ──► depth image + view ──► scene data layout
//!                (recorded into the global deletion queue)
//!
//! draw:      begin frame ──► scene uniform buffer + scene set ──► render
//!            draw list (color + depth) ──► end frame (submit + present)
//!
//! teardown:  wait idle ──► global deletion queue (LIFO)
//!            ──► global descriptor pools ──► immediate executor
//!            ──► frame slots
//! ```
//!
//! Teardown runs in exactly the reverse order of init and must be called
//! explicitly; dropping a context that was not torn down leaks its GPU objects
//! and logs a warning.

use std::time::{Duration, Instant};

use glam::Mat4;

use crate::backend::GpuBackend;
use crate::config::RenderConfig;
use crate::deferred::{DeferredResource, DeletionQueue};
use crate::descriptors::{DescriptorAllocator, DescriptorLayoutBuilder, DescriptorWriter};
use crate::draw::{DrawBatcher, DrawList};
use crate::error::GraphicsError;
use crate::frame::FramePacer;
use crate::immediate::ImmediateExecutor;
use crate::mesh::{GpuMeshBuffers, Vertex, upload_mesh};
use crate::scene::{GpuSceneData, SceneGraph};
use crate::types::{
    BufferDescriptor, CommandBufferHandle, DescriptorSetHandle, DescriptorSetLayoutHandle,
    DescriptorType, ImageDescriptor, ImageHandle, ImageLayout, ImageViewHandle, RenderingInfo,
    ShaderStages,
};
use crate::{frame_mark, profile_plot, profile_scope};

/// Counters and timings of the most recent frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderStats {
    /// Wall time between the starts of the last two frames.
    pub frame_time: Duration,
    /// Time spent in the last [`RenderContext::update_scene`].
    pub scene_update_time: Duration,
    /// Time spent recording the last draw list.
    pub draw_time: Duration,
    /// Indexed draws issued by the last frame.
    pub draw_calls: u32,
    /// Triangles drawn by the last frame.
    pub triangles: u32,
    /// Frames drawn since init.
    pub frame_number: u64,
}

/// Owns the backend and every frame-core component.
pub struct RenderContext<B: GpuBackend> {
    backend: B,
    config: RenderConfig,
    pacer: FramePacer,
    immediate: ImmediateExecutor,
    global_descriptors: DescriptorAllocator,
    global_deletion_queue: DeletionQueue,
    depth_image: ImageHandle,
    depth_view: ImageViewHandle,
    scene_layout: DescriptorSetLayoutHandle,
    scene_data: GpuSceneData,
    batcher: DrawBatcher,
    stats: RenderStats,
    last_frame_start: Option<Instant>,
    torn_down: bool,
}

impl<B: GpuBackend> RenderContext<B> {
    /// Create every component on `backend`.
    ///
    /// Any creation failure is returned as is; the components created before
    /// it are destroyed again.
    pub fn init(backend: B, config: RenderConfig) -> Result<Self, GraphicsError> {
        log::info!(
            "Initializing render context on {} ({} frames in flight)",
            backend.name(),
            config.frames_in_flight
        );

        let mut pacer = FramePacer::new(&backend, &config)?;

        let mut immediate = match ImmediateExecutor::new(&backend, config.immediate_timeout) {
            Ok(immediate) => immediate,
            Err(err) => {
                pacer.destroy(&backend);
                return Err(err);
            }
        };

        let mut global_descriptors = match DescriptorAllocator::new(
            &backend,
            config.global_descriptor_sets,
            &config.global_pool_ratios,
        ) {
            Ok(allocator) => allocator,
            Err(err) => {
                immediate.destroy(&backend);
                pacer.destroy(&backend);
                return Err(err);
            }
        };

        let mut global_deletion_queue = DeletionQueue::new("global deletion queue");
        let globals = GlobalResources::create(&backend, &config, &mut global_deletion_queue);
        let GlobalResources {
            depth_image,
            depth_view,
            scene_layout,
        } = match globals {
            Ok(globals) => globals,
            Err(err) => {
                global_deletion_queue.flush(&backend);
                global_descriptors.destroy_pools(&backend);
                immediate.destroy(&backend);
                pacer.destroy(&backend);
                return Err(err);
            }
        };

        let scene_data =
            GpuSceneData::new(Mat4::IDENTITY, GpuSceneData::perspective(config.extent));
        let context = Self {
            backend,
            config,
            pacer,
            immediate,
            global_descriptors,
            global_deletion_queue,
            depth_image,
            depth_view,
            scene_layout,
            scene_data,
            batcher: DrawBatcher::new(),
            stats: RenderStats::default(),
            last_frame_start: None,
            torn_down: false,
        };

        log::info!("Render context initialized");
        Ok(context)
    }

    /// Rebuild `list` from `scene` and update the scene uniforms for `view`.
    ///
    /// World transforms must already be refreshed.
    pub fn update_scene(&mut self, scene: &SceneGraph, view: Mat4, list: &mut DrawList) {
        profile_scope!("update_scene");
        let start = Instant::now();

        list.clear();
        scene.draw(Mat4::IDENTITY, list);
        self.scene_data = GpuSceneData::new(view, GpuSceneData::perspective(self.config.extent));

        self.stats.scene_update_time = start.elapsed();
    }

    /// Draw one frame.
    ///
    /// Blocks until the current frame slot is free. Every error is fatal.
    pub fn draw(&mut self, list: &DrawList) -> Result<(), GraphicsError> {
        profile_scope!("draw");

        if self.torn_down {
            return Err(GraphicsError::Internal(
                "render context has been torn down".to_string(),
            ));
        }

        let frame_start = Instant::now();
        let backend = &self.backend;
        let token = self.pacer.begin_frame(backend)?;
        let cmd = token.command_buffer();

        let scene_set = self.write_scene_set()?;

        let backend = &self.backend;
        backend.cmd_transition_image(
            cmd,
            token.image_index(),
            ImageLayout::Undefined,
            ImageLayout::ColorAttachment,
        );
        backend.cmd_transition_attachment(
            cmd,
            self.depth_image,
            ImageLayout::Undefined,
            ImageLayout::DepthAttachment,
        );
        backend.cmd_begin_rendering(
            cmd,
            &RenderingInfo {
                image_index: token.image_index(),
                extent: self.config.extent,
                clear_color: self.config.clear_color,
                depth_view: Some(self.depth_view),
            },
        );

        let draw_start = Instant::now();
        let draw_stats = self.batcher.record(backend, cmd, scene_set, list);
        let draw_time = draw_start.elapsed();

        backend.cmd_end_rendering(cmd);
        backend.cmd_transition_image(
            cmd,
            token.image_index(),
            ImageLayout::ColorAttachment,
            ImageLayout::PresentSrc,
        );

        let frame_number = token.frame_number();
        self.pacer.end_frame(backend, token)?;

        if let Some(last) = self.last_frame_start {
            self.stats.frame_time = frame_start.duration_since(last);
        }
        self.last_frame_start = Some(frame_start);
        self.stats.draw_time = draw_time;
        self.stats.draw_calls = draw_stats.draw_calls;
        self.stats.triangles = draw_stats.triangles;
        self.stats.frame_number = frame_number;

        frame_mark!();
        profile_plot!("draw_calls", draw_stats.draw_calls as f64);
        profile_plot!("triangles", draw_stats.triangles as f64);
        Ok(())
    }

    /// Create this frame's scene uniform buffer and the set that points at it.
    fn write_scene_set(&mut self) -> Result<DescriptorSetHandle, GraphicsError> {
        let backend = &self.backend;
        let slot = self
            .pacer
            .current_slot_mut()
            .ok_or_else(|| GraphicsError::Internal("no current frame slot".to_string()))?;

        let size = std::mem::size_of::<GpuSceneData>() as u64;
        let buffer = backend.create_buffer(
            &BufferDescriptor::uniform(size).with_label("scene data"),
        )?;
        // Lives until the slot is next reused, after this frame has completed.
        slot.defer_destroy(buffer);
        backend.write_buffer(buffer, 0, bytemuck::bytes_of(&self.scene_data))?;

        let set = slot.allocate_descriptor_set(backend, self.scene_layout)?;
        DescriptorWriter::new()
            .write_buffer(0, buffer, size, 0, DescriptorType::UniformBuffer)
            .update_set(backend, set);
        Ok(set)
    }

    /// Upload a mesh with the immediate executor.
    ///
    /// The returned buffers are recorded into the global deletion queue and
    /// live until teardown.
    pub fn upload_mesh(
        &mut self,
        indices: &[u32],
        vertices: &[Vertex],
    ) -> Result<GpuMeshBuffers, GraphicsError> {
        let buffers = upload_mesh(&self.backend, &mut self.immediate, indices, vertices)?;
        buffers.defer_destroy(&mut self.global_deletion_queue);
        Ok(buffers)
    }

    /// Run a one-off submission and wait for it.
    pub fn immediate_submit<F>(&mut self, record: F) -> Result<(), GraphicsError>
    where
        F: FnOnce(&dyn GpuBackend, CommandBufferHandle) -> Result<(), GraphicsError>,
    {
        self.immediate.submit(&self.backend, record)
    }

    /// Allocate a set that lives as long as the context, e.g. a material set.
    pub fn allocate_global_set(
        &mut self,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<DescriptorSetHandle, GraphicsError> {
        self.global_descriptors.allocate(&self.backend, layout)
    }

    /// Destroy `resource` at teardown, after every earlier recorded resource
    /// has been destroyed in reverse order.
    pub fn defer_destroy_global(&mut self, resource: impl Into<DeferredResource>) {
        self.global_deletion_queue.record(resource);
    }

    /// Layout of the scene set bound at set 0.
    pub fn scene_layout(&self) -> DescriptorSetLayoutHandle {
        self.scene_layout
    }

    /// Depth attachment every frame renders with.
    pub fn depth_image(&self) -> ImageHandle {
        self.depth_image
    }

    /// View of [`depth_image`](Self::depth_image).
    pub fn depth_view(&self) -> ImageViewHandle {
        self.depth_view
    }

    /// Scene uniforms uploaded by the next [`draw`](Self::draw).
    pub fn scene_data(&self) -> &GpuSceneData {
        &self.scene_data
    }

    /// Mutable access to the scene uniforms.
    pub fn scene_data_mut(&mut self) -> &mut GpuSceneData {
        &mut self.scene_data
    }

    /// The backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The frame pacer.
    pub fn pacer(&self) -> &FramePacer {
        &self.pacer
    }

    /// The configuration the context was created with.
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Counters of the most recent frame.
    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Whether [`teardown`](Self::teardown) has run.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Wait for the GPU and destroy everything in reverse init order.
    ///
    /// Calling it again is a no-op. If waiting fails the objects are still
    /// destroyed and the wait error is returned.
    pub fn teardown(&mut self) -> Result<(), GraphicsError> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;
        log::info!("Tearing down render context");

        let slots_drained = self.pacer.wait_idle(&self.backend);
        let device_idle = self.backend.wait_idle();
        let drained = slots_drained.and(device_idle);
        if let Err(err) = &drained {
            log::error!("Failed to drain GPU work before teardown: {}", err);
        }

        self.global_deletion_queue.flush(&self.backend);
        self.global_descriptors.destroy_pools(&self.backend);
        self.immediate.destroy(&self.backend);
        self.pacer.destroy(&self.backend);

        log::info!("Render context torn down");
        drained
    }
}

/// Objects the context creates once and keeps until teardown.
struct GlobalResources {
    depth_image: ImageHandle,
    depth_view: ImageViewHandle,
    scene_layout: DescriptorSetLayoutHandle,
}

impl GlobalResources {
    /// Create every global object, recording each into `queue` as soon as it
    /// exists so a later failure can flush the ones already made.
    fn create(
        backend: &dyn GpuBackend,
        config: &RenderConfig,
        queue: &mut DeletionQueue,
    ) -> Result<Self, GraphicsError> {
        let depth_image =
            backend.create_image(&ImageDescriptor::depth(config.extent).with_label("depth image"))?;
        queue.record(depth_image);
        let depth_view = backend.create_image_view(depth_image)?;
        queue.record(depth_view);

        let scene_layout = DescriptorLayoutBuilder::new()
            .add_binding(0, DescriptorType::UniformBuffer)
            .build(backend, ShaderStages::VERTEX_FRAGMENT)?;
        queue.record(scene_layout);

        Ok(Self {
            depth_image,
            depth_view,
            scene_layout,
        })
    }
}

impl<B: GpuBackend> Drop for RenderContext<B> {
    fn drop(&mut self) {
        if !self.torn_down {
            log::warn!("RenderContext dropped without teardown; GPU objects leak");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::backend::dummy::Call;
    use crate::types::ImageFormat;

    #[test]
    fn test_init_and_teardown_leave_nothing_alive() {
        let mut context = RenderContext::init(DummyBackend::new(), RenderConfig::default()).unwrap();
        assert_ne!(context.scene_layout(), DescriptorSetLayoutHandle::NULL);
        context.teardown().unwrap();
        assert_eq!(context.backend().live_objects(), 0);
        assert!(context.backend().violations().is_empty());
    }

    /// The destroy call matching an object-creating call.
    fn destroy_call(create: &Call) -> Option<Call> {
        match create {
            Call::CreateFence { fence, .. } => Some(Call::DestroyFence(*fence)),
            Call::CreateSemaphore(semaphore) => Some(Call::DestroySemaphore(*semaphore)),
            Call::CreateCommandPool(pool) => Some(Call::DestroyCommandPool(*pool)),
            Call::CreateDescriptorPool { pool, .. } => Some(Call::DestroyDescriptorPool(*pool)),
            Call::CreateDescriptorSetLayout(layout) => {
                Some(Call::DestroyDescriptorSetLayout(*layout))
            }
            Call::CreateImage { image, .. } => Some(Call::DestroyImage(*image)),
            Call::CreateImageView { view, .. } => Some(Call::DestroyImageView(*view)),
            _ => None,
        }
    }

    fn is_destroy(call: &Call) -> bool {
        matches!(
            call,
            Call::DestroyFence(_)
                | Call::DestroySemaphore(_)
                | Call::DestroyCommandPool(_)
                | Call::DestroyDescriptorPool(_)
                | Call::DestroyDescriptorSetLayout(_)
                | Call::DestroyImage(_)
                | Call::DestroyImageView(_)
        )
    }

    #[test]
    fn test_teardown_reverses_init_order() {
        let mut context = RenderContext::init(
            DummyBackend::new(),
            RenderConfig::default().with_frames_in_flight(2),
        )
        .unwrap();
        let mut expected: Vec<Call> = context
            .backend()
            .calls()
            .iter()
            .filter_map(destroy_call)
            .collect();
        expected.reverse();

        context.backend().clear_calls();
        context.teardown().unwrap();
        let destroyed: Vec<Call> = context
            .backend()
            .calls()
            .into_iter()
            .filter(is_destroy)
            .collect();

        assert_eq!(destroyed, expected);
        assert_eq!(destroyed[0], Call::DestroyDescriptorSetLayout(context.scene_layout()));
        assert_eq!(context.backend().live_objects(), 0);
        assert!(context.backend().violations().is_empty());
    }

    #[test]
    fn test_globals_destroyed_before_slots_after_frames() {
        let mut context = RenderContext::init(DummyBackend::new(), RenderConfig::default()).unwrap();
        let init_calls = context.backend().calls();
        let slot_pools: Vec<Call> = init_calls
            .iter()
            .filter_map(|c| match c {
                Call::CreateCommandPool(pool) => Some(Call::DestroyCommandPool(*pool)),
                _ => None,
            })
            .collect();
        // The immediate executor's pool is created after every slot's.
        let (immediate_pool, slot_pools) = slot_pools.split_last().unwrap();

        context.draw(&DrawList::new()).unwrap();
        context.draw(&DrawList::new()).unwrap();
        context.backend().clear_calls();
        context.teardown().unwrap();

        let calls = context.backend().calls();
        let position = |call: &Call| calls.iter().position(|c| c == call).unwrap();
        let layout = position(&Call::DestroyDescriptorSetLayout(context.scene_layout()));
        let view = position(&Call::DestroyImageView(context.depth_view()));
        let image = position(&Call::DestroyImage(context.depth_image()));
        let immediate = position(immediate_pool);
        assert!(layout < view);
        assert!(view < image);
        assert!(image < immediate);
        assert!(slot_pools.iter().all(|pool| immediate < position(pool)));
        assert_eq!(context.backend().live_objects(), 0);
        assert!(context.backend().violations().is_empty());
    }

    #[test]
    fn test_depth_attachment_cleared_each_frame() {
        let mut context = RenderContext::init(DummyBackend::new(), RenderConfig::default()).unwrap();
        let depth_image = context.depth_image();
        assert_eq!(
            context.backend().image_layout(depth_image),
            Some(ImageLayout::Undefined)
        );
        assert!(context.backend().calls().contains(&Call::CreateImage {
            image: depth_image,
            format: ImageFormat::Depth32Float,
        }));

        for _ in 0..2 {
            context.backend().clear_calls();
            context.draw(&DrawList::new()).unwrap();

            let calls = context.backend().calls();
            let transition = calls
                .iter()
                .position(|c| {
                    *c == Call::TransitionAttachment {
                        image: depth_image,
                        from: ImageLayout::Undefined,
                        to: ImageLayout::DepthAttachment,
                    }
                })
                .unwrap();
            let begin = calls
                .iter()
                .position(|c| {
                    matches!(
                        c,
                        Call::BeginRendering { depth_view: Some(view), .. }
                            if *view == context.depth_view()
                    )
                })
                .unwrap();
            assert!(transition < begin);
        }
        assert_eq!(
            context.backend().image_layout(depth_image),
            Some(ImageLayout::DepthAttachment)
        );

        context.teardown().unwrap();
        assert_eq!(context.backend().live_objects(), 0);
        assert!(context.backend().violations().is_empty());
    }

    #[test]
    fn test_zero_frames_in_flight_rejected() {
        let result = RenderContext::init(
            DummyBackend::new(),
            RenderConfig::default().with_frames_in_flight(0),
        );
        assert!(matches!(
            result,
            Err(GraphicsError::InitializationFailed(_))
        ));
    }

    #[test]
    fn test_draw_empty_list() {
        let mut context = RenderContext::init(DummyBackend::new(), RenderConfig::default()).unwrap();
        context.draw(&DrawList::new()).unwrap();
        context.draw(&DrawList::new()).unwrap();

        let stats = context.stats();
        assert_eq!(stats.frame_number, 2);
        assert_eq!(stats.draw_calls, 0);

        let calls = context.backend().calls();
        assert_eq!(
            calls
                .iter()
                .filter(|c| matches!(c, Call::Present { .. }))
                .count(),
            2
        );
        context.teardown().unwrap();
        assert_eq!(context.backend().live_objects(), 0);
        assert!(context.backend().violations().is_empty());
    }

    #[test]
    fn test_scene_data_written_to_uniform_buffer() {
        let mut context = RenderContext::init(DummyBackend::new(), RenderConfig::default()).unwrap();
        context.scene_data_mut().ambient_color = glam::Vec4::splat(0.5);
        context.draw(&DrawList::new()).unwrap();

        let buffer = context
            .backend()
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::CreateBuffer { buffer, .. } => Some(buffer),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            context.backend().buffer_contents(buffer).unwrap(),
            bytemuck::bytes_of(context.scene_data())
        );
        context.teardown().unwrap();
    }

    #[test]
    fn test_draw_after_teardown_fails() {
        let mut context = RenderContext::init(DummyBackend::new(), RenderConfig::default()).unwrap();
        context.teardown().unwrap();
        context.teardown().unwrap();
        assert!(matches!(
            context.draw(&DrawList::new()),
            Err(GraphicsError::Internal(_))
        ));
    }
}
