//! Frame-core integration tests.
//!
//! These drive the public API end to end against the dummy backend and check
//! the recorded call log.
//!
//! # Test Categories
//!
//! - Frame protocol: slot cycling and wait-before-reuse ordering
//! - Deferred destruction: reverse-order flushes
//! - Descriptor allocation: growth, exhaustion and reset
//! - Draw recording: state-sorted opaque draws, ordered transparent draws
//! - Failure paths: stalled GPU and teardown

mod common;

use std::time::Duration;

use glam::Mat4;
use rstest::rstest;

use common::{MaterialFixture, count, draw_item, drawn_index_counts, dummy_context, quad_mesh};
use moon_graphics::backend::dummy::Call;
use moon_graphics::descriptors::{MAX_SETS_PER_POOL, pool_capacity};
use moon_graphics::types::{
    BufferDescriptor, BufferUsage, DescriptorBinding, DescriptorSetLayoutHandle, DescriptorType,
    ShaderStages,
};
use moon_graphics::{
    DescriptorAllocator, DrawList, DummyBackend, GpuBackend, GraphicsError, MaterialPass,
    NodeKind, PoolSizeRatio, RenderConfig, RenderContext, SceneGraph,
};

// ============================================================================
// Frame protocol
// ============================================================================

#[rstest]
#[case::single(1)]
#[case::double(2)]
#[case::triple(3)]
fn test_slots_cycle_modulo_frames_in_flight(#[case] frames_in_flight: usize) {
    let mut context = dummy_context(frames_in_flight);
    let list = DrawList::new();

    for frame in 1..=7 {
        context.draw(&list).unwrap();
        assert_eq!(context.pacer().current_index(), frame % frames_in_flight);
        assert_eq!(context.stats().frame_number, frame as u64);
    }

    context.teardown().unwrap();
    assert!(context.backend().violations().is_empty());
}

#[rstest]
#[case::single(1)]
#[case::double(2)]
#[case::triple(3)]
fn test_slot_reused_only_after_fence_wait(#[case] frames_in_flight: usize) {
    let mut context = dummy_context(frames_in_flight);
    let slots: Vec<_> = context
        .pacer()
        .slots()
        .iter()
        .map(|slot| (slot.render_fence(), slot.command_buffer()))
        .collect();

    let list = DrawList::new();
    for _ in 0..(3 * frames_in_flight) {
        context.draw(&list).unwrap();
    }

    let calls = context.backend().calls();
    for (fence, command_buffer) in slots {
        // Per slot the protocol is a strict repetition of
        // wait -> reset fence -> reset command buffer -> submit.
        let sequence: Vec<&Call> = calls
            .iter()
            .filter(|c| match c {
                Call::WaitFence(f) | Call::ResetFence(f) => *f == fence,
                Call::ResetCommandBuffer(cb) => *cb == command_buffer,
                Call::Submit {
                    command_buffer: cb, ..
                } => *cb == command_buffer,
                _ => false,
            })
            .collect();
        assert_eq!(sequence.len(), 3 * 4);
        for step in sequence.chunks(4) {
            assert_eq!(step[0], &Call::WaitFence(fence));
            assert_eq!(step[1], &Call::ResetFence(fence));
            assert_eq!(step[2], &Call::ResetCommandBuffer(command_buffer));
            assert!(matches!(step[3], Call::Submit { fence: Some(f), .. } if *f == fence));
        }
    }

    context.teardown().unwrap();
    assert!(context.backend().violations().is_empty());
}

#[test]
fn test_zero_frames_in_flight_rejected() {
    common::init_logging();
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
fn test_present_follows_submit() {
    let mut context = dummy_context(2);
    context.draw(&DrawList::new()).unwrap();

    let calls = context.backend().calls();
    let submit = calls
        .iter()
        .position(|c| matches!(c, Call::Submit { .. }))
        .unwrap();
    let present = calls
        .iter()
        .position(|c| matches!(c, Call::Present { .. }))
        .unwrap();
    let end_rendering = calls
        .iter()
        .position(|c| matches!(c, Call::EndRendering))
        .unwrap();
    assert!(end_rendering < submit);
    assert!(submit < present);

    context.teardown().unwrap();
}

// ============================================================================
// Deferred destruction
// ============================================================================

#[test]
fn test_global_queue_destroys_in_reverse_order() {
    let mut context = dummy_context(2);
    let buffers: Vec<_> = (0..3)
        .map(|_| {
            context
                .backend()
                .create_buffer(&BufferDescriptor::new(64, BufferUsage::STORAGE))
                .unwrap()
        })
        .collect();
    for &buffer in &buffers {
        context.defer_destroy_global(buffer);
    }

    context.teardown().unwrap();

    let destroyed: Vec<_> = context
        .backend()
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::DestroyBuffer(buffer) => Some(buffer),
            _ => None,
        })
        .collect();
    assert_eq!(destroyed, vec![buffers[2], buffers[1], buffers[0]]);
    assert_eq!(context.backend().live_objects(), 0);
}

#[test]
fn test_frame_buffers_outlive_their_frame() {
    let mut context = dummy_context(2);
    let list = DrawList::new();

    // Each frame creates one scene uniform buffer. It may only be destroyed
    // when its slot comes around again, after the fence wait.
    context.draw(&list).unwrap();
    context.draw(&list).unwrap();
    let calls = context.backend().calls();
    assert_eq!(count(&calls, |c| matches!(c, Call::CreateBuffer { .. })), 2);
    assert_eq!(count(&calls, |c| matches!(c, Call::DestroyBuffer(_))), 0);

    context.draw(&list).unwrap();
    let calls = context.backend().calls();
    assert_eq!(count(&calls, |c| matches!(c, Call::DestroyBuffer(_))), 1);

    context.teardown().unwrap();
    assert!(context.backend().violations().is_empty());
}

// ============================================================================
// Descriptor allocation
// ============================================================================

fn storage_image_layout(backend: &DummyBackend) -> DescriptorSetLayoutHandle {
    backend
        .create_descriptor_set_layout(&[DescriptorBinding {
            binding: 0,
            ty: DescriptorType::StorageImage,
            count: 1,
            stages: ShaderStages::COMPUTE,
        }])
        .unwrap()
}

#[test]
fn test_sixteen_allocations_use_two_pools() {
    common::init_logging();
    let backend = DummyBackend::new();
    let layout = storage_image_layout(&backend);
    let mut allocator = DescriptorAllocator::new(
        &backend,
        10,
        &[PoolSizeRatio::new(DescriptorType::StorageImage, 1.0)],
    )
    .unwrap();

    let sets: Vec<_> = (0..16)
        .map(|_| allocator.allocate(&backend, layout).unwrap())
        .collect();

    assert_eq!(allocator.pool_count(), 2);
    let first_pool = backend.set_pool(sets[0]).unwrap();
    let second_pool = backend.set_pool(sets[15]).unwrap();
    assert_ne!(first_pool, second_pool);
    assert!(
        sets[..15]
            .iter()
            .all(|&set| backend.set_pool(set) == Some(first_pool))
    );
    assert_eq!(backend.pool_capacity(first_pool), Some(15));
    assert_eq!(backend.pool_allocations(first_pool), Some(15));
    assert_eq!(backend.pool_allocations(second_pool), Some(1));

    allocator.destroy_pools(&backend);
    backend.destroy_descriptor_set_layout(layout);
    assert_eq!(backend.live_objects(), 0);
}

#[test]
fn test_reset_then_allocate_reuses_pools() {
    common::init_logging();
    let backend = DummyBackend::new();
    let layout = storage_image_layout(&backend);
    let mut allocator = DescriptorAllocator::new(
        &backend,
        10,
        &[PoolSizeRatio::new(DescriptorType::StorageImage, 1.0)],
    )
    .unwrap();

    for _ in 0..20 {
        allocator.allocate(&backend, layout).unwrap();
    }
    assert!(!allocator.full_pools().is_empty());

    allocator.reset_pools(&backend).unwrap();
    assert!(allocator.full_pools().is_empty());
    assert_eq!(allocator.ready_pools().len(), 2);

    let set = allocator.allocate(&backend, layout).unwrap();
    let pool = backend.set_pool(set).unwrap();
    assert_eq!(backend.pool_allocations(pool), Some(1));
    assert_eq!(allocator.pools_created(), 2);

    allocator.destroy_pools(&backend);
    backend.destroy_descriptor_set_layout(layout);
}

#[rstest]
#[case::first(15, 1, 15)]
#[case::second(15, 2, 22)]
#[case::third(15, 3, 33)]
#[case::fourth(15, 4, 49)]
#[case::capped(3000, 2, MAX_SETS_PER_POOL)]
#[case::far_capped(15, 40, MAX_SETS_PER_POOL)]
fn test_pool_growth(#[case] initial: u32, #[case] k: u32, #[case] expected: u32) {
    assert_eq!(pool_capacity(initial, k), expected);
}

#[test]
fn test_growing_allocator_never_fails() {
    common::init_logging();
    let backend = DummyBackend::new();
    let layout = storage_image_layout(&backend);
    let mut allocator = DescriptorAllocator::new(
        &backend,
        2,
        &[PoolSizeRatio::new(DescriptorType::StorageImage, 1.0)],
    )
    .unwrap();

    for _ in 0..500 {
        allocator.allocate(&backend, layout).unwrap();
    }
    let capacities: Vec<u32> = backend
        .live_descriptor_pools()
        .into_iter()
        .map(|pool| backend.pool_capacity(pool).unwrap())
        .collect();
    assert!(capacities.windows(2).all(|w| w[0] <= w[1]));
    assert!(capacities.iter().all(|&c| c <= MAX_SETS_PER_POOL));

    allocator.destroy_pools(&backend);
    backend.destroy_descriptor_set_layout(layout);
}

// ============================================================================
// Draw recording
// ============================================================================

#[test]
fn test_opaque_draws_grouped_and_transparent_in_order() {
    let mut context = dummy_context(2);
    let materials = MaterialFixture::new(&mut context);
    let a = materials.material(&mut context, 1, MaterialPass::Opaque);
    let b = materials.material(&mut context, 2, MaterialPass::Opaque);
    let glass = materials.material(&mut context, 3, MaterialPass::Transparent);
    let smoke = materials.material(&mut context, 0, MaterialPass::Transparent);

    let mut list = DrawList::new();
    list.push(draw_item(&a, 100, 3));
    list.push(draw_item(&glass, 300, 12));
    list.push(draw_item(&b, 200, 9));
    list.push(draw_item(&smoke, 400, 15));
    list.push(draw_item(&a, 100, 6));

    context.backend().clear_calls();
    context.draw(&list).unwrap();

    let calls = context.backend().calls();
    assert_eq!(drawn_index_counts(&calls), vec![3, 6, 9, 12, 15]);
    assert_eq!(count(&calls, |c| matches!(c, Call::BindPipeline(_))), 1);
    assert_eq!(
        count(&calls, |c| matches!(
            c,
            Call::BindDescriptorSets { first_set: 1, .. }
        )),
        4
    );
    assert_eq!(count(&calls, |c| matches!(c, Call::BindIndexBuffer(_))), 4);

    let stats = context.stats();
    assert_eq!(stats.draw_calls, 5);
    assert_eq!(stats.triangles, 1 + 2 + 3 + 4 + 5);

    context.teardown().unwrap();
    assert!(context.backend().violations().is_empty());
}

#[test]
fn test_scene_graph_frames() {
    let mut context = dummy_context(2);
    let materials = MaterialFixture::new(&mut context);
    let material = materials.material(&mut context, 1, MaterialPass::Opaque);
    let mesh = quad_mesh(&mut context, "quad", material);

    let mut scene = SceneGraph::new();
    let root = scene.add_node("root", None, Mat4::IDENTITY, NodeKind::Group);
    for i in 0..3 {
        scene.add_node(
            format!("quad {i}"),
            Some(root),
            Mat4::from_translation(glam::Vec3::X * i as f32),
            NodeKind::Mesh(mesh.clone()),
        );
    }

    let mut list = DrawList::new();
    for frame in 0..5 {
        scene.set_local_transform(root, Mat4::from_rotation_y(frame as f32 * 0.1));
        scene.refresh_transforms(Mat4::IDENTITY);
        context.update_scene(&scene, Mat4::IDENTITY, &mut list);
        context.draw(&list).unwrap();
    }

    let stats = context.stats();
    assert_eq!(stats.draw_calls, 3);
    assert_eq!(stats.triangles, 6);
    assert_eq!(stats.frame_number, 5);

    context.teardown().unwrap();
    assert_eq!(context.backend().live_objects(), 0);
    assert!(context.backend().violations().is_empty());
}

// ============================================================================
// Failure paths
// ============================================================================

#[rstest]
#[case::single(1)]
#[case::double(2)]
#[case::triple(3)]
fn test_stalled_gpu_times_out(#[case] frames_in_flight: usize) {
    common::init_logging();
    let mut context = RenderContext::init(
        DummyBackend::new(),
        RenderConfig::default()
            .with_frames_in_flight(frames_in_flight)
            .with_fence_timeout(Duration::from_millis(5)),
    )
    .unwrap();
    context.backend().set_stalled(true);

    let list = DrawList::new();
    for _ in 0..frames_in_flight {
        context.draw(&list).unwrap();
    }
    let err = context.draw(&list).unwrap_err();
    assert_eq!(
        err,
        GraphicsError::Timeout {
            what: "frame fence",
            timeout: Duration::from_millis(5),
        }
    );
    assert!(err.is_fatal());

    // Teardown reports the stalled wait but still releases everything.
    assert!(context.teardown().is_err());
    assert_eq!(context.backend().live_objects(), 0);
    assert!(context.backend().violations().is_empty());
}

#[test]
fn test_teardown_releases_everything() {
    let mut context = dummy_context(3);
    let materials = MaterialFixture::new(&mut context);
    let material = materials.material(&mut context, 1, MaterialPass::Opaque);
    let mesh = quad_mesh(&mut context, "quad", material.clone());

    let mut list = DrawList::new();
    list.push(draw_item(&material, mesh.buffers.index_buffer.as_raw(), 6));
    for _ in 0..10 {
        context.draw(&list).unwrap();
    }

    context.teardown().unwrap();
    assert!(context.is_torn_down());
    assert_eq!(context.backend().live_objects(), 0);
    assert!(context.backend().violations().is_empty());
    assert!(matches!(
        context.draw(&list),
        Err(GraphicsError::Internal(_))
    ));
}
