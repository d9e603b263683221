use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use glam::Mat4;

use moon_graphics::types::{BufferHandle, DescriptorSetHandle};
use moon_graphics::{
    Bounds, DrawBatcher, DrawItem, DrawList, DummyBackend, GpuBackend, MaterialId,
    MaterialInstance, MaterialPass, MaterialPipeline,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// `draws` opaque draws spread over `materials` materials and 16 meshes, in a
/// scrambled submission order.
fn opaque_list(backend: &DummyBackend, draws: usize, materials: u32) -> DrawList {
    let pipelines: Vec<Arc<MaterialPipeline>> = (0..4)
        .map(|_| {
            Arc::new(MaterialPipeline::new(
                backend.create_pipeline(),
                backend.create_pipeline_layout(),
            ))
        })
        .collect();
    let instances: Vec<Arc<MaterialInstance>> = (0..materials)
        .map(|id| {
            Arc::new(MaterialInstance::new(
                MaterialId(id),
                pipelines[id as usize % pipelines.len()].clone(),
                DescriptorSetHandle::from_raw(1000 + id as u64),
                MaterialPass::Opaque,
            ))
        })
        .collect();

    let mut list = DrawList::new();
    for i in 0..draws {
        let scrambled = i.wrapping_mul(2_654_435_761) % draws;
        list.push(DrawItem {
            index_count: 36,
            first_index: 0,
            index_buffer: BufferHandle::from_raw(1 + (scrambled % 16) as u64),
            vertex_buffer_address: 0,
            material: instances[scrambled % instances.len()].clone(),
            transform: Mat4::IDENTITY,
            bounds: Bounds::default(),
        });
    }
    list
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

fn bench_sort_opaque(c: &mut Criterion) {
    let backend = DummyBackend::new();
    let mut group = c.benchmark_group("draw_batcher_sort");
    for draws in [100usize, 1_000, 10_000] {
        let list = opaque_list(&backend, draws, 32);
        let mut batcher = DrawBatcher::new();
        group.bench_with_input(BenchmarkId::from_parameter(draws), &list, |b, list| {
            b.iter(|| {
                black_box(batcher.sort_opaque(list).len());
            });
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

fn bench_record(c: &mut Criterion) {
    let backend = DummyBackend::new();
    let pool = backend.create_command_pool().unwrap();
    let command_buffer = backend.allocate_command_buffer(pool).unwrap();
    let list = opaque_list(&backend, 1_000, 32);
    let mut batcher = DrawBatcher::new();

    c.bench_function("draw_batcher_record_1000", |b| {
        b.iter(|| {
            backend.reset_command_buffer(command_buffer).unwrap();
            backend.begin_command_buffer(command_buffer).unwrap();
            let stats = batcher.record(
                &backend,
                command_buffer,
                DescriptorSetHandle::from_raw(1),
                &list,
            );
            backend.end_command_buffer(command_buffer).unwrap();
            backend.clear_calls();
            black_box(stats);
        });
    });
}

criterion_group!(benches, bench_sort_opaque, bench_record);
criterion_main!(benches);
