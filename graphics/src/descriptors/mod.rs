//! Descriptor set allocation.
//!
//! [`DescriptorAllocator`] hands out descriptor sets from a growing list of
//! pools. Callers never see pool exhaustion: a full pool is parked and the
//! allocation is retried once from a fresh one. Pools are only recycled by an
//! explicit [`reset_pools`](DescriptorAllocator::reset_pools), which the frame
//! pacer calls once the owning frame slot's fence has signaled.
//!
//! [`DescriptorLayoutBuilder`] and [`DescriptorWriter`] build layouts and
//! batch writes for the sets the allocator produces.

mod layout;
mod writer;

pub use layout::DescriptorLayoutBuilder;
pub use writer::DescriptorWriter;

use crate::backend::GpuBackend;
use crate::config::PoolSizeRatio;
use crate::error::GraphicsError;
use crate::types::{
    DescriptorPoolHandle, DescriptorPoolSize, DescriptorSetHandle, DescriptorSetLayoutHandle,
};

/// Largest number of sets a single pool is created with.
pub const MAX_SETS_PER_POOL: u32 = 4092;

/// Capacity multiplier from one created pool to the next.
pub const POOL_GROWTH_FACTOR: f64 = 1.5;

/// Set capacity of the `k`-th pool (1-based) an allocator creates.
///
/// Each pool after the first holds 1.5 times the previous one, truncated and
/// capped at [`MAX_SETS_PER_POOL`].
pub fn pool_capacity(initial_sets: u32, k: u32) -> u32 {
    let mut sets = initial_sets.max(1);
    for _ in 1..k {
        if sets >= MAX_SETS_PER_POOL {
            return MAX_SETS_PER_POOL;
        }
        sets = ((sets as f64 * POOL_GROWTH_FACTOR) as u32).min(MAX_SETS_PER_POOL);
    }
    sets
}

/// Pooled descriptor set allocator.
///
/// Pools live on one of two lists. `ready` pools may still have room; `full`
/// pools refused an allocation and are not tried again until the next reset.
#[derive(Debug)]
pub struct DescriptorAllocator {
    ratios: Vec<PoolSizeRatio>,
    initial_sets: u32,
    pools_created: u32,
    ready: Vec<DescriptorPoolHandle>,
    full: Vec<DescriptorPoolHandle>,
}

impl DescriptorAllocator {
    /// Create an allocator and its first pool of `max_sets_hint * 1.5` sets.
    pub fn new(
        backend: &dyn GpuBackend,
        max_sets_hint: u32,
        ratios: &[PoolSizeRatio],
    ) -> Result<Self, GraphicsError> {
        let initial_sets = ((max_sets_hint as f64) * POOL_GROWTH_FACTOR).floor() as u32;
        let mut allocator = Self {
            ratios: ratios.to_vec(),
            initial_sets: initial_sets.max(1),
            pools_created: 0,
            ready: Vec::new(),
            full: Vec::new(),
        };
        let pool = allocator.create_pool(backend)?;
        allocator.ready.push(pool);
        Ok(allocator)
    }

    /// Allocate one set with the given layout.
    ///
    /// An exhausted pool moves to the full list and the allocation is retried
    /// once from another ready pool or a newly created, larger one. Failure of
    /// the retry is reported as [`GraphicsError::DescriptorAllocationFailed`].
    pub fn allocate(
        &mut self,
        backend: &dyn GpuBackend,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<DescriptorSetHandle, GraphicsError> {
        let pool = self.get_pool(backend)?;
        let (pool, result) = match backend.allocate_descriptor_set(pool, layout) {
            Err(GraphicsError::DescriptorPoolExhausted) => {
                self.full.push(pool);
                let retry_pool = self.get_pool(backend)?;
                let result = match backend.allocate_descriptor_set(retry_pool, layout) {
                    Err(GraphicsError::DescriptorPoolExhausted) => {
                        log::error!(
                            "Descriptor layout {} does not fit a fresh pool",
                            layout.as_raw()
                        );
                        Err(GraphicsError::DescriptorAllocationFailed(format!(
                            "layout {} does not fit a fresh pool",
                            layout.as_raw()
                        )))
                    }
                    other => other,
                };
                (retry_pool, result)
            }
            other => (pool, other),
        };
        self.ready.push(pool);
        result
    }

    /// Reset every pool and move all full pools back to the ready list.
    ///
    /// Every set previously allocated becomes invalid.
    pub fn reset_pools(&mut self, backend: &dyn GpuBackend) -> Result<(), GraphicsError> {
        for &pool in &self.ready {
            backend.reset_descriptor_pool(pool)?;
        }
        for &pool in &self.full {
            backend.reset_descriptor_pool(pool)?;
        }
        self.ready.append(&mut self.full);
        Ok(())
    }

    /// Destroy every pool.
    pub fn destroy_pools(&mut self, backend: &dyn GpuBackend) {
        for pool in self.ready.drain(..).chain(self.full.drain(..)) {
            backend.destroy_descriptor_pool(pool);
        }
        log::debug!(
            "Destroyed descriptor allocator after creating {} pools",
            self.pools_created
        );
    }

    /// Number of live pools.
    pub fn pool_count(&self) -> usize {
        self.ready.len() + self.full.len()
    }

    /// Pools that may still have room.
    pub fn ready_pools(&self) -> &[DescriptorPoolHandle] {
        &self.ready
    }

    /// Pools that refused an allocation since the last reset.
    pub fn full_pools(&self) -> &[DescriptorPoolHandle] {
        &self.full
    }

    /// Total number of pools created.
    pub fn pools_created(&self) -> u32 {
        self.pools_created
    }

    /// Set capacity the next created pool will have.
    pub fn next_pool_capacity(&self) -> u32 {
        pool_capacity(self.initial_sets, self.pools_created + 1)
    }

    fn get_pool(&mut self, backend: &dyn GpuBackend) -> Result<DescriptorPoolHandle, GraphicsError> {
        match self.ready.pop() {
            Some(pool) => Ok(pool),
            None => self.create_pool(backend),
        }
    }

    fn create_pool(&mut self, backend: &dyn GpuBackend) -> Result<DescriptorPoolHandle, GraphicsError> {
        let sets = self.next_pool_capacity();
        let sizes: Vec<DescriptorPoolSize> = self
            .ratios
            .iter()
            .map(|ratio| DescriptorPoolSize {
                ty: ratio.ty,
                count: ((ratio.ratio * sets as f32) as u32).max(1),
            })
            .collect();
        let pool = backend.create_descriptor_pool(sets, &sizes)?;
        self.pools_created += 1;
        log::debug!(
            "Created descriptor pool #{} with {} sets",
            self.pools_created,
            sets
        );
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::types::{DescriptorBinding, DescriptorType, ShaderStages};

    fn uniform_layout(backend: &DummyBackend) -> DescriptorSetLayoutHandle {
        backend
            .create_descriptor_set_layout(&[DescriptorBinding {
                binding: 0,
                ty: DescriptorType::UniformBuffer,
                count: 1,
                stages: ShaderStages::VERTEX,
            }])
            .unwrap()
    }

    fn uniform_ratios() -> Vec<PoolSizeRatio> {
        vec![PoolSizeRatio::new(DescriptorType::UniformBuffer, 1.0)]
    }

    #[test]
    fn test_pool_capacity_growth() {
        assert_eq!(pool_capacity(15, 1), 15);
        assert_eq!(pool_capacity(15, 2), 22);
        assert_eq!(pool_capacity(15, 3), 33);
        assert_eq!(pool_capacity(15, 4), 49);
        assert_eq!(pool_capacity(15, 5), 73);
        assert_eq!(pool_capacity(1500, 3), 3375);
        assert_eq!(pool_capacity(1500, 4), MAX_SETS_PER_POOL);
        assert_eq!(pool_capacity(15, 200), MAX_SETS_PER_POOL);
    }

    #[test]
    fn test_pool_capacity_truncates_each_step() {
        // 1.5^3 * 15 = 50.6; stepwise truncation gives 22, 33, 49.
        let capacities: Vec<u32> = (1..=4).map(|k| pool_capacity(15, k)).collect();
        assert_eq!(capacities, vec![15, 22, 33, 49]);
    }

    #[test]
    fn test_first_pool_is_one_and_a_half_hint() {
        let backend = DummyBackend::new();
        let allocator = DescriptorAllocator::new(&backend, 10, &uniform_ratios()).unwrap();
        assert_eq!(allocator.pool_count(), 1);
        assert_eq!(backend.pool_capacity(allocator.ready_pools()[0]), Some(15));
        assert_eq!(
            backend.pool_descriptor_capacity(
                allocator.ready_pools()[0],
                DescriptorType::UniformBuffer
            ),
            Some(15)
        );
    }

    #[test]
    fn test_exhaustion_is_absorbed() {
        let backend = DummyBackend::new();
        let layout = uniform_layout(&backend);
        let mut allocator = DescriptorAllocator::new(&backend, 2, &uniform_ratios()).unwrap();

        for _ in 0..10 {
            allocator.allocate(&backend, layout).unwrap();
        }
        assert!(allocator.pools_created() > 1);
        assert!(!allocator.full_pools().is_empty());
        assert!(backend.violations().is_empty());
    }

    #[test]
    fn test_reset_moves_full_pools_to_ready() {
        let backend = DummyBackend::new();
        let layout = uniform_layout(&backend);
        let mut allocator = DescriptorAllocator::new(&backend, 1, &uniform_ratios()).unwrap();

        allocator.allocate(&backend, layout).unwrap();
        allocator.allocate(&backend, layout).unwrap();
        assert_eq!(allocator.full_pools().len(), 1);

        allocator.reset_pools(&backend).unwrap();
        assert!(allocator.full_pools().is_empty());
        assert_eq!(allocator.ready_pools().len(), 2);
        for &pool in allocator.ready_pools() {
            assert_eq!(backend.pool_allocations(pool), Some(0));
        }
    }

    #[test]
    fn test_layout_that_never_fits_fails_after_retry() {
        let backend = DummyBackend::new();
        let layout = backend
            .create_descriptor_set_layout(&[DescriptorBinding {
                binding: 0,
                ty: DescriptorType::StorageImage,
                count: 1,
                stages: ShaderStages::COMPUTE,
            }])
            .unwrap();
        let mut allocator = DescriptorAllocator::new(&backend, 4, &uniform_ratios()).unwrap();

        let err = allocator.allocate(&backend, layout).unwrap_err();
        assert!(matches!(err, GraphicsError::DescriptorAllocationFailed(_)));
        assert_eq!(allocator.pool_count(), 2);
    }

    #[test]
    fn test_destroy_releases_every_pool() {
        let backend = DummyBackend::new();
        let layout = uniform_layout(&backend);
        let mut allocator = DescriptorAllocator::new(&backend, 1, &uniform_ratios()).unwrap();
        for _ in 0..5 {
            allocator.allocate(&backend, layout).unwrap();
        }

        allocator.destroy_pools(&backend);
        assert_eq!(allocator.pool_count(), 0);
        assert!(backend.live_descriptor_pools().is_empty());
    }
}
