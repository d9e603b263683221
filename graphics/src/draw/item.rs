//! Draw requests produced by scene traversal.

use std::sync::Arc;

use glam::{Mat4, Vec3};

use crate::materials::{MaterialInstance, MaterialPass};
use crate::types::BufferHandle;

/// Axis-aligned bounds with a bounding sphere radius, in mesh space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    /// Center of the box.
    pub origin: Vec3,
    /// Half size of the box along each axis.
    pub extents: Vec3,
    /// Radius of the sphere around `origin` enclosing the box.
    pub sphere_radius: f32,
}

impl Bounds {
    /// Bounds enclosing `points`. Empty input gives zero-sized bounds.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut points = points.into_iter();
        let Some(first) = points.next() else {
            return Self::default();
        };
        let (min, max) = points.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        let extents = (max - min) / 2.0;
        Self {
            origin: (max + min) / 2.0,
            extents,
            sphere_radius: extents.length(),
        }
    }
}

/// One indexed draw of a mesh surface.
#[derive(Debug, Clone)]
pub struct DrawItem {
    /// Number of indices to draw.
    pub index_count: u32,
    /// Offset of the first index in the index buffer.
    pub first_index: u32,
    /// 32-bit index buffer.
    pub index_buffer: BufferHandle,
    /// Device address of the vertex buffer, read through push constants.
    pub vertex_buffer_address: u64,
    /// Material the surface is drawn with.
    pub material: Arc<MaterialInstance>,
    /// Object to world transform.
    pub transform: Mat4,
    /// Mesh-space bounds of the surface.
    pub bounds: Bounds,
}

/// A frame's draws, split by pass. Rebuilt every frame.
#[derive(Debug, Clone, Default)]
pub struct DrawList {
    opaque: Vec<DrawItem>,
    transparent: Vec<DrawItem>,
}

impl DrawList {
    /// Create an empty draw list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a draw to the list of its material's pass.
    pub fn push(&mut self, item: DrawItem) {
        match item.material.pass() {
            MaterialPass::Opaque => self.opaque.push(item),
            MaterialPass::Transparent => self.transparent.push(item),
        }
    }

    /// Add a draw to the opaque list whatever its material's pass.
    pub fn push_opaque(&mut self, item: DrawItem) {
        self.opaque.push(item);
    }

    /// Add a draw to the transparent list whatever its material's pass.
    ///
    /// Lets a blended draw reuse a material that opaque draws also use.
    pub fn push_transparent(&mut self, item: DrawItem) {
        self.transparent.push(item);
    }

    /// Remove every draw, keeping capacity.
    pub fn clear(&mut self) {
        self.opaque.clear();
        self.transparent.clear();
    }

    /// Opaque draws in submission order.
    pub fn opaque(&self) -> &[DrawItem] {
        &self.opaque
    }

    /// Transparent draws in submission order.
    pub fn transparent(&self) -> &[DrawItem] {
        &self.transparent
    }

    /// Total number of draws.
    pub fn len(&self) -> usize {
        self.opaque.len() + self.transparent.len()
    }

    /// Whether the list has no draws.
    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty() && self.transparent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_from_points() {
        let bounds = Bounds::from_points([Vec3::new(-1.0, 0.0, 2.0), Vec3::new(3.0, 2.0, 4.0)]);
        assert_eq!(bounds.origin, Vec3::new(1.0, 1.0, 3.0));
        assert_eq!(bounds.extents, Vec3::new(2.0, 1.0, 1.0));
        assert!((bounds.sphere_radius - 6.0_f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_bounds_of_nothing() {
        assert_eq!(Bounds::from_points(std::iter::empty()), Bounds::default());
    }
}
