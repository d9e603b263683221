//! Scene graph and per-frame scene data.
//!
//! [`SceneGraph`] is an arena of nodes addressed by [`NodeId`]. Each node
//! stores its parent as an optional index and its children as an index list,
//! so the graph owns every node and traversal never follows pointers.
//!
//! ```text
//! refresh_transforms(top):  world = parent.world * local   (roots: top * local)
//! draw(top, list):          every Mesh node emits one DrawItem per surface
//!                           with transform top * world
//! ```

use std::sync::Arc;

use glam::{Mat4, Vec4};

use crate::draw::{DrawItem, DrawList};
use crate::mesh::MeshAsset;
use crate::types::Extent2d;

/// Vertical field of view of [`GpuSceneData::perspective`], in degrees.
pub const FIELD_OF_VIEW_DEGREES: f32 = 70.0;

/// Scene-wide uniforms, bound at set 0 of every material pipeline.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuSceneData {
    pub view: Mat4,
    pub proj: Mat4,
    pub viewproj: Mat4,
    pub ambient_color: Vec4,
    pub sunlight_direction: Vec4,
    pub sunlight_color: Vec4,
}

impl Default for GpuSceneData {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

impl GpuSceneData {
    /// Scene data for a camera, with the default lighting.
    pub fn new(view: Mat4, proj: Mat4) -> Self {
        Self {
            view,
            proj,
            viewproj: proj * view,
            ambient_color: Vec4::splat(0.1),
            sunlight_direction: Vec4::new(0.0, 1.0, 0.5, 1.0),
            sunlight_color: Vec4::ONE,
        }
    }

    /// Reversed-depth perspective projection for the render area, with Y
    /// flipped for Vulkan clip space.
    pub fn perspective(extent: Extent2d) -> Mat4 {
        let aspect = extent.width.max(1) as f32 / extent.height.max(1) as f32;
        let mut proj =
            Mat4::perspective_rh(FIELD_OF_VIEW_DEGREES.to_radians(), aspect, 10000.0, 0.1);
        proj.y_axis.y *= -1.0;
        proj
    }
}

/// Index of a node in a [`SceneGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Position of the node in the arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a node contributes to the frame.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Only transforms its children.
    Group,
    /// Draws every surface of a mesh.
    Mesh(Arc<MeshAsset>),
}

/// One node of the scene graph.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    local_transform: Mat4,
    world_transform: Mat4,
    kind: NodeKind,
}

impl Node {
    /// Node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent node, `None` for roots.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child nodes in insertion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Transform relative to the parent.
    pub fn local_transform(&self) -> Mat4 {
        self.local_transform
    }

    /// Transform relative to the scene root, as of the last refresh.
    pub fn world_transform(&self) -> Mat4 {
        self.world_transform
    }

    /// Node kind.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }
}

/// Arena of scene nodes.
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl SceneGraph {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node under `parent`, or as a root.
    ///
    /// The world transform is valid once [`refresh_transforms`](Self::refresh_transforms)
    /// has run.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is not a node of this scene.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        parent: Option<NodeId>,
        local_transform: Mat4,
        kind: NodeKind,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        match parent {
            Some(parent) => {
                assert!(parent.index() < self.nodes.len(), "unknown parent node");
                self.nodes[parent.index()].children.push(id);
            }
            None => self.roots.push(id),
        }
        self.nodes.push(Node {
            name: name.into(),
            parent,
            children: Vec::new(),
            local_transform,
            world_transform: local_transform,
            kind,
        });
        id
    }

    /// Replace a node's local transform. Returns `false` for unknown nodes.
    pub fn set_local_transform(&mut self, id: NodeId, transform: Mat4) -> bool {
        match self.nodes.get_mut(id.index()) {
            Some(node) => {
                node.local_transform = transform;
                true
            }
            None => false,
        }
    }

    /// Recompute every world transform below `top`.
    pub fn refresh_transforms(&mut self, top: Mat4) {
        let mut stack: Vec<(NodeId, Mat4)> =
            self.roots.iter().rev().map(|&root| (root, top)).collect();
        while let Some((id, parent_world)) = stack.pop() {
            let node = &mut self.nodes[id.index()];
            node.world_transform = parent_world * node.local_transform;
            let world = node.world_transform;
            stack.extend(node.children.iter().rev().map(|&child| (child, world)));
        }
    }

    /// Append a draw for every surface of every mesh node, depth first.
    pub fn draw(&self, top: Mat4, list: &mut DrawList) {
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.index()];
            if let NodeKind::Mesh(mesh) = &node.kind {
                let transform = top * node.world_transform;
                for surface in &mesh.surfaces {
                    list.push(DrawItem {
                        index_count: surface.count,
                        first_index: surface.start_index,
                        index_buffer: mesh.buffers.index_buffer,
                        vertex_buffer_address: mesh.buffers.vertex_buffer_address,
                        material: surface.material.clone(),
                        transform,
                        bounds: surface.bounds,
                    });
                }
            }
            stack.extend(node.children.iter().rev().copied());
        }
    }

    /// Look up a node.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Root nodes in insertion order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the scene has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
