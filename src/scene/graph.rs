use std::sync::Arc;

use ultraviolet::Mat4;

use crate::transform::Transform;

use super::{MeshInstance, SceneCamera, SceneGraphAnimation, SceneLight, SkinnedMeshInstance};

/// Handle of a node inside one [`SceneGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// The payload of a node. A node has at most one.
#[derive(Clone, Debug)]
pub enum SceneLeaf {
    MeshInstance(MeshInstance),
    SkinnedMeshInstance(Arc<SkinnedMeshInstance>),
    /// Placed on joint nodes. Points at the node that holds the skinned instance.
    SkinnedMeshReference { instance: NodeId },
    Camera(Arc<SceneCamera>),
    Light(Arc<SceneLight>),
    Animation(Arc<SceneGraphAnimation>),
}

#[derive(Clone, Debug, Default)]
pub struct SceneGraphNode {
    pub name: String,
    pub transform: Transform,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    leaf: Option<SceneLeaf>,
}

impl SceneGraphNode {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn leaf(&self) -> Option<&SceneLeaf> {
        self.leaf.as_ref()
    }
}

/// Nodes live in an arena and refer to each other with [`NodeId`]s.
#[derive(Clone, Debug)]
pub struct SceneGraph {
    nodes: Vec<SceneGraphNode>,
    root: NodeId,
}

impl SceneGraph {
    pub fn new(root_name: impl Into<String>) -> Self {
        let root = SceneGraphNode {
            name: root_name.into(),
            ..Default::default()
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Creates a node that isn't attached to anything yet.
    pub fn create_node(&mut self, name: impl Into<String>) -> NodeId {
        self.nodes.push(SceneGraphNode {
            name: name.into(),
            ..Default::default()
        });
        NodeId(self.nodes.len() - 1)
    }

    pub fn create_child(&mut self, parent: NodeId, name: impl Into<String>) -> NodeId {
        let child = self.create_node(name);
        self.attach(parent, child);
        child
    }

    /// Moves `child` under `parent`, detaching it from its previous parent.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) {
        if let Some(old_parent) = self.nodes[child.0].parent.take() {
            self.nodes[old_parent.0].children.retain(|c| *c != child);
        }
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn node(&self, id: NodeId) -> &SceneGraphNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut SceneGraphNode {
        &mut self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&SceneGraphNode> {
        self.nodes.get(id.0)
    }

    /// Replaces the leaf of a node and returns the old one.
    pub fn set_leaf(&mut self, id: NodeId, leaf: SceneLeaf) -> Option<SceneLeaf> {
        self.nodes[id.0].leaf.replace(leaf)
    }

    pub fn leaf(&self, id: NodeId) -> Option<&SceneLeaf> {
        self.nodes[id.0].leaf.as_ref()
    }

    /// Depth first, parents before children, children in order.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            graph: self,
            stack: vec![self.root],
        }
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.walk().find(|id| self.node(*id).name == name)
    }

    pub fn local_matrix(&self, id: NodeId) -> Mat4 {
        self.node(id).transform.to_matrix()
    }

    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let mut matrix = self.local_matrix(id);
        let mut current = self.node(id).parent;
        while let Some(parent) = current {
            matrix = self.local_matrix(parent) * matrix;
            current = self.node(parent).parent;
        }
        matrix
    }
}

pub struct Walk<'a> {
    graph: &'a SceneGraph,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.graph.node(id).children.iter().rev().copied());
        Some(id)
    }
}
