use serde::{Deserialize, Serialize};

use crate::{CanvasNode, NodeId, NodeMap, NodeType, Point, Props};

/// The closed set of document mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    AddNode { node: CanvasNode },
    UpdateNode { id: NodeId, patch: NodePatch },
    DeleteNode { id: NodeId },
    /// Bulk replace, used for hydration and full resync.
    SetNodes { nodes: NodeMap },
}

impl Operation {
    pub fn add_node(node: CanvasNode) -> Self {
        Self::AddNode { node }
    }

    pub fn update_node(id: impl Into<NodeId>, patch: NodePatch) -> Self {
        Self::UpdateNode {
            id: id.into(),
            patch,
        }
    }

    pub fn delete_node(id: impl Into<NodeId>) -> Self {
        Self::DeleteNode { id: id.into() }
    }

    pub fn set_nodes(nodes: impl IntoIterator<Item = CanvasNode>) -> Self {
        Self::SetNodes {
            nodes: crate::node_map(nodes),
        }
    }

    /// Node the operation addresses, `None` for bulk replacement.
    pub fn target(&self) -> Option<&NodeId> {
        match self {
            Operation::AddNode { node } => Some(&node.id),
            Operation::UpdateNode { id, .. } | Operation::DeleteNode { id } => Some(id),
            Operation::SetNodes { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::AddNode { .. } => "ADD_NODE",
            Operation::UpdateNode { .. } => "UPDATE_NODE",
            Operation::DeleteNode { .. } => "DELETE_NODE",
            Operation::SetNodes { .. } => "SET_NODES",
        }
    }
}

/// Shallow patch over a node's top-level fields. A present field replaces the
/// node's value wholesale; `props` is not merged key by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePatch {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Props>,
}

impl NodePatch {
    pub fn position(point: Point) -> Self {
        Self {
            x: Some(point.x),
            y: Some(point.y),
            ..Self::default()
        }
    }

    pub fn size(width: f64, height: f64) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }

    pub fn props(props: Props) -> Self {
        Self {
            props: Some(props),
            ..Self::default()
        }
    }

    /// Every patchable field of `node`, for use as a full before/after snapshot.
    pub fn from_node(node: &CanvasNode) -> Self {
        Self {
            kind: Some(node.kind),
            x: Some(node.x),
            y: Some(node.y),
            width: Some(node.width),
            height: Some(node.height),
            rotation: Some(node.rotation),
            z_index: Some(node.z_index),
            props: Some(node.props.clone()),
        }
    }

    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn with_z_index(mut self, z_index: i64) -> Self {
        self.z_index = Some(z_index);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, node: &mut CanvasNode) {
        if let Some(kind) = self.kind {
            node.kind = kind;
        }
        if let Some(x) = self.x {
            node.x = x;
        }
        if let Some(y) = self.y {
            node.y = y;
        }
        if let Some(width) = self.width {
            node.width = width;
        }
        if let Some(height) = self.height {
            node.height = height;
        }
        if let Some(rotation) = self.rotation {
            node.rotation = rotation;
        }
        if let Some(z_index) = self.z_index {
            node.z_index = z_index;
        }
        if let Some(props) = &self.props {
            node.props = props.clone();
        }
    }
}
