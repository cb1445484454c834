use serde::{Deserialize, Serialize};

use crate::{apply_operation, CanvasDocument, CanvasNode, NodeId, NodeMap, NodePatch, Operation, Point};

/// Reversible wrapper around one operation.
///
/// `apply` runs the forward operation through the reducer; `undo` runs the
/// inverse. Update and move commands trust the caller's `from` snapshot, no
/// diffing happens here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CanvasCommand {
    AddNode {
        node: CanvasNode,
    },
    DeleteNode {
        id: NodeId,
        /// Node value as it was when the command last ran.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        captured: Option<CanvasNode>,
    },
    UpdateNode {
        id: NodeId,
        from: NodePatch,
        to: NodePatch,
    },
    MoveNode {
        id: NodeId,
        from: Point,
        to: Point,
    },
    /// Bulk load. Irreversible checkpoint: undo leaves the document as is.
    SetNodes {
        nodes: NodeMap,
    },
}

impl CanvasCommand {
    pub fn add_node(node: CanvasNode) -> Self {
        Self::AddNode { node }
    }

    pub fn delete_node(id: impl Into<NodeId>) -> Self {
        Self::DeleteNode {
            id: id.into(),
            captured: None,
        }
    }

    pub fn update_node(id: impl Into<NodeId>, from: NodePatch, to: NodePatch) -> Self {
        Self::UpdateNode {
            id: id.into(),
            from,
            to,
        }
    }

    pub fn move_node(id: impl Into<NodeId>, from: Point, to: Point) -> Self {
        Self::MoveNode {
            id: id.into(),
            from,
            to,
        }
    }

    pub fn set_nodes(nodes: impl IntoIterator<Item = CanvasNode>) -> Self {
        Self::SetNodes {
            nodes: crate::node_map(nodes),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CanvasCommand::AddNode { .. } => "Add node",
            CanvasCommand::DeleteNode { .. } => "Delete node",
            CanvasCommand::UpdateNode { .. } => "Edit node",
            CanvasCommand::MoveNode { .. } => "Move node",
            CanvasCommand::SetNodes { .. } => "Load canvas",
        }
    }

    pub fn forward_operation(&self) -> Operation {
        match self {
            CanvasCommand::AddNode { node } => Operation::add_node(node.clone()),
            CanvasCommand::DeleteNode { id, .. } => Operation::delete_node(id.clone()),
            CanvasCommand::UpdateNode { id, to, .. } => Operation::update_node(id.clone(), to.clone()),
            CanvasCommand::MoveNode { id, to, .. } => {
                Operation::update_node(id.clone(), NodePatch::position(*to))
            }
            CanvasCommand::SetNodes { nodes } => Operation::SetNodes {
                nodes: nodes.clone(),
            },
        }
    }

    /// Operation that reverses the last `apply`, if there is one.
    ///
    /// `None` for a delete that has not run yet (nothing captured) and for bulk
    /// loads.
    pub fn inverse_operation(&self) -> Option<Operation> {
        match self {
            CanvasCommand::AddNode { node } => Some(Operation::delete_node(node.id.clone())),
            CanvasCommand::DeleteNode { captured, .. } => {
                captured.clone().map(Operation::add_node)
            }
            CanvasCommand::UpdateNode { id, from, .. } => {
                Some(Operation::update_node(id.clone(), from.clone()))
            }
            CanvasCommand::MoveNode { id, from, .. } => {
                Some(Operation::update_node(id.clone(), NodePatch::position(*from)))
            }
            CanvasCommand::SetNodes { .. } => None,
        }
    }

    pub fn apply(&mut self, doc: &CanvasDocument) -> CanvasDocument {
        if let CanvasCommand::DeleteNode { id, captured } = self {
            *captured = doc.node(id).cloned();
        }
        apply_operation(doc, &self.forward_operation())
    }

    pub fn undo(&mut self, doc: &CanvasDocument) -> CanvasDocument {
        match self.inverse_operation() {
            Some(op) => apply_operation(doc, &op),
            None => doc.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeType;

    fn seeded() -> CanvasDocument {
        let doc = CanvasDocument::new("doc");
        apply_operation(
            &doc,
            &Operation::add_node(CanvasNode::new("a", NodeType::Image).at(10.0, 20.0).with_prop("src", "a.png")),
        )
    }

    #[test]
    fn add_then_undo_removes_node() {
        let mut cmd = CanvasCommand::add_node(CanvasNode::new("b", NodeType::Text));
        let doc = cmd.apply(&seeded());
        assert!(doc.contains(&NodeId::from("b")));
        let doc = cmd.undo(&doc);
        assert!(!doc.contains(&NodeId::from("b")));
    }

    #[test]
    fn delete_captures_value_for_undo() {
        let start = seeded();
        let mut cmd = CanvasCommand::delete_node("a");
        let doc = cmd.apply(&start);
        assert!(doc.is_empty());
        let doc = cmd.undo(&doc);
        assert_eq!(doc.nodes, start.nodes);
    }

    #[test]
    fn delete_undo_without_apply_is_noop() {
        let start = seeded();
        let mut cmd = CanvasCommand::delete_node("a");
        let doc = cmd.undo(&start);
        assert_eq!(doc, start);
    }

    #[test]
    fn delete_of_absent_node_captures_nothing() {
        let start = seeded();
        let mut cmd = CanvasCommand::delete_node("ghost");
        let doc = cmd.apply(&start);
        assert_eq!(cmd.inverse_operation(), None);
        assert_eq!(cmd.undo(&doc).nodes, start.nodes);
    }

    #[test]
    fn move_restores_caller_supplied_origin() {
        let mut cmd = CanvasCommand::move_node("a", Point::new(10.0, 20.0), Point::new(50.0, 60.0));
        let doc = cmd.apply(&seeded());
        assert_eq!(doc.node(&NodeId::from("a")).unwrap().position(), Point::new(50.0, 60.0));
        let doc = cmd.undo(&doc);
        assert_eq!(doc.node(&NodeId::from("a")).unwrap().position(), Point::new(10.0, 20.0));
    }

    #[test]
    fn update_undo_uses_from_patch_verbatim() {
        // a wrong "from" is replayed as given
        let mut cmd = CanvasCommand::update_node(
            "a",
            NodePatch::size(1.0, 1.0),
            NodePatch::size(300.0, 200.0),
        );
        let doc = cmd.apply(&seeded());
        let doc = cmd.undo(&doc);
        let node = doc.node(&NodeId::from("a")).unwrap();
        assert_eq!((node.width, node.height), (1.0, 1.0));
    }

    #[test]
    fn set_nodes_undo_is_a_checkpoint() {
        let start = seeded();
        let mut cmd = CanvasCommand::set_nodes([CanvasNode::new("z", NodeType::Frame)]);
        let loaded = cmd.apply(&start);
        let after_undo = cmd.undo(&loaded);
        assert_eq!(after_undo, loaded);
    }
}
