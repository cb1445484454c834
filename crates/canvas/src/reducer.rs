use crate::{now, CanvasDocument, Operation, Timestamp};

/// Applies `op` to a copy of `doc`.
///
/// Never fails: updates and deletes addressing unknown ids are no-ops, and an
/// add over an existing id overwrites it. Every call bumps `version` by one and
/// stamps `updated_at`, including the no-op cases.
pub fn apply_operation(doc: &CanvasDocument, op: &Operation) -> CanvasDocument {
    apply_operation_at(doc, op, now())
}

/// [`apply_operation`] with an explicit timestamp.
pub fn apply_operation_at(doc: &CanvasDocument, op: &Operation, at: Timestamp) -> CanvasDocument {
    let mut next = doc.clone();

    match op {
        Operation::AddNode { node } => {
            next.nodes.insert(node.id.clone(), node.clone());
        }
        Operation::UpdateNode { id, patch } => {
            if let Some(node) = next.nodes.get_mut(id) {
                patch.apply_to(node);
            }
        }
        Operation::DeleteNode { id } => {
            next.nodes.remove(id);
        }
        Operation::SetNodes { nodes } => {
            // re-key by value so the map invariant holds for any input
            next.nodes = crate::node_map(nodes.values().cloned());
        }
    }

    next.version = doc.version + 1;
    next.updated_at = at;
    next
}

/// Folds a sequence of operations, one version per operation.
pub fn apply_all<'a>(
    doc: &CanvasDocument,
    ops: impl IntoIterator<Item = &'a Operation>,
) -> CanvasDocument {
    ops.into_iter()
        .fold(doc.clone(), |acc, op| apply_operation(&acc, op))
}
