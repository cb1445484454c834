//! Per-project sequencing state, free of any socket handling.

use canvas::{apply_operation, CanvasDocument, Operation};
use realtime::{ClientMessage, ServerMessage};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

pub type ClientId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Sender,
    Others,
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub target: Target,
    pub message: ServerMessage,
}

impl Delivery {
    fn new(target: Target, message: ServerMessage) -> Self {
        Self { target, message }
    }
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    op: Operation,
    inverse: Operation,
}

/// One project: a single version counter imposing a total order on every
/// mutation, the current nodes, overlays and media, and the shared undo/redo
/// stacks. History operations are folded into `document` so `init` can
/// rebuild a client from scratch.
#[derive(Debug)]
pub struct Room {
    version: u64,
    document: CanvasDocument,
    overlays: BTreeMap<String, Value>,
    media: BTreeMap<String, Value>,
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    seqs: HashMap<ClientId, u64>,
}

impl Default for Room {
    fn default() -> Self {
        Self {
            version: 0,
            document: CanvasDocument::empty(),
            overlays: BTreeMap::new(),
            media: BTreeMap::new(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            seqs: HashMap::new(),
        }
    }
}

impl Room {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(&self) -> &CanvasDocument {
        &self.document
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn overlay(&self, id: &str) -> Option<&Value> {
        self.overlays.get(id)
    }

    pub fn media_item(&self, id: &str) -> Option<&Value> {
        self.media.get(id)
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn forget(&mut self, client: &str) {
        self.seqs.remove(client);
    }

    pub fn handle(&mut self, from: &str, message: ClientMessage) -> Vec<Delivery> {
        match message {
            ClientMessage::Init { .. } => vec![Delivery::new(
                Target::Sender,
                ServerMessage::Init {
                    nodes: self.document.sorted_by_z().into_iter().cloned().collect(),
                    overlays: self.overlays.values().cloned().collect(),
                    media: self.media.values().cloned().collect(),
                    version: self.version,
                },
            )],

            ClientMessage::GeneratorCreate { overlay, .. } => {
                let overlay = upsert(&mut self.overlays, overlay);
                let (version, src, seq) = self.stamp(from);
                self.broadcast(
                    version,
                    ServerMessage::GeneratorCreate {
                        overlay,
                        version,
                        src,
                        seq,
                    },
                )
            }
            ClientMessage::GeneratorUpdate { id, updates, .. } => {
                merge(&mut self.overlays, &id, &updates);
                let (version, src, seq) = self.stamp(from);
                self.broadcast(
                    version,
                    ServerMessage::GeneratorUpdate {
                        id,
                        updates,
                        version,
                        src,
                        seq,
                    },
                )
            }
            ClientMessage::GeneratorDelete { id, .. } => {
                self.overlays.remove(&id);
                let (version, src, seq) = self.stamp(from);
                self.broadcast(
                    version,
                    ServerMessage::GeneratorDelete {
                        id,
                        version,
                        src,
                        seq,
                    },
                )
            }

            ClientMessage::MediaCreate { media, .. } => {
                let media = upsert(&mut self.media, media);
                let (version, src, seq) = self.stamp(from);
                self.broadcast(
                    version,
                    ServerMessage::MediaCreate {
                        media,
                        version,
                        src,
                        seq,
                    },
                )
            }
            ClientMessage::MediaUpdate { id, updates, .. } => {
                merge(&mut self.media, &id, &updates);
                let (version, src, seq) = self.stamp(from);
                self.broadcast(
                    version,
                    ServerMessage::MediaUpdate {
                        id,
                        updates,
                        version,
                        src,
                        seq,
                    },
                )
            }
            ClientMessage::MediaDelete { id, .. } => {
                self.media.remove(&id);
                let (version, src, seq) = self.stamp(from);
                self.broadcast(
                    version,
                    ServerMessage::MediaDelete {
                        id,
                        version,
                        src,
                        seq,
                    },
                )
            }

            ClientMessage::HistoryPush { op, inverse, .. } => {
                self.document = apply_operation(&self.document, &op);
                self.undo_stack.push(HistoryEntry {
                    op: op.clone(),
                    inverse,
                });
                self.redo_stack.clear();
                self.version += 1;
                let version = self.version;
                self.broadcast(version, ServerMessage::HistoryAppended { op, version })
            }
            ClientMessage::HistoryUndo { .. } => {
                let Some(entry) = self.undo_stack.pop() else {
                    return Vec::new();
                };
                self.document = apply_operation(&self.document, &entry.inverse);
                self.version += 1;
                let message = ServerMessage::HistoryUndone {
                    op: entry.inverse.clone(),
                    version: self.version,
                };
                self.redo_stack.push(entry);
                vec![Delivery::new(Target::All, message)]
            }
            ClientMessage::HistoryRedo { .. } => {
                let Some(entry) = self.redo_stack.pop() else {
                    return Vec::new();
                };
                self.document = apply_operation(&self.document, &entry.op);
                self.version += 1;
                let message = ServerMessage::HistoryRedone {
                    op: entry.op.clone(),
                    version: self.version,
                };
                self.undo_stack.push(entry);
                vec![Delivery::new(Target::All, message)]
            }

            ClientMessage::Cursor { x, y, author_id, .. } => vec![Delivery::new(
                Target::Others,
                ServerMessage::Cursor { x, y, author_id },
            )],
        }
    }

    /// Next version plus the sender's origin stamp.
    fn stamp(&mut self, from: &str) -> (u64, Option<String>, Option<u64>) {
        self.version += 1;
        let seq = self.seqs.entry(from.to_string()).or_insert(0);
        *seq += 1;
        (self.version, Some(from.to_string()), Some(*seq))
    }

    /// Mutation fan-out: everyone else gets the message, the sender an ack.
    fn broadcast(&self, version: u64, message: ServerMessage) -> Vec<Delivery> {
        vec![
            Delivery::new(Target::Sender, ServerMessage::Ack { version }),
            Delivery::new(Target::Others, message),
        ]
    }
}

/// Stores an entity under its `id`, assigning one when missing.
fn upsert(items: &mut BTreeMap<String, Value>, mut item: Value) -> Value {
    let id = match item.get("id").and_then(Value::as_str) {
        Some(id) => id.to_string(),
        None => {
            let id = Uuid::new_v4().to_string();
            if let Value::Object(map) = &mut item {
                map.insert("id".into(), Value::String(id.clone()));
            }
            id
        }
    };
    items.insert(id, item.clone());
    item
}

/// Shallow merge of `updates` into the stored entity.
fn merge(items: &mut BTreeMap<String, Value>, id: &str, updates: &Value) {
    let (Some(Value::Object(target)), Value::Object(fields)) = (items.get_mut(id), updates) else {
        return;
    };
    for (key, value) in fields {
        target.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas::{CanvasNode, NodeType};
    use serde_json::json;

    fn pid() -> String {
        "p1".to_string()
    }

    #[test]
    fn init_reports_current_state() {
        let mut room = Room::new();
        room.handle("a", ClientMessage::MediaCreate { media: json!({"id": "m1"}), project_id: pid() });
        let out = room.handle("b", ClientMessage::Init { project_id: pid() });
        assert_eq!(
            out,
            vec![Delivery::new(
                Target::Sender,
                ServerMessage::Init {
                    nodes: vec![],
                    overlays: vec![],
                    media: vec![json!({"id": "m1"})],
                    version: 1
                }
            )]
        );
    }

    #[test]
    fn mutations_ack_sender_and_stamp_broadcast() {
        let mut room = Room::new();
        room.handle("a", ClientMessage::GeneratorCreate { overlay: json!({"id": "g1"}), project_id: pid() });
        let out = room.handle(
            "a",
            ClientMessage::GeneratorUpdate { id: "g1".into(), updates: json!({"prompt": "sea"}), project_id: pid() },
        );
        assert_eq!(out[0], Delivery::new(Target::Sender, ServerMessage::Ack { version: 2 }));
        assert_eq!(
            out[1],
            Delivery::new(
                Target::Others,
                ServerMessage::GeneratorUpdate {
                    id: "g1".into(),
                    updates: json!({"prompt": "sea"}),
                    version: 2,
                    src: Some("a".into()),
                    seq: Some(2),
                }
            )
        );
        assert_eq!(room.overlay("g1"), Some(&json!({"id": "g1", "prompt": "sea"})));
    }

    #[test]
    fn create_without_id_gets_one() {
        let mut room = Room::new();
        let out = room.handle("a", ClientMessage::MediaCreate { media: json!({"url": "x"}), project_id: pid() });
        let ServerMessage::MediaCreate { media, .. } = &out[1].message else {
            panic!("expected media.create, got {:?}", out[1]);
        };
        let id = media["id"].as_str().unwrap();
        assert!(room.media_item(id).is_some());
    }

    #[test]
    fn shared_history_moves_between_stacks() {
        let mut room = Room::new();
        let op = Operation::add_node(CanvasNode::new("n", NodeType::Text));
        let inverse = Operation::delete_node("n");
        room.handle("a", ClientMessage::HistoryPush { op: op.clone(), inverse: inverse.clone(), project_id: pid() });

        let undone = room.handle("b", ClientMessage::HistoryUndo { project_id: pid() });
        assert_eq!(
            undone,
            vec![Delivery::new(Target::All, ServerMessage::HistoryUndone { op: inverse, version: 2 })]
        );
        assert_eq!((room.undo_depth(), room.redo_depth()), (0, 1));

        let redone = room.handle("a", ClientMessage::HistoryRedo { project_id: pid() });
        assert_eq!(
            redone,
            vec![Delivery::new(Target::All, ServerMessage::HistoryRedone { op, version: 3 })]
        );
    }

    #[test]
    fn init_carries_nodes_built_by_shared_history() {
        let mut room = Room::new();
        let node = CanvasNode::new("n1", NodeType::Text).with_prop("text", "hi");
        room.handle(
            "a",
            ClientMessage::HistoryPush {
                op: Operation::add_node(node.clone()),
                inverse: Operation::delete_node("n1"),
                project_id: pid(),
            },
        );

        let init = |room: &mut Room| match room.handle("b", ClientMessage::Init { project_id: pid() }).remove(0).message {
            ServerMessage::Init { nodes, version, .. } => (nodes, version),
            other => panic!("expected init, got {other:?}"),
        };
        assert_eq!(init(&mut room), (vec![node.clone()], 1));

        room.handle("b", ClientMessage::HistoryUndo { project_id: pid() });
        assert_eq!(init(&mut room), (vec![], 2));

        room.handle("a", ClientMessage::HistoryRedo { project_id: pid() });
        assert_eq!(init(&mut room), (vec![node], 3));
    }

    #[test]
    fn push_clears_shared_redo_and_empty_undo_is_noop() {
        let mut room = Room::new();
        assert!(room.handle("a", ClientMessage::HistoryUndo { project_id: pid() }).is_empty());
        assert_eq!(room.version(), 0);

        let push = |id: &str| ClientMessage::HistoryPush {
            op: Operation::delete_node(id),
            inverse: Operation::delete_node(id),
            project_id: pid(),
        };
        room.handle("a", push("x"));
        room.handle("a", ClientMessage::HistoryUndo { project_id: pid() });
        room.handle("b", push("y"));
        assert_eq!(room.redo_depth(), 0);
        assert!(room.handle("a", ClientMessage::HistoryRedo { project_id: pid() }).is_empty());
    }

    #[test]
    fn cursor_is_relayed_without_version() {
        let mut room = Room::new();
        let out = room.handle(
            "a",
            ClientMessage::Cursor { x: 1.0, y: 2.0, author_id: "u".into(), project_id: pid() },
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].target, Target::Others);
        assert_eq!(room.version(), 0);
    }
}
