/// JSON frames exchanged with the sequencing server, one socket per project
use canvas::{CanvasNode, Operation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client -> server frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    #[serde(rename = "init")]
    Init { project_id: String },

    #[serde(rename = "generator.create")]
    GeneratorCreate { overlay: Value, project_id: String },

    #[serde(rename = "generator.update")]
    GeneratorUpdate {
        id: String,
        updates: Value,
        project_id: String,
    },

    #[serde(rename = "generator.delete")]
    GeneratorDelete { id: String, project_id: String },

    #[serde(rename = "media.create")]
    MediaCreate { media: Value, project_id: String },

    #[serde(rename = "media.update")]
    MediaUpdate {
        id: String,
        updates: Value,
        project_id: String,
    },

    #[serde(rename = "media.delete")]
    MediaDelete { id: String, project_id: String },

    #[serde(rename = "history.push")]
    HistoryPush {
        op: Operation,
        inverse: Operation,
        project_id: String,
    },

    #[serde(rename = "history.undo")]
    HistoryUndo { project_id: String },

    #[serde(rename = "history.redo")]
    HistoryRedo { project_id: String },

    #[serde(rename = "cursor")]
    Cursor {
        x: f64,
        y: f64,
        author_id: String,
        project_id: String,
    },
}

impl ClientMessage {
    pub fn project_id(&self) -> &str {
        match self {
            ClientMessage::Init { project_id }
            | ClientMessage::GeneratorCreate { project_id, .. }
            | ClientMessage::GeneratorUpdate { project_id, .. }
            | ClientMessage::GeneratorDelete { project_id, .. }
            | ClientMessage::MediaCreate { project_id, .. }
            | ClientMessage::MediaUpdate { project_id, .. }
            | ClientMessage::MediaDelete { project_id, .. }
            | ClientMessage::HistoryPush { project_id, .. }
            | ClientMessage::HistoryUndo { project_id }
            | ClientMessage::HistoryRedo { project_id }
            | ClientMessage::Cursor { project_id, .. } => project_id,
        }
    }
}

/// Server -> client frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    #[serde(rename = "init")]
    Init {
        #[serde(default)]
        nodes: Vec<CanvasNode>,
        #[serde(default)]
        overlays: Vec<Value>,
        #[serde(default)]
        media: Vec<Value>,
        version: u64,
    },

    #[serde(rename = "ack")]
    Ack { version: u64 },

    #[serde(rename = "op")]
    Op { op: Operation, version: u64 },

    #[serde(rename = "generator.create")]
    GeneratorCreate {
        overlay: Value,
        version: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        src: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },

    #[serde(rename = "generator.update")]
    GeneratorUpdate {
        id: String,
        updates: Value,
        version: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        src: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },

    #[serde(rename = "generator.delete")]
    GeneratorDelete {
        id: String,
        version: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        src: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },

    #[serde(rename = "media.create")]
    MediaCreate {
        media: Value,
        version: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        src: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },

    #[serde(rename = "media.update")]
    MediaUpdate {
        id: String,
        updates: Value,
        version: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        src: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },

    #[serde(rename = "media.delete")]
    MediaDelete {
        id: String,
        version: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        src: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },

    #[serde(rename = "history.appended")]
    HistoryAppended { op: Operation, version: u64 },

    #[serde(rename = "history.undone")]
    HistoryUndone { op: Operation, version: u64 },

    #[serde(rename = "history.redone")]
    HistoryRedone { op: Operation, version: u64 },

    /// Presence only; carries no version.
    #[serde(rename = "cursor")]
    Cursor { x: f64, y: f64, author_id: String },
}

/// How a frame interacts with the client's sequence counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sequencing {
    /// Bulk state; sets the counter unconditionally.
    Bootstrap(u64),
    /// Confirms our own send; only ever moves the counter forward.
    Ack(u64),
    /// Must be exactly one past the counter.
    Ordered(u64),
    Unsequenced,
}

impl ServerMessage {
    pub fn sequencing(&self) -> Sequencing {
        match self {
            ServerMessage::Init { version, .. } => Sequencing::Bootstrap(*version),
            ServerMessage::Ack { version } => Sequencing::Ack(*version),
            ServerMessage::Cursor { .. } => Sequencing::Unsequenced,
            ServerMessage::Op { version, .. }
            | ServerMessage::GeneratorCreate { version, .. }
            | ServerMessage::GeneratorUpdate { version, .. }
            | ServerMessage::GeneratorDelete { version, .. }
            | ServerMessage::MediaCreate { version, .. }
            | ServerMessage::MediaUpdate { version, .. }
            | ServerMessage::MediaDelete { version, .. }
            | ServerMessage::HistoryAppended { version, .. }
            | ServerMessage::HistoryUndone { version, .. }
            | ServerMessage::HistoryRedone { version, .. } => Sequencing::Ordered(*version),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Init { .. } => "init",
            ServerMessage::Ack { .. } => "ack",
            ServerMessage::Op { .. } => "op",
            ServerMessage::GeneratorCreate { .. } => "generator.create",
            ServerMessage::GeneratorUpdate { .. } => "generator.update",
            ServerMessage::GeneratorDelete { .. } => "generator.delete",
            ServerMessage::MediaCreate { .. } => "media.create",
            ServerMessage::MediaUpdate { .. } => "media.update",
            ServerMessage::MediaDelete { .. } => "media.delete",
            ServerMessage::HistoryAppended { .. } => "history.appended",
            ServerMessage::HistoryUndone { .. } => "history.undone",
            ServerMessage::HistoryRedone { .. } => "history.redone",
            ServerMessage::Cursor { .. } => "cursor",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas::{CanvasNode, NodeType};
    use serde_json::json;

    #[test]
    fn client_frames_use_dotted_types_and_camel_case() {
        let msg = ClientMessage::GeneratorUpdate {
            id: "g1".into(),
            updates: json!({"prompt": "sky"}),
            project_id: "p1".into(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "generator.update", "id": "g1", "updates": {"prompt": "sky"}, "projectId": "p1"})
        );
    }

    #[test]
    fn history_push_embeds_operations() {
        let msg = ClientMessage::HistoryPush {
            op: Operation::add_node(CanvasNode::new("a", NodeType::Text)),
            inverse: Operation::delete_node("a"),
            project_id: "p1".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "history.push");
        assert_eq!(value["op"]["type"], "ADD_NODE");
        assert_eq!(value["inverse"], json!({"type": "DELETE_NODE", "id": "a"}));
    }

    #[test]
    fn server_frames_classify_sequencing() {
        let init: ServerMessage =
            serde_json::from_str(r#"{"type":"init","overlays":[],"media":[],"version":7}"#).unwrap();
        assert_eq!(init.sequencing(), Sequencing::Bootstrap(7));

        let ack: ServerMessage = serde_json::from_str(r#"{"type":"ack","version":3}"#).unwrap();
        assert_eq!(ack.sequencing(), Sequencing::Ack(3));

        let created: ServerMessage = serde_json::from_str(
            r#"{"type":"generator.create","overlay":{"id":"g"},"version":4,"src":"c1","seq":2}"#,
        )
        .unwrap();
        assert_eq!(created.sequencing(), Sequencing::Ordered(4));

        let cursor: ServerMessage =
            serde_json::from_str(r#"{"type":"cursor","x":1,"y":2,"authorId":"u"}"#).unwrap();
        assert_eq!(cursor.sequencing(), Sequencing::Unsequenced);
    }

    #[test]
    fn init_tolerates_missing_lists() {
        let init: ServerMessage = serde_json::from_str(r#"{"type":"init","version":0}"#).unwrap();
        assert_eq!(
            init,
            ServerMessage::Init {
                nodes: vec![],
                overlays: vec![],
                media: vec![],
                version: 0
            }
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ServerMessage>(r#"{"type":"bogus","version":1}"#).is_err());
    }
}
