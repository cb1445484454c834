use canvas::{CanvasNode, Operation};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{ClientMessage, SequenceCheck, Sequencer, Sequencing, ServerMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Socket open, waiting for the first `init`.
    Connected,
    Synced,
    /// A gap was detected. Local state is invalid until the next `init`.
    Resyncing,
}

impl ConnectionState {
    /// Whether the socket is open and frames can be written.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::Synced | ConnectionState::Resyncing
        )
    }
}

/// Events delivered to subscribers, in server order.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    Connected,
    Disconnected,
    /// Full authoritative state; replaces everything local.
    Init {
        nodes: Vec<CanvasNode>,
        overlays: Vec<Value>,
        media: Vec<Value>,
        version: u64,
    },
    /// Missed messages; discard local state and wait for the following `Init`.
    SyncRequired { expected: u64, received: u64 },
    Op { op: Operation, version: u64 },
    GeneratorCreated {
        overlay: Value,
        version: u64,
        src: Option<String>,
        seq: Option<u64>,
    },
    GeneratorUpdated {
        id: String,
        updates: Value,
        version: u64,
        src: Option<String>,
        seq: Option<u64>,
    },
    GeneratorDeleted {
        id: String,
        version: u64,
        src: Option<String>,
        seq: Option<u64>,
    },
    MediaCreated {
        media: Value,
        version: u64,
        src: Option<String>,
        seq: Option<u64>,
    },
    MediaUpdated {
        id: String,
        updates: Value,
        version: u64,
        src: Option<String>,
        seq: Option<u64>,
    },
    MediaDeleted {
        id: String,
        version: u64,
        src: Option<String>,
        seq: Option<u64>,
    },
    HistoryAppended { op: Operation, version: u64 },
    HistoryUndone { op: Operation, version: u64 },
    HistoryRedone { op: Operation, version: u64 },
    Cursor { x: f64, y: f64, author_id: String },
}

impl RealtimeEvent {
    /// Server-ordered operation carried by the event, if any.
    pub fn operation(&self) -> Option<&Operation> {
        match self {
            RealtimeEvent::Op { op, .. }
            | RealtimeEvent::HistoryAppended { op, .. }
            | RealtimeEvent::HistoryUndone { op, .. }
            | RealtimeEvent::HistoryRedone { op, .. } => Some(op),
            _ => None,
        }
    }
}

impl ServerMessage {
    /// Subscriber-facing event for this frame. Acks are consumed by the
    /// sequencer and have none.
    pub fn into_event(self) -> Option<RealtimeEvent> {
        let event = match self {
            ServerMessage::Init {
                nodes,
                overlays,
                media,
                version,
            } => RealtimeEvent::Init {
                nodes,
                overlays,
                media,
                version,
            },
            ServerMessage::Ack { .. } => return None,
            ServerMessage::Op { op, version } => RealtimeEvent::Op { op, version },
            ServerMessage::GeneratorCreate {
                overlay,
                version,
                src,
                seq,
            } => RealtimeEvent::GeneratorCreated {
                overlay,
                version,
                src,
                seq,
            },
            ServerMessage::GeneratorUpdate {
                id,
                updates,
                version,
                src,
                seq,
            } => RealtimeEvent::GeneratorUpdated {
                id,
                updates,
                version,
                src,
                seq,
            },
            ServerMessage::GeneratorDelete {
                id,
                version,
                src,
                seq,
            } => RealtimeEvent::GeneratorDeleted {
                id,
                version,
                src,
                seq,
            },
            ServerMessage::MediaCreate {
                media,
                version,
                src,
                seq,
            } => RealtimeEvent::MediaCreated {
                media,
                version,
                src,
                seq,
            },
            ServerMessage::MediaUpdate {
                id,
                updates,
                version,
                src,
                seq,
            } => RealtimeEvent::MediaUpdated {
                id,
                updates,
                version,
                src,
                seq,
            },
            ServerMessage::MediaDelete {
                id,
                version,
                src,
                seq,
            } => RealtimeEvent::MediaDeleted {
                id,
                version,
                src,
                seq,
            },
            ServerMessage::HistoryAppended { op, version } => {
                RealtimeEvent::HistoryAppended { op, version }
            }
            ServerMessage::HistoryUndone { op, version } => {
                RealtimeEvent::HistoryUndone { op, version }
            }
            ServerMessage::HistoryRedone { op, version } => {
                RealtimeEvent::HistoryRedone { op, version }
            }
            ServerMessage::Cursor { x, y, author_id } => RealtimeEvent::Cursor { x, y, author_id },
        };
        Some(event)
    }
}

/// What the transport has to do after feeding the engine one input.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Step {
    pub events: Vec<RealtimeEvent>,
    pub outgoing: Vec<ClientMessage>,
}

impl Step {
    fn event(event: RealtimeEvent) -> Self {
        Self {
            events: vec![event],
            outgoing: Vec::new(),
        }
    }

    fn deliver(message: ServerMessage) -> Self {
        Self {
            events: message.into_event().into_iter().collect(),
            outgoing: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.outgoing.is_empty()
    }
}

/// Socket-free protocol state machine for one project connection.
///
/// The transport feeds it socket lifecycle callbacks and raw text frames and
/// carries out the returned [`Step`]s.
#[derive(Debug, Clone)]
pub struct ProtocolEngine {
    project_id: String,
    state: ConnectionState,
    sequencer: Sequencer,
}

impl ProtocolEngine {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            state: ConnectionState::Disconnected,
            sequencer: Sequencer::default(),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn client_version(&self) -> u64 {
        self.sequencer.client_version()
    }

    pub fn begin_connect(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    pub fn on_open(&mut self) -> Step {
        info!(project = %self.project_id, "realtime socket open");
        self.state = ConnectionState::Connected;
        Step {
            events: vec![RealtimeEvent::Connected],
            outgoing: vec![self.init_request()],
        }
    }

    /// Socket error or close. Emits `Disconnected` once per connection.
    pub fn on_closed(&mut self) -> Step {
        if self.state == ConnectionState::Disconnected {
            return Step::default();
        }
        info!(project = %self.project_id, "realtime socket closed");
        self.state = ConnectionState::Disconnected;
        Step::event(RealtimeEvent::Disconnected)
    }

    /// Parses and handles one text frame. Malformed frames are logged and dropped.
    pub fn on_frame(&mut self, text: &str) -> Step {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(message) => self.on_message(message),
            Err(err) => {
                warn!(%err, "dropping malformed realtime frame");
                Step::default()
            }
        }
    }

    pub fn on_message(&mut self, message: ServerMessage) -> Step {
        match message.sequencing() {
            Sequencing::Bootstrap(version) => {
                self.sequencer.reset(version);
                self.state = ConnectionState::Synced;
                debug!(version, "realtime init applied");
                Step::deliver(message)
            }
            Sequencing::Ack(version) => {
                if self.sequencer.ratchet(version) {
                    debug!(version, "ack advanced client version");
                }
                Step::default()
            }
            Sequencing::Unsequenced => Step::deliver(message),
            Sequencing::Ordered(version) => self.on_ordered(message, version),
        }
    }

    fn on_ordered(&mut self, message: ServerMessage, version: u64) -> Step {
        if self.state == ConnectionState::Resyncing {
            debug!(version, kind = message.kind(), "awaiting resync, dropping message");
            return Step::default();
        }

        match self.sequencer.validate(version) {
            SequenceCheck::Accept => Step::deliver(message),
            SequenceCheck::Gap { expected, received } => {
                warn!(expected, received, "sequence gap, requesting full resync");
                self.state = ConnectionState::Resyncing;
                Step {
                    events: vec![RealtimeEvent::SyncRequired { expected, received }],
                    outgoing: vec![self.init_request()],
                }
            }
            SequenceCheck::Stale { current, received } => {
                debug!(current, received, "dropping stale message");
                Step::default()
            }
        }
    }

    fn init_request(&self) -> ClientMessage {
        ClientMessage::Init {
            project_id: self.project_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synced(version: u64) -> ProtocolEngine {
        let mut engine = ProtocolEngine::new("p1");
        engine.begin_connect();
        engine.on_open();
        engine.on_frame(&format!(r#"{{"type":"init","overlays":[],"media":[],"version":{version}}}"#));
        engine
    }

    fn generator_delete(version: u64) -> String {
        format!(r#"{{"type":"generator.delete","id":"g{version}","version":{version}}}"#)
    }

    #[test]
    fn open_emits_connected_then_requests_init() {
        let mut engine = ProtocolEngine::new("p1");
        engine.begin_connect();
        assert_eq!(engine.state(), ConnectionState::Connecting);
        let step = engine.on_open();
        assert_eq!(step.events, vec![RealtimeEvent::Connected]);
        assert_eq!(step.outgoing, vec![ClientMessage::Init { project_id: "p1".into() }]);
        assert_eq!(engine.state(), ConnectionState::Connected);
    }

    #[test]
    fn init_sets_version_and_syncs() {
        let engine = synced(12);
        assert_eq!(engine.state(), ConnectionState::Synced);
        assert_eq!(engine.client_version(), 12);
    }

    #[test]
    fn gap_enters_resync_and_drops_until_init() {
        let mut engine = synced(0);
        assert_eq!(engine.on_frame(&generator_delete(1)).events.len(), 1);
        assert_eq!(engine.on_frame(&generator_delete(2)).events.len(), 1);

        let step = engine.on_frame(&generator_delete(4));
        assert_eq!(
            step.events,
            vec![RealtimeEvent::SyncRequired { expected: 3, received: 4 }]
        );
        assert_eq!(step.outgoing, vec![ClientMessage::Init { project_id: "p1".into() }]);
        assert_eq!(engine.client_version(), 2);
        assert_eq!(engine.state(), ConnectionState::Resyncing);

        // even the "missing" version 3 is ignored until fresh state lands
        assert!(engine.on_frame(&generator_delete(3)).is_empty());

        let step = engine.on_frame(r#"{"type":"init","version":4}"#);
        assert!(matches!(step.events[..], [RealtimeEvent::Init { version: 4, .. }]));
        assert_eq!(engine.state(), ConnectionState::Synced);
        assert_eq!(engine.on_frame(&generator_delete(5)).events.len(), 1);
    }

    #[test]
    fn duplicate_is_silently_dropped() {
        let mut engine = synced(0);
        engine.on_frame(&generator_delete(1));
        engine.on_frame(&generator_delete(2));
        assert!(engine.on_frame(&generator_delete(2)).is_empty());
        assert_eq!(engine.client_version(), 2);
    }

    #[test]
    fn acks_ratchet_without_events() {
        let mut engine = synced(3);
        assert!(engine.on_frame(r#"{"type":"ack","version":5}"#).is_empty());
        assert_eq!(engine.client_version(), 5);
        assert!(engine.on_frame(r#"{"type":"ack","version":2}"#).is_empty());
        assert_eq!(engine.client_version(), 5);
    }

    #[test]
    fn ack_far_ahead_is_not_a_gap() {
        let mut engine = synced(1);
        engine.on_frame(r#"{"type":"ack","version":40}"#);
        assert_eq!(engine.state(), ConnectionState::Synced);
        assert_eq!(engine.on_frame(&generator_delete(41)).events.len(), 1);
    }

    #[test]
    fn malformed_frames_change_nothing() {
        let mut engine = synced(2);
        assert!(engine.on_frame("{not json").is_empty());
        assert!(engine.on_frame(r#"{"type":"op","version":3}"#).is_empty());
        assert_eq!(engine.client_version(), 2);
        assert_eq!(engine.state(), ConnectionState::Synced);
    }

    #[test]
    fn cursor_bypasses_sequencing() {
        let mut engine = synced(2);
        let step = engine.on_frame(r#"{"type":"cursor","x":1.5,"y":2,"authorId":"u1"}"#);
        assert_eq!(
            step.events,
            vec![RealtimeEvent::Cursor { x: 1.5, y: 2.0, author_id: "u1".into() }]
        );
        assert_eq!(engine.client_version(), 2);
    }

    #[test]
    fn ordered_op_event_exposes_operation() {
        let mut engine = synced(0);
        let step = engine.on_frame(r#"{"type":"op","op":{"type":"DELETE_NODE","id":"a"},"version":1}"#);
        assert_eq!(step.events[0].operation(), Some(&Operation::delete_node("a")));
    }

    #[test]
    fn saturated_version_drops_frames_instead_of_panicking() {
        let mut engine = synced(u64::MAX);
        assert!(engine.on_frame(&generator_delete(1)).is_empty());
        assert_eq!(engine.state(), ConnectionState::Synced);

        let mut engine = synced(0);
        engine.on_frame(&format!(r#"{{"type":"ack","version":{}}}"#, u64::MAX));
        assert!(engine.on_frame(&generator_delete(1)).is_empty());
        assert_eq!(engine.client_version(), u64::MAX);
    }

    #[test]
    fn origin_stamp_reaches_subscribers() {
        let mut engine = synced(0);
        let step = engine.on_frame(
            r#"{"type":"media.update","id":"m1","updates":{},"version":1,"src":"c1","seq":7}"#,
        );
        assert_eq!(
            step.events,
            vec![RealtimeEvent::MediaUpdated {
                id: "m1".into(),
                updates: serde_json::json!({}),
                version: 1,
                src: Some("c1".into()),
                seq: Some(7),
            }]
        );
    }

    #[test]
    fn close_emits_disconnected_once() {
        let mut engine = synced(0);
        assert_eq!(engine.on_closed().events, vec![RealtimeEvent::Disconnected]);
        assert!(engine.on_closed().is_empty());
        assert_eq!(engine.state(), ConnectionState::Disconnected);
    }
}
