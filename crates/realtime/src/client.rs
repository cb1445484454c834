/// WebSocket transport around [`ProtocolEngine`]
use canvas::Operation;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::{
    ClientMessage, ConnectionState, ProtocolEngine, RealtimeConfig, RealtimeError, RealtimeEvent,
    Result, Step,
};

/// Result of a send. Delivery is at-most-once: a dropped frame is gone, nothing
/// is queued for replay after a reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Dropped,
}

type Outbound = mpsc::UnboundedSender<Message>;

struct Link {
    engine: ProtocolEngine,
    outbound: Option<Outbound>,
    subscribers: Vec<mpsc::UnboundedSender<RealtimeEvent>>,
}

impl Link {
    fn emit(&mut self, event: RealtimeEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn write(&self, message: &ClientMessage) -> SendOutcome {
        if !self.engine.state().is_open() {
            debug!(state = ?self.engine.state(), "socket not open, dropping frame");
            return SendOutcome::Dropped;
        }
        let Some(tx) = &self.outbound else {
            return SendOutcome::Dropped;
        };
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(err) => {
                error!(%err, "failed to encode realtime frame");
                return SendOutcome::Dropped;
            }
        };
        match tx.send(Message::Text(text)) {
            Ok(()) => SendOutcome::Sent,
            Err(_) => SendOutcome::Dropped,
        }
    }

    fn run(&mut self, step: Step) {
        for action in actions(step) {
            match action {
                Action::Emit(event) => self.emit(event),
                Action::Write(message) => {
                    self.write(&message);
                }
            }
        }
    }
}

#[derive(Debug, PartialEq)]
enum Action {
    Emit(RealtimeEvent),
    Write(ClientMessage),
}

/// Events reach subscribers before any frame is written, so `Connected` is
/// observed ahead of the `init` request it triggers.
fn actions(step: Step) -> Vec<Action> {
    step.events
        .into_iter()
        .map(Action::Emit)
        .chain(step.outgoing.into_iter().map(Action::Write))
        .collect()
}

/// One realtime connection per project.
///
/// Owns its socket task and subscriber list; dropping the client tears the
/// connection down. `connect` must run inside a Tokio runtime, otherwise the
/// client stays disconnected.
pub struct RealtimeClient {
    config: RealtimeConfig,
    link: Arc<Mutex<Link>>,
    task: Option<JoinHandle<()>>,
}

impl RealtimeClient {
    pub fn new(config: RealtimeConfig) -> Self {
        Self {
            config,
            link: Arc::new(Mutex::new(Link {
                engine: ProtocolEngine::new(""),
                outbound: None,
                subscribers: Vec::new(),
            })),
            task: None,
        }
    }

    /// Registers a subscriber. Events arrive in the order the engine produced them.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RealtimeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.link.lock().subscribers.push(tx);
        rx
    }

    pub fn state(&self) -> ConnectionState {
        self.link.lock().engine.state()
    }

    pub fn client_version(&self) -> u64 {
        self.link.lock().engine.client_version()
    }

    pub fn project_id(&self) -> String {
        self.link.lock().engine.project_id().to_string()
    }

    pub fn connect(&mut self, project_id: impl Into<String>) {
        self.disconnect();
        let project_id = project_id.into();

        let mut link = self.link.lock();
        link.engine = ProtocolEngine::new(project_id.clone());

        let Some(url) = self.config.project_url(&project_id) else {
            info!(project = %project_id, "no realtime endpoint configured, staying offline");
            link.emit(RealtimeEvent::Disconnected);
            return;
        };

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(err) => {
                let err = RealtimeError::Runtime(err.to_string());
                error!(%err, "cannot start realtime connection");
                link.emit(RealtimeEvent::Disconnected);
                return;
            }
        };

        link.engine.begin_connect();
        drop(link);
        self.task = Some(handle.spawn(run_connection(url, self.link.clone())));
    }

    /// Closes the socket. Emits `Disconnected` if a connection was live.
    pub fn disconnect(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        let mut link = self.link.lock();
        if let Some(tx) = link.outbound.take() {
            let _ = tx.send(Message::Close(None));
        }
        task.abort();
        let step = link.engine.on_closed();
        link.run(step);
    }

    pub fn send(&self, message: ClientMessage) -> SendOutcome {
        self.link.lock().write(&message)
    }

    pub fn create_generator(&self, overlay: Value) -> SendOutcome {
        let project_id = self.project_id();
        self.send(ClientMessage::GeneratorCreate {
            overlay,
            project_id,
        })
    }

    pub fn update_generator(&self, id: impl Into<String>, updates: Value) -> SendOutcome {
        let project_id = self.project_id();
        self.send(ClientMessage::GeneratorUpdate {
            id: id.into(),
            updates,
            project_id,
        })
    }

    pub fn delete_generator(&self, id: impl Into<String>) -> SendOutcome {
        let project_id = self.project_id();
        self.send(ClientMessage::GeneratorDelete {
            id: id.into(),
            project_id,
        })
    }

    pub fn create_media(&self, media: Value) -> SendOutcome {
        let project_id = self.project_id();
        self.send(ClientMessage::MediaCreate { media, project_id })
    }

    pub fn update_media(&self, id: impl Into<String>, updates: Value) -> SendOutcome {
        let project_id = self.project_id();
        self.send(ClientMessage::MediaUpdate {
            id: id.into(),
            updates,
            project_id,
        })
    }

    pub fn delete_media(&self, id: impl Into<String>) -> SendOutcome {
        let project_id = self.project_id();
        self.send(ClientMessage::MediaDelete {
            id: id.into(),
            project_id,
        })
    }

    /// Appends to the project's shared undo stack and clears its redo stack.
    pub fn push_history(&self, op: Operation, inverse: Operation) -> SendOutcome {
        let project_id = self.project_id();
        self.send(ClientMessage::HistoryPush {
            op,
            inverse,
            project_id,
        })
    }

    pub fn undo_history(&self) -> SendOutcome {
        let project_id = self.project_id();
        self.send(ClientMessage::HistoryUndo { project_id })
    }

    pub fn redo_history(&self) -> SendOutcome {
        let project_id = self.project_id();
        self.send(ClientMessage::HistoryRedo { project_id })
    }

    pub fn send_cursor(&self, x: f64, y: f64, author_id: impl Into<String>) -> SendOutcome {
        let project_id = self.project_id();
        self.send(ClientMessage::Cursor {
            x,
            y,
            author_id: author_id.into(),
            project_id,
        })
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn run_connection(url: String, link: Arc<Mutex<Link>>) {
    if let Err(err) = pump(&url, &link).await {
        warn!(%err, %url, "realtime connection ended with error");
    }
    let mut link = link.lock();
    link.outbound = None;
    let step = link.engine.on_closed();
    link.run(step);
}

async fn pump(url: &str, link: &Arc<Mutex<Link>>) -> Result<()> {
    let (stream, _) = tokio_tungstenite::connect_async(url).await?;
    let (mut sink, mut source) = stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    {
        let mut link = link.lock();
        link.outbound = Some(tx);
        let step = link.engine.on_open();
        link.run(step);
    }

    // the writer outlives an aborted reader long enough to flush a close frame
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if let Err(err) = sink.send(message).await {
                debug!(%err, "failed to write realtime frame");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let result = read_frames(&mut source, link).await;
    writer.abort();
    result
}

async fn read_frames<S>(source: &mut S, link: &Arc<Mutex<Link>>) -> Result<()>
where
    S: futures::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    while let Some(frame) = source.next().await {
        match frame? {
            Message::Text(text) => {
                let mut link = link.lock();
                if !link.engine.state().is_open() {
                    // disconnect() won the race for the lock
                    break;
                }
                let step = link.engine.on_frame(&text);
                link.run(step);
            }
            Message::Binary(data) => {
                debug!(bytes = data.len(), "ignoring binary realtime frame");
            }
            Message::Close(_) => {
                info!("realtime server closed the connection");
                break;
            }
            _ => {}
        }
    }
    Ok(())
}
