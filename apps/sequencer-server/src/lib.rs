//! Reference sequencing server for canvas realtime sessions
//! One room per project; every mutation gets the next room version

mod room;

pub use room::{ClientId, Delivery, Room, Target};

use futures_util::{SinkExt, StreamExt};
use realtime::{ClientMessage, ServerMessage};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type Tx = mpsc::UnboundedSender<Message>;
pub type ProjectMap = Arc<RwLock<HashMap<String, Project>>>;

/// A room plus the sockets currently joined to it.
#[derive(Default)]
pub struct Project {
    room: Room,
    peers: HashMap<ClientId, Tx>,
}

impl Project {
    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn join(&mut self, client: ClientId, tx: Tx) {
        self.peers.insert(client, tx);
    }

    fn leave(&mut self, client: &str) {
        self.peers.remove(client);
        self.room.forget(client);
    }

    fn route(&self, from: &str, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            let json = match serde_json::to_string(&delivery.message) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            for (client, tx) in &self.peers {
                let wanted = match delivery.target {
                    Target::Sender => client == from,
                    Target::Others => client != from,
                    Target::All => true,
                };
                if wanted && tx.send(Message::Text(json.clone())).is_err() {
                    debug!("Peer {} already gone", client);
                }
            }
        }
    }
}

/// Accepts connections until the listener fails.
pub async fn serve(listener: TcpListener) -> anyhow::Result<()> {
    let projects: ProjectMap = Arc::new(RwLock::new(HashMap::new()));
    serve_with(listener, projects).await
}

pub async fn serve_with(listener: TcpListener, projects: ProjectMap) -> anyhow::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        info!("New connection from: {}", addr);
        tokio::spawn(handle_connection(stream, addr, projects.clone()));
    }
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, projects: ProjectMap) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    let client_id: ClientId = Uuid::new_v4().to_string();
    info!("WebSocket connection established: {} as {}", addr, client_id);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = ws_sender.send(msg).await {
                error!("Failed to send message: {}", e);
                break;
            }
        }
    });

    let mut project_id: Option<String> = None;

    while let Some(msg) = ws_receiver.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                error!("Error receiving message: {}", e);
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                if let Err(e) =
                    handle_frame(&text, &projects, &client_id, &tx, &mut project_id).await
                {
                    warn!("Dropping frame from {}: {}", client_id, e);
                }
            }
            Message::Ping(data) => {
                let _ = tx.send(Message::Pong(data));
            }
            Message::Close(_) => {
                info!("Client requested close");
                break;
            }
            _ => {}
        }
    }

    if let Some(pid) = project_id {
        let mut projects = projects.write().await;
        if let Some(project) = projects.get_mut(&pid) {
            project.leave(&client_id);
            info!("Client {} left project {}", client_id, pid);
        }
    }

    send_task.abort();
    info!("Connection closed: {}", addr);
}

async fn handle_frame(
    text: &str,
    projects: &ProjectMap,
    client_id: &str,
    tx: &Tx,
    current_project: &mut Option<String>,
) -> anyhow::Result<()> {
    let msg: ClientMessage = serde_json::from_str(text)?;
    let mut projects = projects.write().await;
    dispatch(&mut projects, msg, client_id, tx, current_project)
}

/// The first frame binds the socket to its project; frames naming another
/// project afterwards are rejected. Joining and handling happen in one call
/// so no broadcast reaches a joiner ahead of its `init` reply.
fn dispatch(
    projects: &mut HashMap<String, Project>,
    msg: ClientMessage,
    client_id: &str,
    tx: &Tx,
    current_project: &mut Option<String>,
) -> anyhow::Result<()> {
    let pid = msg.project_id().to_string();

    if let Some(bound) = current_project.as_deref() {
        if bound != pid {
            anyhow::bail!("frame for project {} on a socket bound to {}", pid, bound);
        }
    }

    let project = projects.entry(pid.clone()).or_default();
    if current_project.is_none() {
        project.join(client_id.to_string(), tx.clone());
        info!("Client {} joined project {}", client_id, pid);
        *current_project = Some(pid.clone());
    }

    let deliveries = project.room.handle(client_id, msg);
    if let Some(version) = deliveries.iter().find_map(|d| mutation_version(&d.message)) {
        debug!("Project {} at version {}", pid, version);
    }
    project.route(client_id, deliveries);
    Ok(())
}

fn mutation_version(message: &ServerMessage) -> Option<u64> {
    match message {
        ServerMessage::Ack { version }
        | ServerMessage::HistoryUndone { version, .. }
        | ServerMessage::HistoryRedone { version, .. } => Some(*version),
        _ => None,
    }
}
