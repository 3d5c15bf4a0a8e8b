//! WebSocket Game Server
//!
//! Async WebSocket server for room connections. Each connection gets a
//! fresh player id, may join one room at a time, and receives that room's
//! per-tick broadcasts through its own outbound queue.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{info, warn, error, debug, instrument};

use crate::config::ServerConfig;
use crate::core::rng::derive_room_seed;
use crate::game::scene::{load_scene_or_default, validate_scene_id, JsonSceneLoader, SceneDescriptor, SceneLoader};
use crate::game::state::PlayerId;
use crate::game::tick::RoomConfig;
use crate::network::protocol::{
    server_time_millis, ClientInput, ClientMessage, ErrorCode, JoinRequest, ServerMessage, WelcomeInfo,
};
use crate::network::room::{spawn_room, Room, RoomError, RoomHandle, RoomKey};

/// How long a closing connection waits to flush its last messages.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,
}

// =============================================================================
// ROOM MANAGER
// =============================================================================

struct RoomEntry {
    handle: RoomHandle,
    task: JoinHandle<()>,
    /// Set on the first cleanup sweep that finds the room empty
    empty_since: Option<Instant>,
}

/// Registry of running rooms, one per game/scene pair.
pub struct RoomManager {
    rooms: RwLock<BTreeMap<RoomKey, RoomEntry>>,
    loader: Arc<dyn SceneLoader>,
    room_config: RoomConfig,
    tick_rate: u32,
}

impl RoomManager {
    /// Create an empty registry.
    pub fn new(loader: Arc<dyn SceneLoader>, room_config: RoomConfig, tick_rate: u32) -> Self {
        Self {
            rooms: RwLock::new(BTreeMap::new()),
            loader,
            room_config,
            tick_rate,
        }
    }

    /// Running room for `key`, starting it if needed.
    pub async fn get_or_create(&self, key: &RoomKey) -> RoomHandle {
        let mut rooms = self.rooms.write().await;
        if let Some(entry) = rooms.get_mut(key) {
            if !entry.handle.is_closed() {
                entry.empty_since = None;
                return entry.handle.clone();
            }
        }

        let scene = self.load_scene(key).await;
        let salt = server_time_millis();
        let config = RoomConfig {
            seed: derive_room_seed(&key.game, &key.scene, salt),
            ..self.room_config.clone()
        };
        info!(room = %key, seed = config.seed, salt, obstacles = scene.obstacles.len(), "Creating room");

        let (handle, task) = spawn_room(Room::new(key.clone(), &scene, config), self.tick_rate);
        rooms.insert(key.clone(), RoomEntry {
            handle: handle.clone(),
            task,
            empty_since: None,
        });
        handle
    }

    async fn load_scene(&self, key: &RoomKey) -> SceneDescriptor {
        let loader = self.loader.clone();
        let (game, scene) = (key.game.clone(), key.scene.clone());
        match tokio::task::spawn_blocking(move || load_scene_or_default(loader.as_ref(), &game, &scene)).await {
            Ok(scene) => scene,
            Err(e) => {
                error!(room = %key, "Scene loader task failed: {}", e);
                SceneDescriptor::default()
            }
        }
    }

    /// Active room count.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Close rooms that were empty on this sweep and the previous one.
    ///
    /// Returns the number of rooms closed.
    pub async fn cleanup(&self) -> usize {
        let mut rooms = self.rooms.write().await;
        let now = Instant::now();
        let mut to_close = Vec::new();

        for (key, entry) in rooms.iter_mut() {
            if entry.handle.is_closed() {
                to_close.push(key.clone());
            } else if entry.handle.player_count() > 0 {
                entry.empty_since = None;
            } else if entry.empty_since.is_some() {
                to_close.push(key.clone());
            } else {
                entry.empty_since = Some(now);
            }
        }

        for key in &to_close {
            if let Some(entry) = rooms.remove(key) {
                entry.handle.close().await;
                info!(room = %key, "Closed empty room");
            }
        }
        to_close.len()
    }

    /// Close every room and wait for their tasks.
    pub async fn close_all(&self) {
        let entries: Vec<RoomEntry> = {
            let mut rooms = self.rooms.write().await;
            std::mem::take(&mut *rooms).into_values().collect()
        };
        for entry in entries {
            entry.handle.close().await;
            if let Err(e) = entry.task.await {
                error!(room = %entry.handle.key(), "Room task failed: {}", e);
            }
        }
    }
}

// =============================================================================
// CONNECTIONS
// =============================================================================

/// Holds one slot of the connection limit until dropped.
pub struct ConnectionGuard {
    connections: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.connections.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Per-connection state.
struct Connection {
    addr: SocketAddr,
    player_id: PlayerId,
    room: Option<RoomHandle>,
    sender: mpsc::Sender<ServerMessage>,
}

impl Connection {
    async fn send(&self, message: ServerMessage) {
        if self.sender.send(message).await.is_err() {
            debug!("Outbound channel closed for {}", self.addr);
        }
    }

    async fn send_error(&self, code: ErrorCode, message: &str) {
        self.send(ServerMessage::error(code, message)).await;
    }

    async fn leave_room(&mut self) {
        if let Some(room) = self.room.take() {
            // A closed room has already dropped the player
            let _ = room.leave(self.player_id).await;
        }
    }
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Running rooms.
    rooms: Arc<RoomManager>,
    /// Open connections.
    connections: Arc<AtomicUsize>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server loading scenes from `config.scene_dir`.
    pub fn new(config: ServerConfig) -> Self {
        let loader = Arc::new(JsonSceneLoader::new(config.scene_dir.clone()));
        Self::with_loader(config, loader)
    }

    /// Create a server with a custom scene loader.
    pub fn with_loader(config: ServerConfig, loader: Arc<dyn SceneLoader>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let rooms = Arc::new(RoomManager::new(loader, config.room.clone(), config.tick_rate));

        Self {
            config,
            rooms,
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Bind and run the server until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run the server on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Game server listening on {}", listener.local_addr()?);

        let cleanup_rooms = self.rooms.clone();
        let cleanup_interval = self.config.cleanup_interval;
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_rooms, cleanup_interval).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => match self.try_acquire_connection() {
                            Ok(guard) => {
                                debug!("New connection from {}", addr);
                                self.handle_connection(stream, addr, guard);
                            }
                            Err(e) => {
                                warn!("{}, rejecting {}", e, addr);
                                tokio::spawn(Self::reject_connection(stream));
                            }
                        },
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();
        self.rooms.close_all().await;

        Ok(())
    }

    /// Reserve a connection slot.
    pub fn try_acquire_connection(&self) -> Result<ConnectionGuard, GameServerError> {
        let max = self.config.max_connections;
        self.connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .map_err(|_| GameServerError::ConnectionLimitReached)?;
        Ok(ConnectionGuard {
            connections: self.connections.clone(),
        })
    }

    /// Tell an over-limit client why it is being dropped, then close.
    async fn reject_connection(stream: TcpStream) {
        let Ok(mut ws) = accept_async(stream).await else {
            return;
        };
        let error = ServerMessage::error(ErrorCode::ServerOverloaded, "Server full");
        if let Ok(text) = error.to_json() {
            let _ = tokio::time::timeout(FLUSH_TIMEOUT, ws.send(Message::Text(text))).await;
        }
        let _ = tokio::time::timeout(FLUSH_TIMEOUT, ws.close(None)).await;
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr, guard: ConnectionGuard) {
        let rooms = self.rooms.clone();
        let config = self.config.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = Self::serve_connection(stream, addr, rooms, config, shutdown_rx).await {
                warn!("Connection {} failed: {}", addr, e);
            }
        });
    }

    async fn serve_connection(
        stream: TcpStream,
        addr: SocketAddr,
        rooms: Arc<RoomManager>,
        config: ServerConfig,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), GameServerError> {
        let ws_stream = accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(config.outbound_buffer.max(1));

        // Spawn message sender task
        let mut sender_task = tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                let text = match msg.to_json() {
                    Ok(t) => t,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };
                if ws_sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        let mut conn = Connection {
            addr,
            player_id: PlayerId::random(),
            room: None,
            sender: msg_tx,
        };
        info!("Client {} connected as {}", addr, conn.player_id.short());

        let idle = tokio::time::sleep(config.idle_timeout);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    idle.as_mut().reset(tokio::time::Instant::now() + config.idle_timeout);
                    match msg {
                        Some(Ok(Message::Text(text))) => match ClientMessage::from_json(&text) {
                            Ok(client_msg) => {
                                Self::handle_client_message(&mut conn, client_msg, &rooms, &config).await;
                            }
                            Err(e) => {
                                debug!("Invalid message from {}: {}", addr, e);
                                conn.send_error(ErrorCode::InvalidMessage, "Invalid message format").await;
                            }
                        },
                        Some(Ok(Message::Binary(data))) => match ClientInput::from_bytes(&data) {
                            Ok(input) => Self::handle_input(&mut conn, input).await,
                            Err(e) => {
                                debug!("Invalid binary input from {}: {}", addr, e);
                                conn.send_error(ErrorCode::InvalidMessage, "Invalid binary input").await;
                            }
                        },
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("Client {} disconnected", addr);
                            break;
                        }
                        Some(Err(e)) => {
                            debug!("WebSocket error for {}: {}", addr, e);
                            break;
                        }
                        // Ping/pong frames are answered by tungstenite
                        Some(Ok(_)) => {}
                    }
                }
                _ = &mut idle => {
                    info!("Client {} idle for {:?}, disconnecting", addr, config.idle_timeout);
                    break;
                }
                _ = shutdown_rx.recv() => {
                    conn.send(ServerMessage::Shutdown {
                        reason: "Server shutting down".to_string(),
                    }).await;
                    break;
                }
            }
        }

        // Cleanup
        conn.leave_room().await;
        drop(conn);
        if tokio::time::timeout(FLUSH_TIMEOUT, &mut sender_task).await.is_err() {
            sender_task.abort();
        }

        info!("Client {} cleaned up", addr);
        Ok(())
    }

    /// Handle a client message.
    async fn handle_client_message(
        conn: &mut Connection,
        msg: ClientMessage,
        rooms: &RoomManager,
        config: &ServerConfig,
    ) {
        match msg {
            ClientMessage::Join(req) => {
                Self::handle_join(conn, req, rooms, config).await;
            }
            ClientMessage::Input(input) => {
                Self::handle_input(conn, input).await;
            }
            ClientMessage::Ping { timestamp } => {
                conn.send(ServerMessage::Pong {
                    timestamp,
                    server_time: server_time_millis(),
                }).await;
            }
            ClientMessage::Leave => {
                conn.leave_room().await;
            }
        }
    }

    /// Handle a join request.
    async fn handle_join(conn: &mut Connection, req: JoinRequest, rooms: &RoomManager, config: &ServerConfig) {
        if conn.room.as_ref().is_some_and(|r| !r.is_closed()) {
            conn.send_error(ErrorCode::AlreadyInRoom, "Leave the current room first").await;
            return;
        }
        if validate_scene_id(&req.game).is_err() || validate_scene_id(&req.scene).is_err() {
            conn.send_error(ErrorCode::InvalidRoom, "Invalid game or scene id").await;
            return;
        }

        let key = RoomKey::new(req.game, req.scene);

        // A room can close between lookup and join; retry once with a fresh one
        for _ in 0..2 {
            let room = rooms.get_or_create(&key).await;
            match room.join(conn.player_id, conn.sender.clone()).await {
                Ok(info) => {
                    conn.room = Some(room);
                    conn.send(ServerMessage::Welcome(WelcomeInfo {
                        player_id: info.player_id.to_uuid_string(),
                        game: key.game.clone(),
                        scene: key.scene.clone(),
                        tick: info.tick,
                        tick_rate: config.tick_rate,
                        server_version: config.version.clone(),
                    })).await;
                    return;
                }
                Err(RoomError::Closed) => continue,
                Err(e) => {
                    conn.send_error(ErrorCode::AlreadyInRoom, &e.to_string()).await;
                    return;
                }
            }
        }

        conn.send_error(ErrorCode::RoomUnavailable, "Room unavailable").await;
    }

    /// Forward input to the connection's room; ignored outside a room.
    async fn handle_input(conn: &mut Connection, input: ClientInput) {
        let Some(room) = &conn.room else {
            return;
        };
        if room.input(conn.player_id, input.seq, input.to_input_frame()).await.is_err() {
            debug!("Room {} closed under {}", room.key(), conn.addr);
            conn.room = None;
        }
    }

    /// Run cleanup loop.
    async fn run_cleanup_loop(rooms: Arc<RoomManager>, period: Duration) {
        let mut interval = interval(period);

        loop {
            interval.tick().await;
            let closed = rooms.cleanup().await;
            if closed > 0 {
                debug!("Cleanup closed {} rooms", closed);
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }

    /// Get active room count.
    pub async fn room_count(&self) -> usize {
        self.rooms.room_count().await
    }
}
