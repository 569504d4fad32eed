//! IPC server implementation

use shiftlog_api::{
    ClientInfo, ClientRole, Command, ErrorCode, ErrorInfo, Event, Request, Response,
};
use shiftlog_util::ClientId;
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, RwLock, broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::{IpcError, IpcResult};

/// Message from client to server
pub enum ServerMessage {
    Request {
        client_id: ClientId,
        request: Request,
    },
    ClientConnected {
        client_id: ClientId,
        info: ClientInfo,
    },
    ClientDisconnected {
        client_id: ClientId,
    },
}

/// IPC Server
pub struct IpcServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    clients: Arc<RwLock<HashMap<ClientId, ClientHandle>>>,
    event_tx: broadcast::Sender<Event>,
    message_tx: mpsc::UnboundedSender<ServerMessage>,
    message_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<ServerMessage>>>>,
}

struct ClientHandle {
    info: ClientInfo,
    response_tx: mpsc::UnboundedSender<String>,
    subscribed: bool,
}

/// Role for a peer, from its socket credentials
pub fn role_for_uid(uid: Option<u32>, service_uid: u32) -> ClientRole {
    match uid {
        Some(0) => ClientRole::Admin,
        Some(u) if u == service_uid => ClientRole::Terminal,
        _ => ClientRole::Observer,
    }
}

impl IpcServer {
    /// Create a new IPC server
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            listener: None,
            clients: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            message_tx,
            message_rx: Arc::new(Mutex::new(Some(message_rx))),
        }
    }

    /// Start listening
    pub async fn start(&mut self) -> IpcResult<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        // Owner and group only
        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o660))?;

        info!(path = %self.socket_path.display(), "IPC server listening");

        self.listener = Some(listener);

        Ok(())
    }

    /// Get receiver for server messages
    pub async fn take_message_receiver(&self) -> Option<mpsc::UnboundedReceiver<ServerMessage>> {
        self.message_rx.lock().await.take()
    }

    /// Accept connections in a loop
    pub async fn run(&self) -> IpcResult<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| IpcError::ServerError("Server not started".into()))?;

        let service_uid = nix::unistd::getuid().as_raw();

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let client_id = ClientId::new();
                    let uid = get_peer_uid(&stream);
                    let role = role_for_uid(uid, service_uid);

                    let info = ClientInfo::new(role);
                    let info = if let Some(u) = uid {
                        info.with_uid(u)
                    } else {
                        info
                    };

                    info!(client_id = %client_id, uid = ?uid, role = ?role, "Client connected");

                    self.handle_client(stream, client_id, info).await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_client(&self, stream: UnixStream, client_id: ClientId, info: ClientInfo) {
        let (read_half, write_half) = stream.into_split();
        let (response_tx, mut response_rx) = mpsc::unbounded_channel::<String>();

        {
            let mut clients = self.clients.write().await;
            clients.insert(
                client_id.clone(),
                ClientHandle {
                    info: info.clone(),
                    response_tx: response_tx.clone(),
                    subscribed: false,
                },
            );
        }

        let _ = self.message_tx.send(ServerMessage::ClientConnected {
            client_id: client_id.clone(),
            info: info.clone(),
        });

        let clients = self.clients.clone();
        let message_tx = self.message_tx.clone();
        let client_id_reader = client_id.clone();

        tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        debug!(client_id = %client_id_reader, "Client disconnected (EOF)");
                        break;
                    }
                    Ok(_) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }

                        match serde_json::from_str::<Request>(line) {
                            Ok(request) => {
                                let subscribed = match request.command {
                                    Command::SubscribeEvents => Some(true),
                                    Command::UnsubscribeEvents => Some(false),
                                    _ => None,
                                };
                                if let Some(subscribed) = subscribed {
                                    let mut clients = clients.write().await;
                                    if let Some(handle) = clients.get_mut(&client_id_reader) {
                                        handle.subscribed = subscribed;
                                    }
                                }

                                let _ = message_tx.send(ServerMessage::Request {
                                    client_id: client_id_reader.clone(),
                                    request,
                                });
                            }
                            Err(e) => {
                                warn!(
                                    client_id = %client_id_reader,
                                    error = %e,
                                    "Invalid request"
                                );
                                // No request id to correlate with; answer with 0
                                let response = Response::error(
                                    0,
                                    ErrorInfo::new(ErrorCode::InvalidRequest, e.to_string()),
                                );
                                if let Ok(json) = serde_json::to_string(&response) {
                                    let _ = response_tx.send(json);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        debug!(client_id = %client_id_reader, error = %e, "Read error");
                        break;
                    }
                }
            }

            // Dropping the handle's sender lets the writer task finish
            clients.write().await.remove(&client_id_reader);
        });

        let mut event_rx = self.event_tx.subscribe();
        let clients_writer = self.clients.clone();
        let client_id_writer = client_id.clone();
        let message_tx_writer = self.message_tx.clone();

        tokio::spawn(async move {
            let mut writer = write_half;

            loop {
                tokio::select! {
                    response = response_rx.recv() => {
                        let Some(mut msg) = response else { break };
                        msg.push('\n');
                        if let Err(e) = writer.write_all(msg.as_bytes()).await {
                            debug!(client_id = %client_id_writer, error = %e, "Write error");
                            break;
                        }
                    }

                    event = event_rx.recv() => {
                        let event = match event {
                            Ok(event) => event,
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!(client_id = %client_id_writer, skipped, "Client lagging, events dropped");
                                continue;
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        };

                        let is_subscribed = {
                            let clients = clients_writer.read().await;
                            clients.get(&client_id_writer).is_some_and(|h| h.subscribed)
                        };

                        if is_subscribed {
                            if let Ok(mut msg) = serde_json::to_string(&event) {
                                msg.push('\n');
                                if let Err(e) = writer.write_all(msg.as_bytes()).await {
                                    debug!(client_id = %client_id_writer, error = %e, "Event write error");
                                    break;
                                }
                            }
                        }
                    }
                }
            }

            let _ = message_tx_writer.send(ServerMessage::ClientDisconnected {
                client_id: client_id_writer.clone(),
            });

            let mut clients = clients_writer.write().await;
            clients.remove(&client_id_writer);
        });
    }

    /// Send a response to a specific client
    pub async fn send_response(&self, client_id: &ClientId, response: Response) -> IpcResult<()> {
        let json = serde_json::to_string(&response)?;

        let clients = self.clients.read().await;
        if let Some(handle) = clients.get(client_id) {
            handle
                .response_tx
                .send(json)
                .map_err(|_| IpcError::ConnectionClosed)?;
        }

        Ok(())
    }

    /// Broadcast an event to all subscribed clients
    pub fn broadcast_event(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    /// Get client info
    pub async fn get_client_info(&self, client_id: &ClientId) -> Option<ClientInfo> {
        let clients = self.clients.read().await;
        clients.get(client_id).map(|h| h.info.clone())
    }

    /// Get connected client count
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Get peer UID from Unix socket
fn get_peer_uid(stream: &UnixStream) -> Option<u32> {
    use std::os::unix::io::AsFd;

    let fd = stream.as_fd();

    match nix::sys::socket::getsockopt(&fd, nix::sys::socket::sockopt::PeerCredentials) {
        Ok(cred) => Some(cred.uid()),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IpcClient;
    use shiftlog_api::{EventPayload, ResponsePayload, ResponseResult};
    use std::time::Duration;
    use tempfile::tempdir;

    async fn started(socket_path: &Path) -> Arc<IpcServer> {
        let mut server = IpcServer::new(socket_path);
        server.start().await.unwrap();
        let server = Arc::new(server);

        let runner = server.clone();
        tokio::spawn(async move {
            let _ = runner.run().await;
        });
        server
    }

    /// Pong for Ping, a refusal for Logout, the subscription ack otherwise
    fn spawn_responder(server: Arc<IpcServer>, mut rx: mpsc::UnboundedReceiver<ServerMessage>) {
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let ServerMessage::Request { client_id, request } = msg {
                    let id = request.request_id;
                    let response = match request.command {
                        Command::Ping => Response::success(id, ResponsePayload::Pong),
                        Command::Logout => Response::error(
                            id,
                            ErrorInfo::new(ErrorCode::PermissionDenied, "read-only client"),
                        ),
                        _ => Response::success(
                            id,
                            ResponsePayload::Subscribed {
                                client_id: client_id.clone(),
                            },
                        ),
                    };
                    let _ = server.send_response(&client_id, response).await;
                }
            }
        });
    }

    #[test]
    fn test_roles_from_uid() {
        assert_eq!(role_for_uid(Some(0), 1000), ClientRole::Admin);
        assert_eq!(role_for_uid(Some(1000), 1000), ClientRole::Terminal);
        assert_eq!(role_for_uid(Some(1001), 1000), ClientRole::Observer);
        assert_eq!(role_for_uid(None, 1000), ClientRole::Observer);
    }

    #[tokio::test]
    async fn test_server_start() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        let mut server = IpcServer::new(&socket_path);
        server.start().await.unwrap();

        assert!(socket_path.exists());
    }

    #[tokio::test]
    async fn test_request_response() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("shiftd.sock");
        let server = started(&socket_path).await;
        let rx = server.take_message_receiver().await.unwrap();
        spawn_responder(server.clone(), rx);

        let mut client = IpcClient::connect(&socket_path).await.unwrap();
        let response = client.send(Command::Ping).await.unwrap();
        assert_eq!(response.request_id, 1);
        assert!(matches!(response.result, ResponseResult::Ok(ResponsePayload::Pong)));
    }

    #[tokio::test]
    async fn test_request_maps_refusal() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("shiftd.sock");
        let server = started(&socket_path).await;
        let rx = server.take_message_receiver().await.unwrap();
        spawn_responder(server.clone(), rx);

        let mut client = IpcClient::connect_default(Some(socket_path.clone())).await.unwrap();
        let payload = client.request(Command::Ping).await.unwrap();
        assert!(matches!(payload, ResponsePayload::Pong));

        let err = client.request(Command::Logout).await.unwrap_err();
        assert!(matches!(
            err,
            IpcError::Rejected {
                code: ErrorCode::PermissionDenied,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_subscribed_client_gets_events() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("shiftd.sock");
        let server = started(&socket_path).await;
        let rx = server.take_message_receiver().await.unwrap();
        spawn_responder(server.clone(), rx);

        let client = IpcClient::connect(&socket_path).await.unwrap();
        let mut events = client.subscribe().await.unwrap();

        server.broadcast_event(Event::new(EventPayload::Shutdown));

        let event = tokio::time::timeout(Duration::from_secs(2), events.next())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event.payload, EventPayload::Shutdown));
    }

    #[tokio::test]
    async fn test_malformed_line_gets_error() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("shiftd.sock");
        let _server = started(&socket_path).await;

        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        write_half.write_all(b"{not json}\n").await.unwrap();

        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        tokio::time::timeout(Duration::from_secs(2), reader.read_line(&mut line))
            .await
            .unwrap()
            .unwrap();

        let response: Response = serde_json::from_str(line.trim()).unwrap();
        assert!(matches!(
            response.result,
            ResponseResult::Err(ErrorInfo { code: ErrorCode::InvalidRequest, .. })
        ));
    }
}
