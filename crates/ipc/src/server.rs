//! Unix domain socket front end: accepts connections, frames newline-
//! delimited JSON, and forwards subscribed engagement events.

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cyberred_config::ConfigHandle;
use cyberred_protocol::{Request, Response, StreamEvent, MAX_MESSAGE_HARD_BYTES, READ_TIMEOUT_SECS};
use cyberred_sessions::SessionManager;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, Mutex, Notify, Semaphore};
use tokio::task::JoinHandle;

use crate::dispatch::{Dispatched, Dispatcher, Effect};
use crate::event_bus::ChannelEventBus;
use crate::error::{Error, Result};

const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(1);

pub struct DaemonServer {
    socket_path: PathBuf,
    pid_path: PathBuf,
    sessions: Arc<SessionManager>,
    event_bus: Arc<ChannelEventBus>,
    dispatcher: Arc<Dispatcher>,
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
    connection_permits: Arc<Semaphore>,
}

impl DaemonServer {
    #[must_use]
    pub fn new(
        socket_path: PathBuf,
        pid_path: PathBuf,
        sessions: Arc<SessionManager>,
        event_bus: Arc<ChannelEventBus>,
        config: Arc<ConfigHandle>,
    ) -> Self {
        let shutdown = Arc::new(Notify::new());
        let dispatcher = Arc::new(Dispatcher::new(sessions.clone(), shutdown.clone(), config));
        Self {
            socket_path,
            pid_path,
            sessions,
            event_bus,
            dispatcher,
            shutdown,
            running: Arc::new(AtomicBool::new(false)),
            connection_permits: Arc::new(Semaphore::new(cyberred_protocol::MAX_CONNECTIONS)),
        }
    }

    /// Binds the socket, fixes up permissions, and writes the PID file.
    /// Cleans up a stale socket left by an unclean prior shutdown.
    pub async fn bind(&self) -> Result<UnixListener> {
        if self.socket_path.exists() {
            tracing::warn!(path = %self.socket_path.display(), "removing stale socket");
            std::fs::remove_file(&self.socket_path)?;
        }
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o600))?;
        std::fs::write(&self.pid_path, std::process::id().to_string())?;

        self.running.store(true, Ordering::SeqCst);
        tracing::info!(socket = %self.socket_path.display(), pid = std::process::id(), "daemon server started");
        Ok(listener)
    }

    /// Accepts connections until [`Self::stop`] is called.
    pub async fn serve(&self, listener: UnixListener) {
        loop {
            tokio::select! {
                () = self.shutdown.notified() => break,
                accepted = listener.accept() => {
                    let Ok((stream, _addr)) = accepted else { continue };
                    let Ok(permit) = self.connection_permits.clone().try_acquire_owned() else {
                        tracing::warn!(limit = cyberred_protocol::MAX_CONNECTIONS, "max connections reached");
                        drop(stream);
                        continue;
                    };
                    let dispatcher = self.dispatcher.clone();
                    let event_bus = self.event_bus.clone();
                    let running = self.running.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        handle_client(stream, dispatcher, event_bus, running).await;
                    });
                }
            }
        }
    }

    /// Five-step graceful shutdown: notify clients, pause and checkpoint
    /// every engagement, disconnect clients, then close the socket.
    pub async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);

        let shutdown_event = serde_json::json!({
            "event_type": cyberred_protocol::event_types::DAEMON_SHUTDOWN,
            "data": {
                "reason": "daemon_stopping",
            },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        let notified = self.sessions.notify_all_clients(shutdown_event).await;
        tracing::info!(notified, "shutdown notifications sent");

        tokio::time::sleep(SHUTDOWN_GRACE_PERIOD).await;

        let shutdown_result = self.sessions.graceful_shutdown().await;
        tracing::info!(
            paused = shutdown_result.paused_ids.len(),
            checkpoints = shutdown_result.checkpoint_paths.len(),
            errors = shutdown_result.errors.len(),
            "engagement shutdown complete",
        );
        if !shutdown_result.errors.is_empty() {
            tracing::error!(errors = ?shutdown_result.errors, "checkpoint failures during shutdown");
        }

        let disconnected = self.sessions.disconnect_all_clients().await;
        tracing::info!(disconnected, "clients disconnected");

        self.shutdown.notify_waiters();
        let _ = std::fs::remove_file(&self.socket_path);
        let _ = std::fs::remove_file(&self.pid_path);

        if !shutdown_result.errors.is_empty() {
            return Err(Error::Message(format!(
                "{} checkpoint failure(s) during shutdown",
                shutdown_result.errors.len()
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }
}

async fn handle_client(stream: UnixStream, dispatcher: Arc<Dispatcher>, event_bus: Arc<ChannelEventBus>, running: Arc<AtomicBool>) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let (forward_tx, mut forward_rx) = mpsc::unbounded_channel::<StreamEvent>();
    let forwarders: Arc<Mutex<HashMap<String, JoinHandle<()>>>> = Arc::new(Mutex::new(HashMap::new()));

    loop {
        tokio::select! {
            forwarded = forward_rx.recv() => {
                let Some(event) = forwarded else { continue };
                let Ok(mut line) = serde_json::to_string(&event) else { continue };
                line.push('\n');
                if writer.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
            }
            line = tokio::time::timeout(Duration::from_secs(READ_TIMEOUT_SECS), lines.next_line()) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let line = match line {
                    Ok(Ok(Some(line))) => line,
                    Ok(Ok(None)) => break,
                    Ok(Err(_)) | Err(_) => break,
                };
                if line.len() > MAX_MESSAGE_HARD_BYTES {
                    tracing::warn!(size = line.len(), limit = MAX_MESSAGE_HARD_BYTES, "message too large, disconnecting");
                    break;
                }

                let request: Request = match serde_json::from_str(&line) {
                    Ok(req) => req,
                    Err(err) => {
                        tracing::warn!(error = %err, "protocol error decoding request");
                        continue;
                    }
                };

                let Dispatched { response, effect } = dispatcher.dispatch(request).await;
                if !send_response(&mut writer, &response).await {
                    break;
                }

                match effect {
                    Some(Effect::Subscribed { subscription_id, engagement_id }) => {
                        spawn_forwarder(&forwarders, &event_bus, subscription_id, engagement_id, forward_tx.clone()).await;
                    }
                    Some(Effect::Unsubscribed { subscription_id }) => {
                        if let Some(handle) = forwarders.lock().await.remove(&subscription_id) {
                            handle.abort();
                        }
                    }
                    Some(Effect::ShutdownRequested) | None => {}
                }
            }
        }
    }

    for (_, handle) in forwarders.lock().await.drain() {
        handle.abort();
    }
}

async fn send_response(writer: &mut (impl AsyncWriteExt + Unpin), response: &Response) -> bool {
    let Ok(mut line) = serde_json::to_string(response) else { return false };
    line.push('\n');
    writer.write_all(line.as_bytes()).await.is_ok() && writer.flush().await.is_ok()
}

async fn spawn_forwarder(
    forwarders: &Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
    event_bus: &Arc<ChannelEventBus>,
    subscription_id: String,
    engagement_id: String,
    forward_tx: mpsc::UnboundedSender<StreamEvent>,
) {
    let mut receiver = event_bus.subscribe(&format!("engagement:{engagement_id}:events"));
    let sub_id = subscription_id.clone();
    let handle = tokio::spawn(async move {
        let mut seq: u64 = 0;
        loop {
            let payload: Value = match receiver.recv().await {
                Ok(payload) => payload,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };
            seq += 1;
            let event_type = payload
                .get("event_type")
                .and_then(Value::as_str)
                .unwrap_or(cyberred_protocol::event_types::FINDING)
                .to_string();
            let data = payload.get("data").cloned().unwrap_or_else(|| payload.clone());
            let timestamp = payload
                .get("timestamp")
                .and_then(Value::as_str)
                .map_or_else(|| chrono::Utc::now().to_rfc3339(), str::to_string);
            let stream_event = StreamEvent {
                subscription_id: sub_id.clone(),
                engagement_id: engagement_id.clone(),
                event_type,
                data,
                timestamp,
                seq,
            };
            if forward_tx.send(stream_event).is_err() {
                break;
            }
        }
    });
    forwarders.lock().await.insert(subscription_id, handle);
}

#[must_use]
pub fn default_socket_path(base_dir: &Path) -> PathBuf {
    base_dir.join("daemon.sock")
}

#[must_use]
pub fn default_pid_path(base_dir: &Path) -> PathBuf {
    base_dir.join("daemon.pid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyberred_collab::{NoopCheckpointer, NoopPreFlightRunner};

    fn make_server(dir: &Path) -> DaemonServer {
        let sessions = Arc::new(SessionManager::new(
            10,
            50,
            Arc::new(ChannelEventBus::new()),
            Arc::new(NoopCheckpointer),
            Arc::new(NoopPreFlightRunner),
        ));
        let config = ConfigHandle::new(dir.to_path_buf());
        DaemonServer::new(default_socket_path(dir), default_pid_path(dir), sessions, Arc::new(ChannelEventBus::new()), config)
    }

    #[tokio::test]
    async fn bind_writes_socket_and_pid_file_with_restricted_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let server = make_server(dir.path());
        let listener = server.bind().await.unwrap();
        drop(listener);

        assert!(server.pid_path.exists());
        let meta = std::fs::metadata(&server.socket_path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[tokio::test]
    async fn client_round_trips_sessions_list() {
        let dir = tempfile::tempdir().unwrap();
        let server = Arc::new(make_server(dir.path()));
        let listener = server.bind().await.unwrap();

        let serve_server = server.clone();
        let serve_handle = tokio::spawn(async move { serve_server.serve(listener).await });

        let stream = UnixStream::connect(&server.socket_path).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half).lines();

        let request = Request { command: "sessions.list".into(), params: serde_json::json!({}), request_id: "r-1".into() };
        let mut line = serde_json::to_string(&request).unwrap();
        line.push('\n');
        write_half.write_all(line.as_bytes()).await.unwrap();

        let response_line = tokio::time::timeout(Duration::from_secs(5), reader.next_line()).await.unwrap().unwrap().unwrap();
        let response: Response = serde_json::from_str(&response_line).unwrap();
        assert_eq!(response.status, cyberred_protocol::Status::Ok);

        server.stop().await.unwrap();
        serve_handle.abort();
    }
}
