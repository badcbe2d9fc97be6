//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications of
//! pipeline events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::events::{ControlCommand, PipelineEvent, StateEvent};
use crate::greeting::current_greeting;
use crate::interpreter::ChefAdvisor;
use crate::reminders::{cyclical_reminders, ReminderStore};

use super::protocol::{DaemonStatus, Notification, Request, Response};

const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Handles the server needs to act on requests
#[derive(Clone)]
pub struct ServerContext {
    pub control: mpsc::Sender<PipelineEvent>,
    pub reminders: Arc<dyn ReminderStore>,
    pub chef: ChefAdvisor,
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<ServerState>>,
    context: ServerContext,
    shutdown_tx: broadcast::Sender<()>,
    /// Source of state events; subscribers attach when they ask to
    event_tx: Option<broadcast::Sender<StateEvent>>,
}

/// Shared server state
struct ServerState {
    status: DaemonStatus,
    start_time: std::time::Instant,
}

type SharedWriter = Arc<Mutex<OwnedWriteHalf>>;

impl Server {
    /// Create a new IPC server
    pub fn new(socket_path: &Path, context: ServerContext) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            status: DaemonStatus::default(),
            start_time: std::time::Instant::now(),
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state,
            context,
            shutdown_tx,
            event_tx: None,
        })
    }

    /// Create a new IPC server with state event subscription
    pub fn with_events(
        socket_path: &Path,
        context: ServerContext,
        event_tx: broadcast::Sender<StateEvent>,
    ) -> Result<Self> {
        let mut server = Self::new(socket_path, context)?;
        server.event_tx = Some(event_tx);
        Ok(server)
    }

    /// Fold a pipeline event into the status snapshot
    pub async fn apply_event(&self, event: &StateEvent) {
        let mut state = self.state.write().await;
        match event {
            StateEvent::ModeChanged { from, to, .. } => {
                state.status.mode = *to;
                debug!(%from, %to, "IPC server: mode updated");
            }
            StateEvent::TurnComplete { outcome, .. } => {
                state.status.last_outcome = Some(outcome.clone());
            }
            StateEvent::RecognitionUnavailable => {
                state.status.recognition_available = false;
            }
            _ => {}
        }
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let state = Arc::clone(&self.state);
                    let context = self.context.clone();
                    let events = self.event_tx.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, state, context, events) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(
        stream: UnixStream,
        state: Arc<RwLock<ServerState>>,
        context: ServerContext,
        events: Option<broadcast::Sender<StateEvent>>,
    ) -> Result<()> {
        let (mut reader, writer) = stream.into_split();
        let writer: SharedWriter = Arc::new(Mutex::new(writer));
        let mut forwarder: Option<JoinHandle<()>> = None;

        let result = loop {
            let msg_buf = match read_frame(&mut reader).await {
                Ok(Some(buf)) => buf,
                Ok(None) => {
                    debug!("client disconnected");
                    break Ok(());
                }
                Err(e) => break Err(e),
            };

            let mut subscription = None;
            let response = match serde_json::from_slice::<Request>(&msg_buf) {
                Ok(request) => {
                    debug!(?request, "received request");
                    if matches!(request, Request::Subscribe) && forwarder.is_none() {
                        // Only events from this point on reach the client.
                        subscription = events.as_ref().map(broadcast::Sender::subscribe);
                        if subscription.is_none() {
                            warn!("subscription requested but no event source configured");
                        }
                    }
                    Self::process_request(request, &state, &context).await
                }
                Err(e) => {
                    warn!(?e, "failed to parse request");
                    Response::error("bad_request", e)
                }
            };

            {
                let mut guard = writer.lock().await;
                if let Err(e) = write_frame(&mut *guard, &response).await {
                    break Err(e);
                }
            }

            // Spawned after the reply so no notification can overtake it
            if let Some(rx) = subscription {
                debug!("client subscribed to notifications");
                forwarder = Some(tokio::spawn(forward_events(rx, Arc::clone(&writer))));
            }
        };

        if let Some(handle) = forwarder {
            handle.abort();
        }
        result
    }

    /// Process a request and return a response
    async fn process_request(
        request: Request,
        state: &Arc<RwLock<ServerState>>,
        context: &ServerContext,
    ) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let mut state = state.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                state.status.greeting = current_greeting(state.status.speaker.as_deref());
                Response::Status(state.status.clone())
            }

            Request::Subscribe => Response::Subscribed,

            Request::Suspend { reason } => {
                let response = Self::send_control(context, ControlCommand::Suspend { reason }).await;
                if matches!(response, Response::Ok) {
                    state.write().await.status.suspended = true;
                }
                response
            }

            Request::Resume => {
                let response = Self::send_control(context, ControlCommand::Resume).await;
                if matches!(response, Response::Ok) {
                    state.write().await.status.suspended = false;
                }
                response
            }

            Request::Cancel => Self::send_control(context, ControlCommand::Cancel).await,

            Request::SetSpeaker { label } => {
                let label = label.map(|l| l.trim().to_string()).filter(|l| !l.is_empty());
                let mut state = state.write().await;
                info!(speaker = ?label, "speaker label set");
                state.status.greeting = current_greeting(label.as_deref());
                state.status.speaker = label;
                Response::Ok
            }

            Request::AddReminder { text, category } => match context.reminders.add(&text, category).await {
                Ok(reminder) => {
                    info!(id = %reminder.id, %category, "reminder added manually");
                    Response::Reminder { reminder }
                }
                Err(e) => Response::error("reminder_failed", e),
            },

            Request::ListReminders => match context.reminders.list().await {
                Ok(stored) => {
                    let mut reminders = cyclical_reminders(chrono::Local::now());
                    reminders.extend(stored);
                    Response::Reminders { reminders }
                }
                Err(e) => Response::error("reminder_failed", e),
            },

            Request::AskChef { ingredients } => Response::ChefAnswer {
                answer: context.chef.ask(&ingredients).await,
            },
        }
    }

    async fn send_control(context: &ServerContext, command: ControlCommand) -> Response {
        match context.control.send(PipelineEvent::Control(command)).await {
            Ok(()) => Response::Ok,
            Err(_) => Response::error("pipeline_unavailable", "voice pipeline is not running"),
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Push every state event to a subscribed client until it goes away
async fn forward_events(mut rx: broadcast::Receiver<StateEvent>, writer: SharedWriter) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let notification = Notification::from(event);
                let mut writer = writer.lock().await;
                if let Err(e) = write_frame(&mut *writer, &notification).await {
                    debug!(?e, "subscriber gone");
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Read one length-prefixed message; `None` on a clean disconnect
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        warn!(len, "message too large, disconnecting");
        return Ok(None);
    }

    let mut msg_buf = vec![0u8; len];
    reader.read_exact(&mut msg_buf).await?;
    Ok(Some(msg_buf))
}

/// Send a length-prefixed JSON message
async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::{InterpretError, TextGenerator};
    use crate::reminders::{MemoryStore, ReminderCategory};
    use crate::state::InteractionMode;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Recipe;

    #[async_trait]
    impl TextGenerator for Recipe {
        async fn generate(&self, _: &str) -> Result<String, InterpretError> {
            Ok("Omelete.".to_string())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        server: Arc<Server>,
        control_rx: mpsc::Receiver<PipelineEvent>,
        event_tx: broadcast::Sender<StateEvent>,
        socket_path: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("daemon.sock");
        let (control, control_rx) = mpsc::channel(8);
        let (event_tx, _) = broadcast::channel(16);
        let context = ServerContext {
            control,
            reminders: Arc::new(MemoryStore::default()),
            chef: ChefAdvisor::new(Arc::new(Recipe)),
        };

        let server = Arc::new(Server::with_events(&socket_path, context, event_tx.clone()).unwrap());
        let running = Arc::clone(&server);
        tokio::spawn(async move {
            let _ = running.run().await;
        });

        Fixture {
            _dir: dir,
            server,
            control_rx,
            event_tx,
            socket_path,
        }
    }

    async fn request(stream: &mut UnixStream, body: Value) -> Value {
        write_frame(stream, &body).await.unwrap();
        receive(stream).await
    }

    async fn receive(stream: &mut UnixStream) -> Value {
        let frame = read_frame(stream).await.unwrap().expect("connection closed");
        serde_json::from_slice(&frame).unwrap()
    }

    #[tokio::test]
    async fn test_ping_and_status() {
        let fx = fixture();
        let mut client = UnixStream::connect(&fx.socket_path).await.unwrap();

        assert_eq!(request(&mut client, json!({"type": "ping"})).await["type"], "pong");

        fx.server
            .apply_event(&StateEvent::ModeChanged {
                from: InteractionMode::Idle,
                to: InteractionMode::WakeListening,
                duration_ms: 0,
            })
            .await;
        let status = request(&mut client, json!({"type": "get_status"})).await;
        assert_eq!(status["type"], "status");
        assert_eq!(status["mode"], "wake_listening");
        assert_eq!(status["suspended"], false);
    }

    #[tokio::test]
    async fn test_socket_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let fx = fixture();
        let mode = std::fs::metadata(&fx.socket_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_suspend_forwards_control() {
        let mut fx = fixture();
        let mut client = UnixStream::connect(&fx.socket_path).await.unwrap();

        let resp = request(&mut client, json!({"type": "suspend", "reason": "voice training"})).await;
        assert_eq!(resp["type"], "ok");

        match fx.control_rx.recv().await {
            Some(PipelineEvent::Control(ControlCommand::Suspend { reason })) => {
                assert_eq!(reason, "voice training");
            }
            other => panic!("unexpected control event: {other:?}"),
        }
        let status = request(&mut client, json!({"type": "get_status"})).await;
        assert_eq!(status["suspended"], true);
    }

    #[tokio::test]
    async fn test_reminders_and_chef() {
        let fx = fixture();
        let mut client = UnixStream::connect(&fx.socket_path).await.unwrap();

        let added = request(
            &mut client,
            json!({"type": "add_reminder", "text": "pagar luz", "category": "alert"}),
        )
        .await;
        assert_eq!(added["type"], "reminder");
        assert_eq!(added["reminder"]["type"], ReminderCategory::Alert.to_string());

        let empty = request(&mut client, json!({"type": "add_reminder", "text": "  "})).await;
        assert_eq!(empty["type"], "error");

        // Routine entries for today come first, stored ones after.
        let listed = request(&mut client, json!({"type": "list_reminders"})).await;
        let listed = listed["reminders"].as_array().unwrap();
        let stored: Vec<_> = listed.iter().filter(|r| r["id"] == added["reminder"]["id"]).collect();
        assert_eq!(stored.len(), 1);
        assert_eq!(listed.last().unwrap()["text"], "pagar luz");

        let chef = request(&mut client, json!({"type": "ask_chef", "ingredients": "ovos"})).await;
        assert_eq!(chef["answer"], "Omelete.");
    }

    #[tokio::test]
    async fn test_speaker_label_in_greeting() {
        let fx = fixture();
        let mut client = UnixStream::connect(&fx.socket_path).await.unwrap();

        request(&mut client, json!({"type": "set_speaker", "label": "Ana"})).await;
        let status = request(&mut client, json!({"type": "get_status"})).await;
        assert_eq!(status["speaker"], "Ana");
        assert!(status["greeting"].as_str().unwrap().ends_with(", Ana!"));
    }

    #[tokio::test]
    async fn test_bad_request_keeps_connection() {
        let fx = fixture();
        let mut client = UnixStream::connect(&fx.socket_path).await.unwrap();

        let resp = request(&mut client, json!({"type": "launch_rockets"})).await;
        assert_eq!(resp["type"], "error");
        assert_eq!(resp["code"], "bad_request");
        assert_eq!(request(&mut client, json!({"type": "ping"})).await["type"], "pong");
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let fx = fixture();
        let mut client = UnixStream::connect(&fx.socket_path).await.unwrap();

        assert_eq!(request(&mut client, json!({"type": "subscribe"})).await["type"], "subscribed");

        fx.event_tx
            .send(StateEvent::WakeDetected {
                phrase: "smart home".to_string(),
            })
            .unwrap();

        let pushed = receive(&mut client).await;
        assert_eq!(pushed["type"], "pipeline");
        assert_eq!(pushed["event"]["type"], "wake_detected");
        assert_eq!(pushed["event"]["phrase"], "smart home");
    }

    #[tokio::test]
    async fn test_subscriber_skips_earlier_events() {
        let fx = fixture();
        let mut client = UnixStream::connect(&fx.socket_path).await.unwrap();
        assert_eq!(request(&mut client, json!({"type": "ping"})).await["type"], "pong");

        // Nobody is listening yet, so the send itself may report no receivers.
        let _ = fx.event_tx.send(StateEvent::WakeDetected {
            phrase: "old".to_string(),
        });

        assert_eq!(request(&mut client, json!({"type": "subscribe"})).await["type"], "subscribed");

        fx.event_tx
            .send(StateEvent::WakeDetected {
                phrase: "new".to_string(),
            })
            .unwrap();

        let pushed = receive(&mut client).await;
        assert_eq!(pushed["event"]["phrase"], "new");
    }

    #[tokio::test]
    async fn test_shutdown_removes_socket() {
        let fx = fixture();
        assert!(fx.socket_path.exists());
        fx.server.shutdown().await;
        assert!(!fx.socket_path.exists());
    }
}
