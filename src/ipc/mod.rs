//! Control-plane adapter: the Unix-socket boundary for remote controllers
//!
//! Translates inbound create/update/close/subscribe requests into registry
//! and router operations over a newline-delimited JSON protocol, and maps
//! every internal failure kind to its boundary-visible status. This layer is
//! stateless with respect to layers; all authoritative state lives in the
//! registry, so a restarted adapter picks up where it left off.

use crate::error::ScrimError;
use crate::placement::{Anchor, KeyboardInteractivity, Placement, PlacementUpdate, StackingLayer};
use crate::registry::LayerRegistry;
use crate::router::{EventClass, InputEvent, InputRouter, Modifiers};
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

/// Requests a controller may send, one JSON object per line
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ControlRequest {
    /// Create a layer; placement enums are wire strings, validated here
    NewLayer {
        widget_def: String,
        anchor: String,
        keyboard_interactivity: String,
        exclusive_zone: i32,
        stacking_layer: String,
    },

    /// Partially update a layer; absent fields are left unchanged
    UpdateLayer {
        layer_id: u64,
        #[serde(default)]
        widget_def: Option<String>,
        #[serde(default)]
        anchor: Option<String>,
        #[serde(default)]
        keyboard_interactivity: Option<String>,
        #[serde(default)]
        exclusive_zone: Option<i32>,
        #[serde(default)]
        stacking_layer: Option<String>,
    },

    /// Close a layer (idempotent for ids that were live this session)
    Close { layer_id: u64 },

    /// Open a keyboard event stream for a layer
    KeyboardKey { layer_id: u64 },

    /// Open a pointer button event stream for a layer
    PointerButton { layer_id: u64 },

    /// Cancel a previously opened event stream
    CancelStream { stream_id: u64 },
}

/// Responses and stream frames sent back to the controller
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ControlResponse {
    /// `NewLayer` succeeded
    LayerCreated { layer_id: u64 },

    /// `UpdateLayer`, `Close`, or `CancelStream` succeeded
    Ack,

    /// A `KeyboardKey`/`PointerButton` stream is now live
    StreamOpened { stream_id: u64 },

    /// One keyboard event on an open stream
    KeyboardEvent {
        stream_id: u64,
        key_code: u32,
        modifiers: Modifiers,
        pressed: bool,
    },

    /// One pointer event on an open stream
    PointerEvent {
        stream_id: u64,
        button_code: u32,
        pressed: bool,
    },

    /// Graceful stream termination (layer closed); not an error
    EndOfStream { stream_id: u64 },

    /// Request failed; status is one of the wire status strings
    Error { status: String, message: String },
}

impl From<ScrimError> for ControlResponse {
    fn from(err: ScrimError) -> Self {
        ControlResponse::Error {
            status: err.status().to_string(),
            message: err.to_string(),
        }
    }
}

type SharedWriter = Arc<Mutex<tokio::net::unix::OwnedWriteHalf>>;

/// One live stream forwarder owned by a connection
///
/// Cancellation is cooperative: the forwarder exits between frames, never in
/// the middle of a write, so a cancelled stream cannot garble the
/// newline-delimited protocol for the rest of the connection.
struct StreamHandle {
    cancel: Arc<Notify>,
    task: JoinHandle<()>,
}

/// IPC server handling controller connections on a Unix socket
pub struct ScrimIpcServer {
    socket_path: PathBuf,
    registry: Arc<LayerRegistry>,
    router: Arc<InputRouter>,
}

impl ScrimIpcServer {
    pub fn new(socket_path: PathBuf, registry: Arc<LayerRegistry>, router: Arc<InputRouter>) -> Self {
        Self {
            socket_path,
            registry,
            router,
        }
    }

    /// Bind the control socket and start accepting connections
    pub async fn start(&self) -> Result<()> {
        // Remove a stale socket file from a previous run
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).with_context(|| {
                format!("Failed to remove existing socket: {:?}", self.socket_path)
            })?;
        }

        let listener = UnixListener::bind(&self.socket_path)
            .with_context(|| format!("Failed to bind Unix socket: {:?}", self.socket_path))?;

        info!("🔗 Scrim control socket listening on: {:?}", self.socket_path);

        let registry = Arc::clone(&self.registry);
        let router = Arc::clone(&self.router);
        tokio::spawn(Self::accept_connections(listener, registry, router));

        Ok(())
    }

    /// Get the socket path
    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }

    async fn accept_connections(
        listener: UnixListener,
        registry: Arc<LayerRegistry>,
        router: Arc<InputRouter>,
    ) {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    info!("🤝 Controller connected");
                    let registry = Arc::clone(&registry);
                    let router = Arc::clone(&router);
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_client(stream, registry, router).await {
                            warn!("⚠️ Controller connection ended with error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("❌ Error accepting controller connection: {}", e);
                }
            }
        }
    }

    /// Serve one controller connection until it disconnects
    ///
    /// Requests on a connection are processed in arrival order, which gives
    /// each caller its per-layer ordering guarantee.
    async fn handle_client(
        stream: UnixStream,
        registry: Arc<LayerRegistry>,
        router: Arc<InputRouter>,
    ) -> Result<()> {
        let (reader, writer) = stream.into_split();
        let writer: SharedWriter = Arc::new(Mutex::new(writer));
        let mut lines = BufReader::new(reader).lines();

        // Live stream forwarders owned by this connection
        let mut streams: HashMap<u64, StreamHandle> = HashMap::new();
        let mut next_stream_id: u64 = 1;

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            debug!("📨 Control request: {}", line);

            let response = match serde_json::from_str::<ControlRequest>(&line) {
                Ok(request) => {
                    Self::process_request(
                        request,
                        &registry,
                        &router,
                        &writer,
                        &mut streams,
                        &mut next_stream_id,
                    )
                    .await
                }
                Err(e) => ControlResponse::Error {
                    status: "invalid_argument".to_string(),
                    message: format!("malformed request: {}", e),
                },
            };

            Self::send(&writer, &response).await?;
        }

        // Connection gone: the writer is dead, so aborting the remaining
        // forwarders outright is safe; in-flight dispatch is discarded
        for (_, stream) in streams {
            stream.task.abort();
        }
        info!("📪 Controller disconnected");
        Ok(())
    }

    async fn process_request(
        request: ControlRequest,
        registry: &Arc<LayerRegistry>,
        router: &Arc<InputRouter>,
        writer: &SharedWriter,
        streams: &mut HashMap<u64, StreamHandle>,
        next_stream_id: &mut u64,
    ) -> ControlResponse {
        match request {
            ControlRequest::NewLayer {
                widget_def,
                anchor,
                keyboard_interactivity,
                exclusive_zone,
                stacking_layer,
            } => {
                let placement = match Self::parse_placement(
                    &anchor,
                    &keyboard_interactivity,
                    exclusive_zone,
                    &stacking_layer,
                ) {
                    Ok(p) => p,
                    Err(e) => return e.into(),
                };
                match registry.create(placement, widget_def) {
                    Ok(layer_id) => ControlResponse::LayerCreated { layer_id },
                    Err(e) => e.into(),
                }
            }

            ControlRequest::UpdateLayer {
                layer_id,
                widget_def,
                anchor,
                keyboard_interactivity,
                exclusive_zone,
                stacking_layer,
            } => {
                let update = match Self::parse_update(
                    anchor,
                    keyboard_interactivity,
                    exclusive_zone,
                    stacking_layer,
                ) {
                    Ok(u) => u,
                    Err(e) => return e.into(),
                };
                match registry.update(layer_id, update, widget_def) {
                    Ok(()) => ControlResponse::Ack,
                    Err(e) => e.into(),
                }
            }

            ControlRequest::Close { layer_id } => match registry.close(layer_id) {
                Ok(()) => ControlResponse::Ack,
                Err(e) => e.into(),
            },

            ControlRequest::KeyboardKey { layer_id } => {
                Self::open_stream(layer_id, EventClass::Keyboard, router, writer, streams, next_stream_id)
            }

            ControlRequest::PointerButton { layer_id } => {
                Self::open_stream(layer_id, EventClass::Pointer, router, writer, streams, next_stream_id)
            }

            ControlRequest::CancelStream { stream_id } => match streams.remove(&stream_id) {
                Some(stream) => {
                    // The forwarder finishes any frame in flight, then exits
                    stream.cancel.notify_one();
                    debug!("🛑 Stream {} cancelled by controller", stream_id);
                    ControlResponse::Ack
                }
                None => ControlResponse::Error {
                    status: "not_found".to_string(),
                    message: format!("no open stream with id {}", stream_id),
                },
            },
        }
    }

    /// Subscribe and spawn a task forwarding events to the connection writer
    fn open_stream(
        layer_id: u64,
        class: EventClass,
        router: &Arc<InputRouter>,
        writer: &SharedWriter,
        streams: &mut HashMap<u64, StreamHandle>,
        next_stream_id: &mut u64,
    ) -> ControlResponse {
        let mut input = match router.subscribe(layer_id, class) {
            Ok(stream) => stream,
            Err(e) => return e.into(),
        };

        let stream_id = *next_stream_id;
        *next_stream_id += 1;

        let cancel = Arc::new(Notify::new());
        let writer = Arc::clone(writer);
        let task = tokio::spawn({
            let cancel = Arc::clone(&cancel);
            async move {
                loop {
                    // Cancellation is only observed between frames; a write
                    // already started always runs to completion
                    let event = tokio::select! {
                        _ = cancel.notified() => return,
                        event = input.recv() => match event {
                            Some(event) => event,
                            None => {
                                // Layer closed: graceful end-of-stream, not an error
                                let _ = Self::send(
                                    &writer,
                                    &ControlResponse::EndOfStream { stream_id },
                                )
                                .await;
                                return;
                            }
                        },
                    };

                    let frame = match event {
                        InputEvent::Keyboard(key) => ControlResponse::KeyboardEvent {
                            stream_id,
                            key_code: key.key_code,
                            modifiers: key.modifiers,
                            pressed: key.pressed,
                        },
                        InputEvent::Pointer(button) => ControlResponse::PointerEvent {
                            stream_id,
                            button_code: button.button_code,
                            pressed: button.pressed,
                        },
                    };
                    if Self::send(&writer, &frame).await.is_err() {
                        // Writer gone; the InputStream drop detaches the subscription
                        return;
                    }
                }
            }
        });

        streams.insert(stream_id, StreamHandle { cancel, task });
        ControlResponse::StreamOpened { stream_id }
    }

    fn parse_placement(
        anchor: &str,
        keyboard_interactivity: &str,
        exclusive_zone: i32,
        stacking_layer: &str,
    ) -> Result<Placement, ScrimError> {
        Ok(Placement {
            anchor: Anchor::parse(anchor)?,
            keyboard_interactivity: KeyboardInteractivity::parse(keyboard_interactivity)?,
            exclusive_zone,
            stacking_layer: StackingLayer::parse(stacking_layer)?,
        })
    }

    fn parse_update(
        anchor: Option<String>,
        keyboard_interactivity: Option<String>,
        exclusive_zone: Option<i32>,
        stacking_layer: Option<String>,
    ) -> Result<PlacementUpdate, ScrimError> {
        Ok(PlacementUpdate {
            anchor: anchor.as_deref().map(Anchor::parse).transpose()?,
            keyboard_interactivity: keyboard_interactivity
                .as_deref()
                .map(KeyboardInteractivity::parse)
                .transpose()?,
            exclusive_zone,
            stacking_layer: stacking_layer
                .as_deref()
                .map(StackingLayer::parse)
                .transpose()?,
        })
    }

    /// Send one message to the controller
    async fn send(writer: &SharedWriter, message: &ControlResponse) -> Result<()> {
        let json = serde_json::to_string(message).context("Failed to serialize response")?;

        let mut guard = writer.lock().await;
        guard
            .write_all(json.as_bytes())
            .await
            .context("Failed to write response")?;
        guard
            .write_all(b"\n")
            .await
            .context("Failed to write newline")?;

        debug!("📤 Control response: {}", json);
        Ok(())
    }
}

impl Drop for ScrimIpcServer {
    fn drop(&mut self) {
        // Clean up socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!("⚠️ Failed to remove socket file: {}", e);
            }
        }
    }
}
