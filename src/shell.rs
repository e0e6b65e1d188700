//! Shell orchestrator: wires the subsystems together and runs the event loop
//!
//! Coordinates the three concurrent activity sources: inbound control
//! requests (served by the IPC tasks), host-driven configure/destroy
//! notifications, and the host's raw input feed. Host completions arrive as
//! messages on one channel, so a destroy or a second reconfigure racing a
//! pending configure is resolved by state inspection in the registry.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;

use crate::config::ScrimConfig;
use crate::ipc::ScrimIpcServer;
use crate::registry::LayerRegistry;
use crate::router::InputRouter;
use crate::surface::{Geometry, HeadlessHost, HostEvent, SurfaceBinding, SurfaceHost};

/// Main daemon struct that owns all subsystems
pub struct ScrimShell {
    config: ScrimConfig,

    registry: Arc<LayerRegistry>,
    router: Arc<InputRouter>,
    ipc_server: ScrimIpcServer,
    host: Arc<HeadlessHost>,
    host_events: mpsc::UnboundedReceiver<HostEvent>,

    running: bool,
}

impl ScrimShell {
    /// Create a new shell instance with a headless host
    ///
    /// A compositor-backed host plugs in through the same `SurfaceHost` seam;
    /// the headless host acks every configure with the configured geometry.
    pub async fn new(config: ScrimConfig) -> Result<Self> {
        info!("🏗️ Initializing scrim shell...");

        debug!("🖥️ Initializing headless surface host...");
        let (host, host_events) = HeadlessHost::new(Geometry {
            width: config.headless.configure_width,
            height: config.headless.configure_height,
        });

        debug!("🪟 Initializing surface binding...");
        let binding = Arc::new(SurfaceBinding::new(
            Arc::clone(&host) as Arc<dyn SurfaceHost>
        ));

        debug!("🛰️ Initializing input router...");
        let router = Arc::new(InputRouter::new(config.input.queue_capacity));

        debug!("📋 Initializing layer registry...");
        let registry = Arc::new(LayerRegistry::new(binding, Arc::clone(&router)));

        debug!("🔗 Initializing control socket...");
        let ipc_server = ScrimIpcServer::new(
            PathBuf::from(&config.general.socket_path),
            Arc::clone(&registry),
            Arc::clone(&router),
        );
        ipc_server
            .start()
            .await
            .context("Failed to start control socket")?;

        info!("✅ All subsystems initialized successfully");

        Ok(Self {
            config,
            registry,
            router,
            ipc_server,
            host,
            host_events,
            running: false,
        })
    }

    /// Run the shell event loop until a shutdown signal arrives
    pub async fn run(mut self) -> Result<()> {
        info!("🎬 Starting scrim event loop");

        self.running = true;

        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

        while self.running {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("📨 Received SIGTERM, shutting down gracefully");
                    self.shutdown();
                }
                _ = sigint.recv() => {
                    info!("📨 Received SIGINT (Ctrl+C), shutting down gracefully");
                    self.shutdown();
                }
                event = self.host_events.recv() => match event {
                    Some(event) => self.handle_host_event(event),
                    None => {
                        warn!("⚠️ Host event channel closed, shutting down");
                        self.shutdown();
                    }
                }
            }
        }

        info!("🛑 Scrim event loop finished");
        Ok(())
    }

    /// Apply one asynchronous host notification
    fn handle_host_event(&self, event: HostEvent) {
        match event {
            HostEvent::Configure { handle, geometry } => {
                self.registry.handle_configure(handle, geometry);
            }
            HostEvent::SurfaceDestroyed { handle } => {
                self.registry.handle_surface_destroyed(handle);
            }
            HostEvent::Input(raw) => {
                self.router.dispatch(raw);
            }
        }
    }

    /// Gracefully shut down all subsystems
    fn shutdown(&mut self) {
        info!("🔽 Shutting down scrim...");
        self.running = false;

        let live = self.registry.len();
        if live > 0 {
            debug!("🧹 Closing {} remaining layer(s)...", live);
        }
        self.registry.shutdown();
        self.router.shutdown();

        info!("✅ Scrim shutdown complete");
    }

    /// Get current configuration
    pub fn config(&self) -> &ScrimConfig {
        &self.config
    }

    /// The layer registry, shared with the IPC tasks
    pub fn registry(&self) -> &Arc<LayerRegistry> {
        &self.registry
    }

    /// The input router, shared with the IPC tasks
    pub fn router(&self) -> &Arc<InputRouter> {
        &self.router
    }

    /// The headless host driving this shell
    pub fn host(&self) -> &Arc<HeadlessHost> {
        &self.host
    }

    /// Path of the control socket
    pub fn socket_path(&self) -> &PathBuf {
        self.ipc_server.socket_path()
    }
}
