//! Surface binding: the seam between logical layers and native overlay surfaces
//!
//! The host compositor negotiates geometry asynchronously (configure/ack), so
//! every native surface is tracked here as an explicit per-handle state
//! machine rather than a suspended call stack:
//!
//! ```text
//! REQUESTED → NOT_READY → READY ⇄ NOT_READY (reconfigure) → DESTROYED
//! ```
//!
//! Any state may transition directly to `DESTROYED`. A destroy or a second
//! reconfigure arriving before a pending configure completes is resolved by
//! state inspection; nothing is ever cancelled in flight.

use crate::error::ScrimResult;
use crate::placement::{KeyboardInteractivity, Placement};
use crate::router::RawInputEvent;
use log::{debug, trace, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Process-unique handle for one native overlay surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceHandle(u64);

impl SurfaceHandle {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Geometry the host assigned during the configure handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

/// Lifecycle state of one native surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    /// Native surface requested, host has not picked it up yet
    Requested,
    /// Waiting for the host's configure event
    NotReady,
    /// Host acknowledged geometry; the surface is usable
    Ready,
    /// Terminal; later events addressed to the handle are dropped
    Destroyed,
}

/// Asynchronous notifications from the host compositor
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// The host assigned geometry to a surface
    Configure {
        handle: SurfaceHandle,
        geometry: Geometry,
    },
    /// The host tore a surface down out-of-band (e.g. output removed)
    SurfaceDestroyed { handle: SurfaceHandle },
    /// A raw input event attributed to a target layer
    Input(RawInputEvent),
}

/// Host compositor operations the binding consumes
///
/// Everything here is fire-and-forget from the caller's perspective; results
/// of geometry negotiation come back later as [`HostEvent`]s.
pub trait SurfaceHost: Send + Sync {
    /// Request a native layer surface with the given placement
    fn create_surface(&self, handle: SurfaceHandle, placement: &Placement) -> ScrimResult<()>;

    /// Push a geometry-relevant placement change; re-triggers negotiation
    fn reconfigure_surface(&self, handle: SurfaceHandle, placement: &Placement) -> ScrimResult<()>;

    /// Change keyboard focus policy without a geometry round trip
    fn set_keyboard_interactivity(
        &self,
        handle: SurfaceHandle,
        keyboard: KeyboardInteractivity,
    ) -> ScrimResult<()>;

    /// Request native teardown; must tolerate repeat calls
    fn destroy_surface(&self, handle: SurfaceHandle);

    /// Sink for a rendered frame
    fn submit_frame(&self, handle: SurfaceHandle);
}

/// Owns the handle table and drives the configure/ack state machine
pub struct SurfaceBinding {
    host: Arc<dyn SurfaceHost>,
    states: RwLock<HashMap<SurfaceHandle, SurfaceState>>,
    next_handle: AtomicU64,
}

impl SurfaceBinding {
    pub fn new(host: Arc<dyn SurfaceHost>) -> Self {
        Self {
            host,
            states: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Request a native overlay surface; returns immediately in NOT_READY
    ///
    /// Never blocks the caller on the host's negotiation. The handle becomes
    /// usable once the host's configure arrives via [`on_configure`].
    ///
    /// [`on_configure`]: SurfaceBinding::on_configure
    pub fn bind(&self, placement: &Placement) -> ScrimResult<SurfaceHandle> {
        let handle = SurfaceHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));

        self.states.write().insert(handle, SurfaceState::Requested);
        self.host.create_surface(handle, placement)?;
        {
            // The host may have acked (or torn down) the surface already;
            // only a still-pending request moves to NOT_READY
            let mut states = self.states.write();
            if states.get(&handle) == Some(&SurfaceState::Requested) {
                states.insert(handle, SurfaceState::NotReady);
            }
        }

        debug!(
            "🪟 Surface {} requested (anchor: {}, layer: {})",
            handle.raw(),
            placement.anchor.as_str(),
            placement.stacking_layer.as_str()
        );
        Ok(handle)
    }

    /// Host callback: geometry assigned
    ///
    /// Transitions the handle to READY and submits an initial frame upward.
    /// Returns true when the handle actually became ready; configures for
    /// destroyed or unknown handles are dropped.
    pub fn on_configure(&self, handle: SurfaceHandle, geometry: Geometry) -> bool {
        {
            let mut states = self.states.write();
            match states.get(&handle) {
                Some(SurfaceState::Requested) | Some(SurfaceState::NotReady) => {
                    states.insert(handle, SurfaceState::Ready);
                }
                Some(SurfaceState::Ready) => {
                    // Host may re-send geometry without us asking; stay ready
                    trace!("Surface {} re-configured while ready", handle.raw());
                    return false;
                }
                Some(SurfaceState::Destroyed) => {
                    trace!("Dropped configure for destroyed surface {}", handle.raw());
                    return false;
                }
                None => {
                    warn!("⚠️ Configure for unknown surface {}", handle.raw());
                    return false;
                }
            }
        }

        debug!(
            "✅ Surface {} ready at {}x{}",
            handle.raw(),
            geometry.width,
            geometry.height
        );
        self.host.submit_frame(handle);
        true
    }

    /// Apply a placement change to a bound surface
    ///
    /// Geometry-relevant changes re-enter NOT_READY until the next configure;
    /// keyboard-interactivity-only changes apply without a round trip.
    pub fn reconfigure(
        &self,
        handle: SurfaceHandle,
        placement: &Placement,
        geometry_changed: bool,
    ) -> ScrimResult<()> {
        {
            let states = self.states.read();
            match states.get(&handle) {
                Some(SurfaceState::Destroyed) | None => {
                    // The layer raced a close; nothing left to reconfigure
                    trace!("Reconfigure for gone surface {}, dropped", handle.raw());
                    return Ok(());
                }
                _ => {}
            }
        }

        if geometry_changed {
            self.states.write().insert(handle, SurfaceState::NotReady);
            self.host.reconfigure_surface(handle, placement)?;
            debug!(
                "🔁 Surface {} re-negotiating geometry (zone: {})",
                handle.raw(),
                placement.exclusive_zone
            );
        } else {
            self.host
                .set_keyboard_interactivity(handle, placement.keyboard_interactivity)?;
            debug!(
                "⌨️ Surface {} keyboard policy now {}",
                handle.raw(),
                placement.keyboard_interactivity.as_str()
            );
        }
        Ok(())
    }

    /// Request native teardown; idempotent and fire-and-forget
    pub fn destroy(&self, handle: SurfaceHandle) {
        {
            let mut states = self.states.write();
            match states.get(&handle) {
                Some(SurfaceState::Destroyed) => {
                    trace!("Surface {} already destroyed", handle.raw());
                    return;
                }
                None => return,
                _ => {
                    states.insert(handle, SurfaceState::Destroyed);
                }
            }
        }

        self.host.destroy_surface(handle);
        debug!("💥 Surface {} destroyed", handle.raw());
    }

    /// Mark a handle destroyed without calling back into the host
    ///
    /// Used when the host itself reported the teardown, so echoing a destroy
    /// request back would be redundant.
    pub fn mark_destroyed(&self, handle: SurfaceHandle) {
        self.states.write().insert(handle, SurfaceState::Destroyed);
    }

    /// Current state of a handle, if it was ever bound
    pub fn state(&self, handle: SurfaceHandle) -> Option<SurfaceState> {
        self.states.read().get(&handle).copied()
    }
}

/// In-process host used by headless mode and the test suite
///
/// Acknowledges every create/reconfigure with a synthetic configure event on
/// the host event channel, mimicking the compositor's asynchronous handshake.
pub struct HeadlessHost {
    events: mpsc::UnboundedSender<HostEvent>,
    configure_geometry: Geometry,
    submitted_frames: AtomicU64,
}

impl HeadlessHost {
    /// Build a headless host plus the receiver end of its event channel
    pub fn new(configure_geometry: Geometry) -> (Arc<Self>, mpsc::UnboundedReceiver<HostEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let host = Arc::new(Self {
            events: tx,
            configure_geometry,
            submitted_frames: AtomicU64::new(0),
        });
        (host, rx)
    }

    /// Sender half of the host event channel, for injecting input events
    pub fn event_sender(&self) -> mpsc::UnboundedSender<HostEvent> {
        self.events.clone()
    }

    /// Frames submitted so far; the headless host only counts them
    pub fn submitted_frames(&self) -> u64 {
        self.submitted_frames.load(Ordering::Relaxed)
    }
}

impl SurfaceHost for HeadlessHost {
    fn create_surface(&self, handle: SurfaceHandle, _placement: &Placement) -> ScrimResult<()> {
        let _ = self.events.send(HostEvent::Configure {
            handle,
            geometry: self.configure_geometry,
        });
        Ok(())
    }

    fn reconfigure_surface(&self, handle: SurfaceHandle, _placement: &Placement) -> ScrimResult<()> {
        let _ = self.events.send(HostEvent::Configure {
            handle,
            geometry: self.configure_geometry,
        });
        Ok(())
    }

    fn set_keyboard_interactivity(
        &self,
        _handle: SurfaceHandle,
        _keyboard: KeyboardInteractivity,
    ) -> ScrimResult<()> {
        Ok(())
    }

    fn destroy_surface(&self, handle: SurfaceHandle) {
        let _ = self.events.send(HostEvent::SurfaceDestroyed { handle });
    }

    fn submit_frame(&self, handle: SurfaceHandle) {
        self.submitted_frames.fetch_add(1, Ordering::Relaxed);
        trace!("🎨 Frame submitted for surface {}", handle.raw());
    }
}
