//! Layer registry: the authoritative table of all live layers
//!
//! Every structural mutation (create/update/close) is serialized through a
//! single write lock so that reads from the render and input paths always see
//! a consistent point-in-time view. No lock is ever held across a host round
//! trip; surface negotiation completes later through [`handle_configure`].
//!
//! Layer ids are process-unique and never reused, which lets a second close
//! of a once-live id resolve as an idempotent no-op while a close of a
//! never-known id stays `NotFound`.
//!
//! [`handle_configure`]: LayerRegistry::handle_configure

use crate::error::{ScrimError, ScrimResult};
use crate::placement::{Placement, PlacementUpdate};
use crate::router::InputRouter;
use crate::surface::{Geometry, SurfaceBinding, SurfaceHandle};
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One live layer: a logical widget surface and its placement
#[derive(Debug, Clone)]
pub struct Layer {
    /// Process-unique id, assigned at creation and never reused
    pub id: u64,

    /// Current placement (anchor, zone, keyboard policy, stacking layer)
    pub placement: Placement,

    /// Opaque handle to the caller-owned widget description
    pub widget_def: String,

    /// The native surface owned exclusively by this layer
    pub surface: SurfaceHandle,

    /// Set only after the host acknowledged initial geometry
    pub ready: bool,

    /// Geometry from the most recent configure, if any arrived yet
    pub geometry: Option<Geometry>,
}

#[derive(Default)]
struct RegistryTable {
    layers: HashMap<u64, Layer>,
    by_handle: HashMap<SurfaceHandle, u64>,
    /// Ids that were live once; consulted to make close idempotent
    retired: HashSet<u64>,
}

enum CloseOutcome {
    Removed(SurfaceHandle),
    AlreadyClosed,
    Unknown,
}

/// Mediates all access to the layer table
pub struct LayerRegistry {
    binding: Arc<SurfaceBinding>,
    router: Arc<InputRouter>,
    table: RwLock<RegistryTable>,
    next_id: AtomicU64,
}

impl LayerRegistry {
    pub fn new(binding: Arc<SurfaceBinding>, router: Arc<InputRouter>) -> Self {
        Self {
            binding,
            router,
            table: RwLock::new(RegistryTable::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new layer and request its native surface
    ///
    /// The layer starts not-ready; placement validity was already checked at
    /// the control plane, so the only caller-independent failure left is id
    /// space exhaustion (practically unreachable, treated as fatal).
    pub fn create(&self, placement: Placement, widget_def: String) -> ScrimResult<u64> {
        let id = self.allocate_id()?;
        let keyboard = placement.keyboard_interactivity;

        let surface = {
            // bind only queues a request on the host, so holding the table
            // lock across it cannot deadlock; it guarantees the handle is in
            // the table before its configure ack can be applied. The router
            // registration happens under the same lock: a concurrent close
            // cannot run between table publish and registration, so it always
            // sees either neither or both, and close_layer fully undoes this.
            let mut table = self.table.write();
            let surface = self.binding.bind(&placement)?;
            table.by_handle.insert(surface, id);
            table.layers.insert(
                id,
                Layer {
                    id,
                    placement,
                    widget_def,
                    surface,
                    ready: false,
                    geometry: None,
                },
            );
            self.router.register_layer(id, keyboard);
            surface
        };

        info!("➕ Layer {} created (surface {})", id, surface.raw());
        Ok(id)
    }

    /// Allocate the next layer id, saturating at the ceiling
    ///
    /// The counter never wraps: once the id space is exhausted every later
    /// create keeps failing with `ResourceExhausted` instead of reissuing
    /// ids that were live earlier in the process lifetime.
    fn allocate_id(&self) -> ScrimResult<u64> {
        let mut current = self.next_id.load(Ordering::SeqCst);
        loop {
            if current == u64::MAX {
                return Err(ScrimError::ResourceExhausted(
                    "layer id space exhausted".into(),
                ));
            }
            match self.next_id.compare_exchange_weak(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(current),
                Err(observed) => current = observed,
            }
        }
    }

    /// Merge a partial update into a live layer
    ///
    /// Geometry-relevant changes forward to the surface binding and drop the
    /// ready flag until the next configure. A new widget description replaces
    /// the old one wholesale. An update with nothing set is a successful no-op.
    pub fn update(
        &self,
        layer_id: u64,
        update: PlacementUpdate,
        widget_def: Option<String>,
    ) -> ScrimResult<()> {
        let (surface, placement, outcome) = {
            let mut table = self.table.write();
            let layer = table
                .layers
                .get_mut(&layer_id)
                .ok_or(ScrimError::NotFound(layer_id))?;

            let outcome = layer.placement.merge(&update);
            if let Some(def) = widget_def {
                layer.widget_def = def;
            }
            if outcome.geometry_changed {
                layer.ready = false;
            }
            (layer.surface, layer.placement.clone(), outcome)
        };

        if outcome.keyboard_changed {
            self.router
                .set_keyboard_interactivity(layer_id, placement.keyboard_interactivity);
        }
        if !outcome.is_noop() {
            // Lock released above; the host round trip happens outside it
            self.binding
                .reconfigure(surface, &placement, outcome.geometry_changed)?;
            debug!(
                "✏️ Layer {} updated (geometry renegotiation: {})",
                layer_id, outcome.geometry_changed
            );
        } else {
            debug!("✏️ Layer {} update was a no-op", layer_id);
        }
        Ok(())
    }

    /// Close a layer, tearing down its surface and ending its input streams
    ///
    /// Idempotent: a repeat close of an id that was live this session is a
    /// no-op success, tolerating races between caller- and host-initiated
    /// teardown. Closing an id that never existed is `NotFound`.
    pub fn close(&self, layer_id: u64) -> ScrimResult<()> {
        let outcome = {
            let mut table = self.table.write();
            match table.layers.remove(&layer_id) {
                Some(layer) => {
                    table.by_handle.remove(&layer.surface);
                    table.retired.insert(layer_id);
                    CloseOutcome::Removed(layer.surface)
                }
                None if table.retired.contains(&layer_id) => CloseOutcome::AlreadyClosed,
                None => CloseOutcome::Unknown,
            }
        };

        match outcome {
            CloseOutcome::Removed(surface) => {
                self.binding.destroy(surface);
                self.router.close_layer(layer_id);
                info!("➖ Layer {} closed", layer_id);
                Ok(())
            }
            CloseOutcome::AlreadyClosed => {
                debug!("Layer {} already closed, no-op", layer_id);
                Ok(())
            }
            CloseOutcome::Unknown => Err(ScrimError::NotFound(layer_id)),
        }
    }

    /// Consistent point-in-time snapshot of one layer
    pub fn get(&self, layer_id: u64) -> ScrimResult<Layer> {
        self.table
            .read()
            .layers
            .get(&layer_id)
            .cloned()
            .ok_or(ScrimError::NotFound(layer_id))
    }

    /// Snapshot of all live layers in render order (stacking layer, then age)
    pub fn snapshot(&self) -> Vec<Layer> {
        let table = self.table.read();
        let mut layers: Vec<Layer> = table.layers.values().cloned().collect();
        layers.sort_by_key(|l| (l.placement.stacking_layer, l.id));
        layers
    }

    /// Number of live layers
    pub fn len(&self) -> usize {
        self.table.read().layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().layers.is_empty()
    }

    /// Host callback: a surface finished its configure handshake
    pub fn handle_configure(&self, handle: SurfaceHandle, geometry: Geometry) {
        if !self.binding.on_configure(handle, geometry) {
            return;
        }

        let mut table = self.table.write();
        if let Some(&id) = table.by_handle.get(&handle) {
            if let Some(layer) = table.layers.get_mut(&id) {
                layer.ready = true;
                layer.geometry = Some(geometry);
                debug!(
                    "🟢 Layer {} ready ({}x{})",
                    id, geometry.width, geometry.height
                );
            }
        }
    }

    /// Host callback: a surface was destroyed out-of-band
    ///
    /// Not a caller error; the affected layer is silently closed and its
    /// input streams end. Callers detect the removal through subsequent
    /// `NotFound` results.
    pub fn handle_surface_destroyed(&self, handle: SurfaceHandle) {
        let layer_id = { self.table.read().by_handle.get(&handle).copied() };

        match layer_id {
            Some(id) => {
                // Host already tore the surface down; skip the echo destroy
                self.binding.mark_destroyed(handle);
                if self.close(id).is_ok() {
                    warn!("🫥 Host destroyed surface {}, layer {} closed", handle.raw(), id);
                }
            }
            None => {
                // Layer already gone; typically the ack of our own teardown
                self.binding.mark_destroyed(handle);
            }
        }
    }

    /// Close every live layer, used during shutdown
    pub fn shutdown(&self) {
        let ids: Vec<u64> = { self.table.read().layers.keys().copied().collect() };
        for id in ids {
            let _ = self.close(id);
        }
        info!("🧹 Layer registry cleared");
    }
}
