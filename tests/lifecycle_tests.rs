//! Layer lifecycle integration tests
//!
//! These tests drive the registry, surface binding, and input router together
//! through the headless host, verifying the end-to-end contracts: unique id
//! allocation, partial updates, idempotent close, configure/ack transitions,
//! and input stream termination.

use std::sync::Arc;

use scrim::placement::{Anchor, KeyboardInteractivity, Placement, PlacementUpdate, StackingLayer};
use scrim::registry::LayerRegistry;
use scrim::router::{
    EventClass, InputEvent, InputRouter, KeyEvent, Modifiers, PointerEvent, RawInputEvent,
};
use scrim::surface::{Geometry, HeadlessHost, HostEvent, SurfaceBinding, SurfaceHost};
use scrim::ScrimError;
use tokio::sync::mpsc;
use tokio_test::assert_ok;

struct Harness {
    registry: Arc<LayerRegistry>,
    router: Arc<InputRouter>,
    host: Arc<HeadlessHost>,
    host_events: mpsc::UnboundedReceiver<HostEvent>,
}

impl Harness {
    fn new() -> Self {
        let (host, host_events) = HeadlessHost::new(Geometry {
            width: 1920,
            height: 32,
        });
        let binding = Arc::new(SurfaceBinding::new(
            Arc::clone(&host) as Arc<dyn SurfaceHost>
        ));
        let router = Arc::new(InputRouter::new(16));
        let registry = Arc::new(LayerRegistry::new(binding, Arc::clone(&router)));
        Self {
            registry,
            router,
            host,
            host_events,
        }
    }

    /// Apply every pending host notification, as the shell loop would
    fn pump(&mut self) {
        while let Ok(event) = self.host_events.try_recv() {
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
    }
}

fn top_bar() -> Placement {
    Placement {
        anchor: Anchor::Top,
        keyboard_interactivity: KeyboardInteractivity::OnDemand,
        exclusive_zone: 0,
        stacking_layer: StackingLayer::Top,
    }
}

fn key_press(code: u32) -> InputEvent {
    InputEvent::Keyboard(KeyEvent {
        key_code: code,
        modifiers: Modifiers::default(),
        pressed: true,
    })
}

/// The end-to-end lifecycle scenario: create, update zone, close twice,
/// subscribe after close
#[test]
fn test_full_lifecycle_scenario() {
    let mut harness = Harness::new();

    // NewLayer(widget, anchor=TOP, keyboard=ON_DEMAND, zone=0, layer=TOP)
    let id = harness
        .registry
        .create(top_bar(), "clock-widget".into())
        .unwrap();
    assert_eq!(id, 1);

    harness.pump();
    assert!(harness.registry.get(id).unwrap().ready);

    // UpdateLayer(1, zone=24): geometry renegotiation, keyboard unchanged
    harness
        .registry
        .update(
            id,
            PlacementUpdate {
                exclusive_zone: Some(24),
                ..Default::default()
            },
            None,
        )
        .unwrap();

    let layer = harness.registry.get(id).unwrap();
    assert!(!layer.ready);
    assert_eq!(layer.placement.exclusive_zone, 24);
    assert_eq!(
        layer.placement.keyboard_interactivity,
        KeyboardInteractivity::OnDemand
    );

    harness.pump();
    assert!(harness.registry.get(id).unwrap().ready);

    // Close(1) twice: success both times, no observable difference
    tokio_test::assert_ok!(harness.registry.close(id));
    tokio_test::assert_ok!(harness.registry.close(id));
    assert!(harness.registry.is_empty());

    // KeyboardKey(1) after close: NotFound
    let err = harness
        .router
        .subscribe(id, EventClass::Keyboard)
        .err()
        .unwrap();
    assert_eq!(err, ScrimError::NotFound(id));
}

#[test]
fn test_concurrent_creates_yield_distinct_ids() {
    let harness = Harness::new();
    let registry = Arc::clone(&harness.registry);

    let mut handles = Vec::new();
    for worker in 0..8 {
        let registry = Arc::clone(&registry);
        handles.push(std::thread::spawn(move || {
            let mut ids = Vec::new();
            for i in 0..8 {
                let id = registry
                    .create(top_bar(), format!("widget-{}-{}", worker, i))
                    .unwrap();
                ids.push(id);
            }
            ids
        }));
    }

    let mut all_ids: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    all_ids.sort_unstable();
    all_ids.dedup();
    assert_eq!(all_ids.len(), 64);
    assert_eq!(registry.len(), 64);
}

#[test]
fn test_per_caller_update_order_is_preserved() {
    let mut harness = Harness::new();
    let id = harness.registry.create(top_bar(), "bar".into()).unwrap();
    harness.pump();

    // Last writer wins per field, ordered by arrival
    for zone in [8, 16, 24] {
        harness
            .registry
            .update(
                id,
                PlacementUpdate {
                    exclusive_zone: Some(zone),
                    ..Default::default()
                },
                None,
            )
            .unwrap();
    }
    harness
        .registry
        .update(
            id,
            PlacementUpdate {
                anchor: Some(Anchor::Bottom),
                ..Default::default()
            },
            None,
        )
        .unwrap();

    let layer = harness.registry.get(id).unwrap();
    assert_eq!(layer.placement.exclusive_zone, 24);
    assert_eq!(layer.placement.anchor, Anchor::Bottom);
}

#[test]
fn test_frame_submitted_after_each_negotiation() {
    let mut harness = Harness::new();
    let id = harness.registry.create(top_bar(), "bar".into()).unwrap();

    harness.pump();
    assert_eq!(harness.host.submitted_frames(), 1);

    // Keyboard-only change: no new negotiation, no new frame request
    harness
        .registry
        .update(
            id,
            PlacementUpdate {
                keyboard_interactivity: Some(KeyboardInteractivity::Exclusive),
                ..Default::default()
            },
            None,
        )
        .unwrap();
    harness.pump();
    assert_eq!(harness.host.submitted_frames(), 1);

    // Geometry change: renegotiation ends in another initial frame
    harness
        .registry
        .update(
            id,
            PlacementUpdate {
                exclusive_zone: Some(40),
                ..Default::default()
            },
            None,
        )
        .unwrap();
    harness.pump();
    assert_eq!(harness.host.submitted_frames(), 2);
}

#[tokio::test]
async fn test_input_flows_from_host_to_subscriber() {
    let mut harness = Harness::new();
    let id = harness.registry.create(top_bar(), "bar".into()).unwrap();
    harness.pump();

    let mut stream = harness.router.subscribe(id, EventClass::Keyboard).unwrap();

    // Host attributes a key press to the layer
    harness
        .host
        .event_sender()
        .send(HostEvent::Input(RawInputEvent {
            target: id,
            event: key_press(30),
        }))
        .unwrap();
    harness.pump();

    assert_eq!(stream.recv().await, Some(key_press(30)));
}

#[tokio::test]
async fn test_close_ends_input_streams_gracefully() {
    let mut harness = Harness::new();
    let id = harness.registry.create(top_bar(), "bar".into()).unwrap();
    harness.pump();

    let mut keyboard = harness.router.subscribe(id, EventClass::Keyboard).unwrap();
    let mut pointer = harness.router.subscribe(id, EventClass::Pointer).unwrap();

    harness.registry.close(id).unwrap();

    // End-of-stream on both, not an error
    assert_eq!(keyboard.recv().await, None);
    assert_eq!(pointer.recv().await, None);
}

#[tokio::test]
async fn test_host_side_teardown_silently_closes_layer() {
    let mut harness = Harness::new();
    let id = harness.registry.create(top_bar(), "bar".into()).unwrap();
    harness.pump();

    let mut stream = harness.router.subscribe(id, EventClass::Pointer).unwrap();
    let surface = harness.registry.get(id).unwrap().surface;

    // Output removed: the host destroys the surface out-of-band
    harness
        .host
        .event_sender()
        .send(HostEvent::SurfaceDestroyed { handle: surface })
        .unwrap();
    harness.pump();

    // The layer is gone and its streams ended; no error was surfaced
    assert_eq!(harness.registry.get(id).unwrap_err(), ScrimError::NotFound(id));
    assert_eq!(stream.recv().await, None);

    // A caller-initiated close racing behind is still a no-op success
    harness.registry.close(id).unwrap();
}

/// Host-side teardown racing the tail of create must never strand a layer in
/// the router: once the registry answers NotFound, subscribe does too
#[test]
fn test_racing_host_teardown_never_leaks_router_registration() {
    let harness = Harness::new();
    let registry = Arc::clone(&harness.registry);
    let router = Arc::clone(&harness.router);

    // A dedicated thread plays the host, destroying every surface as soon
    // as it learns about one, concurrently with the creating thread
    let (surface_tx, surface_rx) = std::sync::mpsc::channel();
    let teardown = {
        let registry = Arc::clone(&registry);
        std::thread::spawn(move || {
            for surface in surface_rx {
                registry.handle_surface_destroyed(surface);
            }
        })
    };

    let mut ids = Vec::new();
    for i in 0..64 {
        let id = registry
            .create(top_bar(), format!("widget-{}", i))
            .unwrap();
        if let Ok(layer) = registry.get(id) {
            surface_tx.send(layer.surface).unwrap();
        }
        ids.push(id);
    }
    drop(surface_tx);
    teardown.join().unwrap();

    for id in ids {
        assert_eq!(
            harness.registry.get(id).unwrap_err(),
            ScrimError::NotFound(id)
        );
        let err = router.subscribe(id, EventClass::Pointer).err().unwrap();
        assert_eq!(err, ScrimError::NotFound(id));
    }
}

#[test]
fn test_dispatch_without_subscribers_leaves_state_untouched() {
    let mut harness = Harness::new();
    let id = harness.registry.create(top_bar(), "bar".into()).unwrap();
    harness.pump();

    harness.router.dispatch(RawInputEvent {
        target: id,
        event: InputEvent::Pointer(PointerEvent {
            button_code: 272,
            pressed: true,
        }),
    });

    assert_eq!(harness.registry.len(), 1);
    assert_eq!(harness.router.subscription_count(id), 0);
    assert!(harness.registry.get(id).unwrap().ready);
}
