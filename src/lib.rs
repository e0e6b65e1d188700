//! # Scrim Overlay Manager Library
//!
//! A layer-shell overlay manager: scrim owns on-screen widget surfaces
//! (toasts, bars, popups) on behalf of remote controllers and routes raw
//! input events back to whichever controller owns the targeted layer.
//!
//! ## Architecture
//!
//! Scrim is built on a modular architecture:
//! - `placement`: pure placement model (anchor, exclusive zone, keyboard policy, stacking layer)
//! - `surface`: surface binding and the asynchronous configure/ack state machine
//! - `registry`: the authoritative table of all live layers
//! - `router`: per-layer input subscription fan-out
//! - `ipc`: Unix-socket control protocol for remote controllers
//! - `shell`: orchestrator and event loop
//! - `config`: configuration parsing and management
//!
//! ## Usage
//!
//! ```rust,no_run
//! use scrim::{ScrimConfig, ScrimShell};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ScrimConfig::default();
//!     let shell = ScrimShell::new(config).await?;
//!     shell.run().await
//! }
//! ```

pub mod config;
pub mod error;
pub mod ipc;
pub mod placement;
pub mod registry;
pub mod router;
pub mod shell;
pub mod surface;

// Re-export main types for easy access
pub use config::ScrimConfig;
pub use error::{ScrimError, ScrimResult};
pub use ipc::ScrimIpcServer;
pub use placement::{Anchor, KeyboardInteractivity, Placement, PlacementUpdate, StackingLayer};
pub use registry::LayerRegistry;
pub use router::{EventClass, InputRouter, InputStream};
pub use shell::ScrimShell;
pub use surface::{HeadlessHost, SurfaceBinding, SurfaceHandle, SurfaceHost};

/// Version information for scrim
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
