//! Placement model for layer surfaces
//!
//! Pure data describing where and how a layer should appear on screen:
//! edge anchoring, reserved exclusive space, keyboard focus policy, and
//! stacking layer. Validation happens here, before any registry mutation,
//! so an unrecognized enum value is rejected with `InvalidArgument` and
//! causes no state change.

use crate::error::{ScrimError, ScrimResult};
use serde::{Deserialize, Serialize};

/// Which edge(s) of the output a layer surface is attached to
///
/// `None` means compositor-default placement (typically centered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    Top,
    Bottom,
    Left,
    Right,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    #[default]
    None,
}

impl Anchor {
    /// Parse a wire-level anchor string
    pub fn parse(s: &str) -> ScrimResult<Self> {
        match s {
            "top" => Ok(Anchor::Top),
            "bottom" => Ok(Anchor::Bottom),
            "left" => Ok(Anchor::Left),
            "right" => Ok(Anchor::Right),
            "top_left" => Ok(Anchor::TopLeft),
            "top_right" => Ok(Anchor::TopRight),
            "bottom_left" => Ok(Anchor::BottomLeft),
            "bottom_right" => Ok(Anchor::BottomRight),
            "none" => Ok(Anchor::None),
            other => Err(ScrimError::InvalidArgument(format!(
                "unknown anchor: {}",
                other
            ))),
        }
    }

    /// Whether this anchor attaches the surface to an output edge
    ///
    /// The exclusive zone is only meaningful when this returns true.
    pub fn reserves_edge(&self) -> bool {
        !matches!(self, Anchor::None)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Anchor::Top => "top",
            Anchor::Bottom => "bottom",
            Anchor::Left => "left",
            Anchor::Right => "right",
            Anchor::TopLeft => "top_left",
            Anchor::TopRight => "top_right",
            Anchor::BottomLeft => "bottom_left",
            Anchor::BottomRight => "bottom_right",
            Anchor::None => "none",
        }
    }
}

/// Whether and how a layer surface may receive keyboard focus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyboardInteractivity {
    #[default]
    None,
    OnDemand,
    Exclusive,
}

impl KeyboardInteractivity {
    pub fn parse(s: &str) -> ScrimResult<Self> {
        match s {
            "none" => Ok(KeyboardInteractivity::None),
            "on_demand" => Ok(KeyboardInteractivity::OnDemand),
            "exclusive" => Ok(KeyboardInteractivity::Exclusive),
            other => Err(ScrimError::InvalidArgument(format!(
                "unknown keyboard interactivity: {}",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyboardInteractivity::None => "none",
            KeyboardInteractivity::OnDemand => "on_demand",
            KeyboardInteractivity::Exclusive => "exclusive",
        }
    }
}

/// Stacking layer for Z-ordering, bottom to top
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum StackingLayer {
    Background = 0,
    Bottom = 1,
    #[default]
    Top = 2,
    Overlay = 3,
}

impl StackingLayer {
    pub fn parse(s: &str) -> ScrimResult<Self> {
        match s {
            "background" => Ok(StackingLayer::Background),
            "bottom" => Ok(StackingLayer::Bottom),
            "top" => Ok(StackingLayer::Top),
            "overlay" => Ok(StackingLayer::Overlay),
            other => Err(ScrimError::InvalidArgument(format!(
                "unknown stacking layer: {}",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StackingLayer::Background => "background",
            StackingLayer::Bottom => "bottom",
            StackingLayer::Top => "top",
            StackingLayer::Overlay => "overlay",
        }
    }
}

/// Full placement description for a layer surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Placement {
    /// Edge anchoring
    pub anchor: Anchor,

    /// Keyboard focus policy
    pub keyboard_interactivity: KeyboardInteractivity,

    /// Reserved screen space in pixels; negative means "occupy no reserved
    /// space even when anchored to an edge"
    pub exclusive_zone: i32,

    /// Z-order stacking layer
    pub stacking_layer: StackingLayer,
}

/// Partial placement for update requests
///
/// Absent fields mean "leave unchanged", distinguishing an omitted field
/// from an explicit reset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlacementUpdate {
    pub anchor: Option<Anchor>,
    pub keyboard_interactivity: Option<KeyboardInteractivity>,
    pub exclusive_zone: Option<i32>,
    pub stacking_layer: Option<StackingLayer>,
}

/// What a merge actually changed, used to decide whether a geometry
/// round trip with the host is needed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    /// Anchor, exclusive zone, or stacking layer changed value
    pub geometry_changed: bool,

    /// Keyboard interactivity changed value
    pub keyboard_changed: bool,
}

impl MergeOutcome {
    /// True when the merge left the placement untouched
    pub fn is_noop(&self) -> bool {
        !self.geometry_changed && !self.keyboard_changed
    }
}

impl PlacementUpdate {
    /// True when no field is set at all
    pub fn is_empty(&self) -> bool {
        self.anchor.is_none()
            && self.keyboard_interactivity.is_none()
            && self.exclusive_zone.is_none()
            && self.stacking_layer.is_none()
    }
}

impl Placement {
    /// Merge a partial update into this placement
    ///
    /// Only fields present in the update are replaced. Setting a field to
    /// its current value is not reported as a change, so a redundant update
    /// does not trigger a needless geometry re-negotiation.
    pub fn merge(&mut self, update: &PlacementUpdate) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        if let Some(anchor) = update.anchor {
            if self.anchor != anchor {
                self.anchor = anchor;
                outcome.geometry_changed = true;
            }
        }
        if let Some(zone) = update.exclusive_zone {
            if self.exclusive_zone != zone {
                self.exclusive_zone = zone;
                outcome.geometry_changed = true;
            }
        }
        if let Some(layer) = update.stacking_layer {
            if self.stacking_layer != layer {
                self.stacking_layer = layer;
                outcome.geometry_changed = true;
            }
        }
        if let Some(ki) = update.keyboard_interactivity {
            if self.keyboard_interactivity != ki {
                self.keyboard_interactivity = ki;
                outcome.keyboard_changed = true;
            }
        }

        outcome
    }
}
