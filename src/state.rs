//! Client-side records for groups and the shapes they label.
//!
//! DESIGN
//! ======
//! `ShapeRegistry` stands in for the board's shape store. Group logic only
//! touches three shape attributes (`group_id`, `badge`, `show_badge`) and
//! asks for layers to be redrawn through the invalidation set, which the
//! renderer drains with `take_invalidated`.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::charset::CharacterSet;
use crate::frame::{Data, Frame};

// =============================================================================
// GROUP
// =============================================================================

/// How badges are handed out to new members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreationOrder {
    #[default]
    Incrementing,
    Random,
}

/// A labeled group of shapes. Mirrors the server's group record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub character_set: CharacterSet,
    pub creation_order: CreationOrder,
}

impl Group {
    /// A fresh group with numeric badges handed out in order.
    #[must_use]
    pub fn new() -> Self {
        Self { id: Uuid::new_v4(), character_set: CharacterSet::Numbers, creation_order: CreationOrder::Incrementing }
    }
}

impl Default for Group {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// BATCH RECORDS
// =============================================================================

/// One entry of a `group:join` batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberJoin {
    pub member_id: Uuid,
    pub group_id: Uuid,
    pub badge: u32,
}

/// One entry of a `group:leave` batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberLeave {
    pub member_id: Uuid,
    pub group_id: Uuid,
}

/// One entry of a `group:badges` batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberBadge {
    pub member_id: Uuid,
    pub badge: u32,
}

/// Envelope for batched member records under the `members` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch<T> {
    pub members: Vec<T>,
}

// =============================================================================
// SHAPE
// =============================================================================

/// The slice of a board shape that grouping reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub id: Uuid,
    pub layer: String,
    #[serde(default)]
    pub group_id: Option<Uuid>,
    #[serde(default)]
    pub badge: u32,
    #[serde(default)]
    pub show_badge: bool,
}

impl Shape {
    #[must_use]
    pub fn new(id: Uuid, layer: impl Into<String>) -> Self {
        Self { id, layer: layer.into(), group_id: None, badge: 0, show_badge: false }
    }

    /// Toggle badge display. Returns the `shape:badge` notice when `sync`.
    pub fn set_show_badge(&mut self, visible: bool, sync: bool) -> Option<Frame> {
        self.show_badge = visible;
        if !sync {
            return None;
        }
        let mut data = Data::new();
        data.insert("id".into(), serde_json::json!(self.id));
        data.insert("show_badge".into(), serde_json::json!(visible));
        Some(Frame::request("shape:badge", data))
    }
}

// =============================================================================
// SHAPE REGISTRY
// =============================================================================

#[derive(Debug, Default)]
pub struct ShapeRegistry {
    shapes: HashMap<Uuid, Shape>,
    /// Layers whose contents changed since the last drain.
    invalidated: BTreeSet<String>,
}

impl ShapeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a shape. Returns the previous record, if any.
    pub fn insert(&mut self, shape: Shape) -> Option<Shape> {
        self.invalidated.insert(shape.layer.clone());
        self.shapes.insert(shape.id, shape)
    }

    pub fn remove(&mut self, id: Uuid) -> Option<Shape> {
        let shape = self.shapes.remove(&id)?;
        self.invalidated.insert(shape.layer.clone());
        Some(shape)
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&Shape> {
        self.shapes.get(&id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut Shape> {
        self.shapes.get_mut(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn invalidate_layer(&mut self, layer: &str) {
        if !self.invalidated.contains(layer) {
            self.invalidated.insert(layer.to_string());
        }
    }

    /// Drain the set of layers that need a redraw.
    pub fn take_invalidated(&mut self) -> BTreeSet<String> {
        std::mem::take(&mut self.invalidated)
    }

    pub fn clear(&mut self) {
        self.shapes.clear();
        self.invalidated.clear();
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
