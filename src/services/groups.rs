//! Group service: membership and badge assignment for grouped shapes.
//!
//! DESIGN
//! ======
//! Group records and ordered membership lists live here. Shapes stay in the
//! `ShapeRegistry`, which every mutating call borrows. Mutations apply
//! locally first and return the notices to send when `sync` is set; the
//! caller owns delivery.
//!
//! Unknown group or member IDs are soft no-ops: after a desync the server's
//! next snapshot repairs local state, so nothing here fails.
//!
//! RECONCILIATION
//! ==============
//! Last writer wins. Local changes are provisional until the server echoes
//! a record back through `update_group_from_server` or an inbound batch.

use std::collections::HashMap;

use rand::Rng;
use rand::rngs::StdRng;
use tracing::debug;
use uuid::Uuid;

use crate::charset::CharacterSet;
use crate::frame::{Data, ErrorCode, Frame, to_data};
use crate::state::{Batch, CreationOrder, Group, MemberBadge, MemberJoin, MemberLeave, Shape, ShapeRegistry};

/// Smallest pool random badges are drawn from.
const MIN_RANDOM_BOUND: u32 = 10;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    #[error("malformed {syscall} payload: {source}")]
    Malformed {
        syscall: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown syscall: {0}")]
    UnknownSyscall(String),
    #[error("server rejected {syscall}: {message}")]
    Rejected { syscall: String, message: String },
}

impl ErrorCode for GroupError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed { .. } => "E_MALFORMED_PAYLOAD",
            Self::UnknownSyscall(_) => "E_UNKNOWN_SYSCALL",
            Self::Rejected { .. } => "E_REJECTED",
        }
    }
}

pub struct GroupManager {
    groups: HashMap<Uuid, Group>,
    /// Group ID -> member IDs in join order.
    members: HashMap<Uuid, Vec<Uuid>>,
    rng: StdRng,
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

impl GroupManager {
    #[must_use]
    pub fn new(rng: StdRng) -> Self {
        Self { groups: HashMap::new(), members: HashMap::new(), rng }
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.members.clear();
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    #[must_use]
    pub fn has_group(&self, group_id: Uuid) -> bool {
        self.groups.contains_key(&group_id)
    }

    #[must_use]
    pub fn group(&self, group_id: Uuid) -> Option<&Group> {
        self.groups.get(&group_id)
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Member IDs in enumeration order, including IDs the registry has not seen.
    #[must_use]
    pub fn member_ids(&self, group_id: Uuid) -> &[Uuid] {
        self.members.get(&group_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Known member shapes in enumeration order.
    #[must_use]
    pub fn group_members<'a>(&self, shapes: &'a ShapeRegistry, group_id: Uuid) -> Vec<&'a Shape> {
        self.member_ids(group_id)
            .iter()
            .filter_map(|id| shapes.get(*id))
            .collect()
    }

    /// Render a member's badge with its group's alphabet.
    ///
    /// Returns `None` for unknown shapes and `"0"` for shapes outside any
    /// locally known group.
    #[must_use]
    pub fn badge_label(&self, shapes: &ShapeRegistry, member_id: Uuid) -> Option<String> {
        let shape = shapes.get(member_id)?;
        let Some(group) = shape.group_id.and_then(|id| self.groups.get(&id)) else {
            return Some("0".to_string());
        };
        Some(group.character_set.label(shape.badge))
    }

    // =========================================================================
    // GROUP LIFECYCLE
    // =========================================================================

    /// Register a group record. Existing membership is kept.
    pub fn add_group(&mut self, group: Group, sync: bool) -> Vec<Frame> {
        let frame = sync.then(|| Frame::request("group:create", to_data(&group)));
        self.members.entry(group.id).or_default();
        self.groups.insert(group.id, group);
        frame.into_iter().collect()
    }

    /// Create an empty group with numeric, incrementing badges.
    pub fn create_group(&mut self, sync: bool) -> (Uuid, Vec<Frame>) {
        let group = Group::new();
        let id = group.id;
        (id, self.add_group(group, sync))
    }

    /// Create a group and join `shape_id` as its first member.
    pub fn create_group_for_shape(&mut self, shapes: &mut ShapeRegistry, shape_id: Uuid) -> (Uuid, Vec<Frame>) {
        let (group_id, mut frames) = self.create_group(true);
        frames.extend(self.add_member(shapes, group_id, shape_id, None, true));
        (group_id, frames)
    }

    /// Remove a group unconditionally, detaching every member.
    pub fn remove_group(&mut self, shapes: &mut ShapeRegistry, group_id: Uuid, sync: bool) -> Vec<Frame> {
        for member_id in self.members.remove(&group_id).unwrap_or_default() {
            let Some(shape) = shapes.get_mut(member_id) else {
                continue;
            };
            shape.group_id = None;
            shape.badge = 0;
            shape.set_show_badge(false, false);
            let layer = shape.layer.clone();
            shapes.invalidate_layer(&layer);
        }
        self.groups.remove(&group_id);

        if !sync {
            return Vec::new();
        }
        let mut data = Data::new();
        data.insert("id".into(), serde_json::json!(group_id));
        vec![Frame::request("group:remove", data)]
    }

    /// Replace a group record with the server's copy and redraw its members.
    pub fn update_group_from_server(&mut self, shapes: &mut ShapeRegistry, group: Group) {
        let group_id = group.id;
        self.groups.insert(group_id, group);
        self.members.entry(group_id).or_default();
        self.invalidate_members(shapes, group_id);
    }

    // =========================================================================
    // MEMBERSHIP
    // =========================================================================

    /// Join `member_id` to a group.
    ///
    /// The shape's stored group and badge change only when it is not already
    /// in this group. A shape moving from another group leaves that group's
    /// membership first. The join notice carries the resolved badge.
    pub fn add_member(
        &mut self,
        shapes: &mut ShapeRegistry,
        group_id: Uuid,
        member_id: Uuid,
        badge: Option<u32>,
        sync: bool,
    ) -> Vec<Frame> {
        if !self.groups.contains_key(&group_id) {
            debug!(%group_id, %member_id, "join for unknown group ignored");
            return Vec::new();
        }

        let current = shapes.get(member_id).map(|s| (s.group_id, s.badge));
        let badge = match (badge, current) {
            (Some(badge), _) => badge,
            (None, Some((Some(gid), stored))) if gid == group_id => stored,
            (None, _) => self.generate_badge(shapes, group_id),
        };

        if let Some((previous, _)) = current {
            if previous != Some(group_id) {
                if let Some(old) = previous {
                    if let Some(list) = self.members.get_mut(&old) {
                        list.retain(|id| *id != member_id);
                    }
                }
                if let Some(shape) = shapes.get_mut(member_id) {
                    shape.group_id = Some(group_id);
                    shape.badge = badge;
                    let layer = shape.layer.clone();
                    shapes.invalidate_layer(&layer);
                }
            }
        }

        let list = self.members.entry(group_id).or_default();
        if !list.contains(&member_id) {
            list.push(member_id);
        }

        if !sync {
            return Vec::new();
        }
        let batch = Batch { members: vec![MemberJoin { member_id, group_id, badge }] };
        vec![Frame::request("group:join", to_data(&batch))]
    }

    /// Drop `member_id` from a group and clear its group and badge.
    pub fn remove_member(
        &mut self,
        shapes: &mut ShapeRegistry,
        group_id: Uuid,
        member_id: Uuid,
        sync: bool,
    ) -> Vec<Frame> {
        if let Some(list) = self.members.get_mut(&group_id) {
            list.retain(|id| *id != member_id);
        }

        if let Some(shape) = shapes.get_mut(member_id) {
            shape.set_show_badge(false, false);
            if shape.group_id == Some(group_id) {
                shape.group_id = None;
                shape.badge = 0;
            }
            let layer = shape.layer.clone();
            shapes.invalidate_layer(&layer);
        }

        if !sync {
            return Vec::new();
        }
        let batch = Batch { members: vec![MemberLeave { member_id, group_id }] };
        vec![Frame::request("group:leave", to_data(&batch))]
    }

    /// Strike `member_id` from every membership list without touching the
    /// shape or notifying anyone.
    pub fn forget_member(&mut self, member_id: Uuid) {
        for list in self.members.values_mut() {
            list.retain(|id| *id != member_id);
        }
    }

    /// Write server-assigned badges onto known shapes.
    pub fn apply_badges(&mut self, shapes: &mut ShapeRegistry, badges: &[MemberBadge]) {
        for entry in badges {
            let Some(shape) = shapes.get_mut(entry.member_id) else {
                debug!(member_id = %entry.member_id, "badge for unknown shape ignored");
                continue;
            };
            shape.badge = entry.badge;
            let layer = shape.layer.clone();
            shapes.invalidate_layer(&layer);
        }
    }

    // =========================================================================
    // SETTINGS
    // =========================================================================

    /// Swap the group's alphabet. Badges keep their values.
    pub fn set_character_set(
        &mut self,
        shapes: &mut ShapeRegistry,
        group_id: Uuid,
        character_set: CharacterSet,
        sync: bool,
    ) -> Vec<Frame> {
        let Some(group) = self.groups.get_mut(&group_id) else {
            return Vec::new();
        };
        group.character_set = character_set;
        let frame = sync.then(|| Frame::request("group:update", to_data(&*group)));
        self.invalidate_members(shapes, group_id);
        frame.into_iter().collect()
    }

    /// Switch the creation order and reassign every member's badge.
    ///
    /// Incrementing hands out `0..N` in enumeration order. Random draws each
    /// badge without replacement from `0..2N`.
    pub fn set_creation_order(
        &mut self,
        shapes: &mut ShapeRegistry,
        group_id: Uuid,
        creation_order: CreationOrder,
        sync: bool,
    ) -> Vec<Frame> {
        let Some(group) = self.groups.get_mut(&group_id) else {
            return Vec::new();
        };
        group.creation_order = creation_order;
        let mut frames = Vec::new();
        if sync {
            frames.push(Frame::request("group:update", to_data(&*group)));
        }

        let member_ids: Vec<Uuid> = self
            .member_ids(group_id)
            .iter()
            .copied()
            .filter(|id| shapes.get(*id).is_some())
            .collect();

        let mut pool: Vec<u32> = (0..count_u32(member_ids.len()).saturating_mul(2)).collect();
        let mut assigned = Vec::with_capacity(member_ids.len());
        for (index, member_id) in member_ids.into_iter().enumerate() {
            let badge = match creation_order {
                CreationOrder::Incrementing => count_u32(index),
                CreationOrder::Random => {
                    let slot = self.rng.random_range(0..pool.len());
                    pool.swap_remove(slot)
                }
            };
            if let Some(shape) = shapes.get_mut(member_id) {
                shape.badge = badge;
            }
            assigned.push(MemberBadge { member_id, badge });
        }

        self.invalidate_members(shapes, group_id);
        if sync {
            frames.push(Frame::request("group:badges", to_data(&Batch { members: assigned })));
        }
        frames
    }

    // =========================================================================
    // BADGES
    // =========================================================================

    /// Pick the next badge for a new member of `group_id`.
    ///
    /// Incrementing returns one past the current maximum, or the lowest free
    /// value once the maximum is `u32::MAX`. Random draws from
    /// `0..max(2N + 1, 10)` until it finds a value no member holds. The bound
    /// always exceeds the member count, so a free value exists.
    pub fn generate_badge(&mut self, shapes: &ShapeRegistry, group_id: Uuid) -> u32 {
        let badges: Vec<u32> = self
            .group_members(shapes, group_id)
            .iter()
            .map(|s| s.badge)
            .collect();
        let order = self
            .groups
            .get(&group_id)
            .map(|g| g.creation_order)
            .unwrap_or_default();

        match order {
            CreationOrder::Incrementing => match badges.iter().max() {
                None => 0,
                Some(max) => max
                    .checked_add(1)
                    .unwrap_or_else(|| (0..u32::MAX).find(|v| !badges.contains(v)).unwrap_or_default()),
            },
            CreationOrder::Random => {
                let bound = count_u32(badges.len())
                    .saturating_mul(2)
                    .saturating_add(1)
                    .max(MIN_RANDOM_BOUND);
                loop {
                    let value = self.rng.random_range(0..bound);
                    if !badges.contains(&value) {
                        return value;
                    }
                }
            }
        }
    }

    fn invalidate_members(&self, shapes: &mut ShapeRegistry, group_id: Uuid) {
        let layers: Vec<String> = self
            .group_members(shapes, group_id)
            .iter()
            .map(|s| s.layer.clone())
            .collect();
        for layer in layers {
            shapes.invalidate_layer(&layer);
        }
    }
}

#[cfg(test)]
#[path = "groups_test.rs"]
mod tests;
