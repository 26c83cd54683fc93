//! Session: one game session's shapes, groups, and outbound channel.
//!
//! DESIGN
//! ======
//! A `GroupSession` owns the shape registry, the group manager, and the
//! outbox for as long as the player stays in the game. Local calls apply
//! immediately and push their notices to the outbox. Inbound server frames
//! go through `handle_frame`, which applies them with sync off so nothing
//! echoes back.
//!
//! LIFECYCLE
//! =========
//! 1. `GroupSession::new` → caller forwards the returned receiver to the socket
//! 2. Local edits → outbox; server pushes → `handle_frame`
//! 3. Joins naming an unknown group are parked and a `group:info` request
//!    goes out; the reply registers the group and replays the parked joins
//! 4. `close` drops all state

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::charset::CharacterSet;
use crate::config::SessionConfig;
use crate::frame::{Data, FRAME_MESSAGE, Frame, Status};
use crate::services::groups::{GroupError, GroupManager};
use crate::state::{Batch, CreationOrder, Group, MemberBadge, MemberJoin, MemberLeave, Shape, ShapeRegistry};

// =============================================================================
// OUTBOX
// =============================================================================

/// Fire-and-forget sender for outbound frames.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Frame>,
}

impl Outbox {
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue frames without waiting. Frames that do not fit are dropped.
    pub fn emit(&self, frames: impl IntoIterator<Item = Frame>) {
        for frame in frames {
            match self.tx.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(frame)) => {
                    warn!(syscall = %frame.syscall, "outbox full; frame dropped");
                }
                Err(TrySendError::Closed(frame)) => {
                    warn!(syscall = %frame.syscall, "outbox closed; frame dropped");
                }
            }
        }
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct MemberSnapshot {
    pub member_id: Uuid,
    pub badge: u32,
    pub label: String,
    pub show_badge: bool,
}

/// A group with its members' rendered badges.
#[derive(Debug, Clone, Serialize)]
pub struct GroupSnapshot {
    #[serde(flatten)]
    pub group: Group,
    pub members: Vec<MemberSnapshot>,
}

#[derive(Deserialize)]
struct IdPayload {
    id: Uuid,
}

// =============================================================================
// SESSION
// =============================================================================

pub struct GroupSession {
    shapes: ShapeRegistry,
    groups: GroupManager,
    outbox: Outbox,
    /// Group ID -> (member, badge) joins waiting for the group record.
    pending: HashMap<Uuid, Vec<(Uuid, u32)>>,
    /// Outstanding `group:info` request ID -> group ID.
    info_requests: HashMap<Uuid, Uuid>,
}

impl GroupSession {
    /// Open a session. The receiver yields every outbound frame.
    #[must_use]
    pub fn new(config: &SessionConfig) -> (Self, mpsc::Receiver<Frame>) {
        let (outbox, rx) = Outbox::channel(config.outbox_capacity);
        let session = Self {
            shapes: ShapeRegistry::new(),
            groups: GroupManager::new(config.rng()),
            outbox,
            pending: HashMap::new(),
            info_requests: HashMap::new(),
        };
        info!(capacity = config.outbox_capacity, seeded = config.rng_seed.is_some(), "group session opened");
        (session, rx)
    }

    /// Drop all shapes, groups, and parked joins.
    pub fn close(&mut self) {
        self.shapes.clear();
        self.groups.clear();
        self.pending.clear();
        self.info_requests.clear();
        info!("group session closed");
    }

    #[must_use]
    pub fn shapes(&self) -> &ShapeRegistry {
        &self.shapes
    }

    #[must_use]
    pub fn groups(&self) -> &GroupManager {
        &self.groups
    }

    /// Layers that need a redraw since the last call.
    pub fn take_invalidated(&mut self) -> std::collections::BTreeSet<String> {
        self.shapes.take_invalidated()
    }

    #[must_use]
    pub fn badge_label(&self, member_id: Uuid) -> Option<String> {
        self.groups.badge_label(&self.shapes, member_id)
    }

    /// Every group sorted by ID, members in enumeration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<GroupSnapshot> {
        let mut groups: Vec<&Group> = self.groups.groups().collect();
        groups.sort_by_key(|g| g.id);
        groups
            .into_iter()
            .map(|group| GroupSnapshot {
                group: group.clone(),
                members: self
                    .groups
                    .group_members(&self.shapes, group.id)
                    .into_iter()
                    .map(|shape| MemberSnapshot {
                        member_id: shape.id,
                        badge: shape.badge,
                        label: group.character_set.label(shape.badge),
                        show_badge: shape.show_badge,
                    })
                    .collect(),
            })
            .collect()
    }

    // =========================================================================
    // LOCAL OPERATIONS
    // =========================================================================

    pub fn create_group(&mut self) -> Uuid {
        let (group_id, frames) = self.groups.create_group(true);
        self.outbox.emit(frames);
        group_id
    }

    pub fn create_group_for_shape(&mut self, shape_id: Uuid) -> Uuid {
        let (group_id, frames) = self.groups.create_group_for_shape(&mut self.shapes, shape_id);
        self.outbox.emit(frames);
        group_id
    }

    pub fn remove_group(&mut self, group_id: Uuid) {
        let frames = self.groups.remove_group(&mut self.shapes, group_id, true);
        self.pending.remove(&group_id);
        self.outbox.emit(frames);
    }

    pub fn add_member(&mut self, group_id: Uuid, member_id: Uuid, badge: Option<u32>) {
        let frames = self.groups.add_member(&mut self.shapes, group_id, member_id, badge, true);
        self.outbox.emit(frames);
    }

    pub fn remove_member(&mut self, group_id: Uuid, member_id: Uuid) {
        let frames = self.groups.remove_member(&mut self.shapes, group_id, member_id, true);
        self.outbox.emit(frames);
    }

    pub fn set_character_set(&mut self, group_id: Uuid, character_set: CharacterSet) {
        let frames = self.groups.set_character_set(&mut self.shapes, group_id, character_set, true);
        self.outbox.emit(frames);
    }

    pub fn set_creation_order(&mut self, group_id: Uuid, creation_order: CreationOrder) {
        let frames = self.groups.set_creation_order(&mut self.shapes, group_id, creation_order, true);
        self.outbox.emit(frames);
    }

    pub fn set_show_badge(&mut self, shape_id: Uuid, visible: bool) {
        let Some(shape) = self.shapes.get_mut(shape_id) else {
            return;
        };
        let frame = shape.set_show_badge(visible, true);
        let layer = shape.layer.clone();
        self.shapes.invalidate_layer(&layer);
        self.outbox.emit(frame);
    }

    /// Ask the server for a group record. The reply arrives via `handle_frame`.
    pub fn request_group_info(&mut self, group_id: Uuid) -> Uuid {
        let frame = Frame::request("group:info", Data::new()).with_data("id", group_id.to_string());
        let request_id = frame.id;
        self.info_requests.insert(request_id, group_id);
        self.outbox.emit([frame]);
        request_id
    }

    // =========================================================================
    // INBOUND DISPATCH
    // =========================================================================

    /// Apply a frame pushed by the server, routed by syscall prefix.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` for payloads that do not decode, `Rejected` for
    /// error replies, and `UnknownSyscall` for anything this session does
    /// not handle. State is untouched in every error case.
    pub fn handle_frame(&mut self, frame: &Frame) -> Result<(), GroupError> {
        debug!(syscall = %frame.syscall, status = ?frame.status, "inbound frame");

        if frame.status == Status::Error {
            if let Some(parent_id) = frame.parent_id {
                self.settle_info_request(parent_id);
            }
            let message = frame
                .data
                .get(FRAME_MESSAGE)
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(GroupError::Rejected { syscall: frame.syscall.clone(), message });
        }

        // Bare acknowledgements carry nothing to apply. For a `group:info`
        // request this means the server has no such group.
        if frame.status.is_terminal() && frame.data.is_empty() {
            if let Some(parent_id) = frame.parent_id {
                self.settle_info_request(parent_id);
                return Ok(());
            }
        }

        match frame.prefix() {
            "group" => self.handle_group(frame),
            "shape" => self.handle_shape(frame),
            _ => Err(GroupError::UnknownSyscall(frame.syscall.clone())),
        }
    }

    fn handle_group(&mut self, frame: &Frame) -> Result<(), GroupError> {
        match frame.syscall.as_str() {
            "group:create" => {
                let group: Group = decode(frame)?;
                let group_id = group.id;
                self.groups.add_group(group, false);
                self.flush_pending(group_id);
            }
            "group:update" => {
                let group: Group = decode(frame)?;
                let group_id = group.id;
                self.groups.update_group_from_server(&mut self.shapes, group);
                self.flush_pending(group_id);
            }
            "group:info" => self.handle_group_info(frame)?,
            "group:remove" => {
                let IdPayload { id } = decode(frame)?;
                self.groups.remove_group(&mut self.shapes, id, false);
                self.pending.remove(&id);
            }
            "group:join" => {
                let batch: Batch<MemberJoin> = decode(frame)?;
                for join in batch.members {
                    self.join_or_park(join.group_id, join.member_id, join.badge);
                }
            }
            "group:leave" => {
                let batch: Batch<MemberLeave> = decode(frame)?;
                for leave in batch.members {
                    self.groups.remove_member(&mut self.shapes, leave.group_id, leave.member_id, false);
                }
            }
            "group:badges" => {
                let batch: Batch<MemberBadge> = decode(frame)?;
                self.groups.apply_badges(&mut self.shapes, &batch.members);
            }
            other => return Err(GroupError::UnknownSyscall(other.to_string())),
        }
        Ok(())
    }

    fn handle_shape(&mut self, frame: &Frame) -> Result<(), GroupError> {
        match frame.syscall.as_str() {
            "shape:add" => {
                let mut shape: Shape = decode(frame)?;
                let group_id = shape.group_id.take();
                let (shape_id, badge) = (shape.id, shape.badge);
                if let Some(previous) = self.shapes.get(shape_id).and_then(|s| s.group_id) {
                    self.groups.remove_member(&mut self.shapes, previous, shape_id, false);
                }
                // Joins that arrived before the shape left its ID in a member list.
                self.groups.forget_member(shape_id);
                self.shapes.insert(shape);
                if let Some(group_id) = group_id {
                    self.join_or_park(group_id, shape_id, badge);
                }
            }
            "shape:remove" => {
                let IdPayload { id } = decode(frame)?;
                if let Some(group_id) = self.shapes.get(id).and_then(|s| s.group_id) {
                    self.groups.remove_member(&mut self.shapes, group_id, id, false);
                }
                self.groups.forget_member(id);
                for parked in self.pending.values_mut() {
                    parked.retain(|(member_id, _)| *member_id != id);
                }
                self.shapes.remove(id);
            }
            other => return Err(GroupError::UnknownSyscall(other.to_string())),
        }
        Ok(())
    }

    fn handle_group_info(&mut self, frame: &Frame) -> Result<(), GroupError> {
        if frame.status == Status::Request {
            debug!("ignoring group:info request from server");
            return Ok(());
        }
        let group: Group = decode(frame)?;
        if let Some(parent_id) = frame.parent_id {
            self.info_requests.remove(&parent_id);
        }
        let group_id = group.id;
        self.groups.add_group(group, false);
        self.flush_pending(group_id);
        Ok(())
    }

    /// Join now if the group is known; otherwise park the join and fetch
    /// the group record once.
    fn join_or_park(&mut self, group_id: Uuid, member_id: Uuid, badge: u32) {
        if self.groups.has_group(group_id) {
            self.groups.add_member(&mut self.shapes, group_id, member_id, Some(badge), false);
            return;
        }

        self.pending.entry(group_id).or_default().push((member_id, badge));
        if !self.info_requests.values().any(|id| *id == group_id) {
            debug!(%group_id, "join references unknown group; fetching");
            self.request_group_info(group_id);
        }
    }

    /// Close out a `group:info` request that produced no group record.
    /// Joins parked on it are dropped; a later join fetches again.
    fn settle_info_request(&mut self, request_id: Uuid) {
        let Some(group_id) = self.info_requests.remove(&request_id) else {
            return;
        };
        let dropped = self.pending.remove(&group_id).map_or(0, |parked| parked.len());
        debug!(%group_id, dropped, "group:info returned no group; parked joins dropped");
    }

    fn flush_pending(&mut self, group_id: Uuid) {
        let Some(parked) = self.pending.remove(&group_id) else {
            return;
        };
        for (member_id, badge) in parked {
            self.groups.add_member(&mut self.shapes, group_id, member_id, Some(badge), false);
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(frame: &Frame) -> Result<T, GroupError> {
    frame.decode().map_err(|source| GroupError::Malformed { syscall: frame.syscall.clone(), source })
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
