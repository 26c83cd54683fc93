//! End-to-end: local-first edits followed by authoritative server pushes.

use tabletop_groups::charset::CharacterSet;
use tabletop_groups::config::SessionConfig;
use tabletop_groups::frame::{Data, Frame, to_data};
use tabletop_groups::session::GroupSession;
use tabletop_groups::state::{Batch, CreationOrder, Group, MemberBadge};
use uuid::Uuid;

fn open() -> (GroupSession, tokio::sync::mpsc::Receiver<Frame>) {
    GroupSession::new(&SessionConfig { rng_seed: Some(3), ..SessionConfig::default() })
}

fn add_shape(session: &mut GroupSession) -> Uuid {
    let id = Uuid::new_v4();
    let frame = Frame::request("shape:add", Data::new())
        .with_data("id", id.to_string())
        .with_data("layer", "tokens");
    session.handle_frame(&frame).unwrap();
    id
}

fn drain(rx: &mut tokio::sync::mpsc::Receiver<Frame>) -> Vec<Frame> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    frames
}

#[test]
fn server_snapshot_overrides_local_settings() {
    let (mut session, mut rx) = open();
    let shape_id = add_shape(&mut session);
    let group_id = session.create_group_for_shape(shape_id);
    session.set_character_set(group_id, CharacterSet::Latin);
    assert_eq!(session.badge_label(shape_id).as_deref(), Some("A"));

    let sent = drain(&mut rx);
    let syscalls: Vec<&str> = sent.iter().map(|f| f.syscall.as_str()).collect();
    assert_eq!(syscalls, vec!["group:create", "group:join", "group:update"]);

    // Another player switched the group back to numbers first; theirs wins.
    let authoritative = Group { id: group_id, character_set: CharacterSet::Numbers, creation_order: CreationOrder::Incrementing };
    session
        .handle_frame(&Frame::request("group:update", to_data(&authoritative)))
        .unwrap();

    assert_eq!(session.badge_label(shape_id).as_deref(), Some("1"));
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn random_reorder_then_server_badges() {
    let (mut session, mut rx) = open();
    let group_id = session.create_group();
    let members: Vec<Uuid> = (0..5).map(|_| add_shape(&mut session)).collect();
    for id in &members {
        session.add_member(group_id, *id, None);
    }

    session.set_creation_order(group_id, CreationOrder::Random);
    let badges: Vec<u32> = members
        .iter()
        .map(|id| session.shapes().get(*id).unwrap().badge)
        .collect();
    let mut sorted = badges.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), members.len());
    assert!(badges.iter().all(|b| *b < 10));

    let sent = drain(&mut rx);
    let batch: Batch<MemberBadge> = sent.last().unwrap().decode().unwrap();
    assert_eq!(batch.members.len(), members.len());

    let server = Batch { members: vec![MemberBadge { member_id: members[0], badge: 42 }] };
    session
        .handle_frame(&Frame::request("group:badges", to_data(&server)))
        .unwrap();
    assert_eq!(session.shapes().get(members[0]).unwrap().badge, 42);
    assert_eq!(session.badge_label(members[0]).as_deref(), Some("43"));
}

#[test]
fn removing_group_resets_labels() {
    let (mut session, _rx) = open();
    let a = add_shape(&mut session);
    let b = add_shape(&mut session);
    let group_id = session.create_group_for_shape(a);
    session.add_member(group_id, b, None);
    assert_eq!(session.badge_label(b).as_deref(), Some("2"));

    session.remove_group(group_id);

    assert!(!session.groups().has_group(group_id));
    assert_eq!(session.badge_label(a).as_deref(), Some("0"));
    assert_eq!(session.badge_label(b).as_deref(), Some("0"));
}
