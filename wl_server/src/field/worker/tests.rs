use super::*;
use crate::server::SessionRegistry;
use crossbeam_channel::Receiver;
use mio::{Poll, Token, Waker};
use pretty_assertions::assert_eq;
use std::sync::Arc;

/// A field with no monster spawns.
const EMPTY_FIELD: u32 = 2000;

fn test_cfg() -> FieldConfig {
  FieldConfig {
    sector_size:         15.0,
    view_radius_sectors: 2,
    pos_dirty_dist:      1.0,
    dirty_min_interval:  0.5,
  }
}

struct Harness {
  // Keeps the mock wakers' registry alive.
  _poll:    Poll,
  waker:    Arc<Waker>,
  sessions: Arc<SessionRegistry>,
  storage:  StorageHandle,
  state:    FieldState,
}

impl Harness {
  fn new(field_id: u32) -> Self {
    let poll = Poll::new().unwrap();
    let waker = Arc::new(Waker::new(poll.registry(), Token(0xfffffffe)).unwrap());
    let sessions = Arc::new(SessionRegistry::new());
    let storage = StorageHandle::new_for_test();
    let state = FieldState::new(field_id, test_cfg(), sessions.clone(), storage.clone());
    Harness { _poll: poll, waker, sessions, storage, state }
  }

  /// Binds a mock session for `player_id` and returns its packet
  /// stream.
  fn connect(&self, player_id: u64) -> Receiver<cb::Packet> {
    let (rx, sender) = crate::net::ConnSender::mock(&self.waker);
    self.sessions.bind(player_id, sender);
    rx
  }

  fn enter(&mut self, player_id: u64, pos: Vec2) {
    let player = Player::new(player_id, self.state.field_id, pos);
    self.state.handle_message(NetMessage::Enter { player });
  }
}

fn drain(rx: &Receiver<cb::Packet>) -> Vec<cb::Packet> { rx.try_iter().collect() }

#[test]
fn enter_and_move_visibility() {
  let mut h = Harness::new(EMPTY_FIELD);
  let rx_a = h.connect(1);
  let rx_b = h.connect(2);

  h.enter(1, Vec2::new(5.0, 5.0));
  // The entering client is told where it spawned.
  assert_eq!(drain(&rx_a), vec![cb::Packet::FieldCmd {
    kind:        FieldCmdKind::Enter,
    entity_type: EntityType::Player,
    entity_id:   1,
    pos:         Vec2::new(5.0, 5.0),
    prefab_name: "Paladin".into(),
  }]);

  h.enter(2, Vec2::new(6.0, 6.0));
  // A sees B arrive; B gets a snapshot of A plus its own enter.
  assert_eq!(drain(&rx_a), vec![cb::Packet::FieldCmd {
    kind:        FieldCmdKind::Enter,
    entity_type: EntityType::Player,
    entity_id:   2,
    pos:         Vec2::new(6.0, 6.0),
    prefab_name: "Paladin".into(),
  }]);
  let to_b = drain(&rx_b);
  assert_eq!(to_b.len(), 2);
  assert!(matches!(
    &to_b[0],
    cb::Packet::FieldCmd { kind: FieldCmdKind::Snapshot, entity_id: 1, .. }
  ));

  // One integration step of movement reaches both watchers, with the
  // mover's own echo included.
  h.state.handle_message(NetMessage::Move { player_id: 2, dir: Vec2::new(1.0, 0.0) });
  // Starting to move broadcasts a state change to B's watchers.
  let state_evs = drain(&rx_a);
  assert_eq!(state_evs, vec![cb::Packet::AiStateEvent {
    entity_type: EntityType::Player,
    entity_id:   2,
    state:       AiStateKind::Chase,
  }]);
  drain(&rx_b);

  h.state.update_world(PLAYER_STEP + 0.001);
  let to_a = drain(&rx_a);
  assert_eq!(to_a.len(), 1);
  let cb::Packet::FieldCmd { kind, entity_id, pos, .. } = &to_a[0] else {
    panic!("expected a field cmd, got {to_a:?}")
  };
  assert_eq!((*kind, *entity_id), (FieldCmdKind::Move, 2));
  assert!(pos.x > 6.0);
  assert_eq!(drain(&rx_b), to_a);
}

#[test]
fn move_dirty_marks_are_debounced() {
  // Two seconds of continuous movement at 4.5 u/s with a 1.0 unit
  // distance threshold and a 0.5 s interval: at most five marks.
  let mut h = Harness::new(EMPTY_FIELD);
  h.enter(1, Vec2::new(10.0, 10.0));

  for _ in 0..40 {
    h.state.handle_message(NetMessage::Move { player_id: 1, dir: Vec2::new(1.0, 0.0) });
    h.state.update_world(0.05);
  }

  assert!((2.0 - h.state.world_time()).abs() < 1e-6);
  let marks = h.storage.rt().pending();
  assert!((3..=5).contains(&marks), "expected 3..=5 dirty marks, got {marks}");
  // All marks are for the one player, so the hub holds one entry.
  assert_eq!(h.storage.dirty().len(), 1);
}

#[test]
fn players_auto_stop_without_input() {
  let mut h = Harness::new(EMPTY_FIELD);
  h.enter(1, Vec2::new(10.0, 10.0));

  h.state.handle_message(NetMessage::Move { player_id: 1, dir: Vec2::new(0.0, 1.0) });
  for _ in 0..10 {
    h.state.update_world(0.1);
  }

  let player = h.state.player(1).unwrap();
  assert!(!player.move_state().moving);
  assert!(player.pos().y > 10.0);
  // The stop itself is a significant change and was persisted.
  assert!(h.storage.rt().pending() >= 1);
}

#[test]
fn explicit_stop_input_halts_and_broadcasts_idle() {
  let mut h = Harness::new(EMPTY_FIELD);
  let rx_a = h.connect(1);
  h.enter(1, Vec2::new(10.0, 10.0));

  h.state.handle_message(NetMessage::Move { player_id: 1, dir: Vec2::new(0.0, 1.0) });
  h.state.update_world(0.1);
  drain(&rx_a);

  h.state.handle_message(NetMessage::Move { player_id: 1, dir: Vec2::default() });
  assert!(!h.state.player(1).unwrap().move_state().moving);
  // The player watches its own sector, so it hears the Idle state.
  assert!(drain(&rx_a).contains(&cb::Packet::AiStateEvent {
    entity_type: EntityType::Player,
    entity_id:   1,
    state:       AiStateKind::Idle,
  }));
}

#[test]
fn skills_resolve_combat_and_kills() {
  let mut h = Harness::new(STARTING_FIELD);
  let rx = h.connect(1);
  // Next to the first spawned monster.
  h.enter(1, Vec2::new(12.5, 16.0));
  drain(&rx);

  // Template 0 (SkeletonBow): 60 hp, 2 def. Skill 2 deals 43.
  h.state.handle_message(NetMessage::Skill { player_id: 1, target_id: 1000, skill: 2 });
  let first = drain(&rx);
  assert!(first.contains(&cb::Packet::SkillCmdAck {
    skill:     2,
    target_id: 1000,
    ok:        true,
    err:       SkillError::None,
  }));
  assert!(first.contains(&cb::Packet::CombatEvent {
    attacker_type: EntityType::Player,
    attacker_id:   1,
    target_type:   EntityType::Monster,
    target_id:     1000,
    damage:        43,
    remain_hp:     17,
  }));

  // The second hit is lethal and the kill is broadcast.
  h.state.handle_message(NetMessage::Skill { player_id: 1, target_id: 1000, skill: 2 });
  let second = drain(&rx);
  assert!(second.contains(&cb::Packet::AiStateEvent {
    entity_type: EntityType::Monster,
    entity_id:   1000,
    state:       AiStateKind::Dead,
  }));

  // Dead monsters are not valid targets.
  h.state.handle_message(NetMessage::Skill { player_id: 1, target_id: 1000, skill: 2 });
  assert!(drain(&rx).contains(&cb::Packet::SkillCmdAck {
    skill:     2,
    target_id: 1000,
    ok:        false,
    err:       SkillError::BadTarget,
  }));
}
