//! The per-field simulation worker.
//!
//! One thread per field, driving a wall-clock outer loop with two
//! fixed-step accumulators (players at 30 Hz, monsters at 10 Hz).
//! Inbound input arrives on a bounded queue; outbound packets go
//! through the session registry, whose senders never block this
//! thread.

use super::{
  aoi::{AoiEvent, AoiEventKind, AoiWorld},
  FieldConfig,
};
use crate::{
  is_monster_id,
  monster::{AiState, MonsterEnv, MonsterWorld, PlayerState, Stats},
  player::{Player, PLAYER_SPEED},
  server::SessionRegistry,
  storage::{StorageHandle, UserSnapshot},
  MONSTER_ID_START,
};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::{
  collections::HashMap,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  thread,
  thread::JoinHandle,
  time::{Duration, Instant},
};
use wl_common::{
  math::Vec2,
  net::{cb, AiStateKind, EntityType, FieldCmdKind, SkillError},
};

/// Fixed step for player integration.
const PLAYER_STEP: f32 = 1.0 / 30.0;
/// Fixed step for monster systems.
const MONSTER_STEP: f32 = 1.0 / 10.0;
// Sub-step bounds. When the outer loop falls behind, simulation slows
// down instead of entering an unbounded catch-up spiral.
const MAX_PLAYER_STEPS: u32 = 5;
const MAX_MONSTER_STEPS: u32 = 3;

/// Target length of one outer loop iteration.
const OUTER_TICK: Duration = Duration::from_millis(15);
/// Most messages handled per outer iteration.
const MSG_BUDGET: u32 = 128;
/// Queue capacity. Pushes past this are refused, never block.
const QUEUE_CAP: usize = 1024;

/// A player stops moving this long after its last move input.
const AUTO_STOP_SECS: f64 = 0.5;

const PLAYER_PREFAB: &str = "Paladin";
const DEFAULT_PREFAB: &str = "Default";

/// The field every new login is pointed at, pre-populated with
/// monsters.
pub const STARTING_FIELD: u32 = 1000;

/// Inbound work for a field worker. Decoded by the I/O thread; the
/// worker never parses frames.
#[derive(Debug)]
pub enum NetMessage {
  /// The player enters this field and is owned by this worker from
  /// now on.
  Enter { player: Player },
  Leave { player_id: u64 },
  Move { player_id: u64, dir: Vec2 },
  Skill { player_id: u64, target_id: u64, skill: u8 },
}

/// Handle to a running field worker. Owned by the [`FieldManager`].
///
/// [`FieldManager`]: super::FieldManager
pub struct FieldWorker {
  field_id: u32,
  tx:       Sender<NetMessage>,
  running:  Arc<AtomicBool>,
  handle:   parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl FieldWorker {
  pub fn spawn(
    field_id: u32,
    cfg: FieldConfig,
    sessions: Arc<SessionRegistry>,
    storage: StorageHandle,
  ) -> Self {
    let (tx, rx) = bounded(QUEUE_CAP);
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    let th = thread::Builder::new()
      .name(format!("field-{field_id}"))
      .spawn(move || {
        let mut state = FieldState::new(field_id, cfg, sessions, storage);
        state.run(rx, r);
      })
      .expect("failed to spawn field worker thread");
    info!("field {field_id} started");
    FieldWorker { field_id, tx, running, handle: parking_lot::Mutex::new(Some(th)) }
  }

  /// Queues a message. Returns false when the queue is full.
  pub fn push(&self, msg: NetMessage) -> bool { self.tx.try_send(msg).is_ok() }

  pub fn field_id(&self) -> u32 { self.field_id }

  pub fn stop(&self) {
    self.running.store(false, Ordering::SeqCst);
    if let Some(th) = self.handle.lock().take() {
      let _ = th.join();
    }
    info!("field {} stopped", self.field_id);
  }
}

struct MonsterTemplate {
  name:   &'static str,
  hp:     i32,
  sp:     i32,
  atk:    i32,
  def:    i32,
  archer: bool,
}

const MONSTER_TEMPLATES: [MonsterTemplate; 9] = [
  MonsterTemplate { name: "SkeletonBow", hp: 60, sp: 10, atk: 9, def: 2, archer: true },
  MonsterTemplate { name: "GoblinBow", hp: 50, sp: 10, atk: 8, def: 1, archer: true },
  MonsterTemplate { name: "OrcBow", hp: 90, sp: 10, atk: 11, def: 4, archer: true },
  MonsterTemplate { name: "SkeletonSword", hp: 80, sp: 5, atk: 12, def: 4, archer: false },
  MonsterTemplate { name: "GoblinSword", hp: 70, sp: 5, atk: 10, def: 3, archer: false },
  MonsterTemplate { name: "OrcSword", hp: 120, sp: 5, atk: 14, def: 6, archer: false },
  MonsterTemplate { name: "SkeletonWand", hp: 55, sp: 30, atk: 13, def: 1, archer: false },
  MonsterTemplate { name: "GoblinWand", hp: 45, sp: 30, atk: 11, def: 1, archer: false },
  MonsterTemplate { name: "OrcWand", hp: 85, sp: 30, atk: 15, def: 3, archer: false },
];

/// Everything the worker thread owns. Nothing in here is shared; the
/// only ways in are the message queue, and the only ways out are the
/// session senders and the storage handle.
pub(crate) struct FieldState {
  field_id: u32,
  cfg:      FieldConfig,
  aoi:      AoiWorld,
  players:  HashMap<u64, Player>,
  monsters: MonsterWorld,
  /// Monster prefab names, read when building outbound packets. Kept
  /// out of the component stores so event sinks can read them while a
  /// system holds the stores mutably.
  prefabs:  HashMap<u64, String>,
  sessions: Arc<SessionRegistry>,
  storage:  StorageHandle,

  world_time:      f64,
  player_acc:      f32,
  monster_acc:     f32,
  next_monster_id: u64,
}

impl FieldState {
  pub(crate) fn new(
    field_id: u32,
    cfg: FieldConfig,
    sessions: Arc<SessionRegistry>,
    storage: StorageHandle,
  ) -> Self {
    let mut state = FieldState {
      field_id,
      aoi: AoiWorld::new(cfg.sector_size, cfg.view_radius_sectors),
      cfg,
      players: HashMap::new(),
      monsters: MonsterWorld::new(),
      prefabs: HashMap::new(),
      sessions,
      storage,
      world_time: 0.0,
      player_acc: 0.0,
      monster_acc: 0.0,
      next_monster_id: MONSTER_ID_START,
    };
    if field_id == STARTING_FIELD {
      state.spawn_monster_grid(300, Vec2::new(0.0, 0.0), Vec2::new(500.0, 500.0));
    }
    state
  }

  fn run(&mut self, rx: Receiver<NetMessage>, running: Arc<AtomicBool>) {
    let mut last = Instant::now();
    while running.load(Ordering::SeqCst) {
      let now = Instant::now();
      let dt = now.duration_since(last).as_secs_f32();
      last = now;
      self.update_world(dt);

      // Park on the queue for the rest of the tick, handling at most
      // MSG_BUDGET messages. The bounded wait keeps the tick going
      // even with no inbound traffic.
      let deadline = now + OUTER_TICK;
      let mut budget = MSG_BUDGET;
      while budget > 0 {
        let Some(timeout) = deadline.checked_duration_since(Instant::now()) else { break };
        match rx.recv_timeout(timeout) {
          Ok(msg) => {
            self.handle_message(msg);
            budget -= 1;
          }
          Err(RecvTimeoutError::Timeout) => break,
          Err(RecvTimeoutError::Disconnected) => return,
        }
      }
      if let Some(rest) = deadline.checked_duration_since(Instant::now()) {
        spin_sleep::sleep(rest);
      }
    }
  }

  pub(crate) fn handle_message(&mut self, msg: NetMessage) {
    match msg {
      NetMessage::Enter { player } => self.add_player(player),
      NetMessage::Leave { player_id } => self.remove_player(player_id),
      NetMessage::Move { player_id, dir } => self.on_move_input(player_id, dir),
      NetMessage::Skill { player_id, target_id, skill } => {
        self.handle_skill(player_id, target_id, skill)
      }
    }
  }

  /// Advances the simulation by wall-clock `dt`, running however many
  /// whole fixed steps fit (bounded, to cap catch-up).
  pub(crate) fn update_world(&mut self, dt: f32) {
    if dt <= 0.0 {
      return;
    }
    self.world_time += dt as f64;

    self.player_acc += dt;
    let mut loops = 0;
    while self.player_acc >= PLAYER_STEP && loops < MAX_PLAYER_STEPS {
      self.tick_players(PLAYER_STEP);
      self.player_acc -= PLAYER_STEP;
      loops += 1;
    }

    self.monster_acc += dt;
    let mut loops = 0;
    while self.monster_acc >= MONSTER_STEP && loops < MAX_MONSTER_STEPS {
      self.tick_monsters(MONSTER_STEP);
      self.monster_acc -= MONSTER_STEP;
      loops += 1;
    }
  }

  fn add_player(&mut self, player: Player) {
    let pid = player.id();
    let pos = player.pos();
    self.players.insert(pid, player);

    let FieldState { aoi, sessions, prefabs, .. } = self;
    aoi.add_entity(pid, true, pos, &mut |watcher, ev| {
      send_aoi_event(sessions, prefabs, watcher, ev)
    });
    // Tell the entering client where it spawned. Its own identity was
    // already delivered with the EnterFieldAck, before any of the
    // snapshot events above.
    sessions.send(pid, cb::Packet::FieldCmd {
      kind:        FieldCmdKind::Enter,
      entity_type: EntityType::Player,
      entity_id:   pid,
      pos,
      prefab_name: PLAYER_PREFAB.into(),
    });
    info!("player {pid} entered field {}", self.field_id);
  }

  fn remove_player(&mut self, player_id: u64) {
    let FieldState { aoi, sessions, prefabs, players, .. } = self;
    aoi.remove_entity(player_id, &mut |watcher, ev| {
      send_aoi_event(sessions, prefabs, watcher, ev)
    });
    if players.remove(&player_id).is_some() {
      info!("player {player_id} left field {}", self.field_id);
    }
  }

  fn on_move_input(&mut self, player_id: u64, dir: Vec2) {
    let Some(player) = self.players.get_mut(&player_id) else { return };
    let mv = player.move_state_mut();
    mv.last_input_time = self.world_time;

    if dir.len_sq() < 1e-4 {
      if !mv.moving {
        return;
      }
      mv.moving = false;
      mv.dir = Vec2::default();
      mv.speed = 0.0;
      broadcast_actor_state(
        &self.aoi,
        &self.sessions,
        player_id,
        EntityType::Player,
        AiStateKind::Idle,
      );
      return;
    }

    let was_moving = mv.moving;
    mv.moving = true;
    mv.dir = dir.normalized();
    mv.speed = PLAYER_SPEED;

    if !was_moving {
      broadcast_actor_state(
        &self.aoi,
        &self.sessions,
        player_id,
        EntityType::Player,
        AiStateKind::Chase,
      );
    }
  }

  fn handle_skill(&mut self, player_id: u64, target_id: u64, skill: u8) {
    if !self.players.contains_key(&player_id) {
      self.sessions.send(player_id, cb::Packet::SkillCmdAck {
        skill,
        target_id,
        ok: false,
        err: SkillError::InvalidState,
      });
      return;
    }
    let target_alive =
      self.monsters.ai.get(target_id).map_or(false, |ai| ai.state != AiState::Dead);
    if !target_alive {
      self.sessions.send(player_id, cb::Packet::SkillCmdAck {
        skill,
        target_id,
        ok: false,
        err: SkillError::BadTarget,
      });
      return;
    }

    broadcast_actor_state(
      &self.aoi,
      &self.sessions,
      player_id,
      EntityType::Player,
      AiStateKind::Attack,
    );

    let FieldState { aoi, players, monsters, prefabs, sessions, storage, world_time, .. } = self;
    let mut env = WorkerEnv { aoi, players, prefabs, sessions, storage, world_time: *world_time };
    let died = monsters.player_attack_monster(player_id, target_id, skill, &mut env);

    self.sessions.send(player_id, cb::Packet::SkillCmdAck {
      skill,
      target_id,
      ok: true,
      err: SkillError::None,
    });
    if died {
      broadcast_actor_state(
        &self.aoi,
        &self.sessions,
        target_id,
        EntityType::Monster,
        AiStateKind::Dead,
      );
    }
  }

  fn tick_players(&mut self, step: f32) {
    let world_time = self.world_time;
    let FieldState { players, aoi, sessions, prefabs, storage, cfg, .. } = self;

    for (&pid, player) in players.iter_mut() {
      let mv = player.move_state_mut();
      if mv.moving && world_time - mv.last_input_time > AUTO_STOP_SECS {
        mv.moving = false;
        mv.dir = Vec2::default();
        mv.speed = 0.0;
        broadcast_actor_state(aoi, sessions, pid, EntityType::Player, AiStateKind::Idle);
        mark_player_dirty(storage, player, world_time);
        continue;
      }
      if !mv.moving {
        continue;
      }

      let old = player.pos();
      let mv = player.move_state();
      let new = old + mv.dir * mv.speed * step;
      if !is_walkable(old, new) {
        continue;
      }
      player.set_pos(new);
      aoi.move_entity(pid, new, &mut |watcher, ev| {
        send_aoi_event(sessions, prefabs, watcher, ev)
      });

      let moved_enough =
        new.dist_sq(player.last_dirty_pos()) >= cfg.pos_dirty_dist * cfg.pos_dirty_dist;
      let waited_enough = world_time - player.last_dirty_mark_time() >= cfg.dirty_min_interval;
      if moved_enough && waited_enough {
        mark_player_dirty(storage, player, world_time);
      }
    }
  }

  fn tick_monsters(&mut self, step: f32) {
    let FieldState { aoi, players, monsters, prefabs, sessions, storage, world_time, .. } = self;
    let mut env = WorkerEnv { aoi, players, prefabs, sessions, storage, world_time: *world_time };
    monsters.update(step, &mut env);
  }

  fn spawn_monster_grid(&mut self, count: usize, min: Vec2, max: Vec2) {
    const COLS: usize = 20;
    let rows = (count + COLS - 1) / COLS;
    let cell_w = (max.x - min.x) / COLS as f32;
    let cell_h = (max.y - min.y) / rows as f32;

    for i in 0..count {
      let col = i % COLS;
      let row = i / COLS;
      let pos = Vec2::new(
        (min.x + (col as f32 + 0.5) * cell_w).clamp(min.x, max.x),
        (min.y + (row as f32 + 0.5) * cell_h).clamp(min.y, max.y),
      );

      let tpl = &MONSTER_TEMPLATES[i % MONSTER_TEMPLATES.len()];
      let id = self.next_monster_id;
      self.next_monster_id += 1;

      self.monsters.create_monster(
        id,
        pos,
        Stats { hp: tpl.hp, max_hp: tpl.hp, sp: tpl.sp, max_sp: tpl.sp, atk: tpl.atk, def: tpl.def },
        tpl.archer,
      );
      self.prefabs.insert(id, tpl.name.into());

      let FieldState { aoi, sessions, prefabs, .. } = self;
      aoi.add_entity(id, false, pos, &mut |watcher, ev| {
        send_aoi_event(sessions, prefabs, watcher, ev)
      });
    }
    info!("field {}: spawned {count} monsters", self.field_id);
  }

  #[cfg(test)]
  pub(crate) fn world_time(&self) -> f64 { self.world_time }
  #[cfg(test)]
  pub(crate) fn player(&self, id: u64) -> Option<&Player> { self.players.get(&id) }
}

/// Collision seam. Fields carry no geometry yet, so every move is
/// legal.
fn is_walkable(_from: Vec2, _to: Vec2) -> bool { true }

fn prefab_name(prefabs: &HashMap<u64, String>, id: u64) -> String {
  if is_monster_id(id) {
    prefabs.get(&id).cloned().unwrap_or_else(|| DEFAULT_PREFAB.into())
  } else {
    PLAYER_PREFAB.into()
  }
}

fn entity_type_of(id: u64) -> EntityType {
  if is_monster_id(id) {
    EntityType::Monster
  } else {
    EntityType::Player
  }
}

fn send_aoi_event(
  sessions: &SessionRegistry,
  prefabs: &HashMap<u64, String>,
  watcher: u64,
  ev: &AoiEvent,
) {
  let kind = match ev.kind {
    AoiEventKind::Enter => FieldCmdKind::Enter,
    AoiEventKind::Leave => FieldCmdKind::Leave,
    AoiEventKind::Move => FieldCmdKind::Move,
    AoiEventKind::Snapshot => FieldCmdKind::Snapshot,
  };
  sessions.send(watcher, cb::Packet::FieldCmd {
    kind,
    entity_type: entity_type_of(ev.subject_id),
    entity_id: ev.subject_id,
    pos: ev.pos,
    prefab_name: prefab_name(prefabs, ev.subject_id),
  });
}

fn broadcast_actor_state(
  aoi: &AoiWorld,
  sessions: &SessionRegistry,
  id: u64,
  entity_type: EntityType,
  state: AiStateKind,
) {
  aoi.for_each_watcher(id, |watcher| {
    sessions.send(watcher, cb::Packet::AiStateEvent { entity_type, entity_id: id, state });
  });
}

fn broadcast_stat_event(
  aoi: &AoiWorld,
  sessions: &SessionRegistry,
  id: u64,
  entity_type: EntityType,
  hp: i32,
  max_hp: i32,
  sp: i32,
  max_sp: i32,
) {
  aoi.for_each_watcher(id, |watcher| {
    sessions.send(watcher, cb::Packet::StatEvent {
      entity_type,
      entity_id: id,
      hp,
      max_hp,
      sp,
      max_sp,
    });
  });
}

/// Marks a player dirty: real-time snapshot, hub entry, and the
/// debounce bookkeeping, together.
fn mark_player_dirty(storage: &StorageHandle, player: &mut Player, world_time: f64) {
  storage.enqueue_rt(snapshot_of(player));
  storage.mark_dirty(player.id());
  player.record_dirty_mark(world_time);
}

fn snapshot_of(player: &Player) -> UserSnapshot {
  let stats = player.stats();
  UserSnapshot {
    uid: player.id(),
    x: player.pos().x,
    z: player.pos().y,
    hp: stats.hp,
    sp: stats.sp,
    inv_json: String::new(),
  }
}

fn to_wire_ai_state(state: AiState) -> AiStateKind {
  match state {
    AiState::Idle => AiStateKind::Idle,
    AiState::Patrol => AiStateKind::Patrol,
    AiState::Chase => AiStateKind::Chase,
    AiState::Attack => AiStateKind::Attack,
    AiState::Flee => AiStateKind::Flee,
    AiState::Dead => AiStateKind::Dead,
  }
}

fn to_wire_player_state(state: PlayerState) -> AiStateKind {
  match state {
    PlayerState::Idle => AiStateKind::Idle,
    PlayerState::Chase => AiStateKind::Chase,
    PlayerState::Attack => AiStateKind::Attack,
    PlayerState::Dead => AiStateKind::Dead,
  }
}

/// The capability bundle lent to the monster systems for one tick:
/// disjoint borrows of the worker's state, so the ECS can mutate the
/// AOI and players while it holds its own component stores.
struct WorkerEnv<'a> {
  aoi:        &'a mut AoiWorld,
  players:    &'a mut HashMap<u64, Player>,
  prefabs:    &'a HashMap<u64, String>,
  sessions:   &'a SessionRegistry,
  storage:    &'a StorageHandle,
  world_time: f64,
}

impl MonsterEnv for WorkerEnv<'_> {
  fn find_closest_player(&self, pos: Vec2, max_dist: f32) -> Option<u64> {
    let mut closest = None;
    let mut closest_dist_sq = max_dist * max_dist;
    for (&pid, player) in self.players.iter() {
      let dist_sq = player.pos().dist_sq(pos);
      if dist_sq < closest_dist_sq {
        closest_dist_sq = dist_sq;
        closest = Some(pid);
      }
    }
    closest
  }

  fn player_pos(&self, player_id: u64) -> Option<Vec2> {
    self.players.get(&player_id).map(|p| p.pos())
  }

  fn move_in_aoi(&mut self, id: u64, pos: Vec2) {
    let aoi = &mut *self.aoi;
    let sessions = self.sessions;
    let prefabs = self.prefabs;
    aoi.move_entity(id, pos, &mut |watcher, ev| send_aoi_event(sessions, prefabs, watcher, ev));
  }

  fn remove_from_aoi(&mut self, id: u64) {
    let aoi = &mut *self.aoi;
    let sessions = self.sessions;
    let prefabs = self.prefabs;
    aoi.remove_entity(id, &mut |watcher, ev| send_aoi_event(sessions, prefabs, watcher, ev));
  }

  fn broadcast_ai_state(&mut self, monster_id: u64, state: AiState) {
    broadcast_actor_state(
      self.aoi,
      self.sessions,
      monster_id,
      EntityType::Monster,
      to_wire_ai_state(state),
    );
  }

  fn broadcast_player_state(&mut self, player_id: u64, state: PlayerState) {
    broadcast_actor_state(
      self.aoi,
      self.sessions,
      player_id,
      EntityType::Player,
      to_wire_player_state(state),
    );
  }

  fn broadcast_monster_hit_player(&mut self, monster_id: u64, player_id: u64, damage: i32, remain_hp: i32) {
    // The hit report goes to the player who was struck.
    self.sessions.send(player_id, cb::Packet::CombatEvent {
      attacker_type: EntityType::Monster,
      attacker_id:   monster_id,
      target_type:   EntityType::Player,
      target_id:     player_id,
      damage,
      remain_hp,
    });
  }

  fn broadcast_player_hit_monster(&mut self, player_id: u64, monster_id: u64, damage: i32, remain_hp: i32) {
    // Everyone who can see the monster sees the hit.
    self.aoi.for_each_watcher(monster_id, |watcher| {
      self.sessions.send(watcher, cb::Packet::CombatEvent {
        attacker_type: EntityType::Player,
        attacker_id:   player_id,
        target_type:   EntityType::Monster,
        target_id:     monster_id,
        damage,
        remain_hp,
      });
    });
  }

  fn broadcast_monster_stat(&mut self, monster_id: u64, hp: i32, max_hp: i32, sp: i32, max_sp: i32) {
    broadcast_stat_event(
      self.aoi,
      self.sessions,
      monster_id,
      EntityType::Monster,
      hp,
      max_hp,
      sp,
      max_sp,
    );
  }

  fn broadcast_player_stat(&mut self, player_id: u64, hp: i32, max_hp: i32, sp: i32, max_sp: i32) {
    broadcast_stat_event(
      self.aoi,
      self.sessions,
      player_id,
      EntityType::Player,
      hp,
      max_hp,
      sp,
      max_sp,
    );
  }

  fn player_stats(&self, player_id: u64) -> Option<(i32, i32, i32, i32)> {
    self.players.get(&player_id).map(|p| {
      let s = p.stats();
      (s.hp, s.max_hp, s.sp, s.max_sp)
    })
  }

  fn set_player_stats(&mut self, player_id: u64, hp: i32, sp: i32) {
    if let Some(p) = self.players.get_mut(&player_id) {
      p.set_hp(hp);
      p.set_sp(sp);
    }
  }

  fn mark_player_dirty(&mut self, player_id: u64) {
    if let Some(p) = self.players.get_mut(&player_id) {
      mark_player_dirty(self.storage, p, self.world_time);
    }
  }
}

#[cfg(test)]
mod tests;
