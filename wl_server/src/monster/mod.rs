//! The monster ECS for one field.
//!
//! Components are stored in id-keyed maps; systems iterate the monster
//! set and read/write their components. Everything a system needs from
//! the outside world (player lookups, AOI moves, broadcasts,
//! persistence marks) goes through the [`MonsterEnv`] capability trait
//! that the field worker implements, which keeps the ECS ignorant of
//! networking and storage.

use std::collections::HashMap;
use wl_common::math::Vec2;

pub mod ai;
pub mod combat;
pub mod movement;

/// Per-monster AI state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiState {
  Idle,
  Patrol,
  Chase,
  Attack,
  Flee,
  Dead,
}

/// Player actor state, broadcast to watchers alongside monster AI
/// states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
  Idle,
  Chase,
  Attack,
  Dead,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Transform {
  pub pos: Vec2,
}

#[derive(Debug, Clone, Default)]
pub struct Stats {
  pub hp:     i32,
  pub max_hp: i32,
  pub sp:     i32,
  pub max_sp: i32,
  pub atk:    i32,
  pub def:    i32,
}

#[derive(Debug, Clone)]
pub struct Ai {
  pub state:           AiState,
  pub target_id:       u64,
  pub attack_cooldown: f32,
  pub attack_timer:    f32,
  /// Current patrol heading; re-rolled on a timer while unaggroed.
  pub patrol_dir:      Vec2,
  pub patrol_timer:    f32,
  /// Seconds spent dead, for corpse cleanup.
  pub dead_timer:      f32,
  pub archer:          bool,
}

impl Default for Ai {
  fn default() -> Self {
    Ai {
      state:           AiState::Idle,
      target_id:       0,
      attack_cooldown: combat::ATTACK_COOLDOWN,
      attack_timer:    0.0,
      patrol_dir:      Vec2::default(),
      patrol_timer:    0.0,
      dead_timer:      0.0,
      archer:          false,
    }
  }
}

/// An id-keyed component map.
#[derive(Debug)]
pub struct ComponentStore<T> {
  map: HashMap<u64, T>,
}

impl<T> Default for ComponentStore<T> {
  fn default() -> Self { ComponentStore { map: HashMap::new() } }
}

impl<T> ComponentStore<T> {
  pub fn insert(&mut self, id: u64, v: T) { self.map.insert(id, v); }
  pub fn remove(&mut self, id: u64) -> Option<T> { self.map.remove(&id) }
  pub fn has(&self, id: u64) -> bool { self.map.contains_key(&id) }
  pub fn get(&self, id: u64) -> Option<&T> { self.map.get(&id) }
  pub fn get_mut(&mut self, id: u64) -> Option<&mut T> { self.map.get_mut(&id) }
}

/// The capabilities a field worker lends to the monster systems for
/// one tick.
pub trait MonsterEnv {
  /// Returns the closest player within `max_dist` of `pos`.
  fn find_closest_player(&self, pos: Vec2, max_dist: f32) -> Option<u64>;
  fn player_pos(&self, player_id: u64) -> Option<Vec2>;

  fn move_in_aoi(&mut self, id: u64, pos: Vec2);
  fn remove_from_aoi(&mut self, id: u64);

  fn broadcast_ai_state(&mut self, monster_id: u64, state: AiState);
  fn broadcast_player_state(&mut self, player_id: u64, state: PlayerState);
  fn broadcast_monster_hit_player(&mut self, monster_id: u64, player_id: u64, damage: i32, remain_hp: i32);
  fn broadcast_player_hit_monster(&mut self, player_id: u64, monster_id: u64, damage: i32, remain_hp: i32);
  fn broadcast_monster_stat(&mut self, monster_id: u64, hp: i32, max_hp: i32, sp: i32, max_sp: i32);
  fn broadcast_player_stat(&mut self, player_id: u64, hp: i32, max_hp: i32, sp: i32, max_sp: i32);

  /// Returns `(hp, max_hp, sp, max_sp)`.
  fn player_stats(&self, player_id: u64) -> Option<(i32, i32, i32, i32)>;
  fn set_player_stats(&mut self, player_id: u64, hp: i32, sp: i32);
  fn mark_player_dirty(&mut self, player_id: u64);
}

#[derive(Debug, Default)]
pub struct MonsterWorld {
  /// Live monster ids, including corpses awaiting cleanup.
  pub monsters:  Vec<u64>,
  pub transform: ComponentStore<Transform>,
  pub stats:     ComponentStore<Stats>,
  pub ai:        ComponentStore<Ai>,
}

impl MonsterWorld {
  pub fn new() -> Self { MonsterWorld::default() }

  pub fn create_monster(&mut self, id: u64, pos: Vec2, stats: Stats, archer: bool) {
    self.monsters.push(id);
    self.transform.insert(id, Transform { pos });
    self.stats.insert(id, stats);
    self.ai.insert(id, Ai { archer, ..Ai::default() });
  }

  pub fn remove_monster(&mut self, id: u64) {
    self.monsters.retain(|&m| m != id);
    self.transform.remove(id);
    self.stats.remove(id);
    self.ai.remove(id);
  }

  /// Runs one fixed step of every system, in AI, movement, combat
  /// order.
  pub fn update(&mut self, step: f32, env: &mut impl MonsterEnv) {
    ai::update(step, self, env);
    movement::update(step, self, env);
    combat::update(step, self, env);
  }

  /// Resolves a player's skill hit on a monster. Returns true if the
  /// monster died from it; returns false for an unknown or already
  /// dead target.
  pub fn player_attack_monster(
    &mut self,
    player_id: u64,
    target_id: u64,
    skill: u8,
    env: &mut impl MonsterEnv,
  ) -> bool {
    let Some(ai) = self.ai.get_mut(target_id) else { return false };
    if ai.state == AiState::Dead {
      return false;
    }
    let Some(stats) = self.stats.get_mut(target_id) else { return false };

    let base = match skill {
      2 => 45,
      _ => 30,
    };
    let damage = (base - stats.def).max(1);
    stats.hp = (stats.hp - damage).max(0);

    env.broadcast_player_hit_monster(player_id, target_id, damage, stats.hp);
    env.broadcast_monster_stat(target_id, stats.hp, stats.max_hp, stats.sp, stats.max_sp);

    if stats.hp == 0 {
      ai.state = AiState::Dead;
      ai.dead_timer = 0.0;
      true
    } else {
      false
    }
  }
}
