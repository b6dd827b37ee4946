//! Integrates monster motion requested by the AI system, and pushes
//! the result into the AOI through the environment.

use super::{AiState, MonsterEnv, MonsterWorld};
use crate::player::PLAYER_SPEED;
use wl_common::math::Vec2;

// Speed policy: fractions of the baseline player speed.
pub const PATROL_SPEED_MULT: f32 = 0.5;
pub const CHASE_SPEED_MULT: f32 = 1.1;
pub const FLEE_SPEED_MULT: f32 = 0.7;
/// Archers are a touch slower than melee across all states.
pub const ARCHER_SPEED_MULT: f32 = 0.85;

pub fn speed_for(state: AiState, archer: bool) -> f32 {
  let mult = match state {
    AiState::Patrol => PATROL_SPEED_MULT,
    AiState::Chase => CHASE_SPEED_MULT,
    AiState::Flee => FLEE_SPEED_MULT,
    _ => return 0.0,
  };
  PLAYER_SPEED * mult * if archer { ARCHER_SPEED_MULT } else { 1.0 }
}

pub fn update(dt: f32, ecs: &mut MonsterWorld, env: &mut impl MonsterEnv) {
  for i in 0..ecs.monsters.len() {
    let id = ecs.monsters[i];
    let (state, target_id, patrol_dir, archer) = match ecs.ai.get(id) {
      Some(ai) => (ai.state, ai.target_id, ai.patrol_dir, ai.archer),
      None => continue,
    };
    let speed = speed_for(state, archer);
    if speed == 0.0 {
      continue;
    }
    let Some(t) = ecs.transform.get_mut(id) else { continue };

    let dir = match state {
      AiState::Patrol => patrol_dir,
      AiState::Chase => match env.player_pos(target_id) {
        // Stop a little inside attack range so melee don't stack on
        // top of their target.
        Some(p) if p.dist_sq(t.pos) > (super::ai::attack_range(archer) * 0.9).powi(2) => {
          (p - t.pos).normalized()
        }
        _ => continue,
      },
      AiState::Flee => match env.player_pos(target_id) {
        Some(p) => (t.pos - p).normalized(),
        None => continue,
      },
      _ => continue,
    };
    if dir == Vec2::default() {
      continue;
    }

    let mut pos = t.pos + dir * speed * dt;
    pos.x = pos.x.max(0.0);
    pos.y = pos.y.max(0.0);
    t.pos = pos;
    env.move_in_aoi(id, pos);
  }
}
