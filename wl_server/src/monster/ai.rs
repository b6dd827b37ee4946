//! Monster AI state selection. Movement and damage are applied by the
//! movement and combat systems; this system only decides what each
//! monster is trying to do.

use super::{AiState, MonsterEnv, MonsterWorld};
use rand::Rng;
use wl_common::math::Vec2;

/// How far a monster notices players.
pub const AGGRO_RADIUS: f32 = 12.0;
/// Once engaged, a monster holds aggro out to this multiple of
/// [`AGGRO_RADIUS`] before giving up.
pub const DEAGGRO_MULT: f32 = 1.5;
/// Monsters below this hp fraction run instead of fight.
pub const FLEE_HP_RATIO: f32 = 0.25;
pub const MELEE_ATTACK_RANGE: f32 = 1.8;
pub const ARCHER_ATTACK_RANGE: f32 = 8.0;
/// How long a corpse stays visible before cleanup.
pub const CORPSE_CULL_SECS: f32 = 5.0;

pub fn attack_range(archer: bool) -> f32 {
  if archer {
    ARCHER_ATTACK_RANGE
  } else {
    MELEE_ATTACK_RANGE
  }
}

pub fn update(dt: f32, ecs: &mut MonsterWorld, env: &mut impl MonsterEnv) {
  let mut culled: Vec<u64> = vec![];

  for i in 0..ecs.monsters.len() {
    let id = ecs.monsters[i];
    let pos = match ecs.transform.get(id) {
      Some(t) => t.pos,
      None => continue,
    };
    let (hp, max_hp) = match ecs.stats.get(id) {
      Some(s) => (s.hp, s.max_hp),
      None => continue,
    };
    let Some(ai) = ecs.ai.get_mut(id) else { continue };

    if ai.state == AiState::Dead {
      ai.dead_timer += dt;
      if ai.dead_timer >= CORPSE_CULL_SECS {
        culled.push(id);
      }
      continue;
    }

    let old_state = ai.state;
    let hp_ratio = hp as f32 / max_hp.max(1) as f32;

    let aggro = if matches!(old_state, AiState::Idle | AiState::Patrol) {
      AGGRO_RADIUS
    } else {
      AGGRO_RADIUS * DEAGGRO_MULT
    };
    match env.find_closest_player(pos, aggro) {
      Some(pid) => {
        ai.target_id = pid;
        if hp_ratio < FLEE_HP_RATIO {
          ai.state = AiState::Flee;
        } else {
          let in_range = env
            .player_pos(pid)
            .map_or(false, |p| p.dist_sq(pos) <= attack_range(ai.archer).powi(2));
          ai.state = if in_range { AiState::Attack } else { AiState::Chase };
        }
      }
      None => {
        ai.target_id = 0;
        if !matches!(old_state, AiState::Idle | AiState::Patrol) {
          ai.state = AiState::Idle;
          ai.patrol_timer = 0.0;
        }
        ai.patrol_timer -= dt;
        if ai.patrol_timer <= 0.0 {
          let mut rng = rand::thread_rng();
          ai.patrol_timer = rng.gen_range(2.0..4.0);
          if rng.gen_bool(0.5) {
            let angle = rng.gen_range(0.0..std::f32::consts::TAU);
            ai.patrol_dir = Vec2::new(angle.cos(), angle.sin());
            ai.state = AiState::Patrol;
          } else {
            ai.state = AiState::Idle;
          }
        }
      }
    }

    if ai.state != old_state {
      let state = ai.state;
      env.broadcast_ai_state(id, state);
    }
  }

  for id in culled {
    env.remove_from_aoi(id);
    ecs.remove_monster(id);
  }
}
