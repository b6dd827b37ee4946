//! Monster attacks against players.

use super::{AiState, MonsterEnv, MonsterWorld, PlayerState};

pub const ATTACK_COOLDOWN: f32 = 0.9;

pub fn update(dt: f32, ecs: &mut MonsterWorld, env: &mut impl MonsterEnv) {
  for i in 0..ecs.monsters.len() {
    let id = ecs.monsters[i];
    let Some(ai) = ecs.ai.get_mut(id) else { continue };

    if ai.state != AiState::Attack {
      ai.attack_timer = 0.0;
      continue;
    }

    ai.attack_timer += dt;
    if ai.attack_timer < ai.attack_cooldown {
      continue;
    }
    ai.attack_timer = 0.0;

    let target_id = ai.target_id;
    let Some(stats) = ecs.stats.get(id) else { continue };
    attack_player(id, target_id, stats.atk, env);
  }
}

/// Applies one monster hit to a player. Stats are read and written
/// through the environment, which is what makes the write atomic with
/// the dirty mark from any other thread's point of view.
fn attack_player(monster_id: u64, player_id: u64, atk: i32, env: &mut impl MonsterEnv) {
  let Some((hp, max_hp, sp, max_sp)) = env.player_stats(player_id) else { return };

  let new_hp = (hp - atk).max(0);
  let new_sp = sp;

  let hp_changed = new_hp != hp;
  let stat_changed = hp_changed || new_sp != sp;

  if stat_changed {
    env.set_player_stats(player_id, new_hp, new_sp);
    env.mark_player_dirty(player_id);
  }

  // The hit itself is always reported, even on a 0-damage hit against
  // an already-downed player.
  env.broadcast_monster_hit_player(monster_id, player_id, atk, new_hp);

  if stat_changed {
    env.broadcast_player_stat(player_id, new_hp, max_hp, new_sp, max_sp);
  }

  if hp_changed && new_hp <= 0 {
    env.broadcast_player_state(player_id, PlayerState::Dead);
  }
}
