use wl_common::math::Vec2;

/// How fast a player moves, in world units per second. Move inputs do
/// not carry a speed; the server decides.
pub const PLAYER_SPEED: f32 = 4.5;

#[derive(Debug, Clone, Default)]
pub struct PlayerStats {
  pub hp:     i32,
  pub max_hp: i32,
  pub sp:     i32,
  pub max_sp: i32,
}

#[derive(Debug, Clone, Default)]
pub struct MoveState {
  pub moving:          bool,
  /// Unit direction of travel. Zero when not moving.
  pub dir:             Vec2,
  pub speed:           f32,
  /// World time of the most recent move input, used for auto-stop.
  pub last_input_time: f64,
}

/// A player inside a field.
///
/// Exactly one field worker owns a `Player` at a time; everything else
/// (sessions, registries) refers to it by id and reaches it through
/// that worker's message queue. This is what makes a position write
/// and its dirty mark atomic from any other thread's point of view.
#[derive(Debug, Clone)]
pub struct Player {
  id:       u64,
  field_id: u32,
  pos:      Vec2,
  stats:    PlayerStats,
  move_state: MoveState,

  /// World time of the last dirty mark, for debouncing persistence
  /// traffic from a continuously moving player.
  last_dirty_mark_time: f64,
  /// Position at the last dirty mark.
  last_dirty_pos:       Vec2,
}

impl Player {
  pub fn new(id: u64, field_id: u32, pos: Vec2) -> Self {
    Player {
      id,
      field_id,
      pos,
      stats: PlayerStats { hp: 100, max_hp: 100, sp: 50, max_sp: 50 },
      move_state: MoveState::default(),
      last_dirty_mark_time: 0.0,
      last_dirty_pos: pos,
    }
  }

  pub fn id(&self) -> u64 { self.id }
  pub fn field_id(&self) -> u32 { self.field_id }

  pub fn pos(&self) -> Vec2 { self.pos }
  pub fn set_pos(&mut self, pos: Vec2) { self.pos = pos; }

  pub fn stats(&self) -> &PlayerStats { &self.stats }
  pub fn set_hp(&mut self, hp: i32) { self.stats.hp = hp; }
  pub fn set_sp(&mut self, sp: i32) { self.stats.sp = sp; }

  pub fn move_state(&self) -> &MoveState { &self.move_state }
  pub fn move_state_mut(&mut self) -> &mut MoveState { &mut self.move_state }

  pub fn last_dirty_mark_time(&self) -> f64 { self.last_dirty_mark_time }
  pub fn last_dirty_pos(&self) -> Vec2 { self.last_dirty_pos }

  /// Records a dirty mark at the given world time and the player's
  /// current position. Both debounce conditions measure from here.
  pub fn record_dirty_mark(&mut self, world_time: f64) {
    self.last_dirty_mark_time = world_time;
    self.last_dirty_pos = self.pos;
  }
}
