#[macro_use]
extern crate log;

pub mod field;
pub mod monster;
pub mod net;
pub mod player;
pub mod server;
pub mod storage;

/// Entity ids at or above this value are monsters; everything below is
/// a player. The split lets every subsystem discriminate the two
/// without carrying a type tag next to each id.
pub const MONSTER_ID_START: u64 = 1000;

#[inline(always)]
pub fn is_monster_id(id: u64) -> bool { id >= MONSTER_ID_START }
