use parking_lot::Mutex;
use std::collections::HashSet;

pub const SHARDS: usize = 64;

/// The set of players whose authoritative state has diverged from the
/// last persisted snapshot.
///
/// Sharded by the low bits of the id purely to cut lock contention
/// between field workers; the union semantics do not depend on the
/// shard count. Marks racing a [`steal_all`](DirtyHub::steal_all) land
/// in the next steal cycle.
#[derive(Debug)]
pub struct DirtyHub {
  shards: [Mutex<HashSet<u64>>; SHARDS],
}

impl Default for DirtyHub {
  fn default() -> Self { DirtyHub::new() }
}

impl DirtyHub {
  pub fn new() -> Self { DirtyHub { shards: std::array::from_fn(|_| Mutex::new(HashSet::new())) } }

  pub fn mark_dirty(&self, uid: u64) {
    self.shards[(uid as usize) & (SHARDS - 1)].lock().insert(uid);
  }

  /// Moves every marked uid out, leaving the hub empty. Shards are
  /// drained one at a time; there is no total ordering between marks
  /// and steals.
  pub fn steal_all(&self) -> Vec<u64> {
    let mut out = vec![];
    for shard in &self.shards {
      let mut set = shard.lock();
      out.extend(set.drain());
    }
    out
  }

  pub fn len(&self) -> usize { self.shards.iter().map(|s| s.lock().len()).sum() }
  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn steal_takes_everything_once() {
    let hub = DirtyHub::new();
    for uid in 0..300 {
      hub.mark_dirty(uid);
    }
    // Re-marking is idempotent.
    hub.mark_dirty(5);

    let mut stolen = hub.steal_all();
    stolen.sort_unstable();
    assert_eq!(stolen, (0..300).collect::<Vec<u64>>());
    assert!(hub.steal_all().is_empty());
  }

  #[test]
  fn marks_after_steal_land_in_next_cycle() {
    let hub = DirtyHub::new();
    hub.mark_dirty(1);
    assert_eq!(hub.steal_all(), vec![1]);
    hub.mark_dirty(1);
    assert_eq!(hub.steal_all(), vec![1]);
  }
}
