use super::*;
use pretty_assertions::assert_eq;
use rand::{rngs::StdRng, Rng, SeedableRng};

type Captured = Vec<(u64, AoiEvent)>;

fn capture(list: &mut Captured) -> impl FnMut(u64, &AoiEvent) + '_ {
  |watcher, ev| list.push((watcher, *ev))
}

fn events_for(list: &Captured, watcher: u64) -> Vec<AoiEvent> {
  list.iter().filter(|(w, _)| *w == watcher).map(|(_, ev)| *ev).collect()
}

/// Checks that for every player `p` and sector `s`, `p` is in
/// `s.watchers` exactly when `s` is in `p.subscribed`.
fn check_subscription_symmetry(world: &AoiWorld) {
  for e in world.entities.values() {
    for sc in &e.subscribed {
      assert!(
        world.sectors.get(sc).map_or(false, |s| s.watchers.contains(&e.id)),
        "{} subscribed to {sc} but is not a watcher there",
        e.id
      );
    }
  }
  for (sc, s) in &world.sectors {
    for w in &s.watchers {
      let e = world.entities.get(w).expect("watcher is not a live entity");
      assert!(e.subscribed.contains(sc), "{w} watches {sc} but is not subscribed to it");
    }
    for id in &s.entities {
      assert_eq!(world.entities.get(id).map(|e| e.sector), Some(*sc));
    }
  }
}

#[test]
fn two_players_same_sector() {
  let mut world = AoiWorld::new(10.0, 1);
  let mut log = vec![];

  world.add_entity(1, true, Vec2::new(5.0, 5.0), &mut capture(&mut log));
  assert_eq!(log, vec![]);

  world.add_entity(2, true, Vec2::new(6.0, 6.0), &mut capture(&mut log));
  assert_eq!(
    events_for(&log, 1),
    vec![AoiEvent { kind: AoiEventKind::Enter, subject_id: 2, pos: Vec2::new(6.0, 6.0) }]
  );
  assert_eq!(
    events_for(&log, 2),
    vec![AoiEvent { kind: AoiEventKind::Snapshot, subject_id: 1, pos: Vec2::new(5.0, 5.0) }]
  );

  log.clear();
  world.move_entity(2, Vec2::new(7.0, 7.0), &mut capture(&mut log));
  let moved = AoiEvent { kind: AoiEventKind::Move, subject_id: 2, pos: Vec2::new(7.0, 7.0) };
  assert_eq!(events_for(&log, 1), vec![moved]);
  // The mover gets its own move echoed back.
  assert_eq!(events_for(&log, 2), vec![moved]);
  assert!(log.iter().all(|(_, ev)| ev.kind != AoiEventKind::Leave));
}

#[test]
fn boundary_crossing() {
  let mut world = AoiWorld::new(10.0, 1);
  let mut log = vec![];

  // A at cell (1,1) watches x and y in 0..=2.
  world.add_entity(1, true, Vec2::new(15.0, 15.0), &mut capture(&mut log));
  // B at cell (2,1).
  world.add_entity(2, true, Vec2::new(25.0, 15.0), &mut capture(&mut log));

  // Same-cell move: A sees Move only.
  log.clear();
  world.move_entity(2, Vec2::new(26.0, 15.0), &mut capture(&mut log));
  assert_eq!(
    events_for(&log, 1),
    vec![AoiEvent { kind: AoiEventKind::Move, subject_id: 2, pos: Vec2::new(26.0, 15.0) }]
  );

  // Crossing into cell (3,1), out of A's view: A sees Leave, and B
  // loses sight of A the same way.
  log.clear();
  world.move_entity(2, Vec2::new(31.0, 15.0), &mut capture(&mut log));
  assert_eq!(
    events_for(&log, 1),
    vec![AoiEvent { kind: AoiEventKind::Leave, subject_id: 2, pos: Vec2::new(31.0, 15.0) }]
  );
  let to_b = events_for(&log, 2);
  assert!(to_b.contains(&AoiEvent {
    kind:       AoiEventKind::Leave,
    subject_id: 1,
    pos:        Vec2::new(15.0, 15.0),
  }));

  check_subscription_symmetry(&world);
}

#[test]
fn snapshot_on_view_grow() {
  let mut world = AoiWorld::new(10.0, 1);
  let mut log = vec![];

  world.add_entity(1, true, Vec2::new(5.0, 5.0), &mut capture(&mut log));
  // A monster at cell (2,0), outside A's 2x2 clamped view.
  world.add_entity(1000, false, Vec2::new(25.0, 5.0), &mut capture(&mut log));
  assert_eq!(events_for(&log, 1), vec![]);

  // Moving to cell (1,0) expands A's view to column 2; the monster
  // must be reported exactly once, as a Snapshot rather than an Enter.
  log.clear();
  world.move_entity(1, Vec2::new(15.0, 5.0), &mut capture(&mut log));
  let snapshots: Vec<_> = events_for(&log, 1)
    .into_iter()
    .filter(|ev| ev.subject_id == 1000)
    .collect();
  assert_eq!(
    snapshots,
    vec![AoiEvent { kind: AoiEventKind::Snapshot, subject_id: 1000, pos: Vec2::new(25.0, 5.0) }]
  );
}

#[test]
fn remove_notifies_watchers() {
  let mut world = AoiWorld::new(10.0, 1);
  let mut log = vec![];

  world.add_entity(1, true, Vec2::new(5.0, 5.0), &mut capture(&mut log));
  world.add_entity(1000, false, Vec2::new(6.0, 5.0), &mut capture(&mut log));

  log.clear();
  world.remove_entity(1000, &mut capture(&mut log));
  assert_eq!(
    events_for(&log, 1),
    vec![AoiEvent { kind: AoiEventKind::Leave, subject_id: 1000, pos: Vec2::new(6.0, 5.0) }]
  );

  log.clear();
  world.remove_entity(1, &mut capture(&mut log));
  assert_eq!(log, vec![]);
  assert!(world.is_empty());
  check_subscription_symmetry(&world);
}

#[test]
fn no_self_enter_or_leave() {
  let mut world = AoiWorld::new(10.0, 2);
  let mut log = vec![];

  world.add_entity(1, true, Vec2::new(5.0, 5.0), &mut capture(&mut log));
  for step in 1..40 {
    world.move_entity(1, Vec2::new(5.0 + step as f32 * 3.0, 5.0), &mut capture(&mut log));
  }
  for ev in events_for(&log, 1) {
    if ev.subject_id == 1 {
      assert_eq!(ev.kind, AoiEventKind::Move, "mover was notified of itself: {ev:?}");
    }
  }
}

#[test]
fn visibility_diff_exactness() {
  let mut world = AoiWorld::new(10.0, 1);
  let mut log = vec![];

  // Watchers at cells (0,1), (2,1) and (4,1): the first sees only the
  // old sector, the second sees both, the third only the new one.
  world.add_entity(1, true, Vec2::new(5.0, 15.0), &mut capture(&mut log));
  world.add_entity(2, true, Vec2::new(25.0, 15.0), &mut capture(&mut log));
  world.add_entity(3, true, Vec2::new(45.0, 15.0), &mut capture(&mut log));
  // The subject is a monster so its own subscriptions don't move.
  world.add_entity(1000, false, Vec2::new(15.0, 15.0), &mut capture(&mut log));

  log.clear();
  world.move_entity(1000, Vec2::new(35.0, 15.0), &mut capture(&mut log));

  assert_eq!(
    events_for(&log, 1),
    vec![AoiEvent { kind: AoiEventKind::Leave, subject_id: 1000, pos: Vec2::new(35.0, 15.0) }]
  );
  // Watcher 2 sees both sectors: exactly one Move, no Enter/Leave.
  assert_eq!(
    events_for(&log, 2),
    vec![AoiEvent { kind: AoiEventKind::Move, subject_id: 1000, pos: Vec2::new(35.0, 15.0) }]
  );
  assert_eq!(
    events_for(&log, 3),
    vec![
      AoiEvent { kind: AoiEventKind::Enter, subject_id: 1000, pos: Vec2::new(35.0, 15.0) },
      AoiEvent { kind: AoiEventKind::Move, subject_id: 1000, pos: Vec2::new(35.0, 15.0) },
    ]
  );
}

#[test]
fn symmetry_under_random_operations() {
  let mut world = AoiWorld::new(10.0, 2);
  let mut rng = StdRng::seed_from_u64(0x5eed);
  let mut live: Vec<u64> = vec![];
  let mut next_player = 1_u64;
  let mut next_monster = 1000_u64;
  let mut sink = |_w: u64, _ev: &AoiEvent| {};

  for _ in 0..2000 {
    match rng.gen_range(0..10) {
      // add a player
      0 | 1 => {
        let id = next_player;
        next_player += 1;
        let pos = Vec2::new(rng.gen_range(-20.0_f32..200.0), rng.gen_range(-20.0_f32..200.0));
        world.add_entity(id, true, pos, &mut sink);
        live.push(id);
      }
      // add a monster
      2 => {
        let id = next_monster;
        next_monster += 1;
        let pos = Vec2::new(rng.gen_range(0.0_f32..200.0), rng.gen_range(0.0_f32..200.0));
        world.add_entity(id, false, pos, &mut sink);
        live.push(id);
      }
      // remove someone
      3 => {
        if !live.is_empty() {
          let id = live.swap_remove(rng.gen_range(0..live.len()));
          world.remove_entity(id, &mut sink);
        }
      }
      // move someone
      _ => {
        if !live.is_empty() {
          let id = live[rng.gen_range(0..live.len())];
          let pos = Vec2::new(rng.gen_range(-20.0_f32..200.0), rng.gen_range(-20.0_f32..200.0));
          world.move_entity(id, pos, &mut sink);
        }
      }
    }
  }
  check_subscription_symmetry(&world);
}

#[test]
fn snapshot_once_per_entity_on_subscribe() {
  let mut world = AoiWorld::new(10.0, 1);
  let mut log = vec![];

  // Several monsters spread over cells the player will gain.
  for (i, x) in [22.0_f32, 25.0, 28.0].into_iter().enumerate() {
    world.add_entity(1000 + i as u64, false, Vec2::new(x, 5.0), &mut capture(&mut log));
  }
  world.add_entity(1, true, Vec2::new(5.0, 5.0), &mut capture(&mut log));
  assert_eq!(events_for(&log, 1), vec![]);

  log.clear();
  world.move_entity(1, Vec2::new(15.0, 5.0), &mut capture(&mut log));
  let mut snapshot_subjects: Vec<u64> = events_for(&log, 1)
    .into_iter()
    .filter(|ev| ev.kind == AoiEventKind::Snapshot)
    .map(|ev| ev.subject_id)
    .collect();
  snapshot_subjects.sort_unstable();
  assert_eq!(snapshot_subjects, vec![1000, 1001, 1002]);
}
