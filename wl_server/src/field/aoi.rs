//! The area-of-interest world for one field.
//!
//! Entities live in a lazily created sector grid. Players additionally
//! subscribe to the square of sectors within their view radius; the
//! sector keeps the reverse index (`watchers`), so answering "who must
//! hear about this move" is a set lookup instead of a scan over the
//! whole field. All event emission is diff based: crossing a sector
//! boundary produces `Enter`/`Leave` only for watchers gained or lost,
//! which keeps traffic proportional to boundary crossings rather than
//! to field population.

use std::collections::{HashMap, HashSet};
use wl_common::math::{SectorPos, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AoiEventKind {
  /// The subject arrived in the watcher's view.
  Enter,
  /// The subject left the watcher's view.
  Leave,
  /// The subject moved within the watcher's view.
  Move,
  /// The subject was already present in a sector the watcher just
  /// subscribed to.
  Snapshot,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AoiEvent {
  pub kind:       AoiEventKind,
  pub subject_id: u64,
  pub pos:        Vec2,
}

#[derive(Debug)]
pub struct AoiEntity {
  pub id:        u64,
  pub is_player: bool,
  pub pos:       Vec2,
  pub sector:    SectorPos,
  /// The sectors this entity watches. Empty for non-players.
  pub subscribed: HashSet<SectorPos>,
}

#[derive(Debug, Default)]
struct Sector {
  /// Entities currently inside this cell.
  entities: HashSet<u64>,
  /// Players subscribed to this cell.
  watchers: HashSet<u64>,
}

pub struct AoiWorld {
  entities:    HashMap<u64, AoiEntity>,
  sectors:     HashMap<SectorPos, Sector>,
  sector_size: f32,
  view_radius: i32,
}

impl AoiWorld {
  /// `sector_size` is the side length of one cell in world units, and
  /// `view_radius_sectors` the half-width of the view square (1 means
  /// 3x3 cells, 2 means 5x5). Non-positive values are sanitized to
  /// the smallest valid configuration.
  pub fn new(sector_size: f32, view_radius_sectors: i32) -> Self {
    AoiWorld {
      entities:    HashMap::new(),
      sectors:     HashMap::new(),
      sector_size: if sector_size > 0.0 { sector_size } else { 1.0 },
      view_radius: view_radius_sectors.max(1),
    }
  }

  pub fn entity(&self, id: u64) -> Option<&AoiEntity> { self.entities.get(&id) }

  pub fn len(&self) -> usize { self.entities.len() }
  pub fn is_empty(&self) -> bool { self.entities.is_empty() }

  /// Registers an entity. Players get their view subscription built,
  /// which emits one `Snapshot` per entity already visible to them.
  /// Watchers of the entity's own sector get an `Enter`.
  pub fn add_entity(
    &mut self,
    id: u64,
    is_player: bool,
    pos: Vec2,
    send: &mut impl FnMut(u64, &AoiEvent),
  ) {
    let sector = SectorPos::of(pos, self.sector_size);
    self.entities.insert(
      id,
      AoiEntity { id, is_player, pos, sector, subscribed: HashSet::new() },
    );
    self.sectors.entry(sector).or_default().entities.insert(id);

    if is_player {
      self.rebuild_player_subscriptions(id, send);
    }

    let ev = AoiEvent { kind: AoiEventKind::Enter, subject_id: id, pos };
    self.broadcast_to_sector_watchers(sector, &ev, id, send);
  }

  /// Removes an entity, emitting `Leave` to everyone who could see it.
  pub fn remove_entity(&mut self, id: u64, send: &mut impl FnMut(u64, &AoiEvent)) {
    let Some(e) = self.entities.remove(&id) else { return };

    let ev = AoiEvent { kind: AoiEventKind::Leave, subject_id: id, pos: e.pos };
    self.broadcast_to_sector_watchers(e.sector, &ev, id, send);

    if let Some(s) = self.sectors.get_mut(&e.sector) {
      s.entities.remove(&id);
    }
    if e.is_player {
      for sc in &e.subscribed {
        if let Some(s) = self.sectors.get_mut(sc) {
          s.watchers.remove(&id);
        }
      }
    }
  }

  /// Moves an entity. On a sector change, watchers lost see `Leave`,
  /// watchers gained see `Enter`, and a player's subscriptions are
  /// rebuilt. Watchers of the (new) sector always see `Move`; a moving
  /// player additionally receives its own `Move` back, which the
  /// client uses to reconcile its predicted position.
  pub fn move_entity(&mut self, id: u64, new_pos: Vec2, send: &mut impl FnMut(u64, &AoiEvent)) {
    let Some(e) = self.entities.get_mut(&id) else { return };
    let old_sector = e.sector;
    let new_sector = SectorPos::of(new_pos, self.sector_size);
    let is_player = e.is_player;
    e.pos = new_pos;
    e.sector = new_sector;

    let sector_changed = new_sector != old_sector;
    if sector_changed {
      if let Some(s) = self.sectors.get_mut(&old_sector) {
        s.entities.remove(&id);
      }
      self.sectors.entry(new_sector).or_default().entities.insert(id);

      if is_player {
        self.rebuild_player_subscriptions(id, send);
      }

      // Watchers lost can no longer see the mover; watchers gained see
      // it arrive. Anyone watching both sectors sees neither.
      let old_watchers = self.sectors.get(&old_sector).map(|s| &s.watchers);
      let new_watchers = self.sectors.get(&new_sector).map(|s| &s.watchers);

      if let Some(old_w) = old_watchers {
        let ev = AoiEvent { kind: AoiEventKind::Leave, subject_id: id, pos: new_pos };
        for &watcher in old_w {
          if watcher == id || new_watchers.map_or(false, |w| w.contains(&watcher)) {
            continue;
          }
          send(watcher, &ev);
        }
      }
      if let Some(new_w) = new_watchers {
        let ev = AoiEvent { kind: AoiEventKind::Enter, subject_id: id, pos: new_pos };
        for &watcher in new_w {
          if watcher == id || old_watchers.map_or(false, |w| w.contains(&watcher)) {
            continue;
          }
          send(watcher, &ev);
        }
      }
    }

    let ev = AoiEvent { kind: AoiEventKind::Move, subject_id: id, pos: new_pos };
    self.broadcast_to_sector_watchers(new_sector, &ev, id, send);
    if is_player {
      send(id, &ev);
    }
  }

  /// Calls `f` with every player watching the sector the entity is
  /// currently in. Used for stat and AI-state broadcasts, which go to
  /// whoever can see the subject (including the subject itself, if it
  /// is a player).
  pub fn for_each_watcher(&self, id: u64, mut f: impl FnMut(u64)) {
    let Some(e) = self.entities.get(&id) else { return };
    if let Some(s) = self.sectors.get(&e.sector) {
      for &watcher in &s.watchers {
        f(watcher);
      }
    }
  }

  fn view_sectors(&self, center: SectorPos) -> HashSet<SectorPos> {
    let mut out = HashSet::new();
    for dy in -self.view_radius..=self.view_radius {
      for dx in -self.view_radius..=self.view_radius {
        let (x, y) = (center.x + dx, center.y + dy);
        if x < 0 || y < 0 {
          continue;
        }
        out.insert(SectorPos::new(x, y));
      }
    }
    out
  }

  /// Recomputes a player's subscribed set around its current sector.
  ///
  /// For each cell no longer in view, `Leave` is emitted to the player
  /// for every entity in the cell whose current sector is not still
  /// visible through another subscribed cell. For each newly visible
  /// cell, the player receives one `Snapshot` per entity present.
  fn rebuild_player_subscriptions(&mut self, id: u64, send: &mut impl FnMut(u64, &AoiEvent)) {
    let Some(e) = self.entities.get(&id) else { return };
    let new_set = self.view_sectors(e.sector);
    let old_set = &e.subscribed;

    let to_remove: Vec<SectorPos> = old_set.difference(&new_set).copied().collect();
    let to_add: Vec<SectorPos> = new_set.difference(old_set).copied().collect();

    for sc in to_remove {
      if let Some(s) = self.sectors.get(&sc) {
        for &other_id in &s.entities {
          if other_id == id {
            continue;
          }
          let Some(other) = self.entities.get(&other_id) else { continue };
          // Still visible through its current sector, so no Leave.
          if new_set.contains(&other.sector) {
            continue;
          }
          send(id, &AoiEvent { kind: AoiEventKind::Leave, subject_id: other_id, pos: other.pos });
        }
      }
      if let Some(s) = self.sectors.get_mut(&sc) {
        s.watchers.remove(&id);
      }
    }

    for sc in to_add {
      let s = self.sectors.entry(sc).or_default();
      s.watchers.insert(id);

      let present: Vec<u64> = s.entities.iter().copied().collect();
      for other_id in present {
        if other_id == id {
          continue;
        }
        let Some(other) = self.entities.get(&other_id) else { continue };
        send(id, &AoiEvent { kind: AoiEventKind::Snapshot, subject_id: other_id, pos: other.pos });
      }
    }

    if let Some(e) = self.entities.get_mut(&id) {
      e.subscribed = new_set;
    }
  }

  /// `exclude` of 0 excludes nobody; entity ids are never 0.
  fn broadcast_to_sector_watchers(
    &self,
    sector: SectorPos,
    ev: &AoiEvent,
    exclude: u64,
    send: &mut impl FnMut(u64, &AoiEvent),
  ) {
    let Some(s) = self.sectors.get(&sector) else { return };
    for &watcher in &s.watchers {
      if exclude != 0 && watcher == exclude {
        continue;
      }
      send(watcher, ev);
    }
  }
}

#[cfg(test)]
mod tests;
