//! The root object. Everything that used to be a process-wide
//! singleton in servers of this shape (player/session/field managers)
//! hangs off one [`GameServer`] constructed in `main` and passed
//! around as an `Arc`.

use crate::{
  field::{FieldConfig, FieldManager},
  net::ConnSender,
  storage::StorageSystem,
};
use parking_lot::Mutex;
use std::{
  collections::HashMap,
  sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
  },
};
use wl_common::{config::Config, net::cb};

/// Server-issued id allocators. Player ids are monotonic and stay
/// below [`MONSTER_ID_START`](crate::MONSTER_ID_START), so an id on
/// its own tells you what kind of entity it names.
#[derive(Debug)]
pub struct Ids {
  next_player: AtomicU64,
}

impl Default for Ids {
  fn default() -> Self { Ids::new() }
}

impl Ids {
  // Id 0 is reserved to mean "nobody" (e.g. broadcast exclusions).
  pub fn new() -> Self { Ids { next_player: AtomicU64::new(1) } }

  pub fn next_player_id(&self) -> u64 { self.next_player.fetch_add(1, Ordering::SeqCst) }
}

/// Maps player ids to the sender for their connection. Field workers
/// deliver every outbound packet through this; a missing entry means
/// the player disconnected, and the packet is dropped.
#[derive(Debug, Default)]
pub struct SessionRegistry {
  map: Mutex<HashMap<u64, ConnSender>>,
}

impl SessionRegistry {
  pub fn new() -> Self { SessionRegistry::default() }

  pub fn bind(&self, player_id: u64, sender: ConnSender) {
    self.map.lock().insert(player_id, sender);
  }

  pub fn unbind(&self, player_id: u64) { self.map.lock().remove(&player_id); }

  pub fn send(&self, player_id: u64, p: cb::Packet) {
    let sender = self.map.lock().get(&player_id).cloned();
    if let Some(sender) = sender {
      sender.send(p);
    }
  }

  pub fn len(&self) -> usize { self.map.lock().len() }
  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

pub struct GameServer {
  config:   Arc<Config>,
  ids:      Ids,
  sessions: Arc<SessionRegistry>,
  storage:  StorageSystem,
  fields:   FieldManager,

  default_field_id: u32,
}

impl GameServer {
  pub fn new(config: Config) -> Arc<Self> {
    let config = Arc::new(config);
    let sessions = Arc::new(SessionRegistry::new());
    let storage = StorageSystem::new(&config);
    let fields =
      FieldManager::new(FieldConfig::from_config(&config), sessions.clone(), storage.handle());
    Arc::new(GameServer {
      default_field_id: config.get("default-field-id"),
      config,
      ids: Ids::new(),
      sessions,
      storage,
      fields,
    })
  }

  pub fn config(&self) -> &Arc<Config> { &self.config }
  pub fn ids(&self) -> &Ids { &self.ids }
  pub fn sessions(&self) -> &Arc<SessionRegistry> { &self.sessions }
  pub fn storage(&self) -> &StorageSystem { &self.storage }
  pub fn fields(&self) -> &FieldManager { &self.fields }
  pub fn default_field_id(&self) -> u32 { self.default_field_id }

  /// Stops every field worker, then the storage pipeline. Dirty
  /// entries still in the hub are lost; the cache snapshots remain
  /// the recovery source.
  pub fn stop(&self) {
    self.fields.stop_all();
    self.storage.stop();
  }
}
