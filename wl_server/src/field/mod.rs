//! Fields and their simulation workers.
//!
//! A field is an isolation boundary: it has its own worker thread,
//! its own AOI world and its own monsters, and entities never migrate
//! between fields. [`FieldManager`] is the id-to-worker registry.

use crate::{
  server::SessionRegistry,
  storage::StorageHandle,
};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use wl_common::config::Config;

pub mod aoi;
mod worker;

pub use worker::{FieldWorker, NetMessage};

/// Per-field tuning, read once at startup and shared by every worker.
#[derive(Debug, Clone)]
pub struct FieldConfig {
  /// World units per AOI grid cell.
  pub sector_size:         f32,
  /// Half-width of the view square, in cells.
  pub view_radius_sectors: i32,
  /// Minimum distance moved since the last dirty mark before position
  /// changes count as "significant".
  pub pos_dirty_dist:      f32,
  /// Minimum seconds between dirty marks for one player.
  pub dirty_min_interval:  f64,
}

impl FieldConfig {
  pub fn from_config(config: &Config) -> Self {
    FieldConfig {
      sector_size:         config.get("field.sector-size"),
      view_radius_sectors: config.get::<i64>("field.view-radius-sectors") as i32,
      pos_dirty_dist:      config.get("field.pos-dirty-dist"),
      dirty_min_interval:  config.get::<f64>("field.dirty-min-interval"),
    }
  }
}

pub struct FieldManager {
  fields:   Mutex<HashMap<u32, FieldWorker>>,
  sessions: Arc<SessionRegistry>,
  storage:  StorageHandle,
  cfg:      FieldConfig,
}

impl FieldManager {
  pub fn new(cfg: FieldConfig, sessions: Arc<SessionRegistry>, storage: StorageHandle) -> Self {
    FieldManager { fields: Mutex::new(HashMap::new()), sessions, storage, cfg }
  }

  /// Starts the worker for `field_id` if it is not already running.
  pub fn ensure_field(&self, field_id: u32) {
    let mut fields = self.fields.lock();
    fields.entry(field_id).or_insert_with(|| {
      FieldWorker::spawn(field_id, self.cfg.clone(), self.sessions.clone(), self.storage.clone())
    });
  }

  /// Queues a message for the field's worker. Returns false if the
  /// field does not exist or its queue is full; the caller applies
  /// its own policy (error ack, or drop with a log).
  pub fn send(&self, field_id: u32, msg: NetMessage) -> bool {
    match self.fields.lock().get(&field_id) {
      Some(worker) => worker.push(msg),
      None => false,
    }
  }

  pub fn stop_all(&self) {
    let mut fields = self.fields.lock();
    for (_, worker) in fields.drain() {
      worker.stop();
    }
  }
}
