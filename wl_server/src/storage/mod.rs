//! The write-behind persistence pipeline.
//!
//! Field workers mark players dirty (and push real-time snapshots);
//! a periodic flush steals the dirty set, chunks it, and queues jobs
//! for the single DB worker thread, which pipelines snapshots through
//! the cache and upserts them in batch to durable storage. Slow or
//! broken persistence costs latency, never correctness: a refused or
//! failed batch is re-marked dirty and retried on a later flush, and
//! the authoritative state always lives in the player objects.

use parking_lot::Mutex;
use serde::Serialize;
use std::{
  sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
  },
  time::Duration,
};
use wl_common::config::Config;

mod cache;
mod db;
mod dirty;
mod job;
mod worker;

pub use dirty::DirtyHub;
pub use job::DbJob;
pub use worker::DbWorker;

/// The row shape persisted to both the cache and durable storage.
/// `inv_json` is reserved for the inventory blob and is not part of
/// the stored procedure's contract yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserSnapshot {
  pub uid: u64,
  pub x:   f32,
  pub z:   f32,
  pub hp:  i32,
  pub sp:  i32,
  #[serde(skip)]
  pub inv_json: String,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("cache error: {0}")]
  Redis(#[from] redis::RedisError),
  #[error("database error: {0}")]
  Mysql(#[from] mysql::Error),
  #[error("snapshot serialization error: {0}")]
  Json(#[from] serde_json::Error),
  #[error("not connected")]
  NotConnected,
}

/// Real-time snapshots accumulated by field workers, drained by the
/// DB worker at the head of every job.
#[derive(Debug, Default)]
pub struct RtQueue {
  queue:   Mutex<Vec<UserSnapshot>>,
  pending: AtomicU32,
}

impl RtQueue {
  pub fn new() -> Self { RtQueue::default() }

  pub fn enqueue(&self, snap: UserSnapshot) {
    self.queue.lock().push(snap);
    self.pending.fetch_add(1, Ordering::Relaxed);
  }

  pub fn pending(&self) -> u32 { self.pending.load(Ordering::Relaxed) }

  /// Swaps the queue into `out` and drops the pending count by the
  /// swapped amount.
  pub fn swap_drain(&self, out: &mut Vec<UserSnapshot>) {
    out.clear();
    {
      let mut queue = self.queue.lock();
      if queue.is_empty() {
        return;
      }
      std::mem::swap(&mut *queue, out);
    }
    self.pending.fetch_sub(out.len() as u32, Ordering::Relaxed);
  }
}

/// What a field worker needs from the storage system: the dirty set
/// and the real-time write queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StorageHandle {
  dirty: Arc<DirtyHub>,
  rt:    Arc<RtQueue>,
}

impl StorageHandle {
  pub fn mark_dirty(&self, uid: u64) { self.dirty.mark_dirty(uid); }
  pub fn enqueue_rt(&self, snap: UserSnapshot) { self.rt.enqueue(snap); }

  pub fn dirty(&self) -> &Arc<DirtyHub> { &self.dirty }
  pub fn rt(&self) -> &Arc<RtQueue> { &self.rt }

  #[cfg(test)]
  pub(crate) fn new_for_test() -> Self {
    StorageHandle { dirty: Arc::new(DirtyHub::new()), rt: Arc::new(RtQueue::new()) }
  }
}

/// Connection parameters for the DB worker, read once at startup.
#[derive(Debug, Clone)]
pub struct DbConfig {
  pub redis_host:       String,
  pub redis_port:       u16,
  pub redis_timeout_ms: u64,
  pub mysql_host:       String,
  pub mysql_port:       u16,
  pub mysql_user:       String,
  pub mysql_pass:       String,
  pub mysql_db:         String,
  pub mysql_charset:    String,
  pub mysql_timeout_ms: u64,
}

impl DbConfig {
  pub fn from_config(config: &Config) -> Self {
    DbConfig {
      redis_host:       config.get("redis.host"),
      redis_port:       config.get("redis.port"),
      redis_timeout_ms: config.get("redis.timeout-ms"),
      mysql_host:       config.get("mysql.host"),
      mysql_port:       config.get("mysql.port"),
      mysql_user:       config.get("mysql.user"),
      mysql_pass:       config.get("mysql.pass"),
      mysql_db:         config.get("mysql.db"),
      mysql_charset:    config.get("mysql.charset"),
      mysql_timeout_ms: config.get("mysql.timeout-ms"),
    }
  }
}

/// The DB worker's per-thread state: both connections and the scratch
/// buffers. The worker thread is the only owner; the flush timer
/// never touches a connection.
struct DbContext {
  cfg:    DbConfig,
  redis:  Option<redis::Connection>,
  mysql:  Option<mysql::Conn>,
  rt:     Arc<RtQueue>,
  dirty:  Arc<DirtyHub>,
  rt_buf: Vec<UserSnapshot>,
}

impl DbContext {
  fn new(cfg: DbConfig, rt: Arc<RtQueue>, dirty: Arc<DirtyHub>) -> Self {
    DbContext { cfg, redis: None, mysql: None, rt, dirty, rt_buf: vec![] }
  }

  fn handle_job(&mut self, job: &DbJob) {
    if let Err(e) = self.try_handle(job) {
      warn!("db job failed ({} uids): {e}", job.len());
      self.disconnect();
      // Without this, a uid that fails mid-flush would only converge
      // once the player changes again; re-marking retries it on the
      // next timer tick.
      for &uid in &job.uids {
        self.dirty.mark_dirty(uid);
      }
    }
  }

  fn try_handle(&mut self, job: &DbJob) -> Result<(), Error> {
    self.ensure_connected()?;
    self.flush_rt_writes()?;
    if job.is_empty() {
      return Ok(());
    }

    let redis = self.redis.as_mut().ok_or(Error::NotConnected)?;
    let snaps = cache::fetch_users(redis, &job.uids)?;
    if snaps.is_empty() {
      return Ok(());
    }
    let mysql = self.mysql.as_mut().ok_or(Error::NotConnected)?;
    db::call_upsert_user_state_batch(mysql, &snaps)?;
    Ok(())
  }

  /// Drains pending real-time writes into the cache. On a pipeline
  /// error the drained writes are dropped; the authoritative player
  /// state re-marks itself on its next change, so the cache
  /// resynchronizes without further bookkeeping.
  fn flush_rt_writes(&mut self) -> Result<(), Error> {
    let mut buf = std::mem::take(&mut self.rt_buf);
    self.rt.swap_drain(&mut buf);
    let res = match self.redis.as_mut() {
      Some(redis) if !buf.is_empty() => {
        let n = buf.len();
        cache::write_rt(redis, &buf).map(|()| debug!("flushed {n} rt writes"))
      }
      _ => Ok(()),
    };
    buf.clear();
    self.rt_buf = buf;
    res.map_err(Into::into)
  }

  fn ensure_connected(&mut self) -> Result<(), Error> {
    if self.redis.is_some() && self.mysql.is_some() {
      return Ok(());
    }
    self.disconnect();

    let client = redis::Client::open(format!(
      "redis://{}:{}/",
      self.cfg.redis_host, self.cfg.redis_port
    ))?;
    let redis =
      client.get_connection_with_timeout(Duration::from_millis(self.cfg.redis_timeout_ms))?;

    let opts = mysql::OptsBuilder::new()
      .ip_or_hostname(Some(self.cfg.mysql_host.clone()))
      .tcp_port(self.cfg.mysql_port)
      .user(Some(self.cfg.mysql_user.clone()))
      .pass(Some(self.cfg.mysql_pass.clone()))
      .db_name(Some(self.cfg.mysql_db.clone()))
      .tcp_connect_timeout(Some(Duration::from_millis(self.cfg.mysql_timeout_ms)))
      .init(vec![format!("SET NAMES {}", self.cfg.mysql_charset)]);
    let mysql = mysql::Conn::new(opts)?;

    info!(
      "db connections established (redis {}:{}, mysql {}:{})",
      self.cfg.redis_host, self.cfg.redis_port, self.cfg.mysql_host, self.cfg.mysql_port
    );
    self.redis = Some(redis);
    self.mysql = Some(mysql);
    Ok(())
  }

  fn disconnect(&mut self) {
    // Dropping the handles closes them; the next job reconnects.
    self.redis = None;
    self.mysql = None;
  }
}

/// Owns the dirty set, the real-time write queue, the DB worker and
/// the flush policy. The flush timer itself lives on the I/O reactor,
/// which calls [`flush_tick`](Self::flush_tick) on the configured
/// interval.
pub struct StorageSystem {
  dirty:          Arc<DirtyHub>,
  rt:             Arc<RtQueue>,
  db:             DbWorker,
  flush_interval: Duration,
  max_batch_uids: usize,
}

impl StorageSystem {
  pub fn new(config: &Config) -> Self {
    let system = Self::with_worker(
      DbWorker::new(worker::MAX_QUEUE),
      Duration::from_millis(config.get::<u64>("storage.flush-interval-ms")),
      config.get::<u64>("storage.max-batch-uids") as usize,
    );
    let mut ctx = DbContext::new(
      DbConfig::from_config(config),
      system.rt.clone(),
      system.dirty.clone(),
    );
    system.db.start(move |job| ctx.handle_job(job));
    system
  }

  fn with_worker(db: DbWorker, flush_interval: Duration, max_batch_uids: usize) -> Self {
    StorageSystem {
      dirty: Arc::new(DirtyHub::new()),
      rt: Arc::new(RtQueue::new()),
      db,
      flush_interval,
      max_batch_uids,
    }
  }

  pub fn handle(&self) -> StorageHandle {
    StorageHandle { dirty: self.dirty.clone(), rt: self.rt.clone() }
  }

  pub fn dirty(&self) -> &Arc<DirtyHub> { &self.dirty }

  pub fn flush_interval(&self) -> Duration { self.flush_interval }

  /// One flush timer tick: steal the dirty set, chunk it, and queue
  /// the chunks. A refused chunk is re-marked in full, so queue
  /// pressure only delays persistence. With nothing dirty, a sentinel
  /// job is queued if real-time writes are waiting.
  pub fn flush_tick(&self) {
    let uids = self.dirty.steal_all();
    if uids.is_empty() {
      if self.rt.pending() > 0 {
        let _ = self.db.try_push(DbJob::default());
      }
      return;
    }

    for chunk in uids.chunks(self.max_batch_uids.max(1)) {
      if !self.db.try_push(DbJob::new(chunk.to_vec())) {
        for &uid in chunk {
          self.dirty.mark_dirty(uid);
        }
      }
    }
  }

  /// Stops the flush consumer and joins it. Dirty entries still in
  /// the hub are lost; the cache's RT snapshots remain the recovery
  /// source.
  pub fn stop(&self) {
    self.db.stop();
    self.db.join();
    info!("storage stopped");
  }
}

#[cfg(test)]
mod tests;
