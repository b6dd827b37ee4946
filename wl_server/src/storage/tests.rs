use super::*;
use parking_lot::Mutex as PMutex;
use pretty_assertions::assert_eq;

fn system(queue_cap: usize, max_batch: usize) -> StorageSystem {
  StorageSystem::with_worker(DbWorker::new(queue_cap), Duration::from_millis(2000), max_batch)
}

#[test]
fn flush_chunks_and_remarks_on_backpressure() {
  // Queue of 2, 300 dirty uids in chunks of 100: the third chunk must
  // come back as dirty marks, not vanish.
  let storage = system(2, 100);
  for uid in 0..300 {
    storage.dirty.mark_dirty(uid);
  }

  storage.flush_tick();

  assert_eq!(storage.db.queue_len(), 2);
  assert_eq!(storage.dirty.len(), 100);
}

#[test]
fn uids_appear_at_most_once_per_flush() {
  let storage = system(16, 100);
  for uid in 0..250 {
    storage.dirty.mark_dirty(uid);
    // Duplicate marks collapse in the hub.
    storage.dirty.mark_dirty(uid);
  }

  storage.flush_tick();

  let jobs = Arc::new(PMutex::new(Vec::<DbJob>::new()));
  let sink = jobs.clone();
  storage.db.start(move |job| sink.lock().push(job.clone()));
  storage.db.stop();
  storage.db.join();

  let jobs = jobs.lock();
  assert_eq!(jobs.len(), 3);
  let mut seen: Vec<u64> = jobs.iter().flat_map(|j| j.uids.iter().copied()).collect();
  let total = seen.len();
  seen.sort_unstable();
  seen.dedup();
  assert_eq!(seen.len(), total, "a uid was queued twice in one flush");
  assert_eq!(seen, (0..250).collect::<Vec<u64>>());
  for job in jobs.iter() {
    assert!(job.len() <= 100);
  }
}

#[test]
fn rt_pending_pushes_sentinel_job() {
  let storage = system(4, 100);
  storage.flush_tick();
  assert_eq!(storage.db.queue_len(), 0);

  storage.rt.enqueue(UserSnapshot { uid: 1, x: 1.0, z: 2.0, hp: 3, sp: 4, ..Default::default() });
  storage.flush_tick();
  assert_eq!(storage.db.queue_len(), 1);

  let jobs = Arc::new(PMutex::new(Vec::<DbJob>::new()));
  let sink = jobs.clone();
  storage.db.start(move |job| sink.lock().push(job.clone()));
  storage.db.stop();
  storage.db.join();
  assert!(jobs.lock()[0].is_empty());
}

#[test]
fn rt_queue_swap_drain() {
  let rt = RtQueue::new();
  rt.enqueue(UserSnapshot { uid: 1, ..Default::default() });
  rt.enqueue(UserSnapshot { uid: 2, ..Default::default() });
  assert_eq!(rt.pending(), 2);

  let mut buf = vec![];
  rt.swap_drain(&mut buf);
  assert_eq!(buf.iter().map(|s| s.uid).collect::<Vec<_>>(), vec![1, 2]);
  assert_eq!(rt.pending(), 0);

  rt.swap_drain(&mut buf);
  assert!(buf.is_empty());
}

#[test]
fn failed_job_remarks_its_uids() {
  // Nothing listens on these ports, so ensure_connected fails fast
  // and the job's uids must come back as dirty marks.
  let cfg = DbConfig {
    redis_host:       "127.0.0.1".into(),
    redis_port:       1,
    redis_timeout_ms: 50,
    mysql_host:       "127.0.0.1".into(),
    mysql_port:       1,
    mysql_user:       "x".into(),
    mysql_pass:       "".into(),
    mysql_db:         "x".into(),
    mysql_charset:    "utf8mb4".into(),
    mysql_timeout_ms: 50,
  };
  let rt = Arc::new(RtQueue::new());
  let dirty = Arc::new(DirtyHub::new());
  let mut ctx = DbContext::new(cfg, rt, dirty.clone());

  ctx.handle_job(&DbJob::new(vec![7, 8, 9]));

  let mut remarked = dirty.steal_all();
  remarked.sort_unstable();
  assert_eq!(remarked, vec![7, 8, 9]);
}
