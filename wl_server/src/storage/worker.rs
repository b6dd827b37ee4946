use super::job::DbJob;
use parking_lot::{Condvar, Mutex};
use std::{
  collections::VecDeque,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  thread,
  thread::JoinHandle,
};

pub const MAX_QUEUE: usize = 360;

struct Inner {
  queue:   Mutex<VecDeque<DbJob>>,
  cv:      Condvar,
  running: AtomicBool,
  cap:     usize,
}

/// The single background thread that talks to the cache and the
/// database. Jobs are handed to it through a bounded queue; a full
/// queue refuses the push, and the caller applies its own policy
/// (the flush timer re-marks the uids).
pub struct DbWorker {
  inner:  Arc<Inner>,
  handle: Mutex<Option<JoinHandle<()>>>,
}

impl DbWorker {
  pub fn new(cap: usize) -> Self {
    DbWorker {
      inner:  Arc::new(Inner {
        queue:   Mutex::new(VecDeque::new()),
        cv:      Condvar::new(),
        running: AtomicBool::new(false),
        cap,
      }),
      handle: Mutex::new(None),
    }
  }

  /// Spawns the worker thread. `handler` is moved onto the thread and
  /// owns all of its connections; nothing else ever touches them.
  pub fn start(&self, mut handler: impl FnMut(&DbJob) + Send + 'static) {
    self.inner.running.store(true, Ordering::SeqCst);
    let inner = self.inner.clone();
    let th = thread::Builder::new()
      .name("db-worker".into())
      .spawn(move || {
        loop {
          let job = {
            let mut queue = inner.queue.lock();
            while queue.is_empty() && inner.running.load(Ordering::SeqCst) {
              inner.cv.wait(&mut queue);
            }
            match queue.pop_front() {
              Some(job) => job,
              // Queue drained and we were told to stop.
              None => break,
            }
          };
          handler(&job);
        }
      })
      .expect("failed to spawn db worker thread");
    *self.handle.lock() = Some(th);
  }

  /// Queues a job unless the queue is full. Never blocks.
  pub fn try_push(&self, job: DbJob) -> bool {
    {
      let mut queue = self.inner.queue.lock();
      if queue.len() >= self.inner.cap {
        return false;
      }
      queue.push_back(job);
    }
    self.inner.cv.notify_one();
    true
  }

  /// Signals the worker to stop once the queue is drained.
  pub fn stop(&self) {
    self.inner.running.store(false, Ordering::SeqCst);
    self.inner.cv.notify_all();
  }

  pub fn join(&self) {
    if let Some(th) = self.handle.lock().take() {
      let _ = th.join();
    }
  }

  pub fn queue_len(&self) -> usize { self.inner.queue.lock().len() }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;

  #[test]
  fn refuses_pushes_when_full() {
    let worker = DbWorker::new(2);
    assert!(worker.try_push(DbJob::new(vec![1])));
    assert!(worker.try_push(DbJob::new(vec![2])));
    assert!(!worker.try_push(DbJob::new(vec![3])));
    assert_eq!(worker.queue_len(), 2);
  }

  #[test]
  fn drains_queue_before_stopping() {
    let worker = DbWorker::new(16);
    for i in 0..5 {
      assert!(worker.try_push(DbJob::new(vec![i])));
    }
    let seen = Arc::new(AtomicUsize::new(0));
    let s = seen.clone();
    worker.start(move |job| {
      s.fetch_add(job.len(), Ordering::SeqCst);
    });
    worker.stop();
    worker.join();
    assert_eq!(seen.load(Ordering::SeqCst), 5);
  }
}
