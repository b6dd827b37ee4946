/// One unit of work for the DB worker. An empty `uids` is the sentinel
/// meaning "drain pending real-time writes only".
#[derive(Debug, Clone, Default)]
pub struct DbJob {
  pub uids:        Vec<u64>,
  pub enqueued_ms: u64,
  pub batch_id:    u32,
}

impl DbJob {
  pub fn new(uids: Vec<u64>) -> Self { DbJob { uids, ..DbJob::default() } }

  pub fn is_empty(&self) -> bool { self.uids.is_empty() }
  pub fn len(&self) -> usize { self.uids.len() }
}
