//! The I/O reactor: accepts connections, parses length-prefixed
//! frames, dispatches inbound packets, flushes outbound queues, and
//! drives the storage flush timer off its poll deadline.
//!
//! Reads, writes and handlers all run on the single reactor thread.
//! The pieces that field workers touch from their own threads are the
//! [`ConnSender`]s, which queue packets on a channel and wake the
//! poll.

use crate::server::GameServer;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use mio::{
  event::Event,
  net::{TcpListener, TcpStream},
  Events, Interest, Poll, Token, Waker,
};
use std::{
  collections::HashMap,
  fmt, io,
  io::{Read, Write},
  net::SocketAddr,
  sync::Arc,
  time::Instant,
};
use wl_common::{
  net::{cb, sb},
  util::Buffer,
};

pub mod packet;

/// Frames larger than this are treated as a protocol violation and
/// drop the connection.
const MAX_FRAME: usize = 64 * 1024;

/// What a session is allowed to do right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
  Connected,
  LoggedIn,
  InField,
}

/// Per-connection session state, owned by the reactor.
#[derive(Debug)]
pub struct Session {
  pub state:     SessionState,
  pub player_id: u64,
  pub field_id:  u32,
}

impl Session {
  fn new() -> Self { Session { state: SessionState::Connected, player_id: 0, field_id: 0 } }
}

pub enum WakeEvent {
  Clientbound(Token),
}

pub struct Connection {
  stream: TcpStream,

  /// Sending on this will send a packet to the client.
  tx:    Sender<cb::Packet>,
  rx:    Receiver<cb::Packet>,
  wake:  Sender<WakeEvent>,
  waker: Arc<Waker>,
  tok:   Token,

  sess: Session,

  incoming: Vec<u8>,
  outgoing: Vec<u8>,
  garbage:  Vec<u8>,
}

/// A cheap handle for sending packets to one client from any thread.
#[derive(Debug, Clone)]
pub struct ConnSender {
  tx:    Sender<cb::Packet>,
  wake:  Sender<WakeEvent>,
  waker: Arc<Waker>,
  tok:   Token,
}

impl fmt::Debug for Connection {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.debug_struct("Connection").field("sess", &self.sess).finish()
  }
}

impl ConnSender {
  /// Sends the given packet to the client. Assuming there aren't too
  /// many packets in the queue, this is a non-blocking operation.
  /// This will block if there are too many packets queued. The limit
  /// is 512 packets before this will block, so this should very
  /// rarely happen.
  ///
  /// Note that this will simply drop the packet if the client has
  /// disconnected.
  pub fn send(&self, p: impl Into<cb::Packet>) {
    if self.tx.send(p.into()).is_ok() {
      let _ = self.wake.send(WakeEvent::Clientbound(self.tok));
      let _ = self.waker.wake();
    }
  }

  #[cfg(test)]
  pub(crate) fn mock(waker: &Arc<Waker>) -> (Receiver<cb::Packet>, ConnSender) {
    let (tx, rx) = crossbeam_channel::bounded(2048);
    let (wake_tx, _wake_rx) = crossbeam_channel::bounded(2048);
    (rx, ConnSender { tx, wake: wake_tx, waker: waker.clone(), tok: Token(0) })
  }
}

impl Connection {
  fn new(stream: TcpStream, wake: Sender<WakeEvent>, waker: Arc<Waker>, tok: Token) -> Self {
    // A busy view change can fan out a few hundred events at once, so
    // leave headroom before senders start blocking.
    let (tx, rx) = crossbeam_channel::bounded(512);
    Connection {
      stream,
      tx,
      rx,
      wake,
      waker,
      tok,
      sess: Session::new(),
      incoming: Vec::with_capacity(1024),
      outgoing: Vec::with_capacity(1024),
      garbage: vec![0; 64 * 1024],
    }
  }

  /// Creates a sender that will send packets to the client on this
  /// connection. This needs to clone a few arcs, so it should not be
  /// used frequently.
  pub fn sender(&self) -> ConnSender {
    ConnSender {
      tx:    self.tx.clone(),
      wake:  self.wake.clone(),
      waker: self.waker.clone(),
      tok:   self.tok,
    }
  }

  pub fn sess(&self) -> &Session { &self.sess }
  pub fn sess_mut(&mut self) -> &mut Session { &mut self.sess }

  /// Queues a packet for this client and flushes what the socket will
  /// take.
  pub fn send(&mut self, p: cb::Packet) {
    if self.tx.send(p).is_ok() {
      let _ = self.try_send();
    }
  }

  /// If this returns Ok(true), the connection should be closed.
  /// Ok(false) is normal operation. This will never return
  /// Err(WouldBlock).
  fn read(&mut self) -> io::Result<(bool, Vec<sb::Packet>)> {
    let mut out = vec![];
    loop {
      let n = match self.stream.read(&mut self.garbage) {
        Ok(0) => return Ok((true, out)),
        Ok(n) => n,
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok((false, out)),
        Err(e) => return Err(e),
      };
      self.incoming.extend_from_slice(&self.garbage[..n]);
      out.extend(self.read_incoming()?);
    }
  }

  fn read_incoming(&mut self) -> io::Result<Vec<sb::Packet>> {
    let mut out = vec![];
    loop {
      if self.incoming.len() < 4 {
        break;
      }
      let len = u32::from_be_bytes(self.incoming[..4].try_into().unwrap()) as usize;
      if len > MAX_FRAME {
        return Err(io::Error::new(
          io::ErrorKind::InvalidData,
          format!("frame of {len} bytes is past the {MAX_FRAME} byte limit"),
        ));
      }
      if self.incoming.len() < 4 + len {
        // Partial frame; wait for more data.
        break;
      }
      {
        let mut buf = Buffer::new(&self.incoming[4..4 + len]);
        let p = sb::Packet::read(&mut buf).map_err(|err| {
          io::Error::new(io::ErrorKind::InvalidData, format!("while reading packet got err: {err}"))
        })?;
        let n = buf.index();
        if n != len {
          return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("packet did not parse enough bytes (expected {len}, only parsed {n})"),
          ));
        }
        out.push(p);
      }
      self.incoming.drain(0..4 + len);
    }
    Ok(out)
  }

  fn try_send(&mut self) -> io::Result<()> {
    loop {
      match self.rx.try_recv() {
        Ok(p) => self.send_to_client(&p)?,
        Err(TryRecvError::Empty) => break,
        Err(_e) => unreachable!(),
      }
    }
    Ok(())
  }

  fn send_to_client(&mut self, p: &cb::Packet) -> io::Result<()> {
    let mut buf = Buffer::new(vec![]);
    p.write(&mut buf);
    let payload = buf.into_inner();

    self.outgoing.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    self.outgoing.extend_from_slice(&payload);
    self.try_flush()
  }

  fn try_flush(&mut self) -> io::Result<()> {
    while !self.outgoing.is_empty() {
      let n = match self.stream.write(&self.outgoing) {
        Ok(v) => v,
        Err(e) => return Err(e),
      };
      self.outgoing.drain(0..n);
    }
    Ok(())
  }
}

pub struct ConnectionManager {
  connections: HashMap<Token, Connection>,
  server:      Arc<GameServer>,
}

impl ConnectionManager {
  pub fn new(server: Arc<GameServer>) -> ConnectionManager {
    ConnectionManager { connections: HashMap::new(), server }
  }

  pub fn run(&mut self, addr: SocketAddr) -> io::Result<()> {
    const LISTEN: Token = Token(0xffffffff);
    const WAKE: Token = Token(0xfffffffe);

    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity(128);
    let mut listen = TcpListener::bind(addr)?;

    let waker = Arc::new(Waker::new(poll.registry(), WAKE)?);

    poll.registry().register(&mut listen, LISTEN, Interest::READABLE)?;

    let mut next_token = 0;
    let (wake_tx, wake_rx) = crossbeam_channel::bounded(1024);

    // The flush timer shares this thread: the poll deadline is
    // whatever is left of the current flush interval.
    let flush_interval = self.server.storage().flush_interval();
    let mut next_flush = Instant::now() + flush_interval;

    loop {
      let timeout = next_flush.saturating_duration_since(Instant::now());
      match poll.poll(&mut events, Some(timeout)) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
        Err(e) => return Err(e),
      }

      for event in events.iter() {
        match event.token() {
          LISTEN => loop {
            let (mut conn, _addr) = match listen.accept() {
              Ok(v) => v,
              // No more incoming connections queued.
              Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
              Err(e) => return Err(e),
            };

            let token = Token(next_token);
            next_token += 1;
            poll.registry().register(&mut conn, token, Interest::READABLE | Interest::WRITABLE)?;

            self
              .connections
              .insert(token, Connection::new(conn, wake_tx.clone(), waker.clone(), token));
          },
          WAKE => loop {
            match wake_rx.try_recv() {
              Ok(WakeEvent::Clientbound(tok)) => {
                let close = match self.connections.get_mut(&tok) {
                  Some(conn) => match conn.try_send() {
                    Ok(()) => false,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => false,
                    Err(e) => {
                      Self::log_error(&e);
                      true
                    }
                  },
                  None => false,
                };
                if close {
                  self.close_connection(tok);
                }
              }
              Err(TryRecvError::Empty) => break,
              Err(_) => unreachable!(),
            }
          },
          token => {
            if self.handle(token, event) {
              self.close_connection(token);
            }
          }
        }
      }

      if Instant::now() >= next_flush {
        self.server.storage().flush_tick();
        next_flush += flush_interval;
      }
    }
  }

  /// Handles one readiness event. Returns true if the connection
  /// should be closed.
  fn handle(&mut self, token: Token, ev: &Event) -> bool {
    let Some(conn) = self.connections.get_mut(&token) else { return false };

    if ev.is_readable() {
      let (disconnect, packets) = match conn.read() {
        Ok(v) => v,
        Err(e) => {
          Self::log_error(&e);
          return true;
        }
      };
      for p in packets {
        packet::handle(&self.server, conn, p);
      }
      if disconnect {
        return true;
      }
    }

    if ev.is_writable() {
      match conn.try_flush() {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
        Err(e) => {
          Self::log_error(&e);
          return true;
        }
      }
    }
    false
  }

  /// Tears down a connection: unbinds the session and pulls the
  /// player out of its field.
  fn close_connection(&mut self, token: Token) {
    let Some(conn) = self.connections.remove(&token) else { return };
    let sess = conn.sess();
    if sess.player_id != 0 {
      self.server.sessions().unbind(sess.player_id);
      if sess.state == SessionState::InField
        && !self
          .server
          .fields()
          .send(sess.field_id, crate::field::NetMessage::Leave { player_id: sess.player_id })
      {
        warn!("could not queue field leave for player {}", sess.player_id);
      }
      info!("player {} disconnected", sess.player_id);
    } else {
      info!("a client disconnected before logging in");
    }
  }

  /// Disconnects and resets are normal; anything else is logged.
  fn log_error(e: &io::Error) {
    if !matches!(e.kind(), io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset) {
      error!("error in connection: {}", e);
    }
  }
}
