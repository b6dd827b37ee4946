//! The wire protocol. Frames are a `u32` big-endian length prefix
//! followed by a payload; the payload is a one byte packet id and the
//! packet's fields. [`sb`] holds serverbound packets, [`cb`] holds
//! clientbound packets.

use crate::util::{Buffer, BufferError};
use std::{error::Error, fmt};

pub mod cb;
pub mod sb;

/// What a [`cb::Packet::FieldCmd`] means to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCmdKind {
  /// An entity arrived in view.
  Enter,
  /// An entity left view.
  Leave,
  /// An entity moved within view.
  Move,
  /// A pre-existing entity, reported on newly subscribing to its
  /// sector. Distinct from `Enter` so the client can tell "this
  /// appeared because I moved" apart from "this just arrived".
  Snapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
  Player,
  Monster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillError {
  None,
  /// The session is not in a field.
  InvalidState,
  /// The target does not exist (or is already dead).
  BadTarget,
}

/// AI/actor state, broadcast to watchers. Players only ever use the
/// `Idle`/`Chase`/`Attack`/`Dead` subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiStateKind {
  Idle,
  Patrol,
  Chase,
  Attack,
  Flee,
  Dead,
}

/// An error while decoding a packet.
#[derive(Debug)]
pub enum ParseError {
  /// The one byte packet id was not a known packet.
  InvalidId(u8),
  /// A field had an out-of-range discriminant.
  InvalidField { packet: &'static str, field: &'static str, value: u8 },
  /// The payload was truncated or malformed.
  Buffer(BufferError),
}

impl fmt::Display for ParseError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::InvalidId(id) => write!(f, "invalid packet id {id:#04x}"),
      Self::InvalidField { packet, field, value } => {
        write!(f, "invalid value {value} for field `{field}` of packet {packet}")
      }
      Self::Buffer(e) => write!(f, "{e}"),
    }
  }
}

impl Error for ParseError {}

impl From<BufferError> for ParseError {
  fn from(e: BufferError) -> Self { ParseError::Buffer(e) }
}

pub type Result<T> = std::result::Result<T, ParseError>;

macro_rules! wire_enum {
  ($ty:ident, $($name:ident = $id:expr),* $(,)?) => {
    impl $ty {
      pub fn id(&self) -> u8 {
        match self {
          $(Self::$name => $id),*
        }
      }
      pub fn from_id(id: u8) -> Option<Self> {
        match id {
          $($id => Some(Self::$name),)*
          _ => None,
        }
      }
    }
  };
}

wire_enum!(FieldCmdKind, Enter = 0, Leave = 1, Move = 2, Snapshot = 3);
wire_enum!(EntityType, Player = 0, Monster = 1);
wire_enum!(SkillError, None = 0, InvalidState = 1, BadTarget = 2);
wire_enum!(AiStateKind, Idle = 0, Patrol = 1, Chase = 2, Attack = 3, Flee = 4, Dead = 5);

pub(crate) fn read_enum<T>(
  buf: &mut Buffer<&[u8]>,
  from_id: fn(u8) -> Option<T>,
  packet: &'static str,
  field: &'static str,
) -> Result<T> {
  let value = buf.read_u8()?;
  from_id(value).ok_or(ParseError::InvalidField { packet, field, value })
}
