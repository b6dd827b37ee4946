use super::{read_enum, FieldCmdKind, ParseError, Result};
use crate::{math::Vec2, util::Buffer};

/// A serverbound packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
  Login { user_id: String, token: String },
  Ping { client_time_ms: u64 },
  EnterField { field_id: u32 },
  LeaveField,
  SkillCmd { skill: u8, target_id: u64 },
  /// Field-scoped input. The only kind a client sends is `Move`, where
  /// `dir` is the (not necessarily normalized) input direction; a zero
  /// `dir` means "stop".
  FieldCmd { kind: FieldCmdKind, entity_id: u64, pos: Vec2, dir: Vec2 },
}

impl Packet {
  pub fn id(&self) -> u8 {
    match self {
      Self::Login { .. } => 0,
      Self::Ping { .. } => 1,
      Self::EnterField { .. } => 2,
      Self::LeaveField => 3,
      Self::SkillCmd { .. } => 4,
      Self::FieldCmd { .. } => 5,
    }
  }

  pub fn write(&self, buf: &mut Buffer<Vec<u8>>) {
    buf.write_u8(self.id());
    match self {
      Self::Login { user_id, token } => {
        buf.write_str(user_id);
        buf.write_str(token);
      }
      Self::Ping { client_time_ms } => buf.write_u64(*client_time_ms),
      Self::EnterField { field_id } => buf.write_u32(*field_id),
      Self::LeaveField => {}
      Self::SkillCmd { skill, target_id } => {
        buf.write_u8(*skill);
        buf.write_u64(*target_id);
      }
      Self::FieldCmd { kind, entity_id, pos, dir } => {
        buf.write_u8(kind.id());
        buf.write_u64(*entity_id);
        buf.write_f32(pos.x);
        buf.write_f32(pos.y);
        buf.write_f32(dir.x);
        buf.write_f32(dir.y);
      }
    }
  }

  pub fn read(buf: &mut Buffer<&[u8]>) -> Result<Self> {
    Ok(match buf.read_u8()? {
      0 => Self::Login { user_id: buf.read_str()?, token: buf.read_str()? },
      1 => Self::Ping { client_time_ms: buf.read_u64()? },
      2 => Self::EnterField { field_id: buf.read_u32()? },
      3 => Self::LeaveField,
      4 => Self::SkillCmd { skill: buf.read_u8()?, target_id: buf.read_u64()? },
      5 => Self::FieldCmd {
        kind:      read_enum(buf, FieldCmdKind::from_id, "FieldCmd", "kind")?,
        entity_id: buf.read_u64()?,
        pos:       Vec2::new(buf.read_f32()?, buf.read_f32()?),
        dir:       Vec2::new(buf.read_f32()?, buf.read_f32()?),
      },
      id => return Err(ParseError::InvalidId(id)),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn roundtrip(p: Packet) {
    let mut buf = Buffer::new(vec![]);
    p.write(&mut buf);
    let data = buf.into_inner();
    assert_eq!(Packet::read(&mut Buffer::new(data.as_slice())).unwrap(), p);
  }

  #[test]
  fn move_input() {
    roundtrip(Packet::FieldCmd {
      kind:      FieldCmdKind::Move,
      entity_id: 7,
      pos:       Vec2::new(1.0, 2.0),
      dir:       Vec2::new(0.0, 1.0),
    });
  }

  #[test]
  fn bad_id_is_an_error() {
    let mut buf = Buffer::new(&[0xff_u8][..]);
    assert!(matches!(Packet::read(&mut buf), Err(ParseError::InvalidId(0xff))));
  }

  #[test]
  fn bad_cmd_kind_is_an_error() {
    // FieldCmd with kind 9
    let mut buf = Buffer::new(vec![]);
    buf.write_u8(5);
    buf.write_u8(9);
    let data = buf.into_inner();
    assert!(matches!(
      Packet::read(&mut Buffer::new(data.as_slice())),
      Err(ParseError::InvalidField { field: "kind", .. })
    ));
  }
}
