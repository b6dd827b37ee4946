use super::{read_enum, AiStateKind, EntityType, FieldCmdKind, ParseError, Result, SkillError};
use crate::{math::Vec2, util::Buffer};

/// A clientbound packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
  LoginAck {
    ok:               bool,
    player_id:        u64,
    user_id:          String,
    default_field_id: u32,
  },
  Pong {
    client_time_ms: u64,
  },
  EnterFieldAck {
    field_id:  u32,
    player_id: u64,
  },
  SkillCmdAck {
    skill:     u8,
    target_id: u64,
    ok:        bool,
    err:       SkillError,
  },
  /// A view change: an entity entered/left view, moved, or is being
  /// reported on a fresh sector subscription.
  FieldCmd {
    kind:        FieldCmdKind,
    entity_type: EntityType,
    entity_id:   u64,
    pos:         Vec2,
    prefab_name: String,
  },
  CombatEvent {
    attacker_type: EntityType,
    attacker_id:   u64,
    target_type:   EntityType,
    target_id:     u64,
    damage:        i32,
    remain_hp:     i32,
  },
  StatEvent {
    entity_type: EntityType,
    entity_id:   u64,
    hp:          i32,
    max_hp:      i32,
    sp:          i32,
    max_sp:      i32,
  },
  AiStateEvent {
    entity_type: EntityType,
    entity_id:   u64,
    state:       AiStateKind,
  },
}

impl Packet {
  pub fn id(&self) -> u8 {
    match self {
      Self::LoginAck { .. } => 0,
      Self::Pong { .. } => 1,
      Self::EnterFieldAck { .. } => 2,
      Self::SkillCmdAck { .. } => 3,
      Self::FieldCmd { .. } => 4,
      Self::CombatEvent { .. } => 5,
      Self::StatEvent { .. } => 6,
      Self::AiStateEvent { .. } => 7,
    }
  }

  pub fn write(&self, buf: &mut Buffer<Vec<u8>>) {
    buf.write_u8(self.id());
    match self {
      Self::LoginAck { ok, player_id, user_id, default_field_id } => {
        buf.write_bool(*ok);
        buf.write_u64(*player_id);
        buf.write_str(user_id);
        buf.write_u32(*default_field_id);
      }
      Self::Pong { client_time_ms } => buf.write_u64(*client_time_ms),
      Self::EnterFieldAck { field_id, player_id } => {
        buf.write_u32(*field_id);
        buf.write_u64(*player_id);
      }
      Self::SkillCmdAck { skill, target_id, ok, err } => {
        buf.write_u8(*skill);
        buf.write_u64(*target_id);
        buf.write_bool(*ok);
        buf.write_u8(err.id());
      }
      Self::FieldCmd { kind, entity_type, entity_id, pos, prefab_name } => {
        buf.write_u8(kind.id());
        buf.write_u8(entity_type.id());
        buf.write_u64(*entity_id);
        buf.write_f32(pos.x);
        buf.write_f32(pos.y);
        buf.write_str(prefab_name);
      }
      Self::CombatEvent { attacker_type, attacker_id, target_type, target_id, damage, remain_hp } => {
        buf.write_u8(attacker_type.id());
        buf.write_u64(*attacker_id);
        buf.write_u8(target_type.id());
        buf.write_u64(*target_id);
        buf.write_i32(*damage);
        buf.write_i32(*remain_hp);
      }
      Self::StatEvent { entity_type, entity_id, hp, max_hp, sp, max_sp } => {
        buf.write_u8(entity_type.id());
        buf.write_u64(*entity_id);
        buf.write_i32(*hp);
        buf.write_i32(*max_hp);
        buf.write_i32(*sp);
        buf.write_i32(*max_sp);
      }
      Self::AiStateEvent { entity_type, entity_id, state } => {
        buf.write_u8(entity_type.id());
        buf.write_u64(*entity_id);
        buf.write_u8(state.id());
      }
    }
  }

  pub fn read(buf: &mut Buffer<&[u8]>) -> Result<Self> {
    Ok(match buf.read_u8()? {
      0 => Self::LoginAck {
        ok:               buf.read_bool()?,
        player_id:        buf.read_u64()?,
        user_id:          buf.read_str()?,
        default_field_id: buf.read_u32()?,
      },
      1 => Self::Pong { client_time_ms: buf.read_u64()? },
      2 => Self::EnterFieldAck { field_id: buf.read_u32()?, player_id: buf.read_u64()? },
      3 => Self::SkillCmdAck {
        skill:     buf.read_u8()?,
        target_id: buf.read_u64()?,
        ok:        buf.read_bool()?,
        err:       read_enum(buf, SkillError::from_id, "SkillCmdAck", "err")?,
      },
      4 => Self::FieldCmd {
        kind:        read_enum(buf, FieldCmdKind::from_id, "FieldCmd", "kind")?,
        entity_type: read_enum(buf, EntityType::from_id, "FieldCmd", "entity_type")?,
        entity_id:   buf.read_u64()?,
        pos:         Vec2::new(buf.read_f32()?, buf.read_f32()?),
        prefab_name: buf.read_str()?,
      },
      5 => Self::CombatEvent {
        attacker_type: read_enum(buf, EntityType::from_id, "CombatEvent", "attacker_type")?,
        attacker_id:   buf.read_u64()?,
        target_type:   read_enum(buf, EntityType::from_id, "CombatEvent", "target_type")?,
        target_id:     buf.read_u64()?,
        damage:        buf.read_i32()?,
        remain_hp:     buf.read_i32()?,
      },
      6 => Self::StatEvent {
        entity_type: read_enum(buf, EntityType::from_id, "StatEvent", "entity_type")?,
        entity_id:   buf.read_u64()?,
        hp:          buf.read_i32()?,
        max_hp:      buf.read_i32()?,
        sp:          buf.read_i32()?,
        max_sp:      buf.read_i32()?,
      },
      7 => Self::AiStateEvent {
        entity_type: read_enum(buf, EntityType::from_id, "AiStateEvent", "entity_type")?,
        entity_id:   buf.read_u64()?,
        state:       read_enum(buf, AiStateKind::from_id, "AiStateEvent", "state")?,
      },
      id => return Err(ParseError::InvalidId(id)),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn field_cmd_roundtrip() {
    let p = Packet::FieldCmd {
      kind:        FieldCmdKind::Snapshot,
      entity_type: EntityType::Monster,
      entity_id:   1007,
      pos:         Vec2::new(25.0, 275.0),
      prefab_name: "SkeletonBow".into(),
    };
    let mut buf = Buffer::new(vec![]);
    p.write(&mut buf);
    let data = buf.into_inner();
    assert_eq!(Packet::read(&mut Buffer::new(data.as_slice())).unwrap(), p);
  }

  #[test]
  fn truncated_packet_is_an_error() {
    let p = Packet::EnterFieldAck { field_id: 1000, player_id: 3 };
    let mut buf = Buffer::new(vec![]);
    p.write(&mut buf);
    let data = buf.into_inner();
    assert!(Packet::read(&mut Buffer::new(&data[..data.len() - 2])).is_err());
  }
}
