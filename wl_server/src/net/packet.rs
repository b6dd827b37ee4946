//! Inbound packet dispatch. Login, ping and field entry run right
//! here on the I/O thread (they touch session state and the global
//! registries, never per-field state). Skill and move input are
//! transcoded into [`NetMessage`]s for the target field's worker, so
//! the I/O thread never touches simulation state.

use super::{Connection, SessionState};
use crate::{field::NetMessage, player::Player, server::GameServer};
use std::sync::Arc;
use wl_common::{
  math::Vec2,
  net::{cb, sb, FieldCmdKind, SkillError},
};

/// Where players appear when entering a field.
const SPAWN_POINT: Vec2 = Vec2 { x: 102.1, y: 155.91 };

/// Handles a single packet.
pub(crate) fn handle(server: &Arc<GameServer>, conn: &mut Connection, p: sb::Packet) {
  match p {
    sb::Packet::Login { user_id, token } => handle_login(server, conn, user_id, token),
    sb::Packet::Ping { client_time_ms } => {
      conn.send(cb::Packet::Pong { client_time_ms });
    }
    sb::Packet::EnterField { field_id } => handle_enter_field(server, conn, field_id),
    sb::Packet::LeaveField => handle_leave_field(server, conn),
    sb::Packet::SkillCmd { skill, target_id } => handle_skill(server, conn, skill, target_id),
    sb::Packet::FieldCmd { kind, entity_id, dir, .. } => {
      handle_field_cmd(server, conn, kind, entity_id, dir)
    }
  }
}

fn handle_login(server: &Arc<GameServer>, conn: &mut Connection, user_id: String, token: String) {
  // Malformed logins get no ack; there is nothing useful to tell a
  // client that did not identify itself.
  if user_id.is_empty() || token.is_empty() {
    warn!("login with empty user id or token");
    return;
  }
  if conn.sess().player_id != 0 {
    warn!("session {} sent a second login", conn.sess().player_id);
    return;
  }

  let player_id = server.ids().next_player_id();
  conn.sess_mut().player_id = player_id;
  conn.sess_mut().state = SessionState::LoggedIn;
  server.sessions().bind(player_id, conn.sender());

  info!("{user_id} logged in as player {player_id}");
  conn.send(cb::Packet::LoginAck {
    ok: true,
    player_id,
    user_id,
    default_field_id: server.default_field_id(),
  });
}

fn handle_enter_field(server: &Arc<GameServer>, conn: &mut Connection, field_id: u32) {
  let sess = conn.sess();
  if sess.player_id == 0 {
    return;
  }
  // Entering a new field implies leaving the old one.
  if sess.state == SessionState::InField {
    handle_leave_field(server, conn);
  }

  let player_id = conn.sess().player_id;
  server.fields().ensure_field(field_id);

  // The ack must reach the client's queue before the worker can emit
  // any AOI events for this player, so it learns its own id first.
  conn.send(cb::Packet::EnterFieldAck { field_id, player_id });

  let player = Player::new(player_id, field_id, SPAWN_POINT);
  if server.fields().send(field_id, NetMessage::Enter { player }) {
    let sess = conn.sess_mut();
    sess.state = SessionState::InField;
    sess.field_id = field_id;
  } else {
    warn!("field {field_id} queue refused player {player_id} enter");
  }
}

fn handle_leave_field(server: &Arc<GameServer>, conn: &mut Connection) {
  let sess = conn.sess();
  if sess.state != SessionState::InField {
    return;
  }
  if !server.fields().send(sess.field_id, NetMessage::Leave { player_id: sess.player_id }) {
    warn!("could not queue field leave for player {}", sess.player_id);
  }
  let sess = conn.sess_mut();
  sess.state = SessionState::LoggedIn;
  sess.field_id = 0;
}

fn handle_skill(server: &Arc<GameServer>, conn: &mut Connection, skill: u8, target_id: u64) {
  let sess = conn.sess();
  // Unlike the silent drops elsewhere, skills always get an explicit
  // failure ack; the client needs it to cancel its local cast.
  if sess.state != SessionState::InField {
    conn.send(cb::Packet::SkillCmdAck {
      skill,
      target_id,
      ok: false,
      err: SkillError::InvalidState,
    });
    return;
  }
  let msg = NetMessage::Skill { player_id: sess.player_id, target_id, skill };
  if !server.fields().send(sess.field_id, msg) {
    conn.send(cb::Packet::SkillCmdAck {
      skill,
      target_id,
      ok: false,
      err: SkillError::InvalidState,
    });
  }
}

fn handle_field_cmd(
  server: &Arc<GameServer>,
  conn: &mut Connection,
  kind: FieldCmdKind,
  entity_id: u64,
  dir: Vec2,
) {
  let sess = conn.sess();
  if sess.state != SessionState::InField || kind != FieldCmdKind::Move {
    return;
  }
  // Clients only ever speak for themselves.
  if entity_id != sess.player_id {
    warn!("player {} sent move input for entity {entity_id}", sess.player_id);
    return;
  }
  if !server.fields().send(sess.field_id, NetMessage::Move { player_id: sess.player_id, dir }) {
    debug!("field {} queue full, dropping move input", sess.field_id);
  }
}
