//! Real-time snapshots in the cache. Each user has one hash at
//! `u:{uid}:rt` with fields `x`, `z` (floats) and `hp`, `sp` (ints).
//! All traffic is pipelined; replies may come back in string or
//! integer form depending on how the value was written, so parsing
//! accepts both.

use super::UserSnapshot;
use redis::Value;

pub fn key_rt(uid: u64) -> String { format!("u:{uid}:rt") }

/// Pipelines one `HSET` per snapshot.
pub fn write_rt(conn: &mut redis::Connection, snaps: &[UserSnapshot]) -> redis::RedisResult<()> {
  if snaps.is_empty() {
    return Ok(());
  }
  let mut pipe = redis::pipe();
  for s in snaps {
    pipe
      .cmd("HSET")
      .arg(key_rt(s.uid))
      .arg("x")
      .arg(s.x)
      .arg("z")
      .arg(s.z)
      .arg("hp")
      .arg(s.hp)
      .arg("sp")
      .arg(s.sp)
      .ignore();
  }
  pipe.query(conn)
}

/// Pipelines one `HMGET` per uid. Only uids whose reply parses fully
/// contribute a snapshot; missing or partial hashes are skipped.
pub fn fetch_users(
  conn: &mut redis::Connection,
  uids: &[u64],
) -> redis::RedisResult<Vec<UserSnapshot>> {
  if uids.is_empty() {
    return Ok(vec![]);
  }
  let mut pipe = redis::pipe();
  for &uid in uids {
    pipe.cmd("HMGET").arg(key_rt(uid)).arg("x").arg("z").arg("hp").arg("sp");
  }
  let replies: Vec<Value> = pipe.query(conn)?;

  let mut out = Vec::with_capacity(uids.len());
  for (&uid, reply) in uids.iter().zip(&replies) {
    if let Some(snap) = parse_snapshot(uid, reply) {
      out.push(snap);
    }
  }
  Ok(out)
}

fn parse_snapshot(uid: u64, reply: &Value) -> Option<UserSnapshot> {
  let Value::Bulk(items) = reply else { return None };
  if items.len() != 4 {
    return None;
  }
  Some(UserSnapshot {
    uid,
    x: parse_float(&items[0])?,
    z: parse_float(&items[1])?,
    hp: parse_int(&items[2])?,
    sp: parse_int(&items[3])?,
    inv_json: String::new(),
  })
}

fn parse_float(v: &Value) -> Option<f32> {
  match v {
    Value::Data(bytes) => std::str::from_utf8(bytes).ok()?.trim().parse().ok(),
    Value::Int(i) => Some(*i as f32),
    _ => None,
  }
}

fn parse_int(v: &Value) -> Option<i32> {
  match v {
    Value::Int(i) => (*i).try_into().ok(),
    Value::Data(bytes) => std::str::from_utf8(bytes).ok()?.trim().parse().ok(),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn parses_string_and_integer_reply_forms() {
    let reply = Value::Bulk(vec![
      Value::Data(b"12.5".to_vec()),
      Value::Int(7),
      Value::Data(b"90".to_vec()),
      Value::Int(40),
    ]);
    assert_eq!(
      parse_snapshot(3, &reply),
      Some(UserSnapshot { uid: 3, x: 12.5, z: 7.0, hp: 90, sp: 40, inv_json: String::new() })
    );
  }

  #[test]
  fn missing_field_drops_the_row() {
    let reply = Value::Bulk(vec![
      Value::Data(b"12.5".to_vec()),
      Value::Nil,
      Value::Int(90),
      Value::Int(40),
    ]);
    assert_eq!(parse_snapshot(3, &reply), None);
  }

  #[test]
  fn non_bulk_reply_drops_the_row() {
    assert_eq!(parse_snapshot(3, &Value::Nil), None);
    assert_eq!(parse_snapshot(3, &Value::Bulk(vec![Value::Int(1)])), None);
  }
}
