//! Durable storage. Every upsert goes through one stored procedure,
//! `sp_upsert_user_state_batch(json)`, which takes the whole batch as
//! a JSON array and applies it atomically.

use super::{Error, UserSnapshot};
use mysql::prelude::Queryable;

pub fn call_upsert_user_state_batch(
  conn: &mut mysql::Conn,
  snaps: &[UserSnapshot],
) -> Result<(), Error> {
  if snaps.is_empty() {
    return Ok(());
  }
  let json = snapshot_json(snaps)?;
  // exec_drop runs the prepared call and drains any result sets the
  // procedure produces.
  conn.exec_drop("CALL sp_upsert_user_state_batch(?)", (json,))?;
  Ok(())
}

pub fn snapshot_json(snaps: &[UserSnapshot]) -> Result<String, Error> {
  Ok(serde_json::to_string(snaps)?)
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn batch_json_shape() {
    let snaps = vec![
      UserSnapshot { uid: 1, x: 1.5, z: 2.0, hp: 90, sp: 40, inv_json: "ignored".into() },
      UserSnapshot { uid: 2, x: 0.0, z: 0.0, hp: 0, sp: 0, inv_json: String::new() },
    ];
    // inv_json is not part of the stored procedure's contract.
    assert_eq!(
      snapshot_json(&snaps).unwrap(),
      r#"[{"uid":1,"x":1.5,"z":2.0,"hp":90,"sp":40},{"uid":2,"x":0.0,"z":0.0,"hp":0,"sp":0}]"#
    );
  }
}
