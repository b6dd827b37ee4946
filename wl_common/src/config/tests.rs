use super::Config;
use pretty_assertions::assert_eq;
use std::sync::Arc;

const DEFAULT: &str = r#"
address = "0.0.0.0:7001"

[field]
sector-size = 15.0
view-radius-sectors = 2
"#;

#[test]
fn primary_overrides_default() {
  let config = Config::new_src("address = \"127.0.0.1:9000\"", DEFAULT);
  assert_eq!(config.get::<String>("address"), "127.0.0.1:9000");
  assert_eq!(config.get::<f32>("field.sector-size"), 15.0);
}

#[test]
fn wrong_type_falls_back() {
  let config = Config::new_src("[field]\nsector-size = \"big\"", DEFAULT);
  assert_eq!(config.get::<f32>("field.sector-size"), 15.0);
}

#[test]
fn integer_literal_reads_as_float() {
  let config = Config::new_src("[field]\nsector-size = 20", DEFAULT);
  assert_eq!(config.get::<f32>("field.sector-size"), 20.0);
}

#[test]
fn sections() {
  let config = Arc::new(Config::new_src("", DEFAULT));
  let field = config.section("field");
  assert_eq!(field.get::<u32>("view-radius-sectors"), 2);
}

#[test]
#[should_panic]
fn missing_default_panics() {
  let config = Config::new_src("", DEFAULT);
  config.get::<String>("no-such-key");
}
