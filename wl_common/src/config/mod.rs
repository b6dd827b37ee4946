use std::{fs, sync::Arc};
use toml::Value;

mod types;

pub use types::TomlValue;

/// A TOML config file, paired with an embedded default document.
///
/// Every key that can be read must exist in the default document; the
/// primary file only overrides. This keeps the full set of available
/// keys discoverable in one place (the written-out default file), and
/// turns a missing default into a startup panic instead of a silent
/// misconfiguration.
pub struct Config {
  primary: Value,
  default: Value,
}

/// A view into one table of a [`Config`]. Keys are resolved relative
/// to the section's prefix.
#[derive(Clone)]
pub struct ConfigSection {
  config: Arc<Config>,
  prefix: String,
}

impl Config {
  /// Creates a new config for the given path. The default source
  /// should be loaded with `include_str!`, and is also written to
  /// `default_path` so users have a reference of every key. If either
  /// file write/read fails, a warning is logged and the embedded
  /// default is used.
  pub fn new(path: &str, default_path: &str, default_src: &str) -> Self {
    fs::write(default_path, default_src).unwrap_or_else(|e| {
      warn!("could not write default configuration to disk at `{default_path}`: {e}");
    });
    let primary = match fs::read_to_string(path) {
      Ok(src) => Self::load_toml(path, &src),
      Err(e) => {
        warn!("error reading config at `{path}`, using defaults: {e}");
        Value::Table(Default::default())
      }
    };
    Config { primary, default: Self::load_toml("default config", default_src) }
  }

  /// Creates a config from TOML source directly. Used in tests, and
  /// by tools which embed their config.
  pub fn new_src(primary: &str, default_src: &str) -> Self {
    Config {
      primary: Self::load_toml("config", primary),
      default: Self::load_toml("default config", default_src),
    }
  }

  fn load_toml(name: &str, src: &str) -> Value {
    toml::from_str(src).unwrap_or_else(|e| {
      error!("error loading toml at `{name}`: {e}");
      Value::Table(Default::default())
    })
  }

  /// Reads the value at the given dotted key. This will always return
  /// a value: if the key is missing from the primary config (or has
  /// the wrong type), the default document is used. If it is missing
  /// there as well, this panics.
  pub fn get<T: TomlValue>(&self, key: &str) -> T {
    match Self::get_val(&self.primary, key).and_then(T::from_toml) {
      Some(v) => v,
      None => {
        if let Some(val) = Self::get_val(&self.primary, key) {
          warn!("unexpected value at `{key}`: {val}, expected a {}", T::name());
        }
        self.get_default(key)
      }
    }
  }

  /// Reads the default value at the given dotted key. Panics if the
  /// key does not exist, or has the wrong type.
  pub fn get_default<T: TomlValue>(&self, key: &str) -> T {
    match Self::get_val(&self.default, key).and_then(T::from_toml) {
      Some(v) => v,
      None => panic!("default config missing key `{key}` (expected a {})", T::name()),
    }
  }

  fn get_val<'a>(val: &'a Value, key: &str) -> Option<&'a Value> {
    let mut val = val;
    for section in key.split('.') {
      val = val.as_table()?.get(section)?;
    }
    Some(val)
  }

  /// Returns a view of the table at `name`, through which keys are
  /// read relative to that table.
  pub fn section(self: &Arc<Self>, name: &str) -> ConfigSection {
    ConfigSection { config: self.clone(), prefix: name.into() }
  }
}

impl ConfigSection {
  pub fn get<T: TomlValue>(&self, key: &str) -> T {
    self.config.get(&format!("{}.{key}", self.prefix))
  }
}

#[cfg(test)]
mod tests;
