use log::LevelFilter;
use std::str::FromStr;
use toml::Value;

/// A type which can be read out of a TOML document.
pub trait TomlValue {
  /// If the toml value matches this type, returns Some(v).
  fn from_toml(v: &Value) -> Option<Self>
  where
    Self: Sized;

  /// Returns the name of this value (string, integer, etc), for error
  /// messages.
  fn name() -> String
  where
    Self: Sized;
}

impl TomlValue for bool {
  fn from_toml(v: &Value) -> Option<Self> { v.as_bool() }

  fn name() -> String { "bool".into() }
}

impl TomlValue for LevelFilter {
  fn from_toml(v: &Value) -> Option<Self> { LevelFilter::from_str(v.as_str()?).ok() }

  fn name() -> String { "log level filter".into() }
}

impl<T> TomlValue for Vec<T>
where
  T: TomlValue,
{
  fn from_toml(v: &Value) -> Option<Self> {
    v.as_array().and_then(|v| v.iter().map(|v| T::from_toml(v)).collect::<Option<Vec<T>>>())
  }

  fn name() -> String { format!("array of {}", T::name()) }
}

macro_rules! toml_number {
  ($name:expr, $($ty:ty),*) => {
    $(
      impl TomlValue for $ty {
        fn from_toml(v: &Value) -> Option<Self> {
          v.as_integer().and_then(|v| v.try_into().ok())
        }

        fn name() -> String {
          $name.into()
        }
      }
    )*
  };
}

toml_number!("integer", u8, u16, u32, u64, i8, i16, i32, i64);

impl TomlValue for String {
  fn from_toml(v: &Value) -> Option<Self> { v.as_str().map(|v| v.into()) }

  fn name() -> String { "string".into() }
}

impl TomlValue for f32 {
  fn from_toml(v: &Value) -> Option<Self> { f64::from_toml(v).map(|v| v as f32) }

  fn name() -> String { "float".into() }
}

impl TomlValue for f64 {
  // Integer literals are accepted where a float is expected, so that
  // `sector-size = 15` works.
  fn from_toml(v: &Value) -> Option<Self> { v.as_float().or_else(|| v.as_integer().map(|v| v as f64)) }

  fn name() -> String { "float".into() }
}
