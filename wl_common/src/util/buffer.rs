use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use std::{
  error::Error,
  fmt, io,
  io::{Cursor, Read, Write},
  string::FromUtf8Error,
};

pub type Result<T> = std::result::Result<T, BufferError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
  Reading,
  Writing,
}

use Mode::Reading;

#[derive(Debug)]
pub struct BufferError {
  err:  BufferErrorKind,
  pos:  u64,
  mode: Mode,
}

impl fmt::Display for BufferError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    if self.mode == Mode::Reading {
      write!(f, "error while reading from buffer at index {}: {}", self.pos, self.err)
    } else {
      write!(f, "error while writing to buffer at index {}: {}", self.pos, self.err)
    }
  }
}

#[derive(Debug)]
pub enum BufferErrorKind {
  IO(io::Error),
  FromUtf8Error(FromUtf8Error),
  StringTooLong { len: u64, max: u64 },
}

impl fmt::Display for BufferErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::IO(e) => write!(f, "{}", e),
      Self::FromUtf8Error(e) => write!(f, "{}", e),
      Self::StringTooLong { len, max } => {
        write!(f, "string is `{}` characters, longer than max `{}`", len, max)
      }
    }
  }
}

impl Error for BufferError {}

impl From<io::Error> for BufferErrorKind {
  fn from(e: io::Error) -> Self { BufferErrorKind::IO(e) }
}
impl From<FromUtf8Error> for BufferErrorKind {
  fn from(e: FromUtf8Error) -> Self { BufferErrorKind::FromUtf8Error(e) }
}

/// A cursor over a byte slice or vec, which reads and writes wire
/// primitives in big-endian order. Reads return errors; writes to a
/// `Vec<u8>` cannot fail, so they panic on the (impossible) io error
/// instead of returning a result.
#[derive(Debug)]
pub struct Buffer<T> {
  data: Cursor<T>,
}

macro_rules! add_read {
  ($fn: ident, $ty: ty) => {
    pub fn $fn(&mut self) -> Result<$ty> {
      self.data.$fn::<BigEndian>().map_err(|e| self.err(e, Reading))
    }
  };
}
// The same as add_read(), but with no type parameter
macro_rules! add_read_byte {
  ($fn: ident, $ty: ty) => {
    pub fn $fn(&mut self) -> Result<$ty> { self.data.$fn().map_err(|e| self.err(e, Reading)) }
  };
}

macro_rules! add_write {
  ($fn: ident, $ty: ty) => {
    pub fn $fn(&mut self, v: $ty) {
      self.data.$fn::<BigEndian>(v).expect("could not write to buffer")
    }
  };
}
// The same as add_write(), but with no type parameter
macro_rules! add_write_byte {
  ($fn: ident, $ty: ty) => {
    pub fn $fn(&mut self, v: $ty) { self.data.$fn(v).expect("could not write to buffer") }
  };
}

impl<T> Buffer<T> {
  pub fn new(data: T) -> Self { Buffer { data: Cursor::new(data) } }

  pub fn err(&self, e: impl Into<BufferErrorKind>, mode: Mode) -> BufferError {
    BufferError { err: e.into(), pos: self.data.position(), mode }
  }

  pub fn index(&self) -> usize { self.data.position() as usize }

  pub fn into_inner(self) -> T { self.data.into_inner() }
}

impl<T: AsRef<[u8]>> Buffer<T> {
  /// Returns the number of bytes left to read.
  pub fn remaining(&self) -> usize {
    self.data.get_ref().as_ref().len() - self.data.position() as usize
  }

  add_read_byte!(read_u8, u8);
  add_read!(read_u16, u16);
  add_read!(read_u32, u32);
  add_read!(read_u64, u64);
  add_read_byte!(read_i8, i8);
  add_read!(read_i16, i16);
  add_read!(read_i32, i32);
  add_read!(read_i64, i64);
  add_read!(read_f32, f32);
  add_read!(read_f64, f64);

  pub fn read_bool(&mut self) -> Result<bool> { Ok(self.read_u8()? != 0) }

  pub fn read_buf(&mut self, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0; len];
    self.data.read_exact(&mut buf).map_err(|e| self.err(e, Reading))?;
    Ok(buf)
  }

  /// Reads a u16 length prefix, then that many bytes of UTF-8.
  pub fn read_str(&mut self) -> Result<String> {
    let len = self.read_u16()?;
    let buf = self.read_buf(len.into())?;
    String::from_utf8(buf).map_err(|e| self.err(e, Reading))
  }
}

impl<T: AsRef<[u8]>> Buffer<T>
where
  Cursor<T>: Write,
{
  add_write_byte!(write_u8, u8);
  add_write!(write_u16, u16);
  add_write!(write_u32, u32);
  add_write!(write_u64, u64);
  add_write_byte!(write_i8, i8);
  add_write!(write_i16, i16);
  add_write!(write_i32, i32);
  add_write!(write_i64, i64);
  add_write!(write_f32, f32);
  add_write!(write_f64, f64);

  pub fn write_bool(&mut self, v: bool) { self.write_u8(v.into()); }

  pub fn write_buf(&mut self, v: &[u8]) {
    self.data.write_all(v).expect("could not write to buffer");
  }

  /// Writes a u16 length prefix, then the string's UTF-8 bytes. The
  /// string must encode to less than 65536 bytes.
  pub fn write_str(&mut self, v: &str) {
    if v.len() > u16::MAX as usize {
      panic!(
        "{}",
        self.err(
          BufferErrorKind::StringTooLong { len: v.len() as u64, max: u16::MAX.into() },
          Mode::Writing,
        )
      );
    }
    self.write_u16(v.len() as u16);
    self.write_buf(v.as_bytes());
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn read_write_primitives() {
    let mut buf = Buffer::new(vec![]);
    buf.write_u32(0xdeadbeef);
    buf.write_f32(1.5);
    buf.write_str("hello");
    let data = buf.into_inner();

    let mut buf = Buffer::new(data.as_slice());
    assert_eq!(buf.read_u32().unwrap(), 0xdeadbeef);
    assert_eq!(buf.read_f32().unwrap(), 1.5);
    assert_eq!(buf.read_str().unwrap(), "hello");
    assert_eq!(buf.remaining(), 0);
  }

  #[test]
  fn read_past_end() {
    let mut buf = Buffer::new(&[0_u8, 1][..]);
    assert!(buf.read_u32().is_err());
  }

  #[test]
  fn truncated_string() {
    // length prefix says 10 bytes, but only 2 are present
    let mut buf = Buffer::new(&[0_u8, 10, b'h', b'i'][..]);
    assert!(buf.read_str().is_err());
  }
}
