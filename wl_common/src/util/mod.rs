mod buffer;

pub use buffer::{Buffer, BufferError, BufferErrorKind};
