//! 2D math for field simulation. Fields are flat; the vertical axis
//! does not exist on the server, so everything here is an `f32` pair.

mod sector;
mod vec;

pub use sector::SectorPos;
pub use vec::Vec2;
