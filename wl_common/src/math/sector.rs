use super::Vec2;
use std::fmt;

/// One cell of an AOI sector grid. The grid only covers the positive
/// quadrant; [`SectorPos::of`] clamps negative world coordinates onto
/// the edge cells, so `x` and `y` are never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectorPos {
  pub x: i32,
  pub y: i32,
}

impl fmt::Display for SectorPos {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "SectorPos({} {})", self.x, self.y)
  }
}

impl SectorPos {
  #[inline(always)]
  pub fn new(x: i32, y: i32) -> Self { SectorPos { x, y } }

  /// Returns the sector containing `pos` for the given sector side
  /// length. Coordinates below zero map to the nearest edge cell.
  pub fn of(pos: Vec2, sector_size: f32) -> Self {
    let sx = (pos.x / sector_size).floor() as i32;
    let sy = (pos.y / sector_size).floor() as i32;
    SectorPos { x: sx.max(0), y: sy.max(0) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn clamps_to_quadrant() {
    assert_eq!(SectorPos::of(Vec2::new(-3.0, 25.0), 10.0), SectorPos::new(0, 2));
    assert_eq!(SectorPos::of(Vec2::new(-3.0, -25.0), 10.0), SectorPos::new(0, 0));
  }

  #[test]
  fn floors_on_boundaries() {
    assert_eq!(SectorPos::of(Vec2::new(9.99, 10.0), 10.0), SectorPos::new(0, 1));
    assert_eq!(SectorPos::of(Vec2::new(30.0, 15.0), 15.0), SectorPos::new(2, 1));
  }
}
