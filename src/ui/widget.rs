// Screen rectangles and label placement
// Coordinates are logical panel pixels (portrait, after orientation).

use embedded_graphics::{prelude::*, primitives::Rectangle};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Region {
    pub x: u16,
    pub y: u16,
    pub w: u16,
    pub h: u16,
}

impl Region {
    pub const fn new(x: u16, y: u16, w: u16, h: u16) -> Self {
        Self { x, y, w, h }
    }

    pub fn to_rect(self) -> Rectangle {
        Rectangle::new(
            Point::new(self.x as i32, self.y as i32),
            Size::new(self.w as u32, self.h as u32),
        )
    }

    #[inline]
    pub fn right(self) -> u16 {
        self.x + self.w
    }

    #[inline]
    pub fn bottom(self) -> u16 {
        self.y + self.h
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.w == 0 || self.h == 0
    }

    // smallest region covering both; dirty areas grow this way
    pub fn union(self, other: Region) -> Self {
        match (self.is_empty(), other.is_empty()) {
            (true, _) => other,
            (_, true) => self,
            _ => {
                let (x, y) = (self.x.min(other.x), self.y.min(other.y));
                Self::new(
                    x,
                    y,
                    self.right().max(other.right()) - x,
                    self.bottom().max(other.bottom()) - y,
                )
            }
        }
    }

    // overlap of the two, empty when disjoint
    pub fn clip(self, other: Region) -> Self {
        let (x, y) = (self.x.max(other.x), self.y.max(other.y));
        let (r, b) = (self.right().min(other.right()), self.bottom().min(other.bottom()));
        if r <= x || b <= y {
            return Region::default();
        }
        Self::new(x, y, r - x, b - y)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Alignment {
    #[default]
    TopLeft,
    Center,
    // units next to a big number
    BottomRight,
}

impl Alignment {
    // top-left corner for content of `size` inside `region`; content
    // wider than the region hangs off both sides equally when centred
    pub fn position(self, region: Region, size: Size) -> Point {
        let (rx, ry) = (region.x as i32, region.y as i32);
        let dx = region.w as i32 - size.width as i32;
        let dy = region.h as i32 - size.height as i32;
        match self {
            Alignment::TopLeft => Point::new(rx, ry),
            Alignment::Center => Point::new(rx + dx / 2, ry + dy / 2),
            Alignment::BottomRight => Point::new(rx + dx, ry + dy),
        }
    }
}

// menu cursor helpers; both are no-ops on an empty list
#[inline]
pub fn wrap_next(current: usize, count: usize) -> usize {
    if count == 0 { 0 } else { (current + 1) % count }
}

#[inline]
pub fn wrap_prev(current: usize, count: usize) -> usize {
    match (current, count) {
        (_, 0) => 0,
        (0, n) => n - 1,
        (c, _) => c - 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_and_union() {
        let a = Region::new(0, 0, 100, 50);
        let b = Region::new(80, 40, 50, 50);
        assert_eq!(a.clip(b), Region::new(80, 40, 20, 10));
        assert_eq!(a.union(b), Region::new(0, 0, 130, 90));
        assert!(a.clip(Region::new(200, 0, 10, 10)).is_empty());
        assert!(a.clip(Region::new(100, 0, 10, 10)).is_empty(), "touching edges share no pixel");
        assert_eq!(Region::default().union(b), b, "empty is the union identity");
    }

    #[test]
    fn test_alignment_in_bar() {
        let bar = Region::new(0, 440, 320, 40);
        let glyphs = Size::new(60, 20);
        assert_eq!(Alignment::Center.position(bar, glyphs), Point::new(130, 450));
        assert_eq!(Alignment::BottomRight.position(bar, glyphs), Point::new(260, 460));
        assert_eq!(Alignment::TopLeft.position(bar, glyphs), Point::new(0, 440));
    }

    #[test]
    fn test_wrap_helpers() {
        assert_eq!(wrap_next(6, 7), 0);
        assert_eq!(wrap_prev(0, 7), 6);
        assert_eq!(wrap_prev(3, 7), 2);
        assert_eq!(wrap_next(0, 0), 0);
    }
}
