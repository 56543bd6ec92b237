// Full-frame RGB565 buffer in PSRAM
// 320x480x2 = 300 KiB. Everything draws here in logical (portrait)
// coordinates; the panel only ever sees the dirty region through
// Panel::blit, so an unchanged frame costs no bus traffic.

use alloc::vec;
use alloc::vec::Vec;

use embedded_graphics_core::{
    Pixel,
    draw_target::DrawTarget,
    geometry::{OriginDimensions, Size},
    pixelcolor::{IntoStorage, Rgb565},
    primitives::Rectangle,
};

use super::panel::Panel;
use crate::error::Result;
use crate::ui::Region;

pub struct Framebuffer {
    buf: Vec<u16>,
    width: u16,
    height: u16,
    dirty: Region,
}

impl Framebuffer {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            buf: vec![0u16; width as usize * height as usize],
            width,
            height,
            dirty: Region::default(),
        }
    }

    #[inline]
    pub fn width(&self) -> u16 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn bounds(&self) -> Region {
        Region::new(0, 0, self.width, self.height)
    }

    pub fn pixels(&self) -> &[u16] {
        &self.buf
    }

    #[inline]
    pub fn pixel(&self, x: u16, y: u16) -> u16 {
        self.buf[y as usize * self.width as usize + x as usize]
    }

    // raw RGB565 store, no bounds check beyond the slice
    #[inline]
    pub fn put(&mut self, x: u16, y: u16, raw: u16) {
        let i = y as usize * self.width as usize + x as usize;
        if let Some(p) = self.buf.get_mut(i) {
            *p = raw;
        }
    }

    // one row segment of raw pixels starting at (x, y)
    pub fn row_mut(&mut self, x: u16, y: u16, len: u16) -> &mut [u16] {
        let start = y as usize * self.width as usize + x as usize;
        let end = (start + len as usize).min(self.buf.len());
        &mut self.buf[start.min(end)..end]
    }

    pub fn fill_region(&mut self, area: Region, raw: u16) {
        let area = area.clip(self.bounds());
        for y in area.y..area.bottom() {
            self.row_mut(area.x, y, area.w).fill(raw);
        }
    }

    pub fn mark_dirty(&mut self, area: Region) {
        self.dirty = self.dirty.union(area.clip(self.bounds()));
    }

    pub fn dirty(&self) -> Region {
        self.dirty
    }

    // push the dirty region; true when anything was sent
    pub fn flush<P: Panel>(&mut self, panel: &mut P) -> Result<bool> {
        let area = self.dirty;
        if area.is_empty() {
            return Ok(false);
        }
        panel.blit(area, &self.buf, self.width as usize)?;
        self.dirty = Region::default();
        Ok(true)
    }
}

impl OriginDimensions for Framebuffer {
    fn size(&self) -> Size {
        Size::new(self.width as u32, self.height as u32)
    }
}

impl DrawTarget for Framebuffer {
    type Color = Rgb565;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let w = self.width as i32;
        let h = self.height as i32;
        for Pixel(coord, color) in pixels {
            if coord.x < 0 || coord.x >= w || coord.y < 0 || coord.y >= h {
                continue;
            }
            self.buf[(coord.y * w + coord.x) as usize] = color.into_storage();
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let w = self.width as i32;
        let h = self.height as i32;
        let x0 = area.top_left.x.clamp(0, w);
        let y0 = area.top_left.y.clamp(0, h);
        let x1 = (area.top_left.x.saturating_add(area.size.width as i32)).clamp(0, w);
        let y1 = (area.top_left.y.saturating_add(area.size.height as i32)).clamp(0, h);
        if x0 >= x1 || y0 >= y1 {
            return Ok(());
        }
        let raw = color.into_storage();
        for y in y0..y1 {
            let row = (y * w) as usize;
            self.buf[row + x0 as usize..row + x1 as usize].fill(raw);
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.buf.fill(color.into_storage());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::prelude::*;
    use embedded_graphics::primitives::{Line, PrimitiveStyle};

    struct Sink {
        calls: Vec<Region>,
    }

    impl Panel for Sink {
        fn width(&self) -> u16 {
            32
        }
        fn height(&self) -> u16 {
            16
        }
        fn blit(&mut self, area: Region, pixels: &[u16], stride: usize) -> crate::error::Result<()> {
            assert_eq!(pixels.len(), stride * 16);
            self.calls.push(area);
            Ok(())
        }
        fn set_enabled(&mut self, _on: bool) -> crate::error::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_draw_clips_to_frame() {
        let mut fb = Framebuffer::new(32, 16);
        Line::new(Point::new(-10, 5), Point::new(40, 5))
            .into_styled(PrimitiveStyle::with_stroke(Rgb565::RED, 1))
            .draw(&mut fb)
            .unwrap();
        let red = Rgb565::RED.into_storage();
        assert!((0..32).all(|x| fb.pixel(x, 5) == red), "whole row painted");
        assert_eq!(fb.pixel(0, 4), 0);
    }

    #[test]
    fn test_fill_solid_and_region() {
        let mut fb = Framebuffer::new(32, 16);
        fb.fill_solid(&Rectangle::new(Point::new(30, 14), Size::new(10, 10)), Rgb565::BLUE)
            .unwrap();
        let blue = Rgb565::BLUE.into_storage();
        assert_eq!(fb.pixel(31, 15), blue);
        assert_eq!(fb.pixel(29, 15), 0);
        fb.fill_region(Region::new(0, 0, 4, 2), 0x1234);
        assert_eq!(fb.pixel(3, 1), 0x1234);
        assert_eq!(fb.pixel(4, 1), 0);
    }

    #[test]
    fn test_flush_sends_union_once() {
        let mut fb = Framebuffer::new(32, 16);
        let mut panel = Sink { calls: Vec::new() };
        assert!(!fb.flush(&mut panel).unwrap(), "nothing dirty");
        fb.mark_dirty(Region::new(0, 0, 4, 4));
        fb.mark_dirty(Region::new(10, 8, 40, 40));
        assert!(fb.flush(&mut panel).unwrap());
        assert_eq!(panel.calls, [Region::new(0, 0, 32, 16)]);
        assert!(fb.dirty().is_empty());
    }
}
