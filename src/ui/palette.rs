// Day/night colour sets
// Night keeps contrast for the HUD but halves the map so the panel
// does not glare in the dark.

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;

use crate::map::png::rgb565;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Palette {
    pub night: bool,
    pub bar_bg: Rgb565,
    pub text: Rgb565,
    pub dim_text: Rgb565,
    pub warn: Rgb565,
    pub alert: Rgb565,
    pub rec: Rgb565,
    pub trail_rec: Rgb565,
    pub trail_paused: Rgb565,
    pub marker: Rgb565,
    pub marker_edge: Rgb565,
    pub screen_bg: Rgb565,
    pub highlight: Rgb565,
    // raw RGB565 for the tile placeholder fill
    pub placeholder: u16,
}

pub const DAY: Palette = Palette {
    night: false,
    bar_bg: Rgb565::new(3, 6, 3),
    text: Rgb565::WHITE,
    dim_text: Rgb565::new(20, 40, 20),
    warn: Rgb565::new(31, 48, 0),
    alert: Rgb565::RED,
    rec: Rgb565::RED,
    trail_rec: Rgb565::new(31, 0, 20),
    trail_paused: Rgb565::new(16, 32, 16),
    marker: Rgb565::new(0, 24, 31),
    marker_edge: Rgb565::WHITE,
    screen_bg: Rgb565::new(2, 4, 2),
    highlight: Rgb565::new(0, 24, 31),
    placeholder: rgb565(0xE0, 0xE0, 0xE0),
};

pub const NIGHT: Palette = Palette {
    night: true,
    bar_bg: Rgb565::BLACK,
    text: Rgb565::new(31, 40, 12),
    dim_text: Rgb565::new(14, 20, 6),
    warn: Rgb565::new(31, 32, 0),
    alert: Rgb565::new(28, 0, 0),
    rec: Rgb565::new(28, 0, 0),
    trail_rec: Rgb565::new(31, 24, 0),
    trail_paused: Rgb565::new(10, 20, 10),
    marker: Rgb565::new(0, 40, 20),
    marker_edge: Rgb565::new(14, 28, 14),
    screen_bg: Rgb565::BLACK,
    highlight: Rgb565::new(20, 24, 0),
    placeholder: rgb565(0x30, 0x30, 0x30),
};

impl Palette {
    pub const fn for_mode(night: bool) -> &'static Palette {
        if night { &NIGHT } else { &DAY }
    }

    // tile pixel as drawn: halved per channel at night
    #[inline]
    pub const fn tile(&self, raw: u16) -> u16 {
        if self.night { (raw >> 1) & 0x7BEF } else { raw }
    }
}
