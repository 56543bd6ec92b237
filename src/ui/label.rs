// Filled text boxes for the HUD and the list screens
// A Label is a region, a font, colours and an alignment; the text is
// passed at draw time so HUD fields can format into a StackFmt and
// draw without allocating.

use embedded_graphics::{
    mono_font::{MonoFont, MonoTextStyle},
    pixelcolor::Rgb565,
    prelude::*,
    primitives::PrimitiveStyle,
    text::{Baseline, Text},
};

use super::widget::{Alignment, Region};

#[derive(Clone, Copy)]
pub struct Label {
    region: Region,
    font: &'static MonoFont<'static>,
    alignment: Alignment,
    fg: Rgb565,
    bg: Option<Rgb565>,
}

impl Label {
    pub const fn new(region: Region, font: &'static MonoFont<'static>, fg: Rgb565) -> Self {
        Self {
            region,
            font,
            alignment: Alignment::TopLeft,
            fg,
            bg: None,
        }
    }

    pub const fn alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub const fn background(mut self, bg: Rgb565) -> Self {
        self.bg = Some(bg);
        self
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn text_size(&self, text: &str) -> Size {
        let char_width = self.font.character_size.width + self.font.character_spacing;
        Size::new(
            text.chars().count() as u32 * char_width,
            self.font.character_size.height,
        )
    }

    pub fn draw<D>(&self, display: &mut D, text: &str) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        if let Some(bg) = self.bg {
            self.region
                .to_rect()
                .into_styled(PrimitiveStyle::with_fill(bg))
                .draw(display)?;
        }
        let pos = self.alignment.position(self.region, self.text_size(text));
        let style = MonoTextStyle::new(self.font, self.fg);
        Text::with_baseline(text, pos, style, Baseline::Top).draw(display)?;
        Ok(())
    }
}
