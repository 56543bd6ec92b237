// Display panel seam
//
// The renderer composes into a PSRAM framebuffer and pushes only the
// dirty region through blit. Pixels are RGB565, rows of `stride`.

use crate::error::Result;
use crate::ui::widget::Region;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Portrait,
    PortraitFlipped,
}

pub trait Panel {
    fn width(&self) -> u16;

    fn height(&self) -> u16;

    // pixels holds the full frame; only `area` is sent
    fn blit(&mut self, area: Region, pixels: &[u16], stride: usize) -> Result<()>;

    // panel sleep; the backlight is the hub's concern
    fn set_enabled(&mut self, on: bool) -> Result<()>;
}
