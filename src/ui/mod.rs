// Screen layout and widgets for the 320x480 portrait panel.
// Map screen: top status bar, map area, bottom speed/waypoint bar.
// Everything draws into the framebuffer; only dirty regions reach
// the panel.

pub mod hud;
pub mod label;
pub mod palette;
pub mod screens;
pub mod stack_fmt;
pub mod widget;

pub use hud::{Hud, HudInput, HudModel};
pub use label::Label;
pub use palette::Palette;
pub use screens::{Command, Screens, UiModel};
pub use stack_fmt::StackFmt;
pub use widget::{Alignment, Region, wrap_next, wrap_prev};

pub const SCREEN_W: u16 = 320;
pub const SCREEN_H: u16 = 480;

pub const TOP_BAR_H: u16 = 28;
pub const BOTTOM_BAR_H: u16 = 40;

pub const TOP_BAR: Region = Region::new(0, 0, SCREEN_W, TOP_BAR_H);
pub const BOTTOM_BAR: Region = Region::new(0, SCREEN_H - BOTTOM_BAR_H, SCREEN_W, BOTTOM_BAR_H);
pub const MAP_REGION: Region = Region::new(0, TOP_BAR_H, SCREEN_W, SCREEN_H - TOP_BAR_H - BOTTOM_BAR_H);
