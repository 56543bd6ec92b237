// Chip and protocol drivers plus the hardware seams the core talks to
//
// The chips here are board independent; pin assignments and bus
// wiring live in board/. Panel, SensorHub and Storage are the traits
// the system drives, with host doubles for tests.

pub mod expander;
pub mod fatname;
pub mod framebuffer;
pub mod hub;
pub mod input;
pub mod lsm303;
pub mod panel;
#[cfg(feature = "firmware")]
pub mod sdcard;
pub mod st7789;
pub mod storage;

#[cfg(test)]
pub(crate) mod i2c_mock;
