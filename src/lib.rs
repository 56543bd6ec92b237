// ridenav: motorcycle navigation and GPX track recorder (ESP32-S3, IPS TFT)
//
// Everything below board/ is hardware independent and runs on the host
// under `cargo test`; the firmware feature adds the board support and
// the SD/Wi-Fi adapters.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod bus;
pub mod config;
pub mod drivers;
pub mod error;
pub mod hotspot;
pub mod kernel;
pub mod map;
pub mod nav;
pub mod power;
pub mod sensors;
pub mod settings;
pub mod state;
pub mod system;
pub mod track;
pub mod ui;

#[cfg(feature = "firmware")]
pub mod board;

pub use error::{Error, Result};
