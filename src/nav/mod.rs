// Navigation core: great-circle math and waypoint guidance

pub mod geo;
pub mod navigator;

pub use navigator::{Navigator, WaypointBook};
