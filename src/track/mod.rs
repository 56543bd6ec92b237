// Ride recording: GPX files, the session index and the tracker itself

pub mod gpx;
pub mod index;
pub mod recovery;
pub mod tracker;
pub mod xml;

pub use index::{IndexEntry, TrackIndex};
pub use recovery::recover;
pub use tracker::{TrailPoint, Tracker, TrackerConfig};
