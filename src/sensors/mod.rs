pub mod battery;
pub mod calibration;
pub mod compass;
pub mod gps;
pub mod motion;
pub mod nmea;

pub use battery::BatteryMonitor;
pub use calibration::Calibrator;
pub use compass::Compass;
pub use gps::{GpsManager, ReceiverPower, UpdateRate};
pub use motion::MotionDetector;
