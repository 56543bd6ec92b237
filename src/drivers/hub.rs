// Sensor-side hardware collaborator
//
// The board implements this over the I²C expander, the IMU, the
// battery ADC and the GNSS UART. Each call is one short transaction;
// the board serialises I²C access per transaction so the second
// worker and the foreground never interleave on the bus.

use crate::error::Result;
use crate::state::{ImuSample, PowerSource};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatterySense {
    // millivolts at the divider tap
    pub adc_mv: u16,
    pub source: PowerSource,
}

pub trait SensorHub {
    // bit n set = ButtonId::ALL[n] held (already de-inverted)
    fn read_buttons(&mut self) -> Result<u8>;

    fn read_imu(&mut self) -> Result<ImuSample>;

    fn read_battery(&mut self) -> Result<BatterySense>;

    // raw bytes to the GNSS receiver
    fn gps_send(&mut self, bytes: &[u8]) -> Result<()>;

    fn set_backlight(&mut self, pct: u8);

    fn set_compass_enabled(&mut self, on: bool);
}
