// LSM303DLHC accelerometer + magnetometer
//
// Two I²C targets: accel at 0x19, mag at 0x1E. Accel runs 100 Hz,
// +-2 g, high resolution (1 mg/LSB on the 12-bit left-justified word).
// Mag runs 30 Hz at +-1.3 gauss (1100 LSB/gauss XY, 980 LSB/gauss Z);
// its output registers are big-endian in X, Z, Y order.
//
// INT1 is wired as the motion-wake source: high-passed accel, OR of the
// high events on all axes, threshold 3 LSB (48 mg).

use embedded_hal::i2c::I2c;

use crate::error::{Error, Result};
use crate::state::ImuSample;

pub const ACCEL_ADDR: u8 = 0x19;
pub const MAG_ADDR: u8 = 0x1E;

const CTRL_REG1_A: u8 = 0x20;
const CTRL_REG2_A: u8 = 0x21;
const CTRL_REG3_A: u8 = 0x22;
const CTRL_REG4_A: u8 = 0x23;
const OUT_X_L_A: u8 = 0x28;
const INT1_CFG_A: u8 = 0x30;
const INT1_THS_A: u8 = 0x32;
const INT1_DURATION_A: u8 = 0x33;
const AUTO_INC: u8 = 0x80;

const CRA_REG_M: u8 = 0x00;
const CRB_REG_M: u8 = 0x01;
const MR_REG_M: u8 = 0x02;
const OUT_X_H_M: u8 = 0x03;

// ODR 100 Hz, XYZ enabled
const ACCEL_ON: u8 = 0x57;
// ODR 10 Hz low power, enough to drive INT1 while the CPU sleeps
const ACCEL_WATCH: u8 = 0x2F;
const ACCEL_HR_2G: u8 = 0x08;
const MAG_30HZ: u8 = 0x14;
const MAG_GAIN_1_3: u8 = 0x20;
const MAG_CONTINUOUS: u8 = 0x00;
const MAG_SLEEP: u8 = 0x03;

const MG_PER_LSB: f32 = 1.0;
const XY_LSB_PER_GAUSS: f32 = 1100.0;
const Z_LSB_PER_GAUSS: f32 = 980.0;
const UT_PER_GAUSS: f32 = 100.0;

pub struct Lsm303<I2C> {
    i2c: I2C,
}

impl<I2C: I2c> Lsm303<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    pub fn init(&mut self) -> Result<()> {
        self.write(ACCEL_ADDR, CTRL_REG1_A, ACCEL_ON)?;
        self.write(ACCEL_ADDR, CTRL_REG4_A, ACCEL_HR_2G)?;
        self.write(MAG_ADDR, CRA_REG_M, MAG_30HZ)?;
        self.write(MAG_ADDR, CRB_REG_M, MAG_GAIN_1_3)?;
        self.write(MAG_ADDR, MR_REG_M, MAG_CONTINUOUS)
    }

    // off: mag asleep, accel at its low-power watch rate
    pub fn set_enabled(&mut self, on: bool) -> Result<()> {
        if on {
            self.write(ACCEL_ADDR, CTRL_REG1_A, ACCEL_ON)?;
            self.write(MAG_ADDR, MR_REG_M, MAG_CONTINUOUS)
        } else {
            self.write(ACCEL_ADDR, CTRL_REG1_A, ACCEL_WATCH)?;
            self.write(MAG_ADDR, MR_REG_M, MAG_SLEEP)
        }
    }

    pub fn arm_motion_wake(&mut self) -> Result<()> {
        // high-pass on INT1 so gravity does not trip it
        self.write(ACCEL_ADDR, CTRL_REG2_A, 0x01)?;
        self.write(ACCEL_ADDR, INT1_THS_A, 3)?;
        self.write(ACCEL_ADDR, INT1_DURATION_A, 0)?;
        self.write(ACCEL_ADDR, INT1_CFG_A, 0x2A)?;
        self.write(ACCEL_ADDR, CTRL_REG3_A, 0x40)
    }

    pub fn read(&mut self) -> Result<ImuSample> {
        let mut a = [0u8; 6];
        self.i2c
            .write_read(ACCEL_ADDR, &[OUT_X_L_A | AUTO_INC], &mut a)
            .map_err(|_| Error::SensorTimeout)?;
        let mut m = [0u8; 6];
        self.i2c
            .write_read(MAG_ADDR, &[OUT_X_H_M], &mut m)
            .map_err(|_| Error::SensorTimeout)?;

        let acc = |lo: u8, hi: u8| (i16::from_le_bytes([lo, hi]) >> 4) as f32 * MG_PER_LSB / 1000.0;
        let mag = |hi: u8, lo: u8| i16::from_be_bytes([hi, lo]) as f32;

        Ok(ImuSample {
            accel: [acc(a[0], a[1]), acc(a[2], a[3]), acc(a[4], a[5])],
            mag: [
                mag(m[0], m[1]) / XY_LSB_PER_GAUSS * UT_PER_GAUSS,
                mag(m[4], m[5]) / XY_LSB_PER_GAUSS * UT_PER_GAUSS,
                mag(m[2], m[3]) / Z_LSB_PER_GAUSS * UT_PER_GAUSS,
            ],
        })
    }

    fn write(&mut self, addr: u8, reg: u8, val: u8) -> Result<()> {
        self.i2c
            .write(addr, &[reg, val])
            .map_err(|_| Error::SensorTimeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::i2c_mock::MockI2c;
    use core::cell::RefCell;
    use embedded_hal_bus::i2c::CriticalSectionDevice;

    #[test]
    fn test_read_scales_both_sensors() {
        let bus = critical_section::Mutex::new(RefCell::new(MockI2c::default()));
        critical_section::with(|cs| {
            let mut m = bus.borrow_ref_mut(cs);
            // 1000 mg on z, -500 mg on x
            let x = (-500i16 << 4).to_le_bytes();
            let z = (1000i16 << 4).to_le_bytes();
            m.set(ACCEL_ADDR, OUT_X_L_A, &[x[0], x[1], 0, 0, z[0], z[1]]);
            // X = 330, Z = -196, Y = 0 raw
            let mx = 330i16.to_be_bytes();
            let mz = (-196i16).to_be_bytes();
            m.set(MAG_ADDR, OUT_X_H_M, &[mx[0], mx[1], mz[0], mz[1], 0, 0]);
        });
        let mut imu = Lsm303::new(CriticalSectionDevice::new(&bus));
        imu.init().unwrap();
        let s = imu.read().unwrap();
        assert!((s.accel[0] + 0.5).abs() < 1e-6 && (s.accel[2] - 1.0).abs() < 1e-6);
        assert!((s.mag[0] - 30.0).abs() < 1e-4, "330 LSB is 30 uT, got {}", s.mag[0]);
        assert!((s.mag[2] + 20.0).abs() < 1e-4, "z uses its own gain, got {}", s.mag[2]);
        assert_eq!(s.mag[1], 0.0);
    }

    #[test]
    fn test_power_gating_writes() {
        let bus = critical_section::Mutex::new(RefCell::new(MockI2c::default()));
        let mut imu = Lsm303::new(CriticalSectionDevice::new(&bus));
        imu.set_enabled(false).unwrap();
        imu.arm_motion_wake().unwrap();
        critical_section::with(|cs| {
            let m = bus.borrow_ref(cs);
            assert_eq!(m.get(MAG_ADDR, MR_REG_M), MAG_SLEEP);
            assert_eq!(m.get(ACCEL_ADDR, CTRL_REG1_A), ACCEL_WATCH);
            assert_eq!(m.get(ACCEL_ADDR, CTRL_REG3_A), 0x40, "AOI1 routed to INT1");
        });
    }
}
