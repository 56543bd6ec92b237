// TCA9554 I²C GPIO expander carrying the eight handlebar buttons
//
// Buttons pull P0..P7 low. The polarity register inverts them in
// hardware so a read of the input port is already "bit set = held".
// INT goes low on any input change and doubles as a wake source.

use embedded_hal::i2c::I2c;

use crate::error::{Error, Result};

pub const ADDR: u8 = 0x20;

const REG_INPUT: u8 = 0x00;
const REG_POLARITY: u8 = 0x02;
const REG_CONFIG: u8 = 0x03;

pub struct Expander<I2C> {
    i2c: I2C,
}

impl<I2C: I2c> Expander<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    pub fn init(&mut self) -> Result<()> {
        self.write(REG_CONFIG, 0xFF)?;
        self.write(REG_POLARITY, 0xFF)
    }

    // bit n set = button n held
    pub fn read_buttons(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(ADDR, &[REG_INPUT], &mut buf)
            .map_err(|_| Error::SensorTimeout)?;
        Ok(buf[0])
    }

    fn write(&mut self, reg: u8, val: u8) -> Result<()> {
        self.i2c
            .write(ADDR, &[reg, val])
            .map_err(|_| Error::SensorTimeout)
    }
}
