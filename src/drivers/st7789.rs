// ST7789 IPS TFT controller on an 8-bit 8080 parallel bus
// 320x480 portrait, RGB565. The bus is bit-banged over GPIO: data on
// D0..D7, latched on the WR rising edge; DC low = command.
//
// Only the dirty window is streamed: CASET/RASET to the region, RAMWR,
// then the rows big-endian.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use super::panel::{Orientation, Panel};
use crate::error::{Error, Result};
use crate::ui::widget::Region;

pub const WIDTH: u16 = 320;
pub const HEIGHT: u16 = 480;

#[allow(dead_code)]
mod cmd {
    pub const SWRESET: u8 = 0x01;
    pub const SLPIN: u8 = 0x10;
    pub const SLPOUT: u8 = 0x11;
    pub const NORON: u8 = 0x13;
    pub const INVON: u8 = 0x21;
    pub const DISPOFF: u8 = 0x28;
    pub const DISPON: u8 = 0x29;
    pub const CASET: u8 = 0x2A;
    pub const RASET: u8 = 0x2B;
    pub const RAMWR: u8 = 0x2C;
    pub const MADCTL: u8 = 0x36;
    pub const COLMOD: u8 = 0x3A;
}

const COLMOD_RGB565: u8 = 0x55;
const MADCTL_PORTRAIT: u8 = 0x00;
// MY | MX
const MADCTL_FLIPPED: u8 = 0xC0;

pub trait Bus8080 {
    fn command(&mut self, c: u8) -> Result<()>;
    fn data(&mut self, bytes: &[u8]) -> Result<()>;

    fn pixels(&mut self, px: &[u16]) -> Result<()> {
        for p in px {
            self.data(&p.to_be_bytes())?;
        }
        Ok(())
    }
}

// GPIO bit-bang implementation
pub struct GpioBus<P> {
    data: [P; 8],
    wr: P,
    dc: P,
}

impl<P: OutputPin> GpioBus<P> {
    pub fn new(data: [P; 8], wr: P, dc: P) -> Self {
        Self { data, wr, dc }
    }

    fn strobe(&mut self, byte: u8) -> Result<()> {
        for (bit, pin) in self.data.iter_mut().enumerate() {
            let r = if byte & (1 << bit) != 0 {
                pin.set_high()
            } else {
                pin.set_low()
            };
            r.map_err(|_| Error::Io)?;
        }
        self.wr.set_low().map_err(|_| Error::Io)?;
        self.wr.set_high().map_err(|_| Error::Io)
    }
}

impl<P: OutputPin> Bus8080 for GpioBus<P> {
    fn command(&mut self, c: u8) -> Result<()> {
        self.dc.set_low().map_err(|_| Error::Io)?;
        self.strobe(c)
    }

    fn data(&mut self, bytes: &[u8]) -> Result<()> {
        self.dc.set_high().map_err(|_| Error::Io)?;
        for &b in bytes {
            self.strobe(b)?;
        }
        Ok(())
    }
}

pub struct St7789<B, RST, D> {
    bus: B,
    rst: RST,
    delay: D,
    orientation: Orientation,
    awake: bool,
}

impl<B: Bus8080, RST: OutputPin, D: DelayNs> St7789<B, RST, D> {
    pub fn new(bus: B, rst: RST, delay: D, orientation: Orientation) -> Self {
        Self {
            bus,
            rst,
            delay,
            orientation,
            awake: false,
        }
    }

    pub fn init(&mut self) -> Result<()> {
        self.rst.set_low().map_err(|_| Error::Io)?;
        self.delay.delay_ms(10);
        self.rst.set_high().map_err(|_| Error::Io)?;
        self.delay.delay_ms(120);

        self.bus.command(cmd::SWRESET)?;
        self.delay.delay_ms(150);
        self.bus.command(cmd::SLPOUT)?;
        self.delay.delay_ms(120);
        self.bus.command(cmd::COLMOD)?;
        self.bus.data(&[COLMOD_RGB565])?;
        self.bus.command(cmd::MADCTL)?;
        self.bus.data(&[match self.orientation {
            Orientation::Portrait => MADCTL_PORTRAIT,
            Orientation::PortraitFlipped => MADCTL_FLIPPED,
        }])?;
        // IPS glass needs inversion for true colours
        self.bus.command(cmd::INVON)?;
        self.bus.command(cmd::NORON)?;
        self.bus.command(cmd::DISPON)?;
        self.awake = true;
        Ok(())
    }

    fn window(&mut self, r: Region) -> Result<()> {
        let (x1, y1) = (r.right() - 1, r.bottom() - 1);
        self.bus.command(cmd::CASET)?;
        self.bus.data(&[(r.x >> 8) as u8, r.x as u8, (x1 >> 8) as u8, x1 as u8])?;
        self.bus.command(cmd::RASET)?;
        self.bus.data(&[(r.y >> 8) as u8, r.y as u8, (y1 >> 8) as u8, y1 as u8])?;
        self.bus.command(cmd::RAMWR)
    }
}

impl<B: Bus8080, RST: OutputPin, D: DelayNs> Panel for St7789<B, RST, D> {
    fn width(&self) -> u16 {
        WIDTH
    }

    fn height(&self) -> u16 {
        HEIGHT
    }

    fn blit(&mut self, area: Region, pixels: &[u16], stride: usize) -> Result<()> {
        let area = area.clip(Region::new(0, 0, WIDTH, HEIGHT));
        if area.is_empty() || !self.awake {
            return Ok(());
        }
        self.window(area)?;
        for row in area.y..area.bottom() {
            let start = row as usize * stride + area.x as usize;
            let line = pixels
                .get(start..start + area.w as usize)
                .ok_or(Error::Io)?;
            self.bus.pixels(line)?;
        }
        Ok(())
    }

    fn set_enabled(&mut self, on: bool) -> Result<()> {
        if on == self.awake {
            return Ok(());
        }
        if on {
            self.bus.command(cmd::SLPOUT)?;
            self.delay.delay_ms(120);
            self.bus.command(cmd::DISPON)?;
        } else {
            self.bus.command(cmd::DISPOFF)?;
            self.bus.command(cmd::SLPIN)?;
            self.delay.delay_ms(5);
        }
        self.awake = on;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::convert::Infallible;

    #[derive(Default)]
    struct Recorder {
        log: Vec<(bool, u8)>,
    }

    impl Bus8080 for Recorder {
        fn command(&mut self, c: u8) -> Result<()> {
            self.log.push((true, c));
            Ok(())
        }
        fn data(&mut self, bytes: &[u8]) -> Result<()> {
            self.log.extend(bytes.iter().map(|b| (false, *b)));
            Ok(())
        }
    }

    struct Pin;
    impl embedded_hal::digital::ErrorType for Pin {
        type Error = Infallible;
    }
    impl OutputPin for Pin {
        fn set_low(&mut self) -> core::result::Result<(), Infallible> {
            Ok(())
        }
        fn set_high(&mut self) -> core::result::Result<(), Infallible> {
            Ok(())
        }
    }

    struct NoDelay;
    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    #[test]
    fn test_blit_streams_only_the_window() {
        let mut lcd = St7789::new(Recorder::default(), Pin, NoDelay, Orientation::Portrait);
        lcd.init().unwrap();
        lcd.bus.log.clear();

        let mut frame = vec![0u16; WIDTH as usize * HEIGHT as usize];
        frame[10 * WIDTH as usize + 300] = 0xF800;
        lcd.blit(Region::new(300, 10, 2, 1), &frame, WIDTH as usize).unwrap();

        let log = &lcd.bus.log;
        assert_eq!(log[0], (true, cmd::CASET));
        assert_eq!(&log[1..5], &[(false, 0x01), (false, 0x2C), (false, 0x01), (false, 0x2D)]);
        assert_eq!(log[5], (true, cmd::RASET));
        assert_eq!(log[10], (true, cmd::RAMWR));
        assert_eq!(&log[11..], &[(false, 0xF8), (false, 0x00), (false, 0), (false, 0)]);
    }

    #[test]
    fn test_sleep_skips_blits() {
        let mut lcd = St7789::new(Recorder::default(), Pin, NoDelay, Orientation::PortraitFlipped);
        lcd.init().unwrap();
        assert!(lcd.bus.log.contains(&(false, MADCTL_FLIPPED)));
        lcd.set_enabled(false).unwrap();
        let n = lcd.bus.log.len();
        let frame = vec![0u16; WIDTH as usize * HEIGHT as usize];
        lcd.blit(Region::new(0, 0, 10, 10), &frame, WIDTH as usize).unwrap();
        assert_eq!(lcd.bus.log.len(), n, "no traffic while asleep");
    }
}
