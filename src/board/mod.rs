// ESP32-S3 ridenav board
//
// Brings up the peripherals and hands out the four devices the system
// drives (SD storage, sensor hub, panel, hotspot). The GNSS receive
// half and the wake pins go to the background tasks instead. Boot
// config is read off the card before the UART and the panel start,
// since it picks the baud rate and the orientation.

pub mod pins;

use core::cell::RefCell;

use embedded_hal_bus::i2c::CriticalSectionDevice;
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::analog::adc::{Adc, AdcCalCurve, AdcConfig, AdcPin, Attenuation};
use esp_hal::delay::Delay;
use esp_hal::gpio::{DriveMode, Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::ledc::channel::{self, ChannelIFace};
use esp_hal::ledc::timer::{self, TimerIFace};
use esp_hal::ledc::{LSGlobalClkSource, Ledc, LowSpeed};
use esp_hal::peripherals::{ADC1, GPIO1, Peripherals};
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::time::Rate;
use esp_hal::uart::{Config as UartConfig, Uart, UartRx, UartTx};
use esp_hal::{Async, Blocking};
use log::{info, warn};
use static_cell::StaticCell;

use crate::config::BootConfig;
use crate::drivers::expander::Expander;
use crate::drivers::hub::{BatterySense, SensorHub};
use crate::drivers::lsm303::Lsm303;
use crate::drivers::sdcard::SdStorage;
use crate::drivers::st7789::{GpioBus, St7789};
use crate::error::{Error, Result};
use crate::hotspot::RadioHotspot;
use crate::state::{ImuSample, PowerSource};

pub type I2cBus = critical_section::Mutex<RefCell<I2c<'static, Blocking>>>;
pub type I2cDev = CriticalSectionDevice<'static, I2c<'static, Blocking>>;
pub type SdSpi = ExclusiveDevice<Spi<'static, Blocking>, Output<'static>, Delay>;
pub type Sd = SdStorage<SdSpi>;
pub type Tft = St7789<GpioBus<Output<'static>>, Output<'static>, Delay>;
type SupplyPin = AdcPin<GPIO1<'static>, ADC1<'static>, AdcCalCurve<ADC1<'static>>>;

static I2C_BUS: StaticCell<I2cBus> = StaticCell::new();
static LEDC: StaticCell<Ledc<'static>> = StaticCell::new();
static BACKLIGHT_TIMER: StaticCell<timer::Timer<'static, LowSpeed>> = StaticCell::new();
static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();

// Interrupt lines that wake the main loop.
pub struct WakePins {
    pub motion: Input<'static>,
    pub buttons: Input<'static>,
}

pub struct BoardHub {
    buttons: Expander<I2cDev>,
    imu: Lsm303<I2cDev>,
    adc: Adc<'static, ADC1<'static>, Blocking>,
    supply: SupplyPin,
    vehicle: Input<'static>,
    gps_tx: UartTx<'static, Async>,
    backlight: channel::Channel<'static, LowSpeed>,
}

impl SensorHub for BoardHub {
    fn read_buttons(&mut self) -> Result<u8> {
        self.buttons.read_buttons()
    }

    fn read_imu(&mut self) -> Result<ImuSample> {
        self.imu.read()
    }

    fn read_battery(&mut self) -> Result<BatterySense> {
        let adc_mv: u16 =
            nb::block!(self.adc.read_oneshot(&mut self.supply)).map_err(|_| Error::SensorTimeout)?;
        let source = if self.vehicle.is_high() {
            PowerSource::Vehicle
        } else {
            PowerSource::Internal
        };
        Ok(BatterySense { adc_mv, source })
    }

    fn gps_send(&mut self, bytes: &[u8]) -> Result<()> {
        let mut rest = bytes;
        while !rest.is_empty() {
            let n = self.gps_tx.write(rest).map_err(|_| Error::Io)?;
            rest = &rest[n..];
        }
        Ok(())
    }

    fn set_backlight(&mut self, pct: u8) {
        if let Err(e) = self.backlight.set_duty(pct.min(100)) {
            warn!("board: backlight duty: {:?}", e);
        }
    }

    fn set_compass_enabled(&mut self, on: bool) {
        if let Err(e) = self.imu.set_enabled(on) {
            warn!("board: compass power: {}", e);
        }
    }
}

pub struct Board {
    pub storage: Sd,
    pub hub: BoardHub,
    pub panel: Tft,
    pub hotspot: RadioHotspot,
    pub gps_rx: UartRx<'static, Async>,
    pub wake: WakePins,
    // factory MAC, names the hotspot
    pub device_id: u64,
}

impl Board {
    // esp-rtos must already be running; the radio needs its scheduler
    pub fn init(p: Peripherals) -> Result<Self> {
        let mut storage = Self::init_sd(
            p.SPI2,
            p.GPIO10.into(),
            p.GPIO11.into(),
            p.GPIO12.into(),
            p.GPIO13.into(),
        )?;
        let cfg = BootConfig::load(&mut storage);

        let i2c = I2c::new(
            p.I2C0,
            I2cConfig::default().with_frequency(Rate::from_khz(pins::I2C_FREQ_KHZ)),
        )
        .map_err(|_| Error::Io)?
        .with_sda(p.GPIO8)
        .with_scl(p.GPIO9);
        let bus: &'static I2cBus = I2C_BUS.init(critical_section::Mutex::new(RefCell::new(i2c)));

        let mut buttons = Expander::new(CriticalSectionDevice::new(bus));
        if let Err(e) = buttons.init() {
            warn!("board: expander init: {}", e);
        }
        let mut imu = Lsm303::new(CriticalSectionDevice::new(bus));
        if let Err(e) = imu.init().and_then(|_| imu.arm_motion_wake()) {
            warn!("board: imu init: {}", e);
        }

        let mut adc_cfg = AdcConfig::new();
        let supply = adc_cfg.enable_pin_with_cal::<_, AdcCalCurve<ADC1>>(p.GPIO1, Attenuation::_11dB);
        let adc = Adc::new(p.ADC1, adc_cfg);
        let vehicle = Input::new(p.GPIO2, InputConfig::default().with_pull(Pull::Down));

        let (gps_rx, gps_tx) = Uart::new(p.UART1, UartConfig::default().with_baudrate(cfg.gps_baud))
            .map_err(|_| Error::Io)?
            .with_tx(p.GPIO17)
            .with_rx(p.GPIO18)
            .into_async()
            .split();

        let ledc = LEDC.init(Ledc::new(p.LEDC));
        ledc.set_global_slow_clock(LSGlobalClkSource::APBClk);
        let bl_timer = BACKLIGHT_TIMER.init(ledc.timer::<LowSpeed>(timer::Number::Timer0));
        bl_timer
            .configure(timer::config::Config {
                duty: timer::config::Duty::Duty8Bit,
                clock_source: timer::LSClockSource::APBClk,
                frequency: Rate::from_khz(pins::BACKLIGHT_PWM_KHZ),
            })
            .map_err(|_| Error::Io)?;
        let mut backlight = ledc.channel(channel::Number::Channel0, p.GPIO14);
        backlight
            .configure(channel::config::Config {
                timer: bl_timer,
                duty_pct: 0,
                drive_mode: DriveMode::PushPull,
            })
            .map_err(|_| Error::Io)?;

        let out = |pin: esp_hal::gpio::AnyPin<'static>| Output::new(pin, Level::Low, OutputConfig::default());
        let data = [
            out(p.GPIO40.into()),
            out(p.GPIO41.into()),
            out(p.GPIO42.into()),
            out(p.GPIO43.into()),
            out(p.GPIO44.into()),
            out(p.GPIO45.into()),
            out(p.GPIO46.into()),
            out(p.GPIO47.into()),
        ];
        let tft_bus = GpioBus::new(data, out(p.GPIO39.into()), out(p.GPIO38.into()));
        let mut panel = St7789::new(tft_bus, out(p.GPIO21.into()), Delay::new(), cfg.orientation);
        panel.init()?;

        let radio = RADIO.init(esp_radio::init().map_err(|e| {
            warn!("board: radio init: {:?}", e);
            Error::Io
        })?);
        let (wifi, _ifaces) = esp_radio::wifi::new(radio, p.WIFI, Default::default()).map_err(|e| {
            warn!("board: wifi init: {:?}", e);
            Error::Io
        })?;

        let wake = WakePins {
            motion: Input::new(p.GPIO3, InputConfig::default().with_pull(Pull::Down)),
            buttons: Input::new(p.GPIO4, InputConfig::default().with_pull(Pull::Up)),
        };

        let mac = esp_hal::efuse::Efuse::mac_address();
        let device_id = mac.iter().fold(0u64, |id, b| (id << 8) | *b as u64);
        info!("board: up, id {:012X}", device_id);

        Ok(Self {
            storage,
            hub: BoardHub {
                buttons,
                imu,
                adc,
                supply,
                vehicle,
                gps_tx,
                backlight,
            },
            panel,
            hotspot: RadioHotspot::new(wifi),
            gps_rx,
            wake,
            device_id,
        })
    }

    fn init_sd(
        spi2: esp_hal::peripherals::SPI2<'static>,
        cs: esp_hal::gpio::AnyPin<'static>,
        mosi: esp_hal::gpio::AnyPin<'static>,
        sck: esp_hal::gpio::AnyPin<'static>,
        miso: esp_hal::gpio::AnyPin<'static>,
    ) -> Result<Sd> {
        let cs = Output::new(cs, Level::High, OutputConfig::default());
        let spi = Spi::new(spi2, SpiConfig::default().with_frequency(Rate::from_khz(pins::SD_FREQ_KHZ)))
            .map_err(|_| Error::Io)?
            .with_sck(sck)
            .with_mosi(mosi)
            .with_miso(miso);
        let dev = ExclusiveDevice::new(spi, cs, Delay::new()).map_err(|_| Error::Io)?;
        Ok(SdStorage::new(dev))
    }
}
