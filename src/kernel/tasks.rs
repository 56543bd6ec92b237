// Embassy tasks that run beside the foreground loop
//
//   gps_pump_task  moves UART bytes into the bus NMEA pipe as they
//                  arrive, so a long render never overruns the FIFO
//   wake_task      turns the IMU and expander interrupt lines into
//                  wake flags for the main loop
//
// Neither task touches component state; they only feed the bus and
// the wake flags.

use embassy_futures::select::{Either, select};
use esp_hal::Async;
use esp_hal::gpio::Input;
use esp_hal::uart::UartRx;
use log::warn;

use crate::bus::StateBus;
use crate::kernel::wake::{signal_button, signal_motion};

const PUMP_CHUNK: usize = 64;

#[embassy_executor::task]
pub async fn gps_pump_task(mut rx: UartRx<'static, Async>, bus: &'static StateBus) -> ! {
    let mut buf = [0u8; PUMP_CHUNK];
    let mut dropped: u32 = 0;
    loop {
        match rx.read_async(&mut buf).await {
            Ok(n) => {
                let kept = bus.push_nmea(&buf[..n]);
                if kept < n {
                    dropped += (n - kept) as u32;
                    // the parser resyncs on the next '$'
                    if dropped % 1024 < (n - kept) as u32 {
                        warn!("gps: pipe full, {} bytes dropped", dropped);
                    }
                }
            }
            Err(e) => warn!("gps: uart rx: {:?}", e),
        }
    }
}

#[embassy_executor::task]
pub async fn wake_task(mut motion: Input<'static>, mut buttons: Input<'static>) -> ! {
    loop {
        match select(motion.wait_for_rising_edge(), buttons.wait_for_falling_edge()).await {
            Either::First(()) => signal_motion(),
            Either::Second(()) => signal_button(),
        }
    }
}
