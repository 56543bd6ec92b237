// ridenav firmware entry point
//
// Boot: logger -> heap (internal + PSRAM) -> esp-rtos -> board ->
// background tasks -> System::boot. The foreground loop then runs one
// System tick per 10 ms ticker period; wake flags from the interrupt
// task are folded in before each tick. Deep sleep ends the loop and
// powers down with the button interrupt as the only wake source, so
// a press cold-boots the unit.

#![no_std]
#![no_main]

use embassy_executor::Spawner;
use embassy_time::{Duration, Instant, Ticker, Timer};
use esp_backtrace as _;
use esp_hal::clock::CpuClock;
use esp_hal::rtc_cntl::Rtc;
use esp_hal::rtc_cntl::sleep::{Ext0WakeupSource, WakeupLevel};
use esp_hal::timer::timg::TimerGroup;
use log::{error, info};

use ridenav::board::Board;
use ridenav::bus::StateBus;
use ridenav::kernel::BASE_TICK_MS;
use ridenav::kernel::tasks::{gps_pump_task, wake_task};
use ridenav::kernel::wake::{signal_timer, try_wake};
use ridenav::system::{Devices, System};

extern crate alloc;

esp_bootloader_esp_idf::esp_app_desc!();

const INTERNAL_HEAP: usize = 96 * 1024;

static BUS: StateBus = StateBus::new();

fn clock_ms() -> u64 {
    Instant::now().as_millis()
}

#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    esp_println::logger::init_logger_from_env();
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);
    esp_alloc::heap_allocator!(size: INTERNAL_HEAP);
    // framebuffer and tile cache live here
    esp_alloc::psram_allocator!(unsafe { peripherals.PSRAM.clone_unchecked() }, esp_hal::psram);

    info!("booting...");

    let timg0 = TimerGroup::new(unsafe { peripherals.TIMG0.clone_unchecked() });
    esp_rtos::start(timg0.timer0);

    let mut rtc = Rtc::new(unsafe { peripherals.LPWR.clone_unchecked() });
    let wake_pin = unsafe { peripherals.GPIO4.clone_unchecked() };

    let board = match Board::init(peripherals) {
        Ok(b) => b,
        Err(e) => {
            error!("board init failed: {}", e);
            loop {
                Timer::after(Duration::from_secs(1)).await;
            }
        }
    };
    let Board {
        storage,
        hub,
        panel,
        hotspot,
        gps_rx,
        wake,
        device_id,
    } = board;

    match gps_pump_task(gps_rx, &BUS) {
        Ok(t) => spawner.spawn(t),
        Err(e) => error!("gps pump not started: {:?}", e),
    }
    match wake_task(wake.motion, wake.buttons) {
        Ok(t) => spawner.spawn(t),
        Err(e) => error!("wake task not started: {:?}", e),
    }

    let dev = Devices {
        storage,
        hub,
        panel,
        hotspot,
    };
    let mut sys = System::boot(dev, &BUS, device_id, clock_ms());
    sys.set_clock(clock_ms);
    info!("kernel ready.");

    let mut ticker = Ticker::every(Duration::from_millis(BASE_TICK_MS as u64));
    loop {
        ticker.next().await;
        signal_timer();
        let now = clock_ms();
        if let Some(flags) = try_wake()
            && flags.is_activity()
        {
            sys.wake(flags, now);
        }
        sys.tick(now);
        if sys.deep_sleep_ready() {
            break;
        }
    }

    info!("deep sleep, press any button to restart");
    Timer::after(Duration::from_millis(50)).await;
    let button = Ext0WakeupSource::new(wake_pin, WakeupLevel::Low);
    rtc.sleep_deep(&[&button]);
}
