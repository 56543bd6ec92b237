// GPS manager: NMEA ingest, fix assembly, receiver control
//
// Bytes arrive through the bus pipe; the drain is budgeted per tick so
// a burst can never stretch the foreground. RMC and GGA of the same
// 100 ms epoch are merged into one GpsFix and published on the bus.
//
// Receiver control uses MTK commands. Every command waits for its
// $PMTK001 acknowledgement and is resent up to three times, 1 s apart.
//
// Health: 3 s without a byte publishes a lost fix; recovery attempts
// (re-sending the rate command) follow the shared backoff, and five
// consecutive silent periods raise gps-unhealthy. A parse-error ratio
// above 10 % over a 1 s window resets the parser.

use core::fmt::Write as _;

use chrono::NaiveDateTime;
use log::{debug, info, warn};

use crate::bus::StateBus;
use crate::drivers::hub::SensorHub;
use crate::error::{Backoff, Error, Result};
use crate::nav::geo::{wrap_180, wrap_360};
use crate::sensors::nmea::{Gga, NmeaParser, Rmc, Sentence, checksum};
use crate::state::{FixQuality, GpsFix};
use crate::ui::stack_fmt::StackFmt;

pub const KNOTS_TO_MPS: f32 = 0.514_444;

const DRAIN_BUDGET: usize = 1024;
const EPOCH_MS: u32 = 100;
const EPOCHS_PER_DAY: u32 = 86_400_000 / EPOCH_MS;
const COURSE_ALPHA: f32 = 0.4;
const COURSE_MIN_SPEED_MPS: f32 = 2.0;
const SILENCE_LOST_MS: u64 = 3_000;
const PARSE_WINDOW_MS: u64 = 1_000;
const ACK_TIMEOUT_MS: u64 = 1_000;
const MAX_ATTEMPTS: u8 = 3;
const CMD_QUEUE: usize = 4;
const ACK_OK: u8 = 3;

const CMD_SET_RATE: u16 = 220;
const CMD_STANDBY: u16 = 161;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateRate {
    Hz1,
    Hz5,
    Hz10,
}

impl UpdateRate {
    pub const fn from_hz(hz: u8) -> Option<Self> {
        match hz {
            1 => Some(UpdateRate::Hz1),
            5 => Some(UpdateRate::Hz5),
            10 => Some(UpdateRate::Hz10),
            _ => None,
        }
    }

    pub const fn hz(self) -> u8 {
        match self {
            UpdateRate::Hz1 => 1,
            UpdateRate::Hz5 => 5,
            UpdateRate::Hz10 => 10,
        }
    }

    pub const fn interval_ms(self) -> u32 {
        1000 / self.hz() as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverPower {
    On,
    Standby,
}

#[derive(Clone, Copy)]
struct Command {
    id: u16,
    text: StackFmt<32>,
    attempts: u8,
    sent_at_ms: u64,
}

impl Command {
    // "$<body>*<xx>\r\n"
    fn mtk(id: u16, body: core::fmt::Arguments<'_>) -> Self {
        let mut inner: StackFmt<24> = StackFmt::new();
        let _ = inner.write_fmt(body);
        let mut text = StackFmt::new();
        let _ = write!(
            text,
            "${}*{:02X}\r\n",
            inner.as_str(),
            checksum(inner.as_str().as_bytes())
        );
        Self {
            id,
            text,
            attempts: 0,
            sent_at_ms: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_str().as_bytes()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GpsStats {
    pub sentences: u32,
    pub parse_errors: u32,
    pub parser_resets: u32,
    pub fixes: u32,
    pub lost_events: u32,
    pub acks: u32,
    pub command_failures: u32,
    pub queue_overflows: u32,
}

pub struct GpsManager {
    parser: NmeaParser,
    pending_gga: Option<Gga>,
    pending_rmc: Option<Rmc>,
    course: Option<f32>,
    last_fix: Option<GpsFix>,

    last_byte_ms: u64,
    lost: bool,
    backoff: Backoff,

    window_start_ms: u64,
    window_ok: u16,
    window_err: u16,

    queue: [Option<Command>; CMD_QUEUE],
    rate: UpdateRate,
    power: ReceiverPower,
    stats: GpsStats,
}

impl GpsManager {
    pub fn new(now_ms: u64) -> Self {
        Self {
            parser: NmeaParser::new(),
            pending_gga: None,
            pending_rmc: None,
            course: None,
            last_fix: None,
            last_byte_ms: now_ms,
            lost: false,
            backoff: Backoff::new(),
            window_start_ms: now_ms,
            window_ok: 0,
            window_err: 0,
            queue: [None; CMD_QUEUE],
            rate: UpdateRate::Hz10,
            power: ReceiverPower::On,
            stats: GpsStats::default(),
        }
    }

    pub fn stats(&self) -> GpsStats {
        self.stats
    }

    pub fn rate(&self) -> UpdateRate {
        self.rate
    }

    pub fn power(&self) -> ReceiverPower {
        self.power
    }

    pub fn pending_commands(&self) -> usize {
        self.queue.iter().filter(|c| c.is_some()).count()
    }

    pub fn set_update_rate(&mut self, rate: UpdateRate) -> Result<()> {
        if rate == self.rate && self.power == ReceiverPower::On {
            return Ok(());
        }
        self.rate = rate;
        self.power = ReceiverPower::On;
        info!("gps: update rate {} Hz", rate.hz());
        self.enqueue(Command::mtk(
            CMD_SET_RATE,
            format_args!("PMTK220,{}", rate.interval_ms()),
        ))
    }

    pub fn set_power(&mut self, power: ReceiverPower) -> Result<()> {
        if power == self.power {
            return Ok(());
        }
        self.power = power;
        info!("gps: receiver {:?}", power);
        match power {
            // any byte wakes the receiver; the rate command doubles as wake-up
            ReceiverPower::On => self.enqueue(Command::mtk(
                CMD_SET_RATE,
                format_args!("PMTK220,{}", self.rate.interval_ms()),
            )),
            ReceiverPower::Standby => {
                self.queue = [None; CMD_QUEUE];
                self.enqueue(Command::mtk(CMD_STANDBY, format_args!("PMTK161,0")))
            }
        }
    }

    fn enqueue(&mut self, cmd: Command) -> Result<()> {
        // a newer command of the same kind supersedes a queued one
        if let Some(slot) = self
            .queue
            .iter_mut()
            .find(|c| c.is_some_and(|c| c.id == cmd.id && c.attempts == 0))
        {
            *slot = Some(cmd);
            return Ok(());
        }
        let Some(slot) = self.queue.iter_mut().find(|c| c.is_none()) else {
            self.stats.queue_overflows += 1;
            return Err(Error::SensorTimeout);
        };
        *slot = Some(cmd);
        Ok(())
    }

    fn pop_command(&mut self) {
        self.queue.rotate_left(1);
        self.queue[CMD_QUEUE - 1] = None;
    }

    // pull bytes from the pipe within the per-tick budget
    pub fn drain(&mut self, bus: &StateBus, now_ms: u64) {
        let mut buf = [0u8; 128];
        let mut total = 0;
        while total < DRAIN_BUDGET {
            let n = match bus.nmea.try_read(&mut buf) {
                Ok(n) if n > 0 => n,
                _ => break,
            };
            self.ingest(&buf[..n], bus, now_ms);
            total += n;
        }
    }

    pub fn ingest(&mut self, bytes: &[u8], bus: &StateBus, now_ms: u64) {
        if bytes.is_empty() {
            return;
        }
        self.last_byte_ms = now_ms;
        for &b in bytes {
            match self.parser.feed(b) {
                Some(Ok(sentence)) => {
                    self.window_ok = self.window_ok.saturating_add(1);
                    self.stats.sentences += 1;
                    self.on_sentence(sentence, bus, now_ms);
                }
                Some(Err(_)) => {
                    self.window_err = self.window_err.saturating_add(1);
                    self.stats.parse_errors += 1;
                }
                None => {}
            }
        }
    }

    fn on_sentence(&mut self, sentence: Sentence, bus: &StateBus, now_ms: u64) {
        match sentence {
            Sentence::Gga(g) => {
                self.pending_gga = Some(g);
                self.try_assemble(bus, now_ms);
            }
            Sentence::Rmc(r) => {
                self.pending_rmc = Some(r);
                self.try_assemble(bus, now_ms);
            }
            Sentence::Ack { cmd, flag } => {
                let head = self.queue[0];
                if let Some(c) = head.filter(|c| c.id == cmd && c.attempts > 0) {
                    if flag == ACK_OK {
                        self.stats.acks += 1;
                        debug!("gps: PMTK{} acknowledged after {} tries", c.id, c.attempts);
                        self.pop_command();
                    } else {
                        debug!("gps: PMTK{} nack flag {}", c.id, flag);
                    }
                }
            }
            Sentence::Other => {}
        }
    }

    fn try_assemble(&mut self, bus: &StateBus, now_ms: u64) {
        let (Some(gga), Some(rmc)) = (self.pending_gga, self.pending_rmc) else {
            return;
        };
        let ge = gga.time_ms / EPOCH_MS;
        let re = rmc.time_ms / EPOCH_MS;
        if ge != re {
            // keep whichever belongs to the newer epoch, across midnight too
            if epoch_after(ge, re) {
                self.pending_rmc = None;
            } else {
                self.pending_gga = None;
            }
            return;
        }
        self.pending_gga = None;
        self.pending_rmc = None;

        let fix = self.assemble(&gga, &rmc, now_ms);
        self.publish(fix, bus);
    }

    fn assemble(&mut self, gga: &Gga, rmc: &Rmc, now_ms: u64) -> GpsFix {
        let utc = rmc
            .date
            .and_then(|d| {
                let secs = gga.time_ms / 1000;
                d.and_hms_milli_opt(secs / 3600, (secs / 60) % 60, secs % 60, gga.time_ms % 1000)
            })
            .or_else(|| self.last_fix.map(|f| f.utc))
            .unwrap_or(NaiveDateTime::MIN);

        let position = gga.lat.zip(gga.lon).or(rmc.lat.zip(rmc.lon));
        let quality = match position {
            _ if gga.quality == 0 || !rmc.valid => FixQuality::None,
            None => FixQuality::None,
            Some(_) if gga.sats >= 4 && gga.alt_m.is_some() => FixQuality::Fix3D,
            Some(_) => FixQuality::Fix2D,
        };
        let (lat, lon) = match quality {
            FixQuality::None => (0.0, 0.0),
            _ => position.unwrap_or((0.0, 0.0)),
        };

        let speed = rmc.speed_knots.map(|k| k * KNOTS_TO_MPS).unwrap_or(0.0).max(0.0);
        let (course, course_stale) = match rmc.course_deg {
            Some(raw) if speed >= COURSE_MIN_SPEED_MPS && quality != FixQuality::None => {
                let raw = wrap_360(raw);
                let smoothed = match self.course {
                    Some(prev) => wrap_360(prev + COURSE_ALPHA * wrap_180(raw - prev)),
                    None => raw,
                };
                self.course = Some(smoothed);
                (smoothed, false)
            }
            _ => (self.course.unwrap_or(0.0), true),
        };

        GpsFix {
            lat,
            lon,
            alt_m: gga.alt_m.unwrap_or(0.0),
            speed_mps: if quality == FixQuality::None { 0.0 } else { speed },
            course_deg: course,
            course_stale,
            hdop: gga.hdop.unwrap_or(99.9),
            sats: gga.sats,
            utc,
            quality,
            at_ms: now_ms,
        }
    }

    fn publish(&mut self, fix: GpsFix, bus: &StateBus) {
        self.stats.fixes += 1;
        self.last_fix = Some(fix);
        if self.lost {
            info!("gps: receiver back");
            self.lost = false;
        }
        if self.backoff.on_success() {
            info!("gps: healthy again");
            bus.set_health(|h| h.gps_unhealthy = false);
        }
        bus.gps.publish(fix);
    }

    // timeouts, parse-error window and outbound commands
    pub fn poll<H: SensorHub>(&mut self, hub: &mut H, bus: &StateBus, now_ms: u64) {
        self.check_parse_window(now_ms);
        self.check_silence(bus, now_ms);
        self.service_commands(hub, now_ms);
    }

    fn check_parse_window(&mut self, now_ms: u64) {
        if now_ms.saturating_sub(self.window_start_ms) < PARSE_WINDOW_MS {
            return;
        }
        let total = self.window_ok as u32 + self.window_err as u32;
        if total > 0 && self.window_err as u32 * 10 > total {
            warn!(
                "gps: {} of {} sentences bad, resetting parser",
                self.window_err, total
            );
            self.parser.reset();
            self.pending_gga = None;
            self.pending_rmc = None;
            self.stats.parser_resets += 1;
        }
        self.window_start_ms = now_ms;
        self.window_ok = 0;
        self.window_err = 0;
    }

    fn check_silence(&mut self, bus: &StateBus, now_ms: u64) {
        if self.power == ReceiverPower::Standby {
            self.last_byte_ms = now_ms;
            return;
        }
        if now_ms.saturating_sub(self.last_byte_ms) < SILENCE_LOST_MS {
            return;
        }
        if !self.lost {
            self.lost = true;
            self.stats.lost_events += 1;
            warn!("gps: no data for {} ms, fix lost", now_ms - self.last_byte_ms);
            self.course = None;
            if let Some(mut fix) = self.last_fix {
                fix.quality = FixQuality::None;
                fix.lat = 0.0;
                fix.lon = 0.0;
                fix.speed_mps = 0.0;
                fix.course_stale = true;
                fix.at_ms = now_ms;
                bus.gps.publish(fix);
            }
            self.record_failure(bus, now_ms);
        } else if self.backoff.ready(now_ms) {
            debug!("gps: recovery attempt {}", self.backoff.failures());
            let rate = self.rate;
            if let Err(e) = self.enqueue(Command::mtk(
                CMD_SET_RATE,
                format_args!("PMTK220,{}", rate.interval_ms()),
            )) {
                warn!("gps: recovery PMTK220 dropped ({})", e);
            }
            self.record_failure(bus, now_ms);
        }
    }

    fn record_failure(&mut self, bus: &StateBus, now_ms: u64) {
        if self.backoff.on_failure(now_ms) {
            warn!("gps: unhealthy after {} silent periods", self.backoff.failures());
            bus.set_health(|h| h.gps_unhealthy = true);
        }
    }

    fn service_commands<H: SensorHub>(&mut self, hub: &mut H, now_ms: u64) {
        let Some(mut cmd) = self.queue[0] else {
            return;
        };
        if cmd.attempts > 0 && now_ms.saturating_sub(cmd.sent_at_ms) < ACK_TIMEOUT_MS {
            return;
        }
        if cmd.attempts >= MAX_ATTEMPTS {
            warn!("gps: PMTK{} unacknowledged after {} tries", cmd.id, cmd.attempts);
            self.stats.command_failures += 1;
            self.pop_command();
            return;
        }
        cmd.attempts += 1;
        cmd.sent_at_ms = now_ms;
        if let Err(e) = hub.gps_send(cmd.as_bytes()) {
            warn!("gps: send PMTK{} failed: {}", cmd.id, e);
        }
        self.queue[0] = Some(cmd);
    }
}

// `a` is less than half a day ahead of `b` on the UTC clock
fn epoch_after(a: u32, b: u32) -> bool {
    let ahead = (a + EPOCHS_PER_DAY - b) % EPOCHS_PER_DAY;
    ahead != 0 && ahead < EPOCHS_PER_DAY / 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::hub::BatterySense;
    use crate::sensors::nmea::tests::sentence;
    use crate::state::ImuSample;
    use alloc::string::String;
    use alloc::vec::Vec;
    use alloc::format;

    #[derive(Default)]
    struct Hub {
        sent: Vec<String>,
    }

    impl SensorHub for Hub {
        fn read_buttons(&mut self) -> Result<u8> {
            Ok(0)
        }
        fn read_imu(&mut self) -> Result<ImuSample> {
            Ok(ImuSample::default())
        }
        fn read_battery(&mut self) -> Result<BatterySense> {
            Err(Error::SensorTimeout)
        }
        fn gps_send(&mut self, bytes: &[u8]) -> Result<()> {
            self.sent.push(String::from_utf8_lossy(bytes).into_owned());
            Ok(())
        }
        fn set_backlight(&mut self, _pct: u8) {}
        fn set_compass_enabled(&mut self, _on: bool) {}
    }

    fn epoch(time: &str, knots: &str, course: &str, quality: u8, hdop: &str) -> String {
        let mut s = sentence(&format!(
            "GPGGA,{},4730.000,N,00830.000,E,{},09,{},420.5,M,48.0,M,,",
            time, quality, hdop
        ));
        let status = if quality == 0 { "V" } else { "A" };
        s.push_str(&sentence(&format!(
            "GPRMC,{},{},4730.000,N,00830.000,E,{},{},010526,,,A",
            time, status, knots, course
        )));
        s
    }

    #[test]
    fn test_gga_rmc_pair_publishes_fix() {
        let bus = StateBus::new();
        let mut gps = GpsManager::new(0);
        gps.ingest(epoch("101500.00", "20.0", "90.0", 1, "1.2").as_bytes(), &bus, 100);
        let fix = bus.gps.take_fresh().expect("fix published");
        assert_eq!(fix.quality, FixQuality::Fix3D);
        assert!((fix.lat - 47.5).abs() < 1e-9 && (fix.lon - 8.5).abs() < 1e-9);
        assert!((fix.speed_mps - 20.0 * KNOTS_TO_MPS).abs() < 1e-4);
        assert_eq!(fix.course_deg, 90.0);
        assert!(!fix.course_stale);
        assert_eq!(fix.hdop, 1.2);
        assert_eq!(format!("{}", fix.utc), "2026-05-01 10:15:00");
    }

    #[test]
    fn test_mismatched_epochs_do_not_pair() {
        let bus = StateBus::new();
        let mut gps = GpsManager::new(0);
        let gga = sentence("GPGGA,101500.00,4730.000,N,00830.000,E,1,09,1.0,420.5,M,48.0,M,,");
        let rmc = sentence("GPRMC,101500.20,A,4730.000,N,00830.000,E,5.0,10.0,010526,,,A");
        gps.ingest(gga.as_bytes(), &bus, 0);
        gps.ingest(rmc.as_bytes(), &bus, 0);
        assert!(bus.gps.peek().is_none(), "different 100 ms epochs");
    }

    #[test]
    fn test_pairs_across_midnight() {
        let bus = StateBus::new();
        let mut gps = GpsManager::new(0);
        let gga = sentence("GPGGA,235959.90,4730.000,N,00830.000,E,1,09,1.0,420.5,M,48.0,M,,");
        let rmc = sentence("GPRMC,000000.00,A,4730.000,N,00830.000,E,5.0,10.0,020526,,,A");
        gps.ingest(gga.as_bytes(), &bus, 0);
        gps.ingest(rmc.as_bytes(), &bus, 100);
        assert!(bus.gps.peek().is_none());
        // the new day's RMC was kept, so its GGA completes the epoch
        let gga = sentence("GPGGA,000000.00,4730.000,N,00830.000,E,1,09,1.0,420.5,M,48.0,M,,");
        gps.ingest(gga.as_bytes(), &bus, 110);
        let fix = bus.gps.take_fresh().expect("fix after rollover");
        assert_eq!(format!("{}", fix.utc), "2026-05-02 00:00:00");

        assert!(epoch_after(0, EPOCHS_PER_DAY - 1));
        assert!(!epoch_after(EPOCHS_PER_DAY - 1, 0));
        assert!(epoch_after(101, 100));
    }

    #[test]
    fn test_recovery_command_counted_when_queue_full() {
        let bus = StateBus::new();
        let mut gps = GpsManager::new(0);
        gps.ingest(epoch("101500.00", "20.0", "90.0", 1, "1.0").as_bytes(), &bus, 0);
        for (slot, id) in gps.queue.iter_mut().zip(300u16..) {
            *slot = Some(Command::mtk(id, format_args!("PMTK{}", id)));
        }
        gps.check_silence(&bus, 3_000);
        gps.check_silence(&bus, 100_000);
        assert_eq!(gps.stats().queue_overflows, 1);
        assert!(
            gps.queue.iter().all(|c| c.is_some_and(|c| c.id != CMD_SET_RATE)),
            "queued commands are not displaced"
        );
    }

    #[test]
    fn test_course_smoothing_and_hold() {
        let bus = StateBus::new();
        let mut gps = GpsManager::new(0);
        gps.ingest(epoch("101500.00", "20.0", "350.0", 1, "1.0").as_bytes(), &bus, 0);
        gps.ingest(epoch("101500.10", "20.0", "10.0", 1, "1.0").as_bytes(), &bus, 100);
        let fix = bus.gps.take_fresh().unwrap();
        // 350 + 0.4 * 20 = 358
        assert!((fix.course_deg - 358.0).abs() < 1e-3, "wraps through north, got {}", fix.course_deg);

        // below 2 m/s the course is held and flagged stale
        gps.ingest(epoch("101500.20", "1.0", "180.0", 1, "1.0").as_bytes(), &bus, 200);
        let fix = bus.gps.take_fresh().unwrap();
        assert!((fix.course_deg - 358.0).abs() < 1e-3);
        assert!(fix.course_stale);
    }

    #[test]
    fn test_invalid_fix_has_no_position() {
        let bus = StateBus::new();
        let mut gps = GpsManager::new(0);
        gps.ingest(epoch("101500.00", "0.0", "", 0, "").as_bytes(), &bus, 0);
        let fix = bus.gps.peek().unwrap();
        assert_eq!(fix.quality, FixQuality::None);
        assert_eq!(fix.position(), None);
    }

    #[test]
    fn test_silence_marks_fix_lost_then_unhealthy() {
        let bus = StateBus::new();
        let mut hub = Hub::default();
        let mut gps = GpsManager::new(0);
        gps.ingest(epoch("101500.00", "20.0", "90.0", 1, "1.0").as_bytes(), &bus, 0);
        bus.gps.take_fresh();

        gps.poll(&mut hub, &bus, 3_000);
        let fix = bus.gps.take_fresh().expect("lost fix published");
        assert_eq!(fix.quality, FixQuality::None);
        assert!(!bus.health().gps_unhealthy);

        let mut t = 3_000;
        while t < 30_000 && !bus.health().gps_unhealthy {
            t += 100;
            gps.poll(&mut hub, &bus, t);
        }
        assert!(bus.health().gps_unhealthy, "degraded after repeated silence");
        assert!(t >= 18_000, "backoff spaces recovery attempts, flagged at {}", t);
        assert!(hub.sent.iter().any(|s| s.starts_with("$PMTK220,100*2F")));

        gps.ingest(epoch("101530.00", "20.0", "90.0", 1, "1.0").as_bytes(), &bus, t + 10);
        assert!(!bus.health().gps_unhealthy, "valid fix clears the flag");
    }

    #[test]
    fn test_parse_error_ratio_resets_parser() {
        let bus = StateBus::new();
        let mut gps = GpsManager::new(0);
        for _ in 0..3 {
            gps.ingest(b"$GPGGA,garbage*00\r\n", &bus, 10);
        }
        for _ in 0..5 {
            gps.ingest(sentence("GPGSV,1,1,00").as_bytes(), &bus, 20);
        }
        let mut hub = Hub::default();
        gps.poll(&mut hub, &bus, 1_000);
        assert_eq!(gps.stats().parser_resets, 1);

        for _ in 0..20 {
            gps.ingest(sentence("GPGSV,1,1,00").as_bytes(), &bus, 1_100);
        }
        gps.ingest(b"$GPGGA,garbage*00\r\n", &bus, 1_100);
        gps.poll(&mut hub, &bus, 2_000);
        assert_eq!(gps.stats().parser_resets, 1, "5 % errors stay under threshold");
    }

    #[test]
    fn test_rate_command_retried_until_ack() {
        let bus = StateBus::new();
        let mut hub = Hub::default();
        let mut gps = GpsManager::new(0);
        gps.set_update_rate(UpdateRate::Hz5).unwrap();
        gps.poll(&mut hub, &bus, 10);
        assert_eq!(hub.sent, ["$PMTK220,200*2C\r\n"]);
        gps.poll(&mut hub, &bus, 500);
        assert_eq!(hub.sent.len(), 1, "waits for the ack");
        gps.poll(&mut hub, &bus, 1_010);
        assert_eq!(hub.sent.len(), 2, "resent after 1 s");
        gps.ingest(sentence("PMTK001,220,3").as_bytes(), &bus, 1_100);
        assert_eq!(gps.pending_commands(), 0);
        assert_eq!(gps.stats().acks, 1);
    }

    #[test]
    fn test_command_dropped_after_three_attempts() {
        let bus = StateBus::new();
        let mut hub = Hub::default();
        let mut gps = GpsManager::new(0);
        gps.set_power(ReceiverPower::Standby).unwrap();
        for t in [0u64, 1_000, 2_000, 3_000] {
            // keep bytes flowing so silence handling stays out of the way
            gps.ingest(b"\r\n", &bus, t);
            gps.poll(&mut hub, &bus, t);
        }
        assert_eq!(hub.sent.len(), 3);
        assert!(hub.sent.iter().all(|s| s == "$PMTK161,0*28\r\n"));
        assert_eq!(gps.stats().command_failures, 1);
        assert_eq!(gps.pending_commands(), 0);
    }

    #[test]
    fn test_update_rate_from_hz() {
        assert_eq!(UpdateRate::from_hz(10), Some(UpdateRate::Hz10));
        assert_eq!(UpdateRate::from_hz(2), None);
    }
}
