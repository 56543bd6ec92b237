// The instrument: every component, driven one 10 ms tick at a time
//
// Tick order: buttons -> GPS -> compass/motion -> battery -> power ->
// tracker -> zoom -> render -> background jobs. A button press that
// changes the zoom shows in the same frame, and the tracker and the
// renderer see the same fix. Components never call each other; they
// meet on the bus, and this module moves values between them.
//
// Everything that touches the card outside the tracker's own flush
// (index, settings, waypoints, tile decode) runs as a job after the
// render, one quantum each.

use log::{info, warn};

use crate::bus::StateBus;
use crate::config::BootConfig;
use crate::drivers::framebuffer::Framebuffer;
use crate::drivers::hub::SensorHub;
use crate::drivers::input::{ButtonChannel, ButtonManager};
use crate::drivers::panel::Panel;
use crate::drivers::storage::Storage;
use crate::error::{Backoff, Error};
use crate::hotspot::{ConnectMode, Hotspot};
use crate::kernel::wake::WakeFlags;
use crate::kernel::{JOB_QUANTUM_MS, Job, Quantum, Rates, Scheduler};
use crate::map::tiles::StepOutcome;
use crate::map::{MapRenderer, MapView, TileCache, TileKey, ZoomController};
use crate::nav::{Navigator, WaypointBook};
use crate::power::{PowerManager, plan_for};
use crate::sensors::{BatteryMonitor, Calibrator, Compass, GpsManager, MotionDetector, ReceiverPower, UpdateRate};
use crate::settings::Settings;
use crate::state::{
    GpsFix, GpsMode, PowerPlan, PowerState, UiScreen, UiState, Waypoint,
};
use crate::track::{TrackIndex, Tracker, TrackerConfig, recover};
use crate::ui::screens::Screens;
use crate::ui::{Command, Hud, HudInput, HudModel, MAP_REGION, SCREEN_H, SCREEN_W, UiModel};

// below this the GPS course is unreliable
const COURSE_MIN_MPS: f32 = 2.0;
// slow this long and the marker follows the compass instead
const COMPASS_HEADING_AFTER_MS: u64 = 5_000;
const BRIGHTNESS_MIN: u8 = 5;
// decoder steps (4 KiB reads) per job quantum
const DECODE_STEPS: u32 = 4;
const CALIBRATION_HZ: u8 = 20;

pub struct Devices<S, H, P, W> {
    pub storage: S,
    pub hub: H,
    pub panel: P,
    pub hotspot: W,
}

pub struct System<'a, S: Storage, H: SensorHub, P: Panel, W: Hotspot> {
    pub dev: Devices<S, H, P, W>,
    bus: &'a StateBus,
    clock: Option<fn() -> u64>,
    device_id: u64,

    config: BootConfig,
    settings: Settings,

    rates: Rates,
    sched: Scheduler,

    buttons: ButtonManager,
    events: ButtonChannel,
    // events are dropped until every button is up again
    swallow: bool,

    gps: GpsManager,
    gps_seq: u32,
    last_fix: Option<GpsFix>,
    slow_since: Option<u64>,

    compass: Compass,
    compass_backoff: Backoff,
    motion: MotionDetector,
    calib: Calibrator,

    battery: BatteryMonitor,
    power: PowerManager,
    plan: Option<PowerPlan>,
    asleep: bool,

    tracker: Tracker,
    index: TrackIndex,
    media_present: bool,

    zoom: ZoomController,
    waypoints: WaypointBook,
    navigator: Navigator,

    tiles: TileCache,
    map: MapRenderer,
    hud: Hud,
    screens: Screens,
    fb: Framebuffer,

    connect: ConnectMode,
}

impl<'a, S: Storage, H: SensorHub, P: Panel, W: Hotspot> System<'a, S, H, P, W> {
    pub fn boot(mut dev: Devices<S, H, P, W>, bus: &'a StateBus, device_id: u64, now_ms: u64) -> Self {
        let config = BootConfig::load(&mut dev.storage);
        let settings = Settings::load(&mut dev.storage);

        let mut index = TrackIndex::load(&mut dev.storage);
        let mut sched = Scheduler::new();
        match recover(&mut dev.storage, &mut index) {
            Ok(r) if r.repaired + r.removed + r.indexed > 0 => {
                info!(
                    "system: recovered {} track(s), removed {}, indexed {}",
                    r.repaired, r.removed, r.indexed
                );
                let _ = sched.push_unique(Job::WriteIndex);
            }
            Ok(_) => {}
            Err(e) => warn!("system: track recovery failed ({})", e),
        }
        let waypoints = WaypointBook::load(&mut dev.storage);

        let media_present = dev.storage.present();
        if !media_present {
            warn!("system: no card");
            bus.set_health(|h| h.no_media = true);
        }

        let tracker = Tracker::new(TrackerConfig {
            min_hdop: settings.min_hdop,
            pause_after_ms: settings.pause_secs as u64 * 1000,
            ring_size: config.ring_size,
        });
        let zoom = ZoomController::new(settings.zoom_auto, settings.zoom_override_secs as u64 * 1000);

        let mut sys = Self {
            bus,
            clock: None,
            device_id,
            rates: Rates::new(),
            sched,
            buttons: ButtonManager::new(),
            events: ButtonChannel::new(),
            swallow: false,
            gps: GpsManager::new(now_ms),
            gps_seq: 0,
            last_fix: None,
            slow_since: None,
            compass: Compass::new(settings.calib),
            compass_backoff: Backoff::new(),
            motion: MotionDetector::new(),
            calib: Calibrator::new(),
            battery: BatteryMonitor::new(),
            power: PowerManager::new(settings.power_config(), now_ms),
            plan: None,
            asleep: false,
            tracker,
            index,
            media_present,
            zoom,
            waypoints,
            navigator: Navigator::new(),
            tiles: TileCache::new(config.cache_bytes),
            map: MapRenderer::new(MAP_REGION),
            hud: Hud::new(),
            screens: Screens::new(),
            fb: Framebuffer::new(SCREEN_W, SCREEN_H),
            connect: ConnectMode::new(),
            config,
            settings,
            dev,
        };
        sys.apply_plan(plan_for(PowerState::Active, sys.settings.brightness_pct));
        sys.publish_ui();
        bus.zoom.publish(sys.zoom.state());
        bus.tracking.publish(sys.tracker.status());
        info!(
            "system: up, {} tracks indexed, {} waypoints, tile cache {}",
            sys.index.len(),
            sys.waypoints.len(),
            sys.tiles.capacity()
        );
        sys
    }

    // job quanta measure real time with this clock; without one they
    // are bounded by step count only
    pub fn set_clock(&mut self, clock: fn() -> u64) {
        self.clock = Some(clock);
    }

    pub fn bus(&self) -> &StateBus {
        self.bus
    }

    pub fn config(&self) -> &BootConfig {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn index(&self) -> &TrackIndex {
        &self.index
    }

    pub fn waypoints(&self) -> &WaypointBook {
        &self.waypoints
    }

    pub fn screen(&self) -> UiScreen {
        self.screens.active()
    }

    pub fn power_state(&self) -> PowerState {
        self.power.state()
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.fb
    }

    pub fn tiles(&self) -> &TileCache {
        &self.tiles
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.sched
    }

    // what the last map frame showed
    pub fn map_view(&self) -> Option<MapView> {
        self.map.drawn()
    }

    pub fn hud_model(&self) -> Option<HudModel> {
        self.hud.drawn()
    }

    // tracker closed and everything persisted; the board may power down
    pub fn deep_sleep_ready(&self) -> bool {
        self.asleep
    }

    // latched interrupt sources from the board
    pub fn wake(&mut self, flags: WakeFlags, now_ms: u64) {
        if flags.motion {
            self.motion.note_wake(now_ms);
            self.bus.motion.publish(self.motion.state());
            self.power.note_motion(now_ms);
            self.rates.power.fire_next();
        }
        if flags.button {
            self.rates.buttons.fire_next();
        }
    }

    pub fn tick(&mut self, now_ms: u64) {
        if self.asleep {
            return;
        }
        if self.rates.buttons.tick() {
            self.poll_buttons(now_ms);
        }
        if self.rates.gps.tick() {
            self.gps.drain(self.bus, now_ms);
            self.gps.poll(&mut self.dev.hub, self.bus, now_ms);
        }
        if self.rates.compass.tick() {
            self.read_compass(now_ms);
        }
        if self.rates.battery.tick() {
            self.battery.poll(&mut self.dev.hub, self.bus, now_ms);
        }
        if self.rates.power.tick() {
            self.evaluate_power(now_ms);
            if self.asleep {
                return;
            }
        }
        if self.rates.tracker.tick() {
            self.run_tracker(now_ms);
        }
        if self.rates.zoom.tick() {
            self.update_zoom(now_ms);
        }
        if self.rates.render.tick() {
            self.render(now_ms);
        }
        self.run_jobs(now_ms);
    }

    // ---- input ----------------------------------------------------

    fn poll_buttons(&mut self, now_ms: u64) {
        self.buttons.poll(&mut self.dev.hub, self.bus, &self.events, now_ms);
        while let Ok(ev) = self.events.try_receive() {
            // a dark panel only wakes; the press is not an action
            let dark = matches!(self.power.state(), PowerState::Idle | PowerState::LightSleep);
            self.power.note_input(now_ms);
            self.rates.power.fire_next();
            if dark {
                self.swallow = true;
            }
            if self.swallow {
                continue;
            }
            let cmd = {
                let model = UiModel {
                    tracking: self.tracker.status(),
                    calibration: self.calib.status(),
                    hotspot: self.connect.status(),
                    tracks: self.index.entries(),
                    night: self.settings.night,
                };
                self.screens.handle(ev, &model)
            };
            if let Some(cmd) = cmd {
                self.apply(cmd, now_ms);
            }
        }
        if self.swallow && !self.buttons.any_held() {
            self.swallow = false;
        }
    }

    fn apply(&mut self, cmd: Command, now_ms: u64) {
        match cmd {
            Command::Goto(screen) => self.goto(screen, now_ms),
            Command::ZoomIn => {
                self.zoom.zoom_in(now_ms);
                self.redraw_now();
            }
            Command::ZoomOut => {
                self.zoom.zoom_out(now_ms);
                self.redraw_now();
            }
            Command::ZoomAuto => {
                self.zoom.set_auto();
                self.redraw_now();
            }
            Command::ToggleRecording => {
                self.tracker.toggle();
                self.rates.tracker.fire_next();
                if self.screens.active() == UiScreen::Menu {
                    self.goto(UiScreen::Map, now_ms);
                }
            }
            Command::Brightness(delta) => {
                let pct = (self.settings.brightness_pct as i16 + delta as i16)
                    .clamp(BRIGHTNESS_MIN as i16, 100) as u8;
                if pct != self.settings.brightness_pct {
                    self.settings.brightness_pct = pct;
                    self.power.set_config(self.settings.power_config());
                    self.rates.power.fire_next();
                    self.persist_settings();
                    self.publish_ui();
                }
            }
            Command::DropWaypoint => match self.last_fix.as_ref().and_then(GpsFix::position) {
                Some((lat, lon)) => {
                    let n = self.waypoints.add(Waypoint { lat, lon });
                    info!("system: waypoint {} at {:.5},{:.5}", n, lat, lon);
                    let _ = self.sched.push_unique(Job::SaveWaypoints);
                }
                None => warn!("system: no fix, waypoint not dropped"),
            },
            Command::CycleTarget => {
                self.navigator.cycle_target(&self.waypoints);
                self.bus.nav.publish(self.navigator.state());
                // recompute against the current fix right away
                self.gps_seq = self.gps_seq.wrapping_sub(1);
            }
            Command::RetryCalibration => {
                self.calib.start(now_ms);
                self.bus.calibration.publish(self.calib.status());
            }
            Command::ToggleNight => {
                self.settings.night = !self.settings.night;
                self.persist_settings();
                self.publish_ui();
                self.invalidate_frame();
            }
            Command::DeepSleep => {
                self.power.request_deep_sleep();
                self.rates.power.fire_next();
            }
        }
    }

    fn goto(&mut self, screen: UiScreen, now_ms: u64) {
        let from = self.screens.active();
        if from == screen {
            return;
        }
        match from {
            UiScreen::Calibration => {
                self.calib.cancel();
                self.bus.calibration.publish(self.calib.status());
                self.restore_compass_rate();
            }
            UiScreen::Connect => self.connect.stop(&mut self.dev.hotspot),
            _ => {}
        }
        match screen {
            UiScreen::Calibration => {
                self.calib.start(now_ms);
                self.bus.calibration.publish(self.calib.status());
                self.dev.hub.set_compass_enabled(true);
                self.rates.compass.set_hz(CALIBRATION_HZ as u16);
            }
            UiScreen::Connect => {
                if let Err(e) = self.connect.start(&mut self.dev.hotspot, self.device_id, now_ms) {
                    warn!("system: hotspot failed to start ({})", e);
                }
            }
            UiScreen::Map => self.invalidate_frame(),
            _ => {}
        }
        self.screens.goto(screen);
        self.publish_ui();
        self.rates.render.fire_next();
    }

    fn redraw_now(&mut self) {
        self.rates.zoom.fire_next();
        self.rates.render.fire_next();
    }

    fn invalidate_frame(&mut self) {
        self.map.invalidate();
        self.hud.invalidate();
        self.screens.ctx.request_full_redraw();
    }

    fn publish_ui(&self) {
        self.bus.ui.publish(UiState {
            screen: self.screens.active(),
            night: self.settings.night,
            brightness_pct: self.settings.brightness_pct,
        });
    }

    fn persist_settings(&mut self) {
        let _ = self.sched.push_unique(Job::PersistSettings);
    }

    // ---- sensors --------------------------------------------------

    fn read_compass(&mut self, now_ms: u64) {
        if !self.compass_backoff.ready(now_ms) {
            return;
        }
        let sample = match self.dev.hub.read_imu() {
            Ok(s) => s,
            Err(e) => {
                if self.compass_backoff.on_failure(now_ms) {
                    warn!("compass: degraded ({})", e);
                    self.bus.set_health(|h| h.compass_degraded = true);
                }
                return;
            }
        };
        if self.compass_backoff.on_success() {
            info!("compass: recovered");
            self.bus.set_health(|h| h.compass_degraded = false);
        }
        self.bus.imu.publish(sample);

        if self.motion.update(sample.accel, now_ms) {
            self.power.note_motion(now_ms);
        }
        self.bus.motion.publish(self.motion.state());

        if self.calib.running() {
            if let Some(result) = self.calib.feed(&sample, now_ms) {
                match result {
                    Ok(fit) => {
                        let mut offsets = self.compass.offsets();
                        offsets.offset = fit.offset;
                        offsets.scale = fit.scale;
                        offsets.valid = true;
                        offsets.captured_ms = self
                            .last_fix
                            .map(|f| f.utc.and_utc().timestamp_millis())
                            .unwrap_or(0);
                        self.compass.set_offsets(offsets);
                        self.settings.calib = offsets;
                        self.persist_settings();
                    }
                    Err(e) => warn!("compass: calibration failed ({})", e),
                }
                self.restore_compass_rate();
            }
            self.bus.calibration.publish(self.calib.status());
        }

        self.bus.compass.publish(self.compass.update(&sample, now_ms));
    }

    fn restore_compass_rate(&mut self) {
        if let Some(plan) = self.plan {
            self.dev.hub.set_compass_enabled(plan.compass_hz > 0);
            self.rates.compass.set_hz(plan.compass_hz as u16);
        }
    }

    // ---- power ----------------------------------------------------

    fn evaluate_power(&mut self, now_ms: u64) {
        let recording = self.tracker.is_recording();
        let reading = self.battery.reading();
        let before = self.power.state();
        let status = self.power.evaluate(recording, reading.as_ref(), now_ms);
        self.bus.power.publish(status);

        let critical = status.shutdown_in_s.is_some();
        if self.bus.health().battery_critical != critical {
            self.bus.set_health(|h| h.battery_critical = critical);
        }
        if status.state == PowerState::DeepSleep {
            self.enter_deep_sleep(now_ms);
            return;
        }
        self.apply_plan(status.plan);
        if before != status.state && status.state == PowerState::Active {
            self.rates.render.fire_next();
        }
    }

    fn apply_plan(&mut self, plan: PowerPlan) {
        if self.plan == Some(plan) {
            return;
        }
        let prev = self.plan.replace(plan);

        self.dev.hub.set_backlight(plan.backlight_pct);
        if prev.is_none_or(|p| (p.backlight_pct > 0) != (plan.backlight_pct > 0)) {
            if let Err(e) = self.dev.panel.set_enabled(plan.backlight_pct > 0) {
                warn!("system: panel power ({})", e);
            }
            if plan.backlight_pct > 0 {
                self.invalidate_frame();
                self.fb.mark_dirty(self.fb.bounds());
            }
        }

        if prev.is_none_or(|p| p.gps != plan.gps) {
            let r = match plan.gps {
                GpsMode::Rate(hz) => self
                    .gps
                    .set_update_rate(UpdateRate::from_hz(hz).unwrap_or(UpdateRate::Hz10)),
                GpsMode::Standby => self.gps.set_power(ReceiverPower::Standby),
            };
            if let Err(e) = r {
                warn!("gps: mode change refused ({})", e);
            }
        }

        if !self.calib.running() {
            self.dev.hub.set_compass_enabled(plan.compass_hz > 0);
            self.rates.compass.set_hz(plan.compass_hz as u16);
        }
    }

    fn enter_deep_sleep(&mut self, now_ms: u64) {
        info!("system: shutting down");
        if let Some(entry) = self.tracker.shutdown(&mut self.dev.storage, self.bus, now_ms) {
            self.index.upsert(entry);
        }
        self.connect.stop(&mut self.dev.hotspot);
        if self.index.is_dirty()
            && let Err(e) = self.index.save(&mut self.dev.storage)
        {
            warn!("system: index not saved ({})", e);
        }
        if self.sched.is_pending(Job::PersistSettings)
            && let Err(e) = self.settings.save(&mut self.dev.storage)
        {
            warn!("system: settings not saved ({})", e);
        }
        if self.waypoints.is_dirty()
            && let Err(e) = self.waypoints.save(&mut self.dev.storage)
        {
            warn!("system: waypoints not saved ({})", e);
        }
        self.sched = Scheduler::new();

        let _ = self.gps.set_power(ReceiverPower::Standby);
        self.gps.poll(&mut self.dev.hub, self.bus, now_ms);
        self.dev.hub.set_compass_enabled(false);
        self.dev.hub.set_backlight(0);
        let _ = self.dev.panel.set_enabled(false);
        self.plan = Some(plan_for(PowerState::DeepSleep, 0));
        self.asleep = true;
    }

    // ---- tracking and navigation ----------------------------------

    fn run_tracker(&mut self, now_ms: u64) {
        let present = self.dev.storage.present();
        if present != self.media_present {
            self.media_present = present;
            if present {
                info!("system: card inserted");
                self.tracker.media_restored();
                self.tiles.clear_missing();
                self.bus.set_health(|h| h.no_media = false);
            } else {
                warn!("system: card removed");
                self.bus.set_health(|h| h.no_media = true);
            }
        }

        let fix = self.bus.gps.peek();
        if fix.is_some() {
            self.last_fix = fix;
        }
        let motion = self.motion.state();
        self.tracker
            .tick(fix.as_ref(), &motion, &self.index, self.bus, now_ms);
        if self.tracker.needs_flush(now_ms) {
            let _ = self.sched.push_unique(Job::FlushTrack);
        }

        // navigation follows new fixes only: arrival counts evaluations
        let seq = self.bus.gps.seq();
        if seq != self.gps_seq {
            self.gps_seq = seq;
            if let Some(f) = fix.filter(|f| f.has_fix())
                && let Ok(nav) = self.navigator.update(&f)
            {
                self.bus.nav.publish(nav);
            }
        }
    }

    fn update_zoom(&mut self, now_ms: u64) {
        let speed = self
            .last_fix
            .filter(|f| f.has_fix())
            .map(|f| f.speed_mps)
            .unwrap_or(0.0);
        if self.zoom.update(speed, now_ms) {
            self.bus.zoom.publish(self.zoom.state());
        }
    }

    // GPS course while moving; after a while slow, the compass
    fn heading(&mut self, fix: Option<&GpsFix>, now_ms: u64) -> Option<f32> {
        let compass = self.bus.compass.peek().filter(|c| c.usable());
        match fix.filter(|f| f.has_fix()) {
            Some(f) if f.speed_mps >= COURSE_MIN_MPS && !f.course_stale => {
                self.slow_since = None;
                Some(f.course_deg)
            }
            Some(f) => {
                let since = *self.slow_since.get_or_insert(now_ms);
                match compass {
                    Some(c) if now_ms.saturating_sub(since) >= COMPASS_HEADING_AFTER_MS => {
                        Some(c.heading_deg)
                    }
                    _ => Some(f.course_deg),
                }
            }
            None => compass.map(|c| c.heading_deg),
        }
    }

    // ---- render ---------------------------------------------------

    fn render(&mut self, now_ms: u64) {
        if self.plan.is_some_and(|p| p.backlight_pct == 0) {
            return;
        }
        let night = self.settings.night;
        if self.screens.active() == UiScreen::Map {
            let fix = self.bus.gps.peek();
            let view = MapView {
                center: fix.as_ref().and_then(GpsFix::position),
                zoom: self.zoom.state().z,
                heading: self.heading(fix.as_ref(), now_ms),
                tracking: self.tracker.state(),
                trail_seq: self.tracker.status().trail_seq,
                night,
            };
            self.map
                .render(&mut self.fb, &mut self.tiles, &view, self.tracker.trail(), now_ms);

            let nav = self.navigator.state();
            let model = HudModel::build(&HudInput {
                fix: fix.as_ref(),
                nav: &nav,
                tracking: self.tracker.state(),
                battery: self.battery.reading(),
                zoom: self.zoom.state(),
                health: self.bus.health(),
                power: self.bus.power.peek(),
                night,
            });
            self.hud.render(&mut self.fb, &model);

            if self.tiles.has_work() {
                let _ = self.sched.push_unique(Job::DecodeTile);
            }
        } else {
            let model = UiModel {
                tracking: self.tracker.status(),
                calibration: self.calib.status(),
                hotspot: self.connect.status(),
                tracks: self.index.entries(),
                night,
            };
            self.connect.poll(&mut self.dev.hotspot, now_ms);
            self.screens.refresh(&model);
            self.screens.draw(&mut self.fb, &model);
        }
        if let Err(e) = self.fb.flush(&mut self.dev.panel) {
            warn!("system: panel write failed ({})", e);
        }
    }

    // ---- background jobs ------------------------------------------

    fn run_jobs(&mut self, now_ms: u64) {
        let fixed = move || now_ms;
        let own = self.clock;
        let clock: &dyn Fn() -> u64 = match &own {
            Some(f) => f,
            None => &fixed,
        };
        // jobs requeued while running wait for the next tick
        let mut budget = self.sched.pending();
        while budget > 0 {
            budget -= 1;
            let Some(job) = self.sched.pop() else {
                break;
            };
            match job {
                Job::FlushTrack => {
                    if let Some(entry) = self.tracker.flush(&mut self.dev.storage, self.bus, now_ms) {
                        self.index.upsert(entry);
                        let _ = self.sched.push_unique(Job::WriteIndex);
                    }
                }
                Job::WriteIndex => {
                    if let Err(e) = self.index.save(&mut self.dev.storage) {
                        warn!("system: index write failed ({})", e);
                    }
                }
                Job::PersistSettings => {
                    if let Err(e) = self.settings.save(&mut self.dev.storage) {
                        warn!("system: settings write failed ({})", e);
                    }
                }
                Job::SaveWaypoints => {
                    if let Err(e) = self.waypoints.save(&mut self.dev.storage) {
                        warn!("system: waypoint write failed ({})", e);
                    }
                }
                Job::DecodeTile => {
                    // the card belongs to the tracker while it has points waiting
                    if self.sched.is_pending(Job::FlushTrack) || self.tracker.needs_flush(now_ms) {
                        let _ = self.sched.push_unique(Job::DecodeTile);
                        continue;
                    }
                    let mut q = Quantum::new(clock, JOB_QUANTUM_MS, DECODE_STEPS);
                    self.decode_tiles(&mut q);
                    if self.tiles.has_work() && !self.tiles.exhausted() {
                        let _ = self.sched.push_unique(Job::DecodeTile);
                    }
                }
            }
        }
    }

    fn decode_tiles(&mut self, q: &mut Quantum<'_>) {
        let center = self.map.center_tile().unwrap_or(TileKey::new(0, 0, 0));
        loop {
            match self.tiles.decode_step(&mut self.dev.storage, center, q) {
                Ok(StepOutcome::Landed(_) | StepOutcome::Failed(_)) => {
                    self.rates.render.fire_next();
                    if q.expired() {
                        break;
                    }
                }
                Ok(StepOutcome::Idle | StepOutcome::InProgress) => break,
                Err(Error::CacheExhausted) => break,
                Err(Error::NoMedia) => {
                    self.bus.set_health(|h| h.no_media = true);
                    break;
                }
                Err(e) => {
                    warn!("tiles: decode error ({})", e);
                    break;
                }
            }
        }
        let exhausted = self.tiles.exhausted();
        if self.bus.health().cache_exhausted != exhausted {
            self.bus.set_health(|h| h.cache_exhausted = exhausted);
        }
    }
}
