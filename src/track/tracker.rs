// Smart tracker: when to record, which points to keep, when to write
//
//   idle      -> armed      motion and a 3D fix (or a user start)
//   armed     -> recording  fix 3D with HDOP below the limit for 3 s
//   armed     -> idle       no motion for 60 s (not for a user start)
//   recording -> paused     no motion for tracker.no_motion_pause_secs
//   paused    -> recording  motion again; opens a new <trkseg>
//   paused    -> closing    no motion for 30 min
//   any       -> closing    stop request or media fault
//   closing   -> idle       footer flushed
//
// tick() never touches storage. Accepted points are formatted into a
// pending text batch; flush() (run as a background job) creates the
// file on first use and appends the batch. A batch is due at 16 points
// or 2 s after the previous write.

use alloc::collections::VecDeque;
use alloc::string::String;
use core::fmt::Write;

use chrono::Datelike;
use log::{error, info, warn};

use super::gpx;
use super::index::{IndexEntry, TrackIndex};
use super::recovery::TRACKS_DIR;
use crate::bus::StateBus;
use crate::drivers::storage::Storage;
use crate::error::{Error, Result};
use crate::nav::geo;
use crate::state::{
    GpsFix, MotionState, SessionId, TrackPoint, TrackTotals, TrackerState, TrackingStatus,
};

pub const ARM_TIMEOUT_MS: u64 = 60_000;
pub const STABLE_FIX_MS: u64 = 3_000;
pub const PAUSE_CLOSE_MS: u64 = 30 * 60_000;

pub const FLUSH_POINTS: u16 = 16;
pub const FLUSH_INTERVAL_MS: u64 = 2_000;

const SPACING_SECS: f32 = 2.0;
const MIN_SPACING_M: f32 = 3.0;
const MAX_SPACING_M: f32 = 50.0;
const HEADING_CHANGE_DEG: f32 = 15.0;
const MAX_GAP_MS: u64 = 10_000;
const ALTITUDE_FORCE_M: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    pub min_hdop: f32,
    pub pause_after_ms: u64,
    pub ring_size: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_hdop: 5.0,
            pause_after_ms: 180_000,
            ring_size: 256,
        }
    }
}

// overlay point; seg changes on every resume so the trail is not
// drawn across a pause
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailPoint {
    pub lat: f64,
    pub lon: f64,
    pub seg: u16,
}

struct Session {
    id: SessionId,
    // file name inside /tracks
    file: String,
    created: bool,
    // bytes known whole on the card; a failed batch is cut back to this
    committed: u32,
}

impl Session {
    fn path(&self) -> String {
        let mut p = String::new();
        let _ = write!(p, "{}/{}", TRACKS_DIR, self.file);
        p
    }
}

pub struct Tracker {
    cfg: TrackerConfig,
    state: TrackerState,
    session: Option<Session>,
    totals: TrackTotals,
    first_utc: Option<chrono::NaiveDateTime>,

    trail: VecDeque<TrailPoint>,
    trail_seg: u16,
    trail_seq: u32,

    pending: String,
    pending_points: u16,
    last_flush_ms: u64,

    last_point: Option<TrackPoint>,
    last_point_ms: u64,

    stable_since: Option<u64>,
    manual_arm: bool,
    // no automatic arming after a media fault until media is back
    hold_off: bool,
    paused_since: u64,
    stop_requested: bool,
    dirty: bool,
}

impl Tracker {
    pub fn new(cfg: TrackerConfig) -> Self {
        Self {
            trail: VecDeque::with_capacity(cfg.ring_size),
            cfg,
            state: TrackerState::Idle,
            session: None,
            totals: TrackTotals::default(),
            first_utc: None,
            trail_seg: 0,
            trail_seq: 0,
            pending: String::new(),
            pending_points: 0,
            last_flush_ms: 0,
            last_point: None,
            last_point_ms: 0,
            stable_since: None,
            manual_arm: false,
            hold_off: false,
            paused_since: 0,
            stop_requested: false,
            dirty: true,
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn config(&self) -> TrackerConfig {
        self.cfg
    }

    pub fn set_config(&mut self, min_hdop: f32, pause_after_ms: u64) {
        self.cfg.min_hdop = min_hdop;
        self.cfg.pause_after_ms = pause_after_ms;
    }

    pub fn totals(&self) -> TrackTotals {
        self.totals
    }

    pub fn session(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    // path of the open session file
    pub fn session_path(&self) -> Option<String> {
        self.session.as_ref().map(Session::path)
    }

    pub fn trail(&self) -> impl Iterator<Item = &TrailPoint> {
        self.trail.iter()
    }

    pub fn trail_len(&self) -> usize {
        self.trail.len()
    }

    // a session is open; armed still waits for a stable fix
    pub fn is_recording(&self) -> bool {
        matches!(
            self.state,
            TrackerState::Recording | TrackerState::Paused | TrackerState::Closing
        )
    }

    pub fn status(&self) -> TrackingStatus {
        TrackingStatus {
            state: self.state,
            session: self.session(),
            totals: self.totals,
            trail_seq: self.trail_seq,
        }
    }

    // user start: arms without waiting for motion
    pub fn request_start(&mut self) {
        if self.state == TrackerState::Idle {
            self.manual_arm = true;
            self.hold_off = false;
            self.enter(TrackerState::Armed);
        }
    }

    pub fn media_restored(&mut self) {
        if self.hold_off {
            info!("tracker: media back, auto-arm enabled");
            self.hold_off = false;
        }
    }

    pub fn held_off(&self) -> bool {
        self.hold_off
    }

    pub fn request_stop(&mut self) {
        if self.state != TrackerState::Idle {
            self.stop_requested = true;
        }
    }

    pub fn toggle(&mut self) {
        match self.state {
            TrackerState::Idle => self.request_start(),
            _ => self.request_stop(),
        }
    }

    pub fn tick(
        &mut self,
        fix: Option<&GpsFix>,
        motion: &MotionState,
        index: &TrackIndex,
        bus: &StateBus,
        now_ms: u64,
    ) {
        let good_fix = fix.filter(|f| f.is_3d() && f.hdop < self.cfg.min_hdop);
        match good_fix {
            Some(_) => {
                self.stable_since.get_or_insert(now_ms);
            }
            None => self.stable_since = None,
        }
        let quiet_ms = if motion.moving {
            0
        } else {
            now_ms.saturating_sub(motion.last_motion_ms)
        };

        match self.state {
            TrackerState::Idle => {
                if !self.hold_off && motion.moving && fix.is_some_and(|f| f.is_3d()) {
                    self.manual_arm = false;
                    self.enter(TrackerState::Armed);
                }
            }
            TrackerState::Armed => {
                if self.stop_requested {
                    self.stop_requested = false;
                    self.enter(TrackerState::Idle);
                } else if let (Some(f), Some(since)) = (good_fix, self.stable_since)
                    && now_ms - since >= STABLE_FIX_MS
                {
                    self.begin_session(f, index);
                    self.enter(TrackerState::Recording);
                    self.record(f, true);
                } else if !self.manual_arm && quiet_ms >= ARM_TIMEOUT_MS {
                    self.enter(TrackerState::Idle);
                }
            }
            TrackerState::Recording => {
                if self.stop_requested {
                    self.close();
                } else if quiet_ms >= self.cfg.pause_after_ms {
                    self.paused_since = now_ms;
                    self.enter(TrackerState::Paused);
                } else if let Some(f) = fix.filter(|f| f.has_fix()) {
                    self.record(f, false);
                }
            }
            TrackerState::Paused => {
                if self.stop_requested {
                    self.close();
                } else if motion.moving {
                    self.resume_segment();
                    self.enter(TrackerState::Recording);
                } else if now_ms - self.paused_since >= PAUSE_CLOSE_MS {
                    info!("tracker: paused 30 min, closing");
                    self.close();
                }
            }
            TrackerState::Closing => {}
        }

        if self.dirty {
            self.dirty = false;
            bus.tracking.publish(self.status());
        }
    }

    pub fn needs_flush(&self, now_ms: u64) -> bool {
        if self.session.is_none() {
            return false;
        }
        match self.state {
            TrackerState::Closing => true,
            _ => {
                self.pending_points >= FLUSH_POINTS
                    || (!self.pending.is_empty()
                        && now_ms.saturating_sub(self.last_flush_ms) >= FLUSH_INTERVAL_MS)
            }
        }
    }

    // Write the pending batch. Returns the index entry once a session
    // has been closed on disk. Media faults end the session; whatever
    // reached the card stays there for boot recovery.
    pub fn flush<S: Storage>(
        &mut self,
        storage: &mut S,
        bus: &StateBus,
        now_ms: u64,
    ) -> Option<IndexEntry> {
        self.last_flush_ms = now_ms;
        match self.write_batch(storage) {
            Ok(()) => {
                if bus.health().tracker_degraded || bus.health().no_media {
                    bus.set_health(|h| {
                        h.tracker_degraded = false;
                        h.no_media = false;
                    });
                }
            }
            Err(e) => {
                self.on_media_fault(e, storage, bus);
                return self.finish_session(false, bus);
            }
        }
        if self.state == TrackerState::Closing {
            return self.finish_session(true, bus);
        }
        None
    }

    // stop and write everything now; used before deep sleep
    pub fn shutdown<S: Storage>(
        &mut self,
        storage: &mut S,
        bus: &StateBus,
        now_ms: u64,
    ) -> Option<IndexEntry> {
        match self.state {
            TrackerState::Idle => None,
            TrackerState::Armed => {
                self.enter(TrackerState::Idle);
                bus.tracking.publish(self.status());
                None
            }
            _ => {
                self.close();
                self.flush(storage, bus, now_ms)
            }
        }
    }

    fn write_batch<S: Storage>(&mut self, storage: &mut S) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let path = session.path();
        if !session.created {
            storage.ensure_dir(TRACKS_DIR)?;
            let header = gpx::header(session.id);
            storage.write(&path, header.as_bytes())?;
            session.created = true;
            session.committed = header.len() as u32;
            info!("tracker: created {}", path);
        }
        if !self.pending.is_empty() {
            storage.append(&path, self.pending.as_bytes())?;
            session.committed += self.pending.len() as u32;
            self.pending.clear();
            self.pending_points = 0;
        }
        Ok(())
    }

    fn on_media_fault<S: Storage>(&mut self, e: Error, storage: &mut S, bus: &StateBus) {
        warn!("tracker: write failed ({}), closing session", e);
        bus.set_health(|h| {
            h.tracker_degraded = true;
            h.no_media = e == Error::NoMedia;
        });
        self.pending.clear();
        self.pending_points = 0;
        self.hold_off = true;
        self.enter(TrackerState::Closing);

        // best effort: drop any half-written point, then close the document
        if let Some(session) = self.session.as_ref().filter(|s| s.created) {
            let path = session.path();
            let closed = storage
                .truncate(&path, session.committed)
                .and_then(|()| storage.append(&path, gpx::FOOTER.as_bytes()));
            if let Err(e2) = closed {
                error!("tracker: {} left open ({}), recovered at next boot", session.file, e2);
            }
        }
    }

    fn finish_session(&mut self, clean: bool, bus: &StateBus) -> Option<IndexEntry> {
        let session = self.session.take()?;
        let entry = session
            .created
            .then(|| IndexEntry::new(&session.file, &self.totals));
        if clean {
            info!(
                "tracker: closed {} ({} points, {:.0} m)",
                session.file, self.totals.points, self.totals.distance_m
            );
        }
        self.last_point = None;
        self.stop_requested = false;
        self.enter(TrackerState::Idle);
        bus.tracking.publish(self.status());
        entry
    }

    fn begin_session(&mut self, fix: &GpsFix, index: &TrackIndex) {
        let date = fix.utc.year() as u32 * 10_000 + fix.utc.month() * 100 + fix.utc.day();
        let id = SessionId {
            date,
            seq: index.sessions_on(date) as u16 + 1,
        };
        let mut file = String::new();
        let _ = write!(file, "{}.gpx", fix.utc.format("%Y%m%d-%H%M%S"));
        info!("tracker: session {} -> {}", id, file);

        self.session = Some(Session {
            id,
            file,
            created: false,
            committed: 0,
        });
        self.totals = TrackTotals::default();
        self.first_utc = None;
        self.last_point = None;
        self.pending.clear();
        self.pending_points = 0;
        self.trail.clear();
        self.trail_seg = self.trail_seg.wrapping_add(1);
        self.trail_seq = self.trail_seq.wrapping_add(1);
    }

    fn resume_segment(&mut self) {
        self.pending.push_str(gpx::SEGMENT_BREAK);
        self.last_point = None;
        self.trail_seg = self.trail_seg.wrapping_add(1);
    }

    fn close(&mut self) {
        self.stop_requested = false;
        self.pending.push_str(gpx::FOOTER);
        self.enter(TrackerState::Closing);
    }

    fn record(&mut self, fix: &GpsFix, force: bool) {
        let p = TrackPoint::from_fix(fix);
        if !force && !self.wants(&p, fix) {
            return;
        }

        if let Some(q) = self.last_point {
            self.totals.distance_m += geo::distance_m(q.lat, q.lon, p.lat, p.lon) as f32;
            let dz = p.ele_m - q.ele_m;
            if dz > 0.0 {
                self.totals.ascent_m += dz;
            } else {
                self.totals.descent_m -= dz;
            }
        }
        let first = *self.first_utc.get_or_insert(p.utc);
        self.totals.duration_s = (p.utc - first).num_seconds().max(0) as u32;
        self.totals.max_speed_mps = self.totals.max_speed_mps.max(p.speed_mps);
        self.totals.points += 1;

        gpx::write_point(&mut self.pending, &p);
        self.pending_points += 1;

        if self.trail.len() >= self.cfg.ring_size {
            self.trail.pop_front();
        }
        self.trail.push_back(TrailPoint {
            lat: p.lat,
            lon: p.lon,
            seg: self.trail_seg,
        });
        self.trail_seq = self.trail_seq.wrapping_add(1);

        self.last_point = Some(p);
        self.last_point_ms = fix.at_ms;
        self.dirty = true;
    }

    // decimation: keep a point when the rider moved far enough for the
    // speed, turned, climbed, or enough time passed
    fn wants(&self, p: &TrackPoint, fix: &GpsFix) -> bool {
        let Some(q) = self.last_point else {
            return true;
        };
        let spacing = (p.speed_mps * SPACING_SECS).clamp(MIN_SPACING_M, MAX_SPACING_M);
        let moved = geo::distance_m(q.lat, q.lon, p.lat, p.lon) as f32;
        let turned = !fix.course_stale
            && geo::angle_diff(p.course_deg, q.course_deg).abs() > HEADING_CHANGE_DEG;
        moved >= spacing
            || turned
            || fix.at_ms.saturating_sub(self.last_point_ms) >= MAX_GAP_MS
            || (p.ele_m - q.ele_m).abs() > ALTITUDE_FORCE_M
    }

    fn enter(&mut self, next: TrackerState) {
        if next != self.state {
            info!("tracker: {} -> {}", self.state, next);
            self.state = next;
            self.dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::storage::MemStorage;
    use crate::state::FixQuality;
    use chrono::NaiveDate;

    struct Rig {
        t: Tracker,
        bus: StateBus,
        fs: MemStorage,
        idx: TrackIndex,
        now: u64,
        lat: f64,
        motion: MotionState,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                t: Tracker::new(TrackerConfig::default()),
                bus: StateBus::new(),
                fs: MemStorage::new(),
                idx: TrackIndex::new(),
                now: 0,
                lat: 47.0,
                motion: MotionState::default(),
            }
        }

        fn fix(&self, speed: f32) -> GpsFix {
            GpsFix {
                lat: self.lat,
                lon: 8.0,
                alt_m: 400.0,
                speed_mps: speed,
                course_deg: 0.0,
                course_stale: speed < 2.0,
                hdop: 1.2,
                sats: 9,
                utc: NaiveDate::from_ymd_opt(2026, 5, 1)
                    .unwrap()
                    .and_hms_opt(9, 30, 0)
                    .unwrap()
                    + chrono::Duration::milliseconds(self.now as i64),
                quality: FixQuality::Fix3D,
                at_ms: self.now,
            }
        }

        // advance ms in 100 ms steps at a given speed (north), moving or not
        fn ride(&mut self, ms: u64, speed: f32, moving: bool) {
            let end = self.now + ms;
            while self.now < end {
                self.now += 100;
                self.lat += speed as f64 * 0.1 / 111_195.0;
                if moving {
                    self.motion = MotionState {
                        moving: true,
                        last_motion_ms: self.now,
                        delta_g: 0.2,
                    };
                } else {
                    self.motion.moving = false;
                }
                let f = self.fix(speed);
                self.t.tick(Some(&f), &self.motion, &self.idx, &self.bus, self.now);
                if self.t.needs_flush(self.now) {
                    if let Some(e) = self.t.flush(&mut self.fs, &self.bus, self.now) {
                        self.idx.upsert(e);
                    }
                }
            }
        }
    }

    #[test]
    fn test_arm_then_record_after_stable_fix() {
        let mut r = Rig::new();
        r.ride(1_000, 0.0, false);
        assert_eq!(r.t.state(), TrackerState::Idle, "no motion, no arming");
        r.ride(100, 10.0, true);
        assert_eq!(r.t.state(), TrackerState::Armed);
        r.ride(2_000, 10.0, true);
        assert_eq!(r.t.state(), TrackerState::Recording, "fix was stable since t=0.1 s");
        assert_eq!(r.t.session().unwrap().to_string(), "20260501-001");
    }

    #[test]
    fn test_armed_times_out_without_motion() {
        let mut r = Rig::new();
        r.t.cfg.min_hdop = 1.0;
        r.ride(100, 0.0, true);
        assert_eq!(r.t.state(), TrackerState::Armed);
        r.ride(59_800, 0.0, false);
        assert_eq!(r.t.state(), TrackerState::Armed);
        r.ride(300, 0.0, false);
        assert_eq!(r.t.state(), TrackerState::Idle);
        assert!(r.fs.paths().next().is_none(), "nothing written while armed");
    }

    #[test]
    fn test_decimation_spacing_follows_speed() {
        let mut r = Rig::new();
        r.ride(3_500, 10.0, true);
        assert_eq!(r.t.state(), TrackerState::Recording);
        let before = r.t.totals().points;
        // 10 m/s: spacing 20 m, i.e. one point per 2 s
        r.ride(20_000, 10.0, true);
        let added = r.t.totals().points - before;
        assert!((9..=11).contains(&added), "expected ~10 points, got {}", added);
    }

    #[test]
    fn test_stationary_gap_forces_point() {
        let mut r = Rig::new();
        r.ride(3_500, 0.0, true);
        let before = r.t.totals().points;
        r.ride(25_000, 0.0, true);
        assert_eq!(r.t.totals().points - before, 2, "one point per 10 s while still");
    }

    #[test]
    fn test_batches_reach_disk() {
        let mut r = Rig::new();
        r.ride(3_500, 20.0, true);
        r.ride(10_000, 20.0, true);
        let path = r.t.session_path().unwrap();
        let data = r.fs.file(&path).unwrap();
        let on_disk = gpx::parse(data).unwrap().point_count() as u32;
        assert!(on_disk + FLUSH_POINTS as u32 >= r.t.totals().points);
        assert!(on_disk > 0);
    }

    #[test]
    fn test_pause_resume_opens_segment_then_stop_closes() {
        let mut r = Rig::new();
        r.ride(3_500, 10.0, true);
        r.ride(5_000, 10.0, true);
        r.ride(180_000, 0.0, false);
        assert_eq!(r.t.state(), TrackerState::Paused);
        r.ride(5_000, 10.0, true);
        assert_eq!(r.t.state(), TrackerState::Recording);
        let path = r.t.session_path().unwrap();
        r.t.request_stop();
        r.ride(100, 10.0, true);
        assert_eq!(r.t.state(), TrackerState::Idle);

        let data = r.fs.file(&path).unwrap();
        assert!(gpx::is_closed(data));
        let trk = gpx::parse(data).unwrap();
        assert_eq!(trk.segments.len(), 2);
        assert!(!trk.segments[1].is_empty());
        assert_eq!(r.idx.len(), 1);
        assert_eq!(r.idx.entries()[0].points, r.t.totals().points);
    }

    #[test]
    fn test_media_full_closes_and_degrades() {
        let mut r = Rig::new();
        r.ride(3_500, 10.0, true);
        r.ride(4_000, 10.0, true);
        r.fs.fail_appends(Some(Error::MediaFull));
        r.ride(4_000, 10.0, true);
        assert_eq!(r.t.state(), TrackerState::Idle);
        assert!(r.bus.health().tracker_degraded);
        assert!(!r.bus.health().no_media);
        assert_eq!(r.idx.len(), 1, "flushed part still indexed");
        assert!(r.t.held_off(), "no new session on a full card");
        r.t.media_restored();
        r.fs.fail_appends(None);
        r.ride(100, 10.0, true);
        assert_eq!(r.t.state(), TrackerState::Armed);
    }

    #[test]
    fn test_torn_batch_cut_back_before_footer() {
        let mut r = Rig::new();
        r.ride(3_500, 10.0, true);
        r.ride(4_000, 10.0, true);
        let path = r.t.session_path().unwrap();
        let mut expected = r.fs.file(&path).unwrap().to_vec();
        // room for part of one point only
        r.fs.set_quota(Some(r.fs.used() + 60));
        r.ride(4_000, 10.0, true);
        assert_eq!(r.t.state(), TrackerState::Idle);
        assert!(r.bus.health().tracker_degraded);

        expected.extend_from_slice(gpx::FOOTER.as_bytes());
        let data = r.fs.file(&path).unwrap();
        assert!(data == &expected[..], "half a point left behind");
        assert!(gpx::parse(data).unwrap().point_count() > 0);
    }

    #[test]
    fn test_trail_ring_is_bounded() {
        let mut r = Rig::new();
        r.t = Tracker::new(TrackerConfig {
            ring_size: 16,
            ..TrackerConfig::default()
        });
        r.ride(3_500, 30.0, true);
        r.ride(60_000, 30.0, true);
        assert!(r.t.totals().points > 16);
        assert_eq!(r.t.trail_len(), 16);
    }

    #[test]
    fn test_user_start_waits_for_fix_not_motion() {
        let mut r = Rig::new();
        r.t.request_start();
        r.ride(120_000, 0.0, false);
        assert_eq!(r.t.state(), TrackerState::Recording);
        r.t.request_stop();
        r.ride(100, 0.0, false);
        assert_eq!(r.t.state(), TrackerState::Idle);
    }
}
