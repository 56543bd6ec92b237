// Snapshot types carried on the state bus
//
// Every type here is Copy: producers publish a whole value, consumers
// read a copy. Components share these types and the bus, nothing else.

use chrono::NaiveDateTime;
use core::fmt;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum FixQuality {
    #[default]
    None,
    Fix2D,
    Fix3D,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsFix {
    pub lat: f64,
    pub lon: f64,
    pub alt_m: f32,
    pub speed_mps: f32,
    // true degrees, [0, 360)
    pub course_deg: f32,
    // course held from an earlier fix (speed below smoothing threshold)
    pub course_stale: bool,
    pub hdop: f32,
    pub sats: u8,
    pub utc: NaiveDateTime,
    pub quality: FixQuality,
    // monotonic time the fix was assembled
    pub at_ms: u64,
}

impl GpsFix {
    // coordinates are only meaningful with a solution
    pub fn position(&self) -> Option<(f64, f64)> {
        match self.quality {
            FixQuality::None => None,
            _ => Some((self.lat, self.lon)),
        }
    }

    #[inline]
    pub fn has_fix(&self) -> bool {
        self.quality != FixQuality::None
    }

    #[inline]
    pub fn is_3d(&self) -> bool {
        self.quality == FixQuality::Fix3D
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImuSample {
    // g
    pub accel: [f32; 3],
    // microtesla
    pub mag: [f32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompassSample {
    // true degrees after declination, [0, 360)
    pub heading_deg: f32,
    pub roll_deg: f32,
    pub pitch_deg: f32,
    pub mag: [f32; 3],
    pub accel: [f32; 3],
    pub calibration_valid: bool,
    // heading repeats the last valid value
    pub stale: bool,
    pub at_ms: u64,
}

impl CompassSample {
    // heading usable for display
    #[inline]
    pub fn usable(&self) -> bool {
        self.calibration_valid && !self.stale
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationOffsets {
    pub offset: [f32; 3],
    pub scale: [f32; 3],
    pub declination_deg: f32,
    pub valid: bool,
    // Unix ms, 0 when unknown
    pub captured_ms: i64,
}

impl CalibrationOffsets {
    pub const fn identity() -> Self {
        Self {
            offset: [0.0; 3],
            scale: [1.0; 3],
            declination_deg: 0.0,
            valid: false,
            captured_ms: 0,
        }
    }

    #[inline]
    pub fn apply(&self, raw: [f32; 3]) -> [f32; 3] {
        [
            (raw[0] - self.offset[0]) * self.scale[0],
            (raw[1] - self.offset[1]) * self.scale[1],
            (raw[2] - self.offset[2]) * self.scale[2],
        ]
    }
}

impl Default for CalibrationOffsets {
    fn default() -> Self {
        Self::identity()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalPhase {
    Idle,
    LeftCircle,
    RightCircle,
    Done,
    Failed(Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationStatus {
    pub phase: CalPhase,
    pub phase_elapsed_ms: u32,
    pub phase_total_ms: u32,
    // mean yaw rate of the running phase, deg/s
    pub yaw_rate_dps: f32,
}

impl CalibrationStatus {
    pub const IDLE: Self = Self {
        phase: CalPhase::Idle,
        phase_elapsed_ms: 0,
        phase_total_ms: 0,
        yaw_rate_dps: 0.0,
    };

    pub fn running(&self) -> bool {
        matches!(self.phase, CalPhase::LeftCircle | CalPhase::RightCircle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionState {
    pub moving: bool,
    pub last_motion_ms: u64,
    // accel magnitude range over the window, g
    pub delta_g: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavState {
    pub waypoint: Option<Waypoint>,
    pub distance_m: f32,
    pub bearing_deg: f32,
    pub cross_track_m: f32,
    pub course_made_good_deg: f32,
    pub vmg_mps: f32,
    pub arrived: bool,
}

impl NavState {
    pub const EMPTY: Self = Self {
        waypoint: None,
        distance_m: 0.0,
        bearing_deg: 0.0,
        cross_track_m: 0.0,
        course_made_good_deg: 0.0,
        vmg_mps: 0.0,
        arrived: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    pub ele_m: f32,
    pub utc: NaiveDateTime,
    pub speed_mps: f32,
    pub course_deg: f32,
}

impl TrackPoint {
    pub fn from_fix(fix: &GpsFix) -> Self {
        Self {
            lat: fix.lat,
            lon: fix.lon,
            ele_m: fix.alt_m,
            utc: fix.utc,
            speed_mps: fix.speed_mps,
            course_deg: fix.course_deg,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackerState {
    #[default]
    Idle,
    Armed,
    Recording,
    Paused,
    Closing,
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrackerState::Idle => "idle",
            TrackerState::Armed => "armed",
            TrackerState::Recording => "recording",
            TrackerState::Paused => "paused",
            TrackerState::Closing => "closing",
        };
        f.write_str(s)
    }
}

// YYYYMMDD plus per-day sequence; ordering follows creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SessionId {
    pub date: u32,
    pub seq: u16,
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08}-{:03}", self.date, self.seq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackTotals {
    pub distance_m: f32,
    pub duration_s: u32,
    pub max_speed_mps: f32,
    pub ascent_m: f32,
    pub descent_m: f32,
    pub points: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingStatus {
    pub state: TrackerState,
    pub session: Option<SessionId>,
    pub totals: TrackTotals,
    // bumped whenever the trail ring changes
    pub trail_seq: u32,
}

impl TrackingStatus {
    pub const IDLE: Self = Self {
        state: TrackerState::Idle,
        session: None,
        totals: TrackTotals {
            distance_m: 0.0,
            duration_s: 0,
            max_speed_mps: 0.0,
            ascent_m: 0.0,
            descent_m: 0.0,
            points: 0,
        },
        trail_seq: 0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum PowerState {
    #[default]
    Active,
    Dim,
    Idle,
    LightSleep,
    DeepSleep,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PowerState::Active => "active",
            PowerState::Dim => "dim",
            PowerState::Idle => "idle",
            PowerState::LightSleep => "light-sleep",
            PowerState::DeepSleep => "deep-sleep",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpsMode {
    Rate(u8),
    Standby,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerPlan {
    pub backlight_pct: u8,
    pub gps: GpsMode,
    // 0 = compass off
    pub compass_hz: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerStatus {
    pub state: PowerState,
    pub plan: PowerPlan,
    // seconds left before the battery-critical shutdown
    pub shutdown_in_s: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BatteryLevel {
    Critical,
    Low,
    Ok,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerSource {
    Vehicle,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryReading {
    pub volts: f32,
    pub level: BatteryLevel,
    pub source: PowerSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomMode {
    Auto,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomState {
    pub mode: ZoomMode,
    // eased zoom actually drawn
    pub z: f32,
    pub target: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Health {
    pub gps_unhealthy: bool,
    pub compass_degraded: bool,
    pub buttons_degraded: bool,
    pub battery_degraded: bool,
    pub tracker_degraded: bool,
    pub no_media: bool,
    pub cache_exhausted: bool,
    pub button_overflow: bool,
    pub battery_critical: bool,
}

impl Health {
    pub fn any(&self) -> bool {
        *self != Health::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiScreen {
    #[default]
    Map,
    Menu,
    Calibration,
    Connect,
    TrackList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UiState {
    pub screen: UiScreen,
    pub night: bool,
    pub brightness_pct: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonId {
    Up,
    Down,
    Left,
    Right,
    Center,
    ZoomIn,
    ZoomOut,
    Waypoint,
}

impl ButtonId {
    pub const ALL: [ButtonId; 8] = [
        ButtonId::Up,
        ButtonId::Down,
        ButtonId::Left,
        ButtonId::Right,
        ButtonId::Center,
        ButtonId::ZoomIn,
        ButtonId::ZoomOut,
        ButtonId::Waypoint,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonKind {
    Press,
    Release,
    HoldStart,
    HoldTick,
    DoubleClick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub id: ButtonId,
    pub kind: ButtonKind,
    pub at_ms: u64,
}
