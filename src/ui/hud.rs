// Map HUD: a status strip on top, speed and target at the bottom
//
//   top:    [REC|PAUSE|ARM] [degradation glyphs] [zoom] [battery]
//   bottom: [speed km/h]              [waypoint | NO FIX | SHUTDOWN]
//
// Everything shown is quantised into a HudModel first; a bar is only
// redrawn when its part of the model changed. Degradations are single
// glyphs, never a modal.

use embedded_graphics::mono_font::ascii::{FONT_6X13_BOLD, FONT_8X13_BOLD, FONT_10X20};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use libm::roundf;

use super::label::Label;
use super::palette::Palette;
use super::stack_fmt::StackFmt;
use super::widget::{Alignment, Region};
use super::{BOTTOM_BAR, SCREEN_W, TOP_BAR};
use crate::drivers::framebuffer::Framebuffer;
use crate::state::{
    BatteryLevel, BatteryReading, GpsFix, Health, NavState, PowerStatus, TrackerState, ZoomMode,
    ZoomState,
};

const BADGE: Region = Region::new(4, 4, 60, 20);
const GLYPHS: Region = Region::new(70, 0, 110, 28);
const ZOOM: Region = Region::new(182, 0, 44, 28);
const BATT_TEXT: Region = Region::new(228, 0, 56, 28);
const BATT_ICON: Region = Region::new(288, 8, 26, 12);

const SPEED: Region = Region::new(8, BOTTOM_BAR.y, 80, BOTTOM_BAR.h);
const SPEED_UNIT: Region = Region::new(88, BOTTOM_BAR.y + 14, 40, 20);
const TARGET: Region = Region::new(128, BOTTOM_BAR.y, SCREEN_W - 136, BOTTOM_BAR.h);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HudModel {
    // None: no fix
    pub speed_kmh: Option<u16>,
    // centivolts, level
    pub battery: Option<(u16, BatteryLevel)>,
    pub zoom: u8,
    pub zoom_auto: bool,
    pub tracking: TrackerState,
    pub health: Health,
    // metres, degrees
    pub waypoint: Option<(u32, u16)>,
    pub arrived: bool,
    pub shutdown_in_s: Option<u8>,
    pub night: bool,
}

pub struct HudInput<'a> {
    pub fix: Option<&'a GpsFix>,
    pub nav: &'a NavState,
    pub tracking: TrackerState,
    pub battery: Option<BatteryReading>,
    pub zoom: ZoomState,
    pub health: Health,
    pub power: Option<PowerStatus>,
    pub night: bool,
}

impl HudModel {
    pub fn build(input: &HudInput<'_>) -> Self {
        let fix = input.fix.filter(|f| f.has_fix());
        Self {
            speed_kmh: fix.map(|f| roundf(f.speed_mps.max(0.0) * 3.6) as u16),
            battery: input
                .battery
                .map(|b| (roundf(b.volts * 10.0) as u16 * 10, b.level)),
            zoom: input.zoom.target,
            zoom_auto: input.zoom.mode == ZoomMode::Auto,
            tracking: input.tracking,
            health: input.health,
            waypoint: input.nav.waypoint.filter(|_| fix.is_some()).map(|_| {
                (
                    input.nav.distance_m.max(0.0) as u32,
                    roundf(input.nav.bearing_deg) as u16 % 360,
                )
            }),
            arrived: input.nav.arrived,
            shutdown_in_s: input.power.and_then(|p| p.shutdown_in_s),
            night: input.night,
        }
    }

    fn top(&self) -> (Option<(u16, BatteryLevel)>, u8, bool, TrackerState, Health, bool) {
        (
            self.battery,
            self.zoom,
            self.zoom_auto,
            self.tracking,
            self.health,
            self.night,
        )
    }

    fn bottom(&self) -> (Option<u16>, Option<(u32, u16)>, bool, Option<u8>, bool) {
        (
            self.speed_kmh,
            self.waypoint,
            self.arrived,
            self.shutdown_in_s,
            self.night,
        )
    }
}

// one glyph per raised degradation flag
pub fn health_glyphs(h: &Health) -> StackFmt<12> {
    let mut s = StackFmt::new();
    let flags = [
        (h.gps_unhealthy, 'G'),
        (h.compass_degraded, 'C'),
        (h.tracker_degraded, 'T'),
        (h.no_media, 'M'),
        (h.cache_exhausted, 'X'),
        (h.battery_degraded, 'V'),
        (h.buttons_degraded, 'B'),
        (h.button_overflow, 'Q'),
    ];
    for (_, c) in flags.iter().filter(|(on, _)| *on) {
        let _ = core::fmt::Write::write_char(&mut s, *c);
    }
    s
}

pub fn distance_text(m: u32) -> StackFmt<12> {
    if m < 1_000 {
        StackFmt::from_args(format_args!("{} m", m))
    } else if m < 10_000 {
        StackFmt::from_args(format_args!("{}.{} km", m / 1_000, (m % 1_000) / 100))
    } else {
        StackFmt::from_args(format_args!("{} km", m / 1_000))
    }
}

pub struct Hud {
    drawn: Option<HudModel>,
}

impl Hud {
    pub const fn new() -> Self {
        Self { drawn: None }
    }

    // after another screen painted over the bars
    pub fn invalidate(&mut self) {
        self.drawn = None;
    }

    pub fn drawn(&self) -> Option<HudModel> {
        self.drawn
    }

    // draw the bars that changed; true when anything was drawn
    pub fn render(&mut self, fb: &mut Framebuffer, model: &HudModel) -> bool {
        let pal = Palette::for_mode(model.night);
        let top = self.drawn.is_none_or(|d| d.top() != model.top());
        let bottom = self.drawn.is_none_or(|d| d.bottom() != model.bottom());
        if top {
            draw_top(fb, model, pal);
            fb.mark_dirty(TOP_BAR);
        }
        if bottom {
            draw_bottom(fb, model, pal);
            fb.mark_dirty(BOTTOM_BAR);
        }
        self.drawn = Some(*model);
        top || bottom
    }
}

impl Default for Hud {
    fn default() -> Self {
        Self::new()
    }
}

fn fill(fb: &mut Framebuffer, r: Region, c: Rgb565) {
    let _ = r.to_rect().into_styled(PrimitiveStyle::with_fill(c)).draw(fb);
}

fn draw_top(fb: &mut Framebuffer, m: &HudModel, pal: &Palette) {
    fill(fb, TOP_BAR, pal.bar_bg);

    let badge = match m.tracking {
        TrackerState::Recording | TrackerState::Closing => Some(("REC", pal.rec)),
        TrackerState::Paused => Some(("PAUSE", pal.warn)),
        TrackerState::Armed => Some(("ARM", pal.dim_text)),
        TrackerState::Idle => None,
    };
    if let Some((text, bg)) = badge {
        let _ = Label::new(BADGE, &FONT_8X13_BOLD, pal.bar_bg)
            .alignment(Alignment::Center)
            .background(bg)
            .draw(fb, text);
    }

    let glyphs = health_glyphs(&m.health);
    let _ = Label::new(GLYPHS, &FONT_8X13_BOLD, pal.warn)
        .alignment(Alignment::Center)
        .draw(fb, glyphs.as_str());

    let zoom: StackFmt<6> =
        StackFmt::from_args(format_args!("{}{}", if m.zoom_auto { 'z' } else { 'Z' }, m.zoom));
    let _ = Label::new(ZOOM, &FONT_8X13_BOLD, pal.text)
        .alignment(Alignment::Center)
        .draw(fb, zoom.as_str());

    let Some((cv, level)) = m.battery else {
        let _ = Label::new(BATT_TEXT, &FONT_6X13_BOLD, pal.dim_text)
            .alignment(Alignment::Center)
            .draw(fb, "--.-V");
        return;
    };
    let volts: StackFmt<8> = StackFmt::from_args(format_args!("{}.{}V", cv / 100, (cv % 100) / 10));
    let (color, bars) = match level {
        BatteryLevel::Critical => (pal.alert, 0),
        BatteryLevel::Low => (pal.warn, 1),
        BatteryLevel::Ok => (pal.text, 3),
        BatteryLevel::Full => (pal.text, 4),
    };
    let _ = Label::new(BATT_TEXT, &FONT_6X13_BOLD, color)
        .alignment(Alignment::Center)
        .draw(fb, volts.as_str());
    let _ = BATT_ICON
        .to_rect()
        .into_styled(PrimitiveStyle::with_stroke(color, 1))
        .draw(fb);
    for i in 0..bars {
        let cell = Rectangle::new(
            Point::new(BATT_ICON.x as i32 + 2 + i * 6, BATT_ICON.y as i32 + 2),
            Size::new(4, BATT_ICON.h as u32 - 4),
        );
        let _ = cell.into_styled(PrimitiveStyle::with_fill(color)).draw(fb);
    }
}

fn draw_bottom(fb: &mut Framebuffer, m: &HudModel, pal: &Palette) {
    fill(fb, BOTTOM_BAR, pal.bar_bg);

    let speed = match m.speed_kmh {
        Some(v) => StackFmt::<8>::from_args(format_args!("{}", v)),
        None => StackFmt::from_args(format_args!("--")),
    };
    let _ = Label::new(SPEED, &FONT_10X20, pal.text)
        .alignment(Alignment::BottomRight)
        .draw(fb, speed.as_str());
    let _ = Label::new(SPEED_UNIT, &FONT_6X13_BOLD, pal.dim_text).draw(fb, "km/h");

    let target = Label::new(TARGET, &FONT_10X20, pal.text).alignment(Alignment::Center);
    if let Some(s) = m.shutdown_in_s {
        let text: StackFmt<16> = StackFmt::from_args(format_args!("SHUTDOWN {}s", s));
        let _ = target.background(pal.alert).draw(fb, text.as_str());
    } else if m.speed_kmh.is_none() {
        let _ = Label::new(TARGET, &FONT_10X20, pal.alert)
            .alignment(Alignment::Center)
            .draw(fb, "NO FIX");
    } else if m.arrived {
        let _ = target.draw(fb, "ARRIVED");
    } else if let Some((dist, brg)) = m.waypoint {
        let text: StackFmt<20> =
            StackFmt::from_args(format_args!("{} {:03}", distance_text(dist), brg));
        let _ = target.draw(fb, text.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{FixQuality, PowerPlan, PowerState, Waypoint, GpsMode};
    use chrono::NaiveDate;

    fn fix(speed_mps: f32) -> GpsFix {
        GpsFix {
            lat: 47.0,
            lon: 8.0,
            alt_m: 400.0,
            speed_mps,
            course_deg: 10.0,
            course_stale: false,
            hdop: 1.0,
            sats: 9,
            utc: NaiveDate::from_ymd_opt(2026, 5, 1)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            quality: FixQuality::Fix3D,
            at_ms: 0,
        }
    }

    fn input<'a>(fix: Option<&'a GpsFix>, nav: &'a NavState) -> HudInput<'a> {
        HudInput {
            fix,
            nav,
            tracking: TrackerState::Idle,
            battery: None,
            zoom: ZoomState {
                mode: ZoomMode::Auto,
                z: 16.0,
                target: 16,
            },
            health: Health::default(),
            power: None,
            night: false,
        }
    }

    #[test]
    fn test_model_quantises() {
        let f = fix(40.0 / 3.6);
        let mut nav = NavState::EMPTY;
        nav.waypoint = Some(Waypoint { lat: 47.1, lon: 8.0 });
        nav.distance_m = 11_119.5;
        nav.bearing_deg = 359.7;
        let m = HudModel::build(&input(Some(&f), &nav));
        assert_eq!(m.speed_kmh, Some(40));
        assert_eq!(m.waypoint, Some((11_119, 0)), "bearing wraps to 000");

        let m = HudModel::build(&input(None, &nav));
        assert_eq!(m.speed_kmh, None, "no fix");
        assert_eq!(m.waypoint, None);
    }

    #[test]
    fn test_glyphs_and_distance() {
        let h = Health {
            tracker_degraded: true,
            gps_unhealthy: true,
            no_media: true,
            ..Health::default()
        };
        assert_eq!(health_glyphs(&h).as_str(), "GTM");
        assert_eq!(health_glyphs(&Health::default()).as_str(), "");
        assert_eq!(distance_text(850).as_str(), "850 m");
        assert_eq!(distance_text(1_250).as_str(), "1.2 km");
        assert_eq!(distance_text(42_900).as_str(), "42 km");
    }

    #[test]
    fn test_only_changed_bar_redraws() {
        let nav = NavState::EMPTY;
        let f = fix(10.0);
        let mut fb = Framebuffer::new(320, 480);
        let mut hud = Hud::new();
        let mut m = HudModel::build(&input(Some(&f), &nav));
        assert!(hud.render(&mut fb, &m));
        assert_eq!(fb.dirty(), TOP_BAR.union(BOTTOM_BAR));
        let _ = fb.flush(&mut crate::drivers::panel::tests::NullPanel);

        assert!(!hud.render(&mut fb, &m), "unchanged");
        m.speed_kmh = Some(50);
        assert!(hud.render(&mut fb, &m));
        assert_eq!(fb.dirty(), BOTTOM_BAR);
    }

    #[test]
    fn test_countdown_from_power_status() {
        let nav = NavState::EMPTY;
        let f = fix(0.0);
        let mut i = input(Some(&f), &nav);
        i.power = Some(PowerStatus {
            state: PowerState::Active,
            plan: PowerPlan {
                backlight_pct: 100,
                gps: GpsMode::Rate(10),
                compass_hz: 20,
            },
            shutdown_in_s: Some(7),
        });
        assert_eq!(HudModel::build(&i).shutdown_in_s, Some(7));
    }
}
