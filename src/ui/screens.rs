// Screen set and button handling
// Screens are concrete types dispatched by with_screen! (no dyn).
// A screen never touches the components: it returns a Command and the
// system applies it. Map draws through the map renderer and the HUD;
// the other screens paint the whole panel.

use core::fmt::Write as _;

use embedded_graphics::mono_font::MonoFont;
use embedded_graphics::mono_font::ascii::{FONT_6X13, FONT_8X13, FONT_10X20};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};

use super::label::Label;
use super::palette::Palette;
use super::stack_fmt::StackFmt;
use super::widget::{Alignment, Region, wrap_next, wrap_prev};
use super::{SCREEN_H, SCREEN_W};
use crate::drivers::framebuffer::Framebuffer;
use crate::hotspot::HotspotStatus;
use crate::state::{
    ButtonEvent, ButtonId, ButtonKind, CalPhase, CalibrationStatus, TrackerState, TrackingStatus,
    UiScreen,
};
use crate::track::IndexEntry;

const TITLE: Region = Region::new(0, 0, SCREEN_W, 40);
const ROW_H: u16 = 40;
const LIST_TOP: u16 = 48;
const LIST_ROWS: usize = ((SCREEN_H - LIST_TOP) / ROW_H) as usize;
const BRIGHTNESS_STEP: i8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Goto(UiScreen),
    ZoomIn,
    ZoomOut,
    ZoomAuto,
    ToggleRecording,
    Brightness(i8),
    DropWaypoint,
    CycleTarget,
    RetryCalibration,
    ToggleNight,
    DeepSleep,
}

// what the screens show; rebuilt by the system each frame
pub struct UiModel<'a> {
    pub tracking: TrackingStatus,
    pub calibration: CalibrationStatus,
    pub hotspot: HotspotStatus,
    pub tracks: &'a [IndexEntry],
    pub night: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redraw {
    None,
    Full,
}

pub struct UiContext {
    redraw: Redraw,
}

impl UiContext {
    pub const fn new() -> Self {
        Self {
            redraw: Redraw::Full,
        }
    }

    pub fn request_full_redraw(&mut self) {
        self.redraw = Redraw::Full;
    }

    pub fn take_redraw(&mut self) -> Redraw {
        let r = self.redraw;
        self.redraw = Redraw::None;
        r
    }
}

impl Default for UiContext {
    fn default() -> Self {
        Self::new()
    }
}

pub trait Screen {
    fn on_enter(&mut self, ctx: &mut UiContext) {
        ctx.request_full_redraw();
    }

    fn on_event(&mut self, ev: ButtonEvent, model: &UiModel<'_>, ctx: &mut UiContext)
    -> Option<Command>;

    // once per frame; request a redraw when something shown changed
    fn refresh(&mut self, _model: &UiModel<'_>, _ctx: &mut UiContext) {}

    fn draw(&self, fb: &mut Framebuffer, model: &UiModel<'_>);
}

// ---- map --------------------------------------------------------

#[derive(Default)]
pub struct MapScreen {
    center_held: bool,
    waypoint_held: bool,
}

impl Screen for MapScreen {
    fn on_event(&mut self, ev: ButtonEvent, _m: &UiModel<'_>, _ctx: &mut UiContext) -> Option<Command> {
        use ButtonId::*;
        use ButtonKind::*;
        match (ev.id, ev.kind) {
            (ZoomIn, Press) => Some(Command::ZoomIn),
            (ZoomIn, DoubleClick) => Some(Command::ZoomAuto),
            (ZoomOut, Press | DoubleClick) => Some(Command::ZoomOut),
            (Up, Press | HoldTick) => Some(Command::Brightness(BRIGHTNESS_STEP)),
            (Down, Press | HoldTick) => Some(Command::Brightness(-BRIGHTNESS_STEP)),
            (Center, Press | DoubleClick) => {
                self.center_held = false;
                None
            }
            (Center, HoldStart) => {
                self.center_held = true;
                Some(Command::ToggleRecording)
            }
            (Center, Release) if !self.center_held => Some(Command::Goto(UiScreen::Menu)),
            (Waypoint, Press | DoubleClick) => {
                self.waypoint_held = false;
                None
            }
            (Waypoint, HoldStart) => {
                self.waypoint_held = true;
                Some(Command::CycleTarget)
            }
            (Waypoint, Release) if !self.waypoint_held => Some(Command::DropWaypoint),
            _ => None,
        }
    }

    // map pixels come from the renderer and the HUD
    fn draw(&self, _fb: &mut Framebuffer, _model: &UiModel<'_>) {}
}

// ---- menu -------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    Record,
    Calibrate,
    Transfer,
    Tracks,
    DayNight,
    DeepSleep,
    Back,
}

pub const MENU: [MenuItem; 7] = [
    MenuItem::Record,
    MenuItem::Calibrate,
    MenuItem::Transfer,
    MenuItem::Tracks,
    MenuItem::DayNight,
    MenuItem::DeepSleep,
    MenuItem::Back,
];

impl MenuItem {
    fn label(self, model: &UiModel<'_>) -> &'static str {
        match self {
            MenuItem::Record if model.tracking.state == TrackerState::Idle => "Start recording",
            MenuItem::Record => "Stop recording",
            MenuItem::Calibrate => "Calibrate compass",
            MenuItem::Transfer => "Wi-Fi transfer",
            MenuItem::Tracks => "Tracks",
            MenuItem::DayNight if model.night => "Day mode",
            MenuItem::DayNight => "Night mode",
            MenuItem::DeepSleep => "Deep sleep",
            MenuItem::Back => "Back",
        }
    }
}

#[derive(Default)]
pub struct MenuScreen {
    selected: usize,
    // (idle, night) as last drawn
    shown: Option<(bool, bool)>,
}

impl MenuScreen {
    pub fn selected(&self) -> MenuItem {
        MENU[self.selected]
    }
}

impl Screen for MenuScreen {
    fn on_enter(&mut self, ctx: &mut UiContext) {
        self.selected = 0;
        ctx.request_full_redraw();
    }

    fn on_event(&mut self, ev: ButtonEvent, _m: &UiModel<'_>, ctx: &mut UiContext) -> Option<Command> {
        if !matches!(ev.kind, ButtonKind::Press | ButtonKind::HoldTick | ButtonKind::DoubleClick) {
            return None;
        }
        match ev.id {
            ButtonId::Down => {
                self.selected = wrap_next(self.selected, MENU.len());
                ctx.request_full_redraw();
                None
            }
            ButtonId::Up => {
                self.selected = wrap_prev(self.selected, MENU.len());
                ctx.request_full_redraw();
                None
            }
            ButtonId::Left => Some(Command::Goto(UiScreen::Map)),
            ButtonId::Center | ButtonId::Right => Some(match self.selected() {
                MenuItem::Record => Command::ToggleRecording,
                MenuItem::Calibrate => Command::Goto(UiScreen::Calibration),
                MenuItem::Transfer => Command::Goto(UiScreen::Connect),
                MenuItem::Tracks => Command::Goto(UiScreen::TrackList),
                MenuItem::DayNight => Command::ToggleNight,
                MenuItem::DeepSleep => Command::DeepSleep,
                MenuItem::Back => Command::Goto(UiScreen::Map),
            }),
            _ => None,
        }
    }

    fn refresh(&mut self, model: &UiModel<'_>, ctx: &mut UiContext) {
        let now = (model.tracking.state == TrackerState::Idle, model.night);
        if self.shown != Some(now) {
            self.shown = Some(now);
            ctx.request_full_redraw();
        }
    }

    fn draw(&self, fb: &mut Framebuffer, model: &UiModel<'_>) {
        let pal = Palette::for_mode(model.night);
        background(fb, pal, "Menu");
        for (i, item) in MENU.iter().enumerate() {
            list_row(fb, pal, i, item.label(model), i == self.selected);
        }
    }
}

// ---- calibration ------------------------------------------------

#[derive(Default)]
pub struct CalibrationScreen {
    // (phase, whole seconds) as last drawn
    shown: Option<(CalPhase, u32)>,
}

impl Screen for CalibrationScreen {
    fn on_event(&mut self, ev: ButtonEvent, m: &UiModel<'_>, _ctx: &mut UiContext) -> Option<Command> {
        if ev.kind != ButtonKind::Press {
            return None;
        }
        match (ev.id, m.calibration.phase) {
            (ButtonId::Left, _) => Some(Command::Goto(UiScreen::Menu)),
            (ButtonId::Center, CalPhase::Failed(_)) => Some(Command::RetryCalibration),
            (ButtonId::Center, CalPhase::Done) => Some(Command::Goto(UiScreen::Map)),
            _ => None,
        }
    }

    fn refresh(&mut self, model: &UiModel<'_>, ctx: &mut UiContext) {
        let c = &model.calibration;
        let now = (c.phase, c.phase_elapsed_ms / 1000);
        if self.shown != Some(now) {
            self.shown = Some(now);
            ctx.request_full_redraw();
        }
    }

    fn draw(&self, fb: &mut Framebuffer, model: &UiModel<'_>) {
        let pal = Palette::for_mode(model.night);
        background(fb, pal, "Compass calibration");
        let c: &CalibrationStatus = &model.calibration;
        let (line1, line2): (&str, &str) = match c.phase {
            CalPhase::Idle => ("Starting...", ""),
            CalPhase::LeftCircle => ("Ride a slow LEFT circle", "keep turning until the bar fills"),
            CalPhase::RightCircle => ("Now a RIGHT circle", "keep turning until the bar fills"),
            CalPhase::Done => ("Calibration saved", "centre: back to map"),
            CalPhase::Failed(_) => ("Calibration failed", "centre: retry   left: cancel"),
        };
        text_line(fb, 0, line1, &FONT_10X20, pal.text);
        text_line(fb, 1, line2, &FONT_6X13, pal.dim_text);

        if let CalPhase::Failed(e) = c.phase {
            let why: StackFmt<32> = StackFmt::from_args(format_args!("reason: {}", e));
            text_line(fb, 3, why.as_str(), &FONT_8X13, pal.warn);
            return;
        }
        if c.running() && c.phase_total_ms > 0 {
            let bar = Region::new(20, LIST_TOP + 2 * ROW_H + 8, SCREEN_W - 40, 16);
            let _ = bar
                .to_rect()
                .into_styled(PrimitiveStyle::with_stroke(pal.text, 1))
                .draw(fb);
            let filled = (bar.w as u32 - 4) * c.phase_elapsed_ms.min(c.phase_total_ms) / c.phase_total_ms;
            let _ = Rectangle::new(
                Point::new(bar.x as i32 + 2, bar.y as i32 + 2),
                Size::new(filled, bar.h as u32 - 4),
            )
            .into_styled(PrimitiveStyle::with_fill(pal.highlight))
            .draw(fb);
            let rate: StackFmt<24> =
                StackFmt::from_args(format_args!("yaw {:.0} deg/s", c.yaw_rate_dps.abs()));
            text_line(fb, 4, rate.as_str(), &FONT_8X13, pal.dim_text);
        }
    }
}

// ---- connect ----------------------------------------------------

#[derive(Default)]
pub struct ConnectScreen {
    shown: Option<HotspotStatus>,
}

impl Screen for ConnectScreen {
    fn on_event(&mut self, ev: ButtonEvent, _m: &UiModel<'_>, _ctx: &mut UiContext) -> Option<Command> {
        match (ev.id, ev.kind) {
            (ButtonId::Left | ButtonId::Center, ButtonKind::Press) => Some(Command::Goto(UiScreen::Menu)),
            _ => None,
        }
    }

    fn refresh(&mut self, model: &UiModel<'_>, ctx: &mut UiContext) {
        if self.shown != Some(model.hotspot) {
            self.shown = Some(model.hotspot);
            ctx.request_full_redraw();
        }
    }

    fn draw(&self, fb: &mut Framebuffer, model: &UiModel<'_>) {
        let pal = Palette::for_mode(model.night);
        background(fb, pal, "Wi-Fi transfer");
        let h = &model.hotspot;
        if !h.active {
            text_line(fb, 0, "Hotspot unavailable", &FONT_10X20, pal.warn);
            text_line(fb, 1, "left: back", &FONT_6X13, pal.dim_text);
            return;
        }
        let mut line: StackFmt<40> = StackFmt::new();
        let _ = write!(line, "SSID  {}", h.ssid.as_str());
        text_line(fb, 0, line.as_str(), &FONT_10X20, pal.text);
        line.clear();
        let _ = write!(line, "Pass  {}", h.password.as_str());
        text_line(fb, 1, line.as_str(), &FONT_10X20, pal.text);
        line.clear();
        let _ = write!(line, "{} client(s) connected", h.clients);
        text_line(fb, 3, line.as_str(), &FONT_8X13, pal.dim_text);
        text_line(fb, 5, "left: stop and go back", &FONT_6X13, pal.dim_text);
    }
}

// ---- track list -------------------------------------------------

#[derive(Default)]
pub struct TrackListScreen {
    // index into the newest-first view
    selected: usize,
    top: usize,
    shown_len: Option<usize>,
}

impl TrackListScreen {
    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn top(&self) -> usize {
        self.top
    }

    fn scroll_into_view(&mut self) {
        if self.selected < self.top {
            self.top = self.selected;
        } else if self.selected >= self.top + LIST_ROWS {
            self.top = self.selected + 1 - LIST_ROWS;
        }
    }
}

pub fn track_row(e: &IndexEntry) -> StackFmt<40> {
    let name = e.file.strip_suffix(".gpx").unwrap_or(&e.file);
    let km10 = (e.distance_m / 100.0) as u32;
    StackFmt::from_args(format_args!(
        "{} {:>3}.{} km {}:{:02}",
        name,
        km10 / 10,
        km10 % 10,
        e.duration_s / 3600,
        (e.duration_s / 60) % 60
    ))
}

impl Screen for TrackListScreen {
    fn on_enter(&mut self, ctx: &mut UiContext) {
        self.selected = 0;
        self.top = 0;
        ctx.request_full_redraw();
    }

    fn on_event(&mut self, ev: ButtonEvent, m: &UiModel<'_>, ctx: &mut UiContext) -> Option<Command> {
        if !matches!(ev.kind, ButtonKind::Press | ButtonKind::HoldTick | ButtonKind::DoubleClick) {
            return None;
        }
        let n = m.tracks.len();
        match ev.id {
            ButtonId::Down if self.selected + 1 < n => {
                self.selected += 1;
                self.scroll_into_view();
                ctx.request_full_redraw();
                None
            }
            ButtonId::Up if self.selected > 0 => {
                self.selected -= 1;
                self.scroll_into_view();
                ctx.request_full_redraw();
                None
            }
            ButtonId::Left | ButtonId::Center => Some(Command::Goto(UiScreen::Menu)),
            _ => None,
        }
    }

    fn refresh(&mut self, model: &UiModel<'_>, ctx: &mut UiContext) {
        let n = model.tracks.len();
        if self.shown_len != Some(n) {
            self.shown_len = Some(n);
            self.selected = self.selected.min(n.saturating_sub(1));
            self.scroll_into_view();
            ctx.request_full_redraw();
        }
    }

    fn draw(&self, fb: &mut Framebuffer, model: &UiModel<'_>) {
        let pal = Palette::for_mode(model.night);
        background(fb, pal, "Tracks");
        if model.tracks.is_empty() {
            text_line(fb, 0, "No tracks recorded", &FONT_10X20, pal.dim_text);
            return;
        }
        let newest_first = model.tracks.iter().rev();
        for (row, (i, e)) in newest_first.enumerate().skip(self.top).take(LIST_ROWS).enumerate() {
            list_row(fb, pal, row, track_row(e).as_str(), i == self.selected);
        }
    }
}

// ---- screen set -------------------------------------------------

pub struct Screens {
    pub active: UiScreen,
    pub map: MapScreen,
    pub menu: MenuScreen,
    pub calibration: CalibrationScreen,
    pub connect: ConnectScreen,
    pub tracks: TrackListScreen,
    pub ctx: UiContext,
}

macro_rules! with_screen {
    ($screens:expr, |$s:ident| $body:expr) => {
        match $screens.active {
            UiScreen::Map => {
                let $s = &mut $screens.map;
                $body
            }
            UiScreen::Menu => {
                let $s = &mut $screens.menu;
                $body
            }
            UiScreen::Calibration => {
                let $s = &mut $screens.calibration;
                $body
            }
            UiScreen::Connect => {
                let $s = &mut $screens.connect;
                $body
            }
            UiScreen::TrackList => {
                let $s = &mut $screens.tracks;
                $body
            }
        }
    };
}

impl Screens {
    pub fn new() -> Self {
        Self {
            active: UiScreen::Map,
            map: MapScreen::default(),
            menu: MenuScreen::default(),
            calibration: CalibrationScreen::default(),
            connect: ConnectScreen::default(),
            tracks: TrackListScreen::default(),
            ctx: UiContext::new(),
        }
    }

    pub fn active(&self) -> UiScreen {
        self.active
    }

    pub fn goto(&mut self, screen: UiScreen) {
        if screen == self.active {
            return;
        }
        log::info!("ui: {:?} -> {:?}", self.active, screen);
        self.active = screen;
        with_screen!(self, |s| s.on_enter(&mut self.ctx));
    }

    pub fn handle(&mut self, ev: ButtonEvent, model: &UiModel<'_>) -> Option<Command> {
        with_screen!(self, |s| s.on_event(ev, model, &mut self.ctx))
    }

    pub fn refresh(&mut self, model: &UiModel<'_>) {
        with_screen!(self, |s| s.refresh(model, &mut self.ctx));
    }

    // full-panel screens only; true when the frame was repainted
    pub fn draw(&mut self, fb: &mut Framebuffer, model: &UiModel<'_>) -> bool {
        if self.active == UiScreen::Map || self.ctx.take_redraw() == Redraw::None {
            return false;
        }
        with_screen!(self, |s| s.draw(fb, model));
        fb.mark_dirty(fb.bounds());
        true
    }
}

impl Default for Screens {
    fn default() -> Self {
        Self::new()
    }
}

fn background(fb: &mut Framebuffer, pal: &Palette, title: &str) {
    let _ = fb.clear(pal.screen_bg);
    let _ = Label::new(TITLE, &FONT_10X20, pal.text)
        .alignment(Alignment::Center)
        .background(pal.bar_bg)
        .draw(fb, title);
}

fn row_region(row: usize) -> Region {
    Region::new(0, LIST_TOP + row as u16 * ROW_H, SCREEN_W, ROW_H)
}

fn list_row(fb: &mut Framebuffer, pal: &Palette, row: usize, text: &str, selected: bool) {
    let r = row_region(row);
    let inner = Region::new(r.x + 12, r.y, r.w - 24, r.h);
    let label = if selected {
        Label::new(inner, &FONT_10X20, pal.screen_bg).background(pal.highlight)
    } else {
        Label::new(inner, &FONT_10X20, pal.text)
    };
    let _ = label.alignment(Alignment::Center).draw(fb, text);
}

fn text_line(fb: &mut Framebuffer, row: usize, text: &str, font: &'static MonoFont<'static>, color: Rgb565) {
    let r = row_region(row);
    let _ = Label::new(Region::new(12, r.y, r.w - 24, r.h), font, color)
        .alignment(Alignment::Center)
        .draw(fb, text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CalibrationStatus;

    fn ev(id: ButtonId, kind: ButtonKind) -> ButtonEvent {
        ButtonEvent { id, kind, at_ms: 0 }
    }

    fn model(tracks: &[IndexEntry]) -> UiModel<'_> {
        UiModel {
            tracking: TrackingStatus::IDLE,
            calibration: CalibrationStatus::IDLE,
            hotspot: HotspotStatus::default(),
            tracks,
            night: false,
        }
    }

    fn entry(file: &str) -> IndexEntry {
        IndexEntry {
            file: file.into(),
            duration_s: 3_900,
            distance_m: 12_345.0,
            max_speed_mps: 20.0,
            points: 100,
        }
    }

    #[test]
    fn test_map_buttons() {
        let m = model(&[]);
        let mut s = Screens::new();
        assert_eq!(s.handle(ev(ButtonId::ZoomOut, ButtonKind::Press), &m), Some(Command::ZoomOut));
        assert_eq!(s.handle(ev(ButtonId::ZoomIn, ButtonKind::DoubleClick), &m), Some(Command::ZoomAuto));

        // hold toggles recording, the release after it does nothing
        assert_eq!(s.handle(ev(ButtonId::Center, ButtonKind::Press), &m), None);
        assert_eq!(s.handle(ev(ButtonId::Center, ButtonKind::HoldStart), &m), Some(Command::ToggleRecording));
        assert_eq!(s.handle(ev(ButtonId::Center, ButtonKind::Release), &m), None);
        // a short click opens the menu
        s.handle(ev(ButtonId::Center, ButtonKind::Press), &m);
        assert_eq!(
            s.handle(ev(ButtonId::Center, ButtonKind::Release), &m),
            Some(Command::Goto(UiScreen::Menu))
        );

        s.handle(ev(ButtonId::Waypoint, ButtonKind::Press), &m);
        assert_eq!(s.handle(ev(ButtonId::Waypoint, ButtonKind::Release), &m), Some(Command::DropWaypoint));
        s.handle(ev(ButtonId::Waypoint, ButtonKind::Press), &m);
        assert_eq!(s.handle(ev(ButtonId::Waypoint, ButtonKind::HoldStart), &m), Some(Command::CycleTarget));
        assert_eq!(s.handle(ev(ButtonId::Up, ButtonKind::Press), &m), Some(Command::Brightness(10)));
    }

    #[test]
    fn test_menu_navigation_wraps() {
        let m = model(&[]);
        let mut s = Screens::new();
        s.goto(UiScreen::Menu);
        assert_eq!(s.menu.selected(), MenuItem::Record);
        s.handle(ev(ButtonId::Up, ButtonKind::Press), &m);
        assert_eq!(s.menu.selected(), MenuItem::Back);
        assert_eq!(
            s.handle(ev(ButtonId::Center, ButtonKind::Press), &m),
            Some(Command::Goto(UiScreen::Map))
        );
        s.handle(ev(ButtonId::Down, ButtonKind::Press), &m);
        s.handle(ev(ButtonId::Down, ButtonKind::Press), &m);
        assert_eq!(
            s.handle(ev(ButtonId::Center, ButtonKind::Press), &m),
            Some(Command::Goto(UiScreen::Calibration))
        );
        assert_eq!(s.handle(ev(ButtonId::Left, ButtonKind::Press), &m), Some(Command::Goto(UiScreen::Map)));
    }

    #[test]
    fn test_calibration_retry_only_after_failure() {
        let mut m = model(&[]);
        let mut s = Screens::new();
        s.goto(UiScreen::Calibration);
        m.calibration.phase = CalPhase::LeftCircle;
        assert_eq!(s.handle(ev(ButtonId::Center, ButtonKind::Press), &m), None);
        m.calibration.phase = CalPhase::Failed(crate::error::Error::InsufficientMotion);
        assert_eq!(s.handle(ev(ButtonId::Center, ButtonKind::Press), &m), Some(Command::RetryCalibration));
        assert_eq!(
            s.handle(ev(ButtonId::Left, ButtonKind::Press), &m),
            Some(Command::Goto(UiScreen::Menu))
        );
    }

    #[test]
    fn test_track_list_scrolls() {
        let tracks: alloc::vec::Vec<IndexEntry> = (0..20)
            .map(|i| entry(&alloc::format!("20260501-{:06}.gpx", i)))
            .collect();
        let m = model(&tracks);
        let mut s = Screens::new();
        s.goto(UiScreen::TrackList);
        s.refresh(&m);
        for _ in 0..15 {
            s.handle(ev(ButtonId::Down, ButtonKind::Press), &m);
        }
        assert_eq!(s.tracks.selected(), 15);
        assert_eq!(s.tracks.top(), 15 + 1 - LIST_ROWS);
        for _ in 0..30 {
            s.handle(ev(ButtonId::Down, ButtonKind::Press), &m);
        }
        assert_eq!(s.tracks.selected(), 19, "stops at the last entry");
        assert_eq!(track_row(&tracks[0]).as_str(), "20260501-000000  12.3 km 1:05");
    }

    #[test]
    fn test_redraw_requests() {
        let m = model(&[]);
        let mut s = Screens::new();
        let mut fb = Framebuffer::new(SCREEN_W, SCREEN_H);
        assert!(!s.draw(&mut fb, &m), "map is drawn by the renderer");
        s.goto(UiScreen::Menu);
        s.refresh(&m);
        assert!(s.draw(&mut fb, &m));
        s.refresh(&m);
        assert!(!s.draw(&mut fb, &m), "nothing changed");
        s.handle(ev(ButtonId::Down, ButtonKind::Press), &m);
        assert!(s.draw(&mut fb, &m));
    }
}
