// Map layer of the frame
//
// Per frame: centre on the fix (or the last known position), pick the
// integer zoom nearest the eased zoom, pin every visible tile, copy
// them scaled nearest-neighbour into the map area (placeholder for
// misses), draw the trail, then the heading marker. Output depends only
// on the MapView and the cache contents, so an unchanged view is not
// redrawn at all.

use alloc::vec::Vec;

use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{
    Circle, Polyline, PrimitiveStyle, PrimitiveStyleBuilder, Triangle,
};
use libm::{cosf, floor, roundf, sinf};

use super::projection::{TILE_SIZE, TileKey, tile_at, to_pixel, zoom_scale};
use super::tiles::TileCache;
use crate::drivers::framebuffer::Framebuffer;
use crate::state::TrackerState;
use crate::track::TrailPoint;
use crate::ui::Region;
use crate::ui::palette::Palette;

// heading-only changes redraw at most at 5 Hz
const HEADING_MIN_MS: u64 = 200;
const MARKER_TIP: f32 = 16.0;
const MARKER_BASE: f32 = 10.0;
const TRAIL_WIDTH: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapView {
    pub center: Option<(f64, f64)>,
    pub zoom: f32,
    // true degrees, None draws a plain dot
    pub heading: Option<f32>,
    pub tracking: TrackerState,
    pub trail_seq: u32,
    pub night: bool,
}

pub struct MapRenderer {
    area: Region,
    last_center: Option<(f64, f64)>,
    drawn: Option<MapView>,
    heading_ms: u64,
    placeholders: usize,
    decoded_seen: u32,
    center_tile: Option<TileKey>,
    cols: Vec<u8>,
}

impl MapRenderer {
    pub fn new(area: Region) -> Self {
        Self {
            area,
            last_center: None,
            drawn: None,
            heading_ms: 0,
            placeholders: 0,
            decoded_seen: 0,
            center_tile: None,
            cols: Vec::with_capacity(area.w as usize),
        }
    }

    pub fn area(&self) -> Region {
        self.area
    }

    // tile under the marker, for nearest-first decoding
    pub fn center_tile(&self) -> Option<TileKey> {
        self.center_tile
    }

    // placeholders drawn in the last frame
    pub fn placeholders(&self) -> usize {
        self.placeholders
    }

    // force the next render (wake, screen switch)
    pub fn invalidate(&mut self) {
        self.drawn = None;
    }

    // Some(view) actually drawn last
    pub fn drawn(&self) -> Option<MapView> {
        self.drawn
    }

    // Draw if the view or a waited-for tile changed. True when pixels
    // in the map area were rewritten.
    pub fn render<'t>(
        &mut self,
        fb: &mut Framebuffer,
        cache: &mut TileCache,
        view: &MapView,
        trail: impl IntoIterator<Item = &'t TrailPoint>,
        now_ms: u64,
    ) -> bool {
        let mut view = *view;
        if view.center.is_some() {
            self.last_center = view.center;
        }
        view.center = view.center.or(self.last_center);
        view.heading = view.heading.map(|h| roundf(h) % 360.0);
        if let Some(prev) = self.drawn
            && prev.heading != view.heading
            && now_ms.saturating_sub(self.heading_ms) < HEADING_MIN_MS
        {
            view.heading = prev.heading;
        }

        let landed = self.placeholders > 0 && cache.stats().decoded != self.decoded_seen;
        if self.drawn == Some(view) && !landed {
            return false;
        }
        if self.drawn.is_none_or(|p| p.heading != view.heading) {
            self.heading_ms = now_ms;
        }

        let pal = Palette::for_mode(view.night);
        cache.unpin_all();
        self.decoded_seen = cache.stats().decoded;

        match view.center {
            Some((lat, lon)) => {
                self.draw_tiles(fb, cache, lat, lon, view.zoom, pal);
                self.draw_trail(fb, &view, lat, lon, trail, pal);
                self.draw_marker(fb, view.heading, pal);
            }
            None => {
                fb.fill_region(self.area, pal.placeholder);
                self.center_tile = None;
                self.placeholders = 0;
            }
        }

        fb.mark_dirty(self.area);
        self.drawn = Some(view);
        true
    }

    fn screen_center(&self) -> (f64, f64) {
        (
            self.area.x as f64 + self.area.w as f64 / 2.0,
            self.area.y as f64 + self.area.h as f64 / 2.0,
        )
    }

    fn draw_tiles(
        &mut self,
        fb: &mut Framebuffer,
        cache: &mut TileCache,
        lat: f64,
        lon: f64,
        zoom: f32,
        pal: &Palette,
    ) {
        let zi = roundf(zoom).clamp(0.0, 22.0) as u8;
        let scale = zoom_scale(zoom as f64 - zi as f64);
        let (cx, cy) = to_pixel(lat, lon, zi as f64);
        let (scx, scy) = self.screen_center();
        let half_w = self.area.w as f64 / 2.0 / scale;
        let half_h = self.area.h as f64 / 2.0 / scale;

        let first = tile_at(cx - half_w, cy - half_h, zi);
        let last = tile_at(cx + half_w, cy + half_h, zi);
        self.center_tile = Some(tile_at(cx, cy, zi));

        let mut keys: Vec<TileKey> = Vec::new();
        for ty in first.y..=last.y {
            for tx in first.x..=last.x {
                keys.push(TileKey::new(zi, tx, ty));
            }
        }
        cache.retain_pending(|k| keys.contains(k));

        self.placeholders = 0;
        let ax0 = self.area.x as i32;
        let ay0 = self.area.y as i32;
        let ax1 = self.area.right() as i32;
        let ay1 = self.area.bottom() as i32;

        for key in keys {
            let ox = key.x as f64 * TILE_SIZE;
            let oy = key.y as f64 * TILE_SIZE;
            let x0 = (floor(scx + (ox - cx) * scale) as i32).max(ax0);
            let x1 = (floor(scx + (ox + TILE_SIZE - cx) * scale) as i32).min(ax1);
            let y0 = (floor(scy + (oy - cy) * scale) as i32).max(ay0);
            let y1 = (floor(scy + (oy + TILE_SIZE - cy) * scale) as i32).min(ay1);
            if x0 >= x1 || y0 >= y1 {
                continue;
            }
            let rect = Region::new(x0 as u16, y0 as u16, (x1 - x0) as u16, (y1 - y0) as u16);

            let Some(slot) = cache.pin(key) else {
                fb.fill_region(rect, pal.placeholder);
                self.placeholders += 1;
                continue;
            };

            // source column per screen column, shared by every row
            self.cols.clear();
            for sx in x0..x1 {
                let src = floor((sx as f64 + 0.5 - scx) / scale + cx - ox);
                self.cols.push(src.clamp(0.0, TILE_SIZE - 1.0) as u8);
            }
            let px = cache.pixels(slot);
            if px.is_empty() {
                continue;
            }
            let tile = TILE_SIZE as usize;
            for sy in y0..y1 {
                let src_y = floor((sy as f64 + 0.5 - scy) / scale + cy - oy).clamp(0.0, TILE_SIZE - 1.0)
                    as usize;
                let src_row = &px[src_y * tile..(src_y + 1) * tile];
                let row = fb.row_mut(x0 as u16, sy as u16, (x1 - x0) as u16);
                for (dst, &c) in row.iter_mut().zip(self.cols.iter()) {
                    *dst = pal.tile(src_row[c as usize]);
                }
            }
        }
    }

    fn draw_trail<'t>(
        &self,
        fb: &mut Framebuffer,
        view: &MapView,
        lat: f64,
        lon: f64,
        trail: impl IntoIterator<Item = &'t TrailPoint>,
        pal: &Palette,
    ) {
        let color = match view.tracking {
            TrackerState::Recording | TrackerState::Closing => pal.trail_rec,
            TrackerState::Paused => pal.trail_paused,
            TrackerState::Idle | TrackerState::Armed => return,
        };
        let z = view.zoom as f64;
        let (cx, cy) = to_pixel(lat, lon, z);
        let (scx, scy) = self.screen_center();
        let style = PrimitiveStyle::with_stroke(color, TRAIL_WIDTH);
        let mut clipped = fb.clipped(&self.area.to_rect());

        let mut run: Vec<Point> = Vec::new();
        let mut seg = None;
        for p in trail {
            if seg != Some(p.seg) {
                if run.len() >= 2 {
                    let _ = Polyline::new(&run).into_styled(style).draw(&mut clipped);
                }
                run.clear();
                seg = Some(p.seg);
            }
            let (px, py) = to_pixel(p.lat, p.lon, z);
            let sx = (scx + px - cx) as i32;
            let sy = (scy + py - cy) as i32;
            if run.last() != Some(&Point::new(sx, sy)) {
                run.push(Point::new(sx, sy));
            }
        }
        if run.len() >= 2 {
            let _ = Polyline::new(&run).into_styled(style).draw(&mut clipped);
        }
    }

    fn draw_marker(&self, fb: &mut Framebuffer, heading: Option<f32>, pal: &Palette) {
        let (scx, scy) = self.screen_center();
        let c = Point::new(scx as i32, scy as i32);
        let style = PrimitiveStyleBuilder::new()
            .fill_color(pal.marker)
            .stroke_color(pal.marker_edge)
            .stroke_width(1)
            .build();
        let mut clipped = fb.clipped(&self.area.to_rect());

        let Some(h) = heading else {
            let _ = Circle::with_center(c, 12).into_styled(style).draw(&mut clipped);
            return;
        };
        // screen y grows downwards, north is up
        let at = |deg: f32, r: f32| {
            let a = deg.to_radians();
            Point::new(
                c.x + roundf(sinf(a) * r) as i32,
                c.y - roundf(cosf(a) * r) as i32,
            )
        };
        let tri = Triangle::new(at(h, MARKER_TIP), at(h + 140.0, MARKER_BASE), at(h - 140.0, MARKER_BASE));
        let _ = tri.into_styled(style).draw(&mut clipped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::storage::MemStorage;
    use crate::kernel::Quantum;
    use crate::map::png::tests::{gradient_tile, noise};
    use crate::map::png::rgb565;
    use crate::map::projection::to_lat_lon;
    use crate::map::tiles::{StepOutcome, TILE_BYTES};
    use crate::ui::palette::DAY;
    use embedded_graphics::pixelcolor::IntoStorage;

    const AREA: Region = Region::new(0, 28, 320, 412);
    const NO_TRAIL: [&TrailPoint; 0] = [];

    // lat/lon of pixel (128, 128) inside the given tile
    fn tile_center(key: TileKey) -> (f64, f64) {
        to_lat_lon(
            key.x as f64 * 256.0 + 128.0,
            key.y as f64 * 256.0 + 128.0,
            key.z as f64,
        )
    }

    fn view(center: Option<(f64, f64)>, zoom: f32) -> MapView {
        MapView {
            center,
            zoom,
            heading: Some(0.0),
            tracking: TrackerState::Idle,
            trail_seq: 0,
            night: false,
        }
    }

    fn decode_all(cache: &mut TileCache, fs: &mut MemStorage, center: TileKey) {
        let clock = || 0u64;
        for _ in 0..500 {
            let mut q = Quantum::new(&clock, 5, 8);
            match cache.decode_step(fs, center, &mut q) {
                Ok(StepOutcome::Idle) | Err(_) => break,
                Ok(_) => {}
            }
        }
    }

    #[test]
    fn test_no_position_draws_placeholder() {
        let mut fb = Framebuffer::new(320, 480);
        let mut cache = TileCache::new(4 * TILE_BYTES);
        let mut r = MapRenderer::new(AREA);
        assert!(r.render(&mut fb, &mut cache, &view(None, 16.0), NO_TRAIL, 0));
        assert_eq!(fb.pixel(10, 100), DAY.placeholder);
        assert_eq!(fb.pixel(10, 10), 0, "outside the map area untouched");
        assert_eq!(fb.dirty(), AREA);
        assert!(!r.render(&mut fb, &mut cache, &view(None, 16.0), NO_TRAIL, 10), "same view, no redraw");
    }

    #[test]
    fn test_misses_queue_tiles_and_landing_redraws() {
        let key = TileKey::new(15, 17161, 11474);
        let mut fs = MemStorage::new();
        fs.put(&alloc::format!("{}", key), &gradient_tile());
        let mut fb = Framebuffer::new(320, 480);
        let mut cache = TileCache::new(16 * TILE_BYTES);
        let mut r = MapRenderer::new(AREA);
        let v = view(Some(tile_center(key)), 15.0);

        assert!(r.render(&mut fb, &mut cache, &v, NO_TRAIL, 0));
        assert!(r.placeholders() >= 2, "viewport spans several tiles");
        assert_eq!(r.center_tile(), Some(key));
        assert_eq!(fb.pixel(100, 234), DAY.placeholder);

        decode_all(&mut cache, &mut fs, key);
        assert!(r.render(&mut fb, &mut cache, &v, NO_TRAIL, 20), "landed tile triggers a redraw");
        // 60 px left of the centre is tile pixel (68, 128)
        assert_eq!(fb.pixel(100, 234), rgb565(68, 128, noise(68, 128)));
        assert!(!r.render(&mut fb, &mut cache, &v, NO_TRAIL, 40), "nothing new landed");
    }

    #[test]
    fn test_render_is_idempotent() {
        let key = TileKey::new(15, 17161, 11474);
        let mut fs = MemStorage::new();
        fs.put(&alloc::format!("{}", key), &gradient_tile());
        let mut cache = TileCache::new(16 * TILE_BYTES);
        let (lat, lon) = tile_center(key);
        let trail: Vec<TrailPoint> = (0..20)
            .map(|i| TrailPoint {
                lat: lat - i as f64 * 1e-4,
                lon: lon + i as f64 * 5e-5,
                seg: 1,
            })
            .collect();
        let mut v = view(Some((lat, lon)), 15.4);
        v.tracking = TrackerState::Recording;
        v.heading = Some(73.0);

        let mut r = MapRenderer::new(AREA);
        let mut fb1 = Framebuffer::new(320, 480);
        r.render(&mut fb1, &mut cache, &v, &trail, 0);
        decode_all(&mut cache, &mut fs, key);
        r.render(&mut fb1, &mut cache, &v, &trail, 10);

        let mut fb2 = Framebuffer::new(320, 480);
        r.invalidate();
        assert!(r.render(&mut fb2, &mut cache, &v, &trail, 20));
        assert!(fb1.pixels() == fb2.pixels(), "same view, same pixels");
    }

    #[test]
    fn test_trail_only_while_tracking() {
        let mut cache = TileCache::new(4 * TILE_BYTES);
        let (lat, lon) = (47.0, 8.0);
        // due south of the marker, well clear of it
        let trail = [
            TrailPoint { lat: lat - 0.0003, lon, seg: 1 },
            TrailPoint { lat: lat - 0.0010, lon, seg: 1 },
        ];
        let mut v = view(Some((lat, lon)), 17.0);
        let sample_y = {
            let (_, py0) = to_pixel(lat, lon, 17.0);
            let (_, py1) = to_pixel(lat - 0.0006, lon, 17.0);
            (234.0 + py1 - py0) as u16
        };
        let trail_px = DAY.trail_rec.into_storage();

        let mut r = MapRenderer::new(AREA);
        let mut fb = Framebuffer::new(320, 480);
        r.render(&mut fb, &mut cache, &v, &trail, 0);
        assert_ne!(fb.pixel(160, sample_y), trail_px, "idle hides the trail");

        v.tracking = TrackerState::Recording;
        r.render(&mut fb, &mut cache, &v, &trail, 10);
        assert_eq!(fb.pixel(160, sample_y), trail_px);

        v.tracking = TrackerState::Paused;
        r.render(&mut fb, &mut cache, &v, &trail, 20);
        assert_eq!(fb.pixel(160, sample_y), DAY.trail_paused.into_storage());
    }

    #[test]
    fn test_marker_points_along_heading() {
        let mut cache = TileCache::new(4 * TILE_BYTES);
        let marker = DAY.marker.into_storage();
        let mut r = MapRenderer::new(AREA);
        let mut fb = Framebuffer::new(320, 480);
        let mut v = view(Some((47.0, 8.0)), 16.0);

        r.render(&mut fb, &mut cache, &v, NO_TRAIL, 0);
        assert_eq!(fb.pixel(160, 234 - 10), marker, "north: tip above centre");
        assert_ne!(fb.pixel(160, 234 + 12), marker);

        // heading changes inside 200 ms are held back
        v.heading = Some(180.0);
        assert!(!r.render(&mut fb, &mut cache, &v, NO_TRAIL, 100));
        assert!(r.render(&mut fb, &mut cache, &v, NO_TRAIL, 250));
        assert_eq!(fb.pixel(160, 234 + 10), marker, "south: tip below centre");
        assert_ne!(fb.pixel(160, 234 - 12), marker);
    }
}
