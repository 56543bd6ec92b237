// GPX 1.1 writer and tolerant reader
//
// The writer produces text in fixed fragments so a file can be built
// append-only: header once, points in batches, a segment break on
// resume, the footer on close. Replaying a file gives back the points
// at the precision they were written (1e-7 deg, 0.1 m, 0.01 m/s,
// 0.1 deg, 1 ms).
//
// The reader accepts files cut off anywhere: points after the last
// complete </trkpt> are ignored, and last_point_end tells recovery
// where the good data stops.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

use chrono::NaiveDateTime;

use super::xml::{self, get_attr, tag_text};
use crate::error::{Error, Result};
use crate::nav::geo;
use crate::state::{SessionId, TrackPoint, TrackTotals};

pub const CREATOR: &str = "ridenav";
pub const SEGMENT_BREAK: &str = "</trkseg>\n<trkseg>\n";
pub const FOOTER: &str = "</trkseg>\n</trk>\n</gpx>\n";

const TIME_FMT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";
// parse side accepts any fraction, or none
const TIME_PARSE_FMT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

pub fn header(id: SessionId) -> String {
    let mut s = String::with_capacity(192);
    let _ = write!(
        s,
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <gpx version=\"1.1\" creator=\"{}\" xmlns=\"http://www.topografix.com/GPX/1/1\">\n\
         <trk><name>{}</name>\n<trkseg>\n",
        CREATOR, id
    );
    s
}

pub fn write_point(out: &mut String, p: &TrackPoint) {
    let _ = write!(
        out,
        "<trkpt lat=\"{:.7}\" lon=\"{:.7}\"><ele>{:.1}</ele><time>{}</time>\
         <speed>{:.2}</speed><course>{:.1}</course></trkpt>\n",
        p.lat,
        p.lon,
        p.ele_m,
        p.utc.format(TIME_FMT),
        p.speed_mps,
        p.course_deg,
    );
}

// a file is complete when the footer made it out
pub fn is_closed(data: &[u8]) -> bool {
    xml::trim_ws(data).ends_with(b"</gpx>")
}

// header written through the first <trkseg>
pub fn has_header(data: &[u8]) -> bool {
    find(data, b"<trkseg>", 0).is_some() && find(data, b"<gpx", 0).is_some()
}

// offset just past the last complete </trkpt>
pub fn last_point_end(data: &[u8]) -> Option<usize> {
    let mut end = None;
    xml::for_each_element(data, b"trkpt", |el| end = Some(el.end));
    end
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct GpxTrack {
    pub name: Option<String>,
    pub segments: Vec<Vec<TrackPoint>>,
}

impl GpxTrack {
    pub fn points(&self) -> impl Iterator<Item = &TrackPoint> {
        self.segments.iter().flatten()
    }

    pub fn point_count(&self) -> usize {
        self.segments.iter().map(|s| s.len()).sum()
    }

    // totals recomputed from the stored points; segment gaps add
    // neither distance nor climb
    pub fn totals(&self) -> TrackTotals {
        let mut t = TrackTotals::default();
        let mut first = None;
        let mut last = None;
        for seg in &self.segments {
            let mut prev: Option<&TrackPoint> = None;
            for p in seg {
                first.get_or_insert(p.utc);
                last = Some(p.utc);
                t.points += 1;
                t.max_speed_mps = t.max_speed_mps.max(p.speed_mps);
                if let Some(q) = prev {
                    t.distance_m += geo::distance_m(q.lat, q.lon, p.lat, p.lon) as f32;
                    let dz = p.ele_m - q.ele_m;
                    if dz > 0.0 {
                        t.ascent_m += dz;
                    } else {
                        t.descent_m -= dz;
                    }
                }
                prev = Some(p);
            }
        }
        if let (Some(a), Some(b)) = (first, last) {
            t.duration_s = (b - a).num_seconds().max(0) as u32;
        }
        t
    }
}

pub fn parse(data: &[u8]) -> Result<GpxTrack> {
    if find(data, b"<gpx", 0).is_none() {
        return Err(Error::Parse);
    }

    let name = tag_text(data, b"name")
        .and_then(|n| core::str::from_utf8(n).ok())
        .map(String::from);

    let mut seg_starts = Vec::new();
    let mut from = 0;
    while let Some(at) = find(data, b"<trkseg", from) {
        seg_starts.push(at);
        from = at + 1;
    }

    let mut segments: Vec<Vec<TrackPoint>> = Vec::new();
    segments.resize_with(seg_starts.len().max(1), Vec::new);
    let mut bad = false;
    xml::for_each_element(data, b"trkpt", |el| {
        let seg = seg_starts
            .iter()
            .rposition(|&s| s < el.start)
            .unwrap_or(0);
        match parse_point(el.tag, el.inner) {
            Some(p) => segments[seg].push(p),
            None => bad = true,
        }
    });
    if bad {
        return Err(Error::Parse);
    }
    Ok(GpxTrack { name, segments })
}

fn parse_point(tag: &[u8], inner: &[u8]) -> Option<TrackPoint> {
    let lat: f64 = parse_num(get_attr(tag, b"lat")?)?;
    let lon: f64 = parse_num(get_attr(tag, b"lon")?)?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }
    let time = core::str::from_utf8(tag_text(inner, b"time")?).ok()?;
    let utc = NaiveDateTime::parse_from_str(time, TIME_PARSE_FMT).ok()?;
    let opt = |name: &[u8]| tag_text(inner, name).and_then(parse_num::<f32>);
    Some(TrackPoint {
        lat,
        lon,
        ele_m: opt(b"ele").unwrap_or(0.0),
        utc,
        speed_mps: opt(b"speed").unwrap_or(0.0),
        course_deg: opt(b"course").unwrap_or(0.0),
    })
}

fn parse_num<T: core::str::FromStr>(b: &[u8]) -> Option<T> {
    core::str::from_utf8(b).ok()?.trim().parse().ok()
}

fn find(data: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    data.get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;

    pub(crate) fn point(i: u32) -> TrackPoint {
        let utc = NaiveDate::from_ymd_opt(2026, 5, 1)
            .unwrap()
            .and_hms_milli_opt(9, 30, 0, 0)
            .unwrap()
            + chrono::Duration::milliseconds(i as i64 * 1_250);
        TrackPoint {
            lat: 47.3769 + i as f64 * 1e-4,
            lon: 8.5417 - i as f64 * 2e-4,
            ele_m: 408.0 + i as f32 * 0.5,
            utc,
            speed_mps: 12.5,
            course_deg: 271.3,
        }
    }

    fn close(a: &TrackPoint, b: &TrackPoint) -> bool {
        (a.lat - b.lat).abs() < 1e-7
            && (a.lon - b.lon).abs() < 1e-7
            && (a.ele_m - b.ele_m).abs() < 0.06
            && a.utc == b.utc
            && (a.speed_mps - b.speed_mps).abs() < 0.006
            && (a.course_deg - b.course_deg).abs() < 0.06
    }

    fn session() -> SessionId {
        SessionId {
            date: 20260501,
            seq: 2,
        }
    }

    #[test]
    fn test_written_points_replay() {
        let mut doc = header(session());
        let pts: Vec<_> = (0..5).map(point).collect();
        for p in &pts[..3] {
            write_point(&mut doc, p);
        }
        doc.push_str(SEGMENT_BREAK);
        for p in &pts[3..] {
            write_point(&mut doc, p);
        }
        doc.push_str(FOOTER);

        assert!(is_closed(doc.as_bytes()));
        let trk = parse(doc.as_bytes()).unwrap();
        assert_eq!(trk.name.as_deref(), Some("20260501-002"));
        assert_eq!(trk.segments.len(), 2);
        assert_eq!(trk.segments[0].len(), 3);
        for (a, b) in trk.points().zip(pts.iter()) {
            assert!(close(a, b), "replayed {:?} vs written {:?}", a, b);
        }
    }

    #[test]
    fn test_point_format() {
        let mut s = String::new();
        write_point(&mut s, &point(0));
        assert_eq!(
            s,
            "<trkpt lat=\"47.3769000\" lon=\"8.5417000\"><ele>408.0</ele>\
             <time>2026-05-01T09:30:00.000Z</time><speed>12.50</speed>\
             <course>271.3</course></trkpt>\n"
        );
    }

    #[test]
    fn test_truncated_file_is_readable() {
        let mut doc = header(session());
        write_point(&mut doc, &point(0));
        write_point(&mut doc, &point(1));
        let good = doc.len();
        write_point(&mut doc, &point(2));
        doc.truncate(doc.len() - 20);

        let data = doc.as_bytes();
        assert!(!is_closed(data));
        assert!(has_header(data));
        assert_eq!(last_point_end(data), Some(good - 1), "offset sits on the newline");
        assert_eq!(parse(data).unwrap().point_count(), 2);
    }

    #[test]
    fn test_header_only_fragment() {
        let h = header(session());
        assert!(!has_header(&h.as_bytes()[..40]));
        assert_eq!(last_point_end(h.as_bytes()), None);
        assert!(parse(b"<html></html>").is_err());
    }

    #[test]
    fn test_totals_skip_segment_gaps() {
        let trk = GpxTrack {
            name: None,
            segments: alloc::vec![
                alloc::vec![point(0), point(1)],
                alloc::vec![point(10), point(11)],
            ],
        };
        let t = trk.totals();
        let hop = geo::distance_m(point(0).lat, point(0).lon, point(1).lat, point(1).lon) as f32;
        assert_eq!(t.points, 4);
        assert!((t.distance_m - 2.0 * hop).abs() < 0.01, "gap not counted: {}", t.distance_m);
        assert!((t.ascent_m - 1.0).abs() < 1e-4);
        // 11 * 1.25 s
        assert_eq!(t.duration_s, 13);
    }
}
