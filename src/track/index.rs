// /tracks/index.json
//
// A flat JSON array, one object per finished session:
//   {"file":"20260501-093000.gpx","duration":812,"distance":10422.5,
//    "max_speed":27.41,"points":356}
// Written whole by a background job; read at boot and by the track
// list. The reader only understands what the writer produces, plus
// arbitrary whitespace and field order.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

use log::warn;

use crate::drivers::storage::{Storage, read_to_vec};
use crate::error::{Error, Result};
use crate::state::TrackTotals;

pub const INDEX_PATH: &str = "/tracks/index.json";
const MAX_INDEX_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub file: String,
    pub duration_s: u32,
    pub distance_m: f32,
    pub max_speed_mps: f32,
    pub points: u32,
}

impl IndexEntry {
    pub fn new(file: &str, t: &TrackTotals) -> Self {
        Self {
            file: String::from(file),
            duration_s: t.duration_s,
            distance_m: t.distance_m,
            max_speed_mps: t.max_speed_mps,
            points: t.points,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct TrackIndex {
    entries: Vec<IndexEntry>,
    dirty: bool,
}

impl TrackIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<S: Storage>(storage: &mut S) -> Self {
        let data = match read_to_vec(storage, INDEX_PATH, MAX_INDEX_BYTES) {
            Ok(d) => d,
            Err(Error::NotFound) => return Self::new(),
            Err(e) => {
                warn!("index: unreadable ({}), starting empty", e);
                return Self::new();
            }
        };
        match parse(&data) {
            Ok(entries) => Self {
                entries,
                dirty: false,
            },
            Err(_) => {
                warn!("index: malformed, will be rebuilt");
                Self {
                    entries: Vec::new(),
                    dirty: true,
                }
            }
        }
    }

    pub fn save<S: Storage>(&mut self, storage: &mut S) -> Result<()> {
        storage.ensure_dir("/tracks")?;
        storage.write(INDEX_PATH, render(&self.entries).as_bytes())?;
        self.dirty = false;
        Ok(())
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn contains(&self, file: &str) -> bool {
        self.entries.iter().any(|e| e.file == file)
    }

    // replace the entry for the same file, or add it in name order
    pub fn upsert(&mut self, entry: IndexEntry) {
        match self.entries.binary_search_by(|e| e.file.as_str().cmp(&entry.file)) {
            Ok(i) => self.entries[i] = entry,
            Err(i) => self.entries.insert(i, entry),
        }
        self.dirty = true;
    }

    pub fn remove(&mut self, file: &str) {
        let before = self.entries.len();
        self.entries.retain(|e| e.file != file);
        self.dirty |= self.entries.len() != before;
    }

    // sessions already recorded on a YYYYMMDD date
    pub fn sessions_on(&self, date: u32) -> usize {
        let mut prefix = String::new();
        let _ = write!(prefix, "{:08}-", date);
        self.entries
            .iter()
            .filter(|e| e.file.starts_with(prefix.as_str()))
            .count()
    }
}

pub fn render(entries: &[IndexEntry]) -> String {
    let mut s = String::from("[\n");
    for (i, e) in entries.iter().enumerate() {
        let _ = write!(
            s,
            "{{\"file\":\"{}\",\"duration\":{},\"distance\":{:.1},\"max_speed\":{:.2},\"points\":{}}}",
            e.file, e.duration_s, e.distance_m, e.max_speed_mps, e.points
        );
        s.push_str(if i + 1 < entries.len() { ",\n" } else { "\n" });
    }
    s.push_str("]\n");
    s
}

pub fn parse(data: &[u8]) -> Result<Vec<IndexEntry>> {
    let text = core::str::from_utf8(data).map_err(|_| Error::Parse)?;
    let body = text.trim();
    let body = body
        .strip_prefix('[')
        .and_then(|b| b.strip_suffix(']'))
        .ok_or(Error::Parse)?;

    let mut out = Vec::new();
    let mut rest = body;
    while let Some(open) = rest.find('{') {
        let close = rest[open..].find('}').ok_or(Error::Parse)? + open;
        out.push(parse_object(&rest[open + 1..close])?);
        rest = &rest[close + 1..];
    }
    Ok(out)
}

fn parse_object(obj: &str) -> Result<IndexEntry> {
    let mut e = IndexEntry {
        file: String::new(),
        duration_s: 0,
        distance_m: 0.0,
        max_speed_mps: 0.0,
        points: 0,
    };
    // file names never contain commas or quotes
    for field in obj.split(',') {
        let (key, value) = field.split_once(':').ok_or(Error::Parse)?;
        let key = key.trim().trim_matches('"');
        let value = value.trim();
        match key {
            "file" => e.file = String::from(value.trim_matches('"')),
            "duration" => e.duration_s = value.parse().map_err(|_| Error::Parse)?,
            "distance" => e.distance_m = value.parse().map_err(|_| Error::Parse)?,
            "max_speed" => e.max_speed_mps = value.parse().map_err(|_| Error::Parse)?,
            "points" => e.points = value.parse().map_err(|_| Error::Parse)?,
            _ => {}
        }
    }
    if e.file.is_empty() {
        return Err(Error::Parse);
    }
    Ok(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::storage::MemStorage;

    fn entry(file: &str, points: u32) -> IndexEntry {
        IndexEntry {
            file: String::from(file),
            duration_s: 812,
            distance_m: 10422.5,
            max_speed_mps: 27.41,
            points,
        }
    }

    #[test]
    fn test_render_shape() {
        let s = render(&[entry("20260501-093000.gpx", 356)]);
        assert_eq!(
            s,
            "[\n{\"file\":\"20260501-093000.gpx\",\"duration\":812,\"distance\":10422.5,\"max_speed\":27.41,\"points\":356}\n]\n"
        );
        assert_eq!(render(&[]), "[\n]\n");
    }

    #[test]
    fn test_save_then_load() {
        let mut fs = MemStorage::new();
        let mut idx = TrackIndex::new();
        idx.upsert(entry("20260502-080000.gpx", 2));
        idx.upsert(entry("20260501-093000.gpx", 1));
        idx.upsert(entry("20260502-080000.gpx", 3));
        assert!(idx.is_dirty());
        idx.save(&mut fs).unwrap();
        assert!(!idx.is_dirty());

        let back = TrackIndex::load(&mut fs);
        assert_eq!(back.len(), 2, "upsert replaced, not duplicated");
        assert_eq!(back.entries()[0].file, "20260501-093000.gpx", "kept in name order");
        assert_eq!(back.entries()[1].points, 3);
        assert_eq!(back.sessions_on(20260502), 1);
        assert_eq!(back.sessions_on(20260503), 0);
    }

    #[test]
    fn test_parse_tolerates_layout() {
        let text = br#"  [ { "points" : 5 , "file":"a.gpx", "extra": 1 } ,
            {"file":"b.gpx","duration":3,"distance":1.5,"max_speed":2,"points":1} ]"#;
        let v = parse(text).unwrap();
        assert_eq!(v.len(), 2);
        assert_eq!(v[0].points, 5);
        assert_eq!(v[1].distance_m, 1.5);
        assert!(parse(b"{\"file\":\"x\"}").is_err(), "must be an array");
    }

    #[test]
    fn test_missing_and_malformed_index() {
        let mut fs = MemStorage::new();
        assert!(TrackIndex::load(&mut fs).is_empty());
        fs.put(INDEX_PATH, b"[{\"file\":\"a.gpx\",\"points\":x}]");
        let idx = TrackIndex::load(&mut fs);
        assert!(idx.is_empty() && idx.is_dirty(), "malformed index is rebuilt");
    }
}
