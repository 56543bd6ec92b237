// Boot-time repair of /tracks
//
// A session cut short by power loss leaves a GPX file without its
// footer, possibly ending mid-point. Each such file is cut back to the
// last complete </trkpt> and closed; a file that never got its header
// or holds no complete point is removed. Every surviving track missing
// from the index is entered with totals recomputed from its points.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

use log::{info, warn};

use super::gpx;
use super::index::{IndexEntry, TrackIndex};
use crate::drivers::storage::{Storage, read_to_vec};
use crate::error::{Error, Result};

pub const TRACKS_DIR: &str = "/tracks";
const MAX_TRACK_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    pub repaired: u32,
    pub removed: u32,
    pub indexed: u32,
}

pub fn recover<S: Storage>(storage: &mut S, index: &mut TrackIndex) -> Result<RecoveryReport> {
    let mut report = RecoveryReport::default();
    let mut names = Vec::new();
    match storage.list(TRACKS_DIR, &mut names) {
        Ok(()) => {}
        Err(Error::NotFound) => return Ok(report),
        Err(e) => return Err(e),
    }

    for name in names.iter().filter(|n| n.ends_with(".gpx")) {
        let mut path = String::new();
        let _ = write!(path, "{}/{}", TRACKS_DIR, name);

        let mut data = match read_to_vec(storage, &path, MAX_TRACK_BYTES) {
            Ok(d) => d,
            Err(e) if e.is_media_fault() && e != Error::Io => return Err(e),
            Err(e) => {
                warn!("recovery: skipping {} ({})", name, e);
                continue;
            }
        };

        if !gpx::is_closed(&data) {
            let end = if gpx::has_header(&data) {
                gpx::last_point_end(&data)
            } else {
                None
            };
            let Some(end) = end else {
                info!("recovery: removing empty {}", name);
                storage.remove(&path)?;
                index.remove(name);
                report.removed += 1;
                continue;
            };
            storage.truncate(&path, end as u32)?;
            let mut tail = String::from("\n");
            tail.push_str(gpx::FOOTER);
            storage.append(&path, tail.as_bytes())?;
            data.truncate(end);
            data.extend_from_slice(tail.as_bytes());
            info!("recovery: closed {} at byte {}", name, end);
            report.repaired += 1;
            // totals changed, re-enter it
            index.remove(name);
        }

        if index.contains(name) {
            continue;
        }
        match gpx::parse(&data) {
            Ok(trk) => {
                index.upsert(IndexEntry::new(name, &trk.totals()));
                report.indexed += 1;
            }
            Err(e) => warn!("recovery: {} unreadable ({})", name, e),
        }
    }

    if report != RecoveryReport::default() {
        info!(
            "recovery: {} repaired, {} removed, {} indexed",
            report.repaired, report.removed, report.indexed
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::storage::MemStorage;
    use crate::state::SessionId;
    use crate::track::gpx::tests::point;

    const PATH: &str = "/tracks/20260501-093000.gpx";

    fn partial(points: u32, cut: usize) -> String {
        let mut doc = gpx::header(SessionId {
            date: 20260501,
            seq: 1,
        });
        for i in 0..points {
            gpx::write_point(&mut doc, &point(i));
        }
        doc.truncate(doc.len() - cut);
        doc
    }

    #[test]
    fn test_cut_file_is_closed_after_last_point() {
        let mut fs = MemStorage::new();
        fs.put(PATH, partial(3, 30).as_bytes());
        let mut idx = TrackIndex::new();
        let r = recover(&mut fs, &mut idx).unwrap();
        assert_eq!(r.repaired, 1);
        assert_eq!(r.indexed, 1);

        let data = fs.file(PATH).unwrap();
        assert!(gpx::is_closed(data));
        let trk = gpx::parse(data).unwrap();
        assert_eq!(trk.point_count(), 2, "the torn point is dropped");
        assert_eq!(idx.entries()[0].points, 2);
        assert_eq!(idx.entries()[0].file, "20260501-093000.gpx");
    }

    #[test]
    fn test_headerless_and_pointless_files_removed() {
        let mut fs = MemStorage::new();
        fs.put("/tracks/a.gpx", b"<?xml version=\"1.0\"?>\n<gp");
        fs.put("/tracks/b.gpx", partial(0, 0).as_bytes());
        fs.put("/tracks/index.json", b"[\n]\n");
        let mut idx = TrackIndex::new();
        let r = recover(&mut fs, &mut idx).unwrap();
        assert_eq!(r.removed, 2);
        assert!(fs.file("/tracks/a.gpx").is_none());
        assert!(fs.file("/tracks/index.json").is_some(), "non-gpx files untouched");
    }

    #[test]
    fn test_closed_files_left_alone_and_indexed_once() {
        let mut fs = MemStorage::new();
        let mut doc = partial(2, 0);
        doc.push_str(gpx::FOOTER);
        fs.put(PATH, doc.as_bytes());
        let mut idx = TrackIndex::new();
        let r = recover(&mut fs, &mut idx).unwrap();
        assert_eq!((r.repaired, r.indexed), (0, 1));
        assert_eq!(fs.file(PATH).unwrap(), doc.as_bytes());

        let again = recover(&mut fs, &mut idx).unwrap();
        assert_eq!(again, RecoveryReport::default());
    }

    #[test]
    fn test_no_tracks_dir() {
        let mut fs = MemStorage::new();
        let mut idx = TrackIndex::new();
        assert_eq!(recover(&mut fs, &mut idx), Ok(RecoveryReport::default()));
        fs.eject();
        assert_eq!(recover(&mut fs, &mut idx), Err(Error::NoMedia));
    }
}
