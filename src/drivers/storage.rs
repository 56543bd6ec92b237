// Removable-media access for the core
//
// Paths are absolute, '/'-separated, e.g. "/tracks/20260501-093000.gpx".
// Every call opens, acts and closes; no handle outlives a call so a
// card pulled between ticks surfaces as NoMedia on the next access.
//
// MemStorage is the RAM-backed implementation used for host tests and
// bench simulation; it supports a byte quota and fault injection. Like a
// FAT volume running out of clusters, an append past the quota keeps the
// bytes that fit before reporting MediaFull.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    // create or truncate
    Create,
    // must already exist
    Append,
    Read,
}

pub trait Storage {
    fn present(&mut self) -> bool;

    fn read(&mut self, path: &str, offset: u32, buf: &mut [u8]) -> Result<usize>;

    // create or truncate, then write
    fn write(&mut self, path: &str, data: &[u8]) -> Result<()>;

    fn append(&mut self, path: &str, data: &[u8]) -> Result<()>;

    fn size(&mut self, path: &str) -> Result<u32>;

    fn truncate(&mut self, path: &str, len: u32) -> Result<()>;

    fn remove(&mut self, path: &str) -> Result<()>;

    fn ensure_dir(&mut self, path: &str) -> Result<()>;

    // names (not paths) of the files directly inside dir
    fn list(&mut self, dir: &str, out: &mut Vec<String>) -> Result<()>;

    fn open(&mut self, path: &str, mode: OpenMode) -> Result<()> {
        match mode {
            OpenMode::Create => self.write(path, &[]),
            OpenMode::Append | OpenMode::Read => self.size(path).map(|_| ()),
        }
    }
}

// read a whole (small) file; refuses files larger than max
pub fn read_to_vec<S: Storage>(storage: &mut S, path: &str, max: usize) -> Result<Vec<u8>> {
    let size = storage.size(path)? as usize;
    if size > max {
        return Err(Error::Io);
    }
    let mut out = alloc::vec![0u8; size];
    let mut pos = 0;
    while pos < size {
        let n = storage.read(path, pos as u32, &mut out[pos..])?;
        if n == 0 {
            break;
        }
        pos += n;
    }
    out.truncate(pos);
    Ok(out)
}

// split "/a/b/c.txt" into ("/a/b", "c.txt")
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("/", path),
    }
}

#[derive(Default)]
pub struct MemStorage {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    quota: Option<usize>,
    ejected: bool,
    fail_appends: Option<Error>,
    appends: u32,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    // total bytes the medium can hold
    pub fn with_quota(quota: usize) -> Self {
        Self {
            quota: Some(quota),
            ..Self::default()
        }
    }

    pub fn eject(&mut self) {
        self.ejected = true;
    }

    pub fn insert(&mut self) {
        self.ejected = false;
    }

    pub fn set_quota(&mut self, quota: Option<usize>) {
        self.quota = quota;
    }

    // every following append fails with err until cleared
    pub fn fail_appends(&mut self, err: Option<Error>) {
        self.fail_appends = err;
    }

    pub fn used(&self) -> usize {
        self.files.values().map(|f| f.len()).sum()
    }

    pub fn appends(&self) -> u32 {
        self.appends
    }

    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(|v| v.as_slice())
    }

    pub fn put(&mut self, path: &str, data: &[u8]) {
        self.files.insert(path.to_string(), data.to_vec());
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(|k| k.as_str())
    }

    fn check(&self) -> Result<()> {
        if self.ejected { Err(Error::NoMedia) } else { Ok(()) }
    }

    fn room_for(&self, extra: usize, replacing: usize) -> Result<()> {
        if let Some(q) = self.quota {
            if self.used() - replacing + extra > q {
                return Err(Error::MediaFull);
            }
        }
        Ok(())
    }
}

impl Storage for MemStorage {
    fn present(&mut self) -> bool {
        !self.ejected
    }

    fn read(&mut self, path: &str, offset: u32, buf: &mut [u8]) -> Result<usize> {
        self.check()?;
        let data = self.files.get(path).ok_or(Error::NotFound)?;
        let start = (offset as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<()> {
        self.check()?;
        let existing = self.files.get(path).map(|f| f.len()).unwrap_or(0);
        self.room_for(data.len(), existing)?;
        self.files.insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn append(&mut self, path: &str, data: &[u8]) -> Result<()> {
        self.check()?;
        if let Some(err) = self.fail_appends {
            return Err(err);
        }
        if !self.files.contains_key(path) {
            return Err(Error::NotFound);
        }
        let room = self.quota.map_or(data.len(), |q| q.saturating_sub(self.used()));
        let fits = data.len().min(room);
        if let Some(f) = self.files.get_mut(path) {
            f.extend_from_slice(&data[..fits]);
        }
        if fits < data.len() {
            return Err(Error::MediaFull);
        }
        self.appends += 1;
        Ok(())
    }

    fn size(&mut self, path: &str) -> Result<u32> {
        self.check()?;
        self.files
            .get(path)
            .map(|f| f.len() as u32)
            .ok_or(Error::NotFound)
    }

    fn truncate(&mut self, path: &str, len: u32) -> Result<()> {
        self.check()?;
        let f = self.files.get_mut(path).ok_or(Error::NotFound)?;
        f.truncate(len as usize);
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<()> {
        self.check()?;
        self.files.remove(path).map(|_| ()).ok_or(Error::NotFound)
    }

    fn ensure_dir(&mut self, path: &str) -> Result<()> {
        self.check()?;
        self.dirs.insert(path.to_string());
        Ok(())
    }

    fn list(&mut self, dir: &str, out: &mut Vec<String>) -> Result<()> {
        self.check()?;
        for path in self.files.keys() {
            let (parent, name) = split_path(path);
            if parent == dir {
                out.push(name.to_string());
            }
        }
        Ok(())
    }
}
