// SD card over SPI with FAT volume manager
//
// Implements Storage on embedded-sdmmc. Every call opens the volume,
// walks to the directory, acts and drops the handles, so a card pulled
// between calls shows up as NoMedia on the next one. Long names are
// stored under 8.3 aliases (see fatname) with a per-directory
// NAMES.MAP. FAT timestamps come from the last GPS time.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::cell::Cell;

use chrono::{Datelike, NaiveDateTime, Timelike};
use embedded_hal::spi::SpiDevice;
use embedded_sdmmc::{Mode, SdCard, ShortFileName, TimeSource, Timestamp, VolumeIdx, VolumeManager};
use log::{info, warn};

use super::fatname::{self, MAP_FILE};
use super::storage::{Storage, split_path};
use crate::error::{Error, Result};

static FAT_CLOCK: critical_section::Mutex<Cell<Option<NaiveDateTime>>> =
    critical_section::Mutex::new(Cell::new(None));

// called with each valid GPS fix time
pub fn set_clock(utc: NaiveDateTime) {
    critical_section::with(|cs| FAT_CLOCK.borrow(cs).set(Some(utc)));
}

#[derive(Default, Clone, Copy)]
pub struct GpsTimeSource;

impl TimeSource for GpsTimeSource {
    fn get_timestamp(&self) -> Timestamp {
        match critical_section::with(|cs| FAT_CLOCK.borrow(cs).get()) {
            Some(t) => Timestamp {
                year_since_1970: (t.year() - 1970).clamp(0, 255) as u8,
                zero_indexed_month: t.month0() as u8,
                zero_indexed_day: t.day0() as u8,
                hours: t.hour() as u8,
                minutes: t.minute() as u8,
                seconds: t.second() as u8,
            },
            // no fix yet
            None => Timestamp {
                year_since_1970: 56,
                zero_indexed_month: 0,
                zero_indexed_day: 0,
                hours: 0,
                minutes: 0,
                seconds: 0,
            },
        }
    }
}

fn map_err<E: core::fmt::Debug>(e: embedded_sdmmc::Error<E>) -> Error {
    use embedded_sdmmc::Error as E;
    match e {
        E::NotFound => Error::NotFound,
        E::NotEnoughSpace | E::DiskFull => Error::MediaFull,
        E::DeviceError(_) | E::NoSuchVolume | E::FormatError(_) => Error::NoMedia,
        other => {
            warn!("sd: {:?}", other);
            Error::Io
        }
    }
}

fn format_83(sfn: &ShortFileName) -> String {
    let trim = |s: &[u8]| -> String {
        let end = s.iter().position(|&b| b == b' ').unwrap_or(s.len());
        String::from_utf8_lossy(&s[..end]).into_owned()
    };
    let base = trim(sfn.base_name());
    let ext = trim(sfn.extension());
    if ext.is_empty() {
        base
    } else {
        let mut s = base;
        s.push('.');
        s.push_str(&ext);
        s
    }
}

pub struct SdStorage<SPI: SpiDevice> {
    pub volume_mgr: VolumeManager<SdCard<SPI, esp_hal::delay::Delay>, GpsTimeSource>,
    // dir path -> (alias -> long name)
    names: BTreeMap<String, BTreeMap<String, String>>,
}

// open volume -> root -> each directory component, then run body
macro_rules! with_dir {
    ($self:ident, $dir:expr, |$d:ident| $body:expr) => {{
        let volume = $self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(map_err)?;
        let mut $d = volume.open_root_dir().map_err(map_err)?;
        for comp in $dir.split('/').filter(|c| !c.is_empty()) {
            let alias = fatname::short_name(comp);
            let next = $d.open_dir(alias.as_str()).map_err(map_err)?;
            $d = next;
        }
        $body
    }};
}

impl<SPI: SpiDevice> SdStorage<SPI> {
    pub fn new(spi: SPI) -> Self {
        let sdcard = SdCard::new(spi, esp_hal::delay::Delay::new());

        match sdcard.num_bytes() {
            Ok(bytes) => info!("SD card: {} bytes ({} MB)", bytes, bytes / 1024 / 1024),
            Err(e) => info!("SD card init failed: {:?}", e),
        }

        Self {
            volume_mgr: VolumeManager::new(sdcard, GpsTimeSource),
            names: BTreeMap::new(),
        }
    }

    fn load_names(&mut self, dir: &str) -> Result<()> {
        if self.names.contains_key(dir) {
            return Ok(());
        }
        let mut text = Vec::new();
        let loaded: Result<()> = with_dir!(self, dir, |d| {
            match d.open_file_in_dir(MAP_FILE, Mode::ReadOnly) {
                Ok(file) => {
                    text = vec![0u8; file.length() as usize];
                    let mut pos = 0;
                    while pos < text.len() {
                        let n = file.read(&mut text[pos..]).map_err(map_err)?;
                        if n == 0 {
                            break;
                        }
                        pos += n;
                    }
                    text.truncate(pos);
                    Ok(())
                }
                Err(embedded_sdmmc::Error::NotFound) => Ok(()),
                Err(e) => Err(map_err(e)),
            }
        });
        loaded?;
        let map = fatname::parse_map(&String::from_utf8_lossy(&text));
        self.names.insert(dir.to_string(), map);
        Ok(())
    }

    // alias for path; records the long name on first use
    fn resolve(&mut self, path: &str, create: bool) -> Result<(String, String)> {
        let (dir, name) = split_path(path);
        let alias = fatname::short_name(name);
        if create && !fatname::fits_83(name) {
            self.load_names(dir)?;
            let known = self
                .names
                .get(dir)
                .is_some_and(|m| m.contains_key(alias.as_str()));
            if !known {
                let line = fatname::map_line(alias.as_str(), name);
                with_dir!(self, dir, |d| {
                    let file = d
                        .open_file_in_dir(MAP_FILE, Mode::ReadWriteCreateOrAppend)
                        .map_err(map_err)?;
                    file.write(line.as_bytes()).map_err(map_err)?;
                    file.flush().map_err(map_err)
                })?;
                if let Some(m) = self.names.get_mut(dir) {
                    m.insert(alias.as_str().to_string(), name.to_string());
                }
            }
        }
        Ok((dir.to_string(), alias.as_str().to_string()))
    }
}

impl<SPI: SpiDevice> Storage for SdStorage<SPI> {
    fn present(&mut self) -> bool {
        self.volume_mgr.open_volume(VolumeIdx(0)).is_ok()
    }

    fn read(&mut self, path: &str, offset: u32, buf: &mut [u8]) -> Result<usize> {
        let (dir, alias) = self.resolve(path, false)?;
        with_dir!(self, dir, |d| {
            let file = d
                .open_file_in_dir(alias.as_str(), Mode::ReadOnly)
                .map_err(map_err)?;
            if offset >= file.length() {
                return Ok(0);
            }
            file.seek_from_start(offset).map_err(map_err)?;
            let mut total = 0;
            while !file.is_eof() && total < buf.len() {
                let n = file.read(&mut buf[total..]).map_err(map_err)?;
                if n == 0 {
                    break;
                }
                total += n;
            }
            Ok(total)
        })
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let (dir, alias) = self.resolve(path, true)?;
        with_dir!(self, dir, |d| {
            let file = d
                .open_file_in_dir(alias.as_str(), Mode::ReadWriteCreateOrTruncate)
                .map_err(map_err)?;
            file.write(data).map_err(map_err)?;
            file.flush().map_err(map_err)
        })
    }

    fn append(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let (dir, alias) = self.resolve(path, false)?;
        with_dir!(self, dir, |d| {
            let file = d
                .open_file_in_dir(alias.as_str(), Mode::ReadWriteAppend)
                .map_err(map_err)?;
            file.write(data).map_err(map_err)?;
            file.flush().map_err(map_err)
        })
    }

    fn size(&mut self, path: &str) -> Result<u32> {
        let (dir, alias) = self.resolve(path, false)?;
        with_dir!(self, dir, |d| {
            let file = d
                .open_file_in_dir(alias.as_str(), Mode::ReadOnly)
                .map_err(map_err)?;
            Ok(file.length())
        })
    }

    // FAT has no in-place truncate: keep the prefix and rewrite
    fn truncate(&mut self, path: &str, len: u32) -> Result<()> {
        let size = self.size(path)?;
        if len >= size {
            return Ok(());
        }
        let mut keep = vec![0u8; len as usize];
        let mut pos = 0;
        while pos < keep.len() {
            let n = self.read(path, pos as u32, &mut keep[pos..])?;
            if n == 0 {
                break;
            }
            pos += n;
        }
        keep.truncate(pos);
        self.write(path, &keep)
    }

    fn remove(&mut self, path: &str) -> Result<()> {
        let (dir, alias) = self.resolve(path, false)?;
        with_dir!(self, dir, |d| d.delete_file_in_dir(alias.as_str()).map_err(map_err))
    }

    fn ensure_dir(&mut self, path: &str) -> Result<()> {
        let volume = self.volume_mgr.open_volume(VolumeIdx(0)).map_err(map_err)?;
        let mut d = volume.open_root_dir().map_err(map_err)?;
        for comp in path.split('/').filter(|c| !c.is_empty()) {
            let alias = fatname::short_name(comp);
            match d.make_dir_in_dir(alias.as_str()) {
                Ok(()) | Err(embedded_sdmmc::Error::DirAlreadyExists) => {}
                Err(e) => return Err(map_err(e)),
            }
            let next = d.open_dir(alias.as_str()).map_err(map_err)?;
            d = next;
        }
        Ok(())
    }

    fn list(&mut self, dir: &str, out: &mut Vec<String>) -> Result<()> {
        self.load_names(dir)?;
        let mut raw = Vec::new();
        let listed: Result<()> = with_dir!(self, dir, |d| {
            d.iterate_dir(|entry| {
                if !entry.attributes.is_directory() {
                    raw.push(format_83(&entry.name));
                }
            })
            .map_err(map_err)
        });
        listed?;
        let map = self.names.get(dir);
        for alias in raw {
            if alias == MAP_FILE {
                continue;
            }
            let long = map.and_then(|m| m.get(&alias)).cloned();
            out.push(long.unwrap_or_else(|| alias.to_ascii_lowercase()));
        }
        Ok(())
    }
}
