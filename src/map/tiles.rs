// PSRAM tile cache
//
// Bounded LRU of decoded 256x256 RGB565 tiles. The renderer pins what
// it draws for the length of a frame; a miss queues the key and the
// renderer draws a placeholder. Decoding runs as a background job, one
// tile at a time, nearest-to-centre first, in as many quanta as it
// takes.
//
// A decode claims its buffer before it starts: a free slot, else the
// least recently used unpinned entry (exactly one eviction). The file is
// opened first, so a tile absent from the card never costs an entry.
// When every entry is pinned nothing is evicted and the key waits.
//
// Missing or broken tiles go to a small negative cache so they are not
// retried every frame.

use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Write;

use log::{debug, warn};

use super::png::{PngDecoder, Progress, TILE_PX};
use super::projection::TileKey;
use crate::drivers::storage::{OpenMode, Storage};
use crate::error::{Error, Result};
use crate::kernel::Quantum;

pub const TILE_BYTES: usize = TILE_PX * TILE_PX * 2;
pub const DEFAULT_CACHE_BYTES: usize = 50 * TILE_BYTES;
const PENDING_MAX: usize = 16;
const NEGATIVE_MAX: usize = 64;

struct Entry {
    key: TileKey,
    pixels: Vec<u16>,
    pins: u16,
    last_used: u64,
}

struct Decode {
    key: TileKey,
    decoder: PngDecoder,
    buf: Vec<u16>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
    pub evictions: u32,
    pub decoded: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Idle,
    InProgress,
    Landed(TileKey),
    // missing or unreadable, now in the negative cache
    Failed(TileKey),
}

pub struct TileCache {
    capacity: usize,
    entries: Vec<Entry>,
    clock: u64,
    pending: Vec<TileKey>,
    missing: VecDeque<TileKey>,
    decoding: Option<Decode>,
    // a buffer freed by a failed decode, reused by the next one
    spare: Option<Vec<u16>>,
    stats: CacheStats,
    exhausted: bool,
}

impl TileCache {
    pub fn new(cache_bytes: usize) -> Self {
        let capacity = (cache_bytes / TILE_BYTES).max(1);
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
            clock: 0,
            pending: Vec::new(),
            missing: VecDeque::new(),
            decoding: None,
            spare: None,
            stats: CacheStats::default(),
            exhausted: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    // last decode could not get a buffer because everything was pinned
    pub fn exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn has_work(&self) -> bool {
        self.decoding.is_some() || !self.pending.is_empty()
    }

    pub fn is_missing(&self, key: &TileKey) -> bool {
        self.missing.contains(key)
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.entries.iter().any(|e| e.key == *key)
    }

    pub fn pinned(&self) -> usize {
        self.entries.iter().filter(|e| e.pins > 0).count()
    }

    // Pin a tile for drawing. None means draw the placeholder; the key
    // is queued for decoding unless it is known to be missing.
    pub fn pin(&mut self, key: TileKey) -> Option<usize> {
        self.clock += 1;
        if let Some(i) = self.entries.iter().position(|e| e.key == key) {
            let e = &mut self.entries[i];
            e.pins += 1;
            e.last_used = self.clock;
            self.stats.hits += 1;
            return Some(i);
        }
        self.stats.misses += 1;
        self.request(key);
        None
    }

    pub fn pixels(&self, slot: usize) -> &[u16] {
        self.entries
            .get(slot)
            .map(|e| e.pixels.as_slice())
            .unwrap_or(&[])
    }

    pub fn unpin_all(&mut self) {
        for e in self.entries.iter_mut() {
            e.pins = 0;
        }
    }

    // drop queued keys the viewport no longer wants
    pub fn retain_pending(&mut self, mut keep: impl FnMut(&TileKey) -> bool) {
        self.pending.retain(|k| keep(k));
    }

    pub fn request(&mut self, key: TileKey) {
        if self.is_missing(&key)
            || self.pending.contains(&key)
            || self.decoding.as_ref().is_some_and(|d| d.key == key)
        {
            return;
        }
        if self.pending.len() >= PENDING_MAX {
            self.pending.remove(0);
        }
        self.pending.push(key);
    }

    // forget negative entries, e.g. after a card swap
    pub fn clear_missing(&mut self) {
        self.missing.clear();
    }

    // One quantum of decode work for the job runner.
    pub fn decode_step<S: Storage>(
        &mut self,
        storage: &mut S,
        center: TileKey,
        quantum: &mut Quantum,
    ) -> Result<StepOutcome> {
        if self.decoding.is_none()
            && let Some(outcome) = self.start_next(storage, center)?
        {
            return Ok(outcome);
        }

        while !quantum.expired() {
            let Some(d) = self.decoding.as_mut() else {
                break;
            };
            quantum.step();
            match d.decoder.step(storage, &mut d.buf) {
                Ok(Progress::Pending) => {}
                Ok(Progress::Done) => {
                    let key = d.key;
                    self.land();
                    return Ok(StepOutcome::Landed(key));
                }
                Err(Error::NoMedia) => {
                    // keep the key queued for when the card is back
                    if let Some(d) = self.decoding.take() {
                        self.pending.push(d.key);
                        self.spare = Some(d.buf);
                    }
                    return Err(Error::NoMedia);
                }
                Err(e) => {
                    let key = d.key;
                    self.fail(e);
                    return Ok(StepOutcome::Failed(key));
                }
            }
        }
        Ok(StepOutcome::InProgress)
    }

    // None once a decode is under way
    fn start_next<S: Storage>(
        &mut self,
        storage: &mut S,
        center: TileKey,
    ) -> Result<Option<StepOutcome>> {
        let Some(pos) = self
            .pending
            .iter()
            .enumerate()
            .min_by_key(|(_, k)| k.distance(&center))
            .map(|(i, _)| i)
        else {
            return Ok(Some(StepOutcome::Idle));
        };

        let key = self.pending[pos];
        let mut path = String::new();
        let _ = write!(path, "{}", key);
        match storage.open(&path, OpenMode::Read) {
            Err(Error::NotFound) => {
                self.pending.remove(pos);
                self.stats.failed += 1;
                self.remember_missing(key);
                return Ok(Some(StepOutcome::Failed(key)));
            }
            Err(Error::NoMedia) => return Err(Error::NoMedia),
            // anything else surfaces from the decoder
            _ => {}
        }

        let Some(buf) = self.claim_buffer() else {
            if !self.exhausted {
                warn!("tiles: all {} entries pinned, decode deferred", self.entries.len());
            }
            self.exhausted = true;
            return Err(Error::CacheExhausted);
        };
        self.exhausted = false;

        self.pending.remove(pos);
        debug!("tiles: decoding {}", path);
        self.decoding = Some(Decode {
            key,
            decoder: PngDecoder::new(&path),
            buf,
        });
        Ok(None)
    }

    fn claim_buffer(&mut self) -> Option<Vec<u16>> {
        if let Some(buf) = self.spare.take() {
            return Some(buf);
        }
        if self.entries.len() < self.capacity {
            return Some(vec![0u16; TILE_PX * TILE_PX]);
        }
        let victim = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.pins == 0)
            .min_by_key(|(_, e)| e.last_used)
            .map(|(i, _)| i)?;
        let old = self.entries.swap_remove(victim);
        self.stats.evictions += 1;
        debug!("tiles: evicted {}", old.key);
        Some(old.pixels)
    }

    fn land(&mut self) {
        if let Some(d) = self.decoding.take() {
            self.clock += 1;
            self.stats.decoded += 1;
            self.entries.push(Entry {
                key: d.key,
                pixels: d.buf,
                pins: 0,
                last_used: self.clock,
            });
        }
    }

    fn fail(&mut self, e: Error) {
        if let Some(d) = self.decoding.take() {
            if e != Error::NotFound {
                warn!("tiles: {} unusable ({})", d.key, e);
            }
            self.stats.failed += 1;
            self.remember_missing(d.key);
            self.spare = Some(d.buf);
        }
    }

    fn remember_missing(&mut self, key: TileKey) {
        if self.missing.len() >= NEGATIVE_MAX {
            self.missing.pop_front();
        }
        self.missing.push_back(key);
    }
}
