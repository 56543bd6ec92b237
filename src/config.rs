// Boot configuration in /config.txt, read once at boot
// Same key=value format as the settings file. Changing these needs a
// restart: they size buffers and configure the UART and the panel.

use log::{info, warn};

use crate::drivers::panel::Orientation;
use crate::drivers::storage::{Storage, read_to_vec};
use crate::map::tiles::{DEFAULT_CACHE_BYTES, TILE_BYTES};
use crate::settings::kv_lines;

pub const CONFIG_FILE: &str = "/config.txt";
const MAX_BYTES: usize = 1024;

const BAUD_RATES: [u32; 9] = [4_800, 9_600, 19_200, 38_400, 57_600, 115_200, 230_400, 460_800, 921_600];
pub const RING_MIN: usize = 16;
pub const RING_MAX: usize = 1024;
pub const CACHE_TILES_MAX: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootConfig {
    pub gps_baud: u32,
    pub orientation: Orientation,
    pub cache_bytes: usize,
    pub ring_size: usize,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            gps_baud: 115_200,
            orientation: Orientation::Portrait,
            cache_bytes: DEFAULT_CACHE_BYTES,
            ring_size: 256,
        }
    }
}

impl BootConfig {
    pub fn parse(text: &str) -> Self {
        let mut cfg = Self::default();
        for (key, val) in kv_lines(text) {
            match key {
                "gps.baud" => match val.parse::<u32>() {
                    Ok(b) if BAUD_RATES.contains(&b) => cfg.gps_baud = b,
                    _ => warn!("config: unsupported gps.baud {}", val),
                },
                "display.orientation" => match val {
                    "portrait" => cfg.orientation = Orientation::Portrait,
                    "portrait-flipped" => cfg.orientation = Orientation::PortraitFlipped,
                    _ => warn!("config: unknown display.orientation {}", val),
                },
                "tiles.cacheBytes" => {
                    if let Ok(n) = val.parse::<usize>() {
                        cfg.cache_bytes = n.clamp(TILE_BYTES, CACHE_TILES_MAX * TILE_BYTES);
                    }
                }
                "tracker.ringSize" => {
                    if let Ok(n) = val.parse::<usize>() {
                        cfg.ring_size = n.clamp(RING_MIN, RING_MAX);
                    }
                }
                _ => {}
            }
        }
        cfg
    }

    pub fn load<S: Storage>(storage: &mut S) -> Self {
        let cfg = match read_to_vec(storage, CONFIG_FILE, MAX_BYTES) {
            Ok(bytes) => Self::parse(core::str::from_utf8(&bytes).unwrap_or("")),
            Err(_) => Self::default(),
        };
        info!(
            "config: gps {} baud, {:?}, {} tiles cached, ring {}",
            cfg.gps_baud,
            cfg.orientation,
            cfg.cache_bytes / TILE_BYTES,
            cfg.ring_size
        );
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::storage::MemStorage;

    #[test]
    fn test_defaults_without_file() {
        let mut sd = MemStorage::new();
        let cfg = BootConfig::load(&mut sd);
        assert_eq!(cfg, BootConfig::default());
        assert_eq!(cfg.cache_bytes, 50 * TILE_BYTES);
    }

    #[test]
    fn test_parse_and_clamp() {
        let mut sd = MemStorage::new();
        sd.put(
            CONFIG_FILE,
            b"gps.baud=9600\ndisplay.orientation=portrait-flipped\ntracker.ringSize=4\ntiles.cacheBytes=10\n",
        );
        let cfg = BootConfig::load(&mut sd);
        assert_eq!(cfg.gps_baud, 9_600);
        assert_eq!(cfg.orientation, Orientation::PortraitFlipped);
        assert_eq!(cfg.ring_size, RING_MIN);
        assert_eq!(cfg.cache_bytes, TILE_BYTES, "at least one tile");

        let cfg = BootConfig::parse("gps.baud=12345\ntracker.ringSize=99999\n");
        assert_eq!(cfg.gps_baud, 115_200, "odd rates rejected");
        assert_eq!(cfg.ring_size, RING_MAX);
    }
}
