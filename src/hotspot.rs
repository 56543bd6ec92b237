// Wi-Fi transfer hotspot
// The core only starts/stops the access point and polls the client
// count; the HTTP file server lives with the radio adapter.

use crate::error::Result;
use crate::ui::StackFmt;

const SSID_PREFIX: &str = "ridenav-";
const PASSWORD_LEN: usize = 8;
// no 0/o/1/l/i: the password is read off the panel
const PASSWORD_CHARS: &[u8] = b"abcdefghjkmnpqrstuvwxyz23456789";
const CLIENT_POLL_MS: u64 = 1_000;

pub trait Hotspot {
    fn start_ap(&mut self, ssid: &str, password: &str) -> Result<()>;
    fn stop_ap(&mut self) -> Result<()>;
    fn clients(&mut self) -> u8;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HotspotStatus {
    pub active: bool,
    pub ssid: StackFmt<16>,
    pub password: StackFmt<12>,
    pub clients: u8,
}

// "ridenav-XXXX" from the low 16 bits of the device id
pub fn ssid_for(device_id: u64) -> StackFmt<16> {
    StackFmt::from_args(format_args!("{}{:04X}", SSID_PREFIX, device_id & 0xFFFF))
}

// stable per device, so a laptop that joined once joins again
pub fn password_for(device_id: u64) -> StackFmt<12> {
    let mut x = device_id ^ 0x9E37_79B9_7F4A_7C15;
    let mut out = StackFmt::new();
    for _ in 0..PASSWORD_LEN {
        // splitmix64 step
        x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = x;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        let c = PASSWORD_CHARS[(z % PASSWORD_CHARS.len() as u64) as usize];
        let _ = core::fmt::Write::write_char(&mut out, c as char);
    }
    out
}

// connect-mode state driven by the connect screen
pub struct ConnectMode {
    status: HotspotStatus,
    last_poll_ms: u64,
}

impl ConnectMode {
    pub const fn new() -> Self {
        Self {
            status: HotspotStatus {
                active: false,
                ssid: StackFmt::new(),
                password: StackFmt::new(),
                clients: 0,
            },
            last_poll_ms: 0,
        }
    }

    pub fn status(&self) -> HotspotStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status.active
    }

    pub fn start<H: Hotspot>(&mut self, hotspot: &mut H, device_id: u64, now_ms: u64) -> Result<()> {
        if self.status.active {
            return Ok(());
        }
        let ssid = ssid_for(device_id);
        let password = password_for(device_id);
        hotspot.start_ap(ssid.as_str(), password.as_str())?;
        log::info!("hotspot: up as {}", ssid);
        self.status = HotspotStatus {
            active: true,
            ssid,
            password,
            clients: 0,
        };
        self.last_poll_ms = now_ms;
        Ok(())
    }

    pub fn stop<H: Hotspot>(&mut self, hotspot: &mut H) {
        if !self.status.active {
            return;
        }
        if let Err(e) = hotspot.stop_ap() {
            log::warn!("hotspot: stop failed: {}", e);
        }
        log::info!("hotspot: down");
        self.status = HotspotStatus::default();
    }

    // true when the client count changed
    pub fn poll<H: Hotspot>(&mut self, hotspot: &mut H, now_ms: u64) -> bool {
        if !self.status.active || now_ms.saturating_sub(self.last_poll_ms) < CLIENT_POLL_MS {
            return false;
        }
        self.last_poll_ms = now_ms;
        let n = hotspot.clients();
        if n == self.status.clients {
            return false;
        }
        log::info!("hotspot: {} client(s)", n);
        self.status.clients = n;
        true
    }
}

impl Default for ConnectMode {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "firmware")]
pub use radio::RadioHotspot;

#[cfg(feature = "firmware")]
mod radio {
    use alloc::string::String;
    use core::sync::atomic::{AtomicU8, Ordering};

    use esp_radio::wifi::event::{AccessPointStationConnected, AccessPointStationDisconnected, EventExt};
    use esp_radio::wifi::{AccessPointConfig, AuthMethod, ModeConfig, WifiController};

    use super::Hotspot;
    use crate::error::{Error, Result};

    static CLIENTS: AtomicU8 = AtomicU8::new(0);

    pub struct RadioHotspot {
        ctrl: WifiController<'static>,
    }

    impl RadioHotspot {
        pub fn new(ctrl: WifiController<'static>) -> Self {
            AccessPointStationConnected::update_handler(|_| {
                CLIENTS.fetch_add(1, Ordering::Relaxed);
            });
            AccessPointStationDisconnected::update_handler(|_| {
                let _ = CLIENTS.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
            });
            Self { ctrl }
        }
    }

    impl Hotspot for RadioHotspot {
        fn start_ap(&mut self, ssid: &str, password: &str) -> Result<()> {
            let cfg = AccessPointConfig::default()
                .with_ssid(String::from(ssid))
                .with_password(String::from(password))
                .with_auth_method(AuthMethod::Wpa2Personal);
            self.ctrl.set_config(&ModeConfig::AccessPoint(cfg)).map_err(|e| {
                log::warn!("hotspot: set_config failed: {:?}", e);
                Error::Io
            })?;
            self.ctrl.start().map_err(|e| {
                log::warn!("hotspot: start failed: {:?}", e);
                Error::Io
            })?;
            CLIENTS.store(0, Ordering::Relaxed);
            Ok(())
        }

        fn stop_ap(&mut self) -> Result<()> {
            CLIENTS.store(0, Ordering::Relaxed);
            self.ctrl.stop().map_err(|e| {
                log::warn!("hotspot: stop failed: {:?}", e);
                Error::Io
            })
        }

        fn clients(&mut self) -> u8 {
            CLIENTS.load(Ordering::Relaxed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[derive(Default)]
    struct FakeAp {
        up: Option<(alloc::string::String, alloc::string::String)>,
        clients: u8,
        refuse: bool,
    }

    impl Hotspot for FakeAp {
        fn start_ap(&mut self, ssid: &str, password: &str) -> Result<()> {
            if self.refuse {
                return Err(Error::Io);
            }
            self.up = Some((ssid.into(), password.into()));
            Ok(())
        }

        fn stop_ap(&mut self) -> Result<()> {
            self.up = None;
            Ok(())
        }

        fn clients(&mut self) -> u8 {
            self.clients
        }
    }

    #[test]
    fn test_credentials_are_stable() {
        assert_eq!(ssid_for(0x1234_5678_9ABC).as_str(), "ridenav-9ABC");
        let a = password_for(42);
        assert_eq!(a, password_for(42), "same device, same password");
        assert_ne!(a, password_for(43));
        assert_eq!(a.len(), PASSWORD_LEN);
        assert!(a.as_str().bytes().all(|b| PASSWORD_CHARS.contains(&b)));
    }

    #[test]
    fn test_start_poll_stop() {
        let mut ap = FakeAp::default();
        let mut mode = ConnectMode::new();
        mode.start(&mut ap, 0xBEEF, 0).unwrap();
        let (ssid, pass) = ap.up.clone().unwrap();
        assert_eq!(ssid, "ridenav-BEEF");
        assert_eq!(pass, mode.status().password.as_str());

        ap.clients = 1;
        assert!(!mode.poll(&mut ap, 500), "polled at most once a second");
        assert!(mode.poll(&mut ap, 1_000));
        assert_eq!(mode.status().clients, 1);

        mode.stop(&mut ap);
        assert!(ap.up.is_none());
        assert_eq!(mode.status(), HotspotStatus::default());
    }

    #[test]
    fn test_start_failure_leaves_inactive() {
        let mut ap = FakeAp {
            refuse: true,
            ..Default::default()
        };
        let mut mode = ConnectMode::new();
        assert_eq!(mode.start(&mut ap, 1, 0), Err(Error::Io));
        assert!(!mode.is_active());
    }
}
