// Incremental NMEA 0183 sentence parser
//
// Fed one byte at a time from the UART pipe. A sentence is framed by
// '$' .. '\n', checksum verified, then split on ','. Only GGA, RMC and
// MTK acknowledgements are decoded; every other well-formed sentence
// comes back as Other so it still counts toward the parse-error ratio.
//
// Coordinates are validated here: a fix outside |lat| <= 90,
// |lon| <= 180 is a parse error, never a published position.

use chrono::NaiveDate;

use crate::error::{Error, Result};

pub const MAX_SENTENCE: usize = 96;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gga {
    // ms since UTC midnight
    pub time_ms: u32,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub quality: u8,
    pub sats: u8,
    pub hdop: Option<f32>,
    pub alt_m: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rmc {
    pub time_ms: u32,
    pub valid: bool,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub speed_knots: Option<f32>,
    pub course_deg: Option<f32>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sentence {
    Gga(Gga),
    Rmc(Rmc),
    // $PMTK001,<cmd>,<flag>
    Ack { cmd: u16, flag: u8 },
    Other,
}

pub struct NmeaParser {
    buf: [u8; MAX_SENTENCE],
    len: usize,
    in_frame: bool,
}

impl NmeaParser {
    pub const fn new() -> Self {
        Self {
            buf: [0u8; MAX_SENTENCE],
            len: 0,
            in_frame: false,
        }
    }

    pub fn reset(&mut self) {
        self.len = 0;
        self.in_frame = false;
    }

    // Some(..) whenever a frame ends, good or bad
    pub fn feed(&mut self, byte: u8) -> Option<Result<Sentence>> {
        match byte {
            b'$' => {
                let truncated = self.in_frame && self.len > 0;
                self.in_frame = true;
                self.len = 0;
                truncated.then_some(Err(Error::Parse))
            }
            b'\r' => None,
            b'\n' => {
                if !self.in_frame {
                    return None;
                }
                self.in_frame = false;
                let result = parse_sentence(&self.buf[..self.len]);
                self.len = 0;
                Some(result)
            }
            _ if self.in_frame => {
                if self.len >= MAX_SENTENCE {
                    self.reset();
                    return Some(Err(Error::Parse));
                }
                self.buf[self.len] = byte;
                self.len += 1;
                None
            }
            _ => None,
        }
    }
}

impl Default for NmeaParser {
    fn default() -> Self {
        Self::new()
    }
}

// XOR of everything between '$' and '*'
pub fn checksum(body: &[u8]) -> u8 {
    body.iter().fold(0u8, |acc, &b| acc ^ b)
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

// body is the frame without the leading '$' and trailing CR/LF
fn parse_sentence(frame: &[u8]) -> Result<Sentence> {
    let star = frame.iter().rposition(|&b| b == b'*').ok_or(Error::Parse)?;
    if frame.len() != star + 3 {
        return Err(Error::Parse);
    }
    let body = &frame[..star];
    let expected = hex_val(frame[star + 1])
        .zip(hex_val(frame[star + 2]))
        .map(|(h, l)| (h << 4) | l)
        .ok_or(Error::Parse)?;
    if checksum(body) != expected {
        return Err(Error::Parse);
    }

    let body = core::str::from_utf8(body).map_err(|_| Error::Parse)?;
    let mut fields = body.split(',');
    let tag = fields.next().ok_or(Error::Parse)?;

    if tag == "PMTK001" {
        let cmd = parse_num::<u16>(fields.next())?.ok_or(Error::Parse)?;
        let flag = parse_num::<u8>(fields.next())?.ok_or(Error::Parse)?;
        return Ok(Sentence::Ack { cmd, flag });
    }
    if tag.len() != 5 || !tag.is_ascii() {
        return Ok(Sentence::Other);
    }
    match &tag[2..] {
        "GGA" => parse_gga(&mut fields).map(Sentence::Gga),
        "RMC" => parse_rmc(&mut fields).map(Sentence::Rmc),
        _ => Ok(Sentence::Other),
    }
}

fn parse_gga<'a>(f: &mut impl Iterator<Item = &'a str>) -> Result<Gga> {
    let time_ms = parse_time(f.next())?;
    let (lat, lon) = parse_position(f)?;
    let quality = parse_num::<u8>(f.next())?.unwrap_or(0);
    let sats = parse_num::<u8>(f.next())?.unwrap_or(0);
    let hdop = parse_num::<f32>(f.next())?;
    let alt_m = parse_num::<f32>(f.next())?;
    Ok(Gga {
        time_ms,
        lat,
        lon,
        quality,
        sats,
        hdop,
        alt_m,
    })
}

fn parse_rmc<'a>(f: &mut impl Iterator<Item = &'a str>) -> Result<Rmc> {
    let time_ms = parse_time(f.next())?;
    let valid = f.next() == Some("A");
    let (lat, lon) = parse_position(f)?;
    let speed_knots = parse_num::<f32>(f.next())?;
    let course_deg = parse_num::<f32>(f.next())?;
    let date = parse_date(f.next())?;
    if speed_knots.is_some_and(|s| s < 0.0) {
        return Err(Error::Parse);
    }
    Ok(Rmc {
        time_ms,
        valid,
        lat,
        lon,
        speed_knots,
        course_deg,
        date,
    })
}

fn parse_num<T: core::str::FromStr>(field: Option<&str>) -> Result<Option<T>> {
    match field {
        None | Some("") => Ok(None),
        Some(s) => s.parse::<T>().map(Some).map_err(|_| Error::Parse),
    }
}

// hhmmss[.sss] -> ms since midnight
fn parse_time(field: Option<&str>) -> Result<u32> {
    let s = field.ok_or(Error::Parse)?;
    if s.len() < 6 || !s.is_ascii() {
        return Err(Error::Parse);
    }
    let hh: u32 = s[0..2].parse().map_err(|_| Error::Parse)?;
    let mm: u32 = s[2..4].parse().map_err(|_| Error::Parse)?;
    let secs: f32 = s[4..].parse().map_err(|_| Error::Parse)?;
    if hh > 23 || mm > 59 || !(0.0..61.0).contains(&secs) {
        return Err(Error::Parse);
    }
    Ok((hh * 3600 + mm * 60) * 1000 + libm::roundf(secs * 1000.0) as u32)
}

// ddmmyy
fn parse_date(field: Option<&str>) -> Result<Option<NaiveDate>> {
    let s = match field {
        None | Some("") => return Ok(None),
        Some(s) => s,
    };
    if s.len() != 6 || !s.is_ascii() {
        return Err(Error::Parse);
    }
    let dd: u32 = s[0..2].parse().map_err(|_| Error::Parse)?;
    let mm: u32 = s[2..4].parse().map_err(|_| Error::Parse)?;
    let yy: i32 = s[4..6].parse().map_err(|_| Error::Parse)?;
    NaiveDate::from_ymd_opt(2000 + yy, mm, dd)
        .map(Some)
        .ok_or(Error::Parse)
}

// (d)ddmm.mmmm,H pairs for latitude then longitude
fn parse_position<'a>(
    f: &mut impl Iterator<Item = &'a str>,
) -> Result<(Option<f64>, Option<f64>)> {
    let lat = parse_coord(f.next(), f.next(), b'N', b'S', 90.0)?;
    let lon = parse_coord(f.next(), f.next(), b'E', b'W', 180.0)?;
    Ok((lat, lon))
}

fn parse_coord(
    value: Option<&str>,
    hemi: Option<&str>,
    pos: u8,
    neg: u8,
    limit: f64,
) -> Result<Option<f64>> {
    let Some(raw) = parse_num::<f64>(value)? else {
        return Ok(None);
    };
    let sign = match hemi.and_then(|h| h.bytes().next()) {
        Some(h) if h == pos => 1.0,
        Some(h) if h == neg => -1.0,
        _ => return Err(Error::Parse),
    };
    let degrees = libm::floor(raw / 100.0);
    let minutes = raw - degrees * 100.0;
    if minutes >= 60.0 {
        return Err(Error::Parse);
    }
    let deg = sign * (degrees + minutes / 60.0);
    if deg.abs() > limit {
        return Err(Error::Parse);
    }
    Ok(Some(deg))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloc::format;
    use alloc::string::String;

    // wrap a body into a complete sentence with a valid checksum
    pub(crate) fn sentence(body: &str) -> String {
        format!("${}*{:02X}\r\n", body, checksum(body.as_bytes()))
    }

    fn parse_all(p: &mut NmeaParser, text: &str) -> alloc::vec::Vec<Result<Sentence>> {
        text.bytes().filter_map(|b| p.feed(b)).collect()
    }

    #[test]
    fn test_gga_decodes() {
        let mut p = NmeaParser::new();
        let s = sentence("GPGGA,123519.00,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,");
        let out = parse_all(&mut p, &s);
        let Ok(Sentence::Gga(g)) = out[0] else {
            panic!("expected GGA, got {:?}", out);
        };
        assert_eq!(g.time_ms, (12 * 3600 + 35 * 60 + 19) * 1000);
        assert!((g.lat.unwrap() - 48.1173).abs() < 1e-4);
        assert!((g.lon.unwrap() - 11.516_666).abs() < 1e-4);
        assert_eq!(g.quality, 1);
        assert_eq!(g.sats, 8);
        assert_eq!(g.hdop, Some(0.9));
        assert_eq!(g.alt_m, Some(545.4));
    }

    #[test]
    fn test_rmc_decodes_southwest() {
        let mut p = NmeaParser::new();
        let s = sentence("GNRMC,081836.50,A,3751.65,S,14507.36,W,12.5,311.1,130998,,,A");
        let out = parse_all(&mut p, &s);
        let Ok(Sentence::Rmc(r)) = out[0] else {
            panic!("expected RMC, got {:?}", out);
        };
        assert!(r.valid);
        assert!(r.lat.unwrap() < -37.0 && r.lon.unwrap() < -145.0);
        assert_eq!(r.speed_knots, Some(12.5));
        assert_eq!(r.course_deg, Some(311.1));
        assert_eq!(r.date, NaiveDate::from_ymd_opt(2098, 9, 13));
        assert_eq!(r.time_ms % 1000, 500);
    }

    #[test]
    fn test_bad_checksum_is_error() {
        let mut p = NmeaParser::new();
        let out = parse_all(&mut p, "$GPGGA,123519,,,,,0,00,,,M,,M,,*00\r\n");
        assert_eq!(out, [Err(Error::Parse)]);
    }

    #[test]
    fn test_truncated_frame_reported_on_next_dollar() {
        let mut p = NmeaParser::new();
        let good = sentence("GPGSV,1,1,00");
        let text = format!("$GPGGA,1235{}", good);
        let out = parse_all(&mut p, &text);
        assert_eq!(out, [Err(Error::Parse), Ok(Sentence::Other)]);
    }

    #[test]
    fn test_overlong_frame_is_error() {
        let mut p = NmeaParser::new();
        let mut text = String::from("$");
        for _ in 0..MAX_SENTENCE + 4 {
            text.push('A');
        }
        let out = parse_all(&mut p, &text);
        assert_eq!(out, [Err(Error::Parse)]);
    }

    #[test]
    fn test_out_of_range_latitude_rejected() {
        let mut p = NmeaParser::new();
        let s = sentence("GPGGA,123519,9107.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,");
        assert_eq!(parse_all(&mut p, &s), [Err(Error::Parse)]);
    }

    #[test]
    fn test_mtk_ack() {
        let mut p = NmeaParser::new();
        let out = parse_all(&mut p, &sentence("PMTK001,220,3"));
        assert_eq!(out, [Ok(Sentence::Ack { cmd: 220, flag: 3 })]);
    }

    #[test]
    fn test_known_checksums() {
        assert_eq!(checksum(b"PMTK220,100"), 0x2F);
        assert_eq!(checksum(b"PMTK161,0"), 0x28);
    }
}
