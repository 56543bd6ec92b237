// Long name -> FAT 8.3 alias mapping
//
// Names that already fit 8.3 are only upper-cased. Anything else
// becomes '~' + 7 hex digits of its FNV-1a hash, keeping up to three
// characters of the extension: "20260501-093000.gpx" -> "~1C0FFEE.GPX".
// Each directory keeps NAMES.MAP ("ALIAS\tlong name\n" lines) so a
// listing can hand back the long names.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};

use crate::ui::stack_fmt::StackFmt;

pub const MAP_FILE: &str = "NAMES.MAP";

#[inline]
pub fn fnv1a(data: &[u8]) -> u32 {
    let mut h: u32 = 0x811c_9dc5;
    for &b in data {
        h ^= b as u32;
        h = h.wrapping_mul(0x0100_0193);
    }
    h
}

fn valid_83_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"_-~!#$%&'(){}^@`".contains(&b)
}

pub fn fits_83(name: &str) -> bool {
    let (base, ext) = match name.rfind('.') {
        Some(i) => (&name[..i], &name[i + 1..]),
        None => (name, ""),
    };
    !base.is_empty()
        && base.len() <= 8
        && ext.len() <= 3
        && base.bytes().chain(ext.bytes()).all(valid_83_char)
}

pub fn short_name(name: &str) -> StackFmt<12> {
    if fits_83(name) {
        return StackFmt::from_args(format_args!("{}", name.to_ascii_uppercase()));
    }
    let h = fnv1a(name.as_bytes()) & 0x0FFF_FFFF;
    let ext = name
        .rfind('.')
        .map(|i| &name[i + 1..])
        .filter(|e| !e.is_empty() && e.bytes().all(valid_83_char))
        .unwrap_or("");
    let ext3 = &ext[..ext.len().min(3)];
    if ext3.is_empty() {
        StackFmt::from_args(format_args!("~{:07X}", h))
    } else {
        StackFmt::from_args(format_args!("~{:07X}.{}", h, ext3.to_ascii_uppercase()))
    }
}

// alias -> long name
pub fn parse_map(text: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for line in text.lines() {
        if let Some((alias, long)) = line.split_once('\t') {
            if !alias.is_empty() && !long.is_empty() {
                map.insert(alias.to_string(), long.to_string());
            }
        }
    }
    map
}

pub fn map_line(alias: &str, long: &str) -> String {
    let mut s = String::with_capacity(alias.len() + long.len() + 2);
    s.push_str(alias);
    s.push('\t');
    s.push_str(long);
    s.push('\n');
    s
}
