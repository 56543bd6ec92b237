// Minimal XML element scanner for GPX
//
// Not a general-purpose parser. Forward-only over a byte slice,
// lenient about whitespace, namespace prefixes ignored ("gpx:trkpt"
// matches "trkpt"). Enough to replay our own tracks and to find the
// last complete point of a file cut off mid-write.

pub fn get_attr<'a>(tag_bytes: &'a [u8], attr_name: &[u8]) -> Option<&'a [u8]> {
    let mut pos = 0;
    let len = tag_bytes.len();

    // skip past tag name
    while pos < len && !is_tag_delim(tag_bytes[pos]) {
        pos += 1;
    }

    while pos < len {
        while pos < len && is_ws(tag_bytes[pos]) {
            pos += 1;
        }
        if pos >= len || tag_bytes[pos] == b'>' || tag_bytes[pos] == b'/' {
            break;
        }

        let name_start = pos;
        while pos < len && tag_bytes[pos] != b'=' && !is_tag_delim(tag_bytes[pos]) {
            pos += 1;
        }
        let name_end = pos;

        while pos < len && is_ws(tag_bytes[pos]) {
            pos += 1;
        }
        if pos >= len || tag_bytes[pos] != b'=' {
            continue;
        }
        pos += 1;
        while pos < len && is_ws(tag_bytes[pos]) {
            pos += 1;
        }
        if pos >= len {
            break;
        }

        let quote = tag_bytes[pos];
        if quote != b'"' && quote != b'\'' {
            // unquoted values are not XML; skip the token
            while pos < len && !is_ws(tag_bytes[pos]) && tag_bytes[pos] != b'>' {
                pos += 1;
            }
            continue;
        }
        pos += 1;

        let value_start = pos;
        while pos < len && tag_bytes[pos] != quote {
            pos += 1;
        }
        let value_end = pos;
        if pos < len {
            pos += 1;
        }

        if &tag_bytes[name_start..name_end] == attr_name {
            return Some(&tag_bytes[value_start..value_end]);
        }
    }

    None
}

// trimmed text of the first child element named tag_name
pub fn tag_text<'a>(data: &'a [u8], tag_name: &[u8]) -> Option<&'a [u8]> {
    let mut found = None;
    for_each_element(data, tag_name, |el| {
        if found.is_none() {
            found = Some(trim_ws(el.inner));
        }
    });
    found
}

#[derive(Debug, Clone, Copy)]
pub struct Element<'a> {
    // offset of the opening '<'
    pub start: usize,
    // bytes between '<' and '>' of the opening tag
    pub tag: &'a [u8],
    // content between the opening and closing tags
    pub inner: &'a [u8],
    // offset just past the closing '>'
    pub end: usize,
}

// Every complete element named tag_name, in document order. Elements
// of that name nested inside a match are not visited separately; an
// element whose closing tag is missing ends the scan.
pub fn for_each_element<'a>(data: &'a [u8], tag_name: &[u8], mut cb: impl FnMut(Element<'a>)) {
    let mut pos = 0;

    while pos < data.len() {
        let Some(lt) = find_byte(&data[pos..], b'<') else {
            break;
        };
        let lt = pos + lt;
        pos = lt + 1;
        if pos >= data.len() {
            break;
        }

        if matches!(data[pos], b'/' | b'?' | b'!') {
            pos = skip_construct(data, lt);
            continue;
        }

        let name_start = pos;
        while pos < data.len() && !is_tag_delim(data[pos]) {
            pos += 1;
        }
        let name = &data[name_start..pos];
        let gt = skip_to_gt(data, pos);
        if !tag_name_matches(name, tag_name) {
            pos = gt;
            continue;
        }
        if gt > data.len() || data.get(gt - 1) != Some(&b'>') {
            break;
        }
        let tag = &data[name_start..gt - 1];

        // self-closing
        if tag.last() == Some(&b'/') {
            cb(Element {
                start: lt,
                tag,
                inner: &[],
                end: gt,
            });
            pos = gt;
            continue;
        }

        let Some((close_start, close_end)) = find_close(data, gt, tag_name) else {
            break;
        };
        cb(Element {
            start: lt,
            tag,
            inner: &data[gt..close_start],
            end: close_end,
        });
        pos = close_end;
    }
}

// first "</name>" at or after pos; (start of '<', offset past '>')
fn find_close(data: &[u8], mut pos: usize, tag_name: &[u8]) -> Option<(usize, usize)> {
    while pos + 1 < data.len() {
        let lt = pos + find_byte(&data[pos..], b'<')?;
        if data.get(lt + 1) == Some(&b'/') {
            let name_start = lt + 2;
            let mut p = name_start;
            while p < data.len() && !is_tag_delim(data[p]) {
                p += 1;
            }
            if tag_name_matches(&data[name_start..p], tag_name) {
                let gt = skip_to_gt(data, p);
                if data.get(gt.wrapping_sub(1)) == Some(&b'>') {
                    return Some((lt, gt));
                }
                return None;
            }
        }
        pos = lt + 1;
    }
    None
}

// "gpx:trkpt" matches target "trkpt"
fn tag_name_matches(full_name: &[u8], target: &[u8]) -> bool {
    if full_name == target {
        return true;
    }
    if full_name.len() > target.len() + 1 {
        let colon_pos = full_name.len() - target.len() - 1;
        if full_name[colon_pos] == b':' && &full_name[colon_pos + 1..] == target {
            return true;
        }
    }
    false
}

fn find_byte(haystack: &[u8], needle: u8) -> Option<usize> {
    haystack.iter().position(|&b| b == needle)
}

#[inline]
fn is_ws(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

#[inline]
fn is_tag_delim(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'>' | b'/')
}

fn skip_to_gt(data: &[u8], mut pos: usize) -> usize {
    while pos < data.len() {
        if data[pos] == b'>' {
            return pos + 1;
        }
        pos += 1;
    }
    data.len()
}

fn skip_construct(data: &[u8], lt_pos: usize) -> usize {
    let pos = lt_pos + 1;
    if pos >= data.len() {
        return data.len();
    }

    match data[pos] {
        b'?' => find_seq(data, pos + 1, b"?>"),
        b'!' if data[pos + 1..].starts_with(b"--") => find_seq(data, pos + 3, b"-->"),
        _ => skip_to_gt(data, pos),
    }
}

fn find_seq(data: &[u8], from: usize, seq: &[u8]) -> usize {
    data.get(from..)
        .and_then(|rest| rest.windows(seq.len()).position(|w| w == seq))
        .map(|p| from + p + seq.len())
        .unwrap_or(data.len())
}

pub fn trim_ws(data: &[u8]) -> &[u8] {
    let start = data.iter().position(|b| !is_ws(*b)).unwrap_or(data.len());
    let end = data
        .iter()
        .rposition(|b| !is_ws(*b))
        .map(|p| p + 1)
        .unwrap_or(start);
    if start >= end { &[] } else { &data[start..end] }
}
