// Fixed-capacity fmt::Write buffer for HUD text and receiver commands.
// Overflow truncates silently at a char boundary.

use core::fmt;

#[derive(Clone, Copy)]
pub struct StackFmt<const N: usize> {
    buf: [u8; N],
    len: usize,
}

impl<const N: usize> StackFmt<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0u8; N],
            len: 0,
        }
    }

    // one-shot: format args into a fresh buffer
    pub fn from_args(args: fmt::Arguments<'_>) -> Self {
        let mut s = Self::new();
        let _ = fmt::Write::write_fmt(&mut s, args);
        s
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl<const N: usize> Default for StackFmt<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Write for StackFmt<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = N - self.len;
        let mut n = s.len().min(room);
        while !s.is_char_boundary(n) {
            n -= 1;
        }
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}

impl<const N: usize> PartialEq for StackFmt<N> {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl<const N: usize> Eq for StackFmt<N> {}

impl<const N: usize> fmt::Debug for StackFmt<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<const N: usize> fmt::Display for StackFmt<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncates_on_char_boundary() {
        let s: StackFmt<4> = StackFmt::from_args(format_args!("ab{}", "°C"));
        assert_eq!(s.as_str(), "ab°", "the degree sign is two bytes");
        assert_eq!(s.len(), 4);
    }

    #[test]
    fn test_clear_reuses_buffer() {
        let mut s: StackFmt<8> = StackFmt::from_args(format_args!("{:>3}", 7));
        assert_eq!(s.as_str(), "  7");
        s.clear();
        assert!(s.is_empty());
    }
}
