//! Little-endian field encoding.
//!
//! Descriptor records keep their fields host-native; this is the only place
//! where they are turned into USB wire order.

use crate::Error;

pub const fn u16_to_le(v: u16) -> [u8; 2] {
    v.to_le_bytes()
}

pub const fn u16_from_le(b: [u8; 2]) -> u16 {
    u16::from_le_bytes(b)
}

/// Appends fields to a caller-owned buffer.
pub struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Writer { buf, pos: 0 }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn u8(&mut self, v: u8) -> Result<(), Error> {
        self.bytes(&[v])
    }

    pub fn u16(&mut self, v: u16) -> Result<(), Error> {
        self.bytes(&u16_to_le(v))
    }

    /// UTF-16 code units, each in little-endian order, no terminator.
    pub fn utf16(&mut self, units: &[u16]) -> Result<(), Error> {
        if self.remaining() < units.len() * 2 {
            return Err(self.too_small(units.len() * 2));
        }
        for &c in units {
            self.u16(c)?;
        }
        Ok(())
    }

    pub fn bytes(&mut self, src: &[u8]) -> Result<(), Error> {
        if self.remaining() < src.len() {
            return Err(self.too_small(src.len()));
        }
        self.buf[self.pos..self.pos + src.len()].copy_from_slice(src);
        self.pos += src.len();
        Ok(())
    }

    fn too_small(&self, extra: usize) -> Error {
        Error::BufferTooSmall {
            needed: self.pos + extra,
            available: self.buf.len(),
        }
    }
}

/// Reads fields back out of wire order.
pub struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf }
    }

    pub fn remaining(&self) -> &'a [u8] {
        self.buf
    }

    pub fn u8(&mut self) -> Option<u8> {
        let (&first, rest) = self.buf.split_first()?;
        self.buf = rest;
        Some(first)
    }

    pub fn u16(&mut self) -> Option<u16> {
        if self.buf.len() < 2 {
            return None;
        }
        let (head, rest) = self.buf.split_at(2);
        self.buf = rest;
        Some(u16_from_le([head[0], head[1]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u16_is_little_endian() {
        assert_eq!(u16_to_le(0x0102), [0x02, 0x01]);
        assert_eq!(u16_to_le(0xFFFF), [0xFF, 0xFF]);
        assert_eq!(u16_to_le(0x0000), [0x00, 0x00]);
        assert_eq!(u16_from_le([0x02, 0x01]), 0x0102);
    }

    #[test]
    fn writer_reader() {
        let mut buf = [0u8; 7];
        let mut w = Writer::new(&mut buf);
        w.u8(0x12).unwrap();
        w.u16(0x0102).unwrap();
        w.utf16(&[0x0041, 0x20AC]).unwrap();
        assert_eq!(w.len(), 7);
        assert_eq!(buf, [0x12, 0x02, 0x01, 0x41, 0x00, 0xAC, 0x20]);

        let mut r = Reader::new(&buf);
        assert_eq!(r.u8(), Some(0x12));
        assert_eq!(r.u16(), Some(0x0102));
        assert_eq!(r.u16(), Some(0x0041));
        assert_eq!(r.u16(), Some(0x20AC));
        assert_eq!(r.u8(), None);
    }

    #[test]
    fn writer_rejects_overflow() {
        let mut buf = [0u8; 3];
        let mut w = Writer::new(&mut buf);
        w.u16(0xBEEF).unwrap();
        assert_eq!(
            w.u16(0x1234),
            Err(Error::BufferTooSmall {
                needed: 4,
                available: 3
            })
        );
        assert_eq!(w.len(), 2);
        assert_eq!(
            w.utf16(&[1, 2]).unwrap_err(),
            Error::BufferTooSmall {
                needed: 6,
                available: 3
            }
        );
    }
}
