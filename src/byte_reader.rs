//! Endian-aware primitive decoding from byte slices.
//!
//! The `perf.data` reader needs to read some fields in file-endian order (the
//! raw tracepoint payload, which was written by whatever kernel produced it)
//! and other fields in host-endian order (the structural header fields,
//! which the kernel always byte-swaps for us once `ByteReader` tells it
//! which way to swap). Keeping both available on one small `Copy` type means
//! callers never have to thread two separate reader instances around.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Reads fixed-width integers and floats out of a byte slice in a fixed
/// endianness. Out-of-bounds reads are the caller's responsibility: this
/// type does not return a `Result`, pushing bounds checks to call sites
/// that already know the record's declared length.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ByteReader {
    big_endian: bool,
}

impl ByteReader {
    pub const fn new(big_endian: bool) -> Self {
        ByteReader { big_endian }
    }

    /// A reader for the host's native byte order.
    pub fn host() -> Self {
        ByteReader::new(cfg!(target_endian = "big"))
    }

    pub const fn big_endian(self) -> bool {
        self.big_endian
    }

    pub fn u16(self, data: &[u8]) -> u16 {
        if self.big_endian {
            BigEndian::read_u16(data)
        } else {
            LittleEndian::read_u16(data)
        }
    }

    pub fn u32(self, data: &[u8]) -> u32 {
        if self.big_endian {
            BigEndian::read_u32(data)
        } else {
            LittleEndian::read_u32(data)
        }
    }

    pub fn u64(self, data: &[u8]) -> u64 {
        if self.big_endian {
            BigEndian::read_u64(data)
        } else {
            LittleEndian::read_u64(data)
        }
    }

    pub fn i16(self, data: &[u8]) -> i16 {
        self.u16(data) as i16
    }

    pub fn i32(self, data: &[u8]) -> i32 {
        self.u32(data) as i32
    }

    pub fn i64(self, data: &[u8]) -> i64 {
        self.u64(data) as i64
    }

    pub fn f32(self, data: &[u8]) -> f32 {
        if self.big_endian {
            BigEndian::read_f32(data)
        } else {
            LittleEndian::read_f32(data)
        }
    }

    pub fn f64(self, data: &[u8]) -> f64 {
        if self.big_endian {
            BigEndian::read_f64(data)
        } else {
            LittleEndian::read_f64(data)
        }
    }

    /// Reads an unsigned integer of `size` bytes (1, 2, 4, or 8), widening to
    /// `u64`. Used by the format decoder, where field width is only known at
    /// runtime from the `format` file's `size:` declaration.
    pub fn uint(self, data: &[u8], size: usize) -> u64 {
        match size {
            1 => u64::from(data[0]),
            2 => u64::from(self.u16(data)),
            4 => u64::from(self.u32(data)),
            8 => self.u64(data),
            _ => 0,
        }
    }

    pub fn write_u16(self, data: &mut [u8], value: u16) {
        if self.big_endian {
            BigEndian::write_u16(data, value)
        } else {
            LittleEndian::write_u16(data, value)
        }
    }

    pub fn write_u32(self, data: &mut [u8], value: u32) {
        if self.big_endian {
            BigEndian::write_u32(data, value)
        } else {
            LittleEndian::write_u32(data, value)
        }
    }

    pub fn write_u64(self, data: &mut [u8], value: u64) {
        if self.big_endian {
            BigEndian::write_u64(data, value)
        } else {
            LittleEndian::write_u64(data, value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_little_and_big() {
        let mut buf = [0u8; 8];

        let le = ByteReader::new(false);
        le.write_u64(&mut buf, 0x0102_0304_0506_0708);
        assert_eq!(le.u64(&buf), 0x0102_0304_0506_0708);
        assert_eq!(buf[0], 0x08);

        let be = ByteReader::new(true);
        be.write_u64(&mut buf, 0x0102_0304_0506_0708);
        assert_eq!(be.u64(&buf), 0x0102_0304_0506_0708);
        assert_eq!(buf[0], 0x01);
    }

    #[test]
    fn uint_widens_to_u64() {
        let r = ByteReader::new(false);
        let mut buf = [0u8; 8];
        r.write_u32(&mut buf[..4], 0xdead_beef);
        assert_eq!(r.uint(&buf[..4], 4), 0xdead_beef);
        assert_eq!(r.uint(&buf[..1], 1), u64::from(buf[0]));
    }
}
