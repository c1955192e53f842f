//! The `perf.data` file format: a seekable or pipe-mode container for a
//! stream of `perf_event_header`-framed records, preceded (in seekable mode)
//! by an attribute table and a bitmap-indexed feature-headers section.
//!
//! This module only defines the shapes both [`reader`] and [`writer`] share;
//! the parsing/synthesis logic for the two feature payloads this crate cares
//! about (`TRACING_DATA`, `EVENT_DESC`) lives in [`tracing_data`], since both
//! sides need the same byte layout.

pub mod reader;
pub mod tracing_data;
pub mod writer;

/// The sample fields this crate's own writer always emits, and what a
/// reader falls back to when an attr's declared `sample_type` isn't known
/// (pipe mode without a preceding `HEADER_ATTR`, or no attrs at all): `TIME`,
/// `STREAM_ID`, `CPU`, `RAW`, in that fixed ABI order.
pub(crate) fn default_sample_type() -> ::attr::SampleType {
    use attr::SampleType;
    SampleType::TIME | SampleType::STREAM_ID | SampleType::CPU | SampleType::RAW
}

/// Little-endian file magic: `PERFILE2`.
pub const MAGIC_LE: [u8; 8] = *b"PERFILE2";
/// The same magic, byte-reversed: present when the file was written on a
/// big-endian host. Seeing this tells the reader to swap every structural
/// field from here on.
pub const MAGIC_BE: [u8; 8] = *b"2ELIFREP";

/// Size of the fixed seekable header: magic(8) + header_size(8) +
/// attr_size(8) + attrs(16) + data(16) + event_types(16, reserved) +
/// feature_headers(16) + flags(8).
pub const HEADER_SIZE: usize = 96;
/// Size of the pipe-mode header: just the magic plus the header's own size.
pub const PIPE_HEADER_SIZE: usize = 16;

pub const FEATURE_TRACING_DATA: u32 = 1;
pub const FEATURE_BUILD_ID: u32 = 2;
pub const FEATURE_EVENT_DESC: u32 = 12;
pub const FEATURE_CLOCKID: u32 = 24;
pub const FEATURE_CLOCK_DATA: u32 = 30;
/// One `flags` word, so bit indices above 63 can't be represented. Every
/// feature this crate knows about fits comfortably under that.
pub const FEATURE_MAX_BITS: u32 = 64;

/// Record type codes this crate's reader/writer recognize, either in the
/// data section (seekable or pipe mode) or as pipe-mode synthetic metadata.
pub mod record_type {
    pub const LOST: u32 = 2;
    pub const SAMPLE: u32 = 9;
    pub const HEADER_ATTR: u32 = 64;
    pub const HEADER_TRACING_DATA: u32 = 66;
    pub const FINISHED_ROUND: u32 = 68;
    pub const HEADER_FEATURE: u32 = 80;
    pub const FINISHED_INIT: u32 = 83;
}

/// An `(offset, size)` pair, pointing at a region elsewhere in the file.
/// Used for the attrs/data/feature-headers top-level sections, each attr's
/// id list, and each feature's payload.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Section {
    pub offset: u64,
    pub size: u64,
}

pub const SECTION_SIZE: usize = 16;

impl Section {
    pub fn read(reader: ::byte_reader::ByteReader, data: &[u8]) -> Section {
        Section {
            offset: reader.u64(&data[0..8]),
            size: reader.u64(&data[8..16]),
        }
    }

    pub fn write(self, reader: ::byte_reader::ByteReader, out: &mut [u8]) {
        reader.write_u64(&mut out[0..8], self.offset);
        reader.write_u64(&mut out[8..16], self.size);
    }
}

/// The fixed seekable-mode header, exactly [`HEADER_SIZE`] bytes on disk.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileHeader {
    pub big_endian: bool,
    pub header_size: u64,
    pub attr_size: u64,
    pub attrs: Section,
    pub data: Section,
    pub feature_headers: Section,
    pub flags: u64,
}

impl FileHeader {
    pub fn read(data: &[u8]) -> ::error::Result<FileHeader> {
        if data.len() < HEADER_SIZE {
            return Err(::error::Error::invalid("perf.data header is truncated"));
        }

        let big_endian = if data[0..8] == MAGIC_LE {
            false
        } else if data[0..8] == MAGIC_BE {
            true
        } else {
            return Err(::error::Error::invalid("perf.data has an unrecognized magic"));
        };

        let r = ::byte_reader::ByteReader::new(big_endian);
        Ok(FileHeader {
            big_endian,
            header_size: r.u64(&data[8..16]),
            attr_size: r.u64(&data[16..24]),
            attrs: Section::read(r, &data[24..40]),
            data: Section::read(r, &data[40..56]),
            // data[56..72] is the reserved event_types section, unused.
            feature_headers: Section::read(r, &data[72..88]),
            flags: r.u64(&data[88..96]),
        })
    }

    pub fn write_into(self, out: &mut [u8; HEADER_SIZE]) {
        let r = ::byte_reader::ByteReader::new(self.big_endian);
        let magic = if self.big_endian { MAGIC_BE } else { MAGIC_LE };
        out[0..8].copy_from_slice(&magic);
        r.write_u64(&mut out[8..16], self.header_size);
        r.write_u64(&mut out[16..24], self.attr_size);
        self.attrs.write(r, &mut out[24..40]);
        self.data.write(r, &mut out[40..56]);
        Section::default().write(r, &mut out[56..72]);
        self.feature_headers.write(r, &mut out[72..88]);
        r.write_u64(&mut out[88..96], self.flags);
    }

    pub fn feature_set(&self, bit: u32) -> bool {
        bit < FEATURE_MAX_BITS && (self.flags & (1u64 << bit)) != 0
    }
}
