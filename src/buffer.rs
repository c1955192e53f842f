//! Per-CPU ring buffer ownership and draining.
//!
//! One `Buffer` wraps the single shared mmap of a CPU's "leader" tracepoint
//! fd (see `session.rs`'s output-redirection scheme): a page-sized metadata
//! header (`perf_event_mmap_page`) immediately followed by the data region.
//! Drain logic here is the sole place this crate reasons about the ring's
//! wraparound and the acquire/release pair the kernel's docs require on
//! `data_head`/`data_tail`.

use std::os::unix::io::RawFd;
use std::sync::atomic::{fence, Ordering};

use mmap::{MapOption, MemoryMap};

use attr::Mode;
use error::*;
use raw::perf_event_mmap_page;

/// One raw record as handed to a drain callback: its header fields and a
/// contiguous slice of its body (post-header bytes), valid only for the
/// duration of the callback.
#[derive(Debug)]
pub struct RawRecord<'a> {
    pub kind: u32,
    pub misc: u16,
    pub data: &'a [u8],
}

/// Bumped by `Buffer::drain` on malformed ring content; cheap running totals
/// a Session exposes to callers instead of failing the whole drain.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DrainStats {
    pub corrupt_buffer: u64,
}

pub struct Buffer {
    map: MemoryMap,
    data_size: u64,
    data_offset: u64,
    mode: Mode,
    scratch: Vec<u8>,
}

impl Buffer {
    /// Maps `page_size + data_size` bytes of `fd`'s perf_event output.
    /// `data_size` must already be a power of two; the caller (`Session`)
    /// is responsible for rounding it up to one.
    pub fn map(fd: RawFd, page_size: usize, data_size: usize, mode: Mode) -> Result<Self> {
        let len = page_size + data_size;

        // NOTE(unsafe): PROT_READ|WRITE, MAP_SHARED (the mmap crate's
        // default when a fd is supplied) on an open perf_event fd is
        // exactly the mapping the kernel documents for this ABI.
        let map = MemoryMap::new(
            len,
            &[MapOption::MapFd(fd), MapOption::MapReadable, MapOption::MapWritable],
        )?;

        Ok(Buffer {
            map,
            data_size: data_size as u64,
            data_offset: page_size as u64,
            mode,
            scratch: Vec::new(),
        })
    }

    fn header(&self) -> *mut perf_event_mmap_page {
        self.map.data() as *mut perf_event_mmap_page
    }

    fn data_ptr(&self) -> *const u8 {
        unsafe { self.map.data().add(self.data_offset as usize) }
    }

    /// Acquire-loaded `data_head`: the kernel's write cursor. Continuously
    /// increasing; must be masked by `data_size - 1` before indexing.
    fn head(&self) -> u64 {
        let head = unsafe { (*self.header()).data_head };
        fence(Ordering::Acquire);
        head
    }

    fn tail(&self) -> u64 {
        unsafe { (*self.header()).data_tail }
    }

    fn set_tail(&self, new_tail: u64) {
        fence(Ordering::Release);
        unsafe {
            (*self.header()).data_tail = new_tail;
        }
    }

    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    /// Runs the drain algorithm once: reads every complete record currently
    /// available, invokes `on_record` for each, and updates the consumer
    /// cursor (`data_tail` in Realtime, nothing persistent in Circular
    /// beyond un-pausing). `pause` is called before reading in Circular mode
    /// and after in all modes that need it; `Session` supplies it bound to
    /// the leader fd's `PAUSE_OUTPUT` ioctl.
    pub fn drain<F>(&mut self, pause: impl Fn(bool) -> Result<()>, mut on_record: F) -> Result<DrainStats>
    where
        F: FnMut(RawRecord),
    {
        let mut stats = DrainStats::default();

        let (mut data_pos, head) = match self.mode {
            Mode::Circular => {
                pause(true)?;
                let head = self.head();
                let start = head.saturating_sub(self.data_size);
                (start, head)
            }
            Mode::Realtime => {
                let start = self.tail();
                let head = self.head();
                (start, head)
            }
        };

        while data_pos < head {
            let remaining = head - data_pos;
            if remaining < u64::from(HEADER_SIZE) {
                stats.corrupt_buffer += 1;
                break;
            }

            let mut header_bytes = [0u8; HEADER_SIZE as usize];
            self.copy_from_ring(data_pos, &mut header_bytes);
            let record_kind = u32::from_le_bytes([
                header_bytes[0],
                header_bytes[1],
                header_bytes[2],
                header_bytes[3],
            ]);
            let record_misc = u16::from_le_bytes([header_bytes[4], header_bytes[5]]);
            let record_size = u16::from_le_bytes([header_bytes[6], header_bytes[7]]);

            if record_size == 0 || u64::from(record_size) > remaining || record_size % 8 != 0 {
                stats.corrupt_buffer += 1;
                break;
            }

            let body_len = record_size as usize - HEADER_SIZE as usize;
            self.scratch.resize(body_len, 0);
            // Split borrow: copy_from_ring only reads self.map, but the
            // borrow checker can't see that through &mut self.scratch, so
            // take the body offset first and use a free function.
            copy_from_ring_into(
                self.data_ptr(),
                self.data_size,
                data_pos + u64::from(HEADER_SIZE),
                &mut self.scratch[..],
            );

            on_record(RawRecord {
                kind: record_kind,
                misc: record_misc,
                data: &self.scratch[..],
            });

            data_pos += u64::from(record_size);
        }

        match self.mode {
            Mode::Circular => pause(false)?,
            Mode::Realtime => self.set_tail(data_pos),
        }

        Ok(stats)
    }

    fn copy_from_ring(&self, pos: u64, out: &mut [u8]) {
        copy_from_ring_into(self.data_ptr(), self.data_size, pos, out);
    }
}

/// Size in bytes of `perf_event_header`: `u32 type + u16 misc + u16 size`.
const HEADER_SIZE: u16 = 8;

/// Copies `out.len()` bytes starting at ring-relative position `pos`,
/// transparently handling the wraparound case by splitting into two memcpys
/// when the read would run past the end of the data region.
fn copy_from_ring_into(data: *const u8, data_size: u64, pos: u64, out: &mut [u8]) {
    let mask = data_size - 1;
    let start = pos & mask;
    let len = out.len() as u64;

    if start + len <= data_size {
        unsafe {
            ::std::ptr::copy_nonoverlapping(data.add(start as usize), out.as_mut_ptr(), out.len());
        }
    } else {
        let first_len = (data_size - start) as usize;
        unsafe {
            ::std::ptr::copy_nonoverlapping(data.add(start as usize), out.as_mut_ptr(), first_len);
            ::std::ptr::copy_nonoverlapping(data, out[first_len..].as_mut_ptr(), out.len() - first_len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_from_ring_handles_contiguous_read() {
        let data = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut out = [0u8; 4];
        copy_from_ring_into(data.as_ptr(), 8, 0, &mut out);
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn copy_from_ring_handles_wrap_straddling_read() {
        let data = vec![10u8, 11, 12, 13, 14, 15, 16, 17];
        let mut out = [0u8; 4];
        // data_size=8, pos=6 -> masked start=6, needs bytes at [6,7,0,1]
        copy_from_ring_into(data.as_ptr(), 8, 6, &mut out);
        assert_eq!(out, [16, 17, 10, 11]);
    }
}
