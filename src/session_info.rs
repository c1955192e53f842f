//! Clock id and the realtime/monotonic offset captured at session start.
//!
//! Every timestamp a tracepoint record carries is read off the clock the
//! kernel was told to use for that event (`attr.clockid`). To turn that
//! into a wall-clock time later — in a live session or after replaying a
//! `perf.data` file — something has to have recorded, close to the moment
//! collection started, both what that clock read and what `CLOCK_REALTIME`
//! read at the same instant. That pairing is `SessionInfo`.

use std::time::{SystemTime, UNIX_EPOCH};

use libc::{clock_gettime, timespec, CLOCK_MONOTONIC, CLOCK_REALTIME};

/// Not exposed by bindgen's allowlist (`linux/time.h` isn't in `wrapper.h`),
/// so it's named directly: Linux's `CLOCK_MONOTONIC_RAW`, value 4 on every
/// architecture.
pub const CLOCK_MONOTONIC_RAW: i32 = 4;

/// Seconds + nanoseconds, the same shape perf.data's `CLOCK_DATA` feature
/// and `clock_gettime` both use.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TimeSpec {
    pub seconds: u64,
    pub nanoseconds: u32,
}

impl TimeSpec {
    pub fn as_nanos(self) -> u128 {
        u128::from(self.seconds) * 1_000_000_000 + u128::from(self.nanoseconds)
    }
}

/// Clock id and the offset needed to translate an event's raw timestamp
/// (nanoseconds since whichever clock the event's `attr.clockid` names)
/// into wall-clock time.
#[derive(Clone, Copy, Debug)]
pub struct SessionInfo {
    clock_id: i32,
    offset: Option<TimeSpec>,
    source_big_endian: bool,
}

impl SessionInfo {
    /// Captures `clockid` and `CLOCK_REALTIME` as close together as
    /// possible, the way a freshly-opened session does.
    pub fn capture(clock_id: i32) -> Self {
        let clock_ts = read_clock(clock_id);
        let real_ts = read_clock(CLOCK_REALTIME);

        let offset = match (clock_ts, real_ts) {
            (Some(c), Some(r)) => {
                let c_nanos = c.as_nanos() as i128;
                let r_nanos = r.as_nanos() as i128;
                let delta = r_nanos - c_nanos;
                Some(TimeSpec {
                    seconds: (delta / 1_000_000_000) as u64,
                    nanoseconds: (delta.rem_euclid(1_000_000_000)) as u32,
                })
            }
            _ => None,
        };

        SessionInfo {
            clock_id,
            offset,
            source_big_endian: false,
        }
    }

    /// A `SessionInfo` for the common default: `MONOTONIC_RAW`.
    pub fn new() -> Self {
        Self::capture(CLOCK_MONOTONIC_RAW)
    }

    /// Constructs from values recovered from a perf.data file's `CLOCKID`
    /// and `CLOCK_DATA` feature headers, where no live clock is available.
    pub fn from_file_clock(clock_id: i32, offset_seconds: u64, offset_nanoseconds: u32, big_endian: bool) -> Self {
        SessionInfo {
            clock_id,
            offset: Some(TimeSpec {
                seconds: offset_seconds,
                nanoseconds: offset_nanoseconds,
            }),
            source_big_endian: big_endian,
        }
    }

    /// Constructs a `SessionInfo` for a file/stream whose `CLOCKID`/
    /// `CLOCK_DATA` feature headers were absent (common in pipe mode, which
    /// this crate's writer never emits those for): endianness is still
    /// known from the magic, but no timestamp can be converted to wall
    /// clock time.
    pub fn from_file_unknown_clock(big_endian: bool) -> Self {
        SessionInfo {
            clock_id: CLOCK_MONOTONIC_RAW,
            offset: None,
            source_big_endian: big_endian,
        }
    }

    pub fn clock_id(&self) -> i32 {
        self.clock_id
    }

    pub fn offset_known(&self) -> bool {
        self.offset.is_some()
    }

    pub fn source_big_endian(&self) -> bool {
        self.source_big_endian
    }

    pub fn byte_reader(&self) -> ::byte_reader::ByteReader {
        ::byte_reader::ByteReader::new(self.source_big_endian)
    }

    /// Converts a raw event timestamp (nanoseconds on `clock_id`) into wall
    /// clock time, if the offset is known.
    pub fn time_to_time_spec(&self, raw_time_ns: u64) -> Option<TimeSpec> {
        let offset = self.offset?;
        let total = i128::from(raw_time_ns) + offset.as_nanos() as i128;
        Some(TimeSpec {
            seconds: (total / 1_000_000_000) as u64,
            nanoseconds: (total.rem_euclid(1_000_000_000)) as u32,
        })
    }
}

impl Default for SessionInfo {
    fn default() -> Self {
        SessionInfo::new()
    }
}

fn read_clock(clock_id: i32) -> Option<TimeSpec> {
    let mut ts = timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };

    // NOTE(unsafe): clock_gettime only ever writes through the pointer we
    // give it, and we pass a real, correctly-sized local.
    let rc = unsafe { clock_gettime(clock_id, &mut ts as *mut timespec) };

    if rc == 0 {
        Some(TimeSpec {
            seconds: ts.tv_sec as u64,
            nanoseconds: ts.tv_nsec as u32,
        })
    } else {
        None
    }
}

/// Wall-clock "now", used only as a fallback display helper; not part of the
/// session's timestamp math.
pub fn unix_now() -> TimeSpec {
    let d = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    TimeSpec {
        seconds: d.as_secs(),
        nanoseconds: d.subsec_nanos(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_raw_offset_is_known_on_linux() {
        let _ = ::env_logger::try_init();
        let info = SessionInfo::new();
        assert_eq!(info.clock_id(), CLOCK_MONOTONIC_RAW);
        assert!(info.offset_known());
    }

    #[test]
    fn file_clock_constructs_without_live_probe() {
        let info = SessionInfo::from_file_clock(CLOCK_MONOTONIC, 1_600_000_000, 500, true);
        assert!(info.offset_known());
        assert!(info.source_big_endian());
        let spec = info.time_to_time_spec(0).unwrap();
        assert_eq!(spec.seconds, 1_600_000_000);
        assert_eq!(spec.nanoseconds, 500);
    }
}
