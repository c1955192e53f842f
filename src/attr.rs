//! Construction of the flat, fixed-layout `perf_event_attr` descriptor the
//! kernel consumes, and the small enums/bitflags the session's public API
//! uses to describe one.

use raw::{perf_event_attr, perf_event_attr__bindgen_ty_2, perf_type_id};

bitflags! {
    /// The subset of `PERF_SAMPLE_*` bits this crate understands. Anything
    /// outside this set is rejected by `Session::enable` with `Unsupported`
    /// rather than silently passed through to the kernel.
    pub struct SampleType: u64 {
        const IDENTIFIER = ::raw::perf_event_sample_format::PERF_SAMPLE_IDENTIFIER as u64;
        const IP         = ::raw::perf_event_sample_format::PERF_SAMPLE_IP as u64;
        const TID        = ::raw::perf_event_sample_format::PERF_SAMPLE_TID as u64;
        const TIME       = ::raw::perf_event_sample_format::PERF_SAMPLE_TIME as u64;
        const ADDR       = ::raw::perf_event_sample_format::PERF_SAMPLE_ADDR as u64;
        const ID         = ::raw::perf_event_sample_format::PERF_SAMPLE_ID as u64;
        const STREAM_ID  = ::raw::perf_event_sample_format::PERF_SAMPLE_STREAM_ID as u64;
        const CPU        = ::raw::perf_event_sample_format::PERF_SAMPLE_CPU as u64;
        const PERIOD     = ::raw::perf_event_sample_format::PERF_SAMPLE_PERIOD as u64;
        const CALLCHAIN  = ::raw::perf_event_sample_format::PERF_SAMPLE_CALLCHAIN as u64;
        const RAW        = ::raw::perf_event_sample_format::PERF_SAMPLE_RAW as u64;

        /// All bits this crate is prepared to parse out of a SAMPLE record.
        const SUPPORTED = Self::IDENTIFIER.bits
            | Self::IP.bits
            | Self::TID.bits
            | Self::TIME.bits
            | Self::ADDR.bits
            | Self::ID.bits
            | Self::STREAM_ID.bits
            | Self::CPU.bits
            | Self::PERIOD.bits
            | Self::CALLCHAIN.bits
            | Self::RAW.bits;
    }
}

/// How the kernel should notify the collector that a buffer has data.
/// Only meaningful in `Mode::Realtime`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WakeupPolicy {
    /// Wake up after this many `PERF_RECORD_SAMPLE`s.
    Events(u32),
    /// Wake up once this many bytes of *any* record type are buffered.
    Watermark(u32),
}

impl Default for WakeupPolicy {
    fn default() -> Self {
        WakeupPolicy::Events(1)
    }
}

/// Ring-buffer write direction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    /// Kernel writes forward; the collector publishes `data_tail` to
    /// reclaim space and may block in `wait_for_wakeup`.
    Realtime,
    /// Kernel writes backward, overwriting the oldest data; there is no
    /// wakeup, and draining pauses output via `PAUSE_OUTPUT`.
    Circular,
}

/// Builds the `perf_event_attr` the session opens for one tracepoint.
///
/// `metadata_id` is the kernel's numeric id for the event (`EventMetadata::id`,
/// i.e. the tracefs `id` file's content) — this becomes `attr.config` with
/// `attr.type_ == PERF_TYPE_TRACEPOINT`.
pub fn build(metadata_id: u32, sample_type: SampleType, wakeup: WakeupPolicy, mode: Mode) -> perf_event_attr {
    let mut attr: perf_event_attr = unsafe { ::std::mem::zeroed() };

    attr.type_ = perf_type_id::PERF_TYPE_TRACEPOINT;
    attr.size = ::std::mem::size_of::<perf_event_attr>() as u32;
    attr.config = u64::from(metadata_id);
    attr.sample_type = sample_type.bits();
    attr.set_disabled(1);
    attr.set_use_clockid(1);
    attr.clockid = ::session_info::CLOCK_MONOTONIC_RAW;

    match wakeup {
        WakeupPolicy::Events(n) => {
            attr.__bindgen_anon_2 = perf_event_attr__bindgen_ty_2 { wakeup_events: n };
        }
        WakeupPolicy::Watermark(n) => {
            attr.set_watermark(1);
            attr.__bindgen_anon_2 = perf_event_attr__bindgen_ty_2 { wakeup_watermark: n };
        }
    }

    match mode {
        Mode::Realtime => attr.set_write_backward(0),
        Mode::Circular => attr.set_write_backward(1),
    }

    attr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_no_unsupported_bits_by_construction() {
        // SUPPORTED is exhaustively built from named constants; this just
        // guards against someone adding a bit above without updating it.
        assert_eq!(SampleType::SUPPORTED.bits() & !SampleType::all().bits(), 0);
    }

    #[test]
    fn realtime_vs_circular_write_backward() {
        let rt = build(42, SampleType::RAW, WakeupPolicy::default(), Mode::Realtime);
        let circ = build(42, SampleType::RAW, WakeupPolicy::default(), Mode::Circular);
        assert_eq!(rt.write_backward(), 0);
        assert_eq!(circ.write_backward(), 1);
        assert_eq!(rt.config, 42);
    }
}
