//! Per-CPU ring-buffer collection: enabling/disabling tracepoints, draining
//! their shared mmap in realtime or circular mode, and handing decoded
//! samples to callers either per-CPU (kernel order) or globally ordered by
//! timestamp.

use std::collections::HashMap;
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use nix::poll::{poll, ppoll, PollFd, PollFlags};
use nix::sys::signal::SigSet;
use nix::sys::time::TimeSpec;

use attr::{self, Mode, SampleType, WakeupPolicy};
use buffer::{Buffer, RawRecord};
use byte_reader::ByteReader;
use error::*;
use fd::PerfEventFd;
use metadata::{MetadataCache, MetadataHandle};
use session_info::SessionInfo;
use tracefs;

/// Record type codes this crate dispatches on while draining; the rest
/// (`MMAP`, `COMM`, `EXIT`, ...) are skipped per the drain algorithm.
mod record_type {
    pub const SAMPLE: u32 = 9;
    pub const LOST: u32 = 2;
    pub const FINISHED_ROUND: u32 = 68;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EnableState {
    Unknown,
    Enabled,
    Disabled,
}

/// Everything the session knows about one enabled tracepoint.
pub struct TracepointInfo {
    pub system: String,
    pub name: String,
    pub metadata: MetadataHandle,
    fds: Vec<PerfEventFd>,
    stream_ids: Vec<u64>,
    state: EnableState,
}

impl TracepointInfo {
    pub fn state(&self) -> EnableState {
        self.state
    }

    pub fn stream_id(&self, cpu: usize) -> Option<u64> {
        self.stream_ids.get(cpu).copied()
    }
}

/// One decoded tracepoint occurrence, produced by draining a live buffer.
#[derive(Clone, Debug)]
pub struct Event {
    pub cpu: u32,
    pub timestamp: Option<u64>,
    pub stream_id: Option<u64>,
    pub metadata: Option<MetadataHandle>,
    pub raw: Vec<u8>,
}

/// Monotonically-increasing failure counters the drain algorithm maintains
/// instead of aborting.
#[derive(Clone, Copy, Debug, Default)]
pub struct Counters {
    pub lost: u64,
    pub corrupt_event: u64,
    pub corrupt_buffer: u64,
}

pub struct Session {
    mode: Mode,
    buffer_size_bytes: usize,
    sample_type: SampleType,
    wakeup: WakeupPolicy,
    cache: MetadataCache,
    tracefs_root: ::std::path::PathBuf,
    long_is_64_bit: bool,

    tracepoints_by_id: HashMap<u32, TracepointInfo>,
    tracepoints_by_name: HashMap<(String, String), u32>,
    /// Reverse of each `TracepointInfo`'s per-CPU `stream_ids`: lets
    /// `decode_sample` resolve a SAMPLE's schema from its stream id alone
    /// when the RAW sample-type bit (and therefore `common_type`) isn't
    /// present.
    stream_id_to_event_id: HashMap<u64, u32>,

    /// Per-CPU mmap, present once the first event has been enabled.
    buffers: Vec<Option<Buffer>>,
    /// Per-CPU fd of the buffer's leader, used for `SET_OUTPUT`/`PAUSE_OUTPUT`/poll.
    leader_fd: Vec<Option<::std::os::unix::io::RawFd>>,
    cpu_count: usize,

    pub counters: Counters,
    session_info: SessionInfo,
}

impl Session {
    pub fn new(mode: Mode, buffer_size_bytes: usize, sample_type: SampleType, wakeup: WakeupPolicy) -> Result<Self> {
        if sample_type.bits() & !SampleType::SUPPORTED.bits() != 0 {
            return Err(Error::unsupported("sample_type has bits outside the supported set"));
        }

        let cpu_count = ::num_cpus::get();
        let buffer_size_bytes = round_up_to_power_of_two(buffer_size_bytes.max(::page_size::get()));

        Ok(Session {
            mode,
            buffer_size_bytes,
            sample_type,
            wakeup,
            cache: MetadataCache::new(),
            tracefs_root: tracefs::find_tracefs_root()?,
            long_is_64_bit: ::std::mem::size_of::<usize>() == 8,
            tracepoints_by_id: HashMap::new(),
            tracepoints_by_name: HashMap::new(),
            stream_id_to_event_id: HashMap::new(),
            buffers: (0..cpu_count).map(|_| None).collect(),
            leader_fd: (0..cpu_count).map(|_| None).collect(),
            cpu_count,
            counters: Counters::default(),
            session_info: SessionInfo::new(),
        })
    }

    pub fn tracepoints(&self) -> impl Iterator<Item = &TracepointInfo> {
        self.tracepoints_by_id.values()
    }

    pub fn metadata_cache(&self) -> &MetadataCache {
        &self.cache
    }

    /// Enables a tracepoint by `(system, event)` name, parsing its format
    /// from tracefs if this is the first time the session has seen it.
    pub fn enable(&mut self, system: &str, name: &str) -> Result<()> {
        if let Some(&id) = self.tracepoints_by_name.get(&(system.to_string(), name.to_string())) {
            return self.enable_existing(id);
        }

        let metadata = self
            .cache
            .find_or_add_from_system(&self.tracefs_root, system, name, self.long_is_64_bit)?;

        self.enable_new(system, name, metadata)
    }

    pub fn disable(&mut self, system: &str, name: &str) -> Result<()> {
        let id = *self
            .tracepoints_by_name
            .get(&(system.to_string(), name.to_string()))
            .ok_or_else(|| Error::not_found(format!("{}:{}", system, name)))?;

        let info = self
            .tracepoints_by_id
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("{}:{}", system, name)))?;

        for fd in &info.fds {
            fd.disable()?;
        }
        info.state = EnableState::Disabled;
        Ok(())
    }

    fn enable_existing(&mut self, id: u32) -> Result<()> {
        let info = self
            .tracepoints_by_id
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("event id {}", id)))?;
        for fd in &info.fds {
            fd.enable()?;
        }
        info.state = EnableState::Enabled;
        Ok(())
    }

    fn enable_new(&mut self, system: &str, name: &str, metadata: MetadataHandle) -> Result<()> {
        let raw_attr = attr::build(metadata.id, self.sample_type, self.wakeup, self.mode);

        let mut fds = Vec::with_capacity(self.cpu_count);
        for cpu in 0..self.cpu_count {
            match PerfEventFd::open(&raw_attr, cpu as ::libc::c_int) {
                Ok(fd) => fds.push(fd),
                Err(e) => {
                    // Roll back every fd opened so far for this call; the
                    // fds themselves close on drop.
                    return Err(e);
                }
            }
        }

        let is_first_event = self.leader_fd.iter().all(Option::is_none);

        // Stage the new per-CPU mmaps/leader fds locally instead of writing
        // straight into `self.buffers`/`self.leader_fd`: if a later CPU's
        // `Buffer::map`/`set_output` fails, the `?` below returns before any
        // commit, `fds` drops (closing every fd opened for this call), and
        // the session is left exactly as it was before `enable_new` ran. A
        // direct write-as-you-go would leave `self.leader_fd` pointing at
        // fds this function is about to close on the error path.
        let mut staged_buffers: Vec<Option<Buffer>> = (0..self.cpu_count).map(|_| None).collect();
        let mut staged_leader_fd: Vec<Option<::std::os::unix::io::RawFd>> =
            (0..self.cpu_count).map(|_| None).collect();

        for cpu in 0..self.cpu_count {
            if is_first_event {
                let buffer = Buffer::map(
                    fds[cpu].as_raw_fd(),
                    ::page_size::get(),
                    self.buffer_size_bytes,
                    self.mode,
                )?;
                staged_buffers[cpu] = Some(buffer);
                staged_leader_fd[cpu] = Some(fds[cpu].as_raw_fd());
            } else if let Some(leader) = self.leader_fd[cpu] {
                fds[cpu].set_output(leader)?;
            }
        }

        let mut stream_ids = Vec::with_capacity(self.cpu_count);
        for fd in &fds {
            stream_ids.push(fd.stream_id()?);
        }

        for fd in &fds {
            fd.enable()?;
        }

        // Every fallible step has succeeded; commit the staged state.
        if is_first_event {
            for cpu in 0..self.cpu_count {
                self.buffers[cpu] = staged_buffers[cpu].take();
                self.leader_fd[cpu] = staged_leader_fd[cpu];
            }
        }

        for &stream_id in &stream_ids {
            self.stream_id_to_event_id.insert(stream_id, metadata.id);
        }

        let info = TracepointInfo {
            system: system.to_string(),
            name: name.to_string(),
            metadata: metadata.clone(),
            fds,
            stream_ids,
            state: EnableState::Enabled,
        };

        self.tracepoints_by_name
            .insert((system.to_string(), name.to_string()), metadata.id);
        self.tracepoints_by_id.insert(metadata.id, info);

        Ok(())
    }

    /// Drains CPU `cpu`'s buffer in kernel order.
    pub fn iter_unordered(&mut self, cpu: usize) -> Result<::std::vec::IntoIter<Event>> {
        let events = self.drain_cpu(cpu)?;
        Ok(events.into_iter())
    }

    /// Drains every CPU's buffer and returns all events stably sorted by
    /// timestamp. Requires `SampleType::TIME`.
    pub fn iter_ordered(&mut self) -> Result<::std::vec::IntoIter<Event>> {
        if !self.sample_type.contains(SampleType::TIME) {
            return Err(Error::unsupported("iter_ordered requires SampleType::TIME"));
        }

        let mut all = Vec::new();
        for cpu in 0..self.cpu_count {
            let mut events = self.drain_cpu(cpu)?;
            if self.mode == Mode::Circular {
                // Circular drains yield newest-to-oldest within a CPU;
                // reverse so the global sort's stability preserves
                // chronological in-CPU order.
                events.reverse();
            }
            all.extend(events);
        }

        all.sort_by_key(|e| e.timestamp.unwrap_or(0));
        Ok(all.into_iter())
    }

    fn drain_cpu(&mut self, cpu: usize) -> Result<Vec<Event>> {
        let leader_fd = self.leader_fd[cpu];
        let cache = &self.cache;
        let stream_index = &self.stream_id_to_event_id;
        let counters = &mut self.counters;
        let sample_type = self.sample_type;
        let mut events = Vec::new();

        let buffer = match self.buffers[cpu].as_mut() {
            Some(b) => b,
            None => return Ok(events),
        };

        let pause = |enable: bool| -> Result<()> {
            if let Some(fd) = leader_fd {
                pause_output_raw(fd, enable)
            } else {
                Ok(())
            }
        };

        let stats = buffer.drain(pause, |record: RawRecord| {
            match record.kind {
                record_type::SAMPLE => {
                    if let Some(event) = decode_sample(cpu as u32, sample_type, record.data, cache, stream_index) {
                        events.push(event);
                    } else {
                        counters.corrupt_event += 1;
                    }
                }
                record_type::LOST => {
                    if record.data.len() >= 16 {
                        let reader = ByteReader::host();
                        counters.lost += reader.u64(&record.data[8..16]);
                    }
                }
                record_type::FINISHED_ROUND => {
                    // Hint only, per the open question resolved in
                    // SPEC_FULL.md: never gates iter_unordered.
                }
                _ => {}
            }
        })?;

        self.counters.corrupt_buffer += stats.corrupt_buffer;
        Ok(events)
    }

    /// Blocks until any enabled CPU's leader buffer is readable, or the
    /// timeout elapses. Only meaningful in `Mode::Realtime`.
    ///
    /// When `signal_mask` is given, the wait uses `ppoll` to atomically
    /// swap in that mask for the duration of the call, so a caller can
    /// unblock e.g. `SIGTERM`/`SIGINT` only while it is waiting (handling
    /// the signal elsewhere would otherwise race with entering `poll`). A
    /// signal whose delivery the mask unblocks interrupts the wait with
    /// `Error::Interrupted` rather than being silently re-armed.
    pub fn wait_for_wakeup(&self, timeout: Option<Duration>, signal_mask: Option<SigSet>) -> Result<()> {
        let mut fds: Vec<PollFd> = self
            .leader_fd
            .iter()
            .filter_map(|f| *f)
            .map(|fd| PollFd::new(fd, PollFlags::POLLIN))
            .collect();

        if fds.is_empty() {
            return Err(Error::invalid("no enabled tracepoints to wait on"));
        }

        match signal_mask {
            None => {
                let timeout_ms = match timeout {
                    Some(d) => d.as_millis().min(i32::max_value() as u128) as i32,
                    None => -1,
                };
                match poll(&mut fds, timeout_ms) {
                    Ok(_) => Ok(()),
                    Err(e) => Err(Error::from(e)),
                }
            }
            Some(mask) => {
                let ts = timeout.map(|d| TimeSpec::nanoseconds(d.as_nanos().min(i64::max_value() as u128) as i64));
                match ppoll(&mut fds, ts, mask) {
                    Ok(_) => Ok(()),
                    Err(e) => Err(Error::from(e)),
                }
            }
        }
    }

    /// Snapshots every enabled CPU's currently-buffered (not yet drained)
    /// records to a fresh `perf.data` file at `path`.
    pub fn save_perf_data_file(&mut self, path: &::std::path::Path) -> Result<()> {
        use perf_data::writer::Writer;

        let mut writer = Writer::create(path, self.session_info)?;
        writer.add_events_from_tracepoints(self.tracepoints_by_id.values())?;

        for cpu in 0..self.cpu_count {
            for event in self.drain_cpu(cpu)? {
                writer.write_sample(cpu as u32, &event)?;
            }
        }

        writer.finalize()
    }

    /// Appends currently-available events to an already-open writer.
    /// Returns the `[min, max]` timestamp range of the events written, if
    /// any were written and timestamps are enabled.
    pub fn flush_to_writer(&mut self, writer: &mut ::perf_data::writer::Writer) -> Result<Option<(u64, u64)>> {
        let mut min_ts = None;
        let mut max_ts = None;
        let mut wrote_any = false;

        for cpu in 0..self.cpu_count {
            for event in self.drain_cpu(cpu)? {
                wrote_any = true;
                if let Some(ts) = event.timestamp {
                    min_ts = Some(min_ts.map_or(ts, |m: u64| m.min(ts)));
                    max_ts = Some(max_ts.map_or(ts, |m: u64| m.max(ts)));
                }
                writer.write_sample(cpu as u32, &event)?;
            }
        }

        if wrote_any {
            writer.write_finished_round()?;
        }

        Ok(min_ts.and_then(|lo| max_ts.map(|hi| (lo, hi))))
    }
}

fn round_up_to_power_of_two(n: usize) -> usize {
    if n.is_power_of_two() {
        n
    } else {
        n.next_power_of_two()
    }
}

fn pause_output_raw(fd: ::std::os::unix::io::RawFd, pause: bool) -> Result<()> {
    // perf_event's PAUSE_OUTPUT ioctl operates on a raw fd the buffer
    // doesn't itself own a `PerfEventFd` handle for (the leader's handle
    // lives inside a `TracepointInfo`, not the `Buffer`); issue it directly
    // rather than plumb a borrowed handle through `Buffer::drain`.
    use libc::{c_ulong, ioctl};
    const PERF_EVENT_IOC_MAGIC: u8 = b'$';
    let request: c_ulong = ((PERF_EVENT_IOC_MAGIC as c_ulong) << 8) | 9;
    // NOTE(unsafe): same request this crate's `fd.rs` computes for
    // PERF_EVENT_IOC_PAUSE_OUTPUT; duplicated here because this path only
    // has the raw fd, not a `PerfEventFd`.
    if unsafe { ioctl(fd, request as _, pause as c_ulong) } == -1 {
        Err(Error::from(::std::io::Error::last_os_error()))
    } else {
        Ok(())
    }
}

/// Parses one SAMPLE record body per the ABI field order fixed by
/// `sample_type`, resolving its schema via `common_type` (if `RAW` is
/// present) or via stream id otherwise.
fn decode_sample(
    cpu: u32,
    sample_type: SampleType,
    data: &[u8],
    cache: &MetadataCache,
    stream_id_to_event_id: &HashMap<u64, u32>,
) -> Option<Event> {
    let reader = ByteReader::host();
    let mut pos = 0usize;

    macro_rules! take {
        ($n:expr) => {{
            if pos + $n > data.len() {
                return None;
            }
            let slice = &data[pos..pos + $n];
            pos += $n;
            slice
        }};
    }

    let mut identifier = None;
    if sample_type.contains(SampleType::IDENTIFIER) {
        identifier = Some(reader.u64(take!(8)));
    }
    if sample_type.contains(SampleType::IP) {
        let _ip = reader.u64(take!(8));
    }
    if sample_type.contains(SampleType::TID) {
        let _pid = reader.u32(take!(4));
        let _tid = reader.u32(take!(4));
    }
    let mut timestamp = None;
    if sample_type.contains(SampleType::TIME) {
        timestamp = Some(reader.u64(take!(8)));
    }
    if sample_type.contains(SampleType::ADDR) {
        let _addr = reader.u64(take!(8));
    }
    let mut id = None;
    if sample_type.contains(SampleType::ID) {
        id = Some(reader.u64(take!(8)));
    }
    let mut stream_id = None;
    if sample_type.contains(SampleType::STREAM_ID) {
        stream_id = Some(reader.u64(take!(8)));
    }
    if sample_type.contains(SampleType::CPU) {
        let _cpu = reader.u32(take!(4));
        let _res = reader.u32(take!(4));
    }
    if sample_type.contains(SampleType::PERIOD) {
        let _period = reader.u64(take!(8));
    }
    if sample_type.contains(SampleType::CALLCHAIN) {
        let nr = reader.u64(take!(8)) as usize;
        if pos + nr * 8 > data.len() {
            return None;
        }
        pos += nr * 8;
    }

    let resolved_stream_id = identifier.or(stream_id).or(id);
    let mut raw = Vec::new();
    let mut metadata = None;

    if sample_type.contains(SampleType::RAW) {
        let size = reader.u32(take!(4)) as usize;
        if pos + size > data.len() {
            return None;
        }
        raw = data[pos..pos + size].to_vec();
        pos += size;
        metadata = cache.find_by_raw_data(&raw);
    }

    if metadata.is_none() {
        if let Some(sid) = resolved_stream_id {
            if let Some(&id) = stream_id_to_event_id.get(&sid) {
                metadata = cache.find_by_id(id);
            }
        }
    }

    let _ = pos;

    Some(Event {
        cpu,
        timestamp,
        stream_id: resolved_stream_id,
        metadata,
        raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_up_to_power_of_two_is_identity_on_powers() {
        assert_eq!(round_up_to_power_of_two(4096), 4096);
        assert_eq!(round_up_to_power_of_two(4097), 8192);
        assert_eq!(round_up_to_power_of_two(1), 1);
    }

    #[test]
    fn decode_sample_reads_time_and_raw_in_abi_order() {
        let cache = MetadataCache::new();
        let mut data = Vec::new();
        data.extend_from_slice(&1_234_567_890u64.to_ne_bytes()); // TIME
        data.extend_from_slice(&4u32.to_ne_bytes()); // RAW size
        data.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]); // RAW body

        let stream_index = HashMap::new();
        let event = decode_sample(0, SampleType::TIME | SampleType::RAW, &data, &cache, &stream_index).unwrap();
        assert_eq!(event.timestamp, Some(1_234_567_890));
        assert_eq!(event.raw, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn decode_sample_rejects_truncated_body() {
        let cache = MetadataCache::new();
        let stream_index = HashMap::new();
        let data = vec![0u8; 4]; // TIME wants 8 bytes
        assert!(decode_sample(0, SampleType::TIME, &data, &cache, &stream_index).is_none());
    }

    #[test]
    fn decode_sample_resolves_metadata_by_stream_id_without_raw() {
        const SCHED_SWITCH: &[u8] = b"name: sched_switch
ID: 314
format:
\tfield:unsigned short common_type;\toffset:0;\tsize:2;\tsigned:0;
\tfield:int common_pid;\toffset:4;\tsize:4;\tsigned:1;
print fmt: \"x\"
";
        let mut cache = MetadataCache::new();
        cache.add_from_format("sched", SCHED_SWITCH, true).unwrap();

        let mut stream_index = HashMap::new();
        stream_index.insert(99u64, 314u32);

        let mut data = Vec::new();
        data.extend_from_slice(&1u64.to_ne_bytes()); // TIME
        data.extend_from_slice(&99u64.to_ne_bytes()); // STREAM_ID

        let event = decode_sample(0, SampleType::TIME | SampleType::STREAM_ID, &data, &cache, &stream_index)
            .expect("well-formed body decodes");
        assert_eq!(event.stream_id, Some(99));
        assert_eq!(event.metadata.unwrap().id, 314);
    }
}
