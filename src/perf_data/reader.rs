//! Reads a `perf.data` file (or stream) back into [`MetadataHandle`]s and
//! [`Event`]s, in either seekable or pipe mode.
//!
//! Both modes are handled by buffering the whole input into memory up
//! front — a seekable file is `fs::read`, a pipe is drained with
//! `Read::read_to_end` — and then walking the same kind of
//! `perf_event_header`-framed record stream either way. The only difference
//! is where that stream starts: right after the 96-byte header (seekable) or
//! after the last `HEADER_*` record preceding `FINISHED_INIT` (pipe).

use std::io::Read;
use std::path::Path;

use byte_reader::ByteReader;
use error::*;
use format::EventMetadata;
use metadata::{MetadataCache, MetadataHandle};
use raw::perf_event_attr;
use session::Event;
use session_info::SessionInfo;

use super::tracing_data;
use super::{record_type, FileHeader, Section, FEATURE_CLOCKID, FEATURE_CLOCK_DATA, FEATURE_EVENT_DESC,
            FEATURE_MAX_BITS, FEATURE_TRACING_DATA, HEADER_SIZE, PIPE_HEADER_SIZE, SECTION_SIZE};

/// One `perf_event_header`-framed record, not yet interpreted as sample or
/// non-sample.
#[derive(Clone, Debug)]
pub struct RawRecord {
    pub kind: u32,
    pub misc: u16,
    pub data: Vec<u8>,
}

/// A decoded `SAMPLE` record: the event it carries, plus everything needed
/// to turn its raw timestamp into wall-clock time or split off its
/// tracepoint-specific payload. Grounded on the `PerfSampleEventInfo` shape
/// of the `tracepoint_decode` crate, rebuilt here against this crate's own
/// `MetadataHandle`/`SessionInfo`/`ByteReader` rather than carried over.
#[derive(Clone, Debug)]
pub struct PerfSampleEventInfo {
    pub cpu: u32,
    pub timestamp: Option<u64>,
    pub stream_id: Option<u64>,
    pub metadata: Option<MetadataHandle>,
    pub raw: Vec<u8>,
    session_info: SessionInfo,
}

impl PerfSampleEventInfo {
    pub fn source_big_endian(&self) -> bool {
        self.session_info.source_big_endian()
    }

    pub fn byte_reader(&self) -> ByteReader {
        self.session_info.byte_reader()
    }

    pub fn format(&self) -> Option<&EventMetadata> {
        self.metadata.as_ref().map(|m| &**m)
    }

    pub fn name(&self) -> Option<&str> {
        self.format().map(|m| m.name.as_str())
    }

    /// Resolves [`timestamp`](Self::timestamp) against the reader's session
    /// clock offset, if both are known.
    pub fn time_spec(&self) -> Option<::session_info::TimeSpec> {
        self.session_info.time_to_time_spec(self.timestamp?)
    }

    pub fn raw_data(&self) -> &[u8] {
        &self.raw
    }

    /// The tracepoint-specific payload: `raw_data()` with the common fields
    /// (`common_type`, `common_flags`, ...) stripped off the front.
    pub fn user_data(&self) -> &[u8] {
        match self.format() {
            Some(meta) => {
                let skip = (meta.common_fields_size() as usize).min(self.raw.len());
                &self.raw[skip..]
            }
            None => &self.raw,
        }
    }
}

/// A decoded non-`SAMPLE` record (`LOST`, `FINISHED_ROUND`, ...): this
/// writer's own records never append a `sample_id_all` suffix, so there's
/// no id to cross-reference here — just the raw framing.
#[derive(Clone, Debug)]
pub struct PerfNonSampleEventInfo {
    pub kind: u32,
    pub misc: u16,
    pub raw: Vec<u8>,
}

impl PerfNonSampleEventInfo {
    pub fn raw_data(&self) -> &[u8] {
        &self.raw
    }

    pub fn is_lost(&self) -> bool {
        self.kind == record_type::LOST
    }

    pub fn is_finished_round(&self) -> bool {
        self.kind == record_type::FINISHED_ROUND
    }

    /// The number of records the kernel reports dropped, for a `LOST`
    /// record; `None` for anything else or a truncated body.
    pub fn lost_count(&self, big_endian: bool) -> Option<u64> {
        if self.kind != record_type::LOST || self.raw.len() < 16 {
            return None;
        }
        Some(ByteReader::new(big_endian).u64(&self.raw[8..16]))
    }
}

pub struct Reader {
    session_info: SessionInfo,
    cache: MetadataCache,
    sample_type_by_id: ::std::collections::HashMap<u32, ::attr::SampleType>,
    attr_id_by_stream_id: ::std::collections::HashMap<u64, u32>,
    pipe_mode: bool,
    records: Vec<u8>,
    pos: usize,
}

impl Reader {
    /// Opens a seekable `perf.data` file by path.
    pub fn open(path: &Path) -> Result<Reader> {
        let bytes = ::std::fs::read(path)?;
        Reader::from_bytes(bytes)
    }

    /// Reads a pipe-mode `perf.data` stream from stdin to completion, then
    /// parses it the same way a seekable file would be.
    pub fn open_stdin() -> Result<Reader> {
        let mut bytes = Vec::new();
        ::std::io::stdin().read_to_end(&mut bytes)?;
        Reader::from_bytes(bytes)
    }

    /// Reads a pipe-mode `perf.data` stream from an arbitrary [`Read`] (e.g.
    /// a named pipe opened directly, rather than `/dev/stdin`).
    pub fn open_pipe<R: Read>(mut source: R) -> Result<Reader> {
        let mut bytes = Vec::new();
        source.read_to_end(&mut bytes)?;
        Reader::from_bytes(bytes)
    }

    pub fn pipe_mode(&self) -> bool {
        self.pipe_mode
    }

    pub fn session_info(&self) -> SessionInfo {
        self.session_info
    }

    pub fn metadata_cache(&self) -> &MetadataCache {
        &self.cache
    }

    fn from_bytes(bytes: Vec<u8>) -> Result<Reader> {
        if bytes.len() < PIPE_HEADER_SIZE {
            return Err(Error::invalid("perf.data input is shorter than any valid header"));
        }

        let big_endian = if bytes[0..8] == super::MAGIC_LE {
            false
        } else if bytes[0..8] == super::MAGIC_BE {
            true
        } else {
            return Err(Error::invalid("perf.data has an unrecognized magic"));
        };

        let r = ByteReader::new(big_endian);
        let header_size = r.u64(&bytes[8..16]) as usize;

        if header_size == HEADER_SIZE {
            Reader::from_seekable(bytes)
        } else if header_size == PIPE_HEADER_SIZE {
            Reader::from_pipe(bytes, big_endian)
        } else {
            Err(Error::invalid("perf.data header_size matches neither seekable nor pipe framing"))
        }
    }

    fn from_seekable(bytes: Vec<u8>) -> Result<Reader> {
        let header = FileHeader::read(&bytes)?;
        let r = ByteReader::new(header.big_endian);

        let mut cache = MetadataCache::new();
        let mut sample_type_by_id = ::std::collections::HashMap::new();
        let mut attr_id_by_stream_id = ::std::collections::HashMap::new();
        let mut clock_id = None;
        let mut clock_offset = None;

        for bit in 0..FEATURE_MAX_BITS {
            if !header.feature_set(bit) {
                continue;
            }
            let section = read_nth_feature_section(&bytes, header.feature_headers, bit, &header)?;
            let payload = slice_section(&bytes, section)?;

            match bit {
                FEATURE_TRACING_DATA => {
                    let decoded = tracing_data::decode_tracing_data(payload, true)?;
                    for format in decoded.formats {
                        register_format(&mut cache, format)?;
                    }
                }
                FEATURE_EVENT_DESC => {
                    for desc in tracing_data::decode_event_desc(payload, header.big_endian)? {
                        let id = desc.attr.config as u32;
                        let sample_type = ::attr::SampleType::from_bits_truncate(desc.attr.sample_type);
                        sample_type_by_id.insert(id, sample_type);
                        for stream_id in desc.ids {
                            attr_id_by_stream_id.insert(stream_id, id);
                        }
                    }
                }
                FEATURE_CLOCKID => {
                    if payload.len() >= 4 {
                        clock_id = Some(r.u32(&payload[0..4]) as i32);
                    }
                }
                FEATURE_CLOCK_DATA => {
                    if payload.len() >= 24 {
                        let wall_clock_ns = r.u64(&payload[8..16]);
                        clock_offset = Some((
                            (wall_clock_ns / 1_000_000_000) as u64,
                            (wall_clock_ns % 1_000_000_000) as u32,
                        ));
                    }
                }
                _ => {}
            }
        }

        for entry in read_attr_table(&bytes, &header)? {
            sample_type_by_id
                .entry(entry.0)
                .or_insert_with(|| ::attr::SampleType::from_bits_truncate(entry.1.sample_type));
            for stream_id in entry.2 {
                attr_id_by_stream_id.insert(stream_id, entry.0);
            }
        }

        let session_info = match (clock_id, clock_offset) {
            (Some(clock_id), Some((secs, nanos))) => {
                SessionInfo::from_file_clock(clock_id, secs, nanos, header.big_endian)
            }
            _ => SessionInfo::from_file_unknown_clock(header.big_endian),
        };

        let data = slice_section(&bytes, header.data)?.to_vec();

        Ok(Reader {
            session_info,
            cache,
            sample_type_by_id,
            attr_id_by_stream_id,
            pipe_mode: false,
            records: data,
            pos: 0,
        })
    }

    fn from_pipe(bytes: Vec<u8>, big_endian: bool) -> Result<Reader> {
        let r = ByteReader::new(big_endian);
        let mut cache = MetadataCache::new();
        let mut sample_type_by_id = ::std::collections::HashMap::new();
        let mut attr_id_by_stream_id = ::std::collections::HashMap::new();

        let mut pos = PIPE_HEADER_SIZE;
        let data_start = loop {
            if pos + 8 > bytes.len() {
                break pos;
            }
            let kind = r.u32(&bytes[pos..pos + 4]);
            let size = r.u16(&bytes[pos + 6..pos + 8]) as usize;
            if size < 8 || pos + size > bytes.len() {
                break pos;
            }
            let body = &bytes[pos + 8..pos + size];

            match kind {
                record_type::HEADER_ATTR => {
                    let attr_size = ::std::mem::size_of::<perf_event_attr>();
                    if body.len() < attr_size {
                        break pos;
                    }
                    let mut attr: perf_event_attr = unsafe { ::std::mem::zeroed() };
                    // NOTE(unsafe): same plain-old-data copy the seekable
                    // attrs table and EVENT_DESC codec both use.
                    unsafe {
                        ::std::ptr::copy_nonoverlapping(
                            body.as_ptr(),
                            &mut attr as *mut perf_event_attr as *mut u8,
                            attr_size,
                        );
                    }
                    let id = attr.config as u32;
                    let sample_type = ::attr::SampleType::from_bits_truncate(attr.sample_type);
                    sample_type_by_id.insert(id, sample_type);

                    let ids_bytes = &body[attr_size..];
                    for chunk in ids_bytes.chunks_exact(8) {
                        attr_id_by_stream_id.insert(r.u64(chunk), id);
                    }
                }
                record_type::HEADER_TRACING_DATA => {
                    let decoded = tracing_data::decode_tracing_data(body, true)?;
                    for format in decoded.formats {
                        register_format(&mut cache, format)?;
                    }
                }
                record_type::FINISHED_INIT => {
                    pos += size;
                    break pos;
                }
                _ => {}
            }

            pos += size;
        };

        Ok(Reader {
            session_info: SessionInfo::from_file_unknown_clock(big_endian),
            cache,
            sample_type_by_id,
            attr_id_by_stream_id,
            pipe_mode: true,
            records: bytes[data_start..].to_vec(),
            pos: 0,
        })
    }

    /// Returns the next record in file order, or `None` at end of stream.
    pub fn read_event(&mut self) -> Result<Option<RawRecord>> {
        let r = self.session_info.byte_reader();
        if self.pos + 8 > self.records.len() {
            return Ok(None);
        }

        let kind = r.u32(&self.records[self.pos..self.pos + 4]);
        let misc = r.u16(&self.records[self.pos + 4..self.pos + 6]);
        let size = r.u16(&self.records[self.pos + 6..self.pos + 8]) as usize;

        if size < 8 || self.pos + size > self.records.len() {
            return Err(Error::invalid("perf.data record header is corrupt or truncated"));
        }

        let data = self.records[self.pos + 8..self.pos + size].to_vec();
        self.pos += size;

        Ok(Some(RawRecord { kind, misc, data }))
    }

    /// Decodes `record` (which must be a `SAMPLE`) per the ABI field order,
    /// resolving its schema by `common_type` if `RAW` is present, falling
    /// back to the stream id otherwise.
    pub fn get_sample_event_info(&self, record: &RawRecord) -> Result<PerfSampleEventInfo> {
        if record.kind != record_type::SAMPLE {
            return Err(Error::invalid("get_sample_event_info called on a non-SAMPLE record"));
        }

        let event = self.decode_sample(&record.data)?;
        Ok(PerfSampleEventInfo {
            cpu: event.cpu,
            timestamp: event.timestamp,
            stream_id: event.stream_id,
            metadata: event.metadata,
            raw: event.raw,
            session_info: self.session_info,
        })
    }

    pub fn get_non_sample_event_info(&self, record: &RawRecord) -> Result<PerfNonSampleEventInfo> {
        if record.kind == record_type::SAMPLE {
            return Err(Error::invalid("get_non_sample_event_info called on a SAMPLE record"));
        }

        Ok(PerfNonSampleEventInfo {
            kind: record.kind,
            misc: record.misc,
            raw: record.data.clone(),
        })
    }

    /// Picks the `sample_type` to use for parsing `data`.
    ///
    /// When every attr this file declared shares one `sample_type` (true of
    /// every file this crate's own writer produces, since a `Session` only
    /// ever has one sample-type mask for its whole lifetime), that shared
    /// mask is correct for every record and no per-record lookup is needed.
    /// A general perf.data file can mix attrs with different masks; there,
    /// `PERF_SAMPLE_IDENTIFIER`, when used by any attr, is defined by the
    /// kernel ABI to sit at a fixed position — the very first `u64` of the
    /// sample body — independent of which other bits that attr's mask sets,
    /// precisely so a reader can recover the owning attr's id (and from it,
    /// its real `sample_type`) before it knows the rest of the record's
    /// layout.
    fn sample_type_for_record(&self, data: &[u8], r: &ByteReader) -> ::attr::SampleType {
        let mut types = self.sample_type_by_id.values();
        if let Some(&first) = types.next() {
            if types.all(|t| *t == first) {
                return first;
            }
        } else {
            return super::default_sample_type();
        }

        if data.len() >= 8 {
            let identifier = r.u64(&data[0..8]);
            if let Some(&id) = self.attr_id_by_stream_id.get(&identifier) {
                if let Some(&sample_type) = self.sample_type_by_id.get(&id) {
                    return sample_type;
                }
            }
        }

        super::default_sample_type()
    }

    fn decode_sample(&self, data: &[u8]) -> Result<Event> {
        use attr::SampleType;

        let r = self.session_info.byte_reader();
        let sample_type = self.sample_type_for_record(data, &r);
        let mut pos = 0usize;

        macro_rules! take {
            ($n:expr) => {{
                if pos + $n > data.len() {
                    return Err(Error::invalid("SAMPLE record body is truncated"));
                }
                let slice = &data[pos..pos + $n];
                pos += $n;
                slice
            }};
        }

        let mut identifier = None;
        if sample_type.contains(SampleType::IDENTIFIER) {
            identifier = Some(r.u64(take!(8)));
        }
        if sample_type.contains(SampleType::IP) {
            let _ip = r.u64(take!(8));
        }
        if sample_type.contains(SampleType::TID) {
            let _ = take!(8);
        }
        let mut timestamp = None;
        if sample_type.contains(SampleType::TIME) {
            timestamp = Some(r.u64(take!(8)));
        }
        if sample_type.contains(SampleType::ADDR) {
            let _ = take!(8);
        }
        let mut id = None;
        if sample_type.contains(SampleType::ID) {
            id = Some(r.u64(take!(8)));
        }
        let mut stream_id = None;
        if sample_type.contains(SampleType::STREAM_ID) {
            stream_id = Some(r.u64(take!(8)));
        }
        let mut cpu = 0u32;
        if sample_type.contains(SampleType::CPU) {
            cpu = r.u32(take!(4));
            let _ = take!(4);
        }
        if sample_type.contains(SampleType::PERIOD) {
            let _ = take!(8);
        }
        if sample_type.contains(SampleType::CALLCHAIN) {
            let nr = r.u64(take!(8)) as usize;
            if pos + nr * 8 > data.len() {
                return Err(Error::invalid("SAMPLE callchain is truncated"));
            }
            pos += nr * 8;
        }

        let resolved_stream_id = identifier.or(stream_id).or(id);
        let mut raw = Vec::new();
        let mut metadata = None;

        if sample_type.contains(SampleType::RAW) {
            let size = r.u32(take!(4)) as usize;
            if pos + size > data.len() {
                return Err(Error::invalid("SAMPLE raw payload is truncated"));
            }
            raw = data[pos..pos + size].to_vec();
            pos += size;
            metadata = self.cache.find_by_raw_data(&raw);
        }

        if metadata.is_none() {
            if let Some(sid) = resolved_stream_id {
                if let Some(&id) = self.attr_id_by_stream_id.get(&sid) {
                    metadata = self.cache.find_by_id(id);
                }
            }
        }

        let _ = pos;

        Ok(Event {
            cpu,
            timestamp,
            stream_id: resolved_stream_id,
            metadata,
            raw,
        })
    }
}

fn register_format(cache: &mut MetadataCache, format: EventMetadata) -> Result<()> {
    match cache.add(format) {
        Ok(_) => Ok(()),
        Err(Error::AlreadyExists { .. }) => Ok(()),
        Err(other) => Err(other),
    }
}

fn slice_section(bytes: &[u8], section: Section) -> Result<&[u8]> {
    let start = section.offset as usize;
    let end = start
        .checked_add(section.size as usize)
        .ok_or_else(|| Error::invalid("perf.data section overflows"))?;
    bytes
        .get(start..end)
        .ok_or_else(|| Error::invalid("perf.data section is out of bounds"))
}

/// The feature-headers region is a table of `Section` pointers, one per set
/// bit in ascending order (matching the order [`super::writer::Writer`]
/// writes them in); this walks that table to find the `n`-th set bit's
/// entry without needing every bit resolved up front.
fn read_nth_feature_section(bytes: &[u8], table: Section, bit: u32, header: &FileHeader) -> Result<Section> {
    let r = ByteReader::new(header.big_endian);
    let mut index = 0u64;
    for b in 0..bit {
        if header.feature_set(b) {
            index += 1;
        }
    }
    let start = table.offset as usize + (index as usize) * SECTION_SIZE;
    let slice = bytes
        .get(start..start + SECTION_SIZE)
        .ok_or_else(|| Error::invalid("feature-headers table entry is out of bounds"))?;
    Ok(Section::read(r, slice))
}

/// Reads the attrs section back into `(id, attr, stream_ids)` triples.
fn read_attr_table(bytes: &[u8], header: &FileHeader) -> Result<Vec<(u32, perf_event_attr, Vec<u64>)>> {
    let r = ByteReader::new(header.big_endian);
    let attr_size = ::std::mem::size_of::<perf_event_attr>();
    let entry_size = attr_size + SECTION_SIZE;
    if entry_size == 0 || header.attr_size as usize != entry_size {
        return Ok(Vec::new());
    }

    let count = if entry_size > 0 {
        header.attrs.size as usize / entry_size
    } else {
        0
    };

    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let base = header.attrs.offset as usize + i * entry_size;
        let attr_bytes = bytes
            .get(base..base + attr_size)
            .ok_or_else(|| Error::invalid("attrs table entry is out of bounds"))?;
        let mut attr: perf_event_attr = unsafe { ::std::mem::zeroed() };
        // NOTE(unsafe): same plain-old-data copy `tracing_data`'s EVENT_DESC
        // codec uses.
        unsafe {
            ::std::ptr::copy_nonoverlapping(attr_bytes.as_ptr(), &mut attr as *mut perf_event_attr as *mut u8, attr_size);
        }

        let section_bytes = bytes
            .get(base + attr_size..base + entry_size)
            .ok_or_else(|| Error::invalid("attrs table ids-section is out of bounds"))?;
        let ids_section = Section::read(r, section_bytes);
        let ids_bytes = slice_section(bytes, ids_section)?;
        let ids = ids_bytes.chunks_exact(8).map(|c| r.u64(c)).collect();

        out.push((attr.config as u32, attr, ids));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::writer::Writer;

    #[test]
    fn seekable_round_trip_resolves_sample_metadata() {
        let dir = ::std::env::temp_dir();
        let path = dir.join(format!("tracepoint_core_reader_test_{}.perf.data", ::std::process::id()));

        let mut cache = MetadataCache::new();
        let meta = cache
            .add_from_format(
                "sched",
                b"name: sched_switch\nID: 314\nformat:\n\tfield:unsigned short common_type;\toffset:0;\tsize:2;\tsigned:0;\nprint fmt: \"x\"\n",
                true,
            )
            .unwrap();

        let mut writer = Writer::create(&path, SessionInfo::new()).unwrap();
        writer.register_format_for_test(&*meta, "sched", "sched_switch", &[7]);

        let mut raw = vec![0u8; 2];
        raw[0..2].copy_from_slice(&314u16.to_ne_bytes());
        writer
            .write_sample(
                0,
                &Event {
                    cpu: 0,
                    timestamp: Some(100),
                    stream_id: Some(7),
                    metadata: None,
                    raw,
                },
            )
            .unwrap();
        writer.finalize().unwrap();

        let mut reader = Reader::open(&path).unwrap();
        assert!(!reader.pipe_mode());
        let record = reader.read_event().unwrap().unwrap();
        assert_eq!(record.kind, record_type::SAMPLE);
        let info = reader.get_sample_event_info(&record).unwrap();
        assert_eq!(info.name(), Some("sched_switch"));
        assert_eq!(info.timestamp, Some(100));

        let _ = ::std::fs::remove_file(&path);
    }

    #[test]
    fn pipe_round_trip_resolves_two_samples() {
        use super::super::writer::PipeWriter;

        let mut out = Vec::new();
        {
            let mut writer = PipeWriter::create(&mut out).unwrap();
            writer.write_header_attr(314, &[7]).unwrap();

            let meta = format::parse(
                "sched",
                b"name: sched_switch\nID: 314\nformat:\n\tfield:unsigned short common_type;\toffset:0;\tsize:2;\tsigned:0;\nprint fmt: \"x\"\n",
                true,
            )
            .unwrap();
            writer.write_tracing_data(&[meta], true).unwrap();
            writer.write_finished_init().unwrap();

            let mut raw = vec![0u8; 2];
            raw[0..2].copy_from_slice(&314u16.to_ne_bytes());
            for _ in 0..2 {
                writer
                    .write_sample(
                        0,
                        &Event {
                            cpu: 0,
                            timestamp: Some(1),
                            stream_id: Some(7),
                            metadata: None,
                            raw: raw.clone(),
                        },
                    )
                    .unwrap();
            }
        }

        let mut reader = Reader::open_pipe(&out[..]).unwrap();
        assert!(reader.pipe_mode());

        let mut resolved = 0;
        while let Some(record) = reader.read_event().unwrap() {
            if record.kind == record_type::SAMPLE {
                let info = reader.get_sample_event_info(&record).unwrap();
                assert_eq!(info.format().map(|m| m.id), Some(314));
                resolved += 1;
            }
        }
        assert_eq!(resolved, 2);
    }

    #[test]
    fn sample_type_for_record_resolves_heterogeneous_attrs_by_identifier() {
        use attr::SampleType;

        let mut sample_type_by_id = ::std::collections::HashMap::new();
        sample_type_by_id.insert(1u32, SampleType::TIME | SampleType::IDENTIFIER);
        sample_type_by_id.insert(2u32, SampleType::TIME | SampleType::IDENTIFIER | SampleType::RAW);

        let mut attr_id_by_stream_id = ::std::collections::HashMap::new();
        attr_id_by_stream_id.insert(42u64, 2u32);

        let reader = Reader {
            session_info: SessionInfo::new(),
            cache: MetadataCache::new(),
            sample_type_by_id,
            attr_id_by_stream_id,
            pipe_mode: false,
            records: Vec::new(),
            pos: 0,
        };

        let r = reader.session_info.byte_reader();
        let mut data = Vec::new();
        data.extend_from_slice(&42u64.to_ne_bytes()); // IDENTIFIER, first field always

        assert_eq!(
            reader.sample_type_for_record(&data, &r),
            SampleType::TIME | SampleType::IDENTIFIER | SampleType::RAW
        );
    }
}
