//! Synthesizes a seekable `perf.data` file from a session's enabled
//! tracepoints and the decoded [`Event`]s drained from their buffers.
//!
//! Layout follows [`super::FileHeader`]: a 96-byte header, an attribute
//! table (one `perf_event_attr` plus a pointer to its stream-id list per
//! tracepoint), the data section (`SAMPLE`/`FINISHED_ROUND` records), and a
//! feature-headers section carrying `TRACING_DATA`, `EVENT_DESC`, `CLOCKID`
//! and `CLOCK_DATA`. Everything is buffered in memory and written once in
//! [`Writer::finalize`], since none of those offsets are known up front.

use std::fs::File;
use std::io::Write as _;
use std::path::Path;

use byte_reader::ByteReader;
use error::*;
use format::EventMetadata;
use raw::{perf_event_attr, perf_type_id};
use session::{Event, TracepointInfo};
use session_info::SessionInfo;

use super::tracing_data;
use super::{default_sample_type, record_type, FileHeader, Section, FEATURE_CLOCKID, FEATURE_CLOCK_DATA,
            FEATURE_EVENT_DESC, FEATURE_TRACING_DATA, HEADER_SIZE, PIPE_HEADER_SIZE, SECTION_SIZE};

fn file_attr(id: u32, sample_type: ::attr::SampleType) -> perf_event_attr {
    let mut attr: perf_event_attr = unsafe { ::std::mem::zeroed() };
    attr.type_ = perf_type_id::PERF_TYPE_TRACEPOINT;
    attr.size = ::std::mem::size_of::<perf_event_attr>() as u32;
    attr.config = u64::from(id);
    attr.sample_type = sample_type.bits();
    attr
}

fn round_up_8(n: usize) -> usize {
    (n + 7) & !7
}

pub struct Writer {
    path: ::std::path::PathBuf,
    session_info: SessionInfo,
    long_is_64_bit: bool,
    formats: Vec<EventMetadata>,
    seen_format_ids: ::std::collections::BTreeSet<u32>,
    /// One entry per distinct tracepoint id: its recorded attr, its
    /// `system:name`, and the stream ids its per-CPU fds reported.
    attr_descs: Vec<(perf_event_attr, String, Vec<u64>)>,
    /// Buffered data-section records, appended to as samples arrive.
    data: Vec<u8>,
}

impl Writer {
    pub fn create(path: &Path, session_info: SessionInfo) -> Result<Self> {
        Ok(Writer {
            path: path.to_path_buf(),
            session_info,
            long_is_64_bit: ::std::mem::size_of::<usize>() == 8,
            formats: Vec::new(),
            seen_format_ids: ::std::collections::BTreeSet::new(),
            attr_descs: Vec::new(),
            data: Vec::new(),
        })
    }

    /// Registers one attr/format entry per distinct tracepoint id the
    /// session currently has enabled, so `finalize` can describe every
    /// event id appearing in the data section.
    pub fn add_events_from_tracepoints<'a>(&mut self, tracepoints: impl Iterator<Item = &'a TracepointInfo>) -> Result<()> {
        for tp in tracepoints {
            if !self.seen_format_ids.insert(tp.metadata.id) {
                continue;
            }

            let mut ids = Vec::new();
            let mut cpu = 0usize;
            while let Some(stream_id) = tp.stream_id(cpu) {
                ids.push(stream_id);
                cpu += 1;
            }

            self.formats.push((*tp.metadata).clone());
            self.attr_descs.push((
                file_attr(tp.metadata.id, default_sample_type()),
                format!("{}:{}", tp.system, tp.name),
                ids,
            ));
        }
        Ok(())
    }

    /// Appends one `SAMPLE` record. Missing optional fields (no timestamp,
    /// no stream id) are written as zero so every record keeps the same
    /// fixed layout implied by `default_sample_type`.
    pub fn write_sample(&mut self, cpu: u32, event: &Event) -> Result<()> {
        let r = ByteReader::host();
        let mut body = Vec::with_capacity(8 + 8 + 8 + 4 + event.raw.len());

        let mut buf8 = [0u8; 8];
        r.write_u64(&mut buf8, event.timestamp.unwrap_or(0));
        body.extend_from_slice(&buf8);

        r.write_u64(&mut buf8, event.stream_id.unwrap_or(0));
        body.extend_from_slice(&buf8);

        let mut buf4 = [0u8; 4];
        r.write_u32(&mut buf4, cpu);
        body.extend_from_slice(&buf4);
        body.extend_from_slice(&[0, 0, 0, 0]); // reserved "res" half of the CPU field

        r.write_u32(&mut buf4, event.raw.len() as u32);
        body.extend_from_slice(&buf4);
        body.extend_from_slice(&event.raw);

        body.resize(round_up_8(body.len()), 0);
        self.push_record(record_type::SAMPLE, 0, &body);
        Ok(())
    }

    /// Appends a bodyless `FINISHED_ROUND` marker: everything written before
    /// it is safe for a reader to process as one ordered batch.
    pub fn write_finished_round(&mut self) -> Result<()> {
        self.push_record(record_type::FINISHED_ROUND, 0, &[]);
        Ok(())
    }

    /// Appends a bodyless `FINISHED_INIT` marker: every `HEADER_*` record a
    /// pipe-mode reader needs has already been written, and subsequent
    /// records are ordinary data. This writer emits its headers out-of-band
    /// (the feature-headers section), so callers only need this when
    /// replaying the file through a strictly pipe-oriented consumer.
    pub fn write_finished_init(&mut self) -> Result<()> {
        self.push_record(record_type::FINISHED_INIT, 0, &[]);
        Ok(())
    }

    fn push_record(&mut self, kind: u32, misc: u16, body: &[u8]) {
        let r = ByteReader::host();
        let mut header = [0u8; 8];
        r.write_u32(&mut header[0..4], kind);
        r.write_u16(&mut header[4..6], misc);
        r.write_u16(&mut header[6..8], (8 + body.len()) as u16);
        self.data.extend_from_slice(&header);
        self.data.extend_from_slice(body);
    }

    /// Registers one attr/format entry directly, bypassing
    /// `add_events_from_tracepoints`'s dependency on a live `TracepointInfo`
    /// (whose fds/stream_ids fields are private to `session.rs`). Used only
    /// by `reader.rs`'s round-trip tests.
    #[cfg(test)]
    pub(crate) fn register_format_for_test(&mut self, metadata: &EventMetadata, system: &str, name: &str, ids: &[u64]) {
        if !self.seen_format_ids.insert(metadata.id) {
            return;
        }
        self.formats.push(metadata.clone());
        self.attr_descs.push((
            file_attr(metadata.id, default_sample_type()),
            format!("{}:{}", system, name),
            ids.to_vec(),
        ));
    }

    /// Writes the complete file to disk and consumes the writer.
    pub fn finalize(self) -> Result<()> {
        let r = ByteReader::host();
        let attr_size = ::std::mem::size_of::<perf_event_attr>() + SECTION_SIZE;

        let attrs_offset = HEADER_SIZE as u64;
        let attrs_size = (self.attr_descs.len() * attr_size) as u64;

        let mut ids_bytes = Vec::new();
        let mut attr_sections = Vec::with_capacity(self.attr_descs.len());
        let mut ids_running_offset = attrs_offset + attrs_size;
        for (_, _, ids) in &self.attr_descs {
            let size = (ids.len() * 8) as u64;
            attr_sections.push(Section {
                offset: ids_running_offset,
                size,
            });
            for id in ids {
                let mut buf8 = [0u8; 8];
                r.write_u64(&mut buf8, *id);
                ids_bytes.extend_from_slice(&buf8);
            }
            ids_running_offset += size;
        }

        let data_offset = ids_running_offset;
        let data_size = self.data.len() as u64;

        let tracing_data_payload = tracing_data::synthesize_tracing_data(&self.formats, self.long_is_64_bit, r.big_endian());
        let event_desc_payload = tracing_data::synthesize_event_desc(&self.attr_descs, r.big_endian());

        let mut clockid_payload = [0u8; 4];
        r.write_u32(&mut clockid_payload, self.session_info.clock_id() as u32);

        let wall = self.session_info.time_to_time_spec(0).unwrap_or_default();
        let mut clock_data_payload = [0u8; 24];
        r.write_u32(&mut clock_data_payload[0..4], 1); // CLOCK_DATA struct version
        r.write_u32(&mut clock_data_payload[4..8], self.session_info.clock_id() as u32);
        r.write_u64(&mut clock_data_payload[8..16], wall.as_nanos() as u64);
        r.write_u64(&mut clock_data_payload[16..24], 0); // clockid_ns reference point

        let features: Vec<(u32, &[u8])> = vec![
            (FEATURE_TRACING_DATA, &tracing_data_payload[..]),
            (FEATURE_EVENT_DESC, &event_desc_payload[..]),
            (FEATURE_CLOCKID, &clockid_payload[..]),
            (FEATURE_CLOCK_DATA, &clock_data_payload[..]),
        ];

        let feature_table_offset = data_offset + data_size;
        let feature_table_size = (features.len() * SECTION_SIZE) as u64;
        let mut feature_payload_offset = feature_table_offset + feature_table_size;

        let mut feature_table = Vec::with_capacity(features.len() * SECTION_SIZE);
        let mut feature_payloads = Vec::new();
        let mut flags = 0u64;
        for entry in features.iter() {
            let bit = entry.0;
            let payload = entry.1;
            let section = Section {
                offset: feature_payload_offset,
                size: payload.len() as u64,
            };
            let mut buf = [0u8; SECTION_SIZE];
            section.write(r, &mut buf);
            feature_table.extend_from_slice(&buf);
            feature_payloads.extend_from_slice(payload);
            feature_payload_offset += payload.len() as u64;
            flags |= 1u64 << bit;
        }

        let header = FileHeader {
            big_endian: r.big_endian(),
            header_size: HEADER_SIZE as u64,
            attr_size: attr_size as u64,
            attrs: Section {
                offset: attrs_offset,
                size: attrs_size,
            },
            data: Section {
                offset: data_offset,
                size: data_size,
            },
            feature_headers: Section {
                offset: feature_table_offset,
                size: feature_table_size,
            },
            flags,
        };

        let mut header_bytes = [0u8; HEADER_SIZE];
        header.write_into(&mut header_bytes);

        let mut attrs_bytes = Vec::with_capacity(attrs_size as usize);
        for i in 0..self.attr_descs.len() {
            let attr = &self.attr_descs[i].0;
            let ids_section = attr_sections[i];
            let attr_size_bytes = ::std::mem::size_of::<perf_event_attr>();
            // NOTE(unsafe): perf_event_attr is the same plain-old-data,
            // bindgen-generated repr(C) struct `tracing_data`'s EVENT_DESC
            // codec reads/writes the same way.
            let raw = unsafe { ::std::slice::from_raw_parts(attr as *const perf_event_attr as *const u8, attr_size_bytes) };
            attrs_bytes.extend_from_slice(raw);
            let mut section_bytes = [0u8; SECTION_SIZE];
            ids_section.write(r, &mut section_bytes);
            attrs_bytes.extend_from_slice(&section_bytes);
        }

        let mut file = File::create(&self.path)?;
        file.write_all(&header_bytes)?;
        file.write_all(&attrs_bytes)?;
        file.write_all(&ids_bytes)?;
        file.write_all(&self.data)?;
        file.write_all(&feature_table)?;
        file.write_all(&feature_payloads)?;
        file.flush()?;

        Ok(())
    }
}

/// Streams a pipe-mode `perf.data` file to any `Write` sink: a 16-byte
/// header, then `HEADER_ATTR`/`HEADER_TRACING_DATA` records describing each
/// tracepoint, a `FINISHED_INIT` marker, and finally the ordinary
/// `SAMPLE`/`FINISHED_ROUND` records. Unlike [`Writer`], nothing is
/// buffered: every `write_*` call emits its record immediately, since a pipe
/// destination can't be seeked back into to patch up a header afterward.
pub struct PipeWriter<W> {
    out: W,
    big_endian: bool,
}

impl<W: ::std::io::Write> PipeWriter<W> {
    /// Writes the pipe header and returns a writer ready for
    /// `write_header_attr`/`write_tracing_data`/`write_finished_init`.
    pub fn create(mut out: W) -> Result<Self> {
        let r = ByteReader::host();
        let mut header = [0u8; PIPE_HEADER_SIZE];
        let magic = if r.big_endian() { super::MAGIC_BE } else { super::MAGIC_LE };
        header[0..8].copy_from_slice(&magic);
        r.write_u64(&mut header[8..16], PIPE_HEADER_SIZE as u64);
        out.write_all(&header)?;
        Ok(PipeWriter {
            out,
            big_endian: r.big_endian(),
        })
    }

    /// Emits one `HEADER_ATTR` record: the tracepoint's `perf_event_attr`
    /// followed inline by its stream ids (one per CPU fd), the pipe-mode
    /// equivalent of an `attrs`-section entry plus its `ids` section.
    pub fn write_header_attr(&mut self, id: u32, ids: &[u64]) -> Result<()> {
        let attr = file_attr(id, default_sample_type());
        let attr_size = ::std::mem::size_of::<perf_event_attr>();
        let mut body = Vec::with_capacity(attr_size + ids.len() * 8);
        // NOTE(unsafe): same plain-old-data read `tracing_data`'s EVENT_DESC
        // codec and this module's seekable `finalize` both rely on.
        let raw = unsafe { ::std::slice::from_raw_parts(&attr as *const perf_event_attr as *const u8, attr_size) };
        body.extend_from_slice(raw);

        let r = ByteReader::new(self.big_endian);
        for stream_id in ids {
            let mut buf8 = [0u8; 8];
            r.write_u64(&mut buf8, *stream_id);
            body.extend_from_slice(&buf8);
        }

        self.push_record(record_type::HEADER_ATTR, 0, &body)
    }

    /// Emits one `HEADER_TRACING_DATA` record carrying every format
    /// registered so far, verbatim (this writer's own simplified framing:
    /// the real kernel ABI splits this across two records plus an
    /// out-of-band append, which a pipe sink here has no need to mirror).
    pub fn write_tracing_data(&mut self, formats: &[EventMetadata], long_is_64_bit: bool) -> Result<()> {
        let payload = tracing_data::synthesize_tracing_data(formats, long_is_64_bit, self.big_endian);
        self.push_record(record_type::HEADER_TRACING_DATA, 0, &payload)
    }

    /// Marks the end of header records; a [`super::reader::Reader`] reading
    /// in pipe mode treats every record after this as ordinary data.
    pub fn write_finished_init(&mut self) -> Result<()> {
        self.push_record(record_type::FINISHED_INIT, 0, &[])
    }

    pub fn write_sample(&mut self, cpu: u32, event: &Event) -> Result<()> {
        let r = ByteReader::new(self.big_endian);
        let mut body = Vec::with_capacity(8 + 8 + 8 + 4 + event.raw.len());

        let mut buf8 = [0u8; 8];
        r.write_u64(&mut buf8, event.timestamp.unwrap_or(0));
        body.extend_from_slice(&buf8);

        r.write_u64(&mut buf8, event.stream_id.unwrap_or(0));
        body.extend_from_slice(&buf8);

        let mut buf4 = [0u8; 4];
        r.write_u32(&mut buf4, cpu);
        body.extend_from_slice(&buf4);
        body.extend_from_slice(&[0, 0, 0, 0]);

        r.write_u32(&mut buf4, event.raw.len() as u32);
        body.extend_from_slice(&buf4);
        body.extend_from_slice(&event.raw);

        body.resize(round_up_8(body.len()), 0);
        self.push_record(record_type::SAMPLE, 0, &body)
    }

    pub fn write_finished_round(&mut self) -> Result<()> {
        self.push_record(record_type::FINISHED_ROUND, 0, &[])
    }

    fn push_record(&mut self, kind: u32, misc: u16, body: &[u8]) -> Result<()> {
        let r = ByteReader::new(self.big_endian);
        let mut header = [0u8; 8];
        r.write_u32(&mut header[0..4], kind);
        r.write_u16(&mut header[4..6], misc);
        r.write_u16(&mut header[6..8], (8 + body.len()) as u16);
        self.out.write_all(&header)?;
        self.out.write_all(body)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_writes_a_header_and_reopens_the_file_size_consistently() {
        let _ = ::env_logger::try_init();
        let dir = ::std::env::temp_dir();
        let path = dir.join(format!("tracepoint_core_writer_test_{}.perf.data", ::std::process::id()));

        let writer = Writer::create(&path, SessionInfo::new()).unwrap();
        writer.finalize().unwrap();

        let metadata = ::std::fs::metadata(&path).unwrap();
        assert!(metadata.len() >= HEADER_SIZE as u64);

        let bytes = ::std::fs::read(&path).unwrap();
        let header = FileHeader::read(&bytes).unwrap();
        assert_eq!(header.data.size, 0);

        let _ = ::std::fs::remove_file(&path);
    }

    #[test]
    fn write_sample_round_trips_through_finalize() {
        let dir = ::std::env::temp_dir();
        let path = dir.join(format!("tracepoint_core_writer_test_sample_{}.perf.data", ::std::process::id()));

        let mut writer = Writer::create(&path, SessionInfo::new()).unwrap();
        writer
            .write_sample(
                0,
                &Event {
                    cpu: 0,
                    timestamp: Some(42),
                    stream_id: Some(7),
                    metadata: None,
                    raw: vec![1, 2, 3, 4],
                },
            )
            .unwrap();
        writer.write_finished_round().unwrap();
        writer.finalize().unwrap();

        let bytes = ::std::fs::read(&path).unwrap();
        let header = FileHeader::read(&bytes).unwrap();
        assert!(header.data.size > 0);
        assert!(header.feature_set(FEATURE_TRACING_DATA));
        assert!(header.feature_set(FEATURE_CLOCK_DATA));

        let _ = ::std::fs::remove_file(&path);
    }
}
