//! Byte-layout synthesis and decoding for the two feature payloads this
//! crate's reader and writer both understand: `TRACING_DATA` (the ftrace
//! subsystem's format dump) and `EVENT_DESC` (a flatter event-name-and-attr
//! table used when a separate format wasn't captured).

use std::collections::BTreeMap;

use byte_reader::ByteReader;
use error::*;
use format::{self, EventMetadata};
use raw::perf_event_attr;

const TRACING_MAGIC: [u8; 10] = [0x17, 0x08, 0x44, b't', b'r', b'a', b'c', b'i', b'n', b'g'];
const TRACING_VERSION: &[u8] = b"0.6\0";

/// The standard kernel ring-buffer page header, the same for every tracing
/// session on a given kernel; this crate doesn't introspect it, so a fixed
/// default is embedded rather than captured live.
const DEFAULT_HEADER_PAGE: &[u8] = b"\tfield: u64 timestamp;\toffset:0;\tsize:8;\tsigned:0;\n\
\tfield: local_t commit;\toffset:8;\tsize:8;\tsigned:1;\n\
\tfield: int overwrite;\toffset:8;\tsize:1;\tsigned:1;\n\
\tfield: char data;\toffset:16;\tsize:4080;\tsigned:0;\n";

const DEFAULT_HEADER_EVENT: &[u8] = b"# compressed entry header\n\
\ttype_len    :    5 bits\n\
\ttime_delta  :   27 bits\n\
\tarray       :   32 bits\n\n\
\tpadding     : type == 29\n\
\ttime_extend : type == 30\n\
\ttime_stamp : type == 31\n";

/// What `decode_tracing_data` recovers from one `TRACING_DATA` payload.
#[derive(Clone, Debug, Default)]
pub struct DecodedTracingData {
    pub long_size: u8,
    pub page_size: u32,
    pub header_page: Vec<u8>,
    pub header_event: Vec<u8>,
    pub formats: Vec<EventMetadata>,
    pub kallsyms: Vec<u8>,
    pub printk_formats: Vec<u8>,
    pub saved_cmdline: Vec<u8>,
}

fn write_named_section(out: &mut Vec<u8>, r: ByteReader, name: &str, content: &[u8]) {
    out.extend_from_slice(name.as_bytes());
    out.push(0);
    let mut len_bytes = [0u8; 8];
    r.write_u64(&mut len_bytes, content.len() as u64);
    out.extend_from_slice(&len_bytes);
    out.extend_from_slice(content);
}

fn read_named_section<'a>(r: ByteReader, data: &'a [u8], pos: &mut usize) -> Result<(String, &'a [u8])> {
    let nul = data[*pos..]
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::invalid("tracing_data: unterminated section name"))?;
    let name = String::from_utf8_lossy(&data[*pos..*pos + nul]).into_owned();
    *pos += nul + 1;
    if *pos + 8 > data.len() {
        return Err(Error::invalid("tracing_data: truncated section length"));
    }
    let len = r.u64(&data[*pos..*pos + 8]) as usize;
    *pos += 8;
    if *pos + len > data.len() {
        return Err(Error::invalid("tracing_data: truncated section body"));
    }
    let body = &data[*pos..*pos + len];
    *pos += len;
    Ok((name, body))
}

/// Builds one `TRACING_DATA` feature payload from every format this session
/// (or writer) has accumulated, grouped by subsystem the way the kernel's
/// own tracing directory is laid out.
pub fn synthesize_tracing_data(formats: &[EventMetadata], long_is_64_bit: bool, big_endian: bool) -> Vec<u8> {
    let r = ByteReader::new(big_endian);
    let mut out = Vec::new();

    out.extend_from_slice(&TRACING_MAGIC);
    out.extend_from_slice(TRACING_VERSION);
    out.push(big_endian as u8);
    out.push(if long_is_64_bit { 8 } else { 4 });

    let page_size = ::page_size::get() as u32;
    let mut page_size_bytes = [0u8; 4];
    r.write_u32(&mut page_size_bytes, page_size);
    out.extend_from_slice(&page_size_bytes);

    write_named_section(&mut out, r, "header_page", DEFAULT_HEADER_PAGE);
    write_named_section(&mut out, r, "header_event", DEFAULT_HEADER_EVENT);

    // ftrace-internal event count: this crate never registers any.
    let mut zero = [0u8; 4];
    out.extend_from_slice(&zero);

    let mut by_system: BTreeMap<&str, Vec<&EventMetadata>> = BTreeMap::new();
    for meta in formats {
        by_system.entry(meta.system.as_str()).or_insert_with(Vec::new).push(meta);
    }

    r.write_u32(&mut zero, by_system.len() as u32);
    out.extend_from_slice(&zero);
    for (system, events) in &by_system {
        out.extend_from_slice(system.as_bytes());
        out.push(0);
        r.write_u32(&mut zero, events.len() as u32);
        out.extend_from_slice(&zero);
        for meta in events {
            let mut len_bytes = [0u8; 8];
            r.write_u64(&mut len_bytes, meta.raw_format.len() as u64);
            out.extend_from_slice(&len_bytes);
            out.extend_from_slice(&meta.raw_format);
        }
    }

    // kallsyms / printk formats / saved cmdline: this crate resolves neither
    // kernel symbols nor the task name table, so each is an empty section.
    for _ in 0..3 {
        out.extend_from_slice(&zero[..0]); // no-op, kept for readability of the loop
        let mut len_bytes = [0u8; 4];
        r.write_u32(&mut len_bytes, 0);
        out.extend_from_slice(&len_bytes);
    }

    out
}

/// Parses a `TRACING_DATA` payload back into its component sections,
/// handing each subsystem's format bytes through [`format::parse`].
pub fn decode_tracing_data(data: &[u8], long_is_64_bit_hint: bool) -> Result<DecodedTracingData> {
    if data.len() < TRACING_MAGIC.len() || data[..TRACING_MAGIC.len()] != TRACING_MAGIC {
        return Err(Error::invalid("TRACING_DATA payload has the wrong magic"));
    }
    let mut pos = TRACING_MAGIC.len();

    let version_end = data[pos..]
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::invalid("TRACING_DATA version string is unterminated"))?;
    pos += version_end + 1;

    if pos + 2 > data.len() {
        return Err(Error::invalid("TRACING_DATA payload is truncated"));
    }
    let big_endian = data[pos] != 0;
    let long_size = data[pos + 1];
    pos += 2;
    let r = ByteReader::new(big_endian);

    if pos + 4 > data.len() {
        return Err(Error::invalid("TRACING_DATA payload is truncated"));
    }
    let page_size = r.u32(&data[pos..pos + 4]);
    pos += 4;

    let (_, header_page) = read_named_section(r, data, &mut pos)?;
    let header_page = header_page.to_vec();
    let (_, header_event) = read_named_section(r, data, &mut pos)?;
    let header_event = header_event.to_vec();

    if pos + 4 > data.len() {
        return Err(Error::invalid("TRACING_DATA payload is truncated"));
    }
    let ftrace_count = r.u32(&data[pos..pos + 4]) as usize;
    pos += 4;
    for _ in 0..ftrace_count {
        if pos + 8 > data.len() {
            return Err(Error::invalid("TRACING_DATA payload is truncated"));
        }
        let len = r.u64(&data[pos..pos + 8]) as usize;
        pos += 8 + len;
    }

    if pos + 4 > data.len() {
        return Err(Error::invalid("TRACING_DATA payload is truncated"));
    }
    let system_count = r.u32(&data[pos..pos + 4]) as usize;
    pos += 4;

    let mut formats = Vec::new();
    for _ in 0..system_count {
        let nul = data[pos..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::invalid("TRACING_DATA system name is unterminated"))?;
        let system = String::from_utf8_lossy(&data[pos..pos + nul]).into_owned();
        pos += nul + 1;

        if pos + 4 > data.len() {
            return Err(Error::invalid("TRACING_DATA payload is truncated"));
        }
        let event_count = r.u32(&data[pos..pos + 4]) as usize;
        pos += 4;

        for _ in 0..event_count {
            if pos + 8 > data.len() {
                return Err(Error::invalid("TRACING_DATA payload is truncated"));
            }
            let len = r.u64(&data[pos..pos + 8]) as usize;
            pos += 8;
            if pos + len > data.len() {
                return Err(Error::invalid("TRACING_DATA payload is truncated"));
            }
            let body = &data[pos..pos + len];
            pos += len;
            formats.push(format::parse(&system, body, long_is_64_bit_hint)?);
        }
    }

    let mut read_blob = |pos: &mut usize| -> Result<Vec<u8>> {
        if *pos + 4 > data.len() {
            return Err(Error::invalid("TRACING_DATA payload is truncated"));
        }
        let len = r.u32(&data[*pos..*pos + 4]) as usize;
        *pos += 4;
        if *pos + len > data.len() {
            return Err(Error::invalid("TRACING_DATA payload is truncated"));
        }
        let blob = data[*pos..*pos + len].to_vec();
        *pos += len;
        Ok(blob)
    };

    let kallsyms = read_blob(&mut pos)?;
    let printk_formats = read_blob(&mut pos)?;
    let saved_cmdline = read_blob(&mut pos)?;

    Ok(DecodedTracingData {
        long_size,
        page_size,
        header_page,
        header_event,
        formats,
        kallsyms,
        printk_formats,
        saved_cmdline,
    })
}

/// Builds one `EVENT_DESC` feature payload: a flatter alternative to
/// `TRACING_DATA` that pairs each attr with its name and stream ids,
/// without a full format dump.
pub fn synthesize_event_desc(
    descs: &[(perf_event_attr, String, Vec<u64>)],
    big_endian: bool,
) -> Vec<u8> {
    let r = ByteReader::new(big_endian);
    let mut out = Vec::new();
    let attr_size = ::std::mem::size_of::<perf_event_attr>();

    let mut header = [0u8; 8];
    r.write_u32(&mut header[0..4], descs.len() as u32);
    r.write_u32(&mut header[4..8], attr_size as u32);
    out.extend_from_slice(&header);

    for (attr, name, ids) in descs {
        // NOTE(unsafe): perf_event_attr is a plain-old-data, bindgen-generated
        // repr(C) struct with no padding bytes that matter for our purposes;
        // reading it as its own byte representation is how the kernel itself
        // writes perf.data attr sections.
        let attr_bytes =
            unsafe { ::std::slice::from_raw_parts(attr as *const perf_event_attr as *const u8, attr_size) };
        out.extend_from_slice(attr_bytes);

        let mut counts = [0u8; 8];
        r.write_u32(&mut counts[0..4], ids.len() as u32);
        let name_padded_len = round_up_8(name.len() + 1);
        r.write_u32(&mut counts[4..8], name_padded_len as u32);
        out.extend_from_slice(&counts);

        let mut name_bytes = vec![0u8; name_padded_len];
        name_bytes[..name.len()].copy_from_slice(name.as_bytes());
        out.extend_from_slice(&name_bytes);

        for id in ids {
            let mut id_bytes = [0u8; 8];
            r.write_u64(&mut id_bytes, *id);
            out.extend_from_slice(&id_bytes);
        }
    }

    out
}

/// One decoded `EVENT_DESC` entry: the attr, its human-readable name, and
/// the stream ids that identify it in the data section.
#[derive(Clone, Debug)]
pub struct EventDesc {
    pub attr: perf_event_attr,
    pub name: String,
    pub ids: Vec<u64>,
}

pub fn decode_event_desc(data: &[u8], big_endian: bool) -> Result<Vec<EventDesc>> {
    let r = ByteReader::new(big_endian);
    if data.len() < 8 {
        return Err(Error::invalid("EVENT_DESC payload is truncated"));
    }
    let nr = r.u32(&data[0..4]) as usize;
    let attr_size = r.u32(&data[4..8]) as usize;
    let mut pos = 8;

    let mut out = Vec::with_capacity(nr);
    for _ in 0..nr {
        if pos + attr_size > data.len() {
            return Err(Error::invalid("EVENT_DESC payload is truncated"));
        }
        let mut attr: perf_event_attr = unsafe { ::std::mem::zeroed() };
        let copy_len = attr_size.min(::std::mem::size_of::<perf_event_attr>());
        // NOTE(unsafe): copying attr_size bytes (bounded above by the real
        // struct's size) into a freshly-zeroed local of that exact type.
        unsafe {
            ::std::ptr::copy_nonoverlapping(
                data[pos..].as_ptr(),
                &mut attr as *mut perf_event_attr as *mut u8,
                copy_len,
            );
        }
        pos += attr_size;

        if pos + 8 > data.len() {
            return Err(Error::invalid("EVENT_DESC payload is truncated"));
        }
        let nr_ids = r.u32(&data[pos..pos + 4]) as usize;
        let name_len = r.u32(&data[pos + 4..pos + 8]) as usize;
        pos += 8;

        if pos + name_len > data.len() {
            return Err(Error::invalid("EVENT_DESC payload is truncated"));
        }
        let name_bytes = &data[pos..pos + name_len];
        let nul = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
        let name = String::from_utf8_lossy(&name_bytes[..nul]).into_owned();
        pos += name_len;

        let mut ids = Vec::with_capacity(nr_ids);
        for _ in 0..nr_ids {
            if pos + 8 > data.len() {
                return Err(Error::invalid("EVENT_DESC payload is truncated"));
            }
            ids.push(r.u64(&data[pos..pos + 8]));
            pos += 8;
        }

        out.push(EventDesc { attr, name, ids });
    }

    Ok(out)
}

fn round_up_8(n: usize) -> usize {
    (n + 7) & !7
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata(system: &str, name: &str, id: u32) -> EventMetadata {
        let text = format!(
            "name: {}\nID: {}\nformat:\n\tfield:unsigned short common_type;\toffset:0;\tsize:2;\tsigned:0;\nprint fmt: \"x\"\n",
            name, id
        );
        format::parse(system, text.as_bytes(), true).unwrap()
    }

    #[test]
    fn tracing_data_round_trips_one_system_two_events() {
        let formats = vec![
            sample_metadata("sched", "sched_switch", 1),
            sample_metadata("sched", "sched_wakeup", 2),
        ];
        let payload = synthesize_tracing_data(&formats, true, false);
        let decoded = decode_tracing_data(&payload, true).unwrap();

        assert_eq!(decoded.long_size, 8);
        assert_eq!(decoded.formats.len(), 2);
        assert_eq!(decoded.formats[0].system, "sched");
        let names: Vec<&str> = decoded.formats.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"sched_switch"));
        assert!(names.contains(&"sched_wakeup"));
    }

    #[test]
    fn tracing_data_rejects_bad_magic() {
        assert!(decode_tracing_data(b"not tracing data", true).is_err());
    }

    #[test]
    fn event_desc_round_trips_name_and_ids() {
        let attr: perf_event_attr = unsafe { ::std::mem::zeroed() };
        let descs = vec![(attr, "sched:sched_switch".to_string(), vec![11u64, 22, 33])];
        let payload = synthesize_event_desc(&descs, false);
        let decoded = decode_event_desc(&payload, false).unwrap();

        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].name, "sched:sched_switch");
        assert_eq!(decoded[0].ids, vec![11, 22, 33]);
    }
}
