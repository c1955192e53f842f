//! The tracepoint metadata cache: a process-wide index of parsed `format`
//! files, keyed both by kernel-assigned numeric id and by `(system, name)`,
//! plus the `common_type` dispatch table used to turn a raw record's first
//! few bytes into a schema lookup.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use error::*;
use format::{self, EventMetadata};
use tracefs;

/// Parsed schema for one tracepoint, reference-counted so callers (buffer
/// drain callbacks, perf.data readers) can hold onto a lookup result past
/// the cache's own lock scope without cloning the whole structure.
pub type MetadataHandle = Arc<EventMetadata>;

/// Indexes every tracepoint schema the process has encountered so far.
///
/// All entries share one `common_type` field geometry: the kernel lays
/// `common_type` out identically for every tracepoint system, so the first
/// entry added fixes `(offset, size)` for the whole cache, and every
/// subsequent entry is checked against it. A mismatch is a
/// [`Error::SchemaConflict`], not a silent overwrite.
#[derive(Debug, Default)]
pub struct MetadataCache {
    by_id: HashMap<u32, MetadataHandle>,
    by_name: HashMap<(String, String), MetadataHandle>,
    common_type_geometry: Option<(u16, u16)>,
}

impl MetadataCache {
    pub fn new() -> Self {
        MetadataCache::default()
    }

    pub fn find_by_id(&self, id: u32) -> Option<MetadataHandle> {
        self.by_id.get(&id).cloned()
    }

    pub fn find_by_name(&self, system: &str, name: &str) -> Option<MetadataHandle> {
        self.by_name
            .get(&(system.to_string(), name.to_string()))
            .cloned()
    }

    /// Reads `common_type` out of `raw_data` using the cache's fixed
    /// geometry and looks the resulting id up. Returns `None` both when the
    /// cache has no geometry yet (nothing has ever been added) and when the
    /// id isn't known.
    pub fn find_by_raw_data(&self, raw_data: &[u8]) -> Option<MetadataHandle> {
        let (offset, size) = self.common_type_geometry?;
        let offset = offset as usize;
        let size = size as usize;
        if raw_data.len() < offset + size {
            return None;
        }
        let id = read_uint_le(&raw_data[offset..offset + size]) as u32;
        self.find_by_id(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetadataHandle> {
        self.by_id.values()
    }

    /// Adds an already-parsed schema. Used by the perf.data reader, which
    /// gets its schemas from `EVENT_DESC` feature records rather than
    /// tracefs.
    pub fn add(&mut self, metadata: EventMetadata) -> Result<MetadataHandle> {
        self.check_and_record_geometry(&metadata)?;

        if self.by_id.contains_key(&metadata.id) {
            return Err(Error::already_exists(format!(
                "event id {} is already in the cache",
                metadata.id
            )));
        }
        let key = (metadata.system.clone(), metadata.name.clone());
        if self.by_name.contains_key(&key) {
            return Err(Error::already_exists(format!(
                "event {}:{} is already in the cache",
                metadata.system, metadata.name
            )));
        }

        let handle: MetadataHandle = Arc::new(metadata);
        self.by_id.insert(handle.id, handle.clone());
        self.by_name.insert(key, handle.clone());
        Ok(handle)
    }

    /// Parses and adds a `format` file's raw bytes directly.
    pub fn add_from_format(&mut self, system: &str, data: &[u8], long_is_64_bit: bool) -> Result<MetadataHandle> {
        let metadata = format::parse(system, data, long_is_64_bit)?;
        self.add(metadata)
    }

    /// Reads and parses `<tracefs_root>/events/<system>/<name>/format`.
    pub fn add_from_system(
        &mut self,
        tracefs_root: &Path,
        system: &str,
        name: &str,
        long_is_64_bit: bool,
    ) -> Result<MetadataHandle> {
        let data = tracefs::read_format(tracefs_root, system, name)?;
        self.add_from_format(system, &data, long_is_64_bit)
    }

    /// Like [`add_from_system`](Self::add_from_system), but idempotent: if
    /// the event is already cached by name, returns the existing handle
    /// instead of an `AlreadyExists` error.
    pub fn find_or_add_from_system(
        &mut self,
        tracefs_root: &Path,
        system: &str,
        name: &str,
        long_is_64_bit: bool,
    ) -> Result<MetadataHandle> {
        if let Some(existing) = self.find_by_name(system, name) {
            return Ok(existing);
        }
        match self.add_from_system(tracefs_root, system, name, long_is_64_bit) {
            Ok(handle) => Ok(handle),
            Err(Error::AlreadyExists { .. }) => self
                .find_by_name(system, name)
                .ok_or_else(|| Error::invalid("cache reported AlreadyExists but has no matching entry")),
            Err(other) => Err(other),
        }
    }

    fn check_and_record_geometry(&mut self, metadata: &EventMetadata) -> Result<()> {
        let (offset, size) = metadata.common_type_geometry()?;
        match self.common_type_geometry {
            None => {
                self.common_type_geometry = Some((offset, size));
            }
            Some((existing_offset, existing_size)) => {
                if existing_offset != offset || existing_size != size {
                    return Err(Error::SchemaConflict {
                        existing_offset,
                        existing_size,
                        new_offset: offset,
                        new_size: size,
                    });
                }
            }
        }
        Ok(())
    }
}

fn read_uint_le(data: &[u8]) -> u64 {
    let mut value: u64 = 0;
    for (i, byte) in data.iter().enumerate().take(8) {
        value |= u64::from(*byte) << (8 * i);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHED_SWITCH: &[u8] = b"name: sched_switch
ID: 314
format:
\tfield:unsigned short common_type;\toffset:0;\tsize:2;\tsigned:0;
\tfield:unsigned char common_flags;\toffset:2;\tsize:1;\tsigned:0;
\tfield:unsigned char common_preempt_count;\toffset:3;\tsize:1;\tsigned:0;
\tfield:int common_pid;\toffset:4;\tsize:4;\tsigned:1;

\tfield:char prev_comm[16];\toffset:8;\tsize:16;\tsigned:0;
print fmt: \"x\"
";

    const SCHED_WAKEUP: &[u8] = b"name: sched_wakeup
ID: 315
format:
\tfield:unsigned short common_type;\toffset:0;\tsize:2;\tsigned:0;
\tfield:unsigned char common_flags;\toffset:2;\tsize:1;\tsigned:0;
\tfield:unsigned char common_preempt_count;\toffset:3;\tsize:1;\tsigned:0;
\tfield:int common_pid;\toffset:4;\tsize:4;\tsigned:1;

\tfield:char comm[16];\toffset:8;\tsize:16;\tsigned:0;
print fmt: \"x\"
";

    #[test]
    fn add_then_find_by_id_and_name_and_raw_data() {
        let _ = ::env_logger::try_init();
        let mut cache = MetadataCache::new();
        let handle = cache.add_from_format("sched", SCHED_SWITCH, true).unwrap();
        assert_eq!(handle.id, 314);

        assert!(cache.find_by_id(314).is_some());
        assert!(cache.find_by_name("sched", "sched_switch").is_some());
        assert!(cache.find_by_name("sched", "nope").is_none());

        let mut raw_data = vec![0u8; 24];
        raw_data[0] = 314u16.to_le_bytes()[0];
        raw_data[1] = 314u16.to_le_bytes()[1];
        let found = cache.find_by_raw_data(&raw_data).unwrap();
        assert_eq!(found.id, 314);
    }

    #[test]
    fn duplicate_id_is_already_exists() {
        let mut cache = MetadataCache::new();
        cache.add_from_format("sched", SCHED_SWITCH, true).unwrap();
        let err = cache.add_from_format("sched", SCHED_SWITCH, true).unwrap_err();
        match err {
            Error::AlreadyExists { .. } => {}
            other => panic!("expected AlreadyExists, got {:?}", other),
        }
    }

    #[test]
    fn find_or_add_is_idempotent_on_duplicate() {
        let mut cache = MetadataCache::new();
        cache.add_from_format("sched", SCHED_SWITCH, true).unwrap();
        let handle = cache.add(format::parse("sched", SCHED_SWITCH, true).unwrap());
        assert!(handle.is_err());
    }

    #[test]
    fn conflicting_common_type_geometry_is_rejected() {
        let mut cache = MetadataCache::new();
        cache.add_from_format("sched", SCHED_SWITCH, true).unwrap();

        let bad = b"name: weird
ID: 900
format:
\tfield:unsigned int common_type;\toffset:0;\tsize:4;\tsigned:0;
\tfield:int x;\toffset:4;\tsize:4;\tsigned:1;
print fmt: \"x\"
";
        let err = cache.add_from_format("weird", bad, true).unwrap_err();
        match err {
            Error::SchemaConflict { .. } => {}
            other => panic!("expected SchemaConflict, got {:?}", other),
        }
    }

    #[test]
    fn two_consistent_events_coexist() {
        let mut cache = MetadataCache::new();
        cache.add_from_format("sched", SCHED_SWITCH, true).unwrap();
        cache.add_from_format("sched", SCHED_WAKEUP, true).unwrap();
        assert_eq!(cache.len(), 2);
    }
}
