//! Locates the tracefs mount and reads the per-event files under it:
//! `events/<system>/<name>/format`, `events/<system>/<name>/id`, and the
//! `user_events_data` control file used to register ad hoc user-space
//! events.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use error::*;

const CANDIDATE_TRACEFS_PATHS: &[&str] = &["/sys/kernel/tracing", "/sys/kernel/debug/tracing"];

/// Finds the tracefs root, preferring a dedicated `tracefs` mount over the
/// legacy `debugfs`-hosted one.
///
/// Mirrors the two-step probe a kernel tracing client needs: try the
/// well-known absolute paths first (cheap, no parsing), then fall back to
/// `/proc/mounts`, where multiple tracing mounts may be present and a
/// `tracefs`-typed one should win over a `debugfs`-typed one.
pub fn find_tracefs_root() -> Result<PathBuf> {
    for candidate in CANDIDATE_TRACEFS_PATHS {
        let path = Path::new(candidate);
        if path.join("events").is_dir() {
            return Ok(path.to_path_buf());
        }
    }

    find_via_proc_mounts()
}

fn find_via_proc_mounts() -> Result<PathBuf> {
    let mounts = fs::read_to_string("/proc/mounts")
        .map_err(|e| Error::not_found(format!("could not read /proc/mounts: {}", e)))?;

    let mut debugfs_fallback: Option<PathBuf> = None;

    for line in mounts.lines() {
        let mut fields = line.split_whitespace();
        let _device = match fields.next() {
            Some(d) => d,
            None => continue,
        };
        let mount_point = match fields.next() {
            Some(m) => m,
            None => continue,
        };
        let fs_type = match fields.next() {
            Some(t) => t,
            None => continue,
        };

        match fs_type {
            "tracefs" => {
                let path = PathBuf::from(mount_point);
                if path.join("events").is_dir() {
                    return Ok(path);
                }
            }
            "debugfs" => {
                let candidate = PathBuf::from(mount_point).join("tracing");
                if debugfs_fallback.is_none() && candidate.join("events").is_dir() {
                    debugfs_fallback = Some(candidate);
                }
            }
            _ => {}
        }
    }

    debugfs_fallback.ok_or_else(|| Error::not_found("no tracefs or debugfs tracing mount found"))
}

/// Reads `<root>/events/<system>/<name>/format`.
pub fn read_format(root: &Path, system: &str, name: &str) -> Result<Vec<u8>> {
    let path = root.join("events").join(system).join(name).join("format");
    read_whole_file(&path)
}

/// Reads `<root>/events/<system>/<name>/id` and parses the decimal integer
/// it contains. Present as a convenience: `format`'s own `ID:` line carries
/// the same value, and callers that already have the format text should
/// prefer parsing it from there rather than making a second syscall.
pub fn read_id(root: &Path, system: &str, name: &str) -> Result<u32> {
    let path = root.join("events").join(system).join(name).join("id");
    let text = read_whole_file(&path)?;
    let text = ::std::str::from_utf8(&text)
        .map_err(|e| Error::invalid(format!("id file is not utf8: {}", e)))?;
    text.trim()
        .parse::<u32>()
        .map_err(|e| Error::invalid(format!("id file did not contain an integer: {}", e)))
}

/// Lists `(system, name)` pairs for every tracepoint tracefs currently
/// advertises under `<root>/events`.
pub fn list_events(root: &Path) -> Result<Vec<(String, String)>> {
    let events_dir = root.join("events");
    let mut result = Vec::new();

    for system_entry in fs::read_dir(&events_dir)? {
        let system_entry = system_entry?;
        if !system_entry.file_type()?.is_dir() {
            continue;
        }
        let system_name = match system_entry.file_name().into_string() {
            Ok(s) => s,
            Err(_) => continue,
        };

        for event_entry in fs::read_dir(system_entry.path())? {
            let event_entry = event_entry?;
            if !event_entry.file_type()?.is_dir() {
                continue;
            }
            if !event_entry.path().join("format").is_file() {
                continue;
            }
            let event_name = match event_entry.file_name().into_string() {
                Ok(s) => s,
                Err(_) => continue,
            };
            result.push((system_name.clone(), event_name));
        }
    }

    Ok(result)
}

/// Locates the `user_events_data` control file, used to register and write
/// user-space-defined tracepoints.
///
/// Tries the modern absolute path first, then falls back to the tracefs
/// root found by [`find_tracefs_root`].
pub fn find_user_events_data() -> Result<PathBuf> {
    let absolute = Path::new("/sys/kernel/tracing/user_events_data");
    if absolute.is_file() {
        return Ok(absolute.to_path_buf());
    }

    let debugfs_absolute = Path::new("/sys/kernel/debug/tracing/user_events_data");
    if debugfs_absolute.is_file() {
        return Ok(debugfs_absolute.to_path_buf());
    }

    let root = find_tracefs_root()?;
    let candidate = root.join("user_events_data");
    if candidate.is_file() {
        Ok(candidate)
    } else {
        Err(Error::unsupported(
            "this kernel does not expose user_events_data",
        ))
    }
}

fn read_whole_file(path: &Path) -> Result<Vec<u8>> {
    let mut file = fs::File::open(path).map_err(|e| {
        if e.kind() == ::std::io::ErrorKind::NotFound {
            Error::not_found(format!("{}: {}", path.display(), e))
        } else {
            Error::from(e)
        }
    })?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_format_and_id_from_a_fake_tracefs_tree() {
        let dir = ::std::env::temp_dir().join(format!(
            "tracepoint_core_tracefs_test_{}",
            ::std::process::id()
        ));
        let event_dir = dir.join("events").join("sched").join("sched_switch");
        fs::create_dir_all(&event_dir).unwrap();

        fs::File::create(event_dir.join("format"))
            .unwrap()
            .write_all(b"name: sched_switch\nID: 314\nformat:\n")
            .unwrap();
        fs::File::create(event_dir.join("id"))
            .unwrap()
            .write_all(b"314\n")
            .unwrap();

        assert_eq!(read_id(&dir, "sched", "sched_switch").unwrap(), 314);
        let format = read_format(&dir, "sched", "sched_switch").unwrap();
        assert!(format.starts_with(b"name: sched_switch"));

        let events = list_events(&dir).unwrap();
        assert_eq!(events, vec![("sched".to_string(), "sched_switch".to_string())]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_event_is_not_found() {
        let dir = ::std::env::temp_dir().join(format!(
            "tracepoint_core_tracefs_missing_{}",
            ::std::process::id()
        ));
        fs::create_dir_all(dir.join("events")).unwrap();
        let err = read_format(&dir, "nope", "nope").unwrap_err();
        match err {
            Error::NotFound { .. } => {}
            other => panic!("expected NotFound, got {:?}", other),
        }
        fs::remove_dir_all(&dir).unwrap();
    }
}
