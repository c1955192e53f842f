//! Per-CPU ring-buffer collection and `perf.data` codec for Linux
//! tracepoints: enables tracepoints via `perf_event_open`, drains their
//! shared per-CPU mmaps, and reads/writes the `perf.data` container format
//! (seekable and pipe mode) used to persist or replay a capture.
//!
//! Module map:
//! - [`tracefs`] locates the tracefs mount and reads `format`/`id` files.
//! - [`format`] parses one `format` file into a typed [`format::EventMetadata`].
//! - [`metadata`] indexes parsed metadata by id and by name.
//! - [`attr`] builds the `perf_event_attr` a tracepoint is opened with.
//! - [`fd`] owns a single `perf_event_open` file descriptor and its ioctls.
//! - [`buffer`] maps and drains one CPU's ring buffer.
//! - [`session`] ties the above together: enable/disable, drain, order.
//! - [`session_info`] tracks the clock id/offset needed to convert a raw
//!   event timestamp to wall-clock time.
//! - [`perf_data`] reads and writes the `perf.data` container format.
//! - [`spec`] parses the free-standing tracepoint textual descriptor.
//! - [`byte_reader`] is the shared endian-aware primitive codec.
//! - [`error`] is the crate's error type.

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate log;

extern crate byteorder;
extern crate failure;
extern crate libc;
extern crate mmap;
extern crate nix;
extern crate num_cpus;
extern crate page_size;

#[cfg(test)]
extern crate env_logger;
#[cfg(test)]
extern crate pretty_assertions;
#[cfg(test)]
extern crate rand;

pub mod attr;
pub mod buffer;
pub mod byte_reader;
pub mod error;
pub mod fd;
pub mod format;
pub mod metadata;
pub mod perf_data;
pub mod raw;
pub mod session;
pub mod session_info;
pub mod spec;
pub mod tracefs;

pub use attr::{Mode, SampleType, WakeupPolicy};
pub use error::{Error, Result};
pub use session::{Event, Session};
