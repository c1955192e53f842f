//! Error kinds surfaced at the crate's public boundary.
//!
//! One variant per distinguishable failure kind, each carrying whatever
//! payload distinguishes it, plus `From` impls at the module boundaries
//! where a lower-level failure (`nix::Error`, `std::io::Error`,
//! `mmap::MapError`, this crate's own `OpenError`/`SpecError`) first
//! appears.

use mmap;
use nix;

use fd::OpenError;
use spec::SpecError;

pub type Result<T> = ::std::result::Result<T, Error>;

#[derive(Debug, Fail)]
pub enum Error {
    /// Tracepoint, format file, or numeric id unknown to the cache or tracefs.
    #[fail(display = "not found: {}", reason)]
    NotFound { reason: String },

    /// Duplicate metadata entry (same id or same (system, event) name).
    /// Idempotent callers (`find_or_add_from_system`) treat this as success.
    #[fail(display = "already exists: {}", reason)]
    AlreadyExists { reason: String },

    /// Parse failure, unusable `common_type`, malformed tracepoint spec,
    /// corrupt perf.data header, or a misaligned ring-buffer record header.
    #[fail(display = "invalid: {}", reason)]
    Invalid { reason: String },

    /// A newly-added event's `common_type` offset/size disagrees with the
    /// geometry already fixed by the cache's first entry.
    #[fail(
        display = "schema conflict: common_type at offset {} size {} conflicts with existing offset {} size {}",
        new_offset,
        new_size,
        existing_offset,
        existing_size
    )]
    SchemaConflict {
        existing_offset: u16,
        existing_size: u16,
        new_offset: u16,
        new_size: u16,
    },

    /// The kernel refused `perf_event_open` or access to `user_events_data`.
    #[fail(display = "permission denied: {}", reason)]
    PermissionDenied { reason: String },

    /// A requested kernel feature is absent, or a pipe-mode-only (or
    /// seekable-only) method was called on the wrong kind of reader/writer.
    #[fail(display = "unsupported: {}", reason)]
    Unsupported { reason: String },

    /// `ppoll` was interrupted by a signal whose delivery the caller left
    /// unblocked.
    #[fail(display = "interrupted")]
    Interrupted,

    /// Underlying file I/O failure; carries the OS error.
    #[fail(display = "io error: {}", inner)]
    Io { inner: ::std::io::Error },

    /// perf_event_open/mmap/ioctl failure on a specific file descriptor.
    #[fail(display = "{}", inner)]
    FdOpen { inner: OpenError },

    /// A free-standing tracepoint spec (an identifier, a `user_events`
    /// definition, or an EventHeader-style definition) failed to parse.
    #[fail(display = "{}", inner)]
    InvalidSpec { inner: SpecError },

    /// Any allocation failure along a public path. Every caller that can
    /// return this rolls back whatever partial state it had built up.
    #[fail(display = "out of memory")]
    OutOfMemory,
}

impl Error {
    pub fn not_found(reason: impl Into<String>) -> Self {
        Error::NotFound {
            reason: reason.into(),
        }
    }

    pub fn already_exists(reason: impl Into<String>) -> Self {
        Error::AlreadyExists {
            reason: reason.into(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Error::Invalid {
            reason: reason.into(),
        }
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        Error::Unsupported {
            reason: reason.into(),
        }
    }

    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Error::PermissionDenied {
            reason: reason.into(),
        }
    }
}

impl From<::std::io::Error> for Error {
    fn from(inner: ::std::io::Error) -> Self {
        Error::Io { inner }
    }
}

impl From<mmap::MapError> for Error {
    fn from(inner: mmap::MapError) -> Self {
        Error::permission_denied(format!("mmap failed: {}", inner))
    }
}

impl From<OpenError> for Error {
    fn from(inner: OpenError) -> Self {
        Error::FdOpen { inner }
    }
}

impl From<SpecError> for Error {
    fn from(inner: SpecError) -> Self {
        Error::InvalidSpec { inner }
    }
}

impl From<nix::Error> for Error {
    fn from(inner: nix::Error) -> Self {
        use nix::errno::Errno;
        match inner {
            nix::Error::Sys(Errno::EINTR) => Error::Interrupted,
            nix::Error::Sys(Errno::EACCES) | nix::Error::Sys(Errno::EPERM) => {
                Error::permission_denied(format!("{}", inner))
            }
            other => Error::invalid(format!("{}", other)),
        }
    }
}
