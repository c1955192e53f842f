//! Scoped ownership of raw `perf_event_open` file descriptors, and the
//! handful of ioctls the session drives them with.
//!
//! Every fd this module hands out is a move-only value that closes on drop;
//! the many rollback paths inside `Session::enable` depend on that (see
//! `session.rs`).

use std::fs::File;
use std::io;
use std::mem::size_of;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};

use libc::{self, c_int, c_ulong, pid_t, syscall, SYS_perf_event_open};
use nix::errno::Errno;

use error::*;
use raw::perf_event_attr;

/// A single `perf_event_open` file descriptor, owned.
#[derive(Debug)]
pub struct PerfEventFd(File);

impl PerfEventFd {
    /// Opens one event on one CPU, with no group leader (`group_fd = -1`,
    /// `pid = -1`). The session always specifies `cpu` explicitly; this
    /// crate never samples a single pid across all CPUs or vice versa.
    pub fn open(attr: &perf_event_attr, cpu: c_int) -> Result<Self> {
        let pid: pid_t = -1;
        let group_fd: c_int = -1;
        let flags: c_ulong = 0;

        // NOTE(unsafe): the kernel validates `attr` before touching it; a
        // malformed attr produces an errno, not unsafety.
        let res = unsafe { syscall(SYS_perf_event_open, attr, pid, cpu, group_fd, flags) };

        if res == -1 {
            let e = Error::from(OpenError::from(Errno::last()));
            debug!("perf_event_open(cpu={}) failed: {:?}", cpu, e);
            Err(e)
        } else {
            // NOTE(unsafe): a non-negative return from perf_event_open is
            // guaranteed to be a valid, open file descriptor we now own.
            Ok(PerfEventFd(unsafe { File::from_raw_fd(res as RawFd) }))
        }
    }

    pub fn enable(&self) -> Result<()> {
        ioctl_none(self.as_raw_fd(), IOC_ENABLE).map_err(|e| {
            warn!("PERF_EVENT_IOC_ENABLE failed: {:?}", e);
            e
        })
    }

    pub fn disable(&self) -> Result<()> {
        ioctl_none(self.as_raw_fd(), IOC_DISABLE).map_err(|e| {
            warn!("PERF_EVENT_IOC_DISABLE failed: {:?}", e);
            e
        })
    }

    /// Redirects this event's output into `leader`'s mmap.
    pub fn set_output(&self, leader: RawFd) -> Result<()> {
        ioctl_arg(self.as_raw_fd(), IOC_SET_OUTPUT, leader as c_ulong).map_err(|e| {
            warn!("PERF_EVENT_IOC_SET_OUTPUT failed: {:?}", e);
            e
        })
    }

    /// Pauses (`true`) or resumes (`false`) output to this event's mmap.
    /// Only meaningful on the leader of a buffer.
    pub fn pause_output(&self, pause: bool) -> Result<()> {
        ioctl_arg(self.as_raw_fd(), IOC_PAUSE_OUTPUT, pause as c_ulong)
    }

    /// The kernel-assigned stream id for this specific fd (distinct per CPU
    /// even for the "same" tracepoint).
    pub fn stream_id(&self) -> Result<u64> {
        let mut id: u64 = 0;
        ioctl_ptr(self.as_raw_fd(), IOC_ID, &mut id as *mut u64 as *mut libc::c_void)?;
        Ok(id)
    }
}

impl AsRawFd for PerfEventFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

/// Linux's `_IO(type, nr)` macro: a request number that transfers no data.
const fn io(ty: u8, nr: u8) -> c_ulong {
    ((ty as c_ulong) << 8) | (nr as c_ulong)
}

/// Linux's `_IOR(type, nr, size)`: a request number for a read-direction
/// transfer of `size` bytes (the kernel writes `size` bytes back through the
/// pointer passed as `arg`).
const fn ior(ty: u8, nr: u8, size: usize) -> c_ulong {
    const IOC_READ: c_ulong = 2;
    (IOC_READ << 30) | ((size as c_ulong) << 16) | ((ty as c_ulong) << 8) | (nr as c_ulong)
}

const PERF_EVENT_IOC_MAGIC: u8 = b'$';
const IOC_ENABLE: c_ulong = io(PERF_EVENT_IOC_MAGIC, 0);
const IOC_DISABLE: c_ulong = io(PERF_EVENT_IOC_MAGIC, 1);
const IOC_SET_OUTPUT: c_ulong = io(PERF_EVENT_IOC_MAGIC, 5);
const IOC_ID: c_ulong = ior(PERF_EVENT_IOC_MAGIC, 7, size_of::<u64>());
const IOC_PAUSE_OUTPUT: c_ulong = io(PERF_EVENT_IOC_MAGIC, 9);

fn ioctl_none(fd: RawFd, request: c_ulong) -> Result<()> {
    // NOTE(unsafe): the request numbers above are all "none"/plain-integer
    // direction ioctls on a perf_event fd; no buffer is read or written.
    if unsafe { libc::ioctl(fd, request as _, 0) } == -1 {
        Err(Error::from(io::Error::last_os_error()))
    } else {
        Ok(())
    }
}

fn ioctl_arg(fd: RawFd, request: c_ulong, arg: c_ulong) -> Result<()> {
    // NOTE(unsafe): SET_OUTPUT/PAUSE_OUTPUT are documented by the kernel to
    // take their argument as a plain integer passed through the ioctl `arg`
    // slot, not as a pointer, despite the _IO()/_IOW() encoding used to
    // build their request numbers.
    if unsafe { libc::ioctl(fd, request as _, arg) } == -1 {
        Err(Error::from(io::Error::last_os_error()))
    } else {
        Ok(())
    }
}

fn ioctl_ptr(fd: RawFd, request: c_ulong, arg: *mut libc::c_void) -> Result<()> {
    // NOTE(unsafe): caller guarantees `arg` points at a buffer large enough
    // for the request's encoded size (checked at compile time via `ior`).
    if unsafe { libc::ioctl(fd, request as _, arg) } == -1 {
        Err(Error::from(io::Error::last_os_error()))
    } else {
        Ok(())
    }
}

#[derive(Debug, Fail)]
pub enum OpenError {
    #[fail(
        display = "Returned if the perf_event_attr size value is too small
              (smaller than PERF_ATTR_SIZE_VER0), too big (larger than the
              page size), or larger than the kernel supports and the extra
              bytes are not zero.  When E2BIG is returned, the
              perf_event_attr size field is overwritten by the kernel to be
              the size of the structure it was expecting."
    )]
    AttrWrongSize,
    #[fail(
        display = "Returned when the requested event requires CAP_SYS_ADMIN
              permissions (or a more permissive perf_event paranoid
              setting).  Some common cases where an unprivileged process may
              encounter this error: attaching to a process owned by a
              different user; monitoring all processes on a given CPU (i.e.,
              specifying the pid argument as -1); and not setting
              exclude_kernel when the paranoid setting requires it."
    )]
    CapSysAdminRequired,
    #[fail(
        display = "Returned if the group_fd file descriptor is not valid, or, if
              PERF_FLAG_PID_CGROUP is set, the cgroup file descriptor in pid
              is not valid."
    )]
    InvalidFdOrPid,
    #[fail(display = "Returned if another event already has exclusive access to the PMU.")]
    PmuBusy,
    #[fail(
        display = "Returned if the attr pointer points at an invalid memory
              address."
    )]
    AttrInvalidPointer,
    #[fail(
        display = "Returned if the specified event is invalid.  There are many
              possible reasons for this.  A not-exhaustive list: sample_freq
              is higher than the maximum setting; the cpu to monitor does
              not exist; read_format is out of range; sample_type is out of
              range; the flags value is out of range; exclusive or pinned
              set and the event is not a group leader; the event config
              values are out of range or set reserved bits; the generic
              event selected is not supported; or there is not enough room
              to add the selected event."
    )]
    InvalidEvent,
    #[fail(
        display = "Each opened event uses one file descriptor.  If a large number
              of events are opened, the per-process limit on the number of
              open file descriptors will be reached, and no more events can
              be created."
    )]
    TooManyOpenFiles,
    #[fail(
        display = "Returned when the event involves a feature not supported by
              the current CPU."
    )]
    CpuFeatureUnsupported,
    #[fail(
        display = "Returned if the type setting is not valid.  This error is also
              returned for some unsupported generic events."
    )]
    InvalidEventType,
    #[fail(
        display = "Prior to Linux 3.3, if there was not enough room for the
              event, ENOSPC was returned.  In Linux 3.3, this was changed to
              EINVAL.  ENOSPC is still returned if you try to add more
              breakpoint events than supported by the hardware."
    )]
    TooManyBreakpoints,
    #[fail(
        display = "Returned if PERF_SAMPLE_STACK_USER is set in sample_type and
              it is not supported by hardware."
    )]
    UserStackSampleUnsupported,
    #[fail(
        display = "Returned if an event requiring a specific hardware feature is
              requested but there is no hardware support.  This includes
              requesting low-skid events if not supported, branch tracing if
              it is not available, sampling if no PMU interrupt is
              available, and branch stacks for software events."
    )]
    HardwareFeatureUnsupported,
    #[fail(
        display = "(since Linux 4.8)
              Returned if PERF_SAMPLE_CALLCHAIN is requested and
              sample_max_stack is larger than the maximum specified in
              /proc/sys/kernel/perf_event_max_stack."
    )]
    SampleMaxStackTooLarge,
    #[fail(
        display = "Returned on many (but not all) architectures when an
              unsupported exclude_hv, exclude_idle, exclude_user, or
              exclude_kernel setting is specified.

              It can also happen, as with EACCES, when the requested event
              requires CAP_SYS_ADMIN permissions (or a more permissive
              perf_event paranoid setting). This includes setting a
              breakpoint on a kernel address, and (since Linux 3.13) setting
              a kernel function-trace tracepoint."
    )]
    CapSysAdminRequiredOrExcludeUnsupported,
    #[fail(display = "Returned if attempting to attach to a process that does not exist.")]
    ProcessDoesNotExist,
    #[fail(display = "perf_event_open returned an unexpected error code: {}", errno)]
    Unknown { errno: Errno },
}

impl From<Errno> for OpenError {
    fn from(errno: Errno) -> OpenError {
        match errno {
            Errno::E2BIG => OpenError::AttrWrongSize,
            Errno::EACCES => OpenError::CapSysAdminRequired,
            Errno::EBADF => OpenError::InvalidFdOrPid,
            Errno::EBUSY => OpenError::PmuBusy,
            Errno::EFAULT => OpenError::AttrInvalidPointer,
            Errno::EINVAL => OpenError::InvalidEvent,
            Errno::EMFILE => OpenError::TooManyOpenFiles,
            Errno::ENODEV => OpenError::CpuFeatureUnsupported,
            Errno::ENOENT => OpenError::InvalidEventType,
            Errno::ENOSPC => OpenError::TooManyBreakpoints,
            Errno::ENOSYS => OpenError::UserStackSampleUnsupported,
            Errno::EOPNOTSUPP => OpenError::HardwareFeatureUnsupported,
            Errno::EOVERFLOW => OpenError::SampleMaxStackTooLarge,
            Errno::EPERM => OpenError::CapSysAdminRequiredOrExcludeUnsupported,
            Errno::ESRCH => OpenError::ProcessDoesNotExist,
            _ => OpenError::Unknown { errno },
        }
    }
}
