//! This module stores the error codes returned by the file system's operations.
//!
//! Every engine method that can fail returns `Result<T, Errno>`, where `Errno` is a POSIX-style
//! error number. The values mirror `libc`'s numbering so they can be forwarded to
//! `ReplyError::error` without translation.

/// Type representing a Unix errno.
pub type Errno = i32;

/// Result type used throughout the engine.
pub type Result<T> = core::result::Result<T, Errno>;

/// Operation not permitted (used here for "path already open").
pub const EPERM: Errno = libc::EPERM;
/// No such file or directory.
pub const ENOENT: Errno = libc::ENOENT;
/// Input/output error.
pub const EIO: Errno = libc::EIO;
/// Invalid argument.
pub const EINVAL: Errno = libc::EINVAL;
/// Too many open files (here: the open-file registry is at capacity).
pub const EMFILE: Errno = libc::EMFILE;
/// File exists.
pub const EEXIST: Errno = libc::EEXIST;
/// No space left on device.
pub const ENOSPC: Errno = libc::ENOSPC;
/// File table overflow (a FAT chain walk hit `is_last` before reaching its target).
pub const ENFILE: Errno = libc::ENFILE;
/// File name too long.
pub const ENAMETOOLONG: Errno = libc::ENAMETOOLONG;
/// Is a directory.
pub const EISDIR: Errno = libc::EISDIR;

/// Maps a `std::io::Error` to an `Errno`, falling back to `EIO` when the OS did not attach an
/// error code (can happen for some non-OS-backed I/O failures).
pub fn from_io_error(err: &std::io::Error) -> Errno {
    err.raw_os_error().unwrap_or(EIO)
}
