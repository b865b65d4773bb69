//! Small type aliases shared across the engine, mirroring the widths mandated by the on-disk
//! directory record in the container format.

/// Type representing a user ID.
pub type Uid = u32;
/// Type representing a group ID.
pub type Gid = u32;
/// Type representing a file mode (permission bits only; this file system has no file-type bits
/// on disk since it only ever stores regular files).
pub type Mode = u32;
/// Type representing a Unix timestamp, in seconds.
pub type Timestamp = i64;

/// The index of a data block, relative to the start of the data area.
pub type BlockIdx = u32;

/// Default mode for a newly created regular file.
pub const DEFAULT_FILE_MODE: Mode = 0o644;
/// Mode reported for the single root directory.
pub const ROOT_MODE: Mode = 0o755;
