//! A small single-directory POSIX-like file system, exposed over FUSE.
//!
//! The engine has two interchangeable backends behind the [`volume::Engine`] trait: an on-disk
//! one (`volume`, `superblock`, `dmap`, `fat`, `directory`, `file_io`, `allocator`) backed by a
//! fixed-size container file, and a trivial in-memory one (`memory_fs`). [`fuse_adapter`] drives
//! either through `fuser`'s `Filesystem` trait.

pub mod allocator;
pub mod device;
pub mod directory;
pub mod dmap;
pub mod errno;
pub mod fat;
pub mod file_io;
pub mod fuse_adapter;
pub mod layout;
pub mod memory_fs;
pub mod open_files;
pub mod superblock;
pub mod types;
pub mod volume;
