//! FAT16 read path: metadata, directory iteration, and seekable file handles.

pub mod directory;
pub mod file;
pub mod metadata;

pub use file::FatFs;
