//! Seekable FAT16 file handles: open, seek, read, close.
//!
//! A bounded `open_files` table backs a fixed number of concurrent handles.
//! Only the read path is implemented; file creation, FAT persistence and
//! directory insertion are left unfinished in the original and are out of
//! scope here too.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use crate::config::MAX_OPEN_FILES;
use crate::error::{FatError, FatResult};

use super::directory::{parse_entries, DirEntry};
use super::metadata::BpbMetadata;

const END_OF_CHAIN: u16 = 0xFFF8;
/// Sentinel cluster number for the root directory, which on FAT16 is a
/// fixed region rather than a cluster in the data area.
const ROOT_CLUSTER: u32 = u32::MAX;

struct OpenFile {
    dir_entry: Option<DirEntry>,
    start_cluster: u32,
    current_cluster: u32,
    next_cluster: u32,
    byte_offset_within_cluster: u32,
    position: u32,
    size: u32,
}

impl OpenFile {
    fn is_directory_like(&self) -> bool {
        self.dir_entry.as_ref().map(|e| e.is_directory_or_volume()).unwrap_or(true)
    }
}

pub struct FatFs {
    image: File,
    metadata: BpbMetadata,
    fat_table: Vec<u16>,
    open_files: Vec<Option<OpenFile>>,
}

impl FatFs {
    pub fn open(path: &str) -> FatResult<Self> {
        let mut image = File::open(path)?;
        let mut header = vec![0u8; 512];
        image.read_exact(&mut header)?;
        let metadata = BpbMetadata::parse(&header)?;

        let fat_offset = metadata.reserved_sector_count as u64 * metadata.bytes_per_sector as u64;
        let fat_bytes = metadata.fat_size_16 as usize * metadata.bytes_per_sector as usize;
        image.seek(SeekFrom::Start(fat_offset))?;
        let mut raw_fat = vec![0u8; fat_bytes];
        image.read_exact(&mut raw_fat)?;
        let fat_table = raw_fat.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();

        Ok(Self {
            image,
            metadata,
            fat_table,
            open_files: (0..MAX_OPEN_FILES).map(|_| None).collect(),
        })
    }

    fn next_cluster(&self, cluster: u32) -> u32 {
        self.fat_table.get(cluster as usize).copied().unwrap_or(END_OF_CHAIN) as u32
    }

    fn read_region(&mut self, byte_offset: u64, len: usize) -> FatResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.image.seek(SeekFrom::Start(byte_offset))?;
        self.image.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn directory_entries(&mut self, cluster: u32) -> FatResult<Vec<DirEntry>> {
        if cluster == ROOT_CLUSTER {
            let region = self.read_region(
                self.metadata.root_dir_byte_offset(),
                self.metadata.root_dir_sectors() as usize * self.metadata.bytes_per_sector as usize,
            )?;
            Ok(parse_entries(&region))
        } else {
            let region = self.read_region(self.metadata.cluster_byte_offset(cluster), self.metadata.cluster_size_bytes() as usize)?;
            Ok(parse_entries(&region))
        }
    }

    /// Resolve `path` to a directory entry and its owning cluster, descending
    /// one path component at a time from the root.
    fn resolve(&mut self, path: &str) -> FatResult<(Option<DirEntry>, u32)> {
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            return Ok((None, ROOT_CLUSTER));
        }

        let mut cluster = ROOT_CLUSTER;
        let mut components = trimmed.split('/').peekable();
        let mut found: Option<DirEntry> = None;

        while let Some(component) = components.next() {
            let entries = self.directory_entries(cluster)?;
            let entry = entries
                .into_iter()
                .find(|e| e.name.eq_ignore_ascii_case(component))
                .ok_or_else(|| FatError::NotFound(path.to_string()))?;

            if components.peek().is_some() {
                if !entry.is_directory_or_volume() {
                    return Err(FatError::NotAFile);
                }
                cluster = entry.cluster;
            } else {
                cluster = entry.cluster;
                found = Some(entry);
            }
        }

        Ok((found, cluster))
    }

    /// Open a file or directory by path, returning a handle id stable until
    /// `close`. Fails with `TooManyOpenFiles` once the table is exhausted.
    pub fn open_file(&mut self, path: &str) -> FatResult<u32> {
        let slot = self
            .open_files
            .iter()
            .position(|f| f.is_none())
            .ok_or(FatError::TooManyOpenFiles)?;

        let (dir_entry, cluster) = self.resolve(path)?;
        let size = dir_entry.as_ref().map(|e| e.size).unwrap_or(0);

        self.open_files[slot] = Some(OpenFile {
            dir_entry,
            start_cluster: cluster,
            current_cluster: cluster,
            next_cluster: if cluster == ROOT_CLUSTER { ROOT_CLUSTER } else { self.next_cluster(cluster) },
            byte_offset_within_cluster: 0,
            position: 0,
            size,
        });

        Ok(slot as u32)
    }

    fn handle_mut(&mut self, handle: u32) -> FatResult<&mut OpenFile> {
        self.open_files
            .get_mut(handle as usize)
            .and_then(|f| f.as_mut())
            .ok_or(FatError::BadHandle(handle))
    }

    /// Reposition the handle. `whence = 0` is absolute, `whence = 1` is
    /// relative to the current position; any other value is a programming
    /// error.
    pub fn seek(&mut self, handle: u32, offset: i64, whence: i32) -> FatResult<()> {
        let cluster_size = self.metadata.cluster_size_bytes();
        let start_cluster;
        let target;
        {
            let file = self.handle_mut(handle)?;
            target = match whence {
                0 => offset.max(0) as u32,
                1 => (file.position as i64 + offset).max(0) as u32,
                other => return Err(FatError::InvalidWhence(other)),
            };
            start_cluster = file.start_cluster;
        }

        let mut cluster = start_cluster;
        let mut remaining = target;
        while cluster != ROOT_CLUSTER && remaining >= cluster_size {
            remaining -= cluster_size;
            cluster = self.next_cluster(cluster);
            if cluster as u16 >= END_OF_CHAIN {
                break;
            }
        }

        let file = self.handle_mut(handle)?;
        file.current_cluster = cluster;
        file.next_cluster = if cluster == ROOT_CLUSTER { ROOT_CLUSTER } else { self.next_cluster(cluster) };
        file.byte_offset_within_cluster = remaining;
        file.position = target;
        Ok(())
    }

    pub fn position(&self, handle: u32) -> FatResult<u32> {
        self.open_files
            .get(handle as usize)
            .and_then(|f| f.as_ref())
            .map(|f| f.position)
            .ok_or(FatError::BadHandle(handle))
    }

    /// Read up to `n` bytes, stitching across cluster boundaries. Stops
    /// early at end-of-chain. Refuses to read a directory or volume entry.
    pub fn read(&mut self, handle: u32, n: u32) -> FatResult<Vec<u8>> {
        if self.handle_mut(handle)?.is_directory_like() {
            return Err(FatError::NotAFile);
        }

        let cluster_size = self.metadata.cluster_size_bytes();
        let mut out = Vec::with_capacity(n as usize);

        while (out.len() as u32) < n {
            let (cluster, offset_in_cluster, is_root) = {
                let file = self.handle_mut(handle)?;
                if file.current_cluster != ROOT_CLUSTER && (file.current_cluster as u16) >= END_OF_CHAIN {
                    break;
                }
                (file.current_cluster, file.byte_offset_within_cluster, file.current_cluster == ROOT_CLUSTER)
            };

            let region_size = if is_root {
                self.metadata.root_dir_sectors() * self.metadata.bytes_per_sector as u32
            } else {
                cluster_size
            };
            let region_base = if is_root { self.metadata.root_dir_byte_offset() } else { self.metadata.cluster_byte_offset(cluster) };

            let remaining_in_region = region_size.saturating_sub(offset_in_cluster);
            let to_read = remaining_in_region.min(n - out.len() as u32);
            if to_read == 0 {
                break;
            }

            let chunk = self.read_region(region_base + offset_in_cluster as u64, to_read as usize)?;
            out.extend_from_slice(&chunk);

            let file = self.handle_mut(handle)?;
            file.byte_offset_within_cluster += to_read;
            file.position += to_read;
            if file.byte_offset_within_cluster >= region_size && !is_root {
                file.current_cluster = file.next_cluster;
                file.next_cluster = if file.current_cluster == ROOT_CLUSTER {
                    ROOT_CLUSTER
                } else {
                    self.next_cluster(file.current_cluster)
                };
                file.byte_offset_within_cluster = 0;
            } else if is_root {
                break; // the root region has no chain to follow
            }
        }

        Ok(out)
    }

    pub fn close(&mut self, handle: u32) -> FatResult<()> {
        self.handle_mut(handle)?;
        self.open_files[handle as usize] = None;
        Ok(())
    }

    /// A textual listing of every occupied slot in the `open_files` table,
    /// matching the debug view `fat_functions.c`'s `print_open_files` gives.
    pub fn dump_open_files(&self) -> String {
        let mut out = String::new();
        for (handle, slot) in self.open_files.iter().enumerate() {
            if let Some(file) = slot {
                out.push_str(&format!(
                    "handle={handle} start_cluster=0x{:08X} position={} size={}\n",
                    file.start_cluster, file.position, file.size,
                ));
            }
        }
        out
    }
}
