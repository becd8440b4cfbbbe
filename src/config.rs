//! System-wide constants and the small amount of runtime configuration the
//! emulator accepts (disk image path, burst length) — layered env-var
//! override over hardcoded default, in the style of the teacher's
//! `CliConfig` (`nvm::cli::CliConfig`).

/// Size of a single MMU page/frame, in bytes.
pub const PAGE_SIZE: u32 = 4096;

/// Number of physical frames backing the emulated machine. Provisioned
/// comfortably above the minimum per-process footprint (one code page +
/// heap + stack pages) for `MAX_PROCESSES` processes.
pub const NUM_PAGES: u32 = 4096;

/// Upper bound on simultaneously active processes.
pub const MAX_PROCESSES: usize = 64;

/// Per-process heap region size, in bytes. Must be a power of two.
pub const HEAP_SIZE: u32 = 64 * 1024;

/// Default number of instructions executed per scheduling quantum.
pub const DEFAULT_BURST_LEN: u32 = 1024;

/// Default location of the FAT16 disk image, matching the original source's
/// hardcoded path.
pub const DEFAULT_DISK_IMAGE: &str = "os/filesystem/harddrive.img";

/// Bound on the number of simultaneously open FAT file handles.
pub const MAX_OPEN_FILES: usize = 256;

/// Resolve the disk image path: explicit CLI flag, then `IRIDIUM_DISK`, then
/// the hardcoded default.
pub fn resolve_disk_path(cli_flag: Option<&str>) -> String {
    if let Some(path) = cli_flag {
        return path.to_string();
    }
    std::env::var("IRIDIUM_DISK").unwrap_or_else(|_| DEFAULT_DISK_IMAGE.to_string())
}

/// Resolve the burst length: explicit CLI flag, then `IRIDIUM_BURST`, then the default.
pub fn resolve_burst_len(cli_flag: Option<u32>) -> u32 {
    if let Some(n) = cli_flag {
        return n;
    }
    std::env::var("IRIDIUM_BURST")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_BURST_LEN)
}
