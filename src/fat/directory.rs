//! Directory entry parsing, including VFAT long-filename reconstruction.
//!
//! 32-byte entries read sequentially, with attribute `0x0F` entries
//! accumulated as long-filename fragments and folded into the short entry
//! that follows them.

const ENTRY_SIZE: usize = 32;
const LONG_NAME_ATTR: u8 = 0x0F;
const DIRECTORY_OR_VOLUME_ATTR: u8 = 0x18;
const LAST_LONG_ENTRY_FLAG: u8 = 0x40;

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub attribute: u8,
    pub last_access_date: u16,
    pub write_time: u16,
    pub write_date: u16,
    pub cluster: u32,
    pub size: u32,
}

impl DirEntry {
    pub fn is_directory_or_volume(&self) -> bool {
        self.attribute & DIRECTORY_OR_VOLUME_ATTR != 0
    }

    pub fn is_long_name_fragment(&self) -> bool {
        self.attribute & 0x3F == LONG_NAME_ATTR
    }
}

struct LongNameFragment {
    sequence: u8,
    chars: Vec<u16>,
}

fn long_name_chars(entry: &[u8]) -> Vec<u16> {
    let mut chars = Vec::with_capacity(13);
    for offset in [1, 3, 5, 7, 9] {
        chars.push(u16::from_le_bytes([entry[offset], entry[offset + 1]]));
    }
    for offset in [14, 16, 18, 20, 22, 24] {
        chars.push(u16::from_le_bytes([entry[offset], entry[offset + 1]]));
    }
    for offset in [28, 30] {
        chars.push(u16::from_le_bytes([entry[offset], entry[offset + 1]]));
    }
    chars
}

fn decode_long_name(fragments: &mut [LongNameFragment]) -> String {
    fragments.sort_by_key(|f| f.sequence & !LAST_LONG_ENTRY_FLAG);
    let mut units: Vec<u16> = Vec::new();
    for fragment in fragments.iter() {
        units.extend(fragment.chars.iter().copied());
    }
    let end = units.iter().position(|&u| u == 0x0000 || u == 0xFFFF).unwrap_or(units.len());
    String::from_utf16_lossy(&units[..end])
}

fn decode_short_name(entry: &[u8]) -> String {
    let base = String::from_utf8_lossy(&entry[0..8]).trim_end().to_string();
    let ext = String::from_utf8_lossy(&entry[8..11]).trim_end().to_string();
    if ext.is_empty() {
        base
    } else {
        format!("{base}.{ext}")
    }
}

/// Parse consecutive 32-byte directory entries out of `region`, stopping at
/// the first all-zero (size, write_date, write_time) entry, which marks the
/// end of the directory.
pub fn parse_entries(region: &[u8]) -> Vec<DirEntry> {
    let mut entries = Vec::new();
    let mut pending_long: Vec<LongNameFragment> = Vec::new();

    let mut offset = 0;
    while offset + ENTRY_SIZE <= region.len() {
        let raw = &region[offset..offset + ENTRY_SIZE];
        offset += ENTRY_SIZE;

        if raw[0] == 0x00 {
            break; // unused entry marks the end of the directory
        }
        if raw[0] == 0xE5 {
            continue; // deleted entry
        }

        let attribute = raw[11];
        if attribute & 0x3F == LONG_NAME_ATTR {
            pending_long.push(LongNameFragment { sequence: raw[0], chars: long_name_chars(raw) });
            continue;
        }

        let last_access_date = u16::from_le_bytes([raw[18], raw[19]]);
        let high_cluster = u16::from_le_bytes([raw[20], raw[21]]);
        let write_time = u16::from_le_bytes([raw[22], raw[23]]);
        let write_date = u16::from_le_bytes([raw[24], raw[25]]);
        let low_cluster = u16::from_le_bytes([raw[26], raw[27]]);
        let size = u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]);

        if size == 0 && write_date == 0 && write_time == 0 && pending_long.is_empty() {
            break;
        }

        let name = if !pending_long.is_empty() {
            let name = decode_long_name(&mut pending_long);
            pending_long.clear();
            name
        } else {
            decode_short_name(raw)
        };

        entries.push(DirEntry {
            name,
            attribute,
            last_access_date,
            write_time,
            write_date,
            cluster: ((high_cluster as u32) << 16) | low_cluster as u32,
            size,
        });
    }

    entries
}
