//! Numeric syscall dispatch.
//!
//! Each handler reads its arguments out of the general-register convention
//! (`$g8`/`$g9` as a joint 32-bit value, `$ar` as the upper address half)
//! and performs its side effect against the heap, RAM, console, RNG, or FAT
//! filesystem.

use log::warn;

use crate::console::{Console, ConsoleIo};
use crate::error::{EmulatorError, SyscallError};
use crate::fat::FatFs;
use crate::memory::Ram;
use crate::mmu::Mmu;
use crate::process::Process;
use crate::registers::{general, RegisterFile, AR};
use crate::rng::Rng;

const PRINT_INT: u8 = 1;
const PRINT_FLOAT: u8 = 2;
const PRINT_STRING: u8 = 3;
const READ_INT: u8 = 4;
const READ_FLOAT: u8 = 5;
const READ_STRING: u8 = 6;
const HEAP_ALLOC: u8 = 7;
const FILE_OPEN: u8 = 8;
const FILE_READ: u8 = 9;
const FILE_WRITE: u8 = 10;
const FILE_CLOSE: u8 = 11;
const MIDI: u8 = 12;
const TIME: u8 = 13;
const SLEEP: u8 = 14;
const RNG_SEED: u8 = 15;
const RNG_INT: u8 = 16;
const RNG_FLOAT: u8 = 17;
const PRINT_HEX: u8 = 18;
const PRINT_UNSIGNED: u8 = 19;
const BRK: u8 = 20;

/// The register pair `($g8, $g9)` read as a 32-bit value, high half first.
fn joint32(regs: &RegisterFile) -> Result<u32, EmulatorError> {
    Ok((regs.read16(general(8))? as u32) << 16 | regs.read16(general(9))? as u32)
}

fn set_joint32(regs: &mut RegisterFile, value: u32) -> Result<(), EmulatorError> {
    regs.write16(general(8), (value >> 16) as u16)?;
    regs.write16(general(9), value as u16)?;
    Ok(())
}

fn logical_from_ar_and(regs: &RegisterFile, low: u16) -> Result<u32, EmulatorError> {
    Ok((regs.read16(AR)? as u32) << 16 | low as u32)
}

fn read_cstring(ram: &Ram, mmu: &Mmu, pid: u8, mut logical: u32) -> String {
    let mut out = String::new();
    loop {
        let physical = mmu.translate(pid, logical).unwrap_or(u32::MAX);
        let word = ram.read(physical);
        if word == 0 {
            break;
        }
        out.push(word as u8 as char);
        logical += 1;
    }
    out
}

fn write_string(ram: &mut Ram, mmu: &Mmu, pid: u8, mut logical: u32, text: &str, max_words: u32) {
    let mut written = 0;
    for byte in text.bytes() {
        if written >= max_words {
            break;
        }
        let physical = mmu.translate(pid, logical).unwrap_or(u32::MAX);
        ram.write(physical, byte as u16);
        logical += 1;
        written += 1;
    }
    if written < max_words {
        let physical = mmu.translate(pid, logical).unwrap_or(u32::MAX);
        ram.write(physical, 0);
    }
}

/// Owns the collaborators syscalls need beyond the registers/RAM/MMU the
/// caller already has in hand: console I/O, the RNG, and (optionally) an
/// open FAT16 image.
pub struct Dispatcher {
    console: Console,
    rng: Rng,
    fat: Option<FatFs>,
}

impl Dispatcher {
    pub fn new(console: Console, rng: Rng, fat: Option<FatFs>) -> Self {
        Self { console, rng, fat }
    }

    pub fn dispatch(
        &mut self,
        code: u8,
        process: &mut Process,
        regs: &mut RegisterFile,
        ram: &mut Ram,
        mmu: &mut Mmu,
    ) -> Result<(), EmulatorError> {
        let pid = process.id;
        match code {
            PRINT_INT => {
                let value = joint32(regs)? as i32;
                self.console.print(&value.to_string());
            }
            PRINT_FLOAT => {
                let value = f32::from_bits(joint32(regs)?);
                self.console.print(&value.to_string());
            }
            PRINT_STRING => {
                let low = regs.read16(general(9))?;
                let logical = logical_from_ar_and(regs, low)?;
                let text = read_cstring(ram, mmu, pid, logical);
                self.console.print(&text);
            }
            READ_INT => {
                let line = self.console.read_line().unwrap_or_default();
                let value: i32 = line.trim().parse().unwrap_or(0);
                set_joint32(regs, value as u32)?;
            }
            READ_FLOAT => {
                let line = self.console.read_line().unwrap_or_default();
                let value: f32 = line.trim().parse().unwrap_or(0.0);
                set_joint32(regs, value.to_bits())?;
            }
            READ_STRING => {
                let len = regs.read16(general(8))? as u32;
                let low = regs.read16(general(9))?;
                let logical = logical_from_ar_and(regs, low)?;
                let line = self.console.read_line().unwrap_or_default();
                write_string(ram, mmu, pid, logical, &line, len);
            }
            HEAP_ALLOC => {
                let size = joint32(regs)?;
                match process.heap.allocate(size) {
                    Ok(addr) => set_joint32(regs, addr)?,
                    Err(_) => set_joint32(regs, u32::MAX)?,
                }
            }
            FILE_OPEN => {
                let logical = (regs.read16(general(8))? as u32) << 16 | regs.read16(general(9))? as u32;
                let path = read_cstring(ram, mmu, pid, logical);
                let fat = self.fat.as_mut().ok_or(EmulatorError::InvalidDirectoryPath)?;
                match fat.open_file(&path) {
                    Ok(handle) => set_joint32(regs, handle)?,
                    Err(_) => set_joint32(regs, u32::MAX)?,
                }
            }
            FILE_READ => {
                let handle = joint32(regs)?;
                let len = regs.read16(general(7))? as u32;
                let low = regs.read16(general(7))?;
                let logical = logical_from_ar_and(regs, low)?;
                if let Some(fat) = self.fat.as_mut() {
                    if let Ok(data) = fat.read(handle, len) {
                        let mut addr = logical;
                        for byte in &data {
                            let physical = mmu.translate(pid, addr).unwrap_or(u32::MAX);
                            ram.write(physical, *byte as u16);
                            addr += 1;
                        }
                    }
                }
            }
            FILE_WRITE => {
                warn!("syscall 10 (file write) is a no-op: the FAT write path is not implemented");
            }
            FILE_CLOSE => {
                let handle = joint32(regs)?;
                if let Some(fat) = self.fat.as_mut() {
                    let _ = fat.close(handle);
                }
            }
            MIDI => {
                let code = regs.read16(general(9))?;
                self.console.midi(code);
            }
            TIME => {
                let now = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs() as u32)
                    .unwrap_or(0);
                set_joint32(regs, now)?;
            }
            SLEEP => {
                let millis = joint32(regs)?;
                std::thread::sleep(std::time::Duration::from_millis(millis as u64));
            }
            RNG_SEED => {
                self.rng.reseed(joint32(regs)? as u64);
            }
            RNG_INT => {
                let value = self.rng.next_i32() as u32;
                set_joint32(regs, value)?;
            }
            RNG_FLOAT => {
                let value = self.rng.next_f32().to_bits();
                set_joint32(regs, value)?;
            }
            PRINT_HEX => {
                let value = joint32(regs)?;
                self.console.print(&format!("{value:X}"));
            }
            PRINT_UNSIGNED => {
                let value = joint32(regs)?;
                self.console.print(&value.to_string());
            }
            BRK => {
                let delta = joint32(regs)? as i32;
                brk(process, mmu, delta)?;
            }
            other => return Err(EmulatorError::Syscall(SyscallError::UnknownCode(other))),
        }
        Ok(())
    }
}

/// Grow or shrink the heap region into the stack region (or vice versa) by
/// re-kinding boundary pages. Does not move data.
fn brk(process: &mut Process, mmu: &mut Mmu, delta_pages: i32) -> Result<(), EmulatorError> {
    let (stack_index, heap_index) = mmu.heap_stack_boundary(process.id);
    let (stack_index, heap_index) = match (stack_index, heap_index) {
        (Some(s), Some(h)) => (s, h),
        _ => return Err(EmulatorError::BrkFailed),
    };

    if delta_pages > 0 {
        mmu.set_kind(stack_index, crate::mmu::PageKind::Heap);
    } else if delta_pages < 0 {
        mmu.set_kind(heap_index, crate::mmu::PageKind::Stack);
    }
    Ok(())
}
