//! Instruction decode and dispatch.
//!
//! Nibble-splits a 16-bit word, decodes it against the two tiers of the
//! instruction set (4-bit ops in N1, 8-bit extended ops in N1:N2), and
//! executes the result against the register file, ALU, RAM and MMU. The
//! scheduler is responsible for fetching the instruction word, recognizing
//! the halt sentinels (`0x0000`/`0xFFFF`) before dispatch, and for the
//! post-increment of PC after every non-terminal instruction.

use crate::alu::Alu;
use crate::error::{DecodeError, EmulatorError};
use crate::memory::Ram;
use crate::mmu::{Mmu, ProcessId};
use crate::registers::{RegisterFile, AR, PC};

/// What the caller (the scheduler) needs to do after a successful step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEffect {
    /// Ordinary instruction; the scheduler should post-increment PC.
    Normal,
    /// `SYSCALL` was decoded; the scheduler dispatches to the syscall
    /// handler with this numeric code before advancing PC.
    Syscall(u8),
    /// `ATOM` was decoded; the scheduler flips the process's periodic-
    /// interrupts-enabled latch.
    ToggleAtom,
}

fn nibbles(word: u16) -> (u8, u8, u8, u8) {
    (
        ((word >> 12) & 0xF) as u8,
        ((word >> 8) & 0xF) as u8,
        ((word >> 4) & 0xF) as u8,
        (word & 0xF) as u8,
    )
}

/// Concatenate the upper-address latch with a 16-bit offset to form the
/// logical address used by LOAD/STORE, then translate it. An unmapped
/// logical address resolves to an address RAM treats as out-of-range
/// (reads as zero, writes are discarded) rather than raising a fault.
fn memory_address(regs: &RegisterFile, mmu: &Mmu, pid: ProcessId, offset: u16) -> Result<u32, EmulatorError> {
    let logical = ((regs.read16(AR)? as u32) << 16) | offset as u32;
    Ok(mmu.translate(pid, logical).unwrap_or(u32::MAX))
}

/// Decode and execute one instruction word. Each 4-bit operand nibble is the
/// register file index directly — nibble 0 is `$zero`, nibbles 1-11 are the
/// general registers, 12-15 the address-wide registers — so every value a
/// nibble can hold addresses a real register. Does not touch PC except for
/// JUMP/JAL/the conditional branches, which write it directly per the
/// opcode table; PC's post-increment for every other instruction is the
/// caller's responsibility.
pub fn step(
    word: u16,
    regs: &mut RegisterFile,
    alu: &mut Alu,
    ram: &mut Ram,
    mmu: &Mmu,
    pid: ProcessId,
) -> Result<StepEffect, EmulatorError> {
    let (n1, n2, n3, n4) = nibbles(word);
    let (n2, n3, n4) = (n2 as usize, n3 as usize, n4 as usize);

    match n1 {
        0x0 => {} // NOP
        0x1 => {
            let result = alu.add(regs.read16(n3)?, regs.read16(n4)?);
            regs.write16(n2, result)?;
        }
        0x2 => {
            let result = alu.sub(regs.read16(n3)?, regs.read16(n4)?);
            regs.write16(n2, result)?;
        }
        0x3 => {
            let result = alu.add(regs.read16(n3)?, n4 as u16);
            regs.write16(n2, result)?;
        }
        0x4 => {
            let result = alu.sub(regs.read16(n3)?, n4 as u16);
            regs.write16(n2, result)?;
        }
        0x5 => {
            let result = alu.sll(regs.read16(n3)?, regs.read16(n4)?);
            regs.write16(n2, result)?;
        }
        0x6 => {
            let result = alu.srl(regs.read16(n3)?, regs.read16(n4)?);
            regs.write16(n2, result)?;
        }
        0x7 => {
            let result = alu.sra(regs.read16(n3)?, regs.read16(n4)?);
            regs.write16(n2, result)?;
        }
        0x8 => {
            let result = alu.nand(regs.read16(n3)?, regs.read16(n4)?);
            regs.write16(n2, result)?;
        }
        0x9 => {
            let result = alu.or(regs.read16(n3)?, regs.read16(n4)?);
            regs.write16(n2, result)?;
        }
        0xA => {
            let offset = regs.read16(n3)?.wrapping_add(regs.read16(n4)?);
            let physical = memory_address(regs, mmu, pid, offset)?;
            let value = ram.read(physical);
            regs.write16(n2, value)?;
        }
        0xB => {
            let offset = regs.read16(n3)?.wrapping_add(regs.read16(n4)?);
            let physical = memory_address(regs, mmu, pid, offset)?;
            ram.write(physical, regs.read16(n2)?);
        }
        0xC => {
            let upper = ((n3 as u8) << 4) | n4 as u8;
            let current = regs.read16(n2)?;
            regs.write16(n2, (current & 0x00FF) | ((upper as u16) << 8))?;
        }
        0xD => {
            let lower = ((n3 as u8) << 4) | n4 as u8;
            let current = regs.read16(n2)?;
            regs.write16(n2, (current & 0xFF00) | lower as u16)?;
        }
        0xF => return step_extended(n2 as u8, n3 as u8, n4 as u8, regs, alu),
        _ => return Err(EmulatorError::Decode(DecodeError::IllegalOpcode(word))),
    }

    Ok(StepEffect::Normal)
}

fn step_extended(
    n2: u8,
    n3: u8,
    n4: u8,
    regs: &mut RegisterFile,
    alu: &mut Alu,
) -> Result<StepEffect, EmulatorError> {
    let (n3, n4) = (n3 as usize, n4 as usize);
    let opcode = 0xF0 | n2;
    match opcode {
        0xF0 => {
            let carry = alu.flags.carry as u16;
            let result = alu.add(regs.read16(n4)?, carry);
            regs.write16(n3, result)?;
            Ok(StepEffect::Normal)
        }
        0xF1 => {
            let carry = alu.flags.carry as u16;
            let result = alu.sub(regs.read16(n4)?, carry);
            regs.write16(n3, result)?;
            Ok(StepEffect::Normal)
        }
        0xF2 => {
            let target = jump_target(regs, n3, n4)?;
            regs.write(PC, target.wrapping_sub(1))?;
            Ok(StepEffect::Normal)
        }
        0xF3 => {
            let target = jump_target(regs, n3, n4)?;
            let link = regs.read(PC)?.wrapping_add(1);
            regs.write16(n3, link as u16)?;
            regs.write(PC, target.wrapping_sub(1))?;
            Ok(StepEffect::Normal)
        }
        0xF4 => {
            alu.cmp(regs.read16(n4)?, regs.read16(n3)?);
            Ok(StepEffect::Normal)
        }
        0xF5 => {
            if alu.flags.zero {
                regs.write(PC, regs.read(n3)?)?;
            }
            Ok(StepEffect::Normal)
        }
        0xF6 => {
            if !alu.flags.zero {
                regs.write(PC, regs.read(n3)?)?;
            }
            Ok(StepEffect::Normal)
        }
        0xF7 => {
            if alu.flags.negative {
                regs.write(PC, regs.read(n3)?)?;
            }
            Ok(StepEffect::Normal)
        }
        0xF8 => {
            if !alu.flags.zero && !alu.flags.negative {
                regs.write(PC, regs.read(n3)?)?;
            }
            Ok(StepEffect::Normal)
        }
        0xFC => Ok(StepEffect::Syscall(((n3 as u8) << 4) | n4 as u8)),
        0xFD => Ok(StepEffect::ToggleAtom),
        0xFF => Ok(StepEffect::Normal), // HALT: the scheduler retires on the raw 0xFFFF word
        _ => Err(EmulatorError::Decode(DecodeError::UnknownExtendedOpcode(opcode))),
    }
}

/// JUMP/JAL target formula: concatenate the two 16-bit operand registers,
/// then the caller subtracts one to compensate for the scheduler's
/// unconditional post-increment.
fn jump_target(regs: &RegisterFile, ra: usize, rb: usize) -> Result<u32, EmulatorError> {
    Ok((regs.read16(ra)? as u32) << 16 | regs.read16(rb)? as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmu::PageKind;

    fn setup() -> (RegisterFile, Alu, Ram, Mmu, ProcessId) {
        (RegisterFile::new(), Alu::new(), Ram::new(), Mmu::new(), 0)
    }

    #[test]
    fn movui_then_movli_builds_a_16_bit_constant() {
        let (mut regs, mut alu, mut ram, mmu, pid) = setup();
        // MOVUI r1, 0x1, 0x2 -> upper byte 0x12 (register index 1)
        step(0xC112, &mut regs, &mut alu, &mut ram, &mmu, pid).unwrap();
        // MOVLI r1, 0x3, 0x4 -> lower byte 0x34
        step(0xD134, &mut regs, &mut alu, &mut ram, &mmu, pid).unwrap();
        assert_eq!(regs.read16(1).unwrap(), 0x1234);
    }

    #[test]
    fn addi_sets_flags_via_the_alu() {
        let (mut regs, mut alu, mut ram, mmu, pid) = setup();
        // ADDI r2, r1, 1 with r1 = 0x1234
        regs.write16(1, 0x1234).unwrap();
        step(0x3211, &mut regs, &mut alu, &mut ram, &mmu, pid).unwrap();
        assert_eq!(regs.read16(2).unwrap(), 0x1235);
        assert!(!alu.flags.zero);
    }

    #[test]
    fn scheduler_scenario_movui_movli_addi_matches_expected_registers() {
        let (mut regs, mut alu, mut ram, mmu, pid) = setup();
        step(0xC112, &mut regs, &mut alu, &mut ram, &mmu, pid).unwrap();
        step(0xD134, &mut regs, &mut alu, &mut ram, &mmu, pid).unwrap();
        regs.write16(1, 0x1234).unwrap();
        step(0x3211, &mut regs, &mut alu, &mut ram, &mmu, pid).unwrap();
        assert_eq!(regs.read16(1).unwrap(), 0x1234);
        assert_eq!(regs.read16(2).unwrap(), 0x1235);
    }

    #[test]
    fn load_store_roundtrip_through_mmu_translation() {
        let (mut regs, mut alu, mut ram, mut mmu, pid) = setup();
        let mut max_addr = 0u32;
        let page = mmu.allocate(pid, PageKind::Data, &mut max_addr).unwrap();
        let _ = page;
        regs.write16(AR, 0).unwrap();
        regs.write16(1, 0xBEEF).unwrap();
        // STORE r1, r0, r0 -> writes to address ($ar<<16)+0+0
        step(0xB100, &mut regs, &mut alu, &mut ram, &mmu, pid).unwrap();
        // LOAD r2, r0, r0 -> reads it back
        step(0xA200, &mut regs, &mut alu, &mut ram, &mmu, pid).unwrap();
        assert_eq!(regs.read16(2).unwrap(), 0xBEEF);
    }

    #[test]
    fn syscall_opcode_is_signaled_to_the_caller() {
        let (mut regs, mut alu, mut ram, mmu, pid) = setup();
        let effect = step(0xFC12, &mut regs, &mut alu, &mut ram, &mmu, pid).unwrap();
        assert_eq!(effect, StepEffect::Syscall(0x12));
    }

    #[test]
    fn jump_stores_target_minus_one_for_the_post_increment() {
        let (mut regs, mut alu, mut ram, mmu, pid) = setup();
        regs.write16(1, 0x0001).unwrap(); // high half
        regs.write16(2, 0x0000).unwrap(); // low half
        step(0xF212, &mut regs, &mut alu, &mut ram, &mmu, pid).unwrap();
        assert_eq!(regs.read(PC).unwrap(), 0x0000_FFFF);
    }

    #[test]
    fn jal_links_the_return_address_into_its_ra_operand() {
        let (mut regs, mut alu, mut ram, mmu, pid) = setup();
        regs.write(PC, 0x10).unwrap();
        regs.write16(1, 0x0002).unwrap(); // high half of target
        regs.write16(2, 0x0000).unwrap(); // low half of target
        step(0xF312, &mut regs, &mut alu, &mut ram, &mmu, pid).unwrap();
        assert_eq!(regs.read16(1).unwrap(), 0x11);
        assert_eq!(regs.read(PC).unwrap(), 0x0001_FFFF);
    }

    #[test]
    fn illegal_opcode_is_rejected() {
        let (mut regs, mut alu, mut ram, mmu, pid) = setup();
        let err = step(0xE000, &mut regs, &mut alu, &mut ram, &mmu, pid).unwrap_err();
        assert!(matches!(err, EmulatorError::Decode(DecodeError::IllegalOpcode(0xE000))));
    }

    #[test]
    fn unknown_extended_opcode_is_rejected() {
        let (mut regs, mut alu, mut ram, mmu, pid) = setup();
        let err = step(0xFA00, &mut regs, &mut alu, &mut ram, &mmu, pid).unwrap_err();
        assert!(matches!(err, EmulatorError::Decode(DecodeError::UnknownExtendedOpcode(0xFA))));
    }

    #[test]
    fn atom_opcode_is_signaled_to_the_caller() {
        let (mut regs, mut alu, mut ram, mmu, pid) = setup();
        let effect = step(0xFD00, &mut regs, &mut alu, &mut ram, &mmu, pid).unwrap();
        assert_eq!(effect, StepEffect::ToggleAtom);
    }

    #[test]
    fn cmp_then_beq_branches_on_equality() {
        let (mut regs, mut alu, mut ram, mmu, pid) = setup();
        regs.write16(1, 5).unwrap();
        regs.write16(2, 5).unwrap();
        regs.write(3, 0x9999).unwrap(); // branch target
        // CMP r1, r2 (flags <- r2 - r1)
        step(0xF412, &mut regs, &mut alu, &mut ram, &mmu, pid).unwrap();
        assert!(alu.flags.zero);
        // BEQ r3
        step(0xF530, &mut regs, &mut alu, &mut ram, &mmu, pid).unwrap();
        assert_eq!(regs.read(PC).unwrap(), 0x9999);
    }

    #[test]
    fn zero_register_is_addressable_as_an_operand() {
        let (mut regs, mut alu, mut ram, mmu, pid) = setup();
        regs.write16(2, 7).unwrap();
        // ADD r1, r0, r2: r0 is $zero, so the add is 0 + 7 regardless of
        // anything ever written through index 0.
        regs.write16(0, 0xFFFF).unwrap();
        step(0x1102, &mut regs, &mut alu, &mut ram, &mmu, pid).unwrap();
        assert_eq!(regs.read16(1).unwrap(), 7);
        assert_eq!(regs.read16(0).unwrap(), 0);
    }

    #[test]
    fn operand_nibble_of_fifteen_addresses_the_program_counter_without_panicking() {
        let (mut regs, mut alu, mut ram, mmu, pid) = setup();
        regs.write(PC, 0x55).unwrap();
        // ADD r1, r15, r0: nibble 15 must reach register index 15 (PC)
        // directly rather than overflowing past the register file.
        step(0x11F0, &mut regs, &mut alu, &mut ram, &mmu, pid).unwrap();
        assert_eq!(regs.read16(1).unwrap(), 0x55);
    }
}
