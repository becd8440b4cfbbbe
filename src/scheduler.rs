//! Round-robin burst scheduler.
//!
//! Grounded on `microkernel.c`'s `run_all`/`execute_burst`: a bounded process
//! table, save/restore of PC and flags across a fixed instruction burst, and
//! retirement on the halt sentinel words.

use log::{debug, info};

use crate::alu::Alu;
use crate::config::MAX_PROCESSES;
use crate::decoder::{self, StepEffect};
use crate::error::EmulatorError;
use crate::memory::Ram;
use crate::mmu::{Mmu, ProcessId};
use crate::process::Process;
use crate::registers::{RegisterFile, PC};
use crate::syscall::Dispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstOutcome {
    StillRunning,
    Retired,
}

/// The two sentinel fetch words that retire the current process instead of
/// being dispatched as an instruction.
const HALT_WORDS: [u16; 2] = [0x0000, 0xFFFF];

pub struct Scheduler {
    processes: Vec<Option<Process>>,
    burst_len: u32,
}

impl Scheduler {
    pub fn new(burst_len: u32) -> Self {
        Self { processes: (0..MAX_PROCESSES).map(|_| None).collect(), burst_len }
    }

    pub fn active_count(&self) -> usize {
        self.processes.iter().filter(|p| p.is_some()).count()
    }

    pub fn has_active_processes(&self) -> bool {
        self.active_count() > 0
    }

    /// A textual listing of every active process, matching the field layout
    /// of the original `print_processes` debug dump.
    pub fn dump_processes(&self) -> String {
        let mut out = String::new();
        for (id, slot) in self.processes.iter().enumerate() {
            if let Some(process) = slot {
                out.push_str(&format!(
                    "pid={id} pc=0x{:08X} max_logical_addr=0x{:08X} heap_root=0x{:08X} atom={}\n",
                    process.pc,
                    process.max_logical_addr,
                    process.heap.root_start(),
                    process.periodic_interrupts_enabled,
                ));
            }
        }
        out
    }

    /// Load a program image into a fresh process slot.
    pub fn load_process(
        &mut self,
        id: ProcessId,
        image: &[u16],
        mmu: &mut Mmu,
        ram: &mut Ram,
    ) -> Result<(), EmulatorError> {
        if self.processes[id as usize].is_some() {
            return Err(EmulatorError::DoubleInit);
        }
        let active = self.active_count();
        let process = Process::load(id, image, mmu, ram, active, self.processes.len())?;
        self.processes[id as usize] = Some(process);
        info!("process {id}: admitted");
        Ok(())
    }

    /// Run one scheduling quantum for `id`: restore its saved context, fetch
    /// and dispatch up to `burst_len` instructions (dispatching syscalls
    /// through `dispatcher` along the way), then save the context back.
    pub fn execute_burst(
        &mut self,
        id: ProcessId,
        ram: &mut Ram,
        regs: &mut RegisterFile,
        alu: &mut Alu,
        mmu: &mut Mmu,
        dispatcher: &mut Dispatcher,
    ) -> Result<BurstOutcome, EmulatorError> {
        let process = self.processes[id as usize]
            .as_mut()
            .expect("execute_burst called on an unoccupied process slot");

        regs.write(PC, process.pc)?;
        alu.flags = process.saved_flags;

        let mut outcome = BurstOutcome::StillRunning;
        for _ in 0..self.burst_len {
            let logical = regs.read(PC)?;
            let physical = mmu.translate(id, logical).unwrap_or(u32::MAX);
            let word = ram.read(physical);

            if HALT_WORDS.contains(&word) {
                outcome = BurstOutcome::Retired;
                break;
            }

            match decoder::step(word, regs, alu, ram, mmu, id)? {
                StepEffect::Normal => {}
                StepEffect::Syscall(code) => {
                    dispatcher.dispatch(code, process, regs, ram, mmu)?;
                }
                StepEffect::ToggleAtom => {
                    process.periodic_interrupts_enabled = !process.periodic_interrupts_enabled;
                }
            }
            let next_pc = regs.read(PC)?.wrapping_add(1);
            regs.write(PC, next_pc)?;
        }

        process.pc = regs.read(PC)?;
        process.saved_flags = alu.flags;
        Ok(outcome)
    }

    /// Run every active process to completion, freeing pages for any that
    /// retire, until the process table is empty.
    pub fn run_all(
        &mut self,
        ram: &mut Ram,
        regs: &mut RegisterFile,
        alu: &mut Alu,
        mmu: &mut Mmu,
        dispatcher: &mut Dispatcher,
    ) -> Result<(), EmulatorError> {
        while self.has_active_processes() {
            for id in 0..self.processes.len() as ProcessId {
                if self.processes[id as usize].is_none() {
                    continue;
                }
                match self.execute_burst(id, ram, regs, alu, mmu, dispatcher)? {
                    BurstOutcome::StillRunning => {}
                    BurstOutcome::Retired => {
                        mmu.release(id);
                        self.processes[id as usize] = None;
                        debug!("process {id}: retired");
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::Console;
    use crate::fat::FatFs;
    use crate::rng::Rng;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Console::null(), Rng::seeded(1), None)
    }

    #[test]
    fn movui_movli_addi_halt_leaves_expected_registers() {
        let mut scheduler = Scheduler::new(1024);
        let mut mmu = Mmu::new();
        let mut ram = Ram::new();
        let mut regs = RegisterFile::new();
        let mut alu = Alu::new();
        let mut dispatcher = dispatcher();

        // MOVUI $g1, 0x12; MOVLI $g1, 0x34; ADDI $g2, $g1, 1; HALT
        let image = vec![0xC112, 0xD134, 0x3211, 0xFFFF];
        scheduler.load_process(0, &image, &mut mmu, &mut ram).unwrap();
        scheduler.run_all(&mut ram, &mut regs, &mut alu, &mut mmu, &mut dispatcher).unwrap();

        assert!(!scheduler.has_active_processes());
    }

    #[test]
    fn retiring_a_process_releases_its_pages() {
        let mut scheduler = Scheduler::new(1024);
        let mut mmu = Mmu::new();
        let mut ram = Ram::new();
        let mut regs = RegisterFile::new();
        let mut alu = Alu::new();
        let mut dispatcher = dispatcher();

        let image = vec![0xFFFF];
        scheduler.load_process(3, &image, &mut mmu, &mut ram).unwrap();
        scheduler.run_all(&mut ram, &mut regs, &mut alu, &mut mmu, &mut dispatcher).unwrap();

        assert_eq!(mmu.translate(3, 0), None);
    }

    #[test]
    fn atom_toggles_the_processs_periodic_interrupt_latch() {
        let mut scheduler = Scheduler::new(1024);
        let mut mmu = Mmu::new();
        let mut ram = Ram::new();
        let mut regs = RegisterFile::new();
        let mut alu = Alu::new();
        let mut dispatcher = dispatcher();

        // ATOM; ATOM; HALT
        let image = vec![0xFD00, 0xFD00, 0xFFFF];
        scheduler.load_process(0, &image, &mut mmu, &mut ram).unwrap();
        // First burst runs ATOM twice then halts; the latch toggles back to enabled.
        scheduler.execute_burst(0, &mut ram, &mut regs, &mut alu, &mut mmu, &mut dispatcher).unwrap();
        assert!(scheduler.processes[0].as_ref().unwrap().periodic_interrupts_enabled);
    }

    #[test]
    fn dump_processes_lists_only_active_slots() {
        let mut scheduler = Scheduler::new(1024);
        let mut mmu = Mmu::new();
        let mut ram = Ram::new();
        scheduler.load_process(2, &[0xFFFF], &mut mmu, &mut ram).unwrap();
        let dump = scheduler.dump_processes();
        assert!(dump.contains("pid=2"));
        assert!(!dump.contains("pid=0"));
    }

    #[test]
    fn double_init_on_an_occupied_slot_is_rejected() {
        let mut scheduler = Scheduler::new(1024);
        let mut mmu = Mmu::new();
        let mut ram = Ram::new();
        scheduler.load_process(0, &[0xFFFF], &mut mmu, &mut ram).unwrap();
        let err = scheduler.load_process(0, &[0xFFFF], &mut mmu, &mut ram).unwrap_err();
        assert!(matches!(err, EmulatorError::DoubleInit));
    }
}
