//! Emulator entry point: parses arguments, loads program images, and runs
//! the cooperative scheduler to completion.
//!
//! Grounded on the teacher's `nvmctl` binary shape: `env_logger` initialized
//! first, a small `run()` that returns a `Result` so `main` can collapse
//! every failure mode to a single exit-code mapping.

use std::fs;
use std::process::ExitCode;

use iridium::alu::Alu;
use iridium::cli;
use iridium::config;
use iridium::console::Console;
use iridium::error::EmulatorResult;
use iridium::fat::FatFs;
use iridium::memory::Ram;
use iridium::mmu::Mmu;
use iridium::registers::RegisterFile;
use iridium::rng::Rng;
use iridium::scheduler::Scheduler;
use iridium::syscall::Dispatcher;

/// Parse a program image as a stream of big-endian 16-bit words.
fn load_image(path: &str) -> EmulatorResult<Vec<u16>> {
    let bytes = fs::read(path)?;
    Ok(bytes.chunks(2).map(|c| if c.len() == 2 { u16::from_be_bytes([c[0], c[1]]) } else { (c[0] as u16) << 8 }).collect())
}

fn run() -> EmulatorResult<()> {
    let args = cli::parse(std::env::args().skip(1))?;
    let disk_path = config::resolve_disk_path(args.disk.as_deref());
    let burst_len = config::resolve_burst_len(args.burst);

    let fat = match FatFs::open(&disk_path) {
        Ok(fat) => Some(fat),
        Err(err) => {
            log::warn!("disk image {disk_path} unavailable, file syscalls will fail: {err}");
            None
        }
    };

    let mut scheduler = Scheduler::new(burst_len);
    let mut ram = Ram::new();
    let mut mmu = Mmu::new();
    let mut regs = RegisterFile::new();
    let mut alu = Alu::new();
    let mut dispatcher = Dispatcher::new(Console::stdio(), Rng::from_time(), fat);

    for (id, path) in args.program_files.iter().enumerate() {
        let image = load_image(path)?;
        scheduler.load_process(id as u8, &image, &mut mmu, &mut ram)?;
    }

    scheduler.run_all(&mut ram, &mut regs, &mut alu, &mut mmu, &mut dispatcher)
}

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("iridium: {err}");
            let code = err.exit_code();
            ExitCode::from(code.rem_euclid(256) as u8)
        }
    }
}
