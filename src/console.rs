//! Host console and MIDI sink, the narrow I/O boundary syscalls write
//! through.
//!
//! Wrapped behind a trait so the syscall dispatcher can be tested against an
//! in-memory sink instead of real stdio.

use std::io::{self, BufRead, Write};

/// Abstracts stdout/stdin/MIDI so the syscall dispatcher doesn't depend on
/// real file descriptors in tests.
pub trait ConsoleIo {
    fn print(&mut self, text: &str);
    fn read_line(&mut self) -> io::Result<String>;
    fn midi(&mut self, code: u16);
}

/// The real host console: line-buffered stdout/stdin, MIDI stubbed to a
/// debug log line (no MIDI backend is specified).
pub struct Console {
    sink: ConsoleSink,
}

enum ConsoleSink {
    Stdio,
    /// Discards everything; used where a dispatcher is built without real
    /// I/O (tests, or syscalls 9-14 exercised as no-ops).
    Null,
}

impl Console {
    pub fn stdio() -> Self {
        Self { sink: ConsoleSink::Stdio }
    }

    pub fn null() -> Self {
        Self { sink: ConsoleSink::Null }
    }
}

impl ConsoleIo for Console {
    fn print(&mut self, text: &str) {
        match self.sink {
            ConsoleSink::Stdio => {
                print!("{text}");
                let _ = io::stdout().flush();
            }
            ConsoleSink::Null => {}
        }
    }

    fn read_line(&mut self) -> io::Result<String> {
        match self.sink {
            ConsoleSink::Stdio => {
                let mut line = String::new();
                io::stdin().lock().read_line(&mut line)?;
                Ok(line.trim_end_matches(['\n', '\r']).to_string())
            }
            ConsoleSink::Null => Ok(String::new()),
        }
    }

    fn midi(&mut self, code: u16) {
        log::debug!("midi: 0x{code:04X}");
    }
}
