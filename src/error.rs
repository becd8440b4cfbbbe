//! Error types for each subsystem boundary.
//!
//! Mirrors the teacher's per-subsystem `thiserror` enums (`nvm::executor::VmExecError`,
//! `nvm::cli::CliError`): one enum per boundary, a `Result` alias, and — for the
//! top-level error — a mapping to the numeric process exit codes the original
//! binary returns.

use thiserror::Error;

/// Illegal or malformed instruction encountered by the decoder. Fatal.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("illegal opcode 0x{0:04X}")]
    IllegalOpcode(u16),
    #[error("unknown extended opcode 0xF{0:X}")]
    UnknownExtendedOpcode(u8),
}

/// Heap allocator failures. Recoverable — surfaced as sentinels to the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeapError {
    #[error("allocation of {0} bytes exceeds heap capacity")]
    TooLarge(u32),
    #[error("requested allocation size is zero")]
    ZeroSize,
    #[error("heap is exhausted")]
    OutOfMemory,
    #[error("address 0x{0:08X} is not an outstanding allocation")]
    InvalidFree(u32),
}

/// FAT16 read-path failures.
#[derive(Debug, Error)]
pub enum FatError {
    #[error("failed to open disk image: {0}")]
    Io(#[from] std::io::Error),
    #[error("path not found: {0}")]
    NotFound(String),
    #[error("too many open files")]
    TooManyOpenFiles,
    #[error("invalid file handle {0}")]
    BadHandle(u32),
    #[error("cannot read a directory or volume-label entry")]
    NotAFile,
    #[error("invalid whence value {0}")]
    InvalidWhence(i32),
}

/// Syscall dispatch failures. An unknown code is fatal; others are recoverable.
#[derive(Debug, Error)]
pub enum SyscallError {
    #[error("unknown syscall code {0}")]
    UnknownCode(u8),
}

/// Top-level error surfaced by the CLI / executor, carrying the process exit codes.
#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("missing program file argument")]
    MissingArgument,
    #[error("process id already in use or process table full")]
    DoubleInit,
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("invalid register index {0}")]
    InvalidRegister(usize),
    #[error(transparent)]
    Syscall(#[from] SyscallError),
    #[error("out of pages at init")]
    OutOfMemoryAtInit,
    #[error("filename too long")]
    FilenameTooLong,
    #[error("invalid directory path")]
    InvalidDirectoryPath,
    #[error("brk failed: no stack/heap boundary page for process")]
    BrkFailed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EmulatorError {
    /// The numeric process exit code, matching the original binary's convention.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingArgument => -1,
            Self::DoubleInit => -2,
            Self::Decode(_) => -3,
            Self::InvalidRegister(_) => -4,
            Self::Syscall(_) => -5,
            Self::OutOfMemoryAtInit => -6,
            Self::FilenameTooLong => -10,
            Self::InvalidDirectoryPath => -11,
            Self::BrkFailed => 50,
            Self::Io(_) => -1,
        }
    }
}

pub type HeapResult<T> = Result<T, HeapError>;
pub type FatResult<T> = Result<T, FatError>;
pub type EmulatorResult<T> = Result<T, EmulatorError>;
