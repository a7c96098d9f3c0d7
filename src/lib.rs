//! A small `ptrace(2)`-based debugger core for Linux/x86-64.
//!
//! Controlling a native process means juggling three kernel interfaces at
//! once: `fork`/`exec` to create the tracee (with its awkward rule that
//! exec failures can only be reported from inside the doomed child),
//! `waitpid` statuses to learn why the tracee stopped, and a family of
//! ptrace requests that each address a different slice of the register
//! file. Magpie wraps all three behind a single [`Process`] handle.
//!
//! A [`Process`] is created by [`Process::launch`] (fork + exec under
//! tracing, with errors ferried back over a close-on-exec pipe) or
//! [`Process::attach`]. While the tracee is stopped, its registers are
//! available through a typed, table-driven [`Registers`] mirror; resuming
//! and waiting walk a small stopped/running/exited/terminated state
//! machine. Dropping the handle detaches and/or reaps the tracee, so no
//! exit path leaves a process frozen under a dead debugger.

pub mod bits;
pub mod error;
pub mod pipe;
pub mod process;
pub mod registers;
pub mod x86;

#[doc(inline)]
pub use bits::F80;

#[doc(inline)]
pub use error::{Error, Result};

#[doc(inline)]
pub use pipe::Pipe;

#[doc(inline)]
pub use process::{Process, ProcessState, StopReason};

#[doc(inline)]
pub use registers::{Registers, Value};

#[doc(inline)]
pub use x86::{
    register_info_by_dwarf, register_info_by_id, register_info_by_name, register_infos,
    RegisterFormat, RegisterId, RegisterInfo, RegisterType,
};

pub use nix::unistd::Pid;
