use std::io;

use nix::errno::Errno;
use nix::sys::wait::WaitStatus;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An OS call failed; the message carries the errno's textual form.
    #[error("{context}: {errno}")]
    Os { context: &'static str, errno: Errno },

    /// The launch child reported a failure over the exec pipe before it
    /// could exec. The message is surfaced exactly as written.
    #[error("{message}")]
    Child { message: String },

    #[error("Invalid PID")]
    InvalidPid,

    #[error("No such register: {name}")]
    UnknownRegister { name: String },

    #[error("No register with DWARF id {dwarf_id}")]
    UnknownDwarfRegister { dwarf_id: i32 },

    #[error("Unexpected register size: {size}")]
    UnexpectedRegisterSize { size: usize },

    /// A register write was handed a value that does not fit the register,
    /// or whose tag is incompatible with the register's format.
    #[error("Mismatched register and value for {name}")]
    ValueMismatch { name: &'static str },

    #[error("Register value is not a {expected}")]
    ValueType { expected: &'static str },

    /// `waitpid` returned a status that is neither an exit, a termination,
    /// nor a stop. Unreachable with the wait flags this crate uses.
    #[error("Unexpected wait status: {status:?}")]
    UnexpectedWaitStatus { status: WaitStatus },

    #[error("Pipe end already closed")]
    PipeClosed,

    #[error("Could not parse {what}: {text:?}")]
    Parse { what: &'static str, text: String },

    #[error("Input/output error")]
    InputOutput(#[from] io::Error),

    #[error(transparent)]
    InteriorNulByte(#[from] std::ffi::NulError),
}

/// Annotates raw `Errno` results with a static context string.
pub(crate) trait ResultExt<T> {
    fn os_context(self, context: &'static str) -> Result<T>;
}

impl<T> ResultExt<T> for std::result::Result<T, Errno> {
    fn os_context(self, context: &'static str) -> Result<T> {
        self.map_err(|errno| Error::Os { context, errno })
    }
}
