//! Launching, attaching to, resuming, and tearing down tracees.

use std::ffi::{CStr, CString};
use std::fmt;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use libc::{c_long, c_void};
use nix::errno::Errno;
use nix::sys::ptrace;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{dup2, execvp, fork, ForkResult, Pid};
use tracing::debug;

use crate::error::{Error, Result, ResultExt};
use crate::pipe::Pipe;
use crate::registers::Registers;
use crate::x86::{register_info_by_id, DEBUG_REGISTERS};

/// Where a tracee is in its life.
///
/// `Exited` and `Terminated` are terminal; the only way back to `Running`
/// is a fresh launch or attach.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessState {
    Stopped,
    Running,
    Exited,
    Terminated,
}

/// Why `wait_on_signal` returned.
///
/// `info` is the exit code for an exit, or the signal number for a
/// termination or a stop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StopReason {
    pub reason: ProcessState,
    pub info: u8,
}

impl StopReason {
    fn from_wait_status(status: WaitStatus) -> Result<Self> {
        let (reason, info) = match status {
            WaitStatus::Exited(_, code) => (ProcessState::Exited, code as u8),
            WaitStatus::Signaled(_, signal, _) => (ProcessState::Terminated, signal as u8),
            WaitStatus::Stopped(_, signal) => (ProcessState::Stopped, signal as u8),
            // Unreachable without WCONTINUED/WNOHANG or ptrace options,
            // neither of which this crate uses.
            status => return Err(Error::UnexpectedWaitStatus { status }),
        };

        Ok(Self { reason, info })
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            ProcessState::Exited => write!(f, "exited with status {}", self.info),
            ProcessState::Terminated => {
                write!(f, "terminated with signal {}", SignalName(self.info))
            }
            ProcessState::Stopped => write!(f, "stopped with signal {}", SignalName(self.info)),
            ProcessState::Running => write!(f, "running"),
        }
    }
}

struct SignalName(u8);

impl fmt::Display for SignalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Signal::try_from(self.0 as i32) {
            Ok(signal) => signal.fmt(f),
            Err(_) => self.0.fmt(f),
        }
    }
}

/// A process under this debugger's control.
///
/// The handle owns the kernel-side resources: dropping it detaches from an
/// attached tracee and reaps a launched one, so a tracee is never left
/// stopped under a dead debugger.
#[derive(Debug)]
pub struct Process {
    pid: Pid,
    state: ProcessState,
    terminate_on_end: bool,
    is_attached: bool,
    registers: Registers,
}

impl Process {
    /// Launches `path` under tracing and waits for the initial exec stop.
    pub fn launch(path: impl AsRef<Path>) -> Result<Self> {
        Self::launch_with(path, true, None)
    }

    /// Launches `path`, optionally without tracing it, and optionally with
    /// the given descriptor installed as the child's stdout.
    pub fn launch_with(
        path: impl AsRef<Path>,
        debug: bool,
        stdout_replacement: Option<BorrowedFd<'_>>,
    ) -> Result<Self> {
        // The exec argv must be allocated before forking.
        let path = CString::new(path.as_ref().as_os_str().as_bytes())?;

        let mut channel = Pipe::new(true)?;

        let pid = match unsafe { fork() }.os_context("fork failed")? {
            ForkResult::Child => {
                channel.close_read();
                exec_child(&path, debug, stdout_replacement, &mut channel)
            }
            ForkResult::Parent { child } => child,
        };

        channel.close_write();
        let data = channel.read()?;
        channel.close_read();

        // Bytes on the channel mean the child died before exec; the exec
        // itself closed the write end otherwise.
        if !data.is_empty() {
            let _ = waitpid(pid, None);
            return Err(Error::Child {
                message: String::from_utf8_lossy(&data).into_owned(),
            });
        }

        let is_attached = debug;
        debug!(pid = pid.as_raw(), is_attached, "launched tracee");

        let mut process = Self {
            pid,
            state: ProcessState::Stopped,
            terminate_on_end: true,
            is_attached: debug,
            registers: Registers::new(pid),
        };
        if debug {
            process.wait_on_signal()?;
        }

        Ok(process)
    }

    /// Attaches to a running process and waits for the attach stop.
    pub fn attach(pid: Pid) -> Result<Self> {
        if pid.as_raw() == 0 {
            return Err(Error::InvalidPid);
        }

        ptrace::attach(pid).os_context("Could not attach")?;
        debug!(pid = pid.as_raw(), "attached to tracee");

        let mut process = Self {
            pid,
            state: ProcessState::Stopped,
            terminate_on_end: false,
            is_attached: true,
            registers: Registers::new(pid),
        };
        process.wait_on_signal()?;

        Ok(process)
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    /// Dispatches the stopped tracee back to the scheduler. Does not
    /// block; the register mirror is stale until the next stop.
    pub fn resume(&mut self) -> Result<()> {
        ptrace::cont(self.pid, None).os_context("Could not resume")?;
        self.state = ProcessState::Running;
        Ok(())
    }

    /// Blocks until the tracee changes state and reports why. On a stop,
    /// the register mirror is refreshed from the kernel.
    pub fn wait_on_signal(&mut self) -> Result<StopReason> {
        let status = waitpid(self.pid, None).os_context("waitpid failed")?;
        let reason = StopReason::from_wait_status(status)?;
        self.state = reason.reason;
        debug!(pid = self.pid.as_raw(), state = ?self.state, "tracee changed state");

        if self.is_attached && self.state == ProcessState::Stopped {
            self.read_all_registers()?;
        }

        Ok(reason)
    }

    fn read_all_registers(&mut self) -> Result<()> {
        let gprs = ptrace::getregs(self.pid).os_context("Could not read GPR registers")?;
        self.registers.set_gprs(gprs);

        self.registers.set_fprs(get_fpregs(self.pid)?);

        for (slot, id) in DEBUG_REGISTERS.iter().enumerate() {
            let info = register_info_by_id(*id);
            let data = ptrace::read_user(self.pid, info.offset as ptrace::AddressType)
                .os_context("Could not read debug register")?;
            self.registers.set_debug_register(slot, data as u64);
        }

        Ok(())
    }

    /// Commits a whole general-purpose register block.
    pub fn write_gprs(&mut self, gprs: &libc::user_regs_struct) -> Result<()> {
        ptrace::setregs(self.pid, *gprs).os_context("Could not write general purpose registers")?;
        self.registers.set_gprs(*gprs);
        Ok(())
    }

    /// Commits a whole floating-point register block.
    pub fn write_fprs(&mut self, fprs: &libc::user_fpregs_struct) -> Result<()> {
        set_fpregs(self.pid, fprs)?;
        self.registers.set_fprs(*fprs);
        Ok(())
    }

    /// Pokes one aligned machine word into the tracee's user area.
    pub fn write_user_area(&mut self, offset: usize, data: u64) -> Result<()> {
        ptrace::write_user(self.pid, offset as ptrace::AddressType, data as c_long)
            .os_context("Could not write to user area")
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        if self.pid.as_raw() == 0 {
            return;
        }

        // Cleanup is best-effort; the tracee may already be gone.
        if self.is_attached {
            // Detach requires a stopped tracee.
            if self.state == ProcessState::Running {
                let _ = kill(self.pid, Signal::SIGSTOP);
                let _ = waitpid(self.pid, None);
            }
            debug!(pid = self.pid.as_raw(), "detaching from tracee");
            let _ = ptrace::detach(self.pid, None);
            // Once detached, the tracee no longer hears ptrace restarts;
            // lift the SIGSTOP with a plain signal.
            let _ = kill(self.pid, Signal::SIGCONT);
        }

        if self.terminate_on_end {
            debug!(pid = self.pid.as_raw(), "killing tracee");
            let _ = kill(self.pid, Signal::SIGKILL);
            let _ = waitpid(self.pid, None);
        }
    }
}

/// Child side of the launch fork. Reports any pre-exec failure over the
/// channel and never returns.
fn exec_child(
    path: &CStr,
    debug: bool,
    stdout_replacement: Option<BorrowedFd<'_>>,
    channel: &mut Pipe,
) -> ! {
    if let Some(fd) = stdout_replacement {
        if dup2(fd.as_raw_fd(), libc::STDOUT_FILENO).is_err() {
            exit_with_errno(channel, "stdout replacement failed");
        }
    }

    if debug && ptrace::traceme().is_err() {
        exit_with_errno(channel, "tracing failed");
    }

    let _ = execvp(path, &[path]);
    exit_with_errno(channel, "exec failed");
}

fn exit_with_errno(channel: &mut Pipe, prefix: &str) -> ! {
    let message = format!("{prefix}: {}", Errno::last());
    let _ = channel.write(message.as_bytes());
    std::process::exit(-1);
}

/// `nix` wraps most ptrace requests, but not the FPR block transfers.
pub(crate) fn get_fpregs(pid: Pid) -> Result<libc::user_fpregs_struct> {
    let mut fprs = std::mem::MaybeUninit::<libc::user_fpregs_struct>::uninit();

    let res = unsafe {
        libc::ptrace(
            libc::PTRACE_GETFPREGS,
            pid.as_raw(),
            std::ptr::null_mut::<c_void>(),
            fprs.as_mut_ptr(),
        )
    };
    Errno::result(res).os_context("Could not read FPR registers")?;

    Ok(unsafe { fprs.assume_init() })
}

pub(crate) fn set_fpregs(pid: Pid, fprs: &libc::user_fpregs_struct) -> Result<()> {
    let res = unsafe {
        libc::ptrace(
            libc::PTRACE_SETFPREGS,
            pid.as_raw(),
            std::ptr::null_mut::<c_void>(),
            fprs as *const libc::user_fpregs_struct,
        )
    };
    Errno::result(res).os_context("Could not write floating point registers")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn stop_reason_decodes_exit() {
        let reason =
            StopReason::from_wait_status(WaitStatus::Exited(Pid::from_raw(100), 3)).unwrap();
        assert_eq!(reason.reason, ProcessState::Exited);
        assert_eq!(reason.info, 3);
        assert_eq!(reason.to_string(), "exited with status 3");
    }

    #[test]
    fn stop_reason_decodes_termination() {
        let status = WaitStatus::Signaled(Pid::from_raw(100), Signal::SIGKILL, false);
        let reason = StopReason::from_wait_status(status).unwrap();
        assert_eq!(reason.reason, ProcessState::Terminated);
        assert_eq!(reason.info, Signal::SIGKILL as u8);
        assert_eq!(reason.to_string(), "terminated with signal SIGKILL");
    }

    #[test]
    fn stop_reason_decodes_stop() {
        let status = WaitStatus::Stopped(Pid::from_raw(100), Signal::SIGTRAP);
        let reason = StopReason::from_wait_status(status).unwrap();
        assert_eq!(reason.reason, ProcessState::Stopped);
        assert_eq!(reason.to_string(), "stopped with signal SIGTRAP");
    }

    #[test]
    fn stop_reason_rejects_other_statuses() {
        assert!(matches!(
            StopReason::from_wait_status(WaitStatus::StillAlive),
            Err(Error::UnexpectedWaitStatus { .. })
        ));
        assert!(matches!(
            StopReason::from_wait_status(WaitStatus::Continued(Pid::from_raw(100))),
            Err(Error::UnexpectedWaitStatus { .. })
        ));
    }
}
